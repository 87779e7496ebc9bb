//! Order execution.
//!
//! Turns a signal into one or two market orders: a direct sell into the
//! quote asset, a direct buy out of it, or a cross conversion (sell then
//! buy). Sizing works on the source balance in whole units; the exchange
//! client formats quantities to lot precision at submission. The ledger
//! is refreshed after every order attempt so later decisions see real
//! balances, not estimates.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ledger::BalanceLedger;
use crate::exchange::SpotExchange;
use crate::types::{
    Conversion, ConvertError, OrderFill, OrderSide, PairQuote, TradingPair, MIN_LOT,
};

pub struct OrderExecutor {
    exchange: Arc<dyn SpotExchange>,
    quote_asset: String,
}

/// Size an order from the source balance, in whole units.
///
/// The traded amount is `floor(balance * fraction)`, bumped up to the
/// exchange minimum when the fraction lands below it and the balance can
/// cover it. Balances that cannot clear the minimum fail before any
/// network call.
pub fn sized_amount(coin: &str, balance: f64, fraction: f64) -> Result<f64, ConvertError> {
    let mut amount = (balance * fraction).floor();
    if amount < MIN_LOT {
        amount = if balance >= MIN_LOT {
            MIN_LOT
        } else {
            balance.floor()
        };
    }
    if amount < MIN_LOT {
        return Err(ConvertError::InsufficientLotSize {
            coin: coin.to_string(),
            balance,
        });
    }
    Ok(amount)
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn SpotExchange>, quote_asset: String) -> Self {
        Self {
            exchange,
            quote_asset,
        }
    }

    fn price_for(
        &self,
        quotes: &HashMap<TradingPair, PairQuote>,
        coin: &str,
    ) -> Result<f64, ConvertError> {
        let pair = TradingPair::new(coin, &self.quote_asset);
        quotes
            .get(&pair)
            .map(|q| q.price)
            .ok_or(ConvertError::MissingPrice(pair))
    }

    /// Place one market order and refresh the ledger regardless of the
    /// outcome, so a partially-known account state never lingers.
    async fn place_and_refresh(
        &self,
        ledger: &mut BalanceLedger,
        coin: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderFill, ConvertError> {
        let pair = TradingPair::new(coin, &self.quote_asset);
        let result = self
            .exchange
            .place_market_order(&pair.symbol(), side, quantity)
            .await;

        if let Err(refresh_err) = ledger.refresh().await {
            warn!(error = %refresh_err, "Balance refresh after order failed");
        }

        let fill = result?;
        info!(
            pair = %pair,
            side = side.as_str(),
            quantity,
            executed = fill.executed_qty,
            quote = fill.cumulative_quote_qty,
            order_id = fill.order_id,
            "Order filled"
        );
        Ok(fill)
    }

    /// Convert a fraction of `from` into `to`.
    ///
    /// Direct legs go through the quote pair. A cross conversion sells
    /// `from` first, then buys `to` with the realised proceeds; when the
    /// proceeds can't cover the minimum buy, one extra sell tops them up.
    /// Once the first sell has filled, any later failure surfaces as a
    /// partial conversion carrying the quote amount left resting.
    pub async fn convert(
        &self,
        ledger: &mut BalanceLedger,
        from: &str,
        to: &str,
        fraction: f64,
        quotes: &HashMap<TradingPair, PairQuote>,
    ) -> Result<Conversion, ConvertError> {
        if to == self.quote_asset {
            let amount = sized_amount(from, ledger.get(from), fraction)?;
            self.price_for(quotes, from)?;
            let fill = self
                .place_and_refresh(ledger, from, OrderSide::Sell, amount)
                .await?;
            return Ok(Conversion {
                from_coin: from.to_string(),
                to_coin: to.to_string(),
                from_amount: fill.executed_qty,
                to_amount: fill.cumulative_quote_qty,
            });
        }

        if from == self.quote_asset {
            let balance = ledger.get(from);
            let amount = sized_amount(from, balance, fraction)?;
            let price = self.price_for(quotes, to)?;
            let qty = self.buy_quantity(to, amount, balance, price)?;
            let fill = self
                .place_and_refresh(ledger, to, OrderSide::Buy, qty)
                .await?;
            return Ok(Conversion {
                from_coin: from.to_string(),
                to_coin: to.to_string(),
                from_amount: fill.cumulative_quote_qty,
                to_amount: fill.executed_qty,
            });
        }

        self.convert_cross(ledger, from, to, fraction, quotes).await
    }

    /// Base quantity a quote amount buys, with the min-lot clamp against
    /// the available quote balance.
    fn buy_quantity(
        &self,
        to: &str,
        quote_amount: f64,
        quote_balance: f64,
        price: f64,
    ) -> Result<f64, ConvertError> {
        let mut qty = (quote_amount / price).floor();
        if qty < MIN_LOT {
            qty = if quote_balance >= MIN_LOT * price {
                MIN_LOT
            } else {
                (quote_balance / price).floor()
            };
        }
        if qty < MIN_LOT {
            return Err(ConvertError::InsufficientLotSize {
                coin: to.to_string(),
                balance: quote_balance,
            });
        }
        Ok(qty)
    }

    /// Sell `from` into the quote asset, then buy `to` with the proceeds.
    async fn convert_cross(
        &self,
        ledger: &mut BalanceLedger,
        from: &str,
        to: &str,
        fraction: f64,
        quotes: &HashMap<TradingPair, PairQuote>,
    ) -> Result<Conversion, ConvertError> {
        let sell_amount = sized_amount(from, ledger.get(from), fraction)?;
        let price_from = self.price_for(quotes, from)?;
        let price_to = self.price_for(quotes, to)?;

        let sell = self
            .place_and_refresh(ledger, from, OrderSide::Sell, sell_amount)
            .await?;
        let mut sold = sell.executed_qty;
        let mut proceeds = sell.cumulative_quote_qty;

        let partial = |cause: ConvertError, resting_quote: f64| ConvertError::PartialConversion {
            resting_quote,
            cause: Box::new(cause),
        };

        // The buy leg must clear the exchange minimum. If the proceeds
        // fall short, escalate exactly once: fix the buy at the minimum
        // and reissue the sell for the quote it needs.
        let mut buy_qty = (proceeds / price_to).floor();
        if buy_qty < MIN_LOT {
            buy_qty = MIN_LOT;
            let needed_quote = MIN_LOT * price_to;
            let mut extra = (needed_quote / price_from).floor().max(MIN_LOT);
            let balance = ledger.get(from);
            if balance < extra {
                extra = balance.floor();
            }
            if extra < MIN_LOT {
                return Err(partial(
                    ConvertError::InsufficientLotSize {
                        coin: from.to_string(),
                        balance,
                    },
                    proceeds,
                ));
            }

            warn!(
                coin = from,
                proceeds, extra, "Proceeds under minimum buy, reissuing sell"
            );
            match self
                .place_and_refresh(ledger, from, OrderSide::Sell, extra)
                .await
            {
                Ok(fill) => {
                    sold += fill.executed_qty;
                    proceeds += fill.cumulative_quote_qty;
                }
                Err(cause) => return Err(partial(cause, proceeds)),
            }
        }

        match self
            .place_and_refresh(ledger, to, OrderSide::Buy, buy_qty)
            .await
        {
            Ok(buy) => Ok(Conversion {
                from_coin: from.to_string(),
                to_coin: to.to_string(),
                from_amount: sold,
                to_amount: buy.executed_qty,
            }),
            Err(cause) => Err(partial(cause, proceeds)),
        }
    }
}
