//! Binance spot exchange integration.
//!
//! REST client for the Binance spot API: market data (klines, tickers,
//! exchange info) plus signed account and order endpoints.
//!
//! API docs: https://developers.binance.com/docs/binance-spot-api-docs
//! Auth: `X-MBX-APIKEY` header; HMAC-SHA256 signature over the query
//! string for account and trade endpoints.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::SpotExchange;
use crate::credentials::ApiCredentials;
use crate::types::{Candle, ExchangeError, LotFilter, OrderFill, OrderSide};

const EXCHANGE_NAME: &str = "binance";

// ---------------------------------------------------------------------------
// API response types (Binance JSON → Rust)
// ---------------------------------------------------------------------------

/// Binance error body, returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct BinanceApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    min_qty: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

/// Response from POST `/api/v3/order` with `newOrderRespType=FULL`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    executed_qty: String,
    cummulative_quote_qty: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Binance spot client.
pub struct BinanceSpot {
    http: Client,
    base_url: String,
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

impl BinanceSpot {
    pub fn new(
        base_url: String,
        credentials: ApiCredentials,
        recv_window_ms: u64,
    ) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("pegbot/0.1.0")
            .build()
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
        })
    }

    // -- Internal helpers ------------------------------------------------

    /// HMAC-SHA256 signature over a query string, hex-encoded.
    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(
            self.credentials.api_secret.expose_secret().as_bytes(),
        )
        .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Append `timestamp`, `recvWindow`, and `signature` to a query string.
    fn signed_query(&self, query: &str) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let unsigned = if query.is_empty() {
            format!("timestamp={timestamp}&recvWindow={}", self.recv_window_ms)
        } else {
            format!(
                "{query}&timestamp={timestamp}&recvWindow={}",
                self.recv_window_ms
            )
        };
        let signature = self.sign(&unsigned);
        format!("{unsigned}&signature={signature}")
    }

    /// Map a failed response to the shared error taxonomy.
    async fn classify_failure(resp: reqwest::Response) -> ExchangeError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        if status == 418 || status == 429 {
            return ExchangeError::RateLimited;
        }
        if status >= 500 {
            return ExchangeError::ServerError { status };
        }

        if let Ok(api_err) = serde_json::from_str::<BinanceApiError>(&body) {
            return match api_err.code {
                -2014 | -2015 | -1022 => ExchangeError::InvalidCredentials(api_err.msg),
                -1121 => ExchangeError::InvalidSymbol(api_err.msg),
                -2010 | -1013 => ExchangeError::InsufficientBalance(api_err.msg),
                code => ExchangeError::Rejected {
                    code,
                    message: api_err.msg,
                },
            };
        }

        if status == 401 {
            return ExchangeError::InvalidCredentials(body);
        }
        ExchangeError::Rejected {
            code: status as i64,
            message: body,
        }
    }

    fn transport_error(err: reqwest::Error) -> ExchangeError {
        ExchangeError::NetworkUnreachable(err.to_string())
    }

    async fn get_public(&self, path: &str, query: &str) -> Result<reqwest::Response, ExchangeError> {
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        debug!(url = %url, "Binance GET");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        Ok(resp)
    }

    async fn get_signed(&self, path: &str, query: &str) -> Result<reqwest::Response, ExchangeError> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(query));
        debug!(path, "Binance signed GET");

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        Ok(resp)
    }

    async fn post_signed(
        &self,
        path: &str,
        query: &str,
    ) -> Result<reqwest::Response, ExchangeError> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(query));
        debug!(path, "Binance signed POST");

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        Ok(resp)
    }

    /// Parse one kline row. Binance returns each candle as a JSON array
    /// of mixed numbers and numeric strings.
    fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
        let as_f64 = |v: &serde_json::Value| -> Option<f64> {
            v.as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| v.as_f64())
        };
        Some(Candle {
            open_time: row.first()?.as_i64()?,
            open: as_f64(row.get(1)?)?,
            high: as_f64(row.get(2)?)?,
            low: as_f64(row.get(3)?)?,
            close: as_f64(row.get(4)?)?,
            volume: as_f64(row.get(5)?)?,
        })
    }

    /// Decimal places implied by a `stepSize` string like "0.00100000".
    fn step_precision(step: &str) -> u32 {
        match step.trim_end_matches('0').split_once('.') {
            Some((_, frac)) => frac.len() as u32,
            None => 0,
        }
    }
}

#[async_trait]
impl SpotExchange for BinanceSpot {
    async fn account_balances(&self) -> Result<HashMap<String, f64>, ExchangeError> {
        let resp = self.get_signed("/api/v3/account", "").await?;
        let account: AccountInfo = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        let mut balances = HashMap::new();
        for entry in account.balances {
            match entry.free.parse::<f64>() {
                Ok(free) => {
                    balances.insert(entry.asset, free);
                }
                Err(_) => warn!(asset = %entry.asset, "Unparseable balance, skipping"),
            }
        }
        Ok(balances)
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let query = format!("symbol={symbol}&interval={interval}&limit={limit}");
        let resp = self.get_public("/api/v3/klines", &query).await?;

        let rows: Vec<Vec<serde_json::Value>> = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| Self::parse_kline(row))
            .collect();
        Ok(candles)
    }

    async fn exchange_symbols(&self) -> Result<HashSet<String>, ExchangeError> {
        let resp = self.get_public("/api/v3/exchangeInfo", "").await?;
        let info: ExchangeInfo = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| s.symbol)
            .collect())
    }

    async fn lot_filter(&self, symbol: &str) -> Result<LotFilter, ExchangeError> {
        let query = format!("symbol={symbol}");
        let resp = self.get_public("/api/v3/exchangeInfo", &query).await?;
        let info: ExchangeInfo = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        let mut lot = LotFilter::default();
        for sym in info.symbols.iter().filter(|s| s.symbol == symbol) {
            for filter in &sym.filters {
                if filter.filter_type == "LOT_SIZE" {
                    if let Some(step) = &filter.step_size {
                        lot.quantity_precision = Self::step_precision(step);
                    }
                    if let Some(min) = filter.min_qty.as_ref().and_then(|m| m.parse().ok()) {
                        lot.min_qty = min;
                    }
                }
            }
        }
        Ok(lot)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderFill, ExchangeError> {
        let lot = self.lot_filter(symbol).await?;
        let qty_str = format!("{quantity:.prec$}", prec = lot.quantity_precision as usize);

        let query = format!(
            "symbol={symbol}&side={}&type=MARKET&quantity={qty_str}&newOrderRespType=FULL",
            side.as_str()
        );
        let resp = self.post_signed("/api/v3/order", &query).await?;
        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        let executed_qty = order.executed_qty.parse().map_err(|_| ExchangeError::Rejected {
            code: 0,
            message: format!("unparseable executedQty: {}", order.executed_qty),
        })?;
        let cumulative_quote_qty =
            order
                .cummulative_quote_qty
                .parse()
                .map_err(|_| ExchangeError::Rejected {
                    code: 0,
                    message: format!(
                        "unparseable cummulativeQuoteQty: {}",
                        order.cummulative_quote_qty
                    ),
                })?;

        Ok(OrderFill {
            order_id: order.order_id,
            executed_qty,
            cumulative_quote_qty,
        })
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        self.get_public("/api/v3/ping", "").await?;
        Ok(())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let query = format!("symbol={symbol}");
        let resp = self.get_public("/api/v3/ticker/price", &query).await?;
        let ticker: TickerPrice = resp
            .json()
            .await
            .map_err(|e| ExchangeError::NetworkUnreachable(e.to_string()))?;

        ticker.price.parse().map_err(|_| ExchangeError::Rejected {
            code: 0,
            message: format!("unparseable ticker price: {}", ticker.price),
        })
    }

    fn name(&self) -> &str {
        EXCHANGE_NAME
    }
}
