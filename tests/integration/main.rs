//! Integration tests: engine cycles against a scripted in-memory exchange.

mod mock_exchange;
mod simulation;
