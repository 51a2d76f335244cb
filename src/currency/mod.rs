//! Monetary amount conversion and currency catalogs.
//!
//! Everything here is pure and synchronous: the codec converts between
//! base-unit integer amounts and display strings, and the catalog maps the
//! persisted currency preference index to codes and symbols. No event
//! coupling; UI layers call in directly.

/// Exact-decimal amount parsing and formatting
pub mod amount;
/// Append-only fiat currency and symbol catalogs
pub mod catalog;

pub use amount::{
    Amount, AmountLocale, CoinKind, Denomination, format_amount, format_with_code, parse_amount,
};
pub use catalog::{CurrencyCatalog, ExchangeRateSource};
