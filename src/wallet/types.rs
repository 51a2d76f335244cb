use crate::currency::Amount;

use serde::{Deserialize, Serialize};

/// One side of a transaction as reported by the network layer.
///
/// Fields are optional because explorer payloads routinely omit them
/// (coinbase inputs carry no address, unparsed scripts carry no value).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxEndpoint {
    pub addr: Option<String>,
    pub value: Option<u64>,
}

/// Record of a single wallet-relevant transaction parsed from an opaque
/// network payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub inputs: Vec<TxEndpoint>,
    #[serde(default)]
    pub outputs: Vec<TxEndpoint>,
}

/// Funds credited to a tracked address by an applied transaction, as
/// reported back by the wallet model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFunds {
    pub amount: Amount,
    /// Label of the receiving account or address, for the user prompt.
    pub to_label: String,
}

/// Error types for the wallet event coordination layer
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction lookup failed with code {code}: {status}")]
    Lookup { code: i64, status: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("catalog configuration error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
