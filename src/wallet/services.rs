//! External collaborator seams.
//!
//! The coordination layer owns none of the wallet's internal state. Every
//! mutation goes through the [`WalletModel`] so there is a single source of
//! truth, and every network or UI capability is a trait implemented outside
//! this crate. Handlers re-read through these interfaces on every invocation
//! rather than caching wallet state.

use crate::wallet::types::{IncomingFunds, SyncError, TxRecord};

use chrono::{DateTime, Utc};

/// The wallet model: accounts, addresses, and balances.
#[async_trait::async_trait]
pub trait WalletModel: Send + Sync {
    /// Apply a newly observed transaction. Returns the funds credited to a
    /// tracked address, if any. Applying the same transaction twice must be
    /// a no-op the second time.
    async fn apply_new_transaction(&self, record: &TxRecord)
    -> Result<Option<IncomingFunds>, SyncError>;

    /// Complete a stealth payment: derive the one-time key for
    /// `payment_address`, account for the funds, and record the transaction.
    async fn apply_stealth_payment(
        &self,
        stealth_address: &str,
        payment_address: &str,
        txid: &str,
        time: u64,
        record: &TxRecord,
    ) -> Result<(), SyncError>;

    /// Answer a stealth-server challenge by signing it with the wallet's
    /// scan key and sending the response.
    async fn respond_to_challenge(&self, challenge: &str) -> Result<(), SyncError>;

    /// Mark a stealth address subscription as established.
    async fn confirm_subscription(&self, address: &str) -> Result<(), SyncError>;

    /// Canonical JSON form of all wallets, or `None` before setup.
    fn wallets_json(&self) -> Option<serde_json::Value>;

    /// Load a previously persisted wallet payload.
    fn load_wallet_payload(
        &self,
        payload: serde_json::Value,
        master_key_material: &str,
    ) -> Result<(), SyncError>;
}

/// Block-explorer style transaction detail lookup.
#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch full transaction detail by id. Failures carry the transport
    /// `(code, status)` pair via [`SyncError::Lookup`].
    async fn get_transaction(&self, txid: &str) -> Result<serde_json::Value, SyncError>;
}

/// Durable storage for the encrypted wallet payload.
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
    /// Persist the encrypted wallet container. Returns false on failure;
    /// the caller decides how to surface it.
    async fn save_wallet_json(&self, ciphertext: &str, when: DateTime<Utc>) -> bool;

    /// The decrypted wallet-JSON passphrase, if the store is unlocked.
    fn decrypted_passphrase(&self) -> Option<String>;
}

/// Channel to the stealth server, used to re-issue challenge requests while
/// a subscription is being established.
#[async_trait::async_trait]
pub trait StealthTransport: Send + Sync {
    async fn request_challenge(&self) -> Result<(), SyncError>;
}

/// Network listener registration for freshly generated receive addresses.
#[async_trait::async_trait]
pub trait TransactionListener: Send + Sync {
    async fn listen_to_address(&self, address: &str) -> Result<(), SyncError>;
}

/// User-visible prompts. Implementations decide presentation (dialog,
/// notification, sound); the core only supplies the text.
pub trait UserPrompter: Send + Sync {
    fn success(&self, title: &str, message: &str);
    fn error(&self, title: &str, message: &str);
}

pub use crate::currency::ExchangeRateSource;
