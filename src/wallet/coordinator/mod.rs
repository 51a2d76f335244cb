//! Wallet Event Coordination Module
//!
//! This module provides the event-driven core that reacts to blockchain and
//! stealth-server events and drives wallet-state updates, persistence, and
//! user notification. It is composed of several submodules, each responsible
//! for one aspect of coordination:
//!
//! - `events`: The typed event catalog, handler trait, and the process-wide
//!   event bus that fans events out to registered handlers.
//! - `retry`: The bounded-retry rule shared by network-dependent operations.
//! - `stealth`: Conducts the stealth payment challenge-response protocol and
//!   resolves announced payments into wallet-model updates.
//! - `sync`: Applies observed transactions and blocks to the wallet model
//!   exactly once and emits the UI-facing events.
//! - `persistence`: Coalesces bursts of wallet mutations into a single
//!   debounced, encrypted save.
//!
//! Coordinators own their mutable state (retry counters, the pending
//! self-payment id, the chain tip) as instance fields with single-writer
//! discipline; the bus is the only channel between them.

/// Typed events and the publish/subscribe bus
pub mod events;
/// Debounced wallet persistence
pub mod persistence;
/// Bounded-retry policy
pub mod retry;
/// Stealth payment protocol handling
pub mod stealth;
/// Transaction and block ingestion
pub mod sync;

pub use events::{EventBus, EventHandler, EventKind, WalletEvent};
pub use persistence::{DEFAULT_SAVE_DELAY, PersistenceDebouncer};
pub use retry::RetryPolicy;
pub use stealth::StealthPaymentCoordinator;
pub use sync::{ChainStatus, PendingSelfPayment, WalletSyncCoordinator};
