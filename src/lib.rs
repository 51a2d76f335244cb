//! # stealth-wallet-sync
//!
//! Event-driven coordination core for a bitcoin wallet with stealth payment
//! support:
//! - **Event bus** — typed publish/subscribe channel between the network
//!   layer, the coordinators, and the UI shell
//! - **Stealth payment protocol** — challenge-response subscription handshake
//!   and payment resolution with bounded retries
//! - **Wallet sync** — exactly-once transaction and block ingestion with
//!   dual-path de-duplication
//! - **Debounced persistence** — coalesced, encrypted wallet saves with a
//!   cloud mirror
//! - **Amount codec** — exact-decimal, locale-aware conversion between
//!   base-unit amounts and display strings; no floating point on the money
//!   path
//!
//! The surrounding application (view controllers, QR scanning, passcode
//! screens, push registration) stays outside this crate and connects through
//! the collaborator traits in [`wallet::services`].

pub mod config;
pub mod currency;
pub mod wallet;
