//! Debounced wallet persistence.
//!
//! Wallet mutations arrive in bursts (a recovery scan can touch hundreds of
//! addresses), so each `WalletPayloadUpdated` event restarts a quiet-window
//! timer instead of saving immediately. Superseding a pending timer cancels
//! it: overlapping triggers collapse into the most recent schedule, never a
//! queue. When the window elapses, the wallet JSON is serialized, encrypted
//! with the store passphrase, and written through the wallet store on a
//! background task.
//!
//! A failed save surfaces one user-visible prompt and is not retried; the
//! next mutation event naturally schedules another attempt.

use crate::wallet::coordinator::events::{EventBus, EventHandler, EventKind, WalletEvent};
use crate::wallet::services::{UserPrompter, WalletModel, WalletStore};
use crate::wallet::types::SyncError;
use crate::wallet::vault;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Quiet window between the last wallet mutation and the save.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(2);

/// Coalesces wallet-mutation events into one delayed save. Cheap to clone;
/// clones share the pending timer and the enabled flag.
#[derive(Clone)]
pub struct PersistenceDebouncer {
    inner: Arc<Inner>,
}

struct Inner {
    wallet: Arc<dyn WalletModel>,
    store: Arc<dyn WalletStore>,
    prompter: Arc<dyn UserPrompter>,
    delay: Duration,
    enabled: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceDebouncer {
    /// Owner tag for this debouncer's bus registration.
    pub const OWNER: &'static str = "persistence-debouncer";

    pub fn new(
        wallet: Arc<dyn WalletModel>,
        store: Arc<dyn WalletStore>,
        prompter: Arc<dyn UserPrompter>,
        delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                wallet,
                store,
                prompter,
                delay,
                enabled: AtomicBool::new(true),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Subscribe this debouncer on the bus.
    pub fn register(&self, bus: &EventBus) {
        bus.subscribe(
            Self::OWNER,
            EventKind::WalletPayloadUpdated,
            Arc::new(self.clone()),
        );
    }

    /// Globally enable or disable saving (disabled during destructive
    /// operations like a wallet wipe).
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Save immediately, bypassing the quiet window. Used at shutdown and
    /// right after initial wallet setup.
    pub async fn save_now(&self) {
        self.inner.save_wallet_json().await;
    }

    fn schedule_save(&self) {
        if !self.inner.enabled.load(Ordering::Relaxed) {
            debug!("wallet saving disabled, ignoring payload update");
            return;
        }

        let mut pending = self.inner.pending.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let inner = self.inner.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            // The write runs detached so a later supersede only cancels a
            // still-pending timer, never a save already in progress.
            tokio::spawn(async move { inner.save_wallet_json().await });
        }));
    }
}

impl Inner {
    async fn save_wallet_json(&self) {
        if !self.enabled.load(Ordering::Relaxed) {
            debug!("wallet saving disabled");
            return;
        }
        let Some(payload) = self.wallet.wallets_json() else {
            debug!("no wallet payload to save yet");
            return;
        };
        let Some(passphrase) = self.store.decrypted_passphrase() else {
            error!("wallet store is locked, cannot save payload");
            return;
        };

        let result: Result<String, SyncError> = serde_json::to_string(&payload)
            .map_err(SyncError::from)
            .and_then(|json| vault::encrypt_wallet_json(&json, &passphrase));
        let ciphertext = match result {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                error!("failed to prepare wallet payload for saving: {}", e);
                return;
            }
        };

        if self.store.save_wallet_json(&ciphertext, chrono::Utc::now()).await {
            info!("wallet payload saved");
        } else {
            self.prompter.error(
                "Local backup of wallet failed",
                "Local backup of wallet failed",
            );
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for PersistenceDebouncer {
    async fn handle(&self, event: &WalletEvent, _bus: &EventBus) -> Result<(), SyncError> {
        if let WalletEvent::WalletPayloadUpdated = event {
            self.schedule_save();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PersistenceDebouncer"
    }
}
