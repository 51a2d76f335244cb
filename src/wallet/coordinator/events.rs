//! Event system for the wallet coordination layer.
//!
//! External collaborators (network listeners, the UI shell) publish typed
//! [`WalletEvent`]s; coordinators subscribe handlers per event kind. Within
//! one kind, handlers fire in registration order. Publishing is synchronous
//! on the calling task and fire-and-forget: nothing is returned to the
//! publisher, and a failing handler never prevents the remaining handlers
//! for the same event from running.
//!
//! Handlers cannot be unregistered selectively; [`EventBus::unsubscribe_all`]
//! removes every registration made under an owner tag for clean shutdown.

use crate::wallet::types::SyncError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Events flowing through the coordination layer.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    /// The stealth server issued a challenge to sign.
    StealthChallengeReceived { challenge: String },
    /// The stealth server answered a subscription attempt.
    StealthSubscriptionResult { address: String, success: bool },
    /// The stealth server announced an incoming payment.
    StealthPaymentNotice {
        stealth_address: String,
        txid: String,
        payment_address: String,
        timestamp: u64,
    },
    /// Transaction detail for a stealth payment could not be fetched within
    /// the retry bound; the notice was dropped.
    StealthPaymentFailed { txid: String },
    /// A network listener observed an unconfirmed transaction. The payload
    /// is the raw explorer object; parsing happens off the publishing task.
    NewUnconfirmedTransaction { payload: serde_json::Value },
    /// A new block was announced.
    NewBlock { height: u64 },
    /// The wallet generated a fresh receive address to watch.
    NewAddressGenerated { address: String },
    /// The wallet payload changed and should be persisted after the quiet
    /// window.
    WalletPayloadUpdated,
    /// UI-facing: a transaction was applied to the wallet model.
    NewUnconfirmedTransactionApplied { tx_hash: String },
    /// UI-facing: an applied transaction credited a tracked address.
    PaymentReceived,
    /// UI-facing: the tracked chain height advanced.
    BlockHeightUpdated { height: u64 },
}

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StealthChallengeReceived,
    StealthSubscriptionResult,
    StealthPaymentNotice,
    StealthPaymentFailed,
    NewUnconfirmedTransaction,
    NewBlock,
    NewAddressGenerated,
    WalletPayloadUpdated,
    NewUnconfirmedTransactionApplied,
    PaymentReceived,
    BlockHeightUpdated,
}

impl WalletEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WalletEvent::StealthChallengeReceived { .. } => EventKind::StealthChallengeReceived,
            WalletEvent::StealthSubscriptionResult { .. } => EventKind::StealthSubscriptionResult,
            WalletEvent::StealthPaymentNotice { .. } => EventKind::StealthPaymentNotice,
            WalletEvent::StealthPaymentFailed { .. } => EventKind::StealthPaymentFailed,
            WalletEvent::NewUnconfirmedTransaction { .. } => EventKind::NewUnconfirmedTransaction,
            WalletEvent::NewBlock { .. } => EventKind::NewBlock,
            WalletEvent::NewAddressGenerated { .. } => EventKind::NewAddressGenerated,
            WalletEvent::WalletPayloadUpdated => EventKind::WalletPayloadUpdated,
            WalletEvent::NewUnconfirmedTransactionApplied { .. } => {
                EventKind::NewUnconfirmedTransactionApplied
            }
            WalletEvent::PaymentReceived => EventKind::PaymentReceived,
            WalletEvent::BlockHeightUpdated { .. } => EventKind::BlockHeightUpdated,
        }
    }
}

/// Trait for handling wallet events.
///
/// Handlers receive the bus alongside the event so they can publish
/// follow-up events (UI notifications, bounded re-dispatch) without holding
/// a reference back to it.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WalletEvent, bus: &EventBus) -> Result<(), SyncError>;

    /// Name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

struct Registration {
    owner: String,
    handler: Arc<dyn EventHandler>,
}

/// Process-wide publish/subscribe channel.
///
/// Cheap to clone; all clones share the same registrations, so background
/// tasks and timers can publish through their own handle.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Registration>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind under an owner tag.
    ///
    /// Handlers are called in the order they are registered.
    pub fn subscribe(&self, owner: &str, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Registration {
                owner: owner.to_string(),
                handler,
            });
    }

    /// Remove every registration made under `owner`.
    pub fn unsubscribe_all(&self, owner: &str) {
        let mut handlers = self.handlers.lock().unwrap();
        for registrations in handlers.values_mut() {
            registrations.retain(|r| r.owner != owner);
        }
    }

    /// Dispatch an event to all handlers registered for its kind.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from
    /// running.
    pub async fn publish(&self, event: &WalletEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let map = self.handlers.lock().unwrap();
            map.get(&event.kind())
                .map(|registrations| registrations.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if let Err(e) = handler.handle(event, self).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
                // Continue processing with other handlers
            }
        }
    }
}
