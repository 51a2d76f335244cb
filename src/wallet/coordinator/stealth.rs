//! Stealth payment protocol coordinator.
//!
//! Conducts the challenge-response handshake with the stealth server and
//! resolves announced payments into confirmed wallet-model updates. The
//! protocol advances through handler reactions: a challenge is answered, a
//! subscription result either confirms the address or re-issues a challenge,
//! and a payment notice triggers a transaction-detail fetch bounded by
//! [`RetryPolicy::tx_lookup`].
//!
//! Retry counters are fields on the coordinator, reset to zero on success.
//! Both counters are single-writer: only this coordinator's handlers touch
//! them, and handlers for one bus run sequentially.
//!
//! A payment notice whose txid matches a pending self-directed stealth
//! payment is still resolved here; skipping the competing plain-ingestion
//! copy is `WalletSyncCoordinator`'s job, so exactly one path applies it.

use crate::wallet::coordinator::events::{EventBus, EventHandler, EventKind, WalletEvent};
use crate::wallet::coordinator::retry::RetryPolicy;
use crate::wallet::services::{StealthTransport, TransactionSource, WalletModel};
use crate::wallet::types::{SyncError, TxRecord};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct StealthPaymentCoordinator {
    wallet: Arc<dyn WalletModel>,
    tx_source: Arc<dyn TransactionSource>,
    transport: Arc<dyn StealthTransport>,
    subscription_policy: RetryPolicy,
    lookup_policy: RetryPolicy,

    /// Most recent challenge from the server. Last write wins; there is no
    /// queue of pending challenges.
    challenge: Mutex<Option<String>>,
    failed_subscription_count: Mutex<u32>,
    payment_lookup_tries: Mutex<u32>,
    /// Notices dropped after exhausting the lookup retries.
    dropped_notices: AtomicU64,
}

impl StealthPaymentCoordinator {
    /// Owner tag for this coordinator's bus registrations.
    pub const OWNER: &'static str = "stealth-payment-coordinator";

    pub fn new(
        wallet: Arc<dyn WalletModel>,
        tx_source: Arc<dyn TransactionSource>,
        transport: Arc<dyn StealthTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            wallet,
            tx_source,
            transport,
            subscription_policy: RetryPolicy::subscription(),
            lookup_policy: RetryPolicy::tx_lookup(),
            challenge: Mutex::new(None),
            failed_subscription_count: Mutex::new(0),
            payment_lookup_tries: Mutex::new(0),
            dropped_notices: AtomicU64::new(0),
        })
    }

    /// Subscribe this coordinator's handlers on the bus.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        for kind in [
            EventKind::StealthChallengeReceived,
            EventKind::StealthSubscriptionResult,
            EventKind::StealthPaymentNotice,
        ] {
            bus.subscribe(Self::OWNER, kind, self.clone());
        }
    }

    /// The challenge currently held for the handshake, if any.
    pub fn current_challenge(&self) -> Option<String> {
        self.challenge.lock().unwrap().clone()
    }

    /// Number of payment notices dropped after exhausting lookups.
    pub fn dropped_notices(&self) -> u64 {
        self.dropped_notices.load(Ordering::Relaxed)
    }

    async fn on_challenge(&self, challenge: &str) -> Result<(), SyncError> {
        *self.challenge.lock().unwrap() = Some(challenge.to_string());
        self.wallet.respond_to_challenge(challenge).await
    }

    async fn on_subscription_result(&self, address: &str, success: bool) -> Result<(), SyncError> {
        if !success {
            let retry = {
                let mut count = self.failed_subscription_count.lock().unwrap();
                if self.subscription_policy.should_retry(*count) {
                    *count += 1;
                    true
                } else {
                    false
                }
            };
            if retry {
                debug!("stealth subscription for {} failed, requesting a new challenge", address);
                return self.transport.request_challenge().await;
            }
        }
        *self.failed_subscription_count.lock().unwrap() = 0;
        self.wallet.confirm_subscription(address).await
    }

    async fn on_payment_notice(
        &self,
        stealth_address: &str,
        txid: &str,
        payment_address: &str,
        timestamp: u64,
        bus: &EventBus,
    ) -> Result<(), SyncError> {
        // The bound is checked before any dispatch so a failing lookup
        // cannot re-dispatch forever.
        let tries = *self.payment_lookup_tries.lock().unwrap();
        if !self.lookup_policy.should_retry(tries) {
            self.dropped_notices.fetch_add(1, Ordering::Relaxed);
            *self.payment_lookup_tries.lock().unwrap() = 0;
            warn!(
                "dropping stealth payment notice for {} after {} failed lookups",
                txid, tries
            );
            bus.publish(&WalletEvent::StealthPaymentFailed {
                txid: txid.to_string(),
            })
            .await;
            return Ok(());
        }

        match self.tx_source.get_transaction(txid).await {
            Ok(detail) => {
                let record: TxRecord = serde_json::from_value(detail)?;
                self.wallet
                    .apply_stealth_payment(stealth_address, payment_address, txid, timestamp, &record)
                    .await?;
                *self.payment_lookup_tries.lock().unwrap() = 0;
                bus.publish(&WalletEvent::NewUnconfirmedTransactionApplied {
                    tx_hash: txid.to_string(),
                })
                .await;
                Ok(())
            }
            Err(e) => {
                debug!("stealth payment tx lookup failed for {}: {}", txid, e);
                *self.payment_lookup_tries.lock().unwrap() += 1;
                // Re-dispatch the same notice; the counter gates the next run.
                bus.publish(&WalletEvent::StealthPaymentNotice {
                    stealth_address: stealth_address.to_string(),
                    txid: txid.to_string(),
                    payment_address: payment_address.to_string(),
                    timestamp,
                })
                .await;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for StealthPaymentCoordinator {
    async fn handle(&self, event: &WalletEvent, bus: &EventBus) -> Result<(), SyncError> {
        match event {
            WalletEvent::StealthChallengeReceived { challenge } => self.on_challenge(challenge).await,
            WalletEvent::StealthSubscriptionResult { address, success } => {
                self.on_subscription_result(address, *success).await
            }
            WalletEvent::StealthPaymentNotice {
                stealth_address,
                txid,
                payment_address,
                timestamp,
            } => {
                self.on_payment_notice(stealth_address, txid, payment_address, *timestamp, bus)
                    .await
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "StealthPaymentCoordinator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct MockWallet {
        challenges: Mutex<Vec<String>>,
        confirmed: Mutex<Vec<String>>,
        stealth_applied: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait::async_trait]
    impl WalletModel for MockWallet {
        async fn apply_new_transaction(
            &self,
            _record: &TxRecord,
        ) -> Result<Option<crate::wallet::types::IncomingFunds>, SyncError> {
            Ok(None)
        }

        async fn apply_stealth_payment(
            &self,
            stealth_address: &str,
            payment_address: &str,
            txid: &str,
            _time: u64,
            _record: &TxRecord,
        ) -> Result<(), SyncError> {
            self.stealth_applied.lock().unwrap().push((
                stealth_address.to_string(),
                payment_address.to_string(),
                txid.to_string(),
            ));
            Ok(())
        }

        async fn respond_to_challenge(&self, challenge: &str) -> Result<(), SyncError> {
            self.challenges.lock().unwrap().push(challenge.to_string());
            Ok(())
        }

        async fn confirm_subscription(&self, address: &str) -> Result<(), SyncError> {
            self.confirmed.lock().unwrap().push(address.to_string());
            Ok(())
        }

        fn wallets_json(&self) -> Option<serde_json::Value> {
            None
        }

        fn load_wallet_payload(
            &self,
            _payload: serde_json::Value,
            _master_key_material: &str,
        ) -> Result<(), SyncError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockTransport {
        challenge_requests: AtomicU32,
    }

    #[async_trait::async_trait]
    impl StealthTransport for MockTransport {
        async fn request_challenge(&self) -> Result<(), SyncError> {
            self.challenge_requests.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Fails the first `failures` lookups, then succeeds.
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySource {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl TransactionSource for FlakySource {
        async fn get_transaction(&self, txid: &str) -> Result<serde_json::Value, SyncError> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            if call < self.failures {
                Err(SyncError::Lookup {
                    code: 500,
                    status: "unavailable".to_string(),
                })
            } else {
                Ok(serde_json::json!({ "hash": txid, "time": 1_700_000_000u64 }))
            }
        }
    }

    struct KindCounter {
        kind: EventKind,
        count: AtomicU32,
    }

    #[async_trait::async_trait]
    impl EventHandler for KindCounter {
        async fn handle(&self, event: &WalletEvent, _bus: &EventBus) -> Result<(), SyncError> {
            assert_eq!(event.kind(), self.kind);
            self.count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "KindCounter"
        }
    }

    fn setup(
        source: FlakySource,
    ) -> (
        EventBus,
        Arc<StealthPaymentCoordinator>,
        Arc<MockWallet>,
        Arc<MockTransport>,
    ) {
        let bus = EventBus::new();
        let wallet = Arc::new(MockWallet::default());
        let transport = Arc::new(MockTransport::default());
        let coordinator =
            StealthPaymentCoordinator::new(wallet.clone(), Arc::new(source), transport.clone());
        coordinator.register(&bus);
        (bus, coordinator, wallet, transport)
    }

    #[tokio::test]
    async fn challenge_is_stored_and_answered() {
        let (bus, coordinator, wallet, _) = setup(FlakySource::new(0));

        bus.publish(&WalletEvent::StealthChallengeReceived {
            challenge: "abc123".to_string(),
        })
        .await;
        bus.publish(&WalletEvent::StealthChallengeReceived {
            challenge: "def456".to_string(),
        })
        .await;

        // Last write wins, every challenge is answered.
        assert_eq!(coordinator.current_challenge().as_deref(), Some("def456"));
        assert_eq!(*wallet.challenges.lock().unwrap(), vec!["abc123", "def456"]);
    }

    #[tokio::test]
    async fn seven_failures_then_success_reissues_seven_challenges() {
        let (bus, coordinator, wallet, transport) = setup(FlakySource::new(0));

        bus.publish(&WalletEvent::StealthChallengeReceived {
            challenge: "abc123".to_string(),
        })
        .await;
        for _ in 0..7 {
            bus.publish(&WalletEvent::StealthSubscriptionResult {
                address: "1Foo".to_string(),
                success: false,
            })
            .await;
        }
        bus.publish(&WalletEvent::StealthSubscriptionResult {
            address: "1Foo".to_string(),
            success: true,
        })
        .await;

        assert_eq!(transport.challenge_requests.load(Ordering::Relaxed), 7);
        assert_eq!(*wallet.confirmed.lock().unwrap(), vec!["1Foo"]);
        assert_eq!(*coordinator.failed_subscription_count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn subscription_proceeds_after_the_retry_bound() {
        let (bus, coordinator, wallet, transport) = setup(FlakySource::new(0));

        // Eight failures each re-issue a challenge; the ninth exhausts the
        // bound, resets the counter, and confirms regardless of outcome.
        for _ in 0..9 {
            bus.publish(&WalletEvent::StealthSubscriptionResult {
                address: "1Bar".to_string(),
                success: false,
            })
            .await;
        }

        assert_eq!(transport.challenge_requests.load(Ordering::Relaxed), 8);
        assert_eq!(*wallet.confirmed.lock().unwrap(), vec!["1Bar"]);
        assert_eq!(*coordinator.failed_subscription_count.lock().unwrap(), 0);
    }

    fn notice(txid: &str) -> WalletEvent {
        WalletEvent::StealthPaymentNotice {
            stealth_address: "vJmwhH".to_string(),
            txid: txid.to_string(),
            payment_address: "1Pay".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn payment_notice_applies_on_first_success() {
        let (bus, coordinator, wallet, _) = setup(FlakySource::new(0));

        bus.publish(&notice("tx01")).await;

        let applied = wallet.stealth_applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].2, "tx01");
        assert_eq!(*coordinator.payment_lookup_tries.lock().unwrap(), 0);
        assert_eq!(coordinator.dropped_notices(), 0);
    }

    #[tokio::test]
    async fn payment_notice_retries_through_transient_failures() {
        let (bus, coordinator, wallet, _) = setup(FlakySource::new(2));

        bus.publish(&notice("tx02")).await;

        // Two failed lookups re-dispatched the notice, the third applied it.
        let applied = wallet.stealth_applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(*coordinator.payment_lookup_tries.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn exhausted_lookups_drop_the_notice_with_a_terminal_event() {
        let (bus, coordinator, wallet, _) = setup(FlakySource::new(u32::MAX));
        let failures = Arc::new(KindCounter {
            kind: EventKind::StealthPaymentFailed,
            count: AtomicU32::new(0),
        });
        bus.subscribe("test", EventKind::StealthPaymentFailed, failures.clone());

        bus.publish(&notice("tx03")).await;

        assert!(wallet.stealth_applied.lock().unwrap().is_empty());
        assert_eq!(failures.count.load(Ordering::Relaxed), 1);
        assert_eq!(coordinator.dropped_notices(), 1);
        // Counter resets so the next notice gets fresh attempts.
        assert_eq!(*coordinator.payment_lookup_tries.lock().unwrap(), 0);
    }
}
