//! Wallet sync coordinator: new-transaction and new-block ingestion.
//!
//! Transactions observed by the network layer are parsed off the publishing
//! task and applied to the wallet model exactly once. The one subtlety is a
//! self-directed stealth payment: the same transaction arrives both as a
//! plain unconfirmed-transaction notice and as a stealth payment notice.
//! This coordinator is the single de-duplication point: a transaction whose
//! id matches the shared pending self-payment id is skipped here and left to
//! the stealth path, which must generate the one-time private key before the
//! funds can be accounted for. Neither arrival order is assumed; the check
//! works whichever notice lands first.

use crate::currency::{CoinKind, Denomination, format_with_code};
use crate::wallet::coordinator::events::{EventBus, EventHandler, EventKind, WalletEvent};
use crate::wallet::services::{TransactionListener, UserPrompter, WalletModel};
use crate::wallet::types::{IncomingFunds, SyncError, TxRecord};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before the received-payment prompt is shown.
const RECEIVED_PAYMENT_PROMPT_DELAY: Duration = Duration::from_secs(1);

/// Shared handle to the transaction id of an in-flight self-directed stealth
/// payment. Written by the send flow, read by the sync coordinator.
#[derive(Clone, Default)]
pub struct PendingSelfPayment(Arc<Mutex<Option<String>>>);

impl PendingSelfPayment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, txid: impl Into<String>) {
        *self.0.lock().unwrap() = Some(txid.into());
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }

    pub fn matches(&self, txid: &str) -> bool {
        self.0.lock().unwrap().as_deref() == Some(txid)
    }
}

/// Process-wide view of the chain tip.
#[derive(Default)]
pub struct ChainStatus {
    height: AtomicU64,
}

impl ChainStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Advance to `height` if it is strictly greater than the current tip.
    fn advance(&self, height: u64) -> bool {
        let mut current = self.height.load(Ordering::Relaxed);
        loop {
            if height <= current {
                return false;
            }
            match self.height.compare_exchange(
                current,
                height,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct WalletSyncCoordinator {
    wallet: Arc<dyn WalletModel>,
    listener: Arc<dyn TransactionListener>,
    prompter: Arc<dyn UserPrompter>,
    pending_self_payment: PendingSelfPayment,
    chain: Arc<ChainStatus>,
    /// Transaction hashes already announced to the UI. Keeps the UI events
    /// exactly-once even when both ingestion paths see the same tx.
    notified_tx_hashes: Mutex<HashSet<String>>,
    coin: CoinKind,
    denomination: Denomination,
}

impl WalletSyncCoordinator {
    /// Owner tag for this coordinator's bus registrations.
    pub const OWNER: &'static str = "wallet-sync-coordinator";

    pub fn new(
        wallet: Arc<dyn WalletModel>,
        listener: Arc<dyn TransactionListener>,
        prompter: Arc<dyn UserPrompter>,
        pending_self_payment: PendingSelfPayment,
        chain: Arc<ChainStatus>,
        coin: CoinKind,
        denomination: Denomination,
    ) -> Arc<Self> {
        Arc::new(Self {
            wallet,
            listener,
            prompter,
            pending_self_payment,
            chain,
            notified_tx_hashes: Mutex::new(HashSet::new()),
            coin,
            denomination,
        })
    }

    /// Subscribe this coordinator's handlers on the bus.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        for kind in [
            EventKind::NewUnconfirmedTransaction,
            EventKind::NewBlock,
            EventKind::NewAddressGenerated,
        ] {
            bus.subscribe(Self::OWNER, kind, self.clone());
        }
    }

    async fn on_new_transaction(
        &self,
        payload: &serde_json::Value,
        bus: &EventBus,
    ) -> Result<(), SyncError> {
        // Parse off the publishing task.
        let payload = payload.clone();
        let record: TxRecord = tokio::task::spawn_blocking(move || {
            serde_json::from_value::<TxRecord>(payload)
        })
        .await
        .map_err(|e| SyncError::Parse(format!("transaction parse task failed: {e}")))??;

        if self.pending_self_payment.matches(&record.hash) {
            // Receiving a stealth payment from the same sending account: the
            // stealth path must complete it, since it has to generate the
            // private key and add the address before the coins are counted.
            debug!(
                "skipping {} here, pending self stealth payment resolves it",
                record.hash
            );
            return Ok(());
        }

        let incoming = self.wallet.apply_new_transaction(&record).await?;
        self.notify_applied(&record.hash, incoming, bus).await;
        Ok(())
    }

    /// Publish UI-facing events for an applied transaction, at most once per
    /// transaction hash.
    async fn notify_applied(
        &self,
        tx_hash: &str,
        incoming: Option<IncomingFunds>,
        bus: &EventBus,
    ) {
        {
            let mut notified = self.notified_tx_hashes.lock().unwrap();
            if !notified.insert(tx_hash.to_string()) {
                debug!("already notified for {}", tx_hash);
                return;
            }
        }

        bus.publish(&WalletEvent::NewUnconfirmedTransactionApplied {
            tx_hash: tx_hash.to_string(),
        })
        .await;

        if let Some(funds) = incoming {
            bus.publish(&WalletEvent::PaymentReceived).await;
            self.schedule_received_prompt(funds);
        }
    }

    fn schedule_received_prompt(&self, funds: IncomingFunds) {
        let message = format!(
            "{} received {}",
            funds.to_label,
            format_with_code(funds.amount, self.coin, self.denomination)
        );
        let prompter = self.prompter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RECEIVED_PAYMENT_PROMPT_DELAY).await;
            prompter.success(&message, "");
        });
    }

    async fn on_new_block(&self, height: u64, bus: &EventBus) -> Result<(), SyncError> {
        if !self.chain.advance(height) {
            warn!(
                "ignoring stale block height {} (current {})",
                height,
                self.chain.height()
            );
            return Ok(());
        }
        debug!("chain tip advanced to {}", height);
        bus.publish(&WalletEvent::BlockHeightUpdated { height }).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventHandler for WalletSyncCoordinator {
    async fn handle(&self, event: &WalletEvent, bus: &EventBus) -> Result<(), SyncError> {
        match event {
            WalletEvent::NewUnconfirmedTransaction { payload } => {
                self.on_new_transaction(payload, bus).await
            }
            WalletEvent::NewBlock { height } => self.on_new_block(*height, bus).await,
            WalletEvent::NewAddressGenerated { address } => {
                self.listener.listen_to_address(address).await
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "WalletSyncCoordinator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Amount;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct MockWallet {
        applied: Mutex<Vec<String>>,
        /// Incoming funds reported for the next applied transaction.
        incoming: Mutex<Option<IncomingFunds>>,
    }

    #[async_trait::async_trait]
    impl WalletModel for MockWallet {
        async fn apply_new_transaction(
            &self,
            record: &TxRecord,
        ) -> Result<Option<IncomingFunds>, SyncError> {
            self.applied.lock().unwrap().push(record.hash.clone());
            Ok(self.incoming.lock().unwrap().clone())
        }

        async fn apply_stealth_payment(
            &self,
            _stealth_address: &str,
            _payment_address: &str,
            _txid: &str,
            _time: u64,
            _record: &TxRecord,
        ) -> Result<(), SyncError> {
            Ok(())
        }

        async fn respond_to_challenge(&self, _challenge: &str) -> Result<(), SyncError> {
            Ok(())
        }

        async fn confirm_subscription(&self, _address: &str) -> Result<(), SyncError> {
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
    struct MockListener {
        watched: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl TransactionListener for MockListener {
        async fn listen_to_address(&self, address: &str) -> Result<(), SyncError> {
            self.watched.lock().unwrap().push(address.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockPrompter {
        messages: Mutex<Vec<String>>,
    }

    impl UserPrompter for MockPrompter {
        fn success(&self, title: &str, _message: &str) {
            self.messages.lock().unwrap().push(title.to_string());
        }

        fn error(&self, title: &str, _message: &str) {
            self.messages.lock().unwrap().push(format!("error: {title}"));
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

    struct Fixture {
        bus: EventBus,
        wallet: Arc<MockWallet>,
        listener: Arc<MockListener>,
        prompter: Arc<MockPrompter>,
        pending: PendingSelfPayment,
        chain: Arc<ChainStatus>,
    }

    fn setup() -> Fixture {
        let bus = EventBus::new();
        let wallet = Arc::new(MockWallet::default());
        let listener = Arc::new(MockListener::default());
        let prompter = Arc::new(MockPrompter::default());
        let pending = PendingSelfPayment::new();
        let chain = Arc::new(ChainStatus::new());
        let coordinator = WalletSyncCoordinator::new(
            wallet.clone(),
            listener.clone(),
            prompter.clone(),
            pending.clone(),
            chain.clone(),
            CoinKind::Bitcoin,
            Denomination::Coin,
        );
        coordinator.register(&bus);
        Fixture {
            bus,
            wallet,
            listener,
            prompter,
            pending,
            chain,
        }
    }

    fn tx_event(hash: &str) -> WalletEvent {
        WalletEvent::NewUnconfirmedTransaction {
            payload: serde_json::json!({ "hash": hash, "time": 1_700_000_000u64 }),
        }
    }

    #[tokio::test]
    async fn applies_new_transactions_to_the_wallet_model() {
        let f = setup();
        let applied = Arc::new(KindCounter {
            kind: EventKind::NewUnconfirmedTransactionApplied,
            count: AtomicU32::new(0),
        });
        f.bus.subscribe(
            "test",
            EventKind::NewUnconfirmedTransactionApplied,
            applied.clone(),
        );

        f.bus.publish(&tx_event("aa11")).await;

        assert_eq!(*f.wallet.applied.lock().unwrap(), vec!["aa11"]);
        assert_eq!(applied.count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn pending_self_stealth_payment_is_skipped_here() {
        let f = setup();
        f.pending.set("bb22");

        f.bus.publish(&tx_event("bb22")).await;
        assert!(f.wallet.applied.lock().unwrap().is_empty());

        // Other transactions still flow through.
        f.bus.publish(&tx_event("cc33")).await;
        assert_eq!(*f.wallet.applied.lock().unwrap(), vec!["cc33"]);
    }

    #[tokio::test]
    async fn ui_events_fire_once_per_transaction_hash() {
        let f = setup();
        let applied = Arc::new(KindCounter {
            kind: EventKind::NewUnconfirmedTransactionApplied,
            count: AtomicU32::new(0),
        });
        f.bus.subscribe(
            "test",
            EventKind::NewUnconfirmedTransactionApplied,
            applied.clone(),
        );

        f.bus.publish(&tx_event("dd44")).await;
        f.bus.publish(&tx_event("dd44")).await;

        // The model sees both applications (its own idempotence contract);
        // the UI is only told once.
        assert_eq!(f.wallet.applied.lock().unwrap().len(), 2);
        assert_eq!(applied.count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn incoming_funds_raise_payment_received_and_a_delayed_prompt() {
        let f = setup();
        *f.wallet.incoming.lock().unwrap() = Some(IncomingFunds {
            amount: Amount::from_sats(100_000_000),
            to_label: "Checking".to_string(),
        });
        let received = Arc::new(KindCounter {
            kind: EventKind::PaymentReceived,
            count: AtomicU32::new(0),
        });
        f.bus
            .subscribe("test", EventKind::PaymentReceived, received.clone());

        f.bus.publish(&tx_event("ee55")).await;
        assert_eq!(received.count.load(Ordering::Relaxed), 1);
        assert!(f.prompter.messages.lock().unwrap().is_empty());

        // Prompt fires after the short delay.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *f.prompter.messages.lock().unwrap(),
            vec!["Checking received 1.00000000 BTC"]
        );
    }

    #[tokio::test]
    async fn block_heights_are_monotonic() {
        let f = setup();
        let updated = Arc::new(KindCounter {
            kind: EventKind::BlockHeightUpdated,
            count: AtomicU32::new(0),
        });
        f.bus
            .subscribe("test", EventKind::BlockHeightUpdated, updated.clone());

        f.bus.publish(&WalletEvent::NewBlock { height: 500 }).await;
        f.bus.publish(&WalletEvent::NewBlock { height: 499 }).await;
        f.bus.publish(&WalletEvent::NewBlock { height: 500 }).await;
        f.bus.publish(&WalletEvent::NewBlock { height: 501 }).await;

        assert_eq!(f.chain.height(), 501);
        assert_eq!(updated.count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn generated_addresses_are_handed_to_the_listener() {
        let f = setup();

        f.bus
            .publish(&WalletEvent::NewAddressGenerated {
                address: "1NewAddr".to_string(),
            })
            .await;

        assert_eq!(*f.listener.watched.lock().unwrap(), vec!["1NewAddr"]);
    }

    #[tokio::test]
    async fn malformed_payloads_do_not_reach_the_model() {
        let f = setup();

        f.bus
            .publish(&WalletEvent::NewUnconfirmedTransaction {
                payload: serde_json::json!({ "no_hash": true }),
            })
            .await;

        assert!(f.wallet.applied.lock().unwrap().is_empty());
    }
}
