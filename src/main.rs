use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use stealth_wallet_sync::config::WalletSyncConfig;
use stealth_wallet_sync::currency::CurrencyCatalog;
use stealth_wallet_sync::wallet::coordinator::{
    ChainStatus, EventBus, PendingSelfPayment, PersistenceDebouncer, StealthPaymentCoordinator,
    WalletEvent, WalletSyncCoordinator,
};
use stealth_wallet_sync::wallet::services::{
    StealthTransport, TransactionListener, TransactionSource, UserPrompter, WalletModel,
};
use stealth_wallet_sync::wallet::types::{IncomingFunds, SyncError, TxRecord};
use stealth_wallet_sync::wallet::vault::FileWalletStore;

/// Minimal in-memory wallet model standing in for the real wallet layer, so
/// the coordination core can be driven end to end from the command line.
struct DemoWallet {
    payload: std::sync::Mutex<serde_json::Value>,
}

impl DemoWallet {
    fn new() -> Self {
        Self {
            payload: std::sync::Mutex::new(serde_json::json!({
                "version": 3,
                "accounts": [{ "label": "Account 1", "transactions": [] }],
            })),
        }
    }
}

#[async_trait::async_trait]
impl WalletModel for DemoWallet {
    async fn apply_new_transaction(
        &self,
        record: &TxRecord,
    ) -> Result<Option<IncomingFunds>, SyncError> {
        info!("wallet model applying transaction {}", record.hash);
        let received: u64 = record.outputs.iter().filter_map(|o| o.value).sum();
        if received > 0 {
            Ok(Some(IncomingFunds {
                amount: stealth_wallet_sync::currency::Amount::from_sats(received),
                to_label: "Account 1".to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn apply_stealth_payment(
        &self,
        stealth_address: &str,
        _payment_address: &str,
        txid: &str,
        _time: u64,
        _record: &TxRecord,
    ) -> Result<(), SyncError> {
        info!(
            "wallet model applying stealth payment {} for {}",
            txid, stealth_address
        );
        Ok(())
    }

    async fn respond_to_challenge(&self, challenge: &str) -> Result<(), SyncError> {
        info!("signing stealth challenge {}", challenge);
        Ok(())
    }

    async fn confirm_subscription(&self, address: &str) -> Result<(), SyncError> {
        info!("stealth subscription confirmed for {}", address);
        Ok(())
    }

    fn wallets_json(&self) -> Option<serde_json::Value> {
        Some(self.payload.lock().unwrap().clone())
    }

    fn load_wallet_payload(
        &self,
        payload: serde_json::Value,
        _master_key_material: &str,
    ) -> Result<(), SyncError> {
        *self.payload.lock().unwrap() = payload;
        Ok(())
    }
}

struct LogPrompter;

impl UserPrompter for LogPrompter {
    fn success(&self, title: &str, message: &str) {
        info!("[prompt] {} {}", title, message);
    }

    fn error(&self, title: &str, message: &str) {
        error!("[prompt] {} {}", title, message);
    }
}

struct LogTransport;

#[async_trait::async_trait]
impl StealthTransport for LogTransport {
    async fn request_challenge(&self) -> Result<(), SyncError> {
        info!("requesting a new stealth challenge");
        Ok(())
    }
}

struct LogListener;

#[async_trait::async_trait]
impl TransactionListener for LogListener {
    async fn listen_to_address(&self, address: &str) -> Result<(), SyncError> {
        info!("watching address {}", address);
        Ok(())
    }
}

/// Canned transaction-detail source.
struct CannedSource;

#[async_trait::async_trait]
impl TransactionSource for CannedSource {
    async fn get_transaction(&self, txid: &str) -> Result<serde_json::Value, SyncError> {
        Ok(serde_json::json!({
            "hash": txid,
            "time": 1_700_000_000u64,
            "outputs": [{ "addr": "1DemoAddr", "value": 150_000_000u64 }],
        }))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Starting wallet sync service");

    let config = WalletSyncConfig::load(Path::new("."));

    // The catalogs back the persisted currency preference; a mismatch here
    // would mis-label money, so refuse to start.
    let catalog = match CurrencyCatalog::new() {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("invalid currency catalog: {}", e);
            return;
        }
    };
    match catalog.code(config.display.currency_index) {
        Ok(code) => info!("display currency: {}", code),
        Err(e) => {
            error!("invalid currency preference: {}", e);
            return;
        }
    }

    let store = Arc::new(FileWalletStore::new(
        config.storage.data_dir.clone().into(),
        config.storage.cloud_backup_dir.clone().map(Into::into),
    ));
    store.set_passphrase("demo passphrase");

    let wallet = Arc::new(DemoWallet::new());
    let prompter = Arc::new(LogPrompter);

    let bus = EventBus::new();

    let stealth = StealthPaymentCoordinator::new(
        wallet.clone(),
        Arc::new(CannedSource),
        Arc::new(LogTransport),
    );
    stealth.register(&bus);

    let sync = WalletSyncCoordinator::new(
        wallet.clone(),
        Arc::new(LogListener),
        prompter.clone(),
        PendingSelfPayment::new(),
        Arc::new(ChainStatus::new()),
        config.display.coin,
        config.display.denomination,
    );
    sync.register(&bus);

    let debouncer = PersistenceDebouncer::new(
        wallet.clone(),
        store.clone(),
        prompter.clone(),
        config.storage.save_delay(),
    );
    debouncer.set_enabled(config.storage.save_enabled);
    debouncer.register(&bus);

    info!("Coordinators registered, driving sample events");

    bus.publish(&WalletEvent::StealthChallengeReceived {
        challenge: "abc123".to_string(),
    })
    .await;
    bus.publish(&WalletEvent::StealthSubscriptionResult {
        address: "vJmwhHDemo".to_string(),
        success: true,
    })
    .await;
    bus.publish(&WalletEvent::NewBlock { height: 840_000 }).await;
    bus.publish(&WalletEvent::NewUnconfirmedTransaction {
        payload: serde_json::json!({
            "hash": "d6be34ccf0b0a9a7d13390e1e4bd0d2e9cda2b7a43df02ab76a7a6e14b40bf1a",
            "time": 1_700_000_000u64,
            "outputs": [{ "addr": "1DemoAddr", "value": 100_000_000u64 }],
        }),
    })
    .await;
    bus.publish(&WalletEvent::WalletPayloadUpdated).await;

    // Let the debounced save and the payment prompt fire.
    tokio::time::sleep(config.storage.save_delay() + std::time::Duration::from_secs(1)).await;

    debouncer.save_now().await;

    // Clean shutdown: drop every registration before exiting.
    bus.unsubscribe_all(StealthPaymentCoordinator::OWNER);
    bus.unsubscribe_all(WalletSyncCoordinator::OWNER);
    bus.unsubscribe_all(PersistenceDebouncer::OWNER);

    info!("Demo run complete");
}
