//! Encrypted wallet-JSON persistence.
//!
//! The wallet payload is serialized to its canonical JSON form, encrypted
//! under a key derived from the wallet's JSON passphrase, and written to
//! local storage with a mirror copy in the cloud-backup location. The
//! container is hex-armored with the AES-GCM nonce prepended, so a saved
//! wallet is a single printable string.

use crate::wallet::services::WalletStore;
use crate::wallet::types::SyncError;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Utc};
use rand::Rng;
use sha3::{Digest, Sha3_256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

const NONCE_LEN: usize = 12;

const WALLET_FILENAME: &str = "wallet.json.enc";
const METADATA_FILENAME: &str = "wallet.json.meta.json";

fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha3_256::digest(passphrase.as_bytes()).into()
}

/// Encrypt a canonical wallet JSON string into a hex-armored container.
pub fn encrypt_wallet_json(plaintext: &str, passphrase: &str) -> Result<String, SyncError> {
    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|_| SyncError::Persistence("failed to encrypt wallet payload".to_string()))?;

    let mut container = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    container.extend_from_slice(&nonce_bytes);
    container.extend_from_slice(&ciphertext);
    Ok(hex::encode(container))
}

/// Decrypt a hex-armored container back into the wallet JSON string.
pub fn decrypt_wallet_json(container: &str, passphrase: &str) -> Result<String, SyncError> {
    let bytes = hex::decode(container)
        .map_err(|e| SyncError::Persistence(format!("wallet container is not valid hex: {e}")))?;
    if bytes.len() <= NONCE_LEN {
        return Err(SyncError::Persistence(
            "wallet container is too short".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            SyncError::Persistence("failed to decrypt wallet payload (wrong passphrase?)".to_string())
        })?;

    String::from_utf8(plaintext)
        .map_err(|e| SyncError::Persistence(format!("decrypted wallet payload is not UTF-8: {e}")))
}

/// File-backed wallet store: encrypted container in the data directory plus
/// an optional cloud-backup mirror.
pub struct FileWalletStore {
    local_dir: PathBuf,
    cloud_dir: Option<PathBuf>,
    passphrase: Mutex<Option<String>>,
}

impl FileWalletStore {
    pub fn new(local_dir: PathBuf, cloud_dir: Option<PathBuf>) -> Self {
        Self {
            local_dir,
            cloud_dir,
            passphrase: Mutex::new(None),
        }
    }

    /// Unlock the store with the decrypted wallet-JSON passphrase.
    pub fn set_passphrase(&self, passphrase: impl Into<String>) {
        *self.passphrase.lock().unwrap() = Some(passphrase.into());
    }

    fn wallet_filename(&self) -> PathBuf {
        self.local_dir.join(WALLET_FILENAME)
    }

    fn metadata_filename(&self) -> PathBuf {
        self.local_dir.join(METADATA_FILENAME)
    }

    /// Load and decrypt the locally stored wallet JSON, if present.
    pub async fn load_wallet_json(&self) -> Result<Option<String>, SyncError> {
        let filename = self.wallet_filename();
        if !filename.exists() {
            return Ok(None);
        }
        let container = tokio::fs::read_to_string(&filename).await?;
        let passphrase = self
            .passphrase
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Persistence("wallet store is locked".to_string()))?;
        let json = decrypt_wallet_json(container.trim(), &passphrase)?;
        info!("Loaded wallet payload from {:?}", filename);
        Ok(Some(json))
    }

    async fn write_container(&self, ciphertext: &str, when: DateTime<Utc>) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.local_dir).await?;

        // Write through a temp file so a crash mid-write never clobbers the
        // previous good container.
        let filename = self.wallet_filename();
        let temp = filename.with_extension("tmp");
        tokio::fs::write(&temp, ciphertext).await?;
        tokio::fs::rename(&temp, &filename).await?;

        let metadata = serde_json::json!({
            "saved_at": when.to_rfc3339(),
        });
        tokio::fs::write(
            self.metadata_filename(),
            serde_json::to_string_pretty(&metadata)?,
        )
        .await?;

        info!("Saved wallet payload to {:?}", filename);

        if let Some(cloud_dir) = &self.cloud_dir {
            tokio::fs::create_dir_all(cloud_dir).await?;
            tokio::fs::write(cloud_dir.join(WALLET_FILENAME), ciphertext).await?;
            info!("Mirrored wallet payload to {:?}", cloud_dir);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl WalletStore for FileWalletStore {
    async fn save_wallet_json(&self, ciphertext: &str, when: DateTime<Utc>) -> bool {
        match self.write_container(ciphertext, when).await {
            Ok(()) => true,
            Err(e) => {
                error!("failed to save wallet payload: {}", e);
                false
            }
        }
    }

    fn decrypted_passphrase(&self) -> Option<String> {
        let passphrase = self.passphrase.lock().unwrap().clone();
        if passphrase.is_none() {
            warn!("wallet passphrase requested while store is locked");
        }
        passphrase
    }
}

/// Read a previously saved metadata file's timestamp, if any.
pub async fn saved_at(data_dir: &Path) -> Option<DateTime<Utc>> {
    let content = tokio::fs::read_to_string(data_dir.join(METADATA_FILENAME))
        .await
        .ok()?;
    let metadata: serde_json::Value = serde_json::from_str(&content).ok()?;
    let raw = metadata.get("saved_at")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
