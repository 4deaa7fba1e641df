//! Wallet engine capability
//!
//! The engine speaks in raw strings: `"OK"`, `"Error..."`, or serialized JSON.
//! [`EngineClient`] parses each response exactly once into a tagged result so
//! the orchestration never inspects string prefixes itself.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BootstrapError, EngineError};

/// Success sentinel returned when an existing wallet opens cleanly
pub const OK_SENTINEL: &str = "OK";

/// Prefix the engine uses for error-shaped responses
pub const ERROR_PREFIX: &str = "Error";

/// Native engine calls consumed by the bootstrap
///
/// `Err` means the call itself faulted. Error-shaped *responses* come back as `Ok`
/// strings and are classified by [`EngineClient`].
pub trait WalletEngine: Send + Sync {
    fn wallet_exists(&self, wallet_id: &str) -> bool;
    fn initialize_existing(&self, server_url: &str) -> Result<String, EngineError>;
    fn initialize_new(&self, server_url: &str) -> Result<String, EngineError>;
    fn initialize_from_phrase(
        &self,
        server_url: &str,
        seed: &str,
        birthday: u64,
        allow_overwrite: bool,
    ) -> Result<String, EngineError>;
    /// Kicks off a scan that runs inside the engine; returns immediately
    fn start_sync(&self) -> Result<(), EngineError>;
    fn sync_status(&self) -> Result<String, EngineError>;
    fn save(&self) -> Result<(), EngineError>;
    fn deinitialize(&self) -> Result<(), EngineError>;
    fn info_snapshot(&self) -> Result<WalletInfo, EngineError>;
}

/// Snapshot of wallet/chain info handed to the application once sync completes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub latest_block: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub currency_name: String,
    #[serde(default)]
    pub verification_progress: f64,
}

/// Payload of a successful `initialize_new`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewWallet {
    pub seed: String,
    #[serde(default)]
    pub birthday: Option<u64>,
}

/// One sync-status poll result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SyncStatus {
    #[serde(deserialize_with = "bool_or_string")]
    pub syncing: bool,
    #[serde(default)]
    pub synced_blocks: u64,
    #[serde(default)]
    pub total_blocks: u64,
}

impl SyncStatus {
    pub fn progress_message(&self) -> String {
        format!("Syncing {} / {}", self.synced_blocks, self.total_blocks)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Text(String),
}

// Engines report `syncing` as either a JSON bool or the text "true"/"false"
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(value) => Ok(value),
        BoolOrString::Text(text) => match text.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected \"true\" or \"false\", got {:?}",
                other
            ))),
        },
    }
}

fn is_error_shaped(raw: &str) -> bool {
    raw.starts_with(ERROR_PREFIX)
}

/// Classify a raw sync-status response
pub fn parse_sync_status(raw: &str) -> Result<SyncStatus, BootstrapError> {
    if is_error_shaped(raw) {
        return Err(BootstrapError::Sync(raw.to_string()));
    }
    let status: SyncStatus = serde_json::from_str(raw)
        .map_err(|e| BootstrapError::Sync(format!("Error: malformed sync status {:?}: {}", raw, e)))?;

    if status.syncing && status.synced_blocks > status.total_blocks {
        return Err(BootstrapError::Sync(format!(
            "Error: malformed sync status: synced {} exceeds total {}",
            status.synced_blocks, status.total_blocks
        )));
    }
    Ok(status)
}

/// Classify a raw `initialize_new` response
pub fn parse_new_wallet(raw: &str) -> Result<NewWallet, BootstrapError> {
    if is_error_shaped(raw) {
        return Err(BootstrapError::WalletCreation(raw.to_string()));
    }
    let wallet: NewWallet = serde_json::from_str(raw).map_err(|e| {
        BootstrapError::WalletCreation(format!("Error: unreadable wallet creation response: {}", e))
    })?;
    if wallet.seed.trim().is_empty() {
        return Err(BootstrapError::WalletCreation(
            "Error: engine returned an empty seed phrase".to_string(),
        ));
    }
    Ok(wallet)
}

/// Typed wrapper around a shared engine handle
#[derive(Clone)]
pub struct EngineClient {
    engine: Arc<dyn WalletEngine>,
}

impl EngineClient {
    pub fn new(engine: Arc<dyn WalletEngine>) -> Self {
        Self { engine }
    }

    pub fn wallet_exists(&self, wallet_id: &str) -> bool {
        self.engine.wallet_exists(wallet_id)
    }

    /// Open the wallet already on disk; only the exact `"OK"` sentinel counts as success
    pub fn open_existing(&self, server_url: &str) -> Result<(), BootstrapError> {
        let raw = self
            .engine
            .initialize_existing(server_url)
            .map_err(|e| BootstrapError::Initialization(e.to_string()))?;
        log::info!("Initialization: {}", raw);
        if raw == OK_SENTINEL {
            Ok(())
        } else {
            Err(BootstrapError::Initialization(raw))
        }
    }

    pub fn create(&self, server_url: &str) -> Result<NewWallet, BootstrapError> {
        let raw = self
            .engine
            .initialize_new(server_url)
            .map_err(|e| BootstrapError::WalletCreation(format!("Error: {}", e)))?;
        parse_new_wallet(&raw)
    }

    /// Restore from a seed phrase, always overwriting any local wallet file
    pub fn restore(&self, server_url: &str, seed: &str, birthday: u64) -> Result<(), BootstrapError> {
        let raw = self
            .engine
            .initialize_from_phrase(server_url, seed, birthday, true)
            .map_err(|e| BootstrapError::WalletRestore(format!("Error: {}", e)))?;
        if is_error_shaped(&raw) {
            return Err(BootstrapError::WalletRestore(raw));
        }
        Ok(())
    }

    pub fn start_sync(&self) -> Result<(), BootstrapError> {
        self.engine
            .start_sync()
            .map_err(|e| BootstrapError::Sync(format!("Error: {}", e)))
    }

    pub fn sync_status(&self) -> Result<SyncStatus, BootstrapError> {
        let raw = self
            .engine
            .sync_status()
            .map_err(|e| BootstrapError::Sync(format!("Error: {}", e)))?;
        log::debug!("Sync status: {}", raw);
        parse_sync_status(&raw)
    }

    pub fn save(&self) -> Result<(), EngineError> {
        self.engine.save()
    }

    pub fn deinitialize(&self) -> Result<(), EngineError> {
        self.engine.deinitialize()
    }

    pub fn info_snapshot(&self) -> Result<WalletInfo, EngineError> {
        self.engine.info_snapshot()
    }
}
