//! Server preference storage
//!
//! - `ConfigStore` capability (injected into the session)
//! - JSON file and in-memory implementations
//! - Legacy server upgrade and server switching

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::ConfigError;

/// Key under which the chosen server URI is stored
pub const SERVER_URI_KEY: &str = "lightd/serveruri";

// Upstream Zecwallet endpoints. A fork running its own lightwalletd sets
// LIGHTD_DEFAULT_SERVER; legacy entries are always rewritten to that default.

/// Current default lightwalletd server
pub const DEFAULT_SERVER: &str = "https://lwdv3.zecwallet.co";

/// Servers spoken to by older protocol versions; rewritten to the default on read
pub const LEGACY_SERVERS: [&str; 2] = [
    "https://lightwalletd.zecwallet.co:1443",
    "https://lightd-main.zecwallet.co:443",
];

/// Simple key/value persistence for user preferences
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// Preferences persisted as a flat JSON object on disk
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write beside the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store, for tests and hosts without persistent preferences
#[derive(Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let values = self.values.lock().map_err(|_| ConfigError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = self.values.lock().map_err(|_| ConfigError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read the preferred server, upgrading legacy identifiers to the current default
pub fn load_server_url(store: &dyn ConfigStore, default_server: &str) -> Result<String, ConfigError> {
    let stored = store.get(SERVER_URI_KEY)?;
    let server = match stored {
        Some(uri) if LEGACY_SERVERS.contains(&uri.as_str()) => {
            log::info!("Upgrading legacy server {} to {}", uri, default_server);
            default_server.to_string()
        }
        Some(uri) if !uri.trim().is_empty() => uri,
        _ => default_server.to_string(),
    };
    Ok(server)
}

/// An entry of the server selection list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownServer {
    pub name: &'static str,
    pub uri: String,
}

/// Servers offered for selection, led by `default_server`
pub fn known_servers(default_server: &str) -> Vec<KnownServer> {
    vec![KnownServer {
        name: "Zercwallet (Default)",
        uri: default_server.to_string(),
    }]
}

/// Server picked by the user when switching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerChoice {
    Known(String),
    Custom(String),
}

impl ServerChoice {
    fn uri(&self) -> &str {
        match self {
            Self::Known(uri) | Self::Custom(uri) => uri.trim(),
        }
    }
}

/// Persist a new server preference; takes effect on the next start
pub fn switch_server(store: &dyn ConfigStore, choice: &ServerChoice) -> Result<String, ConfigError> {
    let uri = choice.uri();
    if uri.is_empty() {
        return Err(ConfigError::InvalidServerUrl("empty server URI".to_string()));
    }
    reqwest::Url::parse(uri).map_err(|e| ConfigError::InvalidServerUrl(format!("{}: {}", uri, e)))?;

    store.set(SERVER_URI_KEY, uri)?;
    log::info!("Server preference switched to {}", uri);
    Ok(uri.to_string())
}
