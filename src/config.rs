/// Bootstrap configuration from environment variables
///
/// Controls where parameter files live and come from, which wallet the engine
/// opens, and the timing of sync polling and shutdown.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_SERVER;

/// Base URL parameter files are downloaded from
pub const DEFAULT_PARAMS_URL: &str = "https://params.zecwallet.co/params";

/// Names of the parameter files the engine needs, in download order
pub const PARAMETER_FILE_NAMES: [&str; 2] = ["sapling-output.params", "sapling-spend.params"];

/// A parameter file to fetch when it is missing locally
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterSource {
    pub name: String,
    pub url: String,
}

impl ParameterSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// The standard parameter set served from `base_url`
    pub fn standard_set(base_url: &str) -> Vec<Self> {
        let base = base_url.trim_end_matches('/');
        PARAMETER_FILE_NAMES
            .iter()
            .map(|name| Self::new(*name, format!("{}/{}", base, name)))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    /// Wallet identifier handed to the engine's existence check
    pub wallet_id: String,
    /// Parameter files to ensure, in order
    pub parameter_files: Vec<ParameterSource>,
    /// Overrides the platform parameter directory
    pub params_dir: Option<PathBuf>,
    /// Delay between sync status queries
    pub poll_interval: Duration,
    /// Minimum delay between download progress updates
    pub progress_interval: Duration,
    /// Wait between releasing the engine and acknowledging a quit
    pub shutdown_grace: Duration,
    /// Location of the JSON preference file
    pub config_path: PathBuf,
    /// Server used when no preference is stored
    pub default_server: String,
}

impl BootstrapConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ZCASH_PARAMS_DIR`: parameter directory (defaults to the platform location)
    /// - `ZCASH_PARAMS_URL`: base URL for parameter downloads
    /// - `WALLET_ID`: wallet identifier (default "main")
    /// - `SYNC_POLL_INTERVAL_MS`: sync status poll interval (default 1000)
    /// - `SHUTDOWN_GRACE_MS`: delay before acknowledging a quit (default 100)
    /// - `LIGHTD_CONFIG_PATH`: preference file location
    /// - `LIGHTD_DEFAULT_SERVER`: server used when none is stored, and the
    ///   replacement for legacy servers
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let params_dir = env::var("ZCASH_PARAMS_DIR").ok().map(PathBuf::from);
        if let Some(ref dir) = params_dir {
            log::info!("📁 Parameter directory override: {}", dir.display());
        }

        let parameter_files = match env::var("ZCASH_PARAMS_URL") {
            Ok(base) if !base.trim().is_empty() => {
                log::info!("📡 Parameter source: {}", base);
                ParameterSource::standard_set(&base)
            }
            _ => defaults.parameter_files.clone(),
        };

        let wallet_id = env::var("WALLET_ID").unwrap_or_else(|_| defaults.wallet_id.clone());

        let poll_interval = millis_from_env("SYNC_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval);
        let shutdown_grace = millis_from_env("SHUTDOWN_GRACE_MS").unwrap_or(defaults.shutdown_grace);

        let config_path = env::var("LIGHTD_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.config_path.clone());
        log::info!("🔧 Preference file: {}", config_path.display());

        let default_server = match env::var("LIGHTD_DEFAULT_SERVER") {
            Ok(server) if !server.trim().is_empty() => {
                log::info!("🌐 Default server: {}", server.trim());
                server.trim().to_string()
            }
            _ => defaults.default_server.clone(),
        };

        Self {
            wallet_id,
            parameter_files,
            params_dir,
            poll_interval,
            shutdown_grace,
            config_path,
            default_server,
            ..defaults
        }
    }
}

fn millis_from_env(key: &str) -> Option<Duration> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            log::warn!("⚠️  Ignoring {}={}: not a number of milliseconds", key, raw);
            None
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zercwallet-lite")
        .join("config.json")
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            wallet_id: "main".to_string(),
            parameter_files: ParameterSource::standard_set(DEFAULT_PARAMS_URL),
            params_dir: None,
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(100),
            config_path: default_config_path(),
            default_server: DEFAULT_SERVER.to_string(),
        }
    }
}
