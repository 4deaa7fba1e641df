//! Lightwallet Bootstrap: from first launch to a synced wallet
//!
//! This crate sequences everything a light wallet client has to do before its
//! main screen can be shown: fetch the proving parameters, open, create or
//! restore the wallet against a lightwalletd server, and follow the initial
//! sync until it completes.
//!
//! # Architecture
//!
//! - **ParameterProvisioner**: Downloads missing parameter files with progress
//! - **WalletLifecycleController**: Opens an existing wallet or creates/restores one
//! - **SyncStatusPoller**: Polls engine sync progress until it finishes or fails
//! - **BootstrapSession**: Phase state machine and observable status
//! - **ShutdownCoordinator**: Saves the wallet before acknowledging a host quit
//!
//! The wallet engine, preference storage and host lifecycle are collaborators
//! supplied by the application through [`WalletEngine`], [`ConfigStore`] and
//! [`HostLink`].
//!
//! # Example
//!
//! ```ignore
//! use lightwallet_bootstrap::{BootstrapConfig, BootstrapSession, FileConfigStore, StartMode};
//!
//! let config = BootstrapConfig::from_env();
//! let store = Arc::new(FileConfigStore::new(config.config_path.clone()));
//! let mut session = BootstrapSession::new(config, engine, store);
//! session.register_shutdown(host_link)?;
//!
//! session.start(StartMode::Fresh).await?;
//! let snapshot = session.wait_until_settled().await;
//! ```

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod poller;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod wallet;

// Re-exports for convenience
pub use config::{BootstrapConfig, ParameterSource};
pub use engine::{EngineClient, NewWallet, SyncStatus, WalletEngine, WalletInfo};
pub use error::{BootstrapError, ConfigError, EngineError, ErrorKind, ProvisionError, SessionError, TransferError};
pub use params::{locate_params_dir, ParameterFile, ParameterProvisioner};
pub use poller::{PollerStart, StopSignal, SyncKickoff, SyncObserver, SyncStatusPoller};
pub use session::{
    BootstrapSession, ConnectionConfig, NewWalletScreen, Phase, ReadyHandoff, RestoreForm,
    SessionSnapshot, StartMode, StatusReporter,
};
pub use shutdown::{host_link, HostEndpoint, HostLink, HostSignal, ShutdownCoordinator};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, ServerChoice};
pub use wallet::{RestoreRequest, WalletLifecycleController, WalletOutcome};

// Common result type
pub type Result<T> = std::result::Result<T, BootstrapError>;
