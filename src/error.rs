//! Error types for bootstrap operations
//!
//! Every failure a component can produce is caught at its boundary and turned
//! into a session-level status message; these types carry the detail.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while acquiring a parameter file
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// No platform directory could be resolved for parameter storage
    #[error("Could not locate a directory for parameter files")]
    NoParamsDir,

    #[error("Failed to create parameter directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transfer of a single file failed; the partial file has been removed
    #[error("Error downloading {name}. The error was: {cause}")]
    Download {
        name: String,
        #[source]
        cause: TransferError,
    },
}

/// Low-level cause of a failed parameter download
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Response status was {0}")]
    Status(u16),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Configuration store failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    #[error("Config store lock poisoned")]
    Poisoned,
}

/// A fault raised by the wallet engine itself (as opposed to an error-shaped response)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Session-level error taxonomy
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Error Initializing Lightclient\n{0}")]
    Initialization(String),

    #[error("{0}")]
    WalletCreation(String),

    #[error("{0}")]
    WalletRestore(String),

    #[error("{0}")]
    Sync(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The host is quitting and the engine has been, or is being, released
    #[error("Shutdown in progress")]
    ShuttingDown,

    /// The presentation layer asked for an action the current phase does not allow
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },
}

/// Discriminant of [`BootstrapError`], stored alongside the message in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Provision,
    Initialization,
    WalletCreation,
    WalletRestore,
    Sync,
    Config,
    ShuttingDown,
    InvalidTransition,
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provision(_) => ErrorKind::Provision,
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::WalletCreation(_) => ErrorKind::WalletCreation,
            Self::WalletRestore(_) => ErrorKind::WalletRestore,
            Self::Sync(_) => ErrorKind::Sync,
            Self::Config(_) => ErrorKind::Config,
            Self::ShuttingDown => ErrorKind::ShuttingDown,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    /// Whether the session must halt on this error, as opposed to staying in place for a retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Provision | ErrorKind::Initialization | ErrorKind::Sync
        )
    }

    pub fn invalid_transition(action: &'static str, phase: &'static str) -> Self {
        Self::InvalidTransition { action, phase }
    }
}

/// Cloneable error payload surfaced in the session snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BootstrapError> for SessionError {
    fn from(err: &BootstrapError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
