/// Wallet lifecycle operations
///
/// Decides whether a wallet already exists and drives opening, creating, or
/// restoring it against the chosen server.
use crate::engine::{EngineClient, NewWallet};
use crate::error::BootstrapError;

/// What `resolve` found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOutcome {
    /// A wallet existed and opened cleanly; ready to sync
    ExistingInitialized,
    /// No wallet yet; the user must create or restore one
    NeedsUserChoice,
}

/// Seed phrase and birthday entered by the user for restoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub seed: String,
    /// Chain height to scan from; 0 scans all history
    pub birthday: u64,
}

impl RestoreRequest {
    /// Build a request from raw form input; a blank birthday means 0
    pub fn from_input(seed: &str, birthday: &str) -> Result<Self, BootstrapError> {
        let seed = seed.split_whitespace().collect::<Vec<_>>().join(" ");
        if seed.is_empty() {
            return Err(BootstrapError::WalletRestore(
                "Error: please enter your seed phrase".to_string(),
            ));
        }

        let birthday = birthday.trim();
        let birthday = if birthday.is_empty() {
            0
        } else {
            birthday.parse::<u64>().map_err(|_| {
                BootstrapError::WalletRestore(format!(
                    "Error: wallet birthday must be a block height, got {:?}",
                    birthday
                ))
            })?
        };

        Ok(Self { seed, birthday })
    }
}

pub struct WalletLifecycleController {
    engine: EngineClient,
    wallet_id: String,
}

impl WalletLifecycleController {
    pub fn new(engine: EngineClient, wallet_id: impl Into<String>) -> Self {
        Self {
            engine,
            wallet_id: wallet_id.into(),
        }
    }

    /// Open the existing wallet, or report that the user has to pick one
    pub fn resolve(&self, server_url: &str) -> Result<WalletOutcome, BootstrapError> {
        if !self.engine.wallet_exists(&self.wallet_id) {
            log::info!("No wallet '{}' found, asking user to create or restore", self.wallet_id);
            return Ok(WalletOutcome::NeedsUserChoice);
        }

        log::info!("Opening existing wallet '{}' against {}", self.wallet_id, server_url);
        self.engine.open_existing(server_url).map_err(|e| {
            log::error!("Error initializing: {}", e);
            e
        })?;
        Ok(WalletOutcome::ExistingInitialized)
    }

    pub fn create(&self, server_url: &str) -> Result<NewWallet, BootstrapError> {
        log::info!("Creating new wallet against {}", server_url);
        let wallet = self.engine.create(server_url)?;
        log::info!("New wallet created (birthday {:?})", wallet.birthday);
        Ok(wallet)
    }

    /// Restore from seed; replaces any local wallet and rescans from the birthday
    pub fn restore(&self, server_url: &str, request: &RestoreRequest) -> Result<(), BootstrapError> {
        log::info!(
            "Restoring wallet from seed phrase with birthday {} against {}",
            request.birthday,
            server_url
        );
        self.engine.restore(server_url, &request.seed, request.birthday)
    }
}
