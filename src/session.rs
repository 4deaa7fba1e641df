//! Bootstrap session
//!
//! The session owns the observable state of the loading sequence and walks it
//! through the phases below. Components never hold session state; they write
//! back through a [`StatusReporter`], and every write goes through one watch
//! channel so observers always see a consistent snapshot.
//!
//! ```text
//! Init ─► ProvisioningParams ─► ResolvingWallet ─┬─► Syncing ─► Ready
//!   │                                             └─► AwaitingUserChoice ⇄ CreatingWallet | RestoringWallet
//!   └──(resume)──► Syncing                                 (both ─► Syncing)
//! ```
//!
//! `ErrorHalted` is reachable from provisioning, resolution, creation,
//! restoration and syncing; from there the user can switch servers or jump
//! straight to restoring from a seed phrase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::BootstrapConfig;
use crate::engine::{EngineClient, SyncStatus, WalletEngine, WalletInfo};
use crate::error::{BootstrapError, SessionError};
use crate::params::ParameterProvisioner;
use crate::poller::{PollerStart, StopSignal, SyncKickoff, SyncObserver, SyncStatusPoller};
use crate::shutdown::{HostLink, ShutdownCoordinator};
use crate::store::{self, ConfigStore, ServerChoice};
use crate::wallet::{RestoreRequest, WalletLifecycleController, WalletOutcome};

pub const INITIAL_STATUS: &str = "Loading...";
pub const SYNC_SETUP_STATUS: &str = "Setting things up...";
pub const RESTART_STATUS: &str = "Please restart to connect to the new server";

/// How the session begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Provision parameters, then open/create/restore the wallet
    Fresh,
    /// A rescan was already running; go straight to polling it
    Resume,
}

/// What the new-wallet screen shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewWalletScreen {
    /// Seed to write down; the user must confirm before syncing starts
    Created { seed: String },
    /// Creation failed; creating again is allowed
    Failed { error: String },
}

/// Restore form contents as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreForm {
    pub seed: String,
    pub birthday: String,
    pub error: Option<String>,
}

/// Connection settings the main application runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    pub server_url: String,
}

/// Everything handed to the main application once sync finishes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadyHandoff {
    pub connection: ConnectionConfig,
    pub info: WalletInfo,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Init,
    ProvisioningParams,
    ResolvingWallet,
    AwaitingUserChoice,
    CreatingWallet(NewWalletScreen),
    RestoringWallet(RestoreForm),
    Syncing,
    Ready(ReadyHandoff),
    ErrorHalted,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "initializing",
            Self::ProvisioningParams => "provisioning parameters",
            Self::ResolvingWallet => "resolving wallet",
            Self::AwaitingUserChoice => "awaiting wallet choice",
            Self::CreatingWallet(_) => "creating wallet",
            Self::RestoringWallet(_) => "restoring wallet",
            Self::Syncing => "syncing",
            Self::Ready(_) => "ready",
            Self::ErrorHalted => "halted on error",
        }
    }

    /// The session is waiting on the user or has finished
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::AwaitingUserChoice
                | Self::CreatingWallet(_)
                | Self::RestoringWallet(_)
                | Self::Ready(_)
                | Self::ErrorHalted
        )
    }
}

/// Observable session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub status_message: String,
    pub status_is_error: bool,
    pub server_url: Option<String>,
    pub last_error: Option<SessionError>,
}

impl SessionSnapshot {
    pub fn handoff(&self) -> Option<&ReadyHandoff> {
        match &self.phase {
            Phase::Ready(handoff) => Some(handoff),
            _ => None,
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Init,
            status_message: INITIAL_STATUS.to_string(),
            status_is_error: false,
            server_url: None,
            last_error: None,
        }
    }
}

/// Write-back contract for components reporting into the session
#[derive(Clone)]
pub struct StatusReporter {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.tx.borrow().phase.clone()
    }

    /// Informational status text
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.status_message = message;
            s.status_is_error = false;
        });
    }

    /// Error status text without touching the phase
    pub fn error_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.status_message = message;
            s.status_is_error = true;
        });
    }

    /// Move to `phase` with a fresh informational status
    pub fn enter(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        log::info!("Bootstrap phase: {}", phase.name());
        self.tx.send_modify(|s| {
            s.phase = phase;
            s.status_message = message;
            s.status_is_error = false;
            s.last_error = None;
        });
    }

    /// Move to `phase` and display `err`; used for retryable failures
    pub fn fail_in(&self, phase: Phase, err: &BootstrapError) {
        log::warn!("{} failed: {}", phase.name(), err);
        let payload = SessionError::from(err);
        self.tx.send_modify(|s| {
            s.phase = phase;
            s.status_message = payload.message.clone();
            s.status_is_error = true;
            s.last_error = Some(payload);
        });
    }

    /// Stop in `ErrorHalted` showing `err`
    pub fn halt(&self, err: &BootstrapError) {
        log::error!("Bootstrap halted: {}", err);
        let payload = SessionError::from(err);
        self.tx.send_modify(|s| {
            s.phase = Phase::ErrorHalted;
            s.status_message = payload.message.clone();
            s.status_is_error = true;
            s.last_error = Some(payload);
        });
    }

    fn set_server_url(&self, url: &str) {
        self.tx.send_modify(|s| s.server_url = Some(url.to_string()));
    }

    fn modify(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        self.tx.send_modify(f);
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies poll results to the session and performs the final handoff
struct SessionSyncObserver {
    engine: EngineClient,
    reporter: StatusReporter,
    server_url: String,
}

impl SessionSyncObserver {
    fn finalize(&self) {
        // Persist before anything is published so the just-synced state is on disk
        if let Err(e) = self.engine.save() {
            log::error!("Failed to save wallet after sync: {}", e);
        }

        let info = match self.engine.info_snapshot() {
            Ok(info) => info,
            Err(e) => {
                self.reporter
                    .halt(&BootstrapError::Sync(format!("Error: could not read wallet info: {}", e)));
                return;
            }
        };

        let handoff = ReadyHandoff {
            connection: ConnectionConfig {
                server_url: self.server_url.clone(),
            },
            info,
            completed_at: Utc::now(),
        };
        log::info!(
            "Wallet ready at block {} on {}",
            handoff.info.latest_block,
            handoff.connection.server_url
        );
        self.reporter.enter(Phase::Ready(handoff), "Ready");
    }
}

impl SyncObserver for SessionSyncObserver {
    fn on_status(&mut self, status: &SyncStatus) {
        self.reporter.info(status.progress_message());
    }

    fn on_complete(&mut self, _status: &SyncStatus) {
        self.finalize();
    }

    fn on_error(&mut self, error: BootstrapError) {
        self.reporter.halt(&error);
    }
}

pub struct BootstrapSession {
    config: BootstrapConfig,
    engine: EngineClient,
    store: Arc<dyn ConfigStore>,
    provisioner: ParameterProvisioner,
    wallets: WalletLifecycleController,
    poller: SyncStatusPoller,
    reporter: StatusReporter,
    stop: StopSignal,
    server_url: String,
    shutdown_registered: bool,
}

impl BootstrapSession {
    pub fn new(
        config: BootstrapConfig,
        engine: Arc<dyn WalletEngine>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        let engine = EngineClient::new(engine);
        let stop = StopSignal::new();
        Self {
            provisioner: ParameterProvisioner::from_config(&config),
            wallets: WalletLifecycleController::new(engine.clone(), config.wallet_id.clone()),
            poller: SyncStatusPoller::new(engine.clone(), config.poll_interval, stop.clone()),
            reporter: StatusReporter::new(),
            server_url: config.default_server.clone(),
            shutdown_registered: false,
            config,
            engine,
            store,
            stop,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.reporter.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.reporter.snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.reporter.phase()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// Wait until the session needs the user, has finished, or the host is quitting
    ///
    /// A shutdown leaves the phase where it was interrupted, so the snapshot
    /// returned in that case may still show an unsettled phase.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.reporter.subscribe();
        let settled = tokio::select! {
            biased;
            settled = rx.wait_for(|s| s.phase.is_settled()) => {
                settled.ok().map(|snapshot| SessionSnapshot::clone(&snapshot))
            }
            _ = self.stop.stopped() => None,
        };
        settled.unwrap_or_else(|| self.reporter.snapshot())
    }

    /// Whether the host has asked to quit
    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_stopped()
    }

    fn ensure_running(&self) -> Result<(), BootstrapError> {
        if self.stop.is_stopped() {
            log::warn!("Ignoring request, shutdown in progress");
            return Err(BootstrapError::ShuttingDown);
        }
        Ok(())
    }

    /// Run from `Init` until the session settles or starts syncing
    ///
    /// Component failures are reported through the snapshot; the errors
    /// returned here are calling `start` twice and starting after shutdown.
    /// A shutdown during provisioning stops the sequence where it is.
    pub async fn start(&mut self, mode: StartMode) -> Result<(), BootstrapError> {
        let phase = self.phase();
        if phase != Phase::Init {
            return Err(BootstrapError::invalid_transition("start", phase.name()));
        }
        self.ensure_running()?;

        self.server_url = self.load_server_url();
        self.reporter.set_server_url(&self.server_url);

        if mode == StartMode::Resume {
            log::info!("Resuming in-progress sync against {}", self.server_url);
            self.begin_sync(SyncKickoff::AlreadyRunning);
            return Ok(());
        }

        self.reporter.enter(Phase::ProvisioningParams, INITIAL_STATUS);
        let provisioned = tokio::select! {
            biased;
            _ = self.stop.stopped() => None,
            result = self.provisioner.ensure_all(&self.reporter) => Some(result),
        };
        match provisioned {
            None => {
                log::info!("Shutdown requested while provisioning parameters");
                return Ok(());
            }
            Some(Err(err)) => {
                self.halt(err.into());
                return Ok(());
            }
            Some(Ok(())) => {}
        }
        if self.stop.is_stopped() {
            log::info!("Shutdown requested, not opening the wallet");
            return Ok(());
        }

        self.reporter.enter(Phase::ResolvingWallet, INITIAL_STATUS);
        match self.wallets.resolve(&self.server_url) {
            Ok(WalletOutcome::ExistingInitialized) => self.begin_sync(SyncKickoff::Trigger),
            Ok(WalletOutcome::NeedsUserChoice) => self.reporter.enter(Phase::AwaitingUserChoice, ""),
            Err(err) => self.halt(err),
        }
        Ok(())
    }

    fn load_server_url(&self) -> String {
        match store::load_server_url(self.store.as_ref(), &self.config.default_server) {
            Ok(url) => url,
            Err(e) => {
                log::warn!(
                    "Could not read server preference ({}), using {}",
                    e,
                    self.config.default_server
                );
                self.config.default_server.clone()
            }
        }
    }

    fn begin_sync(&mut self, kickoff: SyncKickoff) {
        if self.poller.is_active() {
            log::warn!("Sync already in progress");
            return;
        }
        if self.stop.is_stopped() {
            log::info!("Shutdown requested, not starting sync");
            return;
        }

        self.reporter.enter(Phase::Syncing, SYNC_SETUP_STATUS);
        let observer = SessionSyncObserver {
            engine: self.engine.clone(),
            reporter: self.reporter.clone(),
            server_url: self.server_url.clone(),
        };
        match self.poller.start(kickoff, observer) {
            Ok(PollerStart::Started) | Ok(PollerStart::AlreadyActive) => {}
            Err(BootstrapError::ShuttingDown) => log::info!("Shutdown requested, sync not started"),
            Err(err) => self.halt(err),
        }
    }

    fn halt(&mut self, err: BootstrapError) {
        self.poller.stop();
        self.reporter.halt(&err);
    }

    /// Cancel sync polling; idempotent
    pub fn stop_polling(&mut self) {
        self.poller.stop();
    }

    /// Ask the engine for a new wallet and show its seed
    pub fn create_wallet(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::AwaitingUserChoice | Phase::CreatingWallet(NewWalletScreen::Failed { .. }) => {}
            other => return Err(BootstrapError::invalid_transition("create a wallet", other.name())),
        }
        self.ensure_running()?;

        match self.wallets.create(&self.server_url) {
            Ok(wallet) => self
                .reporter
                .enter(Phase::CreatingWallet(NewWalletScreen::Created { seed: wallet.seed }), ""),
            Err(err) => {
                let screen = NewWalletScreen::Failed {
                    error: err.to_string(),
                };
                self.reporter.fail_in(Phase::CreatingWallet(screen), &err);
            }
        }
        Ok(())
    }

    /// The user has stored the seed; start syncing the new wallet
    pub fn start_new_wallet(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::CreatingWallet(NewWalletScreen::Created { .. }) => {
                self.ensure_running()?;
                self.begin_sync(SyncKickoff::Trigger);
                Ok(())
            }
            other => Err(BootstrapError::invalid_transition("start the new wallet", other.name())),
        }
    }

    pub fn choose_restore(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::AwaitingUserChoice | Phase::CreatingWallet(NewWalletScreen::Failed { .. }) => {
                self.reporter.enter(Phase::RestoringWallet(RestoreForm::default()), "");
                Ok(())
            }
            other => Err(BootstrapError::invalid_transition("restore a wallet", other.name())),
        }
    }

    /// From an error, skip the failed path and restore from a seed phrase instead
    pub fn recover_with_restore(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::ErrorHalted => {
                self.poller.stop();
                self.reporter.enter(Phase::RestoringWallet(RestoreForm::default()), "");
                Ok(())
            }
            other => Err(BootstrapError::invalid_transition("recover by restoring", other.name())),
        }
    }

    pub fn update_seed(&mut self, seed: &str) -> Result<(), BootstrapError> {
        self.edit_restore_form("edit the seed phrase", |form| form.seed = seed.to_string())
    }

    pub fn update_birthday(&mut self, birthday: &str) -> Result<(), BootstrapError> {
        self.edit_restore_form("edit the wallet birthday", |form| {
            form.birthday = birthday.to_string()
        })
    }

    fn edit_restore_form(
        &mut self,
        action: &'static str,
        edit: impl FnOnce(&mut RestoreForm),
    ) -> Result<(), BootstrapError> {
        let phase = self.phase();
        if !matches!(phase, Phase::RestoringWallet(_)) {
            return Err(BootstrapError::invalid_transition(action, phase.name()));
        }
        self.reporter.modify(|s| {
            if let Phase::RestoringWallet(form) = &mut s.phase {
                edit(form);
            }
        });
        Ok(())
    }

    /// Submit the restore form; on success the session starts syncing
    pub fn restore_wallet(&mut self) -> Result<(), BootstrapError> {
        let form = match self.phase() {
            Phase::RestoringWallet(form) => form,
            other => return Err(BootstrapError::invalid_transition("restore a wallet", other.name())),
        };
        self.ensure_running()?;

        let result = RestoreRequest::from_input(&form.seed, &form.birthday)
            .and_then(|request| self.wallets.restore(&self.server_url, &request));

        match result {
            Ok(()) => self.begin_sync(SyncKickoff::Trigger),
            Err(err) => {
                let form = RestoreForm {
                    error: Some(err.to_string()),
                    ..form
                };
                self.reporter.fail_in(Phase::RestoringWallet(form), &err);
            }
        }
        Ok(())
    }

    /// Clear the form after a failed restore so the user can try again
    pub fn retry_restore(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::RestoringWallet(_) => {
                self.reporter.enter(Phase::RestoringWallet(RestoreForm::default()), "");
                Ok(())
            }
            other => Err(BootstrapError::invalid_transition("retry the restore", other.name())),
        }
    }

    /// Leave the restore form and return to the create/restore choice
    pub fn restore_back(&mut self) -> Result<(), BootstrapError> {
        match self.phase() {
            Phase::RestoringWallet(_) => {
                self.reporter.enter(Phase::AwaitingUserChoice, "");
                Ok(())
            }
            other => Err(BootstrapError::invalid_transition("go back", other.name())),
        }
    }

    /// Store a different server; it is used after the application restarts
    pub fn switch_server(&mut self, choice: &ServerChoice) -> Result<(), BootstrapError> {
        let phase = self.phase();
        if phase != Phase::ErrorHalted {
            return Err(BootstrapError::invalid_transition("switch servers", phase.name()));
        }
        store::switch_server(self.store.as_ref(), choice)?;
        self.reporter.error_message(RESTART_STATUS);
        Ok(())
    }

    /// Start listening for the host's quit signal; allowed once per session
    pub fn register_shutdown(&mut self, link: HostLink) -> Result<JoinHandle<()>, BootstrapError> {
        if self.shutdown_registered {
            return Err(BootstrapError::invalid_transition(
                "register the shutdown handler",
                "already registered",
            ));
        }
        self.shutdown_registered = true;

        let coordinator =
            ShutdownCoordinator::new(self.engine.clone(), self.config.shutdown_grace, self.stop.clone());
        Ok(coordinator.register(link))
    }
}
