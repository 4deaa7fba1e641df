/// Sync Status Poller
///
/// Queries the engine's sync progress on a fixed interval until the scan
/// finishes or fails. The poller owns its background task; every terminal
/// path (completion, error, explicit stop, shutdown) ends that task.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{EngineClient, SyncStatus};
use crate::error::BootstrapError;

/// Receives the outcome of each poll
///
/// Exactly one of `on_complete` or `on_error` is called, after which the
/// poller stops and calls nothing further.
pub trait SyncObserver: Send + 'static {
    fn on_status(&mut self, status: &SyncStatus);
    fn on_complete(&mut self, status: &SyncStatus);
    fn on_error(&mut self, error: BootstrapError);
}

/// Whether starting the poller should also ask the engine to begin a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKickoff {
    /// Call `start_sync` before polling
    Trigger,
    /// A scan is already running inside the engine (resumed rescan)
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStart {
    Started,
    AlreadyActive,
}

/// Process-wide stop flag shared by the poller and the shutdown listener
///
/// Also counts running poll tasks so shutdown can wait until none of them can
/// touch the engine again.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    active: Arc<watch::Sender<usize>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        let (active, _active_rx) = watch::channel(0);
        Self {
            tx: Arc::new(tx),
            active: Arc::new(active),
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Resolves once no poll task is running or has an engine call in flight
    pub async fn idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn track(&self) -> Arc<ActivePoll> {
        self.active.send_modify(|count| *count += 1);
        Arc::new(ActivePoll {
            active: self.active.clone(),
        })
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a poll task and by any blocking engine call it spawned
struct ActivePoll {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ActivePoll {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
    }
}

pub struct SyncStatusPoller {
    engine: EngineClient,
    interval: Duration,
    stop: StopSignal,
    task: Option<JoinHandle<()>>,
}

impl SyncStatusPoller {
    pub fn new(engine: EngineClient, interval: Duration, stop: StopSignal) -> Self {
        Self {
            engine,
            interval,
            stop,
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Begin polling; a second call while a poller is running is a no-op
    pub fn start<O: SyncObserver>(
        &mut self,
        kickoff: SyncKickoff,
        observer: O,
    ) -> Result<PollerStart, BootstrapError> {
        if self.is_active() {
            log::warn!("Sync poller already running, not starting another");
            return Ok(PollerStart::AlreadyActive);
        }
        if self.stop.is_stopped() {
            return Err(BootstrapError::ShuttingDown);
        }

        if kickoff == SyncKickoff::Trigger {
            log::info!("Requesting engine sync");
            self.engine.start_sync()?;
        }

        let engine = self.engine.clone();
        let period = self.interval;
        let stop_rx = self.stop.subscribe();
        let guard = self.stop.track();
        self.task = Some(tokio::spawn(poll_loop(engine, period, stop_rx, guard, observer)));

        log::info!("Sync poller started (interval={}ms)", period.as_millis());
        Ok(PollerStart::Started)
    }

    /// Cancel the polling task; safe to call any number of times
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                log::info!("Stopping sync poller");
            }
            task.abort();
        }
    }
}

impl Drop for SyncStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<O: SyncObserver>(
    engine: EngineClient,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
    guard: Arc<ActivePoll>,
    mut observer: O,
) {
    // First query one full period after start, like the status it replaces
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    log::info!("Sync poller shutting down");
                    break;
                }
            }
            _ = interval.tick() => {
                let status = query_status(&engine, &guard).await;
                if *stop_rx.borrow() {
                    log::info!("Sync poller stopped, discarding in-flight status");
                    break;
                }

                match status {
                    Ok(status) if status.syncing => {
                        log::debug!("{}", status.progress_message());
                        observer.on_status(&status);
                    }
                    Ok(status) => {
                        log::info!("Sync complete at {} blocks", status.total_blocks);
                        let held = guard.clone();
                        let finished = tokio::task::spawn_blocking(move || {
                            let _held = held;
                            observer.on_complete(&status);
                        })
                        .await;
                        if let Err(e) = finished {
                            log::error!("Sync finalization task failed: {}", e);
                        }
                        break;
                    }
                    Err(err) => {
                        log::error!("Sync failed: {}", err);
                        observer.on_error(err);
                        break;
                    }
                }
            }
        }
    }
}

/// Run the blocking status query off the async workers
async fn query_status(
    engine: &EngineClient,
    guard: &Arc<ActivePoll>,
) -> Result<SyncStatus, BootstrapError> {
    let engine = engine.clone();
    let held = guard.clone();
    tokio::task::spawn_blocking(move || {
        let _held = held;
        engine.sync_status()
    })
    .await
    .unwrap_or_else(|e| {
        Err(BootstrapError::Sync(format!(
            "Error: sync status query failed: {}",
            e
        )))
    })
}
