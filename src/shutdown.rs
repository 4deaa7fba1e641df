/// Shutdown Coordinator
///
/// Waits for the host's "about to quit" signal, then stops polling, saves and
/// releases the engine, and only afterwards acknowledges. The acknowledgment
/// is held back by a short grace period so engine resources finish releasing
/// before the host tears the process down.
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::EngineClient;
use crate::poller::StopSignal;

/// Named signals exchanged with the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// Inbound: the host is about to quit
    AboutToQuit,
    /// Outbound: wallet state is persisted, the host may proceed
    QuitAcknowledged,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Host lifecycle channel closed")]
pub struct ChannelClosed;

/// Bootstrap side of the host lifecycle channel
pub struct HostLink {
    inbound: mpsc::Receiver<HostSignal>,
    outbound: mpsc::Sender<HostSignal>,
}

/// Host side of the lifecycle channel
pub struct HostEndpoint {
    to_app: mpsc::Sender<HostSignal>,
    from_app: mpsc::Receiver<HostSignal>,
}

impl HostEndpoint {
    pub async fn notify_quitting(&self) -> Result<(), ChannelClosed> {
        self.to_app
            .send(HostSignal::AboutToQuit)
            .await
            .map_err(|_| ChannelClosed)
    }

    /// Wait for the application to acknowledge a quit
    pub async fn quit_acknowledged(&mut self) -> Result<(), ChannelClosed> {
        while let Some(signal) = self.from_app.recv().await {
            if signal == HostSignal::QuitAcknowledged {
                return Ok(());
            }
        }
        Err(ChannelClosed)
    }

    /// Notify the application and wait for its acknowledgment
    pub async fn request_quit(&mut self) -> Result<(), ChannelClosed> {
        self.notify_quitting().await?;
        self.quit_acknowledged().await
    }
}

/// Create a connected pair of lifecycle endpoints
pub fn host_link() -> (HostLink, HostEndpoint) {
    let (to_app, inbound) = mpsc::channel(4);
    let (outbound, from_app) = mpsc::channel(4);
    (
        HostLink { inbound, outbound },
        HostEndpoint { to_app, from_app },
    )
}

pub struct ShutdownCoordinator {
    engine: EngineClient,
    grace: Duration,
    stop: StopSignal,
}

impl ShutdownCoordinator {
    pub fn new(engine: EngineClient, grace: Duration, stop: StopSignal) -> Self {
        Self { engine, grace, stop }
    }

    /// Spawn the listener; consuming `self` keeps it to one registration
    pub fn register(self, link: HostLink) -> JoinHandle<()> {
        log::info!("Shutdown handler registered (grace={}ms)", self.grace.as_millis());
        tokio::spawn(self.run(link))
    }

    async fn run(self, mut link: HostLink) {
        while let Some(signal) = link.inbound.recv().await {
            match signal {
                HostSignal::AboutToQuit => {
                    log::info!("App is quitting, saving wallet");
                    self.persist_and_release().await;

                    tokio::time::sleep(self.grace).await;
                    if link.outbound.send(HostSignal::QuitAcknowledged).await.is_err() {
                        log::warn!("Host stopped listening before quit was acknowledged");
                    }
                    log::info!("Quit acknowledged");
                    return;
                }
                HostSignal::QuitAcknowledged => {
                    log::warn!("Ignoring unexpected {:?} from host", signal);
                }
            }
        }
        log::debug!("Host lifecycle channel closed, shutdown handler exiting");
    }

    /// Stop polling, then save and release the engine, in that order
    ///
    /// An engine call already made by the poller is allowed to return first,
    /// so nothing touches the engine once it has been released.
    async fn persist_and_release(&self) {
        self.stop.stop();
        self.stop.idle().await;

        let engine = self.engine.clone();
        let released = tokio::task::spawn_blocking(move || {
            if let Err(e) = engine.save() {
                log::error!("Failed to save wallet on shutdown: {}", e);
            }
            if let Err(e) = engine.deinitialize() {
                log::error!("Failed to deinitialize engine on shutdown: {}", e);
            }
        })
        .await;

        if let Err(e) = released {
            log::error!("Engine release task failed: {}", e);
        }
    }
}
