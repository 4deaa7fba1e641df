mod common;

use common::*;
use lightwallet_bootstrap::{
    BootstrapError, EngineClient, PollerStart, StopSignal, SyncKickoff, SyncObserver, SyncStatus,
    SyncStatusPoller,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(String),
    Complete(u64),
    Error(String),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncObserver for Recorder {
    fn on_status(&mut self, status: &SyncStatus) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Status(status.progress_message()));
    }

    fn on_complete(&mut self, status: &SyncStatus) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Complete(status.total_blocks));
    }

    fn on_error(&mut self, error: BootstrapError) {
        self.events.lock().unwrap().push(Event::Error(error.to_string()));
    }
}

fn poller_for(engine: &Arc<ScriptedEngine>, stop: StopSignal) -> SyncStatusPoller {
    SyncStatusPoller::new(EngineClient::new(engine.clone()), INTERVAL, stop)
}

async fn wait_idle(poller: &SyncStatusPoller) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while poller.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("poller did not finish in time");
}

#[tokio::test]
async fn test_progress_then_single_completion() {
    init_logging();
    let engine = Arc::new(
        ScriptedEngine::new().with_statuses(vec![sync_progress(100, 1000), sync_done(1000)]),
    );
    let recorder = Recorder::default();
    let mut poller = poller_for(&engine, StopSignal::new());

    let started = poller.start(SyncKickoff::Trigger, recorder.clone()).unwrap();
    assert_eq!(started, PollerStart::Started);
    wait_idle(&poller).await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Status("Syncing 100 / 1000".to_string()),
            Event::Complete(1000)
        ]
    );
    assert_eq!(engine.count("start_sync"), 1);

    // No polling after completion
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(engine.count("sync_status"), 2);
    assert_eq!(recorder.events().len(), 2);
}

#[tokio::test]
async fn test_second_start_is_a_no_op() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new().with_statuses(vec![sync_progress(1, 1000)]));
    let mut poller = poller_for(&engine, StopSignal::new());

    assert_eq!(
        poller.start(SyncKickoff::Trigger, Recorder::default()).unwrap(),
        PollerStart::Started
    );
    assert_eq!(
        poller.start(SyncKickoff::Trigger, Recorder::default()).unwrap(),
        PollerStart::AlreadyActive
    );
    assert_eq!(engine.count("start_sync"), 1);
    assert!(poller.is_active());

    poller.stop();
    poller.stop();
    assert!(!poller.is_active());

    let polls = engine.count("sync_status");
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(engine.count("sync_status"), polls);
}

#[tokio::test]
async fn test_resumed_scan_is_not_restarted() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new());
    let recorder = Recorder::default();
    let mut poller = poller_for(&engine, StopSignal::new());

    poller.start(SyncKickoff::AlreadyRunning, recorder.clone()).unwrap();
    wait_idle(&poller).await;

    assert_eq!(engine.count("start_sync"), 0);
    assert_eq!(recorder.events(), vec![Event::Complete(1000)]);
}

#[tokio::test]
async fn test_synced_beyond_total_is_an_error() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new().with_statuses(vec![
        r#"{"syncing":true,"synced_blocks":2000,"total_blocks":1000}"#.to_string(),
    ]));
    let recorder = Recorder::default();
    let mut poller = poller_for(&engine, StopSignal::new());

    poller.start(SyncKickoff::Trigger, recorder.clone()).unwrap();
    wait_idle(&poller).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Error(msg) if msg.contains("exceeds total")));
    assert_eq!(engine.count("sync_status"), 1);
}

#[tokio::test]
async fn test_stop_signal_ends_polling_and_blocks_restart() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new().with_statuses(vec![sync_progress(1, 1000)]));
    let stop = StopSignal::new();
    let recorder = Recorder::default();
    let mut poller = poller_for(&engine, stop.clone());

    poller.start(SyncKickoff::Trigger, recorder.clone()).unwrap();
    tokio::time::sleep(INTERVAL * 3).await;

    stop.stop();
    wait_idle(&poller).await;
    assert!(recorder
        .events()
        .iter()
        .all(|e| matches!(e, Event::Status(_))));

    let restarted = poller.start(SyncKickoff::Trigger, Recorder::default());
    assert!(matches!(restarted, Err(BootstrapError::ShuttingDown)));
    assert_eq!(engine.count("start_sync"), 1);
}
