//! Common test utilities for bootstrap integration tests
//!
//! This module provides shared test infrastructure including:
//! - A scripted in-memory wallet engine that records every call
//! - A mock parameter server (axum) with failure routes
//! - Test environment setup with a pre-populated parameter directory
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lightwallet_bootstrap::{
    BootstrapConfig, BootstrapSession, EngineError, MemoryConfigStore, ParameterSource,
    SessionSnapshot, WalletEngine, WalletInfo,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const SLOW_RESPONSE: Duration = Duration::from_secs(2);

pub const RESTORE_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// JSON payload of a freshly created wallet with a `words`-word seed
pub fn seed_payload(words: usize) -> String {
    let seed = (0..words)
        .map(|i| format!("word{}", i))
        .collect::<Vec<_>>()
        .join(" ");
    serde_json::json!({ "seed": seed, "birthday": 1_050_000 }).to_string()
}

pub fn sync_progress(synced: u64, total: u64) -> String {
    format!(
        r#"{{"syncing":"true","synced_blocks":{},"total_blocks":{}}}"#,
        synced, total
    )
}

pub fn sync_done(total: u64) -> String {
    format!(
        r#"{{"syncing":"false","synced_blocks":{},"total_blocks":{}}}"#,
        total, total
    )
}

// ============================================================================
// Scripted engine
// ============================================================================

/// Pops scripted responses in order; the last one repeats forever
struct Script {
    responses: Mutex<VecDeque<String>>,
}

impl Script {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    fn next(&self) -> String {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap_or_default()
        }
    }
}

pub struct ScriptedEngine {
    exists: bool,
    init_existing: Result<String, EngineError>,
    init_new: Script,
    restore: Script,
    statuses: Script,
    start_sync_fault: Option<EngineError>,
    save_fault: Option<EngineError>,
    save_delay: Duration,
    status_delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            exists: false,
            init_existing: Ok("OK".to_string()),
            init_new: Script::new(vec![seed_payload(24)]),
            restore: Script::new(vec!["OK".to_string()]),
            statuses: Script::new(vec![sync_done(1000)]),
            start_sync_fault: None,
            save_fault: None,
            save_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_existing_wallet(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn with_init_existing(mut self, response: Result<&str, &str>) -> Self {
        self.init_existing = response.map(str::to_string).map_err(EngineError::new);
        self
    }

    pub fn with_new_wallet_responses(mut self, responses: Vec<String>) -> Self {
        self.init_new = Script::new(responses);
        self
    }

    pub fn with_restore_responses(mut self, responses: Vec<String>) -> Self {
        self.restore = Script::new(responses);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<String>) -> Self {
        self.statuses = Script::new(statuses);
        self
    }

    pub fn with_start_sync_fault(mut self, message: &str) -> Self {
        self.start_sync_fault = Some(EngineError::new(message));
        self
    }

    pub fn with_save_fault(mut self, message: &str) -> Self {
        self.save_fault = Some(EngineError::new(message));
        self
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Make every `sync_status` call block for `delay` before answering
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Calls recorded after the engine was deinitialized
    pub fn calls_after_release(&self) -> Vec<String> {
        let calls = self.calls();
        match calls.iter().position(|c| c == "deinitialize") {
            Some(at) => calls[at + 1..].to_vec(),
            None => Vec::new(),
        }
    }
}

impl WalletEngine for ScriptedEngine {
    fn wallet_exists(&self, wallet_id: &str) -> bool {
        self.record(format!("wallet_exists:{}", wallet_id));
        self.exists
    }

    fn initialize_existing(&self, _server_url: &str) -> Result<String, EngineError> {
        self.record("initialize_existing");
        self.init_existing.clone()
    }

    fn initialize_new(&self, _server_url: &str) -> Result<String, EngineError> {
        self.record("initialize_new");
        Ok(self.init_new.next())
    }

    fn initialize_from_phrase(
        &self,
        _server_url: &str,
        seed: &str,
        birthday: u64,
        allow_overwrite: bool,
    ) -> Result<String, EngineError> {
        self.record(format!(
            "initialize_from_phrase:{}:{}:{}",
            seed, birthday, allow_overwrite
        ));
        Ok(self.restore.next())
    }

    fn start_sync(&self) -> Result<(), EngineError> {
        self.record("start_sync");
        match &self.start_sync_fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn sync_status(&self) -> Result<String, EngineError> {
        self.record("sync_status");
        if !self.status_delay.is_zero() {
            std::thread::sleep(self.status_delay);
        }
        Ok(self.statuses.next())
    }

    fn save(&self) -> Result<(), EngineError> {
        if !self.save_delay.is_zero() {
            std::thread::sleep(self.save_delay);
        }
        self.record("save");
        match &self.save_fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn deinitialize(&self) -> Result<(), EngineError> {
        self.record("deinitialize");
        Ok(())
    }

    fn info_snapshot(&self) -> Result<WalletInfo, EngineError> {
        self.record("info_snapshot");
        Ok(WalletInfo {
            testnet: false,
            latest_block: 1_000,
            version: "v2.0.0".to_string(),
            currency_name: "ZEC".to_string(),
            verification_progress: 1.0,
        })
    }
}

// ============================================================================
// Mock parameter server
// ============================================================================

#[derive(Clone)]
struct MockState {
    files: Arc<HashMap<String, Vec<u8>>>,
    hits: Arc<AtomicUsize>,
    flaky_failures: Arc<AtomicUsize>,
}

/// Serves parameter files over HTTP for provisioning tests
///
/// Routes:
/// - `GET /params/:name` - the file, or 404 when unknown
/// - `GET /broken/:name` - starts a body then drops the connection
/// - `GET /flaky/:name` - broken for the first N requests, then the file
/// - `GET /slow/:name` - the file after a long pause
pub struct ParamServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ParamServer {
    pub async fn start(files: HashMap<String, Vec<u8>>) -> anyhow::Result<Self> {
        Self::start_with_flaky(files, 0).await
    }

    pub async fn start_with_flaky(
        files: HashMap<String, Vec<u8>>,
        flaky_failures: usize,
    ) -> anyhow::Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = MockState {
            files: Arc::new(files),
            hits: hits.clone(),
            flaky_failures: Arc::new(AtomicUsize::new(flaky_failures)),
        };

        let app = Router::new()
            .route("/params/:name", get(serve_param))
            .route("/broken/:name", get(serve_broken))
            .route("/flaky/:name", get(serve_flaky))
            .route("/slow/:name", get(serve_slow))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("Mock parameter server stopped: {}", e);
            }
        });
        log::info!("Mock parameter server listening on http://{}", addr);

        Ok(Self {
            base_url: format!("http://{}", addr),
            hits,
            handle,
        })
    }

    pub fn url(&self, route: &str, name: &str) -> String {
        format!("{}/{}/{}", self.base_url, route, name)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for ParamServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn file_response(state: &MockState, name: &str) -> Response {
    match state.files.get(name) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn broken_response() -> Response {
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
        Ok(vec![7u8; 64 * 1024]),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection dropped mid-transfer",
        )),
    ];
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn serve_param(State(state): State<MockState>, Path(name): Path<String>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    file_response(&state, &name)
}

async fn serve_broken(State(state): State<MockState>, Path(_name): Path<String>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    broken_response()
}

async fn serve_flaky(State(state): State<MockState>, Path(name): Path<String>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let failing = state
        .flaky_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        broken_response()
    } else {
        file_response(&state, &name)
    }
}

async fn serve_slow(State(state): State<MockState>, Path(name): Path<String>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(SLOW_RESPONSE).await;
    file_response(&state, &name)
}

// ============================================================================
// Test environment
// ============================================================================

/// Temp directories plus a config whose parameter files are already present
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config: BootstrapConfig,
    pub store: Arc<MemoryConfigStore>,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        init_logging();
        let temp_dir = TempDir::new()?;
        let params_dir = temp_dir.path().join("params");
        std::fs::create_dir_all(&params_dir)?;

        // Nothing listens on the discard port; a download attempt would fail loudly
        let parameter_files = ParameterSource::standard_set("http://127.0.0.1:9/params");
        for source in &parameter_files {
            std::fs::write(params_dir.join(&source.name), b"params")?;
        }

        let config = BootstrapConfig {
            parameter_files,
            params_dir: Some(params_dir),
            poll_interval: Duration::from_millis(20),
            progress_interval: Duration::ZERO,
            config_path: temp_dir.path().join("config.json"),
            ..Default::default()
        };

        Ok(Self {
            temp_dir,
            config,
            store: Arc::new(MemoryConfigStore::new()),
        })
    }

    pub fn session(&self, engine: &Arc<ScriptedEngine>) -> BootstrapSession {
        BootstrapSession::new(self.config.clone(), engine.clone(), self.store.clone())
    }
}

pub async fn settle(session: &BootstrapSession) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(10), session.wait_until_settled())
        .await
        .expect("session did not settle in time")
}
