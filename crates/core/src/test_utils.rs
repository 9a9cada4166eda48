//! Shared fixtures for unit and integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use probehub_shared::{
    AgentInfo, DuplexSession, HubError, HubResult, PluginControl, PluginDescriptor,
    TelemetryEnvelope, TelemetryStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::dispatch::CommandDispatcher;
use crate::managers::{AgentRegistry, PluginCatalog};
use crate::router::TelemetryRouter;
use crate::AppState;

/// Transport double that records every send. Flip `fail_sends` to simulate
/// a dead connection.
#[derive(Default)]
pub struct MockTransport {
    pub texts: Mutex<Vec<String>>,
    pub binaries: Mutex<Vec<Bytes>>,
    pub closed: AtomicBool,
    pub fail_sends: AtomicBool,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn send_count(&self) -> usize {
        self.texts.lock().unwrap().len() + self.binaries.lock().unwrap().len()
    }
}

#[async_trait]
impl DuplexSession for MockTransport {
    async fn send_text(&self, text: String) -> HubResult<()> {
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(HubError::SessionClosed("mock transport down".into()));
        }
        self.texts.lock().unwrap().push(text);
        Ok(())
    }

    async fn send_binary(&self, frame: Bytes) -> HubResult<()> {
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(HubError::SessionClosed("mock transport down".into()));
        }
        self.binaries.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self) -> HubResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Store double that records appends; flip `fail` to simulate an outage.
#[derive(Default)]
pub struct MockStore {
    pub appended: Mutex<Vec<(String, TelemetryEnvelope)>>,
    pub fail: AtomicBool,
}

impl MockStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TelemetryStore for MockStore {
    async fn append(&self, routing_key: &str, envelope: &TelemetryEnvelope) -> HubResult<()> {
        if self.fail.load(Ordering::Acquire) {
            return Err(HubError::StoreUnavailable("mock store down".into()));
        }
        self.appended
            .lock()
            .unwrap()
            .push((routing_key.to_string(), envelope.clone()));
        Ok(())
    }
}

struct NoopControl {
    id: String,
}

#[async_trait]
impl PluginControl for NoopControl {
    fn plugin_id(&self) -> &str {
        &self.id
    }
}

#[must_use]
pub fn test_agent_info(id: &str) -> AgentInfo {
    AgentInfo {
        id: id.to_string(),
        name: format!("{id}-jvm"),
        runtime: serde_json::json!({ "vendor": "openjdk", "version": "17" }),
        connected_at: chrono::Utc::now(),
    }
}

#[must_use]
pub fn test_descriptor(id: &str, artifact: Option<Vec<u8>>) -> PluginDescriptor {
    PluginDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        version: "0.1.0".to_string(),
        artifact: artifact.map(Bytes::from),
        control: Arc::new(NoopControl { id: id.to_string() }),
    }
}

#[must_use]
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        port: 8090,
        bind_address: "127.0.0.1".to_string(),
        cors_origins: vec![],
        session_send_queue: 64,
        subscriber_buffer: 256,
        plugin_dir: "data/plugins".to_string(),
    }
}

/// Full app state over mock store and the given plugin descriptors.
#[must_use]
pub fn test_state(descriptors: Vec<PluginDescriptor>) -> (Arc<AppState>, Arc<MockStore>) {
    let registry = Arc::new(AgentRegistry::new());
    let catalog = Arc::new(PluginCatalog::new(descriptors));
    let store = MockStore::new();
    let router = Arc::new(TelemetryRouter::new(catalog.clone(), store.clone(), 256));
    let dispatcher = CommandDispatcher::new(registry.clone(), catalog.clone());

    let state = Arc::new(AppState {
        registry,
        catalog,
        router,
        dispatcher,
        config: test_config(),
        shutdown: Arc::new(tokio::sync::Notify::new()),
    });
    (state, store)
}
