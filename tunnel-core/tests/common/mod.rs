//! Shared fakes for coordinator integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tunnel_core::config::CoordinatorSettings;
use tunnel_core::error::{EngineError, TunnelError};
use tunnel_core::reachability::{PathReachability, ReachabilityStatus};
use tunnel_core::tunnel::{
    engine_channel, AppMessageHandler, EngineEvent, EngineEventSender, EngineProperties,
    NetworkSettings, Packet, PacketFlow, TunnelCoordinator, TunnelHost, VpnEngine,
};
use tunnel_core::types::{Credentials, TunnelConfiguration};

pub const PROFILE: &str = "client\ndev tun\nremote 127.0.0.1 1194\nauth-user-pass\n";

/// Calls the coordinator made on the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Apply,
    Provide(String),
    Connect,
    Disconnect,
    Cancel,
    Reconnect(Duration),
    AttachFlow(bool),
}

/// Engine that records calls and optionally answers them with events
pub struct MockEngine {
    events: EngineEventSender,
    calls: Mutex<Vec<EngineCall>>,
    pub autologin: bool,
    pub apply_error: Option<EngineError>,
    pub provide_error: Option<EngineError>,
    pub auto_connect: bool,
    pub auto_disconnect: bool,
    flow: Mutex<Option<Arc<dyn PacketFlow>>>,
}

impl MockEngine {
    pub fn new(events: EngineEventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            autologin: false,
            apply_error: None,
            provide_error: None,
            auto_connect: true,
            auto_disconnect: true,
            flow: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn reconnects(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Reconnect(_)))
            .count()
    }

    pub fn packet_flow(&self) -> Option<Arc<dyn PacketFlow>> {
        self.flow.lock().unwrap().clone()
    }

    pub fn emit(&self, event: EngineEvent) {
        assert!(self.events.send(event), "coordinator should be listening");
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl VpnEngine for MockEngine {
    fn apply(&self, _config: &TunnelConfiguration) -> Result<EngineProperties, EngineError> {
        self.record(EngineCall::Apply);
        match &self.apply_error {
            Some(e) => Err(e.clone()),
            None => Ok(EngineProperties {
                autologin: self.autologin,
                remote_host: Some("127.0.0.1".to_string()),
            }),
        }
    }

    fn provide(&self, credentials: &Credentials) -> Result<(), EngineError> {
        self.record(EngineCall::Provide(credentials.username().to_string()));
        match &self.provide_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn connect(&self) {
        self.record(EngineCall::Connect);
        if self.auto_connect {
            self.events.send(EngineEvent::Connected);
        }
    }

    fn disconnect(&self) {
        self.record(EngineCall::Disconnect);
        if self.auto_disconnect {
            self.events.send(EngineEvent::Disconnected);
        }
    }

    fn cancel(&self) {
        self.record(EngineCall::Cancel);
    }

    fn reconnect(&self, delay: Duration) {
        self.record(EngineCall::Reconnect(delay));
    }

    fn attach_packet_flow(&self, flow: Option<Arc<dyn PacketFlow>>) {
        self.record(EngineCall::AttachFlow(flow.is_some()));
        *self.flow.lock().unwrap() = flow;
    }
}

/// Host that records everything the coordinator reports
#[derive(Default)]
pub struct RecordingHost {
    pub fail_settings: bool,
    pub reasserting: Mutex<Vec<bool>>,
    pub unsolicited: Mutex<Vec<Option<TunnelError>>>,
    pub settings: Mutex<Vec<NetworkSettings>>,
    pub written: Mutex<Vec<Packet>>,
}

#[async_trait]
impl TunnelHost for RecordingHost {
    async fn apply_network_settings(&self, settings: &NetworkSettings) -> std::io::Result<()> {
        if self.fail_settings {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "settings rejected",
            ));
        }
        self.settings.lock().unwrap().push(settings.clone());
        Ok(())
    }

    fn set_reasserting(&self, reasserting: bool) {
        self.reasserting.lock().unwrap().push(reasserting);
    }

    async fn read_packets(&self) -> std::io::Result<Vec<Packet>> {
        Ok(vec![Packet {
            data: vec![0x45, 0x00],
            protocol: 2,
        }])
    }

    fn write_packets(&self, packets: Vec<Packet>) -> bool {
        self.written.lock().unwrap().extend(packets);
        true
    }

    fn unsolicited_disconnect(&self, error: Option<TunnelError>) {
        self.unsolicited.lock().unwrap().push(error);
    }
}

/// A coordinator wired to fakes
pub struct Harness {
    pub coordinator: TunnelCoordinator,
    pub engine: Arc<MockEngine>,
    pub host: Arc<RecordingHost>,
    pub reachability: Arc<PathReachability>,
    pub path: tokio::sync::watch::Sender<ReachabilityStatus>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|_| {}, RecordingHost::default())
    }

    /// Build a harness after adjusting the mock engine
    pub fn with(configure: impl FnOnce(&mut MockEngine), host: RecordingHost) -> Self {
        Self::build(configure, host, None)
    }

    /// Build a harness whose coordinator answers app messages with `handler`
    pub fn with_app_handler(handler: Arc<dyn AppMessageHandler>) -> Self {
        Self::build(|_| {}, RecordingHost::default(), Some(handler))
    }

    fn build(
        configure: impl FnOnce(&mut MockEngine),
        host: RecordingHost,
        app_handler: Option<Arc<dyn AppMessageHandler>>,
    ) -> Self {
        let (tx, rx) = engine_channel();
        let mut engine = MockEngine::new(tx);
        configure(&mut engine);
        let engine = Arc::new(engine);
        let host = Arc::new(host);
        let (path, reachability) = PathReachability::channel();
        let reachability = Arc::new(reachability);

        let coordinator = match app_handler {
            Some(handler) => TunnelCoordinator::builder(
                engine.clone(),
                reachability.clone(),
                host.clone(),
                rx,
            )
            .settings(CoordinatorSettings::default())
            .app_handler(handler)
            .spawn(),
            None => TunnelCoordinator::spawn(
                engine.clone(),
                reachability.clone(),
                host.clone(),
                rx,
                CoordinatorSettings::default(),
            ),
        };

        Self {
            coordinator,
            engine,
            host,
            reachability,
            path,
        }
    }
}

pub fn config_with_credentials() -> TunnelConfiguration {
    TunnelConfiguration::builder(PROFILE)
        .credentials(Credentials::new("uid", "pw123"))
        .build()
}

pub fn config_without_credentials() -> TunnelConfiguration {
    TunnelConfiguration::builder(PROFILE).build()
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

/// Give the coordinator task a chance to drain its queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Counts invocations of a completion handler and keeps the last value
pub struct Recorder<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handler(&self) -> impl FnOnce(T) + Send + 'static {
        let inner = Arc::clone(&self.inner);
        move |value| inner.lock().unwrap().push(value)
    }

    pub fn calls(&self) -> Vec<T> {
        self.inner.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
