//! Tunnel session coordinator
//!
//! Sits between the tunnel host (start/stop requests) and the VPN engine
//! (lifecycle events). All session state lives in a single task that handles
//! host commands and engine events one at a time, so a start completion and
//! a disconnect event can never race.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorSettings;
use crate::error::{ConfigError, EngineError, TunnelError};
use crate::reachability::{ReachabilityCallback, ReachabilityMonitor, ReachabilityStatus};
use crate::tunnel::completion::{PendingCompletion, StartCompletion, StopCompletion};
use crate::tunnel::engine::VpnEngine;
use crate::tunnel::event::{EngineEvent, EngineEventReceiver};
use crate::tunnel::host::{AppMessageHandler, EchoHandler, HostPacketFlow, TunnelHost};
use crate::tunnel::state::{SessionSnapshot, SessionState, StateTransition};
use crate::types::{StopReason, TunnelConfiguration};

type AppMessageCompletion = Box<dyn FnOnce(Option<Vec<u8>>) + Send + 'static>;
type SleepCompletion = Box<dyn FnOnce() + Send + 'static>;

/// Transitions buffered for each subscriber before it starts lagging
const TRANSITION_BUFFER: usize = 64;

/// Requests from the host side, processed in order by the session task
enum Command {
    Start {
        config: TunnelConfiguration,
        completion: StartCompletion,
    },
    Stop {
        reason: StopReason,
        completion: StopCompletion,
    },
    AppMessage {
        message: Vec<u8>,
        completion: AppMessageCompletion,
    },
    Sleep {
        completion: SleepCompletion,
    },
    Wake,
    Shutdown,
}

impl Command {
    /// Resolve a command that will never reach the session task
    fn reject(self) {
        match self {
            Command::Start { completion, .. } => completion(Err(TunnelError::CoordinatorClosed)),
            Command::Stop { completion, .. } => completion(Some(TunnelError::CoordinatorClosed)),
            Command::AppMessage { completion, .. } => completion(None),
            Command::Sleep { completion } => completion(),
            Command::Wake | Command::Shutdown => {}
        }
    }
}

/// Configures and spawns a [`TunnelCoordinator`]
pub struct CoordinatorBuilder {
    engine: Arc<dyn VpnEngine>,
    reachability: Arc<dyn ReachabilityMonitor>,
    host: Arc<dyn TunnelHost>,
    events: EngineEventReceiver,
    settings: CoordinatorSettings,
    app_handler: Arc<dyn AppMessageHandler>,
}

impl CoordinatorBuilder {
    pub fn settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn app_handler(mut self, handler: Arc<dyn AppMessageHandler>) -> Self {
        self.app_handler = handler;
        self
    }

    /// Spawn the session task on the current tokio runtime
    pub fn spawn(self) -> TunnelCoordinator {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);

        let session = Session {
            engine: self.engine,
            reachability: self.reachability,
            host: self.host,
            app_handler: self.app_handler,
            reconnect_delay: self.settings.reconnect_delay(),
            state: SessionState::Idle,
            reasserting: false,
            start: PendingCompletion::empty(),
            stop: PendingCompletion::empty(),
            snapshot: snapshot_tx,
            transitions: transitions.clone(),
            session_ended: false,
        };
        tokio::spawn(session.run(commands_rx, self.events));

        TunnelCoordinator {
            commands: commands_tx,
            snapshot: snapshot_rx,
            transitions,
        }
    }
}

/// Handle to a running tunnel session coordinator
///
/// Every request returns immediately and resolves through its completion
/// handler. Clones share the same session.
#[derive(Clone)]
pub struct TunnelCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    transitions: broadcast::Sender<StateTransition>,
}

impl TunnelCoordinator {
    /// Start configuring a coordinator around its collaborators
    pub fn builder(
        engine: Arc<dyn VpnEngine>,
        reachability: Arc<dyn ReachabilityMonitor>,
        host: Arc<dyn TunnelHost>,
        events: EngineEventReceiver,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            engine,
            reachability,
            host,
            events,
            settings: CoordinatorSettings::default(),
            app_handler: Arc::new(EchoHandler),
        }
    }

    /// Spawn a coordinator with the given settings and the echoing app-message handler
    pub fn spawn(
        engine: Arc<dyn VpnEngine>,
        reachability: Arc<dyn ReachabilityMonitor>,
        host: Arc<dyn TunnelHost>,
        events: EngineEventReceiver,
        settings: CoordinatorSettings,
    ) -> Self {
        Self::builder(engine, reachability, host, events)
            .settings(settings)
            .spawn()
    }

    fn send(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            warn!("Tunnel coordinator has shut down, rejecting request");
            command.reject();
        }
    }

    /// Request a new tunnel session
    ///
    /// `completion` fires exactly once: with `Ok` when the engine connects,
    /// or with the error that prevented the session from coming up.
    pub fn start_tunnel<F>(&self, config: TunnelConfiguration, completion: F)
    where
        F: FnOnce(Result<(), TunnelError>) + Send + 'static,
    {
        self.send(Command::Start {
            config,
            completion: Box::new(completion),
        });
    }

    /// Request the session be torn down
    ///
    /// `completion` fires exactly once, after the engine confirms the
    /// disconnect, with the error that ended the session if there was one.
    pub fn stop_tunnel<F>(&self, reason: StopReason, completion: F)
    where
        F: FnOnce(Option<TunnelError>) + Send + 'static,
    {
        self.send(Command::Stop {
            reason,
            completion: Box::new(completion),
        });
    }

    /// Pass a message from the containing app to the app-message handler
    pub fn handle_app_message<F>(&self, message: Vec<u8>, completion: F)
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        self.send(Command::AppMessage {
            message,
            completion: Box::new(completion),
        });
    }

    /// Host is about to sleep
    pub fn sleep<F>(&self, completion: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Command::Sleep {
            completion: Box::new(completion),
        });
    }

    /// Host woke up
    pub fn wake(&self) {
        self.send(Command::Wake);
    }

    /// Start a session and wait for it to connect or fail
    pub async fn start(&self, config: TunnelConfiguration) -> Result<(), TunnelError> {
        let (tx, rx) = oneshot::channel();
        self.start_tunnel(config, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(TunnelError::CoordinatorClosed))
    }

    /// Stop the session and wait for the engine to confirm
    pub async fn stop(&self, reason: StopReason) -> Option<TunnelError> {
        let (tx, rx) = oneshot::channel();
        self.stop_tunnel(reason, move |error| {
            let _ = tx.send(error);
        });
        rx.await.unwrap_or(Some(TunnelError::CoordinatorClosed))
    }

    /// Send an app message and wait for the reply
    pub async fn app_message(&self, message: Vec<u8>) -> Option<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.handle_app_message(message, move |reply| {
            let _ = tx.send(reply);
        });
        rx.await.ok().flatten()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// Whether the host has been told the session is reasserting
    pub fn is_reasserting(&self) -> bool {
        self.snapshot.borrow().reasserting
    }

    /// Observe state and reasserting changes
    ///
    /// Only the latest snapshot is kept; use [`transitions`](Self::transitions)
    /// to see every state the session passes through.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Every state change from now on, in order
    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(&self, target: SessionState) -> Result<SessionSnapshot, TunnelError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.state == target)
            .await
            .map_err(|_| TunnelError::CoordinatorClosed)?;
        Ok(*snapshot)
    }

    /// Stop the session task
    ///
    /// Outstanding completions are resolved with `CoordinatorClosed`.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// State owned by the session task
struct Session {
    engine: Arc<dyn VpnEngine>,
    reachability: Arc<dyn ReachabilityMonitor>,
    host: Arc<dyn TunnelHost>,
    app_handler: Arc<dyn AppMessageHandler>,
    reconnect_delay: Duration,
    state: SessionState,
    reasserting: bool,
    start: PendingCompletion<Result<(), TunnelError>>,
    stop: PendingCompletion<Option<TunnelError>>,
    snapshot: watch::Sender<SessionSnapshot>,
    transitions: broadcast::Sender<StateTransition>,
    /// Set when a session ends; events already queued belong to it
    session_ended: bool,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: EngineEventReceiver,
    ) {
        let mut events_open = true;

        loop {
            // Host requests are drained before engine events
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                        if std::mem::take(&mut self.session_ended) {
                            while let Ok(stale) = events.try_recv() {
                                debug!(event = ?stale, "Dropping event from ended session");
                            }
                        }
                    }
                    None => {
                        warn!("Engine event channel closed");
                        events_open = false;
                    }
                },
            }
        }

        commands.close();
        while let Ok(command) = commands.try_recv() {
            command.reject();
        }
        self.close();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, completion } => self.handle_start(config, completion),
            Command::Stop { reason, completion } => self.handle_stop(reason, completion),
            Command::AppMessage {
                message,
                completion,
            } => {
                debug!(len = message.len(), "Handling app message");
                completion(self.app_handler.handle(message));
            }
            Command::Sleep { completion } => {
                debug!("Host going to sleep");
                completion();
            }
            Command::Wake => debug!("Host woke up"),
            Command::Shutdown => {}
        }
    }

    fn handle_start(&mut self, config: TunnelConfiguration, completion: StartCompletion) {
        if !self.state.accepts_start() {
            warn!(state = %self.state, "Rejecting start, session already active");
            completion(Err(TunnelError::SessionActive {
                state: self.state.to_string(),
            }));
            return;
        }

        info!(
            profile_len = config.profile().len(),
            has_credentials = config.credentials().is_some(),
            persist_across_sleep = config.persist_across_sleep(),
            "Starting tunnel"
        );

        if let Err(e) = config.validate() {
            warn!("Invalid tunnel configuration: {}", e);
            completion(Err(e.into()));
            return;
        }

        let properties = match self.engine.apply(&config) {
            Ok(properties) => properties,
            Err(e) => {
                error!("Engine rejected configuration: {}", e);
                completion(Err(TunnelError::EngineApply(e)));
                return;
            }
        };

        if !properties.autologin {
            match config.credentials() {
                Some(credentials) => {
                    if let Err(e) = self.engine.provide(credentials) {
                        error!("Engine rejected credentials: {}", e);
                        completion(Err(TunnelError::EngineApply(e)));
                        return;
                    }
                    debug!(username = credentials.username(), "Credentials provided to engine");
                }
                None => {
                    if config.auto_login() {
                        warn!("Configuration expects auto-login but the profile does not support it");
                    }
                    completion(Err(ConfigError::CredentialsRequired.into()));
                    return;
                }
            }
        }

        self.start_reachability();
        self.start.set(completion);
        self.transition(SessionState::Starting);
        self.engine.connect();
    }

    fn handle_stop(&mut self, reason: StopReason, completion: StopCompletion) {
        info!(%reason, state = %self.state, "Stop requested");

        match self.state {
            SessionState::Idle | SessionState::Disconnected => {
                self.reachability.stop_tracking();
                completion(None);
            }
            SessionState::Starting => {
                debug!("Start still in flight, stop queued until it resolves");
                self.reachability.stop_tracking();
                self.stop.chain(completion);
            }
            SessionState::Connected | SessionState::Reasserting => {
                self.stop.chain(completion);
                self.begin_stopping();
            }
            SessionState::Stopping => {
                debug!("Already stopping, waiting for the same disconnect");
                self.stop.chain(completion);
            }
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Connected => match self.state {
                SessionState::Starting => {
                    info!("VPN connected");
                    self.transition(SessionState::Connected);
                    self.set_reasserting(false);
                    self.start.complete(Ok(()));
                    if self.stop.is_pending() {
                        self.begin_stopping();
                    }
                }
                SessionState::Reasserting => {
                    info!("VPN reconnected");
                    self.transition(SessionState::Connected);
                    self.set_reasserting(false);
                }
                state => debug!(%state, "Ignoring connected event"),
            },
            EngineEvent::Reconnecting => match self.state {
                SessionState::Connected => {
                    info!("VPN reconnecting");
                    self.transition(SessionState::Reasserting);
                    self.set_reasserting(true);
                }
                state => debug!(%state, "Ignoring reconnecting event"),
            },
            EngineEvent::Disconnected => match self.state {
                SessionState::Starting => {
                    self.fail_start(TunnelError::EngineFatal(EngineError::fatal(
                        "engine disconnected before the tunnel was established",
                    )));
                }
                SessionState::Connected | SessionState::Reasserting | SessionState::Stopping => {
                    info!("VPN disconnected");
                    self.end_session(None);
                }
                state => debug!(%state, "Ignoring disconnected event"),
            },
            EngineEvent::FatalError(e) => {
                error!(
                    connection = ?self.engine.connection_info(),
                    "Fatal engine error: {}", e
                );
                match self.state {
                    SessionState::Starting => self.fail_start(TunnelError::EngineFatal(e)),
                    SessionState::Connected
                    | SessionState::Reasserting
                    | SessionState::Stopping => {
                        self.end_session(Some(TunnelError::EngineFatal(e)));
                    }
                    state => debug!(%state, "No session to terminate"),
                }
            }
            EngineEvent::NonFatalError(e) => {
                let error = TunnelError::EngineNonFatal(e);
                warn!(state = %self.state, "{}", error);
            }
            EngineEvent::Log(message) => info!(target: "tunnel_core::engine", "{}", message),
            EngineEvent::ConfigureTunnel(settings) => self.configure_tunnel(settings).await,
        }
    }

    async fn configure_tunnel(&mut self, settings: crate::tunnel::host::NetworkSettings) {
        if !matches!(
            self.state,
            SessionState::Starting | SessionState::Connected | SessionState::Reasserting
        ) {
            debug!(state = %self.state, "Ignoring network settings outside a session");
            self.engine.attach_packet_flow(None);
            return;
        }

        debug!(remote = %settings.remote_address, "Applying tunnel network settings");
        match self.host.apply_network_settings(&settings).await {
            Ok(()) => {
                let flow = Arc::new(HostPacketFlow::new(Arc::clone(&self.host)));
                self.engine.attach_packet_flow(Some(flow));
            }
            Err(e) => {
                error!("Failed to apply tunnel network settings: {}", e);
                self.engine.attach_packet_flow(None);
                let error = TunnelError::from(e);
                if self.state == SessionState::Starting {
                    self.fail_start(error);
                } else {
                    self.end_session(Some(error));
                }
            }
        }
    }

    fn start_reachability(&self) {
        let engine = Arc::clone(&self.engine);
        let delay = self.reconnect_delay;
        let on_change: ReachabilityCallback = Arc::new(move |status| {
            if status == ReachabilityStatus::NotReachable {
                debug!("Network not reachable, waiting for it to come back");
                return;
            }
            info!(%status, ?delay, "Network path changed, requesting reconnect");
            engine.reconnect(delay);
        });
        self.reachability.start_tracking(on_change);
    }

    fn begin_stopping(&mut self) {
        self.transition(SessionState::Stopping);
        self.reachability.stop_tracking();
        self.set_reasserting(false);
        self.engine.disconnect();
    }

    /// Starting resolved with an error; a queued stop completes with it
    fn fail_start(&mut self, error: TunnelError) {
        warn!("Tunnel failed to start: {}", error);
        self.transition(SessionState::Disconnected);
        self.reachability.stop_tracking();
        self.set_reasserting(false);
        // The engine may still be running the failed attempt
        self.engine.cancel();
        self.session_ended = true;
        self.start.complete(Err(error.clone()));
        self.stop.complete(Some(error));
    }

    fn end_session(&mut self, error: Option<TunnelError>) {
        self.transition(SessionState::Disconnected);
        self.reachability.stop_tracking();
        self.set_reasserting(false);
        if error.is_some() {
            self.engine.cancel();
        }
        self.session_ended = true;
        if !self.stop.complete(error.clone()) {
            warn!(error = ?error, "Unsolicited disconnect");
            self.host.unsolicited_disconnect(error);
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition(next) {
            error!(from = %self.state, to = %next, "Refusing undefined session transition");
            return;
        }
        debug!(from = %self.state, to = %next, "Session state changed");
        let _ = self.transitions.send(StateTransition {
            from: self.state,
            to: next,
        });
        self.state = next;
        self.publish();
    }

    fn set_reasserting(&mut self, reasserting: bool) {
        if self.reasserting == reasserting {
            return;
        }
        self.reasserting = reasserting;
        self.host.set_reasserting(reasserting);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            state: self.state,
            reasserting: self.reasserting,
        });
    }

    fn close(&mut self) {
        debug!(state = %self.state, "Tunnel coordinator shutting down");
        self.reachability.stop_tracking();
        if self.state.is_active() {
            self.engine.disconnect();
        }
        self.start.complete(Err(TunnelError::CoordinatorClosed));
        self.stop.complete(Some(TunnelError::CoordinatorClosed));
    }
}
