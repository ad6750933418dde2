//! OpenVPN process engine
//!
//! Implements [`VpnEngine`] by running an `openvpn` executable. The applied
//! profile and credentials are written to private temporary files, the
//! process output is parsed into engine events, and lifecycle requests are
//! delivered as POSIX signals.

pub mod output_parser;
pub mod process;

use std::io::Write;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::EngineError;
use crate::tunnel::{EngineEvent, EngineEventSender, EngineProperties, VpnEngine};
use crate::types::{Credentials, TunnelConfiguration};

pub use output_parser::OutputParser;

/// Grace period between SIGTERM and SIGKILL on disconnect
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Directives extracted from an OpenVPN profile
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileSummary {
    /// First `remote` host
    pub remote_host: Option<String>,

    /// `auth-user-pass` without a file argument: credentials must be supplied
    pub needs_credentials: bool,

    /// Profile carries inline `<connection>` blocks instead of `remote` lines
    pub has_connection_blocks: bool,
}

impl ProfileSummary {
    /// Scan a profile for the directives the engine cares about
    pub fn parse(profile: &str) -> Self {
        let mut summary = Self::default();

        for line in profile.lines() {
            let line = line.trim();
            if line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let mut words = line.split_whitespace();
            match words.next() {
                Some("remote") if summary.remote_host.is_none() => {
                    summary.remote_host = words.next().map(str::to_string);
                }
                Some("auth-user-pass") => {
                    summary.needs_credentials = words.next().is_none();
                }
                Some("<connection>") => summary.has_connection_blocks = true,
                _ => {}
            }
        }

        summary
    }
}

#[derive(Default)]
struct EngineInner {
    profile: Option<NamedTempFile>,
    auth_file: Option<NamedTempFile>,
    persist_tun: bool,
    remote_host: Option<String>,
    pid: Option<u32>,
    stopping: bool,
    /// Bumped for every process; output from older ones is discarded
    generation: u64,
}

/// VPN engine backed by an OpenVPN child process
pub struct OpenVpnProcessEngine {
    binary: String,
    events: EngineEventSender,
    parser: Arc<OutputParser>,
    inner: Arc<Mutex<EngineInner>>,
}

impl OpenVpnProcessEngine {
    /// Create an engine that runs `binary` and reports through `events`
    #[tracing::instrument(skip(events))]
    pub fn new(binary: impl Into<String> + std::fmt::Debug, events: EngineEventSender) -> Self {
        Self {
            binary: binary.into(),
            events,
            parser: Arc::new(OutputParser::new()),
            inner: Arc::new(Mutex::new(EngineInner::default())),
        }
    }

    fn inner(&self) -> MutexGuard<'_, EngineInner> {
        lock(&self.inner)
    }

    /// PID of the running OpenVPN process
    pub fn pid(&self) -> Option<u32> {
        self.inner().pid
    }

    /// Start a new generation and hand back the process it replaces
    fn supersede(&self) -> (u64, Option<u32>) {
        let mut inner = self.inner();
        inner.generation += 1;
        inner.stopping = false;
        (inner.generation, inner.pid.take())
    }

    fn build_command(&self) -> Result<Command, EngineError> {
        let inner = self.inner();
        let profile = inner
            .profile
            .as_ref()
            .ok_or_else(|| EngineError::fatal("No configuration applied"))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--config").arg(profile.path());
        if let Some(auth_file) = &inner.auth_file {
            cmd.arg("--auth-user-pass").arg(auth_file.path());
        }
        if inner.persist_tun {
            cmd.arg("--persist-tun");
        }
        cmd.arg("--verb")
            .arg("3")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(cmd)
    }
}

fn lock(inner: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forward `event` unless the process that produced it has been superseded
fn send_if_current(
    inner: &Mutex<EngineInner>,
    generation: u64,
    events: &EngineEventSender,
    event: EngineEvent,
) -> bool {
    let inner = lock(inner);
    inner.generation == generation && events.send(event)
}

fn terminate_in_background(pid: u32) {
    tokio::spawn(async move {
        if let Err(e) = process::terminate_process(pid, TERMINATE_GRACE).await {
            tracing::error!("Failed to terminate OpenVPN: {}", e);
        }
    });
}

impl VpnEngine for OpenVpnProcessEngine {
    fn apply(&self, config: &TunnelConfiguration) -> Result<EngineProperties, EngineError> {
        let text = String::from_utf8_lossy(config.profile());
        let summary = ProfileSummary::parse(&text);

        if summary.remote_host.is_none() && !summary.has_connection_blocks {
            return Err(EngineError::fatal("Profile has no remote directive"));
        }

        let mut file = NamedTempFile::new()
            .map_err(|e| EngineError::fatal(format!("Failed to create profile file: {}", e)))?;
        file.write_all(config.profile())
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::fatal(format!("Failed to write profile file: {}", e)))?;

        let mut inner = self.inner();
        inner.profile = Some(file);
        inner.auth_file = None;
        inner.persist_tun = config.persist_across_sleep();
        inner.remote_host = summary.remote_host.clone();

        tracing::debug!(
            remote = ?summary.remote_host,
            needs_credentials = summary.needs_credentials,
            "Applied OpenVPN profile"
        );

        Ok(EngineProperties {
            autologin: !summary.needs_credentials,
            remote_host: summary.remote_host,
        })
    }

    fn provide(&self, credentials: &Credentials) -> Result<(), EngineError> {
        let mut file = NamedTempFile::new()
            .map_err(|e| EngineError::fatal(format!("Failed to create credentials file: {}", e)))?;
        writeln!(file, "{}", credentials.username())
            .and_then(|_| writeln!(file, "{}", credentials.expose_password()))
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::fatal(format!("Failed to write credentials file: {}", e)))?;

        self.inner().auth_file = Some(file);
        Ok(())
    }

    fn connect(&self) {
        let (generation, previous) = self.supersede();
        if let Some(pid) = previous {
            tracing::warn!(pid, "Previous OpenVPN process still running, terminating it");
            terminate_in_background(pid);
        }

        let mut cmd = match self.build_command() {
            Ok(cmd) => cmd,
            Err(e) => {
                self.events.send(EngineEvent::FatalError(e));
                return;
            }
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.events.send(EngineEvent::FatalError(EngineError::fatal(format!(
                    "Failed to spawn {}: {}",
                    self.binary, e
                ))));
                return;
            }
        };

        let pid = child.id();
        self.inner().pid = pid;
        tracing::info!(?pid, generation, "OpenVPN process spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let parser = Arc::clone(&self.parser);
        let events = self.events.clone();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let events = events.clone();
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        tracing::debug!("OpenVPN stderr: {}", line);
                        let event = EngineEvent::NonFatalError(EngineError::non_fatal(line));
                        if !send_if_current(&inner, generation, &events, event) {
                            break;
                        }
                    }
                });
            }

            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !send_if_current(&inner, generation, &events, parser.parse_line(&line)) {
                        break;
                    }
                }
            }

            let status = child.wait().await;

            // Held while sending so a later connect or cancel cannot interleave
            let mut state = lock(&inner);
            if state.generation != generation {
                tracing::debug!(?pid, ?status, "Superseded OpenVPN process exited");
                return;
            }
            state.pid = None;
            let stopping = std::mem::take(&mut state.stopping);

            match status {
                Ok(status) if status.success() || stopping => {
                    tracing::info!(%status, "OpenVPN process exited");
                    events.send(EngineEvent::Disconnected);
                }
                Ok(status) => {
                    events.send(EngineEvent::FatalError(EngineError::fatal(format!(
                        "OpenVPN exited unexpectedly with {}",
                        status
                    ))));
                }
                Err(e) => {
                    events.send(EngineEvent::FatalError(EngineError::fatal(format!(
                        "Failed to wait for OpenVPN: {}",
                        e
                    ))));
                }
            }
        });
    }

    fn disconnect(&self) {
        let pid = {
            let mut inner = self.inner();
            inner.stopping = true;
            inner.pid
        };

        match pid {
            Some(pid) => terminate_in_background(pid),
            // The process exit has already been reported
            None => tracing::debug!("No OpenVPN process running"),
        }
    }

    fn cancel(&self) {
        let (generation, pid) = self.supersede();
        tracing::debug!(?pid, generation, "Abandoning OpenVPN process");
        if let Some(pid) = pid {
            terminate_in_background(pid);
        }
    }

    fn reconnect(&self, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        let generation = self.inner().generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let pid = {
                let inner = lock(&inner);
                inner.pid.filter(|_| inner.generation == generation)
            };
            match pid {
                Some(pid) => {
                    if let Err(e) = process::request_soft_restart(pid) {
                        tracing::warn!("Failed to request OpenVPN restart: {}", e);
                    }
                }
                None => tracing::debug!("No OpenVPN process to restart"),
            }
        });
    }

    fn connection_info(&self) -> Option<String> {
        let inner = self.inner();
        inner.pid.map(|pid| {
            format!(
                "openvpn pid {} remote {}",
                pid,
                inner.remote_host.as_deref().unwrap_or("unknown")
            )
        })
    }
}
