//! OpenVPN process signalling
//!
//! Graceful termination and soft-restart signals for a running OpenVPN
//! process.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::time::sleep;

/// Error types for process operations
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to signal process {pid}: {source}")]
    SignalFailed { pid: u32, source: nix::Error },

    #[error("Process did not respond to signals")]
    UnresponsiveProcess,
}

fn to_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}

/// Check if a process with this PID exists
pub fn is_process_alive(pid: u32) -> bool {
    kill(to_pid(pid), None).is_ok()
}

/// Send a signal to a process
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), ProcessError> {
    kill(to_pid(pid), signal).map_err(|source| ProcessError::SignalFailed { pid, source })
}

/// Ask OpenVPN to restart its connection without exiting
pub fn request_soft_restart(pid: u32) -> Result<(), ProcessError> {
    send_signal(pid, Signal::SIGUSR1)
}

/// Terminate a process gracefully
///
/// Sends SIGTERM first, waits up to `grace`, then sends SIGKILL if still alive.
pub async fn terminate_process(pid: u32, grace: Duration) -> Result<(), ProcessError> {
    if !is_process_alive(pid) {
        return Ok(());
    }

    tracing::info!("Sending SIGTERM to OpenVPN process {}", pid);
    send_signal(pid, Signal::SIGTERM)?;

    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < grace {
        sleep(step).await;
        waited += step;
        if !is_process_alive(pid) {
            return Ok(());
        }
    }

    tracing::warn!("Graceful shutdown timed out, sending SIGKILL to {}", pid);
    send_signal(pid, Signal::SIGKILL)?;
    sleep(Duration::from_millis(200)).await;

    if is_process_alive(pid) {
        Err(ProcessError::UnresponsiveProcess)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_with_nonexistent_pid() {
        assert!(!is_process_alive(99999999));
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[tokio::test]
    async fn test_terminate_nonexistent_process() {
        let result = terminate_process(99999999, Duration::from_millis(100)).await;
        assert!(result.is_ok());
    }
}
