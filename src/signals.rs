//! Termination signal handling

use anyhow::{Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Handlers for the signals that stop the collector
///
/// Registration happens up front so a failure is reported at startup
/// rather than after the collector is already running.
#[cfg(unix)]
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
    quit: Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    pub fn register() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
            quit: signal(SignalKind::quit()).context("Failed to register SIGQUIT handler")?,
        })
    }

    /// Wait for the next signal and return its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
pub struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    pub fn register() -> Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(_) => std::future::pending().await,
        }
    }
}

/// Spawn a task that flips `shutdown` to `true` on the first termination signal
pub fn spawn_listener(mut signals: TerminationSignals, shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = signals.recv().await;
        info!("Received {}, shutting down", name);
        let _ = shutdown.send(true);
    })
}
