//! Orderly shutdown: stop broadcasting, then disconnect every session.
//!
//! [`ShutdownSignal`] listens for the termination signals:
//!
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`.
//!
//! **Windows platforms:** `Ctrl-C` via [`tokio::signal::windows::ctrl_c`].

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use super::SessionSupervisor;
use crate::domain::SubscriberRegistry;

/// Outcome of [`ShutdownCoordinator::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Sessions whose disconnect completed.
    pub disconnected: usize,
    /// Sessions whose disconnect did not finish within the timeout.
    pub timed_out: usize,
}

/// Tears down the gateway's sessions on termination.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    supervisor: Arc<SessionSupervisor>,
    subscribers: Arc<SubscriberRegistry>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator for the given supervisor and registry.
    #[must_use]
    pub fn new(supervisor: Arc<SessionSupervisor>, subscribers: Arc<SubscriberRegistry>) -> Self {
        Self {
            supervisor,
            subscribers,
        }
    }

    /// Runs the shutdown sequence.
    ///
    /// Closes the subscriber registry first so nothing is broadcast once
    /// shutdown begins, then drains the active set and disconnects every
    /// session concurrently. Each disconnect is bounded by the supervisor's
    /// disconnect timeout; the call returns once all attempts are done.
    pub async fn shutdown(&self) -> ShutdownReport {
        tracing::warn!("shutdown requested, disconnecting clients");
        self.subscribers.close();

        let clients = self.supervisor.drain().await;
        let timeout = self.supervisor.disconnect_timeout();
        let outcomes = join_all(clients.into_iter().map(|c| c.tear_down(timeout))).await;

        let completed = outcomes.iter().filter(|o| o.completed).count();
        let report = ShutdownReport {
            disconnected: completed,
            timed_out: outcomes.len().saturating_sub(completed),
        };
        tracing::info!(
            disconnected = report.disconnected,
            timed_out = report.timed_out,
            "shutdown complete"
        );
        report
    }
}

/// Termination signals, registered once and awaited later.
///
/// Handlers are installed by [`listen`](Self::listen). Signals that arrive
/// before [`recv`](Self::recv) is awaited are queued.
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignal {
    /// Installs the process signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    #[cfg(unix)]
    pub fn listen() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Installs the process signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    #[cfg(windows)]
    pub fn listen() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Completes on the next signal and returns its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }

    /// Completes on the next signal and returns its name.
    #[cfg(windows)]
    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "CTRL_C"
    }
}
