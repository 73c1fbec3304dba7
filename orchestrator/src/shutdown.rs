//! Cooperative cancellation for a run
//!
//! The signal handler never touches run state. It asks the supervisor to
//! SIGTERM every child and then flips the shared cancellation flag; the
//! orchestrator notices the flag at its next wait and unwinds.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::traits::ProcessSupervisor;
use shared::{logging, process_warn, ProcessId};

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(None).0),
        }
    }

    /// Cancel the run; only the first reason is kept
    pub fn trigger(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<String>>,
}

impl ShutdownListener {
    /// Point in time check; `Some(reason)` once the run has been cancelled
    pub fn reason(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }

    /// Resolves with the reason once cancelled. Never resolves if every
    /// handle is dropped without triggering.
    pub async fn wait(&mut self) -> String {
        loop {
            if let Some(reason) = self.receiver.borrow_and_update().clone() {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return "received Ctrl+C",
                    _ = sigterm.recv() => return "received SIGTERM",
                }
            }
            Err(e) => {
                logging::log_error(&ProcessId::Runner, "SIGTERM handler setup", &e);
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => "received Ctrl+C",
        Err(e) => {
            logging::log_error(&ProcessId::Runner, "Signal handling", &e);
            std::future::pending().await
        }
    }
}

/// Spawn the task that turns an OS signal into child termination plus
/// run cancellation
pub fn install_signal_handler<S>(supervisor: Arc<S>, shutdown: ShutdownHandle) -> JoinHandle<()>
where
    S: ProcessSupervisor + 'static,
{
    install_shutdown_on(
        async { wait_for_signal().await.to_string() },
        supervisor,
        shutdown,
    )
}

/// Once `signal` resolves, SIGTERM every supervised child and only then
/// cancel the run with the reason it resolved to
pub fn install_shutdown_on<F, S>(signal: F, supervisor: Arc<S>, shutdown: ShutdownHandle) -> JoinHandle<()>
where
    F: Future<Output = String> + Send + 'static,
    S: ProcessSupervisor + 'static,
{
    tokio::spawn(async move {
        let reason = signal.await;
        logging::log_shutdown(&ProcessId::Runner, &reason);

        let signalled = supervisor.terminate_all_active().await;
        process_warn!(ProcessId::Runner, "Sent SIGTERM to {} active process group(s)", signalled);

        shutdown.trigger(reason);
    })
}
