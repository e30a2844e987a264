//! Coordinated graceful shutdown (§10.5).
//!
//! A `tokio::sync::watch` channel is enough here: every consumer only
//! needs to know "has shutdown fired yet", not an ordered stream of
//! distinct messages, so a single-slot watch is simpler than a broadcast
//! channel and never needs buffering.

use tokio::signal;
use tokio::sync::watch;

/// Flips the shared shutdown flag; held by `main` and dropped once every
/// background task has been told to stop.
#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Signal every outstanding [`ShutdownSignal`] that shutdown has begun.
    /// Idempotent: calling it more than once just re-sends `true`.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Handed to every background task that needs to stop cleanly; `wait()`
/// resolves once [`ShutdownController::shutdown`] has been called.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has fired. Safe to call repeatedly, and safe
    /// to call after shutdown already fired (resolves immediately).
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // `changed()` only errors if the sender was dropped, which would
        // itself mean the process is tearing down; either way, proceed.
        let _ = self.rx.changed().await;
    }

    /// Non-blocking check, for call sites that poll rather than await.
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Construct a linked controller/signal pair, starting in the "not
/// shutting down" state.
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

/// Waits for SIGTERM (the signal a Kubernetes-managed pod receives on
/// eviction/rollout) or Ctrl-C, whichever comes first, and returns which
/// one fired as a static string for logging. Only SIGTERM is meaningful
/// under a real kubelet, but Ctrl-C is kept for local `cargo run`.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                // No SIGTERM handler available; fall back to Ctrl-C only.
                let _ = signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = signal::ctrl_c() => "SIGINT",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        "SIGINT"
    }
}
