//! Interrupt handling
//!
//! One root token per process. Jobs hold child tokens, so cancelling the root
//! reaches whichever job is running without any global handler state.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Hands out cancellation tokens and cancels them on Ctrl-C
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    root: CancellationToken,
}

impl CancellationGate {
    /// Create a gate with a fresh root token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the root token when the process receives an interrupt.
    ///
    /// The listener exits on its own once the root is cancelled by other means.
    pub fn listen_for_interrupt(&self) -> JoinHandle<()> {
        let root = self.root.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Interrupt received, saving progress");
                        root.cancel();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for interrupt"),
                },
            }
        })
    }

    /// Token for one job
    pub fn register(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancel every registered job
    pub fn trigger(&self) {
        self.root.cancel();
    }

    /// Whether the gate has been triggered
    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }
}
