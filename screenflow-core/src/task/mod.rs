//! Supervision of a session's background loops.
//!
//! Every loop runs as its own tokio task under one shared
//! [`CancellationToken`]. The first loop to fail records a [`LoopError`]
//! and cancels the token, which unwinds all siblings. Errors raised after
//! cancellation are fallout and are only logged.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{LoopError, ScreenflowError};

/// Owns the cancellation token and the join handles of named loops.
#[derive(Debug)]
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    failure_tx: watch::Sender<Option<LoopError>>,
    failure_rx: watch::Receiver<Option<LoopError>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Supervise under an existing token (e.g. a child of the caller's).
    pub fn with_token(cancel: CancellationToken) -> Self {
        let (failure_tx, failure_rx) = watch::channel(None);
        Self {
            cancel,
            tasks: Vec::new(),
            failure_tx,
            failure_rx,
        }
    }

    /// The token every loop should observe.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a named loop.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = Result<(), ScreenflowError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let failure_tx = self.failure_tx.clone();

        let handle = tokio::spawn(async move {
            debug!(task = name, "loop started");
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ScreenflowError::Other("loop panicked".into())),
            };

            match outcome {
                Ok(()) => debug!(task = name, "loop finished"),
                Err(e) if cancel.is_cancelled() => {
                    debug!(task = name, error = %e, "loop error after cancellation");
                }
                Err(e) => {
                    error!(task = name, error = %e, "loop failed");
                    let failure = LoopError {
                        name,
                        message: e.to_string(),
                    };
                    failure_tx.send_if_modified(|slot| {
                        if slot.is_none() {
                            *slot = Some(failure);
                            true
                        } else {
                            false
                        }
                    });
                    cancel.cancel();
                }
            }
        });
        self.tasks.push((name, handle));
    }

    /// The first recorded loop failure, if any.
    pub fn failure(&self) -> Option<LoopError> {
        self.failure_rx.borrow().clone()
    }

    /// Receiver that observes the failure slot.
    pub fn failure_watch(&self) -> watch::Receiver<Option<LoopError>> {
        self.failure_rx.clone()
    }

    /// Names of loops spawned so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel every loop and wait for all of them to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for (name, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "loop did not exit cleanly");
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait until `rx` reports a failure.
///
/// Pends forever once the supervisor is gone without one.
pub async fn wait_failure(mut rx: watch::Receiver<Option<LoopError>>) -> LoopError {
    let found = rx
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|slot| slot.clone());
    match found {
        Some(failure) => failure,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_failure_cancels_siblings() {
        let mut sup = Supervisor::new();
        let token = sup.token();

        sup.spawn("idle", {
            let token = token.clone();
            async move {
                token.cancelled().await;
                Err(ScreenflowError::Cancelled)
            }
        });
        sup.spawn("broken", async { Err(ScreenflowError::Transport("reset".into())) });

        let failure = wait_failure(sup.failure_watch()).await;
        assert_eq!(failure.name, "broken");
        assert!(failure.message.contains("reset"));

        sup.shutdown().await;
        assert!(token.is_cancelled());
        // The sibling's post-cancel error was not recorded.
        assert_eq!(sup.failure().unwrap().name, "broken");
    }

    #[tokio::test]
    async fn clean_exit_does_not_cancel() {
        let mut sup = Supervisor::new();
        sup.spawn("done", async { Ok(()) });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!sup.is_cancelled());
        assert!(sup.failure().is_none());
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn panic_is_recorded_as_failure() {
        let mut sup = Supervisor::new();
        sup.spawn("panicky", async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let failure = wait_failure(sup.failure_watch()).await;
        assert_eq!(failure.name, "panicky");
        assert!(sup.is_cancelled());
    }

    #[tokio::test]
    async fn drop_cancels_token() {
        let sup = Supervisor::new();
        let token = sup.token();
        drop(sup);
        assert!(token.is_cancelled());
    }
}
