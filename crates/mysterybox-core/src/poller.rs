//! Visibility-aware balance polling.
//!
//! One tokio task per [`BalancePoller`]. The task owns the only timer, so a
//! handle never has more than one pending tick and fetches never overlap:
//!
//! ```text
//! visible:  fetch -> settle -> wait(interval) -> fetch -> ...
//! hidden:   pending wait cancelled, nothing scheduled
//! visible': fetch immediately
//! stopped:  task aborted, in-flight result discarded
//! ```

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::events::Visibility;

/// Observable state of one poller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollState {
    /// False once the poller has been stopped; no field changes afterwards.
    pub active: bool,
    pub last_balance: Option<f64>,
    pub last_error: Option<String>,
}

/// Handle to a running balance poll loop.
pub struct BalancePoller {
    state: Arc<watch::Sender<PollState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BalancePoller {
    /// Start polling `fetcher` every `interval` while `visibility` is visible.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(
        fetcher: F,
        interval: Duration,
        visibility: watch::Receiver<Visibility>,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<f64>> + Send + 'static,
    {
        let state = Arc::new(watch::Sender::new(PollState {
            active: true,
            ..PollState::default()
        }));
        let task = tokio::spawn(poll_loop(fetcher, interval, visibility, state.clone()));
        Self {
            state,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop polling. Idempotent; safe to call from a state observer.
    pub fn stop(&self) {
        let was_active = self.state.send_if_modified(|s| {
            let was = s.active;
            s.active = false;
            was
        });
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        if was_active {
            tracing::debug!("balance poller stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }
}

impl Drop for BalancePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<F, Fut>(
    fetcher: F,
    interval: Duration,
    mut visibility: watch::Receiver<Visibility>,
    state: Arc<watch::Sender<PollState>>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<f64>>,
{
    loop {
        let visible = visibility.borrow_and_update().is_visible();
        if !visible && visibility.wait_for(|v| v.is_visible()).await.is_err() {
            tracing::debug!("visibility source closed, polling ends");
            return;
        }
        if !state.borrow().active {
            return;
        }

        let outcome = fetcher().await;

        // Checked under the state lock: a stop that lands while the fetch was
        // in flight wins and the result is dropped.
        let published = state.send_if_modified(|s| {
            if !s.active {
                return false;
            }
            match &outcome {
                Ok(balance) => {
                    s.last_balance = Some(*balance);
                    s.last_error = None;
                }
                Err(e) => {
                    s.last_balance = None;
                    s.last_error = Some(e.to_string());
                }
            }
            true
        });
        if !published {
            return;
        }
        match &outcome {
            Ok(balance) => tracing::debug!(balance, "balance refreshed"),
            Err(e) => tracing::warn!(error = %e, "balance fetch failed, retrying next tick"),
        }

        // A flip during the fetch is handled at the top of the loop without
        // waiting: hidden parks the loop, visible polls right away.
        let flipped = visibility.has_changed().unwrap_or(false);
        if flipped || !visibility.borrow().is_visible() {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = visibility.changed() => {
                if changed.is_err() {
                    tracing::debug!("visibility source closed, polling ends");
                    return;
                }
            }
        }
    }
}
