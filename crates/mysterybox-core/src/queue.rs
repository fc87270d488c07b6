//! Durable offline action queue with replay on reconnect.
//!
//! Requests that fail because the device is offline are stored here and
//! replayed oldest first once connectivity returns. The queue lives in the
//! shared [`KeyValueStore`] as one JSON array, rewritten whole on every
//! change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::events::Connectivity;
use crate::storage::KeyValueStore;

/// Tag of the queue holding mint submissions.
pub const MINT_QUEUE_TAG: &str = "mint-queue";

/// One HTTP request waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedAction {
    /// A JSON `POST` created at `now`.
    pub fn post_json(url: impl Into<String>, body: String, now: DateTime<Utc>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            id: Uuid::new_v4(),
            method: "POST".to_string(),
            url: url.into(),
            headers,
            body,
            enqueued_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        now - self.enqueued_at > retention
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a stored action over the network.
///
/// Any response, including non-2xx, is `Ok`. `Err` with
/// [`CoreError::is_connectivity`] means the request never completed.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, action: &QueuedAction) -> Result<TransportResponse>;
}

/// [`HttpTransport`] over reqwest.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, action: &QueuedAction) -> Result<TransportResponse> {
        let method = reqwest::Method::from_bytes(action.method.as_bytes()).map_err(|_| {
            CoreError::InvalidArgument(format!("unsupported HTTP method: {}", action.method))
        })?;
        let mut req = self.http.request(method, &action.url);
        for (name, value) in &action.headers {
            req = req.header(name, value);
        }
        let resp = req.body(action.body.clone()).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Outcome counts of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub remaining: usize,
}

/// Durable FIFO of [`QueuedAction`]s.
pub struct ActionQueue {
    tag: String,
    store: Arc<dyn KeyValueStore>,
    retention: chrono::Duration,
    write: Mutex<()>,
    drain: tokio::sync::Mutex<()>,
}

impl ActionQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, tag: &str, retention: chrono::Duration) -> Self {
        Self {
            tag: tag.to_string(),
            store,
            retention,
            write: Mutex::new(()),
            drain: tokio::sync::Mutex::new(()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    fn key(&self) -> String {
        format!("queue.{}", self.tag)
    }

    /// Queued actions, oldest first. A malformed stored value reads as empty.
    pub fn pending(&self) -> Result<Vec<QueuedAction>> {
        let Some(raw) = self.store.get(&self.key())? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(actions) => Ok(actions),
            Err(e) => {
                tracing::warn!(queue = %self.tag, error = %e, "discarding unreadable queue");
                Ok(Vec::new())
            }
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn push(&self, action: QueuedAction) -> Result<()> {
        self.update(|actions| actions.push(action))?;
        tracing::info!(queue = %self.tag, "action queued for replay");
        Ok(())
    }

    /// Drop every action older than the retention window.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = self.retention;
        self.update(|actions| {
            let before = actions.len();
            actions.retain(|a| !a.is_expired(now, retention));
            before - actions.len()
        })
    }

    /// Drain the queue through `transport`, oldest first.
    ///
    /// Each action leaves the queue before it is sent. A connectivity failure
    /// puts it back at the head and stops the drain; a non-2xx answer drops it.
    pub async fn replay(
        &self,
        transport: &dyn HttpTransport,
        now: DateTime<Utc>,
    ) -> Result<ReplayReport> {
        let _draining = self.drain.lock().await;
        let mut report = ReplayReport {
            expired: self.purge_expired(now)?,
            ..ReplayReport::default()
        };

        while let Some(action) = self.pop_front()? {
            match transport.send(&action).await {
                Ok(resp) if resp.is_success() => {
                    report.replayed += 1;
                    tracing::info!(queue = %self.tag, id = %action.id, "replayed queued action");
                }
                Ok(resp) => {
                    report.rejected += 1;
                    tracing::warn!(
                        queue = %self.tag,
                        id = %action.id,
                        status = resp.status,
                        body = %resp.body,
                        "queued action rejected, dropping"
                    );
                }
                Err(e) if e.is_connectivity() => {
                    tracing::debug!(queue = %self.tag, error = %e, "still offline, replay paused");
                    self.update(|actions| actions.insert(0, action))?;
                    break;
                }
                Err(e) => {
                    report.rejected += 1;
                    tracing::warn!(queue = %self.tag, id = %action.id, error = %e, "queued action failed, dropping");
                }
            }
        }

        report.remaining = self.len()?;
        Ok(report)
    }

    fn pop_front(&self) -> Result<Option<QueuedAction>> {
        self.update(|actions| {
            if actions.is_empty() {
                None
            } else {
                Some(actions.remove(0))
            }
        })
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<QueuedAction>) -> T) -> Result<T> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut actions = self.pending()?;
        let out = f(&mut actions);
        if actions.is_empty() {
            self.store.remove(&self.key())?;
        } else {
            self.store.set(&self.key(), &serde_json::to_string(&actions)?)?;
        }
        Ok(out)
    }
}

/// Background task replaying a queue whenever the device comes online.
pub struct ReplayWorker {
    reports: watch::Receiver<Option<ReplayReport>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayWorker {
    /// Drain at start when online, then on every offline to online change.
    pub fn spawn(
        queue: Arc<ActionQueue>,
        transport: Arc<dyn HttpTransport>,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self {
        let (tx, reports) = watch::channel(None);
        let task = tokio::spawn(replay_loop(queue, transport, connectivity, tx));
        Self {
            reports,
            task: Mutex::new(Some(task)),
        }
    }

    /// Report of the most recent drain.
    pub fn subscribe(&self) -> watch::Receiver<Option<ReplayReport>> {
        self.reports.clone()
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

impl Drop for ReplayWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn replay_loop(
    queue: Arc<ActionQueue>,
    transport: Arc<dyn HttpTransport>,
    mut connectivity: watch::Receiver<Connectivity>,
    reports: watch::Sender<Option<ReplayReport>>,
) {
    let mut online = *connectivity.borrow_and_update() == Connectivity::Online;
    if online {
        drain(&queue, transport.as_ref(), &reports).await;
    }

    while connectivity.changed().await.is_ok() {
        let now_online = *connectivity.borrow_and_update() == Connectivity::Online;
        if now_online && !online {
            drain(&queue, transport.as_ref(), &reports).await;
        }
        online = now_online;
    }
}

async fn drain(
    queue: &ActionQueue,
    transport: &dyn HttpTransport,
    reports: &watch::Sender<Option<ReplayReport>>,
) {
    match queue.replay(transport, Utc::now()).await {
        Ok(report) => {
            if report.replayed + report.rejected + report.expired > 0 {
                tracing::info!(queue = %queue.tag(), ?report, "queue drained");
            }
            reports.send_replace(Some(report));
        }
        Err(e) => tracing::warn!(queue = %queue.tag(), error = %e, "queue replay failed"),
    }
}
