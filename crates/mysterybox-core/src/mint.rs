//! Mystery box mint submission.
//!
//! Opening a box draws a badge class, then POSTs a mint request. When the
//! device is offline the request is parked in the [`ActionQueue`] and sent
//! later by the replay worker; the caller still gets `Ok`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::queue::{ActionQueue, HttpTransport, QueuedAction};
use crate::rng::{self, EntropySource, BADGE_CLASSES};

/// Body of a mint request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub account: String,
    pub badge_class: u32,
    /// Correlation id, stable across offline replay.
    pub client_seed: Uuid,
    /// Epoch milliseconds.
    pub ts: i64,
}

impl MintRequest {
    /// Draw a badge class for `account` from the OS entropy source.
    ///
    /// # Errors
    /// `NotConnected` when `account` is empty.
    pub fn open_box(account: &str, now: DateTime<Utc>) -> Result<Self> {
        Self::open_box_with(&mut rng::OsEntropy, account, now)
    }

    pub fn open_box_with<E: EntropySource + ?Sized>(
        entropy: &mut E,
        account: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if account.trim().is_empty() {
            return Err(CoreError::NotConnected);
        }
        Ok(Self {
            account: account.to_string(),
            badge_class: rng::pick_with(entropy, BADGE_CLASSES)?,
            client_seed: rng::new_correlation_id(),
            ts: now.timestamp_millis(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MintOutcome {
    Submitted,
    /// Offline; the request will be replayed when connectivity returns.
    Queued,
}

impl MintOutcome {
    /// Status line shown to the user.
    pub fn message(self) -> &'static str {
        match self {
            MintOutcome::Submitted => "Mint submitted",
            MintOutcome::Queued => "Queued offline (will sync)",
        }
    }
}

pub struct MintClient {
    endpoint: String,
    transport: Arc<dyn HttpTransport>,
    queue: Arc<ActionQueue>,
}

impl MintClient {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        queue: Arc<ActionQueue>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            queue,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the request now, or queue it when offline.
    ///
    /// # Errors
    /// `MintRejected` for a non-2xx answer (not queued, not retried).
    pub async fn submit(&self, request: &MintRequest) -> Result<MintOutcome> {
        let action = QueuedAction::post_json(
            self.endpoint.clone(),
            serde_json::to_string(request)?,
            Utc::now(),
        );

        match self.transport.send(&action).await {
            Ok(resp) if resp.is_success() => {
                tracing::info!(
                    badge_class = request.badge_class,
                    client_seed = %request.client_seed,
                    "mint submitted"
                );
                Ok(MintOutcome::Submitted)
            }
            Ok(resp) => Err(CoreError::MintRejected {
                status: resp.status,
                body: resp.body,
            }),
            Err(e) if e.is_connectivity() => {
                tracing::info!(error = %e, client_seed = %request.client_seed, "offline, queueing mint");
                self.queue.push(action)?;
                Ok(MintOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }
}
