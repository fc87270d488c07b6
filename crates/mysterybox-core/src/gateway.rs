//! Ledger gateway balance lookup.
//!
//! The gateway has returned fungible holdings in more than one JSON layout
//! over time. [`FungiblesShape`] detects the layout explicitly; when a body
//! carries several, the nested `fungible_resources.items` list wins.

use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{CoreError, GatewayError, Result};
use crate::storage::config::GatewayConfig;

const FUNGIBLES_PATH: &str = "/state/entity/page/fungibles";
const SAMPLE_LOG_EVERY: Duration = Duration::from_secs(60);

/// Known layouts of the fungibles response, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FungiblesShape {
    /// `{ "fungible_resources": { "items": [...] } }`
    V2Nested,
    /// `{ "items": [...] }`
    V1Items,
    /// `[...]`
    FlatList,
}

impl FungiblesShape {
    /// Detect the layout of `resp`, preferring the newest.
    pub fn detect(resp: &Value) -> Option<Self> {
        if resp
            .pointer("/fungible_resources/items")
            .is_some_and(Value::is_array)
        {
            Some(Self::V2Nested)
        } else if resp.get("items").is_some_and(Value::is_array) {
            Some(Self::V1Items)
        } else if resp.is_array() {
            Some(Self::FlatList)
        } else {
            None
        }
    }

    fn items(self, resp: &Value) -> &[Value] {
        let list = match self {
            Self::V2Nested => resp.pointer("/fungible_resources/items"),
            Self::V1Items => resp.get("items"),
            Self::FlatList => Some(resp),
        };
        list.and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Amount of `token_address` held according to `resp`, or 0 when the token
/// is not listed or its amount cannot be read.
pub fn extract_amount(resp: &Value, token_address: &str) -> f64 {
    let Some(shape) = FungiblesShape::detect(resp) else {
        return 0.0;
    };

    let entry = shape.items(resp).iter().find(|item| {
        item.get("resource_address")
            .or_else(|| item.get("address"))
            .and_then(Value::as_str)
            == Some(token_address)
    });

    entry
        .and_then(|item| item.get("amount"))
        .and_then(parse_amount)
        .unwrap_or(0.0)
}

fn parse_amount(amount: &Value) -> Option<f64> {
    match amount {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(obj) => obj.get("value").and_then(parse_amount),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// reqwest client bounded by `gateway.timeout_ms`, so a stalled response
/// surfaces as a timeout instead of hanging the caller.
pub fn build_http_client(config: &GatewayConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(config.timeout()).build()?)
}

/// HTTP client for the gateway's entity-state endpoint.
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    last_sample: Mutex<Option<Instant>>,
}

impl GatewayClient {
    /// Client with the configured request timeout.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client(&config)?, config))
    }

    pub fn with_client(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self {
            http,
            config,
            last_sample: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Check that `address` lives on the configured network.
    pub fn ensure_account_network(&self, address: &str) -> Result<()> {
        if address.starts_with(&self.config.account_prefix) {
            Ok(())
        } else {
            Err(CoreError::WrongNetwork {
                address: address.to_string(),
                expected_prefix: self.config.account_prefix.clone(),
            })
        }
    }

    /// Fetch the raw fungibles page for `address`.
    ///
    /// # Errors
    /// `Gateway` for non-2xx responses (with the body text), and
    /// `NetworkUnavailable` when the request never completes.
    pub async fn fetch_entity_fungibles(&self, address: &str) -> Result<Value> {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), FUNGIBLES_PATH);
        let resp = self
            .http
            .post(&url)
            .header("cache-control", "no-cache")
            .json(&json!({
                "address": address,
                "aggregation_level": "Global",
                "limit_per_page": self.config.page_limit,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text)?;
        self.log_sample(&body);
        Ok(body)
    }

    /// Balance of the configured token for `address`.
    pub async fn fetch_balance(&self, address: &str) -> Result<f64> {
        let resp = self.fetch_entity_fungibles(address).await?;
        Ok(extract_amount(&resp, &self.config.token_address))
    }

    fn log_sample(&self, body: &Value) {
        let mut last = self.last_sample.lock().unwrap_or_else(|e| e.into_inner());
        let due = last.map_or(true, |at| at.elapsed() > SAMPLE_LOG_EVERY);
        if due {
            tracing::debug!(sample = %body, "gateway fungibles sample");
            *last = Some(Instant::now());
        }
    }
}
