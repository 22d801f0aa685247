//! JSON-RPC event source backed by `reqwest`.
//!
//! Reads a stream through the node's `suix_queryEvents` method. Every
//! failure is reported once; retrying is the runner's job, which simply
//! polls again after its backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{EventFilter, EventId, EventOrder, EventPage, Result, SourceError, source::EventSource};

const QUERY_EVENTS_METHOD: &str = "suix_queryEvents";

/// Configuration for [`JsonRpcEventSource`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Builds the positional parameters of a `suix_queryEvents` call.
pub fn query_events_params(
    filter: &EventFilter,
    after: Option<&EventId>,
    order: EventOrder,
    limit: usize,
) -> Result<serde_json::Value> {
    Ok(serde_json::json!([
        serde_json::to_value(filter)?,
        serde_json::to_value(after)?,
        limit,
        order.is_descending(),
    ]))
}

/// Event source reading from a JSON-RPC full node.
pub struct JsonRpcEventSource {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcEventSource {
    /// Creates a source for the given JSON-RPC endpoint.
    pub fn new(url: impl Into<String>, config: RpcClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self.http.post(&self.url).json(&request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Http { status, body });
        }

        let body: JsonRpcResponse = resp.json().await?;
        if let Some(err) = body.error {
            return Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        body.result.ok_or_else(|| SourceError::Rpc {
            code: 0,
            message: "response carried neither result nor error".to_string(),
        })
    }
}

#[async_trait]
impl EventSource for JsonRpcEventSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_events(
        &self,
        filter: &EventFilter,
        after: Option<&EventId>,
        order: EventOrder,
        limit: usize,
    ) -> Result<EventPage> {
        let params = query_events_params(filter, after, order, limit)?;

        let started = Instant::now();
        let result = self.call(QUERY_EVENTS_METHOD, params).await;
        metrics::histogram!("event_source_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let value = result.inspect_err(|e| {
            metrics::counter!("event_source_request_errors_total").increment(1);
            tracing::debug!(error = %e, "event query failed");
        })?;

        let page: EventPage = serde_json::from_value(value)?;
        tracing::debug!(
            events = page.events.len(),
            has_more = page.has_more,
            "fetched event page"
        );
        Ok(page)
    }
}
