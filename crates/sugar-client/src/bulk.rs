//! Bulk request executor
//!
//! Queues independent requests and submits them to the `/bulk` endpoint as
//! one physical round trip. Outcomes come back in submission order,
//! correlated to their originating request; the expected status travels on
//! the item (for per-outcome error detection) but is stripped from the wire
//! body. Individual items are never retried — a batch-level 401 is handled
//! by the session like any other request, resubmitting the whole batch once.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::client::SugarClient;
use crate::error::SugarError;
use crate::request::HttpMethod;

/// One request queued into a bulk call
#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    /// Uppercase HTTP method
    pub method: String,
    /// Versioned endpoint path, e.g. `/v10/Contacts/1234`
    pub url: String,
    /// Optional headers for this item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// JSON-encoded payload; the bulk endpoint wants a string, not an object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Status the caller expects for this item; never sent to the server
    #[serde(skip)]
    pub expected_status: u16,
}

/// Outcome of one bulk item
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    /// The request that produced this outcome
    pub request: BulkItem,
    /// HTTP status the server reported for this item
    pub status: u16,
    /// Decoded item body
    pub contents: Value,
}

impl BulkOutcome {
    /// True when the item did not come back with its expected status
    pub fn is_error(&self) -> bool {
        self.status != self.request.expected_status
    }
}

/// Accumulates requests and submits them as one `/bulk` call
pub struct BulkRequest<'a> {
    client: &'a SugarClient,
    requests: Vec<BulkItem>,
}

impl<'a> BulkRequest<'a> {
    /// Create an empty batch on a session
    pub fn new(client: &'a SugarClient) -> Self {
        Self { client, requests: Vec::new() }
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True when nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The queued requests, in submission order
    pub fn requests(&self) -> &[BulkItem] {
        &self.requests
    }

    /// Queue a request
    ///
    /// `endpoint` is relative to the API version; it is rewritten to the
    /// `/{version}/{endpoint}` form the bulk endpoint expects.
    pub fn add(
        &mut self,
        method: HttpMethod,
        endpoint: &str,
        expected_status: u16,
        data: Option<Value>,
    ) -> Result<(), SugarError> {
        let data = match data {
            Some(value) => Some(serde_json::to_string(&value).map_err(|e| {
                SugarError::Protocol(format!("could not encode a bulk payload: {e}"))
            })?),
            None => None,
        };
        self.requests.push(BulkItem {
            method: method.as_str().to_string(),
            url: format!("/{}/{}", self.client.version(), endpoint.trim_start_matches('/')),
            headers: None,
            data,
            expected_status,
        });
        Ok(())
    }

    /// Submit the batch as one round trip
    ///
    /// Returns one outcome per queued request, in submission order.
    pub async fn send(&self) -> Result<Vec<BulkOutcome>, SugarError> {
        let response = self
            .client
            .post("bulk", json!({ "requests": self.requests }))
            .await?;

        let items = response
            .as_array()
            .ok_or_else(|| SugarError::Protocol("bulk response is not an array".to_string()))?;
        if items.len() != self.requests.len() {
            return Err(SugarError::Protocol(format!(
                "bulk response has {} items for {} requests",
                items.len(),
                self.requests.len()
            )));
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for (request, item) in self.requests.iter().zip(items) {
            let status = item
                .get("status")
                .and_then(Value::as_u64)
                .ok_or_else(|| SugarError::Protocol("bulk item has no status".to_string()))?;
            outcomes.push(BulkOutcome {
                request: request.clone(),
                status: status as u16,
                contents: item.get("contents").cloned().unwrap_or(Value::Null),
            });
        }
        Ok(outcomes)
    }
}
