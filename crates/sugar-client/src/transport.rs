//! HTTP transport capability
//!
//! The session is written against the [`HttpTransport`] trait so the actual
//! HTTP stack (connection pooling, TLS, redirects, timeouts) stays an
//! external collaborator. [`ReqwestTransport`] is the production
//! implementation; tests substitute a mock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::request::{HttpMethod, RequestBody, RequestDescriptor, ResponseEnvelope};

#[cfg(test)]
use mockall::automock;

/// Transport-level failures, before any HTTP status exists
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host could not be resolved or connected to
    #[error("could not reach {url}: {detail}")]
    Unreachable {
        /// Full URL of the failed request
        url: String,
        /// Underlying failure detail
        detail: String,
    },

    /// Any other transport failure (interrupted body, protocol error, ...)
    #[error("transport failure for {url}: {detail}")]
    Failed {
        /// Full URL of the failed request
        url: String,
        /// Underlying failure detail
        detail: String,
    },
}

/// Capability to send one HTTP request and return its raw outcome
///
/// Implementations must not interpret status codes; classification and
/// authentication retries belong to the session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` to the absolute `url` and return the raw response
    async fn send(
        &self,
        url: String,
        request: RequestDescriptor,
    ) -> Result<ResponseEnvelope, TransportError>;
}

/// Production transport backed by [`reqwest`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a 30 second timeout and a crate user agent
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("sugar-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Wrap a caller-configured [`reqwest::Client`]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        url: String,
        request: RequestDescriptor,
    ) -> Result<ResponseEnvelope, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        match request.body {
            Some(RequestBody::Json(value)) => {
                builder = builder.json(&value);
            }
            Some(RequestBody::Multipart { field, filename, contents }) => {
                let part = reqwest::multipart::Part::bytes(contents).file_name(filename);
                builder = builder.multipart(reqwest::multipart::Form::new().part(field, part));
            }
            None => {}
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Unreachable { url: url.clone(), detail: e.to_string() }
            } else {
                TransportError::Failed { url: url.clone(), detail: e.to_string() }
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Failed { url, detail: e.to_string() })?
            .to_vec();

        Ok(ResponseEnvelope { status, headers, body })
    }
}
