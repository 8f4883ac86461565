//! Request descriptors and response envelopes
//!
//! A [`RequestDescriptor`] is the unit of work handed to the session: method,
//! path relative to the versioned base URL, headers, an optional body and the
//! status code the caller expects back. A [`ResponseEnvelope`] is the raw
//! outcome; callers decode it as JSON or consume the bytes directly (file
//! download).

use serde_json::Value;
use std::collections::HashMap;

use crate::error::SugarError;

/// HTTP method for SugarCRM requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// Wire representation of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Request payload
///
/// JSON and multipart are mutually exclusive: a descriptor carries one or the
/// other, never both.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// JSON body, sent with `Content-Type: application/json`
    Json(Value),
    /// A single named file part, sent as `multipart/form-data`
    Multipart {
        /// Form field name the server expects the file under
        field: String,
        /// File name reported to the server
        filename: String,
        /// Raw file contents
        contents: Vec<u8>,
    },
}

/// A request to a SugarCRM endpoint
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the versioned base URL, leading slashes trimmed
    pub path: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Optional body
    pub body: Option<RequestBody>,
    /// Status code the caller expects; anything else is a classified error
    pub expected_status: u16,
}

impl RequestDescriptor {
    /// Create a new descriptor expecting a 200 response
    pub fn new(method: HttpMethod, path: impl AsRef<str>) -> Self {
        Self {
            method,
            path: path.as_ref().trim_start_matches('/').to_string(),
            headers: HashMap::new(),
            body: None,
            expected_status: 200,
        }
    }

    /// Set the expected status code
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set a JSON body
    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Set a multipart file body
    pub fn multipart(
        mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        contents: Vec<u8>,
    ) -> Self {
        self.body = Some(RequestBody::Multipart {
            field: field.into(),
            filename: filename.into(),
            contents,
        });
        self
    }
}

/// Raw response from the transport
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// HTTP status code
    pub status: u16,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    /// Get a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the `Content-Type` header indicates a JSON body
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Decode the body as JSON
    pub fn json(&self) -> Result<Value, SugarError> {
        serde_json::from_slice(&self.body).map_err(|e| SugarError::Decode {
            status: self.status,
            detail: format!(
                "can't read the output: {e}, raw body: {}",
                String::from_utf8_lossy(&self.body)
            ),
        })
    }
}
