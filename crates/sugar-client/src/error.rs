//! Error taxonomy and response classification
//!
//! Classification is pure: [`classify_status`] maps an HTTP outcome to a
//! typed error without logging or any other side effect. When the server
//! answers with its JSON error envelope, the `error` and `error_message`
//! fields are preserved verbatim on the classified error — they are the
//! richest diagnostic surface the CRM offers.

use serde::Deserialize;
use thiserror::Error;

use crate::request::ResponseEnvelope;

/// Errors returned by the SugarCRM client
#[derive(Debug, Error)]
pub enum SugarError {
    /// A caller-supplied module name, record id or field name is malformed.
    /// Detected before any network call.
    #[error("{0}")]
    InvalidIdentifier(String),

    /// A required payload is empty. Detected before any network call.
    #[error("{0}")]
    MissingData(String),

    /// Credentials are missing or the token endpoint answered with something
    /// unusable
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The retry budget for 401-triggered re-authentication is exhausted.
    /// Fatal, not retried further.
    #[error("tried {attempts} times to login without success, verify username and password")]
    AuthExhausted {
        /// Number of renewal attempts made before giving up
        attempts: u32,
    },

    /// The transport could not produce a response from the host
    #[error("could not reach {url}: {detail}")]
    UnreachableHost {
        /// Full URL of the failed request
        url: String,
        /// Transport-level failure detail, preserved verbatim
        detail: String,
    },

    /// The server answered 404
    #[error("{message}")]
    NotFound {
        /// Human-readable description, naming the module and id when known
        message: String,
        /// Server diagnostics, when present
        diagnostics: ServerDiagnostics,
    },

    /// The server answered 500
    #[error("server error: {message}")]
    Server {
        /// Human-readable description
        message: String,
        /// Server diagnostics, when present
        diagnostics: ServerDiagnostics,
    },

    /// The server answered with a status the caller did not expect
    #[error("bad status, got {got} ({reason}) instead of {expected}")]
    UnexpectedStatus {
        /// Status code the server returned
        got: u16,
        /// Status code the caller expected
        expected: u16,
        /// Canonical reason phrase for the returned status
        reason: String,
        /// Server diagnostics, when present
        diagnostics: ServerDiagnostics,
    },

    /// The call succeeded but the body could not be decoded as JSON
    #[error("decode error (status {status}): {detail}")]
    Decode {
        /// Status code of the undecodable response
        status: u16,
        /// What went wrong, including the raw body
        detail: String,
    },

    /// The response decoded fine but a required field is missing
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Writing a downloaded payload to the caller-provided sink failed
    #[error("could not write the download target: {0}")]
    DownloadTarget(#[from] std::io::Error),
}

impl SugarError {
    /// Server `error` key attached to this error, if any
    pub fn error_key(&self) -> Option<&str> {
        self.diagnostics().and_then(|d| d.error_key.as_deref())
    }

    /// Server `error_message` attached to this error, if any
    pub fn error_message(&self) -> Option<&str> {
        self.diagnostics().and_then(|d| d.error_message.as_deref())
    }

    /// True for the 404 variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, SugarError::NotFound { .. })
    }

    fn diagnostics(&self) -> Option<&ServerDiagnostics> {
        match self {
            SugarError::NotFound { diagnostics, .. }
            | SugarError::Server { diagnostics, .. }
            | SugarError::UnexpectedStatus { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Diagnostic fields from the server's JSON error envelope
///
/// SugarCRM reports failures as `{"error": "...", "error_message": "..."}`.
/// Both fields are optional and carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDiagnostics {
    /// Machine-readable error key (e.g. `not_found`)
    pub error_key: Option<String>,
    /// Human-readable server message
    pub error_message: Option<String>,
}

impl ServerDiagnostics {
    /// Extract diagnostics from a response body
    ///
    /// Returns the default (empty) diagnostics when the body is not JSON or
    /// does not parse; extraction never fails.
    pub fn from_response(response: &ResponseEnvelope) -> Self {
        #[derive(Deserialize)]
        struct ErrorEnvelope {
            error: Option<String>,
            error_message: Option<String>,
        }

        if !response.is_json() {
            return Self::default();
        }
        match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
            Ok(envelope) => Self {
                error_key: envelope.error,
                error_message: envelope.error_message,
            },
            Err(_) => Self::default(),
        }
    }
}

/// Classify a response against the status the caller expected
///
/// Returns `None` when the status matches. 401 is not handled here: the
/// session intercepts it for re-authentication before classification.
pub fn classify_status(expected: u16, response: &ResponseEnvelope) -> Option<SugarError> {
    if response.status == expected {
        return None;
    }

    let diagnostics = ServerDiagnostics::from_response(response);
    Some(match response.status {
        404 => SugarError::NotFound {
            message: diagnostics
                .error_message
                .clone()
                .unwrap_or_else(|| "endpoint not found".to_string()),
            diagnostics,
        },
        500 => SugarError::Server {
            message: diagnostics
                .error_message
                .clone()
                .unwrap_or_else(|| "internal server error".to_string()),
            diagnostics,
        },
        got => SugarError::UnexpectedStatus {
            got,
            expected,
            reason: reason_phrase(got),
            diagnostics,
        },
    })
}

/// Canonical reason phrase for a status code
fn reason_phrase(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}
