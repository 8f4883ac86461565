//! SugarCRM session: URL normalization, token lifecycle and the
//! authenticated request engine
//!
//! A [`SugarClient`] owns the normalized base URL, the credentials and the
//! current bearer token. [`SugarClient::execute`] authenticates lazily,
//! attaches the `OAuth-Token` header, and renews the token in a bounded loop
//! when the server answers 401. The token state sits behind a mutex so one
//! client can be shared between the module, bulk and relationship layers:
//! check-expiry, authenticate and attach-token form one critical section.
//!
//! # Example
//!
//! ```rust,no_run
//! use sugar_client::SugarClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SugarClient::new("http://127.0.0.1")
//!         .with_username("admin")
//!         .with_password("admin");
//!
//!     // The first request logs in on its own, but an explicit login
//!     // surfaces credential problems early.
//!     client.login().await?;
//!
//!     let contacts = client.get("/Contacts").await?;
//!     println!("{}", contacts["records"]);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{classify_status, ServerDiagnostics, SugarError};
use crate::request::{HttpMethod, RequestDescriptor, ResponseEnvelope};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError};

/// Platform identifier sent to the token endpoint by default
pub const DEFAULT_PLATFORM: &str = "inetprocess";

/// REST API version targeted by default
pub const DEFAULT_VERSION: &str = "v10";

/// Fixed OAuth client id the CRM expects for password grants
const OAUTH_CLIENT_ID: &str = "sugar";

/// How many 401-triggered renewals are attempted before failing fatally
const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Normalize a SugarCRM base URL
///
/// Prefixes `http://` when the input has no scheme, strips any `/rest/v*`
/// suffix already present, drops trailing slashes and appends
/// `/rest/{version}`. Idempotent: normalizing an already-normalized URL with
/// the same version returns it unchanged.
///
/// ```rust
/// use sugar_client::normalize_base_url;
///
/// let url = normalize_base_url("test.sugar/my/sub/folder", "v10");
/// assert_eq!(url, "http://test.sugar/my/sub/folder/rest/v10");
/// assert_eq!(normalize_base_url(&url, "v10"), url);
/// ```
pub fn normalize_base_url(url: &str, version: &str) -> String {
    let mut base = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    if let Some(pos) = base.rfind("/rest/v") {
        base.truncate(pos);
    }
    let trimmed = base.trim_end_matches('/').len();
    base.truncate(trimmed);
    format!("{base}/rest/{version}")
}

/// Mutable authentication state, guarded by the session mutex
#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    token_expiration: Option<DateTime<Utc>>,
    login_attempts: u32,
}

impl AuthState {
    /// A token expiring in the current second is already stale (fail-closed)
    fn needs_login(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.token_expiration) {
            (Some(_), Some(expires)) => expires <= now,
            _ => true,
        }
    }
}

/// Authenticated client for one SugarCRM instance
pub struct SugarClient {
    base_url: String,
    version: String,
    platform: String,
    username: Option<String>,
    password: Option<String>,
    transport: Arc<dyn HttpTransport>,
    auth: Mutex<AuthState>,
}

impl SugarClient {
    /// Create a client for `base_url` with the default transport and version
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_transport(base_url, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client with a caller-provided transport
    pub fn with_transport(base_url: impl AsRef<str>, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_version(base_url, DEFAULT_VERSION, transport)
    }

    /// Create a client targeting a specific API version
    pub fn with_version(
        base_url: impl AsRef<str>,
        version: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let version = version.into();
        Self {
            base_url: normalize_base_url(base_url.as_ref(), &version),
            version,
            platform: DEFAULT_PLATFORM.to_string(),
            username: None,
            password: None,
            transport,
            auth: Mutex::new(AuthState::default()),
        }
    }

    /// Set the username used for the password grant
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password used for the password grant
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Override the platform identifier sent to the token endpoint
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// The normalized, versioned base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The API version segment (e.g. `v10`)
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current bearer token, if any
    pub async fn token(&self) -> Option<String> {
        self.auth.lock().await.token.clone()
    }

    /// Current token expiry, if any
    pub async fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.auth.lock().await.token_expiration
    }

    /// Inject a token obtained elsewhere (session reuse across processes)
    ///
    /// The token is trusted until `expiration`; a 401 still triggers a normal
    /// renewal through the configured credentials.
    pub async fn set_token(&self, token: impl Into<String>, expiration: DateTime<Utc>) {
        let mut auth = self.auth.lock().await;
        auth.token = Some(token.into());
        auth.token_expiration = Some(expiration);
    }

    /// Authenticate eagerly
    ///
    /// `execute` logs in on its own when the token is absent or expired;
    /// calling this up front surfaces credential problems before the first
    /// real request.
    pub async fn login(&self) -> Result<(), SugarError> {
        let mut auth = self.auth.lock().await;
        self.authenticate(&mut auth).await
    }

    /// Execute a request with automatic authentication
    ///
    /// Lazily logs in, attaches the `OAuth-Token` header and sends the
    /// request. A 401 forces one renewal and a resubmission of the same
    /// descriptor, bounded by the retry budget; any other mismatch with the
    /// expected status is a classified error. On success the raw envelope is
    /// returned and the renewal counter is reset.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, SugarError> {
        let mut auth = self.auth.lock().await;
        loop {
            if auth.needs_login(Utc::now()) {
                self.authenticate(&mut auth).await?;
            }

            let mut attempt = request.clone();
            if let Some(token) = &auth.token {
                attempt.headers.insert("OAuth-Token".to_string(), token.clone());
            }

            let response = self.send(attempt).await?;
            if response.status == 401 && request.expected_status != 401 {
                if auth.login_attempts >= MAX_LOGIN_ATTEMPTS {
                    return Err(SugarError::AuthExhausted { attempts: auth.login_attempts });
                }
                auth.login_attempts += 1;
                warn!(
                    attempt = auth.login_attempts,
                    "got 401, renewing the token and resubmitting"
                );
                auth.token = None;
                continue;
            }

            // The credential was accepted, whatever the outcome of the call
            auth.login_attempts = 0;

            if let Some(err) = classify_status(request.expected_status, &response) {
                return Err(err);
            }
            return Ok(response);
        }
    }

    /// GET a path and decode the JSON body, expecting 200
    pub async fn get(&self, path: &str) -> Result<Value, SugarError> {
        self.get_with_status(path, 200).await
    }

    /// GET a path and decode the JSON body, expecting `expected_status`
    pub async fn get_with_status(&self, path: &str, expected_status: u16) -> Result<Value, SugarError> {
        self.request_json(RequestDescriptor::new(HttpMethod::Get, path).expect_status(expected_status))
            .await
    }

    /// GET a path and return the raw bytes, expecting 200 (file download)
    pub async fn get_raw(&self, path: &str) -> Result<Vec<u8>, SugarError> {
        let response = self.execute(RequestDescriptor::new(HttpMethod::Get, path)).await?;
        Ok(response.body)
    }

    /// POST a JSON payload, expecting 200
    pub async fn post(&self, path: &str, data: Value) -> Result<Value, SugarError> {
        self.post_with_status(path, data, 200).await
    }

    /// POST a JSON payload, expecting `expected_status`
    pub async fn post_with_status(
        &self,
        path: &str,
        data: Value,
        expected_status: u16,
    ) -> Result<Value, SugarError> {
        self.request_json(
            RequestDescriptor::new(HttpMethod::Post, path)
                .json(data)
                .expect_status(expected_status),
        )
        .await
    }

    /// PUT a JSON payload, expecting 200
    ///
    /// Top-level `null` values are serialized as empty strings: the server
    /// drops absent fields instead of clearing them.
    pub async fn put(&self, path: &str, data: Value) -> Result<Value, SugarError> {
        self.request_json(RequestDescriptor::new(HttpMethod::Put, path).json(blank_nulls(data)))
            .await
    }

    /// DELETE a path, expecting 200
    pub async fn delete(&self, path: &str) -> Result<Value, SugarError> {
        self.request_json(RequestDescriptor::new(HttpMethod::Delete, path)).await
    }

    /// Upload a single file as multipart form data, expecting 200
    pub async fn upload(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        contents: Vec<u8>,
    ) -> Result<Value, SugarError> {
        self.request_json(
            RequestDescriptor::new(HttpMethod::Post, path).multipart(field, filename, contents),
        )
        .await
    }

    async fn request_json(&self, request: RequestDescriptor) -> Result<Value, SugarError> {
        let response = self.execute(request).await?;
        response.json()
    }

    /// POST the password grant to the token endpoint and store the token
    async fn authenticate(&self, auth: &mut AuthState) -> Result<(), SugarError> {
        let username = self
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                SugarError::Authentication(
                    "set a username and password, or inject a token, before doing any action"
                        .to_string(),
                )
            })?;
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                SugarError::Authentication(
                    "set a username and password, or inject a token, before doing any action"
                        .to_string(),
                )
            })?;

        debug!("logging in to {}", self.base_url);
        let grant = json!({
            "grant_type": "password",
            "client_id": OAUTH_CLIENT_ID,
            "client_secret": "",
            "username": username,
            "password": password,
            "platform": self.platform,
        });

        let response = self
            .send(RequestDescriptor::new(HttpMethod::Post, "oauth2/token").json(grant))
            .await?;

        if response.status != 200 {
            let diagnostics = ServerDiagnostics::from_response(&response);
            let detail = diagnostics
                .error_message
                .map(|m| format!(": {m}"))
                .unwrap_or_default();
            return Err(SugarError::Authentication(format!(
                "token endpoint returned {}{detail}",
                response.status
            )));
        }

        let body = response
            .json()
            .map_err(|e| SugarError::Authentication(format!("malformed token response: {e}")))?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SugarError::Authentication("no token in the returned body".to_string()))?;
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or_else(|| {
                SugarError::Authentication("no numeric expires_in in the returned body".to_string())
            })?;

        auth.token = Some(token.to_string());
        auth.token_expiration = Some(Utc::now() + Duration::seconds(expires_in));
        debug!("token renewed, expires in {expires_in}s");
        Ok(())
    }

    /// Build the absolute URL and hand the request to the transport
    async fn send(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, SugarError> {
        let url = format!("{}/{}", self.base_url, request.path);
        debug!("{} {}", request.method.as_str(), url);
        self.transport.send(url, request).await.map_err(|e| match e {
            TransportError::Unreachable { url, detail } | TransportError::Failed { url, detail } => {
                SugarError::UnreachableHost { url, detail }
            }
        })
    }
}

/// Replace top-level nulls with empty strings
fn blank_nulls(mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        for value in map.values_mut() {
            if value.is_null() {
                *value = Value::String(String::new());
            }
        }
    }
    data
}
