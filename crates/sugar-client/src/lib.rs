//! SugarCRM REST API Client
//!
//! An authenticated client for the SugarCRM v10+ REST API: OAuth password
//! grant with transparent token renewal, module CRUD, bulk requests, and
//! related-record reconciliation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod client;
pub mod error;
pub mod module;
pub mod relationships;
pub mod request;
pub mod transport;

pub use bulk::{BulkItem, BulkOutcome, BulkRequest};
pub use client::{normalize_base_url, SugarClient, DEFAULT_PLATFORM, DEFAULT_VERSION};
pub use error::{ServerDiagnostics, SugarError};
pub use module::{ModuleClient, SearchOptions};
pub use relationships::RelateOutcome;
pub use request::{HttpMethod, RequestBody, RequestDescriptor, ResponseEnvelope};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};

/// Result type for SugarCRM client operations
pub type Result<T> = std::result::Result<T, SugarError>;
