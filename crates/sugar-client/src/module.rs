//! Module-level CRUD operations
//!
//! A [`ModuleClient`] wraps a [`SugarClient`] with the record verbs of the
//! CRM: create, retrieve, update, delete, count, search, upload and
//! download. Module names and record ids become path segments, so they are
//! validated before any network call; a 404 coming back from the server is
//! re-raised naming the module and id instead of the generic classifier
//! message.
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sugar_client::{ModuleClient, SugarClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SugarClient::new("http://127.0.0.1")
//!         .with_username("admin")
//!         .with_password("admin");
//!     let module = ModuleClient::new(&client);
//!
//!     let note = module.create("Notes", json!({"name": "Name"})).await?;
//!     println!("{}", note["id"]);
//!     Ok(())
//! }
//! ```

use serde_json::{json, Map, Value};
use std::io::Write;

use crate::client::SugarClient;
use crate::error::SugarError;

/// Optional parameters for [`ModuleClient::search`]
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Fields to return; empty means all fields
    pub fields: Vec<String>,
    /// Pagination offset
    pub offset: u64,
    /// Maximum number of records per page
    pub max: u64,
    /// Field to order the results by
    pub order_by: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { fields: Vec::new(), offset: 0, max: 20, order_by: None }
    }
}

impl SearchOptions {
    /// Restrict the returned fields
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the pagination offset
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the page size
    pub fn with_max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    /// Order the results by a field
    pub fn with_order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }
}

/// CRUD verbs over named resource collections
pub struct ModuleClient<'a> {
    client: &'a SugarClient,
}

impl<'a> ModuleClient<'a> {
    /// Wrap a session
    pub fn new(client: &'a SugarClient) -> Self {
        Self { client }
    }

    /// The underlying session
    pub fn client(&self) -> &'a SugarClient {
        self.client
    }

    /// Create a record, expecting 200
    pub async fn create(&self, module: &str, data: Value) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        require_data(&data)?;

        self.translate_not_found(self.client.post(module, data).await, module, None)
    }

    /// Retrieve a single record by id
    pub async fn retrieve(&self, module: &str, id: &str) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;

        self.translate_not_found(
            self.client.get(&format!("{module}/{id}")).await,
            module,
            Some(id),
        )
    }

    /// Retrieve a page of the collection
    pub async fn retrieve_page(
        &self,
        module: &str,
        offset: u64,
        max: u64,
    ) -> Result<Value, SugarError> {
        let module = validate_module(module)?;

        self.translate_not_found(
            self.client.get(&format!("{module}?offset={offset}&max_num={max}")).await,
            module,
            None,
        )
    }

    /// Update a record, expecting 200
    ///
    /// `null` field values are sent as empty strings so the server clears
    /// them instead of ignoring them.
    pub async fn update(&self, module: &str, id: &str, data: Value) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;
        require_data(&data)?;

        self.translate_not_found(
            self.client.put(&format!("{module}/{id}"), data).await,
            module,
            Some(id),
        )
    }

    /// Delete a record, expecting 200
    pub async fn delete(&self, module: &str, id: &str) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;

        self.translate_not_found(
            self.client.delete(&format!("{module}/{id}")).await,
            module,
            Some(id),
        )
    }

    /// Count the records matching `filters`
    pub async fn count(&self, module: &str, filters: Value) -> Result<i64, SugarError> {
        let module = validate_module(module)?;

        let body = self.translate_not_found(
            self.client
                .post(&format!("{module}/filter/count"), json!({ "filter": filters }))
                .await,
            module,
            None,
        )?;

        record_count(&body)
            .ok_or_else(|| SugarError::Protocol("no record_count in the count response".to_string()))
    }

    /// Search records with a filter expression
    ///
    /// Returns the server envelope with its `records` array.
    pub async fn search(
        &self,
        module: &str,
        filters: Value,
        options: SearchOptions,
    ) -> Result<Value, SugarError> {
        let module = validate_module(module)?;

        let mut body = Map::new();
        body.insert("filter".to_string(), filters);
        body.insert("max_num".to_string(), json!(options.max));
        body.insert("offset".to_string(), json!(options.offset));
        if !options.fields.is_empty() {
            body.insert("fields".to_string(), json!(options.fields.join(",")));
        }
        if let Some(order_by) = &options.order_by {
            body.insert("order_by".to_string(), json!(order_by));
        }

        self.translate_not_found(
            self.client.post(&format!("{module}/filter"), Value::Object(body)).await,
            module,
            None,
        )
    }

    /// Upload a file into a record field
    pub async fn upload(
        &self,
        module: &str,
        id: &str,
        field: &str,
        contents: Vec<u8>,
        filename: &str,
    ) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;
        validate_field(field)?;

        self.translate_not_found(
            self.client
                .upload(&format!("{module}/{id}/file/{field}"), field, filename, contents)
                .await,
            module,
            Some(id),
        )
    }

    /// Download the file stored in a record field
    pub async fn download(&self, module: &str, id: &str, field: &str) -> Result<Vec<u8>, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;
        validate_field(field)?;

        self.translate_not_found(
            self.client.get_raw(&format!("{module}/{id}/file/{field}")).await,
            module,
            Some(id),
        )
    }

    /// Download the file stored in a record field into a caller sink
    pub async fn download_to<W: Write>(
        &self,
        module: &str,
        id: &str,
        field: &str,
        target: &mut W,
    ) -> Result<usize, SugarError> {
        let contents = self.download(module, id, field).await?;
        target.write_all(&contents)?;
        Ok(contents.len())
    }

    /// List the values of an enum (dropdown) field
    pub async fn dropdown(&self, module: &str, field: &str) -> Result<Value, SugarError> {
        let module = validate_module(module)?;
        validate_field(field)?;

        self.translate_not_found(
            self.client.get(&format!("{module}/enum/{field}")).await,
            module,
            None,
        )
    }

    /// Replace the classifier's 404 with one naming the module and id
    pub(crate) fn translate_not_found<T>(
        &self,
        result: Result<T, SugarError>,
        module: &str,
        id: Option<&str>,
    ) -> Result<T, SugarError> {
        result.map_err(|err| match err {
            SugarError::NotFound { diagnostics, .. } => {
                let message = match id {
                    Some(id) => format!("module {module} or id {id} not found"),
                    None => format!("module {module} not found"),
                };
                SugarError::NotFound { message, diagnostics }
            }
            other => other,
        })
    }
}

/// Accept `record_count` as a number or a numeric string
fn record_count(body: &Value) -> Option<i64> {
    let raw = body.get("record_count")?;
    raw.as_i64()
        .or_else(|| raw.as_f64().map(|f| f as i64))
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
}

/// Validate a module name, tolerating one leading slash
pub(crate) fn validate_module(module: &str) -> Result<&str, SugarError> {
    let trimmed = module.trim_start_matches('/');
    validate_identifier(trimmed, module, "module")?;
    Ok(trimmed)
}

/// Validate a record id
pub(crate) fn validate_id(id: &str) -> Result<(), SugarError> {
    validate_identifier(id, id, "id")
}

/// Validate a field or link name
pub(crate) fn validate_field(field: &str) -> Result<(), SugarError> {
    validate_identifier(field, field, "field")
}

/// Validate a relationship link name
pub(crate) fn validate_link(link: &str) -> Result<(), SugarError> {
    validate_identifier(link, link, "link")
}

/// Identifiers become path segments: reject anything that could break the
/// path or smuggle a query string
fn validate_identifier(value: &str, shown: &str, what: &str) -> Result<(), SugarError> {
    if value.is_empty() || value.contains('/') || value.contains('?') {
        return Err(SugarError::InvalidIdentifier(format!("{shown} is not a valid {what}")));
    }
    Ok(())
}

/// Creates and updates need an actual payload
fn require_data(data: &Value) -> Result<(), SugarError> {
    let empty = match data {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if empty {
        return Err(SugarError::MissingData("no data provided for the record".to_string()));
    }
    Ok(())
}
