//! Related-record reconciliation
//!
//! Given the set of ids a record should be linked to, this layer lists the
//! ids currently linked on the server (paginated), computes the symmetric
//! difference and applies it as one bulk round trip: a DELETE per id to
//! unlink, an empty POST per id to link. Per-item failures never abort the
//! batch; they are collected into the outcome's `errors` while the
//! surviving items still land in `linked` / `unlinked`. Reconciling twice
//! with the same desired set is a no-op the second time.

use std::collections::HashSet;
use tracing::debug;

use crate::bulk::{BulkOutcome, BulkRequest};
use crate::error::SugarError;
use crate::module::{validate_id, validate_link, validate_module, ModuleClient};
use crate::request::HttpMethod;

/// Result of one reconciliation pass
///
/// `linked` and `unlinked` are disjoint by construction: an id is either
/// added or removed in a single pass, never both.
#[derive(Debug, Default)]
pub struct RelateOutcome {
    /// Ids newly associated to the record
    pub linked: HashSet<String>,
    /// Ids newly dissociated from the record
    pub unlinked: HashSet<String>,
    /// Failed bulk items, with their originating request
    pub errors: Vec<BulkOutcome>,
}

impl RelateOutcome {
    /// True when nothing changed and nothing failed
    pub fn is_noop(&self) -> bool {
        self.linked.is_empty() && self.unlinked.is_empty() && self.errors.is_empty()
    }
}

/// Which side of the diff a bulk item belongs to
#[derive(Debug, Clone, Copy)]
enum LinkAction {
    Link,
    Unlink,
}

impl<'a> ModuleClient<'a> {
    /// List every id currently linked to a record
    ///
    /// Follows the server's `next_offset` cursor until it signals completion
    /// (`next_offset` ≤ 0 or absent).
    pub async fn related_ids(
        &self,
        module: &str,
        id: &str,
        link: &str,
    ) -> Result<Vec<String>, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;
        validate_link(link)?;

        let mut ids = Vec::new();
        let mut offset: i64 = 0;
        loop {
            let page = self.translate_not_found(
                self.client()
                    .get(&format!("{module}/{id}/link/{link}?offset={offset}&fields=id"))
                    .await,
                module,
                Some(id),
            )?;

            let records = page
                .get("records")
                .and_then(|r| r.as_array())
                .ok_or_else(|| {
                    SugarError::Protocol("no records in the link listing response".to_string())
                })?;
            for record in records {
                if let Some(record_id) = record.get("id").and_then(|v| v.as_str()) {
                    ids.push(record_id.to_string());
                }
            }

            let next_offset = page.get("next_offset").and_then(|v| v.as_i64()).unwrap_or(-1);
            if next_offset <= 0 {
                return Ok(ids);
            }
            offset = next_offset;
        }
    }

    /// Reconcile the links of a record against a desired id set
    ///
    /// Lists the current related ids, diffs them against `desired_ids` and
    /// applies the additions and removals as a single bulk call. The result
    /// does not depend on the ordering of `desired_ids`, and a second pass
    /// with the same set issues no bulk round trip at all.
    pub async fn update_related_links(
        &self,
        module: &str,
        id: &str,
        link: &str,
        desired_ids: &[String],
    ) -> Result<RelateOutcome, SugarError> {
        let module = validate_module(module)?;
        validate_id(id)?;
        validate_link(link)?;
        for related_id in desired_ids {
            validate_id(related_id)?;
        }

        let current: HashSet<String> =
            self.related_ids(module, id, link).await?.into_iter().collect();
        let desired: HashSet<String> = desired_ids.iter().cloned().collect();

        let mut bulk = BulkRequest::new(self.client());
        let mut actions: Vec<(String, LinkAction)> = Vec::new();
        for related_id in current.difference(&desired) {
            bulk.add(
                HttpMethod::Delete,
                &format!("{module}/{id}/link/{link}/{related_id}"),
                200,
                None,
            )?;
            actions.push((related_id.clone(), LinkAction::Unlink));
        }
        for related_id in desired.difference(&current) {
            bulk.add(
                HttpMethod::Post,
                &format!("{module}/{id}/link/{link}/{related_id}"),
                200,
                None,
            )?;
            actions.push((related_id.clone(), LinkAction::Link));
        }

        let mut outcome = RelateOutcome::default();
        if actions.is_empty() {
            debug!("links of {module}/{id}/{link} already match, nothing to send");
            return Ok(outcome);
        }

        debug!(
            additions = desired.difference(&current).count(),
            removals = current.difference(&desired).count(),
            "reconciling links of {module}/{id}/{link}"
        );
        let results = bulk.send().await?;
        for ((related_id, action), result) in actions.into_iter().zip(results) {
            if result.is_error() {
                outcome.errors.push(result);
                continue;
            }
            match action {
                LinkAction::Link => outcome.linked.insert(related_id),
                LinkAction::Unlink => outcome.unlinked.insert(related_id),
            };
        }
        Ok(outcome)
    }
}
