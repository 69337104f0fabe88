//! Resolve work item ids into full records.
//!
//! Ids are split into batches no larger than the endpoint's limit. For each
//! batch the short-lived cache is consulted first; the rest are fetched with
//! the essential fields, then enriched with whichever optional fields the
//! project supports. Only fully merged records are cached.

mod cache;
mod comments;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

pub use cache::{
    CacheStats, Clock, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS, ManualClock, SystemClock,
    TtlCache,
};
pub use comments::{Comment, DEFAULT_COMMENT_CONCURRENCY, fetch_comments};

use crate::fields::{ESSENTIAL_FIELDS, FieldAvailabilityProbe, OptionalField, join_optional};
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::sync::{ProgressCallback, SyncProgress, emit};
use crate::types::RawRecord;

/// Batch detail endpoint (project scoped).
pub const WORK_ITEMS_ENDPOINT: &str = "_apis/wit/workitems";

/// Largest id list the batch detail endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct WorkItemList {
    // With `errorPolicy=omit`, deleted or inaccessible ids come back as nulls.
    #[serde(default)]
    value: Vec<Option<RawRecord>>,
}

pub struct BatchDetailFetcher {
    gateway: Arc<RequestGateway>,
    probe: FieldAvailabilityProbe,
    cache: Arc<TtlCache<RawRecord>>,
    batch_size: usize,
    on_progress: Option<ProgressCallback>,
}

impl BatchDetailFetcher {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(
        gateway: Arc<RequestGateway>,
        probe: FieldAvailabilityProbe,
        cache: Arc<TtlCache<RawRecord>>,
        batch_size: usize,
    ) -> Self {
        Self {
            gateway,
            probe,
            cache,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Records for `ids`, in input order.
    ///
    /// Ids the remote does not return are logged and skipped. An error is
    /// returned only if an essential-field request fails.
    pub async fn resolve(&self, ids: &[u64]) -> Result<Vec<RawRecord>, RemoteRequestError> {
        let mut records = Vec::with_capacity(ids.len());
        for batch in ids.chunks(self.batch_size) {
            records.extend(self.resolve_batch(batch).await?);
        }
        Ok(records)
    }

    async fn resolve_batch(&self, ids: &[u64]) -> Result<Vec<RawRecord>, RemoteRequestError> {
        let mut resolved: HashMap<u64, RawRecord> = HashMap::with_capacity(ids.len());
        let mut uncached = Vec::new();
        for &id in ids {
            if resolved.contains_key(&id) || uncached.contains(&id) {
                continue;
            }
            match self.cache.get(id) {
                Some(record) => {
                    resolved.insert(id, record);
                }
                None => uncached.push(id),
            }
        }
        let cached = resolved.len();

        if !uncached.is_empty() {
            let mut fetched: HashMap<u64, RawRecord> = self
                .fetch(&uncached, &ESSENTIAL_FIELDS.join(","))
                .await?
                .into_iter()
                .map(|r| (r.id, r))
                .collect();

            let complete = self.merge_optional(&uncached, &mut fetched).await;
            if complete {
                for record in fetched.values() {
                    self.cache.insert(record.id, record.clone());
                }
            }
            resolved.extend(fetched);
        }

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match resolved.get(id) {
                Some(record) => records.push(record.clone()),
                None => tracing::warn!(
                    work_item = id,
                    "Work item missing from detail response (deleted or inaccessible)"
                ),
            }
        }

        emit(
            self.on_progress.as_ref(),
            SyncProgress::BatchResolved {
                requested: ids.len(),
                returned: records.len(),
                cached,
            },
        );
        Ok(records)
    }

    /// Merge optional fields into `fetched`. Returns false if the merge degraded,
    /// either because the fetch failed or because some fields could not be
    /// classified.
    async fn merge_optional(
        &self,
        requested: &[u64],
        fetched: &mut HashMap<u64, RawRecord>,
    ) -> bool {
        let Some(probe_id) = requested.iter().copied().find(|id| fetched.contains_key(id)) else {
            return true;
        };

        let selection = self
            .probe
            .filter_available(&OptionalField::ALL, probe_id)
            .await;
        if !selection.complete {
            tracing::debug!(
                project = %self.probe.project(),
                "Field availability undecided, batch will not be cached"
            );
        }
        if selection.available.is_empty() {
            return selection.complete;
        }

        let present: Vec<u64> = requested
            .iter()
            .copied()
            .filter(|id| fetched.contains_key(id))
            .collect();

        match self.fetch(&present, &join_optional(&selection.available)).await {
            Ok(extra) => {
                for record in extra {
                    if let Some(base) = fetched.get_mut(&record.id) {
                        base.merge_fields(record);
                    }
                }
                selection.complete
            }
            Err(e) => {
                tracing::warn!(
                    project = %self.probe.project(),
                    error = %short_error_message(&e),
                    "Optional fields unavailable for batch, continuing with essential fields"
                );
                false
            }
        }
    }

    async fn fetch(&self, ids: &[u64], fields: &str) -> Result<Vec<RawRecord>, RemoteRequestError> {
        let ids = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = ApiRequest::get(WORK_ITEMS_ENDPOINT)
            .param("ids", ids)
            .param("fields", fields)
            .param("errorPolicy", "omit");
        let list: WorkItemList = self.gateway.get_json(&request).await?;
        Ok(list.value.into_iter().flatten().collect())
    }
}
