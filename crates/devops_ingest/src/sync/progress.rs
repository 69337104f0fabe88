//! Progress reporting types for sync runs.
//!
//! Events are informational only; nothing in the sync loop depends on whether
//! a callback is installed.

use std::sync::Arc;

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A stream (work items, commits, ...) is starting.
    StreamStarted {
        /// Entity name of the stream, e.g. `azure_devops_work_items`.
        stream: &'static str,
    },

    /// Requesting the next page of work item ids.
    QueryingPage {
        /// Page number within this run (1-indexed).
        page: u32,
        /// Whether the query resumes from a continuation token.
        resumed: bool,
    },

    /// A page of ids came back from the query endpoint.
    PageFetched {
        /// Page number within this run (1-indexed).
        page: u32,
        /// Number of ids on the page.
        count: usize,
        /// Whether the remote reported more pages.
        has_more: bool,
    },

    /// One detail batch was resolved.
    BatchResolved {
        /// Ids requested.
        requested: usize,
        /// Records returned (cached + fetched).
        returned: usize,
        /// Records served from the short-lived cache.
        cached: usize,
    },

    /// An optional field was found to be missing from a project's schema.
    FieldUnavailable {
        /// Project the verdict applies to.
        project: String,
        /// Field reference name.
        field: String,
    },

    /// A single record could not be turned into a document.
    DocumentFailed {
        /// Document id (or best-effort record id).
        id: String,
        /// Error message.
        error: String,
    },

    /// A stream finished.
    StreamComplete {
        /// Entity name of the stream.
        stream: &'static str,
        /// Documents produced by the stream.
        documents: usize,
    },

    /// A stream failed and stopped for this run.
    StreamFailed {
        /// Entity name of the stream.
        stream: &'static str,
        /// Error message.
        error: String,
    },

    /// Rate limited, sleeping before re-issuing the request.
    RateLimited {
        /// Endpoint being retried.
        endpoint: String,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Transient failure, backing off before retry.
    RetryBackoff {
        /// Endpoint being retried.
        endpoint: String,
        /// Status code, or `None` for a transport error.
        status: Option<u16>,
        /// Backoff delay (ms).
        delay_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// The gateway switched to the alternate base URL.
    AlternateUrlAdopted {
        /// New project base URL.
        base_url: String,
    },

    /// The run yielded its final checkpoint.
    SyncComplete {
        /// Documents emitted.
        documents: usize,
        /// Failures emitted.
        failures: usize,
        /// `has_more` of the final checkpoint.
        has_more: bool,
    },

    /// Warning message (non-fatal).
    Warning {
        /// Warning message.
        message: String,
    },
}

/// Callback type for progress reporting.
///
/// Shared (`Arc`) because comment fetches run on spawned tasks.
pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Helper to emit progress events.
///
/// # Example
///
/// ```ignore
/// use devops_ingest::sync::{SyncProgress, emit};
///
/// emit(on_progress, SyncProgress::StreamStarted { stream: "azure_devops_commits" });
/// ```
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
