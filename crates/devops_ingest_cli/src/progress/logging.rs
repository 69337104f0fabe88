use devops_ingest::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::StreamStarted { stream } => {
                tracing::info!(stream, "Stream started");
            }

            SyncProgress::QueryingPage { page, resumed } => {
                tracing::debug!(page, resumed, "Querying page");
            }

            SyncProgress::PageFetched {
                page,
                count,
                has_more,
            } => {
                tracing::info!(page, count, has_more, "Fetched page");
            }

            SyncProgress::BatchResolved {
                requested,
                returned,
                cached,
            } => {
                tracing::debug!(requested, returned, cached, "Resolved batch");
            }

            SyncProgress::FieldUnavailable { project, field } => {
                tracing::warn!(project = %project, field = %field, "Optional field unavailable");
            }

            SyncProgress::DocumentFailed { id, error } => {
                tracing::warn!(id = %id, error = %error, "Document failed");
            }

            SyncProgress::StreamComplete { stream, documents } => {
                tracing::info!(stream, documents, "Stream complete");
            }

            SyncProgress::StreamFailed { stream, error } => {
                tracing::error!(stream, error = %error, "Stream failed");
            }

            SyncProgress::RateLimited {
                endpoint,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    endpoint = %endpoint,
                    retry_after_ms,
                    attempt,
                    "Rate limited, backing off"
                );
            }

            SyncProgress::RetryBackoff {
                endpoint,
                status,
                delay_ms,
                attempt,
            } => {
                tracing::debug!(
                    endpoint = %endpoint,
                    status = ?status,
                    delay_ms,
                    attempt,
                    "Retrying"
                );
            }

            SyncProgress::AlternateUrlAdopted { base_url } => {
                tracing::warn!(base_url = %base_url, "Switched to alternate base URL");
            }

            SyncProgress::SyncComplete {
                documents,
                failures,
                has_more,
            } => {
                tracing::info!(documents, failures, has_more, "Sync complete");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
