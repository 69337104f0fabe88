//! The checkpointed sync loop.
//!
//! Pull-driven: each [`CheckpointedSyncLoop::next_step`] call does at most one
//! page (or one secondary stream) of network work, buffers what it produced,
//! and hands items back one at a time. Stopping early is just not pulling.
//!
//! ```text
//! PAGINATING ──(empty page | no token | entity failure)──▶ SECONDARY ──▶ END
//!      │                                                                   ▲
//!      └──────────────(max_pages_per_run reached, token pending)───────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use super::progress::{ProgressCallback, SyncProgress, emit};
use crate::assemble::{AssemblyContext, DocumentKey, assemble_work_item, parse_timestamp};
use crate::checkpoint::Checkpoint;
use crate::fetch::{BatchDetailFetcher, Comment, fetch_comments};
use crate::fields;
use crate::gateway::{RequestGateway, short_error_message};
use crate::query::{RecordFilter, RecordQueryEngine};
use crate::sources::{SecondarySources, SecondaryStream};
use crate::types::{ConnectorFailure, Document, RawRecord, TimeWindow};

/// Entity id for the work item stream.
pub const WORK_ITEMS_ENTITY: &str = "azure_devops_work_items";

/// One element of the output sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Content(Document),
    Failure(ConnectorFailure),
    /// Always last, exactly once.
    End(Checkpoint),
}

impl Step {
    /// Split into the typed triple consumers branch on.
    #[must_use]
    pub fn into_triple(
        self,
    ) -> (
        Option<Document>,
        Option<ConnectorFailure>,
        Option<Checkpoint>,
    ) {
        match self {
            Step::Content(doc) => (Some(doc), None, None),
            Step::Failure(failure) => (None, Some(failure), None),
            Step::End(checkpoint) => (None, None, Some(checkpoint)),
        }
    }
}

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: usize,
    pub include_comments: bool,
    pub comment_concurrency: usize,
    pub max_pages_per_run: Option<usize>,
    /// Whether the work item stream runs at all.
    pub work_items: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Paginating,
    Secondary,
    Ending { has_more: bool },
    Finished,
}

pub struct CheckpointedSyncLoop {
    gateway: Arc<RequestGateway>,
    query: RecordQueryEngine,
    fetcher: BatchDetailFetcher,
    secondary: Option<Arc<SecondarySources>>,
    pending_streams: VecDeque<SecondaryStream>,
    organization: String,
    filter: RecordFilter,
    window: TimeWindow,
    settings: SyncSettings,
    phase: Phase,
    continuation_token: Option<String>,
    pages: usize,
    work_item_documents: usize,
    buffer: VecDeque<Step>,
    documents: usize,
    failures: usize,
    on_progress: Option<ProgressCallback>,
}

impl CheckpointedSyncLoop {
    /// Start (or resume) a run over `window`.
    ///
    /// Pagination always resumes from `checkpoint.continuation_token`; a
    /// terminal checkpoint simply starts from the first page again, and the
    /// window keeps already-ingested records out.
    pub fn new(
        gateway: Arc<RequestGateway>,
        fetcher: BatchDetailFetcher,
        organization: impl Into<String>,
        filter: RecordFilter,
        window: TimeWindow,
        checkpoint: Checkpoint,
        settings: SyncSettings,
    ) -> Self {
        let phase = if settings.work_items {
            Phase::Paginating
        } else {
            Phase::Secondary
        };
        Self {
            query: RecordQueryEngine::new(Arc::clone(&gateway)),
            gateway,
            fetcher,
            secondary: None,
            pending_streams: VecDeque::new(),
            organization: organization.into(),
            filter,
            window,
            settings,
            phase,
            continuation_token: checkpoint.continuation_token,
            pages: 0,
            work_item_documents: 0,
            buffer: VecDeque::new(),
            documents: 0,
            failures: 0,
            on_progress: None,
        }
    }

    /// Secondary streams to run once work items are done.
    #[must_use]
    pub fn with_secondary(
        mut self,
        sources: Arc<SecondarySources>,
        streams: impl IntoIterator<Item = SecondaryStream>,
    ) -> Self {
        self.secondary = Some(sources);
        self.pending_streams = streams.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Next output, or `None` once the checkpoint has been handed out.
    pub async fn next_step(&mut self) -> Option<Step> {
        loop {
            if let Some(step) = self.buffer.pop_front() {
                match &step {
                    Step::Content(_) => self.documents += 1,
                    Step::Failure(_) => self.failures += 1,
                    Step::End(_) => {}
                }
                return Some(step);
            }

            match self.phase {
                Phase::Paginating => self.run_page().await,
                Phase::Secondary => match self.pending_streams.pop_front() {
                    Some(stream) => self.run_stream(stream).await,
                    None => self.phase = Phase::Ending { has_more: false },
                },
                Phase::Ending { has_more } => {
                    let checkpoint = if has_more {
                        Checkpoint::after_page(self.continuation_token.clone())
                    } else {
                        Checkpoint::terminal()
                    };
                    emit(
                        self.on_progress.as_ref(),
                        SyncProgress::SyncComplete {
                            documents: self.documents,
                            failures: self.failures,
                            has_more: checkpoint.has_more,
                        },
                    );
                    self.phase = Phase::Finished;
                    return Some(Step::End(checkpoint));
                }
                Phase::Finished => return None,
            }
        }
    }

    /// The same steps as a [`Stream`].
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = Step> + Send>> {
        Box::pin(futures::stream::unfold(self, |mut sync| async move {
            let step = sync.next_step().await?;
            Some((step, sync))
        }))
    }

    fn assembly_context(&self) -> AssemblyContext {
        AssemblyContext::new(
            self.organization.clone(),
            self.filter.project.clone(),
            self.gateway.project_url(),
        )
    }

    async fn run_page(&mut self) {
        if self.pages == 0 {
            emit(
                self.on_progress.as_ref(),
                SyncProgress::StreamStarted {
                    stream: WORK_ITEMS_ENTITY,
                },
            );
        }
        self.pages += 1;
        let page_number = u32::try_from(self.pages).unwrap_or(u32::MAX);
        emit(
            self.on_progress.as_ref(),
            SyncProgress::QueryingPage {
                page: page_number,
                resumed: self.continuation_token.is_some(),
            },
        );

        let page = match self
            .query
            .next_page(
                &self.filter,
                Some(self.window.start.date_naive()),
                self.continuation_token.as_deref(),
                self.settings.page_size,
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.fail_work_items(format!(
                    "Failed to query work items: {}",
                    short_error_message(&e)
                ));
                return;
            }
        };

        let ids = page.ids();
        emit(
            self.on_progress.as_ref(),
            SyncProgress::PageFetched {
                page: page_number,
                count: ids.len(),
                has_more: page.continuation_token.is_some(),
            },
        );
        tracing::info!(
            page = page_number,
            count = ids.len(),
            has_more = page.continuation_token.is_some(),
            "Fetched work item page"
        );

        if ids.is_empty() {
            self.finish_work_items();
            return;
        }

        let records = match self.fetcher.resolve(&ids).await {
            Ok(records) => records,
            Err(e) => {
                self.fail_work_items(format!(
                    "Failed to fetch work item details: {}",
                    short_error_message(&e)
                ));
                return;
            }
        };

        let records: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| self.in_window(r))
            .collect();
        let comments = self.comments_for(&records).await;
        let ctx = self.assembly_context();
        for record in &records {
            let children = comments.get(&record.id).map_or(&[][..], Vec::as_slice);
            match assemble_work_item(&ctx, record, children) {
                Ok(doc) => {
                    self.work_item_documents += 1;
                    self.buffer.push_back(Step::Content(doc));
                }
                Err(e) => {
                    let id = ctx.document_id(&DocumentKey::WorkItem(record.id));
                    tracing::warn!(document = %id, error = %e, "Failed to assemble work item");
                    emit(
                        self.on_progress.as_ref(),
                        SyncProgress::DocumentFailed {
                            id: id.clone(),
                            error: e.to_string(),
                        },
                    );
                    let link = ctx.work_item_link(record.id);
                    self.buffer
                        .push_back(Step::Failure(e.into_failure(id, Some(link))));
                }
            }
        }

        self.continuation_token = page.continuation_token;
        if self.continuation_token.is_none() {
            self.finish_work_items();
        } else if self
            .settings
            .max_pages_per_run
            .is_some_and(|max| self.pages >= max)
        {
            tracing::info!(
                pages = self.pages,
                "Page limit reached, stopping with resumable checkpoint"
            );
            self.phase = Phase::Ending { has_more: true };
        }
    }

    /// Records whose changed date falls inside the window. Undated or
    /// unparseable records are kept so assembly can report them.
    fn in_window(&self, record: &RawRecord) -> bool {
        let Some(changed) = record.text(fields::CHANGED_DATE) else {
            return true;
        };
        match parse_timestamp(fields::CHANGED_DATE, &changed) {
            Ok(at) if !self.window.contains(at) => {
                tracing::debug!(
                    work_item = record.id,
                    changed = %changed,
                    "Outside sync window, skipping"
                );
                false
            }
            _ => true,
        }
    }

    async fn comments_for(&self, records: &[RawRecord]) -> HashMap<u64, Vec<Comment>> {
        if !self.settings.include_comments || records.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        fetch_comments(
            Arc::clone(&self.gateway),
            &ids,
            self.settings.comment_concurrency,
        )
        .await
    }

    fn finish_work_items(&mut self) {
        emit(
            self.on_progress.as_ref(),
            SyncProgress::StreamComplete {
                stream: WORK_ITEMS_ENTITY,
                documents: self.work_item_documents,
            },
        );
        self.continuation_token = None;
        self.phase = Phase::Secondary;
    }

    fn fail_work_items(&mut self, message: String) {
        tracing::error!(entity = WORK_ITEMS_ENTITY, error = %message, "Work item stream failed");
        emit(
            self.on_progress.as_ref(),
            SyncProgress::StreamFailed {
                stream: WORK_ITEMS_ENTITY,
                error: message.clone(),
            },
        );
        self.buffer
            .push_back(Step::Failure(ConnectorFailure::entity(WORK_ITEMS_ENTITY, message)));
        self.continuation_token = None;
        self.phase = Phase::Secondary;
    }

    async fn run_stream(&mut self, stream: SecondaryStream) {
        let Some(sources) = self.secondary.clone() else {
            return;
        };
        let entity = stream.entity_id();
        emit(
            self.on_progress.as_ref(),
            SyncProgress::StreamStarted { stream: entity },
        );

        let ctx = self.assembly_context();
        match sources.collect(stream, &ctx, &self.window).await {
            Ok(items) => {
                let mut documents = 0;
                for item in items {
                    match item {
                        Ok(doc) => {
                            documents += 1;
                            self.buffer.push_back(Step::Content(doc));
                        }
                        Err(failure) => {
                            if let crate::types::FailedItem::Document(d) = &failure.failed {
                                emit(
                                    self.on_progress.as_ref(),
                                    SyncProgress::DocumentFailed {
                                        id: d.document_id.clone(),
                                        error: failure.message.clone(),
                                    },
                                );
                            }
                            self.buffer.push_back(Step::Failure(failure));
                        }
                    }
                }
                emit(
                    self.on_progress.as_ref(),
                    SyncProgress::StreamComplete {
                        stream: entity,
                        documents,
                    },
                );
            }
            Err(e) => {
                let message = format!(
                    "Failed to fetch {}: {}",
                    stream.name(),
                    short_error_message(&e)
                );
                tracing::error!(entity, error = %message, "Secondary stream failed");
                emit(
                    self.on_progress.as_ref(),
                    SyncProgress::StreamFailed {
                        stream: entity,
                        error: message.clone(),
                    },
                );
                self.buffer
                    .push_back(Step::Failure(ConnectorFailure::entity(entity, message)));
            }
        }
    }
}
