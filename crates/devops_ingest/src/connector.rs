//! The connector facade: credentials, validation, checkpointed sync and slim
//! enumeration for one organization/project pair.
//!
//! Session state (the field availability store, the detail cache, the
//! repository list and the adopted base URL) lives as long as the connector.
//! Concurrent runs need separate connectors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::assemble::{AssemblyContext, DocumentKey};
use crate::checkpoint::Checkpoint;
use crate::config::{ConnectorConfig, Credentials, DataType};
use crate::error::{ConnectorError, Result};
use crate::fetch::{BatchDetailFetcher, Clock, SystemClock, TtlCache};
use crate::fields::{FieldAvailabilityProbe, FieldAvailabilityStore, InMemoryFieldAvailability};
use crate::gateway::{
    ApiRequest, RemoteRequestError, RequestGateway, Scope, Sleeper, TokioSleeper, UrlForm,
    short_error_message,
};
use crate::http::{HttpTransport, basic_auth_header, reqwest_transport::ReqwestTransport};
use crate::query::RecordQueryEngine;
use crate::sources::{SecondarySources, SecondaryStream};
use crate::sync::{CheckpointedSyncLoop, ProgressCallback, SyncSettings};
use crate::types::{RawRecord, SlimDocument, TimeWindow};

/// Org-level endpoint used to check credentials.
const PROJECTS_ENDPOINT: &str = "_apis/projects";

/// Default HTTP timeout for the built-in transport.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

const AUTH_HINT: &str = "Check that the Personal Access Token is correct, has not expired, \
     and has sufficient scopes (Work Items: Read, Code: Read, Release: Read, Test Management: Read, Wiki: Read).";

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    value: Vec<ProjectRef>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    name: String,
}

/// Per-credential state, rebuilt when credentials are (re)loaded.
struct Session {
    gateway: Arc<RequestGateway>,
    secondary: Arc<SecondarySources>,
}

pub struct DevOpsConnector {
    config: ConnectorConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    sleeper: Arc<dyn Sleeper>,
    field_availability: Arc<dyn FieldAvailabilityStore>,
    cache: Arc<TtlCache<RawRecord>>,
    on_progress: Option<ProgressCallback>,
    session: Option<Session>,
}

impl DevOpsConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: Arc::new(Self::build_cache(&config, Arc::new(SystemClock))),
            config,
            transport: None,
            sleeper: Arc::new(TokioSleeper),
            field_availability: Arc::new(InMemoryFieldAvailability::new()),
            on_progress: None,
            session: None,
        })
    }

    fn build_cache(config: &ConnectorConfig, clock: Arc<dyn Clock>) -> TtlCache<RawRecord> {
        TtlCache::new(
            chrono::Duration::seconds(config.cache_ttl_secs),
            config.cache_capacity,
            clock,
        )
    }

    /// Replace the HTTP transport (defaults to reqwest).
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self.session = None;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self.session = None;
        self
    }

    /// Clock for the detail cache's TTL. Resets the cache.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = Arc::new(Self::build_cache(&self.config, clock));
        self
    }

    #[must_use]
    pub fn with_field_availability(mut self, store: Arc<dyn FieldAvailabilityStore>) -> Self {
        self.field_availability = store;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self.session = None;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Accept a personal access token and build the request session.
    pub fn load_credentials(&mut self, credentials: Credentials) -> Result<()> {
        let token = credentials.personal_access_token.trim();
        if token.is_empty() {
            return Err(ConnectorError::MissingCredential(
                "Azure DevOps personal access token is required".to_string(),
            ));
        }

        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => {
                let transport = ReqwestTransport::with_timeout(DEFAULT_HTTP_TIMEOUT)
                    .map_err(|e| ConnectorError::InvalidConfig(e.to_string()))?;
                let transport: Arc<dyn HttpTransport> = Arc::new(transport);
                self.transport = Some(Arc::clone(&transport));
                transport
            }
        };

        let organization = &self.config.organization;
        let project = &self.config.project;
        let mut gateway = RequestGateway::new(
            transport,
            UrlForm::dev_azure(organization, project),
            basic_auth_header("", token),
            self.config.gateway_config(),
        )
        .with_sleeper(Arc::clone(&self.sleeper))
        .with_progress(self.on_progress.clone());
        if self.config.use_alternate_url {
            gateway = gateway.with_alternate(UrlForm::visual_studio(organization, project));
        }
        let gateway = Arc::new(gateway);

        self.session = Some(Session {
            secondary: Arc::new(SecondarySources::new(
                Arc::clone(&gateway),
                self.config.repositories.clone(),
            )),
            gateway,
        });
        tracing::debug!(
            organization = %self.config.organization,
            project = %self.config.project,
            "Loaded Azure DevOps credentials"
        );
        Ok(())
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            ConnectorError::MissingCredential("Azure DevOps credentials not loaded".to_string())
        })
    }

    /// Check credentials against the organization and that the project exists.
    pub async fn validate_connector_settings(&self) -> Result<()> {
        let session = self.session()?;
        let request = ApiRequest::get(PROJECTS_ENDPOINT)
            .scope(Scope::Organization)
            .param("$top", "1000");
        let projects: ProjectList = session
            .gateway
            .get_json(&request)
            .await
            .map_err(|e| self.validation_error(&e))?;

        let wanted = &self.config.project;
        if !projects
            .value
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(wanted))
        {
            return Err(ConnectorError::ProjectNotFound {
                message: format!(
                    "Project '{wanted}' is not visible in organization '{}'. {AUTH_HINT}",
                    self.config.organization
                ),
            });
        }
        tracing::info!(
            organization = %self.config.organization,
            project = %wanted,
            "Connector settings validated"
        );
        Ok(())
    }

    fn validation_error(&self, err: &RemoteRequestError) -> ConnectorError {
        let detail = short_error_message(err);
        match err.status() {
            Some(401) => ConnectorError::CredentialExpired {
                message: format!("{detail}. {AUTH_HINT}"),
            },
            Some(403) => ConnectorError::InsufficientPermissions {
                message: format!("{detail}. {AUTH_HINT}"),
            },
            Some(404) => ConnectorError::ProjectNotFound {
                message: format!(
                    "Organization '{}' was not found: {detail}",
                    self.config.organization
                ),
            },
            _ => ConnectorError::Validation {
                message: format!("Failed to reach Azure DevOps: {detail}"),
            },
        }
    }

    /// Starting checkpoint for a first run.
    #[must_use]
    pub fn build_dummy_checkpoint(&self) -> Checkpoint {
        Checkpoint::initial()
    }

    /// Parse a persisted checkpoint, rejecting anything that would not
    /// round-trip unchanged.
    pub fn validate_checkpoint_json(&self, text: &str) -> Result<Checkpoint> {
        Checkpoint::from_json(text)
    }

    /// A sync loop over `[start, end]` resuming from `checkpoint`.
    pub fn load_from_checkpoint(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointedSyncLoop> {
        checkpoint.validate()?;
        if end < start {
            return Err(ConnectorError::InvalidConfig(format!(
                "sync window ends ({end}) before it starts ({start})"
            )));
        }
        let session = self.session()?;
        let enabled = self.config.enabled_data_types();

        let settings = SyncSettings {
            page_size: self.config.effective_page_size(),
            include_comments: self.config.include_comments,
            comment_concurrency: self.config.comment_concurrency,
            max_pages_per_run: self.config.max_pages_per_run,
            work_items: enabled.contains(&DataType::WorkItems),
        };

        Ok(CheckpointedSyncLoop::new(
            Arc::clone(&session.gateway),
            self.fetcher(session),
            self.config.organization.clone(),
            self.config.record_filter(),
            TimeWindow::new(start, end),
            checkpoint,
            settings,
        )
        .with_secondary(
            Arc::clone(&session.secondary),
            SecondaryStream::plan(&enabled),
        )
        .with_progress(self.on_progress.clone()))
    }

    fn fetcher(&self, session: &Session) -> BatchDetailFetcher {
        let probe = FieldAvailabilityProbe::new(
            Arc::clone(&session.gateway),
            Arc::clone(&self.field_availability),
            self.config.project.clone(),
        )
        .with_progress(self.on_progress.clone());
        BatchDetailFetcher::new(
            Arc::clone(&session.gateway),
            probe,
            Arc::clone(&self.cache),
            self.config.effective_batch_size(),
        )
        .with_progress(self.on_progress.clone())
    }

    /// Every work item id changed since `start` (or ever), as document ids in
    /// batches of `batch_size`. Used for pruning, so any query failure is an
    /// error rather than a short list.
    pub async fn retrieve_all_slim_documents(
        &self,
        start: Option<DateTime<Utc>>,
        batch_size: usize,
    ) -> Result<Vec<Vec<SlimDocument>>> {
        let session = self.session()?;
        let query = RecordQueryEngine::new(Arc::clone(&session.gateway));
        let filter = self.config.record_filter();
        let ctx = AssemblyContext::new(
            self.config.organization.clone(),
            self.config.project.clone(),
            session.gateway.project_url(),
        );
        let batch_size = batch_size.max(1);

        let mut batches: Vec<Vec<SlimDocument>> = Vec::new();
        let mut current = Vec::with_capacity(batch_size);
        let mut token: Option<String> = None;
        loop {
            let page = query
                .next_page(
                    &filter,
                    start.map(|s| s.date_naive()),
                    token.as_deref(),
                    self.config.effective_page_size(),
                )
                .await?;
            for id in page.ids() {
                current.push(SlimDocument {
                    id: ctx.document_id(&DocumentKey::WorkItem(id)),
                });
                if current.len() >= batch_size {
                    batches.push(std::mem::replace(
                        &mut current,
                        Vec::with_capacity(batch_size),
                    ));
                }
            }
            match page.continuation_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    tracing::warn!(
                        token = %next,
                        "Continuation token repeated, stopping enumeration"
                    );
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }
}
