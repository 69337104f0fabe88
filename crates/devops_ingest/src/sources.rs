//! Secondary content streams: commits, releases, test runs and wiki pages.
//!
//! Unlike work items these are not checkpointed. Each one runs to completion
//! once per invocation, after work item pagination is done. A stream-level
//! error surfaces as one entity failure; a single record that fails only costs
//! that record.

mod git;
mod releases;
mod test_runs;
pub mod types;
mod wikis;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::assemble::AssemblyContext;
use crate::config::DataType;
use crate::gateway::{RemoteRequestError, RequestGateway};
use crate::types::{ConnectorFailure, Document, TimeWindow};

use self::types::GitRepository;

/// Cap for list endpoints that take `$top`.
pub const LIST_PAGE_SIZE: usize = 200;

/// One output of a secondary stream.
pub type StreamItem = Result<Document, ConnectorFailure>;

/// A secondary stream and the options derived from the enabled data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryStream {
    Commits,
    Releases { details: bool },
    TestRuns { statistics: bool, results: bool },
    Wikis,
}

impl SecondaryStream {
    /// Streams to run for `enabled`, in a fixed order.
    #[must_use]
    pub fn plan(enabled: &BTreeSet<DataType>) -> Vec<Self> {
        let mut streams = Vec::new();
        if enabled.contains(&DataType::Commits) {
            streams.push(SecondaryStream::Commits);
        }
        let details = enabled.contains(&DataType::ReleaseDetails);
        if details || enabled.contains(&DataType::Releases) {
            streams.push(SecondaryStream::Releases { details });
        }
        let statistics = enabled.contains(&DataType::TestStats);
        let results = enabled.contains(&DataType::TestResults);
        if statistics || results {
            streams.push(SecondaryStream::TestRuns {
                statistics,
                results,
            });
        }
        if enabled.contains(&DataType::Wikis) {
            streams.push(SecondaryStream::Wikis);
        }
        streams
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SecondaryStream::Commits => "commits",
            SecondaryStream::Releases { .. } => "releases",
            SecondaryStream::TestRuns { .. } => "test_runs",
            SecondaryStream::Wikis => "wikis",
        }
    }

    /// Entity id reported when the whole stream fails.
    #[must_use]
    pub fn entity_id(&self) -> &'static str {
        match self {
            SecondaryStream::Commits => "azure_devops_commits",
            SecondaryStream::Releases { .. } => "azure_devops_releases",
            SecondaryStream::TestRuns { .. } => "azure_devops_test_runs",
            SecondaryStream::Wikis => "azure_devops_wikis",
        }
    }
}

/// Fetches and assembles the secondary streams for one project.
pub struct SecondarySources {
    gateway: Arc<RequestGateway>,
    repositories: Vec<String>,
    repository_cache: OnceCell<Vec<GitRepository>>,
}

impl SecondarySources {
    /// `repositories` restricts commits to those names (case-insensitive).
    pub fn new(gateway: Arc<RequestGateway>, repositories: Vec<String>) -> Self {
        Self {
            gateway,
            repositories,
            repository_cache: OnceCell::new(),
        }
    }

    /// Run `stream` to completion.
    pub async fn collect(
        &self,
        stream: SecondaryStream,
        ctx: &AssemblyContext,
        window: &TimeWindow,
    ) -> Result<Vec<StreamItem>, RemoteRequestError> {
        match stream {
            SecondaryStream::Commits => {
                let repositories = self.repositories().await?;
                git::collect(&self.gateway, ctx, &repositories, window).await
            }
            SecondaryStream::Releases { details } => {
                releases::collect(&self.gateway, ctx, window, details).await
            }
            SecondaryStream::TestRuns {
                statistics,
                results,
            } => test_runs::collect(&self.gateway, ctx, window, statistics, results).await,
            SecondaryStream::Wikis => wikis::collect(&self.gateway, ctx).await,
        }
    }

    /// Repositories matching the filter, listed once per session.
    async fn repositories(&self) -> Result<Vec<GitRepository>, RemoteRequestError> {
        let all = self
            .repository_cache
            .get_or_try_init(|| git::list_repositories(&self.gateway))
            .await?;
        Ok(all
            .iter()
            .filter(|r| {
                self.repositories.is_empty()
                    || self
                        .repositories
                        .iter()
                        .any(|wanted| wanted.eq_ignore_ascii_case(&r.name))
            })
            .cloned()
            .collect())
    }
}
