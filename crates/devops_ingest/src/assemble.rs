//! Turning raw remote records into [`Document`]s.
//!
//! Every assembler is a pure function of its inputs. Identity comes from
//! [`DocumentKey`], built only from the organization, project, record kind and
//! remote id, so optional fields and edits never move a document.

mod commit;
mod release;
pub mod status;
mod test_run;
mod wiki;
mod work_item;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ConnectorFailure, Owner, SOURCE_PREFIX};

pub use commit::assemble_commit;
pub use release::assemble_release;
pub use status::{ResolutionStatus, StatusEvidence, classify};
pub use test_run::assemble_test_run;
pub use wiki::assemble_wiki_page;
pub use work_item::{assemble_work_item, work_item_status};

/// Where assembled documents live: used for ids and links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyContext {
    pub organization: String,
    pub project: String,
    /// Project root of the active base URL, with a trailing slash.
    pub project_url: String,
}

impl AssemblyContext {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        project_url: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            project_url: project_url.into(),
        }
    }

    #[must_use]
    pub fn document_id(&self, key: &DocumentKey<'_>) -> String {
        key.document_id(&self.organization, &self.project)
    }

    /// `{project_url}{path}` without doubled slashes.
    #[must_use]
    pub fn link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.project_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn work_item_link(&self, id: u64) -> String {
        self.link(&format!("_workitems/edit/{id}"))
    }
}

/// The fixed components that make up a document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKey<'a> {
    WorkItem(u64),
    Commit { repository_id: &'a str, sha: &'a str },
    Release(u64),
    TestRun(u64),
    WikiPage { wiki_id: &'a str, path: &'a str },
}

impl DocumentKey<'_> {
    #[must_use]
    pub fn document_id(&self, organization: &str, project: &str) -> String {
        let suffix = match self {
            DocumentKey::WorkItem(id) => format!("workitem/{id}"),
            DocumentKey::Commit { repository_id, sha } => {
                format!("git/{repository_id}/commit/{sha}")
            }
            DocumentKey::Release(id) => format!("release/{id}"),
            DocumentKey::TestRun(id) => format!("test/run/{id}"),
            DocumentKey::WikiPage { wiki_id, path } => {
                format!("wiki/{wiki_id}/page/{}", path.trim_start_matches('/'))
            }
        };
        format!("{SOURCE_PREFIX}:{organization}/{project}/{suffix}")
    }
}

/// A record that could not be assembled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("missing required field {field}")]
    MissingField { field: String },

    #[error("malformed date in {field}: {value:?}")]
    MalformedDate { field: String, value: String },
}

impl AssemblyError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        AssemblyError::MissingField {
            field: field.into(),
        }
    }

    /// Convert to an in-stream failure for the given document.
    #[must_use]
    pub fn into_failure(self, document_id: String, link: Option<String>) -> ConnectorFailure {
        ConnectorFailure::document(document_id, link, self.to_string())
    }
}

/// Parse an RFC 3339 timestamp, attributing failures to `field`.
pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AssemblyError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AssemblyError::MalformedDate {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Optional timestamp: absent is fine, present-but-broken is not.
pub(crate) fn parse_optional_timestamp(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, AssemblyError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_timestamp(field, v))
        .transpose()
}

/// Push `owner` unless an equal one is already present.
pub(crate) fn push_owner(owners: &mut Vec<Owner>, owner: Option<Owner>) {
    if let Some(owner) = owner
        && !owners.contains(&owner)
    {
        owners.push(owner);
    }
}
