//! Connector configuration.
//!
//! Everything here is plain data with serde defaults, so a caller can build it
//! in code or deserialize it from any layered source. Credentials live apart
//! in [`Credentials`] and are never part of the config.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::fetch::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS, DEFAULT_COMMENT_CONCURRENCY, MAX_BATCH_SIZE,
};
use crate::gateway::{
    AlternatePolicy, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_RETRY_AFTER_SECS, GatewayConfig,
};
use crate::query::{DEFAULT_PAGE_SIZE, DEFAULT_WORK_ITEM_TYPES, RecordFilter};
use crate::retry::RetryConfig;

/// Largest `$top` the query endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 200;

/// A kind of content the connector can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    WorkItems,
    Commits,
    TestResults,
    TestStats,
    Releases,
    ReleaseDetails,
    Wikis,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        DataType::WorkItems,
        DataType::Commits,
        DataType::TestResults,
        DataType::TestStats,
        DataType::Releases,
        DataType::ReleaseDetails,
        DataType::Wikis,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::WorkItems => "work_items",
            DataType::Commits => "commits",
            DataType::TestResults => "test_results",
            DataType::TestStats => "test_stats",
            DataType::Releases => "releases",
            DataType::ReleaseDetails => "release_details",
            DataType::Wikis => "wikis",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| ConnectorError::InvalidConfig(format!("unknown data type: {s}")))
    }
}

/// Shorthand that overrides the explicit data type list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentScope {
    Everything,
    WorkItemsOnly,
}

impl ContentScope {
    /// Case-insensitive; unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "everything" => Some(ContentScope::Everything),
            "work_items_only" => Some(ContentScope::WorkItemsOnly),
            _ => None,
        }
    }
}

/// Settings for one organization/project pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub organization: String,
    pub project: String,
    pub work_item_types: Vec<String>,
    pub include_comments: bool,
    pub data_types: Vec<DataType>,
    /// `"everything"` or `"work_items_only"`; anything else defers to `data_types`.
    pub content_scope: Option<String>,
    /// Repository names to read commits from. Empty means all.
    pub repositories: Vec<String>,
    pub page_size: usize,
    pub batch_size: usize,
    pub requests_per_second: u32,
    pub retry: RetryConfig,
    pub default_retry_after_secs: u64,
    pub cache_ttl_secs: i64,
    pub cache_capacity: usize,
    pub comment_concurrency: usize,
    /// Stop after this many pages and hand back a resumable checkpoint.
    pub max_pages_per_run: Option<usize>,
    pub use_alternate_url: bool,
    pub alternate_policy: AlternatePolicy,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            project: String::new(),
            work_item_types: DEFAULT_WORK_ITEM_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            include_comments: true,
            data_types: vec![DataType::WorkItems],
            content_scope: None,
            repositories: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: MAX_BATCH_SIZE,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            retry: RetryConfig::default(),
            default_retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            comment_concurrency: DEFAULT_COMMENT_CONCURRENCY,
            max_pages_per_run: None,
            use_alternate_url: true,
            alternate_policy: AlternatePolicy::default(),
        }
    }
}

impl ConnectorConfig {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            ..Self::default()
        }
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(ConnectorError::InvalidConfig(
                "organization is required".to_string(),
            ));
        }
        if self.project.trim().is_empty() {
            return Err(ConnectorError::InvalidConfig(
                "project is required".to_string(),
            ));
        }
        if self.page_size == 0 || self.batch_size == 0 {
            return Err(ConnectorError::InvalidConfig(
                "page_size and batch_size must be positive".to_string(),
            ));
        }
        if self.max_pages_per_run == Some(0) {
            return Err(ConnectorError::InvalidConfig(
                "max_pages_per_run must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Data types after applying `content_scope`.
    #[must_use]
    pub fn enabled_data_types(&self) -> BTreeSet<DataType> {
        match self.content_scope.as_deref().and_then(ContentScope::parse) {
            Some(ContentScope::Everything) => DataType::ALL.into_iter().collect(),
            Some(ContentScope::WorkItemsOnly) => BTreeSet::from([DataType::WorkItems]),
            None => self.data_types.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    #[must_use]
    pub fn record_filter(&self) -> RecordFilter {
        RecordFilter::new(self.project.clone(), self.work_item_types.clone())
    }

    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            requests_per_second: self.requests_per_second,
            retry: self.retry.clone(),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
            alternate_policy: if self.use_alternate_url {
                self.alternate_policy
            } else {
                AlternatePolicy::Never
            },
            ..GatewayConfig::default()
        }
    }
}

/// Personal access token for the organization.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub personal_access_token: String,
}

impl Credentials {
    pub fn new(personal_access_token: impl Into<String>) -> Self {
        Self {
            personal_access_token: personal_access_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("personal_access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::new("org", "proj");
        assert!(config.include_comments);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.work_item_types.len(), 7);
        assert_eq!(
            config.enabled_data_types(),
            BTreeSet::from([DataType::WorkItems])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_content_scope_is_case_insensitive() {
        let mut config = ConnectorConfig::new("org", "proj");
        config.content_scope = Some("EveryThing".to_string());
        assert_eq!(config.enabled_data_types().len(), DataType::ALL.len());

        config.content_scope = Some("WORK_ITEMS_ONLY".to_string());
        config.data_types = vec![DataType::Commits];
        assert_eq!(
            config.enabled_data_types(),
            BTreeSet::from([DataType::WorkItems])
        );

        config.content_scope = Some("mystery".to_string());
        assert_eq!(
            config.enabled_data_types(),
            BTreeSet::from([DataType::Commits])
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ConnectorConfig = serde_json::from_value(json!({
            "organization": "org",
            "project": "proj",
            "page_size": 500,
            "data_types": ["work_items", "wikis"],
            "alternate_policy": "lower_status"
        }))
        .unwrap();
        assert_eq!(config.effective_page_size(), MAX_PAGE_SIZE);
        assert!(config.enabled_data_types().contains(&DataType::Wikis));
        assert_eq!(
            config.gateway_config().alternate_policy,
            AlternatePolicy::LowerStatus
        );
    }

    #[test]
    fn test_disabling_alternate_url() {
        let mut config = ConnectorConfig::new("org", "proj");
        config.use_alternate_url = false;
        assert_eq!(config.gateway_config().alternate_policy, AlternatePolicy::Never);
    }

    #[test]
    fn test_validation() {
        assert!(ConnectorConfig::new("", "proj").validate().is_err());
        let mut config = ConnectorConfig::new("org", "proj");
        config.max_pages_per_run = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_type_parse_and_redacted_debug() {
        assert_eq!("Release_Details".parse::<DataType>().unwrap(), DataType::ReleaseDetails);
        assert!("builds".parse::<DataType>().is_err());
        let creds = Credentials::new("secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
