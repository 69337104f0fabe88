//! Wire shapes for the secondary streams. Only the fields the assemblers read.

use serde::Deserialize;
use serde_json::Value;

/// `{ "count": n, "value": [...] }`, the envelope of every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// A reference that only carries a display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GitUserDate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitItem {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitChange {
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(default)]
    pub item: Option<GitItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    pub commit_id: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub author: Option<GitUserDate>,
    #[serde(default)]
    pub committer: Option<GitUserDate>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub changes: Vec<GitChange>,
    #[serde(default)]
    pub work_items: Vec<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    #[serde(default)]
    pub approver: Option<Value>,
    #[serde(default)]
    pub approved_by: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEnvironment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pre_deploy_approvals: Vec<Approval>,
    #[serde(default)]
    pub post_deploy_approvals: Vec<Approval>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "type", default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub definition_reference: Option<Value>,
}

impl Artifact {
    /// `definitionReference.version.name`, when the artifact pins a version.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.definition_reference
            .as_ref()?
            .get("version")?
            .get("name")?
            .as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
    #[serde(default)]
    pub created_by: Option<Value>,
    #[serde(default)]
    pub release_definition: Option<NamedRef>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub environments: Vec<ReleaseEnvironment>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, rename = "_links")]
    pub links: Option<Value>,
}

impl Release {
    /// `_links.web.href`, the portal page for the release.
    #[must_use]
    pub fn web_link(&self) -> Option<&str> {
        self.links.as_ref()?.get("web")?.get("href")?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub started_date: Option<String>,
    #[serde(default)]
    pub completed_date: Option<String>,
    #[serde(default)]
    pub last_updated_date: Option<String>,
    #[serde(default)]
    pub build: Option<NamedRef>,
    #[serde(default)]
    pub release: Option<NamedRef>,
    #[serde(default)]
    pub web_access_url: Option<String>,
    #[serde(default)]
    pub owner: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(default)]
    pub test_case_title: Option<String>,
    #[serde(default)]
    pub test_case: Option<NamedRef>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl TestResult {
    #[must_use]
    pub fn case_name(&self) -> &str {
        self.test_case_title
            .as_deref()
            .or_else(|| self.test_case.as_ref()?.name.as_deref())
            .unwrap_or("Unnamed test")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunStatistic {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunStatistics {
    #[serde(default)]
    pub run_statistics: Vec<RunStatistic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wiki {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiPage {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub is_parent_page: bool,
    #[serde(default)]
    pub sub_pages: Vec<WikiPage>,
}
