use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Deserialize;

use super::types::{GitChange, GitCommit, GitRepository, ListResponse};
use super::{LIST_PAGE_SIZE, StreamItem};
use crate::assemble::{AssemblyContext, DocumentKey, assemble_commit};
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::types::TimeWindow;

const REPOSITORIES_ENDPOINT: &str = "_apis/git/repositories";

#[derive(Debug, Deserialize)]
struct ChangeList {
    #[serde(default)]
    changes: Vec<GitChange>,
}

pub(super) async fn list_repositories(
    gateway: &Arc<RequestGateway>,
) -> Result<Vec<GitRepository>, RemoteRequestError> {
    let list: ListResponse<GitRepository> = gateway
        .get_json(&ApiRequest::get(REPOSITORIES_ENDPOINT))
        .await?;
    tracing::debug!(count = list.value.len(), "Listed git repositories");
    Ok(list.value)
}

/// Commits in `window` across `repositories`, with their file changes.
pub(super) async fn collect(
    gateway: &Arc<RequestGateway>,
    ctx: &AssemblyContext,
    repositories: &[GitRepository],
    window: &TimeWindow,
) -> Result<Vec<StreamItem>, RemoteRequestError> {
    let mut items = Vec::new();
    for repo in repositories {
        let request = ApiRequest::get(format!("{REPOSITORIES_ENDPOINT}/{}/commits", repo.id))
            .param(
                "searchCriteria.fromDate",
                window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .param(
                "searchCriteria.toDate",
                window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .param("searchCriteria.includeWorkItems", "true")
            .param("searchCriteria.$top", LIST_PAGE_SIZE.to_string());
        let commits: ListResponse<GitCommit> = gateway.get_json(&request).await?;
        tracing::info!(
            repository = %repo.name,
            count = commits.value.len(),
            "Fetched commits"
        );

        for mut commit in commits.value {
            if commit.changes.is_empty() {
                commit.changes = fetch_changes(gateway, repo, &commit.commit_id).await;
            }
            items.push(assemble_commit(ctx, repo, &commit).map_err(|e| {
                e.into_failure(
                    ctx.document_id(&DocumentKey::Commit {
                        repository_id: &repo.id,
                        sha: &commit.commit_id,
                    }),
                    commit.remote_url.clone(),
                )
            }));
        }
    }
    Ok(items)
}

/// Changed paths for one commit. Failures degrade to no changes.
async fn fetch_changes(
    gateway: &Arc<RequestGateway>,
    repo: &GitRepository,
    sha: &str,
) -> Vec<GitChange> {
    let request = ApiRequest::get(format!(
        "{REPOSITORIES_ENDPOINT}/{}/commits/{sha}/changes",
        repo.id
    ));
    match gateway.get_json::<ChangeList>(&request).await {
        Ok(list) => list.changes,
        Err(e) => {
            tracing::warn!(
                repository = %repo.name,
                commit = sha,
                error = %short_error_message(&e),
                "Failed to fetch commit changes"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport, query_param};
    use crate::testing::{PROJECT_URL, test_gateway};
    use serde_json::json;

    fn window() -> TimeWindow {
        TimeWindow::new(
            "2024-03-01T00:00:00Z".parse().unwrap(),
            "2024-03-02T00:00:00Z".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_collects_commits_with_changes() {
        let transport = MockTransport::new();
        let commits_url = format!("{PROJECT_URL}_apis/git/repositories/r1/commits");
        transport.push_json(
            HttpMethod::Get,
            commits_url.clone(),
            200,
            json!({"value": [{
                "commitId": "aaaaaaaaaaaa",
                "comment": "Add health check",
                "author": {"name": "Ada", "date": "2024-03-01T12:00:00Z"},
                "workItems": [{"id": "5"}]
            }]}),
        );
        transport.push_json(
            HttpMethod::Get,
            format!("{commits_url}/aaaaaaaaaaaa/changes"),
            200,
            json!({"changes": [{"changeType": "add", "item": {"path": "/health.rs"}}]}),
        );
        let (gateway, _) = test_gateway(&transport);
        let ctx = AssemblyContext::new("org", "proj", PROJECT_URL);
        let repo = GitRepository {
            id: "r1".to_string(),
            name: "api".to_string(),
            web_url: None,
        };

        let items = collect(&gateway, &ctx, &[repo], &window()).await.unwrap();

        assert_eq!(items.len(), 1);
        let doc = items[0].as_ref().unwrap();
        assert!(doc.sections[0].text.contains("- add: /health.rs"));
        let sent = &transport.requests_to("r1/commits")[0];
        assert_eq!(
            query_param(&sent.url, "searchCriteria.fromDate").as_deref(),
            Some("2024-03-01T00:00:00Z")
        );
        assert_eq!(
            query_param(&sent.url, "searchCriteria.includeWorkItems").as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_bad_commit_becomes_document_failure() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{PROJECT_URL}_apis/git/repositories/r1/commits"),
            200,
            json!({"value": [{
                "commitId": "bbbb",
                "author": {"date": "never"},
                "changes": [{"changeType": "edit", "item": {"path": "/x"}}]
            }]}),
        );
        let (gateway, _) = test_gateway(&transport);
        let ctx = AssemblyContext::new("org", "proj", PROJECT_URL);
        let repo = GitRepository {
            id: "r1".to_string(),
            name: "api".to_string(),
            web_url: None,
        };

        let items = collect(&gateway, &ctx, &[repo], &window()).await.unwrap();

        let failure = items[0].as_ref().unwrap_err();
        assert!(!failure.is_entity());
        assert!(failure.message.contains("malformed date"));
    }
}
