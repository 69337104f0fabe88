//! Work item comments, fetched with bounded fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::gateway::{ApiRequest, PREVIEW_API_VERSION, RequestGateway, short_error_message};
use crate::types::Owner;

/// Default number of concurrent comment requests.
pub const DEFAULT_COMMENT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    #[serde(default)]
    created_by: Option<Value>,
    #[serde(default)]
    text: Option<String>,
}

impl From<WireComment> for Comment {
    fn from(wire: WireComment) -> Self {
        let author = wire
            .created_by
            .as_ref()
            .and_then(Owner::from_identity)
            .map(|o| o.label().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            author,
            text: wire.text.unwrap_or_default(),
        }
    }
}

fn comments_endpoint(id: u64) -> String {
    format!("_apis/wit/workItems/{id}/comments")
}

/// Fetch comments for every id, at most `concurrency` requests in flight.
///
/// A failed fetch is logged and yields no comments for that item; it never
/// fails the batch. The map has an entry for every input id.
pub async fn fetch_comments(
    gateway: Arc<RequestGateway>,
    ids: &[u64],
    concurrency: usize,
) -> HashMap<u64, Vec<Comment>> {
    let mut results: HashMap<u64, Vec<Comment>> =
        ids.iter().map(|id| (*id, Vec::new())).collect();
    if ids.is_empty() {
        return results;
    }

    let concurrency = concurrency.clamp(1, ids.len());
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(ids.len());

    for &id in ids {
        let semaphore = Arc::clone(&semaphore);
        let gateway = Arc::clone(&gateway);

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (id, Vec::new());
            };
            let request = ApiRequest::get(comments_endpoint(id)).api_version(PREVIEW_API_VERSION);
            match gateway.get_json::<CommentList>(&request).await {
                Ok(list) => (id, list.comments.into_iter().map(Comment::from).collect()),
                Err(e) => {
                    tracing::warn!(
                        work_item = id,
                        error = %short_error_message(&e),
                        "Failed to fetch comments"
                    );
                    (id, Vec::new())
                }
            }
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((id, comments)) => {
                results.insert(id, comments);
            }
            Err(e) => tracing::warn!(error = %e, "Comment fetch task panicked"),
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport, query_param};
    use crate::testing::{PROJECT_URL, test_gateway};
    use serde_json::json;

    fn url(id: u64) -> String {
        format!("{PROJECT_URL}_apis/wit/workItems/{id}/comments")
    }

    #[tokio::test]
    async fn test_fetches_all_with_preview_version() {
        let transport = MockTransport::new();
        for id in [1u64, 2, 3] {
            transport.push_json(
                HttpMethod::Get,
                url(id),
                200,
                json!({"comments": [{"createdBy": {"displayName": format!("user{id}")}, "text": format!("hi {id}")}]}),
            );
        }
        let (gateway, _) = test_gateway(&transport);

        let comments = fetch_comments(gateway, &[1, 2, 3], 2).await;

        assert_eq!(comments.len(), 3);
        assert_eq!(
            comments[&2],
            vec![Comment {
                author: "user2".to_string(),
                text: "hi 2".to_string()
            }]
        );
        for request in transport.requests() {
            assert_eq!(
                query_param(&request.url, "api-version").as_deref(),
                Some(PREVIEW_API_VERSION)
            );
        }
    }

    #[tokio::test]
    async fn test_failures_yield_empty_comments() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, url(1), 200, json!({"comments": [{"text": "x"}]}));
        transport.push_json(HttpMethod::Get, url(2), 400, json!({"message": "preview required"}));
        let (gateway, _) = test_gateway(&transport);

        let comments = fetch_comments(gateway, &[1, 2], 8).await;

        assert_eq!(comments[&1][0].author, "Unknown");
        assert!(comments[&2].is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let transport = MockTransport::new();
        let (gateway, _) = test_gateway(&transport);
        assert!(fetch_comments(gateway, &[], 4).await.is_empty());
        assert!(transport.requests().is_empty());
    }
}
