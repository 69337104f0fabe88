//! WIQL queries and continuation-token pagination over work item ids.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway};
use crate::types::RecordReference;

/// Query endpoint (project scoped).
pub const WIQL_ENDPOINT: &str = "_apis/wit/wiql";

/// Header some deployments use instead of a body field for the continuation token.
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Default page size for id queries.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Work item types indexed when none are configured.
pub const DEFAULT_WORK_ITEM_TYPES: &[&str] = &[
    "Bug", "Epic", "Feature", "Issue", "Task", "TestCase", "UserStory",
];

/// Which records a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub project: String,
    pub work_item_types: Vec<String>,
}

impl RecordFilter {
    pub fn new(project: impl Into<String>, work_item_types: Vec<String>) -> Self {
        Self {
            project: project.into(),
            work_item_types,
        }
    }

    /// The WIQL text, newest changes first.
    ///
    /// `changed_since` is date-only: WIQL rejects time components unless the
    /// query asks for time precision. Callers filter the exact window client-side.
    #[must_use]
    pub fn to_wiql(&self, changed_since: Option<NaiveDate>) -> String {
        let mut query = format!(
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = '{}'",
            escape(&self.project)
        );
        if !self.work_item_types.is_empty() {
            let types = self
                .work_item_types
                .iter()
                .map(|t| format!("'{}'", escape(t)))
                .collect::<Vec<_>>()
                .join(", ");
            query.push_str(&format!(" AND [System.WorkItemType] IN ({types})"));
        }
        if let Some(date) = changed_since {
            query.push_str(&format!(
                " AND [System.ChangedDate] >= '{}'",
                date.format("%Y-%m-%d")
            ));
        }
        query.push_str(" ORDER BY [System.ChangedDate] DESC");
        query
    }
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryPage {
    pub references: Vec<RecordReference>,
    /// `Some` when more pages exist.
    pub continuation_token: Option<String>,
}

impl QueryPage {
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.references.iter().map(|r| r.id).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResponse {
    #[serde(default)]
    work_items: Vec<RecordReference>,
    #[serde(default)]
    continuation_token: Option<String>,
}

/// Pages through ids matching a [`RecordFilter`].
///
/// No client-side deduplication happens here; resumption is driven purely by
/// the continuation token the caller hands back.
#[derive(Clone)]
pub struct RecordQueryEngine {
    gateway: Arc<RequestGateway>,
}

impl RecordQueryEngine {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    /// Fetch one page. `continuation_token == None` starts from the beginning.
    pub async fn next_page(
        &self,
        filter: &RecordFilter,
        changed_since: Option<NaiveDate>,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<QueryPage, RemoteRequestError> {
        let mut body = json!({
            "query": filter.to_wiql(changed_since),
            "top": page_size,
        });
        if let Some(token) = continuation_token {
            body["continuationToken"] = json!(token);
        }

        let request = ApiRequest::post(WIQL_ENDPOINT, body);
        let response = self.gateway.call(&request).await?;
        let parsed: WiqlResponse =
            serde_json::from_slice(&response.body).map_err(|source| RemoteRequestError::Decode {
                endpoint: WIQL_ENDPOINT.to_string(),
                source,
            })?;

        let continuation_token = parsed
            .continuation_token
            .or_else(|| response.header(CONTINUATION_HEADER).map(str::to_string))
            .filter(|t| !t.is_empty());

        Ok(QueryPage {
            references: parsed.work_items,
            continuation_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};
    use crate::testing::{WIQL_URL, test_gateway};

    fn filter() -> RecordFilter {
        RecordFilter::new("proj", vec!["Bug".to_string(), "User Story".to_string()])
    }

    #[test]
    fn test_wiql_shape_uses_date_only_filter() {
        let since = NaiveDate::from_ymd_opt(2023, 1, 1);
        assert_eq!(
            filter().to_wiql(since),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'proj' \
             AND [System.WorkItemType] IN ('Bug', 'User Story') \
             AND [System.ChangedDate] >= '2023-01-01' ORDER BY [System.ChangedDate] DESC"
        );
    }

    #[test]
    fn test_wiql_escapes_quotes_and_omits_empty_clauses() {
        let filter = RecordFilter::new("O'Brien", Vec::new());
        assert_eq!(
            filter.to_wiql(None),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'O''Brien' \
             ORDER BY [System.ChangedDate] DESC"
        );
    }

    #[tokio::test]
    async fn test_first_page_sends_no_token_and_reports_next() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            WIQL_URL,
            200,
            serde_json::json!({
                "workItems": [{"id": 1, "url": "u1"}, {"id": 2, "url": "u2"}],
                "continuationToken": "next"
            }),
        );
        let (gateway, _) = test_gateway(&transport);
        let engine = RecordQueryEngine::new(gateway);

        let page = engine
            .next_page(&filter(), None, None, 50)
            .await
            .expect("page");
        assert_eq!(page.ids(), vec![1, 2]);
        assert_eq!(page.continuation_token.as_deref(), Some("next"));

        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).expect("json");
        assert_eq!(body["top"], 50);
        assert!(body.get("continuationToken").is_none());
    }

    #[tokio::test]
    async fn test_resumes_with_token_and_reads_header_fallback() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            WIQL_URL,
            HttpResponse {
                status: 200,
                headers: vec![("x-ms-continuationtoken".to_string(), "page3".to_string())],
                body: br#"{"workItems": [{"id": 9}]}"#.to_vec(),
            },
        );
        let (gateway, _) = test_gateway(&transport);
        let engine = RecordQueryEngine::new(gateway);

        let page = engine
            .next_page(&filter(), None, Some("page2"), 100)
            .await
            .expect("page");
        assert_eq!(page.ids(), vec![9]);
        assert_eq!(page.continuation_token.as_deref(), Some("page3"));

        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).expect("json");
        assert_eq!(body["continuationToken"], "page2");
    }

    #[tokio::test]
    async fn test_last_page_has_no_token() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            WIQL_URL,
            200,
            serde_json::json!({"workItems": [], "continuationToken": ""}),
        );
        let (gateway, _) = test_gateway(&transport);
        let page = RecordQueryEngine::new(gateway)
            .next_page(&filter(), None, None, 100)
            .await
            .expect("page");
        assert!(page.references.is_empty());
        assert_eq!(page.continuation_token, None);
    }
}
