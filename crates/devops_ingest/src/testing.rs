//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::gateway::{GatewayConfig, RecordingSleeper, RequestGateway, UrlForm};
use crate::http::MockTransport;
use crate::retry::RetryConfig;

pub(crate) const PROJECT_URL: &str = "https://dev.azure.com/org/proj/";
pub(crate) const WIQL_URL: &str = "https://dev.azure.com/org/proj/_apis/wit/wiql";
pub(crate) const WORKITEMS_URL: &str = "https://dev.azure.com/org/proj/_apis/wit/workitems";

pub(crate) fn test_gateway_config() -> GatewayConfig {
    GatewayConfig {
        requests_per_second: 10_000,
        retry: RetryConfig::new(Duration::from_millis(10), Duration::from_millis(100), 1)
            .with_jitter(false),
        ..GatewayConfig::default()
    }
}

/// Gateway for `org`/`proj` over `transport`, sleeping into a recorder.
pub(crate) fn test_gateway(transport: &MockTransport) -> (Arc<RequestGateway>, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let gateway = RequestGateway::new(
        Arc::new(transport.clone()),
        UrlForm::dev_azure("org", "proj"),
        "Basic OnBhdA==".to_string(),
        test_gateway_config(),
    )
    .with_sleeper(Arc::new(sleeper.clone()));
    (Arc::new(gateway), sleeper)
}

/// A work item in the batch detail response shape with all essential fields.
pub(crate) fn work_item(id: u64, title: &str, state: &str, changed: &str) -> Value {
    json!({
        "id": id,
        "fields": {
            "System.Id": id,
            "System.Title": title,
            "System.Description": format!("<p>{title} details</p>"),
            "System.WorkItemType": "Bug",
            "System.State": state,
            "System.CreatedBy": {"displayName": "Ada Lovelace", "uniqueName": "ada@example.com"},
            "System.CreatedDate": "2023-01-01T08:00:00Z",
            "System.ChangedBy": {"displayName": "Ada Lovelace", "uniqueName": "ada@example.com"},
            "System.ChangedDate": changed,
            "System.Tags": "backend; urgent",
            "System.AssignedTo": {"displayName": "Grace Hopper", "uniqueName": "grace@example.com"}
        }
    })
}
