use std::sync::Arc;

use chrono::SecondsFormat;

use super::types::{ListResponse, TestResult, TestRun, TestRunStatistics};
use super::{LIST_PAGE_SIZE, StreamItem};
use crate::assemble::{AssemblyContext, DocumentKey, assemble_test_run};
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::types::{ConnectorFailure, TimeWindow};

const RUNS_ENDPOINT: &str = "_apis/test/runs";

pub(super) async fn collect(
    gateway: &Arc<RequestGateway>,
    ctx: &AssemblyContext,
    window: &TimeWindow,
    statistics: bool,
    results: bool,
) -> Result<Vec<StreamItem>, RemoteRequestError> {
    let request = ApiRequest::get(RUNS_ENDPOINT)
        .param(
            "minLastUpdatedDate",
            window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .param(
            "maxLastUpdatedDate",
            window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .param("$top", LIST_PAGE_SIZE.to_string());
    let runs: ListResponse<TestRun> = gateway.get_json(&request).await?;
    tracing::info!(count = runs.value.len(), "Fetched test runs");

    let mut items = Vec::with_capacity(runs.value.len());
    for run in runs.value {
        let document_id = ctx.document_id(&DocumentKey::TestRun(run.id));

        let stats = if statistics {
            let request = ApiRequest::get(format!("{RUNS_ENDPOINT}/{}/statistics", run.id));
            match gateway.get_json::<TestRunStatistics>(&request).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    items.push(Err(run_failure(document_id, &run, "statistics", &e)));
                    continue;
                }
            }
        } else {
            None
        };

        let case_results = if results {
            let request = ApiRequest::get(format!("{RUNS_ENDPOINT}/{}/results", run.id))
                .param("$top", LIST_PAGE_SIZE.to_string());
            match gateway.get_json::<ListResponse<TestResult>>(&request).await {
                Ok(list) => Some(list.value),
                Err(e) => {
                    items.push(Err(run_failure(document_id, &run, "results", &e)));
                    continue;
                }
            }
        } else {
            None
        };

        items.push(
            assemble_test_run(ctx, &run, stats.as_ref(), case_results.as_deref())
                .map_err(|e| e.into_failure(document_id, run.web_access_url.clone())),
        );
    }
    Ok(items)
}

fn run_failure(
    document_id: String,
    run: &TestRun,
    what: &str,
    err: &RemoteRequestError,
) -> ConnectorFailure {
    tracing::warn!(
        run = run.id,
        error = %short_error_message(err),
        "Failed to fetch test run {what}"
    );
    ConnectorFailure::document(
        document_id,
        run.web_access_url.clone(),
        format!("Failed to fetch test run {what}: {}", short_error_message(err)),
    )
}
