use std::sync::Arc;

use chrono::SecondsFormat;

use super::types::{ListResponse, Release};
use super::{LIST_PAGE_SIZE, StreamItem};
use crate::assemble::{AssemblyContext, DocumentKey, assemble_release, parse_optional_timestamp};
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::types::{ConnectorFailure, TimeWindow};

const RELEASES_ENDPOINT: &str = "_apis/release/releases";

/// Whether the release was touched inside `window`. Undated releases are kept.
fn in_window(release: &Release, window: &TimeWindow) -> bool {
    let stamp = release.modified_on.as_deref().or(release.created_on.as_deref());
    match parse_optional_timestamp("modifiedOn", stamp) {
        Ok(Some(at)) => window.contains(at),
        Ok(None) | Err(_) => true,
    }
}

pub(super) async fn collect(
    gateway: &Arc<RequestGateway>,
    ctx: &AssemblyContext,
    window: &TimeWindow,
    details: bool,
) -> Result<Vec<StreamItem>, RemoteRequestError> {
    let request = ApiRequest::get(RELEASES_ENDPOINT)
        .param(
            "minCreatedTime",
            window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .param("$top", LIST_PAGE_SIZE.to_string());
    let list: ListResponse<Release> = gateway.get_json(&request).await?;
    tracing::info!(count = list.value.len(), "Fetched releases");

    let mut items = Vec::new();
    for summary in list.value.into_iter().filter(|r| in_window(r, window)) {
        let document_id = ctx.document_id(&DocumentKey::Release(summary.id));
        let release = if details {
            let detail = ApiRequest::get(format!("{RELEASES_ENDPOINT}/{}", summary.id));
            match gateway.get_json::<Release>(&detail).await {
                Ok(release) => release,
                Err(e) => {
                    tracing::warn!(
                        release = summary.id,
                        error = %short_error_message(&e),
                        "Failed to fetch release details"
                    );
                    items.push(Err(ConnectorFailure::document(
                        document_id,
                        summary.web_link().map(str::to_string),
                        format!("Failed to fetch release details: {}", short_error_message(&e)),
                    )));
                    continue;
                }
            }
        } else {
            summary
        };
        items.push(
            assemble_release(ctx, &release, details).map_err(|e| {
                e.into_failure(document_id, release.web_link().map(str::to_string))
            }),
        );
    }
    Ok(items)
}
