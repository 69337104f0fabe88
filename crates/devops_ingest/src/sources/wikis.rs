use std::collections::HashSet;
use std::sync::Arc;

use super::StreamItem;
use super::types::{ListResponse, Wiki, WikiPage};
use crate::assemble::{AssemblyContext, DocumentKey, assemble_wiki_page};
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::types::ConnectorFailure;

const WIKIS_ENDPOINT: &str = "_apis/wiki/wikis";

fn page_request(wiki: &Wiki, path: &str) -> ApiRequest {
    ApiRequest::get(format!("{WIKIS_ENDPOINT}/{}/pages", wiki.id))
        .param("path", path)
        .param("recursionLevel", "oneLevel")
        .param("includeContent", "true")
}

/// Every page of every wiki. Pages are fetched one level at a time so each
/// fetch carries that page's content.
pub(super) async fn collect(
    gateway: &Arc<RequestGateway>,
    ctx: &AssemblyContext,
) -> Result<Vec<StreamItem>, RemoteRequestError> {
    let wikis: ListResponse<Wiki> = gateway.get_json(&ApiRequest::get(WIKIS_ENDPOINT)).await?;
    let mut items = Vec::new();
    for wiki in &wikis.value {
        let root: WikiPage = gateway.get_json(&page_request(wiki, "/")).await?;
        let before = items.len();
        walk(gateway, ctx, wiki, root, &mut items).await;
        tracing::info!(
            wiki = %wiki.name,
            pages = items.len() - before,
            "Walked wiki"
        );
    }
    Ok(items)
}

async fn walk(
    gateway: &Arc<RequestGateway>,
    ctx: &AssemblyContext,
    wiki: &Wiki,
    root: WikiPage,
    items: &mut Vec<StreamItem>,
) {
    let mut seen = HashSet::new();
    let mut pending = vec![root];

    while let Some(mut page) = pending.pop() {
        if !seen.insert(page.path.clone()) {
            continue;
        }
        for child in std::mem::take(&mut page.sub_pages) {
            if seen.contains(&child.path) {
                continue;
            }
            match gateway.get_json::<WikiPage>(&page_request(wiki, &child.path)).await {
                Ok(full) => pending.push(full),
                Err(e) => {
                    tracing::warn!(
                        wiki = %wiki.name,
                        path = %child.path,
                        error = %short_error_message(&e),
                        "Failed to fetch wiki page"
                    );
                    seen.insert(child.path.clone());
                    items.push(Err(ConnectorFailure::document(
                        ctx.document_id(&DocumentKey::WikiPage {
                            wiki_id: &wiki.id,
                            path: &child.path,
                        }),
                        child.remote_url.clone(),
                        format!("Failed to fetch wiki page: {}", short_error_message(&e)),
                    )));
                }
            }
        }
        if page.content.as_deref().is_some_and(|c| !c.trim().is_empty()) {
            items.push(Ok(assemble_wiki_page(ctx, wiki, &page)));
        }
    }
}
