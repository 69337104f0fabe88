use std::collections::BTreeMap;

use super::{AssemblyContext, DocumentKey};
use crate::sources::types::{Wiki, WikiPage};
use crate::types::{Document, TextSection};

/// Build the document for one wiki page. Pages carry no timestamps.
#[must_use]
pub fn assemble_wiki_page(ctx: &AssemblyContext, wiki: &Wiki, page: &WikiPage) -> Document {
    let link = page.remote_url.clone().unwrap_or_else(|| {
        ctx.link(&format!(
            "_wiki/wikis/{}?pagePath={}",
            wiki.name,
            url::form_urlencoded::byte_serialize(page.path.as_bytes()).collect::<String>()
        ))
    });
    let title = format!("Wiki: {} - {}", wiki.name, page.path);
    let text = page.content.clone().unwrap_or_default();

    let metadata = BTreeMap::from([
        ("type".to_string(), "wiki_page".to_string()),
        ("wiki_name".to_string(), wiki.name.clone()),
        ("wiki_id".to_string(), wiki.id.clone()),
        ("page_path".to_string(), page.path.clone()),
    ]);

    Document {
        id: ctx.document_id(&DocumentKey::WikiPage {
            wiki_id: &wiki.id,
            path: &page.path,
        }),
        title: title.clone(),
        semantic_identifier: title,
        sections: vec![TextSection {
            text,
            link: Some(link.clone()),
        }],
        metadata,
        created_at: None,
        updated_at: None,
        owners: Vec::new(),
        source_link: link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiki_page_document() {
        let ctx = AssemblyContext::new("org", "proj", "https://dev.azure.com/org/proj/");
        let wiki = Wiki {
            id: "w-1".to_string(),
            name: "proj.wiki".to_string(),
            remote_url: None,
        };
        let page = WikiPage {
            path: "/Runbooks/On Call".to_string(),
            content: Some("Page the primary.".to_string()),
            remote_url: None,
            is_parent_page: false,
            sub_pages: Vec::new(),
        };
        let doc = assemble_wiki_page(&ctx, &wiki, &page);
        assert_eq!(doc.id, "azuredevops:org/proj/wiki/w-1/page/Runbooks/On Call");
        assert_eq!(doc.title, "Wiki: proj.wiki - /Runbooks/On Call");
        assert_eq!(
            doc.source_link,
            "https://dev.azure.com/org/proj/_wiki/wikis/proj.wiki?pagePath=%2FRunbooks%2FOn+Call"
        );
        assert_eq!(doc.sections[0].text, "Page the primary.");
    }
}
