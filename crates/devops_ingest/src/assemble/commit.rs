use std::collections::BTreeMap;

use super::{AssemblyContext, AssemblyError, DocumentKey, parse_optional_timestamp};
use crate::sources::types::{GitCommit, GitRepository};
use crate::types::{Document, Owner, TextSection};

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

fn commit_link(ctx: &AssemblyContext, repo: &GitRepository, commit: &GitCommit) -> String {
    if let Some(url) = &commit.remote_url {
        return url.clone();
    }
    match &repo.web_url {
        Some(web) => format!("{}/commit/{}", web.trim_end_matches('/'), commit.commit_id),
        None => ctx.link(&format!("_git/{}/commit/{}", repo.name, commit.commit_id)),
    }
}

pub fn assemble_commit(
    ctx: &AssemblyContext,
    repo: &GitRepository,
    commit: &GitCommit,
) -> Result<Document, AssemblyError> {
    let sha = commit.commit_id.as_str();
    if sha.is_empty() {
        return Err(AssemblyError::missing("commitId"));
    }
    let message = commit.comment.clone().unwrap_or_default();
    let first_line = message.lines().next().unwrap_or("").trim();
    let author = commit.author.clone().unwrap_or_default();
    let committed_at = parse_optional_timestamp(
        "author.date",
        author
            .date
            .as_deref()
            .or(commit.committer.as_ref().and_then(|c| c.date.as_deref())),
    )?;
    let link = commit_link(ctx, repo, commit);
    let related: Vec<String> = commit
        .work_items
        .iter()
        .map(|w| format!("#{}", w.id))
        .collect();

    let mut text = format!(
        "Commit {sha}\nRepository: {}\nAuthor: {}\n\n{message}\n",
        repo.name,
        author.name.as_deref().unwrap_or("Unknown")
    );
    let changes: Vec<String> = commit
        .changes
        .iter()
        .filter_map(|c| {
            let path = c.item.as_ref()?.path.as_deref()?;
            Some(format!(
                "- {}: {path}",
                c.change_type.as_deref().unwrap_or("edit")
            ))
        })
        .collect();
    if !changes.is_empty() {
        text.push_str(&format!("\nChanges:\n{}\n", changes.join("\n")));
    }
    if !related.is_empty() {
        text.push_str(&format!("\nRelated Work Items: {}\n", related.join(", ")));
    }

    let mut metadata = BTreeMap::from([
        ("type".to_string(), "commit".to_string()),
        ("repository_name".to_string(), repo.name.clone()),
        ("repository_id".to_string(), repo.id.clone()),
        ("commit_id".to_string(), sha.to_string()),
        ("commit_url".to_string(), link.clone()),
    ]);
    if let Some(name) = &author.name {
        metadata.insert("author_name".to_string(), name.clone());
    }
    if let Some(email) = &author.email {
        metadata.insert("author_email".to_string(), email.clone());
    }
    if let Some(date) = committed_at {
        metadata.insert("commit_date".to_string(), date.to_rfc3339());
    }
    if !related.is_empty() {
        metadata.insert("related_work_items".to_string(), related.join(","));
    }

    let owners = if author.name.is_some() || author.email.is_some() {
        vec![Owner {
            display_name: author.name.clone(),
            email: author.email.clone(),
        }]
    } else {
        Vec::new()
    };

    let title = format!("Commit {}: {first_line}", short_sha(sha));
    Ok(Document {
        id: ctx.document_id(&DocumentKey::Commit {
            repository_id: &repo.id,
            sha,
        }),
        title: title.clone(),
        semantic_identifier: title,
        sections: vec![TextSection {
            text,
            link: Some(link.clone()),
        }],
        metadata,
        created_at: committed_at,
        updated_at: committed_at,
        owners,
        source_link: link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> AssemblyContext {
        AssemblyContext::new("org", "proj", "https://dev.azure.com/org/proj/")
    }

    fn repo() -> GitRepository {
        GitRepository {
            id: "repo-1".to_string(),
            name: "api".to_string(),
            web_url: Some("https://dev.azure.com/org/proj/_git/api".to_string()),
        }
    }

    #[test]
    fn test_assembles_commit() {
        let commit: GitCommit = serde_json::from_value(json!({
            "commitId": "0123456789abcdef",
            "comment": "Fix login redirect\n\nLonger body",
            "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-03-01T10:00:00Z"},
            "changes": [{"changeType": "edit", "item": {"path": "/src/login.rs"}}],
            "workItems": [{"id": "123"}]
        }))
        .unwrap();
        let doc = assemble_commit(&ctx(), &repo(), &commit).unwrap();

        assert_eq!(doc.id, "azuredevops:org/proj/git/repo-1/commit/0123456789abcdef");
        assert_eq!(doc.title, "Commit 01234567: Fix login redirect");
        assert_eq!(
            doc.source_link,
            "https://dev.azure.com/org/proj/_git/api/commit/0123456789abcdef"
        );
        assert_eq!(doc.metadata["related_work_items"], "#123");
        assert_eq!(doc.metadata["author_email"], "ada@example.com");
        assert!(doc.sections[0].text.contains("- edit: /src/login.rs"));
        assert!(doc.sections[0].text.contains("Related Work Items: #123"));
    }

    #[test]
    fn test_short_sha_tolerates_short_ids() {
        assert_eq!(short_sha("abc"), "abc");
    }

    #[test]
    fn test_bad_date_fails_the_commit() {
        let commit: GitCommit = serde_json::from_value(json!({
            "commitId": "abc",
            "author": {"date": "someday"}
        }))
        .unwrap();
        assert!(assemble_commit(&ctx(), &repo(), &commit).is_err());
    }
}
