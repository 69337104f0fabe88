use std::collections::BTreeMap;

use super::{AssemblyContext, AssemblyError, DocumentKey, parse_optional_timestamp, push_owner};
use crate::sources::types::{Approval, Release};
use crate::types::{Document, Owner, TextSection};

fn approval_line(environment: &str, stage: &str, approval: &Approval) -> String {
    let who = approval
        .approved_by
        .as_ref()
        .or(approval.approver.as_ref())
        .and_then(Owner::from_identity)
        .map(|o| o.label().to_string())
        .unwrap_or_else(|| "automated".to_string());
    format!(
        "- {environment} ({stage}): {} by {who}",
        approval.status.as_deref().unwrap_or("pending")
    )
}

/// Build the document for a release. `include_details` adds artifacts,
/// release notes and approvals to the text.
pub fn assemble_release(
    ctx: &AssemblyContext,
    release: &Release,
    include_details: bool,
) -> Result<Document, AssemblyError> {
    let name = release
        .name
        .clone()
        .unwrap_or_else(|| format!("Release {}", release.id));
    let status = release.status.as_deref().unwrap_or("unknown");
    let created_at = parse_optional_timestamp("createdOn", release.created_on.as_deref())?;
    let updated_at = parse_optional_timestamp("modifiedOn", release.modified_on.as_deref())?
        .or(created_at);
    let link = release
        .web_link()
        .map(str::to_string)
        .unwrap_or_else(|| ctx.link(&format!("_release?releaseId={}", release.id)));
    let definition = release
        .release_definition
        .as_ref()
        .and_then(|d| d.name.clone());
    let creator = release.created_by.as_ref().and_then(Owner::from_identity);

    let mut text = format!("Release: {name}\nStatus: {status}\n");
    if let Some(definition) = &definition {
        text.push_str(&format!("Definition: {definition}\n"));
    }
    if !release.environments.is_empty() {
        text.push_str("\nEnvironments:\n");
        for env in &release.environments {
            text.push_str(&format!(
                "- {}: {}\n",
                env.name.as_deref().unwrap_or("unnamed"),
                env.status.as_deref().unwrap_or("unknown")
            ));
        }
    }

    if include_details {
        if !release.artifacts.is_empty() {
            text.push_str("\nArtifacts:\n");
            for artifact in &release.artifacts {
                let alias = artifact.alias.as_deref().unwrap_or("artifact");
                match artifact.version() {
                    Some(version) => text.push_str(&format!("- {alias} ({version})\n")),
                    None => text.push_str(&format!("- {alias}\n")),
                }
            }
        }
        if let Some(notes) = release.description.as_deref().filter(|d| !d.trim().is_empty()) {
            text.push_str(&format!("\nRelease Notes:\n{notes}\n"));
        }
        let approvals: Vec<String> = release
            .environments
            .iter()
            .flat_map(|env| {
                let env_name = env.name.as_deref().unwrap_or("unnamed");
                env.pre_deploy_approvals
                    .iter()
                    .map(move |a| approval_line(env_name, "pre-deploy", a))
                    .chain(
                        env.post_deploy_approvals
                            .iter()
                            .map(move |a| approval_line(env_name, "post-deploy", a)),
                    )
            })
            .collect();
        if !approvals.is_empty() {
            text.push_str(&format!("\nApprovals:\n{}\n", approvals.join("\n")));
        }
    }

    let mut metadata = BTreeMap::from([
        ("type".to_string(), "release".to_string()),
        ("status".to_string(), status.to_string()),
        ("release_url".to_string(), link.clone()),
    ]);
    for (i, env) in release.environments.iter().enumerate() {
        if let Some(env_name) = &env.name {
            metadata.insert(format!("environment_{i}_name"), env_name.clone());
        }
        if let Some(env_status) = &env.status {
            metadata.insert(format!("environment_{i}_status"), env_status.clone());
        }
    }
    if let Some(definition) = definition {
        metadata.insert("definition_name".to_string(), definition);
    }
    if let Some(creator) = &creator {
        metadata.insert("created_by".to_string(), creator.label().to_string());
    }

    let mut owners = Vec::new();
    push_owner(&mut owners, creator);

    Ok(Document {
        id: ctx.document_id(&DocumentKey::Release(release.id)),
        title: format!("Release: {name}"),
        semantic_identifier: format!("Release: {name} [{status}]"),
        sections: vec![TextSection {
            text,
            link: Some(link.clone()),
        }],
        metadata,
        created_at,
        updated_at,
        owners,
        source_link: link,
    })
}
