use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    AssemblyContext, AssemblyError, DocumentKey, ResolutionStatus, StatusEvidence, classify,
    parse_optional_timestamp, push_owner,
};
use crate::fetch::Comment;
use crate::fields::{self, OptionalField};
use crate::types::{Document, Owner, RawRecord, TextSection};

/// Status for a work item from whichever status fields it carries.
#[must_use]
pub fn work_item_status(record: &RawRecord) -> ResolutionStatus {
    let resolution = record.text(OptionalField::Resolution.reference_name());
    let resolved_date = resolved_date(record);
    let closed_date = closed_date(record);
    let state = record.text(fields::STATE);
    classify(&StatusEvidence {
        resolution: resolution.as_deref(),
        resolved_date: resolved_date.as_deref(),
        closed_date: closed_date.as_deref(),
        state: state.as_deref(),
    })
}

/// Either resolved-date field; the VSTS one wins when both are set.
fn resolved_date(record: &RawRecord) -> Option<String> {
    record
        .text(OptionalField::ResolvedDate.reference_name())
        .or_else(|| record.text(OptionalField::SystemResolvedDate.reference_name()))
}

fn closed_date(record: &RawRecord) -> Option<String> {
    record
        .text(OptionalField::ClosedDate.reference_name())
        .or_else(|| record.text(OptionalField::SystemClosedDate.reference_name()))
}

fn identity(record: &RawRecord, field: &str) -> Option<Owner> {
    match record.field(field)? {
        Value::String(name) if !name.trim().is_empty() => Some(Owner {
            display_name: Some(name.clone()),
            email: None,
        }),
        value => Owner::from_identity(value),
    }
}

fn split_tags(raw: &str) -> Vec<&str> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Build the document for one work item and its comments.
pub fn assemble_work_item(
    ctx: &AssemblyContext,
    record: &RawRecord,
    comments: &[Comment],
) -> Result<Document, AssemblyError> {
    let title = record
        .text(fields::TITLE)
        .ok_or_else(|| AssemblyError::missing(fields::TITLE))?;
    let work_item_type = record
        .text(fields::WORK_ITEM_TYPE)
        .ok_or_else(|| AssemblyError::missing(fields::WORK_ITEM_TYPE))?;
    let state = record.text(fields::STATE);
    let created_at = parse_optional_timestamp(
        fields::CREATED_DATE,
        record.text(fields::CREATED_DATE).as_deref(),
    )?;
    let updated_at = parse_optional_timestamp(
        fields::CHANGED_DATE,
        record.text(fields::CHANGED_DATE).as_deref(),
    )?;

    let status = work_item_status(record);
    let resolution = record.text(OptionalField::Resolution.reference_name());
    let resolved_date = resolved_date(record);
    let closed_date = closed_date(record);
    let link = ctx.work_item_link(record.id);

    let mut text = format!("Title: {title} [{status}]\n\nResolution Status: {status}\n");
    if let Some(resolution) = &resolution {
        text.push_str(&format!("Resolution: {resolution}\n"));
    }
    text.push('\n');
    if let Some(description) = record.text(fields::DESCRIPTION) {
        text.push_str(&format!("Description:\n{description}\n\n"));
    }
    if !comments.is_empty() {
        text.push_str("Comments:\n");
        for comment in comments {
            text.push_str(&format!("- {}: {}\n", comment.author, comment.text));
        }
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("type".to_string(), work_item_type.clone());
    if let Some(state) = &state {
        metadata.insert("state".to_string(), state.clone());
    }
    for (key, field) in [
        ("priority", OptionalField::Priority),
        ("severity", OptionalField::Severity),
        ("area_path", OptionalField::AreaPath),
        ("iteration_path", OptionalField::IterationPath),
    ] {
        if let Some(value) = record.text(field.reference_name()) {
            metadata.insert(key.to_string(), value);
        }
    }
    if let Some(tags) = record.text(fields::TAGS) {
        let tags = split_tags(&tags);
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), tags.join(","));
        }
    }
    metadata.insert("resolution_status".to_string(), status.to_string());
    metadata.insert("is_resolved".to_string(), status.is_resolved().to_string());
    for (key, value) in [
        ("resolution", resolution),
        ("resolved_date", resolved_date),
        ("closed_date", closed_date),
    ] {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value);
        }
    }
    for (key, field) in [
        ("resolved_by", OptionalField::ResolvedBy),
        ("closed_by", OptionalField::ClosedBy),
    ] {
        if let Some(owner) = identity(record, field.reference_name()) {
            metadata.insert(key.to_string(), owner.label().to_string());
        }
    }

    let mut owners = Vec::new();
    push_owner(&mut owners, identity(record, fields::CREATED_BY));
    push_owner(&mut owners, identity(record, fields::ASSIGNED_TO));

    let heading = format!("{work_item_type} {}: {title} [{status}]", record.id);
    Ok(Document {
        id: ctx.document_id(&DocumentKey::WorkItem(record.id)),
        title: heading.clone(),
        semantic_identifier: heading,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::work_item;
    use serde_json::json;

    fn ctx() -> AssemblyContext {
        AssemblyContext::new("org", "proj", "https://dev.azure.com/org/proj/")
    }

    fn record(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    fn with_field(mut value: serde_json::Value, name: &str, field: serde_json::Value) -> RawRecord {
        value["fields"][name] = field;
        record(value)
    }

    #[test]
    fn test_assembles_open_bug() {
        let raw = record(work_item(42, "Login fails", "Active", "2024-03-01T10:00:00Z"));
        let comments = vec![Comment {
            author: "Grace Hopper".to_string(),
            text: "Repro on staging".to_string(),
        }];
        let doc = assemble_work_item(&ctx(), &raw, &comments).unwrap();

        assert_eq!(doc.id, "azuredevops:org/proj/workitem/42");
        assert_eq!(doc.title, "Bug 42: Login fails [Not Resolved]");
        assert_eq!(doc.semantic_identifier, doc.title);
        assert_eq!(
            doc.source_link,
            "https://dev.azure.com/org/proj/_workitems/edit/42"
        );
        assert_eq!(doc.metadata["tags"], "backend,urgent");
        assert_eq!(doc.metadata["resolution_status"], "Not Resolved");
        assert_eq!(doc.metadata["is_resolved"], "false");
        assert!(!doc.metadata.contains_key("priority"));

        let text = &doc.sections[0].text;
        assert!(text.starts_with("Title: Login fails [Not Resolved]"));
        assert!(text.contains("Resolution Status: Not Resolved"));
        assert!(text.contains("Description:\n<p>Login fails details</p>"));
        assert!(text.contains("Comments:\n- Grace Hopper: Repro on staging"));

        let names: Vec<_> = doc.owners.iter().map(Owner::label).collect();
        assert_eq!(names, vec!["Ada Lovelace", "Grace Hopper"]);
    }

    #[test]
    fn test_resolution_field_drives_status() {
        let raw = with_field(
            work_item(7, "Crash", "Active", "2024-03-01T10:00:00Z"),
            "Microsoft.VSTS.Common.Resolution",
            json!("Fixed"),
        );
        let doc = assemble_work_item(&ctx(), &raw, &[]).unwrap();
        assert_eq!(doc.metadata["resolution_status"], "Resolved");
        assert_eq!(doc.metadata["resolution"], "Fixed");
        assert_eq!(doc.metadata["is_resolved"], "true");
        assert!(doc.sections[0].text.contains("Resolution: Fixed"));
    }

    #[test]
    fn test_system_closed_date_yields_closed() {
        let raw = with_field(
            work_item(8, "Old", "Blocked", "2024-03-01T10:00:00Z"),
            "System.ClosedDate",
            json!("2024-02-01T00:00:00Z"),
        );
        assert_eq!(work_item_status(&raw), ResolutionStatus::Closed);
        let doc = assemble_work_item(&ctx(), &raw, &[]).unwrap();
        assert_eq!(doc.metadata["closed_date"], "2024-02-01T00:00:00Z");
    }

    #[test]
    fn test_system_resolved_date_counts_as_resolved() {
        let raw = with_field(
            work_item(13, "Fixed quietly", "Active", "2024-03-01T10:00:00Z"),
            "System.ResolvedDate",
            json!("2024-01-02T00:00:00Z"),
        );
        assert_eq!(work_item_status(&raw), ResolutionStatus::Resolved);
        let doc = assemble_work_item(&ctx(), &raw, &[]).unwrap();
        assert_eq!(doc.metadata["resolved_date"], "2024-01-02T00:00:00Z");
        assert_eq!(doc.metadata["is_resolved"], "true");
    }

    #[test]
    fn test_resolver_and_closer_are_in_metadata() {
        let mut value = work_item(14, "Done deal", "Closed", "2024-03-01T10:00:00Z");
        value["fields"]["Microsoft.VSTS.Common.ResolvedBy"] =
            json!({"displayName": "Grace Hopper", "uniqueName": "grace@example.com"});
        value["fields"]["Microsoft.VSTS.Common.ClosedBy"] = json!("Ada Lovelace");
        let doc = assemble_work_item(&ctx(), &record(value), &[]).unwrap();
        assert_eq!(doc.metadata["resolved_by"], "Grace Hopper");
        assert_eq!(doc.metadata["closed_by"], "Ada Lovelace");
    }

    #[test]
    fn test_identity_stable_across_modification() {
        let first = record(work_item(9, "Same", "Done", "2024-03-01T10:00:00Z"));
        let second = record(work_item(9, "Same", "Done", "2024-04-01T10:00:00Z"));
        let a = assemble_work_item(&ctx(), &first, &[]).unwrap();
        let b = assemble_work_item(&ctx(), &second, &[]).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.metadata["resolution_status"], b.metadata["resolution_status"]);
        assert_ne!(a.updated_at, b.updated_at);
    }

    #[test]
    fn test_duplicate_owner_is_collapsed() {
        let raw = with_field(
            work_item(10, "Solo", "New", "2024-03-01T10:00:00Z"),
            "System.AssignedTo",
            json!({"displayName": "Ada Lovelace", "uniqueName": "ada@example.com"}),
        );
        let doc = assemble_work_item(&ctx(), &raw, &[]).unwrap();
        assert_eq!(doc.owners.len(), 1);
    }

    #[test]
    fn test_missing_title_is_an_error() {
        let mut value = work_item(11, "x", "New", "2024-03-01T10:00:00Z");
        value["fields"]
            .as_object_mut()
            .unwrap()
            .remove("System.Title");
        let err = assemble_work_item(&ctx(), &record(value), &[]).unwrap_err();
        assert_eq!(err, AssemblyError::missing("System.Title"));
    }

    #[test]
    fn test_malformed_date_is_an_error() {
        let raw = with_field(
            work_item(12, "Bad date", "New", "2024-03-01T10:00:00Z"),
            "System.CreatedDate",
            json!("not a date"),
        );
        let err = assemble_work_item(&ctx(), &raw, &[]).unwrap_err();
        assert!(matches!(err, AssemblyError::MalformedDate { .. }));
    }
}
