use std::collections::BTreeMap;

use super::{AssemblyContext, AssemblyError, DocumentKey, parse_optional_timestamp, push_owner};
use crate::sources::types::{TestResult, TestRun, TestRunStatistics};
use crate::types::{Document, Owner, TextSection};

/// Outcome counts summed across states, keyed by lowercased outcome.
fn outcome_totals(stats: &TestRunStatistics) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for stat in &stats.run_statistics {
        let outcome = stat
            .outcome
            .as_deref()
            .unwrap_or("unspecified")
            .to_ascii_lowercase();
        *totals.entry(outcome).or_insert(0) += stat.count;
    }
    totals
}

/// Build the document for a test run, optionally with statistics and
/// per-case results.
pub fn assemble_test_run(
    ctx: &AssemblyContext,
    run: &TestRun,
    stats: Option<&TestRunStatistics>,
    results: Option<&[TestResult]>,
) -> Result<Document, AssemblyError> {
    let name = run
        .name
        .clone()
        .unwrap_or_else(|| format!("Run {}", run.id));
    let state = run.state.as_deref().unwrap_or("Unknown");
    let started = parse_optional_timestamp("startedDate", run.started_date.as_deref())?;
    let completed = parse_optional_timestamp("completedDate", run.completed_date.as_deref())?;
    let last_updated =
        parse_optional_timestamp("lastUpdatedDate", run.last_updated_date.as_deref())?;
    let link = run
        .web_access_url
        .clone()
        .unwrap_or_else(|| ctx.link(&format!("_testManagement/runs?runId={}", run.id)));
    let build_name = run.build.as_ref().and_then(|b| b.name.clone());
    let release_name = run.release.as_ref().and_then(|r| r.name.clone());

    let mut text = format!("Test Run: {name}\nState: {state}\n");
    if let Some(build) = &build_name {
        text.push_str(&format!("Build: {build}\n"));
    }
    if let Some(release) = &release_name {
        text.push_str(&format!("Release: {release}\n"));
    }

    let mut metadata = BTreeMap::from([
        ("type".to_string(), "test_run".to_string()),
        ("state".to_string(), state.to_string()),
        ("test_run_url".to_string(), link.clone()),
    ]);
    if let Some(build) = build_name {
        metadata.insert("build_name".to_string(), build);
    }
    if let Some(release) = release_name {
        metadata.insert("release_name".to_string(), release);
    }

    if let Some(stats) = stats {
        let totals = outcome_totals(stats);
        let total: u64 = totals.values().sum();
        text.push_str(&format!("\nResults Summary:\n- Total: {total}\n"));
        for (outcome, count) in &totals {
            text.push_str(&format!("- {outcome}: {count}\n"));
            metadata.insert(format!("stats_{outcome}"), count.to_string());
        }
        metadata.insert("stats_total".to_string(), total.to_string());
    }

    if let Some(results) = results.filter(|r| !r.is_empty()) {
        text.push_str("\nDetailed Test Results:\n");
        for result in results {
            text.push_str(&format!(
                "- {}: {}\n",
                result.case_name(),
                result.outcome.as_deref().unwrap_or("Unspecified")
            ));
        }
    }

    let mut owners = Vec::new();
    push_owner(&mut owners, run.owner.as_ref().and_then(Owner::from_identity));

    Ok(Document {
        id: ctx.document_id(&DocumentKey::TestRun(run.id)),
        title: format!("Test Run: {name}"),
        semantic_identifier: format!("Test Run: {name} [{state}]"),
        sections: vec![TextSection {
            text,
            link: Some(link.clone()),
        }],
        metadata,
        created_at: started,
        updated_at: last_updated.or(completed).or(started),
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

    fn run() -> TestRun {
        serde_json::from_value(json!({
            "id": 31,
            "name": "Nightly",
            "state": "Completed",
            "startedDate": "2024-03-01T01:00:00Z",
            "completedDate": "2024-03-01T02:00:00Z",
            "build": {"id": "9", "name": "20240301.1"},
            "webAccessUrl": "https://dev.azure.com/org/proj/_TestManagement/Runs?runId=31"
        }))
        .unwrap()
    }

    #[test]
    fn test_plain_run() {
        let doc = assemble_test_run(&ctx(), &run(), None, None).unwrap();
        assert_eq!(doc.id, "azuredevops:org/proj/test/run/31");
        assert_eq!(doc.title, "Test Run: Nightly");
        assert_eq!(doc.semantic_identifier, "Test Run: Nightly [Completed]");
        assert_eq!(doc.metadata["build_name"], "20240301.1");
        assert!(!doc.metadata.contains_key("stats_total"));
        assert_eq!(
            doc.updated_at.unwrap().to_rfc3339(),
            "2024-03-01T02:00:00+00:00"
        );
    }

    #[test]
    fn test_stats_and_results() {
        let stats: TestRunStatistics = serde_json::from_value(json!({
            "runStatistics": [
                {"state": "Completed", "outcome": "Passed", "count": 8},
                {"state": "Completed", "outcome": "Failed", "count": 2},
                {"state": "Aborted", "outcome": "Failed", "count": 1}
            ]
        }))
        .unwrap();
        let results: Vec<TestResult> = serde_json::from_value(json!([
            {"testCaseTitle": "login works", "outcome": "Passed"},
            {"testCaseTitle": "logout works", "outcome": "Failed"}
        ]))
        .unwrap();
        let doc = assemble_test_run(&ctx(), &run(), Some(&stats), Some(&results)).unwrap();

        assert_eq!(doc.metadata["stats_passed"], "8");
        assert_eq!(doc.metadata["stats_failed"], "3");
        assert_eq!(doc.metadata["stats_total"], "11");
        let text = &doc.sections[0].text;
        assert!(text.contains("Results Summary:"));
        assert!(text.contains("Detailed Test Results:\n- login works: Passed\n- logout works: Failed"));
    }
}
