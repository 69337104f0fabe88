use std::sync::Arc;

use super::{FieldAvailabilityStore, OptionalField, join_optional};
use crate::fetch::WORK_ITEMS_ENDPOINT;
use crate::gateway::{ApiRequest, RemoteRequestError, RequestGateway, short_error_message};
use crate::sync::{ProgressCallback, SyncProgress, emit};

/// Outcome of [`FieldAvailabilityProbe::filter_available`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    /// Candidates known to exist, in input order.
    pub available: Vec<OptionalField>,
    /// False while any candidate is still unclassified after a failed probe.
    pub complete: bool,
}

/// Negotiates which optional fields a project supports.
///
/// All unknown candidates are first requested together against one known-good
/// work item. Only if that fails with a "field not found" error are they probed
/// one by one. Verdicts go to the injected store and are reused for the rest of
/// the session; other errors leave fields unclassified and degrade silently.
#[derive(Clone)]
pub struct FieldAvailabilityProbe {
    gateway: Arc<RequestGateway>,
    store: Arc<dyn FieldAvailabilityStore>,
    project: String,
    on_progress: Option<ProgressCallback>,
}

impl FieldAvailabilityProbe {
    pub fn new(
        gateway: Arc<RequestGateway>,
        store: Arc<dyn FieldAvailabilityStore>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            project: project.into(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The subset of `candidates` known to exist in this project.
    pub async fn filter_available(
        &self,
        candidates: &[OptionalField],
        probe_id: u64,
    ) -> FieldSelection {
        let unknown: Vec<OptionalField> = candidates
            .iter()
            .copied()
            .filter(|f| self.store.get(&self.project, *f).is_none())
            .collect();

        if !unknown.is_empty() {
            self.classify(&unknown, probe_id).await;
        }

        let mut selection = FieldSelection {
            available: Vec::with_capacity(candidates.len()),
            complete: true,
        };
        for &field in candidates {
            match self.store.get(&self.project, field) {
                Some(true) => selection.available.push(field),
                Some(false) => {}
                None => selection.complete = false,
            }
        }
        selection
    }

    async fn classify(&self, unknown: &[OptionalField], probe_id: u64) {
        match self.request(unknown, probe_id).await {
            Ok(()) => {
                for field in unknown {
                    self.store.record(&self.project, *field, true);
                }
            }
            Err(e) if e.is_field_not_found() => {
                tracing::debug!(
                    project = %self.project,
                    candidates = unknown.len(),
                    "Combined field request rejected, probing individually"
                );
                for field in unknown {
                    match self.request(std::slice::from_ref(field), probe_id).await {
                        Ok(()) => self.store.record(&self.project, *field, true),
                        Err(e) if e.is_field_not_found() => {
                            tracing::warn!(
                                project = %self.project,
                                field = %field,
                                "Optional field unavailable in project"
                            );
                            self.store.record(&self.project, *field, false);
                            emit(
                                self.on_progress.as_ref(),
                                SyncProgress::FieldUnavailable {
                                    project: self.project.clone(),
                                    field: field.reference_name().to_string(),
                                },
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                project = %self.project,
                                field = %field,
                                error = %short_error_message(&e),
                                "Field probe failed, leaving field unclassified"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    project = %self.project,
                    error = %short_error_message(&e),
                    "Optional field probe failed, continuing with known fields"
                );
            }
        }
    }

    async fn request(
        &self,
        fields: &[OptionalField],
        probe_id: u64,
    ) -> Result<(), RemoteRequestError> {
        let request = ApiRequest::get(WORK_ITEMS_ENDPOINT)
            .param("ids", probe_id.to_string())
            .param("fields", join_optional(fields));
        self.gateway.call(&request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::InMemoryFieldAvailability;
    use crate::http::{HttpMethod, MockTransport, query_param};
    use crate::testing::{WORKITEMS_URL, test_gateway};
    use serde_json::json;

    fn not_found(field: &str) -> serde_json::Value {
        json!({
            "message": format!("TF51535: Cannot find field {field}."),
            "typeKey": "WorkItemTrackingFieldDefinitionNotFoundException"
        })
    }

    fn requests_naming(transport: &MockTransport, field: OptionalField) -> usize {
        transport
            .requests()
            .iter()
            .filter(|r| {
                query_param(&r.url, "fields")
                    .is_some_and(|f| f.split(',').any(|n| n == field.reference_name()))
            })
            .count()
    }

    #[tokio::test]
    async fn test_all_fields_available_in_one_request() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 200, json!({"value": []}));
        let (gateway, _) = test_gateway(&transport);
        let store = Arc::new(InMemoryFieldAvailability::new());
        let probe = FieldAvailabilityProbe::new(gateway, store.clone(), "proj");

        let selection = probe.filter_available(&OptionalField::ALL, 42).await;
        assert_eq!(selection.available, OptionalField::ALL.to_vec());
        assert!(selection.complete);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(
            query_param(&transport.requests()[0].url, "ids").as_deref(),
            Some("42")
        );

        // Cached: no further requests.
        let again = probe.filter_available(&OptionalField::ALL, 42).await;
        assert_eq!(again.available.len(), OptionalField::ALL.len());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_individual_probes_and_never_repeats_missing_field() {
        let candidates = [
            OptionalField::AreaPath,
            OptionalField::Severity,
            OptionalField::Resolution,
        ];
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 400, not_found("Severity"));
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 200, json!({"value": []}));
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 400, not_found("Severity"));
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 200, json!({"value": []}));
        let (gateway, _) = test_gateway(&transport);
        let store = Arc::new(InMemoryFieldAvailability::new());
        let probe = FieldAvailabilityProbe::new(gateway, store.clone(), "proj");

        let selection = probe.filter_available(&candidates, 1).await;
        assert_eq!(
            selection.available,
            vec![OptionalField::AreaPath, OptionalField::Resolution]
        );
        assert!(selection.complete);
        assert_eq!(store.unavailable("proj"), vec![OptionalField::Severity]);
        let after_first = requests_naming(&transport, OptionalField::Severity);

        for _ in 0..3 {
            let again = probe.filter_available(&candidates, 1).await;
            assert_eq!(again.available.len(), 2);
        }
        assert_eq!(
            requests_naming(&transport, OptionalField::Severity),
            after_first
        );
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_other_errors_degrade_without_recording() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 403, json!({"message": "denied"}));
        let (gateway, _) = test_gateway(&transport);
        let store = Arc::new(
            InMemoryFieldAvailability::new()
                .with_verdicts("proj", [(OptionalField::AreaPath, true)]),
        );
        let probe = FieldAvailabilityProbe::new(gateway, store.clone(), "proj");

        let selection = probe
            .filter_available(&[OptionalField::AreaPath, OptionalField::Priority], 9)
            .await;
        assert_eq!(selection.available, vec![OptionalField::AreaPath]);
        assert!(!selection.complete);
        assert_eq!(store.get("proj", OptionalField::Priority), None);
    }

    #[tokio::test]
    async fn test_only_unknown_fields_are_requested() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, WORKITEMS_URL, 200, json!({"value": []}));
        let (gateway, _) = test_gateway(&transport);
        let store = Arc::new(
            InMemoryFieldAvailability::new().with_verdicts(
                "proj",
                [
                    (OptionalField::AreaPath, true),
                    (OptionalField::Severity, false),
                ],
            ),
        );
        let probe = FieldAvailabilityProbe::new(gateway, store, "proj");

        probe
            .filter_available(
                &[
                    OptionalField::AreaPath,
                    OptionalField::Severity,
                    OptionalField::Priority,
                ],
                5,
            )
            .await;

        let fields = query_param(&transport.requests()[0].url, "fields");
        assert_eq!(fields.as_deref(), Some("Microsoft.VSTS.Common.Priority"));
    }
}
