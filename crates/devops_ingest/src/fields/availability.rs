use std::collections::HashMap;
use std::sync::Mutex;

use super::OptionalField;

/// Per-project record of which optional fields exist.
///
/// Implementations must never flip a field back to available once it has been
/// recorded as unavailable for a project.
pub trait FieldAvailabilityStore: Send + Sync {
    /// `Some(verdict)` if the field has been classified for `project`.
    fn get(&self, project: &str, field: OptionalField) -> Option<bool>;

    fn record(&self, project: &str, field: OptionalField, available: bool);
}

/// Process-lifetime store owned by one connector instance.
#[derive(Debug, Default)]
pub struct InMemoryFieldAvailability {
    inner: Mutex<HashMap<String, HashMap<OptionalField, bool>>>,
}

impl InMemoryFieldAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed verdicts, e.g. from a known process template.
    #[must_use]
    pub fn with_verdicts(
        self,
        project: &str,
        verdicts: impl IntoIterator<Item = (OptionalField, bool)>,
    ) -> Self {
        for (field, available) in verdicts {
            self.record(project, field, available);
        }
        self
    }

    /// Fields recorded as unavailable for `project`.
    #[must_use]
    pub fn unavailable(&self, project: &str) -> Vec<OptionalField> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut fields: Vec<OptionalField> = inner
            .get(project)
            .map(|m| m.iter().filter(|(_, ok)| !**ok).map(|(f, _)| *f).collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }
}

impl FieldAvailabilityStore for InMemoryFieldAvailability {
    fn get(&self, project: &str, field: OptionalField) -> Option<bool> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(project).and_then(|m| m.get(&field).copied())
    }

    fn record(&self, project: &str, field: OptionalField, available: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let verdicts = inner.entry(project.to_string()).or_default();
        match verdicts.get(&field) {
            Some(false) => {}
            _ => {
                verdicts.insert(field, available);
            }
        }
    }
}
