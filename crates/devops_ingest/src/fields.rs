//! Work item field schema.
//!
//! Essential fields are requested unconditionally and are assumed to exist in
//! every process template. Optional fields vary by project; their availability
//! is negotiated once per project by [`FieldAvailabilityProbe`] and remembered in
//! a [`FieldAvailabilityStore`].

mod availability;
mod probe;

pub use availability::{FieldAvailabilityStore, InMemoryFieldAvailability};
pub use probe::{FieldAvailabilityProbe, FieldSelection};

pub const ID: &str = "System.Id";
pub const TITLE: &str = "System.Title";
pub const DESCRIPTION: &str = "System.Description";
pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
pub const STATE: &str = "System.State";
pub const CREATED_BY: &str = "System.CreatedBy";
pub const CREATED_DATE: &str = "System.CreatedDate";
pub const CHANGED_BY: &str = "System.ChangedBy";
pub const CHANGED_DATE: &str = "System.ChangedDate";
pub const TAGS: &str = "System.Tags";
pub const ASSIGNED_TO: &str = "System.AssignedTo";

/// Fields every work item has. Never probed.
pub const ESSENTIAL_FIELDS: &[&str] = &[
    ID,
    TITLE,
    DESCRIPTION,
    WORK_ITEM_TYPE,
    STATE,
    CREATED_BY,
    CREATED_DATE,
    CHANGED_BY,
    CHANGED_DATE,
    TAGS,
    ASSIGNED_TO,
];

/// Fields that only some projects define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionalField {
    AreaPath,
    IterationPath,
    Priority,
    Severity,
    ResolvedDate,
    SystemResolvedDate,
    ResolvedBy,
    ClosedDate,
    ClosedBy,
    SystemClosedDate,
    Resolution,
}

impl OptionalField {
    pub const ALL: [OptionalField; 11] = [
        OptionalField::AreaPath,
        OptionalField::IterationPath,
        OptionalField::Priority,
        OptionalField::Severity,
        OptionalField::ResolvedDate,
        OptionalField::SystemResolvedDate,
        OptionalField::ResolvedBy,
        OptionalField::ClosedDate,
        OptionalField::ClosedBy,
        OptionalField::SystemClosedDate,
        OptionalField::Resolution,
    ];

    /// Reference name used by the REST API.
    #[must_use]
    pub fn reference_name(self) -> &'static str {
        match self {
            OptionalField::AreaPath => "System.AreaPath",
            OptionalField::IterationPath => "System.IterationPath",
            OptionalField::Priority => "Microsoft.VSTS.Common.Priority",
            OptionalField::Severity => "Microsoft.VSTS.Common.Severity",
            OptionalField::ResolvedDate => "Microsoft.VSTS.Common.ResolvedDate",
            OptionalField::SystemResolvedDate => "System.ResolvedDate",
            OptionalField::ResolvedBy => "Microsoft.VSTS.Common.ResolvedBy",
            OptionalField::ClosedDate => "Microsoft.VSTS.Common.ClosedDate",
            OptionalField::ClosedBy => "Microsoft.VSTS.Common.ClosedBy",
            OptionalField::SystemClosedDate => "System.ClosedDate",
            OptionalField::Resolution => "Microsoft.VSTS.Common.Resolution",
        }
    }

    #[must_use]
    pub fn from_reference_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.reference_name() == name)
    }
}

impl std::fmt::Display for OptionalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reference_name())
    }
}

/// Comma-joined reference names for a `fields=` query parameter.
#[must_use]
pub fn join_optional(fields: &[OptionalField]) -> String {
    fields
        .iter()
        .map(|f| f.reference_name())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_and_essential_sets_are_disjoint() {
        for field in OptionalField::ALL {
            assert!(!ESSENTIAL_FIELDS.contains(&field.reference_name()));
        }
    }

    #[test]
    fn test_reference_name_round_trip() {
        for field in OptionalField::ALL {
            assert_eq!(
                OptionalField::from_reference_name(field.reference_name()),
                Some(field)
            );
        }
        assert_eq!(OptionalField::from_reference_name(TITLE), None);
    }

    #[test]
    fn test_join_optional() {
        assert_eq!(
            join_optional(&[OptionalField::AreaPath, OptionalField::Priority]),
            "System.AreaPath,Microsoft.VSTS.Common.Priority"
        );
    }
}
