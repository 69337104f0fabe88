//! Resolution status derivation.
//!
//! Priority, highest first:
//! 1. an explicit resolution value → Resolved
//! 2. a resolved date → Resolved
//! 3. a closed date → Closed
//! 4. a closed-like state name → Resolved
//! 5. an open-like state name → Not Resolved
//! 6. otherwise → Unknown

use std::fmt;

const CLOSED_STATES: &[&str] = &["closed", "resolved", "done", "completed", "removed"];

const OPEN_STATES: &[&str] = &[
    "active",
    "new",
    "in progress",
    "to do",
    "proposed",
    "committed",
    "open",
    "approved",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    Closed,
    NotResolved,
    Unknown,
}

impl ResolutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "Resolved",
            ResolutionStatus::Closed => "Closed",
            ResolutionStatus::NotResolved => "Not Resolved",
            ResolutionStatus::Unknown => "Unknown",
        }
    }

    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, ResolutionStatus::Resolved | ResolutionStatus::Closed)
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the status chain. Blank strings count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusEvidence<'a> {
    pub resolution: Option<&'a str>,
    pub resolved_date: Option<&'a str>,
    pub closed_date: Option<&'a str>,
    pub state: Option<&'a str>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[must_use]
pub fn classify(evidence: &StatusEvidence<'_>) -> ResolutionStatus {
    if present(evidence.resolution).is_some() || present(evidence.resolved_date).is_some() {
        return ResolutionStatus::Resolved;
    }
    if present(evidence.closed_date).is_some() {
        return ResolutionStatus::Closed;
    }
    match present(evidence.state).map(str::to_ascii_lowercase) {
        Some(state) if CLOSED_STATES.contains(&state.as_str()) => ResolutionStatus::Resolved,
        Some(state) if OPEN_STATES.contains(&state.as_str()) => ResolutionStatus::NotResolved,
        _ => ResolutionStatus::Unknown,
    }
}
