//! Primary and alternate URL forms for an organization.
//!
//! Organizations created before the move to `dev.azure.com` are sometimes only
//! reachable through `{org}.visualstudio.com`. The gateway tries the alternate
//! form once and keeps it if it answers better.

use serde::Deserialize;

/// Which part of the URL hierarchy a request is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// `.../{org}/{project}/`
    #[default]
    Project,
    /// `.../{org}/`
    Organization,
}

/// One URL form: organization root plus project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlForm {
    pub organization: String,
    pub project: String,
}

impl UrlForm {
    /// `https://dev.azure.com/{org}/{project}/`
    #[must_use]
    pub fn dev_azure(organization: &str, project: &str) -> Self {
        let organization_url = format!("https://dev.azure.com/{organization}/");
        Self {
            project: format!("{organization_url}{project}/"),
            organization: organization_url,
        }
    }

    /// `https://{org}.visualstudio.com/{project}/`
    #[must_use]
    pub fn visual_studio(organization: &str, project: &str) -> Self {
        let organization_url = format!("https://{organization}.visualstudio.com/");
        Self {
            project: format!("{organization_url}{project}/"),
            organization: organization_url,
        }
    }

    #[must_use]
    pub fn root(&self, scope: Scope) -> &str {
        match scope {
            Scope::Project => &self.project,
            Scope::Organization => &self.organization,
        }
    }

    /// Join a relative endpoint (e.g. `_apis/wit/wiql`) onto the scope root.
    #[must_use]
    pub fn join(&self, scope: Scope, endpoint: &str) -> String {
        let root = self.root(scope).trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        format!("{root}/{endpoint}")
    }
}

/// When an alternate-URL response counts as better than the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternatePolicy {
    /// Adopt only when the alternate returned a 2xx.
    #[default]
    SuccessOnly,
    /// Adopt when the alternate's status code is numerically lower.
    LowerStatus,
    /// Never try the alternate.
    Never,
}

impl AlternatePolicy {
    /// Should the alternate response replace the primary one?
    #[must_use]
    pub fn prefers_alternate(self, primary_status: u16, alternate_status: u16) -> bool {
        match self {
            AlternatePolicy::SuccessOnly => (200..300).contains(&alternate_status),
            AlternatePolicy::LowerStatus => alternate_status < primary_status,
            AlternatePolicy::Never => false,
        }
    }

    #[must_use]
    pub fn is_enabled(self) -> bool {
        self != AlternatePolicy::Never
    }
}

/// Statuses on the primary URL that trigger a try of the alternate form.
#[must_use]
pub fn triggers_alternate(status: u16) -> bool {
    matches!(status, 401 | 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_forms() {
        let primary = UrlForm::dev_azure("contoso", "Fabrikam");
        assert_eq!(primary.project, "https://dev.azure.com/contoso/Fabrikam/");
        assert_eq!(primary.organization, "https://dev.azure.com/contoso/");

        let alternate = UrlForm::visual_studio("contoso", "Fabrikam");
        assert_eq!(alternate.project, "https://contoso.visualstudio.com/Fabrikam/");
        assert_eq!(
            alternate.join(Scope::Organization, "/_apis/projects"),
            "https://contoso.visualstudio.com/_apis/projects"
        );
        assert_eq!(
            primary.join(Scope::Project, "_apis/wit/wiql"),
            "https://dev.azure.com/contoso/Fabrikam/_apis/wit/wiql"
        );
    }

    #[test]
    fn test_policies() {
        assert!(AlternatePolicy::SuccessOnly.prefers_alternate(404, 200));
        assert!(!AlternatePolicy::SuccessOnly.prefers_alternate(404, 403));
        assert!(AlternatePolicy::LowerStatus.prefers_alternate(404, 403));
        assert!(!AlternatePolicy::LowerStatus.prefers_alternate(401, 404));
        assert!(!AlternatePolicy::Never.prefers_alternate(404, 200));
        assert!(!AlternatePolicy::Never.is_enabled());
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: AlternatePolicy = serde_json::from_str("\"lower_status\"").expect("parse");
        assert_eq!(policy, AlternatePolicy::LowerStatus);
    }

    #[test]
    fn test_triggers() {
        assert!(triggers_alternate(404));
        assert!(triggers_alternate(401));
        assert!(!triggers_alternate(403));
        assert!(!triggers_alternate(500));
    }
}
