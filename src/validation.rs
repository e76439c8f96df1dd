//! Project validation hooks for host editors.

/// A single validation finding shown to the developer.
pub struct ProjectIssue {
    pub message: fn() -> String,
    /// Returns true when the project already satisfies this issue.
    pub check: fn() -> bool,
    /// Automatic fix, if one exists.
    pub fix: Option<fn()>,
    /// Errors block builds, everything else is informational.
    pub error: bool,
}

impl ProjectIssue {
    pub fn is_satisfied(&self) -> bool {
        (self.check)()
    }
}

/// Source of platform-specific validation issues.
pub trait IssueProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Suppress the SDK's generic checks for this platform.
    fn disable_default_issues(&self) -> bool;

    fn enabled(&self) -> bool {
        true
    }

    fn issues(&self) -> Vec<ProjectIssue>;
}

/// The headset vendor ships its own project validation, so this provider
/// only points there.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicLeapIssueProvider;

impl IssueProvider for MagicLeapIssueProvider {
    fn name(&self) -> &str {
        "Magic Leap 2"
    }

    fn disable_default_issues(&self) -> bool {
        true
    }

    fn issues(&self) -> Vec<ProjectIssue> {
        vec![ProjectIssue {
            message: || "Please refer to Magic Leap documentation for project validation".into(),
            check: || false,
            fix: None,
            error: false,
        }]
    }
}

/// Unsatisfied issues from every enabled provider, tagged with its name.
pub fn open_issues(providers: &[&dyn IssueProvider]) -> Vec<(String, ProjectIssue)> {
    providers
        .iter()
        .filter(|p| p.enabled())
        .flat_map(|p| {
            let name = p.name().to_string();
            p.issues()
                .into_iter()
                .filter(|issue| !issue.is_satisfied())
                .map(move |issue| (name.clone(), issue))
        })
        .collect()
}
