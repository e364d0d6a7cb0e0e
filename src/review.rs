//! Post-creation flow review
//!
//! Read-only sweep over the scope once the batch is in place. The result is
//! advisory and never changes the assembly status.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::client::{Category, ComponentState, Notice};
use crate::runtime::{InvocationContext, ReviewStatus, ValidationFinding, ValidationResult};

pub struct FlowValidator<'a> {
    ctx: &'a InvocationContext,
}

impl<'a> FlowValidator<'a> {
    pub fn new(ctx: &'a InvocationContext) -> Self {
        Self { ctx }
    }

    /// Review the objects with the given ids inside `scope`
    pub async fn review(&self, scope: &str, created_ids: &HashSet<String>) -> ValidationResult {
        let status = match self.ctx.client.get_scope_status(scope).await {
            Ok(status) => status,
            Err(e) => {
                warn!(scope, error = %e, "Could not fetch scope status");
                return ValidationResult {
                    status: ReviewStatus::Unknown,
                    issues: vec![ValidationFinding::warning(
                        format!("Could not fetch scope status: {}", e),
                        None,
                    )],
                    recommendations: vec!["Check the flow manually in the platform UI".to_string()],
                };
            }
        };

        let components: Vec<&ComponentState> = status
            .components
            .iter()
            .filter(|c| created_ids.contains(&c.id))
            .collect();
        let notices: Vec<&Notice> = status
            .notices
            .iter()
            .filter(|n| match &n.source_id {
                Some(id) => created_ids.contains(id),
                None => true,
            })
            .collect();

        let result = classify(&components, &notices);
        info!(scope, status = ?result.status, issues = result.issues.len(), "Flow review");
        result
    }
}

fn classify(components: &[&ComponentState], notices: &[&Notice]) -> ValidationResult {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut errors = false;
    let mut warnings = false;

    for component in components.iter().filter(|c| c.is_invalid()) {
        errors = true;
        let detail = if component.validation_errors.is_empty() {
            String::new()
        } else {
            format!(": {}", component.validation_errors.join("; "))
        };
        issues.push(ValidationFinding::error(
            format!("{} '{}' is invalid{}", component.category, component.name, detail),
            Some(format!("Fix the configuration of '{}'", component.name)),
        ));
    }

    let disabled: Vec<&str> = components
        .iter()
        .filter(|c| c.category == Category::Service && c.is_disabled())
        .map(|c| c.name.as_str())
        .collect();
    if !disabled.is_empty() {
        warnings = true;
        issues.push(ValidationFinding::warning(
            format!("Disabled services: {}", disabled.join(", ")),
            None,
        ));
        recommendations.push("Enable the services before starting units that use them".to_string());
    }

    for notice in notices {
        if notice.is_error() {
            errors = true;
            issues.push(ValidationFinding::error(notice_message(notice), None));
        } else if notice.is_warning() {
            warnings = true;
            issues.push(ValidationFinding::warning(notice_message(notice), None));
        }
    }
    if notices.iter().any(|n| n.is_error()) {
        recommendations.push("Review recent error bulletins for the affected components".to_string());
    }

    let status = if errors {
        ReviewStatus::Error
    } else if warnings {
        ReviewStatus::Warning
    } else {
        ReviewStatus::Success
    };
    ValidationResult {
        status,
        issues,
        recommendations,
    }
}

fn notice_message(notice: &Notice) -> String {
    match &notice.source_name {
        Some(source) => format!("[{}] {}", source, notice.message),
        None => notice.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::{ClientError, MockFlowClient};
    use crate::config::AssemblySettings;

    fn ids(mock: &MockFlowClient, names: &[&str]) -> HashSet<String> {
        names.iter().filter_map(|n| mock.id_of(n)).collect()
    }

    #[tokio::test]
    async fn clean_scope_is_success() {
        let mock = Arc::new(MockFlowClient::new());
        mock.add_existing(Category::Unit, "Log", "LogAttribute");
        let ctx = InvocationContext::new(mock.clone(), AssemblySettings::default());
        let result = FlowValidator::new(&ctx).review("g", &ids(&mock, &["Log"])).await;
        assert_eq!(result.status, ReviewStatus::Success);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn invalid_created_unit_is_an_error() {
        let mock = Arc::new(MockFlowClient::new());
        mock.add_existing(Category::Unit, "Log", "LogAttribute");
        mock.add_existing(Category::Unit, "Unrelated", "LogAttribute");
        mock.mark_invalid("Log");
        mock.mark_invalid("Unrelated");
        let ctx = InvocationContext::new(mock.clone(), AssemblySettings::default());

        let result = FlowValidator::new(&ctx).review("g", &ids(&mock, &["Log"])).await;
        assert_eq!(result.status, ReviewStatus::Error);
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].message.contains("'Log'"));
    }

    #[tokio::test]
    async fn warning_notices_downgrade_to_warning() {
        let mock = Arc::new(MockFlowClient::new().with_notice("WARNING", "queue filling up"));
        let ctx = InvocationContext::new(mock, AssemblySettings::default());
        let result = FlowValidator::new(&ctx).review("g", &HashSet::new()).await;
        assert_eq!(result.status, ReviewStatus::Warning);
    }

    #[tokio::test]
    async fn fetch_failure_is_unknown() {
        let mock = Arc::new(MockFlowClient::new());
        mock.fail_status(ClientError::Transport("timeout".into()));
        let ctx = InvocationContext::new(mock, AssemblySettings::default());
        let result = FlowValidator::new(&ctx).review("g", &HashSet::new()).await;
        assert_eq!(result.status, ReviewStatus::Unknown);
        assert_eq!(result.issues.len(), 1);
    }
}
