//! Response model
//!
//! Everything one assembly run reports back, serialized with camelCase keys.

use serde::{Deserialize, Serialize};

use crate::ast::Batch;
use crate::client::{Category, Entity};
use crate::error::{FixSuggestion, FlowError};

use super::rollback::RollbackSummary;

/// Top-level outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One issue found by a validator; never mutated once emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFinding {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// Definition the finding is about, when it concerns a single one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
}

impl ValidationFinding {
    pub fn error(message: impl Into<String>, recommendation: Option<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            recommendation,
            object_type: None,
            object_name: None,
        }
    }

    pub fn warning(message: impl Into<String>, recommendation: Option<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            recommendation,
            object_type: None,
            object_name: None,
        }
    }

    pub fn about(mut self, object_type: impl Into<ObjectType>, name: &str) -> Self {
        self.object_type = Some(object_type.into());
        self.object_name = Some(name.to_string());
        self
    }

    /// Error finding carrying the error's own fix suggestion
    pub fn from_error(err: &FlowError) -> Self {
        Self::error(err.to_string(), err.fix_suggestion().map(str::to_string))
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Post-creation review outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Success,
    Warning,
    Error,
    /// Scope state could not be fetched
    Unknown,
    /// Review did not run
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ReviewStatus,
    pub issues: Vec<ValidationFinding>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn skipped() -> Self {
        Self {
            status: ReviewStatus::Skipped,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Pre-flight findings that blocked the batch
    pub fn blocked(issues: Vec<ValidationFinding>) -> Self {
        let recommendations = issues
            .iter()
            .filter_map(|f| f.recommendation.clone())
            .fold(Vec::new(), |mut acc, r| {
                if !acc.contains(&r) {
                    acc.push(r);
                }
                acc
            });
        Self {
            status: ReviewStatus::Error,
            issues,
            recommendations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Service,
    Unit,
    Link,
    UnitRelationships,
}

impl From<Category> for ObjectType {
    fn from(category: Category) -> Self {
        match category {
            Category::Service => ObjectType::Service,
            Category::Unit => ObjectType::Unit,
            Category::Link => ObjectType::Link,
        }
    }
}

/// Outcome for one definition (or one follow-up step on it)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerObjectResult {
    pub status: Status,
    pub message: String,
    pub object_type: ObjectType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_references: Vec<String>,
}

impl PerObjectResult {
    pub fn new(status: Status, object_type: ObjectType, name: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            object_type,
            name: name.to_string(),
            entity: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            unresolved_references: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        if !warnings.is_empty() && self.status == Status::Success {
            self.status = Status::Warning;
        }
        self.warnings = warnings;
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

/// Error results for a batch rejected before creation
///
/// Each definition named by an error finding gets one result holding all of
/// its findings. Findings that name no definition (an unreachable catalog)
/// are attached to every definition not already reported.
pub fn rejected_results(batch: &Batch, findings: &[ValidationFinding]) -> Vec<PerObjectResult> {
    let mut results: Vec<PerObjectResult> = Vec::new();
    let mut general = Vec::new();

    for finding in findings.iter().filter(|f| f.is_error()) {
        let (Some(object_type), Some(name)) = (finding.object_type, finding.object_name.as_deref()) else {
            general.push(finding.message.clone());
            continue;
        };
        match results
            .iter()
            .position(|r| r.object_type == object_type && r.name == name)
        {
            Some(index) => results[index].errors.push(finding.message.clone()),
            None => results.push(
                PerObjectResult::new(Status::Error, object_type, name, finding.message.clone())
                    .with_errors(vec![finding.message.clone()]),
            ),
        }
    }

    if general.is_empty() {
        return results;
    }
    let definitions = batch
        .services
        .iter()
        .map(|s| (ObjectType::Service, s.name.clone()))
        .chain(batch.units.iter().map(|u| (ObjectType::Unit, u.name.clone())))
        .chain(batch.links.iter().map(|l| (ObjectType::Link, l.label())));
    for (object_type, name) in definitions {
        if results.iter().any(|r| r.object_type == object_type && r.name == name) {
            continue;
        }
        results.push(
            PerObjectResult::new(
                Status::Error,
                object_type,
                &name,
                "Not created: the batch failed pre-flight validation",
            )
            .with_errors(general.clone()),
        );
    }
    results
}

/// Counters for one invocation; only ever incremented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub services_created: usize,
    pub services_enabled: usize,
    pub units_created: usize,
    pub links_created: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub scope: String,
    pub objects_processed: usize,
    pub services_created: usize,
    pub services_enabled: usize,
    pub units_created: usize,
    pub links_created: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl Summary {
    pub fn new(scope: &str, objects_processed: usize, stats: &OperationStats) -> Self {
        Self {
            scope: scope.to_string(),
            objects_processed,
            services_created: stats.services_created,
            services_enabled: stats.services_enabled,
            units_created: stats.units_created,
            links_created: stats.links_created,
            total_errors: stats.errors,
            total_warnings: stats.warnings,
        }
    }
}

/// Full response of one assembly run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    pub status: Status,
    pub message: String,
    pub request_id: String,
    pub summary: Summary,
    pub validation: ValidationResult,
    pub detailed_results: Vec<PerObjectResult>,
    pub rollback_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSummary>,
}

impl FlowResponse {
    /// Results for one named object, in the order they were produced
    pub fn results_for(&self, name: &str) -> Vec<&PerObjectResult> {
        self.detailed_results.iter().filter(|r| r.name == name).collect()
    }

    pub fn result(&self, object_type: ObjectType, name: &str) -> Option<&PerObjectResult> {
        self.detailed_results
            .iter()
            .find(|r| r.object_type == object_type && r.name == name)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_object_result_serializes_camel_case() {
        let mut result = PerObjectResult::new(Status::Error, ObjectType::Unit, "P", "failed");
        result.unresolved_references.push("@Missing".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["objectType"], "unit");
        assert_eq!(json["unresolvedReferences"][0], "@Missing");
        assert!(json.get("entity").is_none());
    }

    #[test]
    fn warnings_downgrade_success() {
        let result = PerObjectResult::new(Status::Success, ObjectType::Unit, "P", "created")
            .with_warnings(vec!["defaulted".into()]);
        assert_eq!(result.status, Status::Warning);
    }

    #[test]
    fn blocked_dedupes_recommendations() {
        let issues = vec![
            ValidationFinding::error("a", Some("rename".into())),
            ValidationFinding::error("b", Some("rename".into())),
        ];
        let result = ValidationResult::blocked(issues);
        assert_eq!(result.recommendations, vec!["rename"]);
        assert_eq!(result.status, ReviewStatus::Error);
    }

    fn two_unit_batch() -> Batch {
        crate::ast::BatchRequest::from_yaml(
            r#"
resources:
  - kind: unit
    name: A
    type: LogAttribute
  - kind: unit
    name: B
    type: LogAttribute
"#,
        )
        .unwrap()
        .into_batch(Some("g"), None)
        .unwrap()
    }

    #[test]
    fn rejected_results_group_findings_per_definition() {
        let findings = vec![
            ValidationFinding::error("bad type", None).about(Category::Unit, "A"),
            ValidationFinding::error("bad name", None).about(Category::Unit, "A"),
            ValidationFinding::warning("just a note", None).about(Category::Unit, "B"),
        ];
        let results = rejected_results(&two_unit_batch(), &findings);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "A");
        assert_eq!(results[0].status, Status::Error);
        assert_eq!(results[0].errors, vec!["bad type", "bad name"]);
    }

    #[test]
    fn unattributed_findings_mark_every_definition() {
        let findings = vec![
            ValidationFinding::error("bad type", None).about(Category::Unit, "A"),
            ValidationFinding::error("catalog unreachable", None),
        ];
        let results = rejected_results(&two_unit_batch(), &findings);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].errors, vec!["bad type"]);
        assert_eq!(results[1].name, "B");
        assert_eq!(results[1].errors, vec!["catalog unreachable"]);
    }

    #[test]
    fn finding_object_serializes_camel_case() {
        let finding = ValidationFinding::error("x", None).about(Category::Service, "Pool");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["objectType"], "service");
        assert_eq!(json["objectName"], "Pool");
    }
}
