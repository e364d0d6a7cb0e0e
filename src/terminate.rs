//! Relationship auto-termination
//!
//! A unit is only valid once each of its output relationships is either
//! linked or terminated. After units are created, every relationship no
//! planned link consumes goes through [`decide`].

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::ast::LinkDef;
use crate::event::EventKind;
use crate::resolve::parse_reference;
use crate::runtime::InvocationContext;
use crate::schema::schema_for;

/// Terminated by convention whatever the unit type
const CONVENTIONAL: &[&str] = &[
    "failure",
    "retry",
    "no retry",
    "original",
    "unmatched",
    "invalid",
    "not found",
    "comms.failure",
    "timeout",
];

/// Left alone unless the type says otherwise
const CONSERVATIVE: &[&str] = &["success", "matched", "response"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TypeRule,
    Conventional,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum TerminationDecision {
    /// A planned link consumes it
    Keep,
    /// Success-style output without a type rule
    Leave,
    Terminate(TerminationReason),
}

impl TerminationDecision {
    pub fn terminates(&self) -> bool {
        matches!(self, TerminationDecision::Terminate(_))
    }
}

/// Relationship names (lowercased) consumed per source unit name
pub fn consumed_relationships(links: &[LinkDef]) -> HashMap<String, BTreeSet<String>> {
    let mut consumed: HashMap<String, BTreeSet<String>> = HashMap::new();
    for link in links {
        let source = parse_reference(&link.source).name.to_string();
        consumed
            .entry(source)
            .or_default()
            .extend(link.relationships.iter().map(|r| r.trim().to_lowercase()));
    }
    consumed
}

/// Decide the fate of one relationship of one unit
pub fn decide(
    unit_type: &str,
    relationship: &str,
    unit_name: &str,
    planned_links: &[LinkDef],
) -> TerminationDecision {
    let rel = relationship.trim().to_lowercase();

    let is_consumed = consumed_relationships(planned_links)
        .get(unit_name)
        .is_some_and(|set| set.contains(&rel));
    if is_consumed {
        return TerminationDecision::Keep;
    }

    let type_rule = schema_for(unit_type)
        .map(|s| s.terminate.iter().any(|t| t.eq_ignore_ascii_case(&rel)))
        .unwrap_or(false);
    if type_rule {
        return TerminationDecision::Terminate(TerminationReason::TypeRule);
    }
    if CONVENTIONAL.contains(&rel.as_str()) {
        return TerminationDecision::Terminate(TerminationReason::Conventional);
    }
    if CONSERVATIVE.contains(&rel.as_str()) {
        return TerminationDecision::Leave;
    }
    TerminationDecision::Terminate(TerminationReason::Default)
}

/// A unit created by this batch
#[derive(Debug, Clone)]
pub struct CreatedUnit {
    pub name: String,
    pub id: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationOutcome {
    Terminated(Vec<String>),
    Nothing,
    Failed(String),
}

pub struct AutoTerminator<'a> {
    ctx: &'a InvocationContext,
}

impl<'a> AutoTerminator<'a> {
    pub fn new(ctx: &'a InvocationContext) -> Self {
        Self { ctx }
    }

    /// Terminate unused relationships on every created unit
    ///
    /// One update call per unit with something to terminate. Failures are
    /// reported per unit and never stop the others.
    pub async fn apply(
        &self,
        units: &[CreatedUnit],
        planned_links: &[LinkDef],
    ) -> Vec<(String, TerminationOutcome)> {
        let mut outcomes = Vec::with_capacity(units.len());
        for unit in units {
            let outcome = self.apply_one(unit, planned_links).await;
            outcomes.push((unit.name.clone(), outcome));
        }
        outcomes
    }

    async fn apply_one(&self, unit: &CreatedUnit, planned_links: &[LinkDef]) -> TerminationOutcome {
        let entity = match self.ctx.client.get_unit(&unit.id).await {
            Ok(entity) => entity,
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "Could not fetch relationships");
                return TerminationOutcome::Failed(format!("could not fetch relationships: {}", e));
            }
        };

        let terminate: Vec<String> = entity
            .relationships
            .iter()
            .filter(|r| decide(&unit.type_name, &r.name, &unit.name, planned_links).terminates())
            .map(|r| r.name.clone())
            .collect();
        if terminate.is_empty() {
            return TerminationOutcome::Nothing;
        }

        match self.ctx.client.update_unit_relationships(&unit.id, &terminate).await {
            Ok(_) => {
                info!(unit = %unit.name, relationships = ?terminate, "Auto-terminated relationships");
                self.ctx.events.emit(EventKind::RelationshipsTerminated {
                    unit: unit.name.clone(),
                    relationships: terminate.clone(),
                });
                TerminationOutcome::Terminated(terminate)
            }
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "Could not terminate relationships");
                TerminationOutcome::Failed(format!(
                    "could not terminate {}: {}",
                    terminate.join(", "),
                    e
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = "org.apache.nifi.processors.standard.HandleHttpRequest";
    const RESPONSE: &str = "org.apache.nifi.processors.standard.HandleHttpResponse";

    fn link(source: &str, target: &str, rels: &[&str]) -> LinkDef {
        LinkDef {
            source: source.into(),
            target: target.into(),
            relationships: rels.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn consumed_relationships_are_kept_even_with_type_rule() {
        let links = vec![link("ReceiveHTTP", "ProcessRequest", &["success"])];
        assert_eq!(
            decide(REQUEST, "success", "ReceiveHTTP", &links),
            TerminationDecision::Keep
        );
        assert_eq!(
            decide(REQUEST, "failure", "ReceiveHTTP", &links),
            TerminationDecision::Terminate(TerminationReason::TypeRule)
        );
    }

    #[test]
    fn type_rules_apply_when_unused() {
        assert!(decide(REQUEST, "success", "ReceiveHTTP", &[]).terminates());
        assert!(decide(RESPONSE, "success", "SendResponse", &[]).terminates());
        assert!(decide(RESPONSE, "failure", "SendResponse", &[]).terminates());
    }

    #[test]
    fn success_is_conservative_without_a_rule() {
        let unknown = "org.apache.nifi.processors.unknown.SomeProcessor";
        assert_eq!(decide(unknown, "success", "P", &[]), TerminationDecision::Leave);
        assert_eq!(decide(unknown, "Response", "P", &[]), TerminationDecision::Leave);
        assert_eq!(
            decide(unknown, "other", "P", &[]),
            TerminationDecision::Terminate(TerminationReason::Default)
        );
        assert_eq!(
            decide(unknown, "No Retry", "P", &[]),
            TerminationDecision::Terminate(TerminationReason::Conventional)
        );
    }

    #[test]
    fn links_from_other_units_do_not_count() {
        let links = vec![link("Other", "P", &["failure"])];
        assert!(decide("LogAttribute", "failure", "P", &links).terminates());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let links = vec![link("@unit:Call", "Log", &["response"])];
        assert_eq!(decide("InvokeHTTP", "Response", "Call", &links), TerminationDecision::Keep);
        assert!(decide("InvokeHTTP", "Original", "Call", &links).terminates());
    }

    #[test]
    fn decisions_are_deterministic() {
        let links = vec![link("A", "B", &["matched"])];
        for rel in ["matched", "unmatched", "failure", "success"] {
            let first = decide("EvaluateJsonPath", rel, "A", &links);
            for _ in 0..3 {
                assert_eq!(decide("EvaluateJsonPath", rel, "A", &links), first);
            }
        }
    }

    #[test]
    fn consumed_map_groups_by_source() {
        let links = vec![
            link("A", "B", &["success"]),
            link("A", "C", &["Failure"]),
            link("B", "C", &["success"]),
        ];
        let consumed = consumed_relationships(&links);
        assert_eq!(consumed["A"].len(), 2);
        assert!(consumed["A"].contains("failure"));
    }
}
