//! Creation orchestrator
//!
//! Drives one batch through the assembly state machine:
//!
//! ```text
//! ValidatingTypes → CheckingDuplicates → CreatingServices → EnablingServices
//!   → CreatingUnits → AutoTerminating → CreatingLinks → ValidatingFlow → Done
//!
//! any creation phase ──critical failure──► RollingBack → Failed
//! ```
//!
//! Remote calls are issued one at a time. Every created object is appended
//! to the ledger before it enters a name map or the run advances.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::ast::{Batch, LinkDef, ServiceDef, UnitDef};
use crate::client::{Category, ClientError, Entity, LinkSpec, ServiceSpec, UnitSpec};
use crate::error::FlowError;
use crate::event::EventKind;
use crate::preflight::{DuplicateDetector, TypeCheck, TypeValidator};
use crate::resolve::{BatchMaps, ReferenceResolver};
use crate::review::FlowValidator;
use crate::schema::{Correction, PropertyCorrector};
use crate::terminate::{AutoTerminator, CreatedUnit, TerminationOutcome};

use super::context::InvocationContext;
use super::ledger::CreatedObjectLedger;
use super::report::{
    rejected_results, FlowResponse, ObjectType, OperationStats, PerObjectResult, Status, Summary, ValidationFinding,
    ValidationResult,
};
use super::rollback::{RollbackExecutor, RollbackSummary};

/// Remote error messages that abort the batch outright
const CRITICAL_PATTERNS: &[&str] = &[
    "type not found",
    "unknown type",
    "not a valid type",
    "conflict",
    "bad request",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyPhase {
    ValidatingTypes,
    CheckingDuplicates,
    CreatingServices,
    EnablingServices,
    CreatingUnits,
    AutoTerminating,
    CreatingLinks,
    ValidatingFlow,
    Done,
    RollingBack,
    Failed,
}

impl AssemblyPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyPhase::Done | AssemblyPhase::Failed)
    }
}

/// Whether a remote failure must abort the whole batch
pub fn is_critical(err: &ClientError) -> bool {
    match err {
        ClientError::Conflict(_) | ClientError::BadRequest(_) => true,
        ClientError::NotFound(message) => message.to_lowercase().contains("type"),
        other => {
            let message = other.to_string().to_lowercase();
            CRITICAL_PATTERNS.iter().any(|p| message.contains(p))
        }
    }
}

/// Why forward progress stopped
enum Stop {
    /// Pre-flight rejection; nothing was created
    Blocked(Vec<ValidationFinding>),
    /// Critical failure during creation
    Abort(String),
}

type Step = std::result::Result<(), Stop>;

/// Entry point of the engine
pub struct Assembler {
    ctx: InvocationContext,
}

impl Assembler {
    pub fn new(ctx: InvocationContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &InvocationContext {
        &self.ctx
    }

    /// Assemble one batch; always returns a response
    #[instrument(name = "assemble", skip(self, batch), fields(request_id = %self.ctx.request_id, scope = %batch.scope))]
    pub async fn assemble(&self, batch: Batch) -> FlowResponse {
        self.ctx.events.emit(EventKind::BatchStarted {
            request_id: self.ctx.request_id.clone(),
            scope: batch.scope.clone(),
            definitions: batch.len(),
        });
        info!(definitions = batch.len(), "Assembling batch");

        let mut run = Run::new(&self.ctx, &batch);
        let outcome = run.forward().await;
        let response = match outcome {
            Ok(()) => run.complete(),
            Err(Stop::Blocked(findings)) => run.blocked(findings),
            Err(Stop::Abort(reason)) => run.abort(reason).await,
        };

        self.ctx.events.emit(EventKind::BatchCompleted {
            status: response.status.as_str().to_string(),
            duration_ms: self.ctx.events.elapsed_ms(),
        });
        info!(status = response.status.as_str(), "Batch finished");
        response
    }
}

/// State of one batch in flight
struct Run<'a> {
    ctx: &'a InvocationContext,
    batch: &'a Batch,
    resolver: ReferenceResolver<'a>,
    phase: AssemblyPhase,
    phase_failures: usize,
    types: TypeCheck,
    ledger: CreatedObjectLedger,
    maps: BatchMaps,
    stats: OperationStats,
    results: Vec<PerObjectResult>,
    processed: usize,
    created_services: Vec<(String, String)>,
    created_units: Vec<CreatedUnit>,
    created_ids: HashSet<String>,
    validation: ValidationResult,
}

impl<'a> Run<'a> {
    fn new(ctx: &'a InvocationContext, batch: &'a Batch) -> Self {
        Self {
            ctx,
            batch,
            resolver: ReferenceResolver::new(ctx, &batch.scope),
            phase: AssemblyPhase::ValidatingTypes,
            phase_failures: 0,
            types: TypeCheck::default(),
            ledger: CreatedObjectLedger::new(),
            maps: BatchMaps::default(),
            stats: OperationStats::default(),
            results: Vec::new(),
            processed: 0,
            created_services: Vec::new(),
            created_units: Vec::new(),
            created_ids: HashSet::new(),
            validation: ValidationResult::skipped(),
        }
    }

    fn enter(&mut self, phase: AssemblyPhase) {
        info!(?phase, "Entering phase");
        self.phase = phase;
        self.phase_failures = 0;
        self.ctx.events.emit(EventKind::PhaseEntered { phase });
    }

    async fn forward(&mut self) -> Step {
        let definition_errors = self.batch.definition_errors();
        if !definition_errors.is_empty() {
            return Err(Stop::Blocked(
                definition_errors
                    .iter()
                    .map(|d| ValidationFinding::from_error(&d.error).about(d.category, &d.name))
                    .collect(),
            ));
        }

        self.enter(AssemblyPhase::ValidatingTypes);
        self.types = TypeValidator::new(self.ctx).validate(self.batch).await;
        if !self.types.valid {
            return Err(Stop::Blocked(self.types.findings.clone()));
        }

        self.enter(AssemblyPhase::CheckingDuplicates);
        let duplicates = DuplicateDetector::new(self.ctx).check(self.batch).await;
        if !duplicates.is_empty() {
            return Err(Stop::Blocked(duplicates));
        }

        let batch = self.batch;
        self.enter(AssemblyPhase::CreatingServices);
        for service in &batch.services {
            self.create_service(service).await?;
        }

        self.enter(AssemblyPhase::EnablingServices);
        self.enable_services().await;

        self.enter(AssemblyPhase::CreatingUnits);
        for unit in &batch.units {
            self.create_unit(unit).await?;
        }

        self.enter(AssemblyPhase::AutoTerminating);
        self.auto_terminate().await;

        self.enter(AssemblyPhase::CreatingLinks);
        for link in &batch.links {
            self.create_link(link).await?;
        }

        self.enter(AssemblyPhase::ValidatingFlow);
        if self.ctx.settings.validate_after && !self.created_ids.is_empty() {
            self.validation = FlowValidator::new(self.ctx)
                .review(&self.batch.scope, &self.created_ids)
                .await;
        }

        self.enter(AssemblyPhase::Done);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Services
    // ─────────────────────────────────────────────────────────────

    async fn create_service(&mut self, def: &ServiceDef) -> Step {
        self.processed += 1;
        let correction = PropertyCorrector::new(&self.resolver)
            .resolve_only(&def.properties, &self.maps)
            .await;
        if !correction.is_ok() {
            return self.definition_failed(ObjectType::Service, &def.name, correction);
        }
        self.record_external(&correction);

        let spec = ServiceSpec {
            name: def.name.clone(),
            type_name: self.types.canonical(Category::Service, &def.type_name).to_string(),
            properties: correction.properties,
        };
        match self.ctx.client.create_service(&self.batch.scope, &spec).await {
            Ok(entity) => {
                self.record_created(Category::Service, &entity);
                self.maps.services.insert(&def.name, &entity.id, &entity.type_name);
                self.created_services.push((def.name.clone(), entity.id.clone()));
                self.stats.services_created += 1;
                self.push_result(
                    PerObjectResult::new(
                        Status::Success,
                        ObjectType::Service,
                        &def.name,
                        format!("Created service '{}'", def.name),
                    )
                    .with_entity(entity)
                    .with_warnings(correction.warnings),
                );
                Ok(())
            }
            Err(e) => self.remote_failed(Category::Service, &def.name, e),
        }
    }

    /// Enable every created service; failures are warnings
    async fn enable_services(&mut self) {
        for (name, id) in self.created_services.clone() {
            match self.ctx.client.enable_service(&id).await {
                Ok(()) => self.stats.services_enabled += 1,
                Err(e) => {
                    warn!(service = %name, error = %e, "Could not enable service");
                    self.push_result(
                        PerObjectResult::new(
                            Status::Warning,
                            ObjectType::Service,
                            &name,
                            format!("Created but not enabled: {}", e),
                        )
                        .with_warnings(vec![e.to_string()]),
                    );
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Units
    // ─────────────────────────────────────────────────────────────

    async fn create_unit(&mut self, def: &UnitDef) -> Step {
        self.processed += 1;
        let type_name = self.types.canonical(Category::Unit, &def.type_name).to_string();
        let correction = PropertyCorrector::new(&self.resolver)
            .correct(&type_name, &def.properties, &self.maps)
            .await;
        for warning in &correction.warnings {
            warn!(unit = %def.name, "{}", warning);
        }
        if !correction.is_ok() {
            return self.definition_failed(ObjectType::Unit, &def.name, correction);
        }
        self.record_external(&correction);

        let spec = UnitSpec {
            name: def.name.clone(),
            type_name: type_name.clone(),
            position: def.position,
            properties: correction.properties,
        };
        match self.ctx.client.create_unit(&self.batch.scope, &spec).await {
            Ok(entity) => {
                self.record_created(Category::Unit, &entity);
                self.maps.units.insert(&def.name, &entity.id, &entity.type_name);
                self.created_units.push(CreatedUnit {
                    name: def.name.clone(),
                    id: entity.id.clone(),
                    type_name,
                });
                self.stats.units_created += 1;
                self.push_result(
                    PerObjectResult::new(
                        Status::Success,
                        ObjectType::Unit,
                        &def.name,
                        format!("Created unit '{}'", def.name),
                    )
                    .with_entity(entity)
                    .with_warnings(correction.warnings),
                );
                Ok(())
            }
            Err(e) => self.remote_failed(Category::Unit, &def.name, e),
        }
    }

    async fn auto_terminate(&mut self) {
        let outcomes = AutoTerminator::new(self.ctx)
            .apply(&self.created_units, &self.batch.links)
            .await;
        for (unit, outcome) in outcomes {
            match outcome {
                TerminationOutcome::Terminated(relationships) => self.push_result(PerObjectResult::new(
                    Status::Success,
                    ObjectType::UnitRelationships,
                    &unit,
                    format!("Auto-terminated relationships: {}", relationships.join(", ")),
                )),
                TerminationOutcome::Nothing => {}
                TerminationOutcome::Failed(reason) => self.push_result(
                    PerObjectResult::new(
                        Status::Warning,
                        ObjectType::UnitRelationships,
                        &unit,
                        "Relationships left unterminated",
                    )
                    .with_warnings(vec![reason]),
                ),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Links
    // ─────────────────────────────────────────────────────────────

    async fn create_link(&mut self, def: &LinkDef) -> Step {
        self.processed += 1;
        let label = def.label();

        let mut endpoints = Vec::with_capacity(2);
        for (role, name) in [("source", &def.source), ("target", &def.target)] {
            match self.resolver.resolve_unit_endpoint(name, &self.maps).await {
                Ok(resolution) if resolution.resolved => {
                    if resolution.is_remote() {
                        self.ledger
                            .record_preexisting(Category::Unit, &resolution.value, name);
                    }
                    endpoints.push(resolution.value);
                }
                Ok(_) => {
                    let err = FlowError::UnresolvedReference {
                        reference: name.clone(),
                    };
                    return self.link_failed(&label, format!("{} unit not found: {}", role, err));
                }
                Err(err) => return self.link_failed(&label, err.to_string()),
            }
        }
        let (source_id, target_id) = (endpoints.remove(0), endpoints.remove(0));

        let spec = LinkSpec {
            source_id,
            target_id,
            relationships: def.relationships.clone(),
        };
        match self.ctx.client.create_link(&self.batch.scope, &spec).await {
            Ok(entity) => {
                self.ledger.record_created(Category::Link, &entity.id, &label);
                self.ctx.events.emit(EventKind::ObjectCreated {
                    category: Category::Link,
                    name: label.clone(),
                    id: entity.id.clone(),
                });
                self.created_ids.insert(entity.id.clone());
                self.stats.links_created += 1;
                self.push_result(
                    PerObjectResult::new(
                        Status::Success,
                        ObjectType::Link,
                        &label,
                        format!("Created link {}", label),
                    )
                    .with_entity(entity),
                );
                Ok(())
            }
            Err(e) => self.remote_failed(Category::Link, &label, e),
        }
    }

    fn link_failed(&mut self, label: &str, message: String) -> Step {
        warn!(link = label, %message, "Link not created");
        self.ctx.events.emit(EventKind::ObjectFailed {
            category: Category::Link,
            name: label.to_string(),
            error: message.clone(),
            critical: false,
        });
        self.push_result(
            PerObjectResult::new(Status::Error, ObjectType::Link, label, message.clone())
                .with_errors(vec![message]),
        );
        self.count_failure(Category::Link)
    }

    // ─────────────────────────────────────────────────────────────
    // Bookkeeping
    // ─────────────────────────────────────────────────────────────

    /// Ledger first, then everything else
    fn record_created(&mut self, category: Category, entity: &Entity) {
        self.ledger.record_created(category, &entity.id, &entity.name);
        self.created_ids.insert(entity.id.clone());
        info!(%category, name = %entity.name, id = %entity.id, "Created");
        self.ctx.events.emit(EventKind::ObjectCreated {
            category,
            name: entity.name.clone(),
            id: entity.id.clone(),
        });
    }

    fn record_external(&mut self, correction: &Correction) {
        for external in &correction.external {
            self.ledger
                .record_preexisting(external.category, &external.id, &external.name);
        }
    }

    fn push_result(&mut self, result: PerObjectResult) {
        self.stats.warnings += result.warnings.len();
        self.results.push(result);
    }

    /// Resolution or schema failure: blocks this definition only
    fn definition_failed(&mut self, object_type: ObjectType, name: &str, correction: Correction) -> Step {
        let category = match object_type {
            ObjectType::Service => Category::Service,
            _ => Category::Unit,
        };
        let errors: Vec<String> = correction.errors.iter().map(|e| e.to_string()).collect();
        warn!(%category, name, errors = ?errors, "Definition not created");
        self.ctx.events.emit(EventKind::ObjectFailed {
            category,
            name: name.to_string(),
            error: errors.join("; "),
            critical: false,
        });
        let mut result = PerObjectResult::new(
            Status::Error,
            object_type,
            name,
            format!("{} '{}' was not created", category, name),
        )
        .with_warnings(correction.warnings)
        .with_errors(errors);
        result.unresolved_references = correction.unresolved_references;
        self.push_result(result);
        self.count_failure(category)
    }

    fn remote_failed(&mut self, category: Category, name: &str, err: ClientError) -> Step {
        let critical = is_critical(&err);
        let message = FlowError::from(err).to_string();
        if critical {
            error!(%category, name, error = %message, "Critical failure");
        } else {
            warn!(%category, name, error = %message, "Creation failed");
        }
        self.ctx.events.emit(EventKind::ObjectFailed {
            category,
            name: name.to_string(),
            error: message.clone(),
            critical,
        });
        self.push_result(
            PerObjectResult::new(
                Status::Error,
                ObjectType::from(category),
                name,
                format!("Failed to create {} '{}'", category, name),
            )
            .with_errors(vec![message.clone()]),
        );
        if critical {
            self.stats.errors += 1;
            return Err(Stop::Abort(format!("{} '{}': {}", category, name, message)));
        }
        self.count_failure(category)
    }

    fn count_failure(&mut self, category: Category) -> Step {
        self.stats.errors += 1;
        self.phase_failures += 1;
        let settings = &self.ctx.settings;
        let threshold = match category {
            Category::Service => settings.max_service_failures,
            Category::Unit => settings.max_unit_failures,
            Category::Link => settings.max_link_failures,
        };
        if self.phase_failures >= threshold {
            return Err(Stop::Abort(format!(
                "{} {} failures reached the threshold of {}",
                self.phase_failures, category, threshold
            )));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Outcomes
    // ─────────────────────────────────────────────────────────────

    fn complete(self) -> FlowResponse {
        let status = if self.stats.errors > 0 && self.ledger.created_count() == 0 {
            Status::Error
        } else if self.stats.errors > 0 || self.stats.warnings > 0 {
            Status::Warning
        } else {
            Status::Success
        };
        let message = match status {
            Status::Success => format!("Assembled {} definitions", self.processed),
            Status::Warning => format!(
                "Assembled with {} errors and {} warnings",
                self.stats.errors, self.stats.warnings
            ),
            Status::Error => "No objects were created".to_string(),
        };
        self.respond(status, message, None)
    }

    fn blocked(mut self, findings: Vec<ValidationFinding>) -> FlowResponse {
        warn!(phase = ?self.phase, findings = findings.len(), "Batch rejected before creation");
        self.stats.errors += findings.iter().filter(|f| f.is_error()).count();
        self.processed = 0;
        self.results = rejected_results(self.batch, &findings);
        self.validation = ValidationResult::blocked(findings);
        self.ctx.events.emit(EventKind::PhaseEntered {
            phase: AssemblyPhase::Failed,
        });
        self.respond(
            Status::Error,
            "Batch rejected by pre-flight validation; nothing was created".to_string(),
            None,
        )
    }

    async fn abort(mut self, reason: String) -> FlowResponse {
        error!(phase = ?self.phase, %reason, "Aborting batch");
        self.enter(AssemblyPhase::RollingBack);

        let ledger = std::mem::take(&mut self.ledger);
        let rollback = if ledger.created_count() > 0 {
            Some(RollbackExecutor::new(self.ctx).rollback(ledger, &reason).await)
        } else {
            None
        };
        self.enter(AssemblyPhase::Failed);

        let message = match &rollback {
            Some(summary) => format!(
                "Assembly aborted ({}); rolled back {} of {} created objects",
                reason,
                summary.successful_deletions,
                summary.total_objects - summary.skipped_preexisting
            ),
            None => format!("Assembly aborted ({}); nothing had been created", reason),
        };
        self.respond(Status::Error, message, rollback)
    }

    fn respond(self, status: Status, message: String, rollback: Option<RollbackSummary>) -> FlowResponse {
        FlowResponse {
            status,
            message,
            request_id: self.ctx.request_id.clone(),
            summary: Summary::new(&self.batch.scope, self.processed, &self.stats),
            validation: self.validation,
            detailed_results: self.results,
            rollback_performed: rollback.is_some(),
            rollback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_kinds_are_critical() {
        assert!(is_critical(&ClientError::Conflict("stale".into())));
        assert!(is_critical(&ClientError::BadRequest("bad".into())));
        assert!(is_critical(&ClientError::NotFound("processor type Foo".into())));
        assert!(!is_critical(&ClientError::NotFound("unit 1234".into())));
    }

    #[test]
    fn messages_are_matched_case_insensitively() {
        assert!(is_critical(&ClientError::Api {
            status: 500,
            message: "Unknown Type org.example.X".into(),
        }));
        assert!(!is_critical(&ClientError::Transport("connection reset".into())));
    }

    #[test]
    fn terminal_phases() {
        assert!(AssemblyPhase::Done.is_terminal());
        assert!(AssemblyPhase::Failed.is_terminal());
        assert!(!AssemblyPhase::RollingBack.is_terminal());
    }
}
