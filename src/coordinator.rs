//! Run coordination: plan, execute, consolidate.
//!
//! The coordinator owns the two-phase shape of a review run: obtain a
//! plan (built deterministically or supplied by the caller), execute it
//! through the scheduler, then ask the consolidation store for the final
//! report. Observers follow along on the event bus.

use crate::context::ConsolidationStore;
use crate::events::{Event, EventBus};
use crate::models::ConsolidatedReport;
use crate::plan::{Plan, PlanBuilder};
use crate::scheduler::PlanScheduler;
use crate::worker::{RunContext, WorkerRegistry};
use anyhow::{bail, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const COORDINATOR_AGENT_ID: &str = "coordinator";

/// Result of one coordinated run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Identifier of the executed plan.
    pub plan_id: String,
    /// Consolidated report over all findings.
    pub report: ConsolidatedReport,
}

/// Orchestrates one analysis run end to end.
pub struct Coordinator {
    bus: EventBus,
    scheduler: PlanScheduler,
    builder: PlanBuilder,
}

impl Coordinator {
    pub fn new(registry: Arc<WorkerRegistry>, bus: EventBus, builder: PlanBuilder) -> Self {
        Self {
            scheduler: PlanScheduler::new(registry, bus.clone()),
            bus,
            builder,
        }
    }

    /// Run the deterministic default plan over the given code.
    pub async fn run(&self, code: &str) -> Result<RunOutcome> {
        let plan = self.builder.build();
        self.run_plan(plan, code).await
    }

    /// Run a caller-supplied plan over the given code.
    pub async fn run_plan(&self, plan: Plan, code: &str) -> Result<RunOutcome> {
        if code.trim().is_empty() {
            bail!("refusing to analyze empty code input");
        }

        self.bus.publish(
            Event::agent_started(
                COORDINATOR_AGENT_ID,
                "coordinator",
                "Coordinating code review",
            )
            .with_correlation(plan.plan_id.clone()),
        );
        self.bus.publish(
            Event::plan_created(COORDINATOR_AGENT_ID, &plan)?
                .with_correlation(plan.plan_id.clone()),
        );
        for step in &plan.steps {
            self.bus.publish(
                Event::agent_delegated(COORDINATOR_AGENT_ID, &plan.plan_id, step)
                    .with_correlation(plan.plan_id.clone()),
            );
        }

        let store = Arc::new(ConsolidationStore::new(code));
        let ctx = RunContext::new(plan.plan_id.clone(), store.clone(), self.bus.clone());

        self.scheduler.execute(&plan, &ctx).await?;

        let report = store.report();
        info!(
            plan_id = %plan.plan_id,
            raw_findings = store.finding_count(),
            total_findings = report.total_findings,
            risk_score = report.risk_score,
            "Findings consolidated"
        );

        self.bus.publish(
            Event::new(
                crate::events::EventType::FindingsConsolidated,
                COORDINATOR_AGENT_ID,
                json!({
                    "total_findings": report.total_findings,
                    "risk_score": report.risk_score,
                }),
            )
            .with_correlation(plan.plan_id.clone()),
        );
        self.bus.publish(
            Event::new(
                crate::events::EventType::FinalReport,
                COORDINATOR_AGENT_ID,
                serde_json::to_value(&report)?,
            )
            .with_correlation(plan.plan_id.clone()),
        );

        Ok(RunOutcome {
            plan_id: plan.plan_id,
            report,
        })
    }
}
