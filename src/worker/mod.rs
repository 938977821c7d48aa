//! Analysis workers: the capability seam between the scheduler and the
//! specialists that actually inspect code.
//!
//! Workers are registered by [`WorkerType`]; the scheduler looks them up
//! when a plan step runs. Worker-internal errors are opaque to the
//! scheduler — it only cares that the step did not succeed.

pub mod bug;
pub mod parse;
pub mod security;

use crate::context::ConsolidationStore;
use crate::events::EventBus;
use crate::models::Finding;
use crate::plan::WorkerType;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use bug::BugAnalyzer;
pub use security::SecurityAnalyzer;

/// Run-scoped context handed to every worker invocation.
///
/// Cheap to clone: the store is shared behind an `Arc` and bus clones
/// share one subscriber registry.
#[derive(Clone)]
pub struct RunContext {
    /// Correlation id for events of this run (the plan id).
    pub run_id: String,
    /// Shared consolidation store for the run.
    pub store: Arc<ConsolidationStore>,
    /// Event bus observers are listening on.
    pub bus: EventBus,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, store: Arc<ConsolidationStore>, bus: EventBus) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            bus,
        }
    }
}

/// An analysis capability invoked by the scheduler.
///
/// Implementations may publish events and write findings into the store
/// as side effects, return findings for the scheduler to insert, or both;
/// report-time deduplication keeps the combination safe.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// The worker type this analyzer serves.
    fn worker_type(&self) -> WorkerType;

    /// Identifier used as `agent_id` on emitted events and stored findings.
    fn agent_id(&self) -> String {
        format!("{}_agent", self.worker_type())
    }

    /// Analyze the shared input and return findings.
    async fn analyze(&self, code: &str, ctx: &RunContext) -> Result<Vec<Finding>>;
}

/// Registry mapping worker types to their implementations.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerType, Arc<dyn Analyzer>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer under its own worker type. A later
    /// registration for the same type replaces the earlier one.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.workers.insert(analyzer.worker_type(), analyzer);
    }

    /// Look up the analyzer bound to a worker type.
    pub fn get(&self, worker_type: WorkerType) -> Option<Arc<dyn Analyzer>> {
        self.workers.get(&worker_type).cloned()
    }

    /// Worker types with a registered implementation.
    pub fn registered_types(&self) -> Vec<WorkerType> {
        let mut types: Vec<WorkerType> = self.workers.keys().copied().collect();
        types.sort();
        types
    }
}
