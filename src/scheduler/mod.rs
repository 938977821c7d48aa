//! Dependency-aware plan execution engine.
//!
//! Runs a validated [`Plan`] by launching every ready step as its own
//! tokio task and suspending only until the first of the running steps
//! finishes. Step failures are recorded and surfaced after all in-flight
//! work has drained; they never cancel siblings already running, and no
//! new steps launch once a failure is recorded.
//!
//! Per-step state machine: `Pending -> Ready -> Running -> {Completed | Failed}`.

use crate::events::{Event, EventBus};
use crate::models::Finding;
use crate::plan::{Plan, PlanError, Step, WorkerType};
use crate::worker::{Analyzer, RunContext, WorkerRegistry};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// `agent_id` on step lifecycle events emitted by the scheduler.
const SCHEDULER_AGENT_ID: &str = "scheduler";

/// Execution state of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    /// Waiting for dependencies.
    Pending,
    /// Dependencies satisfied, not yet launched.
    Ready,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl StepState {
    fn is_terminal(&self) -> bool {
        matches!(self, StepState::Completed | StepState::Failed)
    }
}

/// Why a single step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("no analyzer registered for worker type `{0}`")]
    UnregisteredWorker(WorkerType),

    #[error("step timed out after {0}s")]
    Timeout(u64),

    #[error("analyzer failed: {0}")]
    Analyzer(anyhow::Error),
}

/// One failed step and its cause.
#[derive(Debug)]
pub struct StepFailure {
    pub step_id: String,
    pub error: StepError,
}

fn format_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.step_id, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a whole run failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),

    #[error("scheduling deadlock; steps never became ready: {}", .stalled.join(", "))]
    Deadlock { stalled: Vec<String> },

    #[error("{} step(s) failed: {}", .failures.len(), format_failures(.failures))]
    StepsFailed { failures: Vec<StepFailure> },
}

struct StepOutcome {
    step_id: String,
    worker_type: WorkerType,
    exclusive: bool,
    result: Result<Vec<Finding>, StepError>,
}

/// The coordinator's execution engine for one plan.
pub struct PlanScheduler {
    registry: Arc<WorkerRegistry>,
    bus: EventBus,
}

impl PlanScheduler {
    pub fn new(registry: Arc<WorkerRegistry>, bus: EventBus) -> Self {
        Self { registry, bus }
    }

    /// Execute a plan to completion.
    ///
    /// The plan is validated first; a structural error fails the run
    /// before any step starts. On success every step reached `Completed`.
    pub async fn execute(&self, plan: &Plan, ctx: &RunContext) -> Result<(), RunError> {
        plan.validate()?;
        info!(
            plan_id = %plan.plan_id,
            steps = plan.steps.len(),
            "Executing analysis plan"
        );
        self.run_steps(plan, ctx).await
    }

    async fn run_steps(&self, plan: &Plan, ctx: &RunContext) -> Result<(), RunError> {
        let mut states: HashMap<String, StepState> = plan
            .steps
            .iter()
            .map(|s| (s.step_id.clone(), StepState::Pending))
            .collect();
        let mut failures: Vec<StepFailure> = Vec::new();
        let mut tasks: JoinSet<StepOutcome> = JoinSet::new();
        let mut running = 0usize;
        let mut exclusive_running = false;

        loop {
            // Once a failure is recorded the plan only drains; nothing
            // new is promoted or launched.
            if failures.is_empty() {
                self.promote_ready(plan, &mut states);
                self.launch_ready(
                    plan,
                    ctx,
                    &mut states,
                    &mut tasks,
                    &mut running,
                    &mut exclusive_running,
                );
            }

            if running == 0 {
                if !failures.is_empty() {
                    break;
                }
                let stalled: Vec<String> = plan
                    .steps
                    .iter()
                    .filter(|s| !states[&s.step_id].is_terminal())
                    .map(|s| s.step_id.clone())
                    .collect();
                if stalled.is_empty() {
                    break;
                }
                warn!(stalled = ?stalled, "Scheduling deadlock detected");
                return Err(RunError::Deadlock { stalled });
            }

            // The single suspension point: wake on the first completion
            // among all running steps.
            match tasks.join_next().await {
                Some(Ok(outcome)) => {
                    running -= 1;
                    if outcome.exclusive {
                        exclusive_running = false;
                    }
                    self.settle(ctx, outcome, &mut states, &mut failures);
                }
                Some(Err(join_err)) => {
                    // Step tasks convert worker panics into failures
                    // themselves; a join error here is unexpected.
                    running = running.saturating_sub(1);
                    warn!("step task join error: {join_err}");
                }
                None => break,
            }
        }

        if failures.is_empty() {
            info!(plan_id = %plan.plan_id, "Plan complete");
            Ok(())
        } else {
            Err(RunError::StepsFailed { failures })
        }
    }

    /// Mark every pending step whose dependencies all completed as ready.
    fn promote_ready(&self, plan: &Plan, states: &mut HashMap<String, StepState>) {
        for step in &plan.steps {
            if states[&step.step_id] != StepState::Pending {
                continue;
            }
            let satisfied = step
                .depends_on
                .iter()
                .all(|dep| states.get(dep) == Some(&StepState::Completed));
            if satisfied {
                debug!(step_id = %step.step_id, "Step ready");
                states.insert(step.step_id.clone(), StepState::Ready);
            }
        }
    }

    /// Launch ready steps as independent tasks.
    ///
    /// A step with `allow_parallel = false` runs exclusively: it launches
    /// only when nothing else is running, and while it runs nothing new
    /// launches.
    fn launch_ready(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        states: &mut HashMap<String, StepState>,
        tasks: &mut JoinSet<StepOutcome>,
        running: &mut usize,
        exclusive_running: &mut bool,
    ) {
        for step in &plan.steps {
            if states[&step.step_id] != StepState::Ready {
                continue;
            }
            if *exclusive_running {
                break;
            }
            if !step.allow_parallel && *running > 0 {
                continue;
            }

            states.insert(step.step_id.clone(), StepState::Running);
            *running += 1;
            if !step.allow_parallel {
                *exclusive_running = true;
            }

            info!(step_id = %step.step_id, worker_type = %step.worker_type, "Step started");
            self.bus.publish(
                Event::step_started(SCHEDULER_AGENT_ID, step)
                    .with_correlation(ctx.run_id.clone()),
            );

            let registry = self.registry.clone();
            let step = step.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let exclusive = !step.allow_parallel;
                let step_id = step.step_id.clone();
                let worker_type = step.worker_type;
                // The inner spawn converts a panicking worker into an
                // attributable step failure instead of a lost task.
                let inner = tokio::spawn(run_step(registry, step, ctx));
                let result = match inner.await {
                    Ok(result) => result,
                    Err(join_err) => {
                        Err(StepError::Analyzer(anyhow!("worker task panicked: {join_err}")))
                    }
                };
                StepOutcome {
                    step_id,
                    worker_type,
                    exclusive,
                    result,
                }
            });
        }
    }

    /// Record a finished step: mark terminal state, emit lifecycle
    /// events, and remember failures for propagation after the drain.
    fn settle(
        &self,
        ctx: &RunContext,
        outcome: StepOutcome,
        states: &mut HashMap<String, StepState>,
        failures: &mut Vec<StepFailure>,
    ) {
        match outcome.result {
            Ok(findings) => {
                states.insert(outcome.step_id.clone(), StepState::Completed);
                info!(
                    step_id = %outcome.step_id,
                    findings = findings.len(),
                    "Step completed"
                );
                self.bus.publish(
                    Event::step_completed(SCHEDULER_AGENT_ID, &outcome.step_id, findings.len())
                        .with_correlation(ctx.run_id.clone()),
                );
            }
            Err(error) => {
                states.insert(outcome.step_id.clone(), StepState::Failed);
                warn!(step_id = %outcome.step_id, %error, "Step failed");
                self.bus.publish(
                    Event::step_failed(SCHEDULER_AGENT_ID, &outcome.step_id, &error.to_string())
                        .with_correlation(ctx.run_id.clone()),
                );
                self.bus.publish(
                    Event::agent_error(
                        &format!("{}_agent", outcome.worker_type),
                        &outcome.step_id,
                        &error.to_string(),
                    )
                    .with_correlation(ctx.run_id.clone()),
                );
                failures.push(StepFailure {
                    step_id: outcome.step_id,
                    error,
                });
            }
        }
    }
}

/// Run one step: look up its worker, invoke it under the step timeout,
/// and insert the returned findings into the shared store.
async fn run_step(
    registry: Arc<WorkerRegistry>,
    step: Step,
    ctx: RunContext,
) -> Result<Vec<Finding>, StepError> {
    let Some(analyzer) = registry.get(step.worker_type) else {
        return Err(StepError::UnregisteredWorker(step.worker_type));
    };
    let agent_id = analyzer.agent_id();

    match tokio::time::timeout(step.timeout(), analyzer.analyze(ctx.store.code(), &ctx)).await {
        Err(_) => Err(StepError::Timeout(step.timeout_seconds)),
        Ok(Err(err)) => Err(StepError::Analyzer(err)),
        Ok(Ok(findings)) => {
            for finding in &findings {
                ctx.store
                    .add_finding(finding.clone(), &agent_id, step.worker_type.as_str());
                ctx.bus.publish(
                    Event::finding_discovered(&agent_id, finding)
                        .with_correlation(ctx.run_id.clone()),
                );
            }
            Ok(findings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConsolidationStore;
    use crate::events::{EventType, Subscription};
    use crate::models::Severity;
    use crate::worker::Analyzer;
    use async_trait::async_trait;
    use std::time::Duration;

    enum MockBehavior {
        Return(Vec<Finding>),
        Fail(String),
        Sleep(Duration),
    }

    struct MockAnalyzer {
        worker_type: WorkerType,
        behavior: MockBehavior,
    }

    #[async_trait]
    impl Analyzer for MockAnalyzer {
        fn worker_type(&self) -> WorkerType {
            self.worker_type
        }

        async fn analyze(&self, _code: &str, _ctx: &RunContext) -> anyhow::Result<Vec<Finding>> {
            match &self.behavior {
                MockBehavior::Return(findings) => Ok(findings.clone()),
                MockBehavior::Fail(message) => Err(anyhow!("{message}")),
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn finding(category: &str) -> Finding {
        Finding {
            category: category.to_string(),
            severity: Severity::High,
            title: String::new(),
            description: format!("{category} issue"),
            line: Some(1),
            suggestion: None,
        }
    }

    fn step(id: &str, worker_type: WorkerType, depends_on: &[&str]) -> Step {
        Step {
            step_id: id.to_string(),
            worker_type,
            description: format!("step {id}"),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            allow_parallel: true,
            timeout_seconds: 60,
        }
    }

    fn harness(
        analyzers: Vec<MockAnalyzer>,
    ) -> (PlanScheduler, RunContext, Subscription) {
        let mut registry = WorkerRegistry::new();
        for analyzer in analyzers {
            registry.register(Arc::new(analyzer));
        }
        let bus = EventBus::new();
        let subscription = bus.subscribe();
        let ctx = RunContext::new(
            "test-run",
            Arc::new(ConsolidationStore::new("let x = 1;")),
            bus.clone(),
        );
        (PlanScheduler::new(Arc::new(registry), bus), ctx, subscription)
    }

    fn drain(subscription: &mut Subscription) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = subscription.try_recv() {
            events.push(event);
        }
        events
    }

    fn step_events(events: &[Event], event_type: EventType) -> Vec<String> {
        events
            .iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| e.data["step_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_valid_dag_completes_every_step_once() {
        let (scheduler, ctx, mut sub) = harness(vec![
            MockAnalyzer {
                worker_type: WorkerType::Security,
                behavior: MockBehavior::Return(vec![finding("sqli")]),
            },
            MockAnalyzer {
                worker_type: WorkerType::Bug,
                behavior: MockBehavior::Return(vec![finding("leak")]),
            },
        ]);
        let plan = Plan::new(vec![
            step("root", WorkerType::Security, &[]),
            step("left", WorkerType::Bug, &["root"]),
            step("right", WorkerType::Security, &["root"]),
            step("merge", WorkerType::Bug, &["left", "right"]),
        ]);

        scheduler.execute(&plan, &ctx).await.unwrap();

        let events = drain(&mut sub);
        let started = step_events(&events, EventType::PlanStepStarted);
        let completed = step_events(&events, EventType::PlanStepCompleted);

        assert_eq!(started.len(), 4);
        assert_eq!(completed.len(), 4);

        // No step starts before all of its dependencies completed.
        let ordered: Vec<(usize, EventType, String)> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                matches!(
                    e.event_type,
                    EventType::PlanStepStarted | EventType::PlanStepCompleted
                )
            })
            .map(|(i, e)| {
                (
                    i,
                    e.event_type,
                    e.data["step_id"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        let completed_at = |id: &str| {
            ordered
                .iter()
                .find(|(_, t, s)| *t == EventType::PlanStepCompleted && s == id)
                .map(|(i, _, _)| *i)
                .unwrap()
        };
        let started_at = |id: &str| {
            ordered
                .iter()
                .find(|(_, t, s)| *t == EventType::PlanStepStarted && s == id)
                .map(|(i, _, _)| *i)
                .unwrap()
        };
        assert!(started_at("left") > completed_at("root"));
        assert!(started_at("right") > completed_at("root"));
        assert!(started_at("merge") > completed_at("left"));
        assert!(started_at("merge") > completed_at("right"));
    }

    #[tokio::test]
    async fn test_findings_inserted_into_store() {
        let (scheduler, ctx, _sub) = harness(vec![
            MockAnalyzer {
                worker_type: WorkerType::Security,
                behavior: MockBehavior::Return(vec![finding("sqli"), finding("xss")]),
            },
            MockAnalyzer {
                worker_type: WorkerType::Bug,
                behavior: MockBehavior::Return(vec![finding("leak")]),
            },
        ]);
        let plan = Plan::new(vec![
            step("security_analysis", WorkerType::Security, &[]),
            step("bug_analysis", WorkerType::Bug, &[]),
        ]);

        scheduler.execute(&plan, &ctx).await.unwrap();

        assert_eq!(ctx.store.finding_count(), 3);
        let tagged = ctx.store.all_findings();
        assert!(tagged.iter().any(|t| t.worker_type == "security"));
        assert!(tagged.iter().any(|t| t.worker_type == "bug"));
    }

    #[tokio::test]
    async fn test_cyclic_plan_rejected_before_any_step() {
        let (scheduler, ctx, mut sub) = harness(vec![MockAnalyzer {
            worker_type: WorkerType::Security,
            behavior: MockBehavior::Return(Vec::new()),
        }]);
        let plan = Plan::new(vec![
            step("a", WorkerType::Security, &["b"]),
            step("b", WorkerType::Security, &["a"]),
        ]);

        let err = scheduler.execute(&plan, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::InvalidPlan(PlanError::DependencyCycle(_))
        ));

        let events = drain(&mut sub);
        assert!(step_events(&events, EventType::PlanStepStarted).is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_worker_fails_step() {
        // Only the security analyzer is registered.
        let (scheduler, ctx, _sub) = harness(vec![MockAnalyzer {
            worker_type: WorkerType::Security,
            behavior: MockBehavior::Return(Vec::new()),
        }]);
        let plan = Plan::new(vec![step("bug_analysis", WorkerType::Bug, &[])]);

        let err = scheduler.execute(&plan, &ctx).await.unwrap_err();
        match err {
            RunError::StepsFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step_id, "bug_analysis");
                assert!(matches!(
                    failures[0].error,
                    StepError::UnregisteredWorker(WorkerType::Bug)
                ));
            }
            other => panic!("expected step failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_step_but_siblings_complete() {
        let (scheduler, ctx, mut sub) = harness(vec![
            MockAnalyzer {
                worker_type: WorkerType::Security,
                behavior: MockBehavior::Sleep(Duration::from_secs(3600)),
            },
            MockAnalyzer {
                worker_type: WorkerType::Bug,
                behavior: MockBehavior::Return(vec![finding("leak")]),
            },
        ]);
        let mut slow = step("slow", WorkerType::Security, &[]);
        slow.timeout_seconds = 30;
        let plan = Plan::new(vec![slow, step("sibling", WorkerType::Bug, &[])]);

        let err = scheduler.execute(&plan, &ctx).await.unwrap_err();
        match err {
            RunError::StepsFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step_id, "slow");
                assert!(matches!(failures[0].error, StepError::Timeout(30)));
            }
            other => panic!("expected step failure, got {other:?}"),
        }

        let events = drain(&mut sub);
        assert_eq!(
            step_events(&events, EventType::PlanStepCompleted),
            vec!["sibling".to_string()]
        );
        assert_eq!(
            step_events(&events, EventType::PlanStepFailed),
            vec!["slow".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_new_steps_after_failure() {
        let (scheduler, ctx, mut sub) = harness(vec![
            MockAnalyzer {
                worker_type: WorkerType::Security,
                behavior: MockBehavior::Fail("boom".to_string()),
            },
            MockAnalyzer {
                worker_type: WorkerType::Bug,
                behavior: MockBehavior::Sleep(Duration::from_secs(10)),
            },
        ]);
        // `gated` only becomes ready after `slow` completes, by which
        // point the failure of `failing` has put the run in drain mode.
        let plan = Plan::new(vec![
            step("failing", WorkerType::Security, &[]),
            step("slow", WorkerType::Bug, &[]),
            step("gated", WorkerType::Bug, &["slow"]),
        ]);

        let err = scheduler.execute(&plan, &ctx).await.unwrap_err();
        match err {
            RunError::StepsFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step_id, "failing");
            }
            other => panic!("expected step failure, got {other:?}"),
        }

        let events = drain(&mut sub);
        let started = step_events(&events, EventType::PlanStepStarted);
        assert!(started.contains(&"failing".to_string()));
        assert!(started.contains(&"slow".to_string()));
        assert!(!started.contains(&"gated".to_string()));
        // The already-running sibling was drained, not cancelled.
        assert_eq!(
            step_events(&events, EventType::PlanStepCompleted),
            vec!["slow".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_step_runs_alone() {
        let (scheduler, ctx, mut sub) = harness(vec![
            MockAnalyzer {
                worker_type: WorkerType::Security,
                behavior: MockBehavior::Sleep(Duration::from_secs(5)),
            },
            MockAnalyzer {
                worker_type: WorkerType::Bug,
                behavior: MockBehavior::Sleep(Duration::from_secs(5)),
            },
        ]);
        let mut exclusive = step("exclusive", WorkerType::Security, &[]);
        exclusive.allow_parallel = false;
        let plan = Plan::new(vec![
            step("a", WorkerType::Bug, &[]),
            exclusive,
            step("b", WorkerType::Bug, &[]),
        ]);

        scheduler.execute(&plan, &ctx).await.unwrap();

        // The exclusive step's started/completed interval must not
        // overlap any other step's interval.
        let events = drain(&mut sub);
        let lifecycle: Vec<(EventType, String)> = events
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    EventType::PlanStepStarted | EventType::PlanStepCompleted
                )
            })
            .map(|e| {
                (
                    e.event_type,
                    e.data["step_id"].as_str().unwrap().to_string(),
                )
            })
            .collect();

        let started_at = |id: &str| {
            lifecycle
                .iter()
                .position(|(t, s)| *t == EventType::PlanStepStarted && s == id)
                .unwrap()
        };
        let completed_at = |id: &str| {
            lifecycle
                .iter()
                .position(|(t, s)| *t == EventType::PlanStepCompleted && s == id)
                .unwrap()
        };

        for other in ["a", "b"] {
            let no_overlap = completed_at(other) < started_at("exclusive")
                || started_at(other) > completed_at("exclusive");
            assert!(no_overlap, "step {other} overlapped the exclusive step");
        }
    }

    #[tokio::test]
    async fn test_deadlock_names_stalled_steps() {
        let (scheduler, ctx, _sub) = harness(vec![MockAnalyzer {
            worker_type: WorkerType::Security,
            behavior: MockBehavior::Return(Vec::new()),
        }]);
        // A cyclic plan fed below validation exercises the deadlock path.
        let plan = Plan::new(vec![
            step("a", WorkerType::Security, &["b"]),
            step("b", WorkerType::Security, &["a"]),
            step("c", WorkerType::Security, &[]),
        ]);

        let err = scheduler.run_steps(&plan, &ctx).await.unwrap_err();
        match err {
            RunError::Deadlock { mut stalled } => {
                stalled.sort();
                assert_eq!(stalled, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_surfaces_as_step_failure() {
        struct PanickingAnalyzer;

        #[async_trait]
        impl Analyzer for PanickingAnalyzer {
            fn worker_type(&self) -> WorkerType {
                WorkerType::Security
            }

            async fn analyze(
                &self,
                _code: &str,
                _ctx: &RunContext,
            ) -> anyhow::Result<Vec<Finding>> {
                panic!("worker crashed");
            }
        }

        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(PanickingAnalyzer));
        let bus = EventBus::new();
        let ctx = RunContext::new(
            "test-run",
            Arc::new(ConsolidationStore::new("code")),
            bus.clone(),
        );
        let scheduler = PlanScheduler::new(Arc::new(registry), bus);
        let plan = Plan::new(vec![step("security_analysis", WorkerType::Security, &[])]);

        let err = scheduler.execute(&plan, &ctx).await.unwrap_err();
        match err {
            RunError::StepsFailed { failures } => {
                assert_eq!(failures[0].step_id, "security_analysis");
                assert!(matches!(failures[0].error, StepError::Analyzer(_)));
            }
            other => panic!("expected step failure, got {other:?}"),
        }
    }
}
