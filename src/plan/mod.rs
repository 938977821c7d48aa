//! Analysis plans: a DAG of named steps, each bound to a worker type.
//!
//! A plan is created once per run and immutable thereafter. Structural
//! problems (duplicate ids, unknown dependency references, cycles) are
//! rejected by [`Plan::validate`] before any step runs.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// The fixed enumeration of worker types a step can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    /// Security vulnerability specialist.
    Security,
    /// Bug and logic-error specialist.
    Bug,
}

impl WorkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::Security => "security",
            WorkerType::Bug => "bug",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_allow_parallel() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

/// One unit of work in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier unique within the plan.
    pub step_id: String,
    /// Worker type this step is bound to.
    pub worker_type: WorkerType,
    /// Human-readable description of the step.
    pub description: String,
    /// Ids of steps that must complete before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether this step may run alongside other steps.
    #[serde(default = "default_allow_parallel")]
    pub allow_parallel: bool,
    /// Per-step execution timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Step {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Structural problem in a plan, detected before execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate step id `{0}`")]
    DuplicateStep(String),

    #[error("step `{step_id}` depends on unknown step `{dependency}`")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("dependency cycle involving steps: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

/// An immutable DAG of steps describing one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for the plan.
    pub plan_id: String,
    /// Ordered sequence of steps.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create a plan with a fresh id over the given steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            plan_id: Uuid::new_v4().to_string(),
            steps,
        }
    }

    /// Look up a step by id.
    #[allow(dead_code)] // Lookup utility
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Check the plan's structure: unique step ids, dependency references
    /// resolving within the plan, and an acyclic dependency graph.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.step_id.as_str()) {
                return Err(PlanError::DuplicateStep(step.step_id.clone()));
            }
        }

        for step in &self.steps {
            for dependency in &step.depends_on {
                if !ids.contains(dependency.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        step_id: step.step_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm: whatever cannot be topologically ordered is part
    /// of (or downstream of) a cycle.
    fn check_acyclic(&self) -> Result<(), PlanError> {
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.step_id.as_str(), s.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            for dependency in &step.depends_on {
                dependents
                    .entry(dependency.as_str())
                    .or_default()
                    .push(step.step_id.as_str());
            }
        }

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut resolved = 0;

        while let Some(id) = queue.pop() {
            resolved += 1;
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(dependent);
                    }
                }
            }
        }

        if resolved == self.steps.len() {
            Ok(())
        } else {
            let mut cyclic: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            cyclic.sort();
            Err(PlanError::DependencyCycle(cyclic))
        }
    }
}

/// Builds the deterministic default plan for a review run: independent
/// security and bug analysis steps that may run in parallel.
pub struct PlanBuilder {
    step_timeout_seconds: u64,
    allow_parallel: bool,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            step_timeout_seconds: default_timeout_seconds(),
            allow_parallel: true,
        }
    }

    pub fn step_timeout_seconds(mut self, seconds: u64) -> Self {
        self.step_timeout_seconds = seconds;
        self
    }

    pub fn allow_parallel(mut self, allow: bool) -> Self {
        self.allow_parallel = allow;
        self
    }

    /// Build the execution plan. Deterministic: always security plus bug
    /// analysis, no dependency ordering between them.
    pub fn build(&self) -> Plan {
        Plan::new(vec![
            Step {
                step_id: "security_analysis".to_string(),
                worker_type: WorkerType::Security,
                description: "Analyze code for security vulnerabilities".to_string(),
                depends_on: Vec::new(),
                allow_parallel: self.allow_parallel,
                timeout_seconds: self.step_timeout_seconds,
            },
            Step {
                step_id: "bug_analysis".to_string(),
                worker_type: WorkerType::Bug,
                description: "Analyze code for bugs and logic errors".to_string(),
                depends_on: Vec::new(),
                allow_parallel: self.allow_parallel,
                timeout_seconds: self.step_timeout_seconds,
            },
        ])
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}
