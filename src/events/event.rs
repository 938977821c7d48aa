//! Event structure and wire form.
//!
//! Every notification in the system is an immutable [`Event`]: a typed,
//! timestamped message with an arbitrary JSON payload. Events serialize
//! to a canonical JSON form (UUIDs as strings, timestamps as RFC 3339
//! with a trailing `Z`) and round-trip without loss; a missing
//! `event_id` or `timestamp` on deserialization is assigned fresh.

use crate::models::Finding;
use crate::plan::{Plan, Step};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use uuid::Uuid;

/// Types of events in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Planning events
    PlanCreated,
    PlanStepStarted,
    PlanStepCompleted,
    PlanStepFailed,

    // Agent lifecycle events
    AgentStarted,
    AgentCompleted,
    AgentError,
    AgentDelegated,

    // Finding events
    FindingDiscovered,
    FindingsConsolidated,
    FinalReport,
}

impl EventType {
    /// The snake_case wire tag for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlanCreated => "plan_created",
            EventType::PlanStepStarted => "plan_step_started",
            EventType::PlanStepCompleted => "plan_step_completed",
            EventType::PlanStepFailed => "plan_step_failed",
            EventType::AgentStarted => "agent_started",
            EventType::AgentCompleted => "agent_completed",
            EventType::AgentError => "agent_error",
            EventType::AgentDelegated => "agent_delegated",
            EventType::FindingDiscovered => "finding_discovered",
            EventType::FindingsConsolidated => "findings_consolidated",
            EventType::FinalReport => "final_report",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// An immutable, timestamped, typed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier; generated when absent on deserialization.
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    /// Type tag of the event.
    pub event_type: EventType,
    /// Identifier of the agent that emitted the event.
    pub agent_id: String,
    /// Creation time in UTC; generated when absent on deserialization.
    #[serde(
        default = "Utc::now",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
    /// Optional identifier linking related events (e.g. one run's plan id).
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Arbitrary structured payload.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Create a new event with a fresh id and the current time.
    pub fn new(event_type: EventType, agent_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            data,
        }
    }

    /// Attach a correlation id linking this event to related ones.
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Serialize to the canonical JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize event")
    }

    /// Deserialize from the canonical JSON wire form.
    #[allow(dead_code)] // Wire-contract counterpart of to_json, used by observers
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to deserialize event")
    }

    // --- Factory constructors for the common events ---

    /// An agent has started working on a task.
    pub fn agent_started(agent_id: &str, agent_type: &str, task: &str) -> Self {
        Self::new(
            EventType::AgentStarted,
            agent_id,
            json!({
                "agent_type": agent_type,
                "task": task,
                "status": "running",
            }),
        )
    }

    /// An agent has finished its task.
    pub fn agent_completed(agent_id: &str, finding_count: usize) -> Self {
        Self::new(
            EventType::AgentCompleted,
            agent_id,
            json!({ "finding_count": finding_count }),
        )
    }

    /// An agent (or the step running it) failed.
    pub fn agent_error(agent_id: &str, step_id: &str, error: &str) -> Self {
        Self::new(
            EventType::AgentError,
            agent_id,
            json!({ "step_id": step_id, "error": error }),
        )
    }

    /// A plan was created by the coordinator.
    pub fn plan_created(agent_id: &str, plan: &Plan) -> Result<Self> {
        let data = serde_json::to_value(plan).context("Failed to serialize plan")?;
        Ok(Self::new(EventType::PlanCreated, agent_id, data))
    }

    /// A plan step was delegated to a worker.
    pub fn agent_delegated(agent_id: &str, plan_id: &str, step: &Step) -> Self {
        Self::new(
            EventType::AgentDelegated,
            agent_id,
            json!({
                "plan_id": plan_id,
                "step_id": step.step_id,
                "worker_type": step.worker_type,
                "description": step.description,
            }),
        )
    }

    /// A plan step began executing.
    pub fn step_started(agent_id: &str, step: &Step) -> Self {
        Self::new(
            EventType::PlanStepStarted,
            agent_id,
            json!({
                "step_id": step.step_id,
                "worker_type": step.worker_type,
                "description": step.description,
            }),
        )
    }

    /// A plan step finished successfully.
    pub fn step_completed(agent_id: &str, step_id: &str, finding_count: usize) -> Self {
        Self::new(
            EventType::PlanStepCompleted,
            agent_id,
            json!({ "step_id": step_id, "finding_count": finding_count }),
        )
    }

    /// A plan step failed.
    pub fn step_failed(agent_id: &str, step_id: &str, error: &str) -> Self {
        Self::new(
            EventType::PlanStepFailed,
            agent_id,
            json!({ "step_id": step_id, "error": error }),
        )
    }

    /// A worker discovered a finding.
    pub fn finding_discovered(agent_id: &str, finding: &Finding) -> Self {
        Self::new(
            EventType::FindingDiscovered,
            agent_id,
            json!({
                "category": finding.category,
                "severity": finding.severity,
                "title": finding.title,
                "description": finding.description,
                "line": finding.line,
            }),
        )
    }
}
