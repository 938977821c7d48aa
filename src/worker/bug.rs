//! Bug-detection specialist worker.

use crate::events::Event;
use crate::llm::OllamaClient;
use crate::models::Finding;
use crate::plan::WorkerType;
use crate::worker::parse::parse_findings;
use crate::worker::{Analyzer, RunContext};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

const BUG_SYSTEM_PROMPT: &str = r#"You are a bug-detection specialist reviewing code for defects.

Your expertise includes:
- Null/None References: values that might be absent when accessed
- Race Conditions: concurrent access without synchronization
- Resource Leaks: files, connections, locks never released
- Division by Zero: unchecked denominators
- Off-by-One Errors: loop bounds, array indices
- Logic Errors: wrong conditions or operators
- Unhandled Errors: failures silently ignored

Report each bug as a JSON object on its own line, with these fields:
{"category": "...", "severity": "critical|high|medium|low", "title": "...", "description": "...", "line": <number>, "suggestion": "..."}

Focus on defects that cause runtime errors, data corruption, or incorrect
behavior. Skip style nits. Only output JSON lines, no other text."#;

/// Worker that detects bugs and logic errors via the LLM.
pub struct BugAnalyzer {
    client: OllamaClient,
}

impl BugAnalyzer {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for BugAnalyzer {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Bug
    }

    async fn analyze(&self, code: &str, ctx: &RunContext) -> Result<Vec<Finding>> {
        let agent_id = self.agent_id();
        ctx.bus.publish(
            Event::agent_started(
                &agent_id,
                self.worker_type().as_str(),
                "Analyzing code for bugs and logic errors",
            )
            .with_correlation(ctx.run_id.clone()),
        );

        let prompt = format!(
            "Analyze the following code for bugs and logic errors.\n\n```\n{code}\n```\n\nOutput one JSON object per line for each bug found."
        );
        let response = self.client.complete(BUG_SYSTEM_PROMPT, &prompt).await?;

        let findings = parse_findings(&response);
        info!(%agent_id, count = findings.len(), "Bug analysis finished");

        ctx.bus.publish(
            Event::agent_completed(&agent_id, findings.len())
                .with_correlation(ctx.run_id.clone()),
        );

        Ok(findings)
    }
}
