//! Security specialist worker.

use crate::events::Event;
use crate::llm::OllamaClient;
use crate::models::Finding;
use crate::plan::WorkerType;
use crate::worker::parse::parse_findings;
use crate::worker::{Analyzer, RunContext};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

const SECURITY_SYSTEM_PROMPT: &str = r#"You are a security specialist reviewing code for vulnerabilities.

Your expertise includes:
- SQL Injection: string concatenation in SQL queries
- Command Injection: shell execution with user input, eval/exec
- XSS: unescaped user input in HTML output
- Path Traversal: user input in file paths without validation
- Insecure Deserialization: unsafe loaders on untrusted data
- Hardcoded Secrets: API keys, passwords, tokens in source code
- Weak Cryptography: MD5/SHA1 for passwords, weak random

Report each vulnerability as a JSON object on its own line, with these fields:
{"category": "...", "severity": "critical|high|medium|low", "title": "...", "description": "...", "line": <number>, "suggestion": "..."}

Be thorough but avoid false positives. Only output JSON lines, no other text."#;

/// Worker that detects security vulnerabilities via the LLM.
pub struct SecurityAnalyzer {
    client: OllamaClient,
}

impl SecurityAnalyzer {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for SecurityAnalyzer {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Security
    }

    async fn analyze(&self, code: &str, ctx: &RunContext) -> Result<Vec<Finding>> {
        let agent_id = self.agent_id();
        ctx.bus.publish(
            Event::agent_started(
                &agent_id,
                self.worker_type().as_str(),
                "Analyzing code for security vulnerabilities",
            )
            .with_correlation(ctx.run_id.clone()),
        );

        let prompt = format!(
            "Analyze the following code for security vulnerabilities.\n\n```\n{code}\n```\n\nOutput one JSON object per line for each vulnerability found."
        );
        let response = self.client.complete(SECURITY_SYSTEM_PROMPT, &prompt).await?;

        let findings = parse_findings(&response);
        info!(%agent_id, count = findings.len(), "Security analysis finished");

        ctx.bus.publish(
            Event::agent_completed(&agent_id, findings.len())
                .with_correlation(ctx.run_id.clone()),
        );

        Ok(findings)
    }
}
