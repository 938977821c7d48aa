//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// SwarmAudit - multi-agent code review coordinator
///
/// Review a code file with cooperating specialist agents (security,
/// bug detection) driven by local AI, with a live event stream and a
/// consolidated Markdown/JSON report.
///
/// Examples:
///   swarmaudit app.py
///   swarmaudit app.py --model qwen2.5-coder:32b --stream
///   swarmaudit app.py --plan custom_plan.json --format json
///   swarmaudit app.py --dry-run
///   swarmaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path of the code file to review
    ///
    /// Not required when using --init-config.
    #[arg(value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Ollama model to use for analysis
    ///
    /// Recommended models: llama3.2:latest, codellama:34b, qwen2.5-coder:32b.
    /// Can also be set via SWARMAUDIT_MODEL env var or .swarmaudit.toml config.
    #[arg(short, long, default_value = "llama3.2:latest", env = "SWARMAUDIT_MODEL")]
    pub model: String,

    /// Ollama API endpoint URL
    #[arg(long, default_value = "http://localhost:11434", env = "OLLAMA_URL")]
    pub ollama_url: String,

    /// Output file path for the report
    #[arg(
        short,
        long,
        default_value = "swarmaudit_report.md",
        value_name = "FILE"
    )]
    pub output: PathBuf,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .swarmaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execute a custom plan loaded from a JSON file
    ///
    /// The plan is validated (unknown references, cycles) before any
    /// step runs. Without this flag the deterministic default plan
    /// (security + bug analysis) is used.
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Temperature for LLM responses (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long, default_value = "0.1")]
    pub temperature: f32,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Per-step execution timeout in seconds
    ///
    /// A step exceeding its timeout is marked failed; independent
    /// sibling steps still run to completion.
    #[arg(long, value_name = "SECS")]
    pub step_timeout: Option<u64>,

    /// Run plan steps one at a time instead of in parallel
    #[arg(long)]
    pub no_parallel: bool,

    /// Print the live event stream (one JSON line per event)
    #[arg(long)]
    pub stream: bool,

    /// Fail if findings at or above this severity are present
    ///
    /// Useful for CI pipelines. Exit code 2 when the threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Minimum severity to include in the report
    ///
    /// Findings below this level are filtered out. Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub min_severity: Option<FailOnLevel>,

    /// Dry run: build and validate the plan without calling the LLM
    ///
    /// Shows which steps would execute and exits.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .swarmaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on and --min-severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref input) = self.input {
            if !input.exists() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
            if !input.is_file() {
                return Err(format!("Input path is not a file: {}", input.display()));
            }
        }

        // Validate Ollama URL format (not needed for dry-run)
        if !self.dry_run
            && !self.ollama_url.starts_with("http://")
            && !self.ollama_url.starts_with("https://")
        {
            return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
        }

        // Validate temperature range
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeouts if provided
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.step_timeout == Some(0) {
            return Err("Step timeout must be at least 1 second".to_string());
        }

        if let Some(ref plan_path) = self.plan {
            if !plan_path.exists() {
                return Err(format!("Plan file does not exist: {}", plan_path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
