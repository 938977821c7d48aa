//! SwarmAudit - Multi-Agent Code Review Coordinator
//!
//! A CLI tool that coordinates independent specialist agents (security,
//! bug detection) over a shared code input, streams progress events in
//! real time, and produces a consolidated, severity-ranked report.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime error (connection, config, plan, step failure, etc.)
//!   2 - Findings found above --fail-on threshold

mod cli;
mod config;
mod console;
mod context;
mod coordinator;
mod events;
mod llm;
mod models;
mod plan;
mod report;
mod scheduler;
mod worker;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, FailOnLevel, OutputFormat};
use config::Config;
use coordinator::Coordinator;
use events::EventBus;
use llm::OllamaClient;
use models::{ReportMetadata, Severity};
use plan::{Plan, PlanBuilder};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use worker::{BugAnalyzer, SecurityAnalyzer, WorkerRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("SwarmAudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the review
    match run_audit(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Review failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .swarmaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(".swarmaudit.toml");

    if path.exists() {
        eprintln!("⚠️  .swarmaudit.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .swarmaudit.toml")?;

    println!("✅ Created .swarmaudit.toml with default settings.");
    println!("   Edit it to customize model, timeouts, and report options.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete review workflow. Returns exit code (0 or 2).
async fn run_audit(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Step 1: Read the input
    let input = args.input.clone().context("Input file is required")?;
    let code = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    info!("Loaded {} ({} bytes)", input.display(), code.len());

    // Step 2: Obtain the plan
    let builder = PlanBuilder::new()
        .step_timeout_seconds(config.plan.step_timeout_seconds)
        .allow_parallel(config.plan.allow_parallel);

    let custom_plan = match args.plan {
        Some(ref path) => Some(load_plan(path)?),
        None => None,
    };

    // Handle --dry-run: validate and print the plan, no LLM calls
    if args.dry_run {
        let plan = custom_plan.unwrap_or_else(|| builder.build());
        return handle_dry_run(&plan);
    }

    // Step 3: Wire up the agents
    let client = OllamaClient::new(config.model.clone())?;

    println!("🤖 Initializing agents...");
    println!("   Model: {}", client.model_name());
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Step timeout: {}s", config.plan.step_timeout_seconds);
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(SecurityAnalyzer::new(client.clone())));
    registry.register(Arc::new(BugAnalyzer::new(client)));

    let workers: Vec<String> = registry
        .registered_types()
        .iter()
        .map(|t| t.to_string())
        .collect();
    println!("   Workers: {}", workers.join(", "));

    let bus = EventBus::new();
    let printer = if config.general.stream {
        Some(console::spawn_printer(&bus))
    } else {
        None
    };

    let coordinator = Coordinator::new(Arc::new(registry), bus.clone(), builder);

    // Step 4: Run the coordinated review
    println!("\n🔬 Running code review...");
    let outcome = match custom_plan {
        Some(plan) => coordinator.run_plan(plan, &code).await?,
        None => coordinator.run(&code).await?,
    };

    // Drop the bus so the printer drains and exits before we summarize.
    drop(coordinator);
    drop(bus);
    if let Some(handle) = printer {
        if let Err(e) = handle.await {
            warn!("Console printer task failed: {e}");
        }
    }

    // Step 5: Build and save the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let mut consolidated = outcome.report;
    if let Some(min_level) = args.min_severity {
        consolidated = consolidated.filtered(fail_on_to_severity(min_level));
    }

    let metadata = ReportMetadata {
        input_path: input.display().to_string(),
        analysis_date: Utc::now(),
        model_used: config.model.name.clone(),
        plan_id: outcome.plan_id,
        duration_seconds: duration,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&metadata, &consolidated)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&metadata, &consolidated, &config.report)
        }
    };

    std::fs::write(&args.output, &output)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    // Print summary
    let count = |severity: Severity| {
        consolidated
            .severity_breakdown
            .get(&severity)
            .copied()
            .unwrap_or(0)
    };
    println!("\n📊 Review Summary:");
    println!("   Total findings: {}", consolidated.total_findings);
    println!("   Risk score: {}", consolidated.risk_score);
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low)
    );
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Review complete! Report saved to: {}",
        args.output.display()
    );

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let threshold = fail_on_to_severity(fail_level);
        let has_findings_above = consolidated
            .max_severity()
            .is_some_and(|severity| severity >= threshold);

        if has_findings_above {
            eprintln!(
                "\n⛔ Findings at or above {:?} severity. Failing (exit code 2).",
                fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Handle --dry-run: validate the plan, print its steps, exit.
fn handle_dry_run(plan: &Plan) -> Result<i32> {
    println!("\n🔍 Dry run: validating plan (no LLM calls)...\n");

    plan.validate()
        .with_context(|| format!("Plan {} is invalid", plan.plan_id))?;

    println!("   Plan {} with {} step(s):\n", plan.plan_id, plan.steps.len());
    for step in &plan.steps {
        let deps = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on.join(", ")
        };
        println!(
            "     📄 {} [{}] depends on: {} (timeout {}s)",
            step.step_id, step.worker_type, deps, step.timeout_seconds
        );
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

/// Convert FailOnLevel to Severity for comparison.
fn fail_on_to_severity(level: FailOnLevel) -> Severity {
    match level {
        FailOnLevel::Low => Severity::Low,
        FailOnLevel::Medium => Severity::Medium,
        FailOnLevel::High => Severity::High,
        FailOnLevel::Critical => Severity::Critical,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .swarmaudit.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Load a plan from a JSON file in the external plan shape.
fn load_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan file: {}", path.display()))?;
    info!("Loaded plan {} with {} step(s)", plan.plan_id, plan.steps.len());
    Ok(plan)
}
