//! Command-line interface for loopwise.
//!
//! Provides commands for analyzing a narrative, dry-running the safety gate,
//! inspecting and recording analytics events, and showing configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use crate::analytics::{Analytics, JsonlEventLog};
use crate::config;
use crate::core::{GateReport, Orchestrator, SafetyGate};
use crate::domain::{AnalysisRequest, Answer, EventName};

/// loopwise - narrative loop analysis pipeline
#[derive(Parser, Debug)]
#[command(name = "loopwise")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a narrative
    Analyze {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Consent to persistent storage of the input
        #[arg(long)]
        storage_opt_in: bool,

        /// Keep capitalized name pairs (only honored with --storage-opt-in)
        #[arg(long)]
        keep_names: bool,

        /// Answer to a clarifying question (repeatable)
        #[arg(short, long = "answer")]
        answers: Vec<String>,

        /// Continue an existing session
        #[arg(long)]
        session_id: Option<Uuid>,

        /// Caller identifier attached to analytics events
        #[arg(long, env = "LOOPWISE_USER_ID")]
        user_id: Option<String>,
    },

    /// Run only the safety gate and print its report
    Check {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long)]
        storage_opt_in: bool,

        #[arg(long)]
        keep_names: bool,
    },

    /// Show analytics events for a session
    Events {
        /// Session ID (UUID)
        session_id: String,
    },

    /// Record a follow-up analytics event (e.g. micro_test_completed)
    Track {
        session_id: String,

        /// Event name (snake_case)
        event_name: String,

        /// Event data as a JSON object
        #[arg(short, long, default_value = "{}")]
        data: String,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze {
                input,
                storage_opt_in,
                keep_names,
                answers,
                session_id,
                user_id,
            } => {
                let mut request = AnalysisRequest::new(read_input(input)?)
                    .with_storage_opt_in(storage_opt_in)
                    .with_redact_names(!keep_names);
                if let Some(session_id) = session_id {
                    request = request.with_session(session_id);
                }
                if let Some(user_id) = user_id {
                    request = request.with_user(user_id);
                }
                if !answers.is_empty() {
                    request = request.with_answers(answers.into_iter().map(Answer::Text).collect());
                }
                analyze(request).await
            }
            Commands::Check {
                input,
                storage_opt_in,
                keep_names,
            } => check(read_input(input)?, storage_opt_in, !keep_names),
            Commands::Events { session_id } => show_events(&session_id).await,
            Commands::Track {
                session_id,
                event_name,
                data,
            } => track_event(&session_id, &event_name, &data).await,
            Commands::Config => show_config(),
        }
    }
}

/// Read input from a file, or from stdin when it is piped
fn read_input(input_file: Option<PathBuf>) -> Result<String> {
    if let Some(path) = input_file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

async fn open_analytics() -> Result<Analytics> {
    let log = JsonlEventLog::open_default().await?;
    Ok(Analytics::new(Arc::new(log)))
}

/// Run the full pipeline and print the response as JSON
async fn analyze(request: AnalysisRequest) -> Result<()> {
    let cfg = config::config()?;
    let orchestrator = Orchestrator::from_config(cfg, open_analytics().await?)?;

    let response = orchestrator.analyze(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        eprintln!("\n[Session {} ended: {}]", response.session_id, response.code());
        std::process::exit(1);
    }

    Ok(())
}

/// Dry-run the safety gate
fn check(input: String, storage_opt_in: bool, redact_names: bool) -> Result<()> {
    let cfg = config::config()?;
    let gate = SafetyGate::new(cfg.pipeline.max_input_chars);

    let outcome = gate.validate(&input, storage_opt_in, redact_names);
    let report = GateReport::from(&outcome);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Show analytics events for a session
async fn show_events(session_id_str: &str) -> Result<()> {
    let session_id = Uuid::parse_str(session_id_str)
        .with_context(|| format!("Invalid session ID: {}", session_id_str))?;

    let log = JsonlEventLog::open_default().await?;
    let events = log.session_events(session_id).await?;

    if events.is_empty() {
        println!("No events found for session {}", session_id);
        return Ok(());
    }

    println!("{:<26} {:<22} {}", "TIMESTAMP", "EVENT", "DATA");
    println!("{}", "-".repeat(75));

    for event in events {
        println!(
            "{:<26} {:<22} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            event.event_name,
            event.event_data
        );
    }

    Ok(())
}

/// Record an event reported by a client after the run finished
async fn track_event(session_id_str: &str, event_name: &str, data: &str) -> Result<()> {
    let session_id = Uuid::parse_str(session_id_str)
        .with_context(|| format!("Invalid session ID: {}", session_id_str))?;
    let name: EventName = event_name.parse().map_err(anyhow::Error::msg)?;
    let data: Value =
        serde_json::from_str(data).with_context(|| format!("Invalid event data: {}", data))?;

    let log = JsonlEventLog::open_default().await?;
    let event = crate::domain::AnalyticsEvent::new(session_id, name, data);
    log.append(&event).await?;

    eprintln!("[Recorded {} for session {}]", name, session_id);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let pipeline = &cfg.pipeline;

    println!("loopwise configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Events:    {}", config::events_path()?.display());
    println!();
    println!("Completion service:");
    println!("  Base URL:  {}", cfg.base_url);
    println!("  API key:   {}", cfg.masked_api_key());
    println!("  Model:     {}", pipeline.model);
    println!("  Timeout:   {}s", pipeline.timeout_seconds);
    println!();
    println!("Pipeline:");
    println!("  Max input chars:    {}", pipeline.max_input_chars);
    println!("  Summary max words:  {}", pipeline.summary_max_words);
    println!("  Max questions:      {}", pipeline.max_questions);
    println!(
        "  Temperatures:       extraction {} / decision {}",
        pipeline.extraction_temperature, pipeline.decision_temperature
    );

    Ok(())
}
