//! Demoflow CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.demoflow/config.toml` (or `--config`).
//! 2. **Wire observability**: `tracing-subscriber` to stderr, plus an optional
//!    OpenTelemetry OTLP exporter. See [`telemetry`].
//! 3. **Construct infrastructure**: resolve every capability to its mock,
//!    real or resilient implementation and hand the map to
//!    [`nodes::OrchestratorService`]. See [`compose`].
//! 4. **Dispatch the command** and print the resulting record(s) as JSON on
//!    stdout. Any error is printed with its cause chain on stderr and the
//!    process exits with status 1.

mod compose;
mod config;
mod telemetry;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use nodes::{GateApproval, OrchestratorService};
use pipeline::{ApproverId, Gate, MeetingRef, RunId, RunPatch, RunRecord};
use serde::Serialize;

use crate::config::DemoflowConfig;

/// Demoflow: gated meeting-to-prototype pipeline.
#[derive(Debug, Parser)]
#[command(name = "demoflow", version)]
#[command(
    about = "Turn meeting feature requests into reviewed prototypes, one approval gate at a time"
)]
struct Cli {
    /// Path to the configuration file (default: .demoflow/config.toml)
    #[arg(long, global = true, env = "DEMOFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a run at gate0 from a meeting, free text, JSON, or a manual entry
    #[command(subcommand)]
    Start(StartCommand),

    /// Express track: text straight to a PRD awaiting review
    PhaseOne(TextInput),

    /// Approve the PRD of an express run and finish it
    ApprovePrd { run_id: RunId },

    /// Approve a gate and run its automatic transition
    Approve {
        run_id: RunId,
        /// gate0..gate5 (or 0..5)
        gate: Gate,
        /// Defaults to [service] default_approver
        #[arg(long)]
        approver: Option<String>,
        #[arg(long)]
        comments: Option<String>,
        /// Feature indices to carry forward (gate1 only), e.g. --select 0,2
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,
    },

    /// Print one run record
    Show { run_id: RunId },

    /// List all runs, newest first
    List {
        /// Print full records instead of summaries
        #[arg(long)]
        full: bool,
    },

    /// Patch content fields of a run from a JSON document
    Update {
        run_id: RunId,
        /// JSON patch file, or `-` for stdin
        #[arg(long)]
        patch: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum StartCommand {
    /// From a meeting in the meeting-notes source
    Meeting { meeting: String },
    /// From free text, formatted by the brief formatter
    Text(TextInput),
    /// From a JSON document (`features` / `actionItems`)
    Json {
        /// JSON file, or `-` for stdin
        file: PathBuf,
    },
    /// From an explicit title and description
    Manual {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Debug, Args)]
struct TextInput {
    /// The text itself
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    text: Option<String>,
    /// Read the text from a file, or `-` for stdin
    #[arg(long)]
    file: Option<PathBuf>,
}

impl TextInput {
    fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => read_input(path),
            (None, None) => Err(anyhow!("either TEXT or --file is required")),
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: RunId,
    status: &'a str,
    stage: &'a str,
    features: String,
    prd_title: Option<&'a str>,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a RunRecord> for RunSummary<'a> {
    fn from(record: &'a RunRecord) -> Self {
        Self {
            run_id: record.run_id,
            status: record.status.as_str(),
            stage: record.stage.as_str(),
            features: record.feature_brief.feature_titles(),
            prd_title: record.prd.as_ref().map(|p| p.title.as_str()),
            created_at: record.created_at.to_string(),
            updated_at: record.updated_at.to_string(),
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{text}");
    Ok(())
}

async fn dispatch(
    service: &OrchestratorService,
    config: &DemoflowConfig,
    command: Command,
) -> Result<()> {
    let record = match command {
        Command::Start(start) => match start {
            StartCommand::Meeting { meeting } => {
                let meeting =
                    MeetingRef::new(meeting).ok_or_else(|| anyhow!("meeting reference is empty"))?;
                service.start_run_from_meeting(&meeting).await?
            }
            StartCommand::Text(input) => service.start_run_from_text(&input.read()?).await?,
            StartCommand::Json { file } => service.start_run_from_json(&read_input(&file)?).await?,
            StartCommand::Manual { title, description } => {
                service.start_manual_run(&title, &description).await?
            }
        },
        Command::PhaseOne(input) => service.run_phase_one(&input.read()?).await?,
        Command::ApprovePrd { run_id } => service.approve_and_continue(run_id).await?,
        Command::Approve {
            run_id,
            gate,
            approver,
            comments,
            select,
        } => {
            let approver = approver.unwrap_or_else(|| config.service.default_approver.clone());
            let approver =
                ApproverId::new(approver).ok_or_else(|| anyhow!("approver must not be empty"))?;
            let mut approval = GateApproval::new(gate, approver).with_selection(select);
            if let Some(comments) = comments {
                approval = approval.with_comments(comments);
            }
            service.approve_gate(run_id, approval).await?
        }
        Command::Show { run_id } => service.get_run(run_id).await?,
        Command::List { full } => {
            let runs = service.list_runs().await?;
            return if full {
                print_json(&runs)
            } else {
                print_json(&runs.iter().map(RunSummary::from).collect::<Vec<_>>())
            };
        }
        Command::Update { run_id, patch } => {
            let patch: RunPatch = serde_json::from_str(&read_input(&patch)?)
                .context("patch is not a valid run patch (only content fields may be set)")?;
            service.update_run_fields(run_id, patch).await?
        }
    };
    print_json(&record)
}

async fn run(cli: Cli) -> Result<()> {
    let config = DemoflowConfig::load(cli.config.as_deref())?;
    let telemetry = telemetry::init(&config.telemetry)?;

    let result = async {
        let service = compose::build_service(&config)?;
        dispatch(&service, &config, cli.command).await
    }
    .await;

    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "command failed");
    }
    telemetry.shutdown();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
