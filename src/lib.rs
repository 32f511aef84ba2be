//! Scheduled cloud cost digest.
//!
//! Runs a billing query on an asynchronous analytical engine, merges the
//! result with an optimization-recommendation feed, grades the account's
//! savings potential and mails the report.
//!
//! Control flow: [`query::QueryExecutor`] → [`query::decode`] →
//! [`analytics::build_report`] (joined with [`recommendations`]) →
//! [`render`] → [`notify::Notifier`], wired together by
//! [`pipeline::Pipeline`].

pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod recommendations;
pub mod render;
pub mod retry;

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::notify::OutboxMailer;
use crate::pipeline::{Invocation, Pipeline};
use crate::query::replay::ReplayEngine;
use crate::recommendations::{
    FileRecommendationSource, RecommendationSource, StaticRecommendationSource,
};

#[derive(Parser, Debug)]
#[command(
    name = "cost-digest",
    version,
    about = "Query cloud billing data, grade savings potential and mail the report"
)]
pub struct Cli {
    /// Path to the TOML config (default: $XDG_CONFIG_HOME/cost-digest/config.toml)
    #[arg(long, global = true, env = "COST_DIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Machine-readable output: JSON on stdout, JSON errors on stderr
    #[arg(long, global = true)]
    pub json: bool,

    /// Alias for --json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = logging::DEFAULT_FILTER)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Collaborator inputs shared by `run` and `preview`.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Invocation JSON file, or `-` for stdin
    #[arg(long, value_name = "FILE")]
    pub invocation: PathBuf,

    /// Recorded engine script replayed as the query engine
    #[arg(long, value_name = "FILE", env = "COST_DIGEST_ENGINE_SCRIPT")]
    pub engine_script: PathBuf,

    /// JSON array of recommendations (none when omitted)
    #[arg(long, value_name = "FILE", env = "COST_DIGEST_RECOMMENDATIONS")]
    pub recommendations: Option<PathBuf>,

    /// Use a simulated clock so poll waits and backoff return immediately
    #[arg(long)]
    pub simulate_time: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one invocation end to end and print its outcome as JSON
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        /// Directory that receives sent messages as JSON envelopes
        #[arg(long, value_name = "DIR", env = "COST_DIGEST_OUTBOX")]
        outbox: PathBuf,
    },
    /// Load and validate the config file
    CheckConfig,
    /// Query and render without sending
    Preview {
        #[command(flatten)]
        sources: SourceArgs,

        /// Print the HTML body instead of the text body
        #[arg(long)]
        html: bool,
    },
}

/// Error surfaced to `main`: exit code plus robot-friendly fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub code: i32,
    pub kind: String,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            kind: "usage".to_string(),
            message: message.into(),
            hint: Some("Run `cost-digest --help` for usage.".to_string()),
            retryable: false,
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            code: 1,
            kind: "internal".to_string(),
            message: format!("{err:#}"),
            hint: None,
            retryable: false,
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        Self {
            code: err.exit_code(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            hint: err.hint().map(str::to_string),
            retryable: err.is_retryable(),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub struct ParsedCli {
    pub cli: Cli,
    pub robot: bool,
}

/// Parse raw process arguments. Help and version output exit directly.
pub fn parse_cli(raw_args: Vec<String>) -> Result<ParsedCli, CliError> {
    let cli = match Cli::try_parse_from(raw_args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                err.exit()
            }
            _ => return Err(CliError::usage(err.to_string().trim_end())),
        },
    };
    let robot = cli.json || cli.robot;
    Ok(ParsedCli { cli, robot })
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let ParsedCli { cli, robot } = parsed;
    let _guard = logging::init(&cli.log_level, cli.log_file.as_deref()).map_err(CliError::internal)?;

    let Some(command) = cli.command.clone() else {
        return Err(CliError::usage("no command given"));
    };

    match command {
        Commands::CheckConfig => check_config(&cli, robot),
        Commands::Run { sources, outbox } => {
            let config = load_config(&cli)?;
            let invocation = read_invocation(&sources.invocation)?;
            let pipeline = build_pipeline(config, &sources, Arc::new(OutboxMailer::new(outbox)))?;
            let outcome = pipeline.run(&invocation);
            print_json(&outcome)?;
            if outcome.is_success() {
                Ok(())
            } else {
                Err(CliError {
                    code: outcome.exit_code,
                    kind: outcome.kind,
                    message: outcome.message,
                    hint: outcome.hint,
                    retryable: outcome.retryable,
                })
            }
        }
        Commands::Preview { sources, html } => {
            let config = load_config(&cli)?;
            let invocation = read_invocation(&sources.invocation)?;
            // Preview never sends; the outbox is only there to satisfy the pipeline.
            let scratch = std::env::temp_dir().join("cost-digest-preview");
            let pipeline = build_pipeline(config, &sources, Arc::new(OutboxMailer::new(scratch)))?;
            let prepared = pipeline.prepare(&invocation)?;
            if robot {
                print_json(&serde_json::json!({
                    "kind": prepared.document.kind,
                    "subject": prepared.document.subject,
                    "execution_id": prepared.execution_id,
                    "rows": prepared.rows,
                    "partial": prepared.partial,
                    "attachments": prepared
                        .document
                        .attachments
                        .iter()
                        .map(|a| a.filename.as_str())
                        .collect::<Vec<_>>(),
                    "text": prepared.document.text,
                }))
            } else {
                println!("Subject: {}\n", prepared.document.subject);
                if html {
                    println!("{}", prepared.document.html);
                } else {
                    print!("{}", prepared.document.text);
                }
                for attachment in &prepared.document.attachments {
                    println!("\n[attachment] {} ({} bytes)", attachment.filename, attachment.bytes.len());
                }
                Ok(())
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    let path = PipelineConfig::resolve_path(cli.config.as_deref()).map_err(PipelineError::from)?;
    debug!(path = %path.display(), "Loading config");
    Ok(PipelineConfig::load_from(&path).map_err(PipelineError::from)?)
}

fn check_config(cli: &Cli, robot: bool) -> Result<(), CliError> {
    let path = PipelineConfig::resolve_path(cli.config.as_deref()).map_err(PipelineError::from)?;
    let config = PipelineConfig::load_from(&path).map_err(PipelineError::from)?;
    if robot {
        print_json(&serde_json::json!({
            "valid": true,
            "path": path.display().to_string(),
            "config": config,
        }))
    } else {
        println!("Config OK: {}", path.display());
        println!("  sender:      {}", config.mail.sender);
        println!("  recipients:  {}", config.mail.recipients.join(", "));
        println!("  deadline:    {}s", config.query.deadline_secs);
        println!("  top_n:       {}", config.metrics.top_n);
        println!("  grade bands: {}", config.metrics.grades.len());
        Ok(())
    }
}

fn read_invocation(path: &Path) -> Result<Invocation, CliError> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(PipelineError::from)?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(PipelineError::from)?
    };
    serde_json::from_str(&content)
        .map_err(|e| CliError::usage(format!("invalid invocation JSON: {e}")))
}

fn build_pipeline(
    config: PipelineConfig,
    sources: &SourceArgs,
    mailer: Arc<OutboxMailer>,
) -> Result<Pipeline, CliError> {
    let engine = ReplayEngine::load(&sources.engine_script).map_err(PipelineError::from)?;
    let source: Arc<dyn RecommendationSource> = match &sources.recommendations {
        Some(path) => Arc::new(FileRecommendationSource::new(path)),
        None => Arc::new(StaticRecommendationSource::default()),
    };
    let clock: Arc<dyn Clock> = if sources.simulate_time {
        Arc::new(ManualClock::new())
    } else {
        Arc::new(SystemClock)
    };
    Ok(Pipeline::new(config, Arc::new(engine), source, mailer, clock))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::internal(anyhow::Error::new(e)))?;
    println!("{out}");
    Ok(())
}
