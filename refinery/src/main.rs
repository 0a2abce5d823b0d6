//! Refinery CLI.
//!
//! Turns a source document into a scored invention record by driving an
//! external generation command through the extraction, validation and
//! refinement phases under a fixed call budget.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use refinery::core::record::Record;
use refinery::core::scoring::{ScoreResult, score};
use refinery::exit_codes;
use refinery::io::config::{DEFAULT_CONFIG_FILE, RefineryConfig, load_config, write_config};
use refinery::io::gateway::CommandGateway;
use refinery::io::pacer::Pacer;
use refinery::io::run_log::write_run;
use refinery::logging;
use refinery::orchestrate::{Orchestration, Orchestrator};

#[derive(Parser)]
#[command(
    name = "refinery",
    version,
    about = "Budget-constrained refinement of documents into scored invention records"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Refine a document into a scored record.
    Run {
        /// Source document handed to the generation command as an attachment.
        document: PathBuf,
        /// Directory for result.json and per-phase step logs.
        #[arg(short, long, default_value = "refinery-out")]
        out: PathBuf,
    },
    /// Score an existing record JSON file.
    Score {
        record: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run { document, out } => cmd_run(&cli.config, &document, &out),
        Command::Score { record } => cmd_score(&cli.config, &record),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("{} already exists", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &RefineryConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, document: &Path, out: &Path) -> Result<i32> {
    if !document.is_file() {
        bail!("document not found: {}", document.display());
    }
    let cfg = load_config(config_path)?;
    let gateway = CommandGateway::from_config(&cfg.gateway);
    let pacer = Pacer::new(cfg.pacer_config());
    let mut orchestrator = Orchestrator::new(&gateway, pacer, cfg.orchestrator_config())
        .with_generation(cfg.generation_settings());

    let orchestration = orchestrator
        .run(document)
        .with_context(|| format!("refine {}", document.display()))?;
    let paths = write_run(out, &orchestration)?;

    print_summary(&orchestration);
    println!("result: {}", paths.result_path.display());
    Ok(threshold_code(orchestration.result.threshold_met))
}

fn cmd_score(config_path: &Path, record_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let raw = fs::read_to_string(record_path)
        .with_context(|| format!("read {}", record_path.display()))?;
    let record: Record = serde_json::from_str(&raw)
        .with_context(|| format!("parse {} as a record object", record_path.display()))?;

    let result: ScoreResult = score(&record);
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serialize score")?
    );
    Ok(threshold_code(result.meets(cfg.budget.score_threshold)))
}

fn print_summary(orchestration: &Orchestration) {
    let result = &orchestration.result;
    println!(
        "score: {} ({})",
        result.score.total_score, result.score.rating
    );
    println!(
        "calls: {} | phases: {} | refinement rounds: {}",
        result.total_calls,
        orchestration.phases.len(),
        orchestration.refinement_rounds()
    );
    println!(
        "threshold met: {} | budget exceeded: {}",
        result.threshold_met, result.budget_exceeded
    );
    for issue in &result.score.issues {
        println!("- {issue}");
    }
}

fn threshold_code(met: bool) -> i32 {
    if met {
        exit_codes::OK
    } else {
        exit_codes::BELOW_THRESHOLD
    }
}
