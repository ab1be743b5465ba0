use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use liftkb::{
    init_tracing, run_service,
    settings::{resolve_data_dir, AppConfig},
    KnowledgeBase,
};

#[derive(Parser)]
#[command(name = "liftkb")]
#[command(about = "Expert knowledge capture and semantic retrieval for elevator maintenance")]
#[command(version)]
struct Cli {
    /// Data directory (config.json and the durable store)
    #[arg(long, global = true, env = "LIFTKB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Store every log in a JSON array file
    Seed {
        file: PathBuf,
        /// Expert id for entries that do not carry one
        #[arg(long, default_value = "expert_seed")]
        expert_id: String,
    },
    /// Print stored records
    Dump {
        #[arg(long)]
        expert_id: Option<String>,
        #[arg(long)]
        elevator_id: Option<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => resolve_data_dir()?,
    };
    let config = AppConfig::load(&data_dir);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(run_service(data_dir, config))
        }
        Command::Seed { file, expert_id } => seed(data_dir, &config, file, &expert_id),
        Command::Dump {
            expert_id,
            elevator_id,
        } => dump(data_dir, &config, expert_id, elevator_id),
    }
}

fn seed(data_dir: PathBuf, config: &AppConfig, file: PathBuf, expert_id: &str) -> Result<()> {
    let raw = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let entries: Vec<Value> = serde_json::from_slice(&raw)
        .with_context(|| format!("{} must contain a JSON array", file.display()))?;

    let kb = KnowledgeBase::open(data_dir, config)?;
    let now = chrono::Utc::now().to_rfc3339();
    let report = kb.seed(entries, expert_id, &now);
    kb.shutdown()?;

    println!(
        "stored: {}, deflected: {}, failed: {}",
        report.stored, report.deflected, report.failed
    );
    if report.stored == 0 && report.failed > 0 {
        bail!("no entries could be stored");
    }
    Ok(())
}

fn dump(
    data_dir: PathBuf,
    config: &AppConfig,
    expert_id: Option<String>,
    elevator_id: Option<String>,
) -> Result<()> {
    let kb = KnowledgeBase::open(data_dir, config)?;
    let records = kb.dump(expert_id.as_deref(), elevator_id.as_deref())?;

    if records.is_empty() {
        println!("The knowledge base is empty or no records match.");
        return Ok(());
    }

    println!(
        "{} record(s) (persistent: {})",
        records.len(),
        kb.is_persistent()
    );
    for (n, record) in records.iter().enumerate() {
        println!("--- Entry {} ---", n + 1);
        println!("ID: {}", record.id);
        println!(
            "Metadata: elevator_id={}, expert_id={}, timestamp={}, source={}",
            record.elevator_id,
            record.expert_id,
            record.timestamp,
            record.source.as_str()
        );
        println!("Document: {}", record.document);
    }
    Ok(())
}
