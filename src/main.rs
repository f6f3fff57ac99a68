use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use receipt_ocr::commands;
use receipt_ocr::commands::settings::{load_settings, SettingsPayload};
use receipt_ocr::db::Database;
use receipt_ocr::models::{ReceiptEvent, Settings};
use receipt_ocr::services::keywords::KeywordTable;
use receipt_ocr::services::ocr::TextExtractor;
use receipt_ocr::services::parser::ReceiptParser;
use receipt_ocr::services::state::AppState;

#[derive(Parser)]
#[command(name = "receipt-ocr", version, about = "Turn receipt photos into itemized, editable expense batches")]
struct Cli {
    /// SQLite database with settings, processing logs and submissions.
    #[arg(long, default_value = "receipt-ocr.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR and parse receipt files (or folders of them) as one batch.
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Batch title used for the submission.
        #[arg(long, default_value = "Receipts")]
        title: String,
        /// Print every receipt as JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Record the submission once every receipt is settled.
        #[arg(long)]
        submit: bool,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Watch a drop folder and process receipts as they arrive.
    Watch {
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Parse already-recognized receipt text and print the result.
    Parse { file: PathBuf },
    /// Show or change stored settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        ocr_language: Option<String>,
        #[arg(long)]
        keywords_path: Option<String>,
        #[arg(long)]
        staging_dir: Option<String>,
        #[arg(long)]
        watch_folder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = Database::new(cli.db.clone())?;
    let settings = load_settings(&db).map_err(|e| anyhow!(e))?;

    match cli.command {
        Command::Parse { file } => {
            let parser = build_parser(&settings)?;
            let text = std::fs::read_to_string(&file)?;
            let parsed = parser.parse(&file.to_string_lossy(), &text)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Scan {
            paths,
            title,
            json,
            submit,
            lang,
        } => {
            let mut settings = settings;
            if let Some(lang) = lang {
                settings.ocr_language = lang;
            }
            let state = build_state(db, settings)?;
            commands::receipts::upload_files(paths, &state)
                .await
                .map_err(|e| anyhow!(e))?;
            state.wait_idle().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&state.snapshot()?)?);
            } else {
                print_table(&state).await?;
            }

            if submit {
                let aggregate = commands::receipts::submit(title, &state)
                    .await
                    .map_err(|e| anyhow!(e))?;
                println!("{}", serde_json::to_string_pretty(&aggregate)?);
            }
        }
        Command::Watch { folder } => {
            let mut settings = settings;
            if let Some(folder) = folder {
                settings.watch_folder = Some(folder.to_string_lossy().to_string());
            }
            if settings.watch_folder.is_none() {
                return Err(anyhow!("No watch folder configured; pass --folder"));
            }
            let state = build_state(db, settings)?;
            let mut events = state.subscribe();
            state.restart_watcher()?;

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(ReceiptEvent::QueueIdle) => {
                            let total = commands::receipts::get_grand_total(&state)
                                .await
                                .map_err(|e| anyhow!(e))?;
                            info!(grand_total = %total, "batch settled");
                        }
                        Ok(event) => println!("{}", serde_json::to_string(&event)?),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => println!("{}", serde_json::to_string_pretty(&settings)?),
            SettingsAction::Set {
                ocr_language,
                keywords_path,
                staging_dir,
                watch_folder,
            } => {
                let state = build_state(db, settings)?;
                let payload = SettingsPayload {
                    ocr_language,
                    keywords_path,
                    staging_dir,
                    watch_folder,
                };
                let saved = commands::settings::save_settings(payload, &state)
                    .await
                    .map_err(|e| anyhow!(e))?;
                println!("{}", serde_json::to_string_pretty(&saved)?);
            }
        },
    }

    Ok(())
}

fn build_parser(settings: &Settings) -> Result<ReceiptParser> {
    let table = KeywordTable::resolve(settings.keywords_path.as_deref())?;
    Ok(ReceiptParser::new(&table)?)
}

fn build_state(db: Database, settings: Settings) -> Result<AppState> {
    let parser = build_parser(&settings)?;
    let staging_dir = settings
        .staging_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("receipt-ocr-staging"));
    let engine = Arc::new(TextExtractor::new(&settings.ocr_language));
    AppState::new(db, settings, engine, parser, staging_dir)
}

async fn print_table(state: &AppState) -> Result<()> {
    let receipts = commands::receipts::get_receipts(state).await.map_err(|e| anyhow!(e))?;
    for receipt in &receipts {
        println!(
            "{:<28} {:<10} {:>4} items {:>10}  {}",
            receipt.file_name,
            receipt.status.as_str(),
            receipt.item_count,
            receipt.total,
            receipt.error.as_deref().unwrap_or("")
        );
    }
    let total = commands::receipts::get_grand_total(state).await.map_err(|e| anyhow!(e))?;
    println!("Grand total: {}", total);
    Ok(())
}
