//! MedAnnotator command line.
//!
//! Registers datasets, annotates images and queries the stored results.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use medannotator_lib::chat::ClinicalAssistant;
use medannotator_lib::config::{self, AppConfig};
use medannotator_lib::db;
use medannotator_lib::pipeline::processor::{build_text_llm, AnnotationProcessor};

/// Command-line arguments for medannotator
#[derive(Parser, Debug)]
#[command(name = "medannotator")]
#[command(about = "Validated, traceable annotations for medical images")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, global = true, env = "MEDANNOTATOR_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register images in a dataset as pending annotations
    Load {
        dataset: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Annotate a single image
    Annotate {
        dataset: String,
        image: PathBuf,
        /// What the analysis should focus on
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Annotate every image of a dataset
    Analyze {
        dataset: String,
        #[arg(long)]
        prompt: Option<String>,
        /// Restrict the run to these image paths
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },
    /// Show the final annotations of a dataset
    List { dataset: String },
    /// Show staged requests that were never promoted
    Pending { dataset: String },
    /// Show every staged request for one image, newest first
    History { dataset: String, image: String },
    /// Show request counts for a dataset
    Stats { dataset: String },
    /// List datasets with their image counts
    Datasets,
    /// Ask the clinical assistant about one request
    Ask { request_id: Uuid, question: String },
}

fn main() -> Result<()> {
    medannotator_lib::init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(path) = args.db {
        config.database_path = path;
    }

    tracing::info!(
        version = config::APP_VERSION,
        database = %config.database_path.display(),
        "MedAnnotator starting"
    );
    let conn = db::open_database(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;

    match args.command {
        Command::Load { dataset, paths } => {
            let paths: Vec<String> = paths
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            let summary = db::register_pending_images(&conn, &dataset, &paths)
                .context("Failed to load dataset")?;
            println!(
                "Loaded {} image(s) into '{dataset}', skipped {} already present",
                summary.loaded, summary.skipped
            );
        }
        Command::Annotate {
            dataset,
            image,
            prompt,
            subject,
        } => {
            let outcome = AnnotationProcessor::from_config(&config)
                .annotate_file(
                    &conn,
                    &dataset,
                    &image,
                    prompt.as_deref(),
                    subject.as_deref(),
                )
                .with_context(|| format!("Failed to annotate {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Analyze {
            dataset,
            prompt,
            only,
        } => {
            let only = (!only.is_empty()).then_some(only.as_slice());
            let report = AnnotationProcessor::from_config(&config)
                .analyze_dataset(&conn, &dataset, prompt.as_deref(), only)
                .with_context(|| format!("Failed to analyze dataset '{dataset}'"))?;
            println!(
                "{}/{} image(s) annotated ({} via fallback)",
                report.processed, report.total, report.fallbacks
            );
            for error in &report.errors {
                println!("  error: {error}");
            }
        }
        Command::List { dataset } => {
            let rows = db::list_annotations(&conn, &dataset, None)?;
            if rows.is_empty() {
                println!("No annotations in '{dataset}'");
            }
            for row in rows {
                println!("{}\t{}\t{}", row.path_url, row.label, row.subject_id);
            }
        }
        Command::Pending { dataset } => {
            let requests = db::list_unprocessed_requests(&conn, &dataset)?;
            if requests.is_empty() {
                println!("No pending requests in '{dataset}'");
            }
            for request in requests {
                println!(
                    "{}\t{}\t{}\t{}",
                    request.id, request.path_url, request.provenance.status, request.created_at
                );
            }
        }
        Command::History { dataset, image } => {
            let requests = db::list_requests_for_path(&conn, &dataset, &image)?;
            if requests.is_empty() {
                println!("No requests for {image} in '{dataset}'");
            }
            for request in requests {
                println!(
                    "{}\t{}\t{}\tattempts={}\tprocessed={}",
                    request.id,
                    request.created_at,
                    request.provenance.status,
                    request.provenance.attempt_number,
                    request.processed
                );
            }
        }
        Command::Stats { dataset } => {
            let (total, processed, fallbacks) = db::staging_stats(&conn, &dataset)?;
            println!(
                "{dataset}: {total} request(s), {processed} promoted, {} pending, {fallbacks} via fallback",
                total - processed
            );
        }
        Command::Datasets => {
            let datasets = db::list_datasets(&conn)?;
            if datasets.is_empty() {
                println!("No datasets");
            }
            for (dataset, images) in datasets {
                println!("{dataset}\t{images}");
            }
        }
        Command::Ask {
            request_id,
            question,
        } => {
            let (llm, model) = build_text_llm(&config);
            let answer = ClinicalAssistant::new(llm, &model)
                .answer(&conn, &request_id, &question)
                .context("Clinical assistant failed")?;
            println!("{answer}");
        }
    }

    Ok(())
}
