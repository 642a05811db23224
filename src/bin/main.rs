//! Milestone CLI - Generate and run ingest jobs
//!
//! Usage:
//!   milestone generate <job.toml> [--empty-batch] [--split <lower:upper>]...
//!   milestone ingest <job.toml> --database <file.db>
//!   milestone sinks
//!
//! Examples:
//!   milestone generate jobs/customers.toml
//!   milestone ingest jobs/customers.toml --database warehouse.db

use clap::{Parser, Subcommand};
use milestone::config::Settings;
use milestone::executor::SqliteExecutor;
use milestone::generator::GeneratorResult;
use milestone::planner::DataSplitRange;
use milestone::transformer::{SinkRegistry, SqlPlan};
use milestone::{RelationalGenerator, RelationalIngestor};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "milestone")]
#[command(about = "Milestone - milestone staging batches into historized tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL of a job without running it
    Generate {
        /// Path to the job file
        file: PathBuf,

        /// Render the plan of an empty staging batch
        #[arg(long)]
        empty_batch: bool,

        /// Data split range as `lower:upper`; repeatable
        #[arg(long = "split", value_parser = parse_split)]
        splits: Vec<DataSplitRange>,
    },

    /// Run a job against a SQLite database
    Ingest {
        /// Path to the job file
        file: PathBuf,

        /// SQLite database file
        #[arg(short, long)]
        database: PathBuf,

        /// Data split range as `lower:upper`; repeatable
        #[arg(long = "split", value_parser = parse_split)]
        splits: Vec<DataSplitRange>,
    },

    /// List registered sinks
    Sinks,
}

fn parse_split(s: &str) -> Result<DataSplitRange, String> {
    let (lower, upper) = s
        .split_once(':')
        .ok_or_else(|| format!("expected lower:upper, got '{}'", s))?;
    let bound = |v: &str| v.trim().parse::<i64>().map_err(|e| format!("'{}': {}", v, e));
    DataSplitRange::new(bound(lower)?, bound(upper)?).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = SinkRegistry::with_defaults();

    let outcome = match cli.command {
        Commands::Generate {
            file,
            empty_batch,
            splits,
        } => cmd_generate(&registry, file, empty_batch, &splits),
        Commands::Ingest {
            file,
            database,
            splits,
        } => cmd_ingest(&registry, file, database, &splits),
        Commands::Sinks => {
            for name in registry.names() {
                println!("{}", name);
            }
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn cmd_generate(
    registry: &SinkRegistry,
    file: PathBuf,
    empty_batch: bool,
    splits: &[DataSplitRange],
) -> CliResult {
    let settings = Settings::from_file(&file)?;
    let generator = RelationalGenerator::new(
        settings.ingest_mode()?,
        settings.sink(registry)?,
        settings.options.clone(),
    );
    let datasets = settings.datasets()?;

    let results = if empty_batch {
        vec![generator.generate_operations_for_empty_batch(&datasets)?]
    } else if splits.is_empty() {
        vec![generator.generate_operations(&datasets)?]
    } else {
        generator.generate_operations_with_data_splits(&datasets, splits)?
    };

    println!("-- Milestone Generated SQL");
    println!("-- Job: {}", file.display());
    println!("-- Sink: {}", settings.sink);
    for result in &results {
        print_result(result);
    }
    Ok(())
}

fn print_result(result: &GeneratorResult) {
    println!("-- Batch start: {}", result.batch_start_timestamp());
    if let Some(range) = result.ingest_data_split_range() {
        println!("-- Data split: {}..={}", range.lower(), range.upper());
    }
    print_plan("pre actions", result.pre_actions_sql_plan());
    if let Some(plan) = result.schema_evolution_sql_plan() {
        print_plan("schema evolution", plan);
    }
    if let Some(plan) = result.next_batch_id_sql_plan() {
        print_plan("next batch id", plan);
    }
    for (name, plan) in result.pre_ingest_statistics_sql_plan() {
        print_plan(&format!("pre-ingest statistic {}", name), plan);
    }
    print_plan("ingest", result.ingest_sql_plan());
    for (name, plan) in result.post_ingest_statistics_sql_plan() {
        print_plan(&format!("post-ingest statistic {}", name), plan);
    }
    print_plan("metadata", result.metadata_ingest_sql_plan());
    print_plan("post actions", result.post_actions_sql_plan());
}

fn print_plan(title: &str, plan: &SqlPlan) {
    if plan.is_empty() {
        return;
    }
    println!();
    println!("-- {}", title);
    print!("{}", plan);
}

fn cmd_ingest(
    registry: &SinkRegistry,
    file: PathBuf,
    database: PathBuf,
    splits: &[DataSplitRange],
) -> CliResult {
    let settings = Settings::from_file(&file)?;
    let ingestor = RelationalIngestor::new(
        settings.ingest_mode()?,
        settings.sink(registry)?,
        settings.options.clone(),
    );
    let datasets = settings.datasets()?;
    let mut executor = SqliteExecutor::open(&database)?;

    let results = ingestor.ingest_with_data_splits(&mut executor, &datasets, splits)?;
    for result in &results {
        let batch = result
            .batch_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("batch {} started {}", batch, result.batch_start_timestamp);
        if let Some(range) = result.data_split_range {
            println!("  data split {}..={}", range.lower(), range.upper());
        }
        for (name, value) in &result.statistics {
            println!("  {}: {}", name, value);
        }
    }
    Ok(())
}
