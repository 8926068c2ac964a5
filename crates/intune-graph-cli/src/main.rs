//! Intune Graph CLI
//!
//! Command-line interface for:
//! - Validating the integration configuration (`CLIENT_ID`, `CLIENT_SECRET`, `TENANT`)
//! - Listing the ingestion steps in execution order
//! - Running an ingestion against a tenant fixture and writing the graph snapshot

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use intune_graph_ingest::{
    FixtureSource, IntegrationConfig, RunReport, StepDefinition, StepRunner,
};
use intune_graph_store::{InMemoryJobState, JobState};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "intune-graph")]
#[command(
    author,
    version,
    about = "Intune device-management data as an entity/relationship graph"
)]
struct Cli {
    /// Log debug events (repeat for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the integration configuration and check that it is complete.
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the steps in execution order with what each one produces.
    Steps {
        /// Only these steps (plus their dependencies).
        #[arg(long = "step")]
        steps: Vec<String>,
    },

    /// Run the ingestion against a tenant fixture and write the snapshot.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Tenant fixture (JSON) standing in for Microsoft Graph.
        #[arg(long)]
        fixture: PathBuf,

        /// Where to write the graph snapshot.
        #[arg(short, long)]
        out: PathBuf,

        /// Records per page served from the fixture.
        #[arg(long, default_value_t = intune_graph_ingest::source::DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Only these steps (plus their dependencies).
        #[arg(long = "step")]
        steps: Vec<String>,
    },
}

/// Flags override the `CLIENT_ID`, `CLIENT_SECRET` and `TENANT` environment.
#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    client_id: Option<String>,
    #[arg(long)]
    client_secret: Option<String>,
    #[arg(long)]
    tenant: Option<String>,
}

impl ConfigArgs {
    fn load(self) -> IntegrationConfig {
        let mut config = IntegrationConfig::from_env();
        if let Some(client_id) = self.client_id {
            config.client_id = client_id;
        }
        if let Some(client_secret) = self.client_secret {
            config.client_secret = client_secret;
        }
        if let Some(tenant) = self.tenant {
            config.tenant = tenant;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { config } => cmd_validate(config.load()),
        Commands::Steps { steps } => cmd_steps(&steps),
        Commands::Run {
            config,
            fixture,
            out,
            page_size,
            steps,
        } => cmd_run(config.load(), &fixture, &out, page_size, &steps).await,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_validate(config: IntegrationConfig) -> Result<()> {
    config.validate()?;
    println!(
        "{} tenant {} as client {}",
        "Valid.".green().bold(),
        config.tenant.bold(),
        config.client_id
    );
    Ok(())
}

fn cmd_steps(only: &[String]) -> Result<()> {
    let plan = StepRunner::new(IntegrationConfig::default())
        .only(only.iter().cloned())
        .plan()?;
    for (i, step) in plan.iter().enumerate() {
        print_step(i + 1, step);
    }
    Ok(())
}

fn print_step(position: usize, step: &StepDefinition) {
    println!("{:>2}. {} ({})", position, step.id.bold(), step.name);
    if !step.depends_on.is_empty() {
        println!("      {} {}", "after:".dimmed(), step.depends_on.join(", "));
    }
    if !step.entity_types.is_empty() {
        println!("      {} {}", "entities:".dimmed(), step.entity_types.join(", "));
    }
    for relationship in &step.relationship_types {
        println!("      {} {}", "relationship:".dimmed(), relationship);
    }
    for mapped in &step.mapped_relationship_types {
        println!("      {} {}", "mapped:".dimmed(), mapped);
    }
}

async fn cmd_run(
    config: IntegrationConfig,
    fixture: &Path,
    out: &Path,
    page_size: usize,
    only: &[String],
) -> Result<()> {
    let started = Instant::now();
    let source = FixtureSource::from_path(fixture)
        .map_err(|e| anyhow!("failed to load fixture {}: {e}", fixture.display()))?
        .with_page_size(page_size);
    let job_state = InMemoryJobState::new();

    println!("{} {}", "Ingesting".green().bold(), fixture.display());
    let report = StepRunner::new(config)
        .only(only.iter().cloned())
        .run(&source, &job_state)
        .await?;

    let snapshot = job_state.snapshot().await?;
    snapshot.write_to(out)?;

    print_report(&report);
    println!(
        "{} {} entities, {} relationships, {} mapped relationships in {} ms",
        "Totals:".bold(),
        snapshot.entities.len(),
        snapshot.relationships.len(),
        snapshot.mapped_relationships.len(),
        started.elapsed().as_millis()
    );
    println!("{} {}", "digest:".dimmed(), snapshot.digest()?);
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}

fn print_report(report: &RunReport) {
    for step in &report.steps {
        let marker = if step.warnings.is_empty() {
            "ok".green().bold()
        } else {
            "warn".yellow().bold()
        };
        println!(
            "{:>5} {:<40} {:>5} entities {:>5} relationships {:>4} mapped",
            marker,
            step.step_id,
            step.entities_created,
            step.relationships_created,
            step.mapped_relationships_created
        );
        for warning in &step.warnings {
            println!("        {} {}", "-".yellow(), warning);
        }
    }

    let counts = report.warning_counts();
    if !counts.is_empty() {
        let summary = counts
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{} {}", "warnings:".yellow().bold(), summary);
    }
}
