use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod alerting;
mod detector;
mod ingest;
mod models;
mod report;
mod store;

use models::AlertStatus;
use store::{CaseStore, MemStore, PgStore};

#[derive(Parser)]
#[command(name = "outbreak-early-warning")]
#[command(about = "Case-count spike detection and alerting for municipal health data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import case reports from a CSV file, raising alerts for spikes
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify a case count against stored history without writing anything
    Check {
        #[arg(long)]
        location: String,
        #[arg(long)]
        disease: String,
        #[arg(long)]
        cases: i64,
        #[arg(long)]
        json: bool,
    },
    /// List alerts
    Alerts {
        #[arg(long)]
        status: Option<String>,
    },
    /// Acknowledge an alert
    Ack {
        #[arg(long)]
        id: Uuid,
    },
    /// Resolve an alert
    Resolve {
        #[arg(long)]
        id: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        disease: Option<String>,
        #[arg(long, default_value_t = 90)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Run detection against a CSV history with no database
    Simulate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        location: String,
        #[arg(long)]
        disease: String,
        #[arg(long)]
        cases: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Simulate runs entirely in memory, no database needed.
    if let Commands::Simulate {
        csv,
        location,
        disease,
        cases,
    } = &cli.command
    {
        return simulate(csv, location, disease, *cases).await;
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);

    match cli.command {
        Commands::Simulate { .. } => unreachable!("handled above"),
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = store::seed(&store).await?;
            println!("Inserted {inserted} seed records.");
        }
        Commands::Import { csv } => {
            let summary = ingest::import_csv(&store, &csv).await?;
            println!(
                "Inserted {} records ({} duplicates skipped) from {}.",
                summary.inserted,
                summary.skipped,
                csv.display()
            );
            for alert in summary.alerts.iter() {
                println!("- [{}] {}", alert.severity, alert.message);
            }
        }
        Commands::Check {
            location,
            disease,
            cases,
            json,
        } => {
            let detection = alerting::classify(&store, &location, &disease, cases, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detection)?);
            } else {
                println!("{}", detection.message);
                println!(
                    "severity: {} (spike: {})",
                    detection.severity, detection.is_spike
                );
            }
        }
        Commands::Alerts { status } => {
            let status: Option<AlertStatus> =
                status.as_deref().map(str::parse).transpose()?;
            let alerts = store.list_alerts(status).await?;

            if alerts.is_empty() {
                println!("No alerts found.");
                return Ok(());
            }

            for alert in alerts.iter() {
                println!(
                    "- {} [{}] {} / {} on {}: {} cases (expected {}), {}",
                    alert.id,
                    alert.severity,
                    alert.location,
                    alert.disease,
                    alert.detected_at,
                    alert.cases_detected,
                    alert.expected_cases,
                    alert.status
                );
            }
        }
        Commands::Ack { id } => {
            update_status(&store, id, AlertStatus::Acknowledged).await?;
        }
        Commands::Resolve { id } => {
            update_status(&store, id, AlertStatus::Resolved).await?;
        }
        Commands::Report {
            location,
            disease,
            since_days,
            out,
        } => {
            let cutoff = Utc::now().date_naive() - Duration::days(since_days.max(1));
            let records = store
                .records_since(cutoff, location.as_deref(), disease.as_deref())
                .await?;
            let alerts = store.list_alerts(Some(AlertStatus::Active)).await?;
            let scope = location.as_deref().or(disease.as_deref());
            let report = report::build_report(scope, cutoff, &records, &alerts);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn update_status(store: &PgStore, id: Uuid, status: AlertStatus) -> anyhow::Result<()> {
    match store.update_alert_status(id, status).await? {
        Some(alert) => println!("Alert {} is now {}.", alert.id, alert.status),
        None => println!("No alert found with id {id}."),
    }
    Ok(())
}

async fn simulate(
    csv: &Path,
    location: &str,
    disease: &str,
    cases: i64,
) -> anyhow::Result<()> {
    let store = MemStore::new();
    for row in ingest::read_rows(csv)? {
        store.insert_record(row).await?;
    }

    let detection = alerting::classify(&store, location, disease, cases, None).await?;
    println!("{}", detection.message);
    println!(
        "severity: {} (spike: {})",
        detection.severity, detection.is_spike
    );
    Ok(())
}
