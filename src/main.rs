use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use bi_kpis::config::{DbConfig, ServerConfig};
use bi_kpis::service::{Metric, QueryService};
use bi_kpis::{db, report, schema, server};

#[derive(Parser)]
#[command(name = "bi-kpis")]
#[command(about = "Appointment analytics and KPIs for clinical records", long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbConfig,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the GraphQL API and health check
    Serve {
        #[command(flatten)]
        server: ServerConfig,
    },
    /// Check connectivity and report the tables the metrics read
    CheckDb,
    /// Evaluate metrics once and print a report
    Snapshot {
        /// Field names to evaluate (default: all); `citasSerie:week` selects weekly buckets
        #[arg(long = "metric")]
        metrics: Vec<Metric>,
        /// Reference date for date-relative KPIs (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bi_kpis=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(
        host = %cli.db.host,
        port = cli.db.port,
        database = %cli.db.name,
        "using analytics database"
    );
    let pool = db::connect_pool(&cli.db);

    match cli.command {
        Commands::Serve { server } => {
            let schema = schema::build_schema(QueryService::new(pool));
            server::serve(&server, schema).await?;
        }
        Commands::CheckDb => {
            let diagnostics = db::diagnose(&pool)
                .await
                .context("failed to connect to Postgres; check the DB_* settings")?;

            println!("Connected: {}", diagnostics.server_version);
            if diagnostics.tables.is_empty() {
                println!("No tables found in schema public.");
            } else {
                println!("Tables ({}):", diagnostics.tables.len());
                for table in &diagnostics.tables {
                    println!("- {table}");
                }
            }

            println!("Row counts:");
            for count in &diagnostics.counts {
                match count.rows {
                    Some(rows) => println!("- {}: {}", count.table, rows),
                    None => println!("- {}: table missing", count.table),
                }
            }

            if diagnostics.appointments().unwrap_or(0) == 0 {
                println!("No appointments yet; every series will be empty.");
            }
        }
        Commands::Snapshot {
            metrics,
            as_of,
            format,
            out,
        } => {
            let mut service = QueryService::new(pool);
            if let Some(date) = as_of {
                service = service.with_today(date);
            }
            let as_of = service.today();

            let selected = if metrics.is_empty() {
                Metric::ALL.to_vec()
            } else {
                metrics
            };

            let mut results = Vec::with_capacity(selected.len());
            for metric in selected {
                let value = service
                    .evaluate(metric)
                    .await
                    .with_context(|| format!("failed to evaluate {metric}"))?;
                results.push((metric, value));
            }

            let rendered = match format {
                Format::Markdown => report::build_report(as_of, &results),
                Format::Json => {
                    let body: serde_json::Map<String, serde_json::Value> = results
                        .iter()
                        .map(|(metric, value)| {
                            Ok((metric.to_string(), serde_json::to_value(value)?))
                        })
                        .collect::<anyhow::Result<_>>()?;
                    serde_json::to_string_pretty(&body)?
                }
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Snapshot written to {}.", path.display());
                }
                None => println!("{rendered}"),
            }
        }
    }

    Ok(())
}
