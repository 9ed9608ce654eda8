use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod db;
mod dedup;
mod models;
mod reconcile;
mod report;
mod server;

#[derive(Parser)]
#[command(name = "challenge-progress-reconciler")]
#[command(about = "Reconciles fitness challenge progress from wearable data", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo client with multi-device samples
    Seed,
    /// Import health samples from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute verified progress for one client's active challenges
    Reconcile {
        #[arg(long)]
        client_id: Uuid,
        /// Also write a markdown summary of the run
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the leaderboard for a challenge
    Leaderboard {
        #[arg(long)]
        challenge_id: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Serve the reconcile endpoint over HTTP
    Serve {
        #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted for client {}.", db::SEED_CLIENT_ID);
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} samples from {}.", csv.display());
        }
        Commands::Reconcile { client_id, out } => {
            let store = db::PgStore::new(pool);
            let run = reconcile::reconcile_client(&store, client_id).await?;
            println!("{}", serde_json::to_string_pretty(&run.response())?);

            if let Some(out) = out {
                std::fs::write(&out, report::build_run_report(client_id, &run))
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!(path = %out.display(), "run summary written");
            }
        }
        Commands::Leaderboard {
            challenge_id,
            limit,
        } => {
            let (challenge, entries) = db::fetch_leaderboard(&pool, challenge_id, limit).await?;
            print!("{}", report::build_leaderboard(&challenge, &entries));
        }
        Commands::Serve { listen } => {
            let store: server::SharedStore = Arc::new(db::PgStore::new(pool));
            server::serve(listen, store).await?;
        }
    }

    Ok(())
}
