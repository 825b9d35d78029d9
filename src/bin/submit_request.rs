use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use dining_concierge::config;
use dining_concierge::db;
use dining_concierge::model::DINING_SUGGESTIONS_INTENT;

/// Enqueue a dining recommendation request, standing in for the
/// conversational front-end at the queue boundary.
#[derive(Debug, Parser)]
#[command(author, version, about = "Enqueue a dining recommendation request")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Cuisine preference, e.g. "italian"
    #[arg(long)]
    cuisine: String,

    /// Recipient email address
    #[arg(long)]
    email: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/concierge.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let body = json!({
        "intentName": DINING_SUGGESTIONS_INTENT,
        "slots": {
            "cuisine": args.cuisine,
            "email": args.email,
        },
    })
    .to_string();

    let request_id = db::enqueue_request(&pool, &body).await?;
    info!(%request_id, cuisine = %args.cuisine, "request enqueued");
    Ok(())
}
