use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use dining_concierge::config;
use dining_concierge::db;
use dining_concierge::mailer::HttpMailer;
use dining_concierge::worker;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let mailer = HttpMailer::new(
        &cfg.email.base_url,
        cfg.email.api_key.clone(),
        cfg.email.sender.clone(),
    )?;
    let opts = cfg.worker_options();
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

    info!("starting fulfillment worker");
    loop {
        match worker::process_batch(&pool, &mailer, &opts).await {
            Ok(report) => {
                if report.total() == 0 {
                    tokio::time::sleep(poll_sleep).await;
                } else {
                    info!(?report, "processed batch");
                }
            }
            Err(err) => {
                error!(?err, "fulfillment worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
