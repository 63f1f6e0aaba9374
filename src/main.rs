use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod clock;
mod config;
mod db;
mod error;
mod model;
mod nhl;
mod scheduler;
mod service;
mod validation;

use api::AppState;
use config::Config;
use db::Database;
use model::ModelRegistry;
use nhl::{NhlClient, RosterFetcher, StatsSource};
use scheduler::Scheduler;
use service::PredictionService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let client = Arc::new(NhlClient::new(
        &config.nhl_api_url,
        &config.nhl_stats_url,
        config.http_timeout(),
    )?);
    let source: Arc<dyn StatsSource> = client.clone();
    let fetcher = RosterFetcher::new(source.clone(), &config.fetch_options());
    info!(
        "Roster fetcher: policy {:?}, {} concurrent requests",
        fetcher.policy(),
        config.max_concurrent_fetches
    );

    let registry = ModelRegistry::new(config.active_model_version);
    let service = PredictionService::new(source, fetcher, registry, db);

    // One-shot mode: predict, store, exit
    if let Some(date) = config.predict_date {
        let summary = service.run_and_store_all_models(date).await?;
        info!(
            "Stored {} predictions for {} games on {} ({} upstream requests)",
            summary.predictions_stored,
            summary.games,
            date,
            client.request_count()
        );
        return Ok(());
    }

    let schedule = config.schedule()?;
    let mut scheduler = Scheduler::new(service.clone(), schedule.clone());
    if config.disable_scheduler {
        warn!("Scheduler disabled; serving the API only");
    } else {
        scheduler.start();
    }

    let app = api::router(AppState {
        service,
        league_tz: schedule.league_tz,
    });
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        })
        .await?;

    scheduler.stop().await;
    info!("Upstream requests this session: {}", client.request_count());

    Ok(())
}
