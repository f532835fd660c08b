//! Courier - post-download media orchestrator
//!
//! Picks up grabbed-download job markers, waits for the files to land in cloud
//! storage, copies them into the series library and refreshes Sonarr and Plex.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::app_mode::RunMode;
use courier::cli::CliOptions;
use courier::config::{Config, LoopFlag};
use courier::jobs::orchestrator::OrchestratorSettings;
use courier::jobs::{FailedDownloadsHandler, Handler, JobFileManager, JobsState, Orchestrator};
use courier::services::{
    Collaborators, CopyService, MountedStorage, PlexClient, SeasonNaming, SeriesRefresher,
    SonarrClient, TokioClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(config.log_json);
    tracing::info!("Starting Courier");

    let cli = CliOptions::from_args();
    let run_mode = cli.run_mode_override.unwrap_or_else(RunMode::from_env);
    tracing::info!(run_mode = ?run_mode, "Configuration loaded");

    let clock = TokioClock::default();
    let interrupt = clock.interrupt_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping waits");
            interrupt.cancel();
        }
    });

    let services = build_services(&config, Arc::new(clock))?;

    match run_mode {
        RunMode::Grabbed => {
            let settings = OrchestratorSettings {
                job_file_pattern: config.job_file_pattern.clone(),
                round_interval: Config::ROUND_INTERVAL,
                dispatch_stagger: Config::DISPATCH_STAGGER,
                handler: config.handler_settings(),
                keep_running: LoopFlag::FromEnv,
            };
            let orchestrator = Orchestrator::new(
                JobFileManager::new(&config.jobs_dir),
                Arc::new(JobsState::new()),
                services,
                settings,
            );
            orchestrator
                .handle()
                .await
                .context("Grabbed downloads handler stopped")?;
        }
        RunMode::Failed => {
            FailedDownloadsHandler::new(services)
                .handle()
                .await
                .context("Failed downloads handler stopped")?;
        }
    }

    tracing::info!("Courier finished");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_services(config: &Config, clock: Arc<TokioClock>) -> anyhow::Result<Collaborators> {
    let sonarr = Arc::new(SonarrClient::new(
        config.sonarr_url.clone(),
        config.sonarr_api_key.clone(),
    ));
    let plex = Arc::new(PlexClient::new(
        config.plex_url.clone(),
        config.plex_token.clone(),
        config.plex_section_id,
    ));
    let copier = CopyService::new(
        Arc::new(MountedStorage::new()),
        config.cloud_downloads_dir.clone(),
        config.cloud_series_dir.clone(),
    );
    let refresher = SeriesRefresher::new(
        sonarr.clone(),
        plex,
        config.plex_path_from.clone(),
        config.plex_path_to.clone(),
    );
    let naming = SeasonNaming::new(config.season_folder_label.clone())
        .context("Invalid season folder naming")?;

    Ok(Collaborators {
        download_client: sonarr,
        copier: Arc::new(copier),
        refresher: Arc::new(refresher),
        naming: Arc::new(naming),
        clock,
    })
}
