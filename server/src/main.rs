#![allow(dead_code)]

mod answer;
mod bot;
mod embed;
mod error;
mod index;
mod ingest;
mod mail;
mod prompt;
mod server_config;
mod state;
mod tasks;
mod testing;

use std::env;

use mimalloc::MiMalloc;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::server_config::cfg;
use crate::state::ServerState;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    // check config
    println!("{}", *cfg);

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let state = ServerState::new(http_client);

    // Load the index pair from the previous run. A half-present or drifted
    // pair is fatal here.
    state.reload_index().await?;
    if state.index.read().await.is_none() {
        tracing::info!("No index pair on disk, running initial ingest");
        let outcome = tasks::run_refresh(&state).await?;
        tracing::info!("Initial ingest: {}", outcome);
    }

    let mut scheduler = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");

    {
        let state_clone = state.clone();
        scheduler
            .add(Job::new_async(
                cfg.summary.cron_expr(),
                move |uuid, mut l| {
                    let state = state_clone.clone();
                    Box::pin(async move {
                        tracing::info!("Running daily summary job {}", uuid);
                        match tasks::run_daily_summary(&state).await {
                            Ok(_) => {
                                tracing::info!("Daily summary job {} succeeded", uuid);
                            }
                            Err(e) => {
                                tracing::error!("Failed to run daily summary: {:?}", e);
                            }
                        }

                        let next_tick = l.next_tick_for_job(uuid).await;
                        if let Ok(Some(ts)) = next_tick {
                            tracing::info!("Next time for daily summary job is {:?}", ts)
                        }
                    })
                },
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    println!("Starting scheduler...");
    match scheduler.start().await {
        Ok(_) => {
            println!("-------- SCHEDULER STARTED --------");
        }
        Err(e) => {
            println!("Failed to start scheduler: {:?}", e);
        }
    }

    let bot_handle = tokio::spawn(bot::run(state.clone()));

    tokio::select! {
        _ = bot_handle => {
            tracing::info!("Bot loop ended, exiting");
        }
        _ = shutdown_signal(scheduler) => {}
    }

    Ok(())
}

async fn shutdown_signal(mut scheduler: JobScheduler) {
    if env::var("NO_SHUTDOWN").unwrap_or("false".to_string()) == "true" {
        std::future::pending::<()>().await;
    }

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            scheduler.shutdown().await.unwrap();
            println!("Cleanups done, shutting down");
            std::process::exit(0);

        },
        _ = terminate => {
            scheduler.shutdown().await.unwrap();
            println!("Cleanups done, shutting down");
            std::process::exit(0);
        },
    }
}
