use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::Config;
use http::AppState;
use sampler::SamplerConfig;
use sensor::Sensor;
use store::{LogFiles, ReadingStore};

mod config;
mod http;
mod reading;
mod sampler;
mod sensor;
mod store;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::parse();

    TermLogger::init(
        config.log_level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run(config).await {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run(config: Config) -> Result<(), anyhow::Error> {
    let sensor = Sensor::new(config.sensor_command.clone(), config.sensor_args.clone());
    let files = LogFiles::new(config.data_dir.clone(), config.rotation);

    let store = ReadingStore::load(files.clone()).context("Failed to load readings")?;
    match store.log().last() {
        Some(last) => log::info!(
            "Loaded {} readings from {}, last taken {}",
            store.log().len(),
            files.current_path().display(),
            last.time
        ),
        None => log::info!("Starting new log in {}", files.current_path().display()),
    }

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    let (status_tx, status_rx) = sampler::status_channel();
    let shutdown = CancellationToken::new();

    let sampler_config = SamplerConfig {
        interval: config.interval(),
        retry_times: config.retry_times,
        retry_delay: config.retry_delay(),
        max_failed_ticks: config.max_failed_ticks,
    };
    let sampling = tokio::spawn(sampler::sampling_loop(
        sensor.clone(),
        store,
        sampler_config,
        status_tx,
        shutdown.child_token(),
    ));

    let state = Arc::new(AppState {
        sensor,
        files,
        status: status_rx,
        redirect_url: config.redirect_url.clone(),
    });

    log::info!(
        "Measuring every {:?} with {}, listening on {}",
        config.interval(),
        state.sensor.program(),
        config.listen
    );
    let server = tokio::spawn(http::serve(listener, state, shutdown.child_token()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C signal")?;

    log::info!("Shutting down");
    shutdown.cancel();

    sampling.await.context("Sampling task panicked")?;
    server
        .await
        .context("HTTP task panicked")?
        .context("HTTP server failed")?;

    Ok(())
}
