use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use envconfig::Envconfig;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use telemetry_transfer::cache::{LruSessionCache, SessionCache, TtlSessionCache};
use telemetry_transfer::config::Config;
use telemetry_transfer::driver::{Pipeline, PipelineSettings};
use telemetry_transfer::enrich::Enricher;
use telemetry_transfer::metrics_server::{router, serve, setup_metrics_recorder};
use telemetry_transfer::sinks::{BulkSink, EventSink, PrintSink};
use telemetry_transfer::stats::PipelineStats;
use telemetry_transfer::stream::StreamClient;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

async fn wait_for_signal() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
    Ok(())
}

fn session_cache(config: &Config) -> Arc<dyn SessionCache> {
    match config.session_cache_ttl_seconds {
        Some(ttl) => Arc::new(TtlSessionCache::new(
            config.session_cache_size,
            Duration::from_secs(ttl),
        )),
        None => Arc::new(LruSessionCache::new(config.session_cache_size)),
    }
}

fn event_sink(config: &Config) -> Result<Arc<dyn EventSink>, Error> {
    if config.print_sink {
        return Ok(Arc::new(PrintSink {}));
    }

    let sink = BulkSink::new(
        &config.opensearch_uri,
        config.core_index.as_str(),
        config.heartbeat_index.as_str(),
        config.request_timeout.0,
    )?;
    Ok(Arc::new(sink))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().context("failed to load configuration from env")?;
    config.validate()?;

    let stats = Arc::new(PipelineStats::new());
    let enricher = Arc::new(Enricher::default_pipeline());
    info!(processors = ?enricher.processor_names(), "enrichment pipeline ready");

    let stream = StreamClient::new(
        &config.dispatch_uri,
        config.connect_timeout.0,
        config.retry_policy(),
        enricher,
        stats.clone(),
    )?;

    let pipeline = Arc::new(Pipeline::new(
        stream,
        session_cache(&config),
        event_sink(&config)?,
        stats,
        PipelineSettings::from(&config),
    ));

    let recorder = setup_metrics_recorder()?;
    let bind = config.bind();
    let health = router(pipeline.subscribe(), Some(recorder));
    tokio::spawn(async move {
        if let Err(error) = serve(health, &bind).await {
            error!(%error, %bind, "failed to serve health and metrics");
        }
    });

    {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(error) = wait_for_signal().await {
                error!(%error, "failed to register signal handlers");
                return;
            }
            if let Err(error) = pipeline.shutdown().await {
                error!(%error, "pipeline did not stop cleanly");
            }
        });
    }

    info!(
        dispatch_uri = %config.dispatch_uri,
        opensearch_uri = %config.opensearch_uri,
        batch_size = config.batch_size,
        "consuming events"
    );

    let snapshot = pipeline.run().await?;
    info!(?snapshot, "pipeline stopped");

    Ok(())
}
