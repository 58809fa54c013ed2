mod config;
mod telemetry;

use config::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use tracing::{debug, error, info};
use voltra_api::TelemetryApi;
use voltra_domain::{
    CountryCodes, InMemoryReadingCache, LedgerSink, PowerLedgerSubmitter, ReadingCache,
    ReadingHandler, ReadingIngestService, SubmissionScheduler, TimeSeriesStore,
};
use voltra_influx::{InfluxConfig, InfluxStore};
use voltra_ledger::{HttpLedgerClient, RelayConfig};
use voltra_mqtt::{BrokerSession, BrokerSessionConfig};
use voltra_runner::Runner;

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting voltra service"
    );
    debug!("Configuration: {:?}", config);

    // Initialize shared dependencies
    let (countries, influx) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize domain services
    let cache: Arc<dyn ReadingCache> = Arc::new(InMemoryReadingCache::new());
    let store: Arc<dyn TimeSeriesStore> = influx;

    let ledger_client = Arc::new(HttpLedgerClient::new(RelayConfig {
        base_url: config.ledger_relay_url.clone(),
        poll_interval: config.ledger_poll_interval(),
        confirmation_timeout: config.ledger_confirmation_timeout(),
    }));
    let ledger: Arc<dyn LedgerSink> =
        Arc::new(PowerLedgerSubmitter::new(ledger_client, countries));

    let ingest: Arc<dyn ReadingHandler> = Arc::new(ReadingIngestService::new(
        cache.clone(),
        store.clone(),
        ledger.clone(),
    ));

    // Initialize application modules
    let broker_session = BrokerSession::new(
        BrokerSessionConfig {
            broker_url: config.broker_url.clone(),
            topic: config.telemetry_topic.clone(),
            client_id_prefix: config.mqtt_client_id_prefix.clone(),
            retry_delay: config.mqtt_retry_delay(),
            subscription_retry_limit: config.mqtt_subscription_retries,
        },
        ingest,
    );

    let scheduler = SubmissionScheduler::new(cache.clone(), ledger, config.submission_period());

    let api = TelemetryApi::new(config.http_bind_addr(), cache, store);

    // Build runner with all processes
    let mut runner = Runner::new();

    // Add broker session process (device telemetry intake over MQTT)
    runner = runner.with_named_process("broker_session", broker_session.into_runner_process());

    // Add submission scheduler process (periodic ledger submission of cached readings)
    runner = runner.with_named_process("submission_scheduler", scheduler.into_runner_process());

    // Add telemetry API process (HTTP read access to cached and historical readings)
    runner = runner.with_named_process("telemetry_api", api.into_runner_process());

    // Add cleanup handlers
    runner = runner
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");

                // Shutdown telemetry and flush pending traces and logs
                shutdown_telemetry(telemetry_providers);

                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    // Run the service
    runner.run().await;
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(CountryCodes, Arc<InfluxStore>)> {
    // Country table used for ledger submissions
    let countries = CountryCodes::from_spec(&config.country_codes)?;

    // InfluxDB initialization
    info!("Initializing InfluxDB...");
    let influx = Arc::new(InfluxStore::new(InfluxConfig {
        url: config.influx_url.clone(),
        database: config.influx_database.clone(),
    }));
    influx.ensure_database().await?;

    Ok((countries, influx))
}
