use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use voltra_domain::CountryCodes;

/// Service configuration loaded from environment variables with the
/// `VOLTRA_` prefix (e.g. `VOLTRA_BROKER_URL`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level filter (e.g. "info", "debug", "voltra=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// MQTT broker URL
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    /// Topic the devices publish telemetry readings to
    #[serde(default = "default_telemetry_topic")]
    pub telemetry_topic: String,

    /// Prefix for the MQTT client identifier
    #[serde(default = "default_mqtt_client_id_prefix")]
    pub mqtt_client_id_prefix: String,

    /// Delay between broker reconnection attempts in seconds
    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Subscription retries after a broker rejection before giving up
    #[serde(default = "default_mqtt_subscription_retries")]
    pub mqtt_subscription_retries: u32,

    /// InfluxDB base URL
    #[serde(default = "default_influx_url")]
    pub influx_url: String,

    /// InfluxDB database name
    #[serde(default = "default_influx_database")]
    pub influx_database: String,

    /// Base URL of the energy ledger relay
    #[serde(default = "default_ledger_relay_url")]
    pub ledger_relay_url: String,

    /// Interval between receipt polls in seconds
    #[serde(default = "default_ledger_poll_interval_secs")]
    pub ledger_poll_interval_secs: u64,

    /// How long to wait for a submission to confirm in seconds
    #[serde(default = "default_ledger_confirmation_timeout_secs")]
    pub ledger_confirmation_timeout_secs: u64,

    /// Period of the scheduled ledger submission cycle in seconds
    #[serde(default = "default_submission_period_secs")]
    pub submission_period_secs: u64,

    /// Supported country table as `CODE=prefix` pairs (e.g. "NG=234,KE=254")
    #[serde(default = "default_country_codes")]
    pub country_codes: String,

    /// HTTP API bind host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP API bind port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// OpenTelemetry OTLP endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Whether to export traces and logs over OTLP
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name reported to OpenTelemetry
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

// Logging
fn default_log_level() -> String {
    "info".to_string()
}

// MQTT
fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_telemetry_topic() -> String {
    "esp32s3/data".to_string()
}

fn default_mqtt_client_id_prefix() -> String {
    "voltra".to_string()
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_subscription_retries() -> u32 {
    3
}

// InfluxDB
fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_influx_database() -> String {
    "solar_mini_grid".to_string()
}

// Ledger
fn default_ledger_relay_url() -> String {
    "http://localhost:9545".to_string()
}

fn default_ledger_poll_interval_secs() -> u64 {
    2
}

fn default_ledger_confirmation_timeout_secs() -> u64 {
    120
}

fn default_submission_period_secs() -> u64 {
    30
}

fn default_country_codes() -> String {
    CountryCodes::DEFAULT_SPEC.to_string()
}

// HTTP API
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

// OpenTelemetry
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    true
}

fn default_otel_service_name() -> String {
    "voltra".to_string()
}

impl ServiceConfig {
    /// Load configuration from environment variables with the `VOLTRA_` prefix
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("VOLTRA"))
            .build()?;

        config.try_deserialize()
    }

    pub fn mqtt_retry_delay(&self) -> Duration {
        Duration::from_secs(self.mqtt_retry_delay_secs)
    }

    pub fn ledger_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ledger_poll_interval_secs)
    }

    pub fn ledger_confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_confirmation_timeout_secs)
    }

    pub fn submission_period(&self) -> Duration {
        Duration::from_secs(self.submission_period_secs)
    }

    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::remove_var("VOLTRA_LOG_LEVEL");
        std::env::remove_var("VOLTRA_HTTP_PORT");

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.broker_url, "mqtt://localhost:1883");
        assert_eq!(config.telemetry_topic, "esp32s3/data");
        assert_eq!(config.influx_database, "solar_mini_grid");
        assert_eq!(config.submission_period_secs, 30);
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
        assert!(config.otel_enabled);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::set_var("VOLTRA_LOG_LEVEL", "debug");
        std::env::set_var("VOLTRA_HTTP_PORT", "8080");
        std::env::set_var("VOLTRA_SUBMISSION_PERIOD_SECS", "10");

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.submission_period(), Duration::from_secs(10));

        std::env::remove_var("VOLTRA_LOG_LEVEL");
        std::env::remove_var("VOLTRA_HTTP_PORT");
        std::env::remove_var("VOLTRA_SUBMISSION_PERIOD_SECS");
    }
}
