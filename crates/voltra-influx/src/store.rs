use crate::line_protocol::{field_value, FieldValue, LineProtocolWriter};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use voltra_domain::{DomainError, DomainResult, MeasurementPoint, RangeQuery, TimeSeriesStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub database: String,
}

/// Time-series store backed by the InfluxDB HTTP API.
///
/// Points are written in Line Protocol with millisecond precision; range
/// queries are issued as InfluxQL and returned as raw JSON.
pub struct InfluxStore {
    http: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxStore {
    pub fn new(config: InfluxConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Create the configured database if it does not exist yet.
    ///
    /// `CREATE DATABASE` is idempotent, so this is safe to call on every
    /// startup.
    pub async fn ensure_database(&self) -> DomainResult<()> {
        let statement = format!(
            "CREATE DATABASE \"{}\"",
            escape_identifier(&self.config.database)
        );

        let response = self
            .http
            .post(format!("{}/query", self.base_url()))
            .timeout(REQUEST_TIMEOUT)
            .query(&[("q", statement.as_str())])
            .send()
            .await
            .context("influx database creation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::StorageError(anyhow::anyhow!(
                "influx database creation rejected: {} {}",
                status,
                body
            )));
        }

        info!(database = %self.config.database, "ensured influx database exists");
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write_points(&self, points: Vec<MeasurementPoint>) -> DomainResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let body = encode_points(&points);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(format!("{}/write", self.base_url()))
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("db", self.config.database.as_str()),
                ("precision", "ms"),
            ])
            .body(body)
            .send()
            .await
            .context("influx write request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::StorageError(anyhow::anyhow!(
                "influx write rejected: {} {}",
                status,
                body
            )));
        }

        debug!(point_count = points.len(), "wrote points to influx");
        Ok(())
    }

    async fn query_range(&self, query: RangeQuery) -> DomainResult<Value> {
        let statement = format!(
            "SELECT * FROM \"{}\" WHERE device_id = '{}' AND time > now() - {}",
            escape_identifier(&query.measurement),
            escape_string_literal(&query.device_id),
            query.range
        );

        let response = self
            .http
            .get(format!("{}/query", self.base_url()))
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("db", self.config.database.as_str()),
                ("q", statement.as_str()),
            ])
            .send()
            .await
            .context("influx query request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::StorageError(anyhow::anyhow!(
                "influx query rejected: {} {}",
                status,
                body
            )));
        }

        let results = response
            .json::<Value>()
            .await
            .context("influx query response was not valid JSON")?;

        debug!(
            measurement = %query.measurement,
            device_id = %query.device_id,
            "queried influx range"
        );
        Ok(results)
    }
}

/// Encode points as newline-separated Line Protocol.
///
/// Points whose fields all map to non-scalar values are skipped rather
/// than producing an invalid line.
fn encode_points(points: &[MeasurementPoint]) -> String {
    let mut writer = LineProtocolWriter::new();

    for point in points {
        let fields: Vec<(&str, FieldValue)> = point
            .fields
            .iter()
            .filter_map(|(key, value)| field_value(value).map(|fv| (key.as_str(), fv)))
            .collect();
        if fields.is_empty() {
            continue;
        }

        writer.write_point(
            &point.measurement,
            &[
                ("device_id", point.device_id.as_str()),
                ("country_code", point.country_code.as_str()),
            ],
            &fields,
            point.timestamp.timestamp_millis(),
        );
    }

    writer.flush().join("\n")
}

fn escape_identifier(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn escape_string_literal(s: &str) -> String {
    s.replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn point(measurement: &str, field: &str, value: Value) -> MeasurementPoint {
        let mut fields = serde_json::Map::new();
        fields.insert(field.to_string(), value);
        MeasurementPoint {
            measurement: measurement.to_string(),
            device_id: "dev1".to_string(),
            country_code: "KE".to_string(),
            fields,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[derive(Default)]
    struct Captured {
        write: Mutex<Option<(HashMap<String, String>, String)>>,
        query: Mutex<Option<HashMap<String, String>>>,
    }

    async fn capture_write(
        State(captured): State<Arc<Captured>>,
        Query(params): Query<HashMap<String, String>>,
        body: String,
    ) -> StatusCode {
        *captured.write.lock().unwrap() = Some((params, body));
        StatusCode::NO_CONTENT
    }

    async fn capture_query(
        State(captured): State<Arc<Captured>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        *captured.query.lock().unwrap() = Some(params);
        Json(serde_json::json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "power",
                    "columns": ["time", "power_produced"],
                    "values": [["2026-01-01T00:00:00Z", 8.8]]
                }]
            }]
        }))
    }

    async fn spawn_influx_stub(captured: Arc<Captured>) -> String {
        let app = Router::new()
            .route("/write", post(capture_write))
            .route("/query", get(capture_query).post(capture_query))
            .with_state(captured);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_encode_points_line_format() {
        let encoded = encode_points(&[point("power", "power_produced", serde_json::json!(8.8))]);
        assert_eq!(
            encoded,
            "power,country_code=KE,device_id=dev1 power_produced=8.8 1700000000000"
        );
    }

    #[test]
    fn test_encode_points_joins_lines() {
        let encoded = encode_points(&[
            point("power", "power_produced", serde_json::json!(8.8)),
            point("ldr", "intensity", serde_json::json!("bright")),
        ]);
        let lines: Vec<&str> = encoded.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "ldr,country_code=KE,device_id=dev1 intensity=\"bright\" 1700000000000"
        );
    }

    #[test]
    fn test_encode_points_skips_points_without_scalar_fields() {
        let encoded = encode_points(&[point("power", "power_produced", Value::Null)]);
        assert_eq!(encoded, "");
    }

    #[tokio::test]
    async fn test_write_points_sends_line_protocol() {
        let captured = Arc::new(Captured::default());
        let url = spawn_influx_stub(captured.clone()).await;

        let store = InfluxStore::new(InfluxConfig {
            url,
            database: "solar_mini_grid".to_string(),
        });

        store
            .write_points(vec![point("power", "power_produced", serde_json::json!(8.8))])
            .await
            .unwrap();

        let (params, body) = captured.write.lock().unwrap().clone().unwrap();
        assert_eq!(params.get("db").map(String::as_str), Some("solar_mini_grid"));
        assert_eq!(params.get("precision").map(String::as_str), Some("ms"));
        assert_eq!(
            body,
            "power,country_code=KE,device_id=dev1 power_produced=8.8 1700000000000"
        );
    }

    #[tokio::test]
    async fn test_write_points_empty_is_noop() {
        // Unroutable URL; an empty batch must not touch the network
        let store = InfluxStore::new(InfluxConfig {
            url: "http://127.0.0.1:1".to_string(),
            database: "solar_mini_grid".to_string(),
        });

        store.write_points(vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_rejection_is_storage_error() {
        let app = Router::new().route(
            "/write",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = InfluxStore::new(InfluxConfig {
            url: format!("http://{}", addr),
            database: "solar_mini_grid".to_string(),
        });

        let result = store
            .write_points(vec![point("power", "power_produced", serde_json::json!(8.8))])
            .await;
        assert!(matches!(result, Err(DomainError::StorageError(_))));
    }

    #[tokio::test]
    async fn test_query_range_builds_influxql() {
        let captured = Arc::new(Captured::default());
        let url = spawn_influx_stub(captured.clone()).await;

        let store = InfluxStore::new(InfluxConfig {
            url,
            database: "solar_mini_grid".to_string(),
        });

        let results = store
            .query_range(RangeQuery {
                measurement: "power".to_string(),
                device_id: "dev1".to_string(),
                range: Default::default(),
            })
            .await
            .unwrap();

        let params = captured.query.lock().unwrap().clone().unwrap();
        assert_eq!(
            params.get("q").map(String::as_str),
            Some("SELECT * FROM \"power\" WHERE device_id = 'dev1' AND time > now() - 24h")
        );
        assert_eq!(params.get("db").map(String::as_str), Some("solar_mini_grid"));
        assert_eq!(results["results"][0]["series"][0]["name"], "power");
    }

    #[tokio::test]
    async fn test_ensure_database_issues_create() {
        let captured = Arc::new(Captured::default());
        let url = spawn_influx_stub(captured.clone()).await;

        let store = InfluxStore::new(InfluxConfig {
            url,
            database: "solar_mini_grid".to_string(),
        });

        store.ensure_database().await.unwrap();

        let params = captured.query.lock().unwrap().clone().unwrap();
        assert_eq!(
            params.get("q").map(String::as_str),
            Some("CREATE DATABASE \"solar_mini_grid\"")
        );
    }
}
