use crate::cache::ReadingCache;
use crate::error::DomainResult;
use crate::ledger::LedgerSink;
use crate::reading::decode_reading;
use crate::store::{points_for_reading, TimeSeriesStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Entry point for raw telemetry payloads delivered by the broker session.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingHandler: Send + Sync {
    async fn handle_reading(&self, payload: &[u8]) -> DomainResult<()>;
}

/// Ingestion pipeline for telemetry readings.
///
/// Decodes the payload, refreshes the latest-value cache, then fans out to
/// the time-series store and the energy ledger. Sink failures are isolated:
/// a failed store write never blocks the ledger submission and vice versa.
pub struct ReadingIngestService {
    cache: Arc<dyn ReadingCache>,
    store: Arc<dyn TimeSeriesStore>,
    ledger: Arc<dyn LedgerSink>,
}

impl ReadingIngestService {
    pub fn new(
        cache: Arc<dyn ReadingCache>,
        store: Arc<dyn TimeSeriesStore>,
        ledger: Arc<dyn LedgerSink>,
    ) -> Self {
        Self {
            cache,
            store,
            ledger,
        }
    }
}

#[async_trait]
impl ReadingHandler for ReadingIngestService {
    async fn handle_reading(&self, payload: &[u8]) -> DomainResult<()> {
        // 1. Decode and validate the payload
        let reading = decode_reading(payload)?;

        debug!(
            device_id = %reading.device_id,
            country_code = %reading.country_code,
            group_count = reading.groups.len(),
            payload_size = payload.len(),
            "Decoded telemetry reading"
        );

        // 2. Refresh the latest-value cache
        self.cache.put(reading.clone()).await?;

        // 3. Fan out to the time-series store
        if let Err(e) = self.store.write_points(points_for_reading(&reading)).await {
            error!(
                device_id = %reading.device_id,
                error = %e,
                "Failed to write reading to time-series store"
            );
        }

        // 4. Fan out to the energy ledger
        if reading.power_produced().is_some() {
            if let Err(e) = self.ledger.submit_reading(&reading).await {
                error!(
                    device_id = %reading.device_id,
                    error = %e,
                    "Failed to submit reading to energy ledger"
                );
            }
        } else {
            debug!(
                device_id = %reading.device_id,
                "Reading has no power production figure, skipping ledger"
            );
        }

        info!(device_id = %reading.device_id, "Processed telemetry reading");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockReadingCache;
    use crate::error::DomainError;
    use crate::ledger::{LedgerReceipt, MockLedgerSink};
    use crate::reading::Reading;
    use crate::store::MockTimeSeriesStore;
    use anyhow::anyhow;

    fn payload() -> Vec<u8> {
        serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "power": { "power_produced": 8.8 },
            "temperature": { "sensor1": 30.5 },
        })
        .to_string()
        .into_bytes()
    }

    fn receipt() -> LedgerReceipt {
        LedgerReceipt {
            tx_hash: "0xfeed".to_string(),
            block_number: 7,
        }
    }

    #[tokio::test]
    async fn test_handle_reading_success() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache
            .expect_put()
            .withf(|reading: &Reading| reading.device_id == "dev1")
            .times(1)
            .return_once(|_| Ok(()));

        let mut mock_store = MockTimeSeriesStore::new();
        mock_store
            .expect_write_points()
            .withf(|points| {
                points.len() == 2
                    && points.iter().any(|p| p.measurement == "power")
                    && points.iter().any(|p| p.measurement == "temperature")
            })
            .times(1)
            .return_once(|_| Ok(()));

        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger
            .expect_submit_reading()
            .withf(|reading: &Reading| reading.device_id == "dev1")
            .times(1)
            .return_once(|_| Ok(receipt()));

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        // Act
        let result = service.handle_reading(&payload()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reading_malformed_payload() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache.expect_put().times(0);
        let mut mock_store = MockTimeSeriesStore::new();
        mock_store.expect_write_points().times(0);
        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger.expect_submit_reading().times(0);

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        // Act
        let result = service.handle_reading(b"not json").await;

        // Assert
        assert!(matches!(result, Err(DomainError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_handle_reading_without_power_skips_ledger() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache.expect_put().times(1).return_once(|_| Ok(()));
        let mut mock_store = MockTimeSeriesStore::new();
        mock_store
            .expect_write_points()
            .times(1)
            .return_once(|_| Ok(()));
        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger.expect_submit_reading().times(0);

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        let payload = serde_json::json!({
            "device_id": "dev1",
            "country_code": "KE",
            "temperature": { "sensor1": 30.5 },
        })
        .to_string();

        // Act
        let result = service.handle_reading(payload.as_bytes()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reading_store_failure_still_submits_to_ledger() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache.expect_put().times(1).return_once(|_| Ok(()));

        let mut mock_store = MockTimeSeriesStore::new();
        mock_store
            .expect_write_points()
            .times(1)
            .return_once(|_| Err(DomainError::StorageError(anyhow!("influx down"))));

        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger
            .expect_submit_reading()
            .times(1)
            .return_once(|_| Ok(receipt()));

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        // Act
        let result = service.handle_reading(&payload()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reading_ledger_failure_is_isolated() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache.expect_put().times(1).return_once(|_| Ok(()));
        let mut mock_store = MockTimeSeriesStore::new();
        mock_store
            .expect_write_points()
            .times(1)
            .return_once(|_| Ok(()));

        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger.expect_submit_reading().times(1).return_once(|_| {
            Err(DomainError::SubmissionFailed("relay down".to_string()))
        });

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        // Act
        let result = service.handle_reading(&payload()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reading_cache_failure_propagates() {
        // Arrange
        let mut mock_cache = MockReadingCache::new();
        mock_cache
            .expect_put()
            .times(1)
            .return_once(|_| Err(DomainError::StorageError(anyhow!("cache poisoned"))));
        let mut mock_store = MockTimeSeriesStore::new();
        mock_store.expect_write_points().times(0);
        let mut mock_ledger = MockLedgerSink::new();
        mock_ledger.expect_submit_reading().times(0);

        let service = ReadingIngestService::new(
            Arc::new(mock_cache),
            Arc::new(mock_store),
            Arc::new(mock_ledger),
        );

        // Act
        let result = service.handle_reading(&payload()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::StorageError(_))));
    }
}
