use crate::error::DomainResult;
use crate::reading::Reading;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Latest-reading cache keyed by device id.
///
/// Writers overwrite unconditionally; the most recently arrived reading
/// wins. Shared between the ingestion pipeline, the submission scheduler
/// and the read API.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingCache: Send + Sync {
    /// Store the latest reading for its device, replacing any previous one.
    async fn put(&self, reading: Reading) -> DomainResult<()>;

    /// Latest reading for a device, if one has arrived since startup.
    async fn get(&self, device_id: &str) -> DomainResult<Option<Reading>>;

    /// Point-in-time copy of the whole cache.
    async fn snapshot(&self) -> DomainResult<HashMap<String, Reading>>;
}

/// In-memory implementation of `ReadingCache` using a `HashMap`.
///
/// The cache starts empty on every process start; devices repopulate it
/// with their next publish.
pub struct InMemoryReadingCache {
    readings: RwLock<HashMap<String, Reading>>,
}

impl InMemoryReadingCache {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingCache for InMemoryReadingCache {
    async fn put(&self, reading: Reading) -> DomainResult<()> {
        let mut readings = self.readings.write().await;
        readings.insert(reading.device_id.clone(), reading);
        Ok(())
    }

    async fn get(&self, device_id: &str) -> DomainResult<Option<Reading>> {
        let readings = self.readings.read().await;
        Ok(readings.get(device_id).cloned())
    }

    async fn snapshot(&self) -> DomainResult<HashMap<String, Reading>> {
        let readings = self.readings.read().await;
        Ok(readings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::decode_reading;

    fn reading(device_id: &str, power: f64) -> Reading {
        let payload = serde_json::json!({
            "device_id": device_id,
            "country_code": "KE",
            "power": { "power_produced": power },
        })
        .to_string();
        decode_reading(payload.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = InMemoryReadingCache::new();
        cache.put(reading("dev1", 8.8)).await.unwrap();

        let cached = cache.get("dev1").await.unwrap();
        assert_eq!(cached.unwrap().power_produced(), Some(8.8));
    }

    #[tokio::test]
    async fn test_get_unknown_device() {
        let cache = InMemoryReadingCache::new();
        assert!(cache.get("dev1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_reading() {
        let cache = InMemoryReadingCache::new();
        cache.put(reading("dev1", 1.0)).await.unwrap();
        cache.put(reading("dev1", 2.0)).await.unwrap();

        let cached = cache.get("dev1").await.unwrap().unwrap();
        assert_eq!(cached.power_produced(), Some(2.0));

        let snapshot = cache.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let cache = InMemoryReadingCache::new();
        cache.put(reading("dev1", 1.0)).await.unwrap();

        let snapshot = cache.snapshot().await.unwrap();
        cache.put(reading("dev2", 2.0)).await.unwrap();

        // The snapshot taken earlier does not see later writes
        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_empty_on_start() {
        let cache = InMemoryReadingCache::new();
        assert!(cache.snapshot().await.unwrap().is_empty());
    }
}
