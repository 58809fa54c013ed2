use crate::country::CountryCodes;
use crate::error::{DomainError, DomainResult};
use crate::reading::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A power record ready for the energy ledger.
///
/// `device_identity` is the device id encoded as a 32-byte hex word
/// (`0x` + 64 hex chars), the identity format of the ledger contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSubmission {
    pub device_identity: String,
    pub wallet_address: Option<String>,
    pub scaled_consumption: u64,
    pub timestamp: i64,
    pub numeric_country_code: u32,
    pub integrity_hash: Option<String>,
}

/// Confirmation that a submission landed in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub tx_hash: String,
    pub block_number: u64,
}

/// Transport to the ledger relay.
///
/// `submit` resolves only once the transaction is confirmed on chain; a
/// pending transaction keeps the call in flight.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit(&self, submission: &LedgerSubmission) -> DomainResult<LedgerReceipt>;
}

/// Ledger-side sink for readings, consumed by the ingestion pipeline and
/// the submission scheduler.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn submit_reading(&self, reading: &Reading) -> DomainResult<LedgerReceipt>;
}

/// Domain service that turns readings into confirmed ledger records.
///
/// Submissions for the same device are serialized through a per-device
/// lock so their transactions reach the ledger in order; different devices
/// submit independently.
pub struct PowerLedgerSubmitter {
    client: Arc<dyn LedgerClient>,
    countries: CountryCodes,
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PowerLedgerSubmitter {
    pub fn new(client: Arc<dyn LedgerClient>, countries: CountryCodes) -> Self {
        Self {
            client,
            countries,
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    // Lock entries are kept for the process lifetime; the map is bounded by
    // the number of distinct devices seen.
    async fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        locks
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LedgerSink for PowerLedgerSubmitter {
    async fn submit_reading(&self, reading: &Reading) -> DomainResult<LedgerReceipt> {
        let power = reading.power_produced().ok_or_else(|| {
            DomainError::SubmissionFailed("reading has no power production figure".to_string())
        })?;

        let submission = build_submission(reading, power, &self.countries, Utc::now())?;

        let lock = self.device_lock(&reading.device_id).await;
        let _guard = lock.lock().await;

        debug!(
            device_id = %reading.device_id,
            scaled_consumption = submission.scaled_consumption,
            country_code = submission.numeric_country_code,
            "Submitting power reading to ledger"
        );

        let receipt = self.client.submit(&submission).await?;

        info!(
            device_id = %reading.device_id,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "Ledger submission confirmed"
        );

        Ok(receipt)
    }
}

/// Build the ledger record for a reading.
///
/// Fails when the device id does not fit the 32-byte identity format, the
/// country has no numeric mapping, or the power figure is negative.
pub fn build_submission(
    reading: &Reading,
    power_produced: f64,
    countries: &CountryCodes,
    timestamp: DateTime<Utc>,
) -> DomainResult<LedgerSubmission> {
    let device_identity = encode_device_identity(&reading.device_id)?;

    let numeric_country_code = countries
        .resolve(&reading.country_code)
        .ok_or_else(|| DomainError::UnsupportedCountry(reading.country_code.clone()))?;

    if power_produced < 0.0 {
        return Err(DomainError::SubmissionFailed(format!(
            "negative power production figure: {}",
            power_produced
        )));
    }
    let scaled_consumption = (power_produced * 100.0).floor() as u64;

    Ok(LedgerSubmission {
        device_identity,
        wallet_address: reading.wallet_address.clone(),
        scaled_consumption,
        timestamp: timestamp.timestamp(),
        numeric_country_code,
        integrity_hash: reading.integrity_hash.clone(),
    })
}

/// Encode a device id as a zero-padded 32-byte hex word.
///
/// Ids longer than 31 bytes do not fit the identity format and are
/// rejected.
pub fn encode_device_identity(device_id: &str) -> DomainResult<String> {
    let bytes = device_id.as_bytes();
    if bytes.len() > 31 {
        return Err(DomainError::SubmissionFailed(format!(
            "device id too long for ledger identity: {} bytes",
            bytes.len()
        )));
    }

    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);

    let mut encoded = String::with_capacity(66);
    encoded.push_str("0x");
    for byte in word {
        encoded.push_str(&format!("{:02x}", byte));
    }
    Ok(encoded)
}
