use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use voltra_domain::{DomainError, DomainResult, LedgerClient, LedgerReceipt, LedgerSubmission};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

/// Ledger client that goes through an HTTP transaction relay.
///
/// The relay signs and broadcasts the chain transaction; this client submits
/// the record, then polls the relay for the receipt until the transaction is
/// mined or the confirmation budget runs out.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    config: RelayConfig,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    device_identity: &'a str,
    wallet_address: Option<&'a str>,
    scaled_consumption: u64,
    timestamp: i64,
    country_code: u32,
    integrity_hash: Option<&'a str>,
}

impl<'a> From<&'a LedgerSubmission> for SubmitRequest<'a> {
    fn from(submission: &'a LedgerSubmission) -> Self {
        Self {
            device_identity: &submission.device_identity,
            wallet_address: submission.wallet_address.as_deref(),
            scaled_consumption: submission.scaled_consumption,
            timestamp: submission.timestamp,
            country_code: submission.numeric_country_code,
            integrity_hash: submission.integrity_hash.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    tx_hash: String,
    block_number: Option<u64>,
    status: Option<String>,
}

enum ReceiptStatus {
    Pending,
    Confirmed(LedgerReceipt),
    Reverted,
}

impl HttpLedgerClient {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn poll_receipt(&self, tx_hash: &str) -> DomainResult<ReceiptStatus> {
        let response = self
            .http
            .get(format!("{}/v1/receipts/{}", self.base_url(), tx_hash))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DomainError::SubmissionFailed(format!("relay request failed: {}", e)))?;

        // An unknown transaction is one the relay has not broadcast yet
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ReceiptStatus::Pending);
        }
        if !response.status().is_success() {
            return Err(DomainError::SubmissionFailed(format!(
                "relay receipt lookup rejected: {}",
                response.status()
            )));
        }

        let receipt: ReceiptResponse = response.json().await.map_err(|e| {
            DomainError::SubmissionFailed(format!("invalid relay receipt: {}", e))
        })?;

        if receipt.status.as_deref() == Some("failed") {
            return Ok(ReceiptStatus::Reverted);
        }
        match receipt.block_number {
            Some(block_number) => Ok(ReceiptStatus::Confirmed(LedgerReceipt {
                tx_hash: receipt.tx_hash,
                block_number,
            })),
            None => Ok(ReceiptStatus::Pending),
        }
    }

    async fn wait_for_confirmation(&self, tx_hash: &str) -> DomainResult<LedgerReceipt> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;

        loop {
            match self.poll_receipt(tx_hash).await {
                Ok(ReceiptStatus::Confirmed(receipt)) => return Ok(receipt),
                Ok(ReceiptStatus::Reverted) => {
                    return Err(DomainError::SubmissionFailed(format!(
                        "transaction {} reverted",
                        tx_hash
                    )));
                }
                Ok(ReceiptStatus::Pending) => {
                    debug!(tx_hash = %tx_hash, "transaction still pending");
                }
                Err(e) => {
                    warn!(tx_hash = %tx_hash, error = %e, "receipt poll failed, retrying");
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(DomainError::SubmissionFailed(format!(
                    "transaction {} unconfirmed after {:?}",
                    tx_hash, self.config.confirmation_timeout
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit(&self, submission: &LedgerSubmission) -> DomainResult<LedgerReceipt> {
        let request = SubmitRequest::from(submission);

        let response = self
            .http
            .post(format!("{}/v1/readings", self.base_url()))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::SubmissionFailed(format!("relay request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DomainError::SubmissionFailed(format!(
                "relay rejected submission: {}",
                response.status()
            )));
        }

        let submitted: SubmitResponse = response.json().await.map_err(|e| {
            DomainError::SubmissionFailed(format!("invalid relay response: {}", e))
        })?;

        debug!(
            device_identity = %submission.device_identity,
            tx_hash = %submitted.tx_hash,
            "relay accepted submission"
        );

        self.wait_for_confirmation(&submitted.tx_hash).await
    }
}
