use crate::cache::ReadingCache;
use crate::error::DomainResult;
use crate::ledger::LedgerSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodically re-submits the cached latest readings to the energy ledger.
///
/// The scheduler works off a live cache snapshot taken at each tick, so a
/// reading that arrives mid-cycle is picked up by the next one. A failed
/// submission is logged and never stops the cycle or the scheduler.
pub struct SubmissionScheduler {
    cache: Arc<dyn ReadingCache>,
    ledger: Arc<dyn LedgerSink>,
    period: Duration,
}

impl SubmissionScheduler {
    pub fn new(
        cache: Arc<dyn ReadingCache>,
        ledger: Arc<dyn LedgerSink>,
        period: Duration,
    ) -> Self {
        Self {
            cache,
            ledger,
            period,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> DomainResult<()> {
        info!(
            period_secs = self.period.as_secs(),
            "Starting ledger submission scheduler"
        );

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so cycles start one
        // full period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Ledger submission scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.submit_cached_readings().await;
                }
            }
        }

        Ok(())
    }

    async fn submit_cached_readings(&self) {
        let readings = match self.cache.snapshot().await {
            Ok(readings) => readings,
            Err(e) => {
                error!(error = %e, "Failed to snapshot reading cache");
                return;
            }
        };

        if readings.is_empty() {
            debug!("No cached readings to submit");
            return;
        }

        let mut submitted = 0usize;
        for (device_id, reading) in readings {
            if reading.power_produced().is_none() {
                debug!(device_id = %device_id, "Cached reading has no power figure, skipping");
                continue;
            }

            match self.ledger.submit_reading(&reading).await {
                Ok(receipt) => {
                    debug!(
                        device_id = %device_id,
                        tx_hash = %receipt.tx_hash,
                        "Scheduled ledger submission confirmed"
                    );
                    submitted += 1;
                }
                Err(e) => {
                    error!(
                        device_id = %device_id,
                        error = %e,
                        "Scheduled ledger submission failed"
                    );
                }
            }
        }

        if submitted > 0 {
            info!(submitted, "Completed ledger submission cycle");
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), anyhow::Error>> + Send>,
            > + Send,
    > {
        Box::new(move |cancellation_token: CancellationToken| {
            Box::pin(async move {
                self.run(cancellation_token)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
    }
}
