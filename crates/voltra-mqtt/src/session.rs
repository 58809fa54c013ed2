use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubAck, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};
use voltra_domain::{DomainError, DomainResult, ReadingHandler};

/// Lifecycle of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone)]
pub struct BrokerSessionConfig {
    pub broker_url: String,
    pub topic: String,
    pub client_id_prefix: String,
    pub retry_delay: Duration,
    pub subscription_retry_limit: u32,
}

/// Outcome of a subscription request round.
enum SubscribeFlow {
    Requested,
    Exhausted,
    Cancelled,
}

struct SessionShared {
    state: RwLock<SessionState>,
    client: RwLock<Option<AsyncClient>>,
}

/// Managed MQTT session for the telemetry topic.
///
/// Connects to the configured broker, subscribes to the telemetry topic and
/// feeds every received payload to the [`ReadingHandler`]. A dropped
/// connection is retried indefinitely; a rejected subscription is retried a
/// bounded number of times while the connection itself stays up.
#[derive(Clone)]
pub struct BrokerSession {
    config: BrokerSessionConfig,
    handler: Arc<dyn ReadingHandler>,
    shared: Arc<SessionShared>,
}

impl BrokerSession {
    pub fn new(config: BrokerSessionConfig, handler: Arc<dyn ReadingHandler>) -> Self {
        Self {
            config,
            handler,
            shared: Arc::new(SessionShared {
                state: RwLock::new(SessionState::Disconnected),
                client: RwLock::new(None),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.shared.state.read().await
    }

    /// Publish a payload to the broker on the current connection.
    ///
    /// Fails with [`DomainError::NotConnected`] unless the session is in the
    /// `Connected` state.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> DomainResult<()> {
        if self.state().await != SessionState::Connected {
            return Err(DomainError::NotConnected);
        }

        let client = self.shared.client.read().await.clone();
        let Some(client) = client else {
            return Err(DomainError::NotConnected);
        };

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                DomainError::StorageError(anyhow::anyhow!("MQTT publish error: {}", e))
            })?;

        debug!(topic = %topic, "published message to broker");
        Ok(())
    }

    /// Run the session until the cancellation token fires.
    #[instrument(name = "broker_session", skip_all)]
    pub async fn run(&self, cancellation_token: CancellationToken) -> DomainResult<()> {
        info!(
            broker_url = %self.config.broker_url,
            topic = %self.config.topic,
            "starting broker session"
        );

        let mut attempt = 0u32;

        loop {
            if cancellation_token.is_cancelled() {
                debug!("broker session cancelled before connection");
                break;
            }

            self.set_state(SessionState::Connecting).await;

            match self.run_connection(&cancellation_token).await {
                Ok(()) => {
                    // Clean exit (cancellation)
                    debug!("broker session stopped cleanly");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "MQTT connection error");

                    // A drop after a successful connect starts a fresh count.
                    if self.state().await == SessionState::Connected {
                        attempt = 0;
                    }
                    self.set_state(SessionState::Reconnecting).await;

                    attempt += 1;
                    warn!(
                        attempt,
                        retry_delay_secs = self.config.retry_delay.as_secs(),
                        "reconnecting to MQTT broker"
                    );

                    // Wait before retry with cancellation check
                    tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }

        self.set_state(SessionState::Closed).await;
        info!("broker session stopped");
        Ok(())
    }

    /// Run a single MQTT connection session
    #[instrument(
        name = "mqtt_connection",
        skip_all,
        fields(broker_url = %self.config.broker_url)
    )]
    async fn run_connection(&self, cancellation_token: &CancellationToken) -> DomainResult<()> {
        let (host, port) = parse_broker_url(&self.config.broker_url)?;

        let client_id = format!("{}-{}", self.config.client_id_prefix, std::process::id());
        let mut mqtt_options = MqttOptions::new(&client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
        self.install_client(client.clone()).await;

        let mut subscribe_attempts = 0u32;

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("shutdown signal received");
                    let _ = client.disconnect().await;
                    self.clear_client().await;
                    return Ok(());
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("connected to MQTT broker");
                            self.set_state(SessionState::Connected).await;
                            subscribe_attempts = 0;
                            match self
                                .request_subscription(&client, &mut subscribe_attempts, cancellation_token)
                                .await
                            {
                                SubscribeFlow::Cancelled => {
                                    let _ = client.disconnect().await;
                                    self.clear_client().await;
                                    return Ok(());
                                }
                                SubscribeFlow::Requested | SubscribeFlow::Exhausted => {}
                            }
                        }
                        Ok(Event::Incoming(Packet::SubAck(suback))) => {
                            if suback_indicates_failure(&suback) {
                                warn!(topic = %self.config.topic, "broker rejected subscription");
                                tokio::select! {
                                    _ = cancellation_token.cancelled() => {
                                        let _ = client.disconnect().await;
                                        self.clear_client().await;
                                        return Ok(());
                                    }
                                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                                }
                                match self
                                    .request_subscription(&client, &mut subscribe_attempts, cancellation_token)
                                    .await
                                {
                                    SubscribeFlow::Cancelled => {
                                        let _ = client.disconnect().await;
                                        self.clear_client().await;
                                        return Ok(());
                                    }
                                    SubscribeFlow::Requested | SubscribeFlow::Exhausted => {}
                                }
                            } else {
                                info!(topic = %self.config.topic, "subscribed to telemetry topic");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            handle_broker_message(
                                &publish.topic,
                                &publish.payload,
                                Arc::clone(&self.handler),
                            )
                            .await;
                        }
                        Ok(Event::Incoming(Packet::PingResp)) => {
                            // Ping response - connection is healthy
                        }
                        Ok(_) => {
                            // Other events (outgoing, etc.)
                        }
                        Err(e) => {
                            self.clear_client().await;
                            return Err(DomainError::StorageError(
                                anyhow::anyhow!("MQTT event loop error: {}", e),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Send a subscribe request for the telemetry topic.
    ///
    /// Counts the request against the subscription budget (the first request
    /// plus the configured number of retries). Once the budget is spent the
    /// session keeps the connection open but stops subscribing.
    async fn request_subscription(
        &self,
        client: &AsyncClient,
        attempts: &mut u32,
        cancellation_token: &CancellationToken,
    ) -> SubscribeFlow {
        let budget = 1 + self.config.subscription_retry_limit;

        loop {
            if *attempts >= budget {
                error!(
                    topic = %self.config.topic,
                    attempts = *attempts,
                    "subscription attempts exhausted, continuing without telemetry intake"
                );
                return SubscribeFlow::Exhausted;
            }
            *attempts += 1;

            match client.subscribe(&self.config.topic, QoS::AtLeastOnce).await {
                Ok(()) => return SubscribeFlow::Requested,
                Err(e) => {
                    warn!(
                        topic = %self.config.topic,
                        attempt = *attempts,
                        error = %DomainError::SubscriptionFailed(e.to_string()),
                        "failed to request subscription"
                    );
                    tokio::select! {
                        _ = cancellation_token.cancelled() => return SubscribeFlow::Cancelled,
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }
    }

    async fn set_state(&self, next: SessionState) {
        *self.shared.state.write().await = next;
    }

    async fn install_client(&self, client: AsyncClient) {
        *self.shared.client.write().await = Some(client);
    }

    async fn clear_client(&self) {
        *self.shared.client.write().await = None;
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

/// Handle an incoming broker message
///
/// Creates a new independent trace for each message (not nested under the
/// session trace).
pub(crate) async fn handle_broker_message(
    topic: &str,
    payload: &[u8],
    handler: Arc<dyn ReadingHandler>,
) {
    // Create a new root span for this message (independent trace)
    let span = info_span!(
        parent: Span::none(),
        "broker_message",
        topic = %topic,
        payload_size = payload.len(),
    );

    async {
        if let Err(e) = handler.handle_reading(payload).await {
            warn!(error = %e, "failed to process telemetry message");
        } else {
            debug!("processed telemetry message");
        }
    }
    .instrument(span)
    .await
}

fn suback_indicates_failure(suback: &SubAck) -> bool {
    suback
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.len() {
        1 => Ok((parts[0], 1883)), // Default MQTT port
        2 => {
            let port = parts[1].parse::<u16>().map_err(|_| {
                DomainError::InvalidBrokerUrl(format!("invalid port in broker URL: {}", parts[1]))
            })?;
            Ok((parts[0], port))
        }
        _ => Err(DomainError::InvalidBrokerUrl(format!(
            "invalid broker URL format: {}",
            url
        ))),
    }
}
