use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed telemetry payload: {0}")]
    MalformedPayload(String),

    #[error("Telemetry payload is missing device identity")]
    MissingIdentity,

    #[error("Telemetry payload contains no recognized measurements")]
    NoMeasurements,

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Not connected to MQTT broker")]
    NotConnected,

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Unsupported country code: {0}")]
    UnsupportedCountry(String),

    #[error("Ledger submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Invalid country table entry: {0}")]
    InvalidCountryTable(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
