pub mod cache;
pub mod country;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod reading;
pub mod scheduler;
pub mod store;

pub use cache::{InMemoryReadingCache, ReadingCache};
pub use country::CountryCodes;
pub use error::{DomainError, DomainResult};
pub use ingest::{ReadingHandler, ReadingIngestService};
pub use ledger::{
    build_submission, encode_device_identity, LedgerClient, LedgerReceipt, LedgerSink,
    LedgerSubmission, PowerLedgerSubmitter,
};
pub use reading::{decode_reading, Reading, RECOGNIZED_GROUPS};
pub use scheduler::SubmissionScheduler;
pub use store::{
    points_for_reading, MeasurementPoint, RangeQuery, RangeUnit, TimeRange, TimeSeriesStore,
};

#[cfg(any(test, feature = "testing"))]
pub use cache::MockReadingCache;
#[cfg(any(test, feature = "testing"))]
pub use ingest::MockReadingHandler;
#[cfg(any(test, feature = "testing"))]
pub use ledger::{MockLedgerClient, MockLedgerSink};
#[cfg(any(test, feature = "testing"))]
pub use store::MockTimeSeriesStore;
