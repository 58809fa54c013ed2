pub mod session;

pub use session::{BrokerSession, BrokerSessionConfig, SessionState};
