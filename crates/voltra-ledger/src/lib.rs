pub mod relay;

pub use relay::{HttpLedgerClient, RelayConfig};
