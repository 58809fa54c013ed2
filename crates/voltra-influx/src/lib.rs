pub mod line_protocol;
pub mod store;

pub use line_protocol::{field_value, FieldValue, LineProtocolWriter};
pub use store::{InfluxConfig, InfluxStore};
