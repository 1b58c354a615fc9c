//! Connection strings and the driver entry point

mod connection_string;
mod driver;

pub use connection_string::ConnectionInfo;
pub use driver::{Connector, Driver};
