//! Connection management
//!
//! This module handles:
//! * Connection lifecycle (handshake, attach/create, detach)
//! * Health state machine and error classification
//! * Transactions and their parameter blocks
//! * Statement preparation, execution and row streaming

mod conn;
mod state;
mod statement;
mod transaction;

pub use conn::{Connection, ConnectionConfig, ConnectionConfigBuilder};
pub use state::ConnectionState;
pub use statement::{ExecResult, Rows, Statement};
pub use transaction::{IsolationLevel, SqlIsolation, Transaction, TxOptions};

pub(crate) use conn::round_trip;
