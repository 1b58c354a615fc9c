//! firebird-wire: session layer of a Firebird wire-protocol client
//!
//! This crate turns one full-duplex channel to a Firebird server into an
//! authenticated, attached database session:
//!
//! * Handshake (connect + accept) with per-attempt ephemeral key material
//! * Attach to, or create, a database
//! * Transactions with fixed transaction parameter blocks per isolation level
//! * Prepare / execute / streaming query with prompt statement release
//! * Failure classification: a dead channel poisons the connection and every
//!   later call fails fast with [`Error::BadConnection`]
//!
//! Frame encoding, the key-exchange mathematics and the row codec live behind
//! the [`protocol::Wire`] and [`auth::KeyGenerator`] traits.
//!
//! # Example
//!
//! ```ignore
//! use firebird_wire::{Driver, IsolationLevel};
//!
//! let driver = Driver::new(my_connector, my_key_generator);
//! let mut conn = driver.open("sysdba:masterkey@localhost:3050/employee").await?;
//!
//! let mut tx = conn.begin(IsolationLevel::Serializable).await?;
//! tx.exec("UPDATE t SET v = ? WHERE id = ?", &[1.into(), 7.into()]).await?;
//! tx.commit().await?;
//!
//! conn.close().await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use client::{ConnectionInfo, Connector, Driver};
pub use connection::{
    Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionState, ExecResult,
    IsolationLevel, Rows, SqlIsolation, Statement, Transaction, TxOptions,
};
pub use error::{Error, Result, WireError, WireErrorKind};
pub use protocol::{NamedValue, Value};
