//! Wire contract consumed by the session layer
//!
//! The session layer never encodes frames itself. It drives an implementation
//! of [`Wire`], one request/response exchange at a time, and relies on the
//! implementation to tag every failure with a [`WireErrorKind`] so that
//! classification is a plain match.
//!
//! [`WireErrorKind`]: crate::error::WireErrorKind

pub mod constants;
mod value;

pub use value::{flatten_named, NamedValue, Value};

use crate::auth::KeyPair;
use crate::connection::ConnectionConfig;
use crate::error::WireError;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Result of a single wire call
pub type WireResult<T> = std::result::Result<T, WireError>;

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_type!(
    /// Server-assigned database attachment handle
    AttachmentHandle
);
handle_type!(
    /// Server-assigned transaction handle
    TransactionHandle
);
handle_type!(
    /// Server-assigned statement handle
    StatementHandle
);

/// Generic `op_response` payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Object handle (attachment, transaction, ...)
    pub handle: i32,
    /// Object id (blob id and similar)
    pub object_id: u64,
    /// Opaque response data
    pub data: Bytes,
}

/// Description of a freshly prepared statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInfo {
    /// Statement handle to execute and free
    pub handle: StatementHandle,
    /// Number of `?` placeholders
    pub param_count: usize,
    /// Output column names (empty for statements without a result set)
    pub columns: Vec<String>,
}

/// One batch of rows from a fetch round trip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    /// Decoded rows, in server order
    pub rows: Vec<Vec<Value>>,
    /// Server signalled that the cursor is exhausted
    pub end_of_data: bool,
}

/// Framed request/response primitives over one ordered, reliable channel
///
/// Every method is a single blocking round trip (or the send half of one,
/// completed by [`Wire::response`]). Implementations must not pipeline.
#[async_trait]
pub trait Wire: Send {
    /// `op_connect`: announce the database, user and auth plugin, offering
    /// the client public key
    async fn connect(&mut self, config: &ConnectionConfig, client_public: &[u8]) -> WireResult<()>;

    /// Read the server's accept and finish plugin authentication
    async fn accept(&mut self, config: &ConnectionConfig, keys: &KeyPair) -> WireResult<()>;

    /// `op_attach` (completed by [`Wire::response`])
    async fn attach(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
        role: Option<&str>,
    ) -> WireResult<()>;

    /// `op_create` (completed by [`Wire::response`])
    async fn create(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
        role: Option<&str>,
    ) -> WireResult<()>;

    /// `op_detach` (completed by [`Wire::response`])
    async fn detach(&mut self, attachment: AttachmentHandle) -> WireResult<()>;

    /// `op_transaction` with a transaction parameter block (completed by [`Wire::response`])
    async fn begin_transaction(
        &mut self,
        attachment: AttachmentHandle,
        tpb: &[u8],
    ) -> WireResult<()>;

    /// `op_commit` (completed by [`Wire::response`])
    async fn commit(&mut self, transaction: TransactionHandle) -> WireResult<()>;

    /// `op_rollback` (completed by [`Wire::response`])
    async fn rollback(&mut self, transaction: TransactionHandle) -> WireResult<()>;

    /// Read one generic `op_response`
    async fn response(&mut self) -> WireResult<Response>;

    /// Allocate and prepare a statement within a transaction
    async fn prepare(&mut self, transaction: TransactionHandle, sql: &str)
        -> WireResult<PreparedInfo>;

    /// Execute a statement without a result set; returns rows affected
    async fn execute(
        &mut self,
        statement: StatementHandle,
        transaction: TransactionHandle,
        args: &[Value],
    ) -> WireResult<u64>;

    /// Execute a statement and open its cursor
    async fn open_cursor(
        &mut self,
        statement: StatementHandle,
        transaction: TransactionHandle,
        args: &[Value],
    ) -> WireResult<()>;

    /// Fetch up to `count` rows from an open cursor
    async fn fetch(&mut self, statement: StatementHandle, count: usize) -> WireResult<FetchBatch>;

    /// Drop a statement handle on the server
    async fn free_statement(&mut self, statement: StatementHandle) -> WireResult<()>;

    /// Shut the channel down
    async fn shutdown(&mut self) -> WireResult<()>;
}
