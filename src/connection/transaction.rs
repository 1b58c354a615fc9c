//! Transactions and isolation levels

use super::conn::{round_trip, Connection};
use super::statement::{ExecResult, Rows, Statement};
use crate::metrics::{counters, labels};
use crate::protocol::constants::tpb;
use crate::protocol::{flatten_named, NamedValue, PreparedInfo, TransactionHandle, Value, Wire};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Firebird isolation level, each with a fixed transaction parameter block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read committed, waits on conflicts, no record versions
    ReadCommittedLegacy,
    /// Read committed, record versions, no wait
    #[default]
    ReadCommitted,
    /// Snapshot (concurrency)
    RepeatableRead,
    /// Table stability (consistency)
    Serializable,
    /// Read-only read committed
    ReadCommittedReadOnly,
}

impl IsolationLevel {
    /// Transaction parameter block sent with `op_transaction`
    pub const fn parameter_block(&self) -> &'static [u8] {
        match self {
            Self::ReadCommittedLegacy => &[
                tpb::VERSION3,
                tpb::WRITE,
                tpb::WAIT,
                tpb::READ_COMMITTED,
                tpb::NO_REC_VERSION,
            ],
            Self::ReadCommitted => &[
                tpb::VERSION3,
                tpb::WRITE,
                tpb::NOWAIT,
                tpb::READ_COMMITTED,
                tpb::REC_VERSION,
            ],
            Self::RepeatableRead => &[tpb::VERSION3, tpb::WRITE, tpb::NOWAIT, tpb::CONCURRENCY],
            Self::Serializable => &[tpb::VERSION3, tpb::WRITE, tpb::NOWAIT, tpb::CONSISTENCY],
            Self::ReadCommittedReadOnly => &[
                tpb::VERSION3,
                tpb::READ,
                tpb::NOWAIT,
                tpb::READ_COMMITTED,
                tpb::REC_VERSION,
            ],
        }
    }

    /// Raw isolation code
    pub const fn code(&self) -> i32 {
        match self {
            Self::ReadCommittedLegacy => 0,
            Self::ReadCommitted => 1,
            Self::RepeatableRead => 2,
            Self::Serializable => 3,
            Self::ReadCommittedReadOnly => 4,
        }
    }

    /// Pick the level for standard transaction options.
    ///
    /// `read_only` wins over any isolation preference.
    pub fn from_options(options: &TxOptions) -> Result<Self> {
        if options.read_only {
            return Ok(Self::ReadCommittedReadOnly);
        }
        match options.isolation {
            SqlIsolation::Default | SqlIsolation::ReadCommitted => Ok(Self::ReadCommitted),
            SqlIsolation::RepeatableRead => Ok(Self::RepeatableRead),
            SqlIsolation::Serializable => Ok(Self::Serializable),
            other => Err(Error::UnsupportedIsolationLevel(other.to_string())),
        }
    }
}

impl TryFrom<i32> for IsolationLevel {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::ReadCommittedLegacy),
            1 => Ok(Self::ReadCommitted),
            2 => Ok(Self::RepeatableRead),
            3 => Ok(Self::Serializable),
            4 => Ok(Self::ReadCommittedReadOnly),
            _ => Err(Error::Config(format!("invalid isolation level {}", code))),
        }
    }
}

/// Standard SQL isolation levels a caller may ask for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SqlIsolation {
    /// Driver default (read committed)
    #[default]
    Default,
    /// Read uncommitted
    ReadUncommitted,
    /// Read committed
    ReadCommitted,
    /// Write committed
    WriteCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Snapshot
    Snapshot,
    /// Serializable
    Serializable,
    /// Linearizable
    Linearizable,
}

impl std::fmt::Display for SqlIsolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::ReadUncommitted => write!(f, "read uncommitted"),
            Self::ReadCommitted => write!(f, "read committed"),
            Self::WriteCommitted => write!(f, "write committed"),
            Self::RepeatableRead => write!(f, "repeatable read"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Serializable => write!(f, "serializable"),
            Self::Linearizable => write!(f, "linearizable"),
        }
    }
}

/// Options for [`Connection::begin_tx`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Requested isolation
    pub isolation: SqlIsolation,
    /// Read-only access
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TxOrigin {
    /// Returned to the caller by `begin`
    Explicit,
    /// Started by the connection for `prepare`/`exec`/`query`
    Implicit,
}

/// The one transaction a connection holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ActiveTransaction {
    pub(super) handle: TransactionHandle,
    pub(super) level: IsolationLevel,
    pub(super) origin: TxOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Finish {
    Commit,
    Rollback,
}

impl Finish {
    fn label(&self) -> &'static str {
        match self {
            Self::Commit => labels::COMMIT,
            Self::Rollback => labels::ROLLBACK,
        }
    }
}

impl<W: Wire> Connection<W> {
    /// Send `op_transaction` and record the new handle
    pub(super) async fn start_transaction(
        &mut self,
        level: IsolationLevel,
        origin: TxOrigin,
    ) -> Result<TransactionHandle> {
        let limit = self.config.statement_timeout;
        round_trip(
            limit,
            self.wire
                .begin_transaction(self.attachment, level.parameter_block()),
        )
        .await?;
        let response = round_trip(limit, self.wire.response()).await?;

        let handle = TransactionHandle(response.handle);
        self.transaction = Some(ActiveTransaction {
            handle,
            level,
            origin,
        });
        tracing::debug!(transaction = %handle, ?level, ?origin, "transaction started");
        Ok(handle)
    }

    /// Commit or roll back `handle`.
    ///
    /// The connection forgets the transaction before anything is sent, so a
    /// failed call cannot leave a dead handle behind.
    pub(super) async fn end_transaction(
        &mut self,
        handle: TransactionHandle,
        finish: Finish,
    ) -> Result<()> {
        if self.transaction.map(|t| t.handle) == Some(handle) {
            self.transaction = None;
        }
        self.guard()?;

        let result = self.send_finish(handle, finish).await;

        match &result {
            Ok(()) => {
                counters::transaction_finished(finish.label(), labels::OUTCOME_OK);
                tracing::debug!(transaction = %handle, finish = finish.label(), "transaction ended");
            }
            Err(e) => {
                counters::transaction_finished(finish.label(), labels::OUTCOME_ERROR);
                tracing::debug!(transaction = %handle, finish = finish.label(), error = %e, "transaction end failed");
            }
        }
        result
    }

    async fn send_finish(&mut self, handle: TransactionHandle, finish: Finish) -> Result<()> {
        let limit = self.config.statement_timeout;
        match finish {
            Finish::Commit => round_trip(limit, self.wire.commit(handle)).await?,
            Finish::Rollback => round_trip(limit, self.wire.rollback(handle)).await?,
        }
        round_trip(limit, self.wire.response()).await?;
        Ok(())
    }
}

/// An explicitly begun transaction
///
/// Holds the connection exclusively until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback), both of which consume it. A transaction
/// dropped without either is rolled back by the next connection-level call.
pub struct Transaction<'c, W: Wire> {
    conn: &'c mut Connection<W>,
    handle: TransactionHandle,
    level: IsolationLevel,
}

impl<'c, W: Wire> std::fmt::Debug for Transaction<'c, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("handle", &self.handle)
            .field("level", &self.level)
            .finish()
    }
}

impl<'c, W: Wire> Transaction<'c, W> {
    pub(super) fn new(
        conn: &'c mut Connection<W>,
        handle: TransactionHandle,
        level: IsolationLevel,
    ) -> Self {
        Self {
            conn,
            handle,
            level,
        }
    }

    /// Server transaction handle
    pub fn handle(&self) -> TransactionHandle {
        self.handle
    }

    /// Isolation level this transaction was begun with
    pub fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    /// Prepare `sql` in this transaction
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement<'_, W>> {
        self.conn.guard()?;
        let result = self.prepare_inner(sql).await;
        let info = self.conn.check(result)?;
        Ok(Statement::new(&mut *self.conn, self.handle, info))
    }

    async fn prepare_inner(&mut self, sql: &str) -> Result<PreparedInfo> {
        self.conn.release_statements().await?;
        self.conn.prepare_in(self.handle, sql).await
    }

    /// Prepare, execute and release `sql` in this transaction
    pub async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.conn.guard()?;
        let result = self.exec_inner(sql, args).await;
        self.conn.check(result)
    }

    /// [`exec`](Self::exec) with ordinal-tagged arguments
    pub async fn exec_named(&mut self, sql: &str, args: Vec<NamedValue>) -> Result<ExecResult> {
        let args = flatten_named(args);
        self.exec(sql, &args).await
    }

    async fn exec_inner(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.conn.release_statements().await?;
        self.conn.exec_in(self.handle, sql, args).await
    }

    /// Prepare `sql` in this transaction and open its cursor
    pub async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Rows<'_, W>> {
        self.conn.guard()?;
        let result = self.query_inner(sql, args).await;
        let info = self.conn.check(result)?;
        Ok(Rows::new(&mut *self.conn, info))
    }

    /// [`query`](Self::query) with ordinal-tagged arguments
    pub async fn query_named(&mut self, sql: &str, args: Vec<NamedValue>) -> Result<Rows<'_, W>> {
        let args = flatten_named(args);
        self.query(sql, &args).await
    }

    async fn query_inner(&mut self, sql: &str, args: &[Value]) -> Result<PreparedInfo> {
        self.conn.release_statements().await?;
        self.conn.open_in(self.handle, sql, args).await
    }

    /// Commit. The transaction is invalid afterwards even if the call fails.
    pub async fn commit(self) -> Result<()> {
        let result = self.conn.end_transaction(self.handle, Finish::Commit).await;
        self.conn.check(result)
    }

    /// Roll back. The transaction is invalid afterwards even if the call fails.
    pub async fn rollback(self) -> Result<()> {
        let result = self.conn.end_transaction(self.handle, Finish::Rollback).await;
        self.conn.check(result)
    }
}
