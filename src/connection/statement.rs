//! Prepared statements and row streams

use super::conn::{round_trip, Connection};
use crate::metrics::{counters, labels};
use crate::protocol::{
    flatten_named, NamedValue, PreparedInfo, StatementHandle, TransactionHandle, Value, Wire,
};
use crate::{Error, Result, WireErrorKind};
use futures::Stream;
use std::collections::VecDeque;

/// Outcome of a statement executed without a result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted
    pub rows_affected: u64,
}

/// A statement prepared within a transaction
///
/// Consumed by [`exec`](Self::exec) or [`query`](Self::query). A statement
/// dropped unused is freed before the next operation on its connection.
pub struct Statement<'c, W: Wire> {
    conn: &'c mut Connection<W>,
    transaction: TransactionHandle,
    info: PreparedInfo,
}

impl<'c, W: Wire> std::fmt::Debug for Statement<'c, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.info.handle)
            .field("transaction", &self.transaction)
            .field("param_count", &self.info.param_count)
            .finish()
    }
}

impl<'c, W: Wire> Statement<'c, W> {
    pub(super) fn new(
        conn: &'c mut Connection<W>,
        transaction: TransactionHandle,
        info: PreparedInfo,
    ) -> Self {
        Self {
            conn,
            transaction,
            info,
        }
    }

    /// Server statement handle
    pub fn handle(&self) -> StatementHandle {
        self.info.handle
    }

    /// Transaction the statement was prepared in
    pub fn transaction(&self) -> TransactionHandle {
        self.transaction
    }

    /// Number of positional parameters
    pub fn param_count(&self) -> usize {
        self.info.param_count
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        &self.info.columns
    }

    /// Execute and free the statement
    pub async fn exec(self, args: &[Value]) -> Result<ExecResult> {
        let Self {
            conn,
            transaction,
            info,
        } = self;
        conn.guard()?;
        let result = conn.run_exec(transaction, &info, args).await;
        conn.check(result)
    }

    /// [`exec`](Self::exec) with ordinal-tagged arguments
    pub async fn exec_named(self, args: Vec<NamedValue>) -> Result<ExecResult> {
        let args = flatten_named(args);
        self.exec(&args).await
    }

    /// Open the statement's cursor
    pub async fn query(self, args: &[Value]) -> Result<Rows<'c, W>> {
        let Self {
            conn,
            transaction,
            info,
        } = self;
        conn.guard()?;
        let result = conn.open_prepared(transaction, info, args).await;
        let info = conn.check(result)?;
        Ok(Rows::new(conn, info))
    }

    /// [`query`](Self::query) with ordinal-tagged arguments
    pub async fn query_named(self, args: Vec<NamedValue>) -> Result<Rows<'c, W>> {
        let args = flatten_named(args);
        self.query(&args).await
    }

    /// Free the statement without running it
    pub async fn close(self) -> Result<()> {
        self.conn.guard()?;
        let result = self.conn.free_statement(self.info.handle).await;
        self.conn.check(result)
    }
}

/// Forward-only stream of result rows
///
/// Rows are fetched lazily in batches of the connection's `fetch_size`. The
/// statement is freed once the server signals end of data, or by
/// [`close`](Self::close).
pub struct Rows<'c, W: Wire> {
    conn: &'c mut Connection<W>,
    statement: StatementHandle,
    columns: Vec<String>,
    buffer: VecDeque<Vec<Value>>,
    fetch_size: usize,
    finished: bool,
}

impl<'c, W: Wire> std::fmt::Debug for Rows<'c, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("statement", &self.statement)
            .field("columns", &self.columns)
            .field("buffered", &self.buffer.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'c, W: Wire> Rows<'c, W> {
    pub(super) fn new(conn: &'c mut Connection<W>, info: PreparedInfo) -> Self {
        let fetch_size = conn.config.fetch_size.max(1);
        Self {
            conn,
            statement: info.handle,
            columns: info.columns,
            buffer: VecDeque::new(),
            fetch_size,
            finished: false,
        }
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the server has signalled end of data
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next row, or `None` once the cursor is exhausted
    pub async fn next(&mut self) -> Result<Option<Vec<Value>>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.finished {
                return Ok(None);
            }

            self.conn.guard()?;
            let result = self.fetch_batch().await;
            self.conn.check(result)?;
        }
    }

    async fn fetch_batch(&mut self) -> Result<()> {
        let limit = self.conn.config.statement_timeout;
        let batch = round_trip(limit, self.conn.wire.fetch(self.statement, self.fetch_size)).await?;

        tracing::debug!(
            statement = %self.statement,
            rows = batch.rows.len(),
            end_of_data = batch.end_of_data,
            "fetched"
        );
        counters::rows_fetched(batch.rows.len() as u64);
        self.buffer.extend(batch.rows);

        if batch.end_of_data {
            self.finished = true;
            // The final batch is already buffered; only a dead channel is fatal here
            if let Err(e) = self.conn.free_statement(self.statement).await {
                if e.wire_kind() == Some(WireErrorKind::Network) {
                    return Err(e);
                }
                tracing::warn!(statement = %self.statement, error = %e, "free at end of data failed");
            }
        }
        Ok(())
    }

    /// Drain the remaining rows
    pub async fn collect_all(mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Adapt into a [`Stream`]. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Value>>> + 'c {
        futures::stream::unfold(Some(self), |state| async move {
            let mut rows = match state {
                Some(rows) => rows,
                None => return None,
            };
            match rows.next().await {
                Ok(Some(row)) => Some((Ok(row), Some(rows))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Stop reading and free the statement
    pub async fn close(self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.conn.guard()?;
        let result = self.conn.free_statement(self.statement).await;
        self.conn.check(result)
    }
}

impl<W: Wire> Connection<W> {
    /// Prepare `sql` in `transaction`, tracking the handle until it is freed
    pub(super) async fn prepare_in(
        &mut self,
        transaction: TransactionHandle,
        sql: &str,
    ) -> Result<PreparedInfo> {
        let limit = self.config.statement_timeout;
        let info = round_trip(limit, self.wire.prepare(transaction, sql)).await?;
        self.unreleased.push(info.handle);
        tracing::debug!(
            statement = %info.handle,
            transaction = %transaction,
            params = info.param_count,
            "prepared"
        );
        Ok(info)
    }

    pub(super) async fn exec_in(
        &mut self,
        transaction: TransactionHandle,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        let info = self.prepare_in(transaction, sql).await?;
        self.run_exec(transaction, &info, args).await
    }

    async fn run_exec(
        &mut self,
        transaction: TransactionHandle,
        info: &PreparedInfo,
        args: &[Value],
    ) -> Result<ExecResult> {
        let result = self.execute_prepared(transaction, info, args).await;
        self.release_after(info.handle, result).await
    }

    async fn execute_prepared(
        &mut self,
        transaction: TransactionHandle,
        info: &PreparedInfo,
        args: &[Value],
    ) -> Result<ExecResult> {
        check_arity(info, args)?;
        let limit = self.config.statement_timeout;
        let rows_affected =
            round_trip(limit, self.wire.execute(info.handle, transaction, args)).await?;
        counters::statement_executed(labels::EXEC);
        tracing::debug!(statement = %info.handle, rows_affected, "executed");
        Ok(ExecResult { rows_affected })
    }

    pub(super) async fn open_in(
        &mut self,
        transaction: TransactionHandle,
        sql: &str,
        args: &[Value],
    ) -> Result<PreparedInfo> {
        let info = self.prepare_in(transaction, sql).await?;
        self.open_prepared(transaction, info, args).await
    }

    async fn open_prepared(
        &mut self,
        transaction: TransactionHandle,
        info: PreparedInfo,
        args: &[Value],
    ) -> Result<PreparedInfo> {
        match self.open_cursor(transaction, &info, args).await {
            Ok(()) => Ok(info),
            Err(e) => self.release_after(info.handle, Err(e)).await,
        }
    }

    async fn open_cursor(
        &mut self,
        transaction: TransactionHandle,
        info: &PreparedInfo,
        args: &[Value],
    ) -> Result<()> {
        check_arity(info, args)?;
        let limit = self.config.statement_timeout;
        round_trip(limit, self.wire.open_cursor(info.handle, transaction, args)).await?;
        counters::statement_executed(labels::QUERY);
        tracing::debug!(statement = %info.handle, "cursor opened");
        Ok(())
    }

    /// Free `statement` after it ran, keeping the first error.
    ///
    /// After a network failure the channel is unusable and nothing more is sent.
    async fn release_after<T>(&mut self, statement: StatementHandle, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.free_statement(statement).await?;
                Ok(value)
            }
            Err(e) if e.wire_kind() == Some(WireErrorKind::Network) => Err(e),
            Err(e) => {
                if let Err(free_err) = self.free_statement(statement).await {
                    if free_err.wire_kind() == Some(WireErrorKind::Network) {
                        return Err(free_err);
                    }
                    tracing::warn!(statement = %statement, error = %free_err, "free after failure failed");
                }
                Err(e)
            }
        }
    }

    /// Drop a statement on the server. The handle is forgotten first.
    pub(super) async fn free_statement(&mut self, statement: StatementHandle) -> Result<()> {
        self.unreleased.retain(|h| *h != statement);
        let limit = self.config.statement_timeout;
        round_trip(limit, self.wire.free_statement(statement)).await?;
        tracing::debug!(statement = %statement, "freed");
        Ok(())
    }

    /// Free statements whose owners were dropped before finishing
    pub(super) async fn release_statements(&mut self) -> Result<()> {
        while let Some(statement) = self.unreleased.first().copied() {
            tracing::debug!(statement = %statement, "releasing abandoned statement");
            self.free_statement(statement).await?;
        }
        Ok(())
    }
}

fn check_arity(info: &PreparedInfo, args: &[Value]) -> Result<()> {
    if args.len() == info.param_count {
        Ok(())
    } else {
        Err(Error::ParameterCount {
            expected: info.param_count,
            actual: args.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(param_count: usize) -> PreparedInfo {
        PreparedInfo {
            handle: StatementHandle(1),
            param_count,
            columns: Vec::new(),
        }
    }

    #[test]
    fn test_arity_matches() {
        assert!(check_arity(&info(2), &[Value::Null, Value::from(1)]).is_ok());
        assert!(check_arity(&info(0), &[]).is_ok());
    }

    #[test]
    fn test_arity_mismatch() {
        match check_arity(&info(2), &[Value::Null]) {
            Err(Error::ParameterCount { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ParameterCount, got {:?}", other),
        }
    }
}
