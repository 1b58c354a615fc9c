//! Shared test fixtures: an instrumented in-memory wire

#![allow(dead_code)]

use async_trait::async_trait;
use firebird_wire::auth::KeyPair;
use firebird_wire::protocol::{
    AttachmentHandle, FetchBatch, PreparedInfo, Response, StatementHandle, TransactionHandle,
    WireResult,
};
use firebird_wire::{Connection, ConnectionConfig, Connector, Value, WireError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const ATTACHMENT: i32 = 1;
pub const FIRST_TRANSACTION: i32 = 100;
pub const FIRST_STATEMENT: i32 = 500;

/// Install a test subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wire operation, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Dial,
    Connect,
    Accept,
    Attach,
    Create,
    Detach,
    Begin,
    Commit,
    Rollback,
    Response,
    Prepare,
    Execute,
    OpenCursor,
    Fetch,
    Free,
    Shutdown,
}

/// One recorded wire call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Dial { host: String, port: u16 },
    Connect { plugin: String, wire_crypt: bool, public_key: Vec<u8> },
    Accept,
    Attach { database: String, user: String, password: String, role: Option<String> },
    Create { database: String },
    Detach(AttachmentHandle),
    Begin { attachment: AttachmentHandle, tpb: Vec<u8> },
    Commit(TransactionHandle),
    Rollback(TransactionHandle),
    Response,
    Prepare { transaction: TransactionHandle, sql: String },
    Execute { statement: StatementHandle, transaction: TransactionHandle, args: Vec<Value> },
    OpenCursor { statement: StatementHandle, transaction: TransactionHandle, args: Vec<Value> },
    Fetch { statement: StatementHandle, count: usize },
    Free(StatementHandle),
    Shutdown,
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Dial { .. } => Op::Dial,
            Call::Connect { .. } => Op::Connect,
            Call::Accept => Op::Accept,
            Call::Attach { .. } => Op::Attach,
            Call::Create { .. } => Op::Create,
            Call::Detach(_) => Op::Detach,
            Call::Begin { .. } => Op::Begin,
            Call::Commit(_) => Op::Commit,
            Call::Rollback(_) => Op::Rollback,
            Call::Response => Op::Response,
            Call::Prepare { .. } => Op::Prepare,
            Call::Execute { .. } => Op::Execute,
            Call::OpenCursor { .. } => Op::OpenCursor,
            Call::Fetch { .. } => Op::Fetch,
            Call::Free(_) => Op::Free,
            Call::Shutdown => Op::Shutdown,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<WireError>>,
    hang: Option<Op>,
    last_request: Option<Op>,
    next_transaction: i32,
    next_statement: i32,
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    rows_affected: u64,
}

/// Inspection and scripting side of a [`MockWire`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    pub fn new() -> Self {
        let state = MockState {
            next_transaction: FIRST_TRANSACTION,
            next_statement: FIRST_STATEMENT,
            rows_affected: 1,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn wire(&self) -> MockWire {
        MockWire {
            handle: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().calls.iter().map(Call::op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: Op, error: WireError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Make every call of `op` block for an hour
    pub fn hang(&self, op: Op) {
        self.lock().hang = Some(op);
    }

    /// Result set served by `fetch` for the next query
    pub fn set_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let mut state = self.lock();
        state.columns = columns.iter().map(|c| c.to_string()).collect();
        state.rows = rows.into();
    }

    pub fn set_rows_affected(&self, rows: u64) {
        self.lock().rows_affected = rows;
    }

    async fn record(&self, call: Call) -> WireResult<()> {
        let op = call.op();
        let (failure, hang) = {
            let mut state = self.lock();
            state.calls.push(call);
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (failure, state.hang == Some(op))
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn requested(&self, op: Op) {
        self.lock().last_request = Some(op);
    }
}

/// In-memory [`Wire`](firebird_wire::protocol::Wire) that records every call
#[derive(Debug)]
pub struct MockWire {
    handle: MockHandle,
}

#[async_trait]
impl firebird_wire::protocol::Wire for MockWire {
    async fn connect(&mut self, config: &ConnectionConfig, client_public: &[u8]) -> WireResult<()> {
        self.handle
            .record(Call::Connect {
                plugin: config.auth_plugin.name().to_string(),
                wire_crypt: config.wire_crypt,
                public_key: client_public.to_vec(),
            })
            .await
    }

    async fn accept(&mut self, _config: &ConnectionConfig, _keys: &KeyPair) -> WireResult<()> {
        self.handle.record(Call::Accept).await
    }

    async fn attach(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
        role: Option<&str>,
    ) -> WireResult<()> {
        self.handle
            .record(Call::Attach {
                database: database.to_string(),
                user: user.to_string(),
                password: password.to_string(),
                role: role.map(str::to_string),
            })
            .await?;
        self.handle.requested(Op::Attach);
        Ok(())
    }

    async fn create(
        &mut self,
        database: &str,
        _user: &str,
        _password: &str,
        _role: Option<&str>,
    ) -> WireResult<()> {
        self.handle
            .record(Call::Create {
                database: database.to_string(),
            })
            .await?;
        self.handle.requested(Op::Create);
        Ok(())
    }

    async fn detach(&mut self, attachment: AttachmentHandle) -> WireResult<()> {
        self.handle.record(Call::Detach(attachment)).await?;
        self.handle.requested(Op::Detach);
        Ok(())
    }

    async fn begin_transaction(
        &mut self,
        attachment: AttachmentHandle,
        tpb: &[u8],
    ) -> WireResult<()> {
        self.handle
            .record(Call::Begin {
                attachment,
                tpb: tpb.to_vec(),
            })
            .await?;
        self.handle.requested(Op::Begin);
        Ok(())
    }

    async fn commit(&mut self, transaction: TransactionHandle) -> WireResult<()> {
        self.handle.record(Call::Commit(transaction)).await?;
        self.handle.requested(Op::Commit);
        Ok(())
    }

    async fn rollback(&mut self, transaction: TransactionHandle) -> WireResult<()> {
        self.handle.record(Call::Rollback(transaction)).await?;
        self.handle.requested(Op::Rollback);
        Ok(())
    }

    async fn response(&mut self) -> WireResult<Response> {
        self.handle.record(Call::Response).await?;
        let mut state = self.handle.lock();
        let handle = match state.last_request.take() {
            Some(Op::Attach) | Some(Op::Create) => ATTACHMENT,
            Some(Op::Begin) => {
                let handle = state.next_transaction;
                state.next_transaction += 1;
                handle
            }
            _ => 0,
        };
        Ok(Response {
            handle,
            ..Response::default()
        })
    }

    async fn prepare(
        &mut self,
        transaction: TransactionHandle,
        sql: &str,
    ) -> WireResult<PreparedInfo> {
        self.handle
            .record(Call::Prepare {
                transaction,
                sql: sql.to_string(),
            })
            .await?;
        let mut state = self.handle.lock();
        let handle = StatementHandle(state.next_statement);
        state.next_statement += 1;
        Ok(PreparedInfo {
            handle,
            param_count: sql.matches('?').count(),
            columns: state.columns.clone(),
        })
    }

    async fn execute(
        &mut self,
        statement: StatementHandle,
        transaction: TransactionHandle,
        args: &[Value],
    ) -> WireResult<u64> {
        self.handle
            .record(Call::Execute {
                statement,
                transaction,
                args: args.to_vec(),
            })
            .await?;
        Ok(self.handle.lock().rows_affected)
    }

    async fn open_cursor(
        &mut self,
        statement: StatementHandle,
        transaction: TransactionHandle,
        args: &[Value],
    ) -> WireResult<()> {
        self.handle
            .record(Call::OpenCursor {
                statement,
                transaction,
                args: args.to_vec(),
            })
            .await
    }

    async fn fetch(&mut self, statement: StatementHandle, count: usize) -> WireResult<FetchBatch> {
        self.handle.record(Call::Fetch { statement, count }).await?;
        let mut state = self.handle.lock();
        let take = count.min(state.rows.len());
        let rows: Vec<_> = state.rows.drain(..take).collect();
        Ok(FetchBatch {
            rows,
            end_of_data: state.rows.is_empty(),
        })
    }

    async fn free_statement(&mut self, statement: StatementHandle) -> WireResult<()> {
        self.handle.record(Call::Free(statement)).await
    }

    async fn shutdown(&mut self) -> WireResult<()> {
        self.handle.record(Call::Shutdown).await
    }
}

/// Connector handing out [`MockWire`]s that share one [`MockHandle`]
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub handle: MockHandle,
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockWire;

    async fn connect(&self, host: &str, port: u16) -> WireResult<MockWire> {
        self.handle
            .record(Call::Dial {
                host: host.to_string(),
                port,
            })
            .await?;
        Ok(self.handle.wire())
    }
}

pub fn test_keys() -> KeyPair {
    KeyPair::new(vec![0x04, 0x2a], vec![0x13, 0x37])
}

pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::builder("localhost", "employee", "sysdba")
        .password("masterkey")
        .build()
}

/// Open a connection over a fresh mock; the handshake calls are cleared
pub async fn open() -> (Connection<MockWire>, MockHandle) {
    open_with(test_config()).await
}

pub async fn open_with(config: ConnectionConfig) -> (Connection<MockWire>, MockHandle) {
    init_tracing();
    let handle = MockHandle::new();
    let conn = Connection::open(handle.wire(), config, &test_keys)
        .await
        .expect("open");
    handle.clear_calls();
    (conn, handle)
}

/// Poison `conn` through a network failure on a plain exec
pub async fn poison(conn: &mut Connection<MockWire>, handle: &MockHandle) {
    handle.fail_next(Op::Prepare, WireError::network("connection reset by peer"));
    let err = conn.exec("SELECT 1 FROM RDB$DATABASE", &[]).await.unwrap_err();
    assert!(err.is_bad_connection());
    handle.clear_calls();
}
