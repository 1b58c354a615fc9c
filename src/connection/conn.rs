//! Core connection type

use super::state::ConnectionState;
use super::statement::{ExecResult, Rows, Statement};
use super::transaction::{ActiveTransaction, Finish, IsolationLevel, Transaction, TxOptions, TxOrigin};
use crate::auth::{AuthPlugin, KeyGenerator, KeyPair};
use crate::protocol::constants::{DEFAULT_FETCH_SIZE, DEFAULT_PORT};
use crate::protocol::{flatten_named, AttachmentHandle, NamedValue, StatementHandle, Value, Wire};
use crate::{Error, Result, WireError, WireErrorKind};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

/// Connection configuration
///
/// Stores the server address, credentials and session options.
/// Use `ConnectionConfig::builder()` for timeouts and fetch sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Server host
    pub host: String,
    /// Server port (default: 3050)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database path or alias
    pub database: String,
    /// Username
    pub user: String,
    /// Password (optional)
    #[serde(default)]
    pub password: Option<String>,
    /// SQL role
    #[serde(default)]
    pub role: Option<String>,
    /// Authentication plugin (default: Srp)
    #[serde(default)]
    pub auth_plugin: AuthPlugin,
    /// Request wire encryption (default: true)
    #[serde(default = "default_wire_crypt")]
    pub wire_crypt: bool,
    /// Bound on connector + handshake + attach
    #[serde(default)]
    pub connect_timeout: Option<Duration>,
    /// Bound on each round trip once attached
    #[serde(default)]
    pub statement_timeout: Option<Duration>,
    /// Rows requested per fetch round trip (default: 400)
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_wire_crypt() -> bool {
    true
}

fn default_fetch_size() -> usize {
    DEFAULT_FETCH_SIZE
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    ///
    /// # Defaults
    ///
    /// - `port`: 3050
    /// - `auth_plugin`: Srp
    /// - `wire_crypt`: true
    /// - `connect_timeout` / `statement_timeout`: None
    /// - `fetch_size`: 400
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::builder(host, database, user).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder("localhost", "employee", "sysdba")
    ///     .password("masterkey")
    ///     .statement_timeout(Duration::from_secs(30))
    ///     .build();
    /// ```
    pub fn builder(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: ConnectionConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                database: database.into(),
                user: user.into(),
                password: None,
                role: None,
                auth_plugin: AuthPlugin::default(),
                wire_crypt: true,
                connect_timeout: None,
                statement_timeout: None,
                fetch_size: DEFAULT_FETCH_SIZE,
            },
        }
    }

    /// Set password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `host:port` for diagnostics
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for creating `ConnectionConfig` with advanced options
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the SQL role
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.config.role = Some(role.into());
        self
    }

    /// Select the authentication plugin
    pub fn auth_plugin(mut self, plugin: AuthPlugin) -> Self {
        self.config.auth_plugin = plugin;
        self
    }

    /// Request or decline wire encryption
    pub fn wire_crypt(mut self, enabled: bool) -> Self {
        self.config.wire_crypt = enabled;
        self
    }

    /// Bound the connector, handshake and attach
    ///
    /// Default: None (no timeout)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = Some(duration);
        self
    }

    /// Bound every round trip after attach.
    ///
    /// An elapsed round trip leaves the channel mid-frame, so it poisons the
    /// connection.
    ///
    /// Default: None (unlimited)
    pub fn statement_timeout(mut self, duration: Duration) -> Self {
        self.config.statement_timeout = Some(duration);
        self
    }

    /// Rows requested per fetch round trip (minimum 1)
    pub fn fetch_size(mut self, rows: usize) -> Self {
        self.config.fetch_size = rows.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Run one wire exchange, optionally under a deadline.
///
/// An elapsed deadline is reported as a network failure.
pub(crate) async fn round_trip<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(WireError::timed_out(limit).into()),
        },
        None => fut.await.map_err(Into::into),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Establish {
    Attach,
    Create,
}

/// Firebird session over one wire
///
/// Not safe for concurrent use: every call takes `&mut self` and holds the
/// wire for one request/response exchange at a time.
pub struct Connection<W: Wire> {
    pub(super) wire: W,
    pub(super) state: ConnectionState,
    pub(super) config: ConnectionConfig,
    pub(super) attachment: AttachmentHandle,
    keys: KeyPair,
    pub(super) transaction: Option<ActiveTransaction>,
    pub(super) unreleased: Vec<StatementHandle>,
}

impl<W: Wire> std::fmt::Debug for Connection<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.config.address())
            .field("database", &self.config.database)
            .field("state", &self.state)
            .field("attachment", &self.attachment)
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl<W: Wire> Connection<W> {
    /// Authenticate over `wire` and attach to an existing database
    pub async fn open(wire: W, config: ConnectionConfig, keys: &dyn KeyGenerator) -> Result<Self> {
        Self::establish(wire, config, keys, Establish::Attach).await
    }

    /// Authenticate over `wire` and create a new database
    pub async fn create(
        wire: W,
        config: ConnectionConfig,
        keys: &dyn KeyGenerator,
    ) -> Result<Self> {
        Self::establish(wire, config, keys, Establish::Create).await
    }

    async fn establish(
        mut wire: W,
        config: ConnectionConfig,
        keys: &dyn KeyGenerator,
        mode: Establish,
    ) -> Result<Self> {
        let span = tracing::info_span!(
            "open",
            address = %config.address(),
            database = %config.database,
            user = %config.user,
            mode = ?mode
        );

        async move {
            let mut state = ConnectionState::Connecting;
            let keys = keys.generate();
            let started = std::time::Instant::now();

            let attached = round_trip(
                config.connect_timeout,
                handshake(&mut wire, &config, &keys, mode),
            )
            .await;

            match attached {
                Ok(attachment) => {
                    state.transition(ConnectionState::Healthy)?;
                    crate::metrics::counters::connection_opened(crate::metrics::labels::OUTCOME_OK);
                    crate::metrics::histograms::open_duration(started.elapsed().as_secs_f64() * 1000.0);
                    tracing::info!(attachment = %attachment, "attached");
                    Ok(Self {
                        wire,
                        state,
                        config,
                        attachment,
                        keys,
                        transaction: None,
                        unreleased: Vec::new(),
                    })
                }
                Err(e) => {
                    crate::metrics::counters::connection_opened(
                        crate::metrics::labels::OUTCOME_ERROR,
                    );
                    tracing::debug!(error = %e, "open failed");
                    Err(state.classify(e))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration this connection was opened with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Server attachment handle
    pub fn attachment(&self) -> AttachmentHandle {
        self.attachment
    }

    /// Ephemeral key material generated for this connection's handshake
    pub fn client_keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Handle of the transaction currently held by the connection, if any
    pub fn transaction_handle(&self) -> Option<crate::protocol::TransactionHandle> {
        self.transaction.map(|t| t.handle)
    }

    /// Whether an implicit transaction is open
    pub fn in_implicit_transaction(&self) -> bool {
        matches!(
            self.transaction,
            Some(ActiveTransaction {
                origin: TxOrigin::Implicit,
                ..
            })
        )
    }

    /// Local liveness check.
    ///
    /// Succeeds iff the connection has not been poisoned. No round trip is
    /// made; a server that silently went away is only noticed on the next
    /// real call.
    pub fn ping(&self) -> Result<()> {
        self.guard()
    }

    /// Begin a transaction at `level`
    pub async fn begin(&mut self, level: IsolationLevel) -> Result<Transaction<'_, W>> {
        self.guard()?;
        let result = self.begin_explicit(level).await;
        let handle = self.check(result)?;
        Ok(Transaction::new(self, handle, level))
    }

    /// Begin a read-committed transaction
    pub async fn begin_default(&mut self) -> Result<Transaction<'_, W>> {
        self.begin(IsolationLevel::ReadCommitted).await
    }

    /// Begin a transaction from standard options.
    ///
    /// `read_only` always selects [`IsolationLevel::ReadCommittedReadOnly`].
    /// Levels without a parameter block fail before any wire traffic.
    pub async fn begin_tx(&mut self, options: TxOptions) -> Result<Transaction<'_, W>> {
        self.guard()?;
        let level = IsolationLevel::from_options(&options)?;
        self.begin(level).await
    }

    /// Begin a transaction from a raw isolation code (0..=4)
    pub async fn begin_code(&mut self, code: i32) -> Result<Transaction<'_, W>> {
        self.guard()?;
        let level = IsolationLevel::try_from(code)?;
        self.begin(level).await
    }

    async fn begin_explicit(
        &mut self,
        level: IsolationLevel,
    ) -> Result<crate::protocol::TransactionHandle> {
        self.release_statements().await?;
        if let Some(active) = self.transaction {
            tracing::warn!(
                transaction = %active.handle,
                origin = ?active.origin,
                "rolling back open transaction before begin"
            );
            self.end_transaction(active.handle, Finish::Rollback).await?;
        }
        self.start_transaction(level, TxOrigin::Explicit).await
    }

    /// Prepare `sql` in the implicit transaction, starting one if needed
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement<'_, W>> {
        self.guard()?;
        let result = self.prepare_implicit(sql).await;
        let (transaction, info) = self.check(result)?;
        Ok(Statement::new(self, transaction, info))
    }

    async fn prepare_implicit(
        &mut self,
        sql: &str,
    ) -> Result<(crate::protocol::TransactionHandle, crate::protocol::PreparedInfo)> {
        let transaction = self.implicit_transaction().await?;
        let info = self.prepare_in(transaction, sql).await?;
        Ok((transaction, info))
    }

    /// Prepare, execute and release `sql` in the implicit transaction
    pub async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.guard()?;
        let result = self.exec_implicit(sql, args).await;
        self.check(result)
    }

    /// [`exec`](Self::exec) with ordinal-tagged arguments
    pub async fn exec_named(&mut self, sql: &str, args: Vec<NamedValue>) -> Result<ExecResult> {
        let args = flatten_named(args);
        self.exec(sql, &args).await
    }

    async fn exec_implicit(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let transaction = self.implicit_transaction().await?;
        self.exec_in(transaction, sql, args).await
    }

    /// Prepare `sql` in the implicit transaction and open its cursor
    pub async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Rows<'_, W>> {
        self.guard()?;
        let result = self.query_implicit(sql, args).await;
        let info = self.check(result)?;
        Ok(Rows::new(self, info))
    }

    /// [`query`](Self::query) with ordinal-tagged arguments
    pub async fn query_named(&mut self, sql: &str, args: Vec<NamedValue>) -> Result<Rows<'_, W>> {
        let args = flatten_named(args);
        self.query(sql, &args).await
    }

    async fn query_implicit(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> Result<crate::protocol::PreparedInfo> {
        let transaction = self.implicit_transaction().await?;
        self.open_in(transaction, sql, args).await
    }

    /// Commit the implicit transaction, if one is open
    pub async fn commit(&mut self) -> Result<()> {
        let result = self.finish_implicit(Finish::Commit).await;
        self.check(result)
    }

    /// Roll back the implicit transaction, if one is open
    pub async fn rollback(&mut self) -> Result<()> {
        let result = self.finish_implicit(Finish::Rollback).await;
        self.check(result)
    }

    async fn finish_implicit(&mut self, finish: Finish) -> Result<()> {
        match self.transaction {
            Some(active) if active.origin == TxOrigin::Implicit => {
                self.end_transaction(active.handle, finish).await
            }
            Some(active) => {
                tracing::warn!(
                    transaction = %active.handle,
                    "transaction dropped without commit or rollback, rolling back"
                );
                self.end_transaction(active.handle, Finish::Rollback).await?;
                if finish == Finish::Commit {
                    return Err(Error::InvalidState {
                        expected: "implicit transaction".into(),
                        actual: "abandoned explicit transaction".into(),
                    });
                }
                Ok(())
            }
            None => self.guard(),
        }
    }

    /// Detach and release the wire.
    ///
    /// Any open transaction is rolled back first. A poisoned connection is
    /// dropped without touching the wire and reports
    /// [`Error::BadConnection`].
    pub async fn close(mut self) -> Result<()> {
        if !self.state.is_healthy() {
            tracing::debug!(state = %self.state, "closing unusable connection locally");
            self.state.transition(ConnectionState::Closed)?;
            return Err(Error::BadConnection);
        }

        let result = self.detach().await;
        let result = self.check(result);
        self.state.transition(ConnectionState::Closed)?;
        tracing::info!(address = %self.config.address(), "connection closed");
        result
    }

    async fn detach(&mut self) -> Result<()> {
        while let Some(statement) = self.unreleased.first().copied() {
            if let Err(e) = self.free_statement(statement).await {
                if e.wire_kind() == Some(WireErrorKind::Network) {
                    return Err(e);
                }
                tracing::warn!(statement = %statement, error = %e, "free before detach failed");
            }
        }

        if let Some(active) = self.transaction {
            if let Err(e) = self.end_transaction(active.handle, Finish::Rollback).await {
                if e.wire_kind() == Some(WireErrorKind::Network) {
                    return Err(e);
                }
                tracing::warn!(error = %e, "rollback before detach failed");
            }
        }

        let limit = self.config.statement_timeout;
        let detached = match round_trip(limit, self.wire.detach(self.attachment)).await {
            Ok(()) => round_trip(limit, self.wire.response()).await.map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = &detached {
            if e.wire_kind() == Some(WireErrorKind::Network) {
                return detached;
            }
        }

        // The transport is released even when the server rejected the detach
        if let Err(e) = self.wire.shutdown().await {
            tracing::debug!(error = %e, "wire shutdown failed");
        }
        detached
    }

    /// Fail fast unless the connection is healthy
    pub(super) fn guard(&self) -> Result<()> {
        if self.state.is_healthy() {
            Ok(())
        } else {
            Err(Error::BadConnection)
        }
    }

    /// Error classifier hook; every public entry point passes its result
    /// through here exactly once.
    pub(super) fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.state.classify(e))
    }

    /// Current implicit transaction, beginning one if none is open.
    ///
    /// An explicit transaction still held here was dropped by its owner and
    /// is rolled back first.
    async fn implicit_transaction(&mut self) -> Result<crate::protocol::TransactionHandle> {
        self.release_statements().await?;
        match self.transaction {
            Some(active) if active.origin == TxOrigin::Implicit => Ok(active.handle),
            Some(active) => {
                tracing::warn!(
                    transaction = %active.handle,
                    "transaction dropped without commit or rollback, rolling back"
                );
                self.end_transaction(active.handle, Finish::Rollback).await?;
                self.start_transaction(IsolationLevel::ReadCommitted, TxOrigin::Implicit)
                    .await
            }
            None => {
                self.start_transaction(IsolationLevel::ReadCommitted, TxOrigin::Implicit)
                    .await
            }
        }
    }
}

async fn handshake<W: Wire>(
    wire: &mut W,
    config: &ConnectionConfig,
    keys: &KeyPair,
    mode: Establish,
) -> Result<AttachmentHandle> {
    wire.connect(config, &keys.public).await?;
    tracing::debug!(plugin = %config.auth_plugin, wire_crypt = config.wire_crypt, "connect sent");

    wire.accept(config, keys).await?;
    tracing::debug!("authentication accepted");

    let password = config.password.as_deref().unwrap_or_default();
    let role = config.role.as_deref();
    match mode {
        Establish::Attach => {
            wire.attach(&config.database, &config.user, password, role)
                .await?
        }
        Establish::Create => {
            wire.create(&config.database, &config.user, password, role)
                .await?
        }
    }
    let response = wire.response().await?;
    Ok(AttachmentHandle(response.handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config() {
        let config = ConnectionConfig::new("localhost", "employee", "sysdba").password("masterkey");

        assert_eq!(config.host, "localhost");
        assert_eq!(config.database, "employee");
        assert_eq!(config.user, "sysdba");
        assert_eq!(config.password, Some("masterkey".to_string()));
        assert_eq!(config.address(), "localhost:3050");
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::new("db.local", "/data/app.fdb", "app");

        assert_eq!(config.port, 3050);
        assert_eq!(config.auth_plugin, AuthPlugin::Srp);
        assert!(config.wire_crypt);
        assert!(config.role.is_none());
        assert!(config.connect_timeout.is_none());
        assert!(config.statement_timeout.is_none());
        assert_eq!(config.fetch_size, 400);
    }

    #[test]
    fn test_connection_config_builder_fluent() {
        let config = ConnectionConfig::builder("db.local", "app", "app_user")
            .port(3051)
            .password("secret")
            .role("RDB$ADMIN")
            .auth_plugin(AuthPlugin::Srp256)
            .wire_crypt(false)
            .connect_timeout(Duration::from_secs(5))
            .statement_timeout(Duration::from_secs(60))
            .fetch_size(0)
            .build();

        assert_eq!(config.port, 3051);
        assert_eq!(config.password, Some("secret".to_string()));
        assert_eq!(config.role, Some("RDB$ADMIN".to_string()));
        assert_eq!(config.auth_plugin, AuthPlugin::Srp256);
        assert!(!config.wire_crypt);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.fetch_size, 1);
    }

    #[test]
    fn test_connection_config_deserialize_fills_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"host": "h", "database": "d", "user": "u", "auth_plugin": "Legacy_Auth"}"#,
        )
        .unwrap();

        assert_eq!(config.port, 3050);
        assert_eq!(config.auth_plugin, AuthPlugin::LegacyAuth);
        assert!(config.wire_crypt);
        assert_eq!(config.fetch_size, 400);
    }

    #[tokio::test]
    async fn test_round_trip_deadline_is_network_error() {
        let result: Result<()> = round_trip(
            Some(Duration::from_millis(10)),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), WireError>(())
            },
        )
        .await;

        assert_eq!(
            result.unwrap_err().wire_kind(),
            Some(WireErrorKind::Network)
        );
    }

    #[tokio::test]
    async fn test_round_trip_without_deadline_passes_result() {
        let result = round_trip(None, async { Ok::<u8, WireError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
