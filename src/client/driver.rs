//! Driver: explicit composition root for opening connections

use super::connection_string::ConnectionInfo;
use crate::auth::KeyGenerator;
use crate::connection::{round_trip, Connection, ConnectionConfig, ConnectionState};
use crate::metrics::{counters, labels};
use crate::protocol::{Wire, WireResult};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Dials the server and yields a fresh, unauthenticated wire
#[async_trait]
pub trait Connector: Send + Sync {
    /// Wire implementation produced by this connector
    type Transport: Wire;

    /// Open a channel to `host:port`
    async fn connect(&self, host: &str, port: u16) -> WireResult<Self::Transport>;
}

/// Opens Firebird connections from connection strings
///
/// Holds the collaborators a connection needs but does not own: the
/// [`Connector`] that dials and the [`KeyGenerator`] for handshake keys.
///
/// # Examples
///
/// ```ignore
/// let driver = Driver::new(TcpConnector::default(), srp_keys);
/// let mut conn = driver.open("sysdba:masterkey@localhost/employee").await?;
/// conn.exec("DELETE FROM audit_log", &[]).await?;
/// conn.commit().await?;
/// ```
pub struct Driver<C: Connector> {
    connector: C,
    keys: Arc<dyn KeyGenerator>,
}

impl<C: Connector> std::fmt::Debug for Driver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

impl<C: Connector> Driver<C> {
    /// Create a driver from its collaborators
    pub fn new(connector: C, keys: impl KeyGenerator + 'static) -> Self {
        Self {
            connector,
            keys: Arc::new(keys),
        }
    }

    /// Connect and attach using a connection string
    pub async fn open(&self, connection_string: &str) -> Result<Connection<C::Transport>> {
        let info = ConnectionInfo::parse(connection_string)?;
        self.open_with_config(info.to_config()).await
    }

    /// Connect and attach using an explicit configuration
    pub async fn open_with_config(
        &self,
        config: ConnectionConfig,
    ) -> Result<Connection<C::Transport>> {
        let wire = self.dial(&config).await?;
        Connection::open(wire, config, self.keys.as_ref()).await
    }

    /// Connect and create the database named by a connection string
    pub async fn create_database(
        &self,
        connection_string: &str,
    ) -> Result<Connection<C::Transport>> {
        let info = ConnectionInfo::parse(connection_string)?;
        self.create_database_with_config(info.to_config()).await
    }

    /// Connect and create a database using an explicit configuration
    pub async fn create_database_with_config(
        &self,
        config: ConnectionConfig,
    ) -> Result<Connection<C::Transport>> {
        let wire = self.dial(&config).await?;
        Connection::create(wire, config, self.keys.as_ref()).await
    }

    async fn dial(&self, config: &ConnectionConfig) -> Result<C::Transport> {
        let dialed = round_trip(
            config.connect_timeout,
            self.connector.connect(&config.host, config.port),
        )
        .await;

        dialed.map_err(|e| {
            counters::connection_opened(labels::OUTCOME_ERROR);
            tracing::debug!(address = %config.address(), error = %e, "dial failed");
            ConnectionState::Connecting.classify(e)
        })
    }
}
