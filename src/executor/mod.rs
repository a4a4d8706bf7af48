//! Connection-scoped execution engine
//!
//! [`ScopedExecutor`] brackets every operation with connect and disconnect:
//!
//! ```text
//! Idle -> Connecting -> Connected -> Executing -> {Succeeded | Failed} -> Disconnecting -> Idle
//! ```
//!
//! No connection outlives the call that opened it, so concurrent calls on one
//! executor never share a connection and need no locking. Both suspension
//! points (connect, delegated call) are bounded by a timeout and observe the
//! executor's cancellation token.
//!
//! The module is organized by operation type:
//! - `read`: find, findOne, counts, distinct
//! - `write`: inserts, updates, replace, deletes, bulkWrite
//! - `admin`: database and collection listing, raw commands, watch

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, Connector, MongoConnector, ScopedConnection};
use crate::error::{ConnectionError, OperationError, Result};

mod admin;
mod operation;
mod read;
mod result;
mod write;

#[cfg(test)]
mod mock;

pub use operation::{Operation, OperationKind, OperationRequest, OperationScope, WriteCommand};
pub use result::{
    BulkWriteAck, DeleteAck, ExecutionResult, ExecutionStats, InsertManyAck, InsertOneAck,
    ResultData, UpdateAck,
};

/// Slack past the connect timeout before the outer guard abandons a connect
///
/// The driver bounds server selection by the connect timeout itself; the
/// outer guard must fire later so the connector reports the driver's reason
/// and shuts its client down.
pub const CONNECT_GRACE: Duration = Duration::from_secs(2);

/// Executes each operation on its own freshly opened connection
pub struct ScopedExecutor<C: Connector = MongoConnector> {
    /// Connection factory
    connector: Arc<C>,

    /// Read-only connection settings
    config: Arc<ConnectionConfig>,

    /// Database used when a request names none
    default_database: Arc<str>,

    /// Cancels in-flight connects and operations
    cancel_token: CancellationToken,
}

impl<C: Connector> Clone for ScopedExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            default_database: Arc::clone(&self.default_database),
            cancel_token: self.cancel_token.clone(),
        }
    }
}

impl ScopedExecutor<MongoConnector> {
    /// Executor backed by the MongoDB driver
    pub fn new(config: ConnectionConfig) -> Self {
        let connector = MongoConnector::new(&config);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ScopedExecutor<C> {
    /// Executor using a custom connection factory
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        let default_database: Arc<str> = config.resolved_default_database().into();
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            default_database,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Same executor observing `token` for cancellation
    ///
    /// Once `token` is cancelled every in-flight and future call on the
    /// returned executor fails with a cancellation error.
    pub fn with_cancel_token(&self, token: CancellationToken) -> Self {
        Self {
            cancel_token: token,
            ..self.clone()
        }
    }

    /// Token observed by this executor
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Database used when a request does not name one
    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    /// Resolve an optional database override against the default
    pub fn resolve_database(&self, database: Option<&str>) -> String {
        database
            .unwrap_or(&self.default_database)
            .to_string()
    }

    /// Execute one request on a fresh connection
    ///
    /// The request is validated first; an invalid request never opens a
    /// connection. The connection is released before this returns, whatever
    /// the outcome.
    pub async fn execute(&self, request: OperationRequest) -> Result<ExecutionResult> {
        let collection = request.validate()?.map(str::to_string);
        let database = self.resolve_database(request.database.as_deref());
        let kind = request.kind();
        let operation = request.operation;
        let start = Instant::now();

        let target_db = database.clone();
        let target_coll = collection.clone();
        let data = self
            .with_connection(move |conn| {
                Box::pin(async move {
                    conn.execute(&target_db, target_coll.as_deref(), operation)
                        .await
                })
            })
            .await?;

        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            "{} on '{}' returned {} ({} item(s)) in {}ms",
            kind,
            database,
            data.variant_name(),
            data.returned_len(),
            elapsed
        );

        Ok(ExecutionResult {
            data,
            stats: ExecutionStats {
                execution_time_ms: elapsed,
                database,
                collection,
            },
        })
    }

    /// Run `f` against a connection opened for this call only
    ///
    /// The connection is closed exactly once on every exit path: success,
    /// failure of `f`, timeout, cancellation, or the returned future being
    /// dropped. A failure to close after `f` succeeded is logged and does not
    /// replace the result.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c dyn Connection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let call_id = Uuid::new_v4();
        let scoped = self.acquire(call_id).await?;

        let outcome = match scoped.connection() {
            Ok(conn) => {
                debug!(call_id = %call_id, "Executing");
                self.bounded_operation(f(conn)).await
            }
            Err(e) => Err(e),
        };

        let released = scoped.release().await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(value), Err(close_err)) => {
                warn!(call_id = %call_id, "Operation succeeded but close failed: {}", close_err);
                Ok(value)
            }
            (Err(e), Ok(())) => {
                debug!(call_id = %call_id, "Operation failed: {}", e);
                Err(e)
            }
            (Err(e), Err(close_err)) => {
                warn!(call_id = %call_id, "Close failed after failed operation: {}", close_err);
                Err(e)
            }
        }
    }

    /// Open a connection, bounded by the connect timeout and cancellation
    async fn acquire(&self, call_id: Uuid) -> Result<ScopedConnection> {
        debug!(
            call_id = %call_id,
            "Connecting to {}",
            self.config.redacted_endpoint()
        );

        let limit = self.config.connect_timeout();
        let connect = self.connector.connect(&self.config.endpoint);
        let bound = limit + CONNECT_GRACE;

        let connection = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                return Err(ConnectionError::Cancelled.into());
            }
            result = tokio::time::timeout(bound, connect) => match result {
                Ok(connection) => connection?,
                Err(_) => return Err(ConnectionError::Timeout(limit).into()),
            },
        };

        debug!(call_id = %call_id, "Connected");
        Ok(ScopedConnection::new(connection, call_id))
    }

    /// Await the delegated call, bounded by the operation timeout and cancellation
    async fn bounded_operation<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit: Duration = self.config.operation_timeout();

        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(OperationError::Cancelled.into()),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(result) => result,
                Err(_) => Err(OperationError::Timeout(limit).into()),
            },
        }
    }
}
