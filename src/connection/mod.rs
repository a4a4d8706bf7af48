//! Connection management for MongoDB
//!
//! Connections here are single-use: a [`Connector`] opens one per operation,
//! the operation runs against it, and the connection is closed before the
//! result is handed back. [`ScopedConnection`] owns the connection for that
//! window and makes sure it is closed exactly once, even when the future
//! driving the operation is dropped halfway through.

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ConnectionError, Result};
use crate::executor::{Operation, ResultData};

pub mod mongo;

pub use mongo::{MongoConnection, MongoConnector};

/// Factory for single-use connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `endpoint`
    ///
    /// Implementations must fail here, not on first use, when the endpoint is
    /// unreachable or rejects the credentials, and must release anything they
    /// acquired before returning an error.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>>;
}

/// An established connection to the engine
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run one operation against `database` (and `collection` for
    /// collection-scoped kinds) and return the engine's response
    async fn execute(
        &self,
        database: &str,
        collection: Option<&str>,
        operation: Operation,
    ) -> Result<ResultData>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Connection owned for the duration of one operation
pub struct ScopedConnection {
    /// `None` once released
    inner: Option<Box<dyn Connection>>,

    /// Call identifier, for log correlation
    call_id: Uuid,
}

impl ScopedConnection {
    pub fn new(connection: Box<dyn Connection>, call_id: Uuid) -> Self {
        Self {
            inner: Some(connection),
            call_id,
        }
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> Result<&dyn Connection> {
        self.inner
            .as_deref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Close the connection and consume the scope
    ///
    /// The connection stays owned by the scope until `close` completes, so
    /// dropping this future mid-close still leaves the close to `Drop`.
    pub async fn release(mut self) -> Result<()> {
        let Some(connection) = self.inner.as_mut() else {
            return Ok(());
        };

        debug!(call_id = %self.call_id, "Releasing connection");
        let closed = connection.close().await;
        self.inner = None;
        closed
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        let Some(mut connection) = self.inner.take() else {
            return;
        };

        // The owning future was dropped before `release` ran; finish the
        // close on the runtime instead.
        let call_id = self.call_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(call_id = %call_id, "Connection dropped mid-operation, closing in background");
                handle.spawn(async move {
                    if let Err(e) = connection.close().await {
                        warn!(call_id = %call_id, "Background close failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!(call_id = %call_id, "Connection dropped outside a runtime, close skipped");
            }
        }
    }
}
