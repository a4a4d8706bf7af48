//! Error handling for connection-scoped operations.
//!
//! Every public operation returns [`Result`], whose error half tells apart:
//! - connection failures (endpoint unreachable, bad URI, timeout while connecting)
//! - operation failures (the delegated driver call failed or was rejected)
//! - configuration failures
//!
//! Callers that want the old "log it and carry on" behavior can opt into it per
//! call with [`ResultExt::ok_or_log`].
//!
//! # Example
//!
//! ```rust,no_run
//! use mongoconnect::error::{Result, ResultExt};
//!
//! fn lookup() -> Result<u64> {
//!     Ok(42)
//! }
//!
//! let maybe_count: Option<u64> = lookup().ok_or_log();
//! ```

pub mod kinds;
pub mod mongo;

use tracing::error;

// Re-export commonly used types
pub use kinds::{ConfigError, ConnectionError, MongoConnectError, OperationError, Result};
pub use mongo::ErrorInfo;

/// Extension for callers that prefer an absent value over a typed failure.
pub trait ResultExt<T> {
    /// Log the failure at `error` level and discard it.
    ///
    /// A caller using this cannot distinguish "no match" from "failed"; prefer
    /// matching on the error where that matters.
    fn ok_or_log(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ok_or_log(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}
