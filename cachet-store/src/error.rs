//! Error types for store operations.

use thiserror::Error;

/// Error type for cache store operations.
///
/// The middleware never surfaces these to the caller: a failed `fetch` is
/// treated as a miss, failed writes are logged and swallowed. The split into
/// variants exists for backends and their own observability.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal backend error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send>),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with remote backends.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send>),
}
