//! Error types for the proxy layer.

use thiserror::Error;

/// Main error type for proxy operations.
///
/// Store failures during immediate writes are deliberately *not* represented
/// here: the mutators downgrade them to a boolean outcome (see
/// [`crate::proxy::BagProxy`]). Only read-side store failures propagate as
/// [`ProxyError::Backing`].
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Occurrence count is negative: {0}")]
    NegativeCount(i64),

    #[error("Null element rejected for field {0}")]
    NullNotAllowed(u32),

    #[error("Backing store error: {0}")]
    Backing(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
