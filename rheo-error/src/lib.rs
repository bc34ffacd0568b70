#![allow(clippy::multiple_crate_versions)]
//! Error types for the rheo reactive streams library.
//!
//! This crate defines the root [`RheoError`] type that travels down a stream
//! as the `error` terminal signal. Operators never retry at this layer; an
//! error is delivered at most once per subscriber and closes the stream.
//!
//! # Examples
//!
//! ```
//! use rheo_error::{RheoError, Result};
//!
//! fn parse(input: &str) -> Result<u32> {
//!     input
//!         .parse()
//!         .map_err(|_| RheoError::failed(format!("not a number: {input}")))
//! }
//! ```

use std::sync::Arc;

/// Root error type for all rheo stream signals.
///
/// Errors are delivered to every active subscriber of a multicast operator,
/// so the type is `Clone`; user-provided causes are kept behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RheoError {
    /// A downstream issued `request(0)`.
    ///
    /// Demand amounts are unsigned; zero is the only representable
    /// non-positive request and is a protocol violation. The offending call
    /// is not counted against demand.
    #[error("request amount must be positive")]
    BadRequest,

    /// A bounded operator queue rejected an element.
    ///
    /// This indicates the upstream produced more than the negotiated
    /// prefetch allows. The operator cancels upstream and terminates.
    #[error("queue is full")]
    QueueFull,

    /// A unicast publisher was subscribed to more than once.
    #[error("publisher allows only a single subscriber")]
    AlreadySubscribed,

    /// A source element or user callback failed.
    ///
    /// General-purpose failure carrying a human-readable context, used when
    /// there is no richer cause to wrap.
    #[error("{context}")]
    Failed {
        /// Description of what went wrong.
        context: String,
    },

    /// An error produced by user code, propagated through the stream.
    #[error("user error: {0}")]
    User(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl RheoError {
    /// Create a general stream failure with the given context.
    pub fn failed(context: impl Into<String>) -> Self {
        Self::Failed {
            context: context.into(),
        }
    }

    /// Wrap an error produced by user code.
    pub fn user(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::User(Arc::new(error))
    }

    /// Returns `true` if this error is a protocol violation rather than a
    /// failure originating in user code.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::BadRequest | Self::QueueFull | Self::AlreadySubscribed
        )
    }
}

/// Specialized `Result` for rheo operations.
pub type Result<T> = std::result::Result<T, RheoError>;
