//! Error handling for confect.
//!
//! This module provides the crate-wide error type and result alias. The error
//! system follows two principles:
//! 1. **Strongly-typed errors** for precise handling at call sites
//! 2. **Recoverability encoded in the API**, not in the error type: failures
//!    that the design recovers from (a missing merge tier, a type-mismatched
//!    override, an unregistered helper) never surface as a [`ConfectError`] at
//!    all — they are logged, skipped, or rendered as visible placeholders
//!
//! # Error Categories
//!
//! - **Resolution**: [`ConfectError::NotFound`], [`ConfectError::BrokenConfig`]
//! - **Parsing**: [`ConfectError::Parse`]
//! - **Templating**: [`ConfectError::Compile`], [`ConfectError::Render`]
//! - **Persistence**: [`ConfectError::ReadOnly`], [`ConfectError::Store`]
//! - **Caller errors**: [`ConfectError::InvalidArgument`] — these indicate
//!   programmer error at the call site and always fail fast

use thiserror::Error;

/// The main error type for confect operations.
#[derive(Error, Debug)]
pub enum ConfectError {
    /// A configuration reference could not be resolved to a document.
    ///
    /// Raised by direct loads. During compose, unresolvable tiers are
    /// tolerated (recorded as absent and logged) unless strict mode converts
    /// them into [`ConfectError::BrokenConfig`].
    #[error("configuration not found: '{reference}'")]
    NotFound {
        /// The logical reference (id or path) that failed to resolve
        reference: String,
    },

    /// A merge tier failed to load while `exception_on_broken_config` was set.
    #[error("error loading config file '{path}'")]
    BrokenConfig {
        /// The resolved path or reference of the broken tier
        path: String,
    },

    /// A fetched document is not valid JSON.
    #[error("could not parse configuration '{reference}'")]
    Parse {
        /// The reference of the unparsable document
        reference: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Template compilation failed past the retry budget.
    ///
    /// Carries the offending source so the failing template is identifiable
    /// in logs without re-running the compilation.
    #[error("exception compiling template: {cause} (source: {source_text})")]
    Compile {
        /// The template source that failed to compile
        source_text: String,
        /// Description of the underlying parse failure
        cause: String,
    },

    /// Template execution failed.
    #[error("template render error: {0}")]
    Render(String),

    /// A caller passed an invalid argument (empty cache key, missing
    /// mandatory parameter). Always fatal, never recovered.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempt to save a configuration that was not loaded writable.
    #[error("config in readonly mode")]
    ReadOnly,

    /// The document store reported a failure.
    #[error("document store error: {0}")]
    Store(String),

    /// The remote configuration service reported a failure.
    #[error("remote config service error: {0}")]
    Remote(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T, E = ConfectError> = std::result::Result<T, E>;
