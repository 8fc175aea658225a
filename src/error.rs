//! Error types for the doc2tree library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`Doc2TreeError`] — **Fatal**: the pipeline cannot proceed (unreadable
//!   source file, corrupt PDF, unreachable store, invalid configuration).
//!   A fatal error during a stage leaves the transaction in a terminal
//!   `failed` snapshot with a human-readable message.
//!
//! * [`EnhancementError`] — **Non-fatal**: a reasoning-service refinement
//!   call failed or returned unusable output. The pipeline logs it and
//!   continues with the locally-built structure; enhancement is an optional
//!   accelerant, never a correctness dependency.
//!
//! * [`ServiceError`] — the failure surface of the
//!   [`crate::reasoning::ReasoningService`] interface itself (auth, rate
//!   limit, timeout, malformed response). Always wrapped into an
//!   [`EnhancementError`] before it reaches the pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2tree library.
///
/// Enhancement failures use [`EnhancementError`] and never appear here.
#[derive(Debug, Error)]
pub enum Doc2TreeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file extension maps to no supported document type.
    #[error("unsupported document format: '{filename}' (expected .pdf, .png, .jpg or .jpeg)")]
    UnsupportedFormat { filename: String },

    /// The extractor cannot handle this input (e.g. a raster image was given
    /// to the PDF-only production extractor).
    #[error("no extractor available for '{filename}': {hint}")]
    ExtractorUnavailable { filename: String, hint: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The document exists but its structure cannot be parsed.
    #[error("document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// Reading the source file failed.
    #[error("failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Persistence errors ────────────────────────────────────────────────
    /// Writing a snapshot to the durable mirror failed.
    #[error("failed to persist snapshot '{path}': {source}")]
    SnapshotWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot on disk could not be decoded.
    #[error("failed to decode snapshot '{path}': {detail}")]
    SnapshotCorrupt { path: PathBuf, detail: String },

    /// An operation referenced a transaction id the store has never seen.
    #[error("unknown transaction: {transaction_id}")]
    UnknownTransaction { transaction_id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure surface of the reasoning-service collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Authentication rejected (401/403) — retrying will not help.
    #[error("reasoning service authentication failed: {detail}")]
    Auth { detail: String },

    /// The service returned HTTP 429; fixed pacing is the only defense, so
    /// the call is simply reported as failed.
    #[error("reasoning service rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The call exceeded the client-side timeout.
    #[error("reasoning service call timed out")]
    Timeout,

    /// Any other non-success HTTP status.
    #[error("reasoning service returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("reasoning service unreachable: {detail}")]
    Transport { detail: String },

    /// The response body was not the JSON the schema asked for.
    #[error("reasoning service returned malformed output: {detail}")]
    MalformedResponse { detail: String },
}

/// A non-fatal enhancement failure.
///
/// Carried by workers inside the bounded scheduler and logged by the
/// pipeline; the pre-enhancement data stays authoritative.
#[derive(Debug, Error)]
pub enum EnhancementError {
    /// The underlying service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The service answered, but the payload did not fit the expected shape.
    #[error("unusable enhancement output: {detail}")]
    Unusable { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = Doc2TreeError::UnsupportedFormat {
            filename: "scan.bmp".into(),
        };
        assert!(e.to_string().contains("scan.bmp"));
    }

    #[test]
    fn service_error_wraps_into_enhancement_error() {
        let e: EnhancementError = ServiceError::Timeout.into();
        assert!(e.to_string().contains("timed out"));
    }

    #[test]
    fn http_error_display() {
        let e = ServiceError::Http {
            status: 503,
            detail: "overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("overloaded"));
    }
}
