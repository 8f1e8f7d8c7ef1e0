//! Error types for the transit API networking core.
//!
//! # Design
//! Errors are split by the stage that produces them. `TransportError` and
//! `DecodeError` fail a whole operation and end up in its result slot, so
//! both are `Clone` and carry messages as owned strings. `RecordError` only
//! ever describes a single record; list decoding logs and drops it instead
//! of propagating. `ClientError` covers everything that can go wrong before
//! a request is on the wire.

use thiserror::Error;

/// Connectivity, timeout, or non-2xx HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a status outside `200..300`, either on the
    /// HTTP response itself or in the envelope's `code` field.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other I/O failure while sending the request or reading the body.
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// The response body could not be turned into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// The envelope carries no payload section.
    #[error("envelope has no payload")]
    MissingPayload,

    /// The payload exists but has the wrong JSON type for the expected shape.
    #[error("unexpected payload: expected {expected}")]
    UnexpectedPayload { expected: &'static str },

    /// The single entry of a single-entry envelope failed to decode.
    #[error("entry failed to decode: {0}")]
    Entry(#[from] RecordError),
}

/// A single record failed to decode into its model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record is not an object, or a field has the wrong type.
    #[error("malformed record: {0}")]
    Shape(String),

    /// A date field does not match the configured date strategy.
    #[error("invalid date in field `{field}`: {reason}")]
    Date { field: &'static str, reason: String },
}

/// Why an operation ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Reading an operation's result outside of the `Completed`/`Failed` states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResultError {
    /// The operation has not reached a terminal state yet.
    #[error("operation has not finished")]
    NotReady,

    /// The operation was cancelled and will never carry a result.
    #[error("operation was cancelled")]
    Cancelled,
}

/// Construction-time failures of the client, queue, and endpoints.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    /// A secondary-API call was made without a secondary base URL.
    #[error("no secondary base URL configured")]
    MissingSecondaryBaseUrl,

    #[error("operation {0} was already submitted")]
    AlreadySubmitted(crate::operation::OperationId),

    #[error("max_concurrent must be at least 1")]
    InvalidConcurrency,

    /// The queue was created outside of a Tokio runtime.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
