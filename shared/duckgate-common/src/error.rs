//! Error types for duckgate

use thiserror::Error;

/// Duckgate operation errors
///
/// Every failure class a caller can observe maps to one variant; handlers
/// serialize the message into the structured `error` field of the response
/// body, so no error ever degrades to a bare transport failure.
#[derive(Error, Debug)]
pub enum DuckGateError {
    /// Unsupported transport version or missing required header; rejected
    /// before any session state exists
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Unparseable row line in an append stream
    #[error("Malformed input: {0}")]
    MalformedInputError(String),

    /// Value count exceeds column count, or a temporal literal that no
    /// accepted format can parse
    #[error("Schema mismatch: {0}")]
    SchemaMismatchError(String),

    /// Cannot open or validate the engine connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A statement in an execute batch failed; the whole batch rolls back
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// DuckDB engine error
    #[error("Engine error: {0}")]
    EngineError(String),

    /// Failure reported by the server in a response body, surfaced
    /// client-side
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DuckGateError {
    /// Whether the failure is the caller's fault and should be rejected with
    /// a client-error status rather than a server-error one.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, DuckGateError::ProtocolError(_))
    }
}

// Error conversions for engine and serde operations

impl From<duckdb::Error> for DuckGateError {
    fn from(err: duckdb::Error) -> Self {
        DuckGateError::EngineError(err.to_string())
    }
}

impl From<serde_json::Error> for DuckGateError {
    fn from(err: serde_json::Error) -> Self {
        DuckGateError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for DuckGateError {
    fn from(err: anyhow::Error) -> Self {
        DuckGateError::InternalError(err.to_string())
    }
}

impl From<std::env::VarError> for DuckGateError {
    fn from(err: std::env::VarError) -> Self {
        DuckGateError::ConfigError(err.to_string())
    }
}
