//! Duckgate Common Library
//!
//! Shared types and utilities for the duckgate server and client. Both sides
//! speak the same wire protocol: JSON request/response bodies for execute and
//! query, and newline-delimited JSON row records for streaming append.

pub mod coerce;
pub mod config;
pub mod error;
pub mod metadata;
pub mod types;

// Re-export commonly used types
pub use coerce::{coerce_value, engine_value_from_json};
pub use config::ServerConfig;
pub use error::DuckGateError;
pub use metadata::{resolve_column_metadata, ColumnMetadata};
pub use types::{
    AppendResponse, CellValue, ExecuteRequest, ExecuteResponse, QueryRequest, QueryResponse,
    RowMessage, Statement, APPEND_ROUTE, DEFAULT_SCHEMA, EXECUTE_ROUTE, HEADER_CONNECTION_STRING,
    HEADER_DATABASE, HEADER_SCHEMA, HEADER_TABLE, HEALTH_ROUTE, PING_ROUTE, QUERY_ROUTE,
};

/// Result type alias for duckgate operations
pub type Result<T> = std::result::Result<T, DuckGateError>;
