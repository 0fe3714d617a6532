//! Duckgate Server
//!
//! HTTP front end for embedded DuckDB. Four data endpoints plus a liveness
//! route:
//! - `POST /api/execute`: ordered statement batch inside one transaction
//! - `POST /api/query`: single statement, column-keyed row mappings
//! - `POST /api/append`: HTTP/2 streaming NDJSON bulk load (the hot path)
//! - `POST /api/ping`: engine connection check
//! - `GET /health`: process liveness
//!
//! DuckDB connections are not Send, so every handler runs its engine work on
//! a blocking task; the append path couples the async body reader to a
//! blocking consumer through one bounded, ordered line channel.

pub mod append;
pub mod execute;
pub mod ping;
pub mod query;
pub mod router;

pub use append::FlushPolicy;
pub use router::route;

// Re-export common types
pub use duckgate_common::{DuckGateError, Result, ServerConfig};
