//! Wire types for the duckgate protocol
//!
//! Shared between the server handlers and the client. Field names follow the
//! wire contract (`rv`, `rowsAppended`, `rowsAffected`), not Rust convention.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const EXECUTE_ROUTE: &str = "/api/execute";
pub const QUERY_ROUTE: &str = "/api/query";
pub const APPEND_ROUTE: &str = "/api/append";
pub const PING_ROUTE: &str = "/api/ping";
pub const HEALTH_ROUTE: &str = "/health";

pub const HEADER_CONNECTION_STRING: &str = "x-duckdb-connection-string";
pub const HEADER_DATABASE: &str = "x-duckdb-database";
pub const HEADER_SCHEMA: &str = "x-duckdb-schema";
pub const HEADER_TABLE: &str = "x-duckdb-table";

/// Schema used when the schema header is absent
pub const DEFAULT_SCHEMA: &str = "main";

/// One loosely-typed scalar inside a row record.
///
/// Closed variant set; coercion dispatches on declared column type x tag.
/// JSON arrays and objects are rejected at decode time, with one exception:
/// an array whose elements are all integers in 0..=255 decodes as `Bytes`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    /// Variant name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Integer(_) => "integer",
            CellValue::Float(_) => "float",
            CellValue::Boolean(_) => "boolean",
            CellValue::Text(_) => "text",
            CellValue::Bytes(_) => "bytes",
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Integer(v) => serializer.serialize_i64(*v),
            CellValue::Float(v) => serializer.serialize_f64(*v),
            CellValue::Boolean(v) => serializer.serialize_bool(*v),
            CellValue::Text(v) => serializer.serialize_str(v),
            CellValue::Bytes(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for byte in v {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
        }
    }
}

struct CellValueVisitor;

impl<'de> Visitor<'de> for CellValueVisitor {
    type Value = CellValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON scalar (null, number, boolean, or string)")
    }

    fn visit_unit<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<CellValue, E> {
        Ok(CellValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CellValue, E> {
        Ok(CellValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CellValue, E> {
        Ok(CellValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CellValue, E> {
        // Collapsing to f64 would silently corrupt large integers
        match i64::try_from(v) {
            Ok(v) => Ok(CellValue::Integer(v)),
            Err(_) => Err(de::Error::custom(format!(
                "integer {v} does not fit in a signed 64-bit value"
            ))),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CellValue, E> {
        Ok(CellValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CellValue, E> {
        Ok(CellValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CellValue, E> {
        Ok(CellValue::Text(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<CellValue, A::Error> {
        let mut bytes = Vec::new();
        while let Some(element) = seq.next_element::<CellValue>()? {
            match element {
                CellValue::Integer(v) if (0..=255).contains(&v) => bytes.push(v as u8),
                other => {
                    return Err(de::Error::custom(format!(
                        "nested {} values are not supported in row cells",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(CellValue::Bytes(bytes))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, _map: A) -> Result<CellValue, A::Error> {
        Err(de::Error::custom(
            "JSON objects are not supported in row cells",
        ))
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<CellValue, D::Error> {
        deserializer.deserialize_any(CellValueVisitor)
    }
}

/// One row record on the append wire: `{"rv": [v1, v2, ...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMessage {
    #[serde(rename = "rv")]
    pub values: Vec<CellValue>,
}

impl RowMessage {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }
}

/// Append response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    #[serde(rename = "rowsAppended")]
    pub rows_appended: i64,
    pub error: Option<String>,
}

impl AppendResponse {
    /// Create a successful response
    pub fn success(rows_appended: i64) -> Self {
        Self {
            rows_appended,
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rows_appended: 0,
            error: Some(message.into()),
        }
    }
}

/// One statement in an execute batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub query: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }
}

/// Execute request body: an ordered JSON list of statements, run inside one
/// transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecuteRequest {
    pub statements: Vec<Statement>,
}

impl ExecuteRequest {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

/// Execute response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(rename = "rowsAffected")]
    pub rows_affected: i64,
    pub error: Option<String>,
}

impl ExecuteResponse {
    /// Create a successful response
    pub fn success(rows_affected: i64) -> Self {
        Self {
            rows_affected,
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rows_affected: 0,
            error: Some(message.into()),
        }
    }
}

/// Query request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }
}

/// Query response body: rows as column-keyed value mappings in cursor order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub error: Option<String>,
}

impl QueryResponse {
    /// Create a successful response
    pub fn success(rows: Vec<serde_json::Map<String, serde_json::Value>>) -> Self {
        Self { rows, error: None }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_decodes_scalars() {
        let row: RowMessage =
            serde_json::from_str(r#"{"rv": [null, 42, 3.5, true, "hello"]}"#).unwrap();
        assert_eq!(
            row.values,
            vec![
                CellValue::Null,
                CellValue::Integer(42),
                CellValue::Float(3.5),
                CellValue::Boolean(true),
                CellValue::Text("hello".to_string()),
            ]
        );
    }

    #[test]
    fn test_cell_value_integer_stays_integer() {
        // An integral JSON number must not collapse into Float
        let cell: CellValue = serde_json::from_str("100000").unwrap();
        assert_eq!(cell, CellValue::Integer(100_000));
    }

    #[test]
    fn test_cell_value_rejects_oversized_integer() {
        // One past i64::MAX must fail loudly, not round through f64
        let result: Result<CellValue, _> = serde_json::from_str("9223372036854775808");
        assert!(result.is_err());

        let max: CellValue = serde_json::from_str("9223372036854775807").unwrap();
        assert_eq!(max, CellValue::Integer(i64::MAX));
    }

    #[test]
    fn test_cell_value_byte_array() {
        let cell: CellValue = serde_json::from_str("[0, 127, 255]").unwrap();
        assert_eq!(cell, CellValue::Bytes(vec![0, 127, 255]));
    }

    #[test]
    fn test_cell_value_rejects_objects() {
        let result: Result<CellValue, _> = serde_json::from_str(r#"{"a": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_cell_value_rejects_mixed_arrays() {
        let result: Result<CellValue, _> = serde_json::from_str(r#"[1, "two"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_message_round_trip() {
        let row = RowMessage::new(vec![
            CellValue::Integer(7),
            CellValue::Text("x".to_string()),
            CellValue::Null,
        ]);
        let encoded = serde_json::to_string(&row).unwrap();
        assert_eq!(encoded, r#"{"rv":[7,"x",null]}"#);
        let decoded: RowMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_append_response_wire_names() {
        let encoded = serde_json::to_string(&AppendResponse::success(3)).unwrap();
        assert_eq!(encoded, r#"{"rowsAppended":3,"error":null}"#);

        let failed: AppendResponse =
            serde_json::from_str(r#"{"rowsAppended":0,"error":"boom"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_execute_request_is_a_bare_list() {
        let request = ExecuteRequest::new(vec![
            Statement::new("CREATE TABLE t(id BIGINT)"),
            Statement::new("INSERT INTO t VALUES (?)").with_args(vec![serde_json::json!(1)]),
        ]);
        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.starts_with('['));

        let decoded: ExecuteRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.statements.len(), 2);
        assert_eq!(decoded.statements[1].args, vec![serde_json::json!(1)]);
    }

    #[test]
    fn test_query_request_args_default() {
        let request: QueryRequest = serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert!(request.args.is_empty());
    }
}
