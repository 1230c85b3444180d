//! Error code table.
//!
//! Maps symbolic error names to numeric RPC codes and the HTTP status each
//! renders as. The table is built from configuration and can be swapped at
//! runtime; nothing below the dispatcher hardcodes a status.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::StatusCode;

use crate::bus::envelope::RpcError;
use crate::config::ErrorCodeConfig;

pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const BAD_REQUEST: &str = "BAD_REQUEST";
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
pub const INVALID_PARAMETERS: &str = "INVALID_PARAMETERS";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
pub const CONFLICT: &str = "CONFLICT";

/// RPC code used for requests the gateway itself rejects as malformed.
pub const INVALID_REQUEST_CODE: i64 = -32600;
const INTERNAL_ERROR_CODE: i64 = -32603;

/// A table shared with code that builds errors outside a request, such as
/// the embedded backend. Reloads store into it.
pub type SharedCodes = Arc<ArcSwap<ErrorCodeTable>>;

/// One row of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub rpc: i64,
    pub status: StatusCode,
}

/// Symbol → (RPC code, HTTP status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeTable {
    by_name: BTreeMap<String, ErrorCode>,
}

impl Default for ErrorCodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ErrorCodeTable {
    /// JSON-RPC reserved codes plus the HTTP-flavoured resource codes.
    pub fn standard() -> Self {
        let rows = [
            (PARSE_ERROR, -32700, StatusCode::INTERNAL_SERVER_ERROR),
            (INVALID_REQUEST, INVALID_REQUEST_CODE, StatusCode::BAD_REQUEST),
            (BAD_REQUEST, INVALID_REQUEST_CODE, StatusCode::BAD_REQUEST),
            (METHOD_NOT_FOUND, -32601, StatusCode::INTERNAL_SERVER_ERROR),
            (INVALID_PARAMETERS, -32602, StatusCode::BAD_REQUEST),
            (INTERNAL_ERROR, INTERNAL_ERROR_CODE, StatusCode::INTERNAL_SERVER_ERROR),
            (NOT_FOUND, 404, StatusCode::NOT_FOUND),
            (METHOD_NOT_ALLOWED, 405, StatusCode::METHOD_NOT_ALLOWED),
            (CONFLICT, 409, StatusCode::CONFLICT),
        ];
        Self {
            by_name: rows
                .into_iter()
                .map(|(name, rpc, status)| (name.to_string(), ErrorCode { rpc, status }))
                .collect(),
        }
    }

    /// The standard table with configured rows layered on top.
    pub fn from_config(overrides: &BTreeMap<String, ErrorCodeConfig>) -> Self {
        let mut table = Self::standard();
        for (name, row) in overrides {
            match StatusCode::from_u16(row.http) {
                Ok(status) => {
                    table.by_name.insert(name.clone(), ErrorCode { rpc: row.rpc, status });
                }
                Err(_) => tracing::warn!(name = %name, http = row.http, "Ignoring error code with invalid status"),
            }
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<ErrorCode> {
        self.by_name.get(name).copied()
    }

    /// Numeric code for `name`, falling back to the internal error code.
    pub fn code(&self, name: &str) -> i64 {
        self.get(name)
            .or_else(|| self.get(INTERNAL_ERROR))
            .map(|row| row.rpc)
            .unwrap_or(INTERNAL_ERROR_CODE)
    }

    /// Build an error object for `name`.
    pub fn error(&self, name: &str, message: impl Into<String>) -> RpcError {
        RpcError::new(self.code(name), message)
    }

    /// HTTP status for a numeric code. `None` when the code is not in the table.
    pub fn status_for(&self, rpc: i64) -> Option<StatusCode> {
        self.by_name
            .values()
            .find(|row| row.rpc == rpc)
            .map(|row| row.status)
    }
}
