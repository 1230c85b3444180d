//! Parameter extraction.
//!
//! Path captures come first. PUT and POST then merge a JSON object body on
//! top; every other verb merges the query string instead. Query values are
//! HTML-escaped and repeated keys become arrays.

use axum::http::Method;
use serde_json::{Map, Value};

use crate::routing::PathParams;

/// Why a request's parameters could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
}

/// Build the RPC parameter object for one request.
pub fn extract_params(
    method: &Method,
    path_params: &PathParams,
    query: Option<&str>,
    body: &[u8],
) -> Result<Map<String, Value>, ParamError> {
    let mut params: Map<String, Value> = path_params
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();

    if *method == Method::PUT || *method == Method::POST {
        if !body.iter().all(u8::is_ascii_whitespace) {
            let decoded: Value =
                serde_json::from_slice(body).map_err(|e| ParamError::MalformedBody(e.to_string()))?;
            match decoded {
                Value::Object(more) => params.extend(more),
                _ => return Err(ParamError::NotAnObject),
            }
        }
    } else if let Some(query) = query {
        params.extend(parse_query_string(query));
    }

    Ok(params)
}

/// Decode a query string. Single values stay strings; repeated keys become arrays.
pub fn parse_query_string(query: &str) -> Map<String, Value> {
    let mut params = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        let value = Value::String(html_escape(&value));
        match params.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key.into_owned(), value);
            }
        }
    }
    params
}

fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
