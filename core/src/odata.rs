//! OData response handling shared by every endpoint parser.
//!
//! # Design
//! The service answers in one of three envelopes depending on the requested
//! metadata level: `{"d": {"results": [...]}}`, `{"d": {...}}` (verbose) or
//! `{"value": ...}` (minimal/none). Parsers first strip the envelope, then
//! deserialize into their declared shape, so they work in any mode.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Map non-success status codes to the appropriate `ApiError` variant.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::Http {
        status: response.status,
        body: response.body.clone(),
    })
}

/// Check the status and return the response payload with its envelope removed.
pub fn parse_value(response: HttpResponse) -> Result<Value, ApiError> {
    check_status(&response)?;
    if response.status == 204 || response.body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let json: Value = serde_json::from_str(&response.body)?;
    Ok(unwrap_envelope(json))
}

pub fn unwrap_envelope(json: Value) -> Value {
    match json {
        Value::Object(mut map) => {
            if let Some(d) = map.remove("d") {
                match d {
                    Value::Object(mut inner) if inner.contains_key("results") => {
                        inner.remove("results").unwrap_or(Value::Null)
                    }
                    other => other,
                }
            } else if let Some(value) = map.remove("value") {
                value
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Function-call results arrive as `{"Name": x}` in verbose mode and as bare
/// `x` otherwise.
pub fn unwrap_scalar(value: Value, function: &str) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key(function) => {
            map.remove(function).unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    let value = parse_value(response)?;
    serde_json::from_value(value).map_err(ApiError::from)
}

pub fn parse_scalar<T: DeserializeOwned>(
    response: HttpResponse,
    function: &str,
) -> Result<T, ApiError> {
    let value = unwrap_scalar(parse_value(response)?, function);
    serde_json::from_value(value).map_err(ApiError::from)
}

/// Parse an empty-result call, still surfacing HTTP failures.
pub fn parse_unit(response: HttpResponse) -> Result<(), ApiError> {
    check_status(&response)
}

/// Type discriminator the service expects on entity payloads.
pub fn metadata(type_name: &str) -> Value {
    json!({ "__metadata": { "type": type_name } })
}

/// Accept a collection either as a bare array or wrapped as `{"results": [...]}`.
pub fn deserialize_results<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Results<T> {
        Bare(Vec<T>),
        Wrapped { results: Vec<T> },
    }

    Ok(match Results::<T>::deserialize(deserializer)? {
        Results::Bare(items) => items,
        Results::Wrapped { results } => results,
    })
}
