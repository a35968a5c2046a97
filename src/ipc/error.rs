use crate::error::{LmsError, LmsResult};
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Envelope a handler outcome.
pub fn respond(id: &str, method: &str, result: LmsResult<serde_json::Value>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => fail(id, method, &e),
    }
}

pub fn fail(id: &str, method: &str, e: &LmsError) -> serde_json::Value {
    match e {
        LmsError::Db(_) | LmsError::Store(_) => {
            tracing::error!(request_id = id, method, error = %e, "store failure")
        }
        _ => tracing::warn!(request_id = id, method, code = e.code(), error = %e, "request rejected"),
    }
    err(id, e.code(), e.to_string(), e.details())
}
