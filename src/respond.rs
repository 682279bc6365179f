use serde_json::{json, Value};

use crate::error::ShimError;

/// Wrap a query outcome as `{"response": data}` or
/// `{"response": {"error": {"code": .., "message": ..}}}`.
pub fn envelope(outcome: &Result<Value, ShimError>) -> Value {
    match outcome {
        Ok(data) => json!({ "response": data }),
        Err(e) => json!({ "response": { "error": e.to_record() } }),
    }
}

/// Whether an envelope carries an error record rather than data.
pub fn is_error(envelope: &Value) -> bool {
    envelope
        .get("response")
        .and_then(|r| r.get("error"))
        .is_some_and(|e| e.get("code").is_some_and(Value::is_u64))
}
