use anyhow::Context as _;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::Value;

/// Assert status code matches expected
pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "{context}: expected status {expected}, got {actual}"
    );
}

/// Assert status is 2xx success
pub fn assert_success(status: StatusCode, context: &str) {
    assert!(
        status.is_success(),
        "{context}: expected success status, got {status}"
    );
}

/// Assert a JSON error body carries the given machine-readable code
pub fn assert_error_code(body: &Bytes, expected: &str) -> anyhow::Result<()> {
    let value = json_body(body)?;
    let code = value
        .get("error")
        .and_then(|v| v.as_str())
        .context("error body has an `error` code")?;
    assert_eq!(code, expected, "unexpected error body: {value}");
    assert!(
        value.get("message").and_then(|v| v.as_str()).is_some(),
        "error body has a message: {value}"
    );
    Ok(())
}

pub fn json_body(body: &Bytes) -> anyhow::Result<Value> {
    serde_json::from_slice(body).context("parse response body as JSON")
}

pub fn to_json_body(value: &Value) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// `id` of an entry returned by the API
pub fn entry_id(entry: &Value) -> anyhow::Result<String> {
    entry
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .context("entry has id")
}

/// `status` of an entry returned by the API
pub fn entry_status(entry: &Value) -> Option<&str> {
    entry.get("status").and_then(|v| v.as_str())
}

/// Patient references of a JSON array of entries, in order
pub fn patient_refs(entries: &Value) -> anyhow::Result<Vec<String>> {
    let entries = entries.as_array().context("body is an array")?;
    Ok(entries
        .iter()
        .filter_map(|e| e.get("patient_ref").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patient_refs() {
        let entries = json!([
            { "id": "a", "patient_ref": "p-1" },
            { "id": "b", "patient_ref": "p-2" }
        ]);
        assert_eq!(patient_refs(&entries).unwrap(), vec!["p-1", "p-2"]);
        assert_eq!(entry_id(&entries[0]).unwrap(), "a");
    }
}
