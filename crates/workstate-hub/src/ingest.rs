use crate::error::ApiError;
use serde_json::Value;
use workstate_core::{ReportFields, SessionReport};

/// A validated ingest request, routed to the store operation it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    Session {
        session_id: String,
        fields: ReportFields,
    },
    Thread {
        session_id: String,
        thread_id: String,
        fields: ReportFields,
    },
}

pub fn parse_report(body: &[u8]) -> Result<Ingest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MissingSessionId);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|err| ApiError::InvalidBody(err.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::InvalidBody(format!(
            "expected an object, found {}",
            json_kind(&value)
        )));
    }
    let report: SessionReport =
        serde_json::from_value(value).map_err(|err| ApiError::InvalidBody(err.to_string()))?;
    route_report(&report)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `parent_id` turns a report into a thread update owned by that session; the
/// reporter's own `session_id` is still required.
pub fn route_report(report: &SessionReport) -> Result<Ingest, ApiError> {
    let session_id = present(report.session_id.as_deref()).ok_or(ApiError::MissingSessionId)?;
    let fields = report.fields();
    match present(report.parent_id.as_deref()) {
        Some(parent_id) => {
            let thread_id =
                present(report.thread_id.as_deref()).ok_or(ApiError::MissingThreadId)?;
            Ok(Ingest::Thread {
                session_id: parent_id,
                thread_id,
                fields,
            })
        }
        None => Ok(Ingest::Session { session_id, fields }),
    }
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}
