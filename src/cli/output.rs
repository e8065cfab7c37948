//! JSON envelope for `--json` output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RouterError;

/// Schema tag carried by every JSON document.
pub const SCHEMA_VERSION: &str = "llmroute.v1";

/// Top-level JSON envelope for robot mode output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }
}

/// Machine-readable error body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: &'static str,
    pub category: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl From<&RouterError> for ErrorReport {
    fn from(err: &RouterError) -> Self {
        Self {
            code: err.error_code(),
            category: format!("{:?}", err.category()).to_lowercase(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            hint: err.hint(),
        }
    }
}

/// Render an error for stderr in the requested format.
#[must_use]
pub fn render_error(err: &RouterError, json: bool) -> String {
    if json {
        let envelope = RobotOutput {
            errors: vec![err.to_string()],
            ..RobotOutput::new("error", ErrorReport::from(err))
        };
        serde_json::to_string(&envelope).unwrap_or_else(|_| err.to_string())
    } else {
        let mut out = format!("error[{}]: {err}", err.error_code());
        if let Some(hint) = err.hint() {
            out.push_str("\n  hint: ");
            out.push_str(hint);
        }
        out
    }
}
