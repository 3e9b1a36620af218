//! Log entry types

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedResult;

/// One line of the JSONL event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp with milliseconds
    pub ts: String,
    /// trace, debug, info, warn or error
    pub level: String,
    /// Module path of the event
    pub target: String,
    pub msg: String,
    /// Structured fields of the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Enclosing spans, outermost first, joined with ` > `
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// A structured field rendered as a string
    pub fn field(&self, name: &str) -> Option<String> {
        let value = self.fields.as_ref()?.get(name)?;
        Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn to_json_line(&self) -> FeedResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> FeedResult<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Read every entry of a log file. Blank or malformed lines are skipped.
pub fn read_entries(path: impl AsRef<Path>) -> FeedResult<Vec<LogEntry>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| LogEntry::from_json_line(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization() {
        let entry = LogEntry::new("warn", "feedsync_core::sync::engine", "Live query failed")
            .with_fields(serde_json::json!({ "collection": "posts", "id": 3 }));
        let json = entry.to_json_line().unwrap();
        assert!(json.contains("\"level\":\"warn\""));
        assert!(!json.contains("\"span\""));

        let parsed = LogEntry::from_json_line(&json).unwrap();
        assert_eq!(parsed.field("collection").as_deref(), Some("posts"));
        assert_eq!(parsed.field("id").as_deref(), Some("3"));
        assert_eq!(parsed.field("missing"), None);
    }

    #[test]
    fn test_read_entries_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let good = LogEntry::new("info", "t", "hello").to_json_line().unwrap();
        std::fs::write(&path, format!("{}\n\nnot json\n{}\n", good, good)).unwrap();
        assert_eq!(read_entries(&path).unwrap().len(), 2);
    }
}
