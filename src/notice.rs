//! Purpose: Structured, non-fatal stderr notices emitted while a session runs.
//! Exports: `Notice`, `notice_json`, `now_rfc3339`.
//! Role: CLI diagnostics for run outcomes and link arrivals; stdout stays reserved for results.
//! Invariants: Notices never alter stdout payloads.
//! Invariants: Field set is additive-only; `details` carries event-specific data.
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub epoch: u64,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(kind: &str, cmd: &str, epoch: u64, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            time: now_rfc3339(),
            cmd: cmd.to_string(),
            epoch,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("epoch".to_string(), json!(notice.epoch));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

#[cfg(test)]
mod tests {
    use super::{Notice, notice_json};

    #[test]
    fn notice_json_has_required_fields() {
        let mut notice = Notice::new("outcome", "session", 2, "run superseded by refocus")
            .with_detail("percent", 50);
        notice.time = "2026-02-01T00:00:00Z".to_string();

        let value = notice_json(&notice);
        let obj = value
            .get("notice")
            .and_then(|v| v.as_object())
            .expect("notice object");

        assert_eq!(obj.get("kind").and_then(|v| v.as_str()), Some("outcome"));
        assert_eq!(
            obj.get("time").and_then(|v| v.as_str()),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(obj.get("cmd").and_then(|v| v.as_str()), Some("session"));
        assert_eq!(obj.get("epoch").and_then(|v| v.as_u64()), Some(2));
        assert_eq!(
            obj.get("details")
                .and_then(|v| v.get("percent"))
                .and_then(|v| v.as_u64()),
            Some(50)
        );
    }

    #[test]
    fn notice_time_is_rfc3339() {
        let notice = Notice::new("link", "session", 1, "link received");
        assert!(
            time::OffsetDateTime::parse(
                &notice.time,
                &time::format_description::well_known::Rfc3339
            )
            .is_ok()
        );
    }
}
