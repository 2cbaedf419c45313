//! On-disk form of the session map: one JSON object keyed by session id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use cligate_core::chat::DEFAULT_MODEL;
use cligate_core::ids::SessionId;
use cligate_core::session::Session;

use crate::error::StoreError;

pub const SESSIONS_FILE: &str = "sessions.json";

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    created_at: String,
    last_used_at: String,
    #[serde(default)]
    message_count: u64,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default = "default_model")]
    model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

impl SessionRecord {
    fn from_session(s: &Session) -> Self {
        Self {
            created_at: format_timestamp(&s.created_at),
            last_used_at: format_timestamp(&s.last_used_at),
            message_count: s.message_count,
            working_dir: s.working_dir.clone(),
            model: s.model.clone(),
        }
    }

    fn into_session(self, id: &str) -> Result<Session, String> {
        let created_at = parse_timestamp(&self.created_at)?;
        let last_used_at = parse_timestamp(&self.last_used_at)?.max(created_at);
        Ok(Session {
            session_id: SessionId::from_raw(id),
            created_at,
            last_used_at,
            message_count: self.message_count,
            working_dir: self.working_dir,
            model: self.model,
        })
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// ISO-8601 with an offset, or a naive local-less form read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("bad timestamp {raw:?}: {e}"))
}

/// Read the session map. A missing file is an empty store; entries that
/// fail to decode are skipped.
pub async fn load(path: &Path) -> Result<HashMap<SessionId, Session>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(StoreError::storage("load", e)),
    };

    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| StoreError::storage("load", format!("Invalid JSON: {e}")))?;

    let mut sessions = HashMap::with_capacity(entries.len());
    for (id, value) in entries {
        let decoded = serde_json::from_value::<SessionRecord>(value)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_session(&id));
        match decoded {
            Ok(session) => {
                sessions.insert(session.session_id.clone(), session);
            }
            Err(e) => warn!(session_id = %id, error = %e, "dropping unreadable session record"),
        }
    }
    Ok(sessions)
}

/// Serialize to `<file>.tmp` in the same directory, flush, then rename over
/// the canonical file.
pub async fn save(path: &Path, sessions: &HashMap<SessionId, Session>) -> Result<(), StoreError> {
    let records: serde_json::Map<String, serde_json::Value> = sessions
        .iter()
        .map(|(id, s)| {
            serde_json::to_value(SessionRecord::from_session(s)).map(|v| (id.to_string(), v))
        })
        .collect::<Result<_, _>>()
        .map_err(|e| StoreError::storage("save", e))?;
    let body = serde_json::to_string_pretty(&records).map_err(|e| StoreError::storage("save", e))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::storage("save", e))?;
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::storage("save", e))?;
    file.write_all(body.as_bytes())
        .await
        .map_err(|e| StoreError::storage("save", e))?;
    file.sync_all().await.map_err(|e| StoreError::storage("save", e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::storage("save", e))
}

pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cligate_core::session::CreateSessionRequest;

    #[test]
    fn timestamp_forms() {
        let utc = parse_timestamp("2025-01-02T03:04:05.123456Z").unwrap();
        assert_eq!(format_timestamp(&utc), "2025-01-02T03:04:05.123456Z");

        let offset = parse_timestamp("2025-01-02T05:04:05+02:00").unwrap();
        assert_eq!(offset, parse_timestamp("2025-01-02T03:04:05Z").unwrap());

        let naive = parse_timestamp("2025-01-02T03:04:05.5").unwrap();
        assert_eq!(format_timestamp(&naive), "2025-01-02T03:04:05.500000Z");

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir.path().join(SESSIONS_FILE)).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSIONS_FILE);
        let session = Session::new(&CreateSessionRequest {
            working_dir: Some("/w".into()),
            model: "m".into(),
        });
        let mut map = HashMap::new();
        map.insert(session.session_id.clone(), session.clone());

        save(&path, &map).await.unwrap();
        assert!(!temp_path(&path).exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let record = &raw[session.session_id.as_str()];
        assert_eq!(record["message_count"], 0);
        assert_eq!(record["working_dir"], "/w");
        assert!(record["created_at"].as_str().unwrap().ends_with('Z'));

        let loaded = load(&path).await.unwrap();
        let back = &loaded[&session.session_id];
        assert_eq!(back.model, "m");
        assert_eq!(
            format_timestamp(&back.created_at),
            format_timestamp(&session.created_at)
        );
    }

    #[tokio::test]
    async fn bad_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSIONS_FILE);
        std::fs::write(
            &path,
            r#"{
                "good": {"created_at": "2025-01-01T00:00:00Z", "last_used_at": "2025-01-01T01:00:00Z",
                         "message_count": 3, "working_dir": null, "model": "m"},
                "bad_ts": {"created_at": "nope", "last_used_at": "2025-01-01T01:00:00Z"},
                "bad_shape": 42
            }"#,
        )
        .unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&SessionId::from_raw("good")].message_count, 3);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSIONS_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage { operation: "load", .. }));
    }
}
