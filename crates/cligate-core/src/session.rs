use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_MODEL;
use crate::ids::SessionId;

/// Snapshot of one conversation. The store owns the live copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub message_count: u64,
    pub working_dir: Option<String>,
    pub model: String,
}

impl Session {
    pub fn new(req: &CreateSessionRequest) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            created_at: now,
            last_used_at: now,
            message_count: 0,
            working_dir: req.working_dir.clone(),
            model: req.model.clone(),
        }
    }

    /// Hours since last use, relative to `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_used_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for CreateSessionRequest {
    fn default() -> Self {
        Self {
            working_dir: None,
            model: default_model(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}
