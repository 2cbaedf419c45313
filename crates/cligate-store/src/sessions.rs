use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use cligate_core::ids::SessionId;
use cligate_core::session::{CreateSessionRequest, Session, SessionPatch};

use crate::error::StoreError;
use crate::file::{self, SESSIONS_FILE};

/// In-memory session registry mirrored to `<dir>/sessions.json`.
///
/// Every operation runs under one store-wide lock. A mutation is built on a
/// copy of the map, flushed to disk, and only then swapped in, so the
/// in-memory view never gets ahead of the file.
pub struct SessionStore {
    path: PathBuf,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionStore {
    /// Create the directory if needed and load any persisted sessions.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::storage("load", e))?;
        let path = dir.join(SESSIONS_FILE);
        let sessions = file::load(&path).await?;
        info!(path = %path.display(), count = sessions.len(), "session store opened");
        Ok(Self {
            path,
            sessions: Mutex::new(sessions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    pub async fn create(&self, req: &CreateSessionRequest) -> Result<Session, StoreError> {
        let mut guard = self.sessions.lock().await;
        let session = Session::new(req);
        let mut next = guard.clone();
        next.insert(session.session_id.clone(), session.clone());
        self.commit(&mut guard, next).await?;
        debug!(session_id = %session.session_id, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Existing session for `id`, or a fresh one when `id` is absent or unknown.
    pub async fn get_or_create(
        &self,
        id: Option<&SessionId>,
        req: Option<&CreateSessionRequest>,
    ) -> Result<Session, StoreError> {
        if let Some(id) = id {
            if let Some(existing) = self.get(id).await {
                return Ok(existing);
            }
            debug!(session_id = %id, "unknown session id, creating a new session");
        }
        let default_req = CreateSessionRequest::default();
        self.create(req.unwrap_or(&default_req)).await
    }

    /// All sessions, most recently used first.
    pub async fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.lock().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply a patch. Timestamps and counters never move backwards.
    #[instrument(skip(self, patch), fields(session_id = %id))]
    pub async fn update(&self, id: &SessionId, patch: SessionPatch) -> Result<Session, StoreError> {
        self.mutate(id, |session| {
            if let Some(model) = patch.model {
                session.model = model;
            }
            if let Some(dir) = patch.working_dir {
                session.working_dir = Some(dir);
            }
            if let Some(count) = patch.message_count {
                session.message_count = session.message_count.max(count);
            }
            let touched = patch.last_used_at.unwrap_or_else(Utc::now);
            session.last_used_at = session.last_used_at.max(touched);
        })
        .await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn increment_message_count(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.mutate(id, |session| {
            session.message_count += 1;
            session.last_used_at = session.last_used_at.max(Utc::now());
        })
        .await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut guard = self.sessions.lock().await;
        if !guard.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut next = guard.clone();
        next.remove(id);
        self.commit(&mut guard, next).await?;
        debug!("session deleted");
        Ok(())
    }

    /// Remove sessions idle for more than `max_age_hours`. Returns how many went.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self, max_age_hours: f64) -> Result<usize, StoreError> {
        let mut guard = self.sessions.lock().await;
        let now = Utc::now();
        let next: HashMap<SessionId, Session> = guard
            .iter()
            .filter(|(_, s)| s.age_hours(now) <= max_age_hours)
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        let removed = guard.len() - next.len();
        if removed > 0 {
            self.commit(&mut guard, next).await?;
            info!(removed, "expired sessions removed");
        }
        Ok(removed)
    }

    async fn mutate<F>(&self, id: &SessionId, apply: F) -> Result<Session, StoreError>
    where
        F: FnOnce(&mut Session),
    {
        let mut guard = self.sessions.lock().await;
        let mut next = guard.clone();
        let session = next
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply(session);
        let updated = session.clone();
        self.commit(&mut guard, next).await?;
        Ok(updated)
    }

    async fn commit(
        &self,
        current: &mut HashMap<SessionId, Session>,
        next: HashMap<SessionId, Session>,
    ) -> Result<(), StoreError> {
        file::save(&self.path, &next).await?;
        *current = next;
        Ok(())
    }
}
