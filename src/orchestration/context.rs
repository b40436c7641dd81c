//! Context snapshots and session-scoped progress recording.
//!
//! Every task invocation receives a read-only text snapshot from a
//! context provider. Providers may also accept write-back progress
//! entries; two tasks in the same run can legitimately write to the
//! same session, so writes are serialized per session.

use crate::core::task::RoleId;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of the read-only context snapshot a task sees.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn get_context(
        &self,
        session_id: &str,
        role: &RoleId,
        task_description: &str,
    ) -> Result<String>;

    /// Optional write-back of a progress entry. Default is a no-op for
    /// providers that are purely read-only.
    async fn record_progress(&self, _session_id: &str, _entry: ProgressEntry) -> Result<()> {
        Ok(())
    }
}

/// One append-only progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub task_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn new(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Provider that always returns an empty snapshot.
pub struct EmptyContext;

#[async_trait]
impl ContextProvider for EmptyContext {
    async fn get_context(
        &self,
        _session_id: &str,
        _role: &RoleId,
        _task_description: &str,
    ) -> Result<String> {
        Ok(String::new())
    }
}

/// In-memory session store with per-session serialized writes.
///
/// Each session owns its own lock, so concurrent tasks writing to
/// different sessions never contend while two writers to one session
/// are strictly ordered.
#[derive(Default)]
pub struct SessionStore {
    sessions: std::sync::Mutex<HashMap<String, Arc<Mutex<Vec<ProgressEntry>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<Vec<ProgressEntry>>> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Snapshot of a session's entries, oldest first.
    pub async fn entries(&self, session_id: &str) -> Vec<ProgressEntry> {
        self.session(session_id).lock().await.clone()
    }
}

#[async_trait]
impl ContextProvider for SessionStore {
    /// Renders the session's progress log as the snapshot.
    async fn get_context(
        &self,
        session_id: &str,
        _role: &RoleId,
        _task_description: &str,
    ) -> Result<String> {
        let entries = self.entries(session_id).await;
        Ok(entries
            .iter()
            .map(|e| format!("[{}] {}: {}", e.at.to_rfc3339(), e.task_id, e.message))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn record_progress(&self, session_id: &str, entry: ProgressEntry) -> Result<()> {
        self.session(session_id).lock().await.push(entry);
        Ok(())
    }
}
