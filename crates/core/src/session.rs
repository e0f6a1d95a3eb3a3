//! Session registry: maps a client-supplied session identifier to the
//! conversation state kept for it across voice connections.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

pub const APP_NAME: &str = "encyclopedia-assistant";
pub const DEFAULT_USER_ID: &str = "default_user";
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// A finalized utterance from an earlier exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Conversation state for one session identifier.
#[derive(Debug)]
pub struct Session {
    id: String,
    app_name: String,
    user_id: String,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last activity.
    last_active_ms: AtomicU64,
    history: Mutex<Vec<Turn>>,
}

pub type SessionHandle = Arc<Session>;

impl Session {
    pub fn new(id: &str, app_name: &str, user_id: &str) -> Self {
        Self {
            id: id.to_string(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            created_at: Instant::now(),
            last_active_ms: AtomicU64::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Marks the session as used now.
    pub fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_active_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed));
        self.created_at.elapsed().saturating_sub(last)
    }

    /// Appends a finalized turn. Blank text is ignored.
    pub async fn record_turn(&self, role: TurnRole, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.history.lock().await.push(Turn {
            role,
            text: text.to_string(),
        });
        self.touch();
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.history.lock().await.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session capacity of {0} reached")]
    CapacityExceeded(usize),
    #[error("session service failure: {0}")]
    Backend(String),
}

/// Get-or-create access to sessions.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Returns the handle stored for `session_id`, creating it on first use.
    /// The same identifier always yields the same handle while it is stored.
    async fn resolve(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionHandle, SessionError>;
}

/// Process-local session registry with idle eviction.
///
/// A session is only evicted when no relay holds a handle to it, so an
/// active conversation is never dropped from under its connection.
pub struct InMemorySessionService {
    sessions: DashMap<String, SessionHandle>,
    max_sessions: usize,
}

impl InMemorySessionService {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions nobody holds that have been idle for at least
    /// `max_idle`. Returns how many were removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| Arc::strong_count(session) > 1 || session.idle_for() < max_idle);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Runs [`Self::evict_idle`] periodically for the life of the process.
    pub fn spawn_eviction_sweeper(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = (max_idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_idle(max_idle);
                if evicted > 0 {
                    info!(evicted, "Session sweeper evicted idle sessions");
                }
            }
        })
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn resolve(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(existing) = self.sessions.get(session_id) {
            existing.touch();
            return Ok(existing.clone());
        }

        if self.sessions.len() >= self.max_sessions {
            self.evict_idle(Duration::ZERO);
            if self.sessions.len() >= self.max_sessions {
                warn!(max_sessions = self.max_sessions, "Session registry is full");
                return Err(SessionError::CapacityExceeded(self.max_sessions));
            }
        }

        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id, "Creating new session");
                Arc::new(Session::new(session_id, app_name, user_id))
            })
            .clone();
        handle.touch();
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_is_idempotent_per_identifier() {
        let registry = InMemorySessionService::default();
        let a = registry.resolve(APP_NAME, DEFAULT_USER_ID, "s1").await.unwrap();
        let b = registry.resolve(APP_NAME, DEFAULT_USER_ID, "s1").await.unwrap();
        let c = registry.resolve(APP_NAME, DEFAULT_USER_ID, "s2").await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.id(), "s1");
        assert_eq!(a.app_name(), APP_NAME);
        assert_eq!(a.user_id(), DEFAULT_USER_ID);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_yields_one_handle() {
        let registry = Arc::new(InMemorySessionService::default());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.resolve(APP_NAME, DEFAULT_USER_ID, "shared").await.unwrap()
                })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_history_survives_reconnect() {
        let registry = InMemorySessionService::default();
        let first = registry.resolve(APP_NAME, DEFAULT_USER_ID, "s1").await.unwrap();
        first.record_turn(TurnRole::User, "  tell me about volcanoes ").await;
        first.record_turn(TurnRole::Model, "   ").await;
        drop(first);

        let second = registry.resolve(APP_NAME, DEFAULT_USER_ID, "s1").await.unwrap();
        assert_eq!(
            second.history().await,
            vec![Turn {
                role: TurnRole::User,
                text: "tell me about volcanoes".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_evict_idle_skips_held_sessions() {
        let registry = InMemorySessionService::default();
        let held = registry.resolve(APP_NAME, DEFAULT_USER_ID, "held").await.unwrap();
        let released = registry.resolve(APP_NAME, DEFAULT_USER_ID, "released").await.unwrap();
        drop(released);

        assert_eq!(registry.evict_idle(Duration::ZERO), 1);
        assert_eq!(registry.len(), 1);

        let again = registry.resolve(APP_NAME, DEFAULT_USER_ID, "held").await.unwrap();
        assert!(Arc::ptr_eq(&held, &again));
    }

    #[tokio::test]
    async fn test_evict_idle_respects_threshold() {
        let registry = InMemorySessionService::default();
        drop(registry.resolve(APP_NAME, DEFAULT_USER_ID, "fresh").await.unwrap());

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_before_refusing() {
        let registry = InMemorySessionService::new(1);
        let held = registry.resolve(APP_NAME, DEFAULT_USER_ID, "a").await.unwrap();

        let err = registry
            .resolve(APP_NAME, DEFAULT_USER_ID, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded(1)));

        drop(held);
        let b = registry.resolve(APP_NAME, DEFAULT_USER_ID, "b").await.unwrap();
        assert_eq!(b.id(), "b");
        assert_eq!(registry.len(), 1);
    }
}
