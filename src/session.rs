use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::chat::SessionLog;
use crate::rag::DocumentIndex;

/// State of one interactive session, passed explicitly to the turn handler.
#[derive(Debug)]
pub struct ChatSession {
    pub id: String,
    pub log: SessionLog,
    pub document: Option<DocumentIndex>,
}

impl ChatSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: SessionLog::new(),
            document: None,
        }
    }
}

pub type SharedSession = Arc<Mutex<ChatSession>>;

struct Entry {
    session: SharedSession,
    last_active: Instant,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> (String, SharedSession) {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(ChatSession::new(id.clone())));
        let entry = Entry { session: Arc::clone(&session), last_active: Instant::now() };
        self.sessions.lock().await.insert(id.clone(), entry);
        info!("Created session {}", id);
        (id, session)
    }

    /// Looks up a session and marks it active.
    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(id)?;
        entry.last_active = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Marks a session active, e.g. when its connection closes.
    pub async fn touch(&self, id: &str) {
        if let Some(entry) = self.sessions.lock().await.get_mut(id) {
            entry.last_active = Instant::now();
        }
    }

    /// Resumes the session named by `requested` if it exists, otherwise
    /// starts a new one.
    pub async fn attach(&self, requested: Option<&str>) -> (String, SharedSession) {
        if let Some(id) = requested {
            if let Some(session) = self.get(id).await {
                info!("Resumed session {}", id);
                return (id.to_string(), session);
            }
        }
        self.create().await
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            info!("Removed session {}", id);
        }
        removed
    }

    /// Drops sessions idle for longer than `ttl`. Sessions still held by a
    /// connection or a request are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let in_use = Arc::strong_count(&entry.session) > 1;
            let keep = in_use || now.duration_since(entry.last_active) <= ttl;
            if !keep {
                info!("Evicted idle session {}", id);
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_resumes_known_and_creates_unknown() {
        let registry = SessionRegistry::new();
        let (id, session) = registry.create().await;
        session.lock().await.log.begin_turn("hi").commit();

        let (resumed_id, resumed) = registry.attach(Some(&id)).await;
        assert_eq!(resumed_id, id);
        assert_eq!(resumed.lock().await.log.len(), 2);

        let (fresh_id, fresh) = registry.attach(Some("no-such-session")).await;
        assert_ne!(fresh_id, id);
        assert!(fresh.lock().await.log.is_empty());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn remove_forgets_session() {
        let registry = SessionRegistry::new();
        let (id, _) = registry.create().await;
        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted_after_ttl() {
        let registry = SessionRegistry::new();
        let ttl = Duration::from_secs(60);
        let (stale, _) = registry.create().await;
        let (active, _) = registry.create().await;

        tokio::time::advance(Duration::from_secs(40)).await;
        registry.touch(&active).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(registry.evict_idle(ttl).await, 1);
        assert!(registry.get(&stale).await.is_none());
        assert!(registry.get(&active).await.is_some());

        let (resumed, _) = registry.attach(Some(&stale)).await;
        assert_ne!(resumed, stale);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_held_by_a_connection_are_kept() {
        let registry = SessionRegistry::new();
        let (id, held) = registry.create().await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(registry.evict_idle(Duration::from_secs(60)).await, 0);

        drop(held);
        assert_eq!(registry.evict_idle(Duration::from_secs(60)).await, 1);
        assert!(registry.get(&id).await.is_none());
    }
}
