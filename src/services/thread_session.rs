//! In-memory conversations behind `/talk` threads. Nothing here is persisted; a restart
//! ends every open conversation.

use crate::llm::{ChatMessage, GenerationParams, Role};
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Threads auto-archive after an hour; five extra minutes for late replies.
pub const SESSION_TTL_MINUTES: i64 = 65;
pub const CLEANUP_INTERVAL_SECS: u64 = 30 * 60;
/// Oldest messages are dropped past this length.
pub const MAX_HISTORY: usize = 40;
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TalkSession {
    pub system_prompt: String,
    pub model: String,
    pub params: GenerationParams,
    pub creator_id: u64,
    pub created_at: DateTime<Utc>,
    pub history: Vec<ChatMessage>,
}

impl TalkSession {
    pub fn new(
        system_prompt: String,
        model: String,
        params: GenerationParams,
        creator_id: u64,
    ) -> Self {
        Self {
            system_prompt,
            model,
            params,
            creator_id,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(SESSION_TTL_MINUTES)
    }
}

pub struct ThreadSessionStore {
    sessions: Mutex<LruCache<u64, TalkSession>>,
}

impl Default for ThreadSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ThreadSessionStore {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(cap)),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, LruCache<u64, TalkSession>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn create(&self, thread_id: u64, session: TalkSession) {
        info!(
            "Talk: session {} opened by {} with model {}",
            thread_id, session.creator_id, session.model
        );
        self.sessions().put(thread_id, session);
    }

    /// Snapshot of a live session; expired ones are dropped on the way.
    pub fn get(&self, thread_id: u64) -> Option<TalkSession> {
        let mut sessions = self.sessions();
        let expired = sessions.peek(&thread_id)?.is_expired(Utc::now());
        if expired {
            sessions.pop(&thread_id);
            debug!("Talk: session {} expired", thread_id);
            return None;
        }
        sessions.get(&thread_id).cloned()
    }

    /// Append to a session's history. Returns false when the session is gone.
    pub fn push(&self, thread_id: u64, message: ChatMessage) -> bool {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(&thread_id) else {
            return false;
        };
        session.history.push(message);
        if session.history.len() > MAX_HISTORY {
            let excess = session.history.len() - MAX_HISTORY;
            session.history.drain(..excess);
            // Providers reject a conversation that opens with an assistant turn
            let leading = session
                .history
                .iter()
                .take_while(|m| m.role == Role::Assistant)
                .count();
            session.history.drain(..leading);
        }
        true
    }

    /// Drop a trailing user turn that never got an answer, keeping roles alternating.
    pub fn discard_unanswered(&self, thread_id: u64) -> bool {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(&thread_id) else {
            return false;
        };
        if session.history.last().is_some_and(|m| m.role == Role::User) {
            session.history.pop();
            return true;
        }
        false
    }

    pub fn remove(&self, thread_id: u64) -> bool {
        self.sessions().pop(&thread_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions();
        let expired: Vec<u64> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.pop(id);
        }
        if !expired.is_empty() {
            info!("Talk: cleaned up {} expired sessions", expired.len());
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TalkSession {
        TalkSession::new(
            "sys".to_string(),
            "gpt-4.1-mini".to_string(),
            GenerationParams {
                max_tokens: 100,
                temperature: 0.6,
                top_p: 0.96,
            },
            7,
        )
    }

    #[test]
    fn test_push_caps_history() {
        let store = ThreadSessionStore::default();
        store.create(10, session());
        for i in 0..(MAX_HISTORY + 5) {
            assert!(store.push(10, ChatMessage::user(format!("m{i}"))));
        }
        let snapshot = store.get(10).unwrap();
        assert_eq!(snapshot.history.len(), MAX_HISTORY);
        assert_eq!(snapshot.history[0].content, "m5");

        assert!(!store.push(99, ChatMessage::user("nobody")));
    }

    #[test]
    fn test_capped_history_opens_with_user_turn() {
        let store = ThreadSessionStore::default();
        store.create(10, session());
        for i in 0..(MAX_HISTORY / 2) {
            store.push(10, ChatMessage::user(format!("u{i}")));
            store.push(10, ChatMessage::assistant(format!("a{i}")));
        }
        store.push(10, ChatMessage::user("next"));

        let history = store.get(10).unwrap().history;
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "u1");
        assert_eq!(history.last().unwrap().content, "next");
        assert!(history.len() < MAX_HISTORY);
        assert!(history
            .windows(2)
            .all(|pair| pair[0].role != pair[1].role));
    }

    #[test]
    fn test_discard_unanswered_turn() {
        let store = ThreadSessionStore::default();
        store.create(10, session());
        store.push(10, ChatMessage::user("hello"));
        store.push(10, ChatMessage::assistant("hi"));
        store.push(10, ChatMessage::user("lost"));

        assert!(store.discard_unanswered(10));
        let history = store.get(10).unwrap().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().role, Role::Assistant);

        // Nothing pending any more
        assert!(!store.discard_unanswered(10));
        assert!(!store.discard_unanswered(99));
    }

    #[test]
    fn test_expired_sessions_are_dropped() {
        let store = ThreadSessionStore::default();
        let mut old = session();
        old.created_at = Utc::now() - Duration::minutes(SESSION_TTL_MINUTES + 1);
        store.create(1, old.clone());
        store.create(2, session());

        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());

        store.create(3, old);
        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let store = ThreadSessionStore::new(2);
        store.create(1, session());
        store.create(2, session());
        store.get(1);
        store.create(3, session());
        assert!(store.get(2).is_none());
        assert!(store.get(1).is_some());
        assert!(store.remove(3));
        assert!(!store.remove(3));
    }
}
