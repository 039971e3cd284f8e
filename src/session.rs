//! Per-session bounded conversation history.
//!
//! [`SessionStore`] maps session ids to a short list of [`Turn`]s. Each
//! session has its own async mutex: queries on different sessions never
//! contend, while queries on the same session are serialised by holding a
//! [`SessionGuard`] for the whole query. The guard releases on drop, so
//! every exit path (success, error, timeout, cancellation) unlocks it.
//!
//! The store holds at most `max_sessions` sessions. Creating one more
//! evicts the least recently used session that nobody holds or waits on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::Turn;

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<Turn>,
}

/// Exclusive access to one session's history.
pub struct SessionGuard {
    id: String,
    window: usize,
    session: OwnedMutexGuard<Session>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a turn, then evict the oldest turns beyond the window.
    pub fn append_turn(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        self.session.turns.push_back(Turn {
            query: query.into(),
            answer: answer.into(),
        });
        while self.session.turns.len() > self.window {
            self.session.turns.pop_front();
        }
    }

    /// Render the retained turns oldest first. Empty when there is no history.
    pub fn format_history(&self) -> String {
        render_history(self.session.turns.iter())
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.session.turns.iter().cloned().collect()
    }
}

struct Slot {
    session: Arc<Mutex<Session>>,
    last_used: u64,
}

impl Slot {
    /// No guard, waiter or caller holds a handle to this session.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.session) == 1
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Slot>,
    window: usize,
    max_sessions: usize,
    clock: AtomicU64,
}

impl SessionStore {
    /// `window` is the maximum number of retained turns and `max_sessions`
    /// the number of sessions kept (both at least 1).
    pub fn new(window: usize, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            window: window.max(1),
            max_sessions: max_sessions.max(1),
            clock: AtomicU64::new(0),
        }
    }

    /// Return `session_id` (adopting it if unknown) or a freshly generated id.
    pub fn get_or_create(&self, session_id: Option<&str>) -> String {
        let id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("session_{}", uuid::Uuid::new_v4().simple()),
        };
        self.slot(&id);
        id
    }

    /// Acquire the per-session lock, creating the session if needed.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let slot = self.slot(session_id);
        SessionGuard {
            id: session_id.to_string(),
            window: self.window,
            session: slot.lock_owned().await,
        }
    }

    /// Append one turn to a session.
    pub async fn append_turn(&self, session_id: &str, query: &str, answer: &str) {
        self.lock(session_id).await.append_turn(query, answer);
    }

    /// Rendered history for a session, or an empty string for unknown ids.
    pub async fn format_history(&self, session_id: &str) -> String {
        let Some(slot) = self.existing(session_id) else {
            return String::new();
        };
        let session = slot.lock().await;
        render_history(session.turns.iter())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(mut slot) = self.sessions.get_mut(session_id) {
            slot.last_used = self.tick();
            return Arc::clone(&slot.session);
        }

        while self.sessions.len() >= self.max_sessions {
            if !self.evict_idle() {
                tracing::warn!(
                    sessions = self.sessions.len(),
                    max = self.max_sessions,
                    "all sessions busy, exceeding session limit"
                );
                break;
            }
        }

        let mut slot = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Slot {
                session: Arc::default(),
                last_used: 0,
            });
        slot.last_used = self.tick();
        Arc::clone(&slot.session)
    }

    /// Remove the least recently used idle session. False if every session is busy.
    fn evict_idle(&self) -> bool {
        let victim = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle())
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());

        match victim {
            Some(id) => {
                let removed = self.sessions.remove_if(&id, |_, slot| slot.is_idle());
                if removed.is_some() {
                    tracing::debug!(session = %id, "evicted idle session");
                }
                true
            }
            None => false,
        }
    }

    fn existing(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(session_id).map(|s| Arc::clone(&s.session))
    }
}

fn render_history<'a>(turns: impl Iterator<Item = &'a Turn>) -> String {
    turns
        .map(|t| format!("User: {}\nAssistant: {}", t.query, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
