//! Per-user conversation sessions.
//!
//! One session per user id, created lazily and seeded with the persona
//! preamble. The store is an owned component handed around by reference;
//! capacity is bounded with least-recently-used eviction. Snapshots are
//! a best-effort JSON flat file keyed by user id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use cohortbot_core::error::{CohortBotError, Result};
use cohortbot_core::types::{Role, Turn};
use serde::{Deserialize, Serialize};

/// Tone and behavioral instructions the assistant persona is seeded with.
pub const PERSONA_PREAMBLE: &str = "\
You are a smart and witty Discord bot assistant for a cohort of learners.
Your mission is to support users with:
	1.	Check-ins and check-outs on the attendance platform.
	2.	Questions related to data science, data analysis, and Python.
You're the helpful sidekick every learner dreams of:
– Clever like a top-tier data scientist
– Funny like a meme lord
– Kind like their favorite mentor

You blend sharp expertise with a playful tone. Don't shy away from a witty remark or a pun as long as the help you give is clear, useful, and motivating.

Always aim to:
	•	Make the user feel supported, empowered, and excited to keep learning
	•	Be accurate, concise, and approachable in every reply
	•	Avoid long-winded explanations, maximum 1900 characters
	•	Summarize or skip less crucial details when needed
	•	If someone is late to check-in or check-out, they owe the coaches croissants
";

/// One user's ordered conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub turns: Vec<Turn>,
}

impl Session {
    fn seeded(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            turns: vec![Turn::user(PERSONA_PREAMBLE)],
        }
    }
}

/// Maps user ids to sessions; LRU-bounded.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    /// User ids from least to most recently used.
    recency: Vec<String>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            recency: Vec::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// The session for a user — the existing one, or a fresh one seeded
    /// with the persona preamble.
    pub fn session_for(&mut self, user_id: &str) -> &Session {
        self.touch(user_id);
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::seeded(user_id))
    }

    /// A clone of the user's history, creating the session if needed.
    /// Cloned so callers can release the store lock across a model call.
    pub fn history(&mut self, user_id: &str) -> Vec<Turn> {
        self.session_for(user_id).turns.clone()
    }

    /// Append a turn, preserving order.
    pub fn append(&mut self, user_id: &str, role: Role, content: &str) {
        self.touch(user_id);
        let session = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::seeded(user_id));
        session.turns.push(Turn {
            role,
            content: content.to_string(),
        });
    }

    fn touch(&mut self, user_id: &str) {
        self.recency.retain(|id| id != user_id);
        self.recency.push(user_id.to_string());
        while self.sessions.len() >= self.max_sessions
            && !self.sessions.contains_key(user_id)
        {
            let Some(evicted) = self.recency.first().cloned() else {
                break;
            };
            if evicted == user_id {
                break;
            }
            self.recency.remove(0);
            self.sessions.remove(&evicted);
            tracing::debug!("Evicted least-recently-used session for {evicted}");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Write all sessions to a JSON flat file keyed by user id.
    pub fn snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let flat: BTreeMap<&str, &Vec<Turn>> = self
            .sessions
            .iter()
            .map(|(id, s)| (id.as_str(), &s.turns))
            .collect();
        let json = serde_json::to_string_pretty(&flat)
            .map_err(|e| CohortBotError::Session(format!("Serialize error: {e}")))?;
        std::fs::write(path, &json)?;
        tracing::debug!("💾 Saved {} session(s) to {}", flat.len(), path.display());
        Ok(())
    }

    /// Populate the store from a snapshot file. A missing file is not an
    /// error — the store just starts empty.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let json = std::fs::read_to_string(path)?;
        let flat: BTreeMap<String, Vec<Turn>> = serde_json::from_str(&json)
            .map_err(|e| CohortBotError::Session(format!("Invalid snapshot: {e}")))?;
        for (user_id, turns) in flat {
            self.recency.push(user_id.clone());
            self.sessions
                .insert(user_id.clone(), Session { user_id, turns });
        }
        tracing::info!(
            "Restored {} session(s) from {}",
            self.sessions.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_contact_seeds_persona_only() {
        let mut store = SessionStore::new(16);
        let session = store.session_for("42");
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].role, Role::User);
        assert_eq!(session.turns[0].content, PERSONA_PREAMBLE);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_second_call_returns_same_session() {
        let mut store = SessionStore::new(16);
        store.session_for("42");
        store.append("42", Role::User, "hello");
        // Same entry, not a copy: the appended turn is visible.
        let session = store.session_for("42");
        assert_eq!(session.turns.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = SessionStore::new(16);
        store.append("42", Role::User, "q1");
        store.append("42", Role::Model, "a1");
        store.append("42", Role::User, "q2");
        let turns = &store.session_for("42").turns;
        assert_eq!(turns.len(), 4); // persona + 3
        assert_eq!(turns[1].content, "q1");
        assert_eq!(turns[2].content, "a1");
        assert_eq!(turns[3].content, "q2");
    }

    #[test]
    fn test_lru_eviction() {
        let mut store = SessionStore::new(2);
        store.session_for("a");
        store.session_for("b");
        store.session_for("a"); // refresh a
        store.session_for("c"); // evicts b
        assert_eq!(store.len(), 2);
        assert_eq!(store.session_for("b").turns.len(), 1); // b reseeded
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let dir = std::env::temp_dir().join("cohortbot-test-sessions");
        let path = dir.join("user_chats.json");
        std::fs::remove_file(&path).ok();

        let mut store = SessionStore::new(16);
        store.append("42", Role::User, "hello");
        store.append("42", Role::Model, "hi!");
        store.append("7", Role::User, "what time");
        store.snapshot(&path).unwrap();

        let mut restored = SessionStore::new(16);
        restored.restore(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.session_for("42").turns,
            store.session_for("42").turns
        );
        assert_eq!(
            restored.session_for("7").turns,
            store.session_for("7").turns
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_restore_missing_file_is_not_an_error() {
        let mut store = SessionStore::new(16);
        let path = std::env::temp_dir().join("cohortbot-no-such-snapshot.json");
        assert!(store.restore(&path).is_ok());
        assert!(store.is_empty());
    }
}
