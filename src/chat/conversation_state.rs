use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::ContextMessage;
use super::error::{ChatError, StoreError};

/// Maximum number of turns kept per session.
pub const RETENTION_CEILING: usize = 20;

const SESSION_FILE_EXT: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Informational only; insertion order is authoritative.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_context(&self) -> ContextMessage {
        ContextMessage::new(self.role, self.content.clone())
    }
}

/// Opaque key identifying one session.
///
/// Keys are restricted to ASCII alphanumerics, `-` and `_` so they can double
/// as file names when sessions are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    const MAX_LEN: usize = 64;

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, append-only history of one session.
#[derive(Debug, Clone)]
pub struct Session {
    turns: VecDeque<Turn>,
    last_access: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::from_turns(Vec::new())
    }

    fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: turns.into(),
            last_access: Utc::now(),
        }
    }

    /// Append a turn stamped with the current time.
    ///
    /// Empty or whitespace-only content is rejected and leaves the session
    /// untouched.
    pub fn append(&mut self, role: Role, content: &str) -> Result<(), ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidInput);
        }
        self.turns.push_back(Turn::new(role, content));
        Ok(())
    }

    /// The last `min(max_turns, len)` turns in original order.
    pub fn context_window(&self, max_turns: usize) -> Vec<ContextMessage> {
        let skip = self.turns.len().saturating_sub(max_turns);
        self.turns.iter().skip(skip).map(Turn::to_context).collect()
    }

    /// Drop the oldest turns until at most `ceiling` remain. Returns the number
    /// of evicted turns.
    pub fn enforce_retention(&mut self, ceiling: usize) -> usize {
        let excess = self.turns.len().saturating_sub(ceiling);
        self.turns.drain(..excess);
        excess
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    fn touch(&mut self) {
        self.last_access = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions indexed by key, optionally mirrored to one JSON file per session.
pub struct ConversationStore {
    sessions: DashMap<SessionKey, Session>,
    persist_dir: Option<PathBuf>,
}

impl ConversationStore {
    /// A store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            sessions: DashMap::new(),
            persist_dir: None,
        }
    }

    /// A store that writes every session to `dir` and reloads it lazily.
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        info!("Persisting sessions to {}", dir.display());
        Ok(Self {
            sessions: DashMap::new(),
            persist_dir: Some(dir),
        })
    }

    /// Every mutation is applied to a copy, written out, and only then
    /// swapped in, so a failed write leaves memory and disk unchanged.
    pub fn append(&self, key: &SessionKey, role: Role, content: &str) -> Result<(), ChatError> {
        let mut session = self.session_mut(key);
        let mut staged = session.clone();
        staged.append(role, content)?;
        self.persist(key, &staged)?;
        *session = staged;
        debug!("Appended {} turn, session {} now holds {} turns", role, key, session.len());
        Ok(())
    }

    /// Append a user turn and its reply, then trim to `ceiling`, as one write.
    /// Returns the number of evicted turns.
    pub fn record_exchange(
        &self,
        key: &SessionKey,
        user_message: &str,
        reply: &str,
        ceiling: usize,
    ) -> Result<usize, ChatError> {
        let mut session = self.session_mut(key);
        let mut staged = session.clone();
        staged.append(Role::User, user_message)?;
        staged.append(Role::Assistant, reply)?;
        let evicted = staged.enforce_retention(ceiling);
        self.persist(key, &staged)?;
        *session = staged;
        debug!("Recorded exchange, session {} now holds {} turns", key, session.len());
        Ok(evicted)
    }

    pub fn context_window(&self, key: &SessionKey, max_turns: usize) -> Vec<ContextMessage> {
        self.session_mut(key).context_window(max_turns)
    }

    /// Full history of the session, in order.
    pub fn history(&self, key: &SessionKey) -> Vec<ContextMessage> {
        self.context_window(key, usize::MAX)
    }

    pub fn enforce_retention(&self, key: &SessionKey, ceiling: usize) -> Result<usize, StoreError> {
        let mut session = self.session_mut(key);
        if session.len() <= ceiling {
            return Ok(0);
        }
        let mut staged = session.clone();
        let evicted = staged.enforce_retention(ceiling);
        self.persist(key, &staged)?;
        *session = staged;
        debug!("Evicted {} turns from session {}", evicted, key);
        Ok(evicted)
    }

    pub fn reset(&self, key: &SessionKey) -> Result<(), StoreError> {
        let mut session = self.session_mut(key);
        let mut staged = session.clone();
        staged.reset();
        self.persist(key, &staged)?;
        *session = staged;
        Ok(())
    }

    pub fn len(&self, key: &SessionKey) -> usize {
        self.session_mut(key).len()
    }

    /// Number of sessions currently held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Forget sessions idle for longer than `max_idle`, including their files.
    /// Returns the number of sessions removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut expired = Vec::new();
        self.sessions.retain(|key, session| {
            let keep = session.last_access >= cutoff;
            if !keep {
                expired.push(key.clone());
            }
            keep
        });

        for key in &expired {
            if let Some(path) = self.session_path(key) {
                remove_file_quietly(&path);
            }
        }

        let swept = self.sweep_stale_files(cutoff);
        let count = expired.len() + swept;
        if count > 0 {
            info!("Expired {} idle sessions", count);
        }
        count
    }

    fn session_mut(&self, key: &SessionKey) -> dashmap::mapref::one::RefMut<'_, SessionKey, Session> {
        let mut entry = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| self.load(key));
        entry.touch();
        entry
    }

    fn session_path(&self, key: &SessionKey) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", key.as_str(), SESSION_FILE_EXT)))
    }

    fn load(&self, key: &SessionKey) -> Session {
        let Some(path) = self.session_path(key) else {
            return Session::new();
        };
        if !path.exists() {
            return Session::new();
        }

        match read_turns(&path) {
            Ok(turns) => {
                debug!("Loaded {} turns for session {}", turns.len(), key);
                let mut session = Session::from_turns(turns);
                session.enforce_retention(RETENTION_CEILING);
                session
            }
            Err(e) => {
                warn!("Discarding unreadable session {}: {}", key, e);
                Session::new()
            }
        }
    }

    fn persist(&self, key: &SessionKey, session: &Session) -> Result<(), StoreError> {
        let Some(path) = self.session_path(key) else {
            return Ok(());
        };
        let turns: Vec<&Turn> = session.turns().collect();
        let json = serde_json::to_vec(&turns).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;

        let tmp = path.with_extension("tmp");
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn sweep_stale_files(&self, cutoff: DateTime<Utc>) -> usize {
        let Some(dir) = &self.persist_dir else {
            return 0;
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not scan session directory {}: {}", dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_FILE_EXT) {
                continue;
            }
            let live = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(SessionKey::parse)
                .is_some_and(|key| self.sessions.contains_key(&key));
            if live {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::now());
            if DateTime::<Utc>::from(modified) < cutoff {
                remove_file_quietly(&path);
                removed += 1;
            }
        }
        removed
    }
}

fn read_turns(path: &Path) -> Result<Vec<Turn>, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove session file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SessionKey {
        SessionKey::parse(raw).unwrap()
    }

    #[test]
    fn test_retention_keeps_most_recent_in_order() {
        let mut session = Session::new();
        for i in 0..30 {
            session.append(Role::User, &format!("message {i}")).unwrap();
        }

        let evicted = session.enforce_retention(RETENTION_CEILING);

        assert_eq!(evicted, 10);
        assert_eq!(session.len(), RETENTION_CEILING);
        let contents: Vec<_> = session.turns().map(|t| t.content.clone()).collect();
        let expected: Vec<_> = (10..30).map(|i| format!("message {i}")).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_retention_under_ceiling_is_noop() {
        let mut session = Session::new();
        session.append(Role::User, "tek").unwrap();
        assert_eq!(session.enforce_retention(RETENTION_CEILING), 0);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_eleven_exchanges_evict_first_pair() {
        let store = ConversationStore::in_memory();
        let k = key("scenario");
        for _ in 0..11 {
            store.append(&k, Role::User, "Merhaba").unwrap();
            store.append(&k, Role::Assistant, "Selam!").unwrap();
            store.enforce_retention(&k, RETENTION_CEILING).unwrap();
        }

        let history = store.history(&k);
        assert_eq!(history.len(), 20);
        for (i, msg) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(msg.role, expected);
        }
    }

    #[test]
    fn test_context_window_is_read_only() {
        let store = ConversationStore::in_memory();
        let k = key("window");
        for i in 0..5 {
            store.append(&k, Role::User, &format!("m{i}")).unwrap();
        }

        let first = store.context_window(&k, 3);
        let second = store.context_window(&k, 3);

        assert_eq!(first, second);
        assert_eq!(store.len(&k), 5);
        let contents: Vec<_> = first.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_context_window_larger_than_session() {
        let mut session = Session::new();
        session.append(Role::User, "a").unwrap();
        session.append(Role::Assistant, "b").unwrap();
        assert_eq!(session.context_window(8).len(), 2);
    }

    #[test]
    fn test_blank_content_rejected() {
        let store = ConversationStore::in_memory();
        let k = key("blank");
        store.append(&k, Role::User, "ilk").unwrap();

        for blank in ["", "   ", "\n\t "] {
            let err = store.append(&k, Role::User, blank).unwrap_err();
            assert!(matches!(err, ChatError::InvalidInput));
        }
        assert_eq!(store.len(&k), 1);
    }

    #[test]
    fn test_reset_clears_and_is_idempotent() {
        let store = ConversationStore::in_memory();
        let k = key("reset");
        store.append(&k, Role::User, "merhaba").unwrap();
        store.append(&k, Role::Assistant, "selam").unwrap();

        store.reset(&k).unwrap();
        assert!(store.context_window(&k, 8).is_empty());
        store.reset(&k).unwrap();
        assert!(store.context_window(&k, 8).is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = ConversationStore::in_memory();
        store.append(&key("a"), Role::User, "birinci").unwrap();
        store.append(&key("b"), Role::User, "ikinci").unwrap();
        store.reset(&key("a")).unwrap();

        assert_eq!(store.len(&key("a")), 0);
        assert_eq!(store.history(&key("b"))[0].content, "ikinci");
    }

    #[test]
    fn test_session_key_validation() {
        assert!(SessionKey::parse("3f2b6c1e-9a4d-4e2f-8b7a-1c2d3e4f5a6b").is_some());
        assert!(SessionKey::parse("local_session").is_some());
        assert!(SessionKey::parse("").is_none());
        assert!(SessionKey::parse("../etc/passwd").is_none());
        assert!(SessionKey::parse(&"x".repeat(65)).is_none());
        assert!(SessionKey::parse(SessionKey::generate().as_str()).is_some());
    }

    #[test]
    fn test_persistent_store_reloads_history() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("persisted");
        {
            let store = ConversationStore::persistent(dir.path()).unwrap();
            store.append(&k, Role::User, "Merhaba").unwrap();
            store.append(&k, Role::Assistant, "Selam!").unwrap();
        }

        let reopened = ConversationStore::persistent(dir.path()).unwrap();
        let history = reopened.history(&k);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "Selam!");
    }

    #[test]
    fn test_persistent_reset_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("cleared");
        {
            let store = ConversationStore::persistent(dir.path()).unwrap();
            store.append(&k, Role::User, "Merhaba").unwrap();
            store.reset(&k).unwrap();
        }

        let reopened = ConversationStore::persistent(dir.path()).unwrap();
        assert_eq!(reopened.len(&k), 0);
    }

    #[test]
    fn test_corrupt_session_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let store = ConversationStore::persistent(dir.path()).unwrap();
        assert_eq!(store.len(&key("broken")), 0);
    }

    #[test]
    fn test_file_without_timestamps_loads() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("legacy.json"),
            br#"[{"role":"user","content":"Merhaba"},{"role":"assistant","content":"Selam!"}]"#,
        )
        .unwrap();

        let store = ConversationStore::persistent(dir.path()).unwrap();
        assert_eq!(store.len(&key("legacy")), 2);
    }

    #[test]
    fn test_failed_write_leaves_session_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("blocked.json")).unwrap();
        let store = ConversationStore::persistent(dir.path()).unwrap();
        let k = key("blocked");

        let err = store.append(&k, Role::User, "Merhaba").unwrap_err();
        assert!(matches!(err, ChatError::Unexpected(_)));
        assert_eq!(store.len(&k), 0);

        let err = store
            .record_exchange(&k, "Merhaba", "Selam!", RETENTION_CEILING)
            .unwrap_err();
        assert!(matches!(err, ChatError::Unexpected(_)));
        assert!(store.history(&k).is_empty());
    }

    #[test]
    fn test_failed_reset_and_trim_keep_turns() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::persistent(dir.path()).unwrap();
        let k = key("sticky");
        for i in 0..3 {
            store.append(&k, Role::User, &format!("m{i}")).unwrap();
        }
        let path = dir.path().join("sticky.json");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.reset(&k).is_err());
        assert!(store.enforce_retention(&k, 1).is_err());
        assert_eq!(store.len(&k), 3);
    }

    #[test]
    fn test_record_exchange_trims_to_ceiling() {
        let store = ConversationStore::in_memory();
        let k = key("exchange");
        let mut evicted = 0;
        for _ in 0..11 {
            evicted += store
                .record_exchange(&k, "Merhaba", "Selam!", RETENTION_CEILING)
                .unwrap();
        }

        assert_eq!(evicted, 2);
        let history = store.history(&k);
        assert_eq!(history.len(), RETENTION_CEILING);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[19].role, Role::Assistant);
    }

    #[test]
    fn test_record_exchange_rejects_blank_reply() {
        let store = ConversationStore::in_memory();
        let k = key("blank-reply");

        let err = store.record_exchange(&k, "Merhaba", " ", RETENTION_CEILING).unwrap_err();

        assert!(matches!(err, ChatError::InvalidInput));
        assert_eq!(store.len(&k), 0);
    }

    #[test]
    fn test_evict_idle_removes_sessions_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::persistent(dir.path()).unwrap();
        let k = key("idle");
        store.append(&k, Role::User, "Merhaba").unwrap();
        assert!(dir.path().join("idle.json").exists());

        assert_eq!(store.evict_idle(Duration::hours(1)), 0);
        assert_eq!(store.active_sessions(), 1);

        assert_eq!(store.evict_idle(Duration::seconds(-1)), 1);
        assert_eq!(store.active_sessions(), 0);
        assert!(!dir.path().join("idle.json").exists());
    }
}
