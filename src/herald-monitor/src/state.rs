//! Persisted dedup state: seen messages, seen replies and agent-owned threads.
//!
//! Two JSON documents live in the state directory:
//!
//! - `.seen_messages.json`: `{"seen": ["<ts>", ...]}`
//! - `.agent_threads.json`: `{"messages": [{"ts": .., "time": ..}], "seen_replies": ["<root>:<ts>", ...]}`
//!
//! Both are read fully at startup and rewritten fully (temp file + rename)
//! at every persist point. Bounding happens at persist time and evicts the
//! oldest entries by timestamp sort order.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MonitorError, MonitorResult};

pub const SEEN_MESSAGES_FILE: &str = ".seen_messages.json";
pub const AGENT_THREADS_FILE: &str = ".agent_threads.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Key under which a thread reply is recorded in the seen-replies set.
pub fn reply_key(thread_root: &str, reply_ts: &str) -> String {
    format!("{}:{}", thread_root, reply_ts)
}

/// Bounded set of already-processed identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenSet {
    entries: BTreeSet<String>,
    capacity: usize,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeSet::new(),
            capacity,
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = String>, capacity: usize) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            capacity,
        }
    }

    /// Record `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.entries.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the oldest entries until at most `capacity` remain.
    pub fn compact(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    /// Entries in ascending sort order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }
}

/// A thread started by the dispatcher's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentThread {
    /// Thread root timestamp.
    pub ts: String,
    /// When the thread was first recorded.
    pub time: DateTime<Utc>,
}

/// Threads owned by the dispatcher's identity; replies in them always qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentThreadRegistry {
    threads: Vec<AgentThread>,
    capacity: usize,
}

impl AgentThreadRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            threads: Vec::new(),
            capacity,
        }
    }

    fn from_threads(threads: Vec<AgentThread>, capacity: usize) -> Self {
        let mut registry = Self::new(capacity);
        for thread in threads {
            if !registry.contains(&thread.ts) {
                registry.threads.push(thread);
            }
        }
        registry
    }

    /// Register `ts` as an agent-owned thread root. Returns `false` if known.
    pub fn record(&mut self, ts: impl Into<String>) -> bool {
        self.record_at(ts, Utc::now())
    }

    pub fn record_at(&mut self, ts: impl Into<String>, time: DateTime<Utc>) -> bool {
        let ts = ts.into();
        if self.contains(&ts) {
            return false;
        }
        self.threads.push(AgentThread { ts, time });
        true
    }

    pub fn contains(&self, ts: &str) -> bool {
        self.threads.iter().any(|t| t.ts == ts)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn threads(&self) -> &[AgentThread] {
        &self.threads
    }

    /// Keep only the `capacity` most recent roots.
    pub fn compact(&mut self) {
        if self.threads.len() <= self.capacity {
            return;
        }
        self.threads.sort_by(|a, b| a.ts.cmp(&b.ts));
        let excess = self.threads.len() - self.capacity;
        self.threads.drain(..excess);
    }
}

/// Entry limits for the persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLimits {
    pub seen_messages: usize,
    pub seen_replies: usize,
    pub agent_threads: usize,
}

impl Default for StateLimits {
    fn default() -> Self {
        Self {
            seen_messages: 100,
            seen_replies: 100,
            agent_threads: 20,
        }
    }
}

/// Everything the dispatcher remembers between cycles and restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    pub seen_messages: SeenSet,
    pub seen_replies: SeenSet,
    pub agent_threads: AgentThreadRegistry,
}

impl MonitorState {
    pub fn empty(limits: StateLimits) -> Self {
        Self {
            seen_messages: SeenSet::new(limits.seen_messages),
            seen_replies: SeenSet::new(limits.seen_replies),
            agent_threads: AgentThreadRegistry::new(limits.agent_threads),
        }
    }

    /// Apply the bounding rule to every collection.
    pub fn compact(&mut self) {
        self.seen_messages.compact();
        self.seen_replies.compact();
        self.agent_threads.compact();
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenMessagesFile {
    #[serde(default)]
    seen: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AgentThreadsFile {
    #[serde(default)]
    messages: Vec<AgentThread>,
    #[serde(default)]
    seen_replies: Vec<String>,
}

/// Reads and writes [`MonitorState`] in a state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    seen_path: PathBuf,
    threads_path: PathBuf,
    limits: StateLimits,
}

impl StateStore {
    pub fn new(state_dir: &Path, limits: StateLimits) -> Self {
        Self {
            seen_path: state_dir.join(SEEN_MESSAGES_FILE),
            threads_path: state_dir.join(AGENT_THREADS_FILE),
            limits,
        }
    }

    pub fn seen_path(&self) -> &Path {
        &self.seen_path
    }

    pub fn threads_path(&self) -> &Path {
        &self.threads_path
    }

    /// Load state; missing or unreadable files start empty.
    pub fn load(&self) -> MonitorState {
        let seen: SeenMessagesFile = read_or_default(&self.seen_path);
        let threads: AgentThreadsFile = read_or_default(&self.threads_path);

        let state = MonitorState {
            seen_messages: SeenSet::from_entries(seen.seen, self.limits.seen_messages),
            seen_replies: SeenSet::from_entries(threads.seen_replies, self.limits.seen_replies),
            agent_threads: AgentThreadRegistry::from_threads(
                threads.messages,
                self.limits.agent_threads,
            ),
        };

        debug!(
            seen_messages = state.seen_messages.len(),
            seen_replies = state.seen_replies.len(),
            agent_threads = state.agent_threads.len(),
            "Loaded monitor state"
        );
        state
    }

    /// Bound and write both documents.
    pub fn save(&self, state: &mut MonitorState) -> MonitorResult<()> {
        state.compact();

        let seen = SeenMessagesFile {
            seen: state.seen_messages.iter().cloned().collect(),
        };
        let threads = AgentThreadsFile {
            messages: state.agent_threads.threads().to_vec(),
            seen_replies: state.seen_replies.iter().cloned().collect(),
        };

        write_json(&self.seen_path, &seen)?;
        write_json(&self.threads_path, &threads)?;
        Ok(())
    }
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read state file, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt state file, starting empty");
            T::default()
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> MonitorResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| MonitorError::json(path, e))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    let file = File::create(&temp_path).map_err(|e| MonitorError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&data)
        .and_then(|_| writer.flush())
        .map_err(|e| MonitorError::io(&temp_path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| MonitorError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_seen_set_keeps_most_recent() {
        let mut set = SeenSet::new(100);
        for i in 0..150 {
            set.insert(format!("1700000{:03}.000100", i));
        }
        set.compact();

        let kept: Vec<String> = set.iter().cloned().collect();
        let expected: Vec<String> = (50..150).map(|i| format!("1700000{:03}.000100", i)).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut set = SeenSet::new(10);
        assert!(set.insert("1.0"));
        assert!(!set.insert("1.0"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_registry_dedups_and_bounds() {
        let mut registry = AgentThreadRegistry::new(2);
        assert!(registry.record("100.1"));
        assert!(!registry.record("100.1"));
        registry.record("100.3");
        registry.record("100.2");
        registry.compact();

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains("100.1"));
        assert!(registry.contains("100.2"));
        assert!(registry.contains("100.3"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), StateLimits::default());

        let mut state = store.load();
        assert!(state.seen_messages.is_empty());

        state.seen_messages.insert("100.1");
        state.seen_replies.insert(reply_key("100.1", "100.2"));
        state.agent_threads.record("100.1");
        store.save(&mut state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), StateLimits::default());
        let mut state = store.load();
        state.seen_messages.insert("100.1");
        state.seen_replies.insert("100.1:100.2");
        state.agent_threads.record("100.1");
        store.save(&mut state).unwrap();

        let seen: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.seen_path()).unwrap()).unwrap();
        assert_eq!(seen["seen"][0], "100.1");

        let threads: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.threads_path()).unwrap()).unwrap();
        assert_eq!(threads["messages"][0]["ts"], "100.1");
        assert!(threads["messages"][0]["time"].is_string());
        assert_eq!(threads["seen_replies"][0], "100.1:100.2");
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SEEN_MESSAGES_FILE), "{not json").unwrap();
        fs::write(dir.path().join(AGENT_THREADS_FILE), "\"oops\"").unwrap();

        let state = StateStore::new(dir.path(), StateLimits::default()).load();
        assert!(state.seen_messages.is_empty());
        assert!(state.seen_replies.is_empty());
        assert!(state.agent_threads.is_empty());
    }

    #[test]
    fn test_save_bounds_persisted_lists() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), StateLimits::default());
        let mut state = store.load();
        for i in 0..150 {
            state.seen_messages.insert(format!("{}.0", 1000 + i));
        }
        store.save(&mut state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.seen_messages.len(), 100);
        assert!(loaded.seen_messages.contains("1149.0"));
        assert!(!loaded.seen_messages.contains("1049.0"));
    }
}
