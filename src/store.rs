//! Counter record storage
//!
//! One plain-text file per chat (`counters_{chat}.csv`), one record row per
//! counter in the `kind;name;step;value;YYYY-MM-DD` format. Updates are full
//! read + rewrite cycles; a per-chat lock keeps two updates for the same
//! chat from interleaving, while different chats proceed independently.
//!
//! Read failures degrade to "no counters yet" with a logged warning so the
//! system stays usable after partial data loss.

use crate::counter::Counter;
use crate::error::{Result, TallybotError};
use crate::transport::ChatId;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage contract consumed by the flow handlers
pub trait CounterStore: Send + Sync {
    /// Load a chat's counters with accrual applied as of today
    ///
    /// Returns an empty list when no records exist or the file is
    /// unreadable.
    fn load_counters(&self, chat: ChatId) -> Result<Vec<Counter>>;

    /// Overwrite a chat's full counter set
    fn save_counters(&self, chat: ChatId, counters: &[Counter]) -> Result<()>;

    /// Append a single new counter record
    fn append_counter(&self, chat: ChatId, counter: &Counter) -> Result<()>;

    /// Replace the record whose name matches `counter.name`
    fn update_counter(&self, chat: ChatId, counter: &Counter) -> Result<()>;

    /// Read, mutate, and rewrite one record in a single cycle
    ///
    /// The whole find-apply-rewrite sequence holds the chat's update lock,
    /// so two concurrent mutations of the same chat can never read the same
    /// stored state. Returns the updated counter, or `None` when no record
    /// matches `name` (in which case nothing is written).
    fn modify_counter(
        &self,
        chat: ChatId,
        name: &str,
        apply: &mut dyn FnMut(&mut Counter),
    ) -> Result<Option<Counter>>;

    /// Delete the record with the given name, if present
    fn remove_counter(&self, chat: ChatId, name: &str) -> Result<()>;

    /// Look up one counter by name, with accrual applied
    fn find_counter(&self, chat: ChatId, name: &str) -> Result<Option<Counter>> {
        Ok(self
            .load_counters(chat)?
            .into_iter()
            .find(|c| c.name == name))
    }
}

/// File-backed [`CounterStore`]
pub struct FileStore {
    data_dir: PathBuf,
    /// Per-chat update locks; one read-modify-write cycle in flight per chat
    locks: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Create a store in the default data directory
    ///
    /// Honors the `TALLYBOT_DATA_DIR` environment variable, falling back to
    /// the platform data directory. This makes it easy to point the binary
    /// at a test directory without changing the user's application data dir.
    pub fn new() -> Result<Self> {
        if let Ok(override_dir) = std::env::var("TALLYBOT_DATA_DIR") {
            return Self::new_with_path(override_dir);
        }

        let proj_dirs = directories::ProjectDirs::from("com", "tallybot", "tallybot")
            .ok_or_else(|| TallybotError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir())
    }

    /// Create a store rooted at the given directory
    ///
    /// Primarily useful for tests where the default application data
    /// directory is not desirable (for example, a temporary directory).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tallybot::store::FileStore;
    ///
    /// let store = FileStore::new_with_path("/tmp/tallybot-data").unwrap();
    /// let _ = store;
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .context("Failed to create data directory")
            .map_err(|e| TallybotError::Storage(e.to_string()))?;

        Ok(Self {
            data_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The record file for one chat
    fn file_path(&self, chat: ChatId) -> PathBuf {
        self.data_dir.join(format!("counters_{}.csv", chat))
    }

    /// Acquire the update lock for one chat
    fn chat_lock(&self, chat: ChatId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        Arc::clone(locks.entry(chat).or_default())
    }

    fn locked(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().expect("chat lock poisoned")
    }

    /// Load with accrual applied as of an explicit date
    ///
    /// The trait method delegates here with today's date; tests pass fixed
    /// dates for deterministic accrual assertions.
    pub fn load_as_of(&self, chat: ChatId, as_of: NaiveDate) -> Result<Vec<Counter>> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);
        self.read_records(chat, as_of)
    }

    /// Read and parse one chat's record file; caller holds the chat lock
    fn read_records(&self, chat: ChatId, as_of: NaiveDate) -> Result<Vec<Counter>> {
        let path = self.file_path(chat);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(%chat, path = %path.display(), error = %e, "unreadable counter file, treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut counters = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match Counter::parse_record(chat, line, as_of) {
                Ok(counter) => counters.push(counter),
                Err(e) => {
                    tracing::warn!(%chat, error = %e, "skipping malformed counter record");
                }
            }
        }
        Ok(counters)
    }

    /// Write one chat's full record file; caller holds the chat lock
    fn write_records(&self, chat: ChatId, counters: &[Counter]) -> Result<()> {
        let path = self.file_path(chat);
        let mut contents = String::new();
        for counter in counters {
            contents.push_str(&counter.to_record());
            contents.push('\n');
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write counter file {}", path.display()))?;
        Ok(())
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

impl CounterStore for FileStore {
    fn load_counters(&self, chat: ChatId) -> Result<Vec<Counter>> {
        self.load_as_of(chat, Self::today())
    }

    fn save_counters(&self, chat: ChatId, counters: &[Counter]) -> Result<()> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);
        self.write_records(chat, counters)
    }

    fn append_counter(&self, chat: ChatId, counter: &Counter) -> Result<()> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);

        let path = self.file_path(chat);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open counter file {}", path.display()))?;
        writeln!(file, "{}", counter.to_record())?;
        Ok(())
    }

    fn update_counter(&self, chat: ChatId, counter: &Counter) -> Result<()> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);

        // Full read + rewrite under the chat lock; sibling counters get
        // their pending accrual folded in at the same time.
        let mut counters = self.read_records(chat, Self::today())?;
        match counters.iter_mut().find(|c| c.name == counter.name) {
            Some(existing) => *existing = counter.clone(),
            None => {
                return Err(TallybotError::Storage(format!(
                    "no counter named {} for chat {}",
                    counter.name, chat
                ))
                .into())
            }
        }
        self.write_records(chat, &counters)
    }

    fn modify_counter(
        &self,
        chat: ChatId,
        name: &str,
        apply: &mut dyn FnMut(&mut Counter),
    ) -> Result<Option<Counter>> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);

        let mut counters = self.read_records(chat, Self::today())?;
        let updated = match counters.iter_mut().find(|c| c.name == name) {
            Some(counter) => {
                apply(counter);
                counter.clone()
            }
            None => return Ok(None),
        };
        self.write_records(chat, &counters)?;
        Ok(Some(updated))
    }

    fn remove_counter(&self, chat: ChatId, name: &str) -> Result<()> {
        let lock = self.chat_lock(chat);
        let _guard = Self::locked(&lock);

        let counters = self.read_records(chat, Self::today())?;
        let remaining: Vec<Counter> = counters.into_iter().filter(|c| c.name != name).collect();
        self.write_records(chat, &remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterKind;
    use serial_test::serial;
    use tempfile::tempdir;

    fn create_test_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let store = FileStore::new_with_path(dir.path()).expect("failed to create store");
        (store, dir)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let (store, _dir) = create_test_store();
        let counters = store.load_counters(ChatId(1)).unwrap();
        assert!(counters.is_empty());
    }

    #[test]
    fn test_append_then_load_roundtrip() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(42);
        let today = FileStore::today();

        let counter = Counter::create(chat, CounterKind::Daily, "Coffee", 2, today).unwrap();
        store.append_counter(chat, &counter).unwrap();

        let loaded = store.load_counters(chat).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Coffee");
        assert_eq!(loaded[0].value, 2);
    }

    #[test]
    fn test_load_applies_daily_accrual() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(42);

        store
            .save_counters(
                chat,
                &[Counter::reconstruct(
                    chat,
                    CounterKind::Daily,
                    "Coffee",
                    2,
                    10,
                    date(2024, 1, 1),
                    date(2024, 1, 1),
                )],
            )
            .unwrap();

        // Stored row is daily;Coffee;2;10;2024-01-01; four elapsed days.
        let loaded = store.load_as_of(chat, date(2024, 1, 5)).unwrap();
        assert_eq!(loaded[0].value, 18);
    }

    #[test]
    fn test_set_value_then_save_persists_exact_row() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(42);

        store
            .save_counters(
                chat,
                &[Counter::reconstruct(
                    chat,
                    CounterKind::Daily,
                    "Coffee",
                    2,
                    10,
                    date(2024, 1, 1),
                    date(2024, 1, 1),
                )],
            )
            .unwrap();

        let mut counter = store.load_as_of(chat, date(2024, 1, 5)).unwrap().remove(0);
        assert_eq!(counter.value, 18);
        counter.set_value(5, date(2024, 1, 5));
        store.save_counters(chat, &[counter]).unwrap();

        let raw = std::fs::read_to_string(store.file_path(chat)).unwrap();
        assert_eq!(raw, "daily;Coffee;2;5;2024-01-05\n");
    }

    #[test]
    fn test_update_replaces_matching_row_only() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        let today = FileStore::today();

        let coffee = Counter::create(chat, CounterKind::Simple, "Coffee", 1, today).unwrap();
        let tea = Counter::create(chat, CounterKind::Simple, "Tea", 1, today).unwrap();
        store.append_counter(chat, &coffee).unwrap();
        store.append_counter(chat, &tea).unwrap();

        let mut updated = coffee.clone();
        updated.adjust(-5);
        store.update_counter(chat, &updated).unwrap();

        let loaded = store.load_counters(chat).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.iter().find(|c| c.name == "Coffee").unwrap().value,
            -4
        );
        assert_eq!(loaded.iter().find(|c| c.name == "Tea").unwrap().value, 1);
    }

    #[test]
    fn test_modify_counter_applies_and_persists() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        let today = FileStore::today();

        let coffee = Counter::create(chat, CounterKind::Simple, "Coffee", 1, today).unwrap();
        store.append_counter(chat, &coffee).unwrap();

        let updated = store
            .modify_counter(chat, "Coffee", &mut |c| c.adjust(3))
            .unwrap()
            .unwrap();
        assert_eq!(updated.value, 4);
        assert_eq!(
            store.find_counter(chat, "Coffee").unwrap().unwrap().value,
            4
        );
    }

    #[test]
    fn test_modify_unknown_counter_writes_nothing() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);

        let result = store
            .modify_counter(chat, "Ghost", &mut |c| c.adjust(1))
            .unwrap();
        assert!(result.is_none());
        assert!(!store.file_path(chat).exists());
    }

    #[test]
    fn test_update_unknown_counter_is_error() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        let ghost =
            Counter::create(chat, CounterKind::Simple, "Ghost", 1, FileStore::today()).unwrap();
        assert!(store.update_counter(chat, &ghost).is_err());
    }

    #[test]
    fn test_remove_counter_deletes_row() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        let today = FileStore::today();

        let coffee = Counter::create(chat, CounterKind::Simple, "Coffee", 1, today).unwrap();
        let tea = Counter::create(chat, CounterKind::Simple, "Tea", 1, today).unwrap();
        store.append_counter(chat, &coffee).unwrap();
        store.append_counter(chat, &tea).unwrap();

        store.remove_counter(chat, "Coffee").unwrap();

        let loaded = store.load_counters(chat).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Tea");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        store.remove_counter(chat, "Missing").unwrap();
        store.remove_counter(chat, "Missing").unwrap();
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);

        std::fs::write(
            store.file_path(chat),
            "daily;Coffee;2;10;2024-01-01\nnot a record\nweekly;Gym;3;6;2024-01-01\n",
        )
        .unwrap();

        let loaded = store.load_as_of(chat, date(2024, 1, 1)).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_chats_use_separate_files() {
        let (store, _dir) = create_test_store();
        let today = FileStore::today();

        let a = Counter::create(ChatId(1), CounterKind::Simple, "A", 1, today).unwrap();
        let b = Counter::create(ChatId(2), CounterKind::Simple, "B", 1, today).unwrap();
        store.append_counter(ChatId(1), &a).unwrap();
        store.append_counter(ChatId(2), &b).unwrap();

        assert_eq!(store.load_counters(ChatId(1)).unwrap()[0].name, "A");
        assert_eq!(store.load_counters(ChatId(2)).unwrap()[0].name, "B");
    }

    #[test]
    fn test_find_counter_by_name() {
        let (store, _dir) = create_test_store();
        let chat = ChatId(1);
        let today = FileStore::today();

        let coffee = Counter::create(chat, CounterKind::Simple, "Coffee", 1, today).unwrap();
        store.append_counter(chat, &coffee).unwrap();

        assert!(store.find_counter(chat, "Coffee").unwrap().is_some());
        assert!(store.find_counter(chat, "Tea").unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_new_respects_env_override() {
        let dir = tempdir().expect("failed to create tempdir");
        let nested = dir.path().join("nested");
        std::env::set_var("TALLYBOT_DATA_DIR", nested.to_string_lossy().to_string());

        let store = FileStore::new().expect("new failed with env override");
        assert_eq!(store.data_dir, nested);
        assert!(nested.exists());

        std::env::remove_var("TALLYBOT_DATA_DIR");
    }
}
