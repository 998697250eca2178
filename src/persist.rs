use rusqlite::{params, Connection, OptionalExtension};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PersistError;
use crate::timer::TimerState;

/// Key under which the snapshot is kept in key-value backends
pub const STATE_KEY: &str = "timesnap-data";

/// Opaque key-value home of the whole snapshot; last write wins
pub trait StateStore {
    fn load(&self) -> Result<Option<TimerState>, PersistError>;
    fn save(&self, state: &TimerState) -> Result<(), PersistError>;
}

fn decode(bytes: &[u8]) -> Result<TimerState, PersistError> {
    let state: TimerState = serde_json::from_slice(bytes)?;
    Ok(state.validate()?)
}

/// Snapshot kept as a pretty-printed json file, the same shape as a backup export
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<TimerState>, PersistError> {
        match fs::read(&self.path) {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &TimerState) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(state)?;
        fs::write(&self.path, data)?;
        debug!(path = %self.path.display(), "saved snapshot");
        Ok(())
    }
}

/// Snapshot kept as a single json value in a sqlite key-value table
#[derive(Debug)]
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Opens the database, creating its directory and table if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, PersistError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<Option<TimerState>, PersistError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [STATE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        value.map(|v| decode(v.as_bytes())).transpose()
    }

    fn save(&self, state: &TimerState) -> Result<(), PersistError> {
        let value = serde_json::to_string(state)?;
        self.conn.execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![STATE_KEY, value],
        )?;
        Ok(())
    }
}

/// In-process backend for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    saved: RefCell<Option<TimerState>>,
    writes: Cell<usize>,
    fail_writes: bool,
}

impl MemoryStateStore {
    /// A backend whose every write fails
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<TimerState> {
        self.saved.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<TimerState>, PersistError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &TimerState) -> Result<(), PersistError> {
        if self.fail_writes {
            return Err(std::io::Error::new(ErrorKind::Other, "write refused").into());
        }
        *self.saved.borrow_mut() = Some(state.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

impl<T: StateStore + ?Sized> StateStore for Box<T> {
    fn load(&self) -> Result<Option<TimerState>, PersistError> {
        (**self).load()
    }

    fn save(&self, state: &TimerState) -> Result<(), PersistError> {
        (**self).save(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{transition, Intent};
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample_state() -> TimerState {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let state = transition(
            &TimerState::default(),
            Intent::add_timer("Write report", Some("Acme")).unwrap(),
            now,
        )
        .unwrap();
        let id = state.timers[0].id;
        transition(&state, Intent::StartTimer(id), now).unwrap()
    }

    #[test]
    fn file_store_missing_file_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::with_path(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::with_path(dir.path().join("nested").join("state.json"));
        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = FileStateStore::with_path(&path);
        assert_matches!(store.load(), Err(PersistError::Json(_)));
    }

    #[test]
    fn file_store_reports_inconsistent_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = sample_state();
        state.timers[0].start_time = None;
        fs::write(&path, serde_json::to_vec(&state).unwrap()).unwrap();

        let store = FileStateStore::with_path(&path);
        assert_matches!(
            store.load(),
            Err(PersistError::Store(StoreError::MalformedSnapshot(_)))
        );
    }

    #[test]
    fn sqlite_store_roundtrip_and_overwrite() {
        let store = SqliteStateStore::in_memory().unwrap();
        assert_eq!(store.load().unwrap(), None);

        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state.clone()));

        let mut changed = state;
        changed.focus_mode = true;
        store.save(&changed).unwrap();
        assert_eq!(store.load().unwrap(), Some(changed));
    }

    #[test]
    fn sqlite_store_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db").join("timesnap.db");
        let state = sample_state();
        {
            let store = SqliteStateStore::open(&path).unwrap();
            store.save(&state).unwrap();
        }
        let reopened = SqliteStateStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(state));
    }

    #[test]
    fn memory_store_counts_writes() {
        let store = MemoryStateStore::default();
        store.save(&TimerState::default()).unwrap();
        store.save(&TimerState::default()).unwrap();
        assert_eq!(store.writes(), 2);
        assert!(MemoryStateStore::failing()
            .save(&TimerState::default())
            .is_err());
    }
}
