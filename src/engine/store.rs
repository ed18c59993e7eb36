//! Team database: a named, durable key-value store with advisory per-key locks
//!
//! One store exists per team name and is shared by every invocation for that
//! team, across rounds and processes. Durability is explicit: mutations live
//! in memory until `persist()`, and `reload()` re-reads whatever the last
//! persist wrote. Locking is advisory only; it never blocks `set`, it exists
//! so overlapping invocations can signal "mid-transaction on this key" to
//! each other through the filesystem.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{CheckerError, CheckerResult};
use crate::utils::ensure_valid_filename;

const LOCK_RETRY_START: Duration = Duration::from_millis(10);
const LOCK_RETRY_MAX: Duration = Duration::from_millis(500);
const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

// Per-process sequence so scratch file names stay unique across handles
// and threads, not just across processes.
static FILE_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_suffix() -> String {
    format!(
        "{}.{}",
        std::process::id(),
        FILE_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Durable mapping from string keys to JSON values, scoped by store name.
pub struct TeamStore {
    name: String,
    file: PathBuf,
    lock_dir: PathBuf,
    data: HashMap<String, JsonValue>,
    held_locks: HashSet<String>,
}

impl TeamStore {
    /// Open the store for `name` under `dir`, loading persisted content if
    /// any exists. The name is sanitized into a valid filename first, so any
    /// team identifier is acceptable.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> CheckerResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let file_name = ensure_valid_filename(name);
        let mut store = Self {
            name: name.to_string(),
            file: dir.join(format!("{file_name}.json")),
            lock_dir: dir.join(format!("{file_name}.locks")),
            data: HashMap::new(),
            held_locks: HashSet::new(),
        };
        store.reload()?;
        debug!(name, keys = store.len(), "opened team store");
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a value. A missing key is an error, never a default.
    pub fn get(&self, key: &str) -> CheckerResult<&JsonValue> {
        self.data
            .get(key)
            .ok_or_else(|| CheckerError::KeyNotFound(key.to_string()))
    }

    /// Read a value and deserialize it into a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> CheckerResult<T> {
        let value = self.get(key)?.clone();
        serde_json::from_value(value).map_err(CheckerError::from)
    }

    /// Insert or overwrite unconditionally. Locks are advisory and are not
    /// checked here; cooperating callers poll `is_locked` before mutating.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> CheckerResult<()> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Remove a key. Deleting a missing key is `KeyNotFound`, same as `get`.
    pub fn delete(&mut self, key: &str) -> CheckerResult<()> {
        self.data
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CheckerError::KeyNotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of all current keys, in sorted order. The snapshot is taken
    /// at call time; calling `keys()` again yields a fresh one.
    pub fn keys(&self) -> std::vec::IntoIter<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys.into_iter()
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.lock_dir
            .join(format!("{}.lock", ensure_valid_filename(key)))
    }

    /// Whether any holder (including this handle) currently locks `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.lock_path(key).exists()
    }

    /// Acquire the advisory lock on `key`. Holders may be separate
    /// processes, so the lock is a create-exclusive file under the store's
    /// lock directory, carrying the owner pid. Blocks with exponential
    /// backoff while another live holder has the lock; reentrant for this
    /// handle.
    pub fn lock(&mut self, key: &str) -> CheckerResult<()> {
        if self.held_locks.contains(key) {
            return Ok(());
        }
        fs::create_dir_all(&self.lock_dir)?;

        let path = self.lock_path(key);
        let start = Instant::now();
        let mut delay = LOCK_RETRY_START;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    self.held_locks.insert(key.to_string());
                    debug!(store = %self.name, key, "acquired lock");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(&path)? {
                        continue;
                    }
                    if start.elapsed() >= LOCK_ACQUIRE_TIMEOUT {
                        return Err(CheckerError::Store(format!(
                            "could not acquire lock on key '{}' within {}s",
                            key,
                            LOCK_ACQUIRE_TIMEOUT.as_secs()
                        )));
                    }
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(LOCK_RETRY_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release the advisory lock on `key` if this handle holds it. Releasing
    /// a lock held by someone else (or by nobody) is a no-op.
    pub fn release(&mut self, key: &str) -> CheckerResult<()> {
        if self.held_locks.remove(key) {
            match fs::remove_file(self.lock_path(key)) {
                Ok(()) => debug!(store = %self.name, key, "released lock"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Release every lock this handle still holds. The engine calls this
    /// when an action finishes so a completed invocation never leaves keys
    /// locked for the next one.
    pub fn release_all(&mut self) -> CheckerResult<()> {
        let held: Vec<String> = self.held_locks.iter().cloned().collect();
        for key in held {
            self.release(&key)?;
        }
        Ok(())
    }

    /// Durably write the full current mapping. Writes go to a temp file
    /// unique to this call which is renamed over the store file, so a
    /// concurrent reader never observes a partially written store and
    /// concurrent persists never share a scratch file.
    pub fn persist(&mut self) -> CheckerResult<()> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = self
            .file
            .with_extension(format!("json.{}.tmp", unique_suffix()));

        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.file)?;

        debug!(store = %self.name, keys = self.len(), "persisted store");
        Ok(())
    }

    /// Discard in-memory state and re-read whatever is on disk (empty if
    /// nothing was ever persisted).
    pub fn reload(&mut self) -> CheckerResult<()> {
        self.data = match fs::read_to_string(&self.file) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }
}

/// Whether the pid recorded in a lock file still belongs to a running
/// process. `None` when the content is not a pid yet (a holder mid-acquire).
fn lock_owner_alive(content: &str) -> Option<bool> {
    let pid: u32 = content.trim().parse().ok()?;
    Some(pid == std::process::id() || Path::new(&format!("/proc/{pid}")).exists())
}

/// A lock file whose owner pid no longer exists would keep the key locked
/// forever; remove it so the caller can take over.
///
/// Removal must not unlink blindly: between reading the stale content and
/// deleting, another waiter may already have reclaimed the lock and a new
/// holder re-created it under the same path. The file is first renamed to a
/// claim path unique to this call, so only one contender ever proceeds, and
/// the claimed file is verified again before it is deleted.
fn reclaim_if_stale(path: &Path) -> CheckerResult<bool> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        // Racing with a release; let the caller retry normally.
        Err(_) => return Ok(false),
    };
    if lock_owner_alive(&content) != Some(false) {
        return Ok(false);
    }

    let claimed = path.with_extension(format!("reclaim.{}", unique_suffix()));
    if fs::rename(path, &claimed).is_err() {
        // Another contender claimed or released it first.
        return Ok(false);
    }

    // The lock may have been reclaimed and re-created by a live holder
    // between the read above and the rename.
    let owner = fs::read_to_string(&claimed)
        .ok()
        .and_then(|c| lock_owner_alive(&c));
    if owner != Some(false) {
        // Hand the live lock back; create-exclusive semantics keep a newer
        // lock at the original path intact.
        let _ = fs::hard_link(&claimed, path);
        let _ = fs::remove_file(&claimed);
        return Ok(false);
    }

    warn!(path = %path.display(), "reclaiming lock from dead process");
    fs::remove_file(&claimed)?;
    Ok(true)
}
