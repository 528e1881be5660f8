use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::JoinHandle,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::migrations;

/// A preference value. Stored on disk as a bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl std::fmt::Display for PrefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

enum WriteOp {
    Put {
        key: String,
        value: String,
        updated_at: String,
    },
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// A change notification: the mutated key and the value it was set to.
/// Carrying the written value (rather than having observers re-read the
/// store) keeps queued notifications faithful to the write order even
/// when several writes land before an observer drains its queue.
pub type PrefChange = (String, PrefValue);

type ObserverMap = HashMap<u64, UnboundedSender<PrefChange>>;

/// Persistent, process-wide key-value store of primitive-typed settings.
///
/// Reads are served from an in-memory cache. Writes update the cache,
/// notify subscribers, and hand the row to a background writer thread
/// that owns the sqlite connection - the write call returns immediately
/// and durability is eventually consistent. Call [`PreferenceStore::flush`]
/// to wait for the writer to drain.
pub struct PreferenceStore {
    cache: Mutex<HashMap<String, PrefValue>>,
    observers: Arc<Mutex<ObserverMap>>,
    next_observer_id: AtomicU64,
    writer: mpsc::Sender<WriteOp>,
    writer_handle: Option<JoinHandle<()>>,
}

impl PreferenceStore {
    /// Open (or create) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening or
    /// schema initialization fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create preference directory")?;
        }
        let conn = Connection::open(path).context("Failed to open preference store")?;
        log::info!("Preference store opened at: {}", path.display());
        Self::with_connection(conn)
    }

    /// Open a transient in-memory store. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if connection opening or schema initialization fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::init_schema(&conn)?;

        let cache = Self::load_all(&conn)?;
        let (tx, rx) = mpsc::channel();
        let writer_handle = std::thread::spawn(move || Self::writer_loop(&conn, &rx));

        Ok(Self {
            cache: Mutex::new(cache),
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_observer_id: AtomicU64::new(0),
            writer: tx,
            writer_handle: Some(writer_handle),
        })
    }

    /// Default on-disk location of the store.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("bazytrack");
        path.push("prefs.db");
        path
    }

    fn load_all(conn: &Connection) -> Result<HashMap<String, PrefValue>> {
        let mut stmt = conn.prepare("SELECT key, value FROM prefs")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut cache = HashMap::new();
        for row in rows {
            let (key, raw) = row?;
            match serde_json::from_str::<PrefValue>(&raw) {
                Ok(value) => {
                    cache.insert(key, value);
                }
                Err(e) => log::warn!("Skipping malformed preference '{key}': {e}"),
            }
        }
        Ok(cache)
    }

    fn writer_loop(conn: &Connection, rx: &mpsc::Receiver<WriteOp>) {
        while let Ok(op) = rx.recv() {
            match op {
                WriteOp::Put {
                    key,
                    value,
                    updated_at,
                } => {
                    // The platform contract assumes persistence never
                    // fails; a failed write is logged, not surfaced.
                    if let Err(e) = conn.execute(
                        "INSERT OR REPLACE INTO prefs (key, value, updated_at)
                         VALUES (?1, ?2, ?3)",
                        params![key, value, updated_at],
                    ) {
                        log::error!("Failed to persist preference '{key}': {e}");
                    }
                }
                WriteOp::Flush(ack) => {
                    let _ = ack.send(());
                }
                WriteOp::Shutdown => break,
            }
        }
    }

    /// Whether a value has ever been written under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(key)
    }

    /// Read a boolean preference, falling back to `default` when the key
    /// is absent or holds a different type.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(PrefValue::Bool(b)) => b,
            _ => default,
        }
    }

    /// Read a string preference.
    #[must_use]
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(PrefValue::Text(s)) => s,
            _ => default.to_string(),
        }
    }

    /// Read an integer preference.
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(PrefValue::Int(i)) => i,
            _ => default,
        }
    }

    /// Read a preference without a type expectation.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<PrefValue> {
        self.get(key)
    }

    fn get(&self, key: &str) -> Option<PrefValue> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set_bool(&self, key: &str, value: bool) {
        self.set(key, PrefValue::Bool(value));
    }

    pub fn set_string(&self, key: &str, value: &str) {
        self.set(key, PrefValue::Text(value.to_string()));
    }

    pub fn set_int(&self, key: &str, value: i64) {
        self.set(key, PrefValue::Int(value));
    }

    /// Write a preference. The cache and subscribers are updated before
    /// this returns; the disk write happens on the writer thread.
    pub fn set(&self, key: &str, value: PrefValue) {
        let raw = serde_json::to_string(&value).unwrap_or_else(|_| String::from("null"));

        {
            let mut cache = self
                .cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            cache.insert(key.to_string(), value.clone());
        }

        self.notify(key, &value);

        let op = WriteOp::Put {
            key: key.to_string(),
            value: raw,
            updated_at: Utc::now().to_rfc3339(),
        };
        if self.writer.send(op).is_err() {
            log::error!("Preference writer thread is gone; '{key}' not persisted");
        }
    }

    fn notify(&self, key: &str, value: &PrefValue) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Prune subscribers whose receiving end has been dropped.
        observers.retain(|_, tx| tx.send((key.to_string(), value.clone())).is_ok());
    }

    /// Register a change observer. The returned handle receives every
    /// subsequent mutation, in write order, and deregisters itself when
    /// dropped.
    #[must_use]
    pub fn subscribe(&self) -> PrefSubscription {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        self.observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);
        PrefSubscription {
            id,
            rx,
            observers: Arc::clone(&self.observers),
        }
    }

    /// Block until every write issued so far has reached disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer thread has terminated.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.writer
            .send(WriteOp::Flush(ack_tx))
            .context("Preference writer thread is gone")?;
        ack_rx
            .recv()
            .context("Preference writer thread exited before flush completed")?;
        Ok(())
    }
}

impl Drop for PreferenceStore {
    fn drop(&mut self) {
        let _ = self.writer.send(WriteOp::Shutdown);
        if let Some(handle) = self.writer_handle.take() {
            let _ = handle.join();
        }
    }
}

/// RAII observer registration. Holds the change-notification queue and
/// removes itself from the store's observer table on drop, so a paired
/// deregistration cannot be forgotten on any exit path.
pub struct PrefSubscription {
    id: u64,
    rx: UnboundedReceiver<PrefChange>,
    observers: Arc<Mutex<ObserverMap>>,
}

impl PrefSubscription {
    /// Pop the next queued change notification, if any.
    pub fn try_next(&mut self) -> Option<PrefChange> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next change notification. Returns `None` once the
    /// store has been dropped.
    pub async fn next(&mut self) -> Option<PrefChange> {
        self.rx.recv().await
    }
}

impl Drop for PrefSubscription {
    fn drop(&mut self) {
        self.observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.id);
    }
}
