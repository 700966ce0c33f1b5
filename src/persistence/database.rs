//! SQLite database implementation for persistent storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::snapshot::Snapshot;
use crate::core::settings::Settings;

/// Slot holding the serialized instances and profile
pub const STATE_KEY: &str = "pteroengine_state";

/// Slot holding the application settings
pub const SETTINGS_KEY: &str = "app_settings";

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path`
    pub fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!("Database opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A throwaway database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    fn read_slot(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM slots WHERE key = ?1")?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn write_slot(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO slots (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // === Settings ===

    /// Load settings from database
    pub fn load_settings(&self) -> Result<Option<Settings>> {
        match self.read_slot(SETTINGS_KEY)? {
            Some(json) => {
                let mut settings: Settings =
                    serde_json::from_str(&json).context("Failed to deserialize settings")?;
                // Validate and fix any invalid values after deserialization
                settings.validate();
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Save settings to database
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.write_slot(SETTINGS_KEY, &json)?;
        debug!("Settings saved");
        Ok(())
    }

    // === State ===

    /// Raw state payload, if one was ever written
    pub fn load_state_json(&self) -> Result<Option<String>> {
        self.read_slot(STATE_KEY)
    }

    /// Overwrite the state slot with a raw payload
    pub fn save_state_json(&self, json: &str) -> Result<()> {
        self.write_slot(STATE_KEY, json)
    }

    /// Serialize and store the whole state
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let json = snapshot.to_json().context("Failed to serialize state")?;
        self.save_state_json(&json)?;
        debug!(
            "State saved with {} instances ({} bytes)",
            snapshot.instances.len(),
            json.len()
        );
        Ok(())
    }

    /// Load the stored state.
    ///
    /// An absent or undecodable slot yields the bundled defaults. Restored
    /// instances are always brought to rest.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = match self.load_state_json()? {
            Some(json) => match Snapshot::from_json(&json) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Stored state could not be decoded, using defaults: {}", e);
                    Snapshot::default()
                }
            },
            None => {
                info!("No stored state, using defaults");
                Snapshot::default()
            }
        };

        snapshot.settle();
        Ok(snapshot)
    }
}
