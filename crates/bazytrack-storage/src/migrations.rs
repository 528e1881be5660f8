use anyhow::Result;
use rusqlite::Connection;

/// Initialize the preference store schema
///
/// # Errors
///
/// Returns an error if table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Single key-value table. Values are JSON scalars (bool, integer or
    // string); updated_at records the last write for diagnostics.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS prefs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
