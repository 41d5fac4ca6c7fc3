use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fails harmlessly on in-memory and fresh databases.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS threads (
            seq           INTEGER PRIMARY KEY,
            id            TEXT NOT NULL UNIQUE,
            intention     TEXT NOT NULL,
            time_of_day   TEXT NOT NULL,
            region        TEXT NOT NULL,
            title         TEXT,
            timestamp     INTEGER NOT NULL,
            previous_hash TEXT NOT NULL DEFAULT '',
            hash          TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS execution_log (
            seq          INTEGER PRIMARY KEY,
            timestamp    INTEGER NOT NULL,
            trigger_kind TEXT NOT NULL,
            action       TEXT NOT NULL,
            target       TEXT,
            outcome      TEXT NOT NULL,
            defcon_level INTEGER,
            ledger_len   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_threads_region ON threads(region);
        ",
    )?;

    // v1 databases predate the hash chain
    if conn
        .prepare("SELECT previous_hash, hash FROM threads LIMIT 0")
        .is_err()
    {
        conn.execute_batch(
            "ALTER TABLE threads ADD COLUMN previous_hash TEXT NOT NULL DEFAULT '';
             ALTER TABLE threads ADD COLUMN hash TEXT NOT NULL DEFAULT '';",
        )?;
        tracing::info!("added hash chain columns to threads");
    }

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
