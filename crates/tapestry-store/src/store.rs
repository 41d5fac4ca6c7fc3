use std::path::Path;

use rusqlite::{Connection, params};

use tapestry_core::{
    ActionKind, EngineStatus, ExecutionLogEntry, Intention, Outcome, Region, StorageError, Thread,
    ThreadStorage, TimeOfDay, Trigger,
};

use crate::error::{Result, StoreError};
use crate::schema;

const VALKYRIE_STATUS_KEY: &str = "valkyrie_status";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Threads ---

    /// Replace the stored ledger with `threads`, in order, atomically.
    pub fn save_threads(&self, threads: &[Thread]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM threads", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO threads (seq, id, intention, time_of_day, region, title, timestamp, previous_hash, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (seq, thread) in threads.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    thread.id,
                    thread.intention.as_str(),
                    thread.time_of_day.as_str(),
                    thread.region.as_str(),
                    thread.title,
                    to_sql_int(thread.timestamp)?,
                    thread.previous_hash,
                    thread.hash,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(threads = threads.len(), "saved ledger");
        Ok(())
    }

    /// Threads in insertion order. Unrecognised category strings load as
    /// `Unknown` rather than failing.
    pub fn load_threads(&self) -> Result<Vec<Thread>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, intention, time_of_day, region, title, timestamp, previous_hash, hash
             FROM threads ORDER BY seq",
        )?;

        let rows: Vec<(String, String, String, String, Option<String>, i64, String, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(
                |(id, intention, time_of_day, region, title, timestamp, previous_hash, hash)| {
                    Ok(Thread {
                        timestamp: from_sql_int(timestamp, &id)?,
                        id,
                        intention: Intention::parse(&intention),
                        time_of_day: TimeOfDay::parse(&time_of_day),
                        region: Region::parse(&region),
                        title,
                        previous_hash,
                        hash,
                    })
                },
            )
            .collect()
    }

    pub fn thread_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // --- Valkyrie ---

    pub fn append_log_entry(&self, entry: &ExecutionLogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO execution_log (seq, timestamp, trigger_kind, action, target, outcome, defcon_level, ledger_len)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                to_sql_int(entry.seq)?,
                to_sql_int(entry.timestamp)?,
                entry.trigger.as_label(),
                entry.action.as_str(),
                entry.target.map(Region::as_str),
                entry.outcome.as_str(),
                entry.defcon_level,
                entry.ledger_len as i64,
            ],
        )?;
        Ok(())
    }

    pub fn load_execution_log(&self) -> Result<Vec<ExecutionLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, timestamp, trigger_kind, action, target, outcome, defcon_level, ledger_len
             FROM execution_log ORDER BY seq",
        )?;

        let rows: Vec<(i64, i64, String, String, Option<String>, String, Option<u8>, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(
                |(seq, timestamp, trigger, action, target, outcome, defcon_level, ledger_len)| {
                    let label = format!("log entry {seq}");
                    Ok(ExecutionLogEntry {
                        seq: from_sql_int(seq, &label)?,
                        timestamp: from_sql_int(timestamp, &label)?,
                        trigger: Trigger::from_label(&trigger).ok_or_else(|| {
                            StoreError::InvalidData(format!("{label}: unknown trigger {trigger}"))
                        })?,
                        action: ActionKind::parse(&action).ok_or_else(|| {
                            StoreError::InvalidData(format!("{label}: unknown action {action}"))
                        })?,
                        target: target.as_deref().map(Region::parse),
                        outcome: Outcome::parse(&outcome).ok_or_else(|| {
                            StoreError::InvalidData(format!("{label}: unknown outcome {outcome}"))
                        })?,
                        defcon_level,
                        ledger_len: from_sql_int(ledger_len, &label)? as usize,
                    })
                },
            )
            .collect()
    }

    pub fn clear_execution_log(&self) -> Result<()> {
        self.conn.execute("DELETE FROM execution_log", [])?;
        Ok(())
    }

    /// Stored engine status; a fresh database reports `Active`.
    pub fn valkyrie_status(&self) -> Result<EngineStatus> {
        match self.get_metadata(VALKYRIE_STATUS_KEY)? {
            None => Ok(EngineStatus::Active),
            Some(raw) => EngineStatus::parse(&raw)
                .ok_or_else(|| StoreError::InvalidData(format!("unknown valkyrie status: {raw}"))),
        }
    }

    pub fn set_valkyrie_status(&self, status: EngineStatus) -> Result<()> {
        self.set_metadata(VALKYRIE_STATUS_KEY, status.as_str())
    }
}

impl ThreadStorage for Store {
    fn load(&self) -> std::result::Result<Vec<Thread>, StorageError> {
        Ok(self.load_threads()?)
    }

    fn save(&self, threads: &[Thread]) -> std::result::Result<(), StorageError> {
        Ok(self.save_threads(threads)?)
    }
}

fn to_sql_int(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("integer out of range: {value}")))
}

fn from_sql_int(value: i64, context: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{context}: negative integer {value}")))
}
