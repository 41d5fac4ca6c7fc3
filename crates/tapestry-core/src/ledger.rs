//! Append-only, ordered thread store.
//!
//! The ledger is the single source of truth for Sentinel, Mnemosyne and
//! Valkyrie. It never interprets thread content; it orders, identifies and
//! chains records, then hands every new snapshot to an optional persistence
//! sink without waiting for the write.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;

use crate::constants::{GENESIS_HASH, ID_LEN};
use crate::error::{LedgerError, StorageError};
use crate::thread::{Thread, ThreadDraft, chain_hash, rehash};
use crate::time::{Clock, system_clock};

/// Storage collaborator contract: load at startup, save after each mutation.
pub trait ThreadStorage {
    fn load(&self) -> Result<Vec<Thread>, StorageError>;
    fn save(&self, threads: &[Thread]) -> Result<(), StorageError>;
}

/// Receives the post-mutation snapshot. Must return without blocking on I/O.
pub trait PersistSink: Send {
    fn persist(&self, snapshot: Snapshot);
}

/// Cheap, immutable view of the ledger at one point in time.
///
/// Cloning shares the underlying list; later appends copy-on-write and never
/// affect a snapshot already handed out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot(Arc<Vec<Thread>>);

impl Snapshot {
    pub fn threads(&self) -> &[Thread] {
        &self.0
    }

    pub fn find(&self, id: &str) -> Option<&Thread> {
        self.0.iter().find(|t| t.id == id)
    }

    pub fn to_vec(&self) -> Vec<Thread> {
        self.0.as_ref().clone()
    }
}

impl Deref for Snapshot {
    type Target = [Thread];

    fn deref(&self) -> &[Thread] {
        &self.0
    }
}

impl From<Vec<Thread>> for Snapshot {
    fn from(threads: Vec<Thread>) -> Self {
        Snapshot(Arc::new(threads))
    }
}

/// Result of walking the hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub verified: bool,
    pub checked: usize,
    pub first_corrupted: Option<usize>,
}

/// Recompute the chain from `GENESIS_HASH` and report the first record whose
/// stored link or hash disagrees.
pub fn verify_chain(threads: &[Thread]) -> IntegrityReport {
    let mut previous = GENESIS_HASH.to_string();
    for (i, thread) in threads.iter().enumerate() {
        if thread.previous_hash != previous || thread.hash != rehash(thread, &previous) {
            return IntegrityReport {
                verified: false,
                checked: i,
                first_corrupted: Some(i),
            };
        }
        previous = thread.hash.clone();
    }
    IntegrityReport {
        verified: true,
        checked: threads.len(),
        first_corrupted: None,
    }
}

pub struct Ledger {
    threads: Arc<Vec<Thread>>,
    ids: HashSet<String>,
    high_water: u64,
    clock: Clock,
    sink: Option<Box<dyn PersistSink>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(Vec::new()),
            ids: HashSet::new(),
            high_water: 0,
            clock: system_clock(),
            sink: None,
        }
    }

    /// Rebuild from loaded records, preserving their order.
    pub fn from_threads(threads: Vec<Thread>) -> Result<Self, LedgerError> {
        let mut ids = HashSet::with_capacity(threads.len());
        for thread in &threads {
            if !ids.insert(thread.id.clone()) {
                return Err(LedgerError::DuplicateId(thread.id.clone()));
            }
        }
        let high_water = threads.iter().map(|t| t.timestamp).max().unwrap_or(0);
        Ok(Self {
            threads: Arc::new(threads),
            ids,
            high_water,
            clock: system_clock(),
            sink: None,
        })
    }

    /// Load from a storage collaborator. An unreadable store yields an empty
    /// ledger plus the error, so startup can continue and report it.
    pub fn load_from(storage: &impl ThreadStorage) -> (Self, Option<StorageError>) {
        match storage.load() {
            Ok(threads) => match Self::from_threads(threads) {
                Ok(ledger) => (ledger, None),
                Err(e) => (Self::new(), Some(StorageError::Backend(e.to_string()))),
            },
            Err(e) => (Self::new(), Some(e)),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: impl PersistSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Accept a thread in memory, then hand the snapshot to the sink.
    ///
    /// Missing timestamps come from the clock, raised to the highest
    /// timestamp seen so far. Missing ids are the first `ID_LEN` hex
    /// characters of the chain hash.
    pub fn append(&mut self, draft: ThreadDraft) -> Result<Thread, LedgerError> {
        if let Some(id) = &draft.id
            && self.ids.contains(id)
        {
            return Err(LedgerError::DuplicateId(id.clone()));
        }

        let timestamp = draft
            .timestamp
            .unwrap_or_else(|| (self.clock)().max(self.high_water));
        let previous_hash = self
            .threads
            .last()
            .map(|t| t.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let title = draft.title.filter(|t| !t.is_empty());
        let hash = chain_hash(
            draft.intention,
            draft.time_of_day,
            draft.region,
            title.as_deref().unwrap_or(""),
            timestamp,
            &previous_hash,
        );
        let id = match draft.id {
            Some(id) => id,
            None if self.ids.contains(&hash[..ID_LEN]) => hash.clone(),
            None => hash[..ID_LEN].to_string(),
        };

        let thread = Thread {
            id,
            intention: draft.intention,
            time_of_day: draft.time_of_day,
            region: draft.region,
            title,
            timestamp,
            previous_hash,
            hash,
        };

        self.ids.insert(thread.id.clone());
        self.high_water = self.high_water.max(timestamp);
        Arc::make_mut(&mut self.threads).push(thread.clone());
        self.notify_sink();
        Ok(thread)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.threads))
    }

    /// Destructive. Confirmation belongs to the caller.
    pub fn clear(&mut self) {
        self.threads = Arc::new(Vec::new());
        self.ids.clear();
        self.notify_sink();
    }

    /// Replace the whole ledger, e.g. after a verified scroll import.
    pub fn replace(&mut self, threads: Vec<Thread>) -> Result<(), LedgerError> {
        let rebuilt = Self::from_threads(threads)?;
        self.threads = rebuilt.threads;
        self.ids = rebuilt.ids;
        self.high_water = self.high_water.max(rebuilt.high_water);
        self.notify_sink();
        Ok(())
    }

    pub fn verify_integrity(&self) -> IntegrityReport {
        verify_chain(&self.threads)
    }

    fn notify_sink(&self) {
        if let Some(sink) = &self.sink {
            sink.persist(self.snapshot());
        }
    }
}
