use anyhow::{Context, Result, bail};
use tokio::sync::mpsc::UnboundedReceiver;

use tapestry_core::{
    EngineStatus, ExecutionLogEntry, IntegrityReport, Ledger, ManualCommand, Match, Mnemosyne,
    Report, Sentinel, Snapshot, StorageError, Thread, ThreadDraft, ThreadStorage, Valkyrie,
    export_scroll, import_scroll,
};
use tapestry_store::{DataDir, Notification, Persister, Store};

/// Application context: one instance of each engine plus the stores they
/// write through. Every CLI verb and MCP tool goes through here.
pub struct Tapestry {
    ledger: Ledger,
    sentinel: Sentinel,
    valkyrie: Valkyrie,
    store: Store,
    persister: Persister,
    notifications: UnboundedReceiver<Notification>,
}

impl Tapestry {
    /// Open the data directory. Must run inside a tokio runtime.
    pub fn open(data: &DataDir) -> Result<Self> {
        data.ensure().context("failed to create data directory")?;
        let (policy, sentinel_config) = data
            .load_config()
            .with_context(|| format!("failed to load {}", data.policy_path().display()))?;
        let db_path = data.db_path();
        let store = Store::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let writer = Store::open(&db_path).context("failed to open persistence connection")?;
        tracing::debug!(path = %db_path.display(), "opened store");
        Self::assemble(store, writer, Valkyrie::new(policy), Sentinel::new(sentinel_config))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::assemble(
            Store::open_in_memory()?,
            Store::open_in_memory()?,
            Valkyrie::default(),
            Sentinel::default(),
        )
    }

    /// Wire the engines to `store` for reads and the execution log, and to
    /// `writer` for background ledger writes.
    pub(crate) fn assemble<W>(
        store: Store,
        writer: W,
        mut valkyrie: Valkyrie,
        sentinel: Sentinel,
    ) -> Result<Self>
    where
        W: ThreadStorage + Send + 'static,
    {
        let (ledger, load_err) = Ledger::load_from(&store);
        if let Some(e) = load_err {
            bail!("failed to load ledger: {e}");
        }
        valkyrie.restore_log(
            store
                .load_execution_log()
                .context("failed to load execution log")?,
        );
        valkyrie.set_status(store.valkyrie_status().context("failed to load status")?);

        let (persister, notifications) = Persister::spawn(writer);
        let ledger = ledger.with_sink(persister.handle());
        Ok(Self {
            ledger,
            sentinel,
            valkyrie,
            store,
            persister,
            notifications,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.ledger.snapshot()
    }

    pub fn weave(&mut self, draft: ThreadDraft) -> Result<Thread> {
        let thread = self.ledger.append(draft)?;
        tracing::debug!(id = %thread.id, "woven");
        Ok(thread)
    }

    pub fn assess(&self) -> Report {
        self.sentinel.assess(&self.ledger.snapshot())
    }

    /// Assess the ledger as it stood after its first `count` threads.
    pub fn assess_at(&self, count: usize) -> Result<Report> {
        let snapshot = self.ledger.snapshot();
        let Some(prefix) = snapshot.get(..count) else {
            bail!(
                "ledger holds {} threads; cannot assess at {count}",
                snapshot.len()
            );
        };
        Ok(self.sentinel.assess(prefix))
    }

    /// Ranked matches for a stored thread, or `None` if the id is unknown.
    pub fn query(&self, id: &str, limit: usize) -> Option<Vec<Match>> {
        let snapshot = self.ledger.snapshot();
        snapshot.find(id)?;
        let mut matches = Mnemosyne::query_by_id(id, &snapshot);
        matches.truncate(limit);
        Some(matches)
    }

    /// Assess the current ledger and let Valkyrie respond. Always logs.
    ///
    /// The entry is stored before it joins the in-memory log, so a failed
    /// insert leaves both unchanged.
    pub fn evaluate(&mut self) -> Result<ExecutionLogEntry> {
        let snapshot = self.ledger.snapshot();
        let report = self.sentinel.assess(&snapshot);
        let store = &self.store;
        let entry = self
            .valkyrie
            .try_evaluate(&report, &snapshot, |e| store.append_log_entry(e))
            .context("failed to record execution log entry")?;
        Ok(entry.clone())
    }

    pub fn manual_override(&mut self, command: ManualCommand) -> Result<ExecutionLogEntry> {
        let snapshot = self.ledger.snapshot();
        let store = &self.store;
        let entry = self
            .valkyrie
            .try_manual_override(command, &snapshot, |e| store.append_log_entry(e))
            .context("failed to record execution log entry")?;
        Ok(entry.clone())
    }

    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        self.valkyrie.execution_log()
    }

    pub fn status(&self) -> EngineStatus {
        self.valkyrie.status()
    }

    pub fn set_status(&mut self, status: EngineStatus) -> Result<()> {
        self.store
            .set_valkyrie_status(status)
            .context("failed to store status")?;
        self.valkyrie.set_status(status);
        Ok(())
    }

    pub fn verify(&self) -> IntegrityReport {
        self.ledger.verify_integrity()
    }

    pub fn export(&self) -> Result<String> {
        Ok(export_scroll(&self.ledger.snapshot())?)
    }

    /// Replace the ledger with a validated scroll. Returns the thread count.
    pub fn import(&mut self, json: &str) -> Result<usize> {
        let threads = import_scroll(json).context("scroll rejected")?;
        let count = threads.len();
        self.ledger.replace(threads)?;
        Ok(count)
    }

    /// Drop every thread and the execution log.
    pub fn clear(&mut self) -> Result<()> {
        self.ledger.clear();
        self.store
            .clear_execution_log()
            .context("failed to clear execution log")?;
        self.valkyrie.restore_log(Vec::new());
        Ok(())
    }

    /// Take every queued persistence outcome without waiting. Successful
    /// writes are dropped; failures are returned in arrival order.
    pub fn drain_notifications(&mut self) -> Vec<StorageError> {
        let mut failures = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            match n {
                Notification::Persisted { .. } => {}
                Notification::StorageFailed(e) => failures.push(e),
            }
        }
        failures
    }

    /// Wait for pending ledger writes, then report any that failed.
    pub async fn flush(&mut self) -> Vec<StorageError> {
        self.persister.flush().await;
        self.drain_notifications()
    }
}
