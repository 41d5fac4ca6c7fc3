//! Background ledger persistence.
//!
//! The ledger hands every post-mutation snapshot to a [`PersistHandle`] and
//! moves on. A single task owns the storage and writes snapshots in order,
//! skipping any that were superseded while it was busy. Failures never reach
//! the ledger; they arrive on the notification channel instead.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use tapestry_core::{PersistSink, Snapshot, StorageError, ThreadStorage};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Persisted { threads: usize },
    StorageFailed(StorageError),
}

enum Command {
    Save(Snapshot),
    Flush(oneshot::Sender<()>),
}

/// Cloneable sender side, given to the ledger as its persistence sink.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<Command>,
    notify: mpsc::UnboundedSender<Notification>,
}

impl PersistSink for PersistHandle {
    fn persist(&self, snapshot: Snapshot) {
        if self.tx.send(Command::Save(snapshot)).is_err() {
            tracing::warn!("persister stopped; snapshot dropped");
            let _ = self
                .notify
                .send(Notification::StorageFailed(StorageError::Closed));
        }
    }
}

pub struct Persister {
    handle: PersistHandle,
    task: JoinHandle<()>,
}

impl Persister {
    /// Start the writer task on the current tokio runtime.
    pub fn spawn<S>(storage: S) -> (Self, mpsc::UnboundedReceiver<Notification>)
    where
        S: ThreadStorage + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(storage, rx, notify_tx.clone()));
        (
            Self {
                handle: PersistHandle {
                    tx,
                    notify: notify_tx,
                },
                task,
            },
            notify_rx,
        )
    }

    pub fn handle(&self) -> PersistHandle {
        self.handle.clone()
    }

    /// Wait until every snapshot queued before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.handle.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Flush, then stop the writer task. Handles still held elsewhere only
    /// log a warning on later sends.
    pub async fn shutdown(self) {
        self.flush().await;
        let Persister { handle, task } = self;
        drop(handle);
        task.abort();
        let _ = task.await;
    }
}

async fn run<S: ThreadStorage>(
    storage: S,
    mut rx: mpsc::UnboundedReceiver<Command>,
    notify: mpsc::UnboundedSender<Notification>,
) {
    while let Some(command) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        collect(command, &mut latest, &mut waiters);
        while let Ok(next) = rx.try_recv() {
            collect(next, &mut latest, &mut waiters);
        }

        if let Some(snapshot) = latest {
            let event = match storage.save(&snapshot) {
                Ok(()) => {
                    tracing::info!(threads = snapshot.len(), "ledger persisted");
                    Notification::Persisted {
                        threads: snapshot.len(),
                    }
                }
                Err(e) => {
                    tracing::warn!("ledger persistence failed: {e}");
                    Notification::StorageFailed(e)
                }
            };
            let _ = notify.send(event);
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

/// Keep only the newest snapshot of a batch; every flush in the batch is
/// answered after that single write.
fn collect(command: Command, latest: &mut Option<Snapshot>, waiters: &mut Vec<oneshot::Sender<()>>) {
    match command {
        Command::Save(snapshot) => *latest = Some(snapshot),
        Command::Flush(done) => waiters.push(done),
    }
}
