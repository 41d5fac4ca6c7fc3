//! Thread-event analytics engine.
//!
//! An append-only, hash-chained [`Ledger`] of user "threads" feeds three
//! readers: [`Sentinel`] grades anomalies into a DEFCON [`Report`],
//! [`Mnemosyne`] ranks threads by TF-IDF similarity, and [`Valkyrie`] turns
//! reports into logged policy actions.
//!
//! Zero I/O. Persistence, configuration files and transports live in the
//! store and CLI crates.

pub mod constants;
pub mod error;
pub mod horizon;
pub mod ledger;
pub mod mnemosyne;
pub mod policy;
pub mod scroll;
pub mod sentinel;
pub mod thread;
pub mod time;
pub mod tokenizer;
pub mod valkyrie;

pub use constants::{DEFCON_MAX, DEFCON_MIN, GENESIS_HASH, IDF_FLOOR};
pub use error::{LedgerError, PolicyConfigError, ScrollError, StorageError};
pub use horizon::{Horizon, Momentum, Projection};
pub use ledger::{IntegrityReport, Ledger, PersistSink, Snapshot, ThreadStorage, verify_chain};
pub use mnemosyne::{Match, Mnemosyne};
pub use policy::{ActionKind, Policy, PolicyRule};
pub use scroll::{export_scroll, import_scroll};
pub use sentinel::{
    AlertStatus, Dominance, Report, Sentinel, SentinelConfig, Severity, Threat, ThreatKind, Zone,
};
pub use thread::{Intention, Region, Thread, ThreadDraft, TimeOfDay};
pub use time::{Clock, fixed_clock, millis_to_iso8601, now_unix_millis, system_clock};
pub use tokenizer::tokenize;
pub use valkyrie::{EngineStatus, ExecutionLogEntry, ManualCommand, Outcome, Trigger, Valkyrie};
