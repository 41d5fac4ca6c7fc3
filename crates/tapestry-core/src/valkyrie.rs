//! Policy-driven response engine.
//!
//! Every `evaluate` call appends exactly one [`ExecutionLogEntry`], whether
//! or not anything was deployed. The log is the only state that grows.

use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::{ActionKind, Policy};
use crate::sentinel::{Report, Severity, Threat, ThreatKind};
use crate::thread::{Region, Thread};
use crate::time::{Clock, system_clock};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    #[default]
    Active,
    Inactive,
}

impl EngineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStatus::Active => "ACTIVE",
            EngineStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(EngineStatus::Active),
            "INACTIVE" => Some(EngineStatus::Inactive),
            _ => None,
        }
    }
}

/// What caused a log entry: a routine scan with nothing actionable, a
/// specific threat kind, or an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Trigger {
    Scan,
    Threat(ThreatKind),
    Manual,
}

impl Trigger {
    pub fn as_label(self) -> &'static str {
        match self {
            Trigger::Scan => "SCAN",
            Trigger::Threat(kind) => kind.as_str(),
            Trigger::Manual => "MANUAL",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "SCAN" => Some(Trigger::Scan),
            "MANUAL" => Some(Trigger::Manual),
            other => ThreatKind::parse(other).map(Trigger::Threat),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl From<Trigger> for String {
    fn from(t: Trigger) -> Self {
        t.as_label().to_string()
    }
}

impl TryFrom<String> for Trigger {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Trigger::from_label(&s).ok_or_else(|| format!("unknown trigger: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Deployed,
    NoAction,
    Suppressed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Deployed => "DEPLOYED",
            Outcome::NoAction => "NO_ACTION",
            Outcome::Suppressed => "SUPPRESSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPLOYED" => Some(Outcome::Deployed),
            "NO_ACTION" => Some(Outcome::NoAction),
            "SUPPRESSED" => Some(Outcome::Suppressed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub seq: u64,
    pub timestamp: u64,
    pub trigger: Trigger,
    pub action: ActionKind,
    pub target: Option<Region>,
    pub outcome: Outcome,
    /// Absent for manual overrides.
    pub defcon_level: Option<u8>,
    pub ledger_len: usize,
}

/// Operator command that bypasses policy and engine status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCommand {
    pub action: ActionKind,
    pub target: Option<Region>,
}

pub struct Valkyrie {
    status: EngineStatus,
    policy: Policy,
    log: Vec<ExecutionLogEntry>,
    clock: Clock,
    next_seq: u64,
}

impl fmt::Debug for Valkyrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Valkyrie")
            .field("status", &self.status)
            .field("policy", &self.policy)
            .field("log_len", &self.log.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl Default for Valkyrie {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}

impl Valkyrie {
    pub fn new(policy: Policy) -> Self {
        Self {
            status: EngineStatus::Active,
            policy,
            log: Vec::new(),
            clock: system_clock(),
            next_seq: 1,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn set_status(&mut self, status: EngineStatus) {
        self.status = status;
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        &self.log
    }

    /// Arm or disarm one policy rule. Returns false if the pair has no rule.
    pub fn toggle_rule(&mut self, threat: ThreatKind, severity: Severity, enabled: bool) -> bool {
        self.policy.set_enabled(threat, severity, enabled)
    }

    /// Rehydrate the log from storage. Sequence numbers continue after the
    /// highest restored entry.
    pub fn restore_log(&mut self, entries: Vec<ExecutionLogEntry>) {
        self.next_seq = entries.iter().map(|e| e.seq).max().unwrap_or(0) + 1;
        self.log = entries;
    }

    /// Decide on a response to `report` and record it.
    pub fn evaluate(&mut self, report: &Report, snapshot: &[Thread]) -> &ExecutionLogEntry {
        match self.try_evaluate(report, snapshot, |_| Ok::<(), Infallible>(())) {
            Ok(entry) => entry,
            Err(never) => match never {},
        }
    }

    /// Like [`evaluate`](Self::evaluate), but the entry joins the log only
    /// after `commit` accepts it. On error the log and sequence are unchanged.
    pub fn try_evaluate<E>(
        &mut self,
        report: &Report,
        snapshot: &[Thread],
        commit: impl FnOnce(&ExecutionLogEntry) -> Result<(), E>,
    ) -> Result<&ExecutionLogEntry, E> {
        let (trigger, action, target, outcome) = if self.status == EngineStatus::Inactive {
            (Trigger::Scan, ActionKind::NoAction, None, Outcome::Suppressed)
        } else if report.defcon_level <= self.policy.threshold()
            && let Some((threat, action)) = self.select(report)
        {
            let target = report
                .hottest_zone()
                .map(|z| z.region)
                .or(threat.region);
            (Trigger::Threat(threat.kind), action, target, Outcome::Deployed)
        } else {
            (Trigger::Scan, ActionKind::NoAction, None, Outcome::NoAction)
        };

        let entry = self.next_entry(
            trigger,
            action,
            target,
            outcome,
            Some(report.defcon_level),
            snapshot.len(),
        );
        self.commit(entry, commit)
    }

    pub fn manual_override(
        &mut self,
        command: ManualCommand,
        snapshot: &[Thread],
    ) -> &ExecutionLogEntry {
        match self.try_manual_override(command, snapshot, |_| Ok::<(), Infallible>(())) {
            Ok(entry) => entry,
            Err(never) => match never {},
        }
    }

    pub fn try_manual_override<E>(
        &mut self,
        command: ManualCommand,
        snapshot: &[Thread],
        commit: impl FnOnce(&ExecutionLogEntry) -> Result<(), E>,
    ) -> Result<&ExecutionLogEntry, E> {
        let entry = self.next_entry(
            Trigger::Manual,
            command.action,
            command.target,
            Outcome::Deployed,
            None,
            snapshot.len(),
        );
        self.commit(entry, commit)
    }

    /// Most severe threat with an enabled rule; the earlier threat wins ties.
    fn select<'r>(&self, report: &'r Report) -> Option<(&'r Threat, ActionKind)> {
        report
            .threats
            .iter()
            .filter_map(|t| {
                self.policy
                    .lookup(t.kind, t.severity)
                    .map(|rule| (t, rule.action))
            })
            .fold(None, |best, candidate| match best {
                Some((b, _)) if b.severity >= candidate.0.severity => best,
                _ => Some(candidate),
            })
    }

    fn next_entry(
        &self,
        trigger: Trigger,
        action: ActionKind,
        target: Option<Region>,
        outcome: Outcome,
        defcon_level: Option<u8>,
        ledger_len: usize,
    ) -> ExecutionLogEntry {
        ExecutionLogEntry {
            seq: self.next_seq,
            timestamp: (self.clock)(),
            trigger,
            action,
            target,
            outcome,
            defcon_level,
            ledger_len,
        }
    }

    fn commit<E>(
        &mut self,
        entry: ExecutionLogEntry,
        commit: impl FnOnce(&ExecutionLogEntry) -> Result<(), E>,
    ) -> Result<&ExecutionLogEntry, E> {
        commit(&entry)?;
        self.next_seq += 1;
        self.log.push(entry);
        Ok(&self.log[self.log.len() - 1])
    }
}
