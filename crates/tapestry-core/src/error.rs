use std::fmt;

use crate::sentinel::{Severity, ThreatKind};

/// Failure reported by a storage collaborator.
///
/// Never fatal: the in-memory ledger stays authoritative and the error is
/// delivered as a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Backend(String),
    Closed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend(msg) => write!(f, "storage backend error: {msg}"),
            StorageError::Closed => write!(f, "storage writer is closed"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    DuplicateId(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::DuplicateId(id) => write!(f, "thread id already in ledger: {id}"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Invalid or missing Valkyrie policy. Fatal at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfigError {
    MissingThreshold,
    ThresholdOutOfRange(u8),
    NoRules,
    DuplicateRule {
        threat: ThreatKind,
        severity: Severity,
    },
    InertRule {
        threat: ThreatKind,
        severity: Severity,
    },
    DetectorOutOfRange {
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for PolicyConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyConfigError::MissingThreshold => write!(f, "policy threshold is missing"),
            PolicyConfigError::ThresholdOutOfRange(t) => {
                write!(f, "policy threshold {t} is outside 1..=5")
            }
            PolicyConfigError::NoRules => write!(f, "policy defines no rules"),
            PolicyConfigError::DuplicateRule { threat, severity } => {
                write!(f, "duplicate policy rule for {threat:?}/{severity:?}")
            }
            PolicyConfigError::InertRule { threat, severity } => {
                write!(f, "policy rule for {threat:?}/{severity:?} maps to NO_ACTION")
            }
            PolicyConfigError::DetectorOutOfRange { field, value } => {
                write!(f, "sentinel.{field} = {value} is out of range")
            }
        }
    }
}

impl std::error::Error for PolicyConfigError {}

#[derive(Debug)]
pub enum ScrollError {
    TooLarge(usize),
    TooManyThreads(usize),
    Json(serde_json::Error),
    InvalidRecord { index: usize, reason: String },
    DuplicateId(String),
    IntegrityFailure { index: usize },
}

impl fmt::Display for ScrollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollError::TooLarge(bytes) => write!(f, "scroll too large: {bytes} bytes"),
            ScrollError::TooManyThreads(n) => write!(f, "too many threads in scroll: {n}"),
            ScrollError::Json(e) => write!(f, "invalid scroll JSON: {e}"),
            ScrollError::InvalidRecord { index, reason } => {
                write!(f, "invalid thread at index {index}: {reason}")
            }
            ScrollError::DuplicateId(id) => write!(f, "duplicate thread id in scroll: {id}"),
            ScrollError::IntegrityFailure { index } => {
                write!(f, "hash chain broken at index {index}")
            }
        }
    }
}

impl std::error::Error for ScrollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScrollError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ScrollError {
    fn from(e: serde_json::Error) -> Self {
        ScrollError::Json(e)
    }
}
