//! Data directory layout and the optional `policy.toml`.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;
use tapestry_core::{Policy, PolicyConfigError, PolicyRule, SentinelConfig};

use crate::error::{Result, StoreError};

/// Overrides the default data directory.
pub const DATA_DIR_ENV: &str = "TAPESTRY_DATA_DIR";

const DB_FILE: &str = "tapestry.db";
const POLICY_FILE: &str = "policy.toml";

fn default_base_dir() -> PathBuf {
    dirs_home().join(".tapestry")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Explicit path first, then `TAPESTRY_DATA_DIR`, then `~/.tapestry`.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let root = explicit
            .map(PathBuf::from)
            .or_else(|| {
                env::var(DATA_DIR_ENV)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(default_base_dir);
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    pub fn policy_path(&self) -> PathBuf {
        self.root.join(POLICY_FILE)
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", self.root.display()))
        })
    }

    /// Policy and detector thresholds. A missing file means defaults.
    pub fn load_config(&self) -> Result<(Policy, SentinelConfig)> {
        let path = self.policy_path();
        if !path.exists() {
            return Ok((Policy::default(), SentinelConfig::default()));
        }
        let raw = fs::read_to_string(&path)?;
        let file = PolicyFile::parse(&raw)?;
        tracing::info!(path = %path.display(), "loaded policy file");
        file.into_parts()
    }
}

/// On-disk shape of `policy.toml`.
///
/// ```toml
/// threshold = 3
///
/// [sentinel]
/// surge_threshold = 8
///
/// [[rules]]
/// threat = "TEMPORAL_SURGE"
/// severity = "HIGH"
/// action = "LOCKDOWN"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyFile {
    pub threshold: Option<u8>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub sentinel: SentinelConfig,
}

impl PolicyFile {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate into engine types. A file without rules keeps the default
    /// rule set; a file without a threshold is rejected, as are detector
    /// thresholds outside their usable range.
    pub fn into_parts(self) -> Result<(Policy, SentinelConfig)> {
        let threshold = self.threshold.ok_or(PolicyConfigError::MissingThreshold)?;
        self.sentinel.validate()?;
        let rules = if self.rules.is_empty() {
            Policy::default().rules().to_vec()
        } else {
            self.rules
        };
        Ok((Policy::new(threshold, rules)?, self.sentinel))
    }
}
