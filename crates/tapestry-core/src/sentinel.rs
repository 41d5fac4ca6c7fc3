//! Stateless anomaly detection over a ledger snapshot.
//!
//! Every call recomputes from scratch. The same snapshot always yields an
//! equal [`Report`], and no input can make `assess` fail.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONGESTION_COUNT, CONGESTION_MIN_SAMPLE, CONGESTION_RATIO, DEFCON_MAX, DEFCON_MIN,
    POLARIZATION_FLOOR, POLARIZATION_MIN_SAMPLE, SURGE_THRESHOLD, WINDOW_MS,
};
use crate::error::PolicyConfigError;
use crate::horizon::{Horizon, forecast};
use crate::thread::{Intention, Region, Thread};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    TemporalSurge,
    LocalizedCongestion,
    Polarization,
    MalformedData,
}

impl ThreatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatKind::TemporalSurge => "TEMPORAL_SURGE",
            ThreatKind::LocalizedCongestion => "LOCALIZED_CONGESTION",
            ThreatKind::Polarization => "POLARIZATION",
            ThreatKind::MalformedData => "MALFORMED_DATA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEMPORAL_SURGE" => Some(ThreatKind::TemporalSurge),
            "LOCALIZED_CONGESTION" => Some(ThreatKind::LocalizedCongestion),
            "POLARIZATION" => Some(ThreatKind::Polarization),
            "MALFORMED_DATA" => Some(ThreatKind::MalformedData),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }

    /// Grade an overshoot relative to its threshold.
    fn from_excess(excess: usize, threshold: usize) -> Self {
        let ratio = excess as f64 / threshold.max(1) as f64;
        if ratio >= 1.0 {
            Severity::High
        } else if ratio >= 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Standby,
    Active,
    Alert,
}

impl AlertStatus {
    fn from_defcon(defcon: u8) -> Self {
        match defcon {
            DEFCON_MAX => AlertStatus::Standby,
            3..=4 => AlertStatus::Active,
            _ => AlertStatus::Alert,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub kind: ThreatKind,
    pub severity: Severity,
    pub region: Option<Region>,
    /// Raw measurement behind the threat: events over threshold for a
    /// surge, region count for congestion, balance score for polarization,
    /// malformed record count for bad data.
    pub magnitude: usize,
    pub evidence: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dominance {
    pub intention: Intention,
    pub count: usize,
    pub percent_share: f64,
}

/// Per-region density for the map renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub region: Region,
    pub count: usize,
    pub intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub defcon_level: u8,
    pub status: AlertStatus,
    pub threats: Vec<Threat>,
    pub dominant: Option<Dominance>,
    pub counts_by_intention: BTreeMap<Intention, usize>,
    pub balance_score: u8,
    pub zones: Vec<Zone>,
    pub total: usize,
    pub malformed: usize,
    pub horizon: Horizon,
}

impl Report {
    pub fn has_threat(&self, kind: ThreatKind) -> bool {
        self.threats.iter().any(|t| t.kind == kind)
    }

    pub fn threats_of(&self, kind: ThreatKind) -> impl Iterator<Item = &Threat> {
        self.threats.iter().filter(move |t| t.kind == kind)
    }

    /// Highest-intensity zone; ties go to the earlier zone.
    pub fn hottest_zone(&self) -> Option<&Zone> {
        self.zones.iter().fold(None, |best: Option<&Zone>, z| match best {
            Some(b) if b.intensity >= z.intensity => Some(b),
            _ => Some(z),
        })
    }
}

/// Tunable detection thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub window_ms: u64,
    pub surge_threshold: usize,
    pub congestion_ratio: f64,
    pub congestion_count: usize,
    pub congestion_min_sample: usize,
    pub polarization_floor: u8,
    pub polarization_min_sample: usize,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            window_ms: WINDOW_MS,
            surge_threshold: SURGE_THRESHOLD,
            congestion_ratio: CONGESTION_RATIO,
            congestion_count: CONGESTION_COUNT,
            congestion_min_sample: CONGESTION_MIN_SAMPLE,
            polarization_floor: POLARIZATION_FLOOR,
            polarization_min_sample: POLARIZATION_MIN_SAMPLE,
        }
    }
}

impl SentinelConfig {
    /// Reject thresholds that would make a detector fire always or never.
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        fn out_of_range(field: &'static str, value: impl ToString) -> PolicyConfigError {
            PolicyConfigError::DetectorOutOfRange {
                field,
                value: value.to_string(),
            }
        }

        if self.window_ms == 0 {
            return Err(out_of_range("window_ms", self.window_ms));
        }
        if self.surge_threshold == 0 {
            return Err(out_of_range("surge_threshold", self.surge_threshold));
        }
        if !(self.congestion_ratio > 0.0 && self.congestion_ratio < 1.0) {
            return Err(out_of_range("congestion_ratio", self.congestion_ratio));
        }
        if self.congestion_count == 0 {
            return Err(out_of_range("congestion_count", self.congestion_count));
        }
        if self.polarization_floor > 100 {
            return Err(out_of_range("polarization_floor", self.polarization_floor));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Sentinel {
    config: SentinelConfig,
}

impl Sentinel {
    pub fn new(config: SentinelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn assess(&self, threads: &[Thread]) -> Report {
        let counts_by_intention = intention_counts(threads);
        if threads.is_empty() {
            return Report {
                defcon_level: DEFCON_MAX,
                status: AlertStatus::Standby,
                threats: Vec::new(),
                dominant: None,
                counts_by_intention,
                balance_score: 0,
                zones: Vec::new(),
                total: 0,
                malformed: 0,
                horizon: Horizon::default(),
            };
        }

        let region_counts = region_counts(threads);
        let balance_score = balance_score(&counts_by_intention);
        let malformed = threads.iter().filter(|t| t.is_malformed()).count();

        let mut threats = Vec::new();
        threats.extend(self.detect_surge(threads));
        threats.extend(self.detect_congestion(&region_counts));
        threats.extend(self.detect_polarization(&counts_by_intention, balance_score));
        if malformed > 0 {
            threats.push(Threat {
                kind: ThreatKind::MalformedData,
                severity: Severity::Low,
                region: None,
                magnitude: malformed,
                evidence: format!(
                    "{malformed} of {} threads carry unknown intention, time or region",
                    threads.len()
                ),
            });
        }

        let defcon_level = defcon_for(&threats);
        Report {
            defcon_level,
            status: AlertStatus::from_defcon(defcon_level),
            dominant: dominance(threads, &counts_by_intention),
            zones: zones(&region_counts),
            horizon: forecast(threads, &counts_by_intention),
            threats,
            counts_by_intention,
            balance_score,
            total: threads.len(),
            malformed,
        }
    }

    /// Densest window of `window_ms` over the sorted timestamps.
    fn detect_surge(&self, threads: &[Thread]) -> Option<Threat> {
        let mut events: Vec<(u64, Region)> =
            threads.iter().map(|t| (t.timestamp, t.region)).collect();
        events.sort_by_key(|(ts, _)| *ts);

        let mut left = 0;
        let mut peak = 0;
        let mut peak_end = 0;
        for right in 0..events.len() {
            while events[right].0 - events[left].0 > self.config.window_ms {
                left += 1;
            }
            let count = right - left + 1;
            if count > peak {
                peak = count;
                peak_end = right;
            }
        }

        let threshold = self.config.surge_threshold;
        if peak <= threshold {
            return None;
        }
        let excess = peak - threshold;
        let region = Some(events[peak_end].1).filter(|r| r.is_known());
        Some(Threat {
            kind: ThreatKind::TemporalSurge,
            severity: Severity::from_excess(excess, threshold),
            region,
            magnitude: excess,
            evidence: format!(
                "{peak} threads within {}ms (threshold {threshold})",
                self.config.window_ms
            ),
        })
    }

    fn detect_congestion(&self, region_counts: &BTreeMap<Region, usize>) -> Vec<Threat> {
        let known_total: usize = region_counts.values().sum();
        if known_total == 0 {
            return Vec::new();
        }
        let cfg = &self.config;

        region_counts
            .iter()
            .filter_map(|(&region, &count)| {
                let share = count as f64 / known_total as f64;
                let share_hit =
                    known_total >= cfg.congestion_min_sample && share > cfg.congestion_ratio;
                let count_hit = count > cfg.congestion_count;
                if !share_hit && !count_hit {
                    return None;
                }
                let severity = if share >= 0.9 || count >= cfg.congestion_count * 2 {
                    Severity::High
                } else if share >= 0.75 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                Some(Threat {
                    kind: ThreatKind::LocalizedCongestion,
                    severity,
                    region: Some(region),
                    magnitude: count,
                    evidence: format!(
                        "{count} of {known_total} located threads in {region} ({:.0}%)",
                        share * 100.0
                    ),
                })
            })
            .collect()
    }

    fn detect_polarization(
        &self,
        counts: &BTreeMap<Intention, usize>,
        balance_score: u8,
    ) -> Option<Threat> {
        let known_total: usize = counts.values().sum();
        if known_total <= self.config.polarization_min_sample
            || balance_score >= self.config.polarization_floor
        {
            return None;
        }
        Some(Threat {
            kind: ThreatKind::Polarization,
            severity: Severity::Medium,
            region: None,
            magnitude: balance_score as usize,
            evidence: format!(
                "balance score {balance_score} below {}",
                self.config.polarization_floor
            ),
        })
    }
}

/// 5 minus one step per distinct threat kind, minus one more for any HIGH.
fn defcon_for(threats: &[Threat]) -> u8 {
    let kinds: BTreeSet<ThreatKind> = threats.iter().map(|t| t.kind).collect();
    let high = threats.iter().any(|t| t.severity == Severity::High);
    let steps = kinds.len() as i64 + i64::from(high);
    (DEFCON_MAX as i64 - steps).clamp(DEFCON_MIN as i64, DEFCON_MAX as i64) as u8
}

/// Counts for every known intention, zero-filled.
fn intention_counts(threads: &[Thread]) -> BTreeMap<Intention, usize> {
    let mut counts: BTreeMap<Intention, usize> =
        Intention::KNOWN.iter().map(|&i| (i, 0)).collect();
    for thread in threads.iter().filter(|t| t.intention.is_known()) {
        *counts.entry(thread.intention).or_default() += 1;
    }
    counts
}

/// Counts for known regions that appear at least once.
fn region_counts(threads: &[Thread]) -> BTreeMap<Region, usize> {
    let mut counts = BTreeMap::new();
    for thread in threads.iter().filter(|t| t.region.is_known()) {
        *counts.entry(thread.region).or_default() += 1;
    }
    counts
}

/// 100 for an even spread across the four intentions, 0 when one holds all.
fn balance_score(counts: &BTreeMap<Intention, usize>) -> u8 {
    let total: usize = counts.values().sum();
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let ideal = total / Intention::KNOWN.len() as f64;
    let deviation: f64 = counts.values().map(|&c| (c as f64 - ideal).abs()).sum();
    let ratio = 1.0 - deviation / (1.5 * total);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Highest count wins; ties go to the intention seen first in the snapshot.
fn dominance(threads: &[Thread], counts: &BTreeMap<Intention, usize>) -> Option<Dominance> {
    let known_total: usize = counts.values().sum();
    if known_total == 0 {
        return None;
    }

    let mut seen = Vec::new();
    for thread in threads.iter().filter(|t| t.intention.is_known()) {
        if !seen.contains(&thread.intention) {
            seen.push(thread.intention);
        }
    }

    let mut best: Option<(Intention, usize)> = None;
    for intention in seen {
        let count = counts.get(&intention).copied().unwrap_or(0);
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((intention, count));
        }
    }

    best.map(|(intention, count)| Dominance {
        intention,
        count,
        percent_share: count as f64 / known_total as f64 * 100.0,
    })
}

fn zones(region_counts: &BTreeMap<Region, usize>) -> Vec<Zone> {
    let max = region_counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    region_counts
        .iter()
        .map(|(&region, &count)| Zone {
            region,
            count,
            intensity: count as f64 / max as f64,
        })
        .collect()
}
