//! Scroll files: the JSON export of a whole ledger.
//!
//! Import is strict where the ledger itself is lenient. A scroll comes from
//! outside, so every record must carry known categories, a well-formed hash
//! and an intact chain before it may replace the ledger.

use std::collections::HashSet;

use serde::Deserialize;

use crate::constants::{
    GENESIS_HASH, MAX_ID_LEN, MAX_REGION_LEN, MAX_TITLE_LEN, SCROLL_MAX_BYTES, SCROLL_MAX_THREADS,
};
use crate::error::ScrollError;
use crate::ledger::verify_chain;
use crate::thread::{Intention, Region, Thread, TimeOfDay};

/// Wire shape of one scroll record. Categories stay raw strings so they can
/// be rejected instead of silently becoming `Unknown`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrollRecord {
    id: String,
    intention: String,
    time: String,
    region: String,
    #[serde(default)]
    title: Option<String>,
    timestamp: u64,
    previous_hash: String,
    hash: String,
}

pub fn export_scroll(threads: &[Thread]) -> Result<String, ScrollError> {
    Ok(serde_json::to_string_pretty(threads)?)
}

/// Parse and validate a scroll. The returned threads are in scroll order and
/// form a verified chain.
pub fn import_scroll(json: &str) -> Result<Vec<Thread>, ScrollError> {
    if json.len() > SCROLL_MAX_BYTES {
        return Err(ScrollError::TooLarge(json.len()));
    }
    let records: Vec<ScrollRecord> = serde_json::from_str(json)?;
    if records.len() > SCROLL_MAX_THREADS {
        return Err(ScrollError::TooManyThreads(records.len()));
    }

    let mut seen = HashSet::with_capacity(records.len());
    let mut threads = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let thread = validate(record).map_err(|reason| ScrollError::InvalidRecord {
            index,
            reason: reason.to_string(),
        })?;
        if !seen.insert(thread.id.clone()) {
            return Err(ScrollError::DuplicateId(thread.id));
        }
        threads.push(thread);
    }

    if let Some(index) = verify_chain(&threads).first_corrupted {
        return Err(ScrollError::IntegrityFailure { index });
    }
    Ok(threads)
}

fn validate(record: ScrollRecord) -> Result<Thread, &'static str> {
    if record.id.is_empty() || record.id.chars().count() > MAX_ID_LEN {
        return Err("id must be 1-32 characters");
    }
    if record
        .title
        .as_deref()
        .is_some_and(|t| t.chars().count() > MAX_TITLE_LEN)
    {
        return Err("title longer than 100 characters");
    }
    if record.region.chars().count() > MAX_REGION_LEN {
        return Err("region longer than 50 characters");
    }
    if !is_hex_digest(&record.hash) {
        return Err("hash must be 64 hex characters");
    }
    if record.previous_hash != GENESIS_HASH && !is_hex_digest(&record.previous_hash) {
        return Err("previousHash must be GENESIS_HASH or 64 hex characters");
    }

    let intention = Intention::parse_strict(&record.intention)
        .filter(|i| i.is_known())
        .ok_or("unknown intention")?;
    let time_of_day = TimeOfDay::parse_strict(&record.time)
        .filter(|t| t.is_known())
        .ok_or("unknown time of day")?;
    let region = Region::parse_strict(&record.region)
        .filter(|r| r.is_known())
        .ok_or("unknown region")?;

    Ok(Thread {
        id: record.id,
        intention,
        time_of_day,
        region,
        title: record.title.filter(|t| !t.is_empty()),
        timestamp: record.timestamp,
        previous_hash: record.previous_hash,
        hash: record.hash,
    })
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::thread::ThreadDraft;
    use crate::time::fixed_clock;

    fn woven() -> Vec<Thread> {
        let mut ledger = Ledger::new().with_clock(fixed_clock(1_000));
        ledger
            .append(
                ThreadDraft::new(Intention::Awe, TimeOfDay::Night, Region::Sahara)
                    .with_title("Stars over the dunes"),
            )
            .unwrap();
        ledger
            .append(ThreadDraft::new(
                Intention::Legacy,
                TimeOfDay::Dawn,
                Region::Kasbah,
            ))
            .unwrap();
        ledger.snapshot().to_vec()
    }

    #[test]
    fn test_export_then_import_restores_ledger() {
        let threads = woven();
        let json = export_scroll(&threads).unwrap();
        assert!(json.contains("\"previousHash\""));
        assert!(json.contains("\"time\": \"night\""));
        assert_eq!(import_scroll(&json).unwrap(), threads);
    }

    #[test]
    fn test_import_empty_scroll() {
        assert!(import_scroll("[]").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_oversize_input() {
        let json = " ".repeat(SCROLL_MAX_BYTES + 1);
        assert!(matches!(import_scroll(&json), Err(ScrollError::TooLarge(_))));
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(import_scroll("{not json"), Err(ScrollError::Json(_))));
    }

    #[test]
    fn test_rejects_unknown_category() {
        let json = export_scroll(&woven()).unwrap().replace("\"sahara\"", "\"atlantis\"");
        match import_scroll(&json) {
            Err(ScrollError::InvalidRecord { index, reason }) => {
                assert_eq!(index, 0);
                assert!(reason.contains("region"));
            }
            other => panic!("expected invalid record, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_long_title() {
        let mut threads = woven();
        threads[1].title = Some("x".repeat(MAX_TITLE_LEN + 1));
        let json = export_scroll(&threads).unwrap();
        assert!(matches!(
            import_scroll(&json),
            Err(ScrollError::InvalidRecord { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_hash() {
        let mut threads = woven();
        threads[0].hash = "abc".into();
        let json = export_scroll(&threads).unwrap();
        assert!(matches!(
            import_scroll(&json),
            Err(ScrollError::InvalidRecord { index: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_id() {
        let mut threads = woven();
        threads[1].id = threads[0].id.clone();
        let json = export_scroll(&threads).unwrap();
        assert!(matches!(import_scroll(&json), Err(ScrollError::DuplicateId(_))));
    }

    #[test]
    fn test_rejects_tampered_chain() {
        let mut threads = woven();
        threads[1].timestamp += 1;
        let json = export_scroll(&threads).unwrap();
        assert!(matches!(
            import_scroll(&json),
            Err(ScrollError::IntegrityFailure { index: 1 })
        ));
    }

    #[test]
    fn test_rejects_too_many_threads() {
        let record = r#"{"id":"a","intention":"awe","time":"dusk","region":"coast","timestamp":0,"previousHash":"GENESIS_HASH","hash":"0"}"#;
        let json = format!("[{}]", vec![record; SCROLL_MAX_THREADS + 1].join(","));
        assert!(matches!(
            import_scroll(&json),
            Err(ScrollError::TooManyThreads(1001))
        ));
    }
}
