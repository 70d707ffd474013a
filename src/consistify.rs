// ==============================================================================
// consistify.rs - Three-Way Consistency Join
// ==============================================================================
// Description: Keeps only samples present in WGS, cattle and movement data
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::metadata::StageMetadata;
use crate::models::{CrossTable, RecordSet, SampleRecord};

/// WGS samples together with the cattle and movement rows that describe them
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyTriple {
    pub wgs: RecordSet,
    pub cattle: CrossTable,
    pub movement: CrossTable,
}

/// Counts recorded by the consistify stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistifyMetadata {
    pub wgs_samples_removed: usize,
    pub cattle_samples_removed: usize,
    pub movement_samples_removed: usize,
    pub number_of_consistent_samples: usize,
}

impl StageMetadata for ConsistifyMetadata {
    const STAGE: &'static str = "consistify";
}

fn submission_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Digit runs must not continue past either end of the number
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|\D)(\d{2}-\d{4,5}-\d{2})(?:\D|$)").expect("valid submission regex")
    })
}

/// Join key for a sample identifier.
///
/// Whitespace is trimmed and letters upper-cased. If the identifier contains
/// a submission number (`NN-NNNNN-NN`), that number alone is the key, which
/// drops lab prefixes such as `AF-`/`AFT-` and any suffix. Otherwise the
/// cleaned identifier is the key.
pub fn normalize_key(raw: &str) -> String {
    let cleaned = raw.trim().to_uppercase();
    match submission_pattern().captures(&cleaned).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => cleaned,
    }
}

/// Drop every record whose key is missing from any of the three sources.
///
/// The outputs share exactly the same key set; applying this to its own
/// outputs changes nothing.
pub fn consistify(
    wgs: &RecordSet,
    cattle: &CrossTable,
    movement: &CrossTable,
) -> Result<(ConsistencyTriple, ConsistifyMetadata)> {
    let wgs_keys: BTreeSet<String> = wgs.iter().map(|r| normalize_key(&r.sample)).collect();
    let cattle_keys: BTreeSet<String> = cattle.keys().map(normalize_key).collect();
    let movement_keys: BTreeSet<String> = movement.keys().map(normalize_key).collect();

    let shared: BTreeSet<String> = wgs_keys
        .iter()
        .filter(|k| cattle_keys.contains(*k) && movement_keys.contains(*k))
        .cloned()
        .collect();

    let kept_wgs: Vec<SampleRecord> = wgs
        .iter()
        .filter(|r| shared.contains(&normalize_key(&r.sample)))
        .cloned()
        .collect();
    let kept_cattle = restrict(cattle, &shared);
    let kept_movement = restrict(movement, &shared);

    let metadata = ConsistifyMetadata {
        wgs_samples_removed: wgs.len() - kept_wgs.len(),
        cattle_samples_removed: cattle.len() - kept_cattle.len(),
        movement_samples_removed: movement.len() - kept_movement.len(),
        number_of_consistent_samples: kept_wgs.len(),
    };

    info!(
        "Consistify removed {} wgs, {} cattle and {} movement rows; {} samples remain",
        metadata.wgs_samples_removed,
        metadata.cattle_samples_removed,
        metadata.movement_samples_removed,
        metadata.number_of_consistent_samples
    );

    if kept_wgs.is_empty() {
        return Err(PipelineError::EmptyResult { stage: "consistify" });
    }

    Ok((
        ConsistencyTriple {
            wgs: RecordSet(kept_wgs),
            cattle: kept_cattle,
            movement: kept_movement,
        },
        metadata,
    ))
}

fn restrict(table: &CrossTable, keys: &BTreeSet<String>) -> CrossTable {
    let rows = table
        .rows
        .iter()
        .filter(|row| {
            row.get(table.key_index)
                .map(|k| keys.contains(&normalize_key(k)))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    CrossTable {
        name: table.name.clone(),
        headers: table.headers.clone(),
        rows,
        key_index: table.key_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{record, record_set};

    fn table(name: &str, keys: &[&str]) -> CrossTable {
        CrossTable::new(
            name,
            vec!["Sample".to_string(), "Detail".to_string()],
            keys.iter().map(|k| vec![k.to_string(), format!("{}-detail", k)]).collect(),
            "Sample",
        )
        .unwrap()
    }

    fn key_set(triple: &ConsistencyTriple) -> [BTreeSet<String>; 3] {
        [
            triple.wgs.iter().map(|r| normalize_key(&r.sample)).collect(),
            triple.cattle.keys().map(normalize_key).collect(),
            triple.movement.keys().map(normalize_key).collect(),
        ]
    }

    #[test]
    fn test_three_way_intersection() {
        let wgs = record_set(vec![record("A", "1", 99.0), record("B", "2", 99.0), record("C", "3", 99.0)]);
        let cattle = table("cattle", &["A", "B"]);
        let movement = table("movement", &["B", "C"]);

        let (triple, meta) = consistify(&wgs, &cattle, &movement).unwrap();

        assert_eq!(triple.wgs.sample_names(), vec!["B"]);
        assert_eq!(triple.cattle.keys().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(triple.movement.keys().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(
            meta,
            ConsistifyMetadata {
                wgs_samples_removed: 2,
                cattle_samples_removed: 1,
                movement_samples_removed: 1,
                number_of_consistent_samples: 1,
            }
        );
    }

    #[test]
    fn test_fixed_point_and_equal_key_sets() {
        let wgs = record_set(vec![
            record("AF-61-03769-21", "61-03769-21", 99.0),
            record("AFT-61-04012-21", "61-04012-21", 99.0),
            record("AF-12-00001-22", "12-00001-22", 99.0),
        ]);
        let cattle = table("cattle", &["61-03769-21", " af-61-04012-21 ", "99-99999-99"]);
        let movement = table("movement", &["61-03769-21", "61-03769-21", "61-04012-21"]);

        let (first, _) = consistify(&wgs, &cattle, &movement).unwrap();
        let [w, c, m] = key_set(&first);
        assert_eq!(w, c);
        assert_eq!(c, m);
        // Repeated movement rows for one animal are all kept
        assert_eq!(first.movement.len(), 3);

        let (second, meta) = consistify(&first.wgs, &first.cattle, &first.movement).unwrap();
        assert_eq!(first, second);
        assert_eq!(meta.wgs_samples_removed, 0);
        assert_eq!(meta.cattle_samples_removed, 0);
        assert_eq!(meta.movement_samples_removed, 0);
    }

    #[test]
    fn test_no_overlap_is_empty_result() {
        let wgs = record_set(vec![record("A", "1", 99.0)]);
        let err = consistify(&wgs, &table("cattle", &["B"]), &table("movement", &["A"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("AFT-61-03769-21"), "61-03769-21");
        assert_eq!(normalize_key(" af-61-3769-21 "), "61-3769-21");
        assert_eq!(normalize_key("20-0620719"), "20-0620719");
        assert_eq!(normalize_key(" b "), "B");
        assert_eq!(normalize_key("123-45678-901"), "123-45678-901");
        assert_eq!(normalize_key("AF-61-03769-210"), "AF-61-03769-210");
        assert_eq!(normalize_key("AF-61-03769-21_R1"), "61-03769-21");
    }
}
