// ==============================================================================
// duplicates.rs - Duplicate Submission Resolution
// ==============================================================================
// Description: Collapses re-sequenced submissions to a single best sample
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{Column, ColumnKind, RecordSet, SampleRecord};
use crate::warnings::{Warning, WarningSink};

/// Which extreme of a column wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    Max,
    Min,
}

/// One step of duplicate resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub column: Column,
    pub prefer: TieBreak,
}

impl Rule {
    pub const fn new(column: Column, prefer: TieBreak) -> Self {
        Self { column, prefer }
    }
}

/// Highest pcMapped first, then lowest Ncount
pub const DEFAULT_RULES: [Rule; 2] = [
    Rule::new(Column::PcMapped, TieBreak::Max),
    Rule::new(Column::Ncount, TieBreak::Min),
];

/// Keep one record per submission.
///
/// Rules narrow the candidates sequentially: each rule only looks at the
/// records that survived the previous one. When candidates are still tied
/// after the last rule the earliest one is kept and a warning is emitted.
pub fn resolve(records: &RecordSet, rules: &[Rule], warnings: &mut WarningSink) -> Result<RecordSet> {
    for rule in rules {
        if rule.column.kind() != ColumnKind::Numeric {
            return Err(PipelineError::InvalidRule {
                column: rule.column.name().to_string(),
                reason: "column is not numeric".to_string(),
            });
        }
    }

    // Group indexes by submission, preserving first-seen order
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups
            .entry(record.submission.as_str())
            .or_insert_with(|| {
                order.push(record.submission.as_str());
                Vec::new()
            })
            .push(idx);
    }

    let all = records.records();
    let mut keep: HashSet<usize> = HashSet::with_capacity(order.len());

    for submission in order {
        let members = &groups[submission];
        if members.len() == 1 {
            keep.insert(members[0]);
            continue;
        }

        let mut candidates = members.clone();
        for rule in rules {
            candidates = narrow(all, &candidates, rule, submission)?;
        }

        if candidates.len() > 1 {
            warnings.emit(Warning::UnresolvedTie {
                submission: submission.to_string(),
                kept: all[candidates[0]].sample.clone(),
                dropped: candidates[1..].iter().map(|i| all[*i].sample.clone()).collect(),
            });
        }
        keep.insert(candidates[0]);
    }

    let resolved: Vec<SampleRecord> = all
        .iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, r)| r.clone())
        .collect();

    debug!(
        "Duplicate resolution kept {} of {} records",
        resolved.len(),
        records.len()
    );

    Ok(RecordSet(resolved))
}

/// Candidates achieving the rule's extreme value
fn narrow(all: &[SampleRecord], candidates: &[usize], rule: &Rule, submission: &str) -> Result<Vec<usize>> {
    let mut values = Vec::with_capacity(candidates.len());
    for idx in candidates {
        let problem = match all[*idx].metric(rule.column) {
            Some(value) if value.is_finite() => {
                values.push(value);
                continue;
            }
            Some(value) => format!("a non-finite value ({})", value),
            None => "no value".to_string(),
        };
        return Err(PipelineError::InvalidRule {
            column: rule.column.name().to_string(),
            reason: format!(
                "sample '{}' of submission '{}' has {}",
                all[*idx].sample, submission, problem
            ),
        });
    }

    let extreme = match rule.prefer {
        TieBreak::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        TieBreak::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
    };

    Ok(candidates
        .iter()
        .zip(values)
        .filter(|(_, v)| *v == extreme)
        .map(|(idx, _)| *idx)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{record, record_set};

    #[test]
    fn test_highest_pc_mapped_survives() {
        let records = record_set(vec![record("A", "S1", 0.80), record("B", "S1", 0.95)]);
        let out = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
        assert_eq!(out.sample_names(), vec!["B"]);
    }

    #[test]
    fn test_groups_and_order_are_preserved() {
        let records = record_set(vec![
            record("a", "1", 0.1),
            record("b", "2", 0.2),
            record("c", "2", 0.3),
            record("d", "2", 0.4),
            record("e", "3", 0.6),
            record("f", "1", 0.15),
        ]);
        let out = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
        assert_eq!(out.sample_names(), vec!["d", "e", "f"]);
    }

    #[test]
    fn test_sequential_narrowing() {
        // Lowest Ncount overall belongs to a record already eliminated by pcMapped
        let mut a = record("A", "S1", 99.0);
        a.ncount = Some(500.0);
        let mut b = record("B", "S1", 99.0);
        b.ncount = Some(300.0);
        let mut c = record("C", "S1", 98.0);
        c.ncount = Some(10.0);
        let records = record_set(vec![a, b, c]);

        let out = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
        assert_eq!(out.sample_names(), vec!["B"]);
    }

    #[test]
    fn test_full_tie_keeps_first_and_warns() {
        let records = record_set(vec![record("A", "S1", 99.0), record("B", "S1", 99.0)]);
        let mut sink = WarningSink::default();
        let out = resolve(&records, &DEFAULT_RULES, &mut sink).unwrap();
        assert_eq!(out.sample_names(), vec!["A"]);
        assert!(matches!(&sink.issued()[0], Warning::UnresolvedTie { kept, .. } if kept == "A"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let records = record_set(vec![
            record("A", "S1", 97.0),
            record("B", "S1", 99.0),
            record("C", "S2", 99.0),
            record("D", "S2", 99.0),
        ]);
        let first = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
        for _ in 0..5 {
            let again = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_singleton_with_blank_metric_passes_through() {
        let mut lone = record("A", "S1", 99.0);
        lone.ncount = None;
        let records = record_set(vec![lone.clone()]);
        let out = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap();
        assert_eq!(out.records(), &[lone]);
    }

    #[test]
    fn test_blank_metric_in_group_is_configuration_error() {
        let mut a = record("A", "S1", 99.0);
        a.pc_mapped = None;
        let records = record_set(vec![a, record("B", "S1", 98.0)]);
        let err = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_nan_metric_in_group_is_rejected() {
        // Both records tie on pcMapped, so Ncount decides
        let mut a = record("A", "S1", 99.0);
        a.ncount = Some(f64::NAN);
        let records = record_set(vec![a, record("B", "S1", 99.0)]);
        let err = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Ncount"), "{}", err);

        let mut c = record("C", "S2", 99.0);
        c.pc_mapped = Some(f64::NAN);
        let mut d = record("D", "S2", 99.0);
        d.pc_mapped = Some(f64::NAN);
        let records = record_set(vec![c, d]);
        let err = resolve(&records, &DEFAULT_RULES, &mut WarningSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_categorical_rule_is_rejected() {
        let records = record_set(vec![record("A", "S1", 99.0)]);
        let rules = [Rule::new(Column::Group, TieBreak::Max)];
        let err = resolve(&records, &rules, &mut WarningSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
