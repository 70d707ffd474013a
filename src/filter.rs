// ==============================================================================
// filter.rs - Typed Predicate Filtering
// ==============================================================================
// Description: Narrows the sample catalog using numeric ranges and value sets
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Criteria format (JSON config or CLI flags):
//   {
//     "pcMapped": [90, 100],          numeric column -> inclusive [min, max]
//     "group": ["B6-84", "B6-11"]     categorical column -> allowed values
//   }
// Every run implicitly filters Outcome = ["Pass"] and pcMapped = [0, 100];
// explicit entries for those columns replace the defaults.
// ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{Column, ColumnKind, RecordSet, SampleRecord};
use crate::warnings::{Warning, WarningSink};

/// Default inclusive pcMapped range applied to every run
pub const DEFAULT_PC_MAPPED: (f64, f64) = (0.0, 100.0);

/// Default allowed Outcome values
pub const DEFAULT_OUTCOME: &str = "Pass";

/// Filter criteria exactly as supplied, keyed by column name.
///
/// Kept in raw JSON form so the run metadata can echo the criteria
/// verbatim; validation happens in [`FilterSpec::compile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(BTreeMap<String, Value>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load criteria from a JSON object file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(PipelineError::Configuration(format!(
                "filter config {:?} must contain a JSON object, found {}",
                path, other
            ))),
        }
    }

    /// Add an inclusive numeric range criterion
    pub fn with_range(mut self, column: &str, min: f64, max: f64) -> Self {
        self.insert(column, serde_json::json!([min, max]));
        self
    }

    /// Add a categorical criterion
    pub fn with_values<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Value::String(v.into())).collect();
        self.insert(column, Value::Array(values));
        self
    }

    pub fn insert(&mut self, column: &str, criterion: Value) {
        self.0.insert(column.to_string(), criterion);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy of this spec with `other`'s entries taking precedence
    pub fn overlaid(&self, other: &FilterSpec) -> FilterSpec {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        FilterSpec(merged)
    }

    /// Validate every criterion against the schema and apply the defaults.
    ///
    /// Fails on the first invalid entry; nothing is filtered until the
    /// whole spec is known to be valid.
    pub fn compile(&self) -> Result<CompiledFilter> {
        let mut criteria: BTreeMap<Column, Criterion> = BTreeMap::new();
        criteria.insert(
            Column::Outcome,
            Criterion::OneOf(BTreeSet::from([DEFAULT_OUTCOME.to_string()])),
        );
        criteria.insert(
            Column::PcMapped,
            Criterion::Range {
                min: DEFAULT_PC_MAPPED.0,
                max: DEFAULT_PC_MAPPED.1,
            },
        );

        for (name, raw) in &self.0 {
            let column = Column::from_name(name).ok_or_else(|| PipelineError::UnknownColumn {
                column: name.clone(),
                valid: Column::valid_names(),
            })?;

            let criterion = match column.kind() {
                ColumnKind::Numeric => parse_range(name, raw)?,
                ColumnKind::Categorical => parse_values(name, raw)?,
            };
            criteria.insert(column, criterion);
        }

        let mut compiled = CompiledFilter::default();
        for (column, criterion) in criteria {
            match criterion {
                Criterion::Range { min, max } => compiled.numeric.push((column, min, max)),
                Criterion::OneOf(values) => compiled.categorical.push((column, values)),
            }
        }
        Ok(compiled)
    }
}

/// A single validated criterion
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Range { min: f64, max: f64 },
    OneOf(BTreeSet<String>),
}

fn parse_range(column: &str, raw: &Value) -> Result<Criterion> {
    let kind = ColumnKind::Numeric.as_str();
    let bounds = raw
        .as_array()
        .ok_or_else(|| PipelineError::criterion(column, kind, format!("expected [min, max], found {}", raw)))?;

    if bounds.len() != 2 {
        return Err(PipelineError::criterion(
            column,
            kind,
            format!("expected 2 bounds, found {}", bounds.len()),
        ));
    }

    let parse = |v: &Value| -> Result<f64> {
        v.as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| PipelineError::criterion(column, kind, format!("bound {} is not a number", v)))
    };
    let min = parse(&bounds[0])?;
    let max = parse(&bounds[1])?;

    if min >= max {
        return Err(PipelineError::criterion(
            column,
            kind,
            format!("min ({}) must be less than max ({})", min, max),
        ));
    }

    Ok(Criterion::Range { min, max })
}

fn parse_values(column: &str, raw: &Value) -> Result<Criterion> {
    let kind = ColumnKind::Categorical.as_str();
    let items = raw
        .as_array()
        .ok_or_else(|| PipelineError::criterion(column, kind, format!("expected a list of values, found {}", raw)))?;

    if items.is_empty() {
        return Err(PipelineError::criterion(column, kind, "value list is empty"));
    }

    let mut values = BTreeSet::new();
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| PipelineError::criterion(column, kind, format!("value {} is not a string", item)))?;
        values.insert(s.to_string());
    }

    Ok(Criterion::OneOf(values))
}

/// Validated, schema-partitioned filter ready to apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    categorical: Vec<(Column, BTreeSet<String>)>,
    numeric: Vec<(Column, f64, f64)>,
}

impl CompiledFilter {
    /// True when the record satisfies every criterion
    pub fn matches(&self, record: &SampleRecord) -> bool {
        let categorical_ok = self.categorical.iter().all(|(column, allowed)| {
            record
                .text(*column)
                .map(|v| allowed.contains(v))
                .unwrap_or(false)
        });

        categorical_ok
            && self.numeric.iter().all(|(column, min, max)| {
                record
                    .metric(*column)
                    .map(|v| *min <= v && v <= *max)
                    .unwrap_or(false)
            })
    }

    /// Retained records in input order; empty output is an error
    pub fn apply(&self, records: &RecordSet, warnings: &mut WarningSink) -> Result<RecordSet> {
        self.report_unmatched(records, warnings);

        let kept: Vec<SampleRecord> = records.iter().filter(|r| self.matches(r)).cloned().collect();

        debug!("Filter kept {} of {} records", kept.len(), records.len());

        if kept.is_empty() {
            return Err(PipelineError::EmptyResult { stage: "filtering" });
        }

        Ok(RecordSet(kept))
    }

    pub fn numeric_criteria(&self) -> &[(Column, f64, f64)] {
        &self.numeric
    }

    /// Warn about allowed values that occur nowhere in the input
    fn report_unmatched(&self, records: &RecordSet, warnings: &mut WarningSink) {
        for (column, allowed) in &self.categorical {
            let present: HashSet<&str> = records.iter().filter_map(|r| r.text(*column)).collect();
            for value in allowed {
                if !present.contains(value.as_str()) {
                    warnings.emit(Warning::UnmatchedCategory {
                        column: column.name().to_string(),
                        value: value.clone(),
                    });
                }
            }
        }
    }
}

/// Filter `records` by `spec` (plus the implicit defaults)
pub fn filter(records: &RecordSet, spec: &FilterSpec, warnings: &mut WarningSink) -> Result<RecordSet> {
    let compiled = spec.compile()?;
    info!("Filtering {} samples", records.len());
    compiled.apply(records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{record, record_set};

    fn pc_mapped_set(values: &[f64]) -> RecordSet {
        record_set(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| record(&format!("S{}", i), &format!("SUB{}", i), *v))
                .collect(),
        )
    }

    #[test]
    fn test_numeric_range_filter() {
        let records = pc_mapped_set(&[85.0, 92.0, 99.0]);
        let spec = FilterSpec::new().with_range("pcMapped", 90.0, 100.0);
        let mut sink = WarningSink::default();

        let out = filter(&records, &spec, &mut sink).unwrap();
        let kept: Vec<f64> = out.iter().filter_map(|r| r.pc_mapped).collect();
        assert_eq!(kept, vec![92.0, 99.0]);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let records = pc_mapped_set(&[90.0, 95.0, 100.0]);
        let spec = FilterSpec::new().with_range("pcMapped", 90.0, 100.0);
        let out = filter(&records, &spec, &mut WarningSink::default()).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_categorical_filter_warns_on_unmatched_value() {
        let mut x = record("X1", "SUB1", 95.0);
        x.group = "cladeX".to_string();
        let mut y = record("Y1", "SUB2", 95.0);
        y.group = "cladeY".to_string();
        let records = record_set(vec![x, y]);

        let spec = FilterSpec::new().with_values("group", ["cladeX", "cladeZ"]);
        let mut sink = WarningSink::default();
        let out = filter(&records, &spec, &mut sink).unwrap();

        assert_eq!(out.sample_names(), vec!["X1"]);
        assert_eq!(
            sink.issued(),
            &[Warning::UnmatchedCategory {
                column: "group".to_string(),
                value: "cladeZ".to_string()
            }]
        );
    }

    #[test]
    fn test_outcome_pass_is_implicit_and_overridable() {
        let mut failed = record("F1", "SUB1", 95.0);
        failed.outcome = "Fail".to_string();
        let records = record_set(vec![failed, record("P1", "SUB2", 95.0)]);

        let out = filter(&records, &FilterSpec::new(), &mut WarningSink::default()).unwrap();
        assert_eq!(out.sample_names(), vec!["P1"]);

        let spec = FilterSpec::new().with_values("Outcome", ["Pass", "Fail"]);
        let out = filter(&records, &spec, &mut WarningSink::default()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_blank_metric_never_matches_range() {
        let mut blank = record("B1", "SUB1", 95.0);
        blank.ncount = None;
        let records = record_set(vec![blank, record("F1", "SUB2", 95.0)]);

        let spec = FilterSpec::new().with_range("Ncount", 0.0, 1000.0);
        let out = filter(&records, &spec, &mut WarningSink::default()).unwrap();
        assert_eq!(out.sample_names(), vec!["F1"]);
    }

    #[test]
    fn test_empty_result_is_an_error() {
        let records = pc_mapped_set(&[85.0, 92.0]);
        let spec = FilterSpec::new().with_range("pcMapped", 93.0, 94.0);
        let err = filter(&records, &spec, &mut WarningSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[test]
    fn test_filters_commute() {
        let mut records = Vec::new();
        for (i, (pc, cov, group)) in [
            (95.0, 99.0, "B6-84"),
            (97.0, 80.0, "B6-84"),
            (91.0, 99.5, "B6-11"),
            (99.0, 99.9, "B6-84"),
            (80.0, 99.9, "B6-84"),
        ]
        .iter()
        .enumerate()
        {
            let mut r = record(&format!("S{}", i), &format!("SUB{}", i), *pc);
            r.genome_cov = Some(*cov);
            r.group = group.to_string();
            records.push(r);
        }
        let records = record_set(records);

        let a = FilterSpec::new().with_range("pcMapped", 90.0, 100.0);
        let b = FilterSpec::new().with_range("GenomeCov", 90.0, 100.0);
        let c = FilterSpec::new().with_values("group", ["B6-84"]);
        let mut sink = WarningSink::default();

        let abc = filter(
            &filter(&filter(&records, &a, &mut sink).unwrap(), &b, &mut sink).unwrap(),
            &c,
            &mut sink,
        )
        .unwrap();
        let cba = filter(
            &filter(&filter(&records, &c, &mut sink).unwrap(), &b, &mut sink).unwrap(),
            &a,
            &mut sink,
        )
        .unwrap();
        let combined = filter(&records, &a.overlaid(&b).overlaid(&c), &mut sink).unwrap();

        assert_eq!(abc, cba);
        assert_eq!(abc, combined);
        assert_eq!(combined.sample_names(), vec!["S0", "S3"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records = pc_mapped_set(&[85.0, 92.0, 99.0, 91.0]);
        let spec = FilterSpec::new().with_range("pcMapped", 90.0, 98.0);
        let mut sink = WarningSink::default();

        let once = filter(&records, &spec, &mut sink).unwrap();
        let twice = filter(&once, &spec, &mut sink).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_column_names_key_and_valid_columns() {
        let spec = FilterSpec::new().with_values("foo", ["bar"]);
        let err = spec.compile().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let message = err.to_string();
        assert!(message.contains("'foo'"));
        assert!(message.contains("pcMapped"));
    }

    #[test]
    fn test_invalid_numeric_criteria() {
        let cases = [
            serde_json::json!([1]),
            serde_json::json!([1, 2, 3]),
            serde_json::json!(1),
            serde_json::json!("foo"),
            serde_json::json!(["foo", "bar"]),
            serde_json::json!([2, 1]),
            serde_json::json!([1, 1]),
        ];
        for case in cases {
            let mut spec = FilterSpec::new();
            spec.insert("Ncount", case.clone());
            let err = spec.compile().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "case {}", case);
        }
    }

    #[test]
    fn test_invalid_categorical_criteria() {
        let cases = [
            serde_json::json!("a"),
            serde_json::json!([]),
            serde_json::json!([1, 2, 3]),
            serde_json::json!([90, 100]),
        ];
        for case in cases {
            let mut spec = FilterSpec::new();
            spec.insert("group", case.clone());
            let err = spec.compile().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "case {}", case);
        }
    }

    #[test]
    fn test_invalid_spec_fails_before_filtering() {
        let records = pc_mapped_set(&[95.0]);
        let spec = FilterSpec::new()
            .with_range("pcMapped", 90.0, 100.0)
            .with_values("GenomeCov", ["high"]);
        let mut sink = WarningSink::default();
        assert!(filter(&records, &spec, &mut sink).is_err());
        assert!(sink.issued().is_empty());
    }

    #[test]
    fn test_spec_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(&path, r#"{"pcMapped": [95, 100], "group": ["B6-84"]}"#).unwrap();

        let spec = FilterSpec::from_json_file(&path).unwrap();
        assert_eq!(spec.get("pcMapped"), Some(&serde_json::json!([95, 100])));
        let compiled = spec.compile().unwrap();
        assert!(compiled
            .numeric_criteria()
            .iter()
            .any(|(c, min, max)| *c == Column::PcMapped && *min == 95.0 && *max == 100.0));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(FilterSpec::from_json_file(&path).is_err());
    }
}
