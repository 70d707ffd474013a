// ==============================================================================
// catalog.rs - Sample Catalog Reader/Writer
// ==============================================================================
// Description: Loads and saves the all-samples summary table with schema checks
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Format: CSV (plain or gzip) with exactly the catalog columns, any order
// Example:
//   Sample,Submission,GenomeCov,MeanDepth,NumRawReads,pcMapped,Outcome,flag,group,Ncount,ResultLoc
//   AF-61-03769-21,61-03769-21,99.7,61.2,1523044,98.1,Pass,BritishbTB,B6-84,112,s3://s3-csu-003/v3/Results_1
// ==============================================================================

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::{Column, ColumnKind, RecordSet, SampleRecord, SCHEMA};
use crate::validator::FileValidator;

/// Load a catalog snapshot, validating its columns and cell types
pub fn load_catalog(path: impl AsRef<Path>) -> Result<RecordSet> {
    let path = path.as_ref();
    let reader = FileValidator::new().open(path)?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let index = column_index(path, &headers)?;

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result?;
        // Header is line 1
        let record = parse_row(path, &row, &index, row_idx + 2)?;
        if !seen.insert(record.sample.clone()) {
            return Err(PipelineError::schema(
                path,
                format!("sample '{}' appears more than once (line {})", record.sample, row_idx + 2),
            ));
        }
        records.push(record);
    }

    info!("Loaded {} samples from {:?}", records.len(), path);
    Ok(RecordSet(records))
}

/// Write records with the canonical column order
pub fn write_catalog(records: &RecordSet, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(SCHEMA.iter().map(|c| c.name()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Wrote {} samples to {:?}", records.len(), path);
    Ok(())
}

/// Map every schema column to its position, rejecting missing or
/// unexpected headers
fn column_index(path: &Path, headers: &StringRecord) -> Result<HashMap<Column, usize>> {
    let mut index = HashMap::new();
    let mut unexpected = Vec::new();

    for (pos, name) in headers.iter().enumerate() {
        match Column::from_name(name.trim()) {
            Some(column) if !index.contains_key(&column) => {
                index.insert(column, pos);
            }
            _ => unexpected.push(name.to_string()),
        }
    }

    if !unexpected.is_empty() {
        return Err(PipelineError::schema(
            path,
            format!("unexpected column(s): {}", unexpected.join(", ")),
        ));
    }

    let missing: Vec<&str> = SCHEMA
        .iter()
        .filter(|c| !index.contains_key(*c))
        .map(|c| c.name())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema(
            path,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    Ok(index)
}

fn parse_row(path: &Path, row: &StringRecord, index: &HashMap<Column, usize>, line: usize) -> Result<SampleRecord> {
    let text = |column: Column| -> String { row.get(index[&column]).unwrap_or("").trim().to_string() };

    let metric = |column: Column| -> Result<Option<f64>> {
        debug_assert_eq!(column.kind(), ColumnKind::Numeric);
        let raw = row.get(index[&column]).unwrap_or("").trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            Ok(_) => Err(PipelineError::schema(
                path,
                format!("line {}, column '{}': '{}' is not a finite number", line, column.name(), raw),
            )),
            Err(_) => Err(PipelineError::schema(
                path,
                format!("line {}, column '{}': '{}' is not numeric", line, column.name(), raw),
            )),
        }
    };

    let sample = text(Column::Sample);
    if sample.is_empty() {
        return Err(PipelineError::schema(path, format!("line {}: empty Sample", line)));
    }

    Ok(SampleRecord {
        sample,
        submission: text(Column::Submission),
        genome_cov: metric(Column::GenomeCov)?,
        mean_depth: metric(Column::MeanDepth)?,
        num_raw_reads: metric(Column::NumRawReads)?,
        pc_mapped: metric(Column::PcMapped)?,
        outcome: text(Column::Outcome),
        flag: text(Column::Flag),
        group: text(Column::Group),
        ncount: metric(Column::Ncount)?,
        result_loc: text(Column::ResultLoc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{record, record_set};

    const HEADER: &str = "Sample,Submission,GenomeCov,MeanDepth,NumRawReads,pcMapped,Outcome,flag,group,Ncount,ResultLoc";

    fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("btb_wgs_samples.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &format!(
                "{}\nAF-1,1,99.1,60,100000,98.5,Pass,BritishbTB,B6-84,12,s3://s3-csu-003/v3/r1\n\
                 AF-2,2,,,,,Fail,LowQualData,,,s3://s3-csu-003/v3/r1\n",
                HEADER
            ),
        );

        let records = load_catalog(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.records()[0].pc_mapped, Some(98.5));
        assert_eq!(records.records()[1].pc_mapped, None);
        assert_eq!(records.records()[1].outcome, "Fail");
    }

    #[test]
    fn test_columns_in_any_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "ResultLoc,Ncount,group,flag,Outcome,pcMapped,NumRawReads,MeanDepth,GenomeCov,Submission,Sample\n\
             s3://s3-csu-003/a,5,B6-84,BritishbTB,Pass,99,10,20,99.9,1,AF-1\n",
        );
        let records = load_catalog(&path).unwrap();
        assert_eq!(records.records()[0].sample, "AF-1");
        assert_eq!(records.records()[0].ncount, Some(5.0));
    }

    #[test]
    fn test_missing_and_unexpected_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "Sample,Submission\nA,1\n");
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("pcMapped"));

        let path = write(&dir, &format!("{},Extra\n", HEADER));
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("Extra"));
    }

    #[test]
    fn test_non_numeric_metric_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &format!("{}\nAF-1,1,99,60,10,high,Pass,x,B6-84,1,s3://s3-csu-003/a\n", HEADER),
        );
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("'pcMapped'"));
    }

    #[test]
    fn test_non_finite_metric_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        for raw in ["NaN", "inf", "-infinity"] {
            let path = write(
                &dir,
                &format!("{}\nAF-1,1,99,60,10,99,Pass,x,B6-84,{},s3://s3-csu-003/a\n", HEADER, raw),
            );
            let err = load_catalog(&path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Schema);
            assert!(err.to_string().contains("'Ncount'"), "{}", err);
        }
    }

    #[test]
    fn test_duplicate_sample_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let row = "AF-1,1,99,60,10,99,Pass,x,B6-84,1,s3://s3-csu-003/a";
        let path = write(&dir, &format!("{}\n{}\n{}\n", HEADER, row, row));
        assert_eq!(load_catalog(&path).unwrap_err().kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_write_then_load_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut blank = record("AF-2", "2", 97.0);
        blank.ncount = None;
        let records = record_set(vec![record("AF-1", "1", 99.25), blank]);

        let path = dir.path().join("out").join("filtered_samples.csv");
        write_catalog(&records, &path).unwrap();
        assert_eq!(load_catalog(&path).unwrap(), records);
    }

    #[test]
    fn test_missing_catalog() {
        let err = load_catalog("/nonexistent/catalog.csv").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
    }
}
