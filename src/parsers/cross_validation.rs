// ==============================================================================
// cross_validation.rs - Cattle and Movement Table I/O
// ==============================================================================
// Description: Locates, loads and writes the cross-validation datasets
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Layout: <cross-validation dir>/cattle.csv and <cross-validation dir>/movement.csv
// Both are free-form CSV tables; only the key column (default "Sample") is
// interpreted.
// ==============================================================================

use csv::{ReaderBuilder, WriterBuilder};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::CrossTable;
use crate::validator::FileValidator;

pub const CATTLE_FILE: &str = "cattle.csv";
pub const MOVEMENT_FILE: &str = "movement.csv";

/// Default join key column in both tables
pub const DEFAULT_KEY_COLUMN: &str = "Sample";

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationPaths {
    pub cattle: PathBuf,
    pub movement: PathBuf,
}

/// Find both cross-validation files, failing on the first one absent
pub fn locate(dir: &Path) -> Result<CrossValidationPaths> {
    let cattle = dir.join(CATTLE_FILE);
    let movement = dir.join(MOVEMENT_FILE);

    for path in [&cattle, &movement] {
        if !path.is_file() {
            return Err(PipelineError::MissingInput { path: path.clone() });
        }
    }

    Ok(CrossValidationPaths { cattle, movement })
}

/// Load a cross-validation table keyed by `key_column`
pub fn load_table(path: &Path, name: &str, key_column: &str) -> Result<CrossTable> {
    let reader = FileValidator::new().open(path)?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let row = result?;
        rows.push(row.iter().map(str::to_string).collect());
    }

    info!("Loaded {} {} rows from {:?}", rows.len(), name, path);
    CrossTable::new(name, headers, rows, key_column)
}

pub fn write_table(table: &CrossTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
