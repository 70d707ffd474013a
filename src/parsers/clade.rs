// ==============================================================================
// clade.rs - Clade Threshold Table Parser
// ==============================================================================
// Description: Per-clade maximum Ncount used by clade-stratified filtering
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Format: CSV file with header
// Example:
//   clade,maxN
//   B6-84,56000
//   B6-11,34000
// ==============================================================================

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Upper Ncount bound for one clade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CladeThreshold {
    pub clade: String,

    #[serde(rename = "maxN")]
    pub max_n: f64,
}

/// Load the clade threshold table in file order
pub fn load_clade_thresholds(path: impl AsRef<Path>) -> Result<Vec<CladeThreshold>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }

    let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_path(path)?;

    let mut thresholds = Vec::new();
    let mut seen = HashSet::new();
    for (idx, result) in reader.deserialize().enumerate() {
        let threshold: CladeThreshold = result.map_err(|e| PipelineError::schema(path, e.to_string()))?;

        if !threshold.max_n.is_finite() || threshold.max_n <= 0.0 {
            return Err(PipelineError::schema(
                path,
                format!("row {}: maxN for clade '{}' must be a positive number", idx + 1, threshold.clade),
            ));
        }
        if !seen.insert(threshold.clade.clone()) {
            return Err(PipelineError::Configuration(format!(
                "clade '{}' listed more than once in {:?}",
                threshold.clade, path
            )));
        }

        thresholds.push(threshold);
    }

    if thresholds.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "clade threshold table {:?} has no rows",
            path
        )));
    }

    Ok(thresholds)
}
