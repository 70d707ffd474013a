// ==============================================================================
// update.rs - Sample Catalog Update
// ==============================================================================
// Description: Appends newly processed samples from batch summaries to the catalog
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Result;
use crate::metadata::StageMetadata;
use crate::models::RecordSet;
use crate::parsers::{load_catalog, write_catalog};

/// File name prefix of per-batch summary tables
pub const BATCH_FILE_PREFIX: &str = "FinalOut";

/// Lists batch summary files to merge into the catalog
pub trait BatchSource {
    fn batch_files(&self) -> Result<Vec<PathBuf>>;
}

/// Batch summaries found anywhere below a local directory
#[derive(Debug, Clone)]
pub struct LocalBatchSource {
    root: PathBuf,
}

impl LocalBatchSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BatchSource for LocalBatchSource {
    fn batch_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with(BATCH_FILE_PREFIX) && name.ends_with(".csv") {
                files.push(entry.into_path());
            }
        }
        files.sort();
        debug!("Found {} batch summaries under {:?}", files.len(), self.root);
        Ok(files)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetadata {
    pub number_of_batches_scanned: usize,
    pub number_of_new_samples: usize,
    pub total_number_of_samples: usize,
}

impl StageMetadata for UpdateMetadata {
    const STAGE: &'static str = "update";
}

/// Append unseen samples from every batch to the catalog at `catalog_path`,
/// creating it when absent, and rewrite it.
///
/// Samples already in the catalog (or seen in an earlier batch) are skipped;
/// existing rows are never modified.
pub fn update_catalog<B: BatchSource>(catalog_path: &Path, source: &B) -> Result<(RecordSet, UpdateMetadata)> {
    let mut records = if catalog_path.is_file() {
        load_catalog(catalog_path)?.into_records()
    } else {
        info!("No catalog at {:?}; building a new one", catalog_path);
        Vec::new()
    };

    let mut known: HashSet<String> = records.iter().map(|r| r.sample.clone()).collect();
    let batches = source.batch_files()?;

    let mut new_samples = 0usize;
    for batch in &batches {
        let before = new_samples;
        for record in load_catalog(batch)?.into_records() {
            if known.insert(record.sample.clone()) {
                records.push(record);
                new_samples += 1;
            }
        }
        debug!("{:?}: {} new samples", batch, new_samples - before);
    }

    let catalog = RecordSet(records);
    write_catalog(&catalog, catalog_path)?;

    info!(
        "Catalog updated: {} new samples from {} batches, {} total",
        new_samples,
        batches.len(),
        catalog.len()
    );

    let metadata = UpdateMetadata {
        number_of_batches_scanned: batches.len(),
        number_of_new_samples: new_samples,
        total_number_of_samples: catalog.len(),
    };
    Ok((catalog, metadata))
}
