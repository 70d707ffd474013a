// ==============================================================================
// workdir.rs - Intermediate File Lifecycle
// ==============================================================================
// Description: Scratch vs. persistent location for bulky build intermediates
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::Result;

/// Where the concatenated and site-extracted FASTA files are written.
///
/// `Temporary` is removed when dropped, so an early return or panic in the
/// build stage still cleans up. `Persistent` is left in place.
#[derive(Debug)]
pub enum WorkDir {
    Temporary(TempDir),
    Persistent(PathBuf),
}

impl WorkDir {
    /// Scratch directory (light mode) or the results directory itself
    pub fn for_mode(light_mode: bool, results_dir: &Path, scratch_root: Option<&Path>) -> Result<Self> {
        if light_mode {
            let builder = {
                let mut b = tempfile::Builder::new();
                b.prefix("btb-phylo-");
                b
            };
            let dir = match scratch_root {
                Some(root) => {
                    std::fs::create_dir_all(root)?;
                    builder.tempdir_in(root)?
                }
                None => builder.tempdir()?,
            };
            debug!("Light mode: intermediates in {:?}", dir.path());
            Ok(WorkDir::Temporary(dir))
        } else {
            std::fs::create_dir_all(results_dir)?;
            Ok(WorkDir::Persistent(results_dir.to_path_buf()))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WorkDir::Temporary(dir) => dir.path(),
            WorkDir::Persistent(path) => path,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, WorkDir::Temporary(_))
    }

    /// Remove a temporary directory now, reporting any failure
    pub fn close(self) -> Result<()> {
        if let WorkDir::Temporary(dir) = self {
            let path = dir.path().to_path_buf();
            dir.close()?;
            info!("Removed intermediate files in {:?}", path);
        }
        Ok(())
    }
}
