// ==============================================================================
// validator.rs - Input File Validation
// ==============================================================================
// Description: Checks pipeline inputs exist, detects compression, fingerprints
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub path: PathBuf,
    pub size: u64,
    pub compressed: bool,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

/// Validates tabular inputs before they are parsed
#[derive(Debug, Default)]
pub struct FileValidator;

impl FileValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, path: &Path) -> Result<ValidatedFile> {
        if !path.is_file() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let size = std::fs::metadata(path)?.len();
        let compressed = self.is_gzip(path)?;
        let hash = self.compute_sha256(path)?;

        debug!(
            "Validated {:?}: {} bytes, gzip={}, sha256={}",
            path, size, compressed, hash
        );

        Ok(ValidatedFile {
            path: path.to_path_buf(),
            size,
            compressed,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }

    /// Open a file for reading, transparently decompressing gzip content
    pub fn open(&self, path: &Path) -> Result<Box<dyn Read>> {
        if !path.is_file() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let file = BufReader::new(File::open(path)?);
        if self.is_gzip(path)? {
            Ok(Box::new(flate2::read::GzDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }

    fn is_gzip(&self, path: &Path) -> Result<bool> {
        let actual = self.read_magic_number(path)?;
        Ok(self.verify_magic_number(&GZIP_MAGIC, &actual))
    }

    fn read_magic_number(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut buffer = Vec::with_capacity(GZIP_MAGIC.len());
        file.take(GZIP_MAGIC.len() as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn verify_magic_number(&self, expected: &[u8], actual: &[u8]) -> bool {
        expected.len() <= actual.len()
            && expected.iter().zip(actual.iter()).all(|(e, a)| e == a)
    }

    fn compute_sha256(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}
