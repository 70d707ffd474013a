// ==============================================================================
// location.rs - Storage Location Parsing
// ==============================================================================
// Description: Parses per-sample result locations into bucket and key
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Format: s3://s3-csu-NNN/<results prefix>
// Example:
//   s3://s3-csu-003/v3/Results_10032_18Jul22
//   -> bucket "s3-csu-003"
//   -> consensus key "v3/Results_10032_18Jul22/consensus/<Sample>_consensus.fas"
// ==============================================================================

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{PipelineError, Result};

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^s3://(s3-csu-\d{3})/+").expect("valid location regex"))
}

/// Bucket and prefix of a sample's results folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocation {
    bucket: String,
    prefix: String,
}

/// A single object inside a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub bucket: String,
    pub key: String,
}

impl ResultLocation {
    /// Parse a `ResultLoc` value. The bucket must be `s3-csu-` followed by
    /// exactly three digits and at least one `/`.
    pub fn parse(uri: &str) -> Result<Self> {
        let captures = location_pattern()
            .captures(uri)
            .ok_or_else(|| PipelineError::MalformedLocation { uri: uri.to_string() })?;

        let whole = captures.get(0).map(|m| m.end()).unwrap_or(0);
        let bucket = captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| PipelineError::MalformedLocation { uri: uri.to_string() })?;

        let prefix = uri[whole..].trim_end_matches('/').to_string();

        Ok(Self { bucket, prefix })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of a sample's consensus sequence inside this results folder
    pub fn consensus_key(&self, sample: &str) -> ObjectKey {
        let file = format!("consensus/{}_consensus.fas", sample);
        let key = if self.prefix.is_empty() {
            file
        } else {
            format!("{}/{}", self.prefix, file)
        };

        ObjectKey {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
