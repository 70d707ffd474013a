// ==============================================================================
// metadata.rs - Run Provenance Metadata
// ==============================================================================
// Description: Append-only accumulation of per-stage metadata for one run
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::warnings::Warning;

/// Commit the binary was built from, if supplied at build time
pub const BUILD_COMMIT: Option<&str> = option_env!("BTB_PHYLO_COMMIT");

/// Typed metadata produced by one pipeline stage.
///
/// Field names are fixed by the implementing struct; [`RunMetadata::merge`]
/// rejects any field another stage already wrote.
pub trait StageMetadata: Serialize {
    const STAGE: &'static str;
}

/// Identity of the run, written first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub datetime: DateTime<Utc>,
    pub version: String,
    pub commit: String,
}

impl RunInfo {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            datetime: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: BUILD_COMMIT.unwrap_or("unknown").to_string(),
        }
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMetadata for RunInfo {
    const STAGE: &'static str = "run";
}

/// When each stage finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: String,
    pub completed_at: DateTime<Utc>,
}

/// Accumulated metadata for one run. Owned by the orchestrator and written
/// once, after every stage succeeded.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    fields: Map<String, Value>,
    stages: Vec<StageEvent>,
}

impl RunMetadata {
    /// Start a run's metadata with its identity fields
    pub fn start(info: &RunInfo) -> Result<Self> {
        let mut metadata = Self::default();
        metadata.merge(info)?;
        Ok(metadata)
    }

    /// Add a stage's fields. Either all fields are added or, on a key
    /// collision, none are.
    pub fn merge<M: StageMetadata>(&mut self, fragment: &M) -> Result<()> {
        let fields = match serde_json::to_value(fragment)? {
            Value::Object(map) => map,
            other => {
                return Err(PipelineError::Configuration(format!(
                    "metadata for stage '{}' is not a map: {}",
                    M::STAGE,
                    other
                )))
            }
        };

        if let Some(key) = fields
            .keys()
            .find(|k| self.fields.contains_key(*k) || *k == "stages" || *k == "warnings")
        {
            return Err(PipelineError::DuplicateMetadataKey(key.clone()));
        }

        debug!("Merging {} metadata fields from stage '{}'", fields.len(), M::STAGE);
        self.fields.extend(fields);
        self.stages.push(StageEvent {
            stage: M::STAGE.to_string(),
            completed_at: Utc::now(),
        });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn stages(&self) -> &[StageEvent] {
        &self.stages
    }

    /// Final document: stage fields, stage completion times and warnings
    pub fn to_document(&self, warnings: &[Warning]) -> Result<Value> {
        let mut document = self.fields.clone();
        document.insert("stages".to_string(), serde_json::to_value(&self.stages)?);
        document.insert("warnings".to_string(), serde_json::to_value(warnings)?);
        Ok(Value::Object(document))
    }

    pub fn write(&self, path: &Path, warnings: &[Warning]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let document = self.to_document(warnings)?;
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        info!("Run metadata written to {:?}", path);
        Ok(())
    }
}
