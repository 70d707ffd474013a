// ==============================================================================
// error.rs - Pipeline Error Taxonomy
// ==============================================================================
// Description: Typed errors for filtering, consistify and phylogeny stages
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Coarse error category, for callers that branch on the kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Schema,
    EmptyResult,
    MissingInput,
    MalformedLocation,
    ObjectNotFound,
    ExternalTool,
    Io,
    Internal,
}

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unknown filter column '{column}'; valid columns are: {valid}")]
    UnknownColumn { column: String, valid: String },

    #[error("invalid criterion for {kind} column '{column}': {reason}")]
    InvalidCriterion {
        column: String,
        kind: &'static str,
        reason: String,
    },

    #[error("invalid duplicate-resolution rule on column '{column}': {reason}")]
    InvalidRule { column: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("schema error in {path:?}: {reason}")]
    Schema { path: PathBuf, reason: String },

    #[error("no records left after {stage}")]
    EmptyResult { stage: &'static str },

    #[error("required input not found: {path:?}")]
    MissingInput { path: PathBuf },

    #[error("incorrectly formatted storage uri: '{uri}'")]
    MalformedLocation { uri: String },

    #[error("object not found: bucket '{bucket}', key '{key}'")]
    ObjectNotFound { bucket: String, key: String },

    #[error("external tool '{tool}' failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("metadata field '{0}' was already recorded by an earlier stage")]
    DuplicateMetadataKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnknownColumn { .. }
            | PipelineError::InvalidCriterion { .. }
            | PipelineError::InvalidRule { .. }
            | PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Schema { .. } => ErrorKind::Schema,
            PipelineError::EmptyResult { .. } => ErrorKind::EmptyResult,
            PipelineError::MissingInput { .. } => ErrorKind::MissingInput,
            PipelineError::MalformedLocation { .. } => ErrorKind::MalformedLocation,
            PipelineError::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            PipelineError::ExternalTool { .. } => ErrorKind::ExternalTool,
            PipelineError::DuplicateMetadataKey(_) => ErrorKind::Internal,
            PipelineError::Io(_) | PipelineError::Csv(_) | PipelineError::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn criterion(column: &str, kind: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidCriterion {
            column: column.to_string(),
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
