// ==============================================================================
// warnings.rs - Non-Fatal Pipeline Warnings
// ==============================================================================
// Description: Collects and reports conditions that do not abort a run
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// A condition worth reporting that does not abort the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    /// A requested categorical value matched no record in the input
    UnmatchedCategory { column: String, value: String },
    /// Duplicate resolution could not separate records of one submission
    UnresolvedTie { submission: String, kept: String, dropped: Vec<String> },
    /// A clade in the threshold table produced no samples
    EmptyClade { clade: String },
    /// Too few sequences to build a tree
    TooFewTaxa { found: usize, required: usize },
    /// Build input inferred from files left in the metadata folder
    InferredBuildInput { path: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnmatchedCategory { column, value } => {
                write!(f, "value '{}' not found in column '{}'", value, column)
            }
            Warning::UnresolvedTie { submission, kept, dropped } => write!(
                f,
                "submission '{}' still tied after all rules; kept '{}', dropped {:?}",
                submission, kept, dropped
            ),
            Warning::EmptyClade { clade } => write!(f, "no samples passed the filters for clade '{}'", clade),
            Warning::TooFewTaxa { found, required } => write!(
                f,
                "unable to build tree: need at least {} taxa, found {}",
                required, found
            ),
            Warning::InferredBuildInput { path } => write!(
                f,
                "build input inferred from existing file {} (deprecated, pass it explicitly)",
                path.display()
            ),
        }
    }
}

/// How warnings are rendered in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningStyle {
    /// "Warning: <message>"
    #[default]
    Short,
    /// "Warning [<kind>]: <message>"
    Detailed,
}

/// Receives warnings from the components that raise them. Passed explicitly
/// to each stage; the orchestrator copies the collected list into the run
/// metadata.
#[derive(Debug, Default)]
pub struct WarningSink {
    style: WarningStyle,
    issued: Vec<Warning>,
}

impl WarningSink {
    pub fn new(style: WarningStyle) -> Self {
        Self {
            style,
            issued: Vec::new(),
        }
    }

    pub fn emit(&mut self, warning: Warning) {
        warn!("{}", self.render(&warning));
        self.issued.push(warning);
    }

    pub fn render(&self, warning: &Warning) -> String {
        match self.style {
            WarningStyle::Short => format!("Warning: {}", warning),
            WarningStyle::Detailed => format!("Warning [{}]: {}", warning.kind(), warning),
        }
    }

    pub fn issued(&self) -> &[Warning] {
        &self.issued
    }

    pub fn into_issued(self) -> Vec<Warning> {
        self.issued
    }
}

impl Warning {
    fn kind(&self) -> &'static str {
        match self {
            Warning::UnmatchedCategory { .. } => "unmatched_category",
            Warning::UnresolvedTie { .. } => "unresolved_tie",
            Warning::EmptyClade { .. } => "empty_clade",
            Warning::TooFewTaxa { .. } => "too_few_taxa",
            Warning::InferredBuildInput { .. } => "inferred_build_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_styles() {
        let w = Warning::UnmatchedCategory {
            column: "group".to_string(),
            value: "cladeZ".to_string(),
        };

        let short = WarningSink::new(WarningStyle::Short);
        assert_eq!(short.render(&w), "Warning: value 'cladeZ' not found in column 'group'");

        let detailed = WarningSink::new(WarningStyle::Detailed);
        assert!(detailed.render(&w).starts_with("Warning [unmatched_category]"));
    }

    #[test]
    fn test_sink_collects_in_order() {
        let mut sink = WarningSink::default();
        sink.emit(Warning::EmptyClade { clade: "B6-11".to_string() });
        sink.emit(Warning::TooFewTaxa { found: 3, required: 4 });
        assert_eq!(sink.issued().len(), 2);
        assert!(matches!(sink.issued()[1], Warning::TooFewTaxa { found: 3, .. }));
    }
}
