// ==============================================================================
// config.rs - Pipeline Run Configuration
// ==============================================================================
// Description: Plain run settings and the results directory layout
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::duplicates::{Rule, DEFAULT_RULES};
use crate::error::{PipelineError, Result};
use crate::filter::FilterSpec;
use crate::parsers::cross_validation::DEFAULT_KEY_COLUMN;
use crate::phylogeny::{BuildOptions, SNP_MATRIX_FILE, TREE_PREFIX};
use crate::warnings::{Warning, WarningSink, WarningStyle};

/// Where the filter criteria come from. Flags and a config file are
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSource {
    Criteria(FilterSpec),
    ConfigFile(PathBuf),
}

impl FilterSource {
    /// Pick the criteria source, rejecting flags combined with a config file
    pub fn from_options(config: Option<PathBuf>, criteria: FilterSpec) -> Result<Self> {
        match config {
            Some(path) if !criteria.is_empty() => Err(PipelineError::Configuration(format!(
                "filter criteria flags ({}) cannot be combined with a config file ({:?})",
                criteria.columns().collect::<Vec<_>>().join(", "),
                path
            ))),
            Some(path) => Ok(FilterSource::ConfigFile(path)),
            None => Ok(FilterSource::Criteria(criteria)),
        }
    }

    pub fn load(&self) -> Result<FilterSpec> {
        match self {
            FilterSource::Criteria(spec) => Ok(spec.clone()),
            FilterSource::ConfigFile(path) => FilterSpec::from_json_file(path),
        }
    }
}

impl Default for FilterSource {
    fn default() -> Self {
        FilterSource::Criteria(FilterSpec::new())
    }
}

/// Record set a stage reads when no earlier stage in the run produced one
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StageInput {
    /// Output of the preceding stage in this run
    #[default]
    Previous,
    /// An explicit catalog-format CSV
    File(PathBuf),
    /// Deprecated: the newest snapshot in the results metadata folder
    Discover,
}

impl StageInput {
    /// Resolve to a file, or `None` when the previous stage's output is used
    pub fn resolve(&self, layout: &ResultsLayout, warnings: &mut WarningSink) -> Result<Option<PathBuf>> {
        match self {
            StageInput::Previous => Ok(None),
            StageInput::File(path) => {
                if !path.is_file() {
                    return Err(PipelineError::MissingInput { path: path.clone() });
                }
                Ok(Some(path.clone()))
            }
            StageInput::Discover => {
                let candidates = [layout.consistified("wgs"), layout.filtered_samples()];
                let Some(found) = candidates.iter().find(|p| p.is_file()) else {
                    return Err(PipelineError::MissingInput {
                        path: layout.filtered_samples(),
                    });
                };
                warn!("Discovering the build input is deprecated; pass it explicitly");
                warnings.emit(Warning::InferredBuildInput { path: found.clone() });
                Ok(Some(found.clone()))
            }
        }
    }
}

/// Paths of every artifact written under the results directory
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn all_samples(&self) -> PathBuf {
        self.metadata_dir().join("all_samples.csv")
    }

    pub fn filters(&self) -> PathBuf {
        self.metadata_dir().join("filters.json")
    }

    pub fn filtered_samples(&self) -> PathBuf {
        self.metadata_dir().join("filtered_samples.csv")
    }

    /// `consistified_<name>.csv` for `wgs`, `cattle` or `movement`
    pub fn consistified(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("consistified_{}.csv", name))
    }

    pub fn metadata_json(&self) -> PathBuf {
        self.metadata_dir().join("metadata.json")
    }

    pub fn snp_matrix(&self) -> PathBuf {
        self.root.join(SNP_MATRIX_FILE)
    }

    pub fn tree_prefix(&self) -> PathBuf {
        self.root.join(TREE_PREFIX)
    }
}

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub results_dir: PathBuf,
    /// Cache of downloaded consensus sequences
    pub consensus_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub batch_dir: Option<PathBuf>,
    pub filter: FilterSource,
    pub duplicate_rules: Vec<Rule>,
    /// `clade,maxN` table; enables clade-stratified filtering
    pub clade_thresholds: Option<PathBuf>,
    /// Directory holding cattle.csv and movement.csv; enables consistify
    pub cross_validation_dir: Option<PathBuf>,
    pub cross_key_column: String,
    pub input: StageInput,
    pub build: BuildOptions,
    pub light_mode: bool,
    /// Parent of the light-mode scratch directory (system temp if unset)
    pub scratch_root: Option<PathBuf>,
    pub warning_style: WarningStyle,
}

impl PipelineConfig {
    pub fn new(results_dir: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>) -> Self {
        let results_dir = results_dir.into();
        Self {
            consensus_dir: results_dir.join("consensus"),
            results_dir,
            catalog_path: catalog_path.into(),
            batch_dir: None,
            filter: FilterSource::default(),
            duplicate_rules: DEFAULT_RULES.to_vec(),
            clade_thresholds: None,
            cross_validation_dir: None,
            cross_key_column: DEFAULT_KEY_COLUMN.to_string(),
            input: StageInput::default(),
            build: BuildOptions::default(),
            light_mode: false,
            scratch_root: None,
            warning_style: WarningStyle::default(),
        }
    }

    pub fn layout(&self) -> ResultsLayout {
        ResultsLayout::new(&self.results_dir)
    }
}
