// ==============================================================================
// processor.rs - Pipeline Orchestration
// ==============================================================================
// Description: Chains update, filter, consistify and build into one run
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::consistify::{consistify, ConsistifyMetadata};
use crate::duplicates::{resolve, Rule};
use crate::error::{PipelineError, Result};
use crate::filter::{filter, FilterSpec};
use crate::metadata::{RunInfo, RunMetadata, StageMetadata};
use crate::models::{Column, RecordSet};
use crate::parsers::{load_catalog, load_clade_thresholds, load_table, locate, write_catalog, write_table, CladeThreshold};
use crate::phylogeny::{self, ComparisonTools};
use crate::storage::ObjectStore;
use crate::update::{update_catalog, LocalBatchSource, UpdateMetadata};
use crate::validator::FileValidator;
use crate::warnings::{Warning, WarningSink};
use crate::workdir::WorkDir;

/// One step of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Update,
    Filter,
    Consistify,
    Build,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Update => "update",
            Stage::Filter => "filter",
            Stage::Consistify => "consistify",
            Stage::Build => "build",
        }
    }
}

/// The run variants exposed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPlan {
    UpdateSamples,
    Filter,
    Consistify,
    Phylo,
    UpdateAndFilter,
    FilterAndPhylo,
    FullPipeline,
}

impl RunPlan {
    /// Stages to run. Consistify follows filter whenever cross-validation
    /// data is configured.
    pub fn stages(&self, cross_validate: bool) -> Vec<Stage> {
        let mut stages = match self {
            RunPlan::UpdateSamples => vec![Stage::Update],
            RunPlan::Filter => vec![Stage::Filter],
            RunPlan::Consistify => return vec![Stage::Consistify],
            RunPlan::Phylo => vec![Stage::Build],
            RunPlan::UpdateAndFilter => vec![Stage::Update, Stage::Filter],
            RunPlan::FilterAndPhylo => vec![Stage::Filter, Stage::Build],
            RunPlan::FullPipeline => vec![Stage::Update, Stage::Filter, Stage::Build],
        };
        if cross_validate {
            if let Some(pos) = stages.iter().position(|s| *s == Stage::Filter) {
                stages.insert(pos + 1, Stage::Consistify);
            }
        }
        stages
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterMetadata {
    /// Criteria exactly as supplied
    pub filter_criteria: FilterSpec,
    pub catalog_sha256: String,
    pub number_of_catalog_samples: usize,
    pub number_of_filtered_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clade_thresholds: Option<Vec<CladeThreshold>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples_per_clade: Option<BTreeMap<String, usize>>,
}

impl StageMetadata for FilterMetadata {
    const STAGE: &'static str = "filter";
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metadata: Value,
    pub metadata_path: PathBuf,
    /// Records produced by the last stage
    pub records: RecordSet,
    pub warnings: Vec<Warning>,
}

/// Filter the catalog once per clade and union the results.
///
/// Each clade uses the base criteria plus `group = [clade]` and
/// `Ncount = [0, maxN]`, then has its duplicates resolved. A clade with no
/// surviving samples only warns; an empty union is an error.
pub fn filter_by_clade(
    catalog: &RecordSet,
    base: &FilterSpec,
    thresholds: &[CladeThreshold],
    rules: &[Rule],
    warnings: &mut WarningSink,
) -> Result<(RecordSet, BTreeMap<String, usize>)> {
    let mut union = Vec::new();
    let mut counts = BTreeMap::new();

    for threshold in thresholds {
        let clade_spec = FilterSpec::new()
            .with_values(Column::Group.name(), [threshold.clade.as_str()])
            .with_range(Column::Ncount.name(), 0.0, threshold.max_n);
        let spec = base.overlaid(&clade_spec);

        let kept = match filter(catalog, &spec, warnings) {
            Ok(filtered) => resolve(&filtered, rules, warnings)?,
            Err(PipelineError::EmptyResult { .. }) => {
                warnings.emit(Warning::EmptyClade {
                    clade: threshold.clade.clone(),
                });
                counts.insert(threshold.clade.clone(), 0);
                continue;
            }
            Err(e) => return Err(e),
        };

        debug!("Clade {}: {} samples", threshold.clade, kept.len());
        counts.insert(threshold.clade.clone(), kept.len());
        union.extend(kept.into_records());
    }

    if union.is_empty() {
        return Err(PipelineError::EmptyResult { stage: "filtering" });
    }

    Ok((RecordSet::from_records(union)?, counts))
}

pub struct PipelineOrchestrator<S: ObjectStore, T: ComparisonTools> {
    config: PipelineConfig,
    store: S,
    tools: T,
}

impl<S: ObjectStore, T: ComparisonTools> PipelineOrchestrator<S, T> {
    pub fn new(config: PipelineConfig, store: S, tools: T) -> Self {
        Self { config, store, tools }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage of `plan` in order.
    ///
    /// Each stage's metadata is merged before the next stage starts;
    /// `metadata.json` is written only once all stages have succeeded.
    pub async fn run(&self, plan: RunPlan) -> Result<RunReport> {
        let cross_validate = self.config.cross_validation_dir.is_some();
        if plan == RunPlan::Consistify && !cross_validate {
            return Err(PipelineError::Configuration(
                "consistify requires a cross-validation directory".to_string(),
            ));
        }

        let run = RunInfo::new();
        info!("Starting run {} ({:?})", run.run_id, plan);

        let mut metadata = RunMetadata::start(&run)?;
        let mut warnings = WarningSink::new(self.config.warning_style);
        let mut catalog: Option<RecordSet> = None;
        let mut current: Option<RecordSet> = None;

        for stage in plan.stages(cross_validate) {
            info!("Stage: {}", stage.name());
            match stage {
                Stage::Update => {
                    let (updated, fragment) = self.update_stage()?;
                    metadata.merge(&fragment)?;
                    catalog = Some(updated);
                }
                Stage::Filter => {
                    let all = match catalog.take() {
                        Some(all) => all,
                        None => load_catalog(&self.config.catalog_path)?,
                    };
                    let (filtered, fragment) = self.filter_stage(&all, &mut warnings)?;
                    metadata.merge(&fragment)?;
                    current = Some(filtered);
                }
                Stage::Consistify => {
                    let wgs = self.stage_input(stage, current.take(), &mut warnings)?;
                    let (consistent, fragment) = self.consistify_stage(&wgs)?;
                    metadata.merge(&fragment)?;
                    current = Some(consistent);
                }
                Stage::Build => {
                    let records = self.stage_input(stage, current.take(), &mut warnings)?;
                    let fragment = self.build_stage(&records, &mut warnings).await?;
                    metadata.merge(&fragment)?;
                    current = Some(records);
                }
            }
        }

        let metadata_path = self.config.layout().metadata_json();
        metadata.write(&metadata_path, warnings.issued())?;
        let document = metadata.to_document(warnings.issued())?;

        info!("Run {} complete", run.run_id);
        Ok(RunReport {
            metadata: document,
            metadata_path,
            records: current.or(catalog).unwrap_or_default(),
            warnings: warnings.into_issued(),
        })
    }

    fn update_stage(&self) -> Result<(RecordSet, UpdateMetadata)> {
        match &self.config.batch_dir {
            Some(dir) => update_catalog(&self.config.catalog_path, &LocalBatchSource::new(dir)),
            None => {
                info!("No batch directory; using catalog as-is");
                let catalog = load_catalog(&self.config.catalog_path)?;
                let fragment = UpdateMetadata {
                    number_of_batches_scanned: 0,
                    number_of_new_samples: 0,
                    total_number_of_samples: catalog.len(),
                };
                Ok((catalog, fragment))
            }
        }
    }

    fn filter_stage(&self, catalog: &RecordSet, warnings: &mut WarningSink) -> Result<(RecordSet, FilterMetadata)> {
        let spec = self.config.filter.load()?;
        let layout = self.config.layout();

        // Snapshot the inputs first so an empty result can still be inspected
        write_catalog(catalog, layout.all_samples())?;
        std::fs::write(layout.filters(), serde_json::to_string_pretty(&spec)?)?;

        let (filtered, thresholds, per_clade) = match &self.config.clade_thresholds {
            Some(path) => {
                let thresholds = load_clade_thresholds(path)?;
                info!("Filtering {} clades separately", thresholds.len());
                let (filtered, counts) =
                    filter_by_clade(catalog, &spec, &thresholds, &self.config.duplicate_rules, warnings)?;
                (filtered, Some(thresholds), Some(counts))
            }
            None => {
                let passed = filter(catalog, &spec, warnings)?;
                let filtered = resolve(&passed, &self.config.duplicate_rules, warnings)?;
                (filtered, None, None)
            }
        };

        write_catalog(&filtered, layout.filtered_samples())?;

        let catalog_sha256 = FileValidator::new().validate(&self.config.catalog_path)?.hash_sha256;

        info!("{} of {} samples passed filtering", filtered.len(), catalog.len());
        let fragment = FilterMetadata {
            filter_criteria: spec,
            catalog_sha256,
            number_of_catalog_samples: catalog.len(),
            number_of_filtered_samples: filtered.len(),
            clade_thresholds: thresholds,
            samples_per_clade: per_clade,
        };
        Ok((filtered, fragment))
    }

    fn consistify_stage(&self, wgs: &RecordSet) -> Result<(RecordSet, ConsistifyMetadata)> {
        let dir = self.config.cross_validation_dir.as_ref().ok_or_else(|| {
            PipelineError::Configuration("consistify requires a cross-validation directory".to_string())
        })?;
        let paths = locate(dir)?;
        let key = &self.config.cross_key_column;
        let cattle = load_table(&paths.cattle, "cattle", key)?;
        let movement = load_table(&paths.movement, "movement", key)?;

        let (triple, fragment) = consistify(wgs, &cattle, &movement)?;

        let layout = self.config.layout();
        write_catalog(&triple.wgs, layout.consistified("wgs"))?;
        write_table(&triple.cattle, &layout.consistified("cattle"))?;
        write_table(&triple.movement, &layout.consistified("movement"))?;

        Ok((triple.wgs, fragment))
    }

    async fn build_stage(&self, records: &RecordSet, warnings: &mut WarningSink) -> Result<phylogeny::BuildMetadata> {
        let workdir = WorkDir::for_mode(
            self.config.light_mode,
            &self.config.results_dir,
            self.config.scratch_root.as_deref(),
        )?;

        let fragment = phylogeny::build(
            &self.store,
            &self.tools,
            records,
            &self.config.consensus_dir,
            &workdir,
            &self.config.layout(),
            &self.config.build,
            warnings,
        )
        .await?;

        workdir.close()?;
        Ok(fragment)
    }

    /// Records for a stage: the previous stage's output, else the configured
    /// input file
    fn stage_input(&self, stage: Stage, previous: Option<RecordSet>, warnings: &mut WarningSink) -> Result<RecordSet> {
        if let Some(records) = previous {
            return Ok(records);
        }

        match self.config.input.resolve(&self.config.layout(), warnings)? {
            Some(path) => {
                info!("{} input: {:?}", stage.name(), path);
                load_catalog(path)
            }
            None => Err(PipelineError::Configuration(format!(
                "the {} stage has no input; supply a samples file",
                stage.name()
            ))),
        }
    }
}
