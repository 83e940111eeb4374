//! Store: the persistence seam between runs (spec §3, §5).
//!
//! Three namespaces, as spec §5 lays out: `config` (Specs, SosModels,
//! ModelRuns, scenario/narrative definitions), `data` (scenario variant
//! data, parameter defaults, results, decision state), and `meta` (job
//! status). The trait is dyn-safe so a [`crate::runner::ModelRunner`] can
//! be built against `Box<dyn Store>` and swap backings without
//! recompiling model code.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::data_array::DataArray;
use crate::error::Result;
use crate::model::{ModelRun, SosModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The three config record kinds a `Store` persists under `config/`.
/// Stored as [`serde_json::Value`] so the trait stays dyn-safe; callers
/// serialize/deserialize the concrete type at the edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    SosModel,
    ModelRun,
    Scenario,
    Narrative,
}

impl ConfigKind {
    fn dir(&self) -> &'static str {
        match self {
            ConfigKind::SosModel => "sos_model",
            ConfigKind::ModelRun => "model_run",
            ConfigKind::Scenario => "scenario",
            ConfigKind::Narrative => "narrative",
        }
    }
}

/// A persisted model output, addressed by everything that distinguishes
/// one result from another (spec §5: results are keyed by run, model,
/// output, timestep, and iteration).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub run_name: String,
    pub model_name: String,
    pub output_name: String,
    pub timestep: i64,
    pub iteration: u32,
}

/// The status of one job in the scheduler (spec §4.5). Persisted to the
/// `meta` namespace so a crashed run's progress can be inspected or
/// resumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Skipped because an upstream dependency in the same timestep failed
    /// (spec §4.5: "a failed job's descendants in the same timestep are
    /// skipped, not retried").
    Skipped,
}

/// One entry in a run's job-status table (spec §4.5/§5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobMeta {
    pub run_name: String,
    pub model_name: String,
    pub timestep: i64,
    pub iteration: u32,
    pub status: JobStatus,
}

/// Persistence for everything a [`crate::runner::ModelRunner`] reads and
/// writes across config, data, and meta namespaces (spec §5).
///
/// Implementations must be safe to share across the scheduler's rayon
/// threads: every method takes `&self`, and `Send + Sync` is required so
/// a `Box<dyn Store>` can be held behind an `Arc` and called concurrently
/// from job closures.
pub trait Store: Send + Sync {
    // -- config namespace --

    fn write_config(&self, kind: ConfigKind, name: &str, value: serde_json::Value) -> Result<()>;
    fn read_config(&self, kind: ConfigKind, name: &str) -> Result<serde_json::Value>;
    fn list_configs(&self, kind: ConfigKind) -> Result<Vec<String>>;
    fn delete_config(&self, kind: ConfigKind, name: &str) -> Result<()>;

    fn write_sos_model(&self, model: &SosModelRecord) -> Result<()> {
        let value = serde_json::to_value(model).map_err(|e| crate::error::SmifError::NotFound(e.to_string()))?;
        self.write_config(ConfigKind::SosModel, &model.name, value)
    }

    fn write_model_run(&self, run: &ModelRun) -> Result<()> {
        let value = serde_json::to_value(run).map_err(|e| crate::error::SmifError::NotFound(e.to_string()))?;
        self.write_config(ConfigKind::ModelRun, &run.name, value)
    }

    fn read_model_run(&self, name: &str) -> Result<ModelRun> {
        let value = self.read_config(ConfigKind::ModelRun, name)?;
        serde_json::from_value(value).map_err(|e| crate::error::SmifError::NotFound(e.to_string()))
    }

    // -- data namespace: scenario variant data --

    fn write_scenario_variant_data(
        &self,
        scenario: &str,
        variant: &str,
        variable: &str,
        data: &DataArray,
    ) -> Result<()>;

    fn read_scenario_variant_data(
        &self,
        scenario: &str,
        variant: &str,
        variable: &str,
    ) -> Result<DataArray>;

    // -- data namespace: model parameter defaults --

    fn write_model_parameter_default(&self, model: &str, parameter: &str, data: &DataArray) -> Result<()>;
    fn read_model_parameter_default(&self, model: &str, parameter: &str) -> Result<DataArray>;

    // -- data namespace: narrative variant data --

    fn write_narrative_variant_data(
        &self,
        narrative: &str,
        variant: &str,
        model: &str,
        parameter: &str,
        data: &DataArray,
    ) -> Result<()>;

    fn read_narrative_variant_data(
        &self,
        narrative: &str,
        variant: &str,
        model: &str,
        parameter: &str,
    ) -> Result<DataArray>;

    // -- data namespace: results --

    fn write_results(&self, key: &ResultKey, data: &DataArray) -> Result<()>;
    fn read_results(&self, key: &ResultKey) -> Result<DataArray>;
    fn available_results(&self, run_name: &str) -> Result<Vec<ResultKey>>;

    // -- data namespace: decision state --

    /// Opaque key/value state a decision module persists between
    /// timesteps (spec §4.6), e.g. the previous iteration's convergence
    /// variable values. Keyed by run name; state is a flat map so
    /// decision modules do not need a bespoke schema.
    fn write_state(&self, run_name: &str, state: &HashMap<String, f64>) -> Result<()>;
    fn read_state(&self, run_name: &str) -> Result<HashMap<String, f64>>;

    // -- meta namespace: job status --

    fn write_job_status(&self, meta: &JobMeta) -> Result<()>;
    fn read_job_status(
        &self,
        run_name: &str,
        model_name: &str,
        timestep: i64,
        iteration: u32,
    ) -> Result<Option<JobStatus>>;
    fn job_statuses_for_run(&self, run_name: &str) -> Result<Vec<JobMeta>>;
}

/// `SosModel` isn't directly (de)serializable (it holds `Box<dyn
/// SectorModel>`); this is the wire record a `Store` persists and a
/// runner rehydrates against a caller-supplied map of `SectorModel`
/// implementations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SosModelRecord {
    pub name: String,
    pub model_specs: Vec<crate::model::ModelSpec>,
    pub scenario_models: Vec<(crate::model::ModelName, crate::model::ScenarioSource)>,
    pub scenario_dependencies: Vec<crate::model::ScenarioDependency>,
    pub model_dependencies: Vec<crate::model::ModelDependency>,
    pub narratives: Vec<crate::model::Narrative>,
}

impl From<&SosModel> for SosModelRecord {
    fn from(m: &SosModel) -> Self {
        let mut model_specs = Vec::new();
        let mut scenario_models = Vec::new();
        for model in m.models.values() {
            model_specs.push(model.spec.clone());
            if let crate::model::ModelKind::Scenario(s) = &model.kind {
                scenario_models.push((model.spec.name.clone(), s.clone()));
            }
        }
        SosModelRecord {
            name: m.name.clone(),
            model_specs,
            scenario_models,
            scenario_dependencies: m.scenario_dependencies.clone(),
            model_dependencies: m.model_dependencies.clone(),
            narratives: m.narratives.clone(),
        }
    }
}
