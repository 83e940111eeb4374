//! In-memory `Store`, backed by `dashmap` the same way `peregrine`'s
//! `History` backs its resource timelines: one concurrent map per logical
//! namespace, keyed by a string built from the call's arguments.

use super::{ConfigKind, JobMeta, JobStatus, ResultKey, Store};
use crate::data_array::DataArray;
use crate::error::{Result, SmifError};
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    config: DashMap<(ConfigKindKey, String), serde_json::Value>,
    scenario_data: DashMap<(String, String, String), DataArray>,
    parameter_defaults: DashMap<(String, String), DataArray>,
    narrative_data: DashMap<(String, String, String, String), DataArray>,
    results: DashMap<ResultKey, DataArray>,
    state: DashMap<String, HashMap<String, f64>>,
    job_status: DashMap<(String, String, i64, u32), JobStatus>,
    job_order: DashMap<String, Vec<(String, String, i64, u32)>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ConfigKindKey {
    SosModel,
    ModelRun,
    Scenario,
    Narrative,
}

impl From<ConfigKind> for ConfigKindKey {
    fn from(k: ConfigKind) -> Self {
        match k {
            ConfigKind::SosModel => ConfigKindKey::SosModel,
            ConfigKind::ModelRun => ConfigKindKey::ModelRun,
            ConfigKind::Scenario => ConfigKindKey::Scenario,
            ConfigKind::Narrative => ConfigKindKey::Narrative,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn write_config(&self, kind: ConfigKind, name: &str, value: serde_json::Value) -> Result<()> {
        self.config.insert((kind.into(), name.to_string()), value);
        Ok(())
    }

    fn read_config(&self, kind: ConfigKind, name: &str) -> Result<serde_json::Value> {
        self.config
            .get(&(kind.into(), name.to_string()))
            .map(|v| v.clone())
            .ok_or_else(|| SmifError::NotFound(format!("config {}/{name}", kind.dir())))
    }

    fn list_configs(&self, kind: ConfigKind) -> Result<Vec<String>> {
        let key: ConfigKindKey = kind.into();
        Ok(self
            .config
            .iter()
            .filter(|e| e.key().0 == key)
            .map(|e| e.key().1.clone())
            .collect())
    }

    fn delete_config(&self, kind: ConfigKind, name: &str) -> Result<()> {
        self.config.remove(&(kind.into(), name.to_string()));
        Ok(())
    }

    fn write_scenario_variant_data(
        &self,
        scenario: &str,
        variant: &str,
        variable: &str,
        data: &DataArray,
    ) -> Result<()> {
        self.scenario_data.insert(
            (scenario.to_string(), variant.to_string(), variable.to_string()),
            data.clone(),
        );
        Ok(())
    }

    fn read_scenario_variant_data(&self, scenario: &str, variant: &str, variable: &str) -> Result<DataArray> {
        self.scenario_data
            .get(&(scenario.to_string(), variant.to_string(), variable.to_string()))
            .map(|v| v.clone())
            .ok_or_else(|| SmifError::NotFound(format!("scenario data {scenario}/{variant}/{variable}")))
    }

    fn write_model_parameter_default(&self, model: &str, parameter: &str, data: &DataArray) -> Result<()> {
        self.parameter_defaults
            .insert((model.to_string(), parameter.to_string()), data.clone());
        Ok(())
    }

    fn read_model_parameter_default(&self, model: &str, parameter: &str) -> Result<DataArray> {
        self.parameter_defaults
            .get(&(model.to_string(), parameter.to_string()))
            .map(|v| v.clone())
            .ok_or_else(|| SmifError::NotFound(format!("parameter default {model}/{parameter}")))
    }

    fn write_narrative_variant_data(
        &self,
        narrative: &str,
        variant: &str,
        model: &str,
        parameter: &str,
        data: &DataArray,
    ) -> Result<()> {
        self.narrative_data.insert(
            (
                narrative.to_string(),
                variant.to_string(),
                model.to_string(),
                parameter.to_string(),
            ),
            data.clone(),
        );
        Ok(())
    }

    fn read_narrative_variant_data(
        &self,
        narrative: &str,
        variant: &str,
        model: &str,
        parameter: &str,
    ) -> Result<DataArray> {
        self.narrative_data
            .get(&(
                narrative.to_string(),
                variant.to_string(),
                model.to_string(),
                parameter.to_string(),
            ))
            .map(|v| v.clone())
            .ok_or_else(|| SmifError::NotFound(format!("narrative data {narrative}/{variant}/{model}/{parameter}")))
    }

    fn write_results(&self, key: &ResultKey, data: &DataArray) -> Result<()> {
        self.results.insert(key.clone(), data.clone());
        Ok(())
    }

    fn read_results(&self, key: &ResultKey) -> Result<DataArray> {
        self.results
            .get(key)
            .map(|v| v.clone())
            .ok_or_else(|| SmifError::NotFound(format!("results {key:?}")))
    }

    fn available_results(&self, run_name: &str) -> Result<Vec<ResultKey>> {
        Ok(self
            .results
            .iter()
            .filter(|e| e.key().run_name == run_name)
            .map(|e| e.key().clone())
            .collect())
    }

    fn write_state(&self, run_name: &str, state: &HashMap<String, f64>) -> Result<()> {
        self.state.insert(run_name.to_string(), state.clone());
        Ok(())
    }

    fn read_state(&self, run_name: &str) -> Result<HashMap<String, f64>> {
        Ok(self
            .state
            .get(run_name)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    fn write_job_status(&self, meta: &JobMeta) -> Result<()> {
        let key = (
            meta.run_name.clone(),
            meta.model_name.clone(),
            meta.timestep,
            meta.iteration,
        );
        self.job_status.insert(key.clone(), meta.status);
        self.job_order
            .entry(meta.run_name.clone())
            .or_default()
            .push(key);
        Ok(())
    }

    fn read_job_status(
        &self,
        run_name: &str,
        model_name: &str,
        timestep: i64,
        iteration: u32,
    ) -> Result<Option<JobStatus>> {
        Ok(self
            .job_status
            .get(&(run_name.to_string(), model_name.to_string(), timestep, iteration))
            .map(|v| *v))
    }

    fn job_statuses_for_run(&self, run_name: &str) -> Result<Vec<JobMeta>> {
        let Some(order) = self.job_order.get(run_name) else {
            return Ok(Vec::new());
        };
        Ok(order
            .iter()
            .filter_map(|key| {
                self.job_status.get(key).map(|status| JobMeta {
                    run_name: key.0.clone(),
                    model_name: key.1.clone(),
                    timestep: key.2,
                    iteration: key.3,
                    status: *status,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Dtype;
    use crate::unit::Unit;
    use ndarray::array;

    fn sample_array() -> DataArray {
        let spec = crate::spec::Spec::new(
            "demand",
            vec!["region"],
            vec![("region", vec!["UK"])],
            Unit::Gwh,
            Dtype::F64,
            true,
        );
        DataArray::new(spec, array![42.0].into_dyn())
    }

    #[test]
    fn round_trips_scenario_data() {
        let store = MemoryStore::new();
        store
            .write_scenario_variant_data("population", "high", "count", &sample_array())
            .unwrap();
        let read = store.read_scenario_variant_data("population", "high", "count").unwrap();
        assert!(read.bit_equal(&sample_array()));
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_scenario_variant_data("x", "y", "z"),
            Err(SmifError::NotFound(_))
        ));
    }

    #[test]
    fn job_status_history_preserves_write_order() {
        let store = MemoryStore::new();
        for (ts, status) in [(2020, JobStatus::Done), (2025, JobStatus::Running)] {
            store
                .write_job_status(&JobMeta {
                    run_name: "run".into(),
                    model_name: "power".into(),
                    timestep: ts,
                    iteration: 0,
                    status,
                })
                .unwrap();
        }
        let history = store.job_statuses_for_run("run").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, JobStatus::Running);
    }
}
