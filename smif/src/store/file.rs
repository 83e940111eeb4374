//! File-backed `Store`: one file per key, `bincode` for numerical `data`
//! records (results, scenario data, parameter defaults, decision state),
//! `serde_json` for `config` and `meta` records so they stay
//! human-inspectable on disk (spec §5, SPEC_FULL.md §5 expansion).

use super::{ConfigKind, JobMeta, JobStatus, ResultKey, Store};
use crate::data_array::DataArray;
use crate::error::{Result, SmifError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct FileStore {
    root: PathBuf,
    /// Serializes writes to the same run's job-status log file; reads of
    /// unrelated keys never contend on this.
    job_log_lock: RwLock<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        for dir in ["config/sos_model", "config/model_run", "config/scenario", "config/narrative",
            "data/scenario", "data/parameter_default", "data/narrative", "data/results", "data/state", "meta/jobs"]
        {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(FileStore {
            root,
            job_log_lock: RwLock::new(()),
        })
    }

    fn config_path(&self, kind: ConfigKind, name: &str) -> PathBuf {
        self.root.join("config").join(kind.dir()).join(format!("{}.json", sanitize(name)))
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| SmifError::NotFound(e.to_string()))?;
        fs::write(path, bytes).map_err(|e| SmifError::NotFound(e.to_string()))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path, not_found: impl FnOnce() -> String) -> Result<T> {
        let bytes = fs::read(path).map_err(|_| SmifError::NotFound(not_found()))?;
        serde_json::from_slice(&bytes).map_err(|e| SmifError::NotFound(e.to_string()))
    }

    fn write_bincode<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| SmifError::NotFound(e.to_string()))?;
        fs::write(path, bytes).map_err(|e| SmifError::NotFound(e.to_string()))
    }

    fn read_bincode<T: serde::de::DeserializeOwned>(&self, path: &Path, not_found: impl FnOnce() -> String) -> Result<T> {
        let bytes = fs::read(path).map_err(|_| SmifError::NotFound(not_found()))?;
        let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| SmifError::NotFound(e.to_string()))?;
        Ok(value)
    }
}

/// Replaces path-hostile characters so a model/scenario/variant name can't
/// escape its directory.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl Store for FileStore {
    fn write_config(&self, kind: ConfigKind, name: &str, value: serde_json::Value) -> Result<()> {
        self.write_json(&self.config_path(kind, name), &value)
    }

    fn read_config(&self, kind: ConfigKind, name: &str) -> Result<serde_json::Value> {
        self.read_json(&self.config_path(kind, name), || format!("config {}/{name}", kind.dir()))
    }

    fn list_configs(&self, kind: ConfigKind) -> Result<Vec<String>> {
        let dir = self.root.join("config").join(kind.dir());
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| SmifError::NotFound(e.to_string()))? {
            let entry = entry.map_err(|e| SmifError::NotFound(e.to_string()))?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_config(&self, kind: ConfigKind, name: &str) -> Result<()> {
        let path = self.config_path(kind, name);
        fs::remove_file(&path).map_err(|e| SmifError::NotFound(e.to_string()))
    }

    fn write_scenario_variant_data(&self, scenario: &str, variant: &str, variable: &str, data: &DataArray) -> Result<()> {
        let path = self.root.join("data/scenario").join(format!(
            "{}__{}__{}.bin",
            sanitize(scenario), sanitize(variant), sanitize(variable)
        ));
        self.write_bincode(&path, data)
    }

    fn read_scenario_variant_data(&self, scenario: &str, variant: &str, variable: &str) -> Result<DataArray> {
        let path = self.root.join("data/scenario").join(format!(
            "{}__{}__{}.bin",
            sanitize(scenario), sanitize(variant), sanitize(variable)
        ));
        self.read_bincode(&path, || format!("scenario data {scenario}/{variant}/{variable}"))
    }

    fn write_model_parameter_default(&self, model: &str, parameter: &str, data: &DataArray) -> Result<()> {
        let path = self
            .root
            .join("data/parameter_default")
            .join(format!("{}__{}.bin", sanitize(model), sanitize(parameter)));
        self.write_bincode(&path, data)
    }

    fn read_model_parameter_default(&self, model: &str, parameter: &str) -> Result<DataArray> {
        let path = self
            .root
            .join("data/parameter_default")
            .join(format!("{}__{}.bin", sanitize(model), sanitize(parameter)));
        self.read_bincode(&path, || format!("parameter default {model}/{parameter}"))
    }

    fn write_narrative_variant_data(&self, narrative: &str, variant: &str, model: &str, parameter: &str, data: &DataArray) -> Result<()> {
        let path = self.root.join("data/narrative").join(format!(
            "{}__{}__{}__{}.bin",
            sanitize(narrative), sanitize(variant), sanitize(model), sanitize(parameter)
        ));
        self.write_bincode(&path, data)
    }

    fn read_narrative_variant_data(&self, narrative: &str, variant: &str, model: &str, parameter: &str) -> Result<DataArray> {
        let path = self.root.join("data/narrative").join(format!(
            "{}__{}__{}__{}.bin",
            sanitize(narrative), sanitize(variant), sanitize(model), sanitize(parameter)
        ));
        self.read_bincode(&path, || format!("narrative data {narrative}/{variant}/{model}/{parameter}"))
    }

    fn write_results(&self, key: &ResultKey, data: &DataArray) -> Result<()> {
        let path = self.result_path(key);
        self.write_bincode(&path, data)
    }

    fn read_results(&self, key: &ResultKey) -> Result<DataArray> {
        let path = self.result_path(key);
        self.read_bincode(&path, || format!("results {key:?}"))
    }

    fn available_results(&self, run_name: &str) -> Result<Vec<ResultKey>> {
        let dir = self.root.join("data/results").join(sanitize(run_name));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| SmifError::NotFound(e.to_string()))? {
            let entry = entry.map_err(|e| SmifError::NotFound(e.to_string()))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Some(key) = parse_result_key(run_name, name) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn write_state(&self, run_name: &str, state: &HashMap<String, f64>) -> Result<()> {
        let path = self.root.join("data/state").join(format!("{}.bin", sanitize(run_name)));
        self.write_bincode(&path, state)
    }

    fn read_state(&self, run_name: &str) -> Result<HashMap<String, f64>> {
        let path = self.root.join("data/state").join(format!("{}.bin", sanitize(run_name)));
        if !path.exists() {
            return Ok(HashMap::new());
        }
        self.read_bincode(&path, || format!("state {run_name}"))
    }

    fn write_job_status(&self, meta: &JobMeta) -> Result<()> {
        let _guard = self.job_log_lock.write().unwrap();
        let path = self.root.join("meta/jobs").join(format!("{}.jsonl", sanitize(&meta.run_name)));
        let line = serde_json::to_string(meta).map_err(|e| SmifError::NotFound(e.to_string()))?;
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SmifError::NotFound(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| SmifError::NotFound(e.to_string()))
    }

    fn read_job_status(&self, run_name: &str, model_name: &str, timestep: i64, iteration: u32) -> Result<Option<JobStatus>> {
        Ok(self
            .job_statuses_for_run(run_name)?
            .into_iter()
            .filter(|m| m.model_name == model_name && m.timestep == timestep && m.iteration == iteration)
            .next_back()
            .map(|m| m.status))
    }

    fn job_statuses_for_run(&self, run_name: &str) -> Result<Vec<JobMeta>> {
        let _guard = self.job_log_lock.read().unwrap();
        let path = self.root.join("meta/jobs").join(format!("{}.jsonl", sanitize(run_name)));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| SmifError::NotFound(e.to_string()))?;
        content
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| SmifError::NotFound(e.to_string())))
            .collect()
    }
}

fn parse_result_key(run_name: &str, stem: &str) -> Option<ResultKey> {
    let mut parts = stem.splitn(4, "__");
    let model_name = parts.next()?.to_string();
    let output_name = parts.next()?.to_string();
    let timestep: i64 = parts.next()?.parse().ok()?;
    let iteration: u32 = parts.next()?.parse().ok()?;
    Some(ResultKey {
        run_name: run_name.to_string(),
        model_name,
        output_name,
        timestep,
        iteration,
    })
}

impl FileStore {
    fn result_path(&self, key: &ResultKey) -> PathBuf {
        let dir = self.root.join("data/results").join(sanitize(&key.run_name));
        let _ = fs::create_dir_all(&dir);
        dir.join(format!(
            "{}__{}__{}__{}.bin",
            sanitize(&key.model_name), sanitize(&key.output_name), key.timestep, key.iteration
        ))
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
        DataArray::new(spec, array![7.0].into_dyn())
    }

    #[test]
    fn round_trips_results_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key = ResultKey {
            run_name: "baseline".into(),
            model_name: "power".into(),
            output_name: "demand".into(),
            timestep: 2020,
            iteration: 0,
        };
        store.write_results(&key, &sample_array()).unwrap();
        let read = store.read_results(&key).unwrap();
        assert!(read.bit_equal(&sample_array()));
        assert_eq!(store.available_results("baseline").unwrap().len(), 1);
    }

    #[test]
    fn job_status_appends_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Done] {
            store
                .write_job_status(&JobMeta {
                    run_name: "baseline".into(),
                    model_name: "power".into(),
                    timestep: 2020,
                    iteration: 0,
                    status,
                })
                .unwrap();
        }
        assert_eq!(
            store.read_job_status("baseline", "power", 2020, 0).unwrap(),
            Some(JobStatus::Done)
        );
    }
}
