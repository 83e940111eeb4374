//! DataHandle: the only interface a [`crate::model::SectorModel`] sees
//! (spec §3, §4.2). Resolves an input/parameter name to a dependency,
//! fetches the upstream DataArray from the [`crate::store::Store`],
//! converts it to the requesting model's own Spec via the
//! [`crate::adaptor`] pipeline, and stamps every write with the
//! coordinate it was produced at.

use crate::adaptor::{self, AdaptorRegistry};
use crate::data_array::DataArray;
use crate::error::{Coordinate, Invariant, Result, SmifError};
use crate::model::{Dependency, ModelName, SosModel, TimestepOffset};
use crate::store::{ResultKey, Store};

/// A single per-job view into the run's data, scoped to one
/// `(model, timestep, iteration)` coordinate (spec §4.2).
pub struct DataHandle<'a> {
    store: &'a dyn Store,
    registry: &'a AdaptorRegistry,
    sos_model: &'a SosModel,
    run_name: String,
    model_name: ModelName,
    timesteps: &'a [i64],
    timestep_index: usize,
    iteration: u32,
    /// The iteration the previous timestep's decision loop converged at
    /// (or `0` at `timestep_index == 0`, where it is never read). A
    /// PREVIOUS dependency must read that timestep's canonical, final
    /// value, not iteration 0 of it (spec §4.3, §8.3).
    previous_iteration: u32,
    scenario_variant_selections: &'a std::collections::HashMap<String, String>,
    narrative_variant_selections: &'a std::collections::HashMap<String, String>,
    outputs: Vec<(String, DataArray)>,
}

impl<'a> DataHandle<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn Store,
        registry: &'a AdaptorRegistry,
        sos_model: &'a SosModel,
        run_name: String,
        model_name: ModelName,
        timesteps: &'a [i64],
        timestep_index: usize,
        iteration: u32,
        previous_iteration: u32,
        scenario_variant_selections: &'a std::collections::HashMap<String, String>,
        narrative_variant_selections: &'a std::collections::HashMap<String, String>,
    ) -> Self {
        DataHandle {
            store,
            registry,
            sos_model,
            run_name,
            model_name,
            timesteps,
            timestep_index,
            iteration,
            previous_iteration,
            scenario_variant_selections,
            narrative_variant_selections,
            outputs: Vec::new(),
        }
    }

    fn coordinate(&self) -> Coordinate {
        Coordinate {
            run: self.run_name.clone(),
            model: self.model_name.clone(),
            timestep: self.timesteps[self.timestep_index],
            iteration: self.iteration,
        }
    }

    /// Resolves `input_name` through its declared dependency, fetches the
    /// source data, and converts it to this model's own Spec for that
    /// input (spec §4.1, §4.2).
    pub fn get_data(&self, input_name: &str) -> Result<DataArray> {
        let model = self
            .sos_model
            .model(&self.model_name)
            .expect("DataHandle constructed for a model absent from its own SosModel");
        let sink_spec = model
            .spec
            .input(input_name)
            .unwrap_or_else(|| panic!("model `{}` has no declared input `{input_name}`", self.model_name))
            .clone();

        let deps = self.sos_model.dependencies_for(&self.model_name, input_name);
        let dep = deps.first().ok_or_else(|| {
            SmifError::MissingData {
                coordinate: self.coordinate(),
                input: input_name.to_string(),
            }
        })?;

        let raw = match dep {
            Dependency::Scenario(d) => {
                let variant = self
                    .scenario_variant_selections
                    .get(&d.scenario)
                    .ok_or_else(|| SmifError::MissingData {
                        coordinate: self.coordinate(),
                        input: input_name.to_string(),
                    })?;
                self.store
                    .read_scenario_variant_data(&d.scenario, variant, &d.variable)?
            }
            Dependency::Model(d) => {
                if matches!(d.offset, TimestepOffset::Previous) && self.timestep_index == 0 {
                    // No prior timestep exists yet: spec §3's "initial
                    // condition" stands in for the PREVIOUS edge's first read.
                    self.store
                        .read_model_parameter_default(d.source_model.as_str(), &format!("{}__initial", d.source_output))?
                } else {
                    let source_timestep_index = match d.offset {
                        TimestepOffset::Current => self.timestep_index,
                        TimestepOffset::Previous => self.timestep_index - 1,
                    };
                    let key = ResultKey {
                        run_name: self.run_name.clone(),
                        model_name: d.source_model.as_str().to_string(),
                        output_name: d.source_output.clone(),
                        timestep: self.timesteps[source_timestep_index],
                        iteration: if matches!(d.offset, TimestepOffset::Previous) {
                            self.previous_iteration
                        } else {
                            self.iteration
                        },
                    };
                    self.store.read_results(&key)?
                }
            }
        };

        if raw.spec() == &sink_spec {
            return Ok(raw);
        }
        adaptor::convert(&raw, &sink_spec, self.registry, &self.coordinate())
    }

    /// Like [`DataHandle::get_data`] but for a parameter: reads the
    /// model's own default unless a narrative overrides it for the
    /// run's active narrative variant selections (spec §3, §6). The last
    /// narrative declared with a matching override and an active
    /// selection wins, mirroring how `scenario_variant_selections` picks
    /// one variant per scenario.
    pub fn get_parameter(&self, parameter_name: &str) -> Result<DataArray> {
        for narrative in self.sos_model.narratives.iter().rev() {
            let overrides = narrative
                .overrides
                .iter()
                .any(|(m, p)| m == &self.model_name && p == parameter_name);
            if !overrides {
                continue;
            }
            if let Some(variant) = self.narrative_variant_selections.get(&narrative.name) {
                return self.store.read_narrative_variant_data(
                    &narrative.name,
                    variant,
                    self.model_name.as_str(),
                    parameter_name,
                );
            }
        }
        self.store
            .read_model_parameter_default(self.model_name.as_str(), parameter_name)
    }

    /// Stages a computed output under this coordinate. Not written to the
    /// store until [`DataHandle::commit`] (spec §4.2: "SectorModel
    /// simulate bodies stage their outputs; the runner persists them only
    /// after `simulate` returns without error"). Validates that
    /// `output_name` is one of the model's declared outputs and that
    /// `data`'s Spec matches the declared one exactly (spec §4.3).
    pub fn set_results(&mut self, output_name: &str, data: DataArray) -> Result<()> {
        let model = self
            .sos_model
            .model(&self.model_name)
            .expect("DataHandle constructed for a model absent from its own SosModel");
        let declared = model.spec.output(output_name).ok_or_else(|| SmifError::Validation {
            invariant: Invariant::UndeclaredOutput {
                model: self.model_name.clone(),
                output: output_name.to_string(),
            },
        })?;
        if data.spec() != declared {
            return Err(SmifError::Validation {
                invariant: Invariant::OutputSpecMismatch {
                    model: self.model_name.clone(),
                    output: output_name.to_string(),
                },
            });
        }
        self.outputs.push((output_name.to_string(), data));
        Ok(())
    }

    /// The previous timestep's persisted value for one of *this model's
    /// own* outputs, used by sector models implementing stateful
    /// behavior without declaring a formal `Previous` dependency on
    /// themselves (spec §4.2).
    pub fn get_previous_timestep_data(&self, output_name: &str) -> Result<DataArray> {
        if self.timestep_index == 0 {
            return self.get_base_timestep_data(output_name);
        }
        let key = ResultKey {
            run_name: self.run_name.clone(),
            model_name: self.model_name.as_str().to_string(),
            output_name: output_name.to_string(),
            timestep: self.timesteps[self.timestep_index - 1],
            iteration: self.previous_iteration,
        };
        self.store.read_results(&key)
    }

    /// The initial condition for `output_name` at the run's first
    /// timestep, used when a `Previous` dependency or self-reference has
    /// no prior timestep to read (spec §3's "initial condition").
    pub fn get_base_timestep_data(&self, output_name: &str) -> Result<DataArray> {
        self.store
            .read_model_parameter_default(self.model_name.as_str(), &format!("{output_name}__initial"))
    }

    pub fn timestep(&self) -> i64 {
        self.timesteps[self.timestep_index]
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Persists every staged output and returns their keys, called by the
    /// scheduler after `simulate` returns `Ok(())`.
    pub(crate) fn commit(self) -> Result<Vec<ResultKey>> {
        let mut keys = Vec::with_capacity(self.outputs.len());
        for (output_name, data) in self.outputs {
            let key = ResultKey {
                run_name: self.run_name.clone(),
                model_name: self.model_name.as_str().to_string(),
                output_name,
                timestep: self.timesteps[self.timestep_index],
                iteration: self.iteration,
            };
            self.store.write_results(&key, &data)?;
            keys.push(key);
        }
        Ok(keys)
    }
}
