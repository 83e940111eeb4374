//! Model, SosModel, and ModelRun: the structural records of spec §3.
//!
//! "Dynamic typing to sum types" (spec §9): a dependency is either a
//! [`ScenarioDependency`] or a [`ModelDependency`] tagged with its
//! [`TimestepOffset`], never a single polymorphic dependency object.

use crate::data_handle::DataHandle;
use crate::spec::Spec;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A model's name, used as the key everywhere a model is referenced:
/// dependencies, the dependency graph, job status, the Store's `data` and
/// `meta` namespaces.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelName(pub String);

impl ModelName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelName {
    fn from(s: &str) -> Self {
        ModelName(s.to_string())
    }
}

impl From<String> for ModelName {
    fn from(s: String) -> Self {
        ModelName(s)
    }
}

/// Whether a dependency reads the sink's current timestep or the source's
/// previous one. A `Previous` edge is exempt from cycle checks (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestepOffset {
    Current,
    Previous,
}

/// A dependency fed by a scenario's persisted data rather than another
/// model's output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioDependency {
    pub scenario: String,
    pub variable: String,
    pub sink_model: ModelName,
    pub sink_input: String,
}

/// A dependency fed by another model's output, at the current timestep or
/// lagged by one (spec §3: `(source_model, source_output, sink_model,
/// sink_input, timestep_offset)`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDependency {
    pub source_model: ModelName,
    pub source_output: String,
    pub sink_model: ModelName,
    pub sink_input: String,
    pub offset: TimestepOffset,
}

/// A model's inputs, outputs, and parameters (spec §3: "Model (abstract):
/// (name, inputs, outputs, parameters)").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: ModelName,
    pub inputs: Vec<Spec>,
    pub outputs: Vec<Spec>,
    pub parameters: Vec<Spec>,
}

impl ModelSpec {
    pub fn input(&self, name: &str) -> Option<&Spec> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Spec> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Spec> {
        self.parameters.iter().find(|s| s.name == name)
    }
}

/// User-authored sector model code. The core sees it only through this
/// contract (spec §1): `before_model_run` runs once per `ModelRun`,
/// `simulate` runs once per `(timestep, iteration)`.
pub trait SectorModel: Send + Sync {
    fn before_model_run(&self, _data_handle: &mut DataHandle) -> anyhow::Result<()> {
        Ok(())
    }

    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()>;
}

/// A `ScenarioModel` has no user code: it produces its declared outputs
/// straight from a scenario variant's persisted data (spec §3). The
/// engine drives it directly rather than calling through `SectorModel`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioSource {
    pub scenario: String,
    pub variant: String,
}

pub enum ModelKind {
    Scenario(ScenarioSource),
    Sector(Box<dyn SectorModel>),
}

impl std::fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Scenario(s) => f.debug_tuple("Scenario").field(s).finish(),
            ModelKind::Sector(_) => f.write_str("Sector(..)"),
        }
    }
}

/// A named, typed model in a [`SosModel`] (spec §3's `Model (abstract)`,
/// tagged by kind rather than subclassed: "Specs and Models are
/// structural records, not subclass hierarchies" - spec §9).
pub struct Model {
    pub spec: ModelSpec,
    pub kind: ModelKind,
}

impl Model {
    pub fn name(&self) -> &ModelName {
        &self.spec.name
    }

    pub fn is_scenario(&self) -> bool {
        matches!(self.kind, ModelKind::Scenario(_))
    }
}

/// A narrative overlay: the set of `(model, parameter)` pairs it is
/// allowed to override (spec §3, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Narrative {
    pub name: String,
    pub overrides: Vec<(ModelName, String)>,
}

/// A named collection of coupled models, scenarios, and narratives, with
/// the dependency list that wires them together (spec §3).
pub struct SosModel {
    pub name: String,
    pub models: HashMap<ModelName, Model>,
    pub scenario_dependencies: Vec<ScenarioDependency>,
    pub model_dependencies: Vec<ModelDependency>,
    pub narratives: Vec<Narrative>,
}

impl SosModel {
    pub fn model(&self, name: &ModelName) -> Option<&Model> {
        self.models.get(name)
    }

    /// All dependencies (scenario and inter-model) feeding `sink_model`'s
    /// `sink_input`, in the order they were declared. Spec §3 requires
    /// exactly one; validation (not this accessor) enforces that.
    pub fn dependencies_for(
        &self,
        sink_model: &ModelName,
        sink_input: &str,
    ) -> Vec<Dependency<'_>> {
        let mut found = Vec::new();
        for d in &self.scenario_dependencies {
            if &d.sink_model == sink_model && d.sink_input == sink_input {
                found.push(Dependency::Scenario(d));
            }
        }
        for d in &self.model_dependencies {
            if &d.sink_model == sink_model && d.sink_input == sink_input {
                found.push(Dependency::Model(d));
            }
        }
        found
    }
}

/// A borrowed view over either dependency kind, used by validation and by
/// [`crate::data_handle::DataHandle`].
#[derive(Clone, Copy, Debug)]
pub enum Dependency<'a> {
    Scenario(&'a ScenarioDependency),
    Model(&'a ModelDependency),
}

/// A decision module's policy (spec §4.6, §9). Pre-specified and
/// rule-based modules run exactly one iteration per timestep; an
/// iterating module repeats until convergence or `max_iterations`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DecisionModuleKind {
    PreSpecified,
    RuleBased,
    Iterating {
        max_iterations: u32,
        relative_tolerance: f64,
        absolute_tolerance: f64,
        convergence_variables: Vec<(ModelName, String)>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionModuleConfig {
    pub module_name: String,
    pub kind: DecisionModuleKind,
}

/// `(name, sos_model, timesteps, scenario/narrative variant selections,
/// decision_module, strategies)` (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRun {
    pub name: String,
    pub sos_model: String,
    pub timesteps: Vec<i64>,
    pub scenario_variant_selections: HashMap<String, String>,
    pub narrative_variant_selections: HashMap<String, String>,
    pub decision_module: DecisionModuleConfig,
    /// Opaque to the core (spec §1: strategies are an external concern);
    /// carried only so the Store can persist and the CLI can report them.
    pub strategies: Vec<String>,
}
