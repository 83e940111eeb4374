//! The typed error taxonomy the core raises (spec §7).
//!
//! Every variant carries the structured context needed to act on it without
//! parsing a message, per SPEC_FULL.md §7. `ModelRunError` is the one seam
//! where an opaque sector-model failure is boxed into an [`anyhow::Error`],
//! the same way `peregrine` lets activity/operation bodies return
//! `anyhow::Result`.

use crate::model::ModelName;
use crate::spec::DimName;
use std::fmt;
use thiserror::Error;

/// A model invocation coordinate: which run, model, timestep, and
/// iteration a failure happened at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coordinate {
    pub run: String,
    pub model: ModelName,
    pub timestep: i64,
    pub iteration: u32,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run={} model={} timestep={} iteration={}",
            self.run, self.model, self.timestep, self.iteration
        )
    }
}

/// Which invariant from spec §3 was violated during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invariant {
    /// A sink input has no dependency satisfying it.
    UnsatisfiedInput { model: ModelName, input: String },
    /// A dependency's source output does not exist on the source model.
    MissingSourceOutput {
        source_model: ModelName,
        source_output: String,
    },
    /// Timesteps are not strictly increasing.
    NonMonotonicTimesteps { at_index: usize },
    /// A PREVIOUS edge feeds the first timestep with no initial condition.
    MissingInitialCondition { model: ModelName, input: String },
    /// A `simulate` body staged an output the model never declared.
    UndeclaredOutput { model: ModelName, output: String },
    /// A staged output's Spec does not match the model's declared Spec for it.
    OutputSpecMismatch { model: ModelName, output: String },
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invariant::UnsatisfiedInput { model, input } => {
                write!(f, "model `{model}` input `{input}` has no dependency")
            }
            Invariant::MissingSourceOutput {
                source_model,
                source_output,
            } => write!(
                f,
                "model `{source_model}` has no output `{source_output}`"
            ),
            Invariant::NonMonotonicTimesteps { at_index } => {
                write!(f, "timesteps are not strictly increasing at index {at_index}")
            }
            Invariant::MissingInitialCondition { model, input } => write!(
                f,
                "model `{model}` input `{input}` has a PREVIOUS dependency at the first \
                 timestep, but no initial condition is present in the store"
            ),
            Invariant::UndeclaredOutput { model, output } => {
                write!(f, "model `{model}` staged output `{output}` which it never declared")
            }
            Invariant::OutputSpecMismatch { model, output } => write!(
                f,
                "model `{model}` staged output `{output}` with a Spec that does not match its declared output Spec"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum SmifError {
    #[error("validation failed: {invariant}")]
    Validation { invariant: Invariant },

    #[error("circular dependency via CURRENT edges: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<ModelName> },

    #[error("missing data at {coordinate}: input `{input}`")]
    MissingData {
        coordinate: Coordinate,
        input: String,
    },

    #[error("could not convert `{dim}` from source spec to sink spec at {coordinate}: {reason}")]
    Conversion {
        coordinate: Coordinate,
        dim: DimName,
        reason: String,
    },

    #[error("model failed at {coordinate}: {source}")]
    ModelRun {
        coordinate: Coordinate,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "decision loop for timestep {timestep} did not converge within {max_iterations} \
         iterations; last relative deltas: {last_deltas:?}"
    )]
    Convergence {
        timestep: i64,
        max_iterations: u32,
        last_deltas: Vec<(String, f64)>,
    },

    #[error("key not found in store: {0}")]
    NotFound(String),
}

fn format_cycle(cycle: &[ModelName]) -> String {
    cycle
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, SmifError>;
