//! # smif
//!
//! An orchestration core for System-of-Systems (SoS) simulation: a set of
//! independently developed sector models, coupled through declared data
//! dependencies, run together over a shared sequence of timesteps.
//!
//! ## Concepts
//!
//! A [`Spec`][spec::Spec] describes one variable: its dimensions,
//! coordinate labels along each dimension, physical unit, and dtype. A
//! [`DataArray`][data_array::DataArray] is the n-dimensional value bound
//! to a Spec; it is the only currency passed between models. When a
//! sink model's declared Spec for an input differs from its source's
//! (different regions, different time intervals, a different but
//! convertible unit), the [`adaptor`] module's registered overlap tables
//! convert one into the other.
//!
//! A [`Model`][model::Model] is either a `ScenarioModel` (its outputs
//! come straight from persisted scenario data) or a `SectorModel` (user
//! code implementing [`SectorModel`][model::SectorModel]). A
//! [`SosModel`][model::SosModel] couples a named set of models with the
//! dependencies wiring them together; a dependency either reads a
//! source's current-timestep output or its previous-timestep one (spec
//! terminology: CURRENT vs. PREVIOUS). A [`ModelRun`][model::ModelRun]
//! selects a SosModel's scenario/narrative variants and the sequence of
//! timesteps to simulate, together with a decision module describing how
//! many passes to make per timestep.
//!
//! [`DependencyGraph`][graph::DependencyGraph] builds the CURRENT-edge
//! DAG for a SosModel and exposes a deterministic topological order plus
//! cycle rejection. [`JobScheduler`][scheduler::JobScheduler] executes
//! one timestep/iteration across that DAG with as much parallelism as
//! independent branches allow. [`DecisionLoop`][decision::DecisionLoop]
//! drives the scheduler once per timestep for pre-specified/rule-based
//! runs, or repeatedly until convergence for iterating runs.
//! [`ModelRunner`][runner::ModelRunner] validates a SosModel/ModelRun
//! pair against every structural invariant and then drives the full run.
//!
//! All of the above read and write through a [`Store`][store::Store]:
//! an in-memory [`MemoryStore`][store::MemoryStore] for tests and small
//! runs, or a [`FileStore`][store::FileStore] for persisted, inspectable
//! results.
//!
//! ## Quick-start
//!
//! ```no_run
//! use smif::model::{Model, ModelKind, ModelSpec, ModelName, SosModel, ScenarioSource};
//! use smif::store::MemoryStore;
//! use smif::adaptor::AdaptorRegistry;
//! use smif::runner::ModelRunner;
//! use std::collections::HashMap;
//!
//! # fn main() -> anyhow::Result<()> {
//! let sos_model = SosModel {
//!     name: "energy_water".into(),
//!     models: HashMap::new(),
//!     scenario_dependencies: vec![],
//!     model_dependencies: vec![],
//!     narratives: vec![],
//! };
//! let store = MemoryStore::new();
//! let registry = AdaptorRegistry::new();
//! let runner = ModelRunner::new(&sos_model, &store, &registry, None)?;
//! # Ok(())
//! # }
//! ```

pub mod adaptor;
pub mod data_array;
pub mod data_handle;
pub mod decision;
pub mod error;
pub mod graph;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod spec;
pub mod store;
pub mod unit;

pub use data_array::DataArray;
pub use error::{Result, SmifError};
pub use model::{Model, ModelRun, SectorModel, SosModel};
pub use runner::ModelRunner;
pub use spec::Spec;
pub use store::Store;
