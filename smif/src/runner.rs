//! ModelRunner: validates a `(SosModel, ModelRun)` pair against every
//! invariant in spec §3, then drives the [`DecisionLoop`] once per
//! timestep (spec §4).

use crate::adaptor::AdaptorRegistry;
use crate::error::{Invariant, Result, SmifError};
use crate::graph::DependencyGraph;
use crate::model::{Dependency, ModelRun, SosModel, TimestepOffset};
use crate::store::Store;
use tracing::info;

pub struct RunReport {
    pub run_name: String,
    pub timesteps: Vec<crate::decision::TimestepReport>,
}

pub struct ModelRunner<'a> {
    sos_model: &'a SosModel,
    store: &'a dyn Store,
    registry: &'a AdaptorRegistry,
    pool: rayon::ThreadPool,
}

impl<'a> ModelRunner<'a> {
    /// Builds a runner with a bounded thread pool (spec §4.5's "the
    /// scheduler must not spawn unbounded OS threads"; defaults to the
    /// number of available cores if `threads` is `None`).
    pub fn new(sos_model: &'a SosModel, store: &'a dyn Store, registry: &'a AdaptorRegistry, threads: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| SmifError::NotFound(format!("could not build thread pool: {e}")))?;
        Ok(ModelRunner {
            sos_model,
            store,
            registry,
            pool,
        })
    }

    /// Validates every invariant in spec §3, returning the first
    /// violation found. Called automatically by [`ModelRunner::run`];
    /// exposed separately so callers can validate configuration before
    /// committing to a (potentially long) run.
    pub fn validate(&self, run: &ModelRun) -> Result<()> {
        if run.timesteps.windows(2).any(|w| w[0] >= w[1]) {
            let at_index = run
                .timesteps
                .windows(2)
                .position(|w| w[0] >= w[1])
                .unwrap_or(0)
                + 1;
            return Err(SmifError::Validation {
                invariant: Invariant::NonMonotonicTimesteps { at_index },
            });
        }

        for model in self.sos_model.models.values() {
            for input in &model.spec.inputs {
                let deps = self.sos_model.dependencies_for(model.name(), &input.name);
                if deps.is_empty() {
                    return Err(SmifError::Validation {
                        invariant: Invariant::UnsatisfiedInput {
                            model: model.name().clone(),
                            input: input.name.clone(),
                        },
                    });
                }
                for dep in &deps {
                    if let Dependency::Model(d) = dep {
                        let source = self.sos_model.model(&d.source_model).ok_or_else(|| SmifError::Validation {
                            invariant: Invariant::MissingSourceOutput {
                                source_model: d.source_model.clone(),
                                source_output: d.source_output.clone(),
                            },
                        })?;
                        if source.spec.output(&d.source_output).is_none() {
                            return Err(SmifError::Validation {
                                invariant: Invariant::MissingSourceOutput {
                                    source_model: d.source_model.clone(),
                                    source_output: d.source_output.clone(),
                                },
                            });
                        }
                        if matches!(d.offset, TimestepOffset::Previous) {
                            let has_initial = self
                                .store
                                .read_model_parameter_default(d.source_model.as_str(), &format!("{}__initial", d.source_output))
                                .is_ok();
                            if !has_initial {
                                return Err(SmifError::Validation {
                                    invariant: Invariant::MissingInitialCondition {
                                        model: model.name().clone(),
                                        input: input.name.clone(),
                                    },
                                });
                            }
                        }
                    }
                }
            }
        }

        // Building the graph re-verifies the CURRENT-edge acyclicity
        // invariant (spec §3); propagate its error directly.
        DependencyGraph::build(self.sos_model)?;

        Ok(())
    }

    /// Validates, builds the dependency graph once, and runs every
    /// timestep in order through a [`crate::decision::DecisionLoop`]
    /// (spec §4.4: "a ModelRun simulates its timesteps strictly in
    /// order; within a timestep, independent models may run
    /// concurrently").
    pub fn run(&self, run: &ModelRun) -> Result<RunReport> {
        self.validate(run)?;
        let graph = DependencyGraph::build(self.sos_model)?;
        let decision_loop = crate::decision::DecisionLoop::new(self.sos_model, &graph, self.store, self.registry, &self.pool);

        info!(run = %run.name, timesteps = run.timesteps.len(), "starting model run");

        let mut timestep_reports = Vec::with_capacity(run.timesteps.len());
        let mut previous_iteration: u32 = 0;
        for index in 0..run.timesteps.len() {
            let report = decision_loop.run_timestep(run, &run.timesteps, index, previous_iteration)?;
            info!(
                run = %run.name,
                timestep = report.timestep,
                iterations = report.iterations_run,
                "timestep complete"
            );
            previous_iteration = report.iterations_run - 1;
            timestep_reports.push(report);
        }

        Ok(RunReport {
            run_name: run.name.clone(),
            timesteps: timestep_reports,
        })
    }
}
