//! DecisionLoop: drives repeated scheduling within one timestep until the
//! decision module is satisfied (spec §4.6).
//!
//! Pre-specified and rule-based modules run the scheduler exactly once
//! per timestep. An iterating module reruns the scheduler, rechecking
//! its `convergence_variables` against the previous iteration's values
//! under the L-infinity norm of relative deltas, until it converges or
//! `max_iterations` is reached (spec §4.6, §9).

use crate::error::{Result, SmifError};
use crate::graph::DependencyGraph;
use crate::model::{DecisionModuleKind, ModelRun, SosModel};
use crate::scheduler::{JobScheduler, ScheduleReport};
use crate::store::{ResultKey, Store};
use std::collections::HashMap;
use tracing::info;

pub struct DecisionLoop<'a> {
    sos_model: &'a SosModel,
    graph: &'a DependencyGraph,
    store: &'a dyn Store,
    registry: &'a crate::adaptor::AdaptorRegistry,
    pool: &'a rayon::ThreadPool,
}

/// Per-timestep outcome: which iteration converged (or was the only one
/// run), and the full schedule report for each iteration attempted.
pub struct TimestepReport {
    pub timestep: i64,
    pub iterations_run: u32,
    pub reports: Vec<ScheduleReport>,
}

impl<'a> DecisionLoop<'a> {
    pub fn new(
        sos_model: &'a SosModel,
        graph: &'a DependencyGraph,
        store: &'a dyn Store,
        registry: &'a crate::adaptor::AdaptorRegistry,
        pool: &'a rayon::ThreadPool,
    ) -> Self {
        DecisionLoop {
            sos_model,
            graph,
            store,
            registry,
            pool,
        }
    }

    pub fn run_timestep(
        &self,
        run: &ModelRun,
        timesteps: &'a [i64],
        timestep_index: usize,
        previous_iteration: u32,
    ) -> Result<TimestepReport> {
        let scheduler = JobScheduler::new(self.sos_model, self.graph, self.store, self.registry, self.pool);
        let timestep = timesteps[timestep_index];

        match &run.decision_module.kind {
            DecisionModuleKind::PreSpecified | DecisionModuleKind::RuleBased => {
                let report = scheduler.run_timestep(
                    &run.name,
                    timesteps,
                    timestep_index,
                    0,
                    previous_iteration,
                    &run.scenario_variant_selections,
                    &run.narrative_variant_selections,
                )?;
                if !report.is_ok() {
                    return Err(first_failure(report));
                }
                Ok(TimestepReport {
                    timestep,
                    iterations_run: 1,
                    reports: vec![report],
                })
            }
            DecisionModuleKind::Iterating {
                max_iterations,
                relative_tolerance,
                absolute_tolerance,
                convergence_variables,
            } => {
                let mut reports = Vec::new();
                let mut previous: Option<HashMap<String, f64>> = None;

                for iteration in 0..*max_iterations {
                    let report = scheduler.run_timestep(
                        &run.name,
                        timesteps,
                        timestep_index,
                        iteration,
                        previous_iteration,
                        &run.scenario_variant_selections,
                        &run.narrative_variant_selections,
                    )?;
                    if !report.is_ok() {
                        return Err(first_failure(report));
                    }

                    let current = self.read_convergence_values(&run.name, timestep, iteration, convergence_variables)?;
                    reports.push(report);

                    if let Some(prev) = &previous {
                        let max_relative_delta = convergence_variables
                            .iter()
                            .map(|(m, v)| {
                                let key = format!("{m}::{v}");
                                let a = prev.get(&key).copied().unwrap_or(0.0);
                                let b = current.get(&key).copied().unwrap_or(0.0);
                                relative_delta(a, b, *absolute_tolerance)
                            })
                            .fold(0.0_f64, f64::max);

                        info!(
                            timestep,
                            iteration,
                            max_relative_delta,
                            "decision loop convergence check"
                        );

                        if max_relative_delta <= *relative_tolerance {
                            self.store.write_state(&run.name, &current)?;
                            return Ok(TimestepReport {
                                timestep,
                                iterations_run: iteration + 1,
                                reports,
                            });
                        }
                    }

                    self.store.write_state(&run.name, &current)?;
                    previous = Some(current);
                }

                let last_deltas = previous
                    .map(|current| {
                        convergence_variables
                            .iter()
                            .map(|(m, v)| {
                                let key = format!("{m}::{v}");
                                (key, current.get(&format!("{m}::{v}")).copied().unwrap_or(0.0))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Err(SmifError::Convergence {
                    timestep,
                    max_iterations: *max_iterations,
                    last_deltas,
                })
            }
        }
    }

    /// Reads each declared convergence variable's latest result for this
    /// `(timestep, iteration)`, keyed as `"model::variable"`.
    fn read_convergence_values(
        &self,
        run_name: &str,
        timestep: i64,
        iteration: u32,
        convergence_variables: &[(crate::model::ModelName, String)],
    ) -> Result<HashMap<String, f64>> {
        let mut values = HashMap::new();
        for (model, variable) in convergence_variables {
            let key = ResultKey {
                run_name: run_name.to_string(),
                model_name: model.as_str().to_string(),
                output_name: variable.clone(),
                timestep,
                iteration,
            };
            let data = self.store.read_results(&key)?;
            values.insert(format!("{model}::{variable}"), data.total());
        }
        Ok(values)
    }
}

/// `|a - b| / max(|a|, absolute_tolerance)`: a relative delta that falls
/// back to an absolute comparison near zero, so convergence variables
/// that legitimately settle at 0 don't force `max_iterations` every time
/// (spec §4.6's "L-infinity norm of relative deltas").
fn relative_delta(previous: f64, current: f64, absolute_tolerance: f64) -> f64 {
    let denom = previous.abs().max(absolute_tolerance);
    (current - previous).abs() / denom
}

fn first_failure(report: ScheduleReport) -> SmifError {
    report
        .failed
        .into_iter()
        .next()
        .map(|(_, e)| e)
        .unwrap_or_else(|| SmifError::NotFound("scheduler reported failure with no recorded error".into()))
}
