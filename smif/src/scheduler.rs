//! JobScheduler: runs one timestep/iteration's jobs with as much
//! parallelism as the [`crate::graph::DependencyGraph`] allows (spec
//! §4.3, §4.5), the same way `peregrine`'s `Plan::view` drives a
//! `rayon::scope` gated by a DAG, except gated here by a DashMap of
//! [`crate::store::JobStatus`] instead of continuation channels.
//!
//! Dispatch runs wave by wave over [`crate::graph::DependencyGraph::layers`]:
//! every model in a layer has all of its CURRENT-edge predecessors in
//! strictly earlier layers, so by the time a layer starts, every
//! predecessor's status is already resolved. That makes the ready check a
//! plain synchronous read before `scope.spawn`, never a loop inside one -
//! a rayon worker parked in a spin loop waiting on a task the pool has no
//! free worker left to run is a deadlock, not a slowdown.

use crate::data_handle::DataHandle;
use crate::error::{Coordinate, Result, SmifError};
use crate::model::{ModelKind, ModelName, SosModel};
use crate::store::{JobMeta, JobStatus, Store};
use crate::adaptor::AdaptorRegistry;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The outcome of scheduling one timestep/iteration across all models.
pub struct ScheduleReport {
    pub succeeded: Vec<ModelName>,
    pub skipped: Vec<ModelName>,
    pub failed: Vec<(ModelName, SmifError)>,
}

impl ScheduleReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Executes one `(timestep, iteration)` across a `SosModel`'s models in
/// dependency order, parallelizing independent branches.
pub struct JobScheduler<'a> {
    sos_model: &'a SosModel,
    graph: &'a crate::graph::DependencyGraph,
    store: &'a dyn Store,
    registry: &'a AdaptorRegistry,
    pool: &'a rayon::ThreadPool,
}

impl<'a> JobScheduler<'a> {
    pub fn new(
        sos_model: &'a SosModel,
        graph: &'a crate::graph::DependencyGraph,
        store: &'a dyn Store,
        registry: &'a AdaptorRegistry,
        pool: &'a rayon::ThreadPool,
    ) -> Self {
        JobScheduler {
            sos_model,
            graph,
            store,
            registry,
            pool,
        }
    }

    /// Runs every model once for `(run_name, timesteps, timestep_index,
    /// iteration)`. Scenario models are resolved immediately (they have
    /// no `simulate` body to call); sector models run layer by layer via
    /// `rayon::scope`, one barrier per layer of
    /// [`crate::graph::DependencyGraph::layers`]. A job whose predecessor
    /// failed or was skipped is itself marked `Skipped` without ever being
    /// spawned, never retried (spec §4.5). `previous_iteration` is the
    /// iteration the prior timestep's decision loop converged at, read by
    /// PREVIOUS dependencies (spec §4.3, §8.3).
    #[allow(clippy::too_many_arguments)]
    pub fn run_timestep(
        &self,
        run_name: &str,
        timesteps: &'a [i64],
        timestep_index: usize,
        iteration: u32,
        previous_iteration: u32,
        scenario_variant_selections: &'a HashMap<String, String>,
        narrative_variant_selections: &'a HashMap<String, String>,
    ) -> Result<ScheduleReport> {
        let status: DashMap<ModelName, JobStatus> = DashMap::new();
        for name in self.sos_model.models.keys() {
            status.insert(name.clone(), JobStatus::Pending);
        }
        let failures: SegQueue<(ModelName, SmifError)> = SegQueue::new();
        let succeeded: SegQueue<ModelName> = SegQueue::new();
        let skipped: SegQueue<ModelName> = SegQueue::new();

        for layer in self.graph.layers() {
            self.pool.install(|| {
                rayon::scope(|scope| {
                    for name in layer {
                        self.spawn_job(
                            scope,
                            name,
                            &status,
                            &failures,
                            &succeeded,
                            &skipped,
                            run_name,
                            timesteps,
                            timestep_index,
                            iteration,
                            previous_iteration,
                            scenario_variant_selections,
                            narrative_variant_selections,
                        );
                    }
                });
            });
        }

        Ok(ScheduleReport {
            succeeded: drain(succeeded),
            skipped: drain(skipped),
            failed: drain(failures),
        })
    }

    /// Checks `name`'s predecessor statuses synchronously (all of them
    /// belong to strictly earlier layers, already resolved by the time
    /// this is called) and either marks the job `Skipped` directly or
    /// spawns it onto the scope.
    #[allow(clippy::too_many_arguments)]
    fn spawn_job<'scope>(
        &'scope self,
        scope: &rayon::Scope<'scope>,
        name: ModelName,
        status: &'scope DashMap<ModelName, JobStatus>,
        failures: &'scope SegQueue<(ModelName, SmifError)>,
        succeeded: &'scope SegQueue<ModelName>,
        skipped: &'scope SegQueue<ModelName>,
        run_name: &'scope str,
        timesteps: &'scope [i64],
        timestep_index: usize,
        iteration: u32,
        previous_iteration: u32,
        scenario_variant_selections: &'scope HashMap<String, String>,
        narrative_variant_selections: &'scope HashMap<String, String>,
    ) {
        let any_bad = self.graph.predecessors(&name).iter().any(|p| {
            matches!(
                status.get(p).map(|s| *s),
                Some(JobStatus::Failed) | Some(JobStatus::Skipped)
            )
        });
        if any_bad {
            status.insert(name.clone(), JobStatus::Skipped);
            let _ = self.store.write_job_status(&JobMeta {
                run_name: run_name.to_string(),
                model_name: name.as_str().to_string(),
                timestep: timesteps[timestep_index],
                iteration,
                status: JobStatus::Skipped,
            });
            skipped.push(name);
            return;
        }

        scope.spawn(move |_scope| {
            status.insert(name.clone(), JobStatus::Running);
            let coordinate = Coordinate {
                run: run_name.to_string(),
                model: name.clone(),
                timestep: timesteps[timestep_index],
                iteration,
            };

            let result = self.run_one(
                &name,
                run_name,
                timesteps,
                timestep_index,
                iteration,
                previous_iteration,
                scenario_variant_selections,
                narrative_variant_selections,
            );

            match result {
                Ok(()) => {
                    debug!(%coordinate, "job completed");
                    status.insert(name.clone(), JobStatus::Done);
                    let _ = self.store.write_job_status(&JobMeta {
                        run_name: run_name.to_string(),
                        model_name: name.as_str().to_string(),
                        timestep: timesteps[timestep_index],
                        iteration,
                        status: JobStatus::Done,
                    });
                    succeeded.push(name);
                }
                Err(e) => {
                    warn!(%coordinate, error = %e, "job failed");
                    status.insert(name.clone(), JobStatus::Failed);
                    let _ = self.store.write_job_status(&JobMeta {
                        run_name: run_name.to_string(),
                        model_name: name.as_str().to_string(),
                        timestep: timesteps[timestep_index],
                        iteration,
                        status: JobStatus::Failed,
                    });
                    failures.push((name, e));
                }
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn run_one(
        &self,
        name: &ModelName,
        run_name: &str,
        timesteps: &[i64],
        timestep_index: usize,
        iteration: u32,
        previous_iteration: u32,
        scenario_variant_selections: &HashMap<String, String>,
        narrative_variant_selections: &HashMap<String, String>,
    ) -> Result<()> {
        let model = self
            .sos_model
            .model(name)
            .expect("scheduler only iterates models present in the SosModel");

        match &model.kind {
            ModelKind::Scenario(_) => Ok(()),
            ModelKind::Sector(sector) => {
                let mut handle = DataHandle::new(
                    self.store,
                    self.registry,
                    self.sos_model,
                    run_name.to_string(),
                    name.clone(),
                    timesteps,
                    timestep_index,
                    iteration,
                    previous_iteration,
                    scenario_variant_selections,
                    narrative_variant_selections,
                );
                sector.simulate(&mut handle).map_err(|source| SmifError::ModelRun {
                    coordinate: Coordinate {
                        run: run_name.to_string(),
                        model: name.clone(),
                        timestep: timesteps[timestep_index],
                        iteration,
                    },
                    source,
                })?;
                handle.commit()?;
                Ok(())
            }
        }
    }
}

fn drain<T>(queue: SegQueue<T>) -> Vec<T> {
    let mut v = Vec::new();
    while let Some(item) = queue.pop() {
        v.push(item);
    }
    v
}
