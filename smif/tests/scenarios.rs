//! End-to-end scenarios S1-S6 from spec §8, run against the public API:
//! `ModelRunner` over a `MemoryStore`, `SosModel`, and `ModelRun`.

use ndarray::array;
use smif::adaptor::{AdaptorRegistry, Overlap};
use smif::data_array::DataArray;
use smif::data_handle::DataHandle;
use smif::error::SmifError;
use smif::model::{
    DecisionModuleConfig, DecisionModuleKind, Model, ModelDependency, ModelKind, ModelName, ModelSpec, ModelRun,
    SosModel, TimestepOffset,
};
use smif::runner::ModelRunner;
use smif::spec::{Dtype, Spec};
use smif::store::{MemoryStore, ResultKey, Store};
use smif::unit::Unit;
use std::collections::HashMap;

/// Emits a fixed DataArray every call, ignoring inputs entirely. Stands
/// in for `gen` in S1-S3, where only the output matters.
struct ConstantModel {
    output_name: String,
    spec: Spec,
    values: Vec<f64>,
}

impl smif::model::SectorModel for ConstantModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        data_handle.set_results(
            &self.output_name,
            DataArray::new(
                self.spec.clone(),
                ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&self.spec.shape()), self.values.clone())?,
            ),
        )?;
        Ok(())
    }
}

/// Reads `input_name` and republishes it unchanged under `output_name`.
/// `get_data` already converts to the model's own declared Spec, so
/// `consume` always sees its own Spec regardless of what `gen` emitted.
struct PassthroughModel {
    input_name: String,
    output_name: String,
}

impl smif::model::SectorModel for PassthroughModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        let data = data_handle.get_data(&self.input_name)?;
        data_handle.set_results(&self.output_name, DataArray::new(data.spec().clone(), data.values().clone()))?;
        Ok(())
    }
}

/// Subtracts a fixed amount from its own lagged output, used for S4.
struct DrawdownModel {
    input_name: String,
    output_name: String,
    drawdown: f64,
}

impl smif::model::SectorModel for DrawdownModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        let previous = data_handle.get_data(&self.input_name)?;
        let next_value = previous.total() - self.drawdown;
        data_handle.set_results(&self.output_name, DataArray::new(previous.spec().clone(), array![next_value].into_dyn()))?;
        Ok(())
    }
}

/// Produces a prescribed sequence of values across successive
/// simulate-calls (keyed by iteration), used for S5's convergence test.
struct SequenceModel {
    output_name: String,
    spec: Spec,
    sequence: Vec<f64>,
}

impl smif::model::SectorModel for SequenceModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        let iteration = data_handle.iteration() as usize;
        let value = self.sequence[iteration.min(self.sequence.len() - 1)];
        data_handle.set_results(&self.output_name, DataArray::new(self.spec.clone(), array![value].into_dyn()))?;
        Ok(())
    }
}

fn uk_power_spec(unit: Unit) -> Spec {
    Spec::new("power", vec!["region"], vec![("region", vec!["UK"])], unit, Dtype::F64, true)
}

fn regional_power_spec() -> Spec {
    Spec::new(
        "power",
        vec!["region"],
        vec![("region", vec!["NW", "NE", "SW", "SE"])],
        Unit::Gwh,
        Dtype::F64,
        true,
    )
}

fn two_node_sos(gen: Model, consume_input_spec: Spec) -> SosModel {
    let mut models = HashMap::new();
    models.insert(ModelName::from("gen"), gen);
    models.insert(
        ModelName::from("consume"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("consume"),
                inputs: vec![consume_input_spec],
                outputs: vec![uk_power_spec(Unit::Gwh)],
                parameters: vec![],
            },
            kind: ModelKind::Sector(Box::new(PassthroughModel {
                input_name: "power".into(),
                output_name: "power".into(),
            })),
        },
    );
    SosModel {
        name: "two_node".into(),
        models,
        scenario_dependencies: vec![],
        model_dependencies: vec![ModelDependency {
            source_model: ModelName::from("gen"),
            source_output: "power".into(),
            sink_model: ModelName::from("consume"),
            sink_input: "power".into(),
            offset: TimestepOffset::Current,
        }],
        narratives: vec![],
    }
}

fn run_model(sos_model: &SosModel, store: &dyn Store, registry: &AdaptorRegistry, timesteps: Vec<i64>) -> smif::error::Result<()> {
    let run = ModelRun {
        name: "run".into(),
        sos_model: sos_model.name.clone(),
        timesteps,
        scenario_variant_selections: HashMap::new(),
        narrative_variant_selections: HashMap::new(),
        decision_module: DecisionModuleConfig {
            module_name: "pre_specified".into(),
            kind: DecisionModuleKind::PreSpecified,
        },
        strategies: vec![],
    };
    let runner = ModelRunner::new(sos_model, store, registry, Some(2))?;
    runner.run(&run)?;
    Ok(())
}

#[test]
fn s1_two_node_linear_passes_through_unchanged() {
    let gen = Model {
        spec: ModelSpec {
            name: ModelName::from("gen"),
            inputs: vec![],
            outputs: vec![uk_power_spec(Unit::Gwh)],
            parameters: vec![],
        },
        kind: ModelKind::Sector(Box::new(ConstantModel {
            output_name: "power".into(),
            spec: uk_power_spec(Unit::Gwh),
            values: vec![42.0],
        })),
    };
    let sos_model = two_node_sos(gen, uk_power_spec(Unit::Gwh));
    let store = MemoryStore::new();
    let registry = AdaptorRegistry::new();
    run_model(&sos_model, &store, &registry, vec![2020, 2025]).unwrap();

    for timestep in [2020, 2025] {
        let key = ResultKey {
            run_name: "run".into(),
            model_name: "consume".into(),
            output_name: "power".into(),
            timestep,
            iteration: 0,
        };
        let result = store.read_results(&key).unwrap();
        assert_eq!(result.total(), 42.0);
    }
}

#[test]
fn s2_region_aggregation_sums_extensive_values() {
    let gen = Model {
        spec: ModelSpec {
            name: ModelName::from("gen"),
            inputs: vec![],
            outputs: vec![regional_power_spec()],
            parameters: vec![],
        },
        kind: ModelKind::Sector(Box::new(ConstantModel {
            output_name: "power".into(),
            spec: regional_power_spec(),
            values: vec![10.0, 20.0, 30.0, 40.0],
        })),
    };
    let sos_model = two_node_sos(gen, uk_power_spec(Unit::Gwh));

    let store = MemoryStore::new();
    let mut registry = AdaptorRegistry::new();
    let source_regions: Vec<String> = ["NW", "NE", "SW", "SE"].into_iter().map(String::from).collect();
    registry.register_region(
        source_regions.clone(),
        vec!["UK".to_string()],
        source_regions
            .iter()
            .map(|r| Overlap {
                source: r.clone(),
                sink: "UK".to_string(),
                fraction_of_source: 1.0,
                fraction_of_sink: 0.25,
            })
            .collect(),
    );

    run_model(&sos_model, &store, &registry, vec![2020]).unwrap();

    let key = ResultKey {
        run_name: "run".into(),
        model_name: "consume".into(),
        output_name: "power".into(),
        timestep: 2020,
        iteration: 0,
    };
    assert_eq!(store.read_results(&key).unwrap().total(), 100.0);
}

#[test]
fn s3_unit_conversion_mwh_to_gwh() {
    let gen = Model {
        spec: ModelSpec {
            name: ModelName::from("gen"),
            inputs: vec![],
            outputs: vec![uk_power_spec(Unit::Mwh)],
            parameters: vec![],
        },
        kind: ModelKind::Sector(Box::new(ConstantModel {
            output_name: "power".into(),
            spec: uk_power_spec(Unit::Mwh),
            values: vec![1000.0],
        })),
    };
    let sos_model = two_node_sos(gen, uk_power_spec(Unit::Gwh));
    let store = MemoryStore::new();
    let registry = AdaptorRegistry::new();
    run_model(&sos_model, &store, &registry, vec![2020]).unwrap();

    let key = ResultKey {
        run_name: "run".into(),
        model_name: "consume".into(),
        output_name: "power".into(),
        timestep: 2020,
        iteration: 0,
    };
    assert_eq!(store.read_results(&key).unwrap().total(), 1.0);
}

#[test]
fn s4_lagged_self_dependency_reads_initial_then_own_history() {
    let spec = uk_power_spec(Unit::CubicMeter);
    let mut models = HashMap::new();
    models.insert(
        ModelName::from("reservoir"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("reservoir"),
                inputs: vec![Spec { name: "reservoir_level".into(), ..spec.clone() }],
                outputs: vec![Spec { name: "reservoir_level".into(), ..spec.clone() }],
                parameters: vec![],
            },
            kind: ModelKind::Sector(Box::new(DrawdownModel {
                input_name: "reservoir_level".into(),
                output_name: "reservoir_level".into(),
                drawdown: 20.0,
            })),
        },
    );
    let sos_model = SosModel {
        name: "reservoir_sos".into(),
        models,
        scenario_dependencies: vec![],
        model_dependencies: vec![ModelDependency {
            source_model: ModelName::from("reservoir"),
            source_output: "reservoir_level".into(),
            sink_model: ModelName::from("reservoir"),
            sink_input: "reservoir_level".into(),
            offset: TimestepOffset::Previous,
        }],
        narratives: vec![],
    };

    let store = MemoryStore::new();
    store
        .write_model_parameter_default(
            "reservoir",
            "reservoir_level__initial",
            &DataArray::new(Spec { name: "reservoir_level".into(), ..spec.clone() }, array![500.0].into_dyn()),
        )
        .unwrap();
    let registry = AdaptorRegistry::new();

    // A Previous-only self-loop must not trip cycle detection.
    run_model(&sos_model, &store, &registry, vec![2020, 2021, 2022]).unwrap();

    let read = |timestep| {
        store
            .read_results(&ResultKey {
                run_name: "run".into(),
                model_name: "reservoir".into(),
                output_name: "reservoir_level".into(),
                timestep,
                iteration: 0,
            })
            .unwrap()
            .total()
    };
    assert_eq!(read(2020), 480.0);
    assert_eq!(read(2021), 460.0);
    assert_eq!(read(2022), 440.0);
}

#[test]
fn s5_iterating_loop_converges_within_tolerance() {
    let spec = uk_power_spec(Unit::Count);
    let mut models = HashMap::new();
    models.insert(
        ModelName::from("a"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("a"),
                inputs: vec![],
                outputs: vec![Spec { name: "q".into(), ..spec.clone() }],
                parameters: vec![],
            },
            kind: ModelKind::Sector(Box::new(SequenceModel {
                output_name: "q".into(),
                spec: Spec { name: "q".into(), ..spec.clone() },
                sequence: vec![10.0, 9.5, 9.48, 9.479],
            })),
        },
    );
    let sos_model = SosModel {
        name: "iterating".into(),
        models,
        scenario_dependencies: vec![],
        model_dependencies: vec![],
        narratives: vec![],
    };

    let store = MemoryStore::new();
    let registry = AdaptorRegistry::new();
    let run = ModelRun {
        name: "run".into(),
        sos_model: sos_model.name.clone(),
        timesteps: vec![2020],
        scenario_variant_selections: HashMap::new(),
        narrative_variant_selections: HashMap::new(),
        decision_module: DecisionModuleConfig {
            module_name: "iterating".into(),
            kind: DecisionModuleKind::Iterating {
                max_iterations: 10,
                relative_tolerance: 1e-3,
                absolute_tolerance: 1e-9,
                convergence_variables: vec![(ModelName::from("a"), "q".to_string())],
            },
        },
        strategies: vec![],
    };
    let runner = ModelRunner::new(&sos_model, &store, &registry, Some(2)).unwrap();
    let report = runner.run(&run).unwrap();

    assert_eq!(report.timesteps[0].iterations_run, 4);
}

#[test]
fn s6_current_cycle_is_rejected_before_any_job_runs() {
    let spec = uk_power_spec(Unit::Gwh);
    let mut models = HashMap::new();
    for name in ["a", "b"] {
        models.insert(
            ModelName::from(name),
            Model {
                spec: ModelSpec {
                    name: ModelName::from(name),
                    inputs: vec![Spec { name: "in".into(), ..spec.clone() }],
                    outputs: vec![Spec { name: "out".into(), ..spec.clone() }],
                    parameters: vec![],
                },
                kind: ModelKind::Sector(Box::new(PassthroughModel {
                    input_name: "in".into(),
                    output_name: "out".into(),
                })),
            },
        );
    }
    let sos_model = SosModel {
        name: "cyclic".into(),
        models,
        scenario_dependencies: vec![],
        model_dependencies: vec![
            ModelDependency {
                source_model: ModelName::from("a"),
                source_output: "out".into(),
                sink_model: ModelName::from("b"),
                sink_input: "in".into(),
                offset: TimestepOffset::Current,
            },
            ModelDependency {
                source_model: ModelName::from("b"),
                source_output: "out".into(),
                sink_model: ModelName::from("a"),
                sink_input: "in".into(),
                offset: TimestepOffset::Current,
            },
        ],
        narratives: vec![],
    };

    let store = MemoryStore::new();
    let registry = AdaptorRegistry::new();
    let err = run_model(&sos_model, &store, &registry, vec![2020]).unwrap_err();
    match err {
        SmifError::CircularDependency { cycle } => {
            assert_eq!(cycle.len(), 2);
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
}
