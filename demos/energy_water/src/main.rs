//! A worked example wiring two sector models into a `SosModel`: a
//! population scenario feeds a power demand model (which also carries a
//! lagged reservoir-level state), whose output feeds a water demand
//! model after a unit conversion.
//!
//! Mirrors the role `potato_sat`/`aerie_lander` play for `peregrine`: a
//! runnable demonstration of the core's public API, not itself part of
//! the core crate.

mod models;

use clap::{Parser, Subcommand};
use ndarray::array;
use smif::adaptor::{AdaptorRegistry, Overlap};
use smif::data_array::DataArray;
use smif::model::{
    DecisionModuleConfig, DecisionModuleKind, Model, ModelDependency, ModelKind, ModelName, ModelSpec, ModelRun,
    ScenarioDependency, ScenarioSource, SosModel, TimestepOffset,
};
use smif::runner::ModelRunner;
use smif::store::{MemoryStore, Store};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "energy_water", about = "smif worked example: coupled energy/water demand")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demo SoS model over 2020..=2030 and print each timestep's results.
    Run,
    /// List the demo's configured models and scenarios.
    List,
}

fn build_sos_model() -> SosModel {
    let mut models = HashMap::new();

    models.insert(
        ModelName::from("population"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("population"),
                inputs: vec![],
                outputs: vec![models::population_scenario_spec()],
                parameters: vec![],
            },
            kind: ModelKind::Scenario(ScenarioSource {
                scenario: "population".into(),
                variant: "baseline".into(),
            }),
        },
    );

    models.insert(
        ModelName::from("power_demand"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("power_demand"),
                inputs: vec![models::population_spec()],
                outputs: vec![models::power_output_spec(), models::reservoir_spec()],
                parameters: vec![],
            },
            kind: ModelKind::Sector(Box::new(models::PowerDemandModel {
                demand_per_capita_mwh: 0.003,
                reservoir_drawdown_rate: 0.0001,
            })),
        },
    );

    models.insert(
        ModelName::from("water_demand"),
        Model {
            spec: ModelSpec {
                name: ModelName::from("water_demand"),
                inputs: vec![models::power_output_input_spec()],
                outputs: vec![models::water_demand_spec()],
                parameters: vec![],
            },
            kind: ModelKind::Sector(Box::new(models::WaterDemandModel {
                water_per_mwh_m3: 0.8,
            })),
        },
    );

    SosModel {
        name: "energy_water".into(),
        models,
        scenario_dependencies: vec![ScenarioDependency {
            scenario: "population".into(),
            variable: "count".into(),
            sink_model: ModelName::from("power_demand"),
            sink_input: "population".into(),
        }],
        model_dependencies: vec![ModelDependency {
            source_model: ModelName::from("power_demand"),
            source_output: "power_output".into(),
            sink_model: ModelName::from("water_demand"),
            sink_input: "power_output".into(),
            offset: TimestepOffset::Current,
        }],
        narratives: vec![],
    }
}

fn build_store() -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();

    store.write_scenario_variant_data(
        "population",
        "baseline",
        "count",
        &DataArray::new(
            models::population_scenario_spec(),
            array![1_500_000.0, 1_200_000.0, 900_000.0, 1_100_000.0].into_dyn(),
        ),
    )?;

    store.write_model_parameter_default(
        "power_demand",
        "reservoir_level__initial",
        &DataArray::new(models::reservoir_spec(), array![500_000.0].into_dyn()),
    )?;

    Ok(store)
}

fn build_registry() -> AdaptorRegistry {
    let mut registry = AdaptorRegistry::new();
    let source_regions: Vec<String> = vec!["NW", "NE", "SW", "SE"].into_iter().map(String::from).collect();
    let sink_regions = vec!["UK".to_string()];
    registry.register_region(
        source_regions.clone(),
        sink_regions,
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
    registry
}

fn build_model_run() -> ModelRun {
    let mut scenario_variant_selections = HashMap::new();
    scenario_variant_selections.insert("population".to_string(), "baseline".to_string());

    ModelRun {
        name: "baseline_2020_2030".into(),
        sos_model: "energy_water".into(),
        timesteps: vec![2020, 2025, 2030],
        scenario_variant_selections,
        narrative_variant_selections: HashMap::new(),
        decision_module: DecisionModuleConfig {
            module_name: "pre_specified".into(),
            kind: DecisionModuleKind::PreSpecified,
        },
        strategies: vec![],
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let sos_model = build_sos_model();

    match cli.command {
        Command::List => {
            let mut names: Vec<&str> = sos_model.models.keys().map(|n| n.as_str()).collect();
            names.sort();
            for name in names {
                println!("{name}");
            }
        }
        Command::Run => {
            let store = build_store()?;
            let registry = build_registry();
            let run = build_model_run();

            let runner = ModelRunner::new(&sos_model, &store, &registry, None)?;
            let report = runner.run(&run)?;

            for timestep in &report.timesteps {
                let key = smif::store::ResultKey {
                    run_name: run.name.clone(),
                    model_name: "water_demand".into(),
                    output_name: "water_demand".into(),
                    timestep: timestep.timestep,
                    iteration: 0,
                };
                let water = store.read_results(&key)?;
                println!("timestep {}: water_demand = {:.1} m3", timestep.timestep, water.total());
            }
        }
    }

    Ok(())
}
