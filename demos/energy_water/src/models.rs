//! The two sector models wired together by `main.rs`: power demand (fed
//! by a population scenario, with a lagged reservoir-level state) and
//! water demand (fed by power demand's output, converted across units).

use smif::data_array::DataArray;
use smif::data_handle::DataHandle;
use smif::model::SectorModel;
use ndarray::array;

/// Consumes population (aggregated from four NUTS-style regions to a
/// single UK region by a registered region adaptor) and a lagged
/// reservoir level, and produces power demand plus the next reservoir
/// level.
pub struct PowerDemandModel {
    pub demand_per_capita_mwh: f64,
    pub reservoir_drawdown_rate: f64,
}

impl SectorModel for PowerDemandModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        let population = data_handle.get_data("population")?;
        let reservoir_level = data_handle.get_previous_timestep_data("reservoir_level")?;

        let pop_total = population.total();
        let reservoir_total = reservoir_level.total();

        let power_output_value = pop_total * self.demand_per_capita_mwh;
        let next_reservoir = (reservoir_total - power_output_value * self.reservoir_drawdown_rate).max(0.0);

        data_handle.set_results("power_output", DataArray::new(power_output_spec(), array![power_output_value].into_dyn()))?;
        data_handle.set_results("reservoir_level", DataArray::new(reservoir_spec(), array![next_reservoir].into_dyn()))?;

        Ok(())
    }
}

/// Consumes power demand (declared in MWh; `PowerDemandModel` publishes
/// GWh, so this read goes through smif's unit adaptor) and produces
/// water demand for cooling.
pub struct WaterDemandModel {
    pub water_per_mwh_m3: f64,
}

impl SectorModel for WaterDemandModel {
    fn simulate(&self, data_handle: &mut DataHandle) -> anyhow::Result<()> {
        let power_output = data_handle.get_data("power_output")?;
        let water_demand_value = power_output.total() * self.water_per_mwh_m3;
        data_handle.set_results(
            "water_demand",
            DataArray::new(water_demand_spec(), array![water_demand_value].into_dyn()),
        )?;
        Ok(())
    }
}

pub fn population_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "population",
        vec!["region"],
        vec![("region", vec!["UK"])],
        smif::unit::Unit::Count,
        smif::spec::Dtype::F64,
        true,
    )
}

pub fn population_scenario_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "population",
        vec!["region"],
        vec![("region", vec!["NW", "NE", "SW", "SE"])],
        smif::unit::Unit::Count,
        smif::spec::Dtype::F64,
        true,
    )
}

pub fn power_output_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "power_output",
        vec!["region"],
        vec![("region", vec!["UK"])],
        smif::unit::Unit::Gwh,
        smif::spec::Dtype::F64,
        true,
    )
}

pub fn power_output_input_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "power_output",
        vec!["region"],
        vec![("region", vec!["UK"])],
        smif::unit::Unit::Mwh,
        smif::spec::Dtype::F64,
        true,
    )
}

pub fn reservoir_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "reservoir_level",
        vec!["region"],
        vec![("region", vec!["UK"])],
        smif::unit::Unit::CubicMeter,
        smif::spec::Dtype::F64,
        false,
    )
}

pub fn water_demand_spec() -> smif::spec::Spec {
    smif::spec::Spec::new(
        "water_demand",
        vec!["region"],
        vec![("region", vec!["UK"])],
        smif::unit::Unit::CubicMeter,
        smif::spec::Dtype::F64,
        true,
    )
}
