//! Adaptor: coordinate/unit conversion from a source Spec to a sink Spec
//! (spec §4.1).
//!
//! The four built-ins - Region, Interval, Unit, Identity - are composed in
//! a fixed pipeline order (spec §9): region aggregation first, then
//! interval reallocation, then unit scaling. A Spec pair that needs none
//! of the three is the Identity case and short-circuits the whole
//! pipeline.

use crate::data_array::DataArray;
use crate::error::{Coordinate, Result, SmifError};
use crate::spec::{DimName, Spec, INTERVAL_DIM, REGION_DIM};
use ndarray::{Array2, ArrayD, IxDyn};
use std::collections::HashMap;

/// One source-coordinate -> sink-coordinate overlap weight, shared by the
/// region and interval adaptors (spec §4.1: "analogous, on a temporal
/// dim").
///
/// - `fraction_of_source`: the share of `source`'s extensive quantity
///   attributable to `sink` (area or duration intersection divided by the
///   full extent of `source`). Used to split extensive variables.
/// - `fraction_of_sink`: the share of `sink`'s coverage contributed by
///   `source`. These must sum to ~1.0 across all overlaps sharing the
///   same sink when `sink` is fully covered (spec §4.1); used as the
///   weight in intensive variables' weighted average.
#[derive(Clone, Debug)]
pub struct Overlap {
    pub source: String,
    pub sink: String,
    pub fraction_of_source: f64,
    pub fraction_of_sink: f64,
}

pub type RegionOverlap = Overlap;
pub type IntervalOverlap = Overlap;

/// Below this total per-sink coverage, the sink is considered to extend
/// outside the source union and conversion fails (spec §9 Open Question,
/// resolved conservatively).
const MIN_COVERAGE: f64 = 1.0 - 1e-6;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Default)]
pub struct AdaptorRegistry {
    region: HashMap<(Vec<String>, Vec<String>), Vec<Overlap>>,
    interval: HashMap<(Vec<String>, Vec<String>), Vec<Overlap>>,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_region(
        &mut self,
        source_coords: Vec<String>,
        sink_coords: Vec<String>,
        overlaps: Vec<Overlap>,
    ) {
        self.region.insert((source_coords, sink_coords), overlaps);
    }

    pub fn register_interval(
        &mut self,
        source_coords: Vec<String>,
        sink_coords: Vec<String>,
        overlaps: Vec<Overlap>,
    ) {
        self.interval.insert((source_coords, sink_coords), overlaps);
    }

    pub fn region_overlaps(&self, source: &[String], sink: &[String]) -> Option<&Vec<Overlap>> {
        self.region.get(&(source.to_vec(), sink.to_vec()))
    }

    pub fn interval_overlaps(&self, source: &[String], sink: &[String]) -> Option<&Vec<Overlap>> {
        self.interval.get(&(source.to_vec(), sink.to_vec()))
    }
}

/// Runs the full pipeline - region, then interval, then unit - converting
/// `source` into a `DataArray` matching `sink_spec`. Returns the source
/// unchanged (Identity) when the specs already match.
pub fn convert(
    source: &DataArray,
    sink_spec: &Spec,
    registry: &AdaptorRegistry,
    coordinate: &Coordinate,
) -> Result<DataArray> {
    if source.spec() == sink_spec {
        return Ok(source.clone());
    }

    let mut spec = source.spec().clone();
    let mut values = source.values().clone();

    apply_dim_adaptor(
        &mut spec,
        &mut values,
        sink_spec,
        REGION_DIM,
        source.spec().extensive,
        registry,
        coordinate,
        |r, s, sink| r.region_overlaps(s, sink),
    )?;
    apply_dim_adaptor(
        &mut spec,
        &mut values,
        sink_spec,
        INTERVAL_DIM,
        source.spec().extensive,
        registry,
        coordinate,
        |r, s, sink| r.interval_overlaps(s, sink),
    )?;

    if spec.unit != sink_spec.unit {
        if !spec.unit.is_convertible_to(&sink_spec.unit) {
            return Err(SmifError::Conversion {
                coordinate: coordinate.clone(),
                dim: DimName::from("unit"),
                reason: format!(
                    "unit `{}` is not convertible to `{}`",
                    spec.unit, sink_spec.unit
                ),
            });
        }
        let factor = spec.unit.conversion_factor_to(&sink_spec.unit);
        values.mapv_inplace(|v| v * factor);
        spec.unit = sink_spec.unit;
    }

    spec.name = sink_spec.name.clone();
    spec.dtype = sink_spec.dtype;

    if spec.dims != sink_spec.dims {
        let axis_order: Vec<usize> = sink_spec
            .dims
            .iter()
            .map(|d| {
                spec.dims
                    .iter()
                    .position(|x| x == d)
                    .expect("is_convertible_to already validated the dim name sets match")
            })
            .collect();
        values = values.permuted_axes(axis_order);
        spec.dims = sink_spec.dims.clone();
    }

    Ok(DataArray::new(spec, values))
}

#[allow(clippy::too_many_arguments)]
fn apply_dim_adaptor<'a, F>(
    spec: &mut Spec,
    values: &mut ArrayD<f64>,
    sink_spec: &Spec,
    dim: &str,
    extensive: bool,
    registry: &'a AdaptorRegistry,
    coordinate: &Coordinate,
    lookup: F,
) -> Result<()>
where
    F: Fn(&'a AdaptorRegistry, &[String], &[String]) -> Option<&'a Vec<Overlap>>,
{
    let Some(axis) = spec.dims.iter().position(|d| d == dim) else {
        return Ok(());
    };
    let source_coords = spec.coords.get(dim).cloned().unwrap_or_default();
    let sink_coords = sink_spec.coords.get(dim).cloned().unwrap_or_default();
    if source_coords == sink_coords {
        return Ok(());
    }

    let overlaps = lookup(registry, &source_coords, &sink_coords).ok_or_else(|| {
        SmifError::Conversion {
            coordinate: coordinate.clone(),
            dim: DimName::from(dim),
            reason: format!("no adaptor registered for `{dim}`"),
        }
    })?;

    check_coverage(overlaps, &sink_coords, dim, coordinate)?;
    let weights = build_weight_matrix(&source_coords, &sink_coords, overlaps, extensive);
    *values = apply_axis_weights(values, axis, &weights);
    spec.coords.insert(dim.to_string(), sink_coords);
    Ok(())
}

fn check_coverage(
    overlaps: &[Overlap],
    sink_coords: &[String],
    dim: &str,
    coordinate: &Coordinate,
) -> Result<()> {
    for sink in sink_coords {
        let covered: f64 = overlaps
            .iter()
            .filter(|o| &o.sink == sink)
            .map(|o| o.fraction_of_sink)
            .sum();
        if covered < MIN_COVERAGE {
            return Err(SmifError::Conversion {
                coordinate: coordinate.clone(),
                dim: DimName::from(dim),
                reason: format!(
                    "sink coordinate `{sink}` is only {covered:.9} covered by the source \
                     union (minimum {MIN_COVERAGE:.9})"
                ),
            });
        }
        debug_assert!(
            covered <= 1.0 + WEIGHT_SUM_TOLERANCE + 1e-6,
            "sink coordinate `{sink}` is over-covered ({covered})"
        );
    }
    Ok(())
}

fn build_weight_matrix(
    source_coords: &[String],
    sink_coords: &[String],
    overlaps: &[Overlap],
    extensive: bool,
) -> Array2<f64> {
    let mut weights = Array2::<f64>::zeros((source_coords.len(), sink_coords.len()));
    for overlap in overlaps {
        let Some(s) = source_coords.iter().position(|c| c == &overlap.source) else {
            continue;
        };
        let Some(t) = sink_coords.iter().position(|c| c == &overlap.sink) else {
            continue;
        };
        weights[[s, t]] = if extensive {
            overlap.fraction_of_source
        } else {
            overlap.fraction_of_sink
        };
    }
    weights
}

/// Aggregates `values` along `axis` using `weights` (shape
/// `(source_len, sink_len)`): `out[..., t, ...] = sum_s values[..., s,
/// ...] * weights[s, t]`. Implemented with explicit row-major strides
/// rather than a reshape-and-matmul so the only ndarray APIs relied upon
/// are `shape`, `as_standard_layout`, `as_slice`, and `from_shape_vec`.
fn apply_axis_weights(values: &ArrayD<f64>, axis: usize, weights: &Array2<f64>) -> ArrayD<f64> {
    let shape = values.shape().to_vec();
    let ndim = shape.len();
    let source_len = shape[axis];
    let sink_len = weights.ncols();
    debug_assert_eq!(weights.nrows(), source_len);

    let standard = values.as_standard_layout();
    let flat = standard.as_slice().expect("standard layout is contiguous");

    let mut strides = vec![1usize; ndim];
    for d in (0..ndim.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }

    let mut sink_shape = shape.clone();
    sink_shape[axis] = sink_len;
    let mut sink_strides = vec![1usize; ndim];
    for d in (0..ndim.saturating_sub(1)).rev() {
        sink_strides[d] = sink_strides[d + 1] * sink_shape[d + 1];
    }
    let total: usize = sink_shape.iter().product();
    let mut out = vec![0.0f64; total];

    let mut idx = vec![0usize; ndim];
    loop {
        let t = idx[axis];
        let mut acc = 0.0;
        for s in 0..source_len {
            let w = weights[[s, t]];
            if w == 0.0 {
                continue;
            }
            let mut src_offset = 0usize;
            for d in 0..ndim {
                let coord = if d == axis { s } else { idx[d] };
                src_offset += coord * strides[d];
            }
            acc += flat[src_offset] * w;
        }
        let mut sink_offset = 0usize;
        for d in 0..ndim {
            sink_offset += idx[d] * sink_strides[d];
        }
        out[sink_offset] = acc;

        if ndim == 0 {
            break;
        }
        let mut d = ndim;
        let mut done = false;
        loop {
            if d == 0 {
                done = true;
                break;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < sink_shape[d] {
                break;
            }
            idx[d] = 0;
        }
        if done {
            break;
        }
    }

    ArrayD::from_shape_vec(IxDyn(&sink_shape), out).expect("computed length matches sink shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Dtype;
    use crate::unit::Unit;
    use ndarray::array;

    fn coordinate() -> Coordinate {
        Coordinate {
            run: "test".into(),
            model: "consume".into(),
            timestep: 2020,
            iteration: 0,
        }
    }

    fn power_spec(regions: Vec<&str>, unit: Unit) -> Spec {
        Spec::new(
            "power",
            vec!["region"],
            vec![("region", regions)],
            unit,
            Dtype::F64,
            true,
        )
    }

    #[test]
    fn identity_is_a_no_op() {
        let registry = AdaptorRegistry::new();
        let spec = power_spec(vec!["UK"], Unit::Gwh);
        let source = DataArray::new(spec.clone(), array![42.0].into_dyn());
        let converted = convert(&source, &spec, &registry, &coordinate()).unwrap();
        assert!(converted.bit_equal(&source));
    }

    #[test]
    fn region_aggregation_sums_extensive_values() {
        let mut registry = AdaptorRegistry::new();
        let source_regions = vec!["NW".to_string(), "NE".to_string(), "SW".to_string(), "SE".to_string()];
        let sink_regions = vec!["UK".to_string()];
        registry.register_region(
            source_regions.clone(),
            sink_regions.clone(),
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

        let source_spec = power_spec(vec!["NW", "NE", "SW", "SE"], Unit::Gwh);
        let sink_spec = power_spec(vec!["UK"], Unit::Gwh);
        let source = DataArray::new(source_spec, array![10.0, 20.0, 30.0, 40.0].into_dyn());

        let converted = convert(&source, &sink_spec, &registry, &coordinate()).unwrap();
        assert_eq!(converted.total(), 100.0);
    }

    #[test]
    fn unit_conversion_scales_values() {
        let registry = AdaptorRegistry::new();
        let source_spec = power_spec(vec!["UK"], Unit::Mwh);
        let sink_spec = power_spec(vec!["UK"], Unit::Gwh);
        let source = DataArray::new(source_spec, array![1000.0].into_dyn());

        let converted = convert(&source, &sink_spec, &registry, &coordinate()).unwrap();
        assert_eq!(converted.values()[[0]], 1.0);
    }

    #[test]
    fn partial_coverage_below_threshold_fails() {
        let mut registry = AdaptorRegistry::new();
        let source_regions = vec!["NW".to_string()];
        let sink_regions = vec!["UK".to_string()];
        registry.register_region(
            source_regions.clone(),
            sink_regions.clone(),
            vec![Overlap {
                source: "NW".to_string(),
                sink: "UK".to_string(),
                fraction_of_source: 1.0,
                fraction_of_sink: 0.5,
            }],
        );

        let source_spec = power_spec(vec!["NW"], Unit::Gwh);
        let sink_spec = power_spec(vec!["UK"], Unit::Gwh);
        let source = DataArray::new(source_spec, array![10.0].into_dyn());

        let err = convert(&source, &sink_spec, &registry, &coordinate()).unwrap_err();
        assert!(matches!(err, SmifError::Conversion { .. }));
    }

    #[test]
    fn nan_propagates_through_region_aggregation() {
        let mut registry = AdaptorRegistry::new();
        let source_regions = vec!["NW".to_string(), "NE".to_string()];
        let sink_regions = vec!["UK".to_string()];
        registry.register_region(
            source_regions.clone(),
            sink_regions.clone(),
            source_regions
                .iter()
                .map(|r| Overlap {
                    source: r.clone(),
                    sink: "UK".to_string(),
                    fraction_of_source: 1.0,
                    fraction_of_sink: 0.5,
                })
                .collect(),
        );

        let source_spec = power_spec(vec!["NW", "NE"], Unit::Gwh);
        let sink_spec = power_spec(vec!["UK"], Unit::Gwh);
        let source = DataArray::new(source_spec, array![f64::NAN, 10.0].into_dyn());

        let converted = convert(&source, &sink_spec, &registry, &coordinate()).unwrap();
        assert!(converted.values()[[0]].is_nan());
    }
}
