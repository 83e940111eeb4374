//! DataArray: a labelled n-dim numerical array bound to a [`Spec`] (spec §3).
//!
//! The single currency moved between models: every `DataHandle` read and
//! write is a `DataArray`. Shape matches the Spec at construction;
//! mutation replaces the backing array wholesale, never in place, so a
//! `DataArray` can always be trusted to agree with its own Spec.

use crate::spec::Spec;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataArray {
    pub spec: Spec,
    values: ArrayD<f64>,
}

impl DataArray {
    /// Builds a `DataArray`, panicking if `values`'s shape doesn't match
    /// `spec`'s. Construction is the one place this invariant is checked;
    /// after that, [`DataArray::set_values`] is the only way to mutate,
    /// and it re-checks the same invariant.
    pub fn new(spec: Spec, values: ArrayD<f64>) -> Self {
        assert_eq!(
            values.shape(),
            spec.shape().as_slice(),
            "DataArray shape {:?} does not match spec `{}`'s shape {:?}",
            values.shape(),
            spec.name,
            spec.shape()
        );
        DataArray { spec, values }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// Replaces the backing values wholesale. Panics on shape mismatch,
    /// same as [`DataArray::new`] (spec §3: "mutation replaces values
    /// wholesale").
    pub fn set_values(&mut self, values: ArrayD<f64>) {
        assert_eq!(
            values.shape(),
            self.spec.shape().as_slice(),
            "replacement values shape {:?} does not match spec `{}`'s shape {:?}",
            values.shape(),
            self.spec.name,
            self.spec.shape()
        );
        self.values = values;
    }

    /// Byte-equality of the underlying floats, used by the determinism
    /// property (spec §8.2): two runs with identical config and scenario
    /// data must produce bit-identical DataArrays.
    pub fn bit_equal(&self, other: &DataArray) -> bool {
        self.spec == other.spec
            && self.values.shape() == other.values.shape()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// Sum of all non-NaN values, used to check mass conservation across
    /// chained adaptors (spec §8.5).
    pub fn total(&self) -> f64 {
        self.values.iter().filter(|v| !v.is_nan()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Dtype;
    use crate::unit::Unit;
    use ndarray::array;

    fn spec(regions: Vec<&str>) -> Spec {
        Spec::new(
            "power",
            vec!["region"],
            vec![("region", regions)],
            Unit::Gwh,
            Dtype::F64,
            true,
        )
    }

    #[test]
    fn construction_checks_shape() {
        let s = spec(vec!["NW", "NE"]);
        let values = array![10.0, 20.0].into_dyn();
        let arr = DataArray::new(s, values);
        assert_eq!(arr.total(), 30.0);
    }

    #[test]
    #[should_panic(expected = "does not match spec")]
    fn construction_rejects_wrong_shape() {
        let s = spec(vec!["NW", "NE", "SW"]);
        let values = array![10.0, 20.0].into_dyn();
        DataArray::new(s, values);
    }

    #[test]
    fn bit_equal_detects_nan_propagation() {
        let s = spec(vec!["NW"]);
        let a = DataArray::new(s.clone(), array![f64::NAN].into_dyn());
        let b = DataArray::new(s, array![f64::NAN].into_dyn());
        assert!(a.bit_equal(&b));
    }
}
