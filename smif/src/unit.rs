//! Linear-affine unit conversion (spec §4.1's unit adaptor).
//!
//! Deliberately not a full dimensional-analysis system: the spec asks for
//! "linear-affine conversion per the declared unit system", nothing richer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit recognized by the core's conversion table.
///
/// Two units are convertible iff they share a [`Dimension`]. Conversion is
/// always `value_in_base = value * factor_to_base`, so converting from `a`
/// to `b` is `value * a.factor_to_base() / b.factor_to_base()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    // Energy
    Gwh,
    Mwh,
    Kwh,
    Joule,
    // Power
    Gw,
    Mw,
    Kw,
    // Volume
    CubicMeter,
    MegaliterPerDay,
    Liter,
    // Count / dimensionless
    Count,
    Percent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Energy,
    Power,
    Volume,
    Dimensionless,
}

impl Unit {
    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Gwh | Unit::Mwh | Unit::Kwh | Unit::Joule => Dimension::Energy,
            Unit::Gw | Unit::Mw | Unit::Kw => Dimension::Power,
            Unit::CubicMeter | Unit::MegaliterPerDay | Unit::Liter => Dimension::Volume,
            Unit::Count | Unit::Percent => Dimension::Dimensionless,
        }
    }

    /// Multiplicative factor to convert one unit of `self` into the
    /// dimension's base unit (Gwh, Gw, cubic meter, or count).
    fn factor_to_base(&self) -> f64 {
        match self {
            Unit::Gwh => 1.0,
            Unit::Mwh => 1e-3,
            Unit::Kwh => 1e-6,
            Unit::Joule => 1.0 / 3.6e12,
            Unit::Gw => 1.0,
            Unit::Mw => 1e-3,
            Unit::Kw => 1e-6,
            Unit::CubicMeter => 1.0,
            Unit::MegaliterPerDay => 1000.0,
            Unit::Liter => 1e-3,
            Unit::Count => 1.0,
            Unit::Percent => 0.01,
        }
    }

    pub fn is_convertible_to(&self, other: &Unit) -> bool {
        self.dimension() == other.dimension()
    }

    /// Multiplicative factor converting a value in `self` into `other`.
    /// Panics if the units are not convertible; callers must check
    /// [`Unit::is_convertible_to`] first (mirrors [`Spec::is_convertible_to`]'s contract).
    pub fn conversion_factor_to(&self, other: &Unit) -> f64 {
        debug_assert!(self.is_convertible_to(other));
        self.factor_to_base() / other.factor_to_base()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Gwh => "GWh",
            Unit::Mwh => "MWh",
            Unit::Kwh => "kWh",
            Unit::Joule => "J",
            Unit::Gw => "GW",
            Unit::Mw => "MW",
            Unit::Kw => "kW",
            Unit::CubicMeter => "m3",
            Unit::MegaliterPerDay => "Ml/day",
            Unit::Liter => "L",
            Unit::Count => "count",
            Unit::Percent => "%",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mwh_to_gwh() {
        assert_eq!(Unit::Mwh.conversion_factor_to(&Unit::Gwh), 1e-3);
    }

    #[test]
    fn same_unit_is_identity() {
        assert_eq!(Unit::Gwh.conversion_factor_to(&Unit::Gwh), 1.0);
    }

    #[test]
    fn incompatible_dimensions_are_not_convertible() {
        assert!(!Unit::Gwh.is_convertible_to(&Unit::CubicMeter));
    }
}
