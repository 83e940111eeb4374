//! Spec: immutable metadata describing one variable (spec §3/§4.1).
//!
//! Modeled on `peregrine`'s own resources: immutable, structural,
//! declared once at configuration load and never mutated for the
//! lifetime of a run.

use crate::adaptor::AdaptorRegistry;
use crate::unit::Unit;
use derive_more::Display;
use std::collections::BTreeMap;
use std::fmt;

/// A dimension name, e.g. `"region"` or `"interval"`.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DimName(pub String);

impl DimName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DimName {
    fn from(s: &str) -> Self {
        DimName(s.to_string())
    }
}

impl From<String> for DimName {
    fn from(s: String) -> Self {
        DimName(s)
    }
}

/// The two dimension roles the built-in adaptors know how to convert.
/// Any other dim name must match exactly between source and sink Specs;
/// there is no generic adaptor for it (spec §4.1 only names region,
/// interval, and unit conversion as built-ins).
pub const REGION_DIM: &str = "region";
pub const INTERVAL_DIM: &str = "interval";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    F64,
    I64,
    Bool,
}

/// Immutable description of a named data variable: dimensions, coordinate
/// labels per dimension, unit, and dtype (spec §3).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Spec {
    pub name: String,
    pub dims: Vec<String>,
    pub coords: BTreeMap<String, Vec<String>>,
    pub unit: Unit,
    pub dtype: Dtype,
    /// Extensive variables are summed by the region/interval adaptors;
    /// intensive variables are averaged weighted by overlap (spec §4.1).
    pub extensive: bool,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::F64 => write!(f, "f64"),
            Dtype::I64 => write!(f, "i64"),
            Dtype::Bool => write!(f, "bool"),
        }
    }
}

impl serde::Serialize for Dtype {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Dtype {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "f64" => Ok(Dtype::F64),
            "i64" => Ok(Dtype::I64),
            "bool" => Ok(Dtype::Bool),
            other => Err(serde::de::Error::custom(format!("unknown dtype: {other}"))),
        }
    }
}

impl Spec {
    pub fn new(
        name: impl Into<String>,
        dims: Vec<&str>,
        coords: Vec<(&str, Vec<&str>)>,
        unit: Unit,
        dtype: Dtype,
        extensive: bool,
    ) -> Self {
        Spec {
            name: name.into(),
            dims: dims.into_iter().map(String::from).collect(),
            coords: coords
                .into_iter()
                .map(|(d, labels)| (d.to_string(), labels.into_iter().map(String::from).collect()))
                .collect(),
            unit,
            dtype,
            extensive,
        }
    }

    /// The shape a [`crate::data_array::DataArray`] bound to this Spec must have.
    pub fn shape(&self) -> Vec<usize> {
        self.dims
            .iter()
            .map(|d| self.coords.get(d).map(|c| c.len()).unwrap_or(0))
            .collect()
    }

    pub fn pretty_print(&self) -> String {
        let dims = self
            .dims
            .iter()
            .map(|d| {
                let n = self.coords.get(d).map(|c| c.len()).unwrap_or(0);
                format!("{d}[{n}]")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}({}) :: {} ({})",
            self.name,
            dims,
            self.unit,
            if self.extensive { "extensive" } else { "intensive" }
        )
    }

    /// True iff `self` and `other` name the same dim set (order may
    /// differ), and for every dim where their coordinate lists differ, a
    /// registered adaptor can bridge them, and the units are either equal
    /// or unit-convertible (spec §4.1).
    pub fn is_convertible_to(&self, other: &Spec, registry: &AdaptorRegistry) -> bool {
        let mut self_dims: Vec<&String> = self.dims.iter().collect();
        let mut other_dims: Vec<&String> = other.dims.iter().collect();
        self_dims.sort();
        other_dims.sort();
        if self_dims != other_dims {
            return false;
        }

        if !self.unit.is_convertible_to(&other.unit) {
            return false;
        }

        for dim in &self.dims {
            let source_coords = self.coords.get(dim).cloned().unwrap_or_default();
            let sink_coords = other.coords.get(dim).cloned().unwrap_or_default();
            if source_coords == sink_coords {
                continue;
            }
            match dim.as_str() {
                REGION_DIM => {
                    if registry.region_overlaps(&source_coords, &sink_coords).is_none() {
                        return false;
                    }
                }
                INTERVAL_DIM => {
                    if registry
                        .interval_overlaps(&source_coords, &sink_coords)
                        .is_none()
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}
