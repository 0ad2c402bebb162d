use crate::errors::{OrbitDynError, OrbitDynResult};
use crate::orbit::Equinoctial;
use hifitime::Epoch;
use std::collections::BTreeMap;
use std::fmt;

/// A spacecraft state: an orbit, a mass, and any number of named
/// additional scalar arrays carried along by the propagation but not
/// coupled to the orbital dynamics by the core (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct SpacecraftState {
    pub orbit: Equinoctial,
    pub epoch: Epoch,
    pub mass_kg: f64,
    additional: BTreeMap<String, Vec<f64>>,
}

impl SpacecraftState {
    pub fn new(orbit: Equinoctial, epoch: Epoch, mass_kg: f64) -> OrbitDynResult<Self> {
        if !(mass_kg > 0.0) {
            return Err(OrbitDynError::ArgumentError(format!(
                "mass must be strictly positive, got {mass_kg} kg"
            )));
        }
        Ok(Self {
            orbit,
            epoch,
            mass_kg,
            additional: BTreeMap::new(),
        })
    }

    /// Returns a copy of this state with an additional named state array
    /// attached (or replaced if the name already exists).
    pub fn with_additional(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.additional.insert(name.into(), values);
        self
    }

    pub fn additional(&self, name: &str) -> Option<&[f64]> {
        self.additional.get(name).map(Vec::as_slice)
    }

    pub fn additional_names(&self) -> impl Iterator<Item = &str> {
        self.additional.keys().map(String::as_str)
    }

    pub(crate) fn additional_map(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.additional
    }
}

impl fmt::Display for SpacecraftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}\t{:.6} kg", self.orbit, self.epoch, self.mass_kg)
    }
}
