//! Example [`ForceModel`] implementations. Concrete perturbations are
//! callers' business (spec §1: the core stays agnostic of which forces
//! are plugged in); this module keeps only the two simplest ones, used
//! by the crate's own scenario tests: the always-present Kepler term
//! needs no force model at all, and a single zonal (J2) oblateness term
//! covers the secular-drift property test.

use crate::dynamics::{DerivativeAccumulator, ForceModel, LocalFrame};
use crate::errors::OrbitDynResult;
use crate::orbit::PVCoordinates;
use crate::spacecraft::SpacecraftState;
use hifitime::Epoch;
use nalgebra::Vector3;

/// The dominant zonal harmonic of an oblate primary body (teacher
/// precedent: `dynamics::gravity::Harmonics`, here specialized to just
/// the J2 term in closed form rather than a general spherical-harmonics
/// expansion, which needs a gravity-field provider this core does not
/// have).
#[derive(Clone, Copy, Debug)]
pub struct J2ZonalGravity {
    /// Unnormalized J2 coefficient of the central body (dimensionless).
    pub j2: f64,
    /// Equatorial radius of the central body, meters.
    pub body_radius: f64,
}

impl J2ZonalGravity {
    pub fn new(j2: f64, body_radius: f64) -> Self {
        Self { j2, body_radius }
    }

    fn acceleration(&self, position: &Vector3<f64>, mu: f64) -> Vector3<f64> {
        let r = position.norm();
        let factor = 1.5 * self.j2 * mu * self.body_radius * self.body_radius / r.powi(4);
        let z_ratio = (position.z / r).powi(2);
        Vector3::new(
            -factor * (position.x / r) * (5.0 * z_ratio - 1.0),
            -factor * (position.y / r) * (5.0 * z_ratio - 1.0),
            -factor * (position.z / r) * (5.0 * z_ratio - 3.0),
        )
    }
}

impl ForceModel for J2ZonalGravity {
    fn add_contribution(
        &self,
        _epoch: Epoch,
        pv: &PVCoordinates,
        state: &SpacecraftState,
        accumulator: &mut dyn DerivativeAccumulator,
    ) -> OrbitDynResult<()> {
        let mu = state.orbit.frame.gm();
        accumulator.add_acceleration(LocalFrame::Inertial, self.acceleration(&pv.position, mu));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn j2_acceleration_is_antiparallel_to_radius_at_the_pole() {
        let model = J2ZonalGravity::new(1.08263e-3, 6_378_137.0);
        let position = Vector3::new(0.0, 0.0, 7_000_000.0);
        let accel = model.acceleration(&position, 3.986004415e14);
        assert!(accel.x.abs() < 1e-12);
        assert!(accel.y.abs() < 1e-12);
        assert!(accel.z < 0.0);
    }
}
