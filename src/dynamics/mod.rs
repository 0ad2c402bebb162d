//! Force models, the per-step derivative accumulator, and the Gauss
//! planetary-equations assembler that turns Cartesian accelerations into
//! equinoctial element rates (spec §3, §4.2).

pub mod forces;
pub mod gauss;

use crate::errors::OrbitDynResult;
use crate::events::EventFunction;
use crate::orbit::PVCoordinates;
use crate::spacecraft::SpacecraftState;
use hifitime::Epoch;
use nalgebra::Vector3;

pub use forces::J2ZonalGravity;
pub use gauss::GaussDerivativeAccumulator;

/// The local frame an acceleration contribution is expressed in (spec §3,
/// §4.2). A tagged sum rather than a subclass hierarchy: force models hand
/// the accumulator a frame-tagged vector and the assembler does the
/// frame-specific projection once, in one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalFrame {
    /// Expressed directly in the propagation (inertial) frame.
    Inertial,
    /// T along velocity, N in-plane completing the right-handed triad with
    /// W, W along the orbital angular momentum.
    Tnw,
    /// R radial outward, S in-plane perpendicular to R (prograde side), W
    /// cross-track (same W as TNW).
    Qsw,
}

/// Write-only interface a force model uses to contribute to the per-step
/// derivative buffer (spec §3's "force contribution accumulator"). Reset
/// once per integrator derivative evaluation and populated in arbitrary
/// order by however many force models are registered; finalized with the
/// Kepler term by the driver.
pub trait DerivativeAccumulator {
    /// Accumulates an acceleration expressed in the given local frame.
    fn add_acceleration(&mut self, frame: LocalFrame, accel: Vector3<f64>);

    /// Accumulates a mass flow rate, in kg/s (negative for depletion).
    fn add_mass_rate(&mut self, dmdt: f64);

    /// Accumulates derivatives of named additional states. Names not
    /// already present on the spacecraft state are ignored.
    fn add_additional_rate(&mut self, name: &str, rate: &[f64]);
}

/// A pluggable perturbing force (spec §3, §6). Borrowed for the duration
/// of a single propagation call; never owns the driver's mutable state.
pub trait ForceModel: Send + Sync {
    /// Adds this model's contribution to the accumulator, given the
    /// current date and osculating PV coordinates (already expressed in
    /// the propagation frame).
    fn add_contribution(
        &self,
        epoch: Epoch,
        pv: &PVCoordinates,
        state: &SpacecraftState,
        accumulator: &mut dyn DerivativeAccumulator,
    ) -> OrbitDynResult<()>;

    /// Event ("switching") functions this model wants the driver to watch
    /// for during integration. Most force models return an empty vector.
    fn switching_functions(&self) -> Vec<Box<dyn EventFunction>> {
        Vec::new()
    }
}
