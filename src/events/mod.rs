//! Event detection: the switching-function protocol a [`crate::dynamics::ForceModel`]
//! or a caller registers with the propagation driver to stop, or react to,
//! a zero crossing of some scalar function of the trajectory (spec §4.4).

use crate::frame::Frame;
use hifitime::Epoch;
use nalgebra::Vector3;

/// What the driver should do once an event's scalar function `g` has been
/// bracketed and its root refined to within [`EventFunction::threshold`]
/// (spec §4.4, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
    /// Keep integrating; the crossing was merely observed.
    Continue,
    /// Stop the propagation at this date; it becomes the new terminal
    /// state.
    Stop,
    /// Keep integrating, but force the derivative accumulator to be
    /// rebuilt from scratch on the next step (e.g. a force model was
    /// toggled).
    ResetDerivatives,
    /// Keep integrating, but first replace the state via
    /// [`EventFunction::reset_state`].
    ResetState,
}

/// A scalar switching function `g(date, pv) = 0` whose sign changes mark
/// the event (spec §4.4). The driver brackets sign changes between
/// accepted integrator steps, then refines the root by bisection/secant
/// to within `threshold`, never finer than `max_check_interval`'s
/// resolution allows.
pub trait EventFunction: Send + Sync {
    /// The scalar function whose sign change defines the event. Must be
    /// continuous in a neighborhood of each root; need not be smooth.
    fn g(&self, date: Epoch, position: &Vector3<f64>, velocity: &Vector3<f64>, frame: Frame) -> f64;

    /// Upper bound, in seconds, on the interval searched for a sign
    /// change before the driver gives up and assumes no crossing occurred
    /// within a step. Defaults to an unbounded (whole-step) search.
    fn max_check_interval(&self) -> f64 {
        f64::INFINITY
    }

    /// Convergence threshold, in seconds, for the root refinement.
    fn threshold(&self) -> f64 {
        1e-6
    }

    /// Maximum number of bisection/secant iterations spent refining a
    /// single root before the driver accepts the current bracket.
    fn max_iterations(&self) -> u32 {
        100
    }

    /// Called once a root has been refined to within `threshold`.
    fn event_occurred(&self, date: Epoch, position: &Vector3<f64>, velocity: &Vector3<f64>, frame: Frame) -> EventAction {
        let _ = (date, position, velocity, frame);
        EventAction::Stop
    }

    /// Invoked only when [`event_occurred`](Self::event_occurred) returns
    /// [`EventAction::ResetState`]; mutates the spacecraft mass in place
    /// (orbit resets go through the returned PV, left to the driver).
    /// The default is a no-op, since most events never request a state
    /// reset.
    fn reset_mass(&self, mass_kg: f64) -> f64 {
        mass_kg
    }
}
