//! Generic first-order ODE integrator abstraction (spec §4.5): an
//! embedded Runge-Kutta stepper operating on the fixed 7-element state
//! `{a, ex, ey, hx, hy, Lv, m}`, producing Hermite dense-output segments
//! as it goes. Adapted from the teacher's monomorphic `Propagator`, with
//! the `Dynamics` trait / `VectorN<f64, N>` generics collapsed to a plain
//! `[f64; 7]` and a closure since the state size here is fixed by the
//! orbital element model rather than generic over a dimension.

use log::warn;
use std::f64;

pub mod error_ctrl;
mod dormand;
mod rk;

pub use dormand::Dormand45;
pub use error_ctrl::{ErrorCtrl, RSSStep, RSSStepPV};
pub use rk::RK4;

/// The fixed-size state vector threaded through the integrator.
pub type StateVec = [f64; 7];

fn zero_state() -> StateVec {
    [0.0; 7]
}

/// Defines a Runge-Kutta method via its Butcher tableau (spec §4.5: "RK,
/// Dormand-Prince ... are implementation-defined").
pub trait RK
where
    Self: Sized,
{
    /// Order used for adaptive step-size control.
    fn order() -> u8;
    /// Number of stages (derivative evaluations per step).
    fn stages() -> usize;
    /// Flattened lower-triangular `a_ij` coefficients, row-major,
    /// `stages*(stages-1)/2` entries.
    fn a_coeffs() -> &'static [f64];
    /// `b_i` followed by `b*_i` (only meaningful when `stages != order`,
    /// i.e. an adaptive/embedded method); `2 * stages` entries.
    fn b_coeffs() -> &'static [f64];
}

/// Per-step integration diagnostics (teacher precedent: `IntegrationDetails`).
#[derive(Clone, Copy, Debug)]
pub struct IntegrationDetails {
    pub step: f64,
    pub error: f64,
    pub attempts: u8,
}

/// Integrator tuning knobs (teacher precedent: `PropOpts`).
#[derive(Clone, Copy, Debug)]
pub struct PropOpts<E: ErrorCtrl> {
    init_step: f64,
    min_step: f64,
    max_step: f64,
    tolerance: f64,
    attempts: u8,
    fixed_step: bool,
    errctrl: E,
}

impl<E: ErrorCtrl> PropOpts<E> {
    pub fn with_fixed_step(step: f64, errctrl: E) -> Self {
        Self {
            init_step: step,
            min_step: step,
            max_step: step,
            tolerance: 0.0,
            fixed_step: true,
            attempts: 0,
            errctrl,
        }
    }

    /// Attempts budget is fixed at 50, matching the Kepler-iteration
    /// convention used throughout this crate (spec §4.1).
    pub fn with_adaptive_step(min_step: f64, max_step: f64, tolerance: f64, errctrl: E) -> Self {
        Self {
            init_step: max_step,
            min_step,
            max_step,
            tolerance,
            attempts: 50,
            fixed_step: false,
            errctrl,
        }
    }
}

impl Default for PropOpts<RSSStepPV> {
    fn default() -> Self {
        Self {
            init_step: 60.0,
            min_step: 0.001,
            max_step: 2700.0,
            tolerance: 1e-12,
            attempts: 50,
            fixed_step: false,
            errctrl: RSSStepPV {},
        }
    }
}

/// A per-step cubic Hermite segment: enough to interpolate the state (and
/// its derivative) anywhere in `[t0, t1]` using only the two endpoint
/// evaluations the integrator already computed (spec §4.6: "per-step
/// Hermite-interpolation coefficients").
#[derive(Clone, Copy, Debug)]
pub struct HermiteSegment {
    pub t0: f64,
    pub t1: f64,
    pub y0: StateVec,
    pub y1: StateVec,
    pub dy0: StateVec,
    pub dy1: StateVec,
}

impl HermiteSegment {
    pub fn contains(&self, t: f64) -> bool {
        let (lo, hi) = if self.t0 <= self.t1 {
            (self.t0, self.t1)
        } else {
            (self.t1, self.t0)
        };
        t >= lo && t <= hi
    }

    /// Cubic Hermite interpolation of the state at `t ∈ [t0, t1]`.
    pub fn evaluate(&self, t: f64) -> StateVec {
        let h = self.t1 - self.t0;
        if h == 0.0 {
            return self.y0;
        }
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        let mut out = zero_state();
        for i in 0..7 {
            out[i] =
                h00 * self.y0[i] + h10 * h * self.dy0[i] + h01 * self.y1[i] + h11 * h * self.dy1[i];
        }
        out
    }
}

/// Wraps a user-supplied first-order ODE system `f(t, y) -> dy/dt` with an
/// embedded Runge-Kutta stepper and adaptive step-size control. Generic
/// over the error-control strategy only; the Butcher tableau is selected
/// once at construction via `new::<T: RK>`.
pub struct Propagator<'a, E: ErrorCtrl> {
    derive: Box<dyn FnMut(f64, &StateVec) -> StateVec + 'a>,
    opts: PropOpts<E>,
    details: IntegrationDetails,
    step_size: f64,
    order: u8,
    stages: usize,
    a_coeffs: &'static [f64],
    b_coeffs: &'static [f64],
    fixed_step: bool,
}

impl<'a, E: ErrorCtrl> Propagator<'a, E> {
    pub fn new<T: RK>(derive: Box<dyn FnMut(f64, &StateVec) -> StateVec + 'a>, opts: PropOpts<E>) -> Self {
        Self {
            derive,
            step_size: opts.init_step,
            opts,
            details: IntegrationDetails {
                step: 0.0,
                error: 0.0,
                attempts: 1,
            },
            stages: T::stages(),
            order: T::order(),
            a_coeffs: T::a_coeffs(),
            b_coeffs: T::b_coeffs(),
            fixed_step: T::stages() == usize::from(T::order()),
        }
    }

    pub fn set_fixed_step(&mut self, step_size: f64) {
        self.step_size = step_size;
        self.fixed_step = true;
    }

    /// Forces the working step size to carry `direction`'s sign, without
    /// switching into fixed-step mode. Must be called once, right after
    /// construction, before the first `step` when propagating backward in
    /// time: `init_step` is always positive (it comes from `max_step`),
    /// and every subsequent adaptive grow/shrink preserves whatever sign
    /// `step_size` already has (teacher precedent: `until_time_elapsed`'s
    /// `self.step_size *= -1.0` when the elapsed time is negative).
    pub fn set_direction(&mut self, direction: f64) {
        self.step_size = self.step_size.abs() * direction.signum();
    }

    pub fn latest_details(&self) -> &IntegrationDetails {
        &self.details
    }

    /// Advances one native integrator step from `(t, y)`, honoring the
    /// adaptive step-size loop until the error estimate clears tolerance
    /// (or the step/attempt budget is exhausted). Returns the new time,
    /// state, and a dense Hermite segment covering the step just taken.
    pub fn step(&mut self, t: f64, y: &StateVec) -> (f64, StateVec, HermiteSegment) {
        self.details.attempts = 1;
        loop {
            let mut k: Vec<StateVec> = Vec::with_capacity(self.stages);
            let k0 = (self.derive)(t, y);
            k.push(k0);
            let mut a_idx = 0usize;
            for _ in 0..(self.stages - 1) {
                let mut ci = 0.0;
                let mut wi = zero_state();
                for kj in &k {
                    let a_ij = self.a_coeffs[a_idx];
                    ci += a_ij;
                    for i in 0..7 {
                        wi[i] += a_ij * kj[i];
                    }
                    a_idx += 1;
                }
                let mut yi = zero_state();
                for i in 0..7 {
                    yi[i] = y[i] + self.step_size * wi[i];
                }
                let ki = (self.derive)(t + ci * self.step_size, &yi);
                k.push(ki);
            }

            let mut next_state = *y;
            let mut error_est = zero_state();
            for (idx, ki) in k.iter().enumerate() {
                let b_i = self.b_coeffs[idx];
                if !self.fixed_step {
                    let b_i_star = self.b_coeffs[idx + self.stages];
                    for i in 0..7 {
                        error_est[i] += self.step_size * (b_i - b_i_star) * ki[i];
                    }
                }
                for i in 0..7 {
                    next_state[i] += self.step_size * b_i * ki[i];
                }
            }

            if self.fixed_step {
                self.details.step = self.step_size;
                let dy1 = (self.derive)(t + self.details.step, &next_state);
                let segment = HermiteSegment {
                    t0: t,
                    t1: t + self.details.step,
                    y0: *y,
                    y1: next_state,
                    dy0: k[0],
                    dy1,
                };
                return (t + self.details.step, next_state, segment);
            }

            self.details.error = E::estimate(&error_est, &next_state, y);
            if self.details.error <= self.opts.tolerance
                || self.step_size.abs() <= self.opts.min_step
                || self.details.attempts >= self.opts.attempts
            {
                if self.details.attempts >= self.opts.attempts {
                    warn!("maximum number of attempts reached ({})", self.details.attempts);
                }
                self.details.step = self.step_size;
                if self.details.error < self.opts.tolerance {
                    let proposed = 0.9
                        * self.step_size
                        * (self.opts.tolerance / self.details.error.max(f64::MIN_POSITIVE))
                            .powf(1.0 / f64::from(self.order));
                    self.step_size = clamp_step(proposed, self.opts.max_step);
                }
                let dy1 = (self.derive)(t + self.details.step, &next_state);
                let segment = HermiteSegment {
                    t0: t,
                    t1: t + self.details.step,
                    y0: *y,
                    y1: next_state,
                    dy0: k[0],
                    dy1,
                };
                return (t + self.details.step, next_state, segment);
            }

            self.details.attempts += 1;
            let proposed = 0.9
                * self.step_size
                * (self.opts.tolerance / self.details.error).powf(1.0 / f64::from(self.order - 1));
            self.step_size = clamp_step_min(proposed, self.opts.min_step);
        }
    }
}

fn clamp_step(proposed: f64, max_step: f64) -> f64 {
    if proposed.abs() > max_step.abs() {
        max_step.abs() * proposed.signum()
    } else {
        proposed
    }
}

fn clamp_step_min(proposed: f64, min_step: f64) -> f64 {
    if proposed.abs() < min_step.abs() {
        min_step.abs() * proposed.signum()
    } else {
        proposed
    }
}

/// Callback invoked after every accepted native integrator step (spec
/// §6's `StepHandler`).
pub trait StepHandler {
    fn handle(&mut self, t: f64, y: &StateVec, is_last: bool);
}

/// Callback invoked at uniformly spaced instants regardless of the
/// integrator's native step size (spec §6's `FixedStepHandler`, §8 S4).
pub trait FixedStepHandler {
    fn handle(&mut self, t: f64, y: &StateVec, is_last: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_vs_adaptive_step_classification() {
        assert!(Propagator::<RSSStepPV>::new::<RK4>(Box::new(|_, y| *y), PropOpts::with_fixed_step(1.0, RSSStepPV {}))
            .fixed_step);
        assert!(!Propagator::<RSSStepPV>::new::<Dormand45>(
            Box::new(|_, y| *y),
            PropOpts::with_adaptive_step(1e-3, 60.0, 1e-9, RSSStepPV {})
        )
        .fixed_step);
    }

    #[test]
    fn hermite_segment_reproduces_endpoints() {
        let seg = HermiteSegment {
            t0: 0.0,
            t1: 10.0,
            y0: [1.0; 7],
            y1: [2.0; 7],
            dy0: [0.1; 7],
            dy1: [0.1; 7],
        };
        let at0 = seg.evaluate(0.0);
        let at1 = seg.evaluate(10.0);
        for i in 0..7 {
            assert!((at0[i] - 1.0).abs() < 1e-12);
            assert!((at1[i] - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn options_hold_requested_tolerances() {
        let opts = PropOpts::with_adaptive_step(1e-2, 10.0, 1e-12, RSSStep {});
        assert_eq!(opts.min_step, 1e-2);
        assert_eq!(opts.max_step, 10.0);
        assert_eq!(opts.tolerance, 1e-12);
        assert!(!opts.fixed_step);

        let opts: PropOpts<RSSStepPV> = Default::default();
        assert_eq!(opts.init_step, 60.0);
        assert_eq!(opts.attempts, 50);
    }
}
