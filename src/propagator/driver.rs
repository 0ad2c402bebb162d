//! See the module-level docs in [`super`].
//!
//! Re-architected per the source's design notes: instead of binding
//! mutable propagator state to fields read back by the integrator
//! callback (the "this-is-both-a-propagator-and-an-ODE-system" idiom),
//! the derivative closure built in [`PropagationDriver::propagate_impl`]
//! closes over a `PropagationContext` of `Rc<RefCell<_>>` cells private
//! to one `propagate` call: the sticky error slot, the most recent
//! additional-state rates, and the running additional-state snapshot.
//! Nothing here is reachable outside that one call.

use crate::dynamics::{ForceModel, GaussDerivativeAccumulator};
use crate::errors::{OrbitDynError, OrbitDynResult};
use crate::events::{EventAction, EventFunction};
use crate::ephemeris::DenseEphemeris;
use crate::orbit::Equinoctial;
use crate::propagators::{ErrorCtrl, FixedStepHandler, HermiteSegment, PropOpts, Propagator, StateVec, StepHandler, RK};
use crate::spacecraft::SpacecraftState;
use hifitime::{Duration, Epoch};
use log::debug;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Driver lifecycle (spec §4.3). `Running` only exists for the duration
/// of one `propagate*` call; Rust's borrow checker already forbids
/// re-entrant `addForceModel`/`propagate` calls during that window (both
/// take `&mut self`), so this enum exists for observability and for the
/// explicit state-machine contract the specification calls for, not as
/// the only safety net.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Terminal,
}

enum StepOutcome {
    /// The step was accepted in full; integration continues from `(t, y)`.
    Normal,
    /// An event truncated the step at `(t, y)`; integration resumes from
    /// there (used for `RESET_STATE`/`RESET_DERIVATIVES`).
    Truncate { t: f64, y: StateVec },
    /// An event requested `STOP`; `(t, y)` is the final state.
    Stop { t: f64, y: StateVec },
}

/// Sequences one propagation from `(initialState, finalDate)` (spec
/// §4.3). Owns the registered force models and their wired-in event
/// functions; the integrator itself is constructed fresh for each
/// `propagate*` call since its Butcher tableau is chosen per call via
/// the `T: RK` type parameter.
pub struct PropagationDriver<'a, E: ErrorCtrl> {
    force_models: Vec<&'a dyn ForceModel>,
    event_functions: Vec<Box<dyn EventFunction>>,
    opts: PropOpts<E>,
    state: DriverState,
    error: Option<OrbitDynError>,
}

impl<'a, E: ErrorCtrl> PropagationDriver<'a, E> {
    pub fn new(opts: PropOpts<E>) -> Self {
        Self {
            force_models: Vec::new(),
            event_functions: Vec::new(),
            opts,
            state: DriverState::Idle,
            error: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The sticky error from the most recent failed propagation, if any
    /// (spec §7: surfaced once, then the driver returns to `IDLE`).
    pub fn last_error(&self) -> Option<&OrbitDynError> {
        self.error.as_ref()
    }

    /// Registers a force model, wiring any event functions it exposes
    /// into the driver (spec §4.3). `IDLE` only.
    pub fn add_force_model(&mut self, model: &'a dyn ForceModel) -> OrbitDynResult<()> {
        if self.state != DriverState::Idle {
            return Err(OrbitDynError::ArgumentError(
                "cannot add a force model while a propagation is running".to_string(),
            ));
        }
        self.event_functions.extend(model.switching_functions());
        self.force_models.push(model);
        Ok(())
    }

    /// Drops all registered force models and their event functions.
    /// `IDLE` only. With none registered, propagation reduces to pure
    /// Keplerian evolution.
    pub fn remove_all_force_models(&mut self) -> OrbitDynResult<()> {
        if self.state != DriverState::Idle {
            return Err(OrbitDynError::ArgumentError(
                "cannot clear force models while a propagation is running".to_string(),
            ));
        }
        self.force_models.clear();
        self.event_functions.clear();
        Ok(())
    }

    /// The minimal propagation form: returns only the terminal state.
    pub fn propagate<T: RK>(&mut self, initial: &SpacecraftState, final_date: Epoch) -> OrbitDynResult<SpacecraftState> {
        self.propagate_impl::<T>(initial, final_date, None, None, None)
    }

    /// Propagates while recording a dense-output ephemeris.
    pub fn propagate_with_ephemeris<T: RK>(
        &mut self,
        initial: &SpacecraftState,
        final_date: Epoch,
        ephemeris: &mut DenseEphemeris,
    ) -> OrbitDynResult<SpacecraftState> {
        self.propagate_impl::<T>(initial, final_date, Some(ephemeris), None, None)
    }

    /// Propagates, sampling `handler` at `initial + k*fixed_step`
    /// (`k = 0, 1, ...`) and always at `final_date`, independent of the
    /// integrator's native step size (spec §8 S4).
    pub fn propagate_fixed_step<T: RK>(
        &mut self,
        initial: &SpacecraftState,
        final_date: Epoch,
        fixed_step: f64,
        handler: &mut dyn FixedStepHandler,
    ) -> OrbitDynResult<SpacecraftState> {
        self.propagate_impl::<T>(initial, final_date, None, None, Some((fixed_step, handler)))
    }

    /// Propagates, invoking `handler` after every accepted native
    /// integrator step.
    pub fn propagate_with_step_handler<T: RK>(
        &mut self,
        initial: &SpacecraftState,
        final_date: Epoch,
        handler: &mut dyn StepHandler,
    ) -> OrbitDynResult<SpacecraftState> {
        self.propagate_impl::<T>(initial, final_date, None, Some(handler), None)
    }

    fn propagate_impl<T: RK>(
        &mut self,
        initial: &SpacecraftState,
        final_date: Epoch,
        mut ephemeris: Option<&mut DenseEphemeris>,
        mut step_handler: Option<&mut dyn StepHandler>,
        mut fixed_step: Option<(f64, &mut dyn FixedStepHandler)>,
    ) -> OrbitDynResult<SpacecraftState> {
        self.error = None;

        if !(initial.mass_kg > 0.0) {
            return Err(OrbitDynError::ArgumentError(format!(
                "mass must be strictly positive, got {} kg",
                initial.mass_kg
            )));
        }
        if initial.epoch == final_date {
            return Ok(initial.clone());
        }

        self.state = DriverState::Running;

        let frame = initial.orbit.frame;
        let mu = frame.gm();
        let retrograde = initial.orbit.retrograde;
        let epoch0 = initial.epoch;
        let direction = if final_date > epoch0 { 1.0 } else { -1.0 };
        let target_t = (final_date - epoch0).to_seconds();

        let mut y: StateVec = [0.0; 7];
        y[..6].copy_from_slice(&initial.orbit.as_array());
        y[6] = initial.mass_kg;

        let sticky: Rc<RefCell<Option<OrbitDynError>>> = Rc::new(RefCell::new(None));
        let latest_additional_rate: Rc<RefCell<BTreeMap<String, Vec<f64>>>> = Rc::new(RefCell::new(BTreeMap::new()));
        let running_additional: Rc<RefCell<BTreeMap<String, Vec<f64>>>> =
            Rc::new(RefCell::new(initial.additional_map().clone()));

        let derive = {
            let sticky = Rc::clone(&sticky);
            let latest_additional_rate = Rc::clone(&latest_additional_rate);
            let running_additional = Rc::clone(&running_additional);
            let force_models = self.force_models.clone();
            move |t: f64, y: &StateVec| -> StateVec {
                if sticky.borrow().is_some() {
                    return [0.0; 7];
                }
                let eq = Equinoctial::from_array(y, retrograde, frame);
                let pv = eq.to_pv(mu);
                let epoch = epoch0 + Duration::from_seconds(t);
                let mass = y[6];
                let mut transient = match SpacecraftState::new(eq, epoch, mass) {
                    Ok(s) => s,
                    Err(_) => {
                        *sticky.borrow_mut() = Some(OrbitDynError::PropagationError(format!(
                            "mass reached {mass} kg during integration"
                        )));
                        return [0.0; 7];
                    }
                };
                for (name, values) in running_additional.borrow().iter() {
                    transient = transient.with_additional(name.clone(), values.clone());
                }

                let mut accumulator = GaussDerivativeAccumulator::new(&eq, &pv, mu);
                for model in &force_models {
                    if let Err(e) = model.add_contribution(epoch, &pv, &transient, &mut accumulator) {
                        *sticky.borrow_mut() = Some(e);
                        return [0.0; 7];
                    }
                }
                accumulator.add_kepler_contribution();
                let (buf, rates, err) = accumulator.finish();
                if let Some(e) = err {
                    *sticky.borrow_mut() = Some(e);
                    return [0.0; 7];
                }
                *latest_additional_rate.borrow_mut() = rates;
                buf
            }
        };

        let mut prop = Propagator::<E>::new::<T>(Box::new(derive), self.opts);
        prop.set_direction(direction);

        let mut t = 0.0_f64;
        let mut next_fixed_k: i64 = 0;
        if let Some((_, handler)) = fixed_step.as_mut() {
            handler.handle(0.0, &y, target_t == 0.0);
            next_fixed_k = 1;
        }

        let result: OrbitDynResult<(f64, StateVec)> = 'outer: loop {
            if reached(t, target_t, direction) {
                break Ok((t, y));
            }

            let (mut t_new, mut y_new, mut segment) = prop.step(t, &y);
            if overshot(t_new, target_t, direction) {
                prop.set_fixed_step(target_t - t);
                let (t2, y2, seg2) = prop.step(t, &y);
                t_new = t2;
                y_new = y2;
                segment = seg2;
            }

            if let Some(e) = sticky.borrow_mut().take() {
                break Err(e);
            }

            let dt_taken = t_new - t;
            {
                let mut running = running_additional.borrow_mut();
                for (name, rate) in latest_additional_rate.borrow().iter() {
                    let entry = running.entry(name.clone()).or_insert_with(|| vec![0.0; rate.len()]);
                    for (slot, r) in entry.iter_mut().zip(rate) {
                        *slot += dt_taken * r;
                    }
                }
            }

            if let Some(eph) = ephemeris.as_deref_mut() {
                eph.set_additional(running_additional.borrow().clone());
            }

            let outcome = self.check_events(t, t_new, &segment, mu, frame, retrograde, epoch0);
            match outcome {
                StepOutcome::Stop { t: root_t, y: root_y } => {
                    if let Some(eph) = ephemeris.as_deref_mut() {
                        eph.push_segment(truncate_segment(&segment, root_t));
                    }
                    if let Some(h) = step_handler.as_deref_mut() {
                        h.handle(root_t, &root_y, true);
                    }
                    break 'outer Ok((root_t, root_y));
                }
                StepOutcome::Truncate { t: root_t, y: root_y } => {
                    if let Some(eph) = ephemeris.as_deref_mut() {
                        eph.push_segment(truncate_segment(&segment, root_t));
                    }
                    t = root_t;
                    y = root_y;
                    continue 'outer;
                }
                StepOutcome::Normal => {}
            }

            if let Some(eph) = ephemeris.as_deref_mut() {
                eph.push_segment(segment);
            }
            if let Some((dt, handler)) = fixed_step.as_mut() {
                while sample_due(next_fixed_k, *dt, t_new, target_t, direction) {
                    let sample_t = next_fixed_k as f64 * dt.abs() * direction;
                    let sample_y = segment.evaluate(sample_t);
                    let is_last = (sample_t - target_t).abs() <= 1e-9;
                    handler.handle(sample_t, &sample_y, is_last);
                    next_fixed_k += 1;
                }
            }
            let is_last = reached(t_new, target_t, direction);
            if let Some(h) = step_handler.as_deref_mut() {
                h.handle(t_new, &y_new, is_last);
            }

            t = t_new;
            y = y_new;
        };

        match result {
            Ok((t_final, y_final)) => {
                self.state = DriverState::Idle;
                let eq = Equinoctial::from_array(&y_final, retrograde, frame);
                let epoch_final = epoch0 + Duration::from_seconds(t_final);
                let mut out = SpacecraftState::new(eq, epoch_final, y_final[6])?;
                for (name, values) in running_additional.borrow().iter() {
                    out = out.with_additional(name.clone(), values.clone());
                }
                Ok(out)
            }
            Err(e) => {
                self.state = DriverState::Idle;
                self.error = Some(e.clone());
                debug!("propagation failed: {e}");
                Err(e)
            }
        }
    }

    /// Finds the earliest event root within `[t0, t1]` across every
    /// registered detector (spec §4.4: ties broken by registration
    /// order), applies its action, and reports what the main loop should
    /// do next.
    fn check_events(
        &self,
        t0: f64,
        t1: f64,
        segment: &HermiteSegment,
        mu: f64,
        frame: crate::frame::Frame,
        retrograde: bool,
        epoch0: Epoch,
    ) -> StepOutcome {
        if self.event_functions.is_empty() {
            return StepOutcome::Normal;
        }

        let g_of = |det: &dyn EventFunction, t: f64| -> f64 {
            let y = segment.evaluate(t);
            let eq = Equinoctial::from_array(&y, retrograde, frame);
            let pv = eq.to_pv(mu);
            let epoch = epoch0 + Duration::from_seconds(t);
            det.g(epoch, &pv.position, &pv.velocity, frame)
        };

        let mut roots: Vec<(f64, usize)> = Vec::new();
        for (idx, det) in self.event_functions.iter().enumerate() {
            // Sample g at no coarser than max_check_interval apart within
            // this step, so a sign change that occurs and reverts inside
            // one oversized native step is not missed (spec §4.4).
            let span = t1 - t0;
            let max_interval = det.max_check_interval();
            let subdivisions = if max_interval.is_finite() && max_interval > 0.0 {
                (span.abs() / max_interval).ceil().max(1.0) as usize
            } else {
                1
            };
            let h = span / subdivisions as f64;

            let mut prev_t = t0;
            let mut prev_g = g_of(det.as_ref(), prev_t);
            if !prev_g.is_finite() {
                continue;
            }
            if prev_g == 0.0 {
                roots.push((t0, idx));
                continue;
            }

            for k in 1..=subdivisions {
                let cur_t = if k == subdivisions { t1 } else { t0 + h * k as f64 };
                let cur_g = g_of(det.as_ref(), cur_t);
                if !cur_g.is_finite() {
                    break;
                }
                if cur_g == 0.0 {
                    roots.push((cur_t, idx));
                    break;
                }
                if cur_g.signum() != prev_g.signum() {
                    let root = bisect(
                        |t| g_of(det.as_ref(), t),
                        prev_t,
                        cur_t,
                        prev_g,
                        det.threshold(),
                        det.max_iterations(),
                    );
                    roots.push((root, idx));
                    break;
                }
                prev_t = cur_t;
                prev_g = cur_g;
            }
        }
        roots.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

        for (root_t, idx) in roots {
            let det = &self.event_functions[idx];
            let y_root = segment.evaluate(root_t);
            let eq = Equinoctial::from_array(&y_root, retrograde, frame);
            let pv = eq.to_pv(mu);
            let epoch = epoch0 + Duration::from_seconds(root_t);
            match det.event_occurred(epoch, &pv.position, &pv.velocity, frame) {
                EventAction::Continue => continue,
                EventAction::ResetDerivatives => continue,
                EventAction::Stop => return StepOutcome::Stop { t: root_t, y: y_root },
                EventAction::ResetState => {
                    let mut reset_y = y_root;
                    reset_y[6] = det.reset_mass(y_root[6]);
                    return StepOutcome::Truncate { t: root_t, y: reset_y };
                }
            }
        }
        StepOutcome::Normal
    }
}

fn reached(t: f64, target: f64, direction: f64) -> bool {
    if direction > 0.0 {
        t >= target
    } else {
        t <= target
    }
}

fn overshot(t: f64, target: f64, direction: f64) -> bool {
    if direction > 0.0 {
        t > target
    } else {
        t < target
    }
}

fn sample_due(k: i64, dt: f64, t_new: f64, target: f64, direction: f64) -> bool {
    let sample_t = k as f64 * dt.abs() * direction;
    if direction > 0.0 {
        sample_t <= t_new + 1e-9 && sample_t <= target + 1e-9
    } else {
        sample_t >= t_new - 1e-9 && sample_t >= target - 1e-9
    }
}

fn truncate_segment(segment: &HermiteSegment, t_cut: f64) -> HermiteSegment {
    let y_cut = segment.evaluate(t_cut);
    let dy_cut = derivative_at(segment, t_cut);
    HermiteSegment {
        t0: segment.t0,
        t1: t_cut,
        y0: segment.y0,
        y1: y_cut,
        dy0: segment.dy0,
        dy1: dy_cut,
    }
}

/// Finite-difference estimate of `dy/dt` at `t` from the segment's cubic
/// Hermite interpolant; used only to build a truncated segment's closing
/// tangent when an event cuts a step short.
fn derivative_at(segment: &HermiteSegment, t: f64) -> StateVec {
    let h = (segment.t1 - segment.t0).abs() * 1e-4;
    let h = if h == 0.0 { 1e-6 } else { h };
    let a = segment.evaluate(t - h);
    let b = segment.evaluate(t + h);
    let mut out = [0.0; 7];
    for i in 0..7 {
        out[i] = (b[i] - a[i]) / (2.0 * h);
    }
    out
}

fn bisect(g: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, g_lo: f64, threshold: f64, max_iter: u32) -> f64 {
    let mut glo = g_lo;
    for _ in 0..max_iter {
        if (hi - lo).abs() <= threshold {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let gm = g(mid);
        if gm == 0.0 {
            return mid;
        }
        if gm.signum() == glo.signum() {
            lo = mid;
            glo = gm;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}
