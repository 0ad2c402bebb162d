use approx::assert_relative_eq;
use astrodyn_core::dynamics::J2ZonalGravity;
use astrodyn_core::events::{EventAction, EventFunction};
use astrodyn_core::frame::Frame;
use astrodyn_core::orbit::{eccentric_to_mean, true_to_eccentric, Equinoctial, LongitudeKind};
use astrodyn_core::propagator::PropagationDriver;
use astrodyn_core::propagators::{Dormand45, FixedStepHandler, PropOpts, RSSStepPV};
use astrodyn_core::spacecraft::SpacecraftState;
use hifitime::{Duration, Epoch};
use nalgebra::Vector3;
use std::f64::consts::PI;

const MU_EARTH: f64 = 3.986_004_415e14;

fn earth() -> Frame {
    Frame::new("EME2000", MU_EARTH)
}

fn epoch0() -> Epoch {
    Epoch::from_gregorian_utc_at_midnight(2026, 1, 1)
}

fn tight_opts() -> PropOpts<RSSStepPV> {
    PropOpts::with_adaptive_step(1e-3, 120.0, 1e-12, RSSStepPV {})
}

/// S1: a circular orbit propagated over exactly one period returns to
/// its starting PV.
#[test]
fn pure_kepler_round_trip_over_one_period() {
    let _ = pretty_env_logger::try_init();
    let a = 7_000_000.0;
    let frame = earth();
    let orbit = Equinoctial::from_elements(a, 0.0, 0.0, 0.0, 0.0, 0.0, LongitudeKind::True, false, frame)
        .unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 1000.0).unwrap();
    let period = 2.0 * PI * (a.powi(3) / MU_EARTH).sqrt();

    let mut driver = PropagationDriver::new(tight_opts());
    let final_state = driver
        .propagate::<Dormand45>(&initial, epoch0() + Duration::from_seconds(period))
        .expect("pure Kepler propagation must not fail");

    let pv0 = initial.orbit.to_pv(MU_EARTH);
    let pv1 = final_state.orbit.to_pv(MU_EARTH);
    assert_relative_eq!(pv0.position.x, pv1.position.x, epsilon = 1.0);
    assert_relative_eq!(pv0.position.y, pv1.position.y, epsilon = 1.0);
    assert_relative_eq!(pv0.position.z, pv1.position.z, epsilon = 1.0);
}

/// Propagating backward in time (`final_date < initial.epoch`) must
/// integrate with a negative step direction and actually terminate,
/// landing back on the starting state.
#[test]
fn backward_propagation_returns_to_the_starting_state() {
    let a = 7_000_000.0;
    let frame = earth();
    let orbit = Equinoctial::from_elements(a, 0.05, 0.0, 0.0, 0.0, 0.7, LongitudeKind::True, false, frame)
        .unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 1000.0).unwrap();
    let period = 2.0 * PI * (a.powi(3) / MU_EARTH).sqrt();
    let forward_target = epoch0() + Duration::from_seconds(period * 0.3);

    let mut driver = PropagationDriver::new(tight_opts());
    let forward_state = driver
        .propagate::<Dormand45>(&initial, forward_target)
        .expect("forward leg must not fail");

    let mut driver_back = PropagationDriver::new(tight_opts());
    let back_state = driver_back
        .propagate::<Dormand45>(&forward_state, epoch0())
        .expect("backward propagation must terminate and not fail");

    let epoch_gap = (back_state.epoch - epoch0()).to_seconds();
    assert!(epoch_gap.abs() < 1e-6, "backward leg should land on epoch0, off by {epoch_gap}s");
    let pv0 = initial.orbit.to_pv(MU_EARTH);
    let pv_back = back_state.orbit.to_pv(MU_EARTH);
    assert_relative_eq!(pv0.position.x, pv_back.position.x, epsilon = 1.0);
    assert_relative_eq!(pv0.position.y, pv_back.position.y, epsilon = 1.0);
    assert_relative_eq!(pv0.position.z, pv_back.position.z, epsilon = 1.0);
}

/// S2 (property 1/5 surrogate): registering a J2 zonal term changes the
/// final state relative to the unperturbed Kepler propagation, and the
/// node regression after one day is within 1% of the analytical rate.
#[test]
fn j2_secular_drift_matches_analytical_node_regression() {
    let a = 7_200_000.0;
    let inc = 98.7_f64.to_radians();
    let e = 1e-3;
    let raan = 0.0_f64;
    let frame = earth();
    let hx = (inc / 2.0).tan() * raan.cos();
    let hy = (inc / 2.0).tan() * raan.sin();
    let orbit =
        Equinoctial::from_elements(a, e, 0.0, hx, hy, 0.0, LongitudeKind::True, false, frame).unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 500.0).unwrap();

    let j2_model = J2ZonalGravity::new(1.08263e-3, 6_378_137.0);
    let mut driver = PropagationDriver::new(tight_opts());
    driver.add_force_model(&j2_model).unwrap();

    let one_day = Duration::from_seconds(86_400.0);
    let final_state = driver
        .propagate::<Dormand45>(&initial, epoch0() + one_day)
        .expect("J2 propagation must not fail");

    let raan_final = final_state.orbit.hy.atan2(final_state.orbit.hx);
    let n = (MU_EARTH / a.powi(3)).sqrt();
    let p = a * (1.0 - e * e);
    let r_e = 6_378_137.0_f64;
    let raan_dot_analytical = -1.5 * n * 1.08263e-3 * (r_e / p).powi(2) * inc.cos();
    let raan_dot_numerical = raan_final / 86_400.0;

    assert!(
        (raan_dot_numerical - raan_dot_analytical).abs() < 0.01 * raan_dot_analytical.abs(),
        "numerical {raan_dot_numerical} vs analytical {raan_dot_analytical}"
    );
}

struct PeriapsisDetector;

impl EventFunction for PeriapsisDetector {
    fn g(&self, _date: Epoch, position: &Vector3<f64>, velocity: &Vector3<f64>, _frame: Frame) -> f64 {
        position.dot(velocity)
    }

    fn threshold(&self) -> f64 {
        1e-6
    }

    fn event_occurred(&self, _date: Epoch, _position: &Vector3<f64>, _velocity: &Vector3<f64>, _frame: Frame) -> EventAction {
        EventAction::Stop
    }
}

struct PeriapsisForceModel;

impl astrodyn_core::dynamics::ForceModel for PeriapsisForceModel {
    fn add_contribution(
        &self,
        _epoch: Epoch,
        _pv: &astrodyn_core::PVCoordinates,
        _state: &SpacecraftState,
        _accumulator: &mut dyn astrodyn_core::dynamics::DerivativeAccumulator,
    ) -> astrodyn_core::OrbitDynResult<()> {
        Ok(())
    }

    fn switching_functions(&self) -> Vec<Box<dyn EventFunction>> {
        vec![Box::new(PeriapsisDetector)]
    }
}

/// S3: an elliptical orbit started away from either apsis, propagated
/// with a periapsis detector that returns `STOP`, halts exactly at the
/// first periapsis: both `p.v ~ 0` and the elapsed time match the
/// analytically computed time-to-periapsis.
#[test]
fn event_triggered_stop_at_periapsis() {
    let a = 8_000_000.0;
    let e = 0.2;
    let frame = earth();
    // Periapsis is at Lv = 0 (ex = e, ey = 0); start a quarter-turn away
    // from it, at Lv = pi/2, so g = p.v is already nonzero at t = 0 and
    // the detector cannot fire immediately on roundoff.
    let lv0 = PI / 2.0;
    let orbit = Equinoctial::from_elements(a, e, 0.0, 0.0, 0.0, lv0, LongitudeKind::True, false, frame)
        .unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 1000.0).unwrap();

    let detector_model = PeriapsisForceModel;
    let mut driver = PropagationDriver::new(tight_opts());
    driver.add_force_model(&detector_model).unwrap();

    let period = 2.0 * PI * (a.powi(3) / MU_EARTH).sqrt();
    let final_state = driver
        .propagate::<Dormand45>(&initial, epoch0() + Duration::from_seconds(period))
        .expect("event-stopped propagation must not fail");

    let pv = final_state.orbit.to_pv(MU_EARTH);
    let p_dot_v = pv.position.dot(&pv.velocity);
    assert!(p_dot_v.abs() < 1e-3, "p.v = {p_dot_v} should be ~0 at periapsis");

    // Time-to-periapsis from Lv0, via the mean longitude (periapsis is at
    // mean longitude 0 mod 2*pi, and mean longitude advances linearly
    // with time at the mean motion n).
    let f0 = true_to_eccentric(lv0, e, 0.0);
    let m0 = eccentric_to_mean(f0, e, 0.0);
    let n = (MU_EARTH / a.powi(3)).sqrt();
    let expected_dt = (2.0 * PI - m0).rem_euclid(2.0 * PI) / n;
    let actual_dt = (final_state.epoch - epoch0()).to_seconds();
    assert_relative_eq!(actual_dt, expected_dt, epsilon = 1e-3);
}

struct CountingHandler {
    samples: Vec<(f64, bool)>,
}

impl FixedStepHandler for CountingHandler {
    fn handle(&mut self, t: f64, _y: &astrodyn_core::propagators::StateVec, is_last: bool) {
        self.samples.push((t, is_last));
    }
}

/// S4: a 3600 s propagation sampled every 60 s produces exactly 61 calls
/// at `k * 60 s`, with `isLast` true only on the last.
#[test]
fn fixed_step_resampling_produces_expected_call_pattern() {
    let a = 7_000_000.0;
    let frame = earth();
    let orbit = Equinoctial::from_elements(a, 0.0, 0.0, 0.0, 0.0, 0.0, LongitudeKind::True, false, frame)
        .unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 1000.0).unwrap();

    let mut driver = PropagationDriver::new(tight_opts());
    let mut handler = CountingHandler { samples: Vec::new() };
    driver
        .propagate_fixed_step::<Dormand45>(&initial, epoch0() + Duration::from_seconds(3600.0), 60.0, &mut handler)
        .expect("fixed-step propagation must not fail");

    assert_eq!(handler.samples.len(), 61);
    for (k, (t, is_last)) in handler.samples.iter().enumerate() {
        assert_relative_eq!(*t, k as f64 * 60.0, epsilon = 1e-6);
        assert_eq!(*is_last, k == 60);
    }
}

/// S5: a non-positive initial mass is rejected before any integration.
#[test]
fn rejected_mass_raises_argument_error_before_integration() {
    let frame = earth();
    let orbit =
        Equinoctial::from_elements(7_000_000.0, 0.0, 0.0, 0.0, 0.0, 0.0, LongitudeKind::True, false, frame)
            .unwrap();
    let err = SpacecraftState::new(orbit, epoch0(), 0.0).unwrap_err();
    assert!(matches!(err, astrodyn_core::OrbitDynError::ArgumentError(_)));
}

/// S6: a dense-output ephemeris sampled mid-interval agrees with a
/// second propagation stopped at that same date.
#[test]
fn dense_output_matches_a_second_propagation_stopped_early() {
    let a = 7_000_000.0;
    let frame = earth();
    let orbit = Equinoctial::from_elements(a, 1e-3, 0.0, 0.0, 0.0, 0.3, LongitudeKind::True, false, frame)
        .unwrap();
    let initial = SpacecraftState::new(orbit, epoch0(), 1000.0).unwrap();

    let mut driver_a = PropagationDriver::new(tight_opts());
    let mut ephemeris = astrodyn_core::ephemeris::DenseEphemeris::new(epoch0(), MU_EARTH, frame, false);
    driver_a
        .propagate_with_ephemeris::<Dormand45>(&initial, epoch0() + Duration::from_seconds(1000.0), &mut ephemeris)
        .expect("ephemeris-producing propagation must not fail");

    let mid = epoch0() + Duration::from_seconds(500.0);
    let from_ephemeris = ephemeris.evaluate(mid).expect("500s is inside the ephemeris bounds");

    let mut driver_b = PropagationDriver::new(tight_opts());
    let from_restart = driver_b
        .propagate::<Dormand45>(&initial, mid)
        .expect("restart propagation to 500s must not fail");

    let pv_a = from_ephemeris.orbit.to_pv(MU_EARTH);
    let pv_b = from_restart.orbit.to_pv(MU_EARTH);
    assert_relative_eq!(pv_a.position.x, pv_b.position.x, epsilon = 10.0);
    assert_relative_eq!(pv_a.position.y, pv_b.position.y, epsilon = 10.0);
    assert_relative_eq!(pv_a.position.z, pv_b.position.z, epsilon = 10.0);
}
