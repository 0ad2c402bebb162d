use super::{DerivativeAccumulator, LocalFrame};
use crate::errors::OrbitDynError;
use crate::orbit::{Equinoctial, PVCoordinates};
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Implements the Gauss planetary equations in equinoctial form (spec
/// §4.2): accumulates acceleration, mass-rate, and additional-state-rate
/// contributions from however many force models are registered, and
/// finalizes them (by the driver, via [`add_kepler_contribution`]) into a
/// 7-element derivative vector ordered `{a, ex, ey, hx, hy, Lv, m}`.
///
/// Accelerations given in TNW or QSW/RSW are projected onto the radial /
/// transverse / normal triad derived from the *physical* osculating PV —
/// which is also the basis the equinoctial element rates below are
/// naturally expressed in, retrograde orbits included, since the 180
/// degree rotation used to keep `(hx, hy)` finite (see
/// [`crate::orbit::Equinoctial`]) is a proper rotation and therefore
/// preserves every dot product used here.
pub struct GaussDerivativeAccumulator {
    mu: f64,
    eq: Equinoctial,
    r_hat: Vector3<f64>,
    s_hat: Vector3<f64>,
    w_hat: Vector3<f64>,
    t_hat: Vector3<f64>,
    n_hat: Vector3<f64>,
    /// `A = sqrt(mu * a)`.
    cap_a: f64,
    /// `B = sqrt(1 - ex^2 - ey^2)`.
    cap_b: f64,
    /// `w = 1 + ex*cos(Lv) + ey*sin(Lv)`.
    w_scalar: f64,
    buf: [f64; 7],
    additional: BTreeMap<String, Vec<f64>>,
    error: Option<OrbitDynError>,
}

impl GaussDerivativeAccumulator {
    /// Resets and precomputes reusable scalars for one derivative
    /// evaluation (spec §4.2 `initDerivatives`).
    pub fn new(eq: &Equinoctial, pv: &PVCoordinates, mu: f64) -> Self {
        let r_hat = pv.position.normalize();
        let h_vec = pv.position.cross(&pv.velocity);
        let w_hat = h_vec.normalize();
        let s_hat = w_hat.cross(&r_hat);
        let t_hat = pv.velocity.normalize();
        let n_hat = w_hat.cross(&t_hat);

        let (sin_lv, cos_lv) = eq.lv.sin_cos();
        let w_scalar = 1.0 + eq.ex * cos_lv + eq.ey * sin_lv;
        let cap_a = (mu * eq.a).sqrt();
        let cap_b = (1.0 - eq.ex * eq.ex - eq.ey * eq.ey).sqrt();

        Self {
            mu,
            eq: *eq,
            r_hat,
            s_hat,
            w_hat,
            t_hat,
            n_hat,
            cap_a,
            cap_b,
            w_scalar,
            buf: [0.0; 7],
            additional: BTreeMap::new(),
            error: None,
        }
    }

    /// Adds the unperturbed (two-body) term to `dLv/dt`; every other
    /// element's Kepler contribution is zero since the perturbations ride
    /// entirely on top of the reference Keplerian motion.
    pub fn add_kepler_contribution(&mut self) {
        let n = (self.mu / self.eq.a.powi(3)).sqrt();
        self.buf[5] += n * self.w_scalar * self.w_scalar / self.cap_b.powi(3);
    }

    /// Consumes the accumulator, returning the finished 7-vector
    /// (`{a, ex, ey, hx, hy, Lv, m}`), the additional-state rates, and a
    /// sticky error if any contribution was non-finite.
    pub fn finish(self) -> ([f64; 7], BTreeMap<String, Vec<f64>>, Option<OrbitDynError>) {
        (self.buf, self.additional, self.error)
    }
}

impl DerivativeAccumulator for GaussDerivativeAccumulator {
    fn add_acceleration(&mut self, frame: LocalFrame, accel: Vector3<f64>) {
        if self.error.is_some() {
            return;
        }
        if !accel.iter().all(|v| v.is_finite()) {
            self.error = Some(OrbitDynError::PropagationError(
                "non-finite acceleration contribution".to_string(),
            ));
            return;
        }

        let accel_inertial = match frame {
            LocalFrame::Inertial => accel,
            LocalFrame::Qsw => accel.x * self.r_hat + accel.y * self.s_hat + accel.z * self.w_hat,
            LocalFrame::Tnw => accel.x * self.t_hat + accel.y * self.n_hat + accel.z * self.w_hat,
        };

        let f_r = accel_inertial.dot(&self.r_hat);
        let f_t = accel_inertial.dot(&self.s_hat);
        let f_n = accel_inertial.dot(&self.w_hat);

        let ex = self.eq.ex;
        let ey = self.eq.ey;
        let hx = self.eq.hx;
        let hy = self.eq.hy;
        let (sin_lv, cos_lv) = self.eq.lv.sin_cos();
        let w = self.w_scalar;
        let i_factor = if self.eq.retrograde { -1.0 } else { 1.0 };
        let k = self.cap_a * self.cap_b / self.mu; // sqrt(p / mu)
        let cross = i_factor * (hx * sin_lv - hy * cos_lv);
        let c_fac = 1.0 + hx * hx + hy * hy;

        let da = (2.0 * self.eq.a * self.eq.a / (self.cap_a * self.cap_b))
            * ((ex * sin_lv - ey * cos_lv) * f_r + w * f_t);
        let dex = k
            * (f_r * sin_lv + ((w + 1.0) * cos_lv + ex) / w * f_t - cross * ey / w * f_n);
        let dey = k
            * (-f_r * cos_lv + ((w + 1.0) * sin_lv + ey) / w * f_t + cross * ex / w * f_n);
        let dhx = k * c_fac * cos_lv / (2.0 * w) * f_n;
        let dhy = k * c_fac * sin_lv / (2.0 * w) * f_n;
        let dlv = k * cross / w * f_n;

        self.buf[0] += da;
        self.buf[1] += dex;
        self.buf[2] += dey;
        self.buf[3] += dhx;
        self.buf[4] += dhy;
        self.buf[5] += dlv;
    }

    fn add_mass_rate(&mut self, dmdt: f64) {
        if self.error.is_some() {
            return;
        }
        if !dmdt.is_finite() {
            self.error = Some(OrbitDynError::PropagationError(
                "non-finite mass flow rate contribution".to_string(),
            ));
            return;
        }
        self.buf[6] += dmdt;
    }

    fn add_additional_rate(&mut self, name: &str, rate: &[f64]) {
        if self.error.is_some() {
            return;
        }
        let entry = self
            .additional
            .entry(name.to_string())
            .or_insert_with(|| vec![0.0; rate.len()]);
        if entry.len() != rate.len() {
            self.error = Some(OrbitDynError::PropagationError(format!(
                "additional state '{name}' rate length mismatch"
            )));
            return;
        }
        for (slot, delta) in entry.iter_mut().zip(rate) {
            *slot += delta;
        }
    }
}
