use crate::errors::{OrbitDynError, OrbitDynResult};
use crate::frame::Frame;
use crate::orbit::pv::PVCoordinates;
use nalgebra::Vector3;
use std::f64::consts::PI;
use std::fmt;

/// Maximum residual, in radians, accepted when solving Kepler's equation
/// (mean <-> eccentric longitude) by Newton iteration.
const KEPLER_TOLERANCE: f64 = 1e-12;
/// Iteration budget for the same solve.
const KEPLER_MAX_ITER: usize = 50;

/// A latitude argument (longitude measured in the orbital plane from the
/// equinoctial reference direction), tagged with which of the three
/// conjugate angles it represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LongitudeKind {
    True,
    Eccentric,
    Mean,
}

/// The equinoctial orbital element set (spec §3): singularity-free for
/// circular and equatorial orbits.
///
/// `retrograde` is the factor `I` of spec §4.1: when `true`, `hx`/`hy` are
/// computed in a frame obtained by rotating the physical state 180 degrees
/// about the x-axis before projecting, which is the standard device for
/// keeping `(hx, hy)` finite for inclinations near pi (the encoding would
/// otherwise blow up there). All element values are expressed in that
/// rotated frame when `retrograde` is set; [`to_pv`](Equinoctial::to_pv)
/// rotates back before returning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Equinoctial {
    pub a: f64,
    pub ex: f64,
    pub ey: f64,
    pub hx: f64,
    pub hy: f64,
    /// True longitude, radians.
    pub lv: f64,
    pub retrograde: bool,
    pub frame: Frame,
}

/// 180-degree rotation about the x-axis: (x, y, z) -> (x, -y, -z).
///
/// A proper rotation (determinant +1), not a reflection: it is used to map
/// a retrograde orbit (inclination near pi) onto an equivalent orbit with
/// inclination near zero, where the standard (non-retrograde) equinoctial
/// formulas are well conditioned. It is its own inverse.
fn flip_x_axis(v: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.y, -v.z)
}

impl Equinoctial {
    /// Converts a Cartesian position-velocity pair to equinoctial elements.
    ///
    /// Fails with [`OrbitDynError::DegenerateOrbit`] if the angular
    /// momentum is too small relative to `mu` to define an orbital plane,
    /// and with [`OrbitDynError::ArgumentError`] if the orbit is not
    /// elliptical (`e >= 1` or `a <= 0`), since the `(ex, ey, hx, hy)`
    /// encoding used here assumes a bound orbit.
    pub fn from_pv(pv: &PVCoordinates, mu: f64) -> OrbitDynResult<Self> {
        let r = pv.position;
        let v = pv.velocity;
        let h_vec = r.cross(&v);
        let h = h_vec.norm();
        if h < 1e-9 * mu.sqrt() {
            return Err(OrbitDynError::DegenerateOrbit(
                "angular momentum too small: rectilinear trajectory".to_string(),
            ));
        }

        let retrograde = h_vec.z < 0.0;
        let (r_work, v_work) = if retrograde {
            (flip_x_axis(r), flip_x_axis(v))
        } else {
            (r, v)
        };

        let rmag = r_work.norm();
        let vmag2 = v_work.norm_squared();
        let energy = 0.5 * vmag2 - mu / rmag;
        if energy >= 0.0 {
            return Err(OrbitDynError::ArgumentError(
                "equinoctial elements require an elliptical (bound) orbit".to_string(),
            ));
        }
        let a = -mu / (2.0 * energy);

        let h_work = r_work.cross(&v_work);
        let h_work_mag = h_work.norm();
        let hx = -h_work.y / (h_work_mag + h_work.z);
        let hy = h_work.x / (h_work_mag + h_work.z);

        let c = 1.0 + hx * hx + hy * hy;
        let f_vec = Vector3::new(1.0 - hx * hx + hy * hy, 2.0 * hx * hy, -2.0 * hy) / c;
        let g_vec = Vector3::new(2.0 * hx * hy, 1.0 + hy * hy - hx * hx, 2.0 * hx) / c;

        let e_vec = ((vmag2 - mu / rmag) * r_work - r_work.dot(&v_work) * v_work) / mu;
        let ex = e_vec.dot(&f_vec);
        let ey = e_vec.dot(&g_vec);

        if ex * ex + ey * ey >= 1.0 - 1e-12 {
            return Err(OrbitDynError::ArgumentError(
                "equinoctial elements require eccentricity strictly below 1".to_string(),
            ));
        }

        let lv = (r_work.dot(&g_vec)).atan2(r_work.dot(&f_vec));

        Ok(Self {
            a,
            ex,
            ey,
            hx,
            hy,
            lv,
            retrograde,
            frame: pv.frame,
        })
    }

    /// Derives Cartesian position and velocity from these elements. Always
    /// succeeds for a valid (elliptical) element set.
    pub fn to_pv(&self, mu: f64) -> PVCoordinates {
        let (f_vec, g_vec) = self.basis_vectors();
        let b = (1.0 - self.ex * self.ex - self.ey * self.ey).sqrt();
        let beta = 1.0 / (1.0 + b);
        let cap_f = self.eccentric_longitude();
        let (sin_f, cos_f) = cap_f.sin_cos();

        let ex = self.ex;
        let ey = self.ey;
        let x = self.a * ((1.0 - beta * ey * ey) * cos_f + beta * ex * ey * sin_f - ex);
        let y = self.a * ((1.0 - beta * ex * ex) * sin_f + beta * ex * ey * cos_f - ey);
        let r = self.a * (1.0 - ex * cos_f - ey * sin_f);
        let n = (mu / self.a.powi(3)).sqrt();
        let na2_r = n * self.a * self.a / r;
        let x_dot = na2_r * (beta * ex * ey * cos_f - (1.0 - beta * ey * ey) * sin_f);
        let y_dot = na2_r * ((1.0 - beta * ex * ex) * cos_f - beta * ex * ey * sin_f);

        let mut position = x * f_vec + y * g_vec;
        let mut velocity = x_dot * f_vec + y_dot * g_vec;
        if self.retrograde {
            position = flip_x_axis(position);
            velocity = flip_x_axis(velocity);
        }

        PVCoordinates::new(position, velocity, self.frame)
    }

    /// The (f, g) unit vectors spanning the orbital plane in the working
    /// (possibly retrograde-rotated) frame, with `w = f x g` the orbit
    /// normal in that same frame.
    fn basis_vectors(&self) -> (Vector3<f64>, Vector3<f64>) {
        let hx = self.hx;
        let hy = self.hy;
        let c = 1.0 + hx * hx + hy * hy;
        let f_vec = Vector3::new(1.0 - hx * hx + hy * hy, 2.0 * hx * hy, -2.0 * hy) / c;
        let g_vec = Vector3::new(2.0 * hx * hy, 1.0 + hy * hy - hx * hx, 2.0 * hx) / c;
        (f_vec, g_vec)
    }

    /// True longitude, radians, normalized to `(-pi, pi]`.
    pub fn true_longitude(&self) -> f64 {
        wrap_pi(self.lv)
    }

    /// Eccentric longitude, radians, derived algebraically (no iteration)
    /// from the true longitude.
    pub fn eccentric_longitude(&self) -> f64 {
        true_to_eccentric(self.lv, self.ex, self.ey)
    }

    /// Mean longitude, radians, derived directly (no iteration) from the
    /// eccentric longitude via Kepler's equation.
    pub fn mean_longitude(&self) -> f64 {
        eccentric_to_mean(self.eccentric_longitude(), self.ex, self.ey)
    }

    /// Builds an `Equinoctial` from `a, ex, ey, hx, hy` and a longitude of
    /// the given kind, converting to true longitude internally. Mean to
    /// eccentric requires a Newton solve; see module docs for the bound.
    #[allow(clippy::too_many_arguments)]
    pub fn from_elements(
        a: f64,
        ex: f64,
        ey: f64,
        hx: f64,
        hy: f64,
        longitude: f64,
        kind: LongitudeKind,
        retrograde: bool,
        frame: Frame,
    ) -> OrbitDynResult<Self> {
        if !(a.is_finite() && ex.is_finite() && ey.is_finite() && hx.is_finite() && hy.is_finite())
        {
            return Err(OrbitDynError::ArgumentError(
                "non-finite equinoctial element".to_string(),
            ));
        }
        if a <= 0.0 {
            return Err(OrbitDynError::ArgumentError(
                "semi-major axis must be positive".to_string(),
            ));
        }
        if ex * ex + ey * ey >= 1.0 - 1e-12 {
            return Err(OrbitDynError::ArgumentError(
                "eccentricity must be strictly below 1".to_string(),
            ));
        }
        let lv = match kind {
            LongitudeKind::True => longitude,
            LongitudeKind::Eccentric => eccentric_to_true(longitude, ex, ey),
            LongitudeKind::Mean => {
                let f = mean_to_eccentric(longitude, ex, ey)?;
                eccentric_to_true(f, ex, ey)
            }
        };
        Ok(Self {
            a,
            ex,
            ey,
            hx,
            hy,
            lv,
            retrograde,
            frame,
        })
    }

    /// Flattens the six orbital elements into the fixed integrator state
    /// order `{a, ex, ey, hx, hy, Lv}` (spec §4.2), leaving the mass slot
    /// for the caller to fill.
    pub fn as_array(&self) -> [f64; 6] {
        [self.a, self.ex, self.ey, self.hx, self.hy, self.lv]
    }

    /// Rebuilds an `Equinoctial` from a 7-vector (the mass slot, `y[6]`,
    /// is ignored here) produced by the integrator, keeping the
    /// retrograde factor and frame fixed across one propagation: this
    /// core assumes a propagation never crosses the `I = +1 <-> I = -1`
    /// boundary mid-flight (an orbit's inclination does not pass through
    /// pi in one continuous numerical integration without a redesign of
    /// the element set being required anyway).
    pub fn from_array(y: &[f64; 7], retrograde: bool, frame: Frame) -> Self {
        Self {
            a: y[0],
            ex: y[1],
            ey: y[2],
            hx: y[3],
            hy: y[4],
            lv: y[5],
            retrograde,
            frame,
        }
    }
}

impl fmt::Display for Equinoctial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] a={:.3} m, ex={:.6}, ey={:.6}, hx={:.6}, hy={:.6}, Lv={:.6} rad{}",
            self.frame,
            self.a,
            self.ex,
            self.ey,
            self.hx,
            self.hy,
            self.lv,
            if self.retrograde { " (retrograde)" } else { "" }
        )
    }
}

/// Normalizes an angle to `(-pi, pi]`.
pub fn wrap_pi(angle: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let mut a = (angle + PI) % two_pi;
    if a < 0.0 {
        a += two_pi;
    }
    a - PI
}

/// Closed-form conversion from true to eccentric longitude (an algebraic,
/// not transcendental, relation — no iteration needed).
pub fn true_to_eccentric(lv: f64, ex: f64, ey: f64) -> f64 {
    let b = (1.0 - ex * ex - ey * ey).sqrt();
    let beta = 1.0 / (1.0 + b);
    let (sin_lv, cos_lv) = lv.sin_cos();
    let w = 1.0 + ex * cos_lv + ey * sin_lv;
    let rho = (1.0 - ex * ex - ey * ey) / w;
    let u = ex + rho * cos_lv;
    let vv = ey + rho * sin_lv;
    let cos_f = ((1.0 - beta * ex * ex) * u - beta * ex * ey * vv) / b;
    let sin_f = ((1.0 - beta * ey * ey) * vv - beta * ex * ey * u) / b;
    sin_f.atan2(cos_f)
}

/// Direct (non-iterative) conversion from eccentric to true longitude.
pub fn eccentric_to_true(cap_f: f64, ex: f64, ey: f64) -> f64 {
    let b = (1.0 - ex * ex - ey * ey).sqrt();
    let beta = 1.0 / (1.0 + b);
    let (sin_f, cos_f) = cap_f.sin_cos();
    let rho_x = (1.0 - beta * ey * ey) * cos_f + beta * ex * ey * sin_f - ex;
    let rho_y = (1.0 - beta * ex * ex) * sin_f + beta * ex * ey * cos_f - ey;
    rho_y.atan2(rho_x)
}

/// Direct (non-iterative) conversion from eccentric to mean longitude,
/// via Kepler's equation in equinoctial form.
pub fn eccentric_to_mean(cap_f: f64, ex: f64, ey: f64) -> f64 {
    let (sin_f, cos_f) = cap_f.sin_cos();
    cap_f - ex * sin_f + ey * cos_f
}

/// Solves Kepler's equation (equinoctial form) for the eccentric longitude
/// given the mean longitude, by Newton iteration. Converges to within
/// [`KEPLER_TOLERANCE`] radians or exhausts [`KEPLER_MAX_ITER`] attempts,
/// whichever comes first (spec §4.1).
pub fn mean_to_eccentric(lm: f64, ex: f64, ey: f64) -> OrbitDynResult<f64> {
    let mut cap_f = lm;
    for _ in 0..KEPLER_MAX_ITER {
        let (sin_f, cos_f) = cap_f.sin_cos();
        let residual = cap_f - ex * sin_f + ey * cos_f - lm;
        if residual.abs() <= KEPLER_TOLERANCE {
            return Ok(cap_f);
        }
        let d_residual = 1.0 - ex * cos_f - ey * sin_f;
        cap_f -= residual / d_residual;
    }
    let (sin_f, cos_f) = cap_f.sin_cos();
    let residual = cap_f - ex * sin_f + ey * cos_f - lm;
    if residual.abs() <= KEPLER_TOLERANCE {
        Ok(cap_f)
    } else {
        Err(OrbitDynError::ConvergenceError(format!(
            "Kepler's equation (equinoctial) did not converge after {} iterations, residual={:e}",
            KEPLER_MAX_ITER, residual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use approx::assert_relative_eq;

    const EARTH: Frame = Frame::new("EME2000", 3.986_004_415e14);

    #[test]
    fn pv_round_trip_circular_equatorial() {
        let pv = PVCoordinates::new(
            Vector3::new(7_000_000.0, 0.0, 0.0),
            Vector3::new(0.0, 7_546.05, 0.0),
            EARTH,
        );
        let eq = Equinoctial::from_pv(&pv, EARTH.gm()).unwrap();
        let back = eq.to_pv(EARTH.gm());
        assert_relative_eq!(back.position, pv.position, epsilon = 1e-3);
        assert_relative_eq!(back.velocity, pv.velocity, epsilon = 1e-6);
    }

    #[test]
    fn pv_round_trip_inclined_eccentric() {
        let pv = PVCoordinates::new(
            Vector3::new(-2_436_450.0, -2_436_450.0, 6_891_037.0),
            Vector3::new(5_088.611, -5_088.611, 0.0),
            EARTH,
        );
        let eq = Equinoctial::from_pv(&pv, EARTH.gm()).unwrap();
        let back = eq.to_pv(EARTH.gm());
        assert_relative_eq!(back.position, pv.position, epsilon = 1e-2);
        assert_relative_eq!(back.velocity, pv.velocity, epsilon = 1e-6);
    }

    #[test]
    fn retrograde_orbit_round_trips() {
        // Near-polar, slightly past 90 degrees so the retrograde branch is used.
        let pv = PVCoordinates::new(
            Vector3::new(7_000_000.0, 0.0, 0.0),
            Vector3::new(0.0, -1_000.0, 7_475.0),
            EARTH,
        );
        let eq = Equinoctial::from_pv(&pv, EARTH.gm()).unwrap();
        assert!(eq.retrograde);
        let back = eq.to_pv(EARTH.gm());
        assert_relative_eq!(back.position, pv.position, epsilon = 1e-2);
        assert_relative_eq!(back.velocity, pv.velocity, epsilon = 1e-6);
    }

    #[test]
    fn longitude_round_trips() {
        let ex = 0.01;
        let ey = -0.02;
        let lv = 1.234;
        let f = true_to_eccentric(lv, ex, ey);
        let lv2 = eccentric_to_true(f, ex, ey);
        assert_relative_eq!(wrap_pi(lv - lv2), 0.0, epsilon = 1e-12);

        let lm = eccentric_to_mean(f, ex, ey);
        let f2 = mean_to_eccentric(lm, ex, ey).unwrap();
        assert_relative_eq!(wrap_pi(f - f2), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn degenerate_rectilinear_orbit_is_rejected() {
        let pv = PVCoordinates::new(
            Vector3::new(7_000_000.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            EARTH,
        );
        assert!(Equinoctial::from_pv(&pv, EARTH.gm()).is_err());
    }
}
