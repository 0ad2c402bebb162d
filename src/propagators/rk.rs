use super::RK;

/// Classic fixed-step fourth-order Runge-Kutta. `stages() == order()` marks
/// it as a fixed-step method (no embedded error estimate) per the `RK`
/// trait's convention.
pub struct RK4 {}

impl RK for RK4 {
    fn order() -> u8 {
        4
    }
    fn stages() -> usize {
        4
    }
    fn a_coeffs() -> &'static [f64] {
        &[0.5, 0.0, 0.5, 0.0, 0.0, 1.0]
    }
    fn b_coeffs() -> &'static [f64] {
        &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0]
    }
}
