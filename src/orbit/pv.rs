use crate::frame::Frame;
use nalgebra::Vector3;
use std::fmt;

/// A Cartesian position-velocity pair in a named reference frame.
///
/// Pure value type, immutable once built. The date is carried externally
/// (by [`crate::spacecraft::SpacecraftState`] or by the caller) rather than
/// embedded here, so the same `PVCoordinates` can be reused for both the
/// "state at t" and "state derivative" roles without implying a clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PVCoordinates {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub frame: Frame,
}

impl PVCoordinates {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, frame: Frame) -> Self {
        Self {
            position,
            velocity,
            frame,
        }
    }

    /// Specific angular momentum `h = p x v`.
    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.position.cross(&self.velocity)
    }

    /// Angular velocity `omega = h / |p|^2`.
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.angular_momentum() / self.position.norm_squared()
    }

    pub fn rmag(&self) -> f64 {
        self.position.norm()
    }

    pub fn vmag(&self) -> f64 {
        self.velocity.norm()
    }
}

impl fmt::Display for PVCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] p = [{:.3}, {:.3}, {:.3}] m, v = [{:.6}, {:.6}, {:.6}] m/s",
            self.frame,
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z
        )
    }
}
