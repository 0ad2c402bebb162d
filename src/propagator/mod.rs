//! The propagation driver (spec §4.3): sequences a single propagation of
//! a [`SpacecraftState`](crate::spacecraft::SpacecraftState) under a
//! fixed integrator and a borrowed collection of force models.

pub mod driver;

pub use driver::{DriverState, PropagationDriver};
