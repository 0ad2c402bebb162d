//! A numerical orbit propagator core: Gauss planetary equations in
//! equinoctial elements, a generic embedded Runge-Kutta integrator with
//! dense output, and an event-detection protocol bridging scalar
//! switching functions to orbital-frame callbacks.
//!
//! This crate is deliberately agnostic of *which* forces perturb a
//! spacecraft: frame kinematics, gravity-field providers, celestial
//! ephemerides, attitude, and measurement/estimation are external
//! collaborators. See [`dynamics::ForceModel`] for the plugin seam.

pub mod dynamics;
pub mod ephemeris;
pub mod errors;
pub mod events;
pub mod frame;
pub mod orbit;
pub mod propagator;
pub mod propagators;
pub mod spacecraft;

pub use errors::{OrbitDynError, OrbitDynResult};
pub use frame::Frame;
pub use orbit::{Equinoctial, PVCoordinates};
pub use propagator::{DriverState, PropagationDriver};
pub use spacecraft::SpacecraftState;
