use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Variants map onto the failure modes a numerical orbit propagation can
/// raise: bad inputs caught before integration starts, errors raised by a
/// force model or an event callback while the integrator is running, faults
/// internal to the ODE solver itself, out-of-range ephemeris queries, and
/// non-converging iterative solves (Kepler's equation and the like).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OrbitDynError {
    /// Invalid input detected before integration starts. Never raised once
    /// the integrator has been handed the state vector.
    #[error("invalid argument: {0}")]
    ArgumentError(String),

    /// Raised by a force model or an event callback during integration.
    /// Captured in the driver's sticky error slot and re-raised once the
    /// integrator unwinds; takes precedence over any `IntegratorError`
    /// that results from the forced stop.
    #[error("propagation error: {0}")]
    PropagationError(String),

    /// Originates in the ODE solver: step-size underflow, a non-converging
    /// root search, or a non-finite derivative. Carries the offending time
    /// and, where meaningful, a short description of the state.
    #[error("integrator error at t={t}: {msg}")]
    IntegratorError { t: f64, msg: String },

    /// A post-integration ephemeris query fell outside the interval the
    /// ephemeris was produced over.
    #[error("date outside ephemeris bounds: {0}")]
    OutOfRangeError(String),

    /// An iterative solve (Kepler's equation, mean/eccentric longitude
    /// conversion) exceeded its iteration budget without converging.
    #[error("convergence failure: {0}")]
    ConvergenceError(String),

    /// The Cartesian state is too close to a rectilinear (zero angular
    /// momentum) trajectory to be represented in equinoctial elements.
    #[error("degenerate orbit: {0}")]
    DegenerateOrbit(String),
}

pub type OrbitDynResult<T> = Result<T, OrbitDynError>;
