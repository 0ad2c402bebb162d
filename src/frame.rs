use std::fmt;

/// An opaque reference-frame handle.
///
/// The core treats frames as inert, comparable tokens: it never derives
/// orientation, precession, or ephemerides from them. Frame graphs, Earth
/// orientation parameters and celestial-body ephemerides are external
/// collaborators (spec §1) — a real deployment plugs in a frame provider
/// that knows how to transform [`PVCoordinates`](crate::orbit::PVCoordinates)
/// between handles; this crate only needs a name and a gravitational
/// parameter to do Gauss-equation bookkeeping in the frame the caller
/// declares the spacecraft state to be expressed in.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    name: &'static str,
    /// Gravitational parameter of the frame's central body, in m^3/s^2.
    gm: f64,
}

impl Frame {
    pub const fn new(name: &'static str, gm: f64) -> Self {
        Self { name, gm }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Gravitational parameter, in m^3/s^2.
    pub fn gm(&self) -> f64 {
        self.gm
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Frame {}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A transform between two frames, applied to a [`PVCoordinates`](crate::orbit::PVCoordinates).
///
/// The core never constructs one of these itself (no frame tree is owned
/// here); it is the contract an external frame provider must satisfy for
/// callers that need cross-frame agreement checks (spec §8, property 5).
pub trait FrameTransformProvider {
    /// Returns the transform needed to express a `PVCoordinates` given in
    /// `from` as seen in `to`, at the given date (seconds past an
    /// implementation-defined reference epoch).
    fn transform_to(&self, from: Frame, to: Frame, date_s: f64) -> Transform;
}

/// A rotation-free placeholder transform: this core does not implement
/// frame kinematics, so a `Transform` only carries what the Gauss-equation
/// assembler and the event adapter actually need, which is nothing beyond
/// "are these the same frame". Real frame rotations are supplied
/// externally; any non-identity `Transform` must come from outside this
/// crate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub(crate) identity: bool,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { identity: true };

    pub fn is_identity(&self) -> bool {
        self.identity
    }
}
