//! Cartesian and equinoctial representations of an orbital state, and the
//! lossless conversions between them (spec §4.1).

mod equinoctial;
mod pv;

pub use equinoctial::{
    eccentric_to_mean, eccentric_to_true, mean_to_eccentric, true_to_eccentric, wrap_pi,
    Equinoctial, LongitudeKind,
};
pub use pv::PVCoordinates;
