//! Dense-output ephemeris container (spec §4.6): stores the Hermite
//! segments accumulated during one propagation and supports random-access
//! evaluation at any interior date.

use crate::errors::{OrbitDynError, OrbitDynResult};
use crate::frame::Frame;
use crate::orbit::Equinoctial;
use crate::propagators::HermiteSegment;
use crate::spacecraft::SpacecraftState;
use hifitime::{Duration, Epoch};
use std::collections::BTreeMap;

/// Dense-output trajectory over `[minDate, maxDate]`, reconstructing a
/// full [`SpacecraftState`] at any interior date by interpolating the
/// 7-vector and converting back to equinoctial, then to Cartesian, in the
/// frame the propagation was run in (spec §4.6).
#[derive(Clone, Debug)]
pub struct DenseEphemeris {
    epoch: Epoch,
    mu: f64,
    frame: Frame,
    retrograde: bool,
    segments: Vec<HermiteSegment>,
    additional: BTreeMap<String, Vec<f64>>,
}

impl DenseEphemeris {
    /// Builds an empty ephemeris anchored at `epoch`. Callers pass this to
    /// [`PropagationDriver::propagate_with_ephemeris`](crate::propagator::PropagationDriver::propagate_with_ephemeris)
    /// to have it populated in place.
    pub fn new(epoch: Epoch, mu: f64, frame: Frame, retrograde: bool) -> Self {
        Self {
            epoch,
            mu,
            frame,
            retrograde,
            segments: Vec::new(),
            additional: BTreeMap::new(),
        }
    }

    pub(crate) fn push_segment(&mut self, segment: HermiteSegment) {
        self.segments.push(segment);
    }

    pub(crate) fn set_additional(&mut self, additional: BTreeMap<String, Vec<f64>>) {
        self.additional = additional;
    }

    /// Inclusive lower bound of the interval this ephemeris covers.
    pub fn min_date(&self) -> Epoch {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => {
                self.epoch + Duration::from_seconds(t0_seconds(first).min(t0_seconds(last)))
            }
            _ => self.epoch,
        }
    }

    /// Inclusive upper bound of the interval this ephemeris covers.
    pub fn max_date(&self) -> Epoch {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => {
                self.epoch + Duration::from_seconds(t1_seconds(first).max(t1_seconds(last)))
            }
            _ => self.epoch,
        }
    }

    /// Reconstructs the spacecraft state at `date`, failing with
    /// [`OrbitDynError::OutOfRangeError`] if `date` is outside
    /// `[min_date(), max_date()]`.
    pub fn evaluate(&self, date: Epoch) -> OrbitDynResult<SpacecraftState> {
        let t = (date - self.epoch).to_seconds();
        let segment = self
            .segments
            .iter()
            .find(|s| s.contains(t))
            .ok_or_else(|| {
                OrbitDynError::OutOfRangeError(format!(
                    "date {date} outside ephemeris bounds [{}, {}]",
                    self.min_date(),
                    self.max_date()
                ))
            })?;
        let y = segment.evaluate(t);
        let eq = Equinoctial::from_array(&y, self.retrograde, self.frame);
        SpacecraftState::new(eq, date, y[6]).map(|s| {
            let mut s = s;
            for (name, values) in &self.additional {
                s = s.with_additional(name.clone(), values.clone());
            }
            s
        })
    }
}

fn t0_seconds(segment: &HermiteSegment) -> f64 {
    segment.t0
}

fn t1_seconds(segment: &HermiteSegment) -> f64 {
    segment.t1
}
