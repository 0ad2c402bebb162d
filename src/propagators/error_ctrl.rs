//! Error-control strategies for the adaptive step-size logic in
//! [`super::Propagator`], mirroring GMAT's relative-step-size control
//! (teacher precedent: `nyx_space::propagators::error_ctrl`).

/// Estimates a single scalar error from an embedded pair's error vector, the
/// newly proposed state, and the previous state. The 7-element state is
/// always `{a, ex, ey, hx, hy, Lv, m}` (spec §4.2's fixed derivative order).
pub trait ErrorCtrl: Copy + Send {
    fn estimate(error_est: &[f64; 7], next_state: &[f64; 7], cur_state: &[f64; 7]) -> f64;
}

/// Root-sum-square of the relative error across every element of the
/// state, mass included.
#[derive(Clone, Copy, Debug)]
pub struct RSSStep {}

impl ErrorCtrl for RSSStep {
    fn estimate(error_est: &[f64; 7], next_state: &[f64; 7], cur_state: &[f64; 7]) -> f64 {
        rss_step(error_est, next_state, cur_state, 0, 7)
    }
}

/// Root-sum-square of the relative error restricted to the six orbital
/// elements, excluding the mass slot: the analog of the teacher's
/// position/velocity-only error control, here applied to the
/// position/velocity-equivalent equinoctial elements rather than mass.
#[derive(Clone, Copy, Debug)]
pub struct RSSStepPV {}

impl ErrorCtrl for RSSStepPV {
    fn estimate(error_est: &[f64; 7], next_state: &[f64; 7], cur_state: &[f64; 7]) -> f64 {
        rss_step(error_est, next_state, cur_state, 0, 6)
    }
}

fn rss_step(error_est: &[f64; 7], next_state: &[f64; 7], cur_state: &[f64; 7], lo: usize, hi: usize) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for i in lo..hi {
        let scale = next_state[i].abs().max(cur_state[i].abs()).max(1e-12);
        let rel = error_est[i] / scale;
        sum_sq += rel * rel;
        count += 1;
    }
    (sum_sq / count as f64).sqrt()
}
