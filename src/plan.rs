//! `DubinsPlan`: an ordered, non-overlapping sequence of `DubinsSegment`s — the shared
//! output artefact of every planner and the Executive's splicing unit.

use crate::dubins::DubinsSegment;
use crate::error::{PlannerError, PlannerResult};
use crate::state::State;

/// Sampling density used by `get_half_second_samples`.
pub const HALF_SECOND: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DubinsPlan {
    segments: Vec<DubinsSegment>,
    /// Advisory bit set by a planner when the plan traverses non-zero obstacle cost.
    pub dangerous: bool,
}

impl DubinsPlan {
    pub fn new() -> DubinsPlan {
        DubinsPlan { segments: Vec::new(), dangerous: false }
    }

    pub fn from_segments(segments: Vec<DubinsSegment>) -> DubinsPlan {
        DubinsPlan { segments, dangerous: false }
    }

    pub fn segments(&self) -> &[DubinsSegment] {
        &self.segments
    }

    /// Pushes `segment` to the tail. The caller is responsible for temporal monotonicity
    /// (`segment.start_time >= self.get_end_time()` when the plan is non-empty).
    pub fn append(&mut self, segment: DubinsSegment) {
        self.segments.push(segment);
    }

    pub fn empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get_start_time(&self) -> PlannerResult<f64> {
        self.segments.first().map(|s| s.start_time).ok_or(PlannerError::OutOfRange(f64::NAN))
    }

    pub fn get_end_time(&self) -> PlannerResult<f64> {
        self.segments.last().map(|s| s.end_time()).ok_or(PlannerError::OutOfRange(f64::NAN))
    }

    pub fn contains_time(&self, t: f64) -> bool {
        self.segments.iter().any(|s| s.contains_time(t))
    }

    /// Finds the first segment containing `state.time` and samples it.
    pub fn sample(&self, state: &State) -> PlannerResult<State> {
        self.segments
            .iter()
            .find(|s| s.contains_time(state.time))
            .map(|s| s.sample(state.time))
            .unwrap_or(Err(PlannerError::OutOfRange(state.time)))
    }

    pub fn sample_at(&self, t: f64) -> PlannerResult<State> {
        self.sample(&State::new(0., 0., 0., 0., t))
    }

    /// Samples at `start_time, start_time + 0.5, ...` up to and including `end_time`.
    pub fn get_half_second_samples(&self) -> Vec<State> {
        let (start, end) = match (self.get_start_time(), self.get_end_time()) {
            (Ok(s), Ok(e)) => (s, e),
            _ => return Vec::new(),
        };
        let mut out = Vec::new();
        let mut t = start;
        while t < end {
            if let Ok(s) = self.sample_at(t) {
                out.push(s);
            }
            t += HALF_SECOND;
        }
        if let Ok(s) = self.sample_at(end) {
            out.push(s);
        }
        out
    }

    /// Drops every segment with `end_time < t0`. Remaining segments are *not* retimed,
    /// so the first retained segment's `start_time` may still be earlier than `t0`.
    pub fn change_into_suffix(&self, t0: f64) -> DubinsPlan {
        let segments = self.segments.iter().filter(|s| s.end_time() >= t0).cloned().collect();
        DubinsPlan { segments, dangerous: self.dangerous }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(|s| s.total_arc_length()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dubins::DubinsSegment;

    fn seg(start: f64, end: f64) -> DubinsSegment {
        // a straight segment at speed 1 so (end - start) arc length gives exactly that duration
        let from = State::new(0., 0., 0., 1., start);
        let mut s = DubinsSegment::connect(&from, (end - start, 0., 0.), 1000., None);
        s.start_time = start;
        s
    }

    #[test]
    fn empty_iff_zero_segments() {
        let p = DubinsPlan::new();
        assert!(p.empty());
        assert!(p.get_start_time().is_err());
    }

    #[test]
    fn contains_time_and_sample_round_trip() {
        let mut p = DubinsPlan::new();
        p.append(seg(0., 10.));
        p.append(seg(10., 20.));
        p.append(seg(20., 30.));
        for t in [0., 5., 10., 15., 25., 30.] {
            assert!(p.contains_time(t), "t={}", t);
            let s = p.sample_at(t).unwrap();
            assert!((s.time - t).abs() < 1e-9);
        }
        assert!(!p.contains_time(-1.));
        assert!(!p.contains_time(31.));
    }

    #[test]
    fn change_into_suffix_drops_whole_segments_only() {
        let mut p = DubinsPlan::new();
        p.append(seg(0., 10.));
        p.append(seg(10., 20.));
        p.append(seg(20., 30.));

        let suffix = p.change_into_suffix(15.);
        let starts: Vec<f64> = suffix.segments().iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![10., 20.]);
        assert_eq!(suffix.sample_at(25.).unwrap(), p.sample_at(25.).unwrap());
        assert!(suffix.sample_at(5.).is_err());
    }

    #[test]
    fn suffix_at_start_time_is_identity() {
        let mut p = DubinsPlan::new();
        p.append(seg(0., 10.));
        p.append(seg(10., 20.));
        let t0 = p.get_start_time().unwrap();
        assert_eq!(p.change_into_suffix(t0), p);
    }

    #[test]
    fn suffix_is_idempotent_in_sequence() {
        let mut p = DubinsPlan::new();
        p.append(seg(0., 10.));
        p.append(seg(10., 20.));
        p.append(seg(20., 30.));
        let a = p.change_into_suffix(12.).change_into_suffix(22.);
        let b = p.change_into_suffix(22.);
        assert_eq!(a, b);
    }

    #[test]
    fn suffix_can_become_empty() {
        let mut p = DubinsPlan::new();
        p.append(seg(0., 10.));
        let suffix = p.change_into_suffix(100.);
        assert!(suffix.empty());
    }
}
