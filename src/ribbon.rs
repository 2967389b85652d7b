//! Ribbons (line segments to be covered) and the `RibbonManager` coverage accounting
//! plus TSP-flavoured heuristics used to guide the search planners.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dubins;
use crate::state::State;

/// Which lower-bound cost-to-go estimate `RibbonManager::heuristic_cost` uses.
/// `k`-restricted variants only consider the `k` nearest uncovered endpoints, trading
/// admissibility for speed on ribbon-dense maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RibbonHeuristic {
    MaxDistance,
    TspPointRobotNoSplitAllRibbons,
    TspPointRobotNoSplitKRibbons,
    TspDubinsNoSplitAllRibbons,
    TspDubinsNoSplitKRibbons,
}

impl RibbonHeuristic {
    /// Maps the wire-level `heuristic ∈ {0..4}` configuration key.
    pub fn from_index(i: u8) -> RibbonHeuristic {
        match i {
            0 => RibbonHeuristic::MaxDistance,
            1 => RibbonHeuristic::TspPointRobotNoSplitAllRibbons,
            2 => RibbonHeuristic::TspPointRobotNoSplitKRibbons,
            3 => RibbonHeuristic::TspDubinsNoSplitAllRibbons,
            _ => RibbonHeuristic::TspDubinsNoSplitKRibbons,
        }
    }
}

/// An undirected line segment the vehicle must pass over within `width / 2` laterally.
#[derive(Debug, Clone, PartialEq)]
pub struct Ribbon {
    pub a: (f64, f64),
    pub b: (f64, f64),
    pub width: f64,
    /// Covered sub-intervals in `[0, length]` arc-length parameter space, sorted & merged.
    covered: Vec<(f64, f64)>,
}

impl Ribbon {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, width: f64) -> Ribbon {
        Ribbon { a: (x1, y1), b: (x2, y2), width, covered: Vec::new() }
    }

    pub fn length(&self) -> f64 {
        ((self.b.0 - self.a.0).powi(2) + (self.b.1 - self.a.1).powi(2)).sqrt()
    }

    fn axis(&self) -> (f64, f64) {
        let len = self.length().max(f64::EPSILON);
        ((self.b.0 - self.a.0) / len, (self.b.1 - self.a.1) / len)
    }

    /// Signed arc-length of the projection of `(x, y)` onto the ribbon's axis, measured
    /// from `a`. May be negative or exceed `length()` when the point projects outside.
    pub fn projection_param(&self, x: f64, y: f64) -> f64 {
        let (ux, uy) = self.axis();
        (x - self.a.0) * ux + (y - self.a.1) * uy
    }

    pub fn perpendicular_distance(&self, x: f64, y: f64) -> f64 {
        let (ux, uy) = self.axis();
        let dx = x - self.a.0;
        let dy = y - self.a.1;
        (dx * (-uy) + dy * ux).abs()
    }

    fn insert_interval(&mut self, s: f64, e: f64) {
        if e <= s {
            return;
        }
        self.covered.push((s, e));
        self.covered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(self.covered.len());
        for &(s, e) in &self.covered {
            if let Some(last) = merged.last_mut() {
                if s <= last.1 {
                    last.1 = last.1.max(e);
                    continue;
                }
            }
            merged.push((s, e));
        }
        self.covered = merged;
    }

    /// Marks the ribbon covered in a `width/2`-wide footprint around `(x, y)`'s
    /// projection. `strict` requires the projection to fall within `[0, length]`.
    pub fn cover_point(&mut self, x: f64, y: f64, strict: bool) -> bool {
        if self.perpendicular_distance(x, y) > self.width / 2. {
            return false;
        }
        let len = self.length();
        let param = self.projection_param(x, y);
        if strict && (param < 0. || param > len) {
            return false;
        }
        let half = self.width / 2.;
        self.insert_interval((param - half).max(0.), (param + half).min(len));
        true
    }

    /// Sweeps the chord `(x1,y1)-(x2,y2)` and covers the overlap of its projected
    /// interval with the ribbon, provided at least one endpoint lies within lateral tolerance.
    pub fn cover_between(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, strict: bool) -> bool {
        let half = self.width / 2.;
        let close_enough =
            self.perpendicular_distance(x1, y1) <= half || self.perpendicular_distance(x2, y2) <= half;
        if !close_enough {
            return false;
        }
        let len = self.length();
        let p1 = self.projection_param(x1, y1);
        let p2 = self.projection_param(x2, y2);
        let (lo, hi) = (p1.min(p2), p1.max(p2));
        if strict && (hi < 0. || lo > len) {
            return false;
        }
        self.insert_interval(lo.max(0.), hi.min(len));
        true
    }

    pub fn uncovered_length(&self) -> f64 {
        let len = self.length();
        let covered: f64 = self.covered.iter().map(|(s, e)| e - s).sum();
        (len - covered).max(0.)
    }

    pub fn done(&self, min_length: f64) -> bool {
        self.uncovered_length() < min_length
    }

    /// World-space uncovered gaps, as `(start, end)` point pairs along the ribbon.
    pub fn uncovered_gaps(&self) -> Vec<((f64, f64), (f64, f64))> {
        let len = self.length();
        let mut cursor = 0.;
        let mut gaps = Vec::new();
        for &(s, e) in &self.covered {
            if s > cursor {
                gaps.push((cursor, s));
            }
            cursor = cursor.max(e);
        }
        if cursor < len {
            gaps.push((cursor, len));
        }
        gaps.into_iter().map(|(s, e)| (self.point_at(s), self.point_at(e))).collect()
    }

    pub fn point_at(&self, param: f64) -> (f64, f64) {
        let (ux, uy) = self.axis();
        (self.a.0 + ux * param, self.a.1 + uy * param)
    }

    /// Heading (compass) pointing from `from` to `to`, `(a, b)` or `(b, a)`.
    fn heading_between(p0: (f64, f64), p1: (f64, f64)) -> f64 {
        (p1.0 - p0.0).atan2(p1.1 - p0.1)
    }
}

/// Coverage state over a set of ribbons plus the heuristic used to guide search planners.
/// Fully value-cloneable: clones share no mutable state.
#[derive(Debug, Clone)]
pub struct RibbonManager {
    ribbons: Vec<Ribbon>,
    pub heuristic: RibbonHeuristic,
    pub turning_radius: f64,
    pub min_length: f64,
    pub k: usize,
}

impl RibbonManager {
    pub fn new(heuristic: RibbonHeuristic, turning_radius: f64, min_length: f64, k: usize) -> RibbonManager {
        RibbonManager { ribbons: Vec::new(), heuristic, turning_radius, min_length, k }
    }

    pub fn add(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64) {
        self.ribbons.push(Ribbon::new(x1, y1, x2, y2, width));
    }

    pub fn clear(&mut self) {
        self.ribbons.clear();
    }

    pub fn ribbons(&self) -> &[Ribbon] {
        &self.ribbons
    }

    pub fn cover(&mut self, x: f64, y: f64, strict: bool) -> bool {
        let mut any = false;
        for r in &mut self.ribbons {
            any |= r.cover_point(x, y, strict);
        }
        any
    }

    pub fn cover_between(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, strict: bool) -> bool {
        let mut any = false;
        for r in &mut self.ribbons {
            any |= r.cover_between(x1, y1, x2, y2, strict);
        }
        any
    }

    pub fn done(&self) -> bool {
        self.ribbons.iter().all(|r| r.done(self.min_length))
    }

    pub fn get_total_uncovered_length(&self) -> f64 {
        self.ribbons
            .iter()
            .map(|r| if r.done(self.min_length) { 0. } else { r.uncovered_length() })
            .sum()
    }

    /// Endpoints of every uncovered gap, each tagged with the heading pointing along
    /// the gap towards its far end (useful for orienting a Dubins edge along the ribbon).
    pub fn uncovered_endpoints_with_heading(&self) -> Vec<(f64, f64, f64)> {
        self.uncovered_endpoints_indexed().into_iter().map(|(_, x, y, h)| (x, y, h)).collect()
    }

    /// Same as [`uncovered_endpoints_with_heading`] but tagged with the owning ribbon's
    /// index, for search planners that track which ribbons a candidate path has visited.
    pub fn uncovered_endpoints_indexed(&self) -> Vec<(usize, f64, f64, f64)> {
        let mut pts = Vec::new();
        for (idx, r) in self.ribbons.iter().enumerate() {
            if r.done(self.min_length) {
                continue;
            }
            for (s, e) in r.uncovered_gaps() {
                pts.push((idx, s.0, s.1, Ribbon::heading_between(s, e)));
                pts.push((idx, e.0, e.1, Ribbon::heading_between(e, s)));
            }
        }
        pts
    }

    /// Estimated cost-to-go from `state` to finish covering the remaining ribbons.
    /// Not proven admissible; used for search guidance only.
    pub fn heuristic_cost(&self, state: &State) -> f64 {
        let pts = self.uncovered_endpoints_with_heading();
        if pts.is_empty() {
            return 0.;
        }
        match self.heuristic {
            RibbonHeuristic::MaxDistance => pts
                .iter()
                .map(|p| state.distance_to(&State::new(p.0, p.1, p.2, state.speed, state.time)))
                .fold(0., f64::max),
            RibbonHeuristic::TspPointRobotNoSplitAllRibbons => {
                tsp_nn_tour_length(state, &pts, false, self.turning_radius)
            }
            RibbonHeuristic::TspPointRobotNoSplitKRibbons => {
                tsp_nn_tour_length(state, &nearest_k(state, &pts, self.k), false, self.turning_radius)
            }
            RibbonHeuristic::TspDubinsNoSplitAllRibbons => {
                tsp_nn_tour_length(state, &pts, true, self.turning_radius)
            }
            RibbonHeuristic::TspDubinsNoSplitKRibbons => {
                tsp_nn_tour_length(state, &nearest_k(state, &pts, self.k), true, self.turning_radius)
            }
        }
    }
}

fn euclid(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn dubins_cost(a: (f64, f64, f64), b: (f64, f64, f64), rho: f64) -> f64 {
    let (_, params) = dubins::shortest_path([a.0, a.1, a.2], [b.0, b.1, b.2], rho);
    rho * (params[0] + params[1] + params[2])
}

fn nearest_k(state: &State, pts: &[(f64, f64, f64)], k: usize) -> Vec<(f64, f64, f64)> {
    let mut by_dist: Vec<(f64, (f64, f64, f64))> =
        pts.par_iter().map(|&p| (state.distance_to(&State::new(p.0, p.1, p.2, 0., 0.)), p)).collect();
    by_dist.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    by_dist.into_iter().take(k.max(1)).map(|(_, p)| p).collect()
}

/// Greedy nearest-neighbour tour length starting from `state`'s pose through every
/// point in `pts` — the "TSP-flavoured" heuristic named in the design: not optimal,
/// but cheap and a reasonable stand-in for the remaining coverage effort.
fn tsp_nn_tour_length(state: &State, pts: &[(f64, f64, f64)], dubins_edges: bool, rho: f64) -> f64 {
    if pts.is_empty() {
        return 0.;
    }
    let mut remaining: Vec<(f64, f64, f64)> = pts.to_vec();
    let mut current = (state.x, state.y, state.heading);
    let mut total = 0.;
    while !remaining.is_empty() {
        let costs: Vec<f64> = remaining
            .par_iter()
            .map(|&p| if dubins_edges { dubins_cost(current, p, rho) } else { euclid(current, p) })
            .collect();
        let (idx, &best) = costs
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .expect("remaining is non-empty");
        total += best;
        current = remaining.swap_remove(idx);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_full_chord_completes_ribbon() {
        let mut rm = RibbonManager::new(RibbonHeuristic::MaxDistance, 5., 0.5, 3);
        rm.add(0., 0., 100., 0., 5.);
        rm.cover_between(0., 0., 100., 0., false);
        assert!(rm.done());
        assert!(rm.get_total_uncovered_length() == 0.);
    }

    #[test]
    fn partial_coverage_leaves_a_gap() {
        let mut rm = RibbonManager::new(RibbonHeuristic::MaxDistance, 5., 0.5, 3);
        rm.add(0., 0., 100., 0., 5.);
        rm.cover_between(0., 0., 40., 0., false);
        assert!(!rm.done());
        assert!(rm.get_total_uncovered_length() > 50.);
    }

    #[test]
    fn strict_cover_rejects_off_segment_point() {
        let mut r = Ribbon::new(0., 0., 10., 0., 2.);
        assert!(!r.cover_point(20., 0., true));
        assert!(r.cover_point(20., 0., false));
    }

    #[test]
    fn max_distance_heuristic_is_zero_when_done() {
        let mut rm = RibbonManager::new(RibbonHeuristic::MaxDistance, 5., 0.5, 3);
        rm.add(0., 0., 10., 0., 5.);
        rm.cover_between(0., 0., 10., 0., false);
        let s = State::new(0., 0., 0., 1., 0.);
        assert_eq!(rm.heuristic_cost(&s), 0.);
    }

    #[test]
    fn tsp_heuristic_is_positive_when_uncovered() {
        let mut rm = RibbonManager::new(RibbonHeuristic::TspPointRobotNoSplitAllRibbons, 5., 0.5, 3);
        rm.add(0., 0., 10., 0., 5.);
        rm.add(20., 0., 30., 0., 5.);
        let s = State::new(-5., 0., 0., 1., 0.);
        assert!(rm.heuristic_cost(&s) > 0.);
    }
}
