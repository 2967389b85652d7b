//! Best-first search over a lazily-built Dubins edge graph, seeded by ribbon endpoints
//! and random samples. Anytime: tracks the best vertex seen so far and backtraces from
//! it on budget exhaustion, an `arena + index` shape that keeps backtracing cheap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;

use crate::config::PlannerConfig;
use crate::dubins::{DubinsPathType, DubinsSegment};
use crate::instrumentation::Timer;
use crate::obstacle::DynObsManager;
use crate::plan::DubinsPlan;
use crate::ribbon::RibbonManager;
use crate::state::State;

use super::{Planner, Stats};

/// How far outside a map's ribbon bounding box random seed samples may land.
const SAMPLE_MARGIN: f64 = 50.;

struct Node {
    state: State,
    parent: Option<usize>,
    edge: Option<DubinsSegment>,
    g: f64,
    h: f64,
    /// Bitmask of ribbon indices this path has already swept an uncovered endpoint of.
    /// Caps coverage-aware search at 64 ribbons; documented as a planner-internal limit.
    visited: u64,
}

struct QueueEntry {
    f: f64,
    h: f64,
    g: f64,
    seq: u64,
    idx: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap; every comparison is reversed so the *lowest* `f` (then
/// lowest `h`, then lowest `g`, then earliest `seq`) sorts to the top.
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.h.partial_cmp(&self.h).unwrap_or(Ordering::Equal))
            .then_with(|| other.g.partial_cmp(&self.g).unwrap_or(Ordering::Equal))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct AStarPlanner;

impl AStarPlanner {
    pub fn new() -> AStarPlanner {
        AStarPlanner
    }

    /// Builds the Dubins edge from `from` to `target` at `rho`/`speed`, rejecting it if
    /// any `collision_checking_increment`-spaced sample along it lands on a blocked cell.
    /// Returns the edge and its cost (arc length plus integrated dynamic-obstacle cost).
    fn try_edge(
        from: &State,
        target: (f64, f64, f64),
        cfg: &PlannerConfig,
        dyn_obs: &DynObsManager,
    ) -> Option<(DubinsSegment, f64)> {
        let variants = DubinsPathType::for_config(cfg.use_brown_paths);
        let segment = DubinsSegment::connect_with_variants(from, target, cfg.turning_radius, Some(cfg.max_speed), &variants);
        let dt = (cfg.collision_checking_increment / segment.speed).max(1.0e-3);
        let mut t = segment.start_time;
        let mut dyn_cost = 0.;
        loop {
            let s = segment.sample(t.min(segment.end_time())).ok()?;
            if cfg.map.is_blocked(s.x, s.y) {
                return None;
            }
            dyn_cost += dyn_obs.collision_cost(s.x, s.y, s.time, false);
            if t >= segment.end_time() {
                break;
            }
            t += dt;
        }
        let cost = segment.total_arc_length() + dyn_cost;
        Some((segment, cost))
    }
}

impl Default for AStarPlanner {
    fn default() -> AStarPlanner {
        AStarPlanner::new()
    }
}

impl Planner for AStarPlanner {
    fn name(&self) -> &'static str {
        "astar"
    }

    fn plan(
        &self,
        ribbons: &RibbonManager,
        start: &State,
        cfg: &PlannerConfig,
        _previous_plan: &DubinsPlan,
        time_budget: f64,
        dyn_obs: &DynObsManager,
    ) -> Stats {
        let timer = Timer::default();
        let goal_mask: u64 = if ribbons.ribbons().is_empty() { 0 } else { (1u64 << ribbons.ribbons().len().min(63)) - 1 };

        let mut arena: Vec<Node> = vec![Node {
            state: *start,
            parent: None,
            edge: None,
            g: 0.,
            h: ribbons.heuristic_cost(start),
            visited: 0,
        }];
        let mut heap = BinaryHeap::new();
        let mut seq: u64 = 0;
        heap.push(QueueEntry { f: arena[0].h, h: arena[0].h, g: 0., seq, idx: 0 });

        let mut best_idx = 0usize;
        let mut best_f = arena[0].h;

        let mut rng = rand::thread_rng();
        let (min_x, max_x, min_y, max_y) = ribbons.ribbons().iter().fold(
            (start.x - SAMPLE_MARGIN, start.x + SAMPLE_MARGIN, start.y - SAMPLE_MARGIN, start.y + SAMPLE_MARGIN),
            |(lox, hix, loy, hiy), r| {
                (lox.min(r.a.0).min(r.b.0), hix.max(r.a.0).max(r.b.0), loy.min(r.a.1).min(r.b.1), hiy.max(r.a.1).max(r.b.1))
            },
        );
        let mut generated = 1u32;
        for _ in 0..cfg.initial_samples {
            let sample = (
                rng.gen_range(min_x - SAMPLE_MARGIN, max_x + SAMPLE_MARGIN),
                rng.gen_range(min_y - SAMPLE_MARGIN, max_y + SAMPLE_MARGIN),
                rng.gen_range(0., 2. * std::f64::consts::PI),
            );
            if let Some((edge, cost)) = Self::try_edge(start, sample, cfg, dyn_obs) {
                let child_state = edge.end_state();
                let h = ribbons.heuristic_cost(&child_state);
                let g = cost;
                let idx = arena.len();
                arena.push(Node { state: child_state, parent: Some(0), edge: Some(edge), g, h, visited: 0 });
                seq += 1;
                heap.push(QueueEntry { f: g + h, h, g, seq, idx });
                generated += 1;
                if g + h < best_f {
                    best_f = g + h;
                    best_idx = idx;
                }
            }
        }

        let mut expanded = 0u32;
        let mut iterations = 0u32;

        while let Some(entry) = heap.pop() {
            iterations += 1;
            if timer.dur_s() >= time_budget {
                break;
            }
            let node_idx = entry.idx;
            if entry.f < best_f {
                best_f = entry.f;
                best_idx = node_idx;
            }
            if arena[node_idx].visited == goal_mask {
                best_idx = node_idx;
                break;
            }
            expanded += 1;

            let candidates: Vec<(usize, f64, f64, f64)> = {
                let state = arena[node_idx].state;
                let mut unvisited: Vec<(usize, f64, f64, f64)> = ribbons
                    .uncovered_endpoints_indexed()
                    .into_iter()
                    .filter(|&(ridx, _, _, _)| arena[node_idx].visited & (1u64 << ridx.min(63)) == 0)
                    .collect();
                unvisited.sort_by(|a, b| {
                    let da = (a.1 - state.x).powi(2) + (a.2 - state.y).powi(2);
                    let db = (b.1 - state.x).powi(2) + (b.2 - state.y).powi(2);
                    da.partial_cmp(&db).unwrap_or(Ordering::Equal)
                });
                unvisited.into_iter().take(cfg.k.max(1)).collect()
            };

            for (ridx, ex, ey, eh) in candidates {
                let parent_state = arena[node_idx].state;
                if let Some((edge, cost)) = Self::try_edge(&parent_state, (ex, ey, eh), cfg, dyn_obs) {
                    let child_state = edge.end_state();
                    let g = arena[node_idx].g + cost;
                    let h = ribbons.heuristic_cost(&child_state);
                    let visited = arena[node_idx].visited | (1u64 << ridx.min(63));
                    let idx = arena.len();
                    arena.push(Node { state: child_state, parent: Some(node_idx), edge: Some(edge), g, h, visited });
                    seq += 1;
                    heap.push(QueueEntry { f: g + h, h, g, seq, idx });
                    generated += 1;
                    if g + h < best_f {
                        best_f = g + h;
                        best_idx = idx;
                    }
                }
            }

            if timer.dur_s() >= time_budget {
                break;
            }
        }

        let mut segments = Vec::new();
        let mut cursor = Some(best_idx);
        while let Some(idx) = cursor {
            if let Some(edge) = &arena[idx].edge {
                segments.push(edge.clone());
            }
            cursor = arena[idx].parent;
        }
        segments.reverse();

        let mut plan = DubinsPlan::from_segments(segments);
        plan.dangerous = plan.segments().iter().any(|s| {
            dyn_obs.collision_cost(s.end_state().x, s.end_state().y, s.end_time(), false) > 0.
        });

        Stats::from_plan(plan, generated, expanded, iterations, best_f)
    }
}
