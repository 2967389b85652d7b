//! Batch-informed tree search to a single goal pose. Unlike the ribbon-coverage
//! planners, BIT* here targets the nearest uncovered ribbon endpoint and is not
//! re-invoked by the Executive while its plan remains non-empty (see the executive's
//! per-cycle protocol).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;
use rayon::prelude::*;

use crate::config::PlannerConfig;
use crate::dubins::{DubinsPathType, DubinsSegment};
use crate::instrumentation::Timer;
use crate::obstacle::DynObsManager;
use crate::plan::DubinsPlan;
use crate::ribbon::RibbonManager;
use crate::state::State;

use super::{Planner, Stats};

const BATCH_SIZE: usize = 50;
const SAMPLE_MARGIN: f64 = 20.;

struct Node {
    state: State,
    parent: Option<usize>,
    edge: Option<DubinsSegment>,
    g: f64,
}

struct EdgeCandidate {
    lower_bound: f64,
    parent: usize,
    target: (f64, f64, f64),
}

impl PartialEq for EdgeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.lower_bound == other.lower_bound
    }
}
impl Eq for EdgeCandidate {}
impl PartialOrd for EdgeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for EdgeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap over lower_bound, reversed to pop the smallest lower bound first
        other.lower_bound.partial_cmp(&self.lower_bound).unwrap_or(Ordering::Equal)
    }
}

pub struct BitStarPlanner;

impl BitStarPlanner {
    pub fn new() -> BitStarPlanner {
        BitStarPlanner
    }

    /// Euclidean lower bound used to prioritise the edge queue before an expensive
    /// Dubins connection + collision check is spent on it.
    fn lower_bound(a: (f64, f64), b: (f64, f64), g_so_far: f64, h_goal: f64) -> f64 {
        let euclid = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
        g_so_far + euclid + h_goal
    }

    fn edge_cost(
        from: &State,
        target: (f64, f64, f64),
        cfg: &PlannerConfig,
        dyn_obs: &DynObsManager,
        goal_time: Option<f64>,
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
            let raw = dyn_obs.collision_cost(s.x, s.y, s.time, false);
            // time-stdev term: an obstacle prediction grows less trustworthy further
            // from the report time it was made, so cost is inflated the later a sample lands
            let sigma_t = goal_time.map(|gt| (s.time - gt).abs()).unwrap_or(0.);
            let inflated = raw
                * (1. + sigma_t.powf(cfg.dynamic_obstacle_time_stdev_power) * cfg.dynamic_obstacle_time_stdev_factor);
            dyn_cost += inflated * cfg.dynamic_obstacle_cost_factor;
            if t >= segment.end_time() {
                break;
            }
            t += dt;
        }
        Some((segment, segment.total_arc_length() + dyn_cost))
    }
}

impl Default for BitStarPlanner {
    fn default() -> BitStarPlanner {
        BitStarPlanner::new()
    }
}

impl Planner for BitStarPlanner {
    fn name(&self) -> &'static str {
        "bitstar"
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

        let endpoints = ribbons.uncovered_endpoints_with_heading();
        let goal = match endpoints
            .iter()
            .min_by(|a, b| {
                let da = (a.0 - start.x).powi(2) + (a.1 - start.y).powi(2);
                let db = (b.0 - start.x).powi(2) + (b.1 - start.y).powi(2);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
            .copied()
        {
            Some(g) => g,
            None => return Stats::empty(),
        };
        let goal_pos = (goal.0, goal.1);

        let mut arena = vec![Node { state: *start, parent: None, edge: None, g: 0. }];
        let mut best_solution: Option<(usize, f64)> = None;

        let mut iterations = 0u32;
        let mut expanded = 0u32;
        let mut generated = 1u32;

        while timer.dur_s() < time_budget {
            iterations += 1;

            // batch sample, in parallel, a pool of candidate poses biased towards the goal
            let samples: Vec<(f64, f64, f64)> = (0..BATCH_SIZE)
                .into_par_iter()
                .map_init(rand::thread_rng, |rng, _| {
                    let t = rng.gen_range(0.0f64, 1.0f64);
                    let x = start.x + (goal_pos.0 - start.x) * t + rng.gen_range(-SAMPLE_MARGIN, SAMPLE_MARGIN);
                    let y = start.y + (goal_pos.1 - start.y) * t + rng.gen_range(-SAMPLE_MARGIN, SAMPLE_MARGIN);
                    let heading = rng.gen_range(0., 2. * std::f64::consts::PI);
                    (x, y, heading)
                })
                .collect();

            let mut queue: BinaryHeap<EdgeCandidate> = BinaryHeap::new();
            for (parent_idx, node) in arena.iter().enumerate() {
                for &(sx, sy, _) in &samples {
                    let euclid_to_goal = ((sx - goal_pos.0).powi(2) + (sy - goal_pos.1).powi(2)).sqrt();
                    if let Some((_, best_cost)) = best_solution {
                        let lb = Self::lower_bound((node.state.x, node.state.y), (sx, sy), node.g, euclid_to_goal);
                        if lb >= best_cost {
                            continue;
                        }
                    }
                    let lb = Self::lower_bound((node.state.x, node.state.y), (sx, sy), node.g, euclid_to_goal);
                    queue.push(EdgeCandidate { lower_bound: lb, parent: parent_idx, target: (sx, sy, goal.2) });
                }
            }

            let mut processed = 0usize;
            while let Some(candidate) = queue.pop() {
                processed += 1;
                if processed > BATCH_SIZE * arena.len().max(1) {
                    break;
                }
                if let Some((_, best_cost)) = best_solution {
                    if candidate.lower_bound >= best_cost {
                        break;
                    }
                }
                let parent_state = arena[candidate.parent].state;
                if let Some((edge, cost)) =
                    Self::edge_cost(&parent_state, candidate.target, cfg, dyn_obs, Some(start.time))
                {
                    expanded += 1;
                    let child_state = edge.end_state();
                    let g = arena[candidate.parent].g + cost;
                    let idx = arena.len();
                    arena.push(Node { state: child_state, parent: Some(candidate.parent), edge: Some(edge), g });
                    generated += 1;

                    let to_goal = ((child_state.x - goal_pos.0).powi(2) + (child_state.y - goal_pos.1).powi(2)).sqrt();
                    if to_goal < cfg.collision_checking_increment.max(1.0) {
                        if best_solution.map_or(true, |(_, c)| g < c) {
                            best_solution = Some((idx, g));
                        }
                    }
                }
            }

            if best_solution.is_some() && iterations > 1 {
                // a solution exists and we've had at least one more batch to try to improve it
                break;
            }
        }

        let best_idx = match best_solution {
            Some((idx, _)) => idx,
            None => return Stats::empty(),
        };

        let mut segments = Vec::new();
        let mut cursor = Some(best_idx);
        while let Some(idx) = cursor {
            if let Some(edge) = &arena[idx].edge {
                segments.push(edge.clone());
            }
            cursor = arena[idx].parent;
        }
        segments.reverse();

        let plan = DubinsPlan::from_segments(segments);
        let final_cost = best_solution.map(|(_, c)| c).unwrap_or(f64::INFINITY);
        Stats::from_plan(plan, generated, expanded, iterations, final_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ribbon::RibbonHeuristic;

    #[test]
    fn finds_a_plan_towards_nearest_uncovered_endpoint() {
        let mut ribbons = RibbonManager::new(RibbonHeuristic::MaxDistance, 8., 0.5, 5);
        ribbons.add(20., 0., 60., 0., 5.);
        let cfg = PlannerConfig::default();
        let start = State::new(0., 0., 0., 2., 0.);
        let dyn_obs = DynObsManager::Ignored;

        let planner = BitStarPlanner::new();
        let stats = planner.plan(&ribbons, &start, &cfg, &DubinsPlan::new(), 0.5, &dyn_obs);

        assert!(!stats.plan.empty());
    }

    #[test]
    fn no_uncovered_ribbons_yields_empty_plan() {
        let ribbons = RibbonManager::new(RibbonHeuristic::MaxDistance, 8., 0.5, 5);
        let cfg = PlannerConfig::default();
        let start = State::new(0., 0., 0., 2., 0.);
        let dyn_obs = DynObsManager::Ignored;

        let planner = BitStarPlanner::new();
        let stats = planner.plan(&ribbons, &start, &cfg, &DubinsPlan::new(), 0.5, &dyn_obs);

        assert!(stats.plan.empty());
    }
}
