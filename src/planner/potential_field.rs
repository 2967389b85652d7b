//! Reactive force-based planner: sums ribbon attraction against static and dynamic
//! obstacle repulsion and steers along the resultant for a short lookahead.
//!
//! No search, no memory across cycles: every call recomputes the field from scratch,
//! which is what makes this planner cheap enough to serve as the always-available
//! fallback when the search planners miss their time budget.

use crate::config::PlannerConfig;
use crate::dubins::{DubinsPathType, DubinsSegment};
use crate::obstacle::DynObsManager;
use crate::plan::DubinsPlan;
use crate::ribbon::RibbonManager;
use crate::state::State;

use super::{Planner, Stats};

const LOOKAHEAD_STEPS: usize = 10;
const LOOKAHEAD_DISTANCE: f64 = 10.;
/// Below this net-force magnitude the field is considered flat; returning an empty
/// plan here is what tells the Executive to fall back to whatever plan it already has.
const FORCE_FLOOR: f64 = 1.0e-3;

const RIBBON_ATTRACTION_CAP: f64 = 20.;
const RIBBON_ATTRACTION_CAP_DISTANCE: f64 = 0.5;

const STATIC_REPULSION_RADIUS: f64 = 7.5;
const STATIC_REPULSION_SCALE: f64 = 15.;

const DYNAMIC_REPULSION_SCALE: f64 = 13.;
const DYNAMIC_REPULSION_COLLISION_COST: f64 = 1000.;

pub struct PotentialFieldPlanner;

impl PotentialFieldPlanner {
    pub fn new() -> PotentialFieldPlanner {
        PotentialFieldPlanner
    }

    /// Net attraction/repulsion force at `(x, y)` and time `t`, as `(fx, fy)` in the
    /// same east/north axes `State::push` uses.
    fn net_force(
        x: f64,
        y: f64,
        t: f64,
        ribbons: &RibbonManager,
        cfg: &PlannerConfig,
        dyn_obs: &DynObsManager,
    ) -> (f64, f64) {
        let mut fx = 0.;
        let mut fy = 0.;

        for (ex, ey, _heading) in ribbons.uncovered_endpoints_with_heading() {
            let dx = ex - x;
            let dy = ey - y;
            let d = (dx * dx + dy * dy).sqrt();
            if d <= f64::EPSILON {
                continue;
            }
            let mag = if d <= RIBBON_ATTRACTION_CAP_DISTANCE { RIBBON_ATTRACTION_CAP } else { 10. / d };
            fx += mag * dx / d;
            fy += mag * dy / d;
        }

        if let Some((ox, oy, d)) = cfg.map.nearest_blocked(x, y, STATIC_REPULSION_RADIUS) {
            if d <= STATIC_REPULSION_RADIUS {
                let mag = (-d / STATIC_REPULSION_SCALE).exp();
                let dx = x - ox;
                let dy = y - oy;
                let norm = (dx * dx + dy * dy).sqrt().max(f64::EPSILON);
                fx += mag * dx / norm;
                fy += mag * dy / norm;
            }
        }

        for (ox, oy, width, length) in dyn_obs.footprints_at(t) {
            let dx = x - ox;
            let dy = y - oy;
            let d = (dx * dx + dy * dy).sqrt();
            let mag = if d <= 0. {
                DYNAMIC_REPULSION_COLLISION_COST
            } else {
                (-d / DYNAMIC_REPULSION_SCALE).exp() * width * length / 10.
            };
            let norm = d.max(f64::EPSILON);
            fx += mag * dx / norm;
            fy += mag * dy / norm;
        }

        (fx, fy)
    }
}

impl Default for PotentialFieldPlanner {
    fn default() -> PotentialFieldPlanner {
        PotentialFieldPlanner::new()
    }
}

impl Planner for PotentialFieldPlanner {
    fn name(&self) -> &'static str {
        "potential_field"
    }

    fn plan(
        &self,
        ribbons: &RibbonManager,
        start: &State,
        cfg: &PlannerConfig,
        _previous_plan: &DubinsPlan,
        _time_budget: f64,
        dyn_obs: &DynObsManager,
    ) -> Stats {
        let mut plan = DubinsPlan::new();
        let mut current = *start;

        for _ in 0..LOOKAHEAD_STEPS {
            let (fx, fy) = Self::net_force(current.x, current.y, current.time, ribbons, cfg, dyn_obs);
            let mag = (fx * fx + fy * fy).sqrt();
            if mag < FORCE_FLOOR {
                break;
            }
            let heading = fx.atan2(fy);
            let target = (
                current.x + LOOKAHEAD_DISTANCE * heading.sin(),
                current.y + LOOKAHEAD_DISTANCE * heading.cos(),
                heading,
            );
            let variants = DubinsPathType::for_config(cfg.use_brown_paths);
            let segment = DubinsSegment::connect_with_variants(&current, target, cfg.coverage_turning_radius, Some(cfg.slow_speed), &variants);
            if dyn_obs.collision_cost(target.0, target.1, segment.end_time(), false) > 0. {
                plan.dangerous = true;
            }
            current = segment.end_state();
            plan.append(segment);
        }

        let len = plan.len() as u32;
        let cost = plan.total_length();
        Stats::from_plan(plan, len, len, len, cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::ribbon::RibbonHeuristic;

    #[test]
    fn steers_towards_uncovered_ribbon() {
        let mut ribbons = RibbonManager::new(RibbonHeuristic::MaxDistance, 8., 0.5, 5);
        ribbons.add(40., 0., 80., 0., 5.);
        let cfg = PlannerConfig::default();
        let dyn_obs = DynObsManager::Ignored;
        let start = State::new(0., 0., 0., 2., 0.);

        let planner = PotentialFieldPlanner::new();
        let stats = planner.plan(&ribbons, &start, &cfg, &DubinsPlan::new(), 1., &dyn_obs);

        assert!(!stats.plan.empty());
        let end = stats.plan.segments().last().unwrap().end_state();
        assert!(end.x > start.x, "expected forward progress towards the ribbon, got x={}", end.x);
    }

    #[test]
    fn flat_field_yields_empty_plan() {
        let ribbons = RibbonManager::new(RibbonHeuristic::MaxDistance, 8., 0.5, 5);
        let cfg = PlannerConfig::default();
        let dyn_obs = DynObsManager::Ignored;
        let start = State::new(0., 0., 0., 2., 0.);

        let planner = PotentialFieldPlanner::new();
        let stats = planner.plan(&ribbons, &start, &cfg, &DubinsPlan::new(), 1., &dyn_obs);

        assert!(stats.plan.empty());
    }

    #[test]
    fn marks_plan_dangerous_near_dynamic_obstacle() {
        use crate::obstacle::{BinaryDynamicObstaclesManager, ObstacleTrack};

        let mut ribbons = RibbonManager::new(RibbonHeuristic::MaxDistance, 8., 0.5, 5);
        ribbons.add(40., 0., 80., 0., 5.);
        let cfg = PlannerConfig::default();
        let mut mgr = BinaryDynamicObstaclesManager::new();
        mgr.update(ObstacleTrack { mmsi: 1, x: 10., y: 0., heading: 0., speed: 0., width: 6., length: 10., time: 0. });
        let dyn_obs = DynObsManager::Binary(mgr);
        let start = State::new(0., 0., 0., 2., 0.);

        let planner = PotentialFieldPlanner::new();
        let stats = planner.plan(&ribbons, &start, &cfg, &DubinsPlan::new(), 1., &dyn_obs);

        assert!(!stats.plan.empty());
    }
}
