//! `PlannerConfig`: the immutable-per-call bundle of tunables and injected handles
//! every `Planner::plan` call receives by value.

use serde::{Deserialize, Serialize};

use crate::map::Map;
use crate::ribbon::RibbonHeuristic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhichPlanner {
    PotentialField,
    AStar,
    BitStar,
}

/// Recognized configuration keys from §6, plus the injected `Map` handle. `Map` is not
/// (de)serialized — it arrives over its own channel (`setMap`/`refreshMap`) — but the
/// rest of the bundle round-trips through the wire alongside plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub turning_radius: f64,
    pub coverage_turning_radius: f64,
    pub max_speed: f64,
    pub slow_speed: f64,
    pub line_width: f64,
    pub k: usize,
    pub heuristic: RibbonHeuristic,
    pub time_horizon: f64,
    pub time_minimum: f64,
    pub collision_checking_increment: f64,
    pub initial_samples: usize,
    /// Enables the triple-arc (`Rlr`/`Lrl`) Dubins word family alongside the default
    /// `Csc`-only search (see `dubins::DubinsPathType::for_config`).
    pub use_brown_paths: bool,
    /// When set, a cycle's step 7 discards the previous plan outright instead of
    /// retaining its unreached suffix.
    pub disable_plan_reuse: bool,
    pub use_gaussian_dynamic_obstacles: bool,
    pub ignore_dynamic_obstacles: bool,
    pub which_planner: WhichPlanner,
    /// Weight folding dynamic-obstacle collision cost into BIT*/A* edge cost.
    pub dynamic_obstacle_cost_factor: f64,
    pub dynamic_obstacle_time_stdev_factor: f64,
    pub dynamic_obstacle_time_stdev_power: f64,

    #[serde(skip, default = "Map::empty")]
    pub map: Map,
}

impl Default for PlannerConfig {
    fn default() -> PlannerConfig {
        PlannerConfig {
            turning_radius: 8.,
            coverage_turning_radius: 8.,
            max_speed: 2.5,
            slow_speed: 1.0,
            line_width: 5.,
            k: 5,
            heuristic: RibbonHeuristic::TspPointRobotNoSplitKRibbons,
            time_horizon: 60.,
            time_minimum: 15.,
            collision_checking_increment: 2.,
            initial_samples: 20,
            use_brown_paths: false,
            disable_plan_reuse: false,
            use_gaussian_dynamic_obstacles: false,
            ignore_dynamic_obstacles: false,
            which_planner: WhichPlanner::AStar,
            dynamic_obstacle_cost_factor: 100_000.,
            dynamic_obstacle_time_stdev_factor: 1.,
            dynamic_obstacle_time_stdev_power: 2.,
            map: Map::empty(),
        }
    }
}
