//! Integration coverage for the Executive's per-cycle protocol, driven synchronously
//! via `run_cycle_for_test` so each scenario is deterministic without sleeping real
//! wall-clock seconds.

use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use asv_path_planner::config::{PlannerConfig, WhichPlanner};
use asv_path_planner::dubins::DubinsSegment;
use asv_path_planner::error::{PlannerError, PlannerResult};
use asv_path_planner::executive::{CycleOutcome, Executive, ExecutiveEvent, LoggingObserver, PlannerObserver, PlannerState};
use asv_path_planner::obstacle::DynObsManager;
use asv_path_planner::plan::DubinsPlan;
use asv_path_planner::planner::{Planner, Stats};
use asv_path_planner::ribbon::RibbonManager;
use asv_path_planner::state::State;

/// A planner stub that counts invocations and hands back a pre-built `Stats` value,
/// standing in for a real search so tests can assert on the scheduler's behaviour
/// around it rather than on search internals.
struct SpyPlanner {
    calls: Arc<AtomicU32>,
    stats: Mutex<Stats>,
}

impl Planner for SpyPlanner {
    fn name(&self) -> &'static str {
        "spy"
    }

    fn plan(
        &self,
        _ribbons: &RibbonManager,
        _start: &State,
        _cfg: &PlannerConfig,
        _previous_plan: &DubinsPlan,
        _time_budget: f64,
        _dyn_obs: &DynObsManager,
    ) -> Stats {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stats.lock().unwrap().clone()
    }
}

fn straight_plan(start: State, length: f64) -> DubinsPlan {
    let segment = DubinsSegment::connect(&start, (start.x + length, start.y, start.heading), 1000., Some(start.speed.max(1.0)));
    DubinsPlan::from_segments(vec![segment])
}

#[test]
fn single_straight_ribbon_is_planned_for_and_mission_completes_once_covered() {
    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::AStar;
    cfg.initial_samples = 15;
    cfg.k = 4;

    let executive = Executive::new(cfg, Arc::new(LoggingObserver::default()));
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 60., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.5));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -10., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });

    let outcome = executive.run_cycle_for_test();
    assert!(matches!(outcome, CycleOutcome::Continue), "one ribbon with free space around it should be plannable");

    // simulate the controller having swept the whole ribbon, the way the real
    // transport layer would feed back successive `updateCovered` reports.
    let mut x = 2.5;
    while x < 60. {
        executive.dispatch(ExecutiveEvent::UpdateCovered { x, y: 0., speed: 2., heading: FRAC_PI_2, t: x / 2. });
        x += 5.;
    }

    let outcome = executive.run_cycle_for_test();
    assert!(matches!(outcome, CycleOutcome::AllDone), "ribbon should read back as fully covered");
}

#[test]
fn bitstar_does_not_replan_while_its_previous_plan_is_still_non_empty() {
    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::BitStar;

    let calls = Arc::new(AtomicU32::new(0));
    let calls_for_factory = Arc::clone(&calls);
    let factory: Arc<dyn Fn(WhichPlanner) -> Box<dyn Planner> + Send + Sync> = Arc::new(move |_| {
        Box::new(SpyPlanner {
            calls: Arc::clone(&calls_for_factory),
            stats: Mutex::new(Stats::from_plan(straight_plan(State::new(0., 0., FRAC_PI_2, 2., 0.), 200.), 1, 1, 1, 10.)),
        })
    });

    let executive = Executive::with_planner_factory(cfg, Arc::new(LoggingObserver::default()), factory);
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 200., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.2));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: 0., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });

    executive.run_cycle_for_test();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "first cycle should invoke the planner once");

    executive.run_cycle_for_test();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second cycle should reuse the still-live BIT* plan");
}

#[test]
fn repeated_empty_plans_halve_time_horizon_down_to_the_floor() {
    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::AStar;
    cfg.time_horizon = 60.;
    cfg.time_minimum = 15.;

    let calls = Arc::new(AtomicU32::new(0));
    let calls_for_factory = Arc::clone(&calls);
    let factory: Arc<dyn Fn(WhichPlanner) -> Box<dyn Planner> + Send + Sync> =
        Arc::new(move |_| Box::new(SpyPlanner { calls: Arc::clone(&calls_for_factory), stats: Mutex::new(Stats::empty()) }));

    let executive = Executive::with_planner_factory(cfg, Arc::new(LoggingObserver::default()), factory);
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 60., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.1));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -10., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });

    for _ in 0..3 {
        executive.run_cycle_for_test();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(executive.config_snapshot().time_horizon, 30.);

    for _ in 0..3 {
        executive.run_cycle_for_test();
    }
    // second halving would go to 15, exactly the floor
    assert_eq!(executive.config_snapshot().time_horizon, 15.);

    for _ in 0..3 {
        executive.run_cycle_for_test();
    }
    // a further halving would undercut time_minimum and must clamp instead of dropping below it
    assert_eq!(executive.config_snapshot().time_horizon, 15.);
}

/// An observer whose `publish_plan` always reports a continuation state far from
/// where the plan actually is at that time, simulating a controller that deviated.
/// `publish_stats`' `last_plan_achievable` argument reflects the *previous* cycle's
/// outcome, so recording it across two cycles lets the test observe the flip.
struct DeviatingObserver {
    plans_published: Mutex<u32>,
    achievable_flags: Mutex<Vec<bool>>,
}

impl PlannerObserver for DeviatingObserver {
    fn publish_plan(&self, plan: &asv_path_planner::plan::DubinsPlan, _planning_time_ideal: f64) -> PlannerResult<State> {
        let sample = plan.get_half_second_samples().last().copied().unwrap_or_else(State::sentinel);
        *self.plans_published.lock().unwrap() += 1;
        Ok(State::new(sample.x + 500., sample.y + 500., sample.heading, sample.speed, sample.time))
    }
    fn publish_stats(&self, _stats: &Stats, _collision_penalty: f64, last_plan_achievable: bool) {
        self.achievable_flags.lock().unwrap().push(last_plan_achievable);
    }
    fn publish_task_level_stats(&self, _wall_clock: f64, _cumulative_collision_penalty: f64, _total_penalty: f64, _uncovered_length: f64) {}
    fn display_trajectory(&self, _samples: &[State], _clear_previous: bool, _dangerous: bool) {}
    fn display_ribbons(&self, _ribbons: &[asv_path_planner::ribbon::Ribbon]) {}
    fn all_done(&self) {}
}

#[test]
fn controller_deviation_drops_the_previous_plan_and_marks_it_unachievable() {
    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::AStar;
    cfg.initial_samples = 15;
    cfg.k = 4;

    let observer = Arc::new(DeviatingObserver { plans_published: Mutex::new(0), achievable_flags: Mutex::new(Vec::new()) });
    let executive = Executive::new(cfg, observer.clone());
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 60., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.5));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -10., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });

    executive.run_cycle_for_test();
    assert_eq!(*observer.plans_published.lock().unwrap(), 1, "a plan should have been found and handed to the controller");

    executive.run_cycle_for_test();
    let flags = observer.achievable_flags.lock().unwrap();
    assert_eq!(flags.len(), 2);
    assert!(flags[0], "before any deviation, last_plan_achievable starts true");
    assert!(!flags[1], "the reported continuation state was 500m from the plan, so it should register as a deviation");
}

#[test]
fn gaussian_obstacle_raises_instantaneous_collision_penalty_reported_in_stats() {
    use asv_path_planner::obstacle::GaussianObstacle;

    struct PenaltyCapture {
        last_penalty: Mutex<f64>,
    }
    impl PlannerObserver for PenaltyCapture {
        fn publish_plan(&self, plan: &asv_path_planner::plan::DubinsPlan, _planning_time_ideal: f64) -> PlannerResult<State> {
            Ok(plan.get_half_second_samples().last().copied().unwrap_or_else(State::sentinel))
        }
        fn publish_stats(&self, _stats: &Stats, collision_penalty: f64, _last_plan_achievable: bool) {
            *self.last_penalty.lock().unwrap() = collision_penalty;
        }
        fn publish_task_level_stats(&self, _wall_clock: f64, _cumulative_collision_penalty: f64, _total_penalty: f64, _uncovered_length: f64) {}
        fn display_trajectory(&self, _samples: &[State], _clear_previous: bool, _dangerous: bool) {}
        fn display_ribbons(&self, _ribbons: &[asv_path_planner::ribbon::Ribbon]) {}
        fn all_done(&self) {}
    }

    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::AStar;
    cfg.use_gaussian_dynamic_obstacles = true;
    cfg.initial_samples = 10;

    let observer = Arc::new(PenaltyCapture { last_penalty: Mutex::new(0.) });
    let executive = Executive::new(cfg, observer.clone());
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 60., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.5));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -10., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });
    executive.dispatch(ExecutiveEvent::UpdateDynamicObstacleGaussian(GaussianObstacle::new(1, -10., 0., FRAC_PI_2, 0., 0.)));

    executive.run_cycle_for_test();

    assert!(*observer.last_penalty.lock().unwrap() > 0., "a Gaussian obstacle centred on the vehicle should register a positive penalty");
}

/// An observer standing in for an unreachable controller: every `publish_plan` call
/// fails instead of returning a continuation state.
struct FailingObserver;

impl PlannerObserver for FailingObserver {
    fn publish_plan(&self, _plan: &asv_path_planner::plan::DubinsPlan, _planning_time_ideal: f64) -> PlannerResult<State> {
        Err(PlannerError::ControllerUnreachable("rpc timed out".to_string()))
    }
    fn publish_stats(&self, _stats: &Stats, _collision_penalty: f64, _last_plan_achievable: bool) {}
    fn publish_task_level_stats(&self, _wall_clock: f64, _cumulative_collision_penalty: f64, _total_penalty: f64, _uncovered_length: f64) {}
    fn display_trajectory(&self, _samples: &[State], _clear_previous: bool, _dangerous: bool) {}
    fn display_ribbons(&self, _ribbons: &[asv_path_planner::ribbon::Ribbon]) {}
    fn all_done(&self) {}
}

#[test]
fn controller_rpc_failure_cancels_the_planner() {
    let mut cfg = PlannerConfig::default();
    cfg.which_planner = WhichPlanner::AStar;
    cfg.initial_samples = 15;
    cfg.k = 4;

    let executive = Executive::new(cfg, Arc::new(FailingObserver));
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 60., y2: 0. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(0.5));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -10., y: 0., speed: 2., heading: FRAC_PI_2, t: 0. });

    let outcome = executive.run_cycle_for_test();
    assert!(matches!(outcome, CycleOutcome::Cancelled), "an unreachable controller should cancel the cycle");
    assert_eq!(executive.state(), PlannerState::Cancelled);
}
