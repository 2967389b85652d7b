//! The replanning scheduler: owns the authoritative ribbon/obstacle/map state, drives
//! the per-cycle planning protocol on a background worker, and exchanges plans with
//! an externally-supplied `PlannerObserver`.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::{PlannerConfig, WhichPlanner};
use crate::error::{PlannerError, PlannerResult};
use crate::map::Map;
use crate::obstacle::{BinaryDynamicObstaclesManager, DynObsManager, GaussianDynamicObstaclesManager, ObstacleTrack, GaussianObstacle};
use crate::plan::DubinsPlan;
use crate::planner::astar::AStarPlanner;
use crate::planner::bitstar::BitStarPlanner;
use crate::planner::potential_field::PotentialFieldPlanner;
use crate::planner::{Planner, Stats};
use crate::ribbon::{Ribbon, RibbonManager};
use crate::state::State;

/// How long `startPlanner` waits for a draining `Cancelled` executive to settle into
/// `Inactive` before refusing to start a new run.
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Wall-clock slack the worker reserves inside `planningTimeIdeal` for everything
/// around the planner call itself (snapshot, dispatch, publish).
const PLANNING_TIME_OVERHEAD: f64 = 0.05;
/// Tolerance, in metres, within which the controller's reported continuation state is
/// considered co-located with the plan's sample at that time.
const DEVIATION_TOLERANCE: f64 = 2.0;
const TURNING_RADIUS_SHRINK_STEP: f64 = 0.5;
const TURNING_RADIUS_MIN_FRACTION: f64 = 0.5;
const COLLISION_PENALTY_WEIGHT: f64 = 1.0;
const TIME_PENALTY_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Inactive,
    Running,
    Cancelled,
}

/// Inbound events dispatched to the Executive from the (external) transport layer.
pub enum ExecutiveEvent {
    SetMap(Map),
    RefreshMap { path: String, lat: f64, lon: f64 },
    AddRibbon { x1: f64, y1: f64, x2: f64, y2: f64 },
    ClearRibbons,
    UpdateCovered { x: f64, y: f64, speed: f64, heading: f64, t: f64 },
    UpdateDynamicObstacleBinary(ObstacleTrack),
    UpdateDynamicObstacleGaussian(GaussianObstacle),
    SetConfiguration(PlannerConfig),
    SetPlanningTime(f64),
    StartPlanner,
    CancelPlanner,
    Terminate,
}

/// Outbound calls the Executive makes; the demo binary and tests supply stub or
/// logging implementations, matching the "transport is external" boundary.
pub trait PlannerObserver: Send + Sync {
    /// Hands the plan to the controller and returns the state it reports the next
    /// cycle should begin from. An `Err` means the controller RPC itself failed (not
    /// a deviation from the plan, which is reported through the returned `State`).
    fn publish_plan(&self, plan: &DubinsPlan, planning_time_ideal: f64) -> PlannerResult<State>;
    fn publish_stats(&self, stats: &Stats, collision_penalty: f64, last_plan_achievable: bool);
    fn publish_task_level_stats(&self, wall_clock: f64, cumulative_collision_penalty: f64, total_penalty: f64, uncovered_length: f64);
    fn display_trajectory(&self, samples: &[State], clear_previous: bool, dangerous: bool);
    fn display_ribbons(&self, ribbons: &[Ribbon]);
    fn all_done(&self);
}

/// Logs every outbound call instead of forwarding it anywhere; used by the demo binary
/// and as the default in tests that don't care about the transport side.
#[derive(Default)]
pub struct LoggingObserver;

impl PlannerObserver for LoggingObserver {
    fn publish_plan(&self, plan: &DubinsPlan, planning_time_ideal: f64) -> PlannerResult<State> {
        info!("publish_plan: {} segments, ideal={}", plan.len(), planning_time_ideal);
        Ok(plan.get_half_second_samples().last().copied().unwrap_or_else(State::sentinel))
    }

    fn publish_stats(&self, stats: &Stats, collision_penalty: f64, last_plan_achievable: bool) {
        info!(
            "publish_stats: generated={} expanded={} iterations={} final_cost={} collision_penalty={} achievable={}",
            stats.generated, stats.expanded, stats.iterations, stats.final_cost, collision_penalty, last_plan_achievable
        );
    }

    fn publish_task_level_stats(&self, wall_clock: f64, cumulative_collision_penalty: f64, total_penalty: f64, uncovered_length: f64) {
        info!(
            "publish_task_level_stats: wall_clock={} cumulative_collision_penalty={} total_penalty={} uncovered_length={}",
            wall_clock, cumulative_collision_penalty, total_penalty, uncovered_length
        );
    }

    fn display_trajectory(&self, samples: &[State], clear_previous: bool, dangerous: bool) {
        info!("display_trajectory: {} samples, clear_previous={}, dangerous={}", samples.len(), clear_previous, dangerous);
    }

    fn display_ribbons(&self, ribbons: &[Ribbon]) {
        info!("display_ribbons: {} ribbons", ribbons.len());
    }

    fn all_done(&self) {
        info!("all_done");
    }
}

fn default_planner_factory(which: WhichPlanner) -> Box<dyn Planner> {
    match which {
        WhichPlanner::PotentialField => Box::new(PotentialFieldPlanner::new()),
        WhichPlanner::AStar => Box::new(AStarPlanner::new()),
        WhichPlanner::BitStar => Box::new(BitStarPlanner::new()),
    }
}

/// What a single `run_cycle` call did, for the worker loop to react to.
pub enum CycleOutcome {
    Continue,
    AllDone,
    Cancelled,
}

struct Shared {
    ribbons: Mutex<RibbonManager>,
    map: Mutex<Map>,
    binary_obs: Mutex<BinaryDynamicObstaclesManager>,
    gaussian_obs: Mutex<GaussianDynamicObstaclesManager>,
    config: Mutex<PlannerConfig>,
    last_state: Mutex<State>,
    start_state: Mutex<State>,
    previous_plan: Mutex<DubinsPlan>,
    planning_time_ideal: Mutex<f64>,
    state: Mutex<PlannerState>,
    cv: Condvar,
    failure_count: Mutex<u32>,
    turning_radius_shrink_steps: Mutex<u32>,
    last_plan_achievable: Mutex<bool>,
    cumulative_collision_penalty: Mutex<f64>,
    trial_start: Mutex<Option<Instant>>,
}

pub struct Executive {
    shared: Arc<Shared>,
    observer: Arc<dyn PlannerObserver>,
    planner_factory: Arc<dyn Fn(WhichPlanner) -> Box<dyn Planner> + Send + Sync>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Executive {
    pub fn new(config: PlannerConfig, observer: Arc<dyn PlannerObserver>) -> Executive {
        Executive::with_planner_factory(config, observer, Arc::new(default_planner_factory))
    }

    /// Constructs an Executive with a caller-supplied planner factory, ignoring
    /// `config.which_planner`'s mapping to the three concrete planners. Used by tests
    /// that need to observe whether the planner was invoked at all (a "spy" planner).
    pub fn with_planner_factory(
        config: PlannerConfig,
        observer: Arc<dyn PlannerObserver>,
        planner_factory: Arc<dyn Fn(WhichPlanner) -> Box<dyn Planner> + Send + Sync>,
    ) -> Executive {
        Executive {
            shared: Arc::new(Shared {
                ribbons: Mutex::new(RibbonManager::new(config.heuristic, config.turning_radius, 0.5, config.k)),
                map: Mutex::new(config.map.clone()),
                binary_obs: Mutex::new(BinaryDynamicObstaclesManager::new()),
                gaussian_obs: Mutex::new(GaussianDynamicObstaclesManager::new()),
                config: Mutex::new(config),
                last_state: Mutex::new(State::sentinel()),
                start_state: Mutex::new(State::sentinel()),
                previous_plan: Mutex::new(DubinsPlan::new()),
                planning_time_ideal: Mutex::new(1.0),
                state: Mutex::new(PlannerState::Inactive),
                cv: Condvar::new(),
                failure_count: Mutex::new(0),
                turning_radius_shrink_steps: Mutex::new(0),
                last_plan_achievable: Mutex::new(true),
                cumulative_collision_penalty: Mutex::new(0.),
                trial_start: Mutex::new(None),
            }),
            observer,
            planner_factory,
            worker: Mutex::new(None),
        }
    }

    pub fn dispatch(&self, event: ExecutiveEvent) {
        match event {
            ExecutiveEvent::SetMap(m) => *self.shared.map.lock().unwrap() = m,
            ExecutiveEvent::RefreshMap { path, lat, lon } => match crate::map::load_map(&path, lat, lon) {
                Ok(m) => *self.shared.map.lock().unwrap() = m,
                Err(e) => warn!("refresh_map failed, keeping previous map: {}", e),
            },
            ExecutiveEvent::AddRibbon { x1, y1, x2, y2 } => {
                let width = self.shared.config.lock().unwrap().line_width;
                self.shared.ribbons.lock().unwrap().add(x1, y1, x2, y2, width);
            }
            ExecutiveEvent::ClearRibbons => self.shared.ribbons.lock().unwrap().clear(),
            ExecutiveEvent::UpdateCovered { x, y, speed, heading, t } => {
                self.shared.ribbons.lock().unwrap().cover(x, y, false);
                *self.shared.last_state.lock().unwrap() = State::new(x, y, heading, speed, t);
            }
            ExecutiveEvent::UpdateDynamicObstacleBinary(track) => self.shared.binary_obs.lock().unwrap().update(track),
            ExecutiveEvent::UpdateDynamicObstacleGaussian(obstacle) => self.shared.gaussian_obs.lock().unwrap().update(obstacle),
            ExecutiveEvent::SetConfiguration(cfg) => *self.shared.config.lock().unwrap() = cfg,
            ExecutiveEvent::SetPlanningTime(s) => *self.shared.planning_time_ideal.lock().unwrap() = s,
            ExecutiveEvent::StartPlanner => {
                if let Err(e) = self.start_planner() {
                    error!("start_planner failed: {}", e);
                }
            }
            ExecutiveEvent::CancelPlanner => self.cancel_planner(),
            ExecutiveEvent::Terminate => self.terminate(),
        }
    }

    /// `Inactive -> Running`, spawning the background worker. A no-op if already
    /// `Running`. If currently `Cancelled` (still draining), waits up to 2 s for
    /// `Inactive`; on timeout refuses to start.
    pub fn start_planner(&self) -> PlannerResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        match *state {
            PlannerState::Running => return Ok(()),
            PlannerState::Cancelled => {
                let (guard, timeout) =
                    self.shared.cv.wait_timeout_while(state, CANCEL_DRAIN_TIMEOUT, |s| *s != PlannerState::Inactive).unwrap();
                state = guard;
                if timeout.timed_out() && *state != PlannerState::Inactive {
                    return Err(PlannerError::UnknownFatal("previous cancellation is still draining".to_string()));
                }
            }
            PlannerState::Inactive => {}
        }
        *state = PlannerState::Running;
        *self.shared.trial_start.lock().unwrap() = Some(Instant::now());
        *self.shared.cumulative_collision_penalty.lock().unwrap() = 0.;
        drop(state);

        let shared = Arc::clone(&self.shared);
        let observer = Arc::clone(&self.observer);
        let planner_factory = Arc::clone(&self.planner_factory);
        let handle = std::thread::spawn(move || {
            loop {
                let cycle_start = Instant::now();
                match run_cycle(&shared, &*observer, &*planner_factory, cycle_start) {
                    CycleOutcome::Continue => {}
                    CycleOutcome::AllDone | CycleOutcome::Cancelled => break,
                }
            }
            let trial_start = shared.trial_start.lock().unwrap().take();
            let wall_clock = trial_start.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.);
            let cumulative = *shared.cumulative_collision_penalty.lock().unwrap();
            let uncovered = shared.ribbons.lock().unwrap().get_total_uncovered_length();
            observer.publish_task_level_stats(
                wall_clock,
                cumulative * COLLISION_PENALTY_WEIGHT,
                cumulative * COLLISION_PENALTY_WEIGHT + wall_clock * TIME_PENALTY_FACTOR,
                uncovered,
            );
            let mut state = shared.state.lock().unwrap();
            *state = PlannerState::Inactive;
            shared.cv.notify_all();
        });
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// `Running -> Cancelled`. The worker observes this at the top of its next cycle.
    pub fn cancel_planner(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if *state == PlannerState::Running {
            *state = PlannerState::Cancelled;
            self.shared.cv.notify_all();
        }
    }

    /// Cancels (if running) and blocks until the worker has fully drained to `Inactive`.
    pub fn terminate(&self) {
        self.cancel_planner();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn state(&self) -> PlannerState {
        *self.shared.state.lock().unwrap()
    }

    /// Read-only snapshot of the current configuration, for callers that need to
    /// observe e.g. a backoff-adjusted `time_horizon` without a dedicated event.
    pub fn config_snapshot(&self) -> PlannerConfig {
        self.shared.config.lock().unwrap().clone()
    }

    /// Runs exactly one cycle synchronously, bypassing the background worker and its
    /// end-of-cycle sleep. Exposed for deterministic testing of the per-cycle protocol.
    pub fn run_cycle_for_test(&self) -> CycleOutcome {
        run_cycle(&self.shared, &*self.observer, &*self.planner_factory, Instant::now())
    }
}

fn active_dyn_obs(shared: &Shared, cfg: &PlannerConfig) -> DynObsManager {
    if cfg.ignore_dynamic_obstacles {
        DynObsManager::Ignored
    } else if cfg.use_gaussian_dynamic_obstacles {
        DynObsManager::Gaussian(shared.gaussian_obs.lock().unwrap().clone())
    } else {
        DynObsManager::Binary(shared.binary_obs.lock().unwrap().clone())
    }
}

fn run_cycle(
    shared: &Arc<Shared>,
    observer: &dyn PlannerObserver,
    planner_factory: &(dyn Fn(WhichPlanner) -> Box<dyn Planner> + Send + Sync),
    cycle_start: Instant,
) -> CycleOutcome {
    // 2. cancellation check
    if *shared.state.lock().unwrap() == PlannerState::Cancelled {
        return CycleOutcome::Cancelled;
    }

    // 3. mission complete check
    if shared.ribbons.lock().unwrap().done() {
        observer.all_done();
        return CycleOutcome::AllDone;
    }

    // 4. best-effort ribbon snapshot for visualisation
    {
        let ribbons = shared.ribbons.lock().unwrap();
        observer.display_ribbons(ribbons.ribbons());
    }

    let planning_time_ideal = *shared.planning_time_ideal.lock().unwrap();

    // 5. derive a continuation state if none was left over
    {
        let mut start_state = shared.start_state.lock().unwrap();
        if start_state.is_sentinel() {
            let last = *shared.last_state.lock().unwrap();
            let dt = (planning_time_ideal - PLANNING_TIME_OVERHEAD).max(0.);
            *start_state = last.push(dt);
        }
    }
    let start_state = *shared.start_state.lock().unwrap();

    // 6. non-blocking map refresh into this cycle's config snapshot
    let mut cfg = shared.config.lock().unwrap().clone();
    if let Ok(map) = shared.map.try_lock() {
        cfg.map = map.clone();
    }
    if cfg.map.is_blocked(start_state.x, start_state.y) {
        warn!("derived start state ({}, {}) lies in a blocked cell; continuing anyway", start_state.x, start_state.y);
    }

    // 7. retain or clear the previous plan
    let mut previous_plan = if cfg.disable_plan_reuse {
        DubinsPlan::new()
    } else {
        shared.previous_plan.lock().unwrap().change_into_suffix(start_state.time)
    };

    // 8. shrink turning radius on a successful cycle, reset it on the deviation that
    // follows a failure
    let shrink_steps = {
        let mut steps = shared.turning_radius_shrink_steps.lock().unwrap();
        if !*shared.last_plan_achievable.lock().unwrap() {
            *steps = 0;
        } else {
            *steps += 1;
        }
        *steps
    };
    let shrink = (shrink_steps as f64) * TURNING_RADIUS_SHRINK_STEP;
    cfg.turning_radius = (cfg.turning_radius - shrink).max(cfg.turning_radius * TURNING_RADIUS_MIN_FRACTION);
    cfg.coverage_turning_radius = (cfg.coverage_turning_radius - shrink).max(cfg.coverage_turning_radius * TURNING_RADIUS_MIN_FRACTION);

    // 9. instantaneous collision penalty at the last known vehicle state
    let last_state = *shared.last_state.lock().unwrap();
    let dyn_obs = active_dyn_obs(shared, &cfg);
    let instantaneous_penalty = dyn_obs.collision_cost(last_state.x, last_state.y, last_state.time, false);
    *shared.cumulative_collision_penalty.lock().unwrap() += instantaneous_penalty;

    // 10. deep-cloned ribbon snapshot, with the projected covered strip attributed
    let mut ribbons_snapshot = shared.ribbons.lock().unwrap().clone();
    ribbons_snapshot.cover_between(last_state.x, last_state.y, start_state.x, start_state.y, false);

    // 11. plan, unless BIT* already holds a non-empty plan
    let remaining_budget = (planning_time_ideal - PLANNING_TIME_OVERHEAD - cycle_start.elapsed().as_secs_f64()).max(0.);
    let stats = if cfg.which_planner == WhichPlanner::BitStar && !previous_plan.empty() {
        Stats::from_plan(previous_plan.clone(), 0, 0, 0, previous_plan.total_length())
    } else {
        let planner = planner_factory(cfg.which_planner);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            planner.plan(&ribbons_snapshot, &start_state, &cfg, &previous_plan, remaining_budget, &dyn_obs)
        }));
        match outcome {
            Ok(stats) => stats,
            Err(_) => {
                error!("planner '{}' panicked; treating this cycle as an empty plan", planner.name());
                Stats::empty()
            }
        }
    };

    let last_plan_achievable_before = *shared.last_plan_achievable.lock().unwrap();
    observer.publish_stats(&stats, instantaneous_penalty, last_plan_achievable_before);

    // 12. sleep to the end of this cycle's ideal budget
    let elapsed = cycle_start.elapsed().as_secs_f64();
    let sleep_for = planning_time_ideal - PLANNING_TIME_OVERHEAD - elapsed;
    if sleep_for > 0. {
        std::thread::sleep(Duration::from_secs_f64(sleep_for));
    }

    // 13. publish the trajectory for display
    observer.display_trajectory(&stats.plan.get_half_second_samples(), true, stats.plan.dangerous);

    // 14/15. hand off to the controller, or record a failure
    if !stats.plan.empty() {
        let next_start = match observer.publish_plan(&stats.plan, planning_time_ideal) {
            Ok(state) => state,
            Err(e) => {
                error!("controller RPC failed, cancelling: {}", e);
                *shared.state.lock().unwrap() = PlannerState::Cancelled;
                shared.cv.notify_all();
                return CycleOutcome::Cancelled;
            }
        };
        let co_located = stats
            .plan
            .sample_at(next_start.time)
            .map(|sampled| sampled.distance_to(&next_start) <= DEVIATION_TOLERANCE)
            .unwrap_or(false);

        if co_located {
            previous_plan = stats.plan;
            *shared.last_plan_achievable.lock().unwrap() = true;
        } else {
            warn!("controller deviated from the published plan; dropping it");
            previous_plan = DubinsPlan::new();
            *shared.last_plan_achievable.lock().unwrap() = false;
        }
        *shared.start_state.lock().unwrap() = next_start;
        *shared.last_state.lock().unwrap() = next_start;
        *shared.failure_count.lock().unwrap() = 0;
    } else {
        let mut failures = shared.failure_count.lock().unwrap();
        *failures += 1;
        if *failures > 2 {
            let mut config = shared.config.lock().unwrap();
            config.time_horizon = (config.time_horizon / 2.).max(config.time_minimum);
            *failures = 0;
        }
        drop(failures);
        *shared.start_state.lock().unwrap() = State::sentinel();
    }

    *shared.previous_plan.lock().unwrap() = previous_plan;

    CycleOutcome::Continue
}
