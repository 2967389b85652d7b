//! ASV ribbon-coverage path planner: real-time Dubins replanning over static and
//! dynamic obstacles.

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

pub mod config;
pub mod dubins;
pub mod error;
pub mod executive;
pub mod instrumentation;
pub mod map;
pub mod obstacle;
pub mod plan;
pub mod planner;
pub mod ribbon;
pub mod state;
pub mod wire;

pub use config::{PlannerConfig, WhichPlanner};
pub use dubins::{DubinsPathType, DubinsSegment};
pub use error::{PlannerError, PlannerResult};
pub use executive::{Executive, ExecutiveEvent, LoggingObserver, PlannerObserver, PlannerState};
pub use map::Map;
pub use obstacle::DynObsManager;
pub use plan::DubinsPlan;
pub use planner::{Planner, Stats};
pub use ribbon::{Ribbon, RibbonHeuristic, RibbonManager};
pub use state::State;
