//! Error kinds for the planning core (see DESIGN.md, "error handling").

use thiserror::Error;

/// Failure modes surfaced by the planning core.
///
/// Recoverable kinds (`OutOfRange`, `PlanFailure`, `MapLoad`) are handled at a cycle
/// boundary by the [`crate::executive::Executive`] so the replanning loop keeps running.
/// `ControllerUnreachable` cancels the loop; `UnknownFatal` cancels and is re-raised.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlannerError {
    #[error("time {0} is out of range of the plan")]
    OutOfRange(f64),

    #[error("planner returned no plan within budget")]
    PlanFailure,

    #[error("controller is unreachable: {0}")]
    ControllerUnreachable(String),

    #[error("map failed to load: {0}")]
    MapLoad(String),

    #[error("unknown fatal error: {0}")]
    UnknownFatal(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;
