//! Wire format for exchanging plans with the external transport layer. Field names are
//! kept stable (`initial_x`, `length0`, ...) where downstream compatibility matters.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::dubins::{DubinsPathType, DubinsSegment};
use crate::plan::DubinsPlan;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DubinsPathWire {
    pub initial_x: f64,
    pub initial_y: f64,
    pub initial_yaw: f64,
    pub length0: f64,
    pub length1: f64,
    pub length2: f64,
    #[serde(rename = "type")]
    pub path_type: String,
    pub rho: f64,
    pub speed: f64,
    pub start_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanWire {
    pub paths: Vec<DubinsPathWire>,
    pub endtime: f64,
}

fn type_to_str(t: DubinsPathType) -> &'static str {
    match t {
        DubinsPathType::Lsl => "LSL",
        DubinsPathType::Lsr => "LSR",
        DubinsPathType::Rsl => "RSL",
        DubinsPathType::Rsr => "RSR",
        DubinsPathType::Rlr => "RLR",
        DubinsPathType::Lrl => "LRL",
    }
}

fn str_to_type(s: &str) -> Option<DubinsPathType> {
    match s {
        "LSL" => Some(DubinsPathType::Lsl),
        "LSR" => Some(DubinsPathType::Lsr),
        "RSL" => Some(DubinsPathType::Rsl),
        "RSR" => Some(DubinsPathType::Rsr),
        "RLR" => Some(DubinsPathType::Rlr),
        "LRL" => Some(DubinsPathType::Lrl),
        _ => None,
    }
}

impl From<&DubinsSegment> for DubinsPathWire {
    fn from(s: &DubinsSegment) -> DubinsPathWire {
        DubinsPathWire {
            initial_x: s.qi[0],
            initial_y: s.qi[1],
            initial_yaw: s.qi[2],
            length0: s.params[0],
            length1: s.params[1],
            length2: s.params[2],
            path_type: type_to_str(s.path_type).to_string(),
            rho: s.rho,
            speed: s.speed,
            start_time: s.start_time,
        }
    }
}

impl TryFrom<&DubinsPathWire> for DubinsSegment {
    type Error = String;

    fn try_from(w: &DubinsPathWire) -> Result<DubinsSegment, String> {
        let path_type = str_to_type(&w.path_type).ok_or_else(|| format!("unknown path type {}", w.path_type))?;
        Ok(DubinsSegment {
            qi: [w.initial_x, w.initial_y, w.initial_yaw],
            params: [w.length0, w.length1, w.length2],
            path_type,
            rho: w.rho,
            speed: w.speed,
            start_time: w.start_time,
        })
    }
}

impl From<&DubinsPlan> for PlanWire {
    fn from(p: &DubinsPlan) -> PlanWire {
        PlanWire {
            paths: p.segments().iter().map(DubinsPathWire::from).collect(),
            endtime: p.get_end_time().unwrap_or(0.),
        }
    }
}

impl TryFrom<&PlanWire> for DubinsPlan {
    type Error = String;

    fn try_from(w: &PlanWire) -> Result<DubinsPlan, String> {
        let segments = w.paths.iter().map(DubinsSegment::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(DubinsPlan::from_segments(segments))
    }
}
