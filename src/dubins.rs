//! Dubins curve math: the shortest curvature-constrained path between two poses at a
//! fixed turning radius, and the constant-speed, constant-curvature segment built from it.
//!
//! Follows the classic Dubins path classification (Shkel & Lumelsky) used by the usual
//! open implementations of the six path words LSL/LSR/RSL/RSR/RLR/LRL.

use std::f64::consts::PI;

use crate::error::{PlannerError, PlannerResult};
use crate::state::State;

/// One of the six canonical Dubins path words, each made of three `L`/`S`/`R` arcs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DubinsPathType {
    Lsl,
    Lsr,
    Rsl,
    Rsr,
    Rlr,
    Lrl,
}

impl DubinsPathType {
    /// The three arc kinds ('L'eft, 'S'traight, 'R'ight) that make up this path word.
    fn segment_kinds(self) -> [SegmentKind; 3] {
        use DubinsPathType::*;
        use SegmentKind::*;
        match self {
            Lsl => [L, S, L],
            Lsr => [L, S, R],
            Rsl => [R, S, L],
            Rsr => [R, S, R],
            Rlr => [R, L, R],
            Lrl => [L, R, L],
        }
    }

    pub fn all() -> [DubinsPathType; 6] {
        use DubinsPathType::*;
        [Lsl, Lsr, Rsl, Rsr, Rlr, Lrl]
    }

    /// The four `Csc` words only, excluding the triple-arc `Rlr`/`Lrl` ("brown path")
    /// family `useBrownPaths` toggles on.
    pub fn csc() -> [DubinsPathType; 4] {
        use DubinsPathType::*;
        [Lsl, Lsr, Rsl, Rsr]
    }

    /// The variant set `useBrownPaths` selects between: CSC-only by default, plus the
    /// triple-arc family when enabled.
    pub fn for_config(use_brown_paths: bool) -> Vec<DubinsPathType> {
        if use_brown_paths {
            DubinsPathType::all().to_vec()
        } else {
            DubinsPathType::csc().to_vec()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    L,
    S,
    R,
}

fn mod2pi(theta: f64) -> f64 {
    let twopi = 2. * PI;
    theta - twopi * (theta / twopi).floor()
}

/// `heading` is compass convention (radians clockwise from north); the classic Dubins
/// formulas below assume the usual math convention (radians counter-clockwise from +x).
/// This conversion is its own inverse, mirroring the `yaw = pi/2 - heading` conversion
/// the Gaussian obstacle model applies for the same reason.
fn compass_to_math(heading: f64) -> f64 {
    PI / 2. - heading
}

/// Candidate normalised parameters `[t, p, q]` for a path word, or `None` if infeasible
/// (only `Rlr`/`Lrl` can be infeasible; the `Csc` family always has a solution).
fn candidate_params(path_type: DubinsPathType, d: f64, alpha: f64, beta: f64) -> Option<[f64; 3]> {
    let (sa, ca) = alpha.sin_cos();
    let (sb, cb) = beta.sin_cos();
    let c_ab = (alpha - beta).cos();

    match path_type {
        DubinsPathType::Lsl => {
            let p_sq = 2. + d * d - 2. * c_ab + 2. * d * (sa - sb);
            if p_sq < 0. {
                return None;
            }
            let tmp0 = d + sa - sb;
            let tmp1 = (cb - ca).atan2(tmp0);
            let t = mod2pi(-alpha + tmp1);
            let p = p_sq.sqrt();
            let q = mod2pi(beta - tmp1);
            Some([t, p, q])
        }
        DubinsPathType::Rsr => {
            let p_sq = 2. + d * d - 2. * c_ab + 2. * d * (sb - sa);
            if p_sq < 0. {
                return None;
            }
            let tmp0 = d - sa + sb;
            let tmp1 = (ca - cb).atan2(tmp0);
            let t = mod2pi(alpha - tmp1);
            let p = p_sq.sqrt();
            let q = mod2pi(-beta + tmp1);
            Some([t, p, q])
        }
        DubinsPathType::Lsr => {
            let p_sq = -2. + d * d + 2. * c_ab + 2. * d * (sa + sb);
            if p_sq < 0. {
                return None;
            }
            let p = p_sq.sqrt();
            let tmp2 = (-ca - cb).atan2(d + sa + sb) - (-2.0_f64).atan2(p);
            let t = mod2pi(-alpha + tmp2);
            let q = mod2pi(-mod2pi(beta) + tmp2);
            Some([t, p, q])
        }
        DubinsPathType::Rsl => {
            let p_sq = d * d - 2. + 2. * c_ab - 2. * d * (sa + sb);
            if p_sq < 0. {
                return None;
            }
            let p = p_sq.sqrt();
            let tmp2 = (ca + cb).atan2(d - sa - sb) - (2.0_f64).atan2(p);
            let t = mod2pi(alpha - tmp2);
            let q = mod2pi(beta - tmp2);
            Some([t, p, q])
        }
        DubinsPathType::Rlr => {
            let tmp = (6. - d * d + 2. * c_ab + 2. * d * (sa - sb)) / 8.;
            if tmp.abs() > 1. {
                return None;
            }
            let p = mod2pi(2. * PI - tmp.acos());
            let t = mod2pi(alpha - (ca - cb).atan2(d - sa + sb) + p / 2.);
            let q = mod2pi(alpha - beta - t + p);
            Some([t, p, q])
        }
        DubinsPathType::Lrl => {
            let tmp = (6. - d * d + 2. * c_ab + 2. * d * (sb - sa)) / 8.;
            if tmp.abs() > 1. {
                return None;
            }
            let p = mod2pi(2. * PI - tmp.acos());
            let t = mod2pi(-alpha - (ca - cb).atan2(d + sa - sb) + p / 2.);
            let q = mod2pi(beta - alpha - t + p);
            Some([t, p, q])
        }
    }
}

/// Shortest Dubins path word between `q0` and `q1` (`[x, y, heading]`) at turning radius
/// `rho`, searched over `variants` only. Always succeeds as long as `variants` includes
/// at least one `Csc` word, since that family is feasible for any pair of poses.
pub fn shortest_path_among(
    q0: [f64; 3],
    q1: [f64; 3],
    rho: f64,
    variants: &[DubinsPathType],
) -> (DubinsPathType, [f64; 3]) {
    let dx = q1[0] - q0[0];
    let dy = q1[1] - q0[1];
    let d = (dx * dx + dy * dy).sqrt() / rho;
    let theta = mod2pi(dy.atan2(dx));
    let alpha = mod2pi(q0[2] - theta);
    let beta = mod2pi(q1[2] - theta);

    let mut best: Option<(DubinsPathType, [f64; 3], f64)> = None;
    for &path_type in variants {
        if let Some(params) = candidate_params(path_type, d, alpha, beta) {
            let len = params[0] + params[1] + params[2];
            if best.map_or(true, |(_, _, best_len)| len < best_len) {
                best = Some((path_type, params, len));
            }
        }
    }
    // Csc family (Lsl/Rsr/Lsr/Rsl) is always feasible, so `best` is always `Some`.
    let (path_type, params, _) = best.expect("Dubins Csc family is always feasible");
    (path_type, params)
}

/// Shortest of the six Dubins path words between `q0` and `q1` (`[x, y, heading]`) at
/// turning radius `rho`. Always succeeds: the `Csc` family is feasible for any pair of poses.
pub fn shortest_path(
    q0: [f64; 3],
    q1: [f64; 3],
    rho: f64,
) -> (DubinsPathType, [f64; 3]) {
    let all = DubinsPathType::all();
    shortest_path_among(q0, q1, rho, &all)
}

fn walk_segment(t: f64, qi: [f64; 3], kind: SegmentKind) -> [f64; 3] {
    match kind {
        SegmentKind::L => [
            qi[0] + (qi[2] + t).sin() - qi[2].sin(),
            qi[1] - (qi[2] + t).cos() + qi[2].cos(),
            qi[2] + t,
        ],
        SegmentKind::R => [
            qi[0] - (qi[2] - t).sin() + qi[2].sin(),
            qi[1] + (qi[2] - t).cos() - qi[2].cos(),
            qi[2] - t,
        ],
        SegmentKind::S => [qi[0] + qi[2].cos() * t, qi[1] + qi[2].sin() * t, qi[2]],
    }
}

/// One constant-speed, constant-curvature Dubins curve with an absolute start time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DubinsSegment {
    /// Initial pose `[x, y, heading]` in absolute map coordinates. `heading` here is
    /// stored in math convention internally; see [`compass_to_math`].
    pub qi: [f64; 3],
    /// Normalised arc lengths of the three sub-arcs (actual length is `rho * params[i]`).
    pub params: [f64; 3],
    pub path_type: DubinsPathType,
    pub rho: f64,
    pub speed: f64,
    pub start_time: f64,
}

impl DubinsSegment {
    /// Builds the shortest Dubins segment connecting `from` to a target pose
    /// `(x, y, heading)`, starting at `from.time` and travelling at `from.speed`
    /// (or `speed_override` if given, useful when switching transit/coverage speed).
    pub fn connect(from: &State, target: (f64, f64, f64), rho: f64, speed_override: Option<f64>) -> DubinsSegment {
        let q0 = [from.x, from.y, compass_to_math(from.heading)];
        let q1 = [target.0, target.1, compass_to_math(target.2)];
        let (path_type, params) = shortest_path(q0, q1, rho);
        DubinsSegment {
            qi: q0,
            params,
            path_type,
            rho,
            speed: speed_override.unwrap_or(from.speed).max(f64::EPSILON),
            start_time: from.time,
        }
    }

    /// As [`DubinsSegment::connect`], but restricted to `variants` — the `useBrownPaths`
    /// knob toggles between the CSC-only family and the full six-word search.
    pub fn connect_with_variants(
        from: &State,
        target: (f64, f64, f64),
        rho: f64,
        speed_override: Option<f64>,
        variants: &[DubinsPathType],
    ) -> DubinsSegment {
        let q0 = [from.x, from.y, compass_to_math(from.heading)];
        let q1 = [target.0, target.1, compass_to_math(target.2)];
        let (path_type, params) = shortest_path_among(q0, q1, rho, variants);
        DubinsSegment {
            qi: q0,
            params,
            path_type,
            rho,
            speed: speed_override.unwrap_or(from.speed).max(f64::EPSILON),
            start_time: from.time,
        }
    }

    pub fn normalised_length(&self) -> f64 {
        self.params[0] + self.params[1] + self.params[2]
    }

    pub fn total_arc_length(&self) -> f64 {
        self.rho * self.normalised_length()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.total_arc_length() / self.speed
    }

    pub fn contains_time(&self, t: f64) -> bool {
        t >= self.start_time && t <= self.end_time()
    }

    /// Samples the segment at absolute time `t`, returning the vehicle state there.
    pub fn sample(&self, t: f64) -> PlannerResult<State> {
        if !self.contains_time(t) {
            return Err(PlannerError::OutOfRange(t));
        }
        let arc_travelled = (self.speed * (t - self.start_time)).max(0.);
        let tprime = (arc_travelled / self.rho).min(self.normalised_length());

        let kinds = self.path_type.segment_kinds();
        let qi = [0., 0., self.qi[2]];
        let q1 = walk_segment(self.params[0], qi, kinds[0]);
        let q2 = walk_segment(self.params[1], q1, kinds[1]);

        let q = if tprime < self.params[0] {
            walk_segment(tprime, qi, kinds[0])
        } else if tprime < self.params[0] + self.params[1] {
            walk_segment(tprime - self.params[0], q1, kinds[1])
        } else {
            walk_segment(tprime - self.params[0] - self.params[1], q2, kinds[2])
        };

        Ok(State {
            x: q[0] * self.rho + self.qi[0],
            y: q[1] * self.rho + self.qi[1],
            heading: mod2pi(compass_to_math(q[2])),
            speed: self.speed,
            time: t,
        })
    }

    pub fn end_state(&self) -> State {
        self.sample(self.end_time()).expect("end_time is always in range")
    }
}
