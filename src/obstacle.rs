//! Dynamic obstacle models: binary oriented-rectangle footprints and 2D Gaussian
//! distributions projected through time. Both satisfy `DynamicObstaclesManager`;
//! planners depend only on that surface, never on the concrete variant.

use std::f64::consts::PI;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// A tracked vessel's pose/velocity footprint at the time it was last reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleTrack {
    pub mmsi: u64,
    pub x: f64,
    pub y: f64,
    /// Compass heading, radians clockwise from north (same convention as `State`).
    pub heading: f64,
    pub speed: f64,
    pub width: f64,
    pub length: f64,
    pub time: f64,
}

impl ObstacleTrack {
    /// Math-convention yaw, `pi/2 - heading`, as used by the Gaussian projection.
    pub fn yaw(&self) -> f64 {
        PI / 2. - self.heading
    }

    fn position_at(&self, t: f64) -> (f64, f64) {
        let dt = t - self.time;
        let yaw = self.yaw();
        (self.x + self.speed * dt * yaw.cos(), self.y + self.speed * dt * yaw.sin())
    }
}

/// A large, constant collision penalty assigned inside a binary obstacle's footprint.
pub const BINARY_COLLISION_COST: f64 = 1.0e6;
/// Inflation factor applied to the oriented footprint under `strict` queries.
const STRICT_INFLATION: f64 = 1.5;

/// Binary (occupied/free) dynamic obstacles: each tracked vessel occupies an oriented
/// rectangle that translates at constant velocity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinaryDynamicObstaclesManager {
    pub obstacles: Vec<ObstacleTrack>,
}

impl BinaryDynamicObstaclesManager {
    pub fn new() -> BinaryDynamicObstaclesManager {
        BinaryDynamicObstaclesManager { obstacles: Vec::new() }
    }

    pub fn update(&mut self, track: ObstacleTrack) {
        match self.obstacles.iter_mut().find(|o| o.mmsi == track.mmsi) {
            Some(slot) => *slot = track,
            None => self.obstacles.push(track),
        }
    }

    /// A large positive cost if `(x, y)` lies within the projected oriented rectangle
    /// of any obstacle at time `t`, `strict` inflating the box; `0.0` otherwise.
    pub fn collision_exists(&self, x: f64, y: f64, t: f64, strict: bool) -> f64 {
        for o in &self.obstacles {
            let (cx, cy) = o.position_at(t);
            let yaw = o.yaw();
            // rotate (x,y) into the obstacle's body frame
            let dx = x - cx;
            let dy = y - cy;
            let local_x = dx * yaw.cos() + dy * yaw.sin();
            let local_y = -dx * yaw.sin() + dy * yaw.cos();
            let scale = if strict { STRICT_INFLATION } else { 1. };
            let half_l = o.length / 2. * scale;
            let half_w = o.width / 2. * scale;
            if local_x.abs() <= half_l && local_y.abs() <= half_w {
                return BINARY_COLLISION_COST;
            }
        }
        0.
    }

    /// Obstacle footprints at time `t`, as `(x, y, width, length)`, for planners that
    /// need direction-to-obstacle (e.g. the potential-field repulsion term).
    pub fn footprints_at(&self, t: f64) -> Vec<(f64, f64, f64, f64)> {
        self.obstacles.iter().map(|o| {
            let (x, y) = o.position_at(t);
            (x, y, o.width, o.length)
        }).collect()
    }
}

/// Default covariance used for a Gaussian obstacle when none is supplied, in m^2.
pub fn default_covariance() -> Matrix2<f64> {
    Matrix2::new(30., 10., 10., 30.)
}

/// A 2D Gaussian collision-cost source: a tracked vessel's position uncertainty,
/// projected forward in time along its reported heading at constant speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianObstacle {
    pub mmsi: u64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
    pub time: f64,
    pub covariance: Matrix2<f64>,
    /// Per-obstacle intensity `alpha` scaling the summed cost; not a probability weight.
    pub intensity: f64,
}

impl GaussianObstacle {
    pub fn new(mmsi: u64, x: f64, y: f64, heading: f64, speed: f64, time: f64) -> GaussianObstacle {
        GaussianObstacle { mmsi, x, y, heading, speed, time, covariance: default_covariance(), intensity: 1. }
    }

    fn yaw(&self) -> f64 {
        PI / 2. - self.heading
    }

    /// Translates the mean to time `t`; the covariance is unchanged (callers may grow
    /// it explicitly via a time-stdev factor for the BIT* edge-cost weighting).
    pub fn project(&self, t: f64) -> Vector2<f64> {
        let dt = t - self.time;
        let yaw = self.yaw();
        Vector2::new(self.x + self.speed * dt * yaw.cos(), self.y + self.speed * dt * yaw.sin())
    }

    pub fn pdf_at(&self, point: Vector2<f64>, mean: Vector2<f64>) -> f64 {
        let det = self.covariance.determinant();
        if det <= 0. {
            return 0.;
        }
        let inv = self.covariance.try_inverse().unwrap_or_else(Matrix2::identity);
        let diff = point - mean;
        let exponent = -0.5 * (diff.transpose() * inv * diff)[(0, 0)];
        (1. / (2. * PI * det.sqrt())) * exponent.exp()
    }
}

/// Sums `alpha * pdf(point; projected_obstacle(t))` over all tracked obstacles. A cost,
/// not a probability: no normalisation across obstacles is implied.
#[derive(Debug, Clone, Default)]
pub struct GaussianDynamicObstaclesManager {
    pub obstacles: Vec<GaussianObstacle>,
}

impl GaussianDynamicObstaclesManager {
    pub fn new() -> GaussianDynamicObstaclesManager {
        GaussianDynamicObstaclesManager { obstacles: Vec::new() }
    }

    pub fn update(&mut self, obstacle: GaussianObstacle) {
        match self.obstacles.iter_mut().find(|o| o.mmsi == obstacle.mmsi) {
            Some(slot) => *slot = obstacle,
            None => self.obstacles.push(obstacle),
        }
    }

    pub fn collision_cost(&self, x: f64, y: f64, t: f64, _strict: bool) -> f64 {
        let point = Vector2::new(x, y);
        self.obstacles.iter().map(|o| o.intensity * o.pdf_at(point, o.project(t))).sum()
    }

    pub fn footprints_at(&self, t: f64) -> Vec<(f64, f64, f64, f64)> {
        self.obstacles
            .iter()
            .map(|o| {
                let m = o.project(t);
                (m.x, m.y, o.covariance[(0, 0)].sqrt(), o.covariance[(1, 1)].sqrt())
            })
            .collect()
    }
}

/// Closed set of dynamic-obstacle representations a planner can query. A sum type
/// rather than a trait object, since the set is closed and `collision_cost` sits on
/// the per-edge hot path of the search planners.
#[derive(Debug, Clone)]
pub enum DynObsManager {
    Binary(BinaryDynamicObstaclesManager),
    Gaussian(GaussianDynamicObstaclesManager),
    /// `ignoreDynamicObstacles` configuration: every query costs zero.
    Ignored,
}

impl Default for DynObsManager {
    fn default() -> Self {
        DynObsManager::Ignored
    }
}

impl DynObsManager {
    pub fn collision_cost(&self, x: f64, y: f64, t: f64, strict: bool) -> f64 {
        match self {
            DynObsManager::Binary(b) => b.collision_exists(x, y, t, strict),
            DynObsManager::Gaussian(g) => g.collision_cost(x, y, t, strict),
            DynObsManager::Ignored => 0.,
        }
    }

    pub fn footprints_at(&self, t: f64) -> Vec<(f64, f64, f64, f64)> {
        match self {
            DynObsManager::Binary(b) => b.footprints_at(t),
            DynObsManager::Gaussian(g) => g.footprints_at(t),
            DynObsManager::Ignored => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_cost_peaks_at_projected_mean() {
        let o = GaussianObstacle::new(1, 50., 0., 90.0_f64.to_radians(), 0., 0.);
        let mgr = {
            let mut m = GaussianDynamicObstaclesManager::new();
            m.update(o);
            m
        };
        let near = mgr.collision_cost(50., 0., 0., false);
        let far = mgr.collision_cost(80., 0., 0., false);
        assert!(near > far);
    }

    #[test]
    fn gaussian_projection_moves_peak_along_heading() {
        // heading 90 deg compass = east; speed 2 m/s over 10s moves mean 20m east
        let o = GaussianObstacle::new(1, 50., 0., 90.0_f64.to_radians(), 2., 0.);
        let mgr = {
            let mut m = GaussianDynamicObstaclesManager::new();
            m.update(o);
            m
        };
        let at_70 = mgr.collision_cost(70., 0., 10., false);
        let at_50 = mgr.collision_cost(50., 0., 10., false);
        assert!(at_70 > at_50);
    }

    #[test]
    fn gaussian_pdf_integrates_to_one() {
        let o = GaussianObstacle::new(1, 0., 0., 0., 0., 0.);
        let mean = o.project(0.);
        // crude Monte-Carlo-free Riemann sum over a wide enough grid
        let step = 1.0;
        let bound = 60.0;
        let mut total = 0.;
        let mut y = -bound;
        while y <= bound {
            let mut x = -bound;
            while x <= bound {
                total += o.pdf_at(Vector2::new(x, y), mean) * step * step;
                x += step;
            }
            y += step;
        }
        assert!((total - 1.0).abs() < 0.05, "integral was {}", total);
    }

    #[test]
    fn binary_collision_is_zero_outside_footprint() {
        let mut mgr = BinaryDynamicObstaclesManager::new();
        mgr.update(ObstacleTrack { mmsi: 1, x: 0., y: 0., heading: 0., speed: 0., width: 4., length: 10., time: 0. });
        assert_eq!(mgr.collision_exists(1000., 1000., 0., false), 0.);
        assert_eq!(mgr.collision_exists(0., 0., 0., false), BINARY_COLLISION_COST);
    }
}
