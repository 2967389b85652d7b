//! Static occupancy query `is_blocked(x, y)`, backed by a grid and a bounding-volume
//! hierarchy over blocked cells for the nearest-obstacle-distance query the
//! potential-field planner needs.

use zpatial::implement::bvh_median::Bvh;
use zpatial::interface::i_spatial_accel::ISpatialAccel;
use zpatial::mazth::bound::AxisAlignedBBox;

use crate::error::{PlannerError, PlannerResult};

/// A static occupancy grid in local map coordinates, accelerated with a BVH over
/// blocked-cell bounds for fast nearest-obstacle queries.
#[derive(Clone)]
pub struct Map {
    pub resolution: f64,
    pub origin: (f64, f64),
    pub width: usize,
    pub height: usize,
    blocked: Vec<bool>,
    blocked_cells_bvh: Bvh<usize>,
    blocked_cell_centers: Vec<(f64, f64)>,
}

impl Map {
    /// An empty map: nothing is ever blocked. Used for `setMap`/`refreshMap` with an
    /// empty path, per the external map-file contract.
    pub fn empty() -> Map {
        Map {
            resolution: 1.,
            origin: (0., 0.),
            width: 0,
            height: 0,
            blocked: Vec::new(),
            blocked_cells_bvh: Bvh::init(10),
            blocked_cell_centers: Vec::new(),
        }
    }

    /// Builds a map from an in-memory occupancy grid (`blocked[row * width + col]`).
    /// Parsing `.map`/GeoTIFF files into this representation is the external map-file
    /// parser's responsibility; this constructor is the boundary it targets.
    pub fn from_grid(origin: (f64, f64), resolution: f64, width: usize, height: usize, blocked: Vec<bool>) -> Map {
        assert_eq!(blocked.len(), width * height);

        let mut bvh = Bvh::init(10);
        let mut centers = Vec::new();
        let mut bounds = Vec::new();
        for row in 0..height {
            for col in 0..width {
                if blocked[row * width + col] {
                    let cx = origin.0 + (col as f64 + 0.5) * resolution;
                    let cy = origin.1 + (row as f64 + 0.5) * resolution;
                    let half = resolution / 2.;
                    let idx = centers.len();
                    centers.push((cx, cy));
                    let aabb = AxisAlignedBBox::init(&[cx - half, cy - half, 0.], &[cx + half, cy + half, 0.]);
                    bounds.push((idx, aabb));
                }
            }
        }
        bvh.build_all(&bounds[..]).ok();

        Map { resolution, origin, width, height, blocked, blocked_cells_bvh: bvh, blocked_cell_centers: centers }
    }

    fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let col = ((x - self.origin.0) / self.resolution).floor();
        let row = ((y - self.origin.1) / self.resolution).floor();
        if col < 0. || row < 0. || col as usize >= self.width || row as usize >= self.height {
            return None;
        }
        Some((row as usize, col as usize))
    }

    pub fn is_blocked(&self, x: f64, y: f64) -> bool {
        match self.cell_of(x, y) {
            Some((row, col)) => self.blocked[row * self.width + col],
            None => false,
        }
    }

    /// Euclidean distance from `(x, y)` to the nearest blocked cell centre, searched
    /// within `search_radius` via the BVH; `f64::INFINITY` if none is within range.
    pub fn distance_to_nearest_blocked(&self, x: f64, y: f64, search_radius: f64) -> f64 {
        self.nearest_blocked(x, y, search_radius).map(|(_, _, d)| d).unwrap_or(f64::INFINITY)
    }

    /// Nearest blocked cell centre and its distance from `(x, y)`, within `search_radius`.
    pub fn nearest_blocked(&self, x: f64, y: f64, search_radius: f64) -> Option<(f64, f64, f64)> {
        if self.blocked_cell_centers.is_empty() {
            return None;
        }
        let half = search_radius;
        let query = AxisAlignedBBox::init(&[x - half, y - half, 0.], &[x + half, y + half, 0.]);
        let candidates = self.blocked_cells_bvh.query_intersect(&query).ok()?;
        candidates
            .iter()
            .map(|&idx| {
                let (cx, cy) = self.blocked_cell_centers[idx];
                (cx, cy, ((cx - x).powi(2) + (cy - y).powi(2)).sqrt())
            })
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
    }
}

/// Loads a map from `path`, georeferenced by `(lat, lon)` for GeoTIFF inputs. An empty
/// `path` yields an empty map. Actual file parsing (`.map` ASCII grid vs. GeoTIFF) is an
/// external collaborator; this stub only implements the boundary contract from §6.
pub fn load_map(path: &str, _lat: f64, _lon: f64) -> PlannerResult<Map> {
    if path.is_empty() {
        return Ok(Map::empty());
    }
    Err(PlannerError::MapLoad(format!("no map parser linked in for {}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_blocks_nothing() {
        let m = Map::empty();
        assert!(!m.is_blocked(0., 0.));
        assert_eq!(m.distance_to_nearest_blocked(0., 0., 50.), f64::INFINITY);
    }

    #[test]
    fn grid_reports_blocked_cell() {
        let mut blocked = vec![false; 9];
        blocked[4] = true; // centre cell of a 3x3 grid
        let m = Map::from_grid((0., 0.), 1., 3, 3, blocked);
        assert!(m.is_blocked(1.5, 1.5));
        assert!(!m.is_blocked(0.1, 0.1));
    }

    #[test]
    fn nearest_blocked_distance_is_positive_when_outside() {
        let mut blocked = vec![false; 9];
        blocked[4] = true;
        let m = Map::from_grid((0., 0.), 1., 3, 3, blocked);
        let d = m.distance_to_nearest_blocked(0.1, 0.1, 10.);
        assert!(d > 0. && d.is_finite());
    }

    #[test]
    fn empty_path_loads_empty_map() {
        let m = load_map("", 0., 0.).unwrap();
        assert_eq!(m.width, 0);
    }

    #[test]
    fn nonempty_path_is_not_this_crates_job() {
        assert!(load_map("chart.map", 0., 0.).is_err());
    }
}
