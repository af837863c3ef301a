use glam::DVec3;
use rayon::prelude::*;

use crate::edt::euclidean_distance_transform;
use crate::error::GridError;
use crate::interpolation::TrilinearCoefficients;

/// The map a distance field is built from.
#[derive(Debug, Clone, Copy)]
pub enum MapInput<'a> {
    /// Dense occupancy of every node, x fastest, then y, then z.
    Occupancy(&'a [bool]),
    /// Surface points in the map frame. Each point marks its nearest node.
    Points(&'a [[f64; 3]]),
}

/// The result of a distance field query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    /// The interpolated distance to the nearest surface in meters.
    pub distance: f64,
    /// The gradient of the distance with respect to the map frame position.
    pub gradient: DVec3,
}

/// A regular 3d grid of distances to the nearest mapped surface.
///
/// Node `(i, j, k)` sits at `origin + (i, j, k) * resolution`. The eight nodes
/// around a cell define its trilinear polynomial, whose coefficients are
/// computed once when the field is constructed. Queries are answered inside
/// the closed box spanned by the nodes and rejected outside of it.
#[derive(Debug, Clone)]
pub struct DistanceField {
    origin: DVec3,
    resolution: f64,
    inv_resolution: f64,
    dims: [usize; 3],
    distances: Vec<f32>,
    coefficients: Vec<TrilinearCoefficients>,
}

fn validate_geometry(origin: DVec3, resolution: f64, dims: [usize; 3]) -> Result<usize, GridError> {
    if !(resolution > 0.0 && resolution.is_finite()) {
        return Err(GridError::InvalidResolution(resolution));
    }

    if !origin.is_finite() {
        return Err(GridError::InvalidOrigin(origin.to_array()));
    }

    if dims.iter().any(|&n| n < 2) {
        return Err(GridError::InvalidDimensions(dims));
    }

    dims.iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or(GridError::InvalidDimensions(dims))
}

impl DistanceField {
    /// Build a distance field from a map with an exact Euclidean distance transform.
    ///
    /// # Arguments
    ///
    /// * `map` - The occupied nodes, either dense or as surface points.
    /// * `origin` - The map frame position of node `(0, 0, 0)`.
    /// * `resolution` - The spacing between nodes in meters.
    /// * `dims` - The number of nodes along x, y and z.
    ///
    /// # Errors
    ///
    /// Fails on invalid geometry, on an occupancy buffer of the wrong length
    /// and on a map without any occupied node.
    pub fn build(
        map: MapInput<'_>,
        origin: DVec3,
        resolution: f64,
        dims: [usize; 3],
    ) -> Result<Self, GridError> {
        let num_nodes = validate_geometry(origin, resolution, dims)?;

        let occupancy = match map {
            MapInput::Occupancy(occupancy) => {
                if occupancy.len() != num_nodes {
                    return Err(GridError::OccupancyLengthMismatch(
                        num_nodes,
                        occupancy.len(),
                    ));
                }
                occupancy.to_vec()
            }
            MapInput::Points(points) => {
                let mut occupancy = vec![false; num_nodes];
                let mut skipped = 0usize;
                for point in points {
                    let u = (DVec3::from_array(*point) - origin) / resolution;
                    let u = u.round();
                    let inside = u.is_finite()
                        && u.cmpge(DVec3::ZERO).all()
                        && u.x <= (dims[0] - 1) as f64
                        && u.y <= (dims[1] - 1) as f64
                        && u.z <= (dims[2] - 1) as f64;
                    if !inside {
                        skipped += 1;
                        continue;
                    }
                    let idx = u.x as usize + dims[0] * (u.y as usize + dims[1] * u.z as usize);
                    occupancy[idx] = true;
                }
                if skipped > 0 {
                    log::debug!("Skipped {} map points outside of the grid", skipped);
                }
                occupancy
            }
        };

        if !occupancy.iter().any(|&occupied| occupied) {
            return Err(GridError::EmptyMap);
        }

        log::debug!(
            "Computing distance transform of {}x{}x{} nodes",
            dims[0],
            dims[1],
            dims[2]
        );
        let distances = euclidean_distance_transform(&occupancy, dims, resolution);

        Ok(Self::from_validated(origin, resolution, dims, distances))
    }

    /// Wrap precomputed node distances in a field.
    ///
    /// # Arguments
    ///
    /// * `origin` - The map frame position of node `(0, 0, 0)`.
    /// * `resolution` - The spacing between nodes in meters.
    /// * `dims` - The number of nodes along x, y and z.
    /// * `distances` - The distance of every node in meters, x fastest.
    pub fn from_distances(
        origin: DVec3,
        resolution: f64,
        dims: [usize; 3],
        distances: Vec<f32>,
    ) -> Result<Self, GridError> {
        let num_nodes = validate_geometry(origin, resolution, dims)?;

        if distances.len() != num_nodes {
            return Err(GridError::DistanceLengthMismatch(
                num_nodes,
                distances.len(),
            ));
        }

        if let Some(idx) = distances.iter().position(|d| !(d.is_finite() && *d >= 0.0)) {
            return Err(GridError::NonFiniteDistance(idx));
        }

        Ok(Self::from_validated(origin, resolution, dims, distances))
    }

    fn from_validated(
        origin: DVec3,
        resolution: f64,
        dims: [usize; 3],
        distances: Vec<f32>,
    ) -> Self {
        let coefficients = compute_trilinear_interpolation(&distances, dims);
        Self {
            origin,
            resolution,
            inv_resolution: 1.0 / resolution,
            dims,
            distances,
            coefficients,
        }
    }

    /// The map frame position of node `(0, 0, 0)`.
    #[inline]
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// The spacing between nodes in meters.
    #[inline]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// The number of nodes along x, y and z.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// The node distances, x fastest.
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// The number of cells, `(nx - 1)(ny - 1)(nz - 1)`.
    pub fn num_cells(&self) -> usize {
        self.coefficients.len()
    }

    /// The corners of the queryable box.
    pub fn bounds(&self) -> (DVec3, DVec3) {
        let extent = DVec3::new(
            (self.dims[0] - 1) as f64,
            (self.dims[1] - 1) as f64,
            (self.dims[2] - 1) as f64,
        ) * self.resolution;
        (self.origin, self.origin + extent)
    }

    /// Whether a point lies inside the queryable box.
    pub fn contains(&self, point: DVec3) -> bool {
        self.locate(point).is_some()
    }

    /// The stored distance of node `(i, j, k)`.
    pub fn node_distance(&self, i: usize, j: usize, k: usize) -> Option<f32> {
        let [nx, ny, nz] = self.dims;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        self.distances.get(i + nx * (j + ny * k)).copied()
    }

    /// Find the cell of a point and its local coordinates inside the cell.
    #[inline]
    fn locate(&self, point: DVec3) -> Option<(usize, DVec3)> {
        let u = (point - self.origin) * self.inv_resolution;
        let [nx, ny, nz] = self.dims;
        let max = DVec3::new((nx - 1) as f64, (ny - 1) as f64, (nz - 1) as f64);

        // written so that NaN coordinates are rejected
        if !(u.x >= 0.0 && u.y >= 0.0 && u.z >= 0.0 && u.x <= max.x && u.y <= max.y && u.z <= max.z)
        {
            return None;
        }

        // points on the upper faces fall in the last cell
        let cx = (u.x.floor() as usize).min(nx - 2);
        let cy = (u.y.floor() as usize).min(ny - 2);
        let cz = (u.z.floor() as usize).min(nz - 2);

        let local = u - DVec3::new(cx as f64, cy as f64, cz as f64);
        let cell = cx + (nx - 1) * (cy + (ny - 1) * cz);
        Some((cell, local))
    }

    /// Interpolate the distance and its gradient at a map frame point.
    ///
    /// Returns `None` for points outside of the grid.
    #[inline]
    pub fn query(&self, point: DVec3) -> Option<FieldSample> {
        let (cell, local) = self.locate(point)?;
        let (distance, gradient) =
            self.coefficients[cell].value_and_gradient(local.x, local.y, local.z);
        Some(FieldSample {
            distance,
            gradient: DVec3::from_array(gradient) * self.inv_resolution,
        })
    }

    /// Interpolate the distance at a map frame point.
    #[inline]
    pub fn distance(&self, point: DVec3) -> Option<f64> {
        let (cell, local) = self.locate(point)?;
        Some(self.coefficients[cell].value(local.x, local.y, local.z))
    }
}

/// Precompute the trilinear coefficients of every cell of a grid.
///
/// PRECONDITION: every dimension is at least 2 and `distances` holds every node.
fn compute_trilinear_interpolation(
    distances: &[f32],
    dims: [usize; 3],
) -> Vec<TrilinearCoefficients> {
    let [nx, ny, nz] = dims;
    let (cx, cy, cz) = (nx - 1, ny - 1, nz - 1);

    (0..cx * cy * cz)
        .into_par_iter()
        .map(|cell| {
            let i = cell % cx;
            let j = (cell / cx) % cy;
            let k = cell / (cx * cy);
            let node = |di: usize, dj: usize, dk: usize| {
                distances[(i + di) + nx * ((j + dj) + ny * (k + dk))] as f64
            };
            TrilinearCoefficients::from_corners([
                node(0, 0, 0),
                node(1, 0, 0),
                node(0, 1, 0),
                node(1, 1, 0),
                node(0, 0, 1),
                node(1, 0, 1),
                node(0, 1, 1),
                node(1, 1, 1),
            ])
        })
        .collect()
}
