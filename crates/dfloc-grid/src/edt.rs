use rayon::prelude::*;

/// Lower envelope of parabolas for the 1d squared distance transform.
///
/// Holds the scratch buffers so a line can be transformed without allocating.
struct Envelope {
    // sample values of the line being transformed
    values: Vec<f64>,
    // positions of the parabolas forming the envelope
    sites: Vec<usize>,
    // left boundary of each parabola in the envelope
    bounds: Vec<f64>,
}

impl Envelope {
    fn new(len: usize) -> Self {
        Self {
            values: Vec::with_capacity(len),
            sites: Vec::with_capacity(len),
            bounds: Vec::with_capacity(len),
        }
    }

    /// Transform `line` in place: `d(q) = min_p (q - p)^2 + f(p)`.
    ///
    /// Infinite samples never become sites. A line without sites stays infinite.
    fn transform(&mut self, line: &mut [f64]) {
        self.values.clear();
        self.values.extend_from_slice(line);
        self.sites.clear();
        self.bounds.clear();

        for q in 0..self.values.len() {
            let fq = self.values[q];
            if !fq.is_finite() {
                continue;
            }
            let hq = fq + (q * q) as f64;
            while let (Some(&p), Some(&bound)) = (self.sites.last(), self.bounds.last()) {
                let hp = self.values[p] + (p * p) as f64;
                let s = (hq - hp) / (2.0 * (q - p) as f64);
                if s > bound {
                    self.sites.push(q);
                    self.bounds.push(s);
                    break;
                }
                self.sites.pop();
                self.bounds.pop();
            }
            if self.sites.is_empty() {
                self.sites.push(q);
                self.bounds.push(f64::NEG_INFINITY);
            }
        }

        if self.sites.is_empty() {
            line.fill(f64::INFINITY);
            return;
        }

        let mut k = 0;
        for (q, out) in line.iter_mut().enumerate() {
            while k + 1 < self.sites.len() && self.bounds[k + 1] < q as f64 {
                k += 1;
            }
            let p = self.sites[k];
            let dq = q as f64 - p as f64;
            *out = dq * dq + self.values[p];
        }
    }
}

/// Compute the squared Euclidean distance, in node units, from every node to the
/// nearest occupied node.
///
/// Uses the separable lower envelope method: one exact 1d transform per line
/// along x, then y, then z. Lines of one axis are processed in parallel.
/// Nodes of a grid without any occupied node are infinite.
///
/// PRECONDITION: `occupancy.len() == dims[0] * dims[1] * dims[2]`, x fastest.
///
/// # Arguments
///
/// * `occupancy` - Occupancy of every node.
/// * `dims` - The number of nodes along x, y and z.
pub fn squared_distance_transform(occupancy: &[bool], dims: [usize; 3]) -> Vec<f64> {
    let [nx, ny, nz] = dims;
    debug_assert_eq!(occupancy.len(), nx * ny * nz);

    let mut grid = occupancy
        .par_iter()
        .map(|&occupied| if occupied { 0.0 } else { f64::INFINITY })
        .collect::<Vec<_>>();

    if grid.is_empty() {
        return grid;
    }

    // along x, lines are contiguous
    grid.par_chunks_mut(nx)
        .for_each_init(|| Envelope::new(nx), |envelope, line| envelope.transform(line));

    // along y, every z slice holds nx independent lines
    grid.par_chunks_mut(nx * ny).for_each_init(
        || (Envelope::new(ny), vec![0.0; ny]),
        |(envelope, line), slice| {
            for i in 0..nx {
                for (j, v) in line.iter_mut().enumerate() {
                    *v = slice[i + j * nx];
                }
                envelope.transform(line);
                for (j, v) in line.iter().enumerate() {
                    slice[i + j * nx] = *v;
                }
            }
        },
    );

    // along z, lines cross every slice
    let slice_len = nx * ny;
    let columns = (0..slice_len)
        .into_par_iter()
        .map_init(
            || Envelope::new(nz),
            |envelope, start| {
                let mut line = (0..nz)
                    .map(|k| grid[start + k * slice_len])
                    .collect::<Vec<_>>();
                envelope.transform(&mut line);
                line
            },
        )
        .collect::<Vec<_>>();

    for (start, line) in columns.into_iter().enumerate() {
        for (k, v) in line.into_iter().enumerate() {
            grid[start + k * slice_len] = v;
        }
    }

    grid
}

/// Compute the Euclidean distance in meters from every node to the nearest
/// occupied node.
///
/// PRECONDITION: `occupancy.len() == dims[0] * dims[1] * dims[2]`, x fastest.
pub fn euclidean_distance_transform(
    occupancy: &[bool],
    dims: [usize; 3],
    resolution: f64,
) -> Vec<f32> {
    squared_distance_transform(occupancy, dims)
        .into_par_iter()
        .map(|d2| (d2.sqrt() * resolution) as f32)
        .collect()
}
