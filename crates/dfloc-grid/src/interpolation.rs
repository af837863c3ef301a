/// Coefficients of the trilinear polynomial of one grid cell.
///
/// For local coordinates `(x, y, z)` in `[0, 1]^3` the interpolated distance is
/// `a0 + a1 x + a2 y + a3 z + a4 xy + a5 xz + a6 yz + a7 xyz`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrilinearCoefficients(pub [f64; 8]);

impl TrilinearCoefficients {
    /// Derive the coefficients from the eight corner values of a cell.
    ///
    /// Corners are ordered with x varying fastest:
    /// `c000, c100, c010, c110, c001, c101, c011, c111`.
    pub fn from_corners(c: [f64; 8]) -> Self {
        let [c000, c100, c010, c110, c001, c101, c011, c111] = c;
        Self([
            c000,
            c100 - c000,
            c010 - c000,
            c001 - c000,
            c110 - c100 - c010 + c000,
            c101 - c100 - c001 + c000,
            c011 - c010 - c001 + c000,
            c111 - c110 - c101 - c011 + c100 + c010 + c001 - c000,
        ])
    }

    /// Evaluate the interpolated value at local coordinates.
    #[inline]
    pub fn value(&self, x: f64, y: f64, z: f64) -> f64 {
        let a = &self.0;
        a[0] + a[1] * x
            + a[2] * y
            + a[3] * z
            + a[4] * x * y
            + a[5] * x * z
            + a[6] * y * z
            + a[7] * x * y * z
    }

    /// Evaluate the value and its partial derivatives with respect to the local coordinates.
    #[inline]
    pub fn value_and_gradient(&self, x: f64, y: f64, z: f64) -> (f64, [f64; 3]) {
        let a = &self.0;
        let gradient = [
            a[1] + a[4] * y + a[5] * z + a[7] * y * z,
            a[2] + a[4] * x + a[6] * z + a[7] * x * z,
            a[3] + a[5] * x + a[6] * y + a[7] * x * y,
        ];
        (self.value(x, y, z), gradient)
    }
}
