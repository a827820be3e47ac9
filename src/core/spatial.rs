use nalgebra::{Matrix3, Vector3};

// The rows of `cell` are the lattice vectors, so a fractional coordinate f
// maps to cartesian r = cellᵀ · f.

/// Converts a cartesian position into fractional coordinates of `cell`.
/// Returns `None` if the cell is singular.
pub fn to_fractional(cell: &Matrix3<f64>, p: &Vector3<f64>) -> Option<Vector3<f64>> {
    let inv = cell.transpose().try_inverse()?;
    Some(inv * p)
}

pub fn to_cartesian(cell: &Matrix3<f64>, frac: &Vector3<f64>) -> Vector3<f64> {
    cell.transpose() * frac
}

/// Calculates the squared distance between two points under the
/// Minimum Image Convention. Falls back to the plain Euclidean distance
/// when the cell is singular (e.g. an all-zero placeholder cell).
#[inline]
pub fn distance_sq(p1: &Vector3<f64>, p2: &Vector3<f64>, cell: &Matrix3<f64>) -> f64 {
    let d_cart = p2 - p1;
    match to_fractional(cell, &d_cart) {
        Some(mut d_frac) => {
            // Wrap fractional delta to [-0.5, 0.5]
            d_frac.x -= d_frac.x.round();
            d_frac.y -= d_frac.y.round();
            d_frac.z -= d_frac.z.round();
            to_cartesian(cell, &d_frac).norm_squared()
        }
        None => d_cart.norm_squared(),
    }
}

/// Moves every position into the primary unit cell, fractional range [0, 1).
///
/// **Invariant**: Does NOT reorder atoms. Positions are returned unchanged
/// when the cell is singular.
pub fn wrap_into_cell(cell: &Matrix3<f64>, positions: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    positions
        .iter()
        .map(|p| match to_fractional(cell, p) {
            Some(frac) => {
                // rem_euclid can round up to exactly 1.0 for tiny negatives
                let wrapped = frac.map(|c| {
                    let w = c.rem_euclid(1.0);
                    if w >= 1.0 { 0.0 } else { w }
                });
                to_cartesian(cell, &wrapped)
            }
            None => *p,
        })
        .collect()
}
