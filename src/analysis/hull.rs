use crate::core::domain::CompositionResult;

/// A point must sit more than this far (eV) above a tie-line to count as unstable.
pub const HULL_TOLERANCE: f64 = 1e-6;

/// Anything that can be placed on a composition/energy diagram.
pub trait HullPoint {
    fn composition(&self) -> f64;
    fn energy(&self) -> f64;
}

impl HullPoint for CompositionResult {
    fn composition(&self) -> f64 {
        self.composition
    }

    fn energy(&self) -> f64 {
        self.energy
    }
}

impl HullPoint for (f64, f64) {
    fn composition(&self) -> f64 {
        self.0
    }

    fn energy(&self) -> f64 {
        self.1
    }
}

fn is_finite_point<P: HullPoint>(p: &P) -> bool {
    p.composition().is_finite() && p.energy().is_finite()
}

/// Energies of the tie-lines through every pair of other points that
/// bracket point `i` (`x_j < x_i < x_k`), evaluated at `x_i`.
///
/// Points with equal compositions never bracket each other, and points with
/// non-finite coordinates take no part at all.
fn tie_line_energies<'a, P>(points: &'a [P], i: usize) -> impl Iterator<Item = f64> + 'a
where
    P: HullPoint + 'a,
{
    let x = points[i].composition();
    let n = points.len();
    let usable = is_finite_point(&points[i]);

    (0..n)
        .filter(move |&j| usable && j != i && is_finite_point(&points[j]))
        .flat_map(move |j| {
            (0..n)
                .filter(move |&k| k != i && k != j && is_finite_point(&points[k]))
                .map(move |k| (j, k))
        })
        .filter_map(move |(j, k)| {
            let (x1, y1) = (points[j].composition(), points[j].energy());
            let (x2, y2) = (points[k].composition(), points[k].energy());
            if x1 < x && x < x2 {
                Some(y1 + (y2 - y1) * (x - x1) / (x2 - x1))
            } else {
                None
            }
        })
}

/// Returns true if some pair of other points defines a tie-line lying more
/// than [`HULL_TOLERANCE`] below point `i`.
fn is_dominated<P: HullPoint>(points: &[P], i: usize) -> bool {
    let y = points[i].energy();
    tie_line_energies(points, i).any(|y_hull| y > y_hull + HULL_TOLERANCE)
}

/// Indices (ascending) of the points on the lower convex hull.
///
/// All-triples check, O(n³); composition scans are small. The minimum and
/// maximum compositions can never be bracketed and are always stable.
pub fn stable_indices<P: HullPoint>(points: &[P]) -> Vec<usize> {
    (0..points.len()).filter(|&i| !is_dominated(points, i)).collect()
}

/// Filters `results` down to the thermodynamically stable ones, keeping
/// their input order. Empty input gives empty output.
pub fn analyze_stability<P: HullPoint + Clone>(results: &[P]) -> Vec<P> {
    stable_indices(results)
        .into_iter()
        .map(|i| results[i].clone())
        .collect()
}

/// Height of every point above the lowest tie-line bracketing it (eV),
/// clamped at zero. Unbracketed points give 0.
pub fn energy_above_hull<P: HullPoint>(points: &[P]) -> Vec<f64> {
    (0..points.len())
        .map(|i| {
            let y = points[i].energy();
            tie_line_energies(points, i)
                .fold(None, |acc: Option<f64>, e| Some(acc.map_or(e, |a| a.min(e))))
                .map_or(0.0, |lowest| (y - lowest).max(0.0))
        })
        .collect()
}
