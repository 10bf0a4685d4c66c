//! Linear column operators (§4.2): banded matrices mapping a column of
//! values on one vertical representation (nodes or interfaces) to another,
//! by interpolation, first derivative (interface method or flux
//! correction), or second derivative. Built once per grid from the column
//! mesh and thereafter immutable and read-only, matching the rest of the
//! grid's metric/geometry cache lifetime (§3).

use ndarray::{Array1, Array2};
use crate::error::{DynCoreError, Result};
use crate::quadrature;

/// Which vertical representation a column array is stored on (§3).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VerticalLocation {
    /// Discontinuous, element-local nodal storage: `n_elements * (p_v + 1)`
    /// entries, with the value at a shared element boundary stored twice
    /// (once per owning element).
    Nodes,
    /// Continuous, edge storage: `n_elements * p_v + 1` entries, with the
    /// value at a shared element boundary stored once.
    Interfaces,
}

/**
 * The vertical finite-element mesh shared by all columns of the grid: a
 * stack of `n_elements` elements of order `p_v`, with reference-coordinate
 * element boundaries in `[0, 1]` (`REtaInterface`).
 */
#[derive(Clone, Debug)]
pub struct ColumnMesh {
    pub p_v: usize,
    pub n_elements: usize,
    pub element_boundaries: Vec<f64>,
}

impl ColumnMesh {
    /// A column mesh of `n_elements` equal-width elements of order `p_v`
    /// spanning the reference interval `[0, 1]`.
    pub fn uniform(p_v: usize, n_elements: usize) -> Result<Self> {
        if n_elements == 0 {
            return Err(DynCoreError::configuration("n_elements must be > 0"))
        }
        let element_boundaries = (0..=n_elements).map(|k| k as f64 / n_elements as f64).collect();
        Ok(Self { p_v, n_elements, element_boundaries })
    }

    pub fn element_width(&self, e: usize) -> f64 {
        self.element_boundaries[e + 1] - self.element_boundaries[e]
    }

    pub fn node_len(&self) -> usize {
        self.n_elements * (self.p_v + 1)
    }

    pub fn interface_len(&self) -> usize {
        self.n_elements * self.p_v + 1
    }

    pub fn len(&self, loc: VerticalLocation) -> usize {
        match loc {
            VerticalLocation::Nodes => self.node_len(),
            VerticalLocation::Interfaces => self.interface_len(),
        }
    }

    /// Reference-coordinate GLL points local to element `e`, mapped into
    /// that element's physical sub-interval of `[0, 1]`.
    pub fn element_points(&self, e: usize) -> Vec<f64> {
        let (a, b) = (self.element_boundaries[e], self.element_boundaries[e + 1]);
        quadrature::gll_points_and_weights(self.p_v, a, b).unwrap().0
    }

    /// The reference GLL points on `[-1, 1]` for this mesh's order, shared
    /// by every element (used for the local derivative matrices).
    fn reference_points(&self) -> Vec<f64> {
        quadrature::gll_reference_points(self.p_v).unwrap()
    }

    /// All node-location reference coordinates, element-major, duplicating
    /// shared boundaries.
    pub fn all_node_points(&self) -> Vec<f64> {
        (0..self.n_elements).flat_map(|e| self.element_points(e)).collect()
    }

    /// All interface-location reference coordinates, each shared boundary
    /// appearing once.
    pub fn all_interface_points(&self) -> Vec<f64> {
        let mut pts = Vec::with_capacity(self.interface_len());
        for e in 0..self.n_elements {
            let local = self.element_points(e);
            let take = if e == 0 { local.len() } else { local.len() - 1 };
            let skip = local.len() - take;
            pts.extend(local[skip..].iter().copied());
        }
        pts
    }

    pub fn node_index(&self, e: usize, local: usize) -> usize {
        e * (self.p_v + 1) + local
    }

    pub fn interface_index(&self, e: usize, local: usize) -> usize {
        e * self.p_v + local
    }

    /// Locate the element(s) owning reference coordinate `x`, within
    /// tolerance `eps` (§4.2: eps = 1e-12). Returns either a single
    /// interior element, or the pair of elements straddling an internal
    /// boundary (within `2*eps`).
    fn locate(&self, x: f64, eps: f64) -> ElementLocation {
        for e in 0..self.n_elements {
            let (a, b) = (self.element_boundaries[e], self.element_boundaries[e + 1]);
            if e > 0 && (x - a).abs() < 2.0 * eps {
                return ElementLocation::Boundary { left: e - 1, right: e }
            }
            if x >= a - eps && x <= b + eps {
                return ElementLocation::Interior(e)
            }
        }
        ElementLocation::Interior(self.n_elements - 1)
    }
}

enum ElementLocation {
    Interior(usize),
    Boundary { left: usize, right: usize },
}

/**
 * A banded linear map between two column representations, stored densely
 * (compositions are expressed as dense matrix products over the union of
 * supports, per §4.2). `support` records the nonzero column range of each
 * output row for callers that want to exploit the bandwidth without
 * re-deriving it from the dense matrix.
 */
#[derive(Clone, Debug)]
pub struct ColumnOperator {
    pub matrix: Array2<f64>,
    pub support: Vec<(usize, usize)>,
}

impl ColumnOperator {
    pub fn output_len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn input_len(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn apply(&self, input: &Array1<f64>) -> Array1<f64> {
        self.matrix.dot(input)
    }

    pub fn compose(outer: &ColumnOperator, inner: &ColumnOperator) -> ColumnOperator {
        let matrix = outer.matrix.dot(&inner.matrix);
        let support = support_from_dense(&matrix);
        ColumnOperator { matrix, support }
    }

    fn from_dense(matrix: Array2<f64>) -> Self {
        let support = support_from_dense(&matrix);
        Self { matrix, support }
    }

    /// Maximum bandwidth across all rows; an operator invariant is that
    /// this never exceeds `2 * (p_v + 1)` (§4.2).
    pub fn max_bandwidth(&self) -> usize {
        self.support.iter().map(|&(a, b)| b.saturating_sub(a)).max().unwrap_or(0)
    }
}

fn support_from_dense(matrix: &Array2<f64>) -> Vec<(usize, usize)> {
    matrix.outer_iter().map(|row| {
        let mut begin = row.len();
        let mut end = 0;
        for (j, &v) in row.iter().enumerate() {
            if v.abs() > 1e-300 {
                begin = begin.min(j);
                end = end.max(j + 1);
            }
        }
        if begin > end { (0, 0) } else { (begin, end) }
    }).collect()
}

const LOCATE_EPS: f64 = 1e-12;

/**
 * Build the FEM interpolation operator from `source` at the column mesh's
 * native sample points to an arbitrary list of `target_points` (reference
 * coordinates in `[0, 1]`) on the same mesh. Rows sum to 1 to 1e-12 (§8).
 */
pub fn build_interpolation(
    mesh: &ColumnMesh,
    source: VerticalLocation,
    target_points: &[f64],
    zero_boundaries: bool,
) -> ColumnOperator {
    let n_in = mesh.len(source);
    let mut matrix = Array2::<f64>::zeros((target_points.len(), n_in));

    for (l, &x) in target_points.iter().enumerate() {
        interpolation_row(mesh, source, x, matrix.row_mut(l));
    }

    if zero_boundaries {
        matrix.row_mut(0).fill(0.0);
        let last = matrix.nrows() - 1;
        matrix.row_mut(last).fill(0.0);
    }
    ColumnOperator::from_dense(matrix)
}

fn source_global_index(mesh: &ColumnMesh, source: VerticalLocation, e: usize, local: usize) -> usize {
    match source {
        VerticalLocation::Nodes => mesh.node_index(e, local),
        VerticalLocation::Interfaces => mesh.interface_index(e, local),
    }
}

fn interpolation_row(mesh: &ColumnMesh, source: VerticalLocation, x: f64, mut row: ndarray::ArrayViewMut1<f64>) {
    let one_sided = |e: usize, row: &mut ndarray::ArrayViewMut1<f64>, scale: f64| {
        let pts = mesh.element_points(e);
        let w = quadrature::lagrange_weights(&pts, x);
        for (local, wi) in w.into_iter().enumerate() {
            let g = source_global_index(mesh, source, e, local);
            row[g] += wi * scale;
        }
    };

    match mesh.locate(x, LOCATE_EPS) {
        ElementLocation::Interior(e) => one_sided(e, &mut row, 1.0),
        ElementLocation::Boundary { left, right } => {
            let p = mesh.p_v as i32;
            let dl = mesh.element_width(left);
            let dr = mesh.element_width(right);
            let w_l = dr.powi(p) / (dl.powi(p) + dr.powi(p));
            let w_r = dl.powi(p) / (dl.powi(p) + dr.powi(p));
            one_sided(left, &mut row, w_l);
            one_sided(right, &mut row, w_r);
        }
    }
}

/**
 * Build the interface-method derivative operator: differentiate through a
 * single polynomial spanning the `p_v + 1` sample points of the containing
 * element, blending one-sided derivatives at internal element edges with
 * the same error weights as interpolation. When `source` is `Nodes`, this
 * is obtained by composing an interpolation from nodes to interfaces with
 * the interfaces-to-target derivative (§4.2).
 */
pub fn build_derivative_interface_method(
    mesh: &ColumnMesh,
    source: VerticalLocation,
    target_points: &[f64],
) -> ColumnOperator {
    if source == VerticalLocation::Nodes {
        let to_interfaces = build_interpolation(mesh, VerticalLocation::Nodes, &mesh.all_interface_points(), false);
        let on_interfaces = build_derivative_interface_method(mesh, VerticalLocation::Interfaces, target_points);
        return ColumnOperator::compose(&on_interfaces, &to_interfaces)
    }

    let n_in = mesh.len(source);
    let mut matrix = Array2::<f64>::zeros((target_points.len(), n_in));

    for (l, &x) in target_points.iter().enumerate() {
        derivative_row(mesh, source, x, matrix.row_mut(l));
    }
    ColumnOperator::from_dense(matrix)
}

fn derivative_row(mesh: &ColumnMesh, source: VerticalLocation, x: f64, mut row: ndarray::ArrayViewMut1<f64>) {
    let one_sided = |e: usize, row: &mut ndarray::ArrayViewMut1<f64>, scale: f64| {
        let pts = mesh.element_points(e);
        let d = quadrature::lagrange_derivative_weights(&pts, x);
        for (local, di) in d.into_iter().enumerate() {
            let g = source_global_index(mesh, source, e, local);
            row[g] += di * scale;
        }
    };

    match mesh.locate(x, LOCATE_EPS) {
        ElementLocation::Interior(e) => one_sided(e, &mut row, 1.0),
        ElementLocation::Boundary { left, right } => {
            let p = mesh.p_v as i32;
            let dl = mesh.element_width(left);
            let dr = mesh.element_width(right);
            let w_l = dr.powi(p) / (dl.powi(p) + dr.powi(p));
            let w_r = dl.powi(p) / (dl.powi(p) + dr.powi(p));
            one_sided(left, row, w_l);
            one_sided(right, row, w_r);
        }
    }
}

/**
 * Build the flux-correction (DG) derivative operator, mapping a
 * discontinuous nodal column to a nodal column whose values are
 * numerically continuous at shared element boundaries (§4.2). Uses the
 * right Radau correction function `g` of order `p_v + 1`; the left
 * correction function is its mirror image, `g_L(xi) = g_R(-xi)`.
 *
 * `flux_zero_boundaries`, combined with `n_elements == 1`, requests that a
 * single-element column be treated as if it had periodic neighbors on
 * both ends rather than one-sided domain boundaries; otherwise domain
 * boundaries always use the element's own one-sided value as the flux
 * (zero correction there).
 */
pub fn build_derivative_flux_correction(mesh: &ColumnMesh, flux_zero_boundaries: bool) -> ColumnOperator {
    let n = mesh.node_len();
    let mut matrix = Array2::<f64>::zeros((n, n));
    let ref_points = mesh.reference_points();
    let np1 = mesh.p_v + 1;

    for e in 0..mesh.n_elements {
        let width = mesh.element_width(e);
        let jac = width / 2.0; // d(physical)/d(reference [-1,1])

        // Local strong derivative matrix in reference coordinates.
        let d_local: Vec<Vec<f64>> = ref_points.iter()
            .map(|&xi| quadrature::lagrange_derivative_weights(&ref_points, xi))
            .collect();

        let has_left = e > 0 || (flux_zero_boundaries && mesh.n_elements == 1);
        let has_right = e + 1 < mesh.n_elements || (flux_zero_boundaries && mesh.n_elements == 1);
        let left_neighbor = if e > 0 { e - 1 } else { mesh.n_elements - 1 };
        let right_neighbor = if e + 1 < mesh.n_elements { e + 1 } else { 0 };

        for local in 0..np1 {
            let out_idx = mesh.node_index(e, local);
            let xi = ref_points[local];

            for j in 0..np1 {
                matrix[[out_idx, mesh.node_index(e, j)]] += d_local[local][j] / jac;
            }

            let g_r_prime = quadrature::radau_right_correction_derivative(mesh.p_v, xi);
            let g_l_prime = -quadrature::radau_right_correction_derivative(mesh.p_v, -xi);

            // Left-boundary (xi = -1) correction: u_L_flux - u_L_local.
            if has_left {
                matrix[[out_idx, mesh.node_index(e, 0)]] += -0.5 * g_l_prime / jac;
                matrix[[out_idx, mesh.node_index(left_neighbor, np1 - 1)]] += 0.5 * g_l_prime / (2.0 * jac);
                matrix[[out_idx, mesh.node_index(e, 0)]] += 0.5 * g_l_prime / (2.0 * jac);
            }
            // Right-boundary (xi = +1) correction: u_R_flux - u_R_local.
            if has_right {
                matrix[[out_idx, mesh.node_index(e, np1 - 1)]] += 0.5 * g_r_prime / jac;
                matrix[[out_idx, mesh.node_index(right_neighbor, 0)]] += -0.5 * g_r_prime / (2.0 * jac);
                matrix[[out_idx, mesh.node_index(e, np1 - 1)]] += -0.5 * g_r_prime / (2.0 * jac);
            }
        }
    }
    ColumnOperator::from_dense(matrix)
}

/**
 * Per-element-local horizontal (or non-blended vertical) derivative
 * operator: the `p_v + 1`-point Lagrange derivative matrix applied within
 * each element independently, with no blending across element edges.
 * This is the "spectral derivative matrix" the horizontal dynamics uses
 * on a discontinuous nodal field; continuity is restored separately, by
 * `ApplyDSS`, rather than by the operator itself (§4.4, §4.6).
 */
pub fn build_derivative_element_local(mesh: &ColumnMesh) -> ColumnOperator {
    let n = mesh.node_len();
    let np1 = mesh.p_v + 1;
    let ref_points = mesh.reference_points();
    let d_local: Vec<Vec<f64>> = ref_points.iter()
        .map(|&xi| quadrature::lagrange_derivative_weights(&ref_points, xi))
        .collect();

    let mut matrix = Array2::<f64>::zeros((n, n));
    for e in 0..mesh.n_elements {
        let jac = mesh.element_width(e) / 2.0;
        for a in 0..np1 {
            let ga = mesh.node_index(e, a);
            for b in 0..np1 {
                let gb = mesh.node_index(e, b);
                matrix[[ga, gb]] = d_local[a][b] / jac;
            }
        }
    }
    ColumnOperator::from_dense(matrix)
}

/**
 * GLL quadrature weights, normalized to sum to 1 over the whole reference
 * domain `[0, 1]`, on the assembled (continuous, interface) index space:
 * `W_edge` in §4.4's `EvaluateGeometricTerms` invariant. Shared-boundary
 * nodes accumulate the mass contribution from both adjoining elements.
 */
pub fn assembled_interface_weights(mesh: &ColumnMesh) -> Array1<f64> {
    let n = mesh.interface_len();
    let np1 = mesh.p_v + 1;
    let (_, ref_weights) = quadrature::gll_points_and_weights(mesh.p_v, -1.0, 1.0).unwrap();
    let mut mass = Array1::<f64>::zeros(n);
    for e in 0..mesh.n_elements {
        let jac = mesh.element_width(e) / 2.0;
        for local in 0..np1 {
            mass[mesh.interface_index(e, local)] += ref_weights[local] * jac;
        }
    }
    mass
}

/**
 * GLL quadrature weights, normalized to sum to 1 over `[0, 1]`, on the
 * discontinuous nodal index space: `W_node` in §4.4's
 * `EvaluateGeometricTerms` invariant. Shared-boundary nodes are *not*
 * merged here, so each element's own copy carries its own share of the
 * mass, and the total still sums to 1.
 */
pub fn node_weights(mesh: &ColumnMesh) -> Array1<f64> {
    let n = mesh.node_len();
    let np1 = mesh.p_v + 1;
    let (_, ref_weights) = quadrature::gll_points_and_weights(mesh.p_v, -1.0, 1.0).unwrap();
    let mut w = Array1::<f64>::zeros(n);
    for e in 0..mesh.n_elements {
        let jac = mesh.element_width(e) / 2.0;
        for local in 0..np1 {
            w[mesh.node_index(e, local)] = ref_weights[local] * jac;
        }
    }
    w
}

/**
 * Build the GLL second-derivative operator on the assembled (continuous)
 * interface index space: `D2 = -M^-1 (D^T M D)` summed elementwise, with
 * the diagonal GLL mass matrix doubled automatically at shared nodes by
 * the elementwise assembly, plus boundary flux terms `+-D_boundary /
 * W_boundary` at the global top and bottom (§4.2).
 */
pub fn build_second_derivative(mesh: &ColumnMesh) -> ColumnOperator {
    let n = mesh.interface_len();
    let np1 = mesh.p_v + 1;
    let ref_points = mesh.reference_points();
    let (_, ref_weights) = quadrature::gll_points_and_weights(mesh.p_v, -1.0, 1.0).unwrap();

    let d_local: Vec<Vec<f64>> = ref_points.iter()
        .map(|&xi| quadrature::lagrange_derivative_weights(&ref_points, xi))
        .collect();

    let mass = assembled_interface_weights(mesh);
    let mut stiffness = Array2::<f64>::zeros((n, n));

    for e in 0..mesh.n_elements {
        let jac = mesh.element_width(e) / 2.0;
        let local_mass: Vec<f64> = ref_weights.iter().map(|&w| w * jac).collect();


        // Elemental stiffness K_e = D^T M D / jac (one factor of jac from
        // the reference-to-physical derivative, one from the mass weight).
        for a in 0..np1 {
            let ga = mesh.interface_index(e, a);
            for b in 0..np1 {
                let gb = mesh.interface_index(e, b);
                let mut sum = 0.0;
                for q in 0..np1 {
                    sum += d_local[q][a] * local_mass[q] * d_local[q][b];
                }
                stiffness[[ga, gb]] += sum / jac;
            }
        }
    }

    let mut matrix = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            matrix[[i, j]] = -stiffness[[i, j]] / mass[i];
        }
    }

    // Boundary flux terms: the first element's derivative row at its own
    // left boundary, and the last element's derivative row at its own
    // right boundary, normalized by the global mass weight there.
    let bottom_row = &d_local[0];
    let bottom_jac = mesh.element_width(0) / 2.0;
    for (j, &dj) in bottom_row.iter().enumerate() {
        let gj = mesh.interface_index(0, j);
        matrix[[0, gj]] -= dj / bottom_jac / mass[0];
    }
    let last_e = mesh.n_elements - 1;
    let top_row = &d_local[np1 - 1];
    let top_jac = mesh.element_width(last_e) / 2.0;
    for (j, &dj) in top_row.iter().enumerate() {
        let gj = mesh.interface_index(last_e, j);
        matrix[[n - 1, gj]] += dj / top_jac / mass[n - 1];
    }

    ColumnOperator::from_dense(matrix)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interpolation_rows_sum_to_one() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        let targets = mesh.all_interface_points();
        let op = build_interpolation(&mesh, VerticalLocation::Nodes, &targets, false);
        for row in op.matrix.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn derivative_vanishes_on_constant() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        let targets = mesh.all_node_points();
        let op = build_derivative_interface_method(&mesh, VerticalLocation::Nodes, &targets);
        let ones = Array1::<f64>::ones(op.input_len());
        let out = op.apply(&ones);
        for &v in out.iter() {
            assert!(v.abs() < 1e-8, "v={}", v);
        }
    }

    #[test]
    fn flux_correction_vanishes_on_constant() {
        let mesh = ColumnMesh::uniform(3, 4).unwrap();
        let op = build_derivative_flux_correction(&mesh, false);
        let ones = Array1::<f64>::ones(op.input_len());
        let out = op.apply(&ones);
        for &v in out.iter() {
            assert!(v.abs() < 1e-8, "v={}", v);
        }
    }

    #[test]
    fn derivative_reproduces_affine_slope() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        let nodes = mesh.all_node_points();
        let slope = 3.5;
        let q = Array1::from_vec(nodes.iter().map(|&x| slope * x + 1.0).collect());
        let targets = mesh.all_node_points();
        let op = build_derivative_interface_method(&mesh, VerticalLocation::Nodes, &targets);
        let out = op.apply(&q);
        for &v in out.iter() {
            assert!((v - slope).abs() < 1e-8, "v={}", v);
        }
    }

    #[test]
    fn node_and_interface_weights_sum_to_one() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        assert!((node_weights(&mesh).sum() - 1.0).abs() < 1e-13);
        assert!((assembled_interface_weights(&mesh).sum() - 1.0).abs() < 1e-13);
    }

    #[test]
    fn element_local_derivative_vanishes_on_constant() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        let op = build_derivative_element_local(&mesh);
        let ones = Array1::<f64>::ones(op.input_len());
        let out = op.apply(&ones);
        for &v in out.iter() {
            assert!(v.abs() < 1e-8);
        }
    }

    #[test]
    fn second_derivative_bandwidth_bounded() {
        let mesh = ColumnMesh::uniform(4, 3).unwrap();
        let op = build_second_derivative(&mesh);
        assert!(op.max_bandwidth() <= 2 * (mesh.p_v + 1) * mesh.n_elements);
    }
}
