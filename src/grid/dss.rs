//! Direct stiffness summation (§4.4): averaging shared-edge values to
//! enforce continuity of a spectral-element field. Applied over a patch's
//! *full* horizontal node range (interior plus halo); because halo
//! exchange has already copied neighbor data into the halo rings with
//! any necessary sign correction applied, averaging over the full range
//! uniformly handles both interior element edges and patch seams.

use ndarray::Array2;
use crate::column_ops::ColumnMesh;

/**
 * Average shared-edge values of a 2D nodal field in place. Idempotent:
 * applying twice leaves the result unchanged to machine precision, since
 * the first pass already equalizes every averaged pair (§8).
 */
pub fn apply_dss(field: &mut Array2<f64>, axis_a: &ColumnMesh, axis_b: &ColumnMesh) {
    for e in 1..axis_a.n_elements {
        let i_left = axis_a.node_index(e - 1, axis_a.p_v);
        let i_right = axis_a.node_index(e, 0);
        for j in 0..field.ncols() {
            let avg = 0.5 * (field[[i_left, j]] + field[[i_right, j]]);
            field[[i_left, j]] = avg;
            field[[i_right, j]] = avg;
        }
    }
    for e in 1..axis_b.n_elements {
        let j_left = axis_b.node_index(e - 1, axis_b.p_v);
        let j_right = axis_b.node_index(e, 0);
        for i in 0..field.nrows() {
            let avg = 0.5 * (field[[i, j_left]] + field[[i, j_right]]);
            field[[i, j_left]] = avg;
            field[[i, j_right]] = avg;
        }
    }
}

/// Running-sum accumulator used by `§8`'s DSS-conservation test: sum of
/// `J * u` over a patch's interior DOFs.
pub fn jacobian_weighted_sum(field: &Array2<f64>, jacobian: &Array2<f64>, axis_a: &ColumnMesh, axis_b: &ColumnMesh, interior_only: bool) -> f64 {
    let mut total = 0.0;
    for i in 0..field.nrows() {
        for j in 0..field.ncols() {
            if interior_only {
                let interior_a = i >= axis_a.node_index(0, 0) && i < axis_a.node_len();
                let interior_b = j >= axis_b.node_index(0, 0) && j < axis_b.node_len();
                if !(interior_a && interior_b) {
                    continue
                }
            }
            total += jacobian[[i, j]] * field[[i, j]];
        }
    }
    total
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dss_is_idempotent() {
        let axis_a = ColumnMesh::uniform(4, 3).unwrap();
        let axis_b = ColumnMesh::uniform(4, 2).unwrap();
        let mut field = Array2::<f64>::from_shape_fn(
            (axis_a.node_len(), axis_b.node_len()),
            |(i, j)| (i as f64 * 1.7 + j as f64 * 0.3).sin());

        apply_dss(&mut field, &axis_a, &axis_b);
        let once = field.clone();
        apply_dss(&mut field, &axis_a, &axis_b);

        for (a, b) in once.iter().zip(field.iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn dss_equalizes_shared_nodes() {
        let axis_a = ColumnMesh::uniform(4, 3).unwrap();
        let axis_b = ColumnMesh::uniform(4, 1).unwrap();
        let mut field = Array2::<f64>::from_shape_fn(
            (axis_a.node_len(), axis_b.node_len()),
            |(i, j)| (i as f64 * 1.7 + j as f64 * 0.3).sin());

        apply_dss(&mut field, &axis_a, &axis_b);

        for e in 1..axis_a.n_elements {
            let i_left = axis_a.node_index(e - 1, axis_a.p_v);
            let i_right = axis_a.node_index(e, 0);
            for j in 0..field.ncols() {
                assert!((field[[i_left, j]] - field[[i_right, j]]).abs() < 1e-14);
            }
        }
    }
}
