//! Geometric term construction (§3, §4.4): the terrain-following vertical
//! mapping, its derivatives, and the covariant/contravariant metric
//! tensors built from them. Computed once whenever topography or the
//! vertical stretch changes, then read-only during time integration.

use ndarray::{Array2, Array3};
use serde::{Serialize, Deserialize};
use crate::column_ops::ColumnMesh;
use crate::error::{DynCoreError, Result};

/**
 * The vertical-coordinate stretch function F mapping the reference
 * coordinate REta in [0, 1] to a fraction of the terrain-following depth.
 * Only the Gal-Chen-Somerville (linear) form is implemented; per §9 open
 * question (a), the Schar exponential-decay branch present in dead code
 * paths of the original model is not carried over.
 */
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub enum VerticalStretch {
    GalChen,
}

impl VerticalStretch {
    pub fn value(&self, r_eta: f64) -> f64 {
        match self {
            VerticalStretch::GalChen => r_eta,
        }
    }

    pub fn derivative(&self, _r_eta: f64) -> f64 {
        match self {
            VerticalStretch::GalChen => 1.0,
        }
    }
}

/**
 * Full 3D covariant and contravariant metric tensor at one DOF, plus the
 * pointwise Jacobian (§3). `g`/`g_contra` are symmetric 3x3 matrices
 * stored densely for simplicity of composition in the dynamics code;
 * `jacobian` equals `d(xi)Z` on this Cartesian specialization, since the
 * 2D horizontal Jacobian is identically 1.
 */
#[derive(Copy, Clone, Debug)]
pub struct MetricTensor {
    pub g: [[f64; 3]; 3],
    pub g_contra: [[f64; 3]; 3],
    pub jacobian: f64,
}

impl MetricTensor {
    /// Build the metric tensor from the physical-height derivatives
    /// `(d_a z, d_b z, d_xi z)` at one DOF (§3).
    pub fn from_height_derivatives(dz_da: f64, dz_db: f64, dz_dxi: f64) -> Result<Self> {
        if dz_dxi <= 0.0 {
            return Err(DynCoreError::geometry(
                "vertical-coordinate derivative d(xi)Z must be strictly positive"))
        }
        let g = [
            [1.0 + dz_da * dz_da, dz_da * dz_db,       dz_da * dz_dxi],
            [dz_da * dz_db,       1.0 + dz_db * dz_db, dz_db * dz_dxi],
            [dz_da * dz_dxi,      dz_db * dz_dxi,      dz_dxi * dz_dxi],
        ];
        let g_contra = invert_symmetric_3x3(&g)?;
        Ok(Self { g, g_contra, jacobian: dz_dxi })
    }

    /// Maximum elementwise error of `g^{ab} g_{bc} - delta^a_c`, the
    /// invariant checked in §8.
    pub fn identity_residual(&self) -> f64 {
        let mut max_err: f64 = 0.0;
        for a in 0..3 {
            for c in 0..3 {
                let sum: f64 = (0..3).map(|b| self.g_contra[a][b] * self.g[b][c]).sum();
                let expect = if a == c { 1.0 } else { 0.0 };
                max_err = max_err.max((sum - expect).abs());
            }
        }
        max_err
    }
}

fn invert_symmetric_3x3(g: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3]> {
    let (a, b, c) = (g[0][0], g[0][1], g[0][2]);
    let (d, e) = (g[1][1], g[1][2]);
    let f = g[2][2];

    let det = a * (d * f - e * e) - b * (b * f - e * c) + c * (b * e - d * c);
    if det.abs() < 1e-300 || !det.is_finite() {
        return Err(DynCoreError::geometry("metric tensor is singular or non-positive"))
    }
    let inv_det = 1.0 / det;
    let m00 = (d * f - e * e) * inv_det;
    let m01 = (c * e - b * f) * inv_det;
    let m02 = (b * e - c * d) * inv_det;
    let m11 = (a * f - c * c) * inv_det;
    let m12 = (b * c - a * e) * inv_det;
    let m22 = (a * d - b * b) * inv_det;

    Ok([[m00, m01, m02], [m01, m11, m12], [m02, m12, m22]])
}

/**
 * Per-patch geometric cache: topography, its horizontal derivatives, and
 * physical height / metric tensor at both node and interface vertical
 * locations, for every horizontal DOF of the patch (including halo).
 * Owned by the grid patch, recomputed only by `evaluate_topography`
 * followed by `evaluate_geometric_terms`, and read-only thereafter (§3).
 */
pub struct PatchGeometry {
    pub ia: usize,
    pub ib: usize,
    pub topography: Array2<f64>,
    pub dtopo_da: Array2<f64>,
    pub dtopo_db: Array2<f64>,
    pub z_node: Array3<f64>,
    pub z_interface: Array3<f64>,
    pub metric_node: Vec<MetricTensor>,
    pub metric_interface: Vec<MetricTensor>,
}

impl PatchGeometry {
    pub fn metric_at_node(&self, k: usize, i: usize, j: usize) -> &MetricTensor {
        &self.metric_node[(k * self.ia + i) * self.ib + j]
    }

    pub fn metric_at_interface(&self, k: usize, i: usize, j: usize) -> &MetricTensor {
        &self.metric_interface[(k * self.ia + i) * self.ib + j]
    }
}

/**
 * Sample topography at every horizontal node of `axis_a x axis_b` via the
 * test-case callback, then differentiate with the horizontal spectral
 * derivative matrices. Fails with a `ConfigurationError` if the sampled
 * topography meets or exceeds `z_top` anywhere (§4.4).
 */
pub fn evaluate_topography(
    axis_a: &ColumnMesh,
    axis_b: &ColumnMesh,
    x_of: impl Fn(f64) -> f64,
    y_of: impl Fn(f64) -> f64,
    topography_fn: impl Fn(f64, f64) -> f64,
    z_top: f64,
) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>)> {
    use crate::column_ops::build_derivative_element_local;

    let a_pts = axis_a.all_node_points();
    let b_pts = axis_b.all_node_points();
    let (ia, ib) = (a_pts.len(), b_pts.len());

    let mut topo = Array2::<f64>::zeros((ia, ib));
    for (i, &ra) in a_pts.iter().enumerate() {
        for (j, &rb) in b_pts.iter().enumerate() {
            let zs = topography_fn(x_of(ra), y_of(rb));
            if zs >= z_top {
                return Err(DynCoreError::configuration(format!(
                    "topography {} at ({}, {}) meets or exceeds z_top {}", zs, i, j, z_top)))
            }
            topo[[i, j]] = zs;
        }
    }

    let d_a = build_derivative_element_local(axis_a);
    let d_b = build_derivative_element_local(axis_b);

    let mut dtopo_da = Array2::<f64>::zeros((ia, ib));
    for j in 0..ib {
        let col = topo.column(j).to_owned();
        let d = d_a.apply(&col);
        for i in 0..ia {
            dtopo_da[[i, j]] = d[i];
        }
    }

    let mut dtopo_db = Array2::<f64>::zeros((ia, ib));
    for i in 0..ia {
        let row = topo.row(i).to_owned();
        let d = d_b.apply(&row);
        for j in 0..ib {
            dtopo_db[[i, j]] = d[j];
        }
    }

    Ok((topo, dtopo_da, dtopo_db))
}

/**
 * Compute physical height and the full metric tensor at both node and
 * interface vertical positions, for every horizontal DOF, given the
 * topography already evaluated by `evaluate_topography` (§4.4).
 */
pub fn evaluate_geometric_terms(
    column: &ColumnMesh,
    topography: &Array2<f64>,
    dtopo_da: &Array2<f64>,
    dtopo_db: &Array2<f64>,
    z_top: f64,
    stretch: VerticalStretch,
) -> Result<PatchGeometry> {
    let (ia, ib) = topography.dim();
    let node_reta = column.all_node_points();
    let iface_reta = column.all_interface_points();

    let mut z_node = Array3::<f64>::zeros((node_reta.len(), ia, ib));
    let mut z_interface = Array3::<f64>::zeros((iface_reta.len(), ia, ib));
    let mut metric_node = Vec::with_capacity(node_reta.len() * ia * ib);
    let mut metric_interface = Vec::with_capacity(iface_reta.len() * ia * ib);

    for k in 0..node_reta.len() {
        let f = stretch.value(node_reta[k]);
        let df = stretch.derivative(node_reta[k]);
        for i in 0..ia {
            for j in 0..ib {
                let zs = topography[[i, j]];
                let depth = z_top - zs;
                z_node[[k, i, j]] = zs + depth * f;
                let dz_da = dtopo_da[[i, j]] * (1.0 - f);
                let dz_db = dtopo_db[[i, j]] * (1.0 - f);
                let dz_dxi = depth * df;
                metric_node.push(MetricTensor::from_height_derivatives(dz_da, dz_db, dz_dxi)?);
            }
        }
    }

    for k in 0..iface_reta.len() {
        let f = stretch.value(iface_reta[k]);
        let df = stretch.derivative(iface_reta[k]);
        for i in 0..ia {
            for j in 0..ib {
                let zs = topography[[i, j]];
                let depth = z_top - zs;
                z_interface[[k, i, j]] = zs + depth * f;
                let dz_da = dtopo_da[[i, j]] * (1.0 - f);
                let dz_db = dtopo_db[[i, j]] * (1.0 - f);
                let dz_dxi = depth * df;
                metric_interface.push(MetricTensor::from_height_derivatives(dz_da, dz_db, dz_dxi)?);
            }
        }
    }

    Ok(PatchGeometry { ia, ib, topography: topography.clone(), dtopo_da: dtopo_da.clone(), dtopo_db: dtopo_db.clone(), z_node, z_interface, metric_node, metric_interface })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column_ops::ColumnMesh;

    #[test]
    fn flat_topography_gives_identity_metric() {
        let axis_a = ColumnMesh::uniform(3, 2).unwrap();
        let axis_b = ColumnMesh::uniform(3, 2).unwrap();
        let column = ColumnMesh::uniform(4, 3).unwrap();

        let (topo, da, db) = evaluate_topography(
            &axis_a, &axis_b, |r| r, |r| r, |_x, _y| 0.0, 1000.0).unwrap();

        let geom = evaluate_geometric_terms(&column, &topo, &da, &db, 1000.0, VerticalStretch::GalChen).unwrap();

        for m in &geom.metric_node {
            assert!(m.identity_residual() < 1e-13);
            assert!((m.jacobian - 1000.0).abs() < 1e-10);
        }
    }

    #[test]
    fn sloped_topography_rejected_above_z_top() {
        let axis_a = ColumnMesh::uniform(3, 2).unwrap();
        let axis_b = ColumnMesh::uniform(3, 2).unwrap();
        let result = evaluate_topography(&axis_a, &axis_b, |r| r, |r| r, |_x, _y| 2000.0, 1000.0);
        assert!(result.is_err());
    }
}
