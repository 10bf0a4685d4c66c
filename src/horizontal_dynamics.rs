//! Horizontal dynamics (§4.6): explicit tendency from the two-dimensional
//! flux divergence of the five conserved components, plus optional scalar
//! and divergence-damping hyperviscosity. Reads a named state slot, writes
//! a tendency slot; boundary seams are left for `Grid::apply_dss` to
//! resolve, the same contract `Grid::compute_curl_and_div` follows.

use ndarray::{Array2, Axis};
use serde::{Serialize, Deserialize};

use crate::column_ops::{build_derivative_element_local, ColumnOperator};
use crate::equation_set::{EquationSet, NUM_COMPONENTS};
use crate::error::Result;
use crate::grid::{Grid, GridPatch};
use crate::grid::dss::apply_dss as local_dss;

/// Hyperviscosity and metric-scaling knobs for the explicit horizontal
/// operator (§4.6).
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HorizontalDynamicsConfig {
    /// Scalar (Laplacian-type) hyperviscosity coefficient, nu_horiz.
    pub nu_scalar: f64,
    /// Divergence-damping coefficient applied to (u, v).
    pub nu_divergence: f64,
    /// Length scale the hyperviscosity strength is normalized against.
    pub reference_length: f64,
}

impl Default for HorizontalDynamicsConfig {
    fn default() -> Self {
        Self { nu_scalar: 0.0, nu_divergence: 0.0, reference_length: 1.0 }
    }
}

/// HorizontalTendency (§4.6): for every patch and vertical level, compute
/// the 2D Euler flux divergence of the conserved state, add hyperviscosity,
/// and write the result into `tendency_slot`.
pub fn compute_tendency(grid: &mut Grid, eqs: &EquationSet, source_slot: &str, tendency_slot: &str, config: &HorizontalDynamicsConfig) -> Result<()> {
    let source_idx = grid.slot_index(source_slot)?;
    let tendency_idx = grid.slot_index(tendency_slot)?;

    for patch in &mut grid.patches {
        let geometry = patch.geometry()?;
        let d_a = build_derivative_element_local(&patch.axis_a);
        let d_b = build_derivative_element_local(&patch.axis_b);
        let (node_levels, ia, ib) = (patch.column.node_len(), patch.ia(), patch.ib());

        let mut levels = vec![Array2::<f64>::zeros((ia, ib)); NUM_COMPONENTS * node_levels];

        for k in 0..node_levels {
            let rho_u = patch.state[source_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 0).to_owned();
            let rho_v = patch.state[source_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 1).to_owned();
            let rho_theta = patch.state[source_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 2).to_owned();
            let rho_w = patch.state[source_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 3).to_owned();
            let rho = patch.state[source_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 4).to_owned();

            let mut u = Array2::<f64>::zeros((ia, ib));
            let mut v = Array2::<f64>::zeros((ia, ib));
            let mut theta = Array2::<f64>::zeros((ia, ib));
            let mut p = Array2::<f64>::zeros((ia, ib));
            for i in 0..ia {
                for j in 0..ib {
                    let r = rho[[i, j]];
                    u[[i, j]] = rho_u[[i, j]] / r;
                    v[[i, j]] = rho_v[[i, j]] / r;
                    theta[[i, j]] = rho_theta[[i, j]] / r;
                    p[[i, j]] = eqs.pressure(r, theta[[i, j]]);
                }
            }

            let flux_div = |flux_a: &Array2<f64>, flux_b: &Array2<f64>| -> Array2<f64> {
                let mut ja = Array2::<f64>::zeros((ia, ib));
                let mut jb = Array2::<f64>::zeros((ia, ib));
                for i in 0..ia {
                    for j in 0..ib {
                        let jac = geometry.metric_at_node(k, i, j).jacobian;
                        ja[[i, j]] = jac * flux_a[[i, j]];
                        jb[[i, j]] = jac * flux_b[[i, j]];
                    }
                }
                let mut d_ja = Array2::<f64>::zeros((ia, ib));
                for j in 0..ib {
                    let col = ja.column(j).to_owned();
                    let d = d_a.apply(&col);
                    for i in 0..ia { d_ja[[i, j]] = d[i]; }
                }
                let mut d_jb = Array2::<f64>::zeros((ia, ib));
                for i in 0..ia {
                    let row = jb.row(i).to_owned();
                    let d = d_b.apply(&row);
                    for j in 0..ib { d_jb[[i, j]] = d[j]; }
                }
                let mut out = Array2::<f64>::zeros((ia, ib));
                for i in 0..ia {
                    for j in 0..ib {
                        let jac = geometry.metric_at_node(k, i, j).jacobian;
                        out[[i, j]] = -(d_ja[[i, j]] + d_jb[[i, j]]) / jac;
                    }
                }
                out
            };

            let mut flux_rhou_a = Array2::<f64>::zeros((ia, ib));
            let mut flux_rhou_b = Array2::<f64>::zeros((ia, ib));
            let mut flux_rhov_a = Array2::<f64>::zeros((ia, ib));
            let mut flux_rhov_b = Array2::<f64>::zeros((ia, ib));
            let mut flux_theta_a = Array2::<f64>::zeros((ia, ib));
            let mut flux_theta_b = Array2::<f64>::zeros((ia, ib));
            let mut flux_w_a = Array2::<f64>::zeros((ia, ib));
            let mut flux_w_b = Array2::<f64>::zeros((ia, ib));
            for i in 0..ia {
                for j in 0..ib {
                    flux_rhou_a[[i, j]] = rho_u[[i, j]] * u[[i, j]] + p[[i, j]];
                    flux_rhou_b[[i, j]] = rho_u[[i, j]] * v[[i, j]];
                    flux_rhov_a[[i, j]] = rho_v[[i, j]] * u[[i, j]];
                    flux_rhov_b[[i, j]] = rho_v[[i, j]] * v[[i, j]] + p[[i, j]];
                    flux_theta_a[[i, j]] = rho_theta[[i, j]] * u[[i, j]];
                    flux_theta_b[[i, j]] = rho_theta[[i, j]] * v[[i, j]];
                    flux_w_a[[i, j]] = rho_w[[i, j]] * u[[i, j]];
                    flux_w_b[[i, j]] = rho_w[[i, j]] * v[[i, j]];
                }
            }

            levels[0 * node_levels + k] = flux_div(&flux_rhou_a, &flux_rhou_b);
            levels[1 * node_levels + k] = flux_div(&flux_rhov_a, &flux_rhov_b);
            levels[2 * node_levels + k] = flux_div(&flux_theta_a, &flux_theta_b);
            levels[3 * node_levels + k] = flux_div(&flux_w_a, &flux_w_b);
            levels[4 * node_levels + k] = flux_div(&rho_u, &rho_v);
        }

        if config.nu_scalar > 0.0 || config.nu_divergence > 0.0 {
            let scale = patch_hyperviscosity_scale(patch, config.reference_length);
            for k in 0..node_levels {
                if config.nu_scalar > 0.0 {
                    for c in 0..3 {
                        let field = levels[c * node_levels + k].clone();
                        levels[c * node_levels + k] = scalar_hyperviscosity(&d_a, &d_b, patch, &field, config.nu_scalar * scale);
                    }
                }
                if config.nu_divergence > 0.0 {
                    let (grad_div_a, grad_div_b) = divergence_gradient(patch, &d_a, &d_b, &patch.state[source_idx].node, k);
                    levels[0 * node_levels + k] = &levels[0 * node_levels + k] + &(grad_div_a * (config.nu_divergence * scale));
                    levels[1 * node_levels + k] = &levels[1 * node_levels + k] + &(grad_div_b * (config.nu_divergence * scale));
                }
            }
        }

        let mut node = patch.state[tendency_idx].node.to_owned();
        for c in 0..NUM_COMPONENTS {
            for k in 0..node_levels {
                let field = &levels[c * node_levels + k];
                for i in 0..ia {
                    for j in 0..ib {
                        node[[c, k, i, j]] = field[[i, j]];
                    }
                }
            }
        }
        patch.state[tendency_idx].node = node.into_shared();
    }
    Ok(())
}

fn patch_hyperviscosity_scale(patch: &GridPatch, reference_length: f64) -> f64 {
    let da = patch.axis_a.element_width(0);
    let db = patch.axis_b.element_width(0);
    (da * db).powi(2) / reference_length.powi(2)
}

/// Laplacian-type hyperviscosity: apply the element-local derivative twice
/// per direction, with a DSS smoothing pass between applications (§4.6:
/// "the spectral derivative matrix applied twice with DSS in between").
fn scalar_hyperviscosity(d_a: &ColumnOperator, d_b: &ColumnOperator, patch: &GridPatch, field: &Array2<f64>, strength: f64) -> Array2<f64> {
    if strength == 0.0 {
        return field.clone()
    }
    let (ia, ib) = (patch.ia(), patch.ib());

    let mut first_a = Array2::<f64>::zeros((ia, ib));
    for j in 0..ib {
        let col = field.column(j).to_owned();
        let d = d_a.apply(&col);
        for i in 0..ia { first_a[[i, j]] = d[i]; }
    }
    local_dss(&mut first_a, &patch.axis_a, &patch.axis_b);
    let mut second_a = Array2::<f64>::zeros((ia, ib));
    for j in 0..ib {
        let col = first_a.column(j).to_owned();
        let d = d_a.apply(&col);
        for i in 0..ia { second_a[[i, j]] = d[i]; }
    }

    let mut first_b = Array2::<f64>::zeros((ia, ib));
    for i in 0..ia {
        let row = field.row(i).to_owned();
        let d = d_b.apply(&row);
        for j in 0..ib { first_b[[i, j]] = d[j]; }
    }
    local_dss(&mut first_b, &patch.axis_a, &patch.axis_b);
    let mut second_b = Array2::<f64>::zeros((ia, ib));
    for i in 0..ia {
        let row = first_b.row(i).to_owned();
        let d = d_b.apply(&row);
        for j in 0..ib { second_b[[i, j]] = d[j]; }
    }

    let mut out = field.clone();
    for i in 0..ia {
        for j in 0..ib {
            out[[i, j]] -= strength * (second_a[[i, j]] + second_b[[i, j]]);
        }
    }
    out
}

/// Gradient of the horizontal divergence of (u, v), for divergence-damping.
fn divergence_gradient(patch: &GridPatch, d_a: &ColumnOperator, d_b: &ColumnOperator, field: &crate::grid::ArcArray4<f64>, k: usize) -> (Array2<f64>, Array2<f64>) {
    let (ia, ib) = (patch.ia(), patch.ib());
    let rho = field.index_axis(Axis(1), k).index_axis(Axis(0), 4).to_owned();
    let u = field.index_axis(Axis(1), k).index_axis(Axis(0), 0).to_owned() / &rho;
    let v = field.index_axis(Axis(1), k).index_axis(Axis(0), 1).to_owned() / &rho;

    let mut du_da = Array2::<f64>::zeros((ia, ib));
    for j in 0..ib {
        let col = u.column(j).to_owned();
        let d = d_a.apply(&col);
        for i in 0..ia { du_da[[i, j]] = d[i]; }
    }
    let mut dv_db = Array2::<f64>::zeros((ia, ib));
    for i in 0..ia {
        let row = v.row(i).to_owned();
        let d = d_b.apply(&row);
        for j in 0..ib { dv_db[[i, j]] = d[j]; }
    }
    let div = &du_da + &dv_db;

    let mut grad_a = Array2::<f64>::zeros((ia, ib));
    for j in 0..ib {
        let col = div.column(j).to_owned();
        let d = d_a.apply(&col);
        for i in 0..ia { grad_a[[i, j]] = d[i]; }
    }
    let mut grad_b = Array2::<f64>::zeros((ia, ib));
    for i in 0..ia {
        let row = div.row(i).to_owned();
        let d = d_b.apply(&row);
        for j in 0..ib { grad_b[[i, j]] = d[j]; }
    }
    (grad_a, grad_b)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::PatchBox;
    use crate::grid::{GridConfig, DomainBounds, VerticalStaggering};
    use crate::grid::geometry::VerticalStretch;
    use crate::grid::boundary::LateralBoundary;
    use crate::equation_set::{Dimensionality, VelocityRepresentation};
    use crate::testcases::thermal_bubble::ThermalBubble;
    use crate::constants::PhysicalConstants;

    fn small_grid() -> Grid {
        let config = GridConfig {
            domain: DomainBounds { x_min: 0.0, x_max: 1000.0, y_min: -1000.0, y_max: 1000.0, z_min: 0.0, z_max: 1500.0 },
            reference_latitude: None,
            horizontal_order: 3,
            halo_elements: 1,
            vertical_order: 3,
            num_vertical_elements: 4,
            staggering: VerticalStaggering::Levels,
            velocity_representation: VelocityRepresentation::Contravariant,
            lateral_boundary: LateralBoundary::Periodic,
            stretch: VerticalStretch::GalChen,
        };
        let boxes = vec![PatchBox::new(0, 2, 0, 2, 1)];
        let mut grid = Grid::new(config, 1500.0, 0, vec!["active".into(), "tendency".into(), "work1".into(), "work2".into()], boxes).unwrap();
        let test_case = ThermalBubble::default();
        grid.evaluate_topography(&test_case).unwrap();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        grid.evaluate_test_case(&test_case, &eqs, "active", 0.0).unwrap();
        grid
    }

    #[test]
    fn tendency_is_finite_for_resting_state() {
        let mut grid = small_grid();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        let config = HorizontalDynamicsConfig::default();
        compute_tendency(&mut grid, &eqs, "active", "tendency", &config).unwrap();
        let v = grid.interpolate_data(0, 4, 1, 0.5, 0.5, "tendency", false).unwrap();
        assert!(v.is_finite());
    }

    #[test]
    fn hyperviscosity_damps_without_panicking() {
        let mut grid = small_grid();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        let config = HorizontalDynamicsConfig { nu_scalar: 1e-4, nu_divergence: 1e-4, reference_length: 1000.0 };
        compute_tendency(&mut grid, &eqs, "active", "tendency", &config).unwrap();
        let v = grid.interpolate_data(0, 0, 1, 0.5, 0.5, "tendency", false).unwrap();
        assert!(v.is_finite());
    }
}
