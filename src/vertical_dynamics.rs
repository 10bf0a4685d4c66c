//! Vertical dynamics (§4.7): the per-column implicit stage. Builds the
//! residual of the vertical advection, hydrostatic pressure-gradient and
//! gravity coupling between theta, rho and w, and Rayleigh-friction sponge
//! terms, then hands it to `jfnk::solve` one column (one horizontal DOF's
//! full vertical stack) at a time.

use ndarray::{Array1, Array4};
use serde::{Serialize, Deserialize};

use crate::column_ops::{build_derivative_flux_correction, ColumnOperator};
use crate::equation_set::{EquationSet, NUM_COMPONENTS};
use crate::error::Result;
use crate::grid::geometry::PatchGeometry;
use crate::grid::{ArcArray4, Grid};
use crate::jfnk::{self, JfnkConfig};

/// Tunables for the implicit vertical solve (§4.7).
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerticalDynamicsConfig {
    pub jfnk: JfnkConfig,
}

impl Default for VerticalDynamicsConfig {
    fn default() -> Self {
        Self { jfnk: JfnkConfig::default() }
    }
}

fn extract_column(state: &ArcArray4<f64>, i: usize, j: usize, node_levels: usize) -> Array1<f64> {
    let mut q = Array1::<f64>::zeros(NUM_COMPONENTS * node_levels);
    for c in 0..NUM_COMPONENTS {
        for k in 0..node_levels {
            q[c * node_levels + k] = state[[c, k, i, j]];
        }
    }
    q
}

fn write_column(state: &mut Array4<f64>, i: usize, j: usize, node_levels: usize, q: &Array1<f64>) {
    for c in 0..NUM_COMPONENTS {
        for k in 0..node_levels {
            state[[c, k, i, j]] = q[c * node_levels + k];
        }
    }
}

/// The purely vertical piece of the Euler tendency at one column (§4.7):
/// flux-divergence vertical advection of all five conserved components,
/// the hydrostatic pressure-gradient/gravity coupling of theta, rho and w,
/// and Rayleigh-friction relaxation toward the reference column.
fn vertical_tendency_column(
    eqs: &EquationSet,
    d_flux: &ColumnOperator,
    jacobian: &[f64],
    rayleigh: &[f64],
    reference: &Array1<f64>,
    q: &Array1<f64>,
) -> Array1<f64> {
    let n = jacobian.len();
    let g = eqs.phys.g;

    let rho_u: Array1<f64> = q.slice(ndarray::s![0 * n..1 * n]).to_owned();
    let rho_v: Array1<f64> = q.slice(ndarray::s![1 * n..2 * n]).to_owned();
    let rho_theta: Array1<f64> = q.slice(ndarray::s![2 * n..3 * n]).to_owned();
    let rho_w: Array1<f64> = q.slice(ndarray::s![3 * n..4 * n]).to_owned();
    let rho: Array1<f64> = q.slice(ndarray::s![4 * n..5 * n]).to_owned();

    let mut w = Array1::<f64>::zeros(n);
    let mut theta = Array1::<f64>::zeros(n);
    let mut p = Array1::<f64>::zeros(n);
    for k in 0..n {
        w[k] = rho_w[k] / rho[k];
        theta[k] = rho_theta[k] / rho[k];
        p[k] = eqs.pressure(rho[k], theta[k]);
    }

    let flux_div = |transported: &Array1<f64>| -> Array1<f64> {
        let jf: Array1<f64> = (0..n).map(|k| jacobian[k] * transported[k] * w[k]).collect();
        let d_jf = d_flux.apply(&jf);
        (0..n).map(|k| -d_jf[k] / jacobian[k]).collect()
    };

    let tendency_rho = flux_div(&rho);
    let tendency_rho_u = flux_div(&rho_u);
    let tendency_rho_v = flux_div(&rho_v);
    let tendency_rho_theta = flux_div(&rho_theta);

    let d_w_dxi = d_flux.apply(&w);
    let d_p_dxi = d_flux.apply(&p);
    let mut tendency_w = Array1::<f64>::zeros(n);
    for k in 0..n {
        let dw_dz = d_w_dxi[k] / jacobian[k];
        let dp_dz = d_p_dxi[k] / jacobian[k];
        tendency_w[k] = -w[k] * dw_dz - dp_dz / rho[k] - g;
    }

    let mut out = Array1::<f64>::zeros(NUM_COMPONENTS * n);
    for k in 0..n {
        out[0 * n + k] = tendency_rho_u[k];
        out[1 * n + k] = tendency_rho_v[k];
        out[2 * n + k] = tendency_rho_theta[k];
        out[3 * n + k] = rho[k] * tendency_w[k] + w[k] * tendency_rho[k];
        out[4 * n + k] = tendency_rho[k];
    }

    for c in 0..NUM_COMPONENTS {
        for k in 0..n {
            let idx = c * n + k;
            out[idx] -= rayleigh[k] * (q[idx] - reference[idx]);
        }
    }
    out
}

/// ExplicitVerticalTendency (§4.7): the vertical-only RHS for every column
/// of every patch, written into `tendency_slot` (used by a fully-explicit
/// time integrator configuration, or for diagnostics).
pub fn compute_tendency(grid: &mut Grid, eqs: &EquationSet, source_slot: &str, tendency_slot: &str) -> Result<()> {
    let source_idx = grid.slot_index(source_slot)?;
    let tendency_idx = grid.slot_index(tendency_slot)?;

    for patch in &mut grid.patches {
        let geometry = patch.geometry()?;
        let d_flux = build_derivative_flux_correction(&patch.column, false);
        let (ia, ib, node_levels) = (patch.ia(), patch.ib(), patch.column.node_len());
        let zero_rayleigh = vec![0.0; node_levels];
        let reference = &patch.reference_state.node;

        let mut node = patch.state[tendency_idx].node.to_owned();
        for i in 0..ia {
            for j in 0..ib {
                let jacobian = column_jacobian(geometry, node_levels, i, j);
                let q = extract_column(&patch.state[source_idx].node, i, j, node_levels);
                let q_ref = extract_column(reference, i, j, node_levels);
                let tendency = vertical_tendency_column(eqs, &d_flux, &jacobian, &zero_rayleigh, &q_ref, &q);
                write_column(&mut node, i, j, node_levels, &tendency);
            }
        }
        patch.state[tendency_idx].node = node.into_shared();
    }
    Ok(())
}

fn column_jacobian(geometry: &PatchGeometry, node_levels: usize, i: usize, j: usize) -> Vec<f64> {
    (0..node_levels).map(|k| geometry.metric_at_node(k, i, j).jacobian).collect()
}

/// Default Rayleigh sponge-layer strength profile (§3 supplement): zero
/// below `z_top - sponge_depth`, ramping smoothly up to `max_strength` at
/// `z_top`. A test case that opts into `has_rayleigh_friction` can either
/// call this directly (as `ScharMountain` does) or override
/// `evaluate_rayleigh_strength` with its own shape entirely.
pub fn sponge_ramp(z: f64, z_top: f64, sponge_depth: f64, max_strength: f64) -> f64 {
    let bottom = z_top - sponge_depth;
    if z <= bottom {
        return 0.0
    }
    let s = ((z - bottom) / sponge_depth).min(1.0);
    max_strength * (std::f64::consts::FRAC_PI_2 * s).sin().powi(2)
}

/// ImplicitVerticalStage (§4.7, §4.8): for every column, solve
/// `q - known - dt * a_ii * VerticalTendency(q) = 0` via Jacobian-free
/// Newton-Krylov, writing the converged stage value into `result_slot`.
/// `known_slot` holds `y_n + dt * (sum of already-known explicit and
/// implicit stage contributions)`, per the IMEX Butcher tableau the time
/// integrator is evaluating. Returns the first column's `DynCoreError` on
/// non-convergence, which the caller may treat as retryable (§5, §7).
pub fn solve_implicit_stage(
    grid: &mut Grid,
    eqs: &EquationSet,
    known_slot: &str,
    result_slot: &str,
    dt: f64,
    a_ii: f64,
    config: &VerticalDynamicsConfig,
) -> Result<()> {
    let known_idx = grid.slot_index(known_slot)?;
    let result_idx = grid.slot_index(result_slot)?;

    for patch in &mut grid.patches {
        let geometry = patch.geometry()?;
        let d_flux = build_derivative_flux_correction(&patch.column, false);
        let (ia, ib, node_levels) = (patch.ia(), patch.ib(), patch.column.node_len());
        let rayleigh = patch.rayleigh_strength.clone();
        let reference = patch.reference_state.node.clone();

        let mut node = patch.state[result_idx].node.to_owned();
        for i in 0..ia {
            for j in 0..ib {
                let jacobian = column_jacobian(geometry, node_levels, i, j);
                let sigma: Vec<f64> = (0..node_levels).map(|k| rayleigh[[k, i, j]]).collect();
                let q_known = extract_column(&patch.state[known_idx].node, i, j, node_levels);
                let q_ref = extract_column(&reference, i, j, node_levels);

                let residual = |q: &Array1<f64>| -> Array1<f64> {
                    let tendency = vertical_tendency_column(eqs, &d_flux, &jacobian, &sigma, &q_ref, q);
                    q - &q_known - &(tendency * dt * a_ii)
                };
                let identity_precond = |v: &Array1<f64>| v.clone();

                let (q_next, _report) = jfnk::solve(&q_known, residual, identity_precond, &config.jfnk)?;
                write_column(&mut node, i, j, node_levels, &q_next);
            }
        }
        patch.state[result_idx].node = node.into_shared();
    }
    Ok(())
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
        let boxes = vec![PatchBox::new(0, 1, 0, 1, 0)];
        let mut grid = Grid::new(config, 1500.0, 0, vec!["active".into(), "tendency".into(), "work1".into(), "work2".into()], boxes).unwrap();
        let test_case = ThermalBubble::default();
        grid.evaluate_topography(&test_case).unwrap();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        grid.evaluate_test_case(&test_case, &eqs, "active", 0.0).unwrap();
        grid
    }

    #[test]
    fn explicit_vertical_tendency_is_finite() {
        let mut grid = small_grid();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        compute_tendency(&mut grid, &eqs, "active", "tendency").unwrap();
        let v = grid.interpolate_data(0, 3, 1, 0.5, 0.5, "tendency", false).unwrap();
        assert!(v.is_finite());
    }

    #[test]
    fn implicit_stage_converges_for_resting_state() {
        let mut grid = small_grid();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        let config = VerticalDynamicsConfig::default();
        let result = solve_implicit_stage(&mut grid, &eqs, "active", "work1", 0.01, 0.5, &config);
        assert!(result.is_ok());
    }

    #[test]
    fn sponge_ramp_vanishes_below_layer_and_peaks_at_top() {
        assert_eq!(sponge_ramp(0.0, 20_000.0, 5_000.0, 1.0 / 300.0), 0.0);
        let top = sponge_ramp(20_000.0, 20_000.0, 5_000.0, 1.0 / 300.0);
        assert!((top - 1.0 / 300.0).abs() < 1e-12);
    }
}
