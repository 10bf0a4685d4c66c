//! Boundary conditions (§4.4): no-flow at the rigid lid/ground, and
//! lateral periodic or reflective treatment.

use serde::{Serialize, Deserialize};
use crate::equation_set::VelocityRepresentation;
use crate::grid::geometry::MetricTensor;
use crate::patch::Direction;

/// Lateral boundary treatment on a non-periodic domain edge (§4.4).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum LateralBoundary {
    Periodic,
    Reflective,
}

/**
 * The vertical velocity at the rigid lid/ground that enforces no
 * through-flow: `w = -(g^{xi a} u + g^{xi b} v) / (g^{xi xi} d(xi)Z)`
 * (§4.4). Valid for either velocity representation, since the
 * contravariant metric contraction is the same regardless of whether
 * `u, v` are themselves covariant or contravariant components — the
 * caller is responsible for passing the representation-appropriate
 * metric contraction inputs (§9: runtime enum, not a compile-time
 * specialization).
 */
pub fn no_flow_vertical_velocity(u: f64, v: f64, metric: &MetricTensor) -> f64 {
    let g_contra = metric.g_contra;
    -(g_contra[2][0] * u + g_contra[2][1] * v) / (g_contra[2][2] * metric.jacobian)
}

/**
 * Residual of the no-flow invariant (§8): the dot product of the
 * contravariant velocity with the upward normal at the bottom surface,
 * which must vanish to 1e-12 after `no_flow_vertical_velocity` has been
 * applied.
 */
pub fn no_flow_residual(u: f64, v: f64, w: f64, metric: &MetricTensor) -> f64 {
    let g_contra = metric.g_contra;
    g_contra[2][0] * u + g_contra[2][1] * v + g_contra[2][2] * metric.jacobian * w
}

/**
 * Apply the reflective lateral condition to a ghost-layer velocity pair:
 * flips the sign of the component perpendicular to the boundary side.
 * A no-op under `VelocityRepresentation::Covariant` vs `Contravariant`
 * distinction, since both dual bases flip sign identically under a
 * mirror reflection.
 */
pub fn apply_reflective_ghost(u: &mut f64, v: &mut f64, side: Direction, _velocity_representation: VelocityRepresentation) {
    match side {
        Direction::Left | Direction::Right => *u = -*u,
        Direction::Bottom | Direction::Top => *v = -*v,
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_flow_bc_zeroes_residual() {
        let metric = MetricTensor::from_height_derivatives(0.2, -0.1, 10.0).unwrap();
        let (u, v) = (3.0, -1.5);
        let w = no_flow_vertical_velocity(u, v, &metric);
        assert!(no_flow_residual(u, v, w, &metric).abs() < 1e-12);
    }

    #[test]
    fn reflective_flips_perpendicular_component() {
        let (mut u, mut v) = (1.0, 2.0);
        apply_reflective_ghost(&mut u, &mut v, Direction::Left, VelocityRepresentation::Contravariant);
        assert_eq!(u, -1.0);
        assert_eq!(v, 2.0);
    }
}
