//! Output records (§6): a per-frame, per-patch snapshot of the five
//! conserved components in `(k, j, i)` order with physical axis metadata,
//! optionally with the reference state subtracted. Mirrors the teacher's
//! `products.rs` (`Products<P>` / `BlockProducts<P>`) generalized from one
//! hydro primitive type to the fixed five-component conserved state.

use ndarray::{Array1, Array3};
use serde::{Serialize, Deserialize};

use crate::equation_set::NUM_COMPONENTS;
use crate::error::Result;
use crate::grid::Grid;

/// Post-processing-friendly snapshot of one patch's state.
#[derive(Serialize, Deserialize)]
pub struct PatchOutput {
    pub index: usize,
    /// Physical x coordinate of each node along the first horizontal axis.
    pub x_nodes: Array1<f64>,
    /// Physical y coordinate of each node along the second horizontal axis.
    pub y_nodes: Array1<f64>,
    /// Terrain-following node height, `(node_levels, ia, ib)`.
    pub z_node: Array3<f64>,
    /// Conserved components in `(k, j, i)` order, one array per component.
    pub variables: [Array3<f64>; NUM_COMPONENTS],
}

/// A full-domain output frame (§6).
#[derive(Serialize, Deserialize)]
pub struct OutputRecord {
    pub time: f64,
    pub patches: Vec<PatchOutput>,
    pub version: String,
}

impl PatchOutput {
    fn from_grid_patch(grid: &Grid, patch_index: usize, slot_idx: usize, subtract_reference: bool) -> Result<Self> {
        let patch = &grid.patches[patch_index];
        let geometry = patch.geometry()?;

        let x_nodes = Array1::from_vec(patch.axis_a.all_node_points().iter().map(|&r| grid.config.domain.x_of(r)).collect::<Vec<_>>());
        let y_nodes = Array1::from_vec(patch.axis_b.all_node_points().iter().map(|&r| grid.config.domain.y_of(r)).collect::<Vec<_>>());

        let node = &patch.state[slot_idx].node;
        let (_, node_levels, ia, ib) = node.dim();

        let mut variables: [Array3<f64>; NUM_COMPONENTS] = Default::default();
        for c in 0..NUM_COMPONENTS {
            // Reorder from the solver's (component, k, i, j) storage to the
            // (k, j, i) layout the output contract names.
            let mut field = Array3::<f64>::zeros((node_levels, ib, ia));
            for k in 0..node_levels {
                for i in 0..ia {
                    for j in 0..ib {
                        let mut value = node[[c, k, i, j]];
                        if subtract_reference {
                            value -= patch.reference_state.node[[c, k, i, j]];
                        }
                        field[[k, j, i]] = value;
                    }
                }
            }
            variables[c] = field;
        }

        Ok(PatchOutput { index: patch_index, x_nodes, y_nodes, z_node: geometry.z_node.clone(), variables })
    }
}

impl OutputRecord {
    /// BuildOutputRecord (§6): snapshot every patch's `slot`, in physical
    /// `(k, j, i)` layout, at the grid's current time.
    pub fn from_grid(grid: &Grid, slot: &str, subtract_reference: bool, time: f64, version: &str) -> Result<Self> {
        let slot_idx = grid.slot_index(slot)?;
        let patches = (0..grid.patches.len())
            .map(|index| PatchOutput::from_grid_patch(grid, index, slot_idx, subtract_reference))
            .collect::<Result<Vec<_>>>()?;
        Ok(OutputRecord { time, patches, version: version.to_string() })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::PatchBox;
    use crate::grid::{GridConfig, DomainBounds, VerticalStaggering};
    use crate::grid::geometry::VerticalStretch;
    use crate::grid::boundary::LateralBoundary;
    use crate::equation_set::{Dimensionality, VelocityRepresentation, EquationSet};
    use crate::testcases::thermal_bubble::ThermalBubble;
    use crate::constants::PhysicalConstants;

    #[test]
    fn output_record_matches_patch_shape() {
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
        let mut grid = Grid::new(config, 1500.0, 0, vec!["active".into(), "a".into(), "b".into(), "c".into()], boxes).unwrap();
        let test_case = ThermalBubble::default();
        grid.evaluate_topography(&test_case).unwrap();
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D);
        grid.evaluate_test_case(&test_case, &eqs, "active", 0.0).unwrap();

        let record = OutputRecord::from_grid(&grid, "active", false, 0.0, "test").unwrap();
        assert_eq!(record.patches.len(), 1);
        let patch = &record.patches[0];
        let (node_levels, ib, ia) = patch.variables[0].dim();
        assert_eq!(patch.x_nodes.len(), ia);
        assert_eq!(patch.y_nodes.len(), ib);
        assert_eq!(patch.z_node.dim().0, node_levels);
    }
}
