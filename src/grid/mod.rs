//! Grid & grid-patch (§4.4): owns all per-DOF arrays, metric tensors, and
//! the DSS/boundary-condition machinery. The grid owns its patches by
//! index in a flat arena (§9 design note): a patch never holds a back-
//! reference to its owning grid, so there is no ownership cycle —
//! operations that need cross-patch context take `&Grid`/`&mut Grid`
//! explicitly alongside a `PatchIndex`.

pub mod geometry;
pub mod dss;
pub mod boundary;

use ndarray::{Array3, Array4, ArcArray, Axis, Ix4};
use serde::{Serialize, Deserialize};

use crate::column_ops::ColumnMesh;
use crate::patch::{PatchBox, PatchIndex, Direction};
use crate::equation_set::{NUM_COMPONENTS, VelocityRepresentation, EquationSet};
use crate::error::{DynCoreError, Result};
use crate::testcase::TestCase;
use self::geometry::{PatchGeometry, VerticalStretch, evaluate_topography, evaluate_geometric_terms};
use self::boundary::{LateralBoundary, no_flow_vertical_velocity, apply_reflective_ghost};

pub type ArcArray4<T> = ArcArray<T, Ix4>;

/// How velocity and scalar variables are staggered vertically (§3).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum VerticalStaggering {
    Levels,
    Interfaces,
    CharneyPhillips,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl DomainBounds {
    pub fn x_of(&self, reference_a: f64) -> f64 {
        self.x_min + (self.x_max - self.x_min) * reference_a
    }

    pub fn y_of(&self, reference_b: f64) -> f64 {
        self.y_min + (self.y_max - self.y_min) * reference_b
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub domain: DomainBounds,
    pub reference_latitude: Option<f64>,
    pub horizontal_order: usize,
    pub halo_elements: usize,
    pub vertical_order: usize,
    pub num_vertical_elements: usize,
    pub staggering: VerticalStaggering,
    pub velocity_representation: VelocityRepresentation,
    pub lateral_boundary: LateralBoundary,
    pub stretch: VerticalStretch,
}

impl GridConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.domain.x_max <= self.domain.x_min
            || self.domain.y_max <= self.domain.y_min
            || self.domain.z_max <= self.domain.z_min {
            anyhow::bail!("domain bounds must satisfy min < max on every axis")
        }
        if !(2..=crate::quadrature::MAX_ORDER).contains(&self.horizontal_order) {
            anyhow::bail!("horizontal_order must be in 2..={}", crate::quadrature::MAX_ORDER)
        }
        if self.vertical_order != 1 && !(2..=crate::quadrature::MAX_ORDER).contains(&self.vertical_order) {
            anyhow::bail!("vertical_order must be 1 or in 2..={}", crate::quadrature::MAX_ORDER)
        }
        if self.num_vertical_elements == 0 {
            anyhow::bail!("num_vertical_elements must be > 0")
        }
        Ok(())
    }
}

/**
 * A named snapshot of the prognostic state: a node-resident field
 * (component x level x ia x ib), an edge-resident field (component x
 * interface x ia x ib), and per-instance tracer arrays. `ArcArray`
 * (cheap, copy-on-write clone) is used throughout, the way the teacher's
 * block state shares `ArcArray` fields across async RK stage tasks (§5's
 * message-passing model dispatches per-patch work onto `tokio` tasks,
 * which need an owned, cheaply-cloneable handle to the data they
 * operate on).
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct StateSlot {
    pub node: ArcArray4<f64>,
    pub edge: ArcArray4<f64>,
    pub tracers: ArcArray4<f64>,
}

impl StateSlot {
    pub fn zeros(ia: usize, ib: usize, node_levels: usize, edge_levels: usize, num_tracers: usize) -> Self {
        Self {
            node: ArcArray4::zeros((NUM_COMPONENTS, node_levels, ia, ib)),
            edge: ArcArray4::zeros((NUM_COMPONENTS, edge_levels, ia, ib)),
            tracers: ArcArray4::zeros((num_tracers.max(1), node_levels, ia, ib)),
        }
    }
}

/**
 * One patch's complete per-DOF data: its index space, the horizontal and
 * vertical meshes sized to include its halo, geometric cache, and state.
 */
pub struct GridPatch {
    pub index: PatchIndex,
    pub patch_box: PatchBox,
    pub axis_a: ColumnMesh,
    pub axis_b: ColumnMesh,
    pub column: ColumnMesh,
    pub geometry: Option<PatchGeometry>,
    pub state: Vec<StateSlot>,
    pub reference_state: StateSlot,
    pub rayleigh_strength: Array3<f64>,
}

impl GridPatch {
    pub fn ia(&self) -> usize {
        self.axis_a.node_len()
    }

    pub fn ib(&self) -> usize {
        self.axis_b.node_len()
    }

    pub fn geometry(&self) -> Result<&PatchGeometry> {
        self.geometry.as_ref().ok_or_else(|| DynCoreError::geometry("geometry not yet evaluated for this patch"))
    }
}

/// The grid: an arena of patches plus the configuration and named state
/// slot list shared by all of them.
pub struct Grid {
    pub config: GridConfig,
    pub z_top: f64,
    pub num_tracers: usize,
    pub slot_names: Vec<String>,
    pub patches: Vec<GridPatch>,
}

impl Grid {
    /// InitializeData (§4.4): allocate coordinate, state, reference-state,
    /// and tendency arrays sized to each patch, once mesh topology (patch
    /// boxes) is fixed.
    pub fn new(
        config: GridConfig,
        z_top: f64,
        num_tracers: usize,
        slot_names: Vec<String>,
        patch_boxes: Vec<PatchBox>,
    ) -> Result<Self> {
        if slot_names.len() < 4 {
            return Err(DynCoreError::configuration("at least 4 state slots are required by the IMEX RK schemes"))
        }
        let mut patches = Vec::with_capacity(patch_boxes.len());

        for (index, patch_box) in patch_boxes.into_iter().enumerate() {
            let axis_a = ColumnMesh::uniform(config.horizontal_order, patch_box.elements_a() as usize + 2 * patch_box.halo)?;
            let axis_b = ColumnMesh::uniform(config.horizontal_order, patch_box.elements_b() as usize + 2 * patch_box.halo)?;
            let column = ColumnMesh::uniform(config.vertical_order, config.num_vertical_elements)?;

            let (ia, ib) = (axis_a.node_len(), axis_b.node_len());
            let (node_levels, edge_levels) = (column.node_len(), column.interface_len());

            let state = slot_names.iter().map(|_| StateSlot::zeros(ia, ib, node_levels, edge_levels, num_tracers)).collect();
            let reference_state = StateSlot::zeros(ia, ib, node_levels, edge_levels, num_tracers);
            let rayleigh_strength = Array3::zeros((node_levels, ia, ib));

            patches.push(GridPatch {
                index, patch_box, axis_a, axis_b, column,
                geometry: None, state, reference_state, rayleigh_strength,
            });
        }

        Ok(Self { config, z_top, num_tracers, slot_names, patches })
    }

    pub fn slot_index(&self, name: &str) -> Result<usize> {
        self.slot_names.iter().position(|n| n == name)
            .ok_or_else(|| DynCoreError::configuration(format!("no such state slot '{}'", name)))
    }

    /// EvaluateTopography + EvaluateGeometricTerms (§4.4): sample the
    /// test-case topography on every patch, differentiate it with the
    /// horizontal spectral derivative matrix, and build the metric cache.
    pub fn evaluate_topography(&mut self, test_case: &dyn TestCase) -> Result<()> {
        let domain = self.config.domain.clone();
        let stretch = self.config.stretch;
        let z_top = self.z_top;
        for patch in &mut self.patches {
            let (topo, dtopo_da, dtopo_db) = evaluate_topography(
                &patch.axis_a, &patch.axis_b,
                |ra| domain.x_of(ra), |rb| domain.y_of(rb),
                |x, y| test_case.evaluate_topography(x, y),
                z_top,
            )?;
            let geometry = evaluate_geometric_terms(&patch.column, &topo, &dtopo_da, &dtopo_db, z_top, stretch)?;
            patch.geometry = Some(geometry);
        }
        Ok(())
    }

    /// Normalized vertical quadrature weight invariant checked as part of
    /// `EvaluateGeometricTerms` (§4.4, §8).
    pub fn verify_weight_normalization(&self) -> Result<()> {
        let node_w = crate::column_ops::node_weights(&self.patches[0].column).sum();
        let edge_w = crate::column_ops::assembled_interface_weights(&self.patches[0].column).sum();
        if (node_w - 1.0).abs() > 1e-13 || (edge_w - 1.0).abs() > 1e-13 {
            return Err(DynCoreError::geometry(format!(
                "vertical quadrature weights do not normalize to 1 (node={}, edge={})", node_w, edge_w)))
        }
        Ok(())
    }

    /// EvaluateTestCase (§4.4): populate the named state slot and the
    /// reference state from the test-case callback, converting to
    /// conserved variables via the equation set.
    pub fn evaluate_test_case(&mut self, test_case: &dyn TestCase, eqs: &EquationSet, slot: &str, time: f64) -> Result<()> {
        let slot_idx = self.slot_index(slot)?;
        let domain = self.config.domain.clone();
        let num_tracers = self.num_tracers;
        for patch in &mut self.patches {
            let geometry = patch.geometry.as_ref()
                .ok_or_else(|| DynCoreError::geometry("geometry must be evaluated before EvaluateTestCase"))?;
            let a_pts = patch.axis_a.all_node_points();
            let b_pts = patch.axis_b.all_node_points();
            let node_reta = patch.column.all_node_points();

            let mut node = patch.state[slot_idx].node.to_owned();
            let mut reference_node = patch.reference_state.node.to_owned();
            let mut tracers = patch.state[slot_idx].tracers.to_owned();
            let mut rayleigh = patch.rayleigh_strength.clone();

            for (ki, _reta) in node_reta.iter().enumerate() {
                for (i, &ra) in a_pts.iter().enumerate() {
                    for (j, &rb) in b_pts.iter().enumerate() {
                        let x = domain.x_of(ra);
                        let y = domain.y_of(rb);
                        let z = geometry.z_node[[ki, i, j]];

                        let mut out = [0.0; NUM_COMPONENTS];
                        let mut trac = vec![0.0; num_tracers.max(1)];
                        test_case.evaluate_pointwise_state(time, z, x, y, &mut out, &mut trac);
                        let conserved: [f64; NUM_COMPONENTS] = eqs.to_conserved(out.into()).into();
                        for c in 0..NUM_COMPONENTS {
                            node[[c, ki, i, j]] = conserved[c];
                        }
                        for (t, &v) in trac.iter().enumerate() {
                            tracers[[t, ki, i, j]] = v;
                        }

                        if test_case.has_reference_state() {
                            let mut ref_out = [0.0; NUM_COMPONENTS];
                            test_case.evaluate_reference_state(z, x, y, &mut ref_out);
                            let ref_conserved: [f64; NUM_COMPONENTS] = eqs.to_conserved(ref_out.into()).into();
                            for c in 0..NUM_COMPONENTS {
                                reference_node[[c, ki, i, j]] = ref_conserved[c];
                            }
                        }

                        if test_case.has_rayleigh_friction() {
                            rayleigh[[ki, i, j]] = test_case.evaluate_rayleigh_strength(z, x, y);
                        }
                    }
                }
            }

            patch.state[slot_idx].node = node.into_shared();
            patch.state[slot_idx].tracers = tracers.into_shared();
            patch.reference_state.node = reference_node.into_shared();
            patch.rayleigh_strength = rayleigh;
        }
        Ok(())
    }

    /// ApplyBoundaryConditions (§4.4): enforce no-flow at the rigid
    /// lid/ground on the vertical staggering's w-location, and lateral
    /// reflective treatment on patches that sit at a domain edge with no
    /// neighbor descriptor.
    pub fn apply_boundary_conditions(&mut self, slot: &str) -> Result<()> {
        let slot_idx = self.slot_index(slot)?;
        let velocity_representation = self.config.velocity_representation;
        let lateral = self.config.lateral_boundary;

        for patch in &mut self.patches {
            let geometry = patch.geometry.as_ref()
                .ok_or_else(|| DynCoreError::geometry("geometry must be evaluated before ApplyBoundaryConditions"))?;
            let mut node = patch.state[slot_idx].node.to_owned();
            let (ia, ib) = (patch.ia(), patch.ib());
            let bottom_k = 0;

            for i in 0..ia {
                for j in 0..ib {
                    let metric = geometry.metric_at_node(bottom_k, i, j);
                    let u = node[[0, bottom_k, i, j]];
                    let v = node[[1, bottom_k, i, j]];
                    node[[3, bottom_k, i, j]] = no_flow_vertical_velocity(u, v, metric);
                }
            }

            if lateral == LateralBoundary::Reflective {
                for direction in [Direction::Left, Direction::Right, Direction::Bottom, Direction::Top] {
                    if patch.patch_box.neighbor_on(direction).is_none() {
                        apply_reflective_edge(&mut node, &patch.axis_a, &patch.axis_b, patch.patch_box.halo, direction, velocity_representation);
                    }
                }
            }

            patch.state[slot_idx].node = node.into_shared();
        }
        Ok(())
    }

    /// ApplyDSS (§4.4): exchange halos, then average shared-edge values
    /// within each patch's full (interior + halo) horizontal extent, for
    /// every component at every vertical level of both representations.
    pub fn apply_dss(&mut self, slot: &str) -> Result<()> {
        self.exchange_halos(slot)?;
        let slot_idx = self.slot_index(slot)?;

        for patch in &mut self.patches {
            let mut node = patch.state[slot_idx].node.to_owned();
            let (nc, nk, _, _) = node.dim();
            for c in 0..nc {
                for k in 0..nk {
                    let mut plane = node.index_axis(Axis(0), c).index_axis(Axis(0), k).to_owned();
                    dss::apply_dss(&mut plane, &patch.axis_a, &patch.axis_b);
                    node.index_axis_mut(Axis(0), c).index_axis_mut(Axis(0), k).assign(&plane);
                }
            }
            patch.state[slot_idx].node = node.into_shared();

            let mut edge = patch.state[slot_idx].edge.to_owned();
            let (nc, nk, _, _) = edge.dim();
            for c in 0..nc {
                for k in 0..nk {
                    let mut plane = edge.index_axis(Axis(0), c).index_axis(Axis(0), k).to_owned();
                    dss::apply_dss(&mut plane, &patch.axis_a, &patch.axis_b);
                    edge.index_axis_mut(Axis(0), c).index_axis_mut(Axis(0), k).assign(&plane);
                }
            }
            patch.state[slot_idx].edge = edge.into_shared();
        }
        Ok(())
    }

    /// ComputeCurlAndDiv (§4.4): vorticity and divergence of the
    /// horizontal velocity, via the per-element spectral derivative
    /// matrix. §9 open question (b): differentiates the raw u/v
    /// components directly rather than their covariant counterparts;
    /// this matches the active code path in the original model and is
    /// retained as-is, flagged here as potentially inconsistent for a
    /// non-identity metric.
    pub fn compute_curl_and_div(&self, slot: &str) -> Result<Vec<(Array3<f64>, Array3<f64>)>> {
        use crate::column_ops::build_derivative_element_local;
        let slot_idx = self.slot_index(slot)?;
        let mut out = Vec::with_capacity(self.patches.len());

        for patch in &self.patches {
            let geometry = patch.geometry()?;
            let d_a = build_derivative_element_local(&patch.axis_a);
            let d_b = build_derivative_element_local(&patch.axis_b);
            let (node_levels, ia, ib) = (patch.column.node_len(), patch.ia(), patch.ib());
            let mut curl = Array3::<f64>::zeros((node_levels, ia, ib));
            let mut div = Array3::<f64>::zeros((node_levels, ia, ib));

            for k in 0..node_levels {
                let u = patch.state[slot_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 0).to_owned();
                let v = patch.state[slot_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), 1).to_owned();

                let mut du_db = ndarray::Array2::<f64>::zeros((ia, ib));
                for i in 0..ia {
                    let row = u.row(i).to_owned();
                    let d = d_b.apply(&row);
                    for j in 0..ib { du_db[[i, j]] = d[j]; }
                }
                let mut dv_da = ndarray::Array2::<f64>::zeros((ia, ib));
                for j in 0..ib {
                    let col = v.column(j).to_owned();
                    let d = d_a.apply(&col);
                    for i in 0..ia { dv_da[[i, j]] = d[i]; }
                }
                let mut div_ju_a = ndarray::Array2::<f64>::zeros((ia, ib));
                for j in 0..ib {
                    let col: ndarray::Array1<f64> = (0..ia).map(|i| geometry.metric_at_node(k, i, j).jacobian * u[[i, j]]).collect();
                    let d = d_a.apply(&col);
                    for i in 0..ia { div_ju_a[[i, j]] = d[i]; }
                }
                let mut div_jv_b = ndarray::Array2::<f64>::zeros((ia, ib));
                for i in 0..ia {
                    let row: ndarray::Array1<f64> = (0..ib).map(|j| geometry.metric_at_node(k, i, j).jacobian * v[[i, j]]).collect();
                    let d = d_b.apply(&row);
                    for j in 0..ib { div_jv_b[[i, j]] = d[j]; }
                }

                for i in 0..ia {
                    for j in 0..ib {
                        let jac = geometry.metric_at_node(k, i, j).jacobian;
                        curl[[k, i, j]] = (dv_da[[i, j]] - du_db[[i, j]]) / jac;
                        div[[k, i, j]] = (div_ju_a[[i, j]] + div_jv_b[[i, j]]) / jac;
                    }
                }
            }
            out.push((curl, div));
        }
        Ok(out)
    }

    /// InterpolateData (§4.4): Lagrange interpolation at an arbitrary
    /// (alpha, beta) reference point for diagnostics, optionally
    /// subtracting the reference state.
    pub fn interpolate_data(&self, patch_index: PatchIndex, component: usize, k: usize, alpha: f64, beta: f64, slot: &str, subtract_reference: bool) -> Result<f64> {
        let slot_idx = self.slot_index(slot)?;
        let patch = self.patches.get(patch_index).ok_or_else(|| DynCoreError::mesh("patch index out of range"))?;

        let (a0, a1) = (*patch.axis_a.element_boundaries.first().unwrap(), *patch.axis_a.element_boundaries.last().unwrap());
        let (b0, b1) = (*patch.axis_b.element_boundaries.first().unwrap(), *patch.axis_b.element_boundaries.last().unwrap());
        if alpha < a0 - 1e-10 || alpha > a1 + 1e-10 || beta < b0 - 1e-10 || beta > b1 + 1e-10 {
            return Err(DynCoreError::mesh("interpolation point lies outside the patch domain"))
        }

        let row_a = crate::column_ops::build_interpolation(&patch.axis_a, crate::column_ops::VerticalLocation::Nodes, &[alpha], false);
        let row_b = crate::column_ops::build_interpolation(&patch.axis_b, crate::column_ops::VerticalLocation::Nodes, &[beta], false);

        let plane = patch.state[slot_idx].node.index_axis(Axis(1), k).index_axis(Axis(0), component).to_owned();
        let mut value = 0.0;
        for (i, &wa) in row_a.matrix.row(0).iter().enumerate() {
            for (j, &wb) in row_b.matrix.row(0).iter().enumerate() {
                value += wa * wb * plane[[i, j]];
            }
        }

        if subtract_reference {
            let ref_plane = patch.reference_state.node.index_axis(Axis(1), k).index_axis(Axis(0), component).to_owned();
            let mut ref_value = 0.0;
            for (i, &wa) in row_a.matrix.row(0).iter().enumerate() {
                for (j, &wb) in row_b.matrix.row(0).iter().enumerate() {
                    ref_value += wa * wb * ref_plane[[i, j]];
                }
            }
            value -= ref_value;
        }
        Ok(value)
    }

    /// Copy the interior boundary slab of each patch into the halo rings
    /// of its neighbors, applying the neighbor descriptor's sign flips.
    /// Modeled on the §5 message-passing contract: the content written
    /// here must be visible before any patch begins `ApplyDSS`.
    fn exchange_halos(&mut self, slot: &str) -> Result<()> {
        let slot_idx = self.slot_index(slot)?;

        // First pass: snapshot each patch's boundary slabs (read-only).
        let mut updates: Vec<(PatchIndex, Direction, Array4<f64>)> = Vec::new();
        for patch in &self.patches {
            for nd in &patch.patch_box.neighbors {
                if !nd.direction.is_edge() {
                    continue
                }
                let neighbor = &self.patches[nd.neighbor];
                let mut slab = boundary_slab(&neighbor.state[slot_idx].node, &neighbor.axis_a, &neighbor.axis_b, neighbor.patch_box.halo, nd.direction.opposite());
                if nd.switch_perpendicular {
                    flip_component(&mut slab, perpendicular_component(nd.direction));
                }
                if nd.switch_parallel {
                    flip_component(&mut slab, parallel_component(nd.direction));
                }
                updates.push((patch.index, nd.direction, slab));
            }
        }

        // Second pass: write the snapshots into this patch's halo.
        for (index, direction, slab) in updates {
            let patch = &mut self.patches[index];
            let halo_n = patch.patch_box.halo;
            write_halo_slab(&mut patch.state[slot_idx].node, &patch.axis_a, &patch.axis_b, halo_n, direction, &slab);
        }
        Ok(())
    }
}

fn perpendicular_component(direction: Direction) -> usize {
    match direction {
        Direction::Left | Direction::Right => 0,
        _ => 1,
    }
}

fn parallel_component(direction: Direction) -> usize {
    match direction {
        Direction::Left | Direction::Right => 1,
        _ => 0,
    }
}

fn flip_component(slab: &mut Array4<f64>, component: usize) {
    let mut view = slab.index_axis_mut(Axis(0), component);
    view.mapv_inplace(|v| -v);
}

/// Extract the interior slab adjacent to `direction`, `halo` elements
/// deep, from `field` (shape component x level x ia x ib).
fn boundary_slab(field: &ArcArray4<f64>, axis_a: &ColumnMesh, axis_b: &ColumnMesh, halo: usize, direction: Direction) -> Array4<f64> {
    let (_, _, ia, ib) = field.dim();
    let width_a = halo * (axis_a.p_v + 1);
    let width_b = halo * (axis_b.p_v + 1);
    match direction {
        Direction::Left => field.slice(ndarray::s![.., .., width_a..2 * width_a, ..]).to_owned(),
        Direction::Right => field.slice(ndarray::s![.., .., ia - 2 * width_a..ia - width_a, ..]).to_owned(),
        Direction::Bottom => field.slice(ndarray::s![.., .., .., width_b..2 * width_b]).to_owned(),
        Direction::Top => field.slice(ndarray::s![.., .., .., ib - 2 * width_b..ib - width_b]).to_owned(),
        _ => field.to_owned(),
    }
}

fn write_halo_slab(field: &mut ArcArray4<f64>, axis_a: &ColumnMesh, axis_b: &ColumnMesh, halo: usize, direction: Direction, slab: &Array4<f64>) {
    let (_, _, ia, ib) = field.dim();
    let width_a = halo * (axis_a.p_v + 1);
    let width_b = halo * (axis_b.p_v + 1);
    let mut owned = field.to_owned();
    match direction {
        Direction::Left => owned.slice_mut(ndarray::s![.., .., 0..width_a, ..]).assign(slab),
        Direction::Right => owned.slice_mut(ndarray::s![.., .., ia - width_a..ia, ..]).assign(slab),
        Direction::Bottom => owned.slice_mut(ndarray::s![.., .., .., 0..width_b]).assign(slab),
        Direction::Top => owned.slice_mut(ndarray::s![.., .., .., ib - width_b..ib]).assign(slab),
        _ => {}
    }
    *field = owned.into_shared();
}

/// Fill the halo adjacent to a domain edge with no neighbor by mirroring
/// the nearest interior slab, flipping the perpendicular velocity
/// component through `apply_reflective_ghost`.
fn apply_reflective_edge(node: &mut Array4<f64>, axis_a: &ColumnMesh, axis_b: &ColumnMesh, halo: usize, direction: Direction, representation: VelocityRepresentation) {
    let (_, nk, ia, ib) = node.dim();
    match direction {
        Direction::Left | Direction::Right => {
            let width = halo * (axis_a.p_v + 1);
            for i in 0..width {
                let (mirror, target) = match direction {
                    Direction::Left => (2 * width - 1 - i, i),
                    _ => (ia - 2 * width + i, ia - width + i),
                };
                for k in 0..nk {
                    for j in 0..ib {
                        let mut u = node[[0, k, mirror, j]];
                        let mut v = node[[1, k, mirror, j]];
                        apply_reflective_ghost(&mut u, &mut v, direction, representation);
                        node[[0, k, target, j]] = u;
                        node[[1, k, target, j]] = v;
                        for c in 2..NUM_COMPONENTS {
                            node[[c, k, target, j]] = node[[c, k, mirror, j]];
                        }
                    }
                }
            }
        }
        Direction::Bottom | Direction::Top => {
            let width = halo * (axis_b.p_v + 1);
            for j in 0..width {
                let (mirror, target) = match direction {
                    Direction::Bottom => (2 * width - 1 - j, j),
                    _ => (ib - 2 * width + j, ib - width + j),
                };
                for k in 0..nk {
                    for i in 0..ia {
                        let mut u = node[[0, k, i, mirror]];
                        let mut v = node[[1, k, i, mirror]];
                        apply_reflective_ghost(&mut u, &mut v, direction, representation);
                        node[[0, k, i, target]] = u;
                        node[[1, k, i, target]] = v;
                        for c in 2..NUM_COMPONENTS {
                            node[[c, k, i, target]] = node[[c, k, i, mirror]];
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::NeighborDescriptor;
    use crate::testcases::thermal_bubble::ThermalBubble;

    fn small_config() -> GridConfig {
        GridConfig {
            domain: DomainBounds { x_min: 0.0, x_max: 1000.0, y_min: -1000.0, y_max: 1000.0, z_min: 0.0, z_max: 1000.0 },
            reference_latitude: None,
            horizontal_order: 3,
            halo_elements: 1,
            vertical_order: 3,
            num_vertical_elements: 4,
            staggering: VerticalStaggering::Levels,
            velocity_representation: VelocityRepresentation::Contravariant,
            lateral_boundary: LateralBoundary::Periodic,
            stretch: VerticalStretch::GalChen,
        }
    }

    #[test]
    fn initialize_and_evaluate_geometry() {
        let config = small_config();
        let mut boxes = vec![PatchBox::new(0, 2, 0, 2, 1)];
        boxes[0].set_neighbor(NeighborDescriptor::identity(0, Direction::Left));
        let mut grid = Grid::new(config, 1000.0, 0, vec!["active".into(), "work1".into(), "work2".into(), "work3".into()], boxes).unwrap();

        let test_case = ThermalBubble::default();
        grid.evaluate_topography(&test_case).unwrap();
        grid.verify_weight_normalization().unwrap();
        assert!(grid.patches[0].geometry.is_some());
    }

    #[test]
    fn dss_round_trip_preserves_constant_field() {
        let config = small_config();
        let boxes = vec![PatchBox::new(0, 2, 0, 2, 1)];
        let mut grid = Grid::new(config, 1000.0, 0, vec!["active".into(), "work1".into(), "work2".into(), "work3".into()], boxes).unwrap();
        let test_case = ThermalBubble::default();
        grid.evaluate_topography(&test_case).unwrap();
        let eqs = EquationSet::new(crate::constants::PhysicalConstants::default(), crate::equation_set::Dimensionality::Xyz3D);
        grid.evaluate_test_case(&test_case, &eqs, "active", 0.0).unwrap();
        grid.apply_dss("active").unwrap();
        let rho = grid.interpolate_data(0, 4, 0, 0.5, 0.5, "active", false).unwrap();
        assert!(rho > 0.0);
    }
}
