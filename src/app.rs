pub static DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub static VERSION_AND_BUILD: &str = git_version::git_version!(prefix=concat!("v", env!("CARGO_PKG_VERSION"), " "));


use std::{
    ffi::OsStr,
    fs::{File, read_to_string},
    path::Path,
};
use serde::{
    Serialize,
    Deserialize,
};
use crate::yaml_patch::Patch;


use crate::constants::PhysicalConstants;
use crate::equation_set::{Dimensionality, EquationSet, VelocityRepresentation};
use crate::grid::{DomainBounds, Grid, GridConfig, VerticalStaggering};
use crate::grid::boundary::LateralBoundary;
use crate::grid::geometry::VerticalStretch;
use crate::patch::{Direction, NeighborDescriptor, PatchBox};
use crate::tasks::Tasks;
use crate::testcase::{AnyTestCase, TestCase};
use crate::time_integrator::{self, TimeIntegratorConfig};
use crate::io;




// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    AppIO(#[from] io::Error),

    #[error("{0}")]
    DynCore(#[from] crate::error::DynCoreError),

    #[error("unknown input file type '{0}'")]
    UnknownInputType(String),
}




/**
 * Horizontal mesh resolution, operator orders, and boundary treatment:
 * everything needed to size a single rectangular patch spanning the whole
 * domain. The grid's own patch-topology support is more general (§4.3), but
 * the CLI only ever drives one patch.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshConfig {
    pub domain: DomainBounds,
    pub reference_latitude: Option<f64>,
    pub resolution_x: usize,
    pub resolution_y: usize,
    pub levels: usize,
    pub horizontal_order: usize,
    pub vertical_order: usize,
    pub halo_elements: usize,
    pub staggering: VerticalStaggering,
    pub velocity_representation: VelocityRepresentation,
    pub lateral_boundary: LateralBoundary,
    pub stretch: VerticalStretch,
}

impl MeshConfig {
    fn grid_config(&self) -> GridConfig {
        GridConfig {
            domain: self.domain.clone(),
            reference_latitude: self.reference_latitude,
            horizontal_order: self.horizontal_order,
            halo_elements: self.halo_elements,
            vertical_order: self.vertical_order,
            num_vertical_elements: self.levels,
            staggering: self.staggering,
            velocity_representation: self.velocity_representation,
            lateral_boundary: self.lateral_boundary,
            stretch: self.stretch,
        }
    }

    /// A single patch spanning the whole domain, with every edge wired to
    /// itself when the lateral boundary is periodic (the only case the
    /// halo-exchange/DSS machinery needs a neighbor for; see
    /// `Grid::exchange_halos`, which only consults edge-direction
    /// neighbors).
    fn patch_box(&self) -> PatchBox {
        let mut patch_box = PatchBox::new(0, self.resolution_x as i64, 0, self.resolution_y as i64, self.halo_elements);
        if self.lateral_boundary == LateralBoundary::Periodic {
            for direction in [Direction::Left, Direction::Right, Direction::Top, Direction::Bottom] {
                patch_box.set_neighbor(NeighborDescriptor::identity(0, direction));
            }
        }
        patch_box
    }
}




/**
 * Simulation control: how long to run for, how frequently to perform side
 * effects, etc
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Control {

    /// The simulation start time. Not necessarily 0, since some test cases
    /// are time-dependent exact solutions evaluated at an offset.
    pub start_time: f64,

    /// The simulation end time.
    pub final_time: f64,

    /// The fixed time step (§4.8).
    pub delta_t: f64,

    /// The time between writing checkpoint files.
    pub checkpoint_interval: f64,

    /// The time between writing output (products) files. If omitted or
    /// nil, defaults to no output.
    pub output_interval: Option<f64>,

    /// The number of steps between performing side-effects.
    pub fold: usize,

    /// Number of worker threads on the Tokio runtime. If omitted or nil,
    /// defaults to 2x the number of physical cores.
    pub num_threads: Option<usize>,

    /// Subtract the test case's hydrostatic reference state (if it has
    /// one) from output snapshots (§4.4, §6).
    #[serde(default)]
    pub subtract_reference: bool,

    /// The directory where data files will be written. If omitted or nil,
    /// defaults to the current directory.
    #[serde(default = "Control::default_output_directory")]
    pub output_directory: String,
}

impl Control {
    pub fn num_threads(&self) -> usize {
        match self.num_threads {
            Some(n) => n,
            None => num_cpus::get() * 2,
        }
    }
    fn default_output_directory() -> String {
        ".".into()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_threads() == 0 || self.num_threads() >= 1024 {
            anyhow::bail!("num_threads must be > 0 and < 1024")
        }
        if self.delta_t <= 0.0 {
            anyhow::bail!("delta_t must be > 0.0")
        }
        if self.final_time < self.start_time {
            anyhow::bail!("final_time must be >= start_time")
        }
        if self.checkpoint_interval < 0.0 {
            anyhow::bail!("checkpoint_interval must be >= 0.0")
        }
        if self.output_interval.unwrap_or(0.0) < 0.0 {
            anyhow::bail!("output_interval must be >= 0.0")
        }
        Ok(())
    }
}




/**
 * User configuration
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub mesh: MeshConfig,
    pub constants: PhysicalConstants,
    pub dimensionality: Dimensionality,
    pub num_tracers: usize,
    pub test_case: AnyTestCase,
    pub integrator: TimeIntegratorConfig,
    pub control: Control,
}

impl Configuration {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.constants.validate()?;
        self.mesh.grid_config().validate()?;
        self.equation_set().validate(self.mesh.vertical_order)?;
        self.control.validate()?;
        Ok(())
    }

    /**
     * Patch this config struct with inputs from the command line. The inputs
     * can be names of YAML files or key=value pairs.
     */
    pub fn patch_from(&mut self, overrides: Vec<String>) -> Result<(), Error> {
        for extra_config_str in overrides {
            if extra_config_str.ends_with(".yaml") {
                self.patch_from_reader(File::open(extra_config_str)?)?
            } else {
                self.patch_from_key_val(&extra_config_str)?
            }
        }
        Ok(())
    }

    pub fn equation_set(&self) -> EquationSet {
        EquationSet::new(self.constants, self.dimensionality)
    }

    fn build_grid(&self) -> Result<Grid, Error> {
        let eqs = self.equation_set();
        let mut grid = Grid::new(
            self.mesh.grid_config(),
            self.test_case.z_top(),
            self.num_tracers,
            time_integrator::required_slot_names(),
            vec![self.mesh.patch_box()],
        )?;
        grid.evaluate_topography(&self.test_case)?;
        grid.evaluate_test_case(&self.test_case, &eqs, "active", self.control.start_time)?;
        Ok(grid)
    }
}




/**
 * App state: the grid plus everything needed to run or checkpoint it.
 * `Grid` itself is not `Serialize` (its geometry cache holds recomputable
 * derived data); `io::Checkpoint` is the serializable snapshot of an `App`.
 */
pub struct App {
    pub grid: Grid,
    pub tasks: Tasks,
    pub config: Configuration,
    pub version: String,
}




// ============================================================================
impl App {

    /**
     * Return self as a result, which will be in an error state if any of the
     * configuration items did not pass validation.
     */
    pub fn validate(self) -> anyhow::Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    /**
     * Construct a new App instance from a user configuration.
     */
    pub fn from_config(mut config: Configuration, overrides: Vec<String>) -> Result<Self, Error> {
        config.patch_from(overrides)?;
        let grid = config.build_grid()?;
        Ok(Self { grid, tasks: Tasks::new(), config, version: VERSION_AND_BUILD.to_string() })
    }

    /**
     * Patch the config struct with inputs from the command line, rebuilding
     * the grid since mesh or test-case fields may have changed.
     */
    pub fn with_patched_config(mut self, overrides: Vec<String>) -> Result<Self, Error> {
        self.config.patch_from(overrides)?;
        self.grid = self.config.build_grid()?;
        Ok(self)
    }

    /**
     * Construct a new App instance from a file: may be a config.yaml or a
     * checkpoint .cbor file.
     */
    pub fn from_file(filename: &str, overrides: Vec<String>) -> Result<Self, Error> {
        match Path::new(&filename).extension().and_then(OsStr::to_str) {
            Some("yaml") => Self::from_config(serde_yaml::from_str(&read_to_string(filename)?)?, overrides),
            Some("cbor") => {
                let checkpoint: io::Checkpoint = io::read_cbor(filename)?;
                let mut config = checkpoint.config.clone();
                config.patch_from(overrides)?;
                let tasks = checkpoint.tasks.clone();
                let grid = checkpoint.into_grid()?;
                Ok(Self { grid, tasks, config, version: VERSION_AND_BUILD.to_string() })
            }
            _ => Err(Error::UnknownInputType(filename.to_string())),
        }
    }

    /**
     * Construct a new App instance from a preset (hard-coded) configuration
     * name, or otherwise an input file if no matching preset is found.
     */
    pub fn from_preset_or_file(input: &str, overrides: Vec<String>) -> Result<Self, Error> {
        for (key, yaml) in Self::presets() {
            if input == key {
                return Self::from_config(serde_yaml::from_str(yaml)?, overrides)
            }
        }
        Self::from_file(input, overrides)
    }

    /// The current simulation time, read off the `control.start_time` plus
    /// however many steps have already been taken (tracked by the caller;
    /// `App` itself is time-agnostic between `step` calls, the way the
    /// teacher's `scheme::advance` is driven externally by `main.rs`).
    pub fn to_checkpoint(&self, time: f64) -> io::Checkpoint {
        io::Checkpoint::from_grid(&self.grid, time, &self.tasks, &self.config, &self.version)
    }

    pub fn presets() -> Vec<(&'static str, &'static str)> {
        vec![
            ("thermal_bubble", include_str!("setups/thermal_bubble.yaml")),
            ("thermal_bubble_fine", include_str!("setups/thermal_bubble_fine.yaml")),
            ("inertial_gravity_wave", include_str!("setups/inertial_gravity_wave.yaml")),
            ("schar_mountain", include_str!("setups/schar_mountain.yaml")),
            ("smoke", include_str!("setups/smoke.yaml")),
        ]
    }
}




#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_preset_parses_and_validates() {
        for (name, _) in App::presets() {
            let app = App::from_preset_or_file(name, vec![]).unwrap_or_else(|e| panic!("preset '{}' failed: {}", name, e));
            app.validate().unwrap_or_else(|e| panic!("preset '{}' failed validation: {}", name, e));
        }
    }

    #[test]
    fn key_value_override_takes_effect() {
        let app = App::from_preset_or_file("smoke", vec!["control.delta_t=0.25".to_string()]).unwrap();
        assert_eq!(app.config.control.delta_t, 0.25);
    }
}
