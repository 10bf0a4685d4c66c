//! Non-hydrostatic Cartesian dynamical core: spectral-element horizontal
//! discretization, finite-element vertical discretization on a terrain-
//! following mesh, HEVI IMEX Runge-Kutta time integration. Crate root:
//! re-exports every module so integration tests and `main.rs` share one
//! dependency graph.

pub mod app;
pub mod column_ops;
pub mod constants;
pub mod equation_set;
pub mod error;
pub mod grid;
pub mod horizontal_dynamics;
pub mod io;
pub mod jfnk;
pub mod output;
pub mod patch;
pub mod quadrature;
pub mod tasks;
pub mod testcase;
pub mod testcases;
pub mod time_integrator;
pub mod vertical_dynamics;
pub mod yaml_patch;
