//! Test cases (§6, §8): the external interface by which a named scenario
//! supplies topography, an initial/reference pointwise state, and an
//! optional Rayleigh-friction sponge-layer strength to the grid. Mirrors
//! the teacher's `AnyModel`/`AnyHydro` pattern: concrete scenarios are
//! collected behind one non-generic enum via `derive_more::From`, so the
//! rest of the crate (app.rs, io.rs) can hold a single trait object without
//! a type parameter threading through every layer.

use derive_more::From;
use serde::{Serialize, Deserialize};
use crate::equation_set::NUM_COMPONENTS;
use crate::testcases;

/// A named physical scenario (§6). Implementations are pure functions of
/// space (and, for time-dependent exact solutions, time): no mutable
/// state, so the same `TestCase` instance can be queried concurrently by
/// every patch's initialization pass.
pub trait TestCase: Send + Sync {
    fn name(&self) -> &'static str;

    /// Height of the rigid lid/model top above the deepest topography, in
    /// meters (§4.4).
    fn z_top(&self) -> f64;

    /// Surface elevation at `(x, y)`, in meters. Flat by default.
    fn evaluate_topography(&self, x: f64, y: f64) -> f64 {
        let _ = (x, y);
        0.0
    }

    /// Initial (or, for time-dependent exact solutions, exact-at-`time`)
    /// primitive state at physical point `(x, y, z)`, plus any passive
    /// tracer values.
    fn evaluate_pointwise_state(&self, time: f64, z: f64, x: f64, y: f64, out: &mut [f64; NUM_COMPONENTS], tracers: &mut [f64]);

    /// Whether this scenario defines a hydrostatically balanced reference
    /// state to subtract out for perturbation diagnostics (§4.4).
    fn has_reference_state(&self) -> bool {
        false
    }

    fn evaluate_reference_state(&self, z: f64, x: f64, y: f64, out: &mut [f64; NUM_COMPONENTS]) {
        let _ = (z, x, y);
        out.fill(0.0);
    }

    /// Whether this scenario requests a Rayleigh-friction sponge layer
    /// near the model top (§4.7).
    fn has_rayleigh_friction(&self) -> bool {
        false
    }

    /// Sponge-layer damping strength (1/s) at physical point `(x, y, z)`.
    fn evaluate_rayleigh_strength(&self, z: f64, x: f64, y: f64) -> f64 {
        let _ = (z, x, y);
        0.0
    }
}

/// The set of built-in scenarios, collected behind one enum so `app.rs`
/// can select one by name from a config file without a generic parameter.
#[derive(Clone, Serialize, Deserialize, From)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum AnyTestCase {
    ThermalBubble(testcases::thermal_bubble::ThermalBubble),
    InertialGravityWave(testcases::inertial_gravity_wave::InertialGravityWave),
    ScharMountain(testcases::schar_mountain::ScharMountain),
}

impl TestCase for AnyTestCase {
    fn name(&self) -> &'static str {
        match self {
            AnyTestCase::ThermalBubble(t) => t.name(),
            AnyTestCase::InertialGravityWave(t) => t.name(),
            AnyTestCase::ScharMountain(t) => t.name(),
        }
    }

    fn z_top(&self) -> f64 {
        match self {
            AnyTestCase::ThermalBubble(t) => t.z_top(),
            AnyTestCase::InertialGravityWave(t) => t.z_top(),
            AnyTestCase::ScharMountain(t) => t.z_top(),
        }
    }

    fn evaluate_topography(&self, x: f64, y: f64) -> f64 {
        match self {
            AnyTestCase::ThermalBubble(t) => t.evaluate_topography(x, y),
            AnyTestCase::InertialGravityWave(t) => t.evaluate_topography(x, y),
            AnyTestCase::ScharMountain(t) => t.evaluate_topography(x, y),
        }
    }

    fn evaluate_pointwise_state(&self, time: f64, z: f64, x: f64, y: f64, out: &mut [f64; NUM_COMPONENTS], tracers: &mut [f64]) {
        match self {
            AnyTestCase::ThermalBubble(t) => t.evaluate_pointwise_state(time, z, x, y, out, tracers),
            AnyTestCase::InertialGravityWave(t) => t.evaluate_pointwise_state(time, z, x, y, out, tracers),
            AnyTestCase::ScharMountain(t) => t.evaluate_pointwise_state(time, z, x, y, out, tracers),
        }
    }

    fn has_reference_state(&self) -> bool {
        match self {
            AnyTestCase::ThermalBubble(t) => t.has_reference_state(),
            AnyTestCase::InertialGravityWave(t) => t.has_reference_state(),
            AnyTestCase::ScharMountain(t) => t.has_reference_state(),
        }
    }

    fn evaluate_reference_state(&self, z: f64, x: f64, y: f64, out: &mut [f64; NUM_COMPONENTS]) {
        match self {
            AnyTestCase::ThermalBubble(t) => t.evaluate_reference_state(z, x, y, out),
            AnyTestCase::InertialGravityWave(t) => t.evaluate_reference_state(z, x, y, out),
            AnyTestCase::ScharMountain(t) => t.evaluate_reference_state(z, x, y, out),
        }
    }

    fn has_rayleigh_friction(&self) -> bool {
        match self {
            AnyTestCase::ThermalBubble(t) => t.has_rayleigh_friction(),
            AnyTestCase::InertialGravityWave(t) => t.has_rayleigh_friction(),
            AnyTestCase::ScharMountain(t) => t.has_rayleigh_friction(),
        }
    }

    fn evaluate_rayleigh_strength(&self, z: f64, x: f64, y: f64) -> f64 {
        match self {
            AnyTestCase::ThermalBubble(t) => t.evaluate_rayleigh_strength(z, x, y),
            AnyTestCase::InertialGravityWave(t) => t.evaluate_rayleigh_strength(z, x, y),
            AnyTestCase::ScharMountain(t) => t.evaluate_rayleigh_strength(z, x, y),
        }
    }
}
