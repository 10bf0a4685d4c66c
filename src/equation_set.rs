//! The equation set (§4.5): variable layout {u, v, theta, w, rho}, primitive
//! <-> conservative conversion, and the equation-of-state relations
//! (pressure, speed of sound). Mirrors the teacher's
//! `physics::AgnosticPrimitive` pattern: a flat, hydrodynamics-system-
//! agnostic layout with a `[f64; N]` newtype conversion at the serde
//! boundary, decoupling the public variable order from internal storage.

use serde::{Serialize, Deserialize};
use crate::constants::PhysicalConstants;
use crate::error::{DynCoreError, Result};

/// Number of prognostic components per column DOF (§3): u, v, theta, w, rho.
pub const NUM_COMPONENTS: usize = 5;

/// How the two horizontal velocity components are represented (§3, §9).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum VelocityRepresentation {
    /// Default: components along the contravariant basis vectors.
    Contravariant,
    /// Components along the covariant basis vectors.
    Covariant,
}

/// The model's spatial dimensionality (§4.5). 2D requires vertical order 1.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Dimensionality {
    Xz2D,
    Xyz3D,
}

/**
 * Primitive state at one DOF: (u, v, theta, w, rho). Serializes to/from a
 * flat 5-array, the way the teacher's `AgnosticPrimitive` serializes to a
 * flat 4-array, so on-disk layout stays stable independent of field name
 * order.
 */
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "[f64; NUM_COMPONENTS]", into = "[f64; NUM_COMPONENTS]")]
pub struct Primitive {
    pub u: f64,
    pub v: f64,
    pub theta: f64,
    pub w: f64,
    pub rho: f64,
}

impl From<[f64; NUM_COMPONENTS]> for Primitive {
    fn from(a: [f64; NUM_COMPONENTS]) -> Self {
        Self { u: a[0], v: a[1], theta: a[2], w: a[3], rho: a[4] }
    }
}

impl From<Primitive> for [f64; NUM_COMPONENTS] {
    fn from(p: Primitive) -> Self {
        [p.u, p.v, p.theta, p.w, p.rho]
    }
}

/// Conservative state at one DOF: (rho u, rho v, rho theta, rho w, rho).
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "[f64; NUM_COMPONENTS]", into = "[f64; NUM_COMPONENTS]")]
pub struct Conserved {
    pub rho_u: f64,
    pub rho_v: f64,
    pub rho_theta: f64,
    pub rho_w: f64,
    pub rho: f64,
}

impl From<[f64; NUM_COMPONENTS]> for Conserved {
    fn from(a: [f64; NUM_COMPONENTS]) -> Self {
        Self { rho_u: a[0], rho_v: a[1], rho_theta: a[2], rho_w: a[3], rho: a[4] }
    }
}

impl From<Conserved> for [f64; NUM_COMPONENTS] {
    fn from(c: Conserved) -> Self {
        [c.rho_u, c.rho_v, c.rho_theta, c.rho_w, c.rho]
    }
}

/**
 * Holds the physical constants and dimensionality choice needed to convert
 * between primitive and conservative variables and to evaluate the
 * equation of state. Constructed once, read-only thereafter.
 */
#[derive(Copy, Clone)]
pub struct EquationSet {
    pub phys: PhysicalConstants,
    pub dimensionality: Dimensionality,
}

impl EquationSet {
    pub fn new(phys: PhysicalConstants, dimensionality: Dimensionality) -> Self {
        Self { phys, dimensionality }
    }

    pub fn validate(&self, vertical_order: usize) -> Result<()> {
        if self.dimensionality == Dimensionality::Xz2D && vertical_order != 1 {
            return Err(DynCoreError::configuration(
                "2D (xz) configurations require vertical_order == 1"))
        }
        Ok(())
    }

    pub fn to_conserved(&self, p: Primitive) -> Conserved {
        Conserved {
            rho_u: p.rho * p.u,
            rho_v: p.rho * p.v,
            rho_theta: p.rho * p.theta,
            rho_w: p.rho * p.w,
            rho: p.rho,
        }
    }

    pub fn to_primitive(&self, c: Conserved) -> Primitive {
        Primitive {
            u: c.rho_u / c.rho,
            v: c.rho_v / c.rho,
            theta: c.rho_theta / c.rho,
            w: c.rho_w / c.rho,
            rho: c.rho,
        }
    }

    /// Pressure from the ideal-gas equation of state, p = p_0 (R_d rho
    /// theta / p_0)^(C_p / C_v).
    pub fn pressure(&self, rho: f64, theta: f64) -> f64 {
        let phys = &self.phys;
        phys.p_0 * (phys.r_d * rho * theta / phys.p_0).powf(phys.gamma())
    }

    /// Squared speed of sound, c^2 = C_p R_d theta / C_v * (p / p_0)^(R_d /
    /// C_p - 1).
    pub fn sound_speed_squared(&self, rho: f64, theta: f64) -> f64 {
        let phys = &self.phys;
        let p = self.pressure(rho, theta);
        phys.c_p * phys.r_d * theta / phys.c_v * (p / phys.p_0).powf(phys.kappa() - 1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eqs() -> EquationSet {
        EquationSet::new(PhysicalConstants::default(), Dimensionality::Xyz3D)
    }

    #[test]
    fn conversion_round_trips() {
        let eqs = eqs();
        let p = Primitive { u: 1.0, v: -2.0, theta: 300.0, w: 0.5, rho: 1.2 };
        let c = eqs.to_conserved(p);
        let p2 = eqs.to_primitive(c);
        assert!((p.u - p2.u).abs() < 1e-12);
        assert!((p.theta - p2.theta).abs() < 1e-12);
        assert!((p.rho - p2.rho).abs() < 1e-12);
    }

    #[test]
    fn pressure_positive_for_physical_state() {
        let eqs = eqs();
        assert!(eqs.pressure(1.2, 300.0) > 0.0);
        assert!(eqs.sound_speed_squared(1.2, 300.0) > 0.0);
    }

    #[test]
    fn two_d_requires_vertical_order_one() {
        let eqs = EquationSet::new(PhysicalConstants::default(), Dimensionality::Xz2D);
        assert!(eqs.validate(1).is_ok());
        assert!(eqs.validate(4).is_err());
    }
}
