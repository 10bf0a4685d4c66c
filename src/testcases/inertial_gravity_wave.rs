//! Inertial-gravity wave test (§8, Skamarock & Klemp 1994): a constant-
//! Brunt-Vaisala-frequency background advected by a uniform mean wind,
//! perturbed by a localized potential-temperature bump. Exercises the
//! horizontally propagating gravity-wave response against a known
//! linear-theory dispersion relation.

use serde::{Serialize, Deserialize};
use crate::constants::PhysicalConstants;
use crate::equation_set::NUM_COMPONENTS;
use crate::testcase::TestCase;

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InertialGravityWave {
    pub phys: PhysicalConstants,
    pub z_top: f64,
    pub theta0: f64,
    pub brunt_vaisala: f64,
    pub mean_wind: f64,
    pub delta_theta: f64,
    pub center_x: f64,
    pub half_width: f64,
}

impl Default for InertialGravityWave {
    fn default() -> Self {
        Self {
            phys: PhysicalConstants::default(),
            z_top: 10_000.0,
            theta0: 300.0,
            brunt_vaisala: 0.01,
            mean_wind: 20.0,
            delta_theta: 0.01,
            center_x: 100_000.0,
            half_width: 5_000.0,
        }
    }
}

impl InertialGravityWave {
    fn theta_bar(&self, z: f64) -> f64 {
        self.theta0 * (self.brunt_vaisala.powi(2) * z / self.phys.g).exp()
    }

    /// Closed-form hydrostatic Exner function for a constant-N background
    /// (Skamarock & Klemp 1994, eq. 3): `pi(z) = 1 + g^2 / (c_p theta0 N^2)
    /// (exp(-N^2 z / g) - 1)`.
    fn exner(&self, z: f64) -> f64 {
        let n2 = self.brunt_vaisala.powi(2);
        1.0 + self.phys.g.powi(2) / (self.phys.c_p * self.theta0 * n2) * ((-n2 * z / self.phys.g).exp() - 1.0)
    }

    fn background_rho(&self, z: f64) -> f64 {
        let pi = self.exner(z);
        let p = self.phys.p_0 * pi.powf(self.phys.c_p / self.phys.r_d);
        let t = self.theta_bar(z) * pi;
        p / (self.phys.r_d * t)
    }

    fn perturbation(&self, time: f64, x: f64, z: f64) -> f64 {
        let xi = x - self.mean_wind * time - self.center_x;
        self.delta_theta * (std::f64::consts::PI * z / self.z_top).sin() / (1.0 + (xi / self.half_width).powi(2))
    }
}

impl TestCase for InertialGravityWave {
    fn name(&self) -> &'static str {
        "inertial_gravity_wave"
    }

    fn z_top(&self) -> f64 {
        self.z_top
    }

    fn evaluate_pointwise_state(&self, time: f64, z: f64, x: f64, _y: f64, out: &mut [f64; NUM_COMPONENTS], tracers: &mut [f64]) {
        out[0] = self.mean_wind;
        out[1] = 0.0;
        out[2] = self.theta_bar(z) + self.perturbation(time, x, z);
        out[3] = 0.0;
        out[4] = self.background_rho(z);
        tracers.fill(0.0);
    }

    fn has_reference_state(&self) -> bool {
        true
    }

    fn evaluate_reference_state(&self, z: f64, _x: f64, _y: f64, out: &mut [f64; NUM_COMPONENTS]) {
        out[0] = self.mean_wind;
        out[1] = 0.0;
        out[2] = self.theta_bar(z);
        out[3] = 0.0;
        out[4] = self.background_rho(z);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn background_theta_increases_with_height() {
        let t = InertialGravityWave::default();
        assert!(t.theta_bar(5000.0) > t.theta_bar(0.0));
    }

    #[test]
    fn perturbation_decays_away_from_center() {
        let t = InertialGravityWave::default();
        let near = t.perturbation(0.0, t.center_x, t.z_top / 2.0).abs();
        let far = t.perturbation(0.0, t.center_x + 20.0 * t.half_width, t.z_top / 2.0).abs();
        assert!(far < near);
    }
}
