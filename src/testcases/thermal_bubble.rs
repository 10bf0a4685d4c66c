//! Rising warm-bubble test (§8): a neutrally stratified atmosphere at
//! rest, perturbed by a localized potential-temperature anomaly (Robert
//! 1993). Exercises buoyant convection with no background wind or
//! topography.

use serde::{Serialize, Deserialize};
use crate::constants::PhysicalConstants;
use crate::equation_set::NUM_COMPONENTS;
use crate::testcase::TestCase;

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermalBubble {
    pub phys: PhysicalConstants,
    pub z_top: f64,
    pub theta0: f64,
    pub delta_theta: f64,
    pub center_x: f64,
    pub center_z: f64,
    pub radius_x: f64,
    pub radius_z: f64,
}

impl Default for ThermalBubble {
    fn default() -> Self {
        Self {
            phys: PhysicalConstants::default(),
            z_top: 1500.0,
            theta0: 300.0,
            delta_theta: 0.5,
            center_x: 500.0,
            center_z: 350.0,
            radius_x: 250.0,
            radius_z: 250.0,
        }
    }
}

impl ThermalBubble {
    /// Hydrostatic Exner function for a neutrally stratified (constant
    /// `theta0`) background, `pi(z) = 1 - g z / (c_p theta0)`.
    fn exner(&self, z: f64) -> f64 {
        1.0 - self.phys.g * z / (self.phys.c_p * self.theta0)
    }

    fn background_rho(&self, z: f64) -> f64 {
        let pi = self.exner(z);
        let p = self.phys.p_0 * pi.powf(self.phys.c_p / self.phys.r_d);
        let t = self.theta0 * pi;
        p / (self.phys.r_d * t)
    }

    fn bubble_perturbation(&self, x: f64, z: f64) -> f64 {
        let r = (((x - self.center_x) / self.radius_x).powi(2) + ((z - self.center_z) / self.radius_z).powi(2)).sqrt();
        if r <= 1.0 {
            self.delta_theta * (std::f64::consts::FRAC_PI_2 * r).cos().powi(2)
        } else {
            0.0
        }
    }
}

impl TestCase for ThermalBubble {
    fn name(&self) -> &'static str {
        "thermal_bubble"
    }

    fn z_top(&self) -> f64 {
        self.z_top
    }

    fn evaluate_pointwise_state(&self, _time: f64, z: f64, x: f64, _y: f64, out: &mut [f64; NUM_COMPONENTS], tracers: &mut [f64]) {
        let theta = self.theta0 + self.bubble_perturbation(x, z);
        let rho = self.background_rho(z);
        out[0] = 0.0;
        out[1] = 0.0;
        out[2] = theta;
        out[3] = 0.0;
        out[4] = rho;
        tracers.fill(0.0);
    }

    fn has_reference_state(&self) -> bool {
        true
    }

    fn evaluate_reference_state(&self, z: f64, _x: f64, _y: f64, out: &mut [f64; NUM_COMPONENTS]) {
        out[0] = 0.0;
        out[1] = 0.0;
        out[2] = self.theta0;
        out[3] = 0.0;
        out[4] = self.background_rho(z);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bubble_perturbation_vanishes_outside_radius() {
        let t = ThermalBubble::default();
        assert_eq!(t.bubble_perturbation(t.center_x + 10.0 * t.radius_x, t.center_z), 0.0);
        assert!(t.bubble_perturbation(t.center_x, t.center_z) > 0.0);
    }

    #[test]
    fn background_density_decreases_with_height() {
        let t = ThermalBubble::default();
        assert!(t.background_rho(0.0) > t.background_rho(1000.0));
    }
}
