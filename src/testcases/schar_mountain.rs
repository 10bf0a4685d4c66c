//! Schar mountain-wave test (§8, Schar et al. 2002): a uniform mean wind
//! over a cosine-modulated Gaussian ridge, with a constant-N background
//! and a Rayleigh sponge layer near the model top absorbing the upward-
//! propagating wave response. Exercises non-flat topography, the metric
//! terms it induces, and the sponge-layer damping path.

use serde::{Serialize, Deserialize};
use crate::constants::PhysicalConstants;
use crate::equation_set::NUM_COMPONENTS;
use crate::testcase::TestCase;

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScharMountain {
    pub phys: PhysicalConstants,
    pub z_top: f64,
    pub theta0: f64,
    pub brunt_vaisala: f64,
    pub mean_wind: f64,
    pub mountain_height: f64,
    pub mountain_half_width: f64,
    pub mountain_wavelength: f64,
    pub sponge_depth: f64,
    pub sponge_max_strength: f64,
}

impl Default for ScharMountain {
    fn default() -> Self {
        Self {
            phys: PhysicalConstants::default(),
            z_top: 25_000.0,
            theta0: 280.0,
            brunt_vaisala: 0.01,
            mean_wind: 10.0,
            mountain_height: 250.0,
            mountain_half_width: 5_000.0,
            mountain_wavelength: 4_000.0,
            sponge_depth: 10_000.0,
            sponge_max_strength: 1.0 / 300.0,
        }
    }
}

impl ScharMountain {
    fn theta_bar(&self, z: f64) -> f64 {
        self.theta0 * (self.brunt_vaisala.powi(2) * z / self.phys.g).exp()
    }

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
}

impl TestCase for ScharMountain {
    fn name(&self) -> &'static str {
        "schar_mountain"
    }

    fn z_top(&self) -> f64 {
        self.z_top
    }

    fn evaluate_topography(&self, x: f64, _y: f64) -> f64 {
        let envelope = (-(x / self.mountain_half_width).powi(2)).exp();
        let ripple = (std::f64::consts::PI * x / self.mountain_wavelength).cos().powi(2);
        self.mountain_height * envelope * ripple
    }

    fn evaluate_pointwise_state(&self, _time: f64, z: f64, _x: f64, _y: f64, out: &mut [f64; NUM_COMPONENTS], tracers: &mut [f64]) {
        out[0] = self.mean_wind;
        out[1] = 0.0;
        out[2] = self.theta_bar(z);
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

    fn has_rayleigh_friction(&self) -> bool {
        true
    }

    fn evaluate_rayleigh_strength(&self, z: f64, _x: f64, _y: f64) -> f64 {
        crate::vertical_dynamics::sponge_ramp(z, self.z_top, self.sponge_depth, self.sponge_max_strength)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn topography_peaks_at_center() {
        let t = ScharMountain::default();
        assert!(t.evaluate_topography(0.0, 0.0) > t.evaluate_topography(3.0 * t.mountain_half_width, 0.0));
    }

    #[test]
    fn sponge_strength_vanishes_below_sponge_layer() {
        let t = ScharMountain::default();
        assert_eq!(t.evaluate_rayleigh_strength(0.0, 0.0, 0.0), 0.0);
        assert!(t.evaluate_rayleigh_strength(t.z_top, 0.0, 0.0) > 0.0);
    }
}
