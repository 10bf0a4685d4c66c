use serde::{Serialize, Deserialize};




/**
 * Immutable bundle of physical constants used throughout the core. A single
 * instance is constructed once (from defaults or a configuration override)
 * and passed by reference; it is never mutated after construction.
 */
#[derive(Copy, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhysicalConstants {

    /// Gravitational acceleration (m / s^2)
    pub g: f64,

    /// Gas constant for dry air (J / kg / K)
    pub r_d: f64,

    /// Specific heat at constant pressure (J / kg / K)
    pub c_p: f64,

    /// Specific heat at constant volume (J / kg / K)
    pub c_v: f64,

    /// Reference pressure (Pa)
    pub p_0: f64,

    /// Earth's rotation rate (rad / s)
    pub omega: f64,

    /// Earth radius (m)
    pub earth_radius: f64,
}




// ============================================================================
impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            g: 9.80616,
            r_d: 287.0,
            c_p: 1004.5,
            c_v: 717.5,
            p_0: 1.0e5,
            omega: 7.29212e-5,
            earth_radius: 6.37122e6,
        }
    }
}




// ============================================================================
impl PhysicalConstants {

    /// Ratio of specific heats, C_p / C_v.
    pub fn gamma(&self) -> f64 {
        self.c_p / self.c_v
    }

    /// R_d / C_p, the exponent appearing in the Exner-function relation.
    pub fn kappa(&self) -> f64 {
        self.r_d / self.c_p
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.c_p <= self.c_v {
            anyhow::bail!("c_p must be greater than c_v")
        }
        if self.r_d <= 0.0 || self.p_0 <= 0.0 || self.g <= 0.0 {
            anyhow::bail!("g, r_d, and p_0 must be positive")
        }
        Ok(())
    }

    /**
     * Coriolis parameters (f, beta) on a beta plane centered at the given
     * reference latitude (radians).
     */
    pub fn coriolis_beta_plane(&self, reference_latitude: f64) -> (f64, f64) {
        let f = 2.0 * self.omega * reference_latitude.sin();
        let beta = 2.0 * self.omega * reference_latitude.cos() / self.earth_radius;
        (f, beta)
    }
}




#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PhysicalConstants::default().validate().is_ok());
    }

    #[test]
    fn coriolis_vanishes_at_equator() {
        let phys = PhysicalConstants::default();
        let (f, _beta) = phys.coriolis_beta_plane(0.0);
        assert!(f.abs() < 1e-12);
    }
}
