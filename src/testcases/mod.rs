pub mod thermal_bubble;
pub mod inertial_gravity_wave;
pub mod schar_mountain;
