/**
 * Error taxonomy for the dynamical core (§7). Every error carries a free-
 * form message and a stable category tag; location is embedded by
 * `thiserror`'s `#[error]` formatting rather than a separate field, in
 * keeping with how the teacher's `app::Error` reports errors.
 */
#[derive(thiserror::Error, Debug)]
pub enum DynCoreError {

    /// Invalid resolution/order combination, topography exceeding z_top,
    /// scale height >= z_top, dimensionality/vertical-order mismatch.
    /// Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Metric Jacobian non-positive, or a normalized-area check failed
    /// beyond the 1e-13 tolerance. Fatal.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// JFNK non-convergence or GMRES breakdown. May be recoverable via a
    /// Delta-t retry, per the solver's policy.
    #[error("solver error: {0}")]
    Solver(String),

    /// Interpolation point outside domain, or an element-index overflow.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Surfaced unchanged from an output/checkpoint collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}




// ============================================================================
impl DynCoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry(message.into())
    }

    pub fn solver(message: impl Into<String>) -> Self {
        Self::Solver(message.into())
    }

    pub fn mesh(message: impl Into<String>) -> Self {
        Self::Mesh(message.into())
    }

    /// Whether the driver may retry this step at a smaller time step,
    /// rather than treating it as a fatal abort (§5, §7).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Solver(_))
    }
}




pub type Result<T> = std::result::Result<T, DynCoreError>;
