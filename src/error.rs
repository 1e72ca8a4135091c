//! Error types for the integrator, following the `thiserror`-derived enum
//! pattern used by the application crate this library was extracted from
//! (see its `app::Error`).

/// Fatal conditions the integrator can raise. Configuration errors are
/// returned from [`crate::integrator::Integrator::new`] before any scratch
/// array is allocated; [`IntegratorError::NegativeDensityUnrecoverable`] is
/// returned from [`crate::integrator::Integrator::step`] only after the
/// first-order flux correction (when enabled) has already been tried and
/// failed.
#[derive(thiserror::Error, Debug)]
pub enum IntegratorError {
    #[error("configuration requires at least {required} ghost zones for this reconstruction order and feature set, got {actual}")]
    InsufficientGhostZones { required: usize, actual: usize },

    #[error("H-correction and first-order flux correction cannot both be enabled")]
    IncompatibleCorrections,

    #[error("gamma must be greater than 1.0 for an adiabatic equation of state, got {0}")]
    InvalidGamma(f64),

    #[error("pressure floor must be positive, got {0}")]
    InvalidPressureFloor(f64),

    #[error("unrecoverable negative density at cell ({k}, {j}, {i}): rho = {rho}")]
    NegativeDensityUnrecoverable { k: usize, j: usize, i: usize, rho: f64 },
}
