//! The registered gravity callback of §6: a static potential `phi(x1, x2,
//! x3)` that [`crate::integrator::Integrator`] samples at cell centres and
//! faces to build the well-balanced P5/C5 source term.
//!
//! The application crate this library was extracted from has no equivalent
//! (its `Hydrodynamics` trait is purely conservative), so this is grounded
//! instead on the general shape of a user-supplied closure plugged into an
//! otherwise pure numerical core, the same role `RiemannSolver` plays for
//! the flux.

/// A static gravitational potential `phi(x1, x2, x3)`. The integrator
/// differences it numerically to get the force per unit mass; no analytic
/// gradient is required of implementors.
pub trait GravityPotential {
    fn potential(&self, x1: f64, x2: f64, x3: f64) -> f64;
}

/// No gravity: `potential` is identically zero everywhere, so the
/// integrator's source-term step is a no-op.
pub struct NoGravity;

impl GravityPotential for NoGravity {
    fn potential(&self, _x1: f64, _x2: f64, _x3: f64) -> f64 {
        0.0
    }
}

/// Uniform gravitational acceleration along one axis, `phi = g * x`. Useful
/// for Rayleigh-Taylor style test problems.
pub struct UniformGravity {
    pub g1: f64,
    pub g2: f64,
    pub g3: f64,
}

impl GravityPotential for UniformGravity {
    fn potential(&self, x1: f64, x2: f64, x3: f64) -> f64 {
        self.g1 * x1 + self.g2 * x2 + self.g3 * x3
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_gravity_is_zero_everywhere() {
        assert_eq!(NoGravity.potential(1.0, 2.0, 3.0), 0.0);
    }

    #[test]
    fn uniform_gravity_is_linear_in_its_axis() {
        let gravity = UniformGravity { g1: 2.0, g2: 0.0, g3: 0.0 };
        assert!((gravity.potential(1.0, 2.0, 3.0) - 2.0).abs() < 1e-12);
        assert!((gravity.potential(3.0, 0.0, 0.0) - 6.0).abs() < 1e-12);
    }
}
