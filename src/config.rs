//! User-facing configuration, following the `#[derive(Serialize,
//! Deserialize)] ... validate()` pattern used by the application crate this
//! library was extracted from (see its `app::Configuration`/`app::Control`).

use serde::{Deserialize, Serialize};

use crate::error::IntegratorError;
use crate::vector::Layout;

/// Equation of state. Gamma-law adiabatic or isothermal, per §6.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Eos {
    Adiabatic { gamma: f64 },
    Isothermal { sound_speed_squared: f64 },
}

impl Eos {
    pub fn is_adiabatic(&self) -> bool {
        matches!(self, Eos::Adiabatic { .. })
    }
}

/// Reconstruction order, per §6. Order 3 is accepted but falls back to the
/// order-2 stencil: PPM reconstruction itself is out of scope (§1), so a
/// parabolic request still gets the monotonised linear profile of §4.3.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionOrder {
    Constant,
    Linear,
    Parabolic,
}

impl ReconstructionOrder {
    /// Stencil radius `s` of §4.4's "Loop bounds": 1 for first order, 2 for
    /// second and (as implemented) third order.
    pub fn stencil_radius(&self) -> usize {
        match self {
            ReconstructionOrder::Constant => 1,
            ReconstructionOrder::Linear => 2,
            ReconstructionOrder::Parabolic => 2,
        }
    }
}

/// Full configuration for one [`crate::integrator::Integrator`] instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub eos: Eos,

    /// Whether the magnetic field and the constrained-transport machinery
    /// are active (§6).
    pub mhd: bool,

    pub reconstruction: ReconstructionOrder,

    /// Sanders-Morano-Druguet wave-fan broadening (§4.2, §C2). Mutually
    /// exclusive with `first_order_flux_correction` (§4.6).
    pub h_correction: bool,

    /// The fallback of §4.6.
    pub first_order_flux_correction: bool,

    /// Number of passively advected mass-scaled scalars, `NSCALARS >= 0`.
    pub n_scalars: usize,

    /// `epsilon_P` of §4.1.
    #[serde(default = "Config::default_pressure_floor")]
    pub pressure_floor: f64,

    pub cfl_number: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            eos: Eos::Adiabatic { gamma: 5.0 / 3.0 },
            mhd: true,
            reconstruction: ReconstructionOrder::Linear,
            h_correction: false,
            first_order_flux_correction: true,
            n_scalars: 0,
            pressure_floor: Config::default_pressure_floor(),
            cfl_number: 0.4,
        }
    }
}

impl Config {
    fn default_pressure_floor() -> f64 {
        1e-10
    }

    pub fn layout(&self) -> Layout {
        Layout {
            mhd: self.mhd,
            adiabatic: self.eos.is_adiabatic(),
            n_scalars: self.n_scalars,
        }
    }

    pub fn gamma(&self) -> f64 {
        match self.eos {
            Eos::Adiabatic { gamma } => gamma,
            Eos::Isothermal { .. } => panic!("gamma is undefined for an isothermal equation of state"),
        }
    }

    pub fn sound_speed_squared(&self) -> f64 {
        match self.eos {
            Eos::Isothermal { sound_speed_squared } => sound_speed_squared,
            Eos::Adiabatic { .. } => panic!("a constant sound speed is undefined for an adiabatic equation of state"),
        }
    }

    /// Minimum ghost-zone count this configuration requires, per §4.4's
    /// "Loop bounds": stencil radius, plus one more if H-correction is
    /// enabled, plus one more if the first-order flux correction is
    /// enabled.
    pub fn required_ghost_zones(&self) -> usize {
        self.reconstruction.stencil_radius()
            + 1
            + (self.h_correction as usize)
            + (self.first_order_flux_correction as usize)
    }

    /// Validates everything that can be checked without reference to a
    /// particular grid block. Ghost-zone sufficiency is checked separately
    /// by [`crate::integrator::Integrator::new`], which additionally knows
    /// the caller's `nghost`.
    pub fn validate(&self) -> Result<(), IntegratorError> {
        if self.h_correction && self.first_order_flux_correction {
            return Err(IntegratorError::IncompatibleCorrections);
        }
        if let Eos::Adiabatic { gamma } = self.eos {
            if !(gamma > 1.0) {
                return Err(IntegratorError::InvalidGamma(gamma));
            }
        }
        if !(self.pressure_floor > 0.0) {
            return Err(IntegratorError::InvalidPressureFloor(self.pressure_floor));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_h_correction_with_first_order_flux_correction() {
        let mut config = Config { h_correction: true, first_order_flux_correction: true, ..Config::default() };
        assert!(matches!(config.validate(), Err(IntegratorError::IncompatibleCorrections)));
        config.first_order_flux_correction = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_gamma() {
        let config = Config { eos: Eos::Adiabatic { gamma: 1.0 }, ..Config::default() };
        assert!(matches!(config.validate(), Err(IntegratorError::InvalidGamma(_))));
    }

    #[test]
    fn required_ghost_zones_grows_with_features() {
        let mut config = Config { reconstruction: ReconstructionOrder::Constant, h_correction: false, first_order_flux_correction: false, ..Config::default() };
        assert_eq!(config.required_ghost_zones(), 2);
        config.first_order_flux_correction = true;
        assert_eq!(config.required_ghost_zones(), 3);
    }
}
