//! An unsplit 3-D van Leer predictor/corrector integrator for ideal MHD,
//! following the phase structure of `integrate_3d_vl.c` with the hydro/MHD
//! and isothermal/adiabatic toggles resolved at runtime from a [`Config`]
//! rather than by preprocessor macro.

pub mod config;
pub mod correction;
pub mod eigensystem;
pub mod emf;
pub mod eos;
pub mod error;
pub mod grid;
pub mod gravity;
pub mod integrator;
pub mod reconstruct;
pub mod riemann;
pub mod vector;
pub mod yaml_patch;

pub use config::{Config, Eos, ReconstructionOrder};
pub use error::IntegratorError;
pub use grid::{Block, Direction};
pub use gravity::{GravityPotential, NoGravity, UniformGravity};
pub use integrator::{Integrator, StepReport};
pub use riemann::{Hll, RiemannSolver};
pub use vector::{Layout, Vector};
