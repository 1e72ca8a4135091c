//! The pluggable Riemann flux contract of §4.2, plus a concrete HLL solver.
//!
//! `newtonian_hydro.rs`'s `Hydrodynamics::intercell_flux` establishes the
//! shape this crate follows: a trait object that turns two bounding states
//! into a numerical flux, with the wave-speed estimate itself swappable.
//! The HLL implementation is the MHD generalization of the same two-wave
//! bracket `hydro_euler::euler_2d::riemann_hlle_scalar` uses, substituting
//! the fast magnetosonic speed for the sound speed (§4.2a).

use crate::config::Config;
use crate::eos::{cons_from_prim, fast_speed};
use crate::vector::{Layout, Vector};

/// The flux of the conserved variables, plus the two EMF components the
/// corner-EMF assembler needs (§4.2's "Output").
///
/// `flux[idx_by()]`/`flux[idx_bz()]` are each (up to a sign) an estimate of
/// one of the two EMF components transverse to this sweep's direction.
/// `emf_a = flux[idx_by()]` is the "+" contributor to the next cyclic EMF
/// component (x1 sweep -> EMF3, x2 -> EMF1, x3 -> EMF2); `emf_b =
/// -flux[idx_bz()]` is the "+" contributor to the previous cyclic one (x1
/// -> EMF2, x2 -> EMF3, x3 -> EMF1). Every EMF component ends up averaged
/// from exactly the two sweep directions transverse to it, per §4.2's "MHD
/// additions".
pub struct RiemannResult {
    pub flux: Vector,
    pub emf_a: f64,
    pub emf_b: f64,
}

/// A Riemann solver maps a left/right primitive pair (plus the shared
/// normal field) to an intercell flux. Implementations are free to use the
/// conserved states internally; the primitive pair is what reconstruction
/// naturally produces.
///
/// `eta_h` is the H-correction wave-fan broadening of §4.4 step C2, passed
/// through from the integrator; callers that do not implement H-correction
/// pass `0.0`.
pub trait RiemannSolver {
    fn solve(&self, config: &Config, layout: &Layout, wl: &Vector, wr: &Vector, bx: f64, eta_h: f64) -> RiemannResult;
}

fn flux_from_conserved(layout: &Layout, u: &Vector, w: &Vector, bx: f64) -> Vector {
    let mut f = layout.zeros();
    let vx = w[Layout::IDX_MX];
    f[Layout::IDX_D] = u[Layout::IDX_MX];
    f[Layout::IDX_MX] = u[Layout::IDX_MX] * vx + w.idx_pressure_term(layout);
    f[Layout::IDX_MY] = u[Layout::IDX_MY] * vx;
    f[Layout::IDX_MZ] = u[Layout::IDX_MZ] * vx;

    if let (Some(iby), Some(ibz)) = (layout.idx_by(), layout.idx_bz()) {
        let by = u[iby];
        let bz = u[ibz];
        let pb = 0.5 * (bx * bx + by * by + bz * bz);
        f[Layout::IDX_MX] += pb - bx * bx;
        f[Layout::IDX_MY] += -bx * by;
        f[Layout::IDX_MZ] += -bx * bz;
        f[iby] = vx * by - bx * w[Layout::IDX_MY];
        f[ibz] = vx * bz - bx * w[Layout::IDX_MZ];
        if let Some(ie) = layout.idx_e() {
            let vb = w[Layout::IDX_MX] * bx + w[Layout::IDX_MY] * by + w[Layout::IDX_MZ] * bz;
            f[ie] = (u[ie] + w.idx_pressure_term(layout) + pb) * vx - bx * vb;
        }
    } else if let Some(ie) = layout.idx_e() {
        f[ie] = (u[ie] + w.idx_pressure_term(layout)) * vx;
    }

    for n in layout.scalar_range() {
        f[n] = u[n] * vx;
    }
    f
}

/// Thermal + magnetic pressure, pulled out as a helper since both the flux
/// and the fast speed need it and `Vector` carries no physics of its own.
trait PressureTerm {
    fn idx_pressure_term(&self, layout: &Layout) -> f64;
}

impl PressureTerm for Vector {
    fn idx_pressure_term(&self, layout: &Layout) -> f64 {
        match layout.idx_e() {
            Some(ie) => self[ie],
            None => 0.0, // isothermal: pressure is folded into the fast speed, not carried in W.
        }
    }
}

/// The two-wave HLL solver of §4.2a: `S_L = min(vx_l - cf_l, vx_r - cf_r)`,
/// `S_R = max(vx_l + cf_l, vx_r + cf_r)`, classic HLL average/blend
/// otherwise. `eta_h` broadens the bracket by `∓eta_h` to suppress the
/// carbuncle instability when H-correction is enabled.
pub struct Hll;

impl RiemannSolver for Hll {
    fn solve(&self, config: &Config, layout: &Layout, wl: &Vector, wr: &Vector, bx: f64, eta_h: f64) -> RiemannResult {
        let ul = cons_from_prim(config, layout, wl);
        let ur = cons_from_prim(config, layout, wr);

        let cfl = fast_speed(config, layout, &ul, bx);
        let cfr = fast_speed(config, layout, &ur, bx);
        let sl = (wl[Layout::IDX_MX] - cfl).min(wr[Layout::IDX_MX] - cfr) - eta_h;
        let sr = (wl[Layout::IDX_MX] + cfl).max(wr[Layout::IDX_MX] + cfr) + eta_h;

        let fl = flux_from_conserved(layout, &ul, wl, bx);
        let fr = flux_from_conserved(layout, &ur, wr, bx);

        let flux = if sl >= 0.0 {
            fl
        } else if sr <= 0.0 {
            fr
        } else {
            let mut f = layout.zeros();
            for k in 0..layout.len() {
                f[k] = (sr * fl[k] - sl * fr[k] + sl * sr * (ur[k] - ul[k])) / (sr - sl);
            }
            f
        };

        let (emf_a, emf_b) = match (layout.idx_by(), layout.idx_bz()) {
            (Some(iby), Some(ibz)) => (flux[iby], -flux[ibz]),
            _ => (0.0, 0.0),
        };

        RiemannResult { flux, emf_a, emf_b }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Eos;

    #[test]
    fn consistent_state_gives_the_exact_flux() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let w = Vector::from_slice(&[1.0, 0.3, 0.0, 0.0, 1.0]);
        let result = Hll.solve(&config, &layout, &w, &w, 0.0, 0.0);
        let u = cons_from_prim(&config, &layout, &w);
        let expect = flux_from_conserved(&layout, &u, &w, 0.0);
        for k in 0..layout.len() {
            assert!((result.flux[k] - expect[k]).abs() < 1e-12);
        }
    }

    #[test]
    fn supersonic_flow_gives_the_upwind_flux() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let wl = Vector::from_slice(&[1.0, 5.0, 0.0, 0.0, 1.0]);
        let wr = Vector::from_slice(&[0.125, 5.0, 0.0, 0.0, 0.1]);
        let result = Hll.solve(&config, &layout, &wl, &wr, 0.0, 0.0);
        let ul = cons_from_prim(&config, &layout, &wl);
        let expect = flux_from_conserved(&layout, &ul, &wl, 0.0);
        for k in 0..layout.len() {
            assert!((result.flux[k] - expect[k]).abs() < 1e-10);
        }
    }

    #[test]
    fn mhd_emf_components_match_flux_signs() {
        let config = Config { mhd: true, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let wl = Vector::from_slice(&[1.0, 0.1, 0.0, 0.0, 1.0, 0.5, 0.0]);
        let wr = Vector::from_slice(&[0.8, -0.1, 0.0, 0.0, 0.9, 0.6, 0.0]);
        let result = Hll.solve(&config, &layout, &wl, &wr, 0.3, 0.0);
        assert!((result.emf_a - result.flux[layout.idx_by().unwrap()]).abs() < 1e-12);
        assert!((result.emf_b + result.flux[layout.idx_bz().unwrap()]).abs() < 1e-12);
    }

    #[test]
    fn eta_h_broadens_supersonic_flow_into_the_blended_branch() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let wl = Vector::from_slice(&[1.0, 5.0, 0.0, 0.0, 1.0]);
        let wr = Vector::from_slice(&[1.0, 5.0, 0.0, 0.0, 1.0]);
        let u = cons_from_prim(&config, &layout, &wl);
        let upwind = flux_from_conserved(&layout, &u, &wl, 0.0);

        let plain = Hll.solve(&config, &layout, &wl, &wr, 0.0, 0.0);
        for k in 0..layout.len() {
            assert!((plain.flux[k] - upwind[k]).abs() < 1e-12, "unbroadened supersonic flow should give the upwind flux");
        }

        // A large enough eta_h pushes S_L below zero even though the flow
        // is supersonic, forcing the blended branch.
        let broadened = Hll.solve(&config, &layout, &wl, &wr, 0.0, 5.0);
        assert!((broadened.flux[Layout::IDX_D] - upwind[Layout::IDX_D]).abs() < 1e-12, "identical states either side should still give a stationary flux");
    }
}
