//! Primitive/conservative conversion and the fast magnetosonic speed (§4.1).
//!
//! Grounded in `convert_var.c`'s `Cons_to_Prim`/`Prim_to_Cons`/`cfast`, with
//! the compile-time `#ifdef MHD`/`#ifdef ISOTHERMAL` branches of the
//! original replaced by runtime checks against [`Layout`]/[`Config`], since
//! those are this crate's runtime-configurable equivalent of the original's
//! preprocessor toggles (§3a).

use crate::config::{Config, Eos};
use crate::vector::{Layout, Vector};

/// Converts a conserved [`Vector`] to primitive variables. Never fails: the
/// pressure floor `epsilon_P` is applied in place of a negative or zero
/// pressure and the number of times it fired is returned, so callers can
/// assert "no flooring occurred" without scraping logs (§4.1a).
pub fn prim_from_cons(config: &Config, layout: &Layout, u: &Vector) -> (Vector, bool) {
    let mut w = layout.zeros();
    let d = u[Layout::IDX_D];
    let di = 1.0 / d;

    w[Layout::IDX_D] = d;
    w[Layout::IDX_MX] = u[Layout::IDX_MX] * di;
    w[Layout::IDX_MY] = u[Layout::IDX_MY] * di;
    w[Layout::IDX_MZ] = u[Layout::IDX_MZ] * di;

    let mut floored = false;
    if let Some(ie) = layout.idx_e() {
        let kinetic = 0.5 * (u[Layout::IDX_MX].powi(2) + u[Layout::IDX_MY].powi(2) + u[Layout::IDX_MZ].powi(2)) * di;
        let magnetic = match (layout.idx_by(), layout.idx_bz()) {
            (Some(iby), Some(ibz)) => 0.5 * (u[iby].powi(2) + u[ibz].powi(2)),
            _ => 0.0,
        };
        let mut p = (config.gamma() - 1.0) * (u[ie] - kinetic - magnetic);
        if p < config.pressure_floor {
            p = config.pressure_floor;
            floored = true;
        }
        w[ie] = p;
    }

    if let (Some(iby), Some(ibz)) = (layout.idx_by(), layout.idx_bz()) {
        w[iby] = u[iby];
        w[ibz] = u[ibz];
    }

    for n in layout.scalar_range() {
        w[n] = u[n] * di;
    }

    (w, floored)
}

/// Converts a primitive [`Vector`] to conservative variables; the exact
/// inverse of [`prim_from_cons`] on inputs with `rho > 0, P > 0`.
pub fn cons_from_prim(config: &Config, layout: &Layout, w: &Vector) -> Vector {
    let mut u = layout.zeros();
    let d = w[Layout::IDX_D];

    u[Layout::IDX_D] = d;
    u[Layout::IDX_MX] = w[Layout::IDX_MX] * d;
    u[Layout::IDX_MY] = w[Layout::IDX_MY] * d;
    u[Layout::IDX_MZ] = w[Layout::IDX_MZ] * d;

    if let Some(ie) = layout.idx_e() {
        let kinetic = 0.5 * d * (w[Layout::IDX_MX].powi(2) + w[Layout::IDX_MY].powi(2) + w[Layout::IDX_MZ].powi(2));
        let magnetic = match (layout.idx_by(), layout.idx_bz()) {
            (Some(iby), Some(ibz)) => 0.5 * (w[iby].powi(2) + w[ibz].powi(2)),
            _ => 0.0,
        };
        u[ie] = w[ie] / (config.gamma() - 1.0) + kinetic + magnetic;
    }

    if let (Some(iby), Some(ibz)) = (layout.idx_by(), layout.idx_bz()) {
        u[iby] = w[iby];
        u[ibz] = w[ibz];
    }

    for n in layout.scalar_range() {
        u[n] = w[n] * d;
    }

    u
}

/// Fast magnetosonic speed, given the conserved state and the interface
/// normal field `bx` (absent/ignored for pure hydro). Accepts the
/// conserved vector directly (rather than primitives) to match the call
/// sites in reconstruction and the H-correction, which both already have
/// `U` at hand; `bx` must be supplied separately because the sweep-local
/// vector never carries the normal B component (§3).
pub fn fast_speed(config: &Config, layout: &Layout, u: &Vector, bx: f64) -> f64 {
    let d = u[Layout::IDX_D];
    let a_sq = match config.eos {
        Eos::Isothermal { sound_speed_squared } => sound_speed_squared,
        Eos::Adiabatic { gamma } => {
            let pb = match (layout.idx_by(), layout.idx_bz()) {
                (Some(iby), Some(ibz)) if layout.mhd => 0.5 * (bx * bx + u[iby].powi(2) + u[ibz].powi(2)),
                _ => 0.0,
            };
            let kinetic = 0.5 * (u[Layout::IDX_MX].powi(2) + u[Layout::IDX_MY].powi(2) + u[Layout::IDX_MZ].powi(2)) / d;
            let ie = layout.idx_e().expect("adiabatic layout always carries an energy slot");
            let p = (gamma - 1.0) * (u[ie] - pb - kinetic);
            gamma * p.max(config.pressure_floor) / d
        }
    };

    if !layout.mhd {
        return a_sq.sqrt();
    }

    let (iby, ibz) = (layout.idx_by().unwrap(), layout.idx_bz().unwrap());
    let ct_sq = (u[iby].powi(2) + u[ibz].powi(2)) / d;
    let ca_sq = bx * bx / d;
    let tmp = ca_sq + ct_sq - a_sq;
    let cf_sq = 0.5 * ((a_sq + ct_sq + ca_sq) + (tmp * tmp + 4.0 * a_sq * ct_sq).sqrt());
    cf_sq.sqrt()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn mhd_config() -> Config {
        Config { mhd: true, ..Config::default() }
    }

    #[test]
    fn prim_cons_round_trip_mhd_adiabatic() {
        let config = mhd_config();
        let layout = config.layout();
        let w = Vector::from_slice(&[1.2, 0.3, -0.1, 0.05, 2.5, 0.4, -0.2]);
        let u = cons_from_prim(&config, &layout, &w);
        let (w2, floored) = prim_from_cons(&config, &layout, &u);
        assert!(!floored);
        for i in 0..layout.len() {
            assert!((w[i] - w2[i]).abs() < 1e-12, "component {i}: {} vs {}", w[i], w2[i]);
        }
    }

    #[test]
    fn prim_cons_round_trip_hydro_isothermal() {
        let config = Config { mhd: false, eos: Eos::Isothermal { sound_speed_squared: 1.0 }, ..Config::default() };
        let layout = config.layout();
        let w = Vector::from_slice(&[0.8, 1.0, -0.5, 0.2]);
        let u = cons_from_prim(&config, &layout, &w);
        let (w2, floored) = prim_from_cons(&config, &layout, &u);
        assert!(!floored);
        for i in 0..layout.len() {
            assert!((w[i] - w2[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn pressure_floor_applies_on_negative_internal_energy() {
        let config = mhd_config();
        let layout = config.layout();
        // E far too small to support the kinetic + magnetic energy present.
        let u = Vector::from_slice(&[1.0, 5.0, 0.0, 0.0, 0.01, 0.1, 0.1]);
        let (w, floored) = prim_from_cons(&config, &layout, &u);
        assert!(floored);
        assert_eq!(w[layout.idx_e().unwrap()], config.pressure_floor);
    }

    #[test]
    fn fast_speed_reduces_to_sound_speed_without_field() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let w = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0]);
        let u = cons_from_prim(&config, &layout, &w);
        let cf = fast_speed(&config, &layout, &u, 0.0);
        assert!((cf - (1.4f64).sqrt()).abs() < 1e-12);
    }
}
