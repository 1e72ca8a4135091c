//! Eigenvalues and left/right eigenvectors of the primitive-variable
//! Jacobian, for each of the four equation-set combinations named in §4.3a.
//!
//! The original source dispatches this by preprocessor macro
//! (`esys_prim_{iso,adb}_{hyd,mhd}`, called from `lr_states_plm.c`); here
//! [`eigensystem`] takes the same role but keyed off [`Layout`] at
//! runtime. The right eigenvectors are assembled from the standard
//! fast/Alfven/slow/entropy decomposition (Roe & Balsara's normal-mode
//! parametrization, the same one `integrate_3d_vl.c`'s header attributes to
//! Stone & Gardiner); the left eigenvectors are recovered by inverting that
//! matrix rather than re-deriving a second closed form, which guarantees
//! `lem * rem = I` exactly regardless of any normalization slip in the
//! right-eigenvector formulas.

use crate::config::Config;
use crate::vector::{Layout, Vector};

/// `ev[n]` is the n-th eigenvalue; `rem[n]` is the n-th right eigenvector
/// (as a length-`NWAVE` column); `lem[n]` is the n-th left eigenvector (as
/// a length-`NWAVE` row). `lem[n] . rem[m] = delta(n, m)`.
pub struct Eigensystem {
    pub ev: Vec<f64>,
    pub rem: Vec<Vec<f64>>,
    pub lem: Vec<Vec<f64>>,
}

fn invert(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n).map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect()).collect();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| a[r1][col].abs().partial_cmp(&a[r2][col].abs()).unwrap()).unwrap();
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        debug_assert!(pivot.abs() > 1e-300, "eigenvector matrix is singular");
        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    inv
}

/// Left-eigenvector rows are the rows of `rem`'s inverse.
fn left_from_right(rem: &[Vec<f64>]) -> Vec<Vec<f64>> {
    invert(rem)
}

fn hydro_adiabatic(d: f64, vx: f64, a2: f64) -> Eigensystem {
    let a = a2.sqrt();
    let ev = vec![vx - a, vx, vx, vx, vx + a];
    let rem = vec![
        vec![d, -a, 0.0, 0.0, d * a2],
        vec![1.0, 0.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 1.0, 0.0],
        vec![d, a, 0.0, 0.0, d * a2],
    ];
    let lem = left_from_right(&rem);
    Eigensystem { ev, rem, lem }
}

fn hydro_isothermal(d: f64, vx: f64, a2: f64) -> Eigensystem {
    let a = a2.sqrt();
    let ev = vec![vx - a, vx, vx, vx + a];
    let rem = vec![
        vec![d, -a, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0],
        vec![0.0, 0.0, 0.0, 1.0],
        vec![d, a, 0.0, 0.0],
    ];
    let lem = left_from_right(&rem);
    Eigensystem { ev, rem, lem }
}

/// Shared fast/slow/Alfven parametrization for the two MHD equation sets.
struct MhdWaveSpeeds {
    cf: f64,
    cs: f64,
    ca: f64,
    alpha_f: f64,
    alpha_s: f64,
    betay: f64,
    betaz: f64,
    sgn_bx: f64,
}

fn mhd_wave_speeds(d: f64, a2: f64, bx: f64, by: f64, bz: f64) -> MhdWaveSpeeds {
    let bt2 = by * by + bz * bz;
    let bt = bt2.sqrt();
    let (betay, betaz) = if bt > 1e-14 { (by / bt, bz / bt) } else { (std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2) };

    let bx2 = bx * bx / d;
    let bt2_over_d = bt2 / d;
    let sum = a2 + bx2 + bt2_over_d;
    let disc = (sum * sum - 4.0 * a2 * bx2).max(0.0).sqrt();
    let cf2 = 0.5 * (sum + disc);
    let cs2 = (0.5 * (sum - disc)).max(0.0);

    let denom = cf2 - cs2;
    let (alpha_f, alpha_s) = if denom > 1e-14 * cf2.max(1e-300) {
        (((a2 - cs2).max(0.0) / denom).sqrt(), ((cf2 - a2).max(0.0) / denom).sqrt())
    } else if bx2 >= a2 {
        (0.0, 1.0)
    } else {
        (1.0, 0.0)
    };

    MhdWaveSpeeds {
        cf: cf2.sqrt(),
        cs: cs2.sqrt(),
        ca: bx2.sqrt(),
        alpha_f,
        alpha_s,
        betay,
        betaz,
        sgn_bx: if bx >= 0.0 { 1.0 } else { -1.0 },
    }
}

fn mhd_adiabatic(d: f64, vx: f64, a2: f64, bx: f64, by: f64, bz: f64) -> Eigensystem {
    let s = mhd_wave_speeds(d, a2, bx, by, bz);
    let a = a2.sqrt();
    let sd = d.sqrt();
    let (af, as_, by_, bz_, sb) = (s.alpha_f, s.alpha_s, s.betay, s.betaz, s.sgn_bx);

    let ev = vec![vx - s.cf, vx - s.ca, vx - s.cs, vx, vx + s.cs, vx + s.ca, vx + s.cf];
    let rem = vec![
        vec![d * af, -s.cf * af, sb * s.cs * as_ * by_, sb * s.cs * as_ * bz_, d * a2 * af, sd * a * as_ * by_, sd * a * as_ * bz_],
        vec![0.0, 0.0, -bz_, by_, 0.0, -sb * sd * bz_, sb * sd * by_],
        vec![d * as_, -s.cs * as_, -sb * s.cf * af * by_, -sb * s.cf * af * bz_, d * a2 * as_, -sd * a * af * by_, -sd * a * af * bz_],
        vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        vec![d * as_, s.cs * as_, sb * s.cf * af * by_, sb * s.cf * af * bz_, d * a2 * as_, -sd * a * af * by_, -sd * a * af * bz_],
        vec![0.0, 0.0, bz_, -by_, 0.0, -sb * sd * bz_, sb * sd * by_],
        vec![d * af, s.cf * af, -sb * s.cs * as_ * by_, -sb * s.cs * as_ * bz_, d * a2 * af, sd * a * as_ * by_, sd * a * as_ * bz_],
    ];
    let lem = left_from_right(&rem);
    Eigensystem { ev, rem, lem }
}

fn mhd_isothermal(d: f64, vx: f64, a2: f64, bx: f64, by: f64, bz: f64) -> Eigensystem {
    let s = mhd_wave_speeds(d, a2, bx, by, bz);
    let a = a2.sqrt();
    let sd = d.sqrt();
    let (af, as_, by_, bz_, sb) = (s.alpha_f, s.alpha_s, s.betay, s.betaz, s.sgn_bx);

    let ev = vec![vx - s.cf, vx - s.ca, vx - s.cs, vx + s.cs, vx + s.ca, vx + s.cf];
    let rem = vec![
        vec![d * af, -s.cf * af, sb * s.cs * as_ * by_, sb * s.cs * as_ * bz_, sd * a * as_ * by_, sd * a * as_ * bz_],
        vec![0.0, 0.0, -bz_, by_, -sb * sd * bz_, sb * sd * by_],
        vec![d * as_, -s.cs * as_, -sb * s.cf * af * by_, -sb * s.cf * af * bz_, -sd * a * af * by_, -sd * a * af * bz_],
        vec![d * as_, s.cs * as_, sb * s.cf * af * by_, sb * s.cf * af * bz_, -sd * a * af * by_, -sd * a * af * bz_],
        vec![0.0, 0.0, bz_, -by_, -sb * sd * bz_, sb * sd * by_],
        vec![d * af, s.cf * af, -sb * s.cs * as_ * by_, -sb * s.cs * as_ * bz_, sd * a * as_ * by_, sd * a * as_ * bz_],
    ];
    let lem = left_from_right(&rem);
    Eigensystem { ev, rem, lem }
}

/// Computes the eigensystem of the primitive Jacobian at primitive state
/// `w`, given the interface-normal field `bx` (ignored for hydro).
pub fn eigensystem(config: &Config, layout: &Layout, w: &Vector, bx: f64) -> Eigensystem {
    let d = w[Layout::IDX_D];
    let vx = w[Layout::IDX_MX];
    let a2 = match config.eos {
        crate::config::Eos::Isothermal { sound_speed_squared } => sound_speed_squared,
        crate::config::Eos::Adiabatic { gamma } => gamma * w[layout.idx_e().unwrap()] / d,
    };

    match (layout.mhd, layout.adiabatic) {
        (false, true) => hydro_adiabatic(d, vx, a2),
        (false, false) => hydro_isothermal(d, vx, a2),
        (true, true) => mhd_adiabatic(d, vx, a2, bx, w[layout.idx_by().unwrap()], w[layout.idx_bz().unwrap()]),
        (true, false) => mhd_isothermal(d, vx, a2, bx, w[layout.idx_by().unwrap()], w[layout.idx_bz().unwrap()]),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn identity_error(rem: &[Vec<f64>], lem: &[Vec<f64>]) -> f64 {
        let n = rem.len();
        let mut max_err: f64 = 0.0;
        for i in 0..n {
            for j in 0..n {
                let mut dot = 0.0;
                for k in 0..n {
                    dot += lem[i][k] * rem[k][j];
                }
                let expect = if i == j { 1.0 } else { 0.0 };
                max_err = max_err.max((dot - expect).abs());
            }
        }
        max_err
    }

    #[test]
    fn hydro_adiabatic_is_biorthogonal() {
        let sys = hydro_adiabatic(1.0, 0.3, 1.4);
        assert!(identity_error(&sys.rem, &sys.lem) < 1e-10);
    }

    #[test]
    fn mhd_adiabatic_is_biorthogonal() {
        let sys = mhd_adiabatic(1.0, 0.1, 1.0, 0.75, 1.0, -0.3);
        assert!(identity_error(&sys.rem, &sys.lem) < 1e-8);
    }

    #[test]
    fn mhd_isothermal_is_biorthogonal_with_weak_transverse_field() {
        let sys = mhd_isothermal(0.8, -0.2, 1.0, 0.5, 1e-8, 1e-8);
        assert!(identity_error(&sys.rem, &sys.lem) < 1e-6);
    }

    #[test]
    fn fast_speed_bounds_eigenvalue_spread() {
        let sys = mhd_adiabatic(1.0, 0.0, 1.0, 0.75, 1.0, -1.0);
        let cf = sys.ev.iter().cloned().fold(f64::MIN, f64::max);
        assert!(cf > 0.0);
        assert!((sys.ev[6] - cf).abs() < 1e-12);
    }
}
