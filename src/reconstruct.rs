//! Piecewise reconstruction of interface states from cell-centred primitive
//! variables (§4.3).
//!
//! Grounded in `lr_states_plm.c`: centred/one-sided/van-Leer differences are
//! formed in primitive space, projected onto the local characteristic
//! basis, limited there, projected back, clamped into the neighbouring
//! cells' range, then integrated over the domain of dependence using the
//! fastest outgoing eigenvalues. The original's Step 9 wave-subtraction
//! (dropping the waves that do not reach the interface within `dt`) is
//! omitted, as called for by the unsplit van Leer integrator this crate
//! implements (§4.3 step 6).

use crate::config::{Config, ReconstructionOrder};
use crate::eigensystem::eigensystem;
use crate::vector::{Layout, Vector};

/// The two edge-extrapolated primitive states bounding one cell: `left` sits
/// at the cell's lower-coordinate edge, `right` at its upper-coordinate
/// edge. For piecewise-constant reconstruction both equal the cell average.
pub struct CellEdges {
    pub left: Vector,
    pub right: Vector,
}

fn minmod_harmonic(dl: f64, dr: f64) -> f64 {
    if dl * dr <= 0.0 {
        0.0
    } else {
        2.0 * dl * dr / (dl + dr)
    }
}

fn dot_lem(row: &[f64], v: &[f64], nwave: usize) -> f64 {
    (0..nwave).map(|k| row[k] * v[k]).sum()
}

/// Piecewise-linear reconstruction of the primitive state in cell `i`, given
/// its two neighbors, the cell-centred normal field at `i` (ignored for
/// hydro), and `dt_over_dx` for the domain-of-dependence integration of
/// step 5. Returns the edge-extrapolated states of that one cell.
pub fn reconstruct_cell_plm(config: &Config, layout: &Layout, w_im1: &Vector, w_i: &Vector, w_ip1: &Vector, bx: f64, dt_over_dx: f64) -> CellEdges {
    let sys = eigensystem(config, layout, w_i, bx);
    let n = layout.len();

    // Step 2: centred, left, right, and van-Leer primitive differences. The
    // van-Leer term is the harmonic mean of the one-sided differences,
    // formed here in primitive space -- projecting it onto characteristics
    // would not commute with its nonlinearity.
    let dwc: Vec<f64> = (0..n).map(|k| 0.5 * (w_ip1[k] - w_im1[k])).collect();
    let dwl: Vec<f64> = (0..n).map(|k| w_i[k] - w_im1[k]).collect();
    let dwr: Vec<f64> = (0..n).map(|k| w_ip1[k] - w_i[k]).collect();
    let dwg: Vec<f64> = (0..n).map(|k| minmod_harmonic(dwl[k], dwr[k])).collect();

    // lem/rem only span the NWAVE hydrodynamic/magnetic slots; passive
    // scalars are advected untouched by the characteristic projection and
    // limited componentwise below instead.
    let nwave = layout.nwave();
    let mut dam = vec![0.0; nwave];
    for wv in 0..nwave {
        let dac = dot_lem(&sys.lem[wv], &dwc, nwave);
        let dal = dot_lem(&sys.lem[wv], &dwl, nwave);
        let dar = dot_lem(&sys.lem[wv], &dwr, nwave);
        let dag = dot_lem(&sys.lem[wv], &dwg, nwave);
        // Step 3: monotonise each characteristic component.
        dam[wv] = if dal * dar <= 0.0 {
            0.0
        } else {
            let bound = (2.0 * dal.abs().min(dar.abs())).min(0.5 * dac.abs()).min(dag.abs());
            bound.copysign(dac)
        };
    }

    // Step 4: project the limited increments back to primitives.
    let mut dwm = vec![0.0; n];
    for wv in 0..nwave {
        for k in 0..nwave {
            dwm[k] += dam[wv] * sys.rem[k][wv];
        }
    }
    for k in layout.scalar_range() {
        dwm[k] = minmod_harmonic(dwl[k], dwr[k]);
    }

    let mut left = layout.zeros();
    let mut right = layout.zeros();
    for k in 0..n {
        left[k] = w_i[k] - 0.5 * dwm[k];
        right[k] = w_i[k] + 0.5 * dwm[k];
        // Monotone safety net: clamp each edge into its bounding cells'
        // range, regardless of what the characteristic limiter allowed.
        let (lo_l, hi_l) = (w_im1[k].min(w_i[k]), w_im1[k].max(w_i[k]));
        left[k] = left[k].clamp(lo_l, hi_l);
        let (lo_r, hi_r) = (w_i[k].min(w_ip1[k]), w_i[k].max(w_ip1[k]));
        right[k] = right[k].clamp(lo_r, hi_r);
    }
    left[Layout::IDX_D] = left[Layout::IDX_D].max(config.pressure_floor);
    right[Layout::IDX_D] = right[Layout::IDX_D].max(config.pressure_floor);
    if let Some(id) = layout.idx_e() {
        left[id] = left[id].max(config.pressure_floor);
        right[id] = right[id].max(config.pressure_floor);
    }

    // Step 5: integrate the linear profile over the domain of dependence
    // using the fastest outgoing characteristic speeds.
    let lam_max = sys.ev[sys.ev.len() - 1].max(0.0);
    let lam_min = (-sys.ev[0]).max(0.0);
    let mut pwl = layout.zeros();
    let mut pwr = layout.zeros();
    for k in 0..n {
        let dw = right[k] - left[k];
        pwl[k] = right[k] - 0.5 * lam_max * dt_over_dx * dw;
        pwr[k] = left[k] + 0.5 * lam_min * dt_over_dx * dw;
    }

    CellEdges { left: pwr, right: pwl }
}

/// Piecewise-constant reconstruction: both edges equal the cell average.
pub fn reconstruct_cell_constant(w_i: &Vector) -> CellEdges {
    CellEdges { left: w_i.clone(), right: w_i.clone() }
}

/// Dispatches on [`ReconstructionOrder`], per §6 (order 3 falls back to the
/// order-2 stencil, see [`ReconstructionOrder::stencil_radius`]).
/// `dt_over_dx` is ignored by the constant-reconstruction branch.
pub fn reconstruct_cell(config: &Config, layout: &Layout, order: ReconstructionOrder, w_im1: &Vector, w_i: &Vector, w_ip1: &Vector, bx: f64, dt_over_dx: f64) -> CellEdges {
    match order {
        ReconstructionOrder::Constant => reconstruct_cell_constant(w_i),
        ReconstructionOrder::Linear | ReconstructionOrder::Parabolic => reconstruct_cell_plm(config, layout, w_im1, w_i, w_ip1, bx, dt_over_dx),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Eos;

    #[test]
    fn constant_reconstruction_is_cell_average_at_both_edges() {
        let w = Vector::from_slice(&[1.0, 0.1, 0.0, 0.0, 1.0]);
        let edges = reconstruct_cell_constant(&w);
        assert_eq!(edges.left, w);
        assert_eq!(edges.right, w);
    }

    #[test]
    fn plm_reduces_to_cell_average_on_uniform_state() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let w = Vector::from_slice(&[1.0, 0.2, 0.0, 0.0, 1.0]);
        let edges = reconstruct_cell_plm(&config, &layout, &w, &w, &w, 0.0, 0.1);
        for k in 0..layout.len() {
            assert!((edges.left[k] - w[k]).abs() < 1e-12);
            assert!((edges.right[k] - w[k]).abs() < 1e-12);
        }
    }

    #[test]
    fn plm_does_not_overshoot_a_local_extremum() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let lo = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0]);
        let hi = Vector::from_slice(&[2.0, 0.0, 0.0, 0.0, 1.0]);
        // cell i is a local maximum in density: the limiter must flatten it.
        // dt_over_dx = 0 isolates the limiter from the domain-of-dependence
        // integration, which would otherwise move the already-flat edges.
        let edges = reconstruct_cell_plm(&config, &layout, &lo, &hi, &lo, 0.0, 0.0);
        assert!((edges.left[Layout::IDX_D] - hi[Layout::IDX_D]).abs() < 1e-12);
        assert!((edges.right[Layout::IDX_D] - hi[Layout::IDX_D]).abs() < 1e-12);
    }

    #[test]
    fn plm_keeps_scalars_between_neighboring_values() {
        let config = Config { mhd: false, n_scalars: 1, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let w_im1 = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let w_i = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.5]);
        let w_ip1 = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        let edges = reconstruct_cell_plm(&config, &layout, &w_im1, &w_i, &w_ip1, 0.0, 0.0);
        let s = layout.idx_scalar(0);
        assert!(edges.left[s] <= 0.5 && edges.left[s] >= 0.0);
        assert!(edges.right[s] >= 0.5 && edges.right[s] <= 1.0);
    }

    #[test]
    fn domain_of_dependence_integration_biases_toward_the_upwind_edge() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, ..Config::default() };
        let layout = config.layout();
        let w_im1 = Vector::from_slice(&[1.0, 0.3, 0.0, 0.0, 1.0]);
        let w_i = Vector::from_slice(&[1.2, 0.3, 0.0, 0.0, 1.0]);
        let w_ip1 = Vector::from_slice(&[1.4, 0.3, 0.0, 0.0, 1.0]);
        let plain = reconstruct_cell_plm(&config, &layout, &w_im1, &w_i, &w_ip1, 0.0, 0.0);
        let integrated = reconstruct_cell_plm(&config, &layout, &w_im1, &w_i, &w_ip1, 0.0, 0.5);
        assert!((integrated.left[Layout::IDX_D] - plain.left[Layout::IDX_D]).abs() > 1e-6);
        assert!((integrated.right[Layout::IDX_D] - plain.right[Layout::IDX_D]).abs() > 1e-6);
    }
}
