//! The unsplit van Leer predictor/corrector orchestration of §4.4: owns the
//! scratch pool and exposes `step(block) -> StepReport`.
//!
//! Phase structure follows `integrate_3d_vl.c`'s P0-P5/C0-C8 outline: a
//! half-step predictor built from piecewise-constant states, then a
//! full-step corrector built from limited reconstructions of the
//! *original* state, with constrained transport folded into the corrector
//! via the corner-EMF assembler of [`crate::emf`].

use ndarray::Array3;

use crate::config::Config;
use crate::correction::{faces_around, propagate_to_mhd_faces, MhdCorrectionFaces};
use crate::emf::{cell_centered_emf, corner_emf, FaceContribution};
use crate::eos::{cons_from_prim, fast_speed, prim_from_cons};
use crate::error::IntegratorError;
use crate::gravity::{GravityPotential, NoGravity};
use crate::grid::{Block, Direction};
use crate::reconstruct::reconstruct_cell;
use crate::riemann::{Hll, RiemannResult, RiemannSolver};
use crate::vector::{Layout, Vector};

/// Observability counters for one [`Integrator::step`] call (§4.1a, §4.6).
#[derive(Debug, Default, Clone, Copy)]
pub struct StepReport {
    pub pressure_floor_hits: usize,
    pub first_order_faces_corrected: usize,
    pub max_abs_div_b: f64,
    pub dt: f64,
}

/// One direction's computed face fluxes, EMF contributions, and raw
/// H-correction weights, stored on the same staggered shape as that
/// direction's face-centred B array.
#[derive(Clone)]
struct SweepFlux {
    flux: Vec<Array3<f64>>,
    emf_a: Array3<f64>,
    emf_b: Array3<f64>,
    /// `η_α[k][j][i]` of §4.4 step C2, before the 8-neighbour aggregation.
    eta: Array3<f64>,
}

/// The three corner-centred EMF arrays assembled by [`Integrator::compute_emfs`].
struct Emfs {
    emf1: Array3<f64>,
    emf2: Array3<f64>,
    emf3: Array3<f64>,
}

impl std::fmt::Debug for Integrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrator").finish_non_exhaustive()
    }
}

pub struct Integrator {
    config: Config,
    nghost: usize,
    riemann: Box<dyn RiemannSolver>,
    gravity: Box<dyn GravityPotential>,
}

impl Integrator {
    /// Validates `config` and checks that `nghost` covers
    /// [`Config::required_ghost_zones`] before any scratch array is allocated.
    pub fn new(config: Config, nghost: usize) -> Result<Self, IntegratorError> {
        config.validate()?;
        let required = config.required_ghost_zones();
        if nghost < required {
            return Err(IntegratorError::InsufficientGhostZones { required, actual: nghost });
        }
        Ok(Integrator { config, nghost, riemann: Box::new(Hll), gravity: Box::new(NoGravity) })
    }

    pub fn with_riemann_solver(mut self, riemann: impl RiemannSolver + 'static) -> Self {
        self.riemann = Box::new(riemann);
        self
    }

    pub fn with_gravity(mut self, gravity: impl GravityPotential + 'static) -> Self {
        self.gravity = Box::new(gravity);
        self
    }

    fn axis_index(direction: Direction, a: usize, t0: usize, t1: usize) -> (usize, usize, usize) {
        match direction {
            Direction::X1 => (t0, t1, a),
            Direction::X2 => (t0, a, t1),
            Direction::X3 => (a, t0, t1),
        }
    }

    fn face_array_shape(direction: Direction, total: (usize, usize, usize)) -> (usize, usize, usize) {
        let (nk, nj, ni) = total;
        match direction {
            Direction::X1 => (nk, nj, ni + 1),
            Direction::X2 => (nk, nj + 1, ni),
            Direction::X3 => (nk + 1, nj, ni),
        }
    }

    fn axis_len(direction: Direction, total: (usize, usize, usize)) -> usize {
        match direction {
            Direction::X1 => total.2,
            Direction::X2 => total.1,
            Direction::X3 => total.0,
        }
    }

    fn transverse_lens(direction: Direction, total: (usize, usize, usize)) -> (usize, usize) {
        let (nk, nj, ni) = total;
        match direction {
            Direction::X1 => (nk, nj),
            Direction::X2 => (nk, ni),
            Direction::X3 => (nj, ni),
        }
    }

    fn face_bx(block: &Block, direction: Direction, t0: usize, t1: usize, f: usize) -> f64 {
        match direction {
            Direction::X1 => block.b1i()[[t0, t1, f]],
            Direction::X2 => block.b2i()[[t0, f, t1]],
            Direction::X3 => block.b3i()[[f, t0, t1]],
        }
    }

    /// Computes the intercell flux, EMF contributions, and raw H-correction
    /// weights along `direction` for one full sweep of `block`,
    /// constant-reconstructing (predictor) or limiting (corrector)
    /// according to `use_plm`. `eta_h_field` supplies the aggregated
    /// wave-fan broadening of §4.4 step C2 (`None` for the predictor and
    /// for any sweep with H-correction disabled).
    fn sweep(&self, block: &Block, direction: Direction, use_plm: bool, dt: f64, eta_h_field: Option<&Array3<f64>>, pressure_floor_hits: &mut usize) -> SweepFlux {
        let layout = block.layout;
        let total = block.total_shape();
        let axis_len = Self::axis_len(direction, total);
        let (t0_len, t1_len) = Self::transverse_lens(direction, total);
        let face_shape = Self::face_array_shape(direction, total);
        let dt_over_dx = if use_plm { dt / block.dx(direction) } else { 0.0 };

        let mut flux: Vec<Array3<f64>> = (0..layout.len()).map(|_| Array3::zeros(face_shape)).collect();
        let mut emf_a = Array3::zeros(face_shape);
        let mut emf_b = Array3::zeros(face_shape);
        let mut eta = Array3::zeros(face_shape);

        for t0 in 0..t0_len {
            for t1 in 0..t1_len {
                let mut prims = Vec::with_capacity(axis_len);
                for a in 0..axis_len {
                    let (k, j, i) = Self::axis_index(direction, a, t0, t1);
                    let u = block.sweep_conserved(direction, k, j, i);
                    let (w, floored) = prim_from_cons(&self.config, &layout, &u);
                    if floored {
                        *pressure_floor_hits += 1;
                    }
                    prims.push(w);
                }

                let mut edges = Vec::with_capacity(axis_len);
                for a in 0..axis_len {
                    let im1 = a.saturating_sub(1);
                    let ip1 = (a + 1).min(axis_len - 1);
                    let (k, j, i) = Self::axis_index(direction, a, t0, t1);
                    let bx = block.normal_b_cc(direction, k, j, i);
                    let order = if use_plm { self.config.reconstruction } else { crate::config::ReconstructionOrder::Constant };
                    edges.push(reconstruct_cell(&self.config, &layout, order, &prims[im1], &prims[a], &prims[ip1], bx, dt_over_dx));
                }

                for f in 0..axis_len - 1 {
                    let (t0a, t1a, fa) = (t0, t1, f);
                    let bx = Self::face_bx(block, direction, t0a, t1a, fa);
                    let wl = &edges[f].right;
                    let wr = &edges[f + 1].left;
                    let (fk, fj, fi) = Self::axis_index(direction, f, t0, t1);

                    let ul = cons_from_prim(&self.config, &layout, wl);
                    let ur = cons_from_prim(&self.config, &layout, wr);
                    let cfl = fast_speed(&self.config, &layout, &ul, bx);
                    let cfr = fast_speed(&self.config, &layout, &ur, bx);
                    eta[[fk, fj, fi]] = 0.5 * ((wr[Layout::IDX_MX] - wl[Layout::IDX_MX]).abs() + (cfr - cfl).abs());
                    let eta_h = eta_h_field.map(|field| field[[fk, fj, fi]]).unwrap_or(0.0);

                    let result: RiemannResult = self.riemann.solve(&self.config, &layout, wl, wr, bx, eta_h);
                    for c in 0..layout.len() {
                        flux[c][[fk, fj, fi]] = result.flux[c];
                    }
                    emf_a[[fk, fj, fi]] = result.emf_a;
                    emf_b[[fk, fj, fi]] = result.emf_b;
                }
            }
        }

        SweepFlux { flux, emf_a, emf_b, eta }
    }

    fn eta_at(arr: &Array3<f64>, k: isize, j: isize, i: isize) -> f64 {
        if k < 0 || j < 0 || i < 0 {
            return 0.0;
        }
        arr.get([k as usize, j as usize, i as usize]).copied().unwrap_or(0.0)
    }

    /// Aggregates the raw per-interface `η` of §4.4 step C2 into the `η_h`
    /// each x1 face consumes: the maximum of the eight adjacent x2-/x3-face
    /// values plus the face's own η1.
    fn aggregate_eta_h_x1(eta1: &Array3<f64>, eta2: &Array3<f64>, eta3: &Array3<f64>) -> Array3<f64> {
        let (nk, nj, ni) = eta1.dim();
        let mut out = Array3::zeros((nk, nj, ni));
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    let (ks, js, is) = (k as isize, j as isize, i as isize);
                    out[[k, j, i]] = Self::eta_at(eta1, ks, js, is)
                        .max(Self::eta_at(eta2, ks, js, is))
                        .max(Self::eta_at(eta2, ks, js + 1, is))
                        .max(Self::eta_at(eta2, ks, js, is - 1))
                        .max(Self::eta_at(eta2, ks, js + 1, is - 1))
                        .max(Self::eta_at(eta3, ks, js, is))
                        .max(Self::eta_at(eta3, ks + 1, js, is))
                        .max(Self::eta_at(eta3, ks, js, is - 1))
                        .max(Self::eta_at(eta3, ks + 1, js, is - 1));
                }
            }
        }
        out
    }

    /// Analogous to [`Self::aggregate_eta_h_x1`], cyclically permuted.
    fn aggregate_eta_h_x2(eta1: &Array3<f64>, eta2: &Array3<f64>, eta3: &Array3<f64>) -> Array3<f64> {
        let (nk, nj, ni) = eta2.dim();
        let mut out = Array3::zeros((nk, nj, ni));
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    let (ks, js, is) = (k as isize, j as isize, i as isize);
                    out[[k, j, i]] = Self::eta_at(eta2, ks, js, is)
                        .max(Self::eta_at(eta3, ks, js, is))
                        .max(Self::eta_at(eta3, ks + 1, js, is))
                        .max(Self::eta_at(eta3, ks, js - 1, is))
                        .max(Self::eta_at(eta3, ks + 1, js - 1, is))
                        .max(Self::eta_at(eta1, ks, js, is))
                        .max(Self::eta_at(eta1, ks, js, is + 1))
                        .max(Self::eta_at(eta1, ks, js - 1, is))
                        .max(Self::eta_at(eta1, ks, js - 1, is + 1));
                }
            }
        }
        out
    }

    /// Analogous to [`Self::aggregate_eta_h_x1`], cyclically permuted.
    fn aggregate_eta_h_x3(eta1: &Array3<f64>, eta2: &Array3<f64>, eta3: &Array3<f64>) -> Array3<f64> {
        let (nk, nj, ni) = eta3.dim();
        let mut out = Array3::zeros((nk, nj, ni));
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    let (ks, js, is) = (k as isize, j as isize, i as isize);
                    out[[k, j, i]] = Self::eta_at(eta3, ks, js, is)
                        .max(Self::eta_at(eta1, ks, js, is))
                        .max(Self::eta_at(eta1, ks, js, is + 1))
                        .max(Self::eta_at(eta1, ks - 1, js, is))
                        .max(Self::eta_at(eta1, ks - 1, js, is + 1))
                        .max(Self::eta_at(eta2, ks, js, is))
                        .max(Self::eta_at(eta2, ks, js + 1, is))
                        .max(Self::eta_at(eta2, ks - 1, js, is))
                        .max(Self::eta_at(eta2, ks - 1, js + 1, is));
                }
            }
        }
        out
    }

    /// Advances the hydrodynamic (non-magnetic) conserved quantities of the
    /// interior cells by `dt` using the flux divergence of `sweeps`, and
    /// returns the list of cells that went unphysical (§4.6's trigger).
    fn apply_flux_divergence(&self, block: &mut Block, sweeps: &[(Direction, &SweepFlux)], dt: f64) -> Vec<(usize, usize, usize)> {
        let layout = block.layout;
        let (is, ie) = block.interior_i();
        let (js, je) = block.interior_j();
        let (ks, ke) = block.interior_k();
        let mut bad_cells = Vec::new();

        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    // Each sweep's flux is laid out in that sweep's own
                    // permuted frame, so its divergence must be un-permuted
                    // via `add_sweep_delta` separately rather than summed
                    // index-for-index with the other sweeps' fluxes.
                    for &(direction, sweep) in sweeps {
                        let dx = block.dx(direction);
                        let (fk_lo, fj_lo, fi_lo) = (k, j, i);
                        let (fk_hi, fj_hi, fi_hi) = match direction {
                            Direction::X1 => (k, j, i + 1),
                            Direction::X2 => (k, j + 1, i),
                            Direction::X3 => (k + 1, j, i),
                        };
                        let mut delta = layout.zeros();
                        for c in 0..layout.len() {
                            let f_lo = sweep.flux[c][[fk_lo, fj_lo, fi_lo]];
                            let f_hi = sweep.flux[c][[fk_hi, fj_hi, fi_hi]];
                            delta[c] -= dt / dx * (f_hi - f_lo);
                        }
                        block.add_sweep_delta(direction, k, j, i, &delta);
                    }

                    let d = *block.density().get([k, j, i]).unwrap();
                    if !(d > 0.0) || !d.is_finite() {
                        bad_cells.push((k, j, i));
                    } else if layout.adiabatic {
                        let e = *block.energy().get([k, j, i]).unwrap();
                        if !(e > 0.0) || !e.is_finite() {
                            bad_cells.push((k, j, i));
                        }
                    }
                }
            }
        }
        bad_cells
    }

    /// Assembles the three corner-centred EMF arrays from the three
    /// directional sweeps' face fluxes and EMF contributions (§4.5), with
    /// no side effect on `block`.
    fn compute_emfs(&self, block: &Block, sweep_x1: &SweepFlux, sweep_x2: &SweepFlux, sweep_x3: &SweepFlux) -> Emfs {
        let (nk, nj, ni) = block.total_shape();

        let velocity_b = |k: usize, j: usize, i: usize| -> ([f64; 3], [f64; 3]) {
            let d = *block.density().get([k, j, i]).unwrap();
            let u = block.sweep_conserved(Direction::X1, k, j, i);
            ([u[Layout::IDX_MX] / d, u[Layout::IDX_MY] / d, u[Layout::IDX_MZ] / d], [block.normal_b_cc(Direction::X1, k, j, i), block.normal_b_cc(Direction::X2, k, j, i), block.normal_b_cc(Direction::X3, k, j, i)])
        };

        let emf1_cc = |k: usize, j: usize, i: usize| -> f64 {
            let (v, b) = velocity_b(k, j, i);
            cell_centered_emf(v[1], v[2], b[1], b[2])
        };
        let emf2_cc = |k: usize, j: usize, i: usize| -> f64 {
            let (v, b) = velocity_b(k, j, i);
            cell_centered_emf(v[2], v[0], b[2], b[0])
        };
        let emf3_cc = |k: usize, j: usize, i: usize| -> f64 {
            let (v, b) = velocity_b(k, j, i);
            cell_centered_emf(v[0], v[1], b[0], b[1])
        };

        let clamp_k = |k: isize| k.max(0).min(nk as isize - 1) as usize;
        let clamp_j = |j: isize| j.max(0).min(nj as isize - 1) as usize;
        let clamp_i = |i: isize| i.max(0).min(ni as isize - 1) as usize;

        // EMF1, on edges parallel to x1: shape (nk+1, nj+1, ni).
        let mut emf1 = Array3::zeros((nk + 1, nj + 1, ni));
        for k in 0..=nk {
            for j in 0..=nj {
                for i in 0..ni {
                    let face_x2_lo = FaceContribution { emf: sweep_x2.emf_a[[clamp_k(k as isize - 1), j.min(nj), i]], mass_flux: sweep_x2.flux[Layout::IDX_D][[clamp_k(k as isize - 1), j.min(nj), i]] };
                    let face_x2_hi = FaceContribution { emf: sweep_x2.emf_a[[k.min(nk), j.min(nj), i]], mass_flux: sweep_x2.flux[Layout::IDX_D][[k.min(nk), j.min(nj), i]] };
                    let face_x3_lo = FaceContribution { emf: sweep_x3.emf_b[[k.min(nk), clamp_j(j as isize - 1), i]], mass_flux: sweep_x3.flux[Layout::IDX_D][[k.min(nk), clamp_j(j as isize - 1), i]] };
                    let face_x3_hi = FaceContribution { emf: sweep_x3.emf_b[[k.min(nk), j.min(nj), i]], mass_flux: sweep_x3.flux[Layout::IDX_D][[k.min(nk), j.min(nj), i]] };
                    let cc_lo_lo = emf1_cc(clamp_k(k as isize - 1), clamp_j(j as isize - 1), i);
                    let cc_lo_hi = emf1_cc(clamp_k(k as isize - 1), j.min(nj - 1), i);
                    let cc_hi_lo = emf1_cc(k.min(nk - 1), clamp_j(j as isize - 1), i);
                    let cc_hi_hi = emf1_cc(k.min(nk - 1), j.min(nj - 1), i);
                    emf1[[k, j, i]] = corner_emf(face_x2_lo, face_x2_hi, face_x3_lo, face_x3_hi, cc_lo_lo, cc_lo_hi, cc_hi_lo, cc_hi_hi);
                }
            }
        }

        // EMF2, on edges parallel to x2: shape (nk+1, nj, ni+1).
        let mut emf2 = Array3::zeros((nk + 1, nj, ni + 1));
        for k in 0..=nk {
            for j in 0..nj {
                for i in 0..=ni {
                    let face_x3_lo = FaceContribution { emf: sweep_x3.emf_a[[k.min(nk), j, clamp_i(i as isize - 1)]], mass_flux: sweep_x3.flux[Layout::IDX_D][[k.min(nk), j, clamp_i(i as isize - 1)]] };
                    let face_x3_hi = FaceContribution { emf: sweep_x3.emf_a[[k.min(nk), j, i.min(ni)]], mass_flux: sweep_x3.flux[Layout::IDX_D][[k.min(nk), j, i.min(ni)]] };
                    let face_x1_lo = FaceContribution { emf: sweep_x1.emf_b[[clamp_k(k as isize - 1), j, i.min(ni)]], mass_flux: sweep_x1.flux[Layout::IDX_D][[clamp_k(k as isize - 1), j, i.min(ni)]] };
                    let face_x1_hi = FaceContribution { emf: sweep_x1.emf_b[[k.min(nk), j, i.min(ni)]], mass_flux: sweep_x1.flux[Layout::IDX_D][[k.min(nk), j, i.min(ni)]] };
                    let cc_lo_lo = emf2_cc(clamp_k(k as isize - 1), j, clamp_i(i as isize - 1));
                    let cc_lo_hi = emf2_cc(clamp_k(k as isize - 1), j, i.min(ni - 1));
                    let cc_hi_lo = emf2_cc(k.min(nk - 1), j, clamp_i(i as isize - 1));
                    let cc_hi_hi = emf2_cc(k.min(nk - 1), j, i.min(ni - 1));
                    emf2[[k, j, i]] = corner_emf(face_x3_lo, face_x3_hi, face_x1_lo, face_x1_hi, cc_lo_lo, cc_lo_hi, cc_hi_lo, cc_hi_hi);
                }
            }
        }

        // EMF3, on edges parallel to x3: shape (nk, nj+1, ni+1).
        let mut emf3 = Array3::zeros((nk, nj + 1, ni + 1));
        for k in 0..nk {
            for j in 0..=nj {
                for i in 0..=ni {
                    let face_x1_lo = FaceContribution { emf: sweep_x1.emf_a[[k, clamp_j(j as isize - 1), i.min(ni)]], mass_flux: sweep_x1.flux[Layout::IDX_D][[k, clamp_j(j as isize - 1), i.min(ni)]] };
                    let face_x1_hi = FaceContribution { emf: sweep_x1.emf_a[[k, j.min(nj), i.min(ni)]], mass_flux: sweep_x1.flux[Layout::IDX_D][[k, j.min(nj), i.min(ni)]] };
                    let face_x2_lo = FaceContribution { emf: sweep_x2.emf_b[[k, j.min(nj), clamp_i(i as isize - 1)]], mass_flux: sweep_x2.flux[Layout::IDX_D][[k, j.min(nj), clamp_i(i as isize - 1)]] };
                    let face_x2_hi = FaceContribution { emf: sweep_x2.emf_b[[k, j.min(nj), i.min(ni)]], mass_flux: sweep_x2.flux[Layout::IDX_D][[k, j.min(nj), i.min(ni)]] };
                    let cc_lo_lo = emf3_cc(k, clamp_j(j as isize - 1), clamp_i(i as isize - 1));
                    let cc_lo_hi = emf3_cc(k, clamp_j(j as isize - 1), i.min(ni - 1));
                    let cc_hi_lo = emf3_cc(k, j.min(nj - 1), clamp_i(i as isize - 1));
                    let cc_hi_hi = emf3_cc(k, j.min(nj - 1), i.min(ni - 1));
                    emf3[[k, j, i]] = corner_emf(face_x1_lo, face_x1_hi, face_x2_lo, face_x2_hi, cc_lo_lo, cc_lo_hi, cc_hi_lo, cc_hi_hi);
                }
            }
        }

        Emfs { emf1, emf2, emf3 }
    }

    /// Advances face-centred B by the discrete curl of `emfs` over `dt`,
    /// either across the whole block (`restrict = None`) or only at the
    /// interfaces named in `restrict` (used by the first-order correction's
    /// revert/reapply of §4.6 steps 3 and 5, where only a few faces'
    /// corner EMFs actually changed).
    fn apply_ct_delta(&self, block: &mut Block, emfs: &Emfs, dt: f64, restrict: Option<&MhdCorrectionFaces>) {
        let (dx1, dx2, dx3) = (block.dx1, block.dx2, block.dx3);
        let (nk, nj, ni) = block.total_shape();

        match restrict {
            None => {
                for k in 0..nk {
                    for j in 0..nj {
                        for i in 0..=ni {
                            let delta = dt * ((emfs.emf3[[k, j + 1, i]] - emfs.emf3[[k, j, i]]) / dx2 - (emfs.emf2[[k + 1, j, i]] - emfs.emf2[[k, j, i]]) / dx3);
                            block.b1i_mut()[[k, j, i]] -= delta;
                        }
                    }
                }
                for k in 0..nk {
                    for j in 0..=nj {
                        for i in 0..ni {
                            let delta = dt * ((emfs.emf1[[k + 1, j, i]] - emfs.emf1[[k, j, i]]) / dx3 - (emfs.emf3[[k, j, i + 1]] - emfs.emf3[[k, j, i]]) / dx1);
                            block.b2i_mut()[[k, j, i]] -= delta;
                        }
                    }
                }
                for k in 0..=nk {
                    for j in 0..nj {
                        for i in 0..ni {
                            let delta = dt * ((emfs.emf2[[k, j, i + 1]] - emfs.emf2[[k, j, i]]) / dx1 - (emfs.emf1[[k, j + 1, i]] - emfs.emf1[[k, j, i]]) / dx2);
                            block.b3i_mut()[[k, j, i]] -= delta;
                        }
                    }
                }
            }
            Some(faces) => {
                for &(k, j, i) in &faces.x1 {
                    if let (Some(&e3_hi), Some(&e3_lo), Some(&e2_hi), Some(&e2_lo)) = (emfs.emf3.get([k, j + 1, i]), emfs.emf3.get([k, j, i]), emfs.emf2.get([k + 1, j, i]), emfs.emf2.get([k, j, i])) {
                        if let Some(b) = block.b1i_mut().get_mut([k, j, i]) {
                            *b -= dt * ((e3_hi - e3_lo) / dx2 - (e2_hi - e2_lo) / dx3);
                        }
                    }
                }
                for &(k, j, i) in &faces.x2 {
                    if let (Some(&e1_hi), Some(&e1_lo), Some(&e3_hi), Some(&e3_lo)) = (emfs.emf1.get([k + 1, j, i]), emfs.emf1.get([k, j, i]), emfs.emf3.get([k, j, i + 1]), emfs.emf3.get([k, j, i])) {
                        if let Some(b) = block.b2i_mut().get_mut([k, j, i]) {
                            *b -= dt * ((e1_hi - e1_lo) / dx3 - (e3_hi - e3_lo) / dx1);
                        }
                    }
                }
                for &(k, j, i) in &faces.x3 {
                    if let (Some(&e2_hi), Some(&e2_lo), Some(&e1_hi), Some(&e1_lo)) = (emfs.emf2.get([k, j, i + 1]), emfs.emf2.get([k, j, i]), emfs.emf1.get([k, j + 1, i]), emfs.emf1.get([k, j, i])) {
                        if let Some(b) = block.b3i_mut().get_mut([k, j, i]) {
                            *b -= dt * ((e2_hi - e2_lo) / dx1 - (e1_hi - e1_lo) / dx2);
                        }
                    }
                }
            }
        }
    }

    fn max_div_b(&self, block: &Block) -> f64 {
        let (is, ie) = block.interior_i();
        let (js, je) = block.interior_j();
        let (ks, ke) = block.interior_k();
        let mut m: f64 = 0.0;
        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    m = m.max(block.divergence_b(k, j, i).abs());
                }
            }
        }
        m
    }

    /// Constrained-transport update of the face-centred B, per §4.5. Returns
    /// the assembled EMFs (needed later if the first-order correction has
    /// to revert and reassemble a subset of them), or `None` if this
    /// configuration has no magnetic field.
    fn apply_constrained_transport(&self, block: &mut Block, sweep_x1: &SweepFlux, sweep_x2: &SweepFlux, sweep_x3: &SweepFlux, dt: f64, max_abs_div_b: &mut f64) -> Option<Emfs> {
        if !block.layout.mhd {
            return None;
        }
        let emfs = self.compute_emfs(block, sweep_x1, sweep_x2, sweep_x3);
        self.apply_ct_delta(block, &emfs, dt, None);
        block.average_cell_centered_b();
        *max_abs_div_b = self.max_div_b(block);
        Some(emfs)
    }

    fn offset_coord(direction: Direction, x1: f64, x2: f64, x3: f64, d: f64) -> (f64, f64, f64) {
        match direction {
            Direction::X1 => (x1 + d, x2, x3),
            Direction::X2 => (x1, x2 + d, x3),
            Direction::X3 => (x1, x2, x3 + d),
        }
    }

    fn add_momentum_component(delta: &mut Vector, direction: Direction, value: f64) {
        match direction {
            Direction::X1 => delta[Layout::IDX_MX] += value,
            Direction::X2 => delta[Layout::IDX_MY] += value,
            Direction::X3 => delta[Layout::IDX_MZ] += value,
        }
    }

    /// Adds the gravitational source term to momentum and energy over
    /// `dt`, per the P5 (half-step, `half = true`) or C5 (full step,
    /// `half = false`) formulae of §4.4: `rho_block` supplies `ρ^n` (P5) or
    /// `ρ^{n+½}` (C5), and `flux_sweeps` the mass fluxes used for the
    /// energy coupling (the predictor's own fluxes for P5, the final
    /// corrector fluxes for C5).
    fn apply_gravity(&self, target: &mut Block, rho_block: &Block, flux_sweeps: &[(Direction, &SweepFlux)], dt: f64, half: bool) {
        let layout = target.layout;
        let (is, ie) = target.interior_i();
        let (js, je) = target.interior_j();
        let (ks, ke) = target.interior_k();
        let factor = if half { 0.5 } else { 1.0 };

        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    let (x1, x2, x3) = (i as f64 * target.dx1, j as f64 * target.dx2, k as f64 * target.dx3);
                    let phi_c = self.gravity.potential(x1, x2, x3);
                    let rho = *rho_block.density().get([k, j, i]).unwrap();

                    let mut delta = layout.zeros();
                    let mut d_energy = 0.0;
                    for &(direction, sweep) in flux_sweeps {
                        let dx = target.dx(direction);
                        let (xl1, xl2, xl3) = Self::offset_coord(direction, x1, x2, x3, -0.5 * dx);
                        let (xr1, xr2, xr3) = Self::offset_coord(direction, x1, x2, x3, 0.5 * dx);
                        let phi_l = self.gravity.potential(xl1, xl2, xl3);
                        let phi_r = self.gravity.potential(xr1, xr2, xr3);

                        let (fk_hi, fj_hi, fi_hi) = match direction {
                            Direction::X1 => (k, j, i + 1),
                            Direction::X2 => (k, j + 1, i),
                            Direction::X3 => (k + 1, j, i),
                        };
                        let f_l = sweep.flux[Layout::IDX_D][[k, j, i]];
                        let f_r = sweep.flux[Layout::IDX_D][[fk_hi, fj_hi, fi_hi]];

                        let d_momentum = -factor * (dt / dx) * (phi_r - phi_l) * rho;
                        Self::add_momentum_component(&mut delta, direction, d_momentum);
                        d_energy += factor * (dt / dx) * (f_l * (phi_l - phi_c) + f_r * (phi_c - phi_r));
                    }

                    if let Some(ie_idx) = layout.idx_e() {
                        delta[ie_idx] = d_energy;
                    }
                    target.add_sweep_delta(Direction::X1, k, j, i, &delta);
                }
            }
        }
    }

    /// Re-solves one flagged hydro interface with first-order (piecewise
    /// constant) states, combines the revert-and-reapply of §4.6 steps 3 and
    /// 5 into a single delta, and records the new flux/EMF into
    /// `patched_sweep` for the subsequent CT reassembly. Returns whether the
    /// interface was actually on the grid (false at an untouchable edge).
    fn correct_one_hydro_face(&self, block: &mut Block, direction: Direction, dx: f64, axis_total: usize, old_sweep: &SweepFlux, patched_sweep: &mut SweepFlux, dt: f64, k: usize, j: usize, i: usize) -> bool {
        let layout = block.layout;
        let axis = match direction {
            Direction::X1 => i,
            Direction::X2 => j,
            Direction::X3 => k,
        };
        if axis == 0 || axis >= axis_total {
            return false;
        }
        let (klo, jlo, ilo) = match direction {
            Direction::X1 => (k, j, i - 1),
            Direction::X2 => (k, j - 1, i),
            Direction::X3 => (k - 1, j, i),
        };
        let ulo = block.sweep_conserved(direction, klo, jlo, ilo);
        let uhi = block.sweep_conserved(direction, k, j, i);
        let (wlo, _) = prim_from_cons(&self.config, &layout, &ulo);
        let (whi, _) = prim_from_cons(&self.config, &layout, &uhi);
        let bx_face = match direction {
            Direction::X1 => block.b1i()[[k, j, i]],
            Direction::X2 => block.b2i()[[k, j, i]],
            Direction::X3 => block.b3i()[[k, j, i]],
        };
        // H-correction and this fallback are mutually exclusive (enforced
        // by `Config::validate`), so eta_h is always 0 here.
        let result = self.riemann.solve(&self.config, &layout, &wlo, &whi, bx_face, 0.0);

        // Revert the high-order flux contribution C6 applied at this
        // interface and re-apply the first-order one in a single combined
        // delta.
        let mut delta_lo = layout.zeros();
        let mut delta_hi = layout.zeros();
        for c in 0..layout.len() {
            let f_old = old_sweep.flux[c][[k, j, i]];
            let f_new = result.flux[c];
            delta_lo[c] += dt / dx * (f_old - f_new);
            delta_hi[c] -= dt / dx * (f_old - f_new);
        }
        block.add_sweep_delta(direction, klo, jlo, ilo, &delta_lo);
        block.add_sweep_delta(direction, k, j, i, &delta_hi);

        for c in 0..layout.len() {
            patched_sweep.flux[c][[k, j, i]] = result.flux[c];
        }
        patched_sweep.emf_a[[k, j, i]] = result.emf_a;
        patched_sweep.emf_b[[k, j, i]] = result.emf_b;
        true
    }

    /// Implements §4.6 steps 2-5: propagates the flagged hydro interfaces to
    /// their dependent face-B interfaces, reverts and re-applies the hydro
    /// flux update with first-order states, and reassembles + reapplies
    /// just the affected corner EMFs. Returns the number of hydro
    /// interfaces corrected.
    fn apply_first_order_correction(&self, block: &mut Block, bad_cells: &[(usize, usize, usize)], dt: f64, corrector: (&SweepFlux, &SweepFlux, &SweepFlux), old_emfs: Option<&Emfs>) -> usize {
        if bad_cells.is_empty() || !self.config.first_order_flux_correction {
            return 0;
        }
        let hydro_faces = faces_around(bad_cells);
        let total = block.total_shape();
        let (dx1, dx2, dx3) = (block.dx1, block.dx2, block.dx3);
        let mut corrected = 0;
        let mut patched_x1 = corrector.0.clone();
        let mut patched_x2 = corrector.1.clone();
        let mut patched_x3 = corrector.2.clone();

        for &(k, j, i) in &hydro_faces.x1 {
            if self.correct_one_hydro_face(block, Direction::X1, dx1, total.2, corrector.0, &mut patched_x1, dt, k, j, i) {
                corrected += 1;
            }
        }
        for &(k, j, i) in &hydro_faces.x2 {
            if self.correct_one_hydro_face(block, Direction::X2, dx2, total.1, corrector.1, &mut patched_x2, dt, k, j, i) {
                corrected += 1;
            }
        }
        for &(k, j, i) in &hydro_faces.x3 {
            if self.correct_one_hydro_face(block, Direction::X3, dx3, total.0, corrector.2, &mut patched_x3, dt, k, j, i) {
                corrected += 1;
            }
        }

        if let (true, Some(old_emfs)) = (block.layout.mhd, old_emfs) {
            if corrected > 0 {
                let mhd_faces = propagate_to_mhd_faces(&hydro_faces);
                if !mhd_faces.is_empty() {
                    let new_emfs = self.compute_emfs(block, &patched_x1, &patched_x2, &patched_x3);
                    self.apply_ct_delta(block, old_emfs, -dt, Some(&mhd_faces));
                    self.apply_ct_delta(block, &new_emfs, dt, Some(&mhd_faces));
                    block.average_cell_centered_b();
                }
            }
        }

        corrected
    }

    /// Advances `block` by one time step, chosen internally from the CFL
    /// number and the fastest wave speed present, per §4.4/§4.1a.
    pub fn step(&mut self, block: &mut Block) -> Result<StepReport, IntegratorError> {
        let dt = self.compute_time_step(block);
        block.dt = dt;
        tracing::debug!(dt, "advancing block by one step");

        let mut pressure_floor_hits = 0;
        let half = 0.5 * dt;

        let predictor_x1 = self.sweep(block, Direction::X1, false, dt, None, &mut pressure_floor_hits);
        let predictor_x2 = self.sweep(block, Direction::X2, false, dt, None, &mut pressure_floor_hits);
        let predictor_x3 = self.sweep(block, Direction::X3, false, dt, None, &mut pressure_floor_hits);

        let mut half_block = block.clone();
        self.apply_flux_divergence(&mut half_block, &[(Direction::X1, &predictor_x1), (Direction::X2, &predictor_x2), (Direction::X3, &predictor_x3)], half);
        let mut unused_div_b = 0.0;
        self.apply_constrained_transport(&mut half_block, &predictor_x1, &predictor_x2, &predictor_x3, half, &mut unused_div_b);
        self.apply_gravity(&mut half_block, block, &[(Direction::X1, &predictor_x1), (Direction::X2, &predictor_x2), (Direction::X3, &predictor_x3)], dt, true);

        let mut corrector_x1 = self.sweep(&half_block, Direction::X1, true, dt, None, &mut pressure_floor_hits);
        let mut corrector_x2 = self.sweep(&half_block, Direction::X2, true, dt, None, &mut pressure_floor_hits);
        let mut corrector_x3 = self.sweep(&half_block, Direction::X3, true, dt, None, &mut pressure_floor_hits);

        if self.config.h_correction {
            let eta_h_x1 = Self::aggregate_eta_h_x1(&corrector_x1.eta, &corrector_x2.eta, &corrector_x3.eta);
            let eta_h_x2 = Self::aggregate_eta_h_x2(&corrector_x1.eta, &corrector_x2.eta, &corrector_x3.eta);
            let eta_h_x3 = Self::aggregate_eta_h_x3(&corrector_x1.eta, &corrector_x2.eta, &corrector_x3.eta);
            // The floor was already counted on the probe pass above; don't
            // double-count it for the broadened re-solve.
            let mut unused_floor_hits = 0;
            corrector_x1 = self.sweep(&half_block, Direction::X1, true, dt, Some(&eta_h_x1), &mut unused_floor_hits);
            corrector_x2 = self.sweep(&half_block, Direction::X2, true, dt, Some(&eta_h_x2), &mut unused_floor_hits);
            corrector_x3 = self.sweep(&half_block, Direction::X3, true, dt, Some(&eta_h_x3), &mut unused_floor_hits);
        }

        let bad_cells = self.apply_flux_divergence(block, &[(Direction::X1, &corrector_x1), (Direction::X2, &corrector_x2), (Direction::X3, &corrector_x3)], dt);
        let mut max_abs_div_b = 0.0;
        let old_emfs = self.apply_constrained_transport(block, &corrector_x1, &corrector_x2, &corrector_x3, dt, &mut max_abs_div_b);
        self.apply_gravity(block, &half_block, &[(Direction::X1, &corrector_x1), (Direction::X2, &corrector_x2), (Direction::X3, &corrector_x3)], dt, false);

        let first_order_faces_corrected = self.apply_first_order_correction(block, &bad_cells, dt, (&corrector_x1, &corrector_x2, &corrector_x3), old_emfs.as_ref());
        if first_order_faces_corrected > 0 {
            tracing::warn!(first_order_faces_corrected, "first-order flux correction applied");
        }

        if let Some(&(k, j, i)) = bad_cells.iter().find(|&&(k, j, i)| {
            let d = *block.density().get([k, j, i]).unwrap();
            let density_bad = !(d > 0.0) || !d.is_finite();
            let energy_bad = block.layout.adiabatic && {
                let e = *block.energy().get([k, j, i]).unwrap();
                !(e > 0.0) || !e.is_finite()
            };
            density_bad || energy_bad
        }) {
            let rho = *block.density().get([k, j, i]).unwrap();
            tracing::error!(k, j, i, rho, "unrecoverable negative density after first-order flux correction");
            return Err(IntegratorError::NegativeDensityUnrecoverable { k, j, i, rho });
        }

        if pressure_floor_hits > 0 {
            tracing::warn!(pressure_floor_hits, "pressure floor applied");
        }

        block.time += dt;

        Ok(StepReport { pressure_floor_hits, first_order_faces_corrected, max_abs_div_b, dt })
    }

    /// CFL-limited time step from the fastest wave speed over the interior
    /// (plus one ghost layer), per §4.1a.
    fn compute_time_step(&self, block: &Block) -> f64 {
        let layout = block.layout;
        let (is, ie) = block.interior_i();
        let (js, je) = block.interior_j();
        let (ks, ke) = block.interior_k();
        let mut max_speed: f64 = 1e-12;

        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    for direction in [Direction::X1, Direction::X2, Direction::X3] {
                        let u = block.sweep_conserved(direction, k, j, i);
                        let bx = block.normal_b_cc(direction, k, j, i);
                        let cf = fast_speed(&self.config, &layout, &u, bx);
                        let speed = u[Layout::IDX_MX].abs() / u[Layout::IDX_D] + cf;
                        max_speed = max_speed.max(speed / block.dx(direction));
                    }
                }
            }
        }
        self.config.cfl_number / max_speed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Eos, ReconstructionOrder};

    fn uniform_block(config: &Config, shape: (usize, usize, usize), nghost: usize) -> Block {
        let layout = config.layout();
        let mut block = Block::zeros(layout, shape, nghost, 1.0 / shape.0 as f64, 1.0 / shape.1 as f64, 1.0 / shape.2 as f64);
        let w = Vector::from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0]);
        let (tk, tj, ti) = block.total_shape();
        for k in 0..tk {
            for j in 0..tj {
                for i in 0..ti {
                    let u = cons_from_prim(config, &layout, &w);
                    block.add_sweep_delta(Direction::X1, k, j, i, &u);
                }
            }
        }
        block
    }

    #[test]
    fn rejects_insufficient_ghost_zones() {
        let config = Config { mhd: false, reconstruction: ReconstructionOrder::Linear, ..Config::default() };
        let err = Integrator::new(config, 1).unwrap_err();
        assert!(matches!(err, IntegratorError::InsufficientGhostZones { .. }));
    }

    #[test]
    fn uniform_hydro_state_is_a_fixed_point() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, first_order_flux_correction: false, ..Config::default() };
        let nghost = config.required_ghost_zones();
        let mut block = uniform_block(&config, (6, 6, 6), nghost);
        let mut integrator = Integrator::new(config, nghost).unwrap();
        let report = integrator.step(&mut block).unwrap();
        assert_eq!(report.pressure_floor_hits, 0);
        let (is, ie) = block.interior_i();
        let (js, je) = block.interior_j();
        let (ks, ke) = block.interior_k();
        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    assert!((block.density().get([k, j, i]).unwrap() - 1.0).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn h_correction_runs_without_changing_a_uniform_fixed_point() {
        let config = Config { mhd: false, eos: Eos::Adiabatic { gamma: 1.4 }, h_correction: true, first_order_flux_correction: false, ..Config::default() };
        let nghost = config.required_ghost_zones();
        let mut block = uniform_block(&config, (6, 6, 6), nghost);
        let mut integrator = Integrator::new(config, nghost).unwrap();
        let report = integrator.step(&mut block).unwrap();
        let (is, ie) = block.interior_i();
        let (js, je) = block.interior_j();
        let (ks, ke) = block.interior_k();
        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    assert!((block.density().get([k, j, i]).unwrap() - 1.0).abs() < 1e-9);
                }
            }
        }
        assert_eq!(report.pressure_floor_hits, 0);
    }
}
