//! The grid block data model of §3: a 3-D block of cells carrying the
//! conserved hydro state, cell-centred and face-centred magnetic field, and
//! passive scalars, plus the step size and ghost-zone count that travel
//! with it.
//!
//! Mirrors the geometry-caching style of the application crate's own
//! `mesh::BlockGeometry` (cached `ndarray` arrays of coordinates and
//! volumes), generalized from a 2-D spherical-polar mesh to a uniform 3-D
//! Cartesian one, since mesh construction itself is out of scope (§1) and
//! all the core needs is index arithmetic and spacing.

use ndarray::Array3;

use crate::vector::{Layout, Vector};

/// One of the three sweep directions. Reconstruction and the Riemann solver
/// only ever see a 1-D strip; `Direction` carries the permutation of §3
/// that maps a sweep-local `(Mx, My, Mz)` / `(By, Bz)` back onto the grid's
/// global `(M1, M2, M3)` / `(B1c, B2c, B3c)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    X1,
    X2,
    X3,
}

impl Direction {
    /// `(normal, transverse_a, transverse_b)` permutation of the momentum
    /// (or velocity) components for this sweep, per §3.
    pub fn momentum_permutation(&self) -> (usize, usize, usize) {
        match self {
            Direction::X1 => (0, 1, 2),
            Direction::X2 => (1, 2, 0),
            Direction::X3 => (2, 0, 1),
        }
    }

    /// Index of the face-normal B component and the `(By, Bz)` transverse
    /// pair, per §3's orientation convention.
    pub fn field_permutation(&self) -> (usize, usize, usize) {
        self.momentum_permutation()
    }
}

/// A 3-D block of cells with `nghost` ghost cells on every face, storing
/// the conserved hydro state, cell-centred and face-centred B, and passive
/// scalars (§3's "Data Model").
#[derive(Clone)]
pub struct Block {
    pub layout: Layout,
    /// Interior cell counts along each axis.
    pub shape: (usize, usize, usize),
    pub nghost: usize,
    pub dx1: f64,
    pub dx2: f64,
    pub dx3: f64,
    pub time: f64,
    pub dt: f64,

    d: Array3<f64>,
    m1: Array3<f64>,
    m2: Array3<f64>,
    m3: Array3<f64>,
    e: Array3<f64>,
    b1c: Array3<f64>,
    b2c: Array3<f64>,
    b3c: Array3<f64>,
    b1i: Array3<f64>,
    b2i: Array3<f64>,
    b3i: Array3<f64>,
    scalars: Vec<Array3<f64>>,
}

impl Block {
    pub fn zeros(layout: Layout, shape: (usize, usize, usize), nghost: usize, dx1: f64, dx2: f64, dx3: f64) -> Self {
        let (ni, nj, nk) = shape;
        let (nit, njt, nkt) = (ni + 2 * nghost, nj + 2 * nghost, nk + 2 * nghost);
        Block {
            layout,
            shape,
            nghost,
            dx1,
            dx2,
            dx3,
            time: 0.0,
            dt: 0.0,
            d: Array3::zeros((nkt, njt, nit)),
            m1: Array3::zeros((nkt, njt, nit)),
            m2: Array3::zeros((nkt, njt, nit)),
            m3: Array3::zeros((nkt, njt, nit)),
            e: Array3::zeros((nkt, njt, nit)),
            b1c: Array3::zeros((nkt, njt, nit)),
            b2c: Array3::zeros((nkt, njt, nit)),
            b3c: Array3::zeros((nkt, njt, nit)),
            b1i: Array3::zeros((nkt, njt, nit + 1)),
            b2i: Array3::zeros((nkt, njt + 1, nit)),
            b3i: Array3::zeros((nkt + 1, njt, nit)),
            scalars: (0..layout.n_scalars).map(|_| Array3::zeros((nkt, njt, nit))).collect(),
        }
    }

    pub fn total_shape(&self) -> (usize, usize, usize) {
        let (ni, nj, nk) = self.shape;
        (nk + 2 * self.nghost, nj + 2 * self.nghost, ni + 2 * self.nghost)
    }

    /// Lower and upper (inclusive) active-cell bounds along axis `i`, in
    /// the `il = is - nghost, iu = ie + nghost` sense of the original
    /// source: the widest window that still has data in this block.
    pub fn bounds_i(&self) -> (usize, usize) {
        (0, self.shape.0 + 2 * self.nghost - 1)
    }
    pub fn bounds_j(&self) -> (usize, usize) {
        (0, self.shape.1 + 2 * self.nghost - 1)
    }
    pub fn bounds_k(&self) -> (usize, usize) {
        (0, self.shape.2 + 2 * self.nghost - 1)
    }

    /// Index of the first and last *interior* cell along axis `i` (i.e.
    /// `is, ie` of the original source).
    pub fn interior_i(&self) -> (usize, usize) {
        (self.nghost, self.nghost + self.shape.0 - 1)
    }
    pub fn interior_j(&self) -> (usize, usize) {
        (self.nghost, self.nghost + self.shape.1 - 1)
    }
    pub fn interior_k(&self) -> (usize, usize) {
        (self.nghost, self.nghost + self.shape.2 - 1)
    }

    pub fn dx(&self, direction: Direction) -> f64 {
        match direction {
            Direction::X1 => self.dx1,
            Direction::X2 => self.dx2,
            Direction::X3 => self.dx3,
        }
    }

    pub fn density(&self) -> &Array3<f64> {
        &self.d
    }
    pub fn density_mut(&mut self) -> &mut Array3<f64> {
        &mut self.d
    }
    pub fn energy(&self) -> &Array3<f64> {
        &self.e
    }

    pub fn b1i(&self) -> &Array3<f64> {
        &self.b1i
    }
    pub fn b2i(&self) -> &Array3<f64> {
        &self.b2i
    }
    pub fn b3i(&self) -> &Array3<f64> {
        &self.b3i
    }
    pub fn b1i_mut(&mut self) -> &mut Array3<f64> {
        &mut self.b1i
    }
    pub fn b2i_mut(&mut self) -> &mut Array3<f64> {
        &mut self.b2i
    }
    pub fn b3i_mut(&mut self) -> &mut Array3<f64> {
        &mut self.b3i
    }

    /// Packs the global conserved state at `(k, j, i)` into a sweep-local
    /// [`Vector`] for the given direction, per §3's orientation convention:
    /// the normal slot `Mx` receives the normal-direction momentum, the
    /// transverse slots receive the other two (in cyclic order), and the
    /// transverse B pair is packed into `By, Bz`. The normal B (`Bx`) is
    /// *not* part of the vector; callers read it separately from the
    /// interface array.
    pub fn sweep_conserved(&self, direction: Direction, k: usize, j: usize, i: usize) -> Vector {
        let mut v = self.layout.zeros();
        let m = [self.m1[[k, j, i]], self.m2[[k, j, i]], self.m3[[k, j, i]]];
        let (n, ta, tb) = direction.momentum_permutation();
        v[Layout::IDX_D] = self.d[[k, j, i]];
        v[Layout::IDX_MX] = m[n];
        v[Layout::IDX_MY] = m[ta];
        v[Layout::IDX_MZ] = m[tb];
        if let Some(idx) = self.layout.idx_e() {
            v[idx] = self.e[[k, j, i]];
        }
        if let (Some(iby), Some(ibz)) = (self.layout.idx_by(), self.layout.idx_bz()) {
            let b = [self.b1c[[k, j, i]], self.b2c[[k, j, i]], self.b3c[[k, j, i]]];
            let (n, ta, tb) = direction.field_permutation();
            let _ = n;
            v[iby] = b[ta];
            v[ibz] = b[tb];
        }
        for n in 0..self.layout.n_scalars {
            v[self.layout.idx_scalar(n)] = self.scalars[n][[k, j, i]];
        }
        v
    }

    /// Cell-centred normal B for `direction` at `(k, j, i)` (the `Bx`
    /// argument to the Riemann solver and reconstruction).
    pub fn normal_b_cc(&self, direction: Direction, k: usize, j: usize, i: usize) -> f64 {
        match direction {
            Direction::X1 => self.b1c[[k, j, i]],
            Direction::X2 => self.b2c[[k, j, i]],
            Direction::X3 => self.b3c[[k, j, i]],
        }
    }

    /// Adds `delta` (itself laid out per `direction`'s permutation) to the
    /// global-frame conserved state at `(k, j, i)`. Used by the hydro
    /// update steps (P4/C6), which compute flux divergences in sweep-local
    /// order and must permute momentum components back before accumulating.
    pub fn add_sweep_delta(&mut self, direction: Direction, k: usize, j: usize, i: usize, delta: &Vector) {
        let (n, ta, tb) = direction.momentum_permutation();
        let mut m = [0.0; 3];
        m[n] = delta[Layout::IDX_MX];
        m[ta] = delta[Layout::IDX_MY];
        m[tb] = delta[Layout::IDX_MZ];
        self.d[[k, j, i]] += delta[Layout::IDX_D];
        self.m1[[k, j, i]] += m[0];
        self.m2[[k, j, i]] += m[1];
        self.m3[[k, j, i]] += m[2];
        if let Some(idx) = self.layout.idx_e() {
            self.e[[k, j, i]] += delta[idx];
        }
        for n in 0..self.layout.n_scalars {
            self.scalars[n][[k, j, i]] += delta[self.layout.idx_scalar(n)];
        }
    }

    /// Sets the cell-centred B at `(k, j, i)` from the two bounding
    /// interface values in each direction (Invariant 2 of §3).
    pub fn average_cell_centered_b(&mut self) {
        if !self.layout.mhd {
            return;
        }
        let (nk, nj, ni) = self.total_shape();
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    self.b1c[[k, j, i]] = 0.5 * (self.b1i[[k, j, i]] + self.b1i[[k, j, i + 1]]);
                    self.b2c[[k, j, i]] = 0.5 * (self.b2i[[k, j, i]] + self.b2i[[k, j + 1, i]]);
                    self.b3c[[k, j, i]] = 0.5 * (self.b3i[[k, j, i]] + self.b3i[[k + 1, j, i]]);
                }
            }
        }
    }

    /// Discrete divergence of the face-centred B at `(k, j, i)` (Invariant
    /// 3 of §3); should be zero to machine precision on every interior
    /// cell after CT has run.
    pub fn divergence_b(&self, k: usize, j: usize, i: usize) -> f64 {
        (self.b1i[[k, j, i + 1]] - self.b1i[[k, j, i]]) / self.dx1
            + (self.b2i[[k, j + 1, i]] - self.b2i[[k, j, i]]) / self.dx2
            + (self.b3i[[k + 1, j, i]] - self.b3i[[k, j, i]]) / self.dx3
    }

    /// Total mass, momentum, energy, and per-scalar mass over the interior
    /// cells (property 4 of §8, "Conservation").
    pub fn conserved_sums(&self) -> Vec<f64> {
        let (is, ie) = self.interior_i();
        let (js, je) = self.interior_j();
        let (ks, ke) = self.interior_k();
        let mut sums = vec![0.0; 5 + self.layout.n_scalars];
        for k in ks..=ke {
            for j in js..=je {
                for i in is..=ie {
                    sums[0] += self.d[[k, j, i]];
                    sums[1] += self.m1[[k, j, i]];
                    sums[2] += self.m2[[k, j, i]];
                    sums[3] += self.m3[[k, j, i]];
                    if self.layout.adiabatic {
                        sums[4] += self.e[[k, j, i]];
                    }
                    for n in 0..self.layout.n_scalars {
                        sums[5 + n] += self.scalars[n][[k, j, i]];
                    }
                }
            }
        }
        sums
    }
}
