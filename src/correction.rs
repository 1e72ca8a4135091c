//! First-order flux correction, the positivity fallback of §4.6.
//!
//! Grounded in `integrate_3d_vl.c`'s `first_order_correction`: a cell that
//! would go unphysical has its six bounding hydro interfaces flagged, and
//! because each corner EMF depends on four adjacent face fluxes, those
//! hydro interfaces propagate to a fixed, CT-stencil-derived set of
//! neighbouring face-B interfaces that must also be recomputed and
//! reapplied (§4.6 step 2).

use std::collections::BTreeSet;

type FaceKey = (usize, usize, usize);

/// The set of hydro interfaces flagged for first-order recomputation, one
/// set per sweep direction. An entry `(k, j, i)` in the x1 set means "the
/// interface between cells `(k, j, i-1)` and `(k, j, i)`".
#[derive(Default, Debug, Clone)]
pub struct CorrectionFaces {
    pub x1: BTreeSet<FaceKey>,
    pub x2: BTreeSet<FaceKey>,
    pub x3: BTreeSet<FaceKey>,
}

impl CorrectionFaces {
    pub fn is_empty(&self) -> bool {
        self.x1.is_empty() && self.x2.is_empty() && self.x3.is_empty()
    }

    pub fn len(&self) -> usize {
        self.x1.len() + self.x2.len() + self.x3.len()
    }
}

/// The set of face-centred-B (CT) interfaces that a hydro correction
/// propagates to, one set per face-B array, per §4.6 step 2.
#[derive(Default, Debug, Clone)]
pub struct MhdCorrectionFaces {
    pub x1: BTreeSet<FaceKey>,
    pub x2: BTreeSet<FaceKey>,
    pub x3: BTreeSet<FaceKey>,
}

impl MhdCorrectionFaces {
    pub fn is_empty(&self) -> bool {
        self.x1.is_empty() && self.x2.is_empty() && self.x3.is_empty()
    }
}

/// Flags the six interfaces bounding each cell in `bad_cells` for
/// first-order recomputation.
pub fn faces_around(bad_cells: &[FaceKey]) -> CorrectionFaces {
    let mut faces = CorrectionFaces::default();
    for &(k, j, i) in bad_cells {
        faces.x1.insert((k, j, i));
        faces.x1.insert((k, j, i + 1));
        faces.x2.insert((k, j, i));
        faces.x2.insert((k, j + 1, i));
        faces.x3.insert((k, j, i));
        faces.x3.insert((k + 1, j, i));
    }
    faces
}

/// Subtracts 1 from `v` if possible, returning `None` at the domain edge
/// rather than wrapping (`usize` has no negative ghost index).
fn sub1(v: usize) -> Option<usize> {
    v.checked_sub(1)
}

/// Propagates flagged hydro interfaces to the face-B (CT) interfaces whose
/// corner EMFs depend on them, per §4.6 step 2's fixed table. `hydro_x1`'s
/// rule is stated directly from the corner-EMF stencil; `hydro_x2` and
/// `hydro_x3` follow by the same cyclic permutation the rest of this crate
/// uses for its three sweep directions.
pub fn propagate_to_mhd_faces(hydro: &CorrectionFaces) -> MhdCorrectionFaces {
    let mut mhd = MhdCorrectionFaces::default();

    for &(k, j, i) in &hydro.x1 {
        for face in [Some((k + 1, j, i)), sub1(k).map(|k| (k, j, i)), Some((k, j + 1, i)), sub1(j).map(|j| (k, j, i))].into_iter().flatten() {
            mhd.x1.insert(face);
        }
        if let Some(im1) = sub1(i) {
            for kk in [Some(k + 1), Some(k), sub1(k)].into_iter().flatten() {
                mhd.x3.insert((kk, j, im1));
            }
            for jj in [j + 1, j] {
                mhd.x2.insert((k, jj, im1));
            }
        }
    }

    for &(k, j, i) in &hydro.x2 {
        for face in [Some((k + 1, j, i)), sub1(k).map(|k| (k, j, i)), Some((k, j, i + 1)), sub1(i).map(|i| (k, j, i))].into_iter().flatten() {
            mhd.x2.insert(face);
        }
        if let Some(jm1) = sub1(j) {
            for ii in [Some(i + 1), Some(i), sub1(i)].into_iter().flatten() {
                mhd.x1.insert((k, jm1, ii));
            }
            for kk in [k + 1, k] {
                mhd.x3.insert((kk, jm1, i));
            }
        }
    }

    for &(k, j, i) in &hydro.x3 {
        for face in [Some((k, j, i + 1)), sub1(i).map(|i| (k, j, i)), Some((k, j + 1, i)), sub1(j).map(|j| (k, j, i))].into_iter().flatten() {
            mhd.x3.insert(face);
        }
        if let Some(km1) = sub1(k) {
            for jj in [Some(j + 1), Some(j), sub1(j)].into_iter().flatten() {
                mhd.x2.insert((km1, jj, i));
            }
            for ii in [i + 1, i] {
                mhd.x1.insert((km1, j, ii));
            }
        }
    }

    mhd
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_bad_cell_flags_exactly_six_faces() {
        let faces = faces_around(&[(5, 5, 5)]);
        assert_eq!(faces.len(), 6);
        assert!(faces.x1.contains(&(5, 5, 5)));
        assert!(faces.x1.contains(&(5, 5, 6)));
        assert!(faces.x2.contains(&(5, 5, 5)));
        assert!(faces.x2.contains(&(5, 6, 5)));
        assert!(faces.x3.contains(&(5, 5, 5)));
        assert!(faces.x3.contains(&(6, 5, 5)));
    }

    #[test]
    fn adjacent_bad_cells_share_a_flagged_face() {
        let faces = faces_around(&[(5, 5, 5), (5, 5, 6)]);
        assert_eq!(faces.x1.len(), 3);
        assert!(faces.x1.contains(&(5, 5, 6)));
    }

    #[test]
    fn no_bad_cells_flags_nothing() {
        let faces = faces_around(&[]);
        assert!(faces.is_empty());
    }

    #[test]
    fn hydro_x1_propagates_to_the_table_entries() {
        let mut hydro = CorrectionFaces::default();
        hydro.x1.insert((5, 5, 5));
        let mhd = propagate_to_mhd_faces(&hydro);

        assert!(mhd.x1.contains(&(4, 5, 5)));
        assert!(mhd.x1.contains(&(6, 5, 5)));
        assert!(mhd.x1.contains(&(5, 4, 5)));
        assert!(mhd.x1.contains(&(5, 6, 5)));

        assert!(mhd.x3.contains(&(5, 5, 4)));
        assert!(mhd.x3.contains(&(4, 5, 4)));
        assert!(mhd.x3.contains(&(6, 5, 4)));

        assert!(mhd.x2.contains(&(5, 5, 4)));
        assert!(mhd.x2.contains(&(5, 6, 4)));
    }

    #[test]
    fn propagation_cyclically_permutes_across_directions() {
        let mut hydro_x1 = CorrectionFaces::default();
        hydro_x1.x1.insert((5, 5, 5));
        let mhd_from_x1 = propagate_to_mhd_faces(&hydro_x1);

        let mut hydro_x2 = CorrectionFaces::default();
        hydro_x2.x2.insert((5, 5, 5));
        let mhd_from_x2 = propagate_to_mhd_faces(&hydro_x2);

        assert_eq!(mhd_from_x1.x1.len(), mhd_from_x2.x2.len());
        assert_eq!(mhd_from_x1.x3.len(), mhd_from_x2.x1.len());
        assert_eq!(mhd_from_x1.x2.len(), mhd_from_x2.x3.len());
    }

    #[test]
    fn a_bad_cell_at_the_domain_edge_does_not_panic() {
        let faces = faces_around(&[(0, 0, 0)]);
        let mhd = propagate_to_mhd_faces(&faces);
        assert!(!mhd.is_empty());
    }
}
