//! Two-site Trotter updates with truncated SVD.
//!
//! A single bond update acts on the five-node window around the bond,
//!
//! ```text
//!        -1      1      3      4      6      -4
//!  θ  =  --- λl --- Γa --- λc --- Γb --- λr ---
//!                   |2            |5
//!                  [-----  U  -----]
//!                   |-2           |-3
//! ```
//!
//! after which `θ` is fused into a `(χ d) × (d χ)` matrix and split again by
//! SVD. The largest `χ` singular values become the new central weight
//! (normalized to sum to 1), and the outer weights are divided back out of the
//! new site tensors to restore the canonical form.

use ndarray as nd;
use ndarray_linalg::{ SVDInto, error::LinalgError };
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    mps::{ MpsError, MpsState },
    network::{ self, NetworkError },
    plan::{ ContractionPlan, Parity, UPDATE_LEGS },
    trotter::TrotterGates,
};

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Returned when the SVD doesn't produce both sets of singular vectors.
    #[error("error in bond update: SVD did not return singular vectors")]
    MissingFactors,

    #[error("network error: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("mps error: {0}")]
    MpsError(#[from] MpsError),

    #[error("linalg error: {0}")]
    LinalgError(#[from] LinalgError),

    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use UpdateError::*;
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Apply one sweep of Trotter gates: every AB bond in unit-cell order, then
/// every BA bond.
pub fn cell_update(mps: &mut MpsState, plan: &ContractionPlan, gates: &TrotterGates)
    -> UpdateResult<()>
{
    for parity in Parity::ALL {
        for c in 0..plan.unit_cells() {
            update_bond(mps, plan.bond_window(parity, c), gates.get(parity))?;
        }
    }
    Ok(())
}

/// Apply `gate` to the bond at the center of `window`, given as the sequence
/// positions `[λl, Γa, λc, Γb, λr]`.
pub fn update_bond(mps: &mut MpsState, window: [usize; 5], gate: &nd::Array4<C64>)
    -> UpdateResult<()>
{
    let chi = mps.bond_dim();
    let d = mps.phys_dim();
    let [pos_l, pos_a, pos_c, pos_b, pos_r] = window;

    let mut tensors = mps.window_tensors(&window, 0, false);
    tensors.push(gate.clone().into_dyn());
    let theta: nd::Array2<C64>
        = network::ncon(tensors, &UPDATE_LEGS)?
        .into_shape((chi * d, d * chi))?;

    let (Some(u), s, Some(vh)) = theta.svd_into(true, true)?
        else { return Err(MissingFactors); };
    let s: nd::Array1<f64> = s.slice(nd::s![..chi]).to_owned();
    let norm = s.sum();
    let mut g_a: nd::Array3<C64>
        = u.slice(nd::s![.., ..chi]).to_owned()
        .into_shape((chi, d, chi))?;
    let mut g_b: nd::Array3<C64>
        = vh.slice(nd::s![..chi, ..]).to_owned()
        .into_shape((chi, d, chi))?;

    // Γa = λl^-1 . U;  Γb = Vh . λr^-1
    // zero weights are not guarded against
    g_a.axis_iter_mut(nd::Axis(0))
        .zip(mps.weight_at(pos_l)?)
        .for_each(|(mut gv, lv)| {
            gv.map_inplace(|gvk| { *gvk = *gvk / C64::from(*lv); });
        });
    g_b.axis_iter_mut(nd::Axis(2))
        .zip(mps.weight_at(pos_r)?)
        .for_each(|(mut gv, lv)| {
            gv.map_inplace(|gvk| { *gvk = *gvk / C64::from(*lv); });
        });

    mps.set_site_at(pos_a, g_a)?;
    mps.set_weight_at(pos_c, s / norm)?;
    mps.set_site_at(pos_b, g_b)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{
        hamiltonian::{ Encoder, MatrixType },
        trotter::suzuki_trotter,
    };

    #[test]
    fn sweep_preserves_structure() {
        let mut rng = StdRng::seed_from_u64(10546);
        let enc = Encoder::new(MatrixType::Pauli);
        let h = enc.encode_hamil(["zz", "xi", "ix"]).unwrap();
        let gates = suzuki_trotter(&h, 0.05).unwrap();
        for uc in 1..=2 {
            let plan = ContractionPlan::new(uc).unwrap();
            let mut mps = MpsState::random(2, 3, uc, &mut rng).unwrap();
            for _ in 0..5 {
                cell_update(&mut mps, &plan, &gates).unwrap();
            }
            assert_eq!(mps.len(), 4 * uc);
            for k in 0..2 * uc {
                assert_eq!(mps.site(k).unwrap().shape(), &[3, 2, 3]);
                let l = mps.weight(k).unwrap();
                assert_eq!(l.len(), 3);
                assert!((l.sum() - 1.0).abs() < 1e-12);
                assert!(l.iter().all(|lk| *lk >= 0.0));
                assert!(l.windows(2).into_iter().all(|w| w[0] >= w[1]));
            }
            assert!(mps.is_finite());
        }
    }

    fn identity_deviation(m: &nd::Array2<C64>) -> f64 {
        m.indexed_iter()
            .map(|((i, j), mij)| {
                let id = if i == j { 1.0 } else { 0.0 };
                (mij - C64::from(id)).norm()
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn update_restores_canonical_form() {
        let mut rng = StdRng::seed_from_u64(123);
        let enc = Encoder::new(MatrixType::Pauli);
        let h = enc.encode_hamil(["zz", "xi", "ix", "yy"]).unwrap();
        let gates = suzuki_trotter(&h, 0.1).unwrap();
        let plan = ContractionPlan::new(2).unwrap();
        let mut mps = MpsState::random(2, 3, 2, &mut rng).unwrap();
        let (left, right) = mps.transfer_matrices(1).unwrap();
        assert!(identity_deviation(&left) > 1e-3);
        assert!(identity_deviation(&right) > 1e-3);

        for parity in Parity::ALL {
            for c in 0..2 {
                update_bond(&mut mps, plan.bond_window(parity, c), gates.get(parity))
                    .unwrap();
                // Γa is left-canonical against λl, Γb right-canonical
                // against λr
                let bond = 2 * c + parity.offset();
                let (left, _) = mps.transfer_matrices(bond).unwrap();
                let (_, right) = mps.transfer_matrices((bond + 1) % 4).unwrap();
                assert!(identity_deviation(&left) < 1e-10, "bond {bond}");
                assert!(identity_deviation(&right) < 1e-10, "bond {bond}");
            }
        }
    }

    #[test]
    fn single_bond_touches_window_only() {
        let mut rng = StdRng::seed_from_u64(99);
        let enc = Encoder::new(MatrixType::Pauli);
        let h = enc.encode_hamil(["zz"]).unwrap();
        let gates = suzuki_trotter(&h, 0.1).unwrap();
        let plan = ContractionPlan::new(2).unwrap();
        let mut mps = MpsState::random(2, 2, 2, &mut rng).unwrap();
        let before = mps.clone();
        let window = plan.bond_window(Parity::AB, 1);
        update_bond(&mut mps, window, gates.get(Parity::AB)).unwrap();
        for pos in 0..mps.len() {
            if window[1..4].contains(&pos) { continue; }
            assert_eq!(mps.node(pos), before.node(pos));
        }
        assert_ne!(mps.node(window[2]), before.node(window[2]));
    }
}
