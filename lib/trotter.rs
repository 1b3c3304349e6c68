//! First-order Suzuki-Trotter gates for imaginary-time evolution.
//!
//! For a step size δ, every bond operator `H` is mapped to `exp(-δ H)`. Bond
//! Hamiltonians are Hermitian, so the exponential is taken through the
//! eigendecomposition `H = V diag(w) V†`:
//!
//! ```text
//! exp(-δ H) = V diag(exp(-δ w)) V†
//! ```

use ndarray as nd;
use ndarray_linalg::{ Eigh, UPLO, error::LinalgError };
use num_complex::Complex64 as C64;
use thiserror::Error;
use tracing::debug;
use crate::{
    hamiltonian::BondHamiltonian,
    plan::Parity,
};

/// Largest tolerated element of `H - H†`.
pub const HERMITIAN_TOL: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum TrotterError {
    /// Returned when a rank-4 operator doesn't reshape to a square matrix.
    #[error("error in suzuki_trotter: operator of shape {0:?} is not square")]
    NotSquare(Vec<usize>),

    /// Returned when an operator deviates from Hermiticity by more than
    /// [`HERMITIAN_TOL`].
    #[error("error in suzuki_trotter: operator is not Hermitian (max deviation {0:e})")]
    NotHermitian(f64),

    /// Returned when the eigensolver fails.
    #[error("linalg error: {0}")]
    LinalgError(#[from] LinalgError),

    /// Returned when reshaping between matrix and operator form fails.
    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use TrotterError::*;
pub type TrotterResult<T> = Result<T, TrotterError>;

/// Short-time evolution operators for both bond parities at a fixed step size.
#[derive(Clone, Debug, PartialEq)]
pub struct TrotterGates {
    delta: f64,
    ab: nd::Array4<C64>,
    ba: nd::Array4<C64>,
}

impl TrotterGates {
    pub fn delta(&self) -> f64 { self.delta }

    /// Return the gate acting on bonds of the given parity.
    pub fn get(&self, parity: Parity) -> &nd::Array4<C64> {
        match parity {
            Parity::AB => &self.ab,
            Parity::BA => &self.ba,
        }
    }
}

/// Compute `exp(-delta * h)` for a Hermitian matrix `h`.
///
/// Fails with [`TrotterError::NotHermitian`] for non-Hermitian `h`; general
/// square matrices are not supported.
pub fn expm_hermitian(h: &nd::Array2<C64>, delta: f64)
    -> TrotterResult<nd::Array2<C64>>
{
    let dev: f64
        = h.iter().zip(h.t().iter())
        .map(|(a, b)| (a - b.conj()).norm())
        .fold(0.0, f64::max);
    if dev > HERMITIAN_TOL { return Err(NotHermitian(dev)); }
    let (w, v) = h.eigh(UPLO::Lower)?;
    let vh: nd::Array2<C64> = v.t().mapv(|a| a.conj());
    let mut ve = v;
    ve.axis_iter_mut(nd::Axis(1))
        .zip(&w)
        .for_each(|(mut vk, wk)| {
            let ek = C64::from((-delta * wk).exp());
            vk.map_inplace(|vkj| { *vkj *= ek; });
        });
    Ok(ve.dot(&vh))
}

/// Compute `exp(-delta * op)` for a rank-4 operator `O[out1, out2, in1, in2]`,
/// returning the result in the same form.
pub fn exp_operator(op: &nd::Array4<C64>, delta: f64)
    -> TrotterResult<nd::Array4<C64>>
{
    let sh = op.dim();
    let rows = sh.0 * sh.1;
    let cols = sh.2 * sh.3;
    if rows != cols { return Err(NotSquare(op.shape().to_vec())); }
    let h: nd::Array2<C64>
        = op.as_standard_layout().into_owned().into_shape((rows, cols))?;
    Ok(expm_hermitian(&h, delta)?.into_shape(sh)?)
}

/// Build the gates `exp(-delta * H)` for both parities of `hamiltonian`.
///
/// Only Hermitian bond operators are supported: the exponential is taken
/// through a Hermitian eigendecomposition, and an operator whose matrix form
/// differs from its conjugate transpose by more than [`HERMITIAN_TOL`] in any
/// element is rejected with [`TrotterError::NotHermitian`] instead of being
/// exponentiated.
pub fn suzuki_trotter(hamiltonian: &BondHamiltonian, delta: f64)
    -> TrotterResult<TrotterGates>
{
    debug!(delta, phys_dim = hamiltonian.phys_dim(), "building Trotter gates");
    Ok(TrotterGates {
        delta,
        ab: exp_operator(hamiltonian.ab(), delta)?,
        ba: exp_operator(hamiltonian.ba(), delta)?,
    })
}
