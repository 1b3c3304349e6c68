//! Expectation values of local operators over an infinite MPS.
//!
//! Every expectation value is computed over a single window of the unit cell
//! (see [`plan`][crate::plan]), contracted once against its conjugate with all
//! physical legs tied to give the norm, and once more with operators inserted:
//!
//! ```text
//!  .- λ - Γ - λ - Γ - ... - λ -.
//!  |      |       |            |
//!  |     [ O  ...  ]           |
//!  |      |       |            |
//!  '- λ - Γ*- λ - Γ*- ... - λ -'
//! ```
//!
//! Windows are shifted along the unit cell to bring the bond of interest to
//! the front. Results are the real part of `⟨O⟩ / ⟨1⟩`.

use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    hamiltonian::{ BondHamiltonian, Encoder, HamiltonianError, MatrixType, PauliOp },
    mps::MpsState,
    network::{ self, NetworkError },
    plan::{ ContractionPlan, Parity },
};

#[derive(Debug, Error)]
pub enum ExpectError {
    /// Returned when a bond index is outside the unit cell.
    #[error("error in expectation: bond {bond} out of range for {bonds} bonds")]
    BondOutOfRange { bond: usize, bonds: usize },

    /// Returned when a unit cell index is out of range.
    #[error("error in expectation: unit cell {cell} out of range for {cells} unit cells")]
    CellOutOfRange { cell: usize, cells: usize },

    /// Returned when an operator doesn't have shape `(d, d, d, d)`.
    #[error("error in expectation: operator must have shape {expected:?}, got {found:?}")]
    OperatorShape { expected: [usize; 4], found: Vec<usize> },

    /// Returned when the state and the contraction plan disagree on the number
    /// of unit cells.
    #[error("error in expectation: state has {state} unit cells but plan has {plan}")]
    PlanMismatch { state: usize, plan: usize },

    #[error("network error: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("hamiltonian error: {0}")]
    HamiltonianError(#[from] HamiltonianError),
}
use ExpectError::*;
pub type ExpectResult<T> = Result<T, ExpectError>;

fn check(mps: &MpsState, plan: &ContractionPlan, op: &nd::Array4<C64>)
    -> ExpectResult<()>
{
    if mps.unit_cells() != plan.unit_cells() {
        return Err(PlanMismatch { state: mps.unit_cells(), plan: plan.unit_cells() });
    }
    let d = mps.phys_dim();
    if op.shape() != [d, d, d, d] {
        return Err(OperatorShape { expected: [d; 4], found: op.shape().to_vec() });
    }
    Ok(())
}

// ket window followed by its conjugate, with the sequence shifted left by
// `shift` positions
fn window_pair(mps: &MpsState, plan: &ContractionPlan, shift: usize)
    -> Vec<nd::ArrayD<C64>>
{
    let mut tensors = mps.window_tensors(plan.node_window(), shift, false);
    tensors.append(&mut mps.window_tensors(plan.node_window(), shift, true));
    tensors
}

// ⟨ops⟩ / ⟨1⟩ for operators labeled by `legs`
fn normalized<'a, I>(
    mps: &MpsState,
    plan: &ContractionPlan,
    shift: usize,
    ops: I,
    legs: &[Vec<i32>],
) -> ExpectResult<f64>
where I: IntoIterator<Item = &'a nd::Array4<C64>>
{
    let mut tensors = window_pair(mps, plan, shift);
    let norm = network::into_scalar(network::ncon(tensors.clone(), plan.norm_legs())?)?;
    tensors.extend(ops.into_iter().map(|op| op.clone().into_dyn()));
    let value = network::into_scalar(network::ncon(tensors, legs)?)?;
    Ok((value / norm).re)
}

/// Expectation value of a two-site operator on the `bond`-th bond
/// (`0 <= bond < 2 * unit_cells`), between sites `bond` and `bond + 1`.
pub fn expectation_bond(
    mps: &MpsState,
    plan: &ContractionPlan,
    operator: &nd::Array4<C64>,
    bond: usize,
) -> ExpectResult<f64>
{
    check(mps, plan, operator)?;
    let bonds = mps.num_sites();
    if bond >= bonds { return Err(BondOutOfRange { bond, bonds }); }
    normalized(mps, plan, 2 * bond, [operator], plan.bond_legs())
}

/// Energy of every bond, in bond order, using the AB operator on even bonds
/// and the BA operator on odd bonds.
pub fn mps_bonds_energy(
    mps: &MpsState,
    plan: &ContractionPlan,
    hamiltonian: &BondHamiltonian,
) -> ExpectResult<Vec<f64>>
{
    (0..mps.num_sites())
        .map(|bond| {
            let op = hamiltonian.get(Parity::of_bond(bond));
            expectation_bond(mps, plan, op, bond)
        })
        .collect()
}

/// Total energy per unit cell.
pub fn expectation_value(
    mps: &MpsState,
    plan: &ContractionPlan,
    hamiltonian: &BondHamiltonian,
) -> ExpectResult<f64>
{
    Ok(mps_bonds_energy(mps, plan, hamiltonian)?.into_iter().sum())
}

/// Expectation value of the product of one copy of `operator` on the AB bond
/// of every unit cell.
pub fn expectation_cells(
    mps: &MpsState,
    plan: &ContractionPlan,
    operator: &nd::Array4<C64>,
) -> ExpectResult<f64>
{
    check(mps, plan, operator)?;
    let ops = std::iter::repeat(operator).take(plan.unit_cells());
    normalized(mps, plan, 0, ops, plan.cell_legs())
}

/// Magnetization along `direction` of the `site_index`-th qubit (counting from
/// the left, `0 <= site_index < 2 log2(d)`) in the `unit_cell`-th unit cell.
///
/// Requires the physical dimension to be a power of 2.
pub fn expectation_single_site_mag(
    mps: &MpsState,
    plan: &ContractionPlan,
    matrix_type: MatrixType,
    unit_cell: usize,
    site_index: usize,
    direction: PauliOp,
) -> ExpectResult<f64>
{
    let cells = mps.unit_cells();
    if unit_cell >= cells { return Err(CellOutOfRange { cell: unit_cell, cells }); }
    let op = Encoder::new(matrix_type)
        .single_site_operator(mps.phys_dim(), site_index, direction)?;
    check(mps, plan, &op)?;
    normalized(mps, plan, 4 * unit_cell, [&op], plan.bond_legs())
}

/// Magnetization of every qubit along a set of directions.
#[derive(Clone, Debug, PartialEq)]
pub struct MagProfile {
    directions: Vec<PauliOp>,
    values: Vec<Vec<f64>>,
    means: Vec<f64>,
    value: f64,
}

impl MagProfile {
    pub fn directions(&self) -> &[PauliOp] { &self.directions }

    /// Per-qubit magnetizations along `direction`, ordered by unit cell and
    /// then by qubit.
    pub fn get(&self, direction: PauliOp) -> Option<&[f64]> {
        self.directions.iter()
            .position(|d| *d == direction)
            .map(|k| self.values[k].as_slice())
    }

    /// Mean magnetization along `direction`.
    pub fn mean(&self, direction: PauliOp) -> Option<f64> {
        self.directions.iter()
            .position(|d| *d == direction)
            .map(|k| self.means[k])
    }

    /// Iterate over `(direction, per-qubit values, mean)`.
    pub fn iter(&self) -> impl Iterator<Item = (PauliOp, &[f64], f64)> + '_ {
        self.directions.iter()
            .zip(&self.values)
            .zip(&self.means)
            .map(|((d, v), m)| (*d, v.as_slice(), *m))
    }

    /// Norm of the vector of means, `sqrt(Σ mean²)`.
    pub fn value(&self) -> f64 { self.value }
}

/// Magnetization of every qubit of every unit cell along each of `directions`.
pub fn expectation_all_sites_mag(
    mps: &MpsState,
    plan: &ContractionPlan,
    matrix_type: MatrixType,
    directions: &[PauliOp],
) -> ExpectResult<MagProfile>
{
    let d = mps.phys_dim();
    if !d.is_power_of_two() || d < 2 {
        return Err(HamiltonianError::NotPowerOfTwo(d).into());
    }
    let qubits = 2 * d.trailing_zeros() as usize;
    let values: Vec<Vec<f64>>
        = directions.iter()
        .map(|dir| {
            (0..mps.unit_cells())
                .flat_map(|c| (0..qubits).map(move |q| (c, q)))
                .map(|(c, q)| {
                    expectation_single_site_mag(mps, plan, matrix_type, c, q, *dir)
                })
                .collect::<ExpectResult<Vec<f64>>>()
        })
        .collect::<ExpectResult<_>>()?;
    let means: Vec<f64>
        = values.iter()
        .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        .collect();
    let value = means.iter().map(|m| m * m).sum::<f64>().sqrt();
    Ok(MagProfile { directions: directions.to_vec(), values, means, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::hamiltonian::identity_operator;

    #[test]
    fn expectation_is_linear_in_the_operator() {
        let mut rng = StdRng::seed_from_u64(2024);
        let enc = Encoder::new(MatrixType::Pauli);
        let zz = enc.operator("zz").unwrap();
        let xy = enc.operator("xy").unwrap();
        let combo = enc.encode_terms([(2.0, "zz"), (-0.5, "xy")]).unwrap();
        for uc in 1..=2 {
            let plan = ContractionPlan::new(uc).unwrap();
            let mps = MpsState::random(2, 2, uc, &mut rng).unwrap();
            for bond in 0..2 * uc {
                let e_zz = expectation_bond(&mps, &plan, &zz, bond).unwrap();
                let e_xy = expectation_bond(&mps, &plan, &xy, bond).unwrap();
                let e = expectation_bond(&mps, &plan, &combo, bond).unwrap();
                assert!((e - (2.0 * e_zz - 0.5 * e_xy)).abs() < 1e-10, "uc = {uc}, bond = {bond}");
                assert!(e_zz.abs() <= 1.0 + 1e-10);
            }
        }
        // with a single cell, the product over cells is the first bond
        let plan = ContractionPlan::new(1).unwrap();
        let mps = MpsState::random(2, 2, 1, &mut rng).unwrap();
        let e_cells = expectation_cells(&mps, &plan, &zz).unwrap();
        let e_bond = expectation_bond(&mps, &plan, &zz, 0).unwrap();
        assert!((e_cells - e_bond).abs() < 1e-12);
    }

    #[test]
    fn magnetization_is_bounded() {
        let mut rng = StdRng::seed_from_u64(17);
        let plan = ContractionPlan::new(2).unwrap();
        let mps = MpsState::random(4, 2, 2, &mut rng).unwrap();
        let dirs = [PauliOp::X, PauliOp::Z];
        let prof
            = expectation_all_sites_mag(&mps, &plan, MatrixType::Pauli, &dirs)
            .unwrap();
        for (_, vals, mean) in prof.iter() {
            assert_eq!(vals.len(), 2 * 4);
            assert!(vals.iter().all(|m| m.abs() <= 1.0 + 1e-10));
            assert!(mean.abs() <= 1.0 + 1e-10);
        }
        let mx = prof.mean(PauliOp::X).unwrap();
        let mz = prof.mean(PauliOp::Z).unwrap();
        assert!((prof.value() - (mx * mx + mz * mz).sqrt()).abs() < 1e-14);
        assert!(prof.get(PauliOp::Y).is_none());
    }

    #[test]
    fn bond_energy_picks_parity() {
        let mut rng = StdRng::seed_from_u64(3);
        let plan = ContractionPlan::new(1).unwrap();
        let mps = MpsState::random(2, 2, 1, &mut rng).unwrap();
        let enc = Encoder::new(MatrixType::Pauli);
        let zz = enc.operator("zz").unwrap();
        let id = identity_operator(2);
        let h = BondHamiltonian::new(zz.clone(), id, MatrixType::Pauli).unwrap();
        let energies = mps_bonds_energy(&mps, &plan, &h).unwrap();
        assert_eq!(energies.len(), 2);
        assert!((energies[1] - 1.0).abs() < 1e-10);
        let e0 = expectation_bond(&mps, &plan, &zz, 0).unwrap();
        assert!((energies[0] - e0).abs() < 1e-14);
        let total = expectation_value(&mps, &plan, &h).unwrap();
        assert!((total - energies.iter().sum::<f64>()).abs() < 1e-14);
    }

    #[test]
    fn bad_arguments() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = ContractionPlan::new(1).unwrap();
        let mps = MpsState::random(2, 2, 1, &mut rng).unwrap();
        let id = identity_operator(2);
        assert!(matches!(
            expectation_bond(&mps, &plan, &id, 2),
            Err(BondOutOfRange { bond: 2, bonds: 2 }),
        ));
        assert!(matches!(
            expectation_bond(&mps, &plan, &identity_operator(3), 0),
            Err(OperatorShape { .. }),
        ));
        assert!(matches!(
            expectation_bond(&mps, &ContractionPlan::new(2).unwrap(), &id, 0),
            Err(PlanMismatch { state: 1, plan: 2 }),
        ));
        assert!(matches!(
            expectation_single_site_mag(&mps, &plan, MatrixType::Pauli, 1, 0, PauliOp::Z),
            Err(CellOutOfRange { cell: 1, cells: 1 }),
        ));
    }
}
