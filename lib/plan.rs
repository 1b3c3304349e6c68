//! Precomputed leg labels and node windows for contractions over an infinite
//! MPS with a repeating unit cell.
//!
//! A unit cell of `n` cells holds `2n` sites and `2n` bond weights, stored in a
//! single sequence of period `L = 4n`:
//!
//! ```text
//!  pos:   0      1      2      3           L-2       L-1
//!        Γ[0] - λ[0] - Γ[1] - λ[1] - ... - Γ[2n-1] - λ[2n-1] - (Γ[0] ...)
//! ```
//!
//! Expectation values are computed over a *window* of the sequence, starting
//! and ending with the weight that closes the cell,
//!
//! ```text
//!  λ[2n-1] - Γ[0] - λ[0] - ... - Γ[2n-1] - λ[2n-1]
//! ```
//!
//! contracted against its complex conjugate with the outermost bond legs tied
//! together. Everything here depends only on the number of unit cells.

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    /// Returned when attempting to build a plan for zero unit cells.
    #[error("error in ContractionPlan::new: unit_cells must be positive")]
    ZeroUnitCells,
}
use PlanError::*;
pub type PlanResult<T> = Result<T, PlanError>;

/// Leg labels for the two-site update,
/// `λl[-1,1] Γa[1,2,3] λc[3,4] Γb[4,5,6] λr[6,-4] U[-2,-3,2,5]`, producing
/// `θ[left, out1, out2, right]`.
pub static UPDATE_LEGS: Lazy<Vec<Vec<i32>>>
    = Lazy::new(|| {
        vec![
            vec![-1, 1],
            vec![1, 2, 3],
            vec![3, 4],
            vec![4, 5, 6],
            vec![6, -4],
            vec![-2, -3, 2, 5],
        ]
    });

/// Parity of a bond within a unit cell.
///
/// Bond `k` (between sites `k` and `k + 1`) has parity `AB` if `k` is even and
/// `BA` otherwise.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parity {
    AB,
    BA,
}

impl Parity {
    /// Both parities, in update order.
    pub const ALL: [Parity; 2] = [Parity::AB, Parity::BA];

    /// Offset of the parity's bond within a unit cell.
    pub fn offset(self) -> usize {
        match self {
            Self::AB => 0,
            Self::BA => 1,
        }
    }

    /// Parity of the `bond`-th bond.
    pub fn of_bond(bond: usize) -> Self {
        if bond % 2 == 0 { Self::AB } else { Self::BA }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AB => "AB",
            Self::BA => "BA",
        }
    }
}

/// Immutable collection of all leg labels and node windows for a fixed number
/// of unit cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractionPlan {
    unit_cells: usize,
    node_window: Vec<usize>,
    norm_legs: Vec<Vec<i32>>,
    cell_legs: Vec<Vec<i32>>,
    bond_legs: Vec<Vec<i32>>,
    bond_windows: [Vec<[usize; 5]>; 2],
}

impl ContractionPlan {
    /// Build all labels for `unit_cells` unit cells.
    ///
    /// Fails if `unit_cells == 0`.
    pub fn new(unit_cells: usize) -> PlanResult<Self> {
        if unit_cells == 0 { return Err(ZeroUnitCells); }
        let period = 4 * unit_cells;
        let node_window: Vec<usize>
            = (0..=period).map(|i| (period - 1 + i) % period).collect();
        let bond_windows: [Vec<[usize; 5]>; 2]
            = Parity::ALL.map(|parity| {
                (0..unit_cells)
                    .map(|c| {
                        let start = 4 * c + 2 * parity.offset();
                        std::array::from_fn(|j| {
                            node_window[(start + j) % period]
                        })
                    })
                    .collect()
            });
        Ok(Self {
            unit_cells,
            norm_legs: norm_legs(unit_cells),
            cell_legs: cell_legs(unit_cells),
            bond_legs: bond_legs(unit_cells),
            node_window,
            bond_windows,
        })
    }

    pub fn unit_cells(&self) -> usize { self.unit_cells }

    /// Length of the node sequence, `4 * unit_cells`.
    pub fn period(&self) -> usize { 4 * self.unit_cells }

    /// Sequence positions of the expectation window, `L - 1, 0, 1, ..., L - 1`.
    pub fn node_window(&self) -> &[usize] { &self.node_window }

    /// Labels for the ket and bra windows with all physical legs tied.
    pub fn norm_legs(&self) -> &[Vec<i32>] { &self.norm_legs }

    /// Labels for the ket and bra windows followed by one operator per unit
    /// cell, each acting on that cell's AB bond.
    pub fn cell_legs(&self) -> &[Vec<i32>] { &self.cell_legs }

    /// Labels for the ket and bra windows followed by a single operator on the
    /// first bond of the window, with all other physical legs tied.
    pub fn bond_legs(&self) -> &[Vec<i32>] { &self.bond_legs }

    /// Update labels; see [`UPDATE_LEGS`].
    pub fn update_legs(&self) -> &[Vec<i32>] { &UPDATE_LEGS }

    /// Sequence positions `[λl, Γa, λc, Γb, λr]` around bond
    /// `2 * unit_cell + parity.offset()`.
    ///
    /// *Panics* if `unit_cell` is out of bounds.
    pub fn bond_window(&self, parity: Parity, unit_cell: usize) -> [usize; 5] {
        self.bond_windows[parity.offset()][unit_cell]
    }
}

// walk the window twice (ket then bra), labeling each node's legs in sequence
// and closing the outer bond legs between the two copies
fn base_legs(unit_cells: usize) -> Vec<Vec<i32>> {
    let period = 4 * unit_cells;
    let mut legs: Vec<Vec<i32>> = Vec::with_capacity(2 * (period + 1));
    let mut p: i32 = 1;
    for _ in 0..2 {
        for i in 0..=period {
            if i % 2 == 0 {
                legs.push(vec![p, p + 1]);
                p += 1;
            } else {
                legs.push(vec![p, p + 1, p + 2]);
                p += 2;
            }
        }
    }
    legs[period + 1][0] = legs[0][0];
    let ket_end = legs[period][1];
    if let Some(bra_end) = legs.last_mut() { bra_end[1] = ket_end; }
    legs
}

// tie the bra physical legs of unit cell `c` to the ket's
fn tie_cell(legs: &mut [Vec<i32>], unit_cells: usize, c: usize) {
    let j = 4 * unit_cells + 1;
    let t = 1 + 4 * c;
    legs[t + j][1] = legs[t][1];
    legs[t + j + 2][1] = legs[t + 2][1];
}

// operator labels `[bra, bra, ket, ket]` on the AB bond of unit cell `c`
fn operator_legs(legs: &[Vec<i32>], unit_cells: usize, c: usize) -> Vec<i32> {
    let j = 4 * unit_cells + 1;
    let t = 1 + 4 * c;
    vec![legs[t + j][1], legs[t + j + 2][1], legs[t][1], legs[t + 2][1]]
}

fn norm_legs(unit_cells: usize) -> Vec<Vec<i32>> {
    let mut legs = base_legs(unit_cells);
    (0..unit_cells).for_each(|c| tie_cell(&mut legs, unit_cells, c));
    legs
}

fn cell_legs(unit_cells: usize) -> Vec<Vec<i32>> {
    let mut legs = base_legs(unit_cells);
    let ops: Vec<Vec<i32>>
        = (0..unit_cells)
        .map(|c| operator_legs(&legs, unit_cells, c))
        .collect();
    legs.extend(ops);
    legs
}

fn bond_legs(unit_cells: usize) -> Vec<Vec<i32>> {
    let mut legs = base_legs(unit_cells);
    let op = operator_legs(&legs, unit_cells, 0);
    (1..unit_cells).for_each(|c| tie_cell(&mut legs, unit_cells, c));
    legs.push(op);
    legs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap as HashMap;

    fn label_counts(legs: &[Vec<i32>]) -> HashMap<i32, usize> {
        let mut counts: HashMap<i32, usize> = HashMap::default();
        legs.iter().flatten().for_each(|l| { *counts.entry(*l).or_insert(0) += 1; });
        counts
    }

    #[test]
    fn single_cell_literals() {
        let plan = ContractionPlan::new(1).unwrap();
        assert_eq!(plan.period(), 4);
        assert_eq!(plan.node_window(), &[3, 0, 1, 2, 3]);
        let norm: Vec<Vec<i32>>
            = vec![
                vec![1, 2], vec![2, 3, 4], vec![4, 5], vec![5, 6, 7], vec![7, 8],
                vec![1, 9], vec![9, 3, 11], vec![11, 12], vec![12, 6, 14], vec![14, 8],
            ];
        assert_eq!(plan.norm_legs(), norm.as_slice());
        let cell = plan.cell_legs();
        assert_eq!(cell.len(), 11);
        assert_eq!(cell[10], vec![10, 13, 3, 6]);
        assert_eq!(cell[6], vec![9, 10, 11]);
        assert_eq!(plan.bond_legs(), cell);
    }

    #[test]
    fn labels_pair_exactly() {
        for uc in 1..=4 {
            let plan = ContractionPlan::new(uc).unwrap();
            for legs in [plan.norm_legs(), plan.cell_legs(), plan.bond_legs()] {
                let counts = label_counts(legs);
                assert!(counts.keys().all(|l| *l > 0));
                assert!(counts.values().all(|n| *n == 2), "uc = {uc}");
            }
            assert_eq!(plan.norm_legs().len(), 2 * (4 * uc + 1));
            assert_eq!(plan.cell_legs().len(), 2 * (4 * uc + 1) + uc);
            assert_eq!(plan.bond_legs().len(), 2 * (4 * uc + 1) + 1);
        }
    }

    #[test]
    fn update_legs_outputs() {
        let counts = label_counts(&UPDATE_LEGS);
        let mut outs: Vec<i32>
            = counts.iter()
            .filter(|(l, _)| **l < 0)
            .map(|(l, n)| { assert_eq!(*n, 1); *l })
            .collect();
        outs.sort_unstable();
        assert_eq!(outs, vec![-4, -3, -2, -1]);
        assert!(counts.iter().filter(|(l, _)| **l > 0).all(|(_, n)| *n == 2));
    }

    #[test]
    fn bond_windows() {
        let plan = ContractionPlan::new(2).unwrap();
        assert_eq!(plan.bond_window(Parity::AB, 0), [7, 0, 1, 2, 3]);
        assert_eq!(plan.bond_window(Parity::AB, 1), [3, 4, 5, 6, 7]);
        assert_eq!(plan.bond_window(Parity::BA, 0), [1, 2, 3, 4, 5]);
        assert_eq!(plan.bond_window(Parity::BA, 1), [5, 6, 7, 0, 1]);
        for uc in 1..=3 {
            let plan = ContractionPlan::new(uc).unwrap();
            for parity in Parity::ALL {
                for c in 0..uc {
                    let w = plan.bond_window(parity, c);
                    let bond = 2 * c + parity.offset();
                    assert_eq!(w[1], 2 * bond);
                    assert_eq!(w[3], (2 * bond + 2) % plan.period());
                    assert!(w[0] % 2 == 1 && w[2] % 2 == 1 && w[4] % 2 == 1);
                }
            }
        }
    }

    #[test]
    fn zero_unit_cells() {
        assert!(matches!(ContractionPlan::new(0), Err(ZeroUnitCells)));
    }

    #[test]
    fn parity_of_bond() {
        assert_eq!(Parity::of_bond(0), Parity::AB);
        assert_eq!(Parity::of_bond(3), Parity::BA);
        assert_eq!(Parity::BA.offset(), 1);
    }
}
