//! Infinite matrix product states with a repeating unit cell, factored in the
//! Vidal canonical form.
//!
//! The state is decomposed into "Γ" tensors (one per site) and "Λ" vectors (one
//! per bond). Γ tensors carry one physical index and two bond indices, while Λ
//! vectors hold the weights on each bond and are kept normalized to sum to 1.
//! A unit cell of `n` cells holds `2n` sites, so that every cell contains one
//! bond of each parity (see [`Parity`][crate::plan::Parity]), and the whole
//! infinite chain is the unit cell repeated in both directions:
//!
//! ```text
//!   ... - Λ[2n-1] - Γ[0] - Λ[0] - Γ[1] - Λ[1] - ... - Γ[2n-1] - Λ[2n-1] - Γ[0] - ...
//!                    |             |                   |
//!                    | <- physical | <- physical       | <- physical
//! ```
//!
//! All nodes are stored in a single sequence of length `4n`, with site `k` at
//! position `2k` and the weight of bond `k` (between sites `k` and `k + 1`,
//! cyclically) at position `2k + 1`.

use itertools::iproduct;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MpsError {
    /// Returned when attempting to create a state with zero unit cells or a
    /// zero physical or bond dimension.
    #[error("error in MPS creation: dimensions and unit cell count must be non-zero")]
    EmptySystem,

    /// Returned when a sequence position holding a weight was accessed as a
    /// site.
    #[error("error in MPS access: position {0} is not a site")]
    NotASite(usize),

    /// Returned when a sequence position holding a site was accessed as a
    /// weight.
    #[error("error in MPS access: position {0} is not a weight")]
    NotAWeight(usize),

    /// Returned when a position lies outside the node sequence.
    #[error("error in MPS access: position {0} out of bounds")]
    OutOfBounds(usize),

    /// Returned when a replacement site tensor has the wrong shape.
    #[error("error in MPS update: site at position {pos} must have shape {expected:?}, got {found:?}")]
    SiteShape { pos: usize, expected: [usize; 3], found: Vec<usize> },

    /// Returned when a replacement weight vector has the wrong length.
    #[error("error in MPS update: weight at position {pos} must have length {expected}, got {found}")]
    WeightShape { pos: usize, expected: usize, found: usize },

    /// Returned when a flattened state has the wrong number of entries.
    #[error("error in MPS creation: flat data must have length {expected}, got {found}")]
    FlatLength { expected: usize, found: usize },
}
use MpsError::*;
pub type MpsResult<T> = Result<T, MpsError>;

/// A single element of the node sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Γ tensor with axes `(left bond, physical, right bond)`.
    Site(nd::Array3<C64>),
    /// Diagonal of a Λ matrix.
    Weight(nd::Array1<f64>),
}

impl Node {
    pub fn is_site(&self) -> bool { matches!(self, Self::Site(..)) }

    pub fn is_weight(&self) -> bool { matches!(self, Self::Weight(..)) }

    pub fn as_site(&self) -> Option<&nd::Array3<C64>> {
        match self {
            Self::Site(g) => Some(g),
            Self::Weight(_) => None,
        }
    }

    pub fn as_weight(&self) -> Option<&nd::Array1<f64>> {
        match self {
            Self::Site(_) => None,
            Self::Weight(l) => Some(l),
        }
    }

    /// Convert to a dense tensor for contraction, expanding weights to
    /// diagonal matrices and optionally conjugating.
    pub fn to_dense(&self, conj: bool) -> nd::ArrayD<C64> {
        match self {
            Self::Site(g) if conj => g.mapv(|gk| gk.conj()).into_dyn(),
            Self::Site(g) => g.clone().into_dyn(),
            Self::Weight(l) => {
                let mut m: nd::Array2<C64> = nd::Array2::zeros((l.len(), l.len()));
                m.diag_mut().iter_mut()
                    .zip(l)
                    .for_each(|(mk, lk)| { *mk = C64::from(*lk); });
                m.into_dyn()
            },
        }
    }
}

/// An infinite MPS with a repeating unit cell.
#[derive(Clone, Debug, PartialEq)]
pub struct MpsState {
    phys_dim: usize,
    bond_dim: usize,
    unit_cells: usize,
    nodes: Vec<Node>,
}

impl MpsState {
    /// Randomly initialize a state.
    ///
    /// Site entries are drawn uniformly from `[0, 1)` and scaled so that the
    /// largest has magnitude 1; weight entries are drawn uniformly from
    /// `[0, 1)` and normalized to sum to 1.
    pub fn random<R>(
        phys_dim: usize,
        bond_dim: usize,
        unit_cells: usize,
        rng: &mut R,
    ) -> MpsResult<Self>
    where R: Rng + ?Sized
    {
        if phys_dim == 0 || bond_dim == 0 || unit_cells == 0 {
            return Err(EmptySystem);
        }
        let mut nodes: Vec<Node> = Vec::with_capacity(4 * unit_cells);
        for _ in 0..2 * unit_cells {
            let g: nd::Array3<f64>
                = nd::Array3::from_shape_simple_fn(
                    (bond_dim, phys_dim, bond_dim), || rng.gen::<f64>());
            let max = g.iter().fold(0.0_f64, |acc, gk| acc.max(gk.abs()));
            nodes.push(Node::Site(g.mapv(|gk| C64::from(gk / max))));
            let l: nd::Array1<f64>
                = nd::Array1::from_shape_simple_fn(bond_dim, || rng.gen::<f64>());
            let norm = l.sum();
            nodes.push(Node::Weight(l / norm));
        }
        Ok(Self { phys_dim, bond_dim, unit_cells, nodes })
    }

    /// Rebuild a state from the output of [`Self::flatten`].
    ///
    /// Weight entries are taken from the real parts of their slots.
    pub fn from_flat(
        phys_dim: usize,
        bond_dim: usize,
        unit_cells: usize,
        data: &[C64],
    ) -> MpsResult<Self>
    {
        if phys_dim == 0 || bond_dim == 0 || unit_cells == 0 {
            return Err(EmptySystem);
        }
        let site_len = bond_dim * phys_dim * bond_dim;
        let expected = 2 * unit_cells * (site_len + bond_dim);
        if data.len() != expected {
            return Err(FlatLength { expected, found: data.len() });
        }
        let nodes: Vec<Node>
            = data.chunks_exact(site_len + bond_dim)
            .flat_map(|chunk| {
                let (g, l) = chunk.split_at(site_len);
                let g: nd::Array3<C64>
                    = nd::Array3::from_shape_fn(
                        (bond_dim, phys_dim, bond_dim),
                        |(u, s, v)| g[(u * phys_dim + s) * bond_dim + v],
                    );
                let l: nd::Array1<f64> = l.iter().map(|lk| lk.re).collect();
                [Node::Site(g), Node::Weight(l)]
            })
            .collect();
        Ok(Self { phys_dim, bond_dim, unit_cells, nodes })
    }

    /// Flatten the state into a single row: each site tensor in row-major
    /// order followed by the diagonal of the weight to its right.
    pub fn flatten(&self) -> Vec<C64> {
        self.nodes.iter()
            .flat_map(|node| {
                match node {
                    Node::Site(g) => g.iter().copied().collect::<Vec<C64>>(),
                    Node::Weight(l) => l.iter().map(|lk| C64::from(*lk)).collect(),
                }
            })
            .collect()
    }

    pub fn phys_dim(&self) -> usize { self.phys_dim }

    pub fn bond_dim(&self) -> usize { self.bond_dim }

    pub fn unit_cells(&self) -> usize { self.unit_cells }

    /// Length of the node sequence, always `4 * unit_cells`.
    pub fn len(&self) -> usize { self.nodes.len() }

    /// Always `false`.
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Number of sites (and bonds) in the unit cell.
    pub fn num_sites(&self) -> usize { 2 * self.unit_cells }

    pub fn nodes(&self) -> &[Node] { &self.nodes }

    pub fn node(&self, pos: usize) -> Option<&Node> { self.nodes.get(pos) }

    /// Return the Γ tensor of the `k`-th site, if it exists.
    pub fn site(&self, k: usize) -> Option<&nd::Array3<C64>> {
        self.nodes.get(2 * k).and_then(Node::as_site)
    }

    /// Return the weights on the `k`-th bond, if it exists.
    pub fn weight(&self, k: usize) -> Option<&nd::Array1<f64>> {
        self.nodes.get(2 * k + 1).and_then(Node::as_weight)
    }

    /// Iterate over all bond weights, in bond order.
    pub fn weights(&self) -> impl Iterator<Item = &nd::Array1<f64>> + '_ {
        self.nodes.iter().filter_map(Node::as_weight)
    }

    /// Return the Γ tensor at sequence position `pos`.
    pub fn site_at(&self, pos: usize) -> MpsResult<&nd::Array3<C64>> {
        self.nodes.get(pos)
            .ok_or(OutOfBounds(pos))?
            .as_site()
            .ok_or(NotASite(pos))
    }

    /// Return the weights at sequence position `pos`.
    pub fn weight_at(&self, pos: usize) -> MpsResult<&nd::Array1<f64>> {
        self.nodes.get(pos)
            .ok_or(OutOfBounds(pos))?
            .as_weight()
            .ok_or(NotAWeight(pos))
    }

    /// Replace the Γ tensor at sequence position `pos`.
    pub fn set_site_at(&mut self, pos: usize, g: nd::Array3<C64>)
        -> MpsResult<()>
    {
        let expected = [self.bond_dim, self.phys_dim, self.bond_dim];
        if g.shape() != expected {
            return Err(SiteShape { pos, expected, found: g.shape().to_vec() });
        }
        match self.nodes.get_mut(pos) {
            Some(node) if node.is_site() => { *node = Node::Site(g); Ok(()) },
            Some(_) => Err(NotASite(pos)),
            None => Err(OutOfBounds(pos)),
        }
    }

    /// Replace the weights at sequence position `pos`.
    pub fn set_weight_at(&mut self, pos: usize, l: nd::Array1<f64>)
        -> MpsResult<()>
    {
        if l.len() != self.bond_dim {
            return Err(WeightShape { pos, expected: self.bond_dim, found: l.len() });
        }
        match self.nodes.get_mut(pos) {
            Some(node) if node.is_weight() => { *node = Node::Weight(l); Ok(()) },
            Some(_) => Err(NotAWeight(pos)),
            None => Err(OutOfBounds(pos)),
        }
    }

    /// Gather dense tensors for the sequence positions in `window`, after
    /// cyclically shifting the sequence left by `shift` positions.
    pub fn window_tensors(&self, window: &[usize], shift: usize, conj: bool)
        -> Vec<nd::ArrayD<C64>>
    {
        let len = self.nodes.len();
        window.iter()
            .map(|pos| self.nodes[(pos + shift) % len].to_dense(conj))
            .collect()
    }

    /// Left and right transfer matrices of the `k`-th site against the weights
    /// on its two bonds,
    ///
    /// ```text
    /// L[b, b'] = Σ_{a,s} λl[a]^2 Γ[a, s, b] Γ*[a, s, b']
    /// R[a, a'] = Σ_{s,b} Γ[a, s, b] λr[b]^2 Γ*[a', s, b]
    /// ```
    ///
    /// where `λl` is bond `k - 1` (cyclically) and `λr` is bond `k`. A site is
    /// left-canonical if `L` is the identity, and right-canonical if `R` is.
    pub fn transfer_matrices(&self, k: usize)
        -> MpsResult<(nd::Array2<C64>, nd::Array2<C64>)>
    {
        let len = self.nodes.len();
        let pos = 2 * k;
        let g = self.site_at(pos)?;
        let l_l = self.weight_at((pos + len - 1) % len)?;
        let l_r = self.weight_at(pos + 1)?;
        let (chi_l, d, chi_r) = g.dim();
        let left: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (chi_r, chi_r),
                |(b, bp)| {
                    iproduct!(0..chi_l, 0..d)
                        .map(|(a, s)| {
                            g[[a, s, b]] * g[[a, s, bp]].conj() * l_l[a].powi(2)
                        })
                        .sum::<C64>()
                },
            );
        let right: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (chi_l, chi_l),
                |(a, ap)| {
                    iproduct!(0..d, 0..chi_r)
                        .map(|(s, b)| {
                            g[[a, s, b]] * g[[ap, s, b]].conj() * l_r[b].powi(2)
                        })
                        .sum::<C64>()
                },
            );
        Ok((left, right))
    }

    /// Return `true` if every entry of every node is finite.
    pub fn is_finite(&self) -> bool {
        self.nodes.iter()
            .all(|node| {
                match node {
                    Node::Site(g) => g.iter().all(|gk| gk.is_finite()),
                    Node::Weight(l) => l.iter().all(|lk| lk.is_finite()),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;
    use rand::{ SeedableRng, rngs::StdRng };

    #[test]
    fn random_init() {
        let mut rng = StdRng::seed_from_u64(10546);
        let mps = MpsState::random(4, 3, 2, &mut rng).unwrap();
        assert_eq!(mps.len(), 8);
        assert_eq!(mps.num_sites(), 4);
        for (pos, node) in mps.nodes().iter().enumerate() {
            assert_eq!(node.is_site(), pos % 2 == 0);
        }
        for k in 0..4 {
            let g = mps.site(k).unwrap();
            assert_eq!(g.shape(), &[3, 4, 3]);
            let max = g.iter().fold(0.0_f64, |acc, gk| acc.max(gk.norm()));
            assert!((max - 1.0).abs() < 1e-12);
            let l = mps.weight(k).unwrap();
            assert!((l.sum() - 1.0).abs() < 1e-12);
            assert!(l.iter().all(|lk| *lk >= 0.0));
        }
        assert!(mps.site(4).is_none());
        assert!(mps.is_finite());
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = MpsState::random(2, 2, 1, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = MpsState::random(2, 2, 1, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_system() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(MpsState::random(2, 2, 0, &mut rng), Err(EmptySystem)));
        assert!(matches!(MpsState::random(0, 2, 1, &mut rng), Err(EmptySystem)));
    }

    #[test]
    fn flat_round_trip() {
        let mut rng = StdRng::seed_from_u64(31);
        let mps = MpsState::random(2, 3, 2, &mut rng).unwrap();
        let flat = mps.flatten();
        assert_eq!(flat.len(), 4 * (3 * 2 * 3 + 3));
        let rebuilt = MpsState::from_flat(2, 3, 2, &flat).unwrap();
        assert_eq!(mps, rebuilt);
        assert!(matches!(
            MpsState::from_flat(2, 3, 2, &flat[1..]),
            Err(FlatLength { .. }),
        ));
    }

    #[test]
    fn replace_nodes() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut mps = MpsState::random(2, 2, 1, &mut rng).unwrap();
        let g: nd::Array3<C64> = nd::Array3::zeros((2, 2, 2));
        mps.set_site_at(2, g.clone()).unwrap();
        assert_eq!(mps.site(1), Some(&g));
        assert!(matches!(mps.set_site_at(1, g), Err(NotASite(1))));
        assert!(matches!(
            mps.set_weight_at(3, nd::array![1.0]),
            Err(WeightShape { pos: 3, expected: 2, found: 1 }),
        ));
        mps.set_weight_at(3, nd::array![0.25, 0.75]).unwrap();
        assert_eq!(mps.weight_at(3).unwrap(), &nd::array![0.25, 0.75]);
        assert!(matches!(mps.weight_at(8), Err(OutOfBounds(8))));
    }

    #[test]
    fn transfer_matrices_of_normalized_site() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut mps = MpsState::random(2, 1, 1, &mut rng).unwrap();
        let g: nd::Array3<C64>
            = nd::array![[[C64::new(0.6, 0.0)], [C64::new(0.0, 0.8)]]];
        mps.set_site_at(0, g).unwrap();
        let (left, right) = mps.transfer_matrices(0).unwrap();
        assert_eq!(left.shape(), &[1, 1]);
        assert!((left[[0, 0]] - C64::from(1.0)).norm() < 1e-12);
        assert!((right[[0, 0]] - C64::from(1.0)).norm() < 1e-12);
        assert!(matches!(mps.transfer_matrices(2), Err(OutOfBounds(4))));

        let mps = MpsState::random(2, 3, 2, &mut rng).unwrap();
        let (left, right) = mps.transfer_matrices(3).unwrap();
        assert_eq!(left.shape(), &[3, 3]);
        assert_eq!(right.shape(), &[3, 3]);
        assert!(left.iter().zip(left.t().iter()).all(|(x, y)| (x - y.conj()).norm() < 1e-12));
    }

    #[test]
    fn dense_weights_are_diagonal() {
        let node = Node::Weight(nd::array![0.5, 0.3, 0.2]);
        let d = node.to_dense(true).into_dimensionality::<nd::Ix2>().unwrap();
        assert_eq!(d.shape(), &[3, 3]);
        assert_eq!(d[[1, 1]], C64::from(0.3));
        assert_eq!(d[[0, 1]], C64::zero());
    }
}
