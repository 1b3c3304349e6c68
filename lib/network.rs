//! A collection of tensors arranged in a graph, where nodes are tensors and
//! edges are determined by common integer leg labels.
//!
//! Labels follow the usual `ncon` convention. Every axis of every tensor is
//! given a non-zero integer label. A positive label must appear on exactly two
//! axes belonging to two different tensors, and marks a pair of axes to be
//! summed over. A negative label must appear exactly once, and marks an axis of
//! the output; output axes are ordered as `-1, -2, ...`.
//!
//! ```text
//!   -1       1       -2
//!  ---- A ------- B ----      C_{-1,-2} = Σ_1 A_{-1,1} B_{1,-2}
//! ```
//!
//! Contraction proceeds pairwise. At each step, the pair of tensors sharing a
//! label with the smallest joint index volume is contracted over all of its
//! common labels by permuting, fusing into matrices, and multiplying. Tensors
//! left unconnected at the end are joined by outer products.

use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Returned when the number of leg labels given for a tensor doesn't match
    /// its rank.
    #[error("error in Node::new: tensor has rank {rank} but {legs} leg labels")]
    LegCount { rank: usize, legs: usize },

    /// Returned when a tensor is given the label `0`.
    #[error("error in Node::new: leg label 0 is not allowed")]
    ZeroLabel,

    /// Returned when the same label appears more than once on a single tensor.
    #[error("error in Node::new: label {0} appears twice on the same tensor")]
    RepeatedLabel(i32),

    /// Returned when attempting to add a tensor to a network in which one of
    /// its labels is already paired, or is a negative label already in use.
    #[error("error in Network::push: pre-existing label {0}")]
    PreExistingLabel(i32),

    /// Returned when a label pairs two axes of different dimension.
    #[error("error in Network::push: label {label} joins axes of dimension {left} and {right}")]
    DimMismatch { label: i32, left: usize, right: usize },

    /// Returned when a positive label is left without a partner.
    #[error("error in Network::contract: label {0} is unpaired")]
    Unpaired(i32),

    /// Returned when the negative labels are not exactly `-1, ..., -n`.
    #[error("error in Network::contract: output labels must be -1, ..., -{0}")]
    OutputLabels(usize),

    /// Returned when attempting to contract with a tensor ID that doesn't
    /// exist in the network.
    #[error("error in Network::contract_single: missing ID {0}")]
    MissingId(usize),

    /// Returned when attempting to contract a network with no tensors.
    #[error("error in Network::contract: empty network")]
    EmptyNetwork,

    /// Returned when a scalar was expected from a contraction.
    #[error("error in into_scalar: expected a rank-0 result, got rank {0}")]
    NotScalar(usize),

    /// Returned by [`ncon`] when the number of tensors and label lists differ.
    #[error("error in ncon: {tensors} tensors but {legs} label lists")]
    ListLength { tensors: usize, legs: usize },

    /// Returned when fusing axes into a matrix fails.
    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use NetworkError::*;
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Sugared `usize` representing the ID of a single tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub usize);

/// An edge in a [`Network`].
///
/// A wire is either an output axis belonging to a single tensor (or a positive
/// label still waiting for its partner) or a bond between exactly two tensors
/// in the network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wire {
    Unpaired(Id),
    Paired(Id, Id),
}

/// A single dense tensor together with one label per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    data: nd::ArrayD<C64>,
    legs: Vec<i32>,
}

impl Node {
    /// Create a new labeled tensor.
    ///
    /// Fails if the number of labels doesn't match the rank of `data`, if any
    /// label is zero, or if any label is repeated.
    pub fn new(data: nd::ArrayD<C64>, legs: Vec<i32>) -> NetworkResult<Self> {
        if data.ndim() != legs.len() {
            return Err(LegCount { rank: data.ndim(), legs: legs.len() });
        }
        if legs.contains(&0) { return Err(ZeroLabel); }
        if let Some(dup) = legs.iter().duplicates().next() {
            return Err(RepeatedLabel(*dup));
        }
        Ok(Self { data, legs })
    }

    /// Return a reference to the tensor data.
    pub fn data(&self) -> &nd::ArrayD<C64> { &self.data }

    /// Return the axis labels.
    pub fn legs(&self) -> &[i32] { &self.legs }

    /// Unwrap `self` into the bare tensor data.
    pub fn into_data(self) -> nd::ArrayD<C64> { self.data }

    fn dim_of(&self, label: i32) -> Option<usize> {
        self.legs.iter()
            .position(|l| *l == label)
            .map(|ax| self.data.shape()[ax])
    }

    /// Contract `self` with `other` over all common labels.
    ///
    /// The axes of the result are the free axes of `self` followed by the free
    /// axes of `other`, each in their original order. With no common labels,
    /// this is the outer product.
    pub fn contract(self, other: Self) -> NetworkResult<Self> {
        let Self { data: a, legs: legs_a } = self;
        let Self { data: b, legs: legs_b } = other;
        let common: Vec<i32>
            = legs_a.iter().copied()
            .filter(|l| legs_b.contains(l))
            .collect();
        let free_a: Vec<usize>
            = (0..legs_a.len())
            .filter(|k| !common.contains(&legs_a[*k]))
            .collect();
        let free_b: Vec<usize>
            = (0..legs_b.len())
            .filter(|k| !common.contains(&legs_b[*k]))
            .collect();
        let com_a: Vec<usize>
            = common.iter()
            .filter_map(|l| legs_a.iter().position(|la| la == l))
            .collect();
        let com_b: Vec<usize>
            = common.iter()
            .filter_map(|l| legs_b.iter().position(|lb| lb == l))
            .collect();

        let m: usize = free_a.iter().map(|k| a.shape()[*k]).product();
        let s: usize = com_a.iter().map(|k| a.shape()[*k]).product();
        let n: usize = free_b.iter().map(|k| b.shape()[*k]).product();
        let shape_c: Vec<usize>
            = free_a.iter().map(|k| a.shape()[*k])
            .chain(free_b.iter().map(|k| b.shape()[*k]))
            .collect();
        let legs_c: Vec<i32>
            = free_a.iter().map(|k| legs_a[*k])
            .chain(free_b.iter().map(|k| legs_b[*k]))
            .collect();

        let perm_a: Vec<usize> = free_a.iter().chain(&com_a).copied().collect();
        let perm_b: Vec<usize> = com_b.iter().chain(&free_b).copied().collect();
        let a: nd::Array2<C64>
            = a.permuted_axes(perm_a)
            .as_standard_layout()
            .into_owned()
            .into_shape((m, s))?;
        let b: nd::Array2<C64>
            = b.permuted_axes(perm_b)
            .as_standard_layout()
            .into_owned()
            .into_shape((s, n))?;
        let data = a.dot(&b).into_shape(shape_c)?;
        Ok(Self { data, legs: legs_c })
    }
}

/// A graph of labeled [`Node`]s.
#[derive(Clone, Debug, Default)]
pub struct Network {
    nodes: HashMap<Id, Node>,
    wires: HashMap<i32, Wire>,
    node_id: usize,
}

impl Network {
    /// Create a new, empty network.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::default(),
            wires: HashMap::default(),
            node_id: 0,
        }
    }

    /// Create a new network by repeatedly [pushing][Self::push] nodes onto an
    /// initially empty network.
    ///
    /// Node IDs count from zero, so the IDs 0, ..., n - 1 correspond to the
    /// nodes of the iterator, in order.
    pub fn from_nodes<I>(nodes: I) -> NetworkResult<Self>
    where I: IntoIterator<Item = Node>
    {
        let mut new = Self::new();
        for node in nodes.into_iter() {
            new.push(node)?;
        }
        Ok(new)
    }

    /// Return the number of tensors in the network.
    pub fn count_nodes(&self) -> usize { self.nodes.len() }

    /// Return a reference to a specific tensor in the network, if it exists.
    pub fn get(&self, id: Id) -> Option<&Node> { self.nodes.get(&id) }

    /// Return the wire associated with a label, if it exists.
    pub fn wire(&self, label: i32) -> Option<Wire> {
        self.wires.get(&label).copied()
    }

    /// Add a new tensor to the network, returning its ID.
    ///
    /// Fails if one of the node's labels is already paired (or, if negative,
    /// already present), or if it would pair two axes of different dimension.
    pub fn push(&mut self, node: Node) -> NetworkResult<Id> {
        for (&label, &dim) in node.legs.iter().zip(node.data.shape()) {
            match self.wires.get(&label) {
                None => { },
                Some(Wire::Unpaired(other)) if label > 0 => {
                    let left
                        = self.nodes.get(other)
                        .and_then(|t| t.dim_of(label))
                        .ok_or(MissingId(other.0))?;
                    if left != dim {
                        return Err(DimMismatch { label, left, right: dim });
                    }
                },
                Some(_) => { return Err(PreExistingLabel(label)); },
            }
        }
        let id = Id(self.node_id);
        for &label in node.legs.iter() {
            let wire
                = match self.wires.get(&label) {
                    Some(Wire::Unpaired(other)) => Wire::Paired(*other, id),
                    _ => Wire::Unpaired(id),
                };
            self.wires.insert(label, wire);
        }
        self.nodes.insert(id, node);
        self.node_id += 1;
        Ok(id)
    }

    /// Remove a tensor from the network, returning it if it existed.
    ///
    /// Partners of the removed tensor's paired labels are left unpaired.
    pub fn remove(&mut self, id: Id) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        for label in node.legs.iter() {
            match self.wires.get(label).copied() {
                Some(Wire::Paired(a, b)) => {
                    let other = if a == id { b } else { a };
                    self.wires.insert(*label, Wire::Unpaired(other));
                },
                Some(Wire::Unpaired(_)) => { self.wires.remove(label); },
                None => { },
            }
        }
        Some(node)
    }

    // every positive label must be paired and the negative labels must be
    // exactly -1, ..., -n
    fn check_labels(&self) -> NetworkResult<()> {
        let mut n_out: usize = 0;
        for (&label, wire) in self.wires.iter().sorted_by_key(|(l, _)| **l) {
            match wire {
                Wire::Unpaired(_) if label > 0 => { return Err(Unpaired(label)); },
                Wire::Unpaired(_) => { n_out += 1; },
                Wire::Paired(..) => { },
            }
        }
        let complete
            = (1..=n_out)
            .all(|k| self.wires.contains_key(&-(k as i32)));
        if complete { Ok(()) } else { Err(OutputLabels(n_out)) }
    }

    /// Simple greedy algorithm to find the next contraction step, optimized
    /// over only a single contraction.
    ///
    /// Ties are broken in favor of the smallest label.
    fn find_contraction(&self) -> Option<(Id, Id)> {
        let costf = |a: &Id, b: &Id| -> usize {
            let (Some(t_a), Some(t_b)) = (self.nodes.get(a), self.nodes.get(b))
                else { return usize::MAX; };
            t_a.data.shape().iter().copied()
                .chain(
                    t_b.legs.iter().zip(t_b.data.shape())
                        .filter(|(l, _)| !t_a.legs.contains(*l))
                        .map(|(_, d)| *d)
                )
                .fold(1_usize, usize::saturating_mul)
        };

        self.wires.iter()
            .filter_map(|(label, wire)| {
                match wire {
                    Wire::Paired(a, b) => Some((*label, *a, *b)),
                    Wire::Unpaired(_) => None,
                }
            })
            .min_by_key(|(label, a, b)| (costf(a, b), *label))
            .map(|(_, a, b)| (a, b))
    }

    /// Contract a single pair of tensors named by their IDs.
    pub fn contract_single(&mut self, a: Id, b: Id) -> NetworkResult<Id> {
        let t_a = self.remove(a).ok_or(MissingId(a.0))?;
        let t_b = self.remove(b).ok_or(MissingId(b.0))?;
        let t_c = t_a.contract(t_b)?;
        self.push(t_c)
    }

    /// Contract the entire network into a single output tensor with axes
    /// ordered by output label, `-1, -2, ...`.
    pub fn contract(mut self) -> NetworkResult<nd::ArrayD<C64>> {
        self.check_labels()?;
        while let Some((a, b)) = self.find_contraction() {
            self.contract_single(a, b)?;
        }
        let mut remaining
            = self.nodes.into_iter()
            .sorted_by_key(|(id, _)| *id)
            .map(|(_, node)| node);
        let acc = remaining.next().ok_or(EmptyNetwork)?;
        let result = remaining.try_fold(acc, |acc, t| acc.contract(t))?;
        let n_out = result.legs.len();
        let perm: Vec<usize>
            = (1..=n_out)
            .map(|k| {
                result.legs.iter()
                    .position(|l| *l == -(k as i32))
                    .ok_or(OutputLabels(n_out))
            })
            .collect::<NetworkResult<_>>()?;
        Ok(result.data.permuted_axes(perm).as_standard_layout().into_owned())
    }
}

/// Contract a list of tensors according to per-tensor leg labels.
///
/// See the [module-level documentation][self] for the labeling convention.
pub fn ncon<I>(tensors: I, legs: &[Vec<i32>]) -> NetworkResult<nd::ArrayD<C64>>
where I: IntoIterator<Item = nd::ArrayD<C64>>
{
    let tensors: Vec<nd::ArrayD<C64>> = tensors.into_iter().collect();
    if tensors.len() != legs.len() {
        return Err(ListLength { tensors: tensors.len(), legs: legs.len() });
    }
    let nodes: Vec<Node>
        = tensors.into_iter().zip(legs)
        .map(|(t, l)| Node::new(t, l.clone()))
        .collect::<NetworkResult<_>>()?;
    Network::from_nodes(nodes)?.contract()
}

/// Extract the single element of a rank-0 tensor.
pub fn into_scalar(t: nd::ArrayD<C64>) -> NetworkResult<C64> {
    if t.ndim() != 0 { return Err(NotScalar(t.ndim())); }
    t.iter().next().copied().ok_or(EmptyNetwork)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(shape: &[usize], seed: f64) -> nd::ArrayD<C64> {
        let mut k = 0.0;
        nd::ArrayD::from_shape_simple_fn(shape.to_vec(), || {
            k += 1.0;
            C64::new((seed * k).sin(), (seed + k).cos() / 2.0)
        })
    }

    fn close(a: &nd::ArrayD<C64>, b: &nd::ArrayD<C64>) -> bool {
        a.shape() == b.shape()
            && a.iter().zip(b.iter()).all(|(x, y)| (x - y).norm() < 1e-12)
    }

    #[test]
    fn matrix_product() {
        let a = arr(&[2, 3], 0.3);
        let b = arr(&[3, 4], 0.7);
        let a2 = a.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let b2 = b.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let expected = a2.dot(&b2).into_dyn();
        let c = ncon([a, b], &[vec![-1, 1], vec![1, -2]]).unwrap();
        assert!(close(&c, &expected));
    }

    #[test]
    fn output_order_follows_negative_labels() {
        let a = arr(&[2, 3], 0.3);
        let b = arr(&[3, 4], 0.7);
        let a2 = a.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let b2 = b.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let expected = a2.dot(&b2).reversed_axes().into_dyn();
        let c = ncon([a, b], &[vec![-2, 1], vec![1, -1]]).unwrap();
        assert!(close(&c, &expected));
    }

    #[test]
    fn multiple_shared_labels() {
        let a = arr(&[2, 3, 4], 1.1);
        let b = arr(&[4, 3], 0.4);
        let c = ncon([a.clone(), b.clone()], &[vec![-1, 1, 2], vec![2, 1]])
            .unwrap();
        assert_eq!(c.shape(), &[2]);
        for i in 0..2 {
            let mut acc = C64::new(0.0, 0.0);
            for j in 0..3 {
                for k in 0..4 {
                    acc += a[[i, j, k]] * b[[k, j]];
                }
            }
            assert!((c[[i]] - acc).norm() < 1e-12);
        }
    }

    #[test]
    fn full_contraction_is_scalar() {
        let a = arr(&[2, 3], 0.9);
        let b = arr(&[3, 2], 0.2);
        let mut trace = C64::new(0.0, 0.0);
        for i in 0..2 {
            for j in 0..3 {
                trace += a[[i, j]] * b[[j, i]];
            }
        }
        let c = ncon([a, b], &[vec![1, 2], vec![2, 1]]).unwrap();
        let c = into_scalar(c).unwrap();
        assert!((c - trace).norm() < 1e-12);
    }

    #[test]
    fn chain_of_three() {
        let a = arr(&[2, 3], 0.3);
        let b = arr(&[3, 5], 0.5);
        let c = arr(&[5, 2], 0.8);
        let a2 = a.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let b2 = b.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let c2 = c.clone().into_dimensionality::<nd::Ix2>().unwrap();
        let expected = a2.dot(&b2).dot(&c2).into_dyn();
        let res = ncon([a, b, c], &[vec![-1, 1], vec![1, 2], vec![2, -2]])
            .unwrap();
        assert!(close(&res, &expected));
    }

    #[test]
    fn disconnected_outer_product() {
        let a = arr(&[2], 0.3);
        let b = arr(&[3], 0.6);
        let c = ncon([a.clone(), b.clone()], &[vec![-2], vec![-1]]).unwrap();
        assert_eq!(c.shape(), &[3, 2]);
        for i in 0..3 {
            for j in 0..2 {
                assert!((c[[i, j]] - b[[i]] * a[[j]]).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn malformed_labels() {
        let a = arr(&[2, 3], 0.3);
        let b = arr(&[3, 4], 0.7);
        assert!(matches!(
            ncon([a.clone(), b.clone()], &[vec![-1, 1], vec![2, -2]]),
            Err(Unpaired(_)),
        ));
        assert!(matches!(
            ncon([a.clone(), b.clone()], &[vec![1, -1], vec![1, -2]]),
            Err(DimMismatch { label: 1, left: 2, right: 3 }),
        ));
        assert!(matches!(
            ncon([a.clone(), b.clone()], &[vec![-1, 0], vec![1, -2]]),
            Err(ZeroLabel),
        ));
        assert!(matches!(
            ncon([a.clone(), b.clone()], &[vec![-1, 1], vec![1, -3]]),
            Err(OutputLabels(2)),
        ));
        assert!(matches!(
            ncon([a.clone()], &[vec![1, 1]]),
            Err(RepeatedLabel(1)),
        ));
        assert!(matches!(
            ncon([a, b], &[vec![-1, 1]]),
            Err(ListLength { tensors: 2, legs: 1 }),
        ));
    }
}
