//! Construction of two-site bond operators from strings of Pauli matrices.
//!
//! A Pauli string like `"xiixxi"` names one single-qubit matrix per qubit; its
//! matrix is the Kronecker product of these, with the leftmost character acting
//! on the most significant qubit. A bond operator on two sites of `n` qubits
//! each is built from strings of length `2n`, the first `n` characters acting
//! on the left site. The resulting `(4^n × 4^n)` matrix is stored as a rank-4
//! tensor `O[out1, out2, in1, in2]`, so that reshaping it back to
//! `(d^2, d^2)` gives the usual left-multiplication matrix.

use std::{ fmt, str::FromStr };
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use once_cell::sync::Lazy;
use thiserror::Error;
use crate::plan::Parity;

#[derive(Debug, Error)]
pub enum HamiltonianError {
    /// Returned when a Pauli string contains a character other than
    /// `i`, `x`, `y`, or `z`.
    #[error("error in Pauli string: invalid character {0:?}")]
    InvalidChar(char),

    /// Returned when a bond operator string has odd (or zero) length.
    #[error("error in Pauli string: {0:?} must have non-zero even length")]
    OddLength(String),

    /// Returned when the strings of a single operator have different lengths.
    #[error("error in Pauli string: expected length {expected}, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Returned when an operator is built from no terms.
    #[error("error in encode_terms: no terms given")]
    NoTerms,

    /// Returned when parsing an unknown matrix type.
    #[error("error in MatrixType: unknown matrix type {0:?}")]
    UnknownMatrixType(String),

    /// Returned when a single-site operator is requested for a physical
    /// dimension that is not a power of two.
    #[error("error in single-site operator: physical dimension {0} is not a power of 2")]
    NotPowerOfTwo(usize),

    /// Returned when a single-site operator is requested for a qubit outside
    /// the bond.
    #[error("error in single-site operator: qubit {site} out of range for a string of length {len}")]
    SiteOutOfRange { site: usize, len: usize },

    /// Returned when the two parities of a bond Hamiltonian have different or
    /// non-uniform shapes.
    #[error("error in BondHamiltonian: operators must both have shape (d, d, d, d)")]
    OperatorShape,

    /// Returned when reshaping a matrix into operator form fails.
    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
use HamiltonianError::*;
pub type HamiltonianResult<T> = Result<T, HamiltonianError>;

/// Normalization of the single-qubit matrices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatrixType {
    /// Bare Pauli matrices.
    #[default]
    Pauli,
    /// Spin-1/2 operators, i.e. Pauli matrices divided by 2.
    Spin,
}

impl MatrixType {
    /// Factor applied to the non-identity matrices.
    pub fn scale(self) -> f64 {
        match self {
            Self::Pauli => 1.0,
            Self::Spin => 0.5,
        }
    }
}

impl fmt::Display for MatrixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pauli => write!(f, "pauli"),
            Self::Spin => write!(f, "spin"),
        }
    }
}

impl FromStr for MatrixType {
    type Err = HamiltonianError;

    fn from_str(s: &str) -> HamiltonianResult<Self> {
        match s.to_lowercase().as_str() {
            "pauli" => Ok(Self::Pauli),
            "spin" => Ok(Self::Spin),
            _ => Err(UnknownMatrixType(s.to_string())),
        }
    }
}

/// A single-qubit Pauli matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PauliOp {
    I,
    X,
    Y,
    Z,
}

impl PauliOp {
    /// Matrix form of the operator under a given normalization. The identity
    /// is never rescaled.
    pub fn matrix(self, matrix_type: MatrixType) -> nd::Array2<C64> {
        let scale = C64::from(matrix_type.scale());
        match self {
            Self::I => Lazy::force(&IMAT).clone(),
            Self::X => Lazy::force(&XMAT).mapv(|a| a * scale),
            Self::Y => Lazy::force(&YMAT).mapv(|a| a * scale),
            Self::Z => Lazy::force(&ZMAT).mapv(|a| a * scale),
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::I => 'i',
            Self::X => 'x',
            Self::Y => 'y',
            Self::Z => 'z',
        }
    }
}

impl TryFrom<char> for PauliOp {
    type Error = HamiltonianError;

    fn try_from(c: char) -> HamiltonianResult<Self> {
        match c.to_ascii_lowercase() {
            'i' => Ok(Self::I),
            'x' => Ok(Self::X),
            'y' => Ok(Self::Y),
            'z' => Ok(Self::Z),
            _ => Err(InvalidChar(c)),
        }
    }
}

/// Make an identity matrix.
pub fn make_i() -> nd::Array2<C64> {
    nd::array![
        [C64::one(),  C64::zero()],
        [C64::zero(), C64::one() ],
    ]
}

/// Lazy-static version of [`make_i`].
pub static IMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_i);

/// Make a Pauli X matrix.
pub fn make_x() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), C64::one() ],
        [C64::one(),  C64::zero()],
    ]
}

/// Lazy-static version of [`make_x`].
pub static XMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_x);

/// Make a Pauli Y matrix.
pub fn make_y() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), -C64::i()   ],
        [C64::i(),     C64::zero()],
    ]
}

/// Lazy-static version of [`make_y`].
pub static YMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_y);

/// Make a Pauli Z matrix.
pub fn make_z() -> nd::Array2<C64> {
    nd::array![
        [C64::one(),   C64::zero()],
        [C64::zero(), -C64::one() ],
    ]
}

/// Lazy-static version of [`make_z`].
pub static ZMAT: Lazy<nd::Array2<C64>> = Lazy::new(make_z);

/// Kronecker product `a ⊗ b`.
pub fn kron(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
    let (ra, ca) = a.dim();
    let (rb, cb) = b.dim();
    nd::Array2::from_shape_fn(
        (ra * rb, ca * cb),
        |(i, j)| a[[i / rb, j / cb]] * b[[i % rb, j % cb]],
    )
}

/// Identity bond operator `δ[out1, in1] δ[out2, in2]` for physical
/// dimension `d`.
pub fn identity_operator(d: usize) -> nd::Array4<C64> {
    nd::Array4::from_shape_fn(
        (d, d, d, d),
        |(o1, o2, i1, i2)| {
            if o1 == i1 && o2 == i2 { C64::one() } else { C64::zero() }
        },
    )
}

/// A pair of two-site operators, one for each bond parity.
#[derive(Clone, Debug, PartialEq)]
pub struct BondHamiltonian {
    ab: nd::Array4<C64>,
    ba: nd::Array4<C64>,
    phys_dim: usize,
    matrix_type: MatrixType,
}

impl BondHamiltonian {
    /// Create a new bond Hamiltonian.
    ///
    /// Fails if either operator doesn't have shape `(d, d, d, d)` for a common
    /// `d`.
    pub fn new(ab: nd::Array4<C64>, ba: nd::Array4<C64>, matrix_type: MatrixType)
        -> HamiltonianResult<Self>
    {
        let d = ab.shape()[0];
        let uniform = |op: &nd::Array4<C64>| op.shape().iter().all(|n| *n == d);
        if d == 0 || !uniform(&ab) || !uniform(&ba) {
            return Err(OperatorShape);
        }
        Ok(Self { ab, ba, phys_dim: d, matrix_type })
    }

    /// Use the same operator for both parities.
    pub fn uniform(op: nd::Array4<C64>, matrix_type: MatrixType)
        -> HamiltonianResult<Self>
    {
        Self::new(op.clone(), op, matrix_type)
    }

    pub fn ab(&self) -> &nd::Array4<C64> { &self.ab }

    pub fn ba(&self) -> &nd::Array4<C64> { &self.ba }

    /// Return the operator acting on bonds of the given parity.
    pub fn get(&self, parity: Parity) -> &nd::Array4<C64> {
        match parity {
            Parity::AB => &self.ab,
            Parity::BA => &self.ba,
        }
    }

    pub fn phys_dim(&self) -> usize { self.phys_dim }

    pub fn matrix_type(&self) -> MatrixType { self.matrix_type }
}

/// Builds bond operators from Pauli strings under a fixed normalization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Encoder {
    matrix_type: MatrixType,
}

impl Encoder {
    pub fn new(matrix_type: MatrixType) -> Self { Self { matrix_type } }

    pub fn matrix_type(&self) -> MatrixType { self.matrix_type }

    /// Matrix of a single Pauli string.
    pub fn string_matrix(&self, s: &str) -> HamiltonianResult<nd::Array2<C64>> {
        s.chars()
            .map(PauliOp::try_from)
            .try_fold(
                nd::array![[C64::one()]],
                |acc, op| Ok(kron(&acc, &op?.matrix(self.matrix_type))),
            )
    }

    /// Sum `coeff * string` over all terms and reshape into operator form.
    ///
    /// Every string must have the same non-zero even length.
    pub fn encode_terms<'a, I>(&self, terms: I) -> HamiltonianResult<nd::Array4<C64>>
    where I: IntoIterator<Item = (f64, &'a str)>
    {
        let mut acc: Option<(usize, nd::Array2<C64>)> = None;
        for (coeff, s) in terms.into_iter() {
            let len = s.chars().count();
            if len == 0 || len % 2 != 0 { return Err(OddLength(s.to_string())); }
            let term = self.string_matrix(s)?.mapv(|a| a * coeff);
            match acc.as_mut() {
                None => { acc = Some((len, term)); },
                Some((expected, sum)) => {
                    if len != *expected {
                        return Err(LengthMismatch { expected: *expected, found: len });
                    }
                    *sum += &term;
                },
            }
        }
        let (len, sum) = acc.ok_or(NoTerms)?;
        let d = 1_usize << (len / 2);
        Ok(sum.into_shape((d, d, d, d))?)
    }

    /// Operator form of a single Pauli string.
    pub fn operator(&self, s: &str) -> HamiltonianResult<nd::Array4<C64>> {
        self.encode_terms([(1.0, s)])
    }

    /// Sum of all strings with unit coefficients, used for both parities.
    pub fn encode_hamil<I, S>(&self, strings: I) -> HamiltonianResult<BondHamiltonian>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let strings: Vec<S> = strings.into_iter().collect();
        let op = self.encode_terms(strings.iter().map(|s| (1.0, s.as_ref())))?;
        BondHamiltonian::uniform(op, self.matrix_type)
    }

    /// Single-qubit operator `direction` on qubit `site` (counting from the
    /// left) of a bond between two sites of physical dimension `phys_dim`,
    /// padded with identities.
    pub fn single_site_operator(
        &self,
        phys_dim: usize,
        site: usize,
        direction: PauliOp,
    ) -> HamiltonianResult<nd::Array4<C64>>
    {
        if !phys_dim.is_power_of_two() || phys_dim < 2 {
            return Err(NotPowerOfTwo(phys_dim));
        }
        let len = 2 * phys_dim.trailing_zeros() as usize;
        if site >= len { return Err(SiteOutOfRange { site, len }); }
        let s: String
            = (0..len)
            .map(|q| if q == site { direction.to_char() } else { 'i' })
            .collect();
        self.operator(&s)
    }

    /// Toric code on a two-leg ladder with a transverse field.
    ///
    /// Each site carries three qubits, `(top leg, rung, bottom leg)`. Every
    /// bond carries the two vertex terms `XIIXXI` and `IIXIXX` with coupling
    /// `jv`, the plaquette term `ZZZIZI` with coupling `jp`, and a field `hx`
    /// along X on all six qubits. The field is halved since every site belongs
    /// to two bonds.
    pub fn toric_code_ladder_active_x(&self, jv: f64, jp: f64, hx: f64)
        -> HamiltonianResult<BondHamiltonian>
    {
        let field: Vec<String>
            = (0..6)
            .map(|q| (0..6).map(|k| if k == q { 'x' } else { 'i' }).collect())
            .collect();
        let terms: Vec<(f64, &str)>
            = [(-jv, "xiixxi"), (-jv, "iixixx"), (-jp, "zzzizi")].into_iter()
            .chain(field.iter().map(|s| (-hx / 2.0, s.as_str())))
            .collect();
        let op = self.encode_terms(terms)?;
        BondHamiltonian::uniform(op, self.matrix_type)
    }
}
