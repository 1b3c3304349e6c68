//! Top-level iTEBD driver bundling a Hamiltonian, a contraction plan, and the
//! state being evolved.
//!
//! # Example
//!
//! ```no_run
//! use itebd::{
//!     hamiltonian::{ Encoder, MatrixType, PauliOp },
//!     itebd::Itebd,
//! };
//!
//! let encoder = Encoder::new(MatrixType::Pauli);
//! let hamiltonian = encoder.toric_code_ladder_active_x(1.0, 1.0, 0.2).unwrap();
//! let mut itebd = Itebd::new(hamiltonian.clone(), 8, 2, 1).unwrap();
//! let mps = itebd.delta_manager(3000, 3, 0.1, 0.01, 1e-16).unwrap();
//!
//! let energy = itebd.expectation_value(&hamiltonian).unwrap();
//! let mag_z = itebd.expectation_single_site_mag(&mps, 0, 0, PauliOp::Z).unwrap();
//! println!("energy = {energy}; <Z_0> = {mag_z}");
//! ```

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, SeedableRng };
use thiserror::Error;
use crate::{
    evolution::{ self, EvolutionError, NoObserver, Observer, ScheduleConfig, StageReport },
    expectation::{ self, ExpectError, MagProfile },
    hamiltonian::{ BondHamiltonian, MatrixType, PauliOp },
    mps::{ MpsError, MpsState },
    plan::{ ContractionPlan, PlanError },
    trotter::{ self, TrotterError, TrotterGates },
    update::{ self, UpdateError },
};

#[derive(Debug, Error)]
pub enum ItebdError {
    /// Returned when construction parameters are invalid.
    #[error("error in Itebd creation: {0}")]
    InvalidConfig(String),

    #[error("mps error: {0}")]
    MpsError(#[from] MpsError),

    #[error("plan error: {0}")]
    PlanError(#[from] PlanError),

    #[error("trotter error: {0}")]
    TrotterError(#[from] TrotterError),

    #[error("update error: {0}")]
    UpdateError(#[from] UpdateError),

    #[error("expectation error: {0}")]
    ExpectError(#[from] ExpectError),

    #[error("evolution error: {0}")]
    EvolutionError(#[from] EvolutionError),
}
use ItebdError::*;
pub type ItebdResult<T> = Result<T, ItebdError>;

/// Dimensions of the state and the seed for its random initialization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ItebdConfig {
    /// Dimension of the physical index on each site.
    pub phys_dim: usize,
    /// Number of singular values kept on each bond.
    pub bond_dim: usize,
    /// Number of repetitions of the two-site cell.
    pub unit_cells: usize,
    /// Seed for the initial state; drawn from entropy if `None`.
    pub seed: Option<u64>,
}

impl Default for ItebdConfig {
    fn default() -> Self {
        Self { phys_dim: 8, bond_dim: 2, unit_cells: 1, seed: None }
    }
}

/// iTEBD engine.
#[derive(Clone, Debug)]
pub struct Itebd {
    hamiltonian: BondHamiltonian,
    plan: ContractionPlan,
    mps: MpsState,
    config: ItebdConfig,
}

impl Itebd {
    /// Create a new engine with a randomly initialized state.
    pub fn new(
        hamiltonian: BondHamiltonian,
        phys_dim: usize,
        bond_dim: usize,
        unit_cells: usize,
    ) -> ItebdResult<Self>
    {
        let config = ItebdConfig { phys_dim, bond_dim, unit_cells, seed: None };
        Self::with_config(hamiltonian, config)
    }

    /// Create a new engine from a config.
    ///
    /// Fails if any dimension or the unit cell count is zero, or if the
    /// Hamiltonian acts on a different physical dimension.
    pub fn with_config(hamiltonian: BondHamiltonian, config: ItebdConfig)
        -> ItebdResult<Self>
    {
        let ItebdConfig { phys_dim, bond_dim, unit_cells, seed } = config;
        if phys_dim == 0 || bond_dim == 0 || unit_cells == 0 {
            return Err(InvalidConfig(format!(
                "dimensions must be positive: phys_dim = {phys_dim}, \
                bond_dim = {bond_dim}, unit_cells = {unit_cells}"
            )));
        }
        if hamiltonian.phys_dim() != phys_dim {
            return Err(InvalidConfig(format!(
                "hamiltonian acts on dimension {} but phys_dim = {phys_dim}",
                hamiltonian.phys_dim(),
            )));
        }
        let mut rng: StdRng
            = seed.map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);
        let mps = MpsState::random(phys_dim, bond_dim, unit_cells, &mut rng)?;
        let plan = ContractionPlan::new(unit_cells)?;
        Ok(Self { hamiltonian, plan, mps, config })
    }

    pub fn hamiltonian(&self) -> &BondHamiltonian { &self.hamiltonian }

    pub fn plan(&self) -> &ContractionPlan { &self.plan }

    pub fn config(&self) -> &ItebdConfig { &self.config }

    pub fn matrix_type(&self) -> MatrixType { self.hamiltonian.matrix_type() }

    /// Return a reference to the current state.
    pub fn mps(&self) -> &MpsState { &self.mps }

    /// Unwrap `self` into the current state.
    pub fn into_mps(self) -> MpsState { self.mps }

    /// Build Trotter gates for the engine's Hamiltonian.
    pub fn suzuki_trotter(&self, delta: f64) -> ItebdResult<TrotterGates> {
        Ok(trotter::suzuki_trotter(&self.hamiltonian, delta)?)
    }

    /// Apply a single sweep of `gates` to the state.
    pub fn cell_update(&mut self, gates: &TrotterGates) -> ItebdResult<&mut Self> {
        update::cell_update(&mut self.mps, &self.plan, gates)?;
        Ok(self)
    }

    /// Run a full schedule, returning a copy of the final state.
    ///
    /// `iteration` is silently truncated to a multiple of `domains`. Stages end
    /// early once successive energy evaluations agree to within `accuracy`
    /// (`1e-16` in [`ScheduleConfig::default`]). Use [`Self::evolve`] to observe
    /// samples and get per-stage reports.
    pub fn delta_manager(
        &mut self,
        iteration: usize,
        domains: usize,
        delta_start: f64,
        delta_end: f64,
        accuracy: f64,
    ) -> ItebdResult<MpsState>
    {
        let config
            = ScheduleConfig { iteration, domains, delta_start, delta_end, accuracy };
        self.evolve(&config, &mut NoObserver)?;
        Ok(self.mps.clone())
    }

    /// Run a full schedule, reporting energy samples to `observer`.
    pub fn evolve<O>(&mut self, config: &ScheduleConfig, observer: &mut O)
        -> ItebdResult<Vec<StageReport>>
    where O: Observer + ?Sized
    {
        let reports
            = evolution::run_schedule(
                &mut self.mps, &self.plan, &self.hamiltonian, config, observer)?;
        Ok(reports)
    }

    fn check_state(&self, mps: &MpsState) -> ItebdResult<()> {
        if mps.unit_cells() != self.plan.unit_cells()
            || mps.phys_dim() != self.config.phys_dim
        {
            return Err(InvalidConfig(format!(
                "state has {} unit cells of dimension {}, expected {} of dimension {}",
                mps.unit_cells(),
                mps.phys_dim(),
                self.plan.unit_cells(),
                self.config.phys_dim,
            )));
        }
        Ok(())
    }

    /// Total energy per unit cell of the current state under `hamiltonian`.
    pub fn expectation_value(&self, hamiltonian: &BondHamiltonian)
        -> ItebdResult<f64>
    {
        Ok(expectation::expectation_value(&self.mps, &self.plan, hamiltonian)?)
    }

    /// Expectation value of a two-site operator on the `bond`-th bond of `mps`.
    pub fn expectation_bond(
        &self,
        mps: &MpsState,
        operator: &nd::Array4<C64>,
        bond: usize,
    ) -> ItebdResult<f64>
    {
        self.check_state(mps)?;
        Ok(expectation::expectation_bond(mps, &self.plan, operator, bond)?)
    }

    /// Energy of every bond of `mps`, in bond order.
    pub fn mps_bonds_energy(&self, mps: &MpsState, hamiltonian: &BondHamiltonian)
        -> ItebdResult<Vec<f64>>
    {
        self.check_state(mps)?;
        Ok(expectation::mps_bonds_energy(mps, &self.plan, hamiltonian)?)
    }

    /// Magnetization of a single qubit of `mps`; see
    /// [`expectation_single_site_mag`][expectation::expectation_single_site_mag].
    pub fn expectation_single_site_mag(
        &self,
        mps: &MpsState,
        unit_cell: usize,
        site_index: usize,
        direction: PauliOp,
    ) -> ItebdResult<f64>
    {
        self.check_state(mps)?;
        let mag
            = expectation::expectation_single_site_mag(
                mps, &self.plan, self.matrix_type(), unit_cell, site_index,
                direction,
            )?;
        Ok(mag)
    }

    /// Magnetization profile of `mps` along each of `directions`.
    pub fn expectation_all_sites_mag(&self, mps: &MpsState, directions: &[PauliOp])
        -> ItebdResult<MagProfile>
    {
        self.check_state(mps)?;
        let prof
            = expectation::expectation_all_sites_mag(
                mps, &self.plan, self.matrix_type(), directions)?;
        Ok(prof)
    }

    /// Expectation value of `operator` applied to the AB bond of every unit
    /// cell of `mps` at once.
    pub fn expectation_cells(&self, mps: &MpsState, operator: &nd::Array4<C64>)
        -> ItebdResult<f64>
    {
        self.check_state(mps)?;
        Ok(expectation::expectation_cells(mps, &self.plan, operator)?)
    }
}
