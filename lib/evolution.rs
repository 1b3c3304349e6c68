//! Imaginary-time evolution with a decreasing step-size schedule.
//!
//! The schedule splits a total number of sweeps evenly over `domains` stages,
//! with step sizes linearly spaced from `delta_start` to `delta_end`. Within a
//! stage of `n` sweeps, the energy is sampled every `n / 10` sweeps and compared
//! against a second evaluation taken shortly after; a stage ends early once the
//! two agree to within `accuracy`.

use tracing::{ debug, info };
use thiserror::Error;
use crate::{
    expectation::{ self, ExpectError },
    hamiltonian::BondHamiltonian,
    mps::MpsState,
    plan::ContractionPlan,
    trotter::{ self, TrotterError, TrotterGates },
    update::{ self, UpdateError },
};

#[derive(Debug, Error)]
pub enum EvolutionError {
    /// Returned when a schedule has zero stages.
    #[error("error in schedule: number of domains must be positive")]
    ZeroDomains,

    #[error("trotter error: {0}")]
    TrotterError(#[from] TrotterError),

    #[error("update error: {0}")]
    UpdateError(#[from] UpdateError),

    #[error("expectation error: {0}")]
    ExpectError(#[from] ExpectError),
}
use EvolutionError::*;
pub type EvolutionResult<T> = Result<T, EvolutionError>;

/// Parameters of a full evolution schedule.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScheduleConfig {
    /// Total number of sweeps, truncated down to a multiple of `domains`.
    pub iteration: usize,
    /// Number of stages.
    pub domains: usize,
    /// Step size of the first stage.
    pub delta_start: f64,
    /// Step size of the last stage.
    pub delta_end: f64,
    /// Convergence threshold on the change in energy.
    pub accuracy: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            iteration: 3000,
            domains: 3,
            delta_start: 0.01,
            delta_end: 0.0001,
            accuracy: 1e-16,
        }
    }
}

impl ScheduleConfig {
    /// Number of sweeps per stage.
    pub fn stage_iterations(&self) -> EvolutionResult<usize> {
        if self.domains == 0 { return Err(ZeroDomains); }
        Ok(self.iteration / self.domains)
    }

    /// Step sizes of all stages.
    pub fn deltas(&self) -> EvolutionResult<Vec<f64>> {
        if self.domains == 0 { return Err(ZeroDomains); }
        Ok(linspace(self.delta_start, self.delta_end, self.domains))
    }
}

/// `n` evenly spaced values from `start` to `end`, inclusive. A single value is
/// just `start`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|k| if k == n - 1 { end } else { start + step * k as f64 })
                .collect()
        },
    }
}

/// A single energy sample taken during a stage.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    /// Step size of the stage.
    pub delta: f64,
    /// Sweep index within the stage.
    pub sweep: usize,
    /// Energy per unit cell.
    pub energy: f64,
    /// Whether this sample is the closest yet to the running mean.
    pub is_best: bool,
}

/// Receives energy samples as they are taken.
pub trait Observer {
    fn observe(&mut self, sample: Sample);
}

impl<F> Observer for F
where F: FnMut(Sample)
{
    fn observe(&mut self, sample: Sample) { self(sample) }
}

/// Observer that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoObserver;

impl Observer for NoObserver {
    fn observe(&mut self, _sample: Sample) { }
}

/// Summary of a single stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageReport {
    pub delta: f64,
    /// Number of sweeps actually performed.
    pub sweeps: usize,
    /// Whether the stage ended early on the accuracy check.
    pub converged: bool,
    /// All sampled energies, in order.
    pub samples: Vec<f64>,
    /// Last sample flagged as best, if any.
    pub best_energy: Option<f64>,
}

/// Run a single stage of `iteration` sweeps with fixed gates.
///
/// Sweeps are indexed from `s = iteration / 10` through
/// `iteration + s + 1`. After sweep `i`, the energy is sampled if
/// `i % s == 0`, and compared against a fresh evaluation if
/// `(i + 1) % s == 2`. Stages with `s == 0` run all sweeps without sampling.
pub fn evolve_stage<O>(
    mps: &mut MpsState,
    plan: &ContractionPlan,
    hamiltonian: &BondHamiltonian,
    gates: &TrotterGates,
    iteration: usize,
    accuracy: f64,
    observer: &mut O,
) -> EvolutionResult<StageReport>
where O: Observer + ?Sized
{
    let delta = gates.delta();
    let sampling = iteration / 10;
    let mut history: Vec<f64> = Vec::new();
    let mut diff: [f64; 2] = [0.0, 0.0];
    let mut best_distance = f64::INFINITY;
    let mut best_energy: Option<f64> = None;
    let mut converged = false;
    let mut sweeps: usize = 0;

    info!(delta, iteration, sampling, "starting stage");
    for i in sampling..iteration + sampling + 2 {
        update::cell_update(mps, plan, gates)?;
        sweeps += 1;
        if sampling == 0 { continue; }

        if i % sampling == 0 {
            let energy = expectation::expectation_value(mps, plan, hamiltonian)?;
            history.push(energy);
            diff[0] = energy;
            let mut is_best = false;
            if history.len() > 1 {
                let mean = history.iter().sum::<f64>() / history.len() as f64;
                let distance = (energy - mean).abs();
                if distance < best_distance {
                    best_distance = distance;
                    best_energy = Some(energy);
                    is_best = true;
                    debug!(sweep = i, energy, "new best energy");
                }
            }
            debug!(sweep = i, energy, "sampled energy");
            observer.observe(Sample { delta, sweep: i, energy, is_best });
        }

        if (i + 1) % sampling == 2 {
            diff[1] = expectation::expectation_value(mps, plan, hamiltonian)?;
            if (diff[0] - diff[1]).abs() < accuracy {
                converged = true;
                break;
            }
        }
    }
    info!(delta, sweeps, converged, best_energy = ?best_energy, "finished stage");

    Ok(StageReport { delta, sweeps, converged, samples: history, best_energy })
}

/// Run a full schedule, rebuilding the Trotter gates for every stage.
pub fn run_schedule<O>(
    mps: &mut MpsState,
    plan: &ContractionPlan,
    hamiltonian: &BondHamiltonian,
    config: &ScheduleConfig,
    observer: &mut O,
) -> EvolutionResult<Vec<StageReport>>
where O: Observer + ?Sized
{
    let deltas = config.deltas()?;
    let stage_iterations = config.stage_iterations()?;
    info!(
        phys_dim = mps.phys_dim(),
        bond_dim = mps.bond_dim(),
        unit_cells = mps.unit_cells(),
        stages = deltas.len(),
        stage_iterations,
        "running iTEBD schedule"
    );
    let mut reports: Vec<StageReport> = Vec::with_capacity(deltas.len());
    for delta in deltas.into_iter() {
        let gates = trotter::suzuki_trotter(hamiltonian, delta)?;
        let report
            = evolve_stage(
                mps, plan, hamiltonian, &gates, stage_iterations, config.accuracy,
                observer,
            )?;
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_endpoints() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(0.1, 0.01, 1), vec![0.1]);
        let xs = linspace(0.1, 0.01, 3);
        assert_eq!(xs.len(), 3);
        assert_eq!(xs[0], 0.1);
        assert!((xs[1] - 0.055).abs() < 1e-15);
        assert_eq!(xs[2], 0.01);
    }

    #[test]
    fn schedule_truncates() {
        let config = ScheduleConfig { iteration: 3001, ..Default::default() };
        assert_eq!(config.stage_iterations().unwrap(), 1000);
        let config = ScheduleConfig { domains: 0, ..Default::default() };
        assert!(matches!(config.stage_iterations(), Err(ZeroDomains)));
        assert!(matches!(config.deltas(), Err(ZeroDomains)));
    }

    #[test]
    fn closures_observe() {
        let mut seen: Vec<usize> = Vec::new();
        {
            let mut obs = |s: Sample| seen.push(s.sweep);
            let sample = Sample { delta: 0.1, sweep: 4, energy: -1.0, is_best: false };
            obs.observe(sample);
            NoObserver.observe(sample);
        }
        assert_eq!(seen, vec![4]);
    }
}
