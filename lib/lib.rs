//! Infinite time-evolving block decimation (iTEBD) for one-dimensional lattice
//! models.
//!
//! The ground state of an infinite, translation-invariant chain is approximated
//! by an infinite matrix product state with a repeating unit cell, relaxed by
//! imaginary-time evolution under first-order Suzuki-Trotter gates with
//! truncated SVDs after every two-site update.
//!
//! - [`network`]: leg-labeled tensor network contraction
//! - [`plan`]: leg labels and node windows for a given unit cell size
//! - [`mps`]: the infinite MPS in Vidal form
//! - [`hamiltonian`]: Pauli-string bond operators
//! - [`trotter`]: imaginary-time gates
//! - [`update`]: two-site updates with truncation
//! - [`expectation`]: energies and magnetizations
//! - [`evolution`]: step-size schedule and convergence monitoring
//! - [`itebd`]: top-level engine
//! - [`record`]: CSV output rows

pub mod network;
pub mod plan;
pub mod mps;
pub mod hamiltonian;
pub mod trotter;
pub mod update;
pub mod expectation;
pub mod evolution;
pub mod itebd;
pub mod record;

pub use crate::itebd::{ Itebd, ItebdConfig, ItebdError, ItebdResult };
