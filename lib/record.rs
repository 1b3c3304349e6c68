//! CSV rows for parameter sweeps.

use std::io::{ self, Write };
use itertools::Itertools;
use num_complex::Complex64 as C64;
use crate::{
    expectation::MagProfile,
    mps::MpsState,
};

/// Observables measured on a single converged state.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservablesRow {
    pub phys_dim: usize,
    pub bond_dim: usize,
    pub unit_cells: usize,
    /// Transverse field.
    pub hx: f64,
    /// Energy of every bond, in bond order.
    pub bond_energies: Vec<f64>,
    pub mags: MagProfile,
}

impl ObservablesRow {
    /// Total energy per unit cell.
    pub fn energy(&self) -> f64 { self.bond_energies.iter().sum() }

    /// Column names, matching [`Self::values`].
    pub fn header(&self) -> Vec<String> {
        let mut cols: Vec<String>
            = ["phys_dim", "vir_dim", "unit_cells", "hx"].into_iter()
            .map(String::from)
            .collect();
        cols.extend((1..=self.bond_energies.len()).map(|k| format!("energy_bond_{k}")));
        cols.push("energy".to_string());
        for (dir, vals, _) in self.mags.iter() {
            let c = dir.to_char();
            cols.extend((1..=vals.len()).map(|k| format!("mag_{c}_{k}")));
        }
        cols.extend(self.mags.directions().iter().map(|dir| format!("mag_mean_{}", dir.to_char())));
        cols.push("mag_value".to_string());
        cols
    }

    pub fn values(&self) -> Vec<String> {
        let mut vals: Vec<String>
            = vec![
                self.phys_dim.to_string(),
                self.bond_dim.to_string(),
                self.unit_cells.to_string(),
                self.hx.to_string(),
            ];
        vals.extend(self.bond_energies.iter().map(f64::to_string));
        vals.push(self.energy().to_string());
        for (_, mags, _) in self.mags.iter() {
            vals.extend(mags.iter().map(f64::to_string));
        }
        vals.extend(self.mags.iter().map(|(_, _, mean)| mean.to_string()));
        vals.push(self.mags.value().to_string());
        vals
    }

    pub fn write_header<W>(&self, out: &mut W) -> io::Result<()>
    where W: Write
    {
        writeln!(out, "{}", self.header().iter().join(","))
    }

    pub fn write_row<W>(&self, out: &mut W) -> io::Result<()>
    where W: Write
    {
        writeln!(out, "{}", self.values().iter().join(","))
    }
}

fn fmt_entry(z: &C64) -> String {
    if z.im == 0.0 { z.re.to_string() } else { z.to_string() }
}

/// Write the flattened state (see [`MpsState::flatten`]) as a single CSV row.
/// Entries with zero imaginary part are written as plain reals.
pub fn write_mps_row<W>(out: &mut W, mps: &MpsState) -> io::Result<()>
where W: Write
{
    writeln!(out, "{}", mps.flatten().iter().map(fmt_entry).join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{
        expectation::expectation_all_sites_mag,
        hamiltonian::{ MatrixType, PauliOp },
        plan::ContractionPlan,
    };

    #[test]
    fn columns_line_up() {
        let mut rng = StdRng::seed_from_u64(8);
        let plan = ContractionPlan::new(1).unwrap();
        let mps = MpsState::random(8, 2, 1, &mut rng).unwrap();
        let mags
            = expectation_all_sites_mag(
                &mps, &plan, MatrixType::Pauli, &[PauliOp::X, PauliOp::Z])
            .unwrap();
        let row
            = ObservablesRow {
                phys_dim: 8,
                bond_dim: 2,
                unit_cells: 1,
                hx: 0.25,
                bond_energies: vec![-1.5, -1.25],
                mags,
            };
        let header = row.header();
        assert_eq!(header.len(), 4 + 2 + 1 + 6 + 6 + 2 + 1);
        assert_eq!(header[4], "energy_bond_1");
        assert_eq!(header[6], "energy");
        assert_eq!(header[7], "mag_x_1");
        assert_eq!(header[13], "mag_z_1");
        assert_eq!(header[19], "mag_mean_x");
        assert_eq!(header.last().map(String::as_str), Some("mag_value"));
        let values = row.values();
        assert_eq!(values.len(), header.len());
        assert_eq!(values[6], "-2.75");

        let mut buf: Vec<u8> = Vec::new();
        row.write_header(&mut buf).unwrap();
        row.write_row(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("phys_dim,vir_dim,unit_cells,hx,"));
        assert!(lines[1].starts_with("8,2,1,0.25,-1.5,-1.25,-2.75,"));
    }

    #[test]
    fn mps_row_has_every_entry() {
        let mut rng = StdRng::seed_from_u64(9);
        let mps = MpsState::random(2, 2, 1, &mut rng).unwrap();
        let mut buf: Vec<u8> = Vec::new();
        write_mps_row(&mut buf, &mps).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let entries: Vec<f64>
            = text.trim_end().split(',')
            .map(|s| s.parse::<f64>().unwrap())
            .collect();
        assert_eq!(entries.len(), 2 * (2 * 2 * 2 + 2));
        let flat: Vec<f64> = mps.flatten().iter().map(|z| z.re).collect();
        assert_eq!(entries, flat);
    }
}
