use std::{
    fs::{ self, File },
    io::{ BufWriter, Write },
    path::PathBuf,
    time::{ SystemTime, UNIX_EPOCH },
};
use anyhow::{ Context, Result, bail };
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use itebd::{
    evolution::{ self, Sample, ScheduleConfig },
    hamiltonian::{ Encoder, MatrixType, PauliOp },
    record::{ self, ObservablesRow },
    Itebd,
    ItebdConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "iTEBD transverse-field sweep of the toric code ladder")]
struct Args {
    /// Single-qubit matrix normalization (pauli or spin)
    #[arg(long, default_value = "pauli")]
    matrix_type: MatrixType,

    /// Number of singular values kept on each bond
    #[arg(long, default_value_t = 2)]
    bond_dim: usize,

    /// Number of two-site unit cells
    #[arg(long, default_value_t = 1)]
    unit_cells: usize,

    /// Vertex coupling
    #[arg(long, default_value_t = 1.0)]
    jv: f64,

    /// Plaquette coupling
    #[arg(long, default_value_t = 1.0)]
    jp: f64,

    /// Smallest transverse field
    #[arg(long, default_value_t = 0.0)]
    hx_min: f64,

    /// Largest transverse field
    #[arg(long, default_value_t = 1.4)]
    hx_max: f64,

    /// Approximate spacing between field values
    #[arg(long, default_value_t = 0.05)]
    hx_step: f64,

    /// Total number of sweeps per field value
    #[arg(long, default_value_t = 3000)]
    iteration: usize,

    /// Number of step-size stages
    #[arg(long, default_value_t = 3)]
    domains: usize,

    /// Step size of the first stage
    #[arg(long, default_value_t = 0.1)]
    delta_start: f64,

    /// Step size of the last stage
    #[arg(long, default_value_t = 0.01)]
    delta_end: f64,

    /// Convergence threshold on the change in energy
    #[arg(long, default_value_t = 1e-16)]
    accuracy: f64,

    /// RNG seed for the initial states
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory
    #[arg(long, default_value = "output")]
    outdir: PathBuf,

    /// Log every energy sample
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter
        = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.hx_step <= 0.0 { bail!("hx_step must be > 0"); }
    let num = ((args.hx_max - args.hx_min) / args.hx_step).floor().max(0.0) as usize;
    let hx_values = evolution::linspace(args.hx_min, args.hx_max, num);
    if hx_values.is_empty() { bail!("field range contains no values"); }

    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("couldn't create {}", args.outdir.display()))?;
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let phy_path = args.outdir.join(format!("{stamp}_phy_data.csv"));
    let mps_path = args.outdir.join(format!("{stamp}_mps_data.csv"));
    let mut phy_out = BufWriter::new(File::create(&phy_path)?);
    let mut mps_out = BufWriter::new(File::create(&mps_path)?);

    let encoder = Encoder::new(args.matrix_type);
    let schedule
        = ScheduleConfig {
            iteration: args.iteration,
            domains: args.domains,
            delta_start: args.delta_start,
            delta_end: args.delta_end,
            accuracy: args.accuracy,
        };
    let phys_dim: usize = 8;

    for (k, &hx) in hx_values.iter().enumerate() {
        info!(hx, "field {} of {}", k + 1, hx_values.len());
        let hamiltonian = encoder.toric_code_ladder_active_x(args.jv, args.jp, hx)?;
        let config
            = ItebdConfig {
                phys_dim,
                bond_dim: args.bond_dim,
                unit_cells: args.unit_cells,
                seed: args.seed.map(|s| s.wrapping_add(k as u64)),
            };
        let mut itebd = Itebd::with_config(hamiltonian.clone(), config)?;
        let mut observer = |sample: Sample| {
            if sample.is_best {
                info!(sweep = sample.sweep, energy = sample.energy, "best energy");
            }
        };
        let reports = itebd.evolve(&schedule, &mut observer)?;
        let converged = reports.iter().filter(|r| r.converged).count();
        let mps = itebd.mps().clone();

        let bond_energies = itebd.mps_bonds_energy(&mps, &hamiltonian)?;
        let mags = itebd.expectation_all_sites_mag(&mps, &[PauliOp::X, PauliOp::Z])?;
        let row
            = ObservablesRow {
                phys_dim,
                bond_dim: args.bond_dim,
                unit_cells: args.unit_cells,
                hx,
                bond_energies,
                mags,
            };
        info!(
            hx,
            energy = row.energy(),
            mag = row.mags.value(),
            converged_stages = converged,
            "done"
        );
        if k == 0 { row.write_header(&mut phy_out)?; }
        row.write_row(&mut phy_out)?;
        record::write_mps_row(&mut mps_out, &mps)?;
    }
    phy_out.flush()?;
    mps_out.flush()?;
    info!("wrote {} and {}", phy_path.display(), mps_path.display());
    Ok(())
}
