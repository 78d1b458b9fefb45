use std::{fs::File, path::PathBuf};

use anyhow::{bail, Context, Result};
use cachesim::{
    addr::Geometry,
    config::CacheConfig,
    sim::{Echo, Simulator},
    trace::TraceReader,
};
use clap::{Args, Parser};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// replay a valgrind memory trace against an LRU set-associative cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    geometry: GeometryArgs,
    /// File path to the memory trace
    #[arg(short, long)]
    trace: PathBuf,
    /// Echo the outcome of every access and log at info level
    #[arg(short, long)]
    verbose: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct GeometryArgs {
    /// Number of set index bits (2^s sets)
    #[arg(
        short = 's',
        allow_negative_numbers = true,
        required_unless_present = "config",
        conflicts_with = "config"
    )]
    set_bits: Option<i64>,
    /// Associativity (lines per set)
    #[arg(
        short = 'E',
        allow_negative_numbers = true,
        required_unless_present = "config",
        conflicts_with = "config"
    )]
    associativity: Option<i64>,
    /// Number of block offset bits (2^b byte blocks)
    #[arg(
        short = 'b',
        allow_negative_numbers = true,
        required_unless_present = "config",
        conflicts_with = "config"
    )]
    block_bits: Option<i64>,
    /// File path to a JSON cache config (`set_bits`, `associativity`, `block_bits`)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl GeometryArgs {
    fn resolve(&self) -> Result<Geometry> {
        let geometry = match (&self.config, self.set_bits, self.associativity, self.block_bits) {
            (Some(path), ..) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open config {}", path.display()))?;
                CacheConfig::deser(file)?.geometry()?
            }
            (None, Some(s), Some(e), Some(b)) => Geometry::new(s, e, b)?,
            _ => bail!("either -s, -E and -b or --config must be given"),
        };
        Ok(geometry)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let geometry = args.geometry.resolve()?;
    let mut trace = TraceReader::open(&args.trace)?;
    let mut sim = Simulator::new(geometry)?;
    let verbose = args.verbose;
    let summary = sim.run_trace(&mut trace, |record, access| {
        if verbose {
            println!("{}", Echo(record, access));
        }
    })?;
    log::info!("finished simulation on {}.", sim.cache().geometry());
    output_stat(&sim);
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(_: &Simulator) {}

#[cfg(feature = "stat")]
fn output_stat(sim: &Simulator) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
