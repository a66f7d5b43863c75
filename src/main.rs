//! Command-line front-end for the out-of-core SVO builder.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use log::LevelFilter;

use svo_forge::constants::{DEFAULT_GRIDSIZE, DEFAULT_MEMORY_BUDGET_MB, DEFAULT_SPARSENESS_LIMIT};
use svo_forge::{build_svo, BuildConfig};

struct Args {
    config: BuildConfig,
    verbose: bool,
}

fn print_help() {
    println!("Usage: svo-forge -f <mesh.tri> [options]");
    println!();
    println!("  -f <mesh.tri>   Path to a .tri input mesh (required)");
    println!(
        "  -s <gridsize>   Voxel grid edge, a power of two (default {})",
        DEFAULT_GRIDSIZE
    );
    println!(
        "  -l <limit>      Voxel memory budget in MiB (default {})",
        DEFAULT_MEMORY_BUDGET_MB
    );
    println!(
        "  -d <percent>    Budget share for the sparse code list (default {})",
        (DEFAULT_SPARSENESS_LIMIT * 100.0) as u32
    );
    println!("  -levels         Store averaged densities on intermediate levels");
    println!("  -v              Verbose logging");
    println!("  -h              Print this help and exit");
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_help();
        return Ok(None);
    }

    let mut input: Option<PathBuf> = None;
    let mut gridsize = DEFAULT_GRIDSIZE;
    let mut budget_mb = DEFAULT_MEMORY_BUDGET_MB;
    let mut sparseness = DEFAULT_SPARSENESS_LIMIT;
    let mut generate_levels = false;
    let mut verbose = false;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .with_context(|| format!("{} expects a value", name))
        };
        match flag.as_str() {
            "-f" => input = Some(PathBuf::from(value("-f")?)),
            "-s" => {
                gridsize = value("-s")?
                    .parse()
                    .context("-s expects a grid size")?;
            }
            "-l" => {
                budget_mb = value("-l")?
                    .parse()
                    .context("-l expects a MiB count")?;
            }
            "-d" => {
                let percent: u32 = value("-d")?
                    .parse()
                    .context("-d expects a percentage")?;
                sparseness = percent as f32 / 100.0;
            }
            "-levels" => generate_levels = true,
            "-v" => verbose = true,
            "-h" => {
                print_help();
                return Ok(None);
            }
            other => bail!("unknown option {other}, try -h"),
        }
    }

    let Some(input) = input else {
        bail!("no input mesh; at minimum I need -f <mesh.tri>");
    };
    let output = input.with_extension("");

    let mut config = BuildConfig::new(input, output);
    config.gridsize = gridsize;
    config.memory_budget = budget_mb.saturating_mul(1024 * 1024);
    config.sparseness_limit = sparseness;
    config.generate_levels = generate_levels;
    Ok(Some(Args { config, verbose }))
}

fn run() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let stats = build_svo(&args.config)?;
    println!(
        "done: {} voxels in {} nodes across {} partition(s)",
        stats.n_voxels, stats.n_nodes, stats.n_partitions
    );
    println!("octree written to {}.octree", args.config.output.display());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
