#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use superloc::config::SuperlocConfig;
use superloc::progress::LogObserver;
use superloc::shared::matrix::{check_dir_exists, check_file_exists, read_matrix, write_matrix};
use superloc::{run_pipeline_with_observer, super_ensemble_localization_with_observer};

/// Trains a surrogate on a small ensemble, evaluates it on a super ensemble and
/// optionally computes the localization matrix of the super ensemble.
///
/// All matrix files are headerless little-endian float32 in column-major order,
/// with variables as rows and ensemble members as columns.
#[derive(Parser)]
#[command(name = "superloc", version, about, long_about = None)]
struct Cli {
    /// Number of model parameters (rows of the parameter files)
    #[arg(short = 'm', long = "nm", value_name = "N")]
    nm: usize,

    /// Number of observations (rows of the observation file)
    #[arg(short = 'd', long = "nd", value_name = "N")]
    nd: usize,

    /// Parameters of the small ensemble (nm × Ne)
    #[arg(short = 'M', long, value_name = "PATH")]
    mfile: PathBuf,

    /// Observations of the small ensemble (nd × Ne)
    #[arg(short = 'D', long, value_name = "PATH")]
    dfile: PathBuf,

    /// Parameters of the super ensemble (nm × Ns)
    #[arg(short = 'S', long, value_name = "PATH")]
    msfile: PathBuf,

    /// Where to save the predicted super-ensemble observations (nd × Ns)
    #[arg(short = 'P', long, value_name = "PATH")]
    dsfile: Option<PathBuf>,

    /// Where to save the localization matrix (nm × nd); skipped when absent
    #[arg(short = 'R', long, value_name = "PATH")]
    rfile: Option<PathBuf>,

    /// Log file, appended to on every run
    #[arg(short = 'l', long, value_name = "PATH", default_value = "superloc.log")]
    logfile: PathBuf,

    /// TOML file with regressor and localization settings
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Relative correlation threshold; overrides the configuration file
    #[arg(long, value_name = "F")]
    epsilon: Option<f64>,

    /// Worker threads for surrogate training (default: all cores)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    check_dir_exists(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {}:{} - {}",
                buf.timestamp(),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .try_init()?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<SuperlocConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => SuperlocConfig::load(path)?,
        None => SuperlocConfig::default(),
    };
    if let Some(epsilon) = cli.epsilon {
        config.localization.epsilon = epsilon;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_logging(&cli.logfile)?;
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    let config = load_config(&cli)?;

    for path in [&cli.mfile, &cli.dfile, &cli.msfile] {
        check_file_exists(path)?;
    }
    for path in cli.dsfile.iter().chain(&cli.rfile) {
        check_dir_exists(path)?;
    }

    // Files hold variables as rows; the surrogate wants samples as rows.
    let x_train = read_matrix(&cli.mfile, cli.nm)?.reversed_axes();
    let y_train = read_matrix(&cli.dfile, cli.nd)?.reversed_axes();
    let x_super = read_matrix(&cli.msfile, cli.nm)?.reversed_axes();
    println!(
        "Loaded small ensemble of {} members and super ensemble of {} members.",
        x_train.nrows(),
        x_super.nrows()
    );

    let mut observer = LogObserver;
    let output = run_pipeline_with_observer(
        x_train.view(),
        y_train.view(),
        x_super.view(),
        &config.regressor,
        &mut observer,
    )?;
    println!(
        "Surrogate training rmse (scaled outputs): {:.4}",
        output.surrogate.training_rmse()
    );
    for (label, scaler) in [
        ("Parameter", output.surrogate.input_scaler()),
        ("Observation", output.surrogate.output_scaler()),
    ] {
        for (column, (lo, hi)) in scaler.data_min().iter().zip(scaler.data_max()).enumerate() {
            log::info!("{label} {column} fitted range [{lo}, {hi}]");
        }
    }

    if let Some(path) = &cli.dsfile {
        write_matrix(path, output.y_super.t())?;
        log::info!("Saved super ensemble observations to {}", path.display());
        println!("Super ensemble observations saved to: {}", path.display());
    }

    if let Some(path) = &cli.rfile {
        let localization = super_ensemble_localization_with_observer(
            x_train.view(),
            x_super.view(),
            output.y_super.view(),
            config.localization.epsilon,
            &mut observer,
        )?;
        write_matrix(path, localization.view())?;
        log::info!("Saved localization matrix to {}", path.display());
        println!("Localization matrix saved to: {}", path.display());
    }

    Ok(())
}
