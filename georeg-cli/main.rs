use clap::error::ErrorKind;
use clap::Parser;
use georeg_cli::Registrar;
use georeg_core::{init_thread_pool, RegistrationConfig};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "register")]
#[command(about = "Register a captured image against a reference base map and write the homography")]
#[command(version)]
struct Cli {
    /// Base map image
    reference: PathBuf,

    /// New image to locate on the base map
    new_image: PathBuf,

    /// Result file: confidence label followed by the 3x3 transform
    output: PathBuf,

    /// Any value enables debug images next to the output file
    debug: Option<String>,

    /// Registration settings (JSON if the extension is .json, TOML otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads (defaults to the config value)
    #[arg(long)]
    threads: Option<usize>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(-1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        process::exit(-1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RegistrationConfig::load(path)?,
        None => RegistrationConfig::default(),
    };
    if let Some(n) = cli.threads {
        config.n_threads = n;
    }
    tracing::debug!("{}", config.summary());

    if let Err(e) = init_thread_pool(config.n_threads) {
        tracing::warn!("thread pool already initialised: {e}");
    }

    let registrar = Registrar::new(config)?;
    let registration = registrar.register_files(&cli.reference, &cli.new_image, &cli.output, cli.debug.is_some())?;
    tracing::info!(
        "Computed {} transform with {} inliers.",
        registration.result.confidence(),
        registration.result.inliers()
    );
    Ok(())
}
