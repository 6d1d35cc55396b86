use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use ecmwf_webapi::era_interim::{self, DEFAULT_WORKDIR};
use ecmwf_webapi::{DataServer, Request, Result, logging};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "era-interim")]
#[command(version, about = "Retrieve ERA-Interim surface fields from the ECMWF Web API", long_about = None)]
struct Cli {
    /// Directory the target files are written under (`~` is expanded)
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORKDIR)]
    workdir: String,

    /// Retrieve these JSON request files instead of the built-in pair
    #[arg(long = "request", value_name = "FILE")]
    requests: Vec<PathBuf>,

    /// Print the requests and exit without contacting the service
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("Error: {e}");
    }

    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let requests = if cli.requests.is_empty() {
        era_interim::requests().to_vec()
    } else {
        cli.requests
            .iter()
            .map(Request::from_json_file)
            .collect::<Result<Vec<_>>>()?
    };

    if cli.dry_run {
        let stdout = std::io::stdout();
        return era_interim::write_plan(&mut stdout.lock(), &requests, Utc::now());
    }

    let workdir = era_interim::expand_home(&cli.workdir);
    let results = era_interim::run_with(&workdir, &requests, DataServer::from_env)?;
    for r in &results {
        let target = r
            .target
            .as_ref()
            .map(|t| t.display().to_string())
            .unwrap_or_else(|| "-".into());
        info!("{target}: {} bytes", r.transferred);
    }
    Ok(())
}
