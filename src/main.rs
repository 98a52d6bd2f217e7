//! # datapkg-check CLI entry point
//!
//! Builds each package source directory given on the command line, installs
//! the resulting archive into a throwaway prefix and checks the installed data
//! package can be found again.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use datapkg_check::{
    ArchiveFormat, PipelineReport, SetupPyToolchain, ShareTreeLookup, ValidationPipeline,
};

/// Re-create and check data packages.
///
/// Runs `setup.py sdist` in each package directory, unpacks the archive in a
/// temporary directory, installs it there with `setup.py install` and checks
/// that the package is found under `share/nipy/nipy/<name>`.
#[derive(Parser, Debug)]
#[command(name = "datapkg-check", version, about, long_about = None)]
struct Cli {
    /// Package source directories, each containing a `setup.py`.
    #[arg(required = true)]
    pkg_dirs: Vec<PathBuf>,

    /// Python interpreter used to run `setup.py`.
    #[arg(long, env = "DATAPKG_PYTHON", default_value = "python")]
    python: PathBuf,

    /// Archive format to build. Repeat for several formats.
    #[arg(long = "format", default_value = "gztar")]
    formats: Vec<ArchiveFormat>,

    /// Fail instead of deleting an existing `dist` directory.
    #[arg(long)]
    no_clobber: bool,

    /// Kill `setup.py` invocations running longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,

    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn toolchain(&self) -> SetupPyToolchain {
        let toolchain = SetupPyToolchain::new(&self.python);
        match self.timeout {
            Some(secs) => toolchain.with_timeout(Duration::from_secs(secs)),
            None => toolchain,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &PipelineReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("Checked archives");
        for archive in report.archives() {
            println!("{}", archive.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let pipeline = ValidationPipeline::new(cli.toolchain(), ShareTreeLookup)
        .with_formats(cli.formats.clone())
        .with_clobber(!cli.no_clobber);

    let report = match pipeline.run_with_report(&cli.pkg_dirs).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                tracing::error!("  caused by: {cause}");
                source = cause.source();
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = print_report(&report, cli.json) {
        tracing::error!("Failed to render report: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
