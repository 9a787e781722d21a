use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use syno_spk_builder::catalog::Catalog;
use syno_spk_builder::config::{
    BuildConfig, DEFAULT_CACHE_PATH, DEFAULT_RELEASE_URL, DEFAULT_TELEPORT_VERSION,
    DEFAULT_TIMEOUT_SECS,
};
use syno_spk_builder::error::SpkError;
use syno_spk_builder::pipeline::build_package;
use syno_spk_builder::resolver::processor_choices;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "syno-spk-builder", version)]
#[command(about = "Build a Synology DSM package (SPK) for Teleport", long_about = None)]
struct Cli {
    /// Target version of DSM software [default: latest supported]
    #[arg(long, env = "SPK_DSM_VERSION")]
    dsm_version: Option<String>,

    /// Target processor family (required)
    #[arg(long, env = "SPK_PROCESSOR")]
    processor: Option<String>,

    /// Teleport release to package
    #[arg(long, env = "SPK_TELEPORT_VERSION", default_value = DEFAULT_TELEPORT_VERSION)]
    teleport_version: String,

    /// Host serving Teleport release tarballs
    #[arg(long, env = "SPK_RELEASE_URL", default_value = DEFAULT_RELEASE_URL)]
    release_url: String,

    /// Path where downloads are cached
    #[arg(long, env = "SPK_CACHE_PATH", default_value = DEFAULT_CACHE_PATH)]
    cache_path: PathBuf,

    /// Don't use cached files, always download
    #[arg(long)]
    nocache: bool,

    /// Directory the package is written to
    #[arg(short, long, env = "SPK_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON file replacing the built-in version/processor catalog
    #[arg(long, env = "SPK_CATALOG")]
    catalog: Option<PathBuf>,

    /// Network timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_cli() -> Cli {
    let catalog = Catalog::builtin();
    let versions = catalog
        .versions()
        .iter()
        .map(|v| v.version.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let after_help = format!(
        "Supported DSM versions: {versions}\nSupported processors: {}",
        processor_choices(&catalog)
    );

    let matches = Cli::command().after_help(after_help).get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut builder = BuildConfig::builder()
        .teleport_version(cli.teleport_version)
        .release_url(cli.release_url)
        .cache_path(cli.cache_path)
        .no_cache(cli.nocache)
        .output_dir(cli.output_dir)
        .timeout(cli.timeout);
    if let Some(path) = cli.catalog {
        builder = builder.catalog_file(path);
    }
    if let Some(version) = cli.dsm_version {
        builder = builder.dsm_version(version);
    }
    if let Some(processor) = cli.processor {
        builder = builder.processor(processor);
    }

    let artifact = build_package(&builder.build()?).await?;
    println!("{}", artifact.path.display());

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = parse_cli();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SpkError>() {
                Some(kind) => eprintln!("error ({} stage): {e:#}", kind.stage()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
