use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use thunderstruck::app::{Pipeline, PoolSizes};
use thunderstruck::archive::ArchiveHttpClient;
use thunderstruck::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use thunderstruck::error::StrikeError;
use thunderstruck::fetch::Fetcher;
use thunderstruck::output::{JsonOutput, OutputMode, TextOutput};
use thunderstruck::sink::GzipFileSink;
use thunderstruck::store::SliceCache;

#[derive(Parser)]
#[command(name = "thunderstruck")]
#[command(about = "Collect archived lightning strikes into one GeoJSON feature collection")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download, parse and write every slice in the window")]
    Fetch(FetchArgs),
    #[command(about = "List the slices a window covers and whether they are cached")]
    Slices(WindowArgs),
}

#[derive(Args, Clone)]
struct WindowArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    start: Option<String>,

    #[arg(long)]
    end: Option<String>,

    #[arg(long)]
    cache_dir: Option<String>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[command(flatten)]
    window: WindowArgs,

    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    download_workers: Option<usize>,

    #[arg(long)]
    parse_workers: Option<usize>,
}

#[derive(Serialize)]
struct SliceEntry {
    slice: String,
    url: String,
    cache_path: String,
    cached: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<StrikeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &StrikeError) -> u8 {
    match error {
        StrikeError::MissingConfig
        | StrikeError::ConfigRead(_)
        | StrikeError::ConfigParse(_)
        | StrikeError::InvalidTimestamp(_)
        | StrikeError::InvalidStep(_) => 2,
        StrikeError::ArchiveHttp(_)
        | StrikeError::ArchiveStatus { .. }
        | StrikeError::Filesystem(_)
        | StrikeError::Output(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Slices(args) => run_slices(args, output_mode),
    }
}

fn resolve(window: &WindowArgs, overrides: ConfigOverrides) -> miette::Result<ResolvedConfig> {
    let overrides = ConfigOverrides {
        start: window.start.clone(),
        end: window.end.clone(),
        cache_dir: window.cache_dir.clone(),
        ..overrides
    };
    ConfigLoader::resolve(window.config.as_deref(), &overrides).map_err(miette::Report::new)
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = resolve(
        &args.window,
        ConfigOverrides {
            output: args.output.clone(),
            download_workers: args.download_workers,
            parse_workers: args.parse_workers,
            ..ConfigOverrides::default()
        },
    )?;
    if config.credentials.is_none() {
        info!("no archive credentials configured, sending anonymous requests");
    }

    let client = ArchiveHttpClient::new(config.credentials.clone(), config.request_timeout)
        .map_err(miette::Report::new)?;
    let fetcher = Fetcher::new(
        client,
        SliceCache::new(config.cache_dir.clone()),
        config.base_url.clone(),
        config.fallback_cooldown,
    );
    let pipeline = Pipeline::new(
        fetcher,
        GzipFileSink::new(config.output.clone()),
        PoolSizes {
            download: config.download_workers,
            parse: config.parse_workers,
        },
    );

    match output_mode {
        OutputMode::Json => {
            let summary = pipeline
                .run(&config.range, &JsonOutput)
                .map_err(miette::Report::new)?;
            JsonOutput::print_summary(&summary).into_diagnostic()
        }
        OutputMode::Text => {
            let summary = pipeline
                .run(&config.range, &TextOutput)
                .map_err(miette::Report::new)?;
            TextOutput::print_summary(&summary).into_diagnostic()
        }
    }
}

fn run_slices(args: WindowArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = resolve(&args, ConfigOverrides::default())?;
    let cache = SliceCache::new(config.cache_dir.clone());
    let entries = config
        .range
        .slices()
        .map(|slice| SliceEntry {
            slice: slice.to_string(),
            url: slice.resource_url(&config.base_url, true),
            cache_path: cache.path_for(&slice).to_string(),
            cached: cache.contains(&slice),
        })
        .collect::<Vec<_>>();

    match output_mode {
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(&entries).into_diagnostic()?;
            println!("{json}");
        }
        OutputMode::Text => {
            for entry in &entries {
                let marker = if entry.cached { "cached" } else { "remote" };
                println!("{} {marker} {}", entry.slice, entry.url);
            }
            println!("{} slices", entries.len());
        }
    }
    Ok(())
}
