use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pic_sorter::server::{self, AppState};
use pic_sorter::sorter::{self, SortOptions};
use pic_sorter::{logging, Config, ManifestBuilder, ManifestError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pic-sorter",
    version,
    about = "Browse a photo folder, tag each picture, sort the files by decision"
)]
struct Cli {
    /// Working root (defaults to PIC_SORTER_ROOT or the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and the image folder (default)
    Serve(ServeArgs),
    /// Build the manifest once and exit
    BuildManifest(BuildArgs),
    /// Move or copy decided photos into per-status folders
    Sort(SortArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Address to bind, e.g. 127.0.0.1:8000
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct BuildArgs {
    /// Rebuild even if the cached manifest is fresh
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct SortArgs {
    /// Decisions document (defaults to output/decisions.json)
    #[arg(long)]
    json: Option<PathBuf>,
    /// Folder with the source photos
    #[arg(long)]
    images: Option<PathBuf>,
    /// Target folder (defaults to output/sorted)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Copy instead of move
    #[arg(long)]
    copy: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::from_env(cli.root);
    logging::init_logging(&config.log_dir)
        .with_context(|| format!("cannot set up logging in {}", config.log_dir.display()))?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                config.bind = bind;
            }
            serve(config)
        }
        Command::BuildManifest(args) => build_manifest(&config, args.force),
        Command::Sort(args) => {
            let mut opts = SortOptions::from_config(&config);
            if let Some(json) = args.json {
                opts.decisions_path = config.resolve(json);
            }
            if let Some(images) = args.images {
                opts.images_dir = config.resolve(images);
            }
            if let Some(out) = args.out {
                opts.out_dir = config.resolve(out);
            }
            opts.copy = args.copy;

            let report = sorter::run(&opts)?;
            println!(
                "Done. Files filed under {}: {} moved, {} copied, {} skipped, {} left in place",
                opts.out_dir.display(),
                report.moved,
                report.copied,
                report.skipped,
                report.left_in_place
            );
            Ok(0)
        }
    }
}

fn serve(config: Config) -> Result<i32> {
    println!("Serving {} at http://{}", config.root.display(), config.bind);
    println!("GET  /api/status");
    println!("GET  /api/images");
    println!("POST /api/rebuild-manifest");
    println!("POST /save-decisions");
    println!("POST /api/client-log");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;
    runtime
        .block_on(server::serve(AppState::from_config(config)))
        .context("server stopped with an error")?;
    Ok(0)
}

fn build_manifest(config: &Config, force: bool) -> Result<i32> {
    let builder = ManifestBuilder::from_config(config);
    let outcome = builder.build(force);

    let with_gps = outcome.images.iter().filter(|r| r.has_gps()).count();
    println!(
        "Manifest {}: {} images ({} with GPS) -> {}",
        if outcome.rebuilt { "written" } else { "up to date" },
        outcome.images.len(),
        with_gps,
        builder.store().path().display()
    );

    match outcome.advisory {
        None => Ok(0),
        Some(advisory @ (ManifestError::ToolUnavailable { .. } | ManifestError::Unexpected(_))) => {
            eprintln!("{}", advisory);
            Ok(1)
        }
        Some(advisory) => {
            eprintln!("warning: {}", advisory);
            Ok(0)
        }
    }
}
