use clap::{Parser, Subcommand};
use pressroom::build::{self, BuildError, BuildOptions, Isolation, worker};
use pressroom::config::{self, IsolationMode, PressroomConfig};
use pressroom::output;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for a missing content directory (sysexits `EX_DATAERR`).
const EXIT_DATAERR: u8 = 65;

#[derive(Parser)]
#[command(name = "pressroom")]
#[command(about = "Incremental static site builder")]
#[command(long_about = "\
Incremental static site builder

Markdown entries with YAML front matter are rendered through page templates
into static HTML. Rebuilds only touch what changed: a build manifest tracks
which source produced which file, and a render cache keyed on source and
template content skips unchanged pages.

Content structure:

  content/
  ├── config.yaml                  # Site title, description, base_url, language
  ├── about.md                     # Standalone page → /about/
  ├── templates/                   # Local theme (entry.html, page layouts)
  │   └── entry.html
  └── blog/                        # Collection
      ├── _collection.yaml         # title, permalink pattern (/:collection/:slug/)
      ├── 2024-03-09-hello.md      # Dated entry, slug \"hello\"
      └── notes.md

Run 'pressroom gen-config' to generate a documented pressroom.toml.")]
#[command(version)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by commands that touch the output directory.
#[derive(clap::Args, Clone)]
struct DirArgs {
    /// Content directory [default: from pressroom.toml, else "content"]
    #[arg(short = 'c', long)]
    content_dir: Option<PathBuf>,

    /// Output directory [default: from pressroom.toml, else "output"]
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
struct BuildArgs {
    #[command(flatten)]
    dirs: DirArgs,

    /// Parallel render workers (0 = one per CPU core)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Disable the render cache and incremental builds; wipe the output first
    #[arg(long)]
    no_cache: bool,

    /// Include draft entries
    #[arg(long)]
    drafts: bool,

    /// Include future-dated entries
    #[arg(long)]
    future: bool,

    /// List what would be written and removed, then exit
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render the site into the output directory
    Build(BuildArgs),
    /// Remove the output directory and the build cache
    Clean(DirArgs),
    /// Print a stock pressroom.toml with all options documented
    GenConfig,
    /// Render tasks read from stdin (used by parallel builds)
    #[command(hide = true)]
    RenderWorker,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            match e.downcast_ref::<BuildError>() {
                Some(BuildError::ContentDirNotFound(_)) => ExitCode::from(EXIT_DATAERR),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Build(args) => {
            let config = config::load_config(Path::new("."))?;
            let opts = build_options(&config, &args)?;
            if args.dry_run {
                let plan = build::plan(&opts)?;
                output::print_plan(&plan, &opts.output_dir);
            } else {
                let report = build::build(&opts)?;
                output::print_build_report(&report);
            }
        }
        Command::Clean(dirs) => {
            let config = config::load_config(Path::new("."))?;
            let output_dir = dirs
                .output_dir
                .unwrap_or_else(|| PathBuf::from(&config.output_dir));
            let removed = build::clean(&output_dir, Path::new(&config.build.cache_dir))?;
            output::print_clean(&removed);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::RenderWorker => {
            let report = worker::run_worker(std::io::stdin().lock())?;
            println!("{}", serde_json::to_string(&report)?);
            if !report.succeeded() {
                return Err(format!("{} task(s) failed", report.failures.len()).into());
            }
        }
    }
    Ok(())
}

/// Merge CLI flags over the loaded config.
fn build_options(config: &PressroomConfig, args: &BuildArgs) -> Result<BuildOptions, Box<dyn std::error::Error>> {
    let content_dir = args
        .dirs
        .content_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.content_dir));
    let output_dir = args
        .dirs
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));

    let mut opts = BuildOptions::new(content_dir, output_dir, &config.build.cache_dir);
    opts.theme_dirs = config.theme.dir_paths();
    opts.workers = config::effective_workers(args.workers.unwrap_or(config.build.workers));
    opts.cache = config.build.cache && !args.no_cache;
    opts.drafts = config.build.drafts || args.drafts;
    opts.future = config.build.future || args.future;
    opts.worker_timeout = config.build.worker_timeout();
    opts.isolation = match config.build.isolation {
        IsolationMode::Process => Isolation::Process {
            program: std::env::current_exe()?,
        },
        IsolationMode::Thread => Isolation::Threads,
    };
    Ok(opts)
}

/// Log to stderr so worker processes share the parent's terminal and the
/// worker's stdout stays free for its report.
fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
