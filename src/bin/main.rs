//! dbscribe CLI - harvest database metadata into Markdown and a mirror store
//!
//! Usage:
//!   dbscribe harvest --source app.db [--owner main] [--mirror metadata.db]
//!   dbscribe show <table> [--owner OWNER]
//!   dbscribe search [keyword] [--owner OWNER]
//!   dbscribe serve [--bind 127.0.0.1:5000]        (feature "api")
//!
//! Examples:
//!   dbscribe harvest --source app.db --output schema.md --concurrency 8
//!   dbscribe harvest --driver snapshot --source catalog.json --mirror metadata.db
//!   dbscribe show orders --mirror metadata.db

use clap::{Parser, Subcommand, ValueEnum};
use dbscribe::catalog::{SnapshotCatalog, SqliteCatalog};
use dbscribe::config::{Settings, SourceDriver};
use dbscribe::harvest::{harvest, HarvestError, HarvestReport};
use dbscribe::mirror::MirrorReader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbscribe")]
#[command(about = "dbscribe - harvest database metadata into Markdown and a queryable mirror")]
#[command(version)]
struct Cli {
    /// Config file (default: $DBSCRIBE_CONFIG, ./dbscribe.toml, ~/.config/dbscribe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every matching table into the document (and mirror)
    Harvest {
        /// Source database file or snapshot
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Source catalog driver
        #[arg(short, long)]
        driver: Option<DriverArg>,

        /// Exact owner to harvest
        #[arg(long)]
        owner: Option<String>,

        /// Table name substring
        #[arg(long)]
        table: Option<String>,

        /// Table listing timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Per-table extraction timeout in seconds
        #[arg(long)]
        table_timeout: Option<u64>,

        /// Output Markdown file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Concurrent extractions
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Mirror database file (enables mirroring)
        #[arg(long, conflicts_with = "no_mirror")]
        mirror: Option<PathBuf>,

        /// Skip the mirror even if configured
        #[arg(long)]
        no_mirror: bool,

        /// Keep rendered sections in memory until the document is finalized
        #[arg(long)]
        retain_content: bool,
    },

    /// Print one mirrored table as JSON
    Show {
        /// Table name (substring match)
        table: String,

        #[arg(long)]
        owner: Option<String>,

        /// Mirror database file
        #[arg(long)]
        mirror: Option<PathBuf>,
    },

    /// Search mirrored tables by name or comment
    Search {
        keyword: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Mirror database file
        #[arg(long)]
        mirror: Option<PathBuf>,
    },

    /// Serve the query API over the mirror
    #[cfg(feature = "api")]
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,

        /// Mirror database file
        #[arg(long)]
        mirror: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DriverArg {
    Sqlite,
    Snapshot,
}

impl From<DriverArg> for SourceDriver {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Sqlite => SourceDriver::Sqlite,
            DriverArg::Snapshot => SourceDriver::Snapshot,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = match Settings::load_from(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Harvest {
            source,
            driver,
            owner,
            table,
            timeout,
            table_timeout,
            output,
            concurrency,
            mirror,
            no_mirror,
            retain_content,
        } => {
            if let Some(source) = source {
                settings.source.path = Some(source.display().to_string());
            }
            if let Some(driver) = driver {
                settings.source.driver = SourceDriver::from(driver).as_str().to_string();
            }
            if owner.is_some() {
                settings.harvest.owner = owner;
            }
            if table.is_some() {
                settings.harvest.table = table;
            }
            if let Some(secs) = timeout {
                settings.harvest.query_timeout = format!("{secs}s");
            }
            if let Some(secs) = table_timeout {
                settings.harvest.table_timeout = format!("{secs}s");
            }
            if let Some(output) = output {
                settings.harvest.output = output.display().to_string();
            }
            if let Some(concurrency) = concurrency {
                settings.harvest.concurrency = concurrency;
            }
            if let Some(mirror) = mirror {
                settings.mirror.enabled = true;
                settings.mirror.path = mirror.display().to_string();
            }
            if no_mirror {
                settings.mirror.enabled = false;
            }
            if retain_content {
                settings.harvest.retain_content = true;
            }
            cmd_harvest(&settings)
        }
        Commands::Show {
            table,
            owner,
            mirror,
        } => with_reader(&settings, mirror, |reader| {
            match reader.table_detail(&table, owner.as_deref())? {
                Some(detail) => print_json(&detail),
                None => {
                    eprintln!("Table not found: {}", table);
                    Ok(ExitCode::FAILURE)
                }
            }
        }),
        Commands::Search {
            keyword,
            owner,
            mirror,
        } => with_reader(&settings, mirror, |reader| {
            let tables = reader.search(keyword.as_deref(), owner.as_deref())?;
            print_json(&tables)
        }),
        #[cfg(feature = "api")]
        Commands::Serve { bind, mirror } => {
            if let Some(bind) = bind {
                settings.api.bind = bind;
            }
            cmd_serve(&settings, mirror)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dbscribe=debug" } else { "dbscribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_harvest(settings: &Settings) -> ExitCode {
    let plan = settings.harvest_options().and_then(|options| {
        let driver = settings.source.driver_type()?;
        let path = settings.source.resolved_path()?;
        Ok((options, driver, path))
    });
    let (options, driver, path) = match plan {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match driver {
        SourceDriver::Sqlite => harvest(SqliteCatalog::new(&path), &options),
        SourceDriver::Snapshot => match SnapshotCatalog::load(&path) {
            Ok(catalog) => harvest(catalog, &options),
            Err(e) => {
                eprintln!("Error loading snapshot '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
    };

    report_outcome(result)
}

fn report_outcome(result: Result<HarvestReport, HarvestError>) -> ExitCode {
    match result {
        Ok(report) => {
            println!("{}", report);
            if report.mirror_failures > 0 {
                eprintln!(
                    "Warning: {} table(s) could not be mirrored",
                    report.mirror_failures
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.table() {
                Some(table) => eprintln!("Harvest aborted at {}: {}", table, e),
                None => eprintln!("Harvest aborted: {}", e),
            }
            eprintln!("The document was not finalized.");
            ExitCode::FAILURE
        }
    }
}

fn mirror_path(settings: &Settings, override_path: Option<PathBuf>) -> Result<PathBuf, String> {
    match override_path {
        Some(path) => Ok(path),
        None => settings.mirror.resolved_path().map_err(|e| e.to_string()),
    }
}

fn open_reader(settings: &Settings, path: &Path) -> Result<MirrorReader, String> {
    let schema = settings.mirror.schema().map_err(|e| e.to_string())?;
    MirrorReader::open(path, schema)
        .map_err(|e| format!("cannot open mirror '{}': {}", path.display(), e))
}

fn with_reader<F>(settings: &Settings, mirror: Option<PathBuf>, f: F) -> ExitCode
where
    F: FnOnce(&MirrorReader) -> Result<ExitCode, Box<dyn std::error::Error>>,
{
    let reader = match mirror_path(settings, mirror).and_then(|p| open_reader(settings, &p)) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match f(&reader) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "api")]
fn cmd_serve(settings: &Settings, mirror: Option<PathBuf>) -> ExitCode {
    let reader = match mirror_path(settings, mirror).and_then(|p| open_reader(settings, &p)) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dbscribe::web::serve(reader, &settings.api.bind)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
