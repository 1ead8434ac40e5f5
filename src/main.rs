//! CLI entry point for `sqlmisc`.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use sql_misconceptions::catalog::ddl::parse_schema_with_search_path;
use sql_misconceptions::catalog::SchemaCatalog;
use sql_misconceptions::config::EngineConfig;
use sql_misconceptions::output::{formatter, report, NamedOutcome};
use sql_misconceptions::sampler::{InMemorySample, SampleDatabase};
use sql_misconceptions::Analyzer;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

#[derive(Parser)]
#[command(
    name = "sqlmisc",
    about = "Detect misconceptions in SQL queries against a schema"
)]
struct Cli {
    /// Query files, one SELECT statement each
    #[arg(required = true)]
    queries: Vec<PathBuf>,

    /// Schema as CREATE TABLE statements
    #[arg(long, conflicts_with = "catalog")]
    schema: Option<PathBuf>,

    /// Schema as catalog JSON
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Introspect the schema of a live `PostgreSQL` database
    #[cfg(feature = "db")]
    #[arg(long, conflicts_with_all = ["schema", "catalog"])]
    db_url: Option<String>,

    /// Reference solution of the exercise (repeatable)
    #[arg(long = "solution")]
    solutions: Vec<PathBuf>,

    /// Sample rows as JSON
    #[arg(long)]
    sample: Option<PathBuf>,

    /// Sample database reached through `PostgreSQL`
    #[cfg(feature = "db")]
    #[arg(long, conflicts_with = "sample")]
    sample_db_url: Option<String>,

    /// Engine settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format on stdout
    #[arg(long, value_enum, default_value = "markdown")]
    format: Format,

    /// Also write `<name>.json` and `<name>_report.md` into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print debug diagnostics on stderr
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli) {
        Ok(has_errors) => {
            if has_errors {
                process::exit(1);
            }
        }
        Err(message) => {
            error!("{message}");
            eprintln!("Error: {message}");
            process::exit(2);
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))
}

fn load_catalog(cli: &Cli, config: &EngineConfig) -> Result<SchemaCatalog, String> {
    #[cfg(feature = "db")]
    {
        if let Some(url) = &cli.db_url {
            return sql_misconceptions::catalog::introspect::introspect_url(
                url,
                &config.default_schema,
            )
            .map_err(|e| e.to_string());
        }
    }
    match (&cli.schema, &cli.catalog) {
        (Some(path), _) => parse_schema_with_search_path(&read(path)?, &config.default_schema)
            .map_err(|e| format!("{}: {e}", path.display())),
        (None, Some(path)) => {
            SchemaCatalog::from_json(&read(path)?).map_err(|e| format!("{}: {e}", path.display()))
        }
        (None, None) => Err("one of --schema or --catalog is required".to_string()),
    }
}

#[cfg_attr(not(feature = "db"), allow(unused_variables))]
fn load_sample(
    cli: &Cli,
    config: &EngineConfig,
) -> Result<Option<Box<dyn SampleDatabase>>, String> {
    #[cfg(feature = "db")]
    {
        if let Some(url) = &cli.sample_db_url {
            let sample =
                sql_misconceptions::sampler::postgres::PostgresSample::connect(url, &config.sampler)
                    .map_err(|e| e.to_string())?;
            return Ok(Some(Box::new(sample)));
        }
    }
    match &cli.sample {
        Some(path) => {
            let sample = InMemorySample::from_json(&read(path)?)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            Ok(Some(Box::new(sample)))
        }
        None => Ok(None),
    }
}

fn run(cli: &Cli) -> Result<bool, String> {
    let config = EngineConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let catalog = load_catalog(cli, &config)?;
    debug!(relations = catalog.relations.len(), "schema loaded");

    let mut analyzer = Analyzer::new(catalog).with_config(config.clone());
    if let Some(sample) = load_sample(cli, &config)? {
        analyzer = analyzer.with_sample(sample);
    }

    let queries = cli
        .queries
        .iter()
        .map(|path| read(path))
        .collect::<Result<Vec<_>, _>>()?;
    let solutions = cli
        .solutions
        .iter()
        .map(|path| read(path))
        .collect::<Result<Vec<_>, _>>()?;

    let results: Vec<NamedOutcome> = analyzer
        .analyze_batch(&queries, &solutions)
        .into_iter()
        .zip(&cli.queries)
        .map(|(result, path)| NamedOutcome {
            name: path.display().to_string(),
            result,
        })
        .collect();

    match cli.format {
        Format::Json => println!("{}", formatter::to_json(&results).map_err(|e| e.to_string())?),
        Format::Markdown => print!("{}", report::build_report(&results)),
    }

    if let Some(dir) = &cli.output_dir {
        let name = cli
            .queries
            .first()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("sqlmisc");
        formatter::write_output(dir, name, &results).map_err(|e| e.to_string())?;
    }

    if let Some(failed) = results.iter().find_map(|named| named.result.as_ref().err()) {
        return Err(failed.to_string());
    }
    Ok(results.iter().any(|named| {
        named
            .result
            .as_ref()
            .is_ok_and(|outcome| outcome.diagnostics.has_errors())
    }))
}
