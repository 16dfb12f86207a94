use biql::engine::resolve_format;
use biql::error::BiqlError;
use biql::output::{render, OutputFormat};
use biql::{CancelToken, Engine};
use clap::Parser;
use log::debug;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "biql",
    version = env!("CARGO_PKG_VERSION"),
    about = "SQL-like queries over BIDS neuroimaging datasets",
    after_help = QUERY_EXAMPLES
)]
struct Cli {
    /// BIQL query string (optional with --show-stats / --show-entities)
    query: Option<String>,

    /// Dataset root directory
    #[arg(short = 'd', long, env = "BIQL_DATASET_PATH", default_value = ".")]
    dataset: PathBuf,

    /// Output format
    #[arg(short = 'f', long, env = "BIQL_OUTPUT_FORMAT", value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Parse only; print a confirmation on success
    #[arg(short = 'v', long)]
    validate: bool,

    /// Parse only; exit status reflects validity, no output
    #[arg(long)]
    validate_only: bool,

    /// Append dataset stats to the output
    #[arg(long)]
    show_stats: bool,

    /// List available entities and their distinct values
    #[arg(long)]
    show_entities: bool,

    /// Emit parse/evaluation trace on stderr
    #[arg(long)]
    debug: bool,

    /// Emit elapsed time and peak memory on stderr
    #[arg(long)]
    profile: bool,
}

const QUERY_EXAMPLES: &str = r#"
QUERY EXAMPLES:
  # All files for one subject (bare predicate form)
  biql -d /data/ds 'sub=01'

  # Distinct tasks among functional runs
  biql -d /data/ds 'SELECT DISTINCT task WHERE datatype=func'

  # File counts per subject
  biql -d /data/ds 'SELECT sub, COUNT(*) GROUP BY sub' --format table

  # Wildcards, regex, ranges, lists
  biql -d /data/ds 'task=*back*'
  biql -d /data/ds 'task ~= ".*back.*"'
  biql -d /data/ds 'run=[1:3] AND sub IN [01, 02, 03]'

  # Metadata and participants namespaces
  biql -d /data/ds 'metadata.RepetitionTime < 2.5'
  biql -d /data/ds 'participants.age > 25'

  # Grouping with aggregates and HAVING
  biql -d /data/ds 'SELECT sub, ses, task, COUNT(*) AS n_runs \
      WHERE datatype=func GROUP BY sub, ses, task HAVING COUNT(*) > 1'

  # Collect the distinct tasks per subject
  biql -d /data/ds 'SELECT sub, ARRAY_AGG(DISTINCT task) AS tasks GROUP BY sub'

  # Pipe matching paths into other tools
  biql -d /data/ds 'datatype=anat suffix=T1w' --format paths

ENVIRONMENT:
  BIQL_DATASET_PATH    default dataset root (same as --dataset)
  BIQL_OUTPUT_FORMAT   default output format (same as --format)

EXIT CODES:
  0  success
  1  query syntax error
  2  dataset load error
  3  output error
  4  argument error
"#;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 4 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let default_level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if cli.query.is_none() && !cli.show_stats && !cli.show_entities {
        eprintln!("error: a query argument is required");
        std::process::exit(4);
    }

    if let Err(err) = dispatch(&cli) {
        emit_error(&err);
        std::process::exit(err.exit_code());
    }
}

fn dispatch(cli: &Cli) -> Result<(), BiqlError> {
    // Validation modes never touch the dataset.
    if cli.validate || cli.validate_only {
        let Some(ref query) = cli.query else {
            eprintln!("error: a query argument is required");
            std::process::exit(4);
        };
        biql::parse(query)?;
        if cli.validate {
            println!("Query syntax is valid");
        }
        return Ok(());
    }

    // Parse before the (potentially expensive) dataset walk so syntax
    // errors surface immediately.
    let query = match cli.query {
        Some(ref text) => {
            let query = biql::parse(text)?;
            if cli.debug {
                debug!(
                    "ast: {}",
                    serde_json::to_string(&query).unwrap_or_else(|_| "<unprintable>".to_string())
                );
            }
            Some(query)
        }
        None => None,
    };

    let cancel = CancelToken::new();
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag());

    let started = Instant::now();
    let engine = Engine::build_with_cancel(&cli.dataset, &cancel)?;
    let indexed = started.elapsed();
    for warning in engine.warnings() {
        debug!("build warning: {}", warning);
    }

    let mut sections: Vec<String> = Vec::new();

    if let Some(ref query) = query {
        let format = resolve_format(query, cli.format)?;
        let result = engine.evaluate_with_cancel(query, &cancel)?;
        debug!(
            "query matched {} records, produced {} rows",
            result.matched_paths.len(),
            result.rows.len()
        );
        sections.push(render(&result, format)?);
    }

    if cli.show_stats {
        sections.push(serde_json::to_string_pretty(engine.dataset_stats())?);
    }

    if cli.show_entities {
        let mut listing = String::new();
        for (entity, values) in engine.catalog().entity_summary() {
            listing.push_str(&format!("{}: {}\n", entity, values.join(", ")));
        }
        sections.push(listing.trim_end().to_string());
    }

    write_output(cli, sections.join("\n"))?;

    if cli.profile {
        eprintln!(
            "profile: indexed {} files in {:.1?}, total {:.1?}",
            engine.dataset_stats().total_files,
            indexed,
            started.elapsed()
        );
        match biql::platform::peak_rss_kb() {
            Some(kb) => eprintln!("profile: peak memory {} KB", kb),
            None => eprintln!("profile: peak memory unavailable on this platform"),
        }
    }
    Ok(())
}

fn write_output(cli: &Cli, body: String) -> Result<(), BiqlError> {
    match cli.output {
        Some(ref path) => {
            let mut file = std::fs::File::create(path).map_err(|e| BiqlError::OutputError {
                reason: format!("{}: {}", path.display(), e),
            })?;
            writeln!(file, "{}", body.trim_end()).map_err(|e| BiqlError::OutputError {
                reason: format!("{}: {}", path.display(), e),
            })
        }
        None => {
            println!("{}", body.trim_end());
            Ok(())
        }
    }
}

fn emit_error(err: &BiqlError) {
    eprintln!("error[{}]: {}", err.error_code(), err);
    if let Some(hint) = err.remediation() {
        eprintln!("hint: {}", hint);
    }
}
