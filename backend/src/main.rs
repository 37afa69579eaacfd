//! Tabsift CLI - Extract clean company records from messy CSV files
//!
//! # Main Command
//!
//! ```bash
//! tabsift process leads.csv companies.csv              # Ollama, defaults
//! tabsift process leads.csv out.csv --provider stub    # offline dry run
//! tabsift process leads.csv out.csv --batch-size 1 --concurrency 8
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! tabsift parse leads.csv            # Just parse CSV to JSON
//! tabsift check phone "555-1234567"  # Run one field validator
//! ```

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tabsift::{
    build_extractor, validate_field, CsvSource, ErrorLog, ExtractorConfig, Field, InsertPolicy,
    PhonePolicy, Pipeline, PipelineConfig, PipelineError, ProgressSink, Provider, RunResult,
    SchemaVersion, ValidationRules,
};

#[derive(Parser)]
#[command(name = "tabsift")]
#[command(about = "Extract, validate and stage company records from messy CSV files", long_about = None)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: CSV → extractor → validation → clean CSV
    Process {
        /// Input CSV file
        input: PathBuf,

        /// Output CSV file (created or truncated)
        output: PathBuf,

        /// Records per extraction call (1 = one call per row)
        #[arg(short = 'b', long, default_value_t = tabsift::config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Error log file (truncated at start)
        #[arg(short = 'e', long, default_value = "error_log.txt")]
        error_log: PathBuf,

        /// Concurrent extraction calls
        #[arg(long, default_value_t = tabsift::config::DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Phone rule: permissive | strict
        #[arg(long, default_value = "permissive")]
        phone_policy: PhonePolicy,

        /// Insert filter: name-excluded | any-field
        #[arg(long, default_value = "name-excluded")]
        insert_policy: InsertPolicy,

        /// Output schema: v2 | v1
        #[arg(long, default_value = "v2")]
        schema: SchemaVersion,

        /// Extraction backend: ollama | anthropic | stub (default: TABSIFT_PROVIDER or ollama)
        #[arg(long)]
        provider: Option<Provider>,

        /// Model name (default: TABSIFT_MODEL or the provider default)
        #[arg(long)]
        model: Option<String>,

        /// Stop staging after this many rows
        #[arg(long)]
        max_rows: Option<usize>,
    },

    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a single field validator
    Check {
        /// Field name (phone, email, linkedin, social, ticket, ... or a column name)
        field: String,

        /// Value to check
        value: String,

        /// Phone rule: permissive | strict
        #[arg(long, default_value = "permissive")]
        phone_policy: PhonePolicy,
    },
}

/// Terminal progress bar fed by the pipeline controller.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn advance(&mut self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "tabsift=debug" } else { "tabsift=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Process {
            input,
            output,
            batch_size,
            error_log,
            concurrency,
            phone_policy,
            insert_policy,
            schema,
            provider,
            model,
            max_rows,
        } => {
            let mut config = PipelineConfig::default()
                .with_batch_size(batch_size)
                .with_concurrency(concurrency)
                .with_phone_policy(phone_policy)
                .with_insert_policy(insert_policy)
                .with_schema(schema);
            config.max_staged_rows = max_rows;

            cmd_process(&input, &output, &error_log, config, provider, model).await
        }

        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Check {
            field,
            value,
            phone_policy,
        } => cmd_check(&field, &value, phone_policy),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_process(
    input: &Path,
    output: &Path,
    error_log: &Path,
    config: PipelineConfig,
    provider: Option<Provider>,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let mut extractor_config = ExtractorConfig::from_env()?;
    if let Some(provider) = provider {
        extractor_config.provider = provider;
    }
    if model.is_some() {
        extractor_config.model = model;
    }
    let extractor = build_extractor(&extractor_config, config.schema)?;
    eprintln!("   Extractor: {}", extractor.name());
    eprintln!(
        "   Batch size: {}, concurrency: {}",
        config.batch_size, config.concurrency
    );

    let log = ErrorLog::create(error_log).map_err(|source| PipelineError::ErrorLog {
        path: error_log.display().to_string(),
        source,
    })?;

    let result = Pipeline::new(config, extractor, log)
        .with_progress(Box::new(BarProgress::new()))
        .run(input, output)
        .await?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &RunResult) {
    eprintln!(
        "   Rows: {} ({} blank, {} malformed)",
        result.total_rows, result.blank_rows, result.malformed_rows
    );
    eprintln!(
        "\n⚙️  Extracted: {} candidates from {} units",
        result.candidates, result.units_dispatched
    );
    if result.units_failed > 0 {
        eprintln!(
            "   ⚠️  {} units failed ({} records)",
            result.units_failed, result.records_in_failed_units
        );
    }
    eprintln!("   🧹 Fields cleared: {}", result.fields_cleared);
    eprintln!(
        "   ✅ Staged: {} (suppressed {}, staging errors {})",
        result.rows_inserted, result.rows_suppressed, result.staging_failures
    );

    if let Some(ref path) = result.output_path {
        eprintln!("\n💾 {} rows written to: {}", result.rows_exported, path);
    }
    if result.error_log_entries > 0 {
        if let Some(ref path) = result.error_log_path {
            eprintln!("📝 {} errors logged to: {}", result.error_log_entries, path);
        }
    }

    eprintln!("\n✨ Done!");
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let source = CsvSource::open_with(input, delimiter)?;

    eprintln!("   Encoding: {}", source.encoding());
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(source.delimiter()),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", source.header().join(", "));

    let records = source.to_json()?;
    eprintln!("✅ Parsed {} records", records.len());

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_check(
    field: &str,
    value: &str,
    phone_policy: PhonePolicy,
) -> Result<(), Box<dyn std::error::Error>> {
    let field = Field::from_name(field).ok_or_else(|| format!("Unknown field: {}", field))?;
    let rules = ValidationRules { phone: phone_policy };

    match validate_field(field, Some(value), &rules) {
        Some(kept) => println!("✅ {}: kept \"{}\"", field, kept),
        None => println!("🧹 {}: cleared", field),
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_short_flags() {
        let cli = Cli::try_parse_from([
            "tabsift", "process", "in.csv", "out.csv", "-b", "1", "-e", "errors.txt",
        ])
        .unwrap();

        match cli.command {
            Commands::Process {
                batch_size,
                error_log,
                concurrency,
                schema,
                ..
            } => {
                assert_eq!(batch_size, 1);
                assert_eq!(error_log, PathBuf::from("errors.txt"));
                assert_eq!(concurrency, tabsift::config::DEFAULT_CONCURRENCY);
                assert_eq!(schema, SchemaVersion::V2);
            }
            _ => panic!("expected process command"),
        }
    }
}
