use anyhow::{Context, Result, bail};
use chrono::{Months, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use nfimport::logging::{init_logging, parse_level};
use nfimport::{
    Config, FileStore, Importer, Nfdump, Pipeline, ScanOptions, Scanner, SeriesKey, SeriesStore,
    load_config,
};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

/// Imports nfdump capture files into per-source and per-port time series.
#[derive(Parser)]
#[command(name = "nfimport", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/nfimport.toml")]
    config: PathBuf,

    /// Overrides `logging.level` (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Overrides `logging.file`.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Catch up on every capture file from a start date through today.
    Scan {
        /// First day to scan. Defaults to three years ago.
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Wipe all series and reimport from scratch.
        #[arg(long)]
        force: bool,
        /// Write the combined per-port series.
        #[arg(long)]
        ports: bool,
        /// Write per-source per-port series.
        #[arg(long)]
        ports_by_source: bool,
        /// Import files even when they are not newer than the stored series.
        #[arg(long)]
        no_last_update_check: bool,
    },
    /// Import one capture file as it arrives from the collector.
    Import {
        file: PathBuf,
        #[arg(long)]
        source: String,
        /// This is the last source to report the file's timestamp.
        #[arg(long)]
        last: bool,
    },
    /// Check the stored series against the configured schema.
    Validate,
    /// Print the last update of every configured series and of any other stored series.
    Status,
}

fn log_level(cli: &Cli, config: &Config) -> Result<LevelFilter> {
    if cli.quiet {
        return Ok(LevelFilter::WARN);
    }
    let name = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    parse_level(name)
}

fn open_pipeline(config: Config) -> Result<Pipeline<Nfdump, FileStore>> {
    let store = FileStore::open(&config.store.data_dir)
        .with_context(|| format!("opening store {}", config.store.data_dir))?;
    let tool = Nfdump::new(&config.nfdump.binary);
    Ok(Pipeline::new(config, tool, store))
}

fn configured_keys(config: &Config) -> Vec<SeriesKey> {
    let mut keys = Vec::new();
    for source in &config.general.sources {
        keys.push(SeriesKey::source(source.as_str()));
        if config.import.process_ports_by_source {
            keys.extend(config.general.ports.iter().map(|&p| SeriesKey::new(source.as_str(), p)));
        }
    }
    if config.import.process_ports {
        keys.extend(config.general.ports.iter().map(|&p| SeriesKey::combined(p)));
    }
    keys
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let level = log_level(&cli, &config)?;
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
    let _guard = init_logging(log_file.as_deref(), level)?;

    match cli.command {
        Command::Scan {
            start,
            force,
            ports,
            ports_by_source,
            no_last_update_check,
        } => {
            config.import.process_ports |= ports;
            config.import.process_ports_by_source |= ports_by_source;
            if no_last_update_check {
                config.import.check_last_update = false;
            }

            let today = Utc::now().date_naive();
            let start = match start {
                Some(start) => start,
                None => today
                    .checked_sub_months(Months::new(36))
                    .context("computing default start date")?,
            };

            let mut pipeline = open_pipeline(config)?;
            let report = Scanner::new(&mut pipeline, ScanOptions { force })
                .run_until(start, today)
                .context("catch-up import failed")?;
            println!(
                "{} sources, {} files imported, {} skipped, {} failed, {} port samples",
                report.sources_processed,
                report.files_imported,
                report.files_skipped,
                report.failures,
                report.port_samples
            );
        }
        Command::Import { file, source, last } => {
            if !config.general.sources.contains(&source) {
                bail!("source `{source}` is not configured");
            }
            let last = last || config.is_last_source(&source);
            let mut importer = Importer::new(open_pipeline(config)?);
            let result = importer.import_file(&file, &source, last);
            info!(
                source_written = result.source_written,
                source_ports = result.source_ports,
                combined_ports = result.combined_ports,
                "File import finished"
            );
        }
        Command::Validate => {
            let pipeline = open_pipeline(config)?;
            let schema = pipeline.schema();
            let mut invalid = 0;
            for key in configured_keys(pipeline.config()) {
                let report = pipeline.store().validate_structure(&key, schema)?;
                if !report.valid {
                    invalid += 1;
                    error!(series = %key, message = %report.message, "Invalid series");
                }
                println!(
                    "{key}\t{}\t{}",
                    if report.valid { "ok" } else { "invalid" },
                    report.message
                );
            }
            if invalid > 0 {
                bail!("{invalid} series do not match the configured schema");
            }
        }
        Command::Status => {
            let pipeline = open_pipeline(config)?;
            let configured = configured_keys(pipeline.config());
            let stored = pipeline.store().list()?;
            for key in &configured {
                let last = pipeline.store().last_update(key)?;
                let shown = last.map(format_timestamp).unwrap_or_else(|| "never".to_string());
                println!("{key}\t{shown}");
            }
            for key in stored.iter().filter(|key| !configured.contains(key)) {
                let last = pipeline.store().last_update(key)?;
                let shown = last.map(format_timestamp).unwrap_or_else(|| "empty".to_string());
                println!("{key}\t{shown}\tnot configured");
            }
        }
    }

    Ok(())
}
