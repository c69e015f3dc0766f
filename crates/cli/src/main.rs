// occwalk CLI - hierarchical occupation crosswalk, headless

mod crosswalk;
mod exit_codes;
mod logging;
mod table;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_RUNTIME, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "occwalk")]
#[command(about = "Score survey occupation codes against a reference table, with hierarchical fallback")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "OCCWALK_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a crosswalk from a TOML config file
    #[command(after_help = "\
Examples:
  occwalk run crosswalk.toml
  occwalk run crosswalk.toml --json
  occwalk run crosswalk.toml --output report.json --annotated panel_scored.csv

Exit codes:
  0  success
  3  invalid config
  4  unreadable or malformed input table
  5  completed with validation warnings (e.g. coverage below min_coverage)")]
    Run {
        /// Path to the crosswalk .toml config file
        config: PathBuf,

        /// Output JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the target table with score, tier, provenance and label appended
        #[arg(long)]
        annotated: Option<PathBuf>,
    },

    /// Validate a crosswalk config without running
    #[command(after_help = "\
Examples:
  occwalk validate crosswalk.toml")]
    Validate {
        /// Path to the crosswalk .toml config file
        config: PathBuf,
    },

    /// Survey-weighted statistics for one CSV column
    #[command(after_help = "\
Examples:
  occwalk stats panel_scored.csv --value matched_score --weight peso
  occwalk stats panel_scored.csv --value matched_score --weight peso --group uf
  occwalk stats panel_scored.csv --value matched_score --weight peso --quantiles 5 --json")]
    Stats {
        /// CSV file with a header row
        file: PathBuf,

        /// Column holding the values
        #[arg(long)]
        value: String,

        /// Column holding the sampling weights
        #[arg(long)]
        weight: String,

        /// Summarize separately for each value of this column
        #[arg(long)]
        group: Option<String>,

        /// Split into this many weighted quantile groups
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        quantiles: Option<u16>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  occwalk-crosswalk ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run { config, json, output, annotated } => {
            crosswalk::cmd_run(config, json, output, annotated)
        }
        Commands::Validate { config } => crosswalk::cmd_validate(config),
        Commands::Stats { file, value, weight, group, quantiles, json } => {
            cmd_stats(file, value, weight, group, quantiles.map(usize::from), json)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// stats
// ============================================================================

fn cmd_stats(
    file: PathBuf,
    value: String,
    weight: String,
    group: Option<String>,
    quantiles: Option<usize>,
    json: bool,
) -> Result<(), CliError> {
    let csv_data = std::fs::read_to_string(&file)
        .map_err(|e| CliError::args(format!("cannot read {}: {e}", file.display())))?;

    let data = table::read_columns(&csv_data, &value, &weight, group.as_deref()).map_err(|e| match e {
        table::TableError::MissingColumn(_) => CliError::args(e.to_string())
            .with_hint("column names are matched exactly against the header row"),
        table::TableError::Csv(_) => CliError::io(e.to_string()),
    })?;

    let report = table::compute(&data, quantiles);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let write_err = |e: std::io::Error| CliError::io(e.to_string());

    if json {
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        writeln!(out, "{json_str}").map_err(write_err)?;
        return Ok(());
    }

    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    writeln!(
        out,
        "{:<16} {:>8} {:>12} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "group", "n", "population", "mean", "std", "p25", "p50", "p75", "gini"
    )
    .map_err(write_err)?;

    let mut rows: Vec<(&str, &table::GroupStats)> = vec![("(all)", &report.overall)];
    rows.extend(report.groups.iter().map(|(k, v)| (k.as_str(), v)));
    for (name, g) in rows {
        let s = &g.summary;
        writeln!(
            out,
            "{:<16} {:>8} {:>12.1} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            name,
            s.n,
            s.population,
            fmt(s.mean),
            fmt(s.std),
            fmt(s.p25),
            fmt(s.p50),
            fmt(s.p75),
            fmt(g.gini),
        )
        .map_err(write_err)?;
    }

    if !report.quantiles.is_empty() {
        writeln!(out).map_err(write_err)?;
        writeln!(out, "{:<6} {:>12} {:>12} {:>8} {:>12}", "bin", "lower", "upper", "n", "weight")
            .map_err(write_err)?;
        for b in &report.quantiles {
            writeln!(
                out,
                "{:<6} {:>12.4} {:>12.4} {:>8} {:>12.1}",
                b.label, b.lower, b.upper, b.count, b.weight
            )
            .map_err(write_err)?;
        }
        if let Some(q) = quantiles.filter(|q| *q != report.quantiles.len()) {
            eprintln!(
                "note: {} of {q} quantile groups survived; tied values share a breakpoint",
                report.quantiles.len()
            );
        }
    }

    Ok(())
}
