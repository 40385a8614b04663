//! Command-line interface for the analytics pipeline.

use stock_insights::analytics::InsightSet;
use stock_insights::config::AppConfig;
use stock_insights::error::Result;
use stock_insights::export::{insights_to_csv, InsightReport};
use stock_insights::metadata::SourceMetadata;
use stock_insights::pipeline::analyze_with;
use stock_insights::processor::{BatchReport, ProcessOutcome, Processor};
use stock_insights::storage::FsStore;
use stock_insights::viz::ChartFormat;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabled::{builder::Builder, settings::Style};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Stock Insights - summary statistics and trend charts for daily price CSVs.
#[derive(Parser)]
#[command(name = "stock-insights")]
#[command(version)]
#[command(about = "Summary statistics and trend charts for daily stock price CSV files")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a local CSV file and print its insights
    Analyze {
        /// Path to CSV data file
        #[arg(short, long)]
        input: PathBuf,

        /// Write the chart image to this path
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Chart format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<ChartFormatArg>,
    },

    /// Store a local file in the upload container
    Upload {
        /// Path to the file to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Name to store the file under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Process one stored input and write its artifacts
    Process {
        /// Stored path, or a file name inside the upload container
        #[arg(short, long)]
        name: String,
    },

    /// Process every input in the upload container
    ProcessAll,

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "stock-insights.toml")]
        output: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ChartFormatArg {
    Png,
    Svg,
}

impl From<ChartFormatArg> for ChartFormat {
    fn from(arg: ChartFormatArg) -> Self {
        match arg {
            ChartFormatArg::Png => ChartFormat::Png,
            ChartFormatArg::Svg => ChartFormat::Svg,
        }
    }
}

impl Cli {
    /// Initialize logging from `RUST_LOG`, falling back to the verbosity level.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity_level(self.verbose).to_string()));

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("Warning: a tracing subscriber is already installed");
        }
    }

    fn load_config(&self) -> Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load(path),
            None => Ok(AppConfig::default()),
        }
    }
}

/// Log level for a `-v` count.
fn verbosity_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Run the CLI application.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    cli.init_logging();
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Analyze {
            input,
            chart,
            format,
        } => {
            let format = format.map(ChartFormat::from).unwrap_or(config.chart.format);
            analyze_file(input, chart.as_deref(), format, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Upload { file, name } => {
            let data = fs::read(file)?;
            let name = name
                .clone()
                .or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()));
            let processor = Processor::new(FsStore::new(&config.storage.root), config);
            let path = processor.upload(name.as_deref(), &data)?;
            println!("File '{}' uploaded successfully.", path);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Process { name } => {
            let path = if name.contains('/') {
                name.clone()
            } else {
                format!("{}/{}", config.storage.upload_container, name)
            };
            let processor = Processor::new(FsStore::new(&config.storage.root), config);
            let outcome = processor.process(&path)?;
            print_outcome(&outcome, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::ProcessAll => {
            let mut config = config;
            config.processing.show_progress = cli.output == OutputFormat::Text;
            let processor = Processor::new(FsStore::new(&config.storage.root), config);
            let report = processor.process_all()?;
            print_batch(&report, cli.output)?;
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Init { output } => {
            fs::write(output, AppConfig::example())?;
            println!("Configuration written to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn analyze_file(
    input: &Path,
    chart_out: Option<&Path>,
    format: ChartFormat,
    output: OutputFormat,
) -> Result<()> {
    info!("Loading data from: {}", input.display());
    let data = fs::read(input)?;
    let source = SourceMetadata::from_bytes(input.display().to_string(), &data);
    let analysis = analyze_with(&data, format)?;

    if let Some(path) = chart_out {
        fs::write(path, &analysis.chart)?;
        info!("Chart written to {}", path.display());
    }

    match output {
        OutputFormat::Text => print_insights(&analysis.insights),
        OutputFormat::Json => {
            let report = InsightReport::new(&analysis.insights)
                .with_chart(analysis.granularity(), analysis.records)
                .with_source(&source);
            println!("{}", report.to_json()?);
        }
        OutputFormat::Csv => {
            print!("{}", String::from_utf8_lossy(&insights_to_csv(&analysis.insights)?));
        }
    }
    Ok(())
}

fn print_insights(insights: &InsightSet) {
    println!();
    println!("{}", "═".repeat(48).blue());
    println!("{}", " STOCK INSIGHTS ".bold().blue());
    println!("{}", "═".repeat(48).blue());
    println!();

    println!("{}", "Period".bold().underline());
    println!("  Start:              {:>14}", insights.start_date());
    println!("  End:                {:>14}", insights.end_date());
    println!();

    println!("{}", "Prices".bold().underline());
    println!("  Highest:            {:>14}", insights.highest_price());
    println!("  Lowest:             {:>14}", insights.lowest_price());
    println!("  Average Close:      {:>14.4}", insights.average_price());
    match insights.seven_day_average_latest() {
        Some(avg) => println!("  7-Day Average:      {:>14.4}", avg),
        None => println!("  7-Day Average:      {:>14}", "n/a"),
    }
    println!("  Performance:        {:>14}", format_change(insights.performance_change()));
    println!();

    println!("{}", "Volume".bold().underline());
    println!("  Total Traded:       {:>14}", insights.total_trading_volume());
    println!();

    println!("{}", "═".repeat(48).blue());
}

/// Color a formatted percentage change by sign.
fn format_change(change: &str) -> String {
    if change.starts_with('-') {
        change.red().to_string()
    } else {
        change.green().to_string()
    }
}

fn print_outcome(outcome: &ProcessOutcome, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text | OutputFormat::Csv => {
            println!(
                "{} ({} records, charted by {})",
                outcome.source.path, outcome.records, outcome.granularity
            );
            println!("  summary: {}", outcome.summary_path);
            println!("  chart:   {}", outcome.chart_path);
        }
    }
    Ok(())
}

fn print_batch(report: &BatchReport, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => {
            let failed: Vec<serde_json::Value> = report
                .failed
                .iter()
                .map(|(path, e)| serde_json::json!({ "path": path, "error": e.to_string() }))
                .collect();
            let value = serde_json::json!({
                "processed": report.processed,
                "failed": failed,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => write_batch_csv(report, io::stdout().lock())?,
        OutputFormat::Text => {
            let mut builder = Builder::new();
            builder.push_record(["File", "Status", "Records", "Chart", "Detail"]);
            for outcome in &report.processed {
                builder.push_record([
                    outcome.source.path.clone(),
                    "ok".to_string(),
                    outcome.records.to_string(),
                    outcome.granularity.to_string(),
                    outcome.chart_path.clone(),
                ]);
            }
            for (path, e) in &report.failed {
                builder.push_record([
                    path.clone(),
                    "failed".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    e.to_string(),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));

            let summary = format!(
                "Processed {} files: {} succeeded, {} failed",
                report.total(),
                report.processed.len(),
                report.failed.len()
            );
            if report.is_success() {
                println!("{}", summary.green());
            } else {
                println!("{}", summary.yellow());
            }
        }
    }
    Ok(())
}

/// Write one CSV row per batch input: path, status, detail.
fn write_batch_csv<W: io::Write>(report: &BatchReport, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["path", "status", "detail"])?;
    for outcome in &report.processed {
        writer.write_record([
            outcome.source.path.as_str(),
            "ok",
            outcome.summary_path.as_str(),
        ])?;
    }
    for (path, e) in &report.failed {
        writer.write_record([path.as_str(), "failed", e.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
