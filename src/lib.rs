//! Stock Insights - summary statistics and trend charts for daily stock prices.
//!
//! # Overview
//!
//! Stock Insights turns a CSV file of daily price records into two artifacts:
//!
//! - **Insight summary**: highest, lowest and average price, total volume,
//!   date range, performance change and the latest 7-day rolling average
//! - **Trend chart**: mean closing price per month (or per year for spans
//!   longer than a year), rendered as PNG or SVG
//!
//! Two column conventions are recognized: the standard
//! `Date,Open,High,Low,Close,Volume` header and the Nasdaq export header
//! with `Close/Last` in place of `Close`. Prices may carry a leading `$`.
//!
//! # Quick Start
//!
//! ```
//! use stock_insights::{analyze, serialize};
//!
//! let csv = "Date,Open,High,Low,Close,Volume\n\
//!            01/01/2023,99,105,95,100,1000\n\
//!            01/02/2023,109,115,108,110,1500\n";
//!
//! let analysis = analyze(csv.as_bytes()).unwrap();
//! assert_eq!(analysis.insights.performance_change(), "10.00%");
//!
//! let summary = serialize(&analysis.insights).unwrap();
//! assert!(summary.starts_with(b"highest_price,"));
//! ```
//!
//! # Processing Stored Files
//!
//! The [`processor`] module runs the pipeline against an [`ObjectStore`],
//! writing `results/analysis_<name>` and `results/<stem>.png` next to each
//! input:
//!
//! ```no_run
//! use stock_insights::{AppConfig, FsStore, Processor};
//!
//! let config = AppConfig::default();
//! let processor = Processor::new(FsStore::new(&config.storage.root), config);
//! let report = processor.process_all().unwrap();
//! println!("{} succeeded, {} failed", report.processed.len(), report.failed.len());
//! ```
//!
//! # Modules
//!
//! - [`types`]: Core data types (PriceRecord, Field)
//! - [`schema`]: Header resolution against the known column conventions
//! - [`data`]: CSV reading and typed record parsing
//! - [`analytics`]: Summary statistics and rolling averages
//! - [`chart`]: Time bucketing of closing prices
//! - [`viz`]: PNG and SVG chart rendering
//! - [`export`]: CSV and JSON encodings of insight sets
//! - [`pipeline`]: The end-to-end `analyze` and `serialize` operations
//! - [`storage`]: Object storage abstraction and artifact naming
//! - [`processor`]: Upload, per-file and batch processing
//! - [`config`]: TOML configuration file support
//! - [`metadata`]: Source file metadata (size, checksum)

pub mod analytics;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod glyphs;
pub mod metadata;
pub mod pipeline;
pub mod processor;
pub mod schema;
pub mod storage;
pub mod types;
pub mod viz;

// Re-exports for convenience
pub use analytics::{compute_insights, InsightSet};
pub use chart::{plan_chart, BucketedSeries, Granularity};
pub use config::AppConfig;
pub use error::{AnalysisError, Result};
pub use pipeline::{analyze, analyze_with, serialize, Analysis};
pub use schema::SchemaMapping;
pub use types::{Field, PriceRecord};
pub use viz::ChartFormat;

// Storage and processing
pub use processor::{BatchReport, ProcessOutcome, Processor};
pub use storage::{FsStore, MemoryStore, ObjectStore};
