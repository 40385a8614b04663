//! Storage-facing shim around the pipeline: uploads, per-blob processing and
//! whole-container batches.
//!
//! Files are independent units of work. A batch fans out over `rayon` and
//! one file's failure never affects another's; each failure is logged and
//! reported per file.

use crate::chart::Granularity;
use crate::config::AppConfig;
use crate::error::{AnalysisError, Result};
use crate::export::SUMMARY_CONTENT_TYPE;
use crate::metadata::SourceMetadata;
use crate::pipeline::{analyze_with, serialize, Analysis};
use crate::storage::{self, ObjectStore, DEFAULT_UPLOAD_NAME};
use crate::viz::ChartFormat;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Content type recorded for uploaded inputs.
pub const UPLOAD_CONTENT_TYPE: &str = "text/csv";

/// Artifacts written for one successfully processed input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub source: SourceMetadata,
    pub summary_path: String,
    pub chart_path: String,
    pub granularity: Granularity,
    pub records: usize,
}

/// Result of processing every input of a container.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<ProcessOutcome>,
    pub failed: Vec<(String, AnalysisError)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Upper bound on bounded-analysis worker threads alive at once, including
/// workers that overran their deadline and are still finishing.
pub const MAX_WORKERS: usize = 16;

/// Counting limit on live worker threads.
pub struct WorkerSlots {
    capacity: usize,
    in_use: AtomicUsize,
}

/// A claimed slot, released on drop.
pub struct WorkerSlot<'a> {
    slots: &'a WorkerSlots,
}

impl WorkerSlots {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Claim a slot, or `None` when all are taken.
    pub fn try_acquire(&self) -> Option<WorkerSlot<'_>> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| WorkerSlot { slots: self })
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        self.slots.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

static WORKERS: WorkerSlots = WorkerSlots::new(MAX_WORKERS);

/// Run the pipeline on its own thread, giving up after `timeout`.
///
/// An overrunning worker is detached and may outlive this call; it holds one
/// of [`MAX_WORKERS`] slots until it finishes and its result is discarded.
/// When every slot is taken the analysis runs on the calling thread without
/// a deadline.
pub fn analyze_bounded(data: Vec<u8>, format: ChartFormat, timeout: Duration) -> Result<Analysis> {
    let slot = match WORKERS.try_acquire() {
        Some(slot) => slot,
        None => {
            warn!(
                "{} analysis workers still running; analyzing without a time limit",
                WORKERS.in_use()
            );
            return analyze_with(&data, format);
        }
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _slot = slot;
        // The receiver is gone once the deadline has passed.
        let _ = tx.send(analyze_with(&data, format));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(AnalysisError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(AnalysisError::WorkerLost),
    }
}

/// Processes stored inputs into stored artifacts.
pub struct Processor<S: ObjectStore> {
    store: S,
    config: AppConfig,
}

impl<S: ObjectStore> Processor<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Store uploaded bytes in the upload container under a sanitized name.
    ///
    /// Returns the stored path.
    pub fn upload(&self, name: Option<&str>, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(AnalysisError::EmptyUpload);
        }

        let mut file_name = name.map(storage::sanitize_filename).unwrap_or_default();
        if file_name.is_empty() {
            file_name = DEFAULT_UPLOAD_NAME.to_string();
        }

        let path = format!("{}/{}", self.config.storage.upload_container, file_name);
        self.store.write(&path, data, UPLOAD_CONTENT_TYPE)?;
        info!("File '{}' uploaded successfully ({} bytes)", path, data.len());
        Ok(path)
    }

    fn analyze(&self, data: Vec<u8>) -> Result<Analysis> {
        let format = self.config.chart.format;
        match self.config.processing.timeout() {
            Some(timeout) => analyze_bounded(data, format, timeout),
            None => analyze_with(&data, format),
        }
    }

    fn process_inner(&self, path: &str) -> Result<ProcessOutcome> {
        let data = self.store.read(path)?;
        info!("Processing file: {}, Size: {} bytes", path, data.len());
        let source = SourceMetadata::from_bytes(path, &data);

        let analysis = self.analyze(data)?;
        let summary = serialize(&analysis.insights)?;

        let prefix = &self.config.storage.results_prefix;
        let summary_path = storage::summary_path(path, prefix);
        let chart_path = storage::chart_path(path, prefix, analysis.chart_format.extension());

        self.store.write(&summary_path, &summary, SUMMARY_CONTENT_TYPE)?;
        let chart_written =
            self.store
                .write(&chart_path, &analysis.chart, analysis.chart_format.content_type());
        if let Err(e) = chart_written {
            // Both artifacts or neither.
            if let Err(cleanup) = self.store.delete(&summary_path) {
                error!("Could not remove {} after failed chart write: {}", summary_path, cleanup);
            }
            return Err(e);
        }

        info!("Analysis results saved: {} and {}", summary_path, chart_path);

        Ok(ProcessOutcome {
            source,
            summary_path,
            chart_path,
            granularity: analysis.granularity(),
            records: analysis.records,
        })
    }

    /// Analyze one stored input and write both artifacts next to it.
    ///
    /// Nothing is written unless the analysis succeeded. If the chart cannot
    /// be stored, the summary written just before it is removed again.
    pub fn process(&self, path: &str) -> Result<ProcessOutcome> {
        self.process_inner(path).map_err(|e| {
            if e.is_rejection() {
                warn!("Rejected file {}: {}", path, e);
            } else {
                error!("Error processing file {}: {}", path, e);
            }
            e
        })
    }

    /// Whether a stored path is an artifact this processor wrote.
    fn is_artifact(&self, path: &str) -> bool {
        let prefix = self.config.storage.results_prefix.as_str();
        let mut segments: Vec<&str> = path.split('/').collect();
        segments.pop();
        segments.contains(&prefix)
    }

    /// Inputs waiting in the upload container, artifacts excluded.
    pub fn pending_inputs(&self) -> Result<Vec<String>> {
        let inputs: Vec<String> = self
            .store
            .list(&self.config.storage.upload_container)?
            .into_iter()
            .filter(|p| !self.is_artifact(p))
            .collect();
        debug!("Found {} inputs", inputs.len());
        Ok(inputs)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.processing.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }

    /// Process every input in the upload container.
    pub fn process_all(&self) -> Result<BatchReport> {
        let inputs = self.pending_inputs()?;
        let progress = self.progress_bar(inputs.len());

        let run = |path: String| {
            let result = self.process(&path);
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            (path, result)
        };

        let results: Vec<(String, Result<ProcessOutcome>)> = if self.config.processing.parallel {
            inputs.into_par_iter().map(run).collect()
        } else {
            inputs.into_iter().map(run).collect()
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut report = BatchReport::default();
        for (path, result) in results {
            match result {
                Ok(outcome) => report.processed.push(outcome),
                Err(e) => report.failed.push((path, e)),
            }
        }

        info!(
            "Processed {} files: {} succeeded, {} failed",
            report.total(),
            report.processed.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const VALID_CSV: &[u8] = b"Date,Open,High,Low,Close,Volume\n\
                               01/01/2023,99,105,95,100,1000\n\
                               01/02/2023,109,115,108,110,1500\n";

    fn processor() -> Processor<MemoryStore> {
        Processor::new(MemoryStore::new(), AppConfig::default())
    }

    #[test]
    fn test_upload_sanitizes_name() {
        let p = processor();
        let path = p.upload(Some("../My Prices.csv"), VALID_CSV).unwrap();
        assert_eq!(path, "filestore/My_Prices.csv");

        let path = p.upload(None, VALID_CSV).unwrap();
        assert_eq!(path, "filestore/uploaded_file");
    }

    #[test]
    fn test_upload_rejects_empty_body() {
        assert!(matches!(
            processor().upload(Some("a.csv"), b""),
            Err(AnalysisError::EmptyUpload)
        ));
    }

    #[test]
    fn test_process_writes_artifacts() {
        let p = processor();
        let path = p.upload(Some("aapl.csv"), VALID_CSV).unwrap();
        let outcome = p.process(&path).unwrap();

        assert_eq!(outcome.summary_path, "filestore/results/analysis_aapl.csv");
        assert_eq!(outcome.chart_path, "filestore/results/aapl.png");
        assert_eq!(outcome.records, 2);

        let summary = p.store().get(&outcome.summary_path).unwrap();
        assert_eq!(summary.content_type, "text/csv");
        assert!(String::from_utf8(summary.data).unwrap().contains("10.00%"));
        assert_eq!(p.store().get(&outcome.chart_path).unwrap().content_type, "image/png");
    }

    #[test]
    fn test_rejected_file_writes_nothing() {
        let p = processor();
        let path = p
            .upload(Some("zero.csv"), b"Date,Open,High,Low,Close,Volume\n01/01/2023,0,1,0,0,5\n01/02/2023,1,2,1,2,5\n")
            .unwrap();
        let err = p.process(&path).unwrap_err();

        assert!(matches!(err, AnalysisError::DivisionByZero));
        assert_eq!(p.store().len(), 1);
    }

    /// Store that refuses to write charts.
    struct ChartlessStore {
        inner: MemoryStore,
    }

    impl ObjectStore for ChartlessStore {
        fn read(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
            if path.ends_with(".png") {
                return Err(AnalysisError::Storage("chart write failed".into()));
            }
            self.inner.write(path, data, content_type)
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix)
        }

        fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path)
        }
    }

    #[test]
    fn test_failed_chart_write_removes_summary() {
        let store = ChartlessStore {
            inner: MemoryStore::new(),
        };
        let p = Processor::new(store, AppConfig::default());
        let path = p.upload(Some("aapl.csv"), VALID_CSV).unwrap();

        let err = p.process(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::Storage(_)));
        assert!(p.store().inner.get("filestore/results/analysis_aapl.csv").is_none());
        assert_eq!(p.store().inner.len(), 1);
    }

    #[test]
    fn test_process_all_skips_artifacts() {
        let p = processor();
        p.upload(Some("a.csv"), VALID_CSV).unwrap();
        p.upload(Some("b.csv"), b"Date,Open\n01/01/2023,1\n").unwrap();
        p.process("filestore/a.csv").unwrap();

        let pending = p.pending_inputs().unwrap();
        assert_eq!(pending, vec!["filestore/a.csv", "filestore/b.csv"]);

        let report = p.process_all().unwrap();
        assert_eq!(report.total(), 2);
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "filestore/b.csv");
        assert!(report.failed[0].1.is_rejection());
        assert!(!report.is_success());
    }

    #[test]
    fn test_analyze_bounded_completes() {
        let analysis =
            analyze_bounded(VALID_CSV.to_vec(), ChartFormat::Svg, Duration::from_secs(30)).unwrap();
        assert_eq!(analysis.records, 2);
    }

    #[test]
    fn test_worker_slots_are_bounded() {
        let slots = WorkerSlots::new(2);
        let a = slots.try_acquire().unwrap();
        let _b = slots.try_acquire().unwrap();
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.in_use(), 2);

        drop(a);
        assert_eq!(slots.in_use(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn test_svg_config_changes_chart_path() {
        let mut config = AppConfig::default();
        config.chart.format = ChartFormat::Svg;
        let p = Processor::new(MemoryStore::new(), config);
        let path = p.upload(Some("x.csv"), VALID_CSV).unwrap();

        let outcome = p.process(&path).unwrap();
        assert_eq!(outcome.chart_path, "filestore/results/x.svg");
        assert_eq!(
            p.store().get(&outcome.chart_path).unwrap().content_type,
            "image/svg+xml"
        );
    }
}
