//! Divergence Metrics and Instrumentation Sinks
//!
//! At the end of a run the controller compares the shared counter against the
//! expected event total. Eventually-consistent delivery can apply the same
//! event more than once, so the observed value may exceed the expectation;
//! the difference is the run's measured divergence.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Measured deviation of a finished run from its expected event total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceReport {
    /// Events the configuration said would be generated.
    pub expected: u64,
    /// Counter value actually observed at completion.
    pub observed: u64,
    /// `observed - expected`. Negative when events were lost.
    pub overcount: i64,
    /// Overcount as a percentage of expected. `None` when `expected` is
    /// zero, where the percentage is undefined.
    pub percent: Option<f64>,
}

impl DivergenceReport {
    /// Computes the divergence of `observed` against `expected`.
    pub fn compute(expected: u64, observed: u64) -> Self {
        let overcount = observed as i64 - expected as i64;
        let percent = if expected == 0 {
            None
        } else {
            Some(overcount as f64 * 100.0 / expected as f64)
        };
        Self {
            expected,
            observed,
            overcount,
            percent,
        }
    }
}

impl std::fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.percent {
            Some(percent) => write!(
                f,
                "expected {} observed {} overcount {} ({:.1}%)",
                self.expected, self.observed, self.overcount, percent
            ),
            None => write!(
                f,
                "expected {} observed {} overcount {} (percent undefined)",
                self.expected, self.observed, self.overcount
            ),
        }
    }
}

/// External sink for end-of-run measurements.
///
/// The controller drives this in a fixed order on the terminal transition:
/// `record_divergence`, then `stop`, then `push_logs`.
pub trait Instrumentation: Send + Sync {
    /// Records the final divergence measurement.
    fn record_divergence(&self, report: &DivergenceReport) -> io::Result<()>;

    /// Flushes and closes the sink. Recording after `stop` is undefined.
    fn stop(&self) -> io::Result<()>;

    /// Ships collected logs to wherever the deployment gathers them.
    fn push_logs(&self) -> io::Result<()>;
}

/// Sink that appends JSON lines to a local file.
pub struct FileInstrumentation {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct DivergenceLine<'a> {
    kind: &'static str,
    #[serde(flatten)]
    report: &'a DivergenceReport,
}

impl FileInstrumentation {
    /// Creates (or truncates) the log file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = Mutex::new(BufWriter::new(File::create(&path)?));
        Ok(Self { path, writer })
    }

    /// Where this sink writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Instrumentation for FileInstrumentation {
    fn record_divergence(&self, report: &DivergenceReport) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        serde_json::to_writer(
            &mut *writer,
            &DivergenceLine {
                kind: "divergence",
                report,
            },
        )?;
        writer.write_all(b"\n")
    }

    fn stop(&self) -> io::Result<()> {
        self.writer.lock().unwrap().flush()
    }

    fn push_logs(&self) -> io::Result<()> {
        // Local sink: the file itself is the destination. Make sure it is
        // on disk before the platform teardown kills the process.
        let mut writer = self.writer.lock().unwrap();
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}

/// Sink that discards everything. Wired when instrumentation is disabled.
pub struct NullInstrumentation;

impl Instrumentation for NullInstrumentation {
    fn record_divergence(&self, _report: &DivergenceReport) -> io::Result<()> {
        Ok(())
    }

    fn stop(&self) -> io::Result<()> {
        Ok(())
    }

    fn push_logs(&self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_overcount_scenario() {
        // 3 clients x 100 events, 30 duplicate applications observed.
        let report = DivergenceReport::compute(300, 330);
        assert_eq!(report.overcount, 30);
        assert_relative_eq!(report.percent.unwrap(), 10.0);
    }

    #[test]
    fn test_exact_convergence_has_zero_divergence() {
        let report = DivergenceReport::compute(300, 300);
        assert_eq!(report.overcount, 0);
        assert_relative_eq!(report.percent.unwrap(), 0.0);
    }

    #[test]
    fn test_undercount_is_negative() {
        let report = DivergenceReport::compute(100, 70);
        assert_eq!(report.overcount, -30);
        assert_relative_eq!(report.percent.unwrap(), -30.0);
    }

    #[test]
    fn test_zero_expected_has_undefined_percent() {
        let report = DivergenceReport::compute(0, 42);
        assert_eq!(report.overcount, 42);
        assert_eq!(report.percent, None);
        assert!(report.to_string().contains("undefined"));
    }

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instrumentation.jsonl");

        let sink = FileInstrumentation::create(&path).unwrap();
        sink.record_divergence(&DivergenceReport::compute(300, 330))
            .unwrap();
        sink.stop().unwrap();
        sink.push_logs().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["kind"], "divergence");
        assert_eq!(line["expected"], 300);
        assert_eq!(line["observed"], 330);
        assert_eq!(line["overcount"], 30);
    }
}
