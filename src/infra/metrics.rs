// ============================================================
// Layer 6: Metrics Logger
// ============================================================
// Two sinks:
//
//   log.txt      one human-readable line per validation epoch and
//                per test batch, echoed to stdout
//   results.csv  one row per (run, task) written after testing,
//                placed next to log.txt
//
// Example log lines:
//   [Run 0, Task 1, Epoch 3] [Validate] Accuracy : 0.9840
//   [Run 0, Task 1, Epoch 3] [Test] Accuracy : 0.9800
//
// Example CSV:
//   run,task,stop_reason,epochs_trained,best_epoch,best_valid_accuracy,test_accuracy,checkpoints
//   0,1,perfect-accuracy,4,3,1.000000,0.998000,1
//
// Both files are opened in append mode so repeated experiments
// accumulate instead of overwriting each other.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::trainer::TaskOutcome;

const RESULTS_HEADER: &str =
    "run,task,stop_reason,epochs_trained,best_epoch,best_valid_accuracy,test_accuracy,checkpoints";

/// Which evaluation produced an accuracy line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Validate => write!(f, "Validate"),
            Phase::Test     => write!(f, "Test"),
        }
    }
}

/// `[Run {r}, Task {t}, Epoch {e}] [{phase}] Accuracy : {acc:.4}`
pub fn accuracy_line(run: usize, task: usize, epoch: usize, phase: Phase, accuracy: f64) -> String {
    format!("[Run {run}, Task {task}, Epoch {epoch}] [{phase}] Accuracy : {accuracy:.4}")
}

/// Appends accuracy lines to the run log and outcome rows to results.csv.
pub struct MetricsLogger {
    log_path:     PathBuf,
    results_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger for `log_path`.
    /// Writes the CSV header if results.csv doesn't exist yet.
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();

        let parent = log_path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;
        }

        let results_path = parent
            .map(|dir| dir.join("results.csv"))
            .unwrap_or_else(|| PathBuf::from("results.csv"));

        if !results_path.exists() {
            let mut f = fs::File::create(&results_path)
                .with_context(|| format!("Cannot create '{}'", results_path.display()))?;
            writeln!(f, "{RESULTS_HEADER}")?;
            tracing::debug!("Created results CSV: '{}'", results_path.display());
        }

        Ok(Self { log_path, results_path })
    }

    /// Log one accuracy value to stdout and the run log.
    pub fn accuracy(
        &self,
        run:      usize,
        task:     usize,
        epoch:    usize,
        phase:    Phase,
        accuracy: f64,
    ) -> Result<()> {
        let line = accuracy_line(run, task, epoch, phase, accuracy);
        println!("{line}");
        append(&self.log_path, &line)
    }

    pub fn validation(&self, run: usize, task: usize, epoch: usize, accuracy: f64) -> Result<()> {
        self.accuracy(run, task, epoch, Phase::Validate, accuracy)
    }

    pub fn test(&self, run: usize, task: usize, epoch: usize, accuracy: f64) -> Result<()> {
        self.accuracy(run, task, epoch, Phase::Test, accuracy)
    }

    /// Append one row summarising a finished (run, task).
    pub fn record_outcome(&self, o: &TaskOutcome) -> Result<()> {
        let best_epoch = o.best_epoch.map(|e| e.to_string()).unwrap_or_default();
        let row = format!(
            "{},{},{},{},{},{:.6},{:.6},{}",
            o.run,
            o.task,
            o.stop_reason,
            o.epochs_trained,
            best_epoch,
            o.best_valid_accuracy,
            o.test_accuracy,
            o.checkpoints_written,
        );
        append(&self.results_path, &row)?;

        tracing::debug!(
            "Recorded outcome for run {} task {}: test_acc={:.4}",
            o.run,
            o.task,
            o.test_accuracy,
        );
        Ok(())
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }
}

fn append(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open '{}' for appending", path.display()))?;
    writeln!(f, "{line}")?;
    Ok(())
}
