// ============================================================
// Layer 5: Experiment Loop
// ============================================================
// Trains, validates, early-stops and tests ONE (run, task) pair.
//
//   epoch 0, 1, 2, ...
//     ├─ train     every train batch: Learner::train_batch
//     ├─ validate  weighted accuracy over the valid split
//     │            strict improvement → snapshot parameters
//     │            otherwise          → early-stop counter + 1
//     └─ exit when
//          valid accuracy == 1.0                  (after logging)
//          counter > patience                     (next epoch)
//          epoch == max_epochs                    (ceiling)
//   test
//     restore the best snapshot, walk the test split, log the
//     running accuracy per batch, checkpoint per CheckpointPolicy
//
// The loop is generic over Learner so it can be driven by the
// real DMN or by the scripted stand-in in the tests below.

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::application::experiment_use_case::ExperimentConfig;
use crate::data::dataset::TaskData;
use crate::domain::{
    sample::Split,
    traits::{Evaluate, Learner},
};
use crate::infra::checkpoint::{CheckpointManager, CheckpointPolicy, CheckpointTag};
use crate::infra::metrics::MetricsLogger;

/// Training progress is printed every this many batches.
const PROGRESS_EVERY: usize = 20;

// ─── Settings ─────────────────────────────────────────────────────────────────
/// The slice of ExperimentConfig the loop itself needs.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub max_epochs: usize,
    pub patience:   usize,
    pub batch_size: usize,
}

impl From<&ExperimentConfig> for LoopSettings {
    fn from(cfg: &ExperimentConfig) -> Self {
        Self {
            max_epochs: cfg.max_epochs,
            patience:   cfg.patience,
            batch_size: cfg.batch_size,
        }
    }
}

// ─── Early stopping ───────────────────────────────────────────────────────────
/// Counts epochs without improvement.
///
/// The stop flag is raised once the counter EXCEEDS patience, so
/// with patience 20 the 21st non-improving epoch still runs in full
/// and the loop exits at the start of the following one.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    counter:  usize,
    stop:     bool,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, counter: 0, stop: false }
    }

    pub fn record(&mut self, improved: bool) {
        if improved {
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter > self.patience {
                self.stop = true;
            }
        }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn should_stop(&self) -> bool {
        self.stop
    }
}

// ─── Accuracy meter ───────────────────────────────────────────────────────────
/// Sample-weighted mean of per-batch accuracies.
///
/// A short last batch counts for exactly as many samples as it holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyMeter {
    correct: f64,
    count:   usize,
}

impl AccuracyMeter {
    pub fn add(&mut self, batch_accuracy: f64, batch_size: usize) {
        self.correct += batch_accuracy * batch_size as f64;
        self.count   += batch_size;
    }

    pub fn value(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.correct / self.count as f64 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

// ─── Per-(run, task) state ────────────────────────────────────────────────────
/// Best validation result seen so far and the parameters that produced it.
pub struct TrainingContext<S> {
    pub best_accuracy:  f64,
    pub best_epoch:     Option<usize>,
    pub early_stopping: EarlyStopping,
    best_state:         Option<S>,
}

impl<S> TrainingContext<S> {
    pub fn new(patience: usize) -> Self {
        Self {
            best_accuracy:  0.0,
            best_epoch:     None,
            early_stopping: EarlyStopping::new(patience),
            best_state:     None,
        }
    }

    /// Feed one validation accuracy. Only a strictly higher value is
    /// an improvement; `snapshot` runs only in that case.
    pub fn observe(&mut self, epoch: usize, accuracy: f64, snapshot: impl FnOnce() -> S) -> bool {
        let improved = accuracy > self.best_accuracy;
        if improved {
            self.best_accuracy = accuracy;
            self.best_epoch    = Some(epoch);
            self.best_state    = Some(snapshot());
        }
        self.early_stopping.record(improved);
        improved
    }

    pub fn best_state(&self) -> Option<&S> {
        self.best_state.as_ref()
    }
}

// ─── Outcome ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    EarlyStopped,
    CeilingReached,
    PerfectAccuracy,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::EarlyStopped    => "early-stopped",
            StopReason::CeilingReached  => "ceiling-reached",
            StopReason::PerfectAccuracy => "perfect-accuracy",
        };
        f.write_str(s)
    }
}

/// Summary of one finished (run, task), one row of results.csv.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub run:                 usize,
    pub task:                usize,
    pub stop_reason:         StopReason,
    pub epochs_trained:      usize,
    pub best_epoch:          Option<usize>,
    pub best_valid_accuracy: f64,
    pub test_accuracy:       f64,
    pub checkpoints_written: usize,
}

// ─── Loop pieces ──────────────────────────────────────────────────────────────
/// Weighted accuracy of `model` over one split. Leaves the dataset
/// in that split's mode.
pub fn evaluate_split<E: Evaluate + ?Sized>(
    model:      &E,
    data:       &mut TaskData,
    split:      Split,
    batch_size: usize,
) -> Result<f64> {
    data.set_mode(split);
    let mut meter = AccuracyMeter::default();
    for batch in data.loader(batch_size).iter() {
        let score = model.eval_batch(&batch)?;
        meter.add(score.accuracy, batch.len());
    }
    Ok(meter.value())
}

/// One pass over the shuffled train split. Returns the weighted
/// training accuracy.
pub fn train_epoch<L: Learner>(
    learner:    &mut L,
    data:       &mut TaskData,
    batch_size: usize,
    task:       usize,
    epoch:      usize,
) -> Result<f64> {
    data.set_mode(Split::Train);
    let mut meter = AccuracyMeter::default();

    for (batch_id, batch) in data.loader(batch_size).iter().enumerate() {
        let score = learner.train_batch(&batch)?;
        meter.add(score.accuracy, batch.len());

        if batch_id % PROGRESS_EVERY == 0 {
            println!("{}", progress_line(task, epoch, batch_id, score.loss, meter.value()));
        }
    }
    Ok(meter.value())
}

/// Loss is the current batch's; accuracy is the running epoch mean.
pub fn progress_line(task: usize, epoch: usize, batch_id: usize, loss: f64, accuracy: f64) -> String {
    format!("[Task {task}, Epoch {epoch}] [Training] loss : {loss:.8}, acc : {accuracy:.4}, batch_id : {batch_id}")
}

/// Train with early stopping, then test the best parameters.
pub fn run_task<L: Learner>(
    settings:    &LoopSettings,
    run:         usize,
    learner:     &mut L,
    data:        &mut TaskData,
    logger:      &MetricsLogger,
    checkpoints: &CheckpointManager,
) -> Result<TaskOutcome> {
    let task    = data.task_id();
    let mut ctx = TrainingContext::<L::Snapshot>::new(settings.patience);

    let mut last_epoch = None;
    let mut epoch      = 0usize;

    let stop_reason = loop {
        if epoch >= settings.max_epochs {
            break StopReason::CeilingReached;
        }
        if ctx.early_stopping.should_stop() {
            println!(
                "[Run {run}, Task {task}] Early Stopping at Epoch {epoch}, Valid Accuracy : {:.4}",
                ctx.best_accuracy
            );
            break StopReason::EarlyStopped;
        }

        let train_acc = train_epoch(learner, data, settings.batch_size, task, epoch)?;
        let valid_acc = evaluate_split(learner, data, Split::Valid, settings.batch_size)?;

        let improved = ctx.observe(epoch, valid_acc, || learner.snapshot());
        logger.validation(run, task, epoch, valid_acc)?;
        tracing::debug!(
            "Run {run} task {task} epoch {epoch}: train_acc={train_acc:.4} improved={improved} counter={}",
            ctx.early_stopping.counter()
        );

        last_epoch = Some(epoch);
        if valid_acc == 1.0 {
            break StopReason::PerfectAccuracy;
        }
        epoch += 1;
    };

    // ── Test phase ────────────────────────────────────────────────────────────
    match ctx.best_state() {
        Some(best) => learner.restore(best),
        None => tracing::warn!(
            "Run {run} task {task}: no epoch improved on 0.0 valid accuracy, testing current parameters"
        ),
    }

    let tag_epoch = last_epoch.unwrap_or(0);
    let tag = |accuracy| CheckpointTag { task, epoch: tag_epoch, run, accuracy };

    data.set_mode(Split::Test);
    let mut meter   = AccuracyMeter::default();
    let mut written = 0usize;

    for batch in data.loader(settings.batch_size).iter() {
        let score = learner.eval_batch(&batch)?;
        meter.add(score.accuracy, batch.len());
        logger.test(run, task, tag_epoch, meter.value())?;

        if checkpoints.policy() == CheckpointPolicy::EveryTestBatch {
            learner.save(&checkpoints.checkpoint_path(&tag(meter.value())))?;
            written += 1;
        }
    }

    if checkpoints.policy() == CheckpointPolicy::Final {
        learner.save(&checkpoints.checkpoint_path(&tag(meter.value())))?;
        written += 1;
    }

    tracing::info!(
        "Run {run} task {task}: {stop_reason} after {} epochs, best valid {:.4}, test {:.4} on {} samples",
        last_epoch.map_or(0, |e| e + 1),
        ctx.best_accuracy,
        meter.value(),
        meter.count(),
    );

    Ok(TaskOutcome {
        run,
        task,
        stop_reason,
        epochs_trained:      last_epoch.map_or(0, |e| e + 1),
        best_epoch:          ctx.best_epoch,
        best_valid_accuracy: ctx.best_accuracy,
        test_accuracy:       meter.value(),
        checkpoints_written: written,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::BabiDataset;
    use crate::domain::{sample::EncodedSample, traits::BatchScore};
    use std::{fs, path::Path};
    use tempfile::TempDir;

    // ── Scripted stand-in for the DMN ─────────────────────────────────────────
    // Accuracy after epoch k is script[k] on every split; before any
    // training it is 0.0. The parameter "state" is the step counter.
    struct ScriptedLearner {
        script:          Vec<f64>,
        steps:           usize,
        steps_per_epoch: usize,
    }

    impl ScriptedLearner {
        fn new(script: Vec<f64>, steps_per_epoch: usize) -> Self {
            Self { script, steps: 0, steps_per_epoch }
        }

        fn trained_epochs(&self) -> usize {
            self.steps / self.steps_per_epoch
        }
    }

    impl Evaluate for ScriptedLearner {
        fn eval_batch(&self, _batch: &[EncodedSample]) -> Result<BatchScore> {
            let accuracy = match self.trained_epochs() {
                0 => 0.0,
                n => *self.script.get(n - 1).or(self.script.last()).unwrap_or(&0.0),
            };
            Ok(BatchScore { loss: 1.0 - accuracy, accuracy })
        }
    }

    impl Learner for ScriptedLearner {
        type Snapshot = usize;

        fn train_batch(&mut self, batch: &[EncodedSample]) -> Result<BatchScore> {
            let score = self.eval_batch(batch)?;
            self.steps += 1;
            Ok(score)
        }

        fn snapshot(&self) -> usize {
            self.steps
        }

        fn restore(&mut self, snapshot: &usize) {
            self.steps = *snapshot;
        }

        fn save(&self, path: &Path) -> Result<()> {
            let mut file = path.as_os_str().to_owned();
            file.push(".ckpt");
            fs::write(file, self.steps.to_string())?;
            Ok(())
        }
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────
    const BATCH: usize = 10;

    fn dataset(n: u32) -> BabiDataset {
        BabiDataset::new(
            (0..n)
                .map(|i| EncodedSample { context: vec![vec![i]], question: vec![i], answer: i })
                .collect(),
        )
    }

    // 30 train (3 batches), 10 valid (1 batch), 20 test (2 batches)
    fn task_data() -> TaskData {
        TaskData::new(1, 64, dataset(30), dataset(10), dataset(20))
    }

    struct Harness {
        dir:         TempDir,
        logger:      MetricsLogger,
        checkpoints: CheckpointManager,
    }

    fn harness(policy: CheckpointPolicy) -> Harness {
        let dir         = tempfile::tempdir().unwrap();
        let logger      = MetricsLogger::new(dir.path().join("log.txt")).unwrap();
        let checkpoints = CheckpointManager::new(dir.path().join("models"), policy).unwrap();
        Harness { dir, logger, checkpoints }
    }

    fn settings(max_epochs: usize) -> LoopSettings {
        LoopSettings { max_epochs, patience: 20, batch_size: BATCH }
    }

    fn run(h: &Harness, learner: &mut ScriptedLearner, max_epochs: usize) -> TaskOutcome {
        let mut data = task_data();
        run_task(&settings(max_epochs), 0, learner, &mut data, &h.logger, &h.checkpoints).unwrap()
    }

    fn log_lines(h: &Harness, phase: &str) -> Vec<String> {
        fs::read_to_string(h.dir.path().join("log.txt"))
            .unwrap()
            .lines()
            .filter(|l| l.contains(phase))
            .map(str::to_string)
            .collect()
    }

    fn checkpoint_count(h: &Harness) -> usize {
        fs::read_dir(h.checkpoints.dir()).unwrap().count()
    }

    // ── Building blocks ───────────────────────────────────────────────────────
    #[test]
    fn test_early_stopping_flags_after_patience_exceeded() {
        let mut es = EarlyStopping::new(20);
        for _ in 0..20 {
            es.record(false);
        }
        assert!(!es.should_stop());
        es.record(false);
        assert!(es.should_stop());
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut es = EarlyStopping::new(2);
        es.record(false);
        es.record(false);
        es.record(true);
        assert_eq!(es.counter(), 0);
        es.record(false);
        es.record(false);
        assert!(!es.should_stop());
    }

    #[test]
    fn test_accuracy_meter_weights_by_batch_size() {
        let mut m = AccuracyMeter::default();
        m.add(0.9, 100);
        m.add(0.3, 50);
        // unweighted mean would be 0.6
        assert!((m.value() - 0.7).abs() < 1e-12);
        assert_eq!(m.count(), 150);
        assert_eq!(AccuracyMeter::default().value(), 0.0);
    }

    #[test]
    fn test_equal_accuracy_is_not_improvement() {
        let mut ctx = TrainingContext::<u8>::new(20);
        assert!(ctx.observe(0, 0.5, || 1));
        assert!(!ctx.observe(1, 0.5, || 2));
        assert_eq!(ctx.best_state(), Some(&1));
        assert_eq!(ctx.best_epoch, Some(0));
        assert_eq!(ctx.early_stopping.counter(), 1);
    }

    #[test]
    fn test_zero_accuracy_never_snapshots() {
        let mut ctx = TrainingContext::<u8>::new(20);
        assert!(!ctx.observe(0, 0.0, || 1));
        assert!(ctx.best_state().is_none());
    }

    #[test]
    fn test_progress_line_reports_batch_loss() {
        assert_eq!(
            progress_line(3, 7, 40, 0.125, 0.5),
            "[Task 3, Epoch 7] [Training] loss : 0.12500000, acc : 0.5000, batch_id : 40"
        );
    }

    #[test]
    fn test_train_epoch_visits_every_train_sample_once() {
        let mut learner = ScriptedLearner::new(vec![0.5], 3);
        let mut data    = task_data();
        train_epoch(&mut learner, &mut data, BATCH, 1, 0).unwrap();
        // 30 train samples in batches of 10
        assert_eq!(learner.steps, 3);
    }

    // ── Whole-loop scenarios ──────────────────────────────────────────────────
    #[test]
    fn test_perfect_accuracy_stops_after_logging() {
        let h = harness(CheckpointPolicy::Final);
        let mut learner = ScriptedLearner::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 1.0], 3);

        let out = run(&h, &mut learner, 256);

        assert_eq!(out.stop_reason, StopReason::PerfectAccuracy);
        assert_eq!(out.epochs_trained, 6);
        assert_eq!(out.best_epoch, Some(5));
        assert_eq!(out.test_accuracy, 1.0);

        let valid = log_lines(&h, "[Validate]");
        assert_eq!(valid.len(), 6);
        assert_eq!(valid[5], "[Run 0, Task 1, Epoch 5] [Validate] Accuracy : 1.0000");

        // parameters from epoch 5 (6 epochs × 3 batches)
        assert_eq!(learner.steps, 18);
    }

    #[test]
    fn test_plateau_early_stops_and_restores_first_epoch() {
        let h = harness(CheckpointPolicy::Final);
        let mut learner = ScriptedLearner::new(vec![0.5], 3);

        let out = run(&h, &mut learner, 256);

        assert_eq!(out.stop_reason, StopReason::EarlyStopped);
        // epoch 0 improves, epochs 1..=21 do not, loop exits before epoch 22
        assert_eq!(out.epochs_trained, 22);
        assert_eq!(log_lines(&h, "[Validate]").len(), 22);
        assert_eq!(out.best_epoch, Some(0));
        assert_eq!(learner.steps, 3);
        assert_eq!(out.test_accuracy, 0.5);
    }

    #[test]
    fn test_ceiling_stops_improving_run() {
        let h = harness(CheckpointPolicy::Final);
        let mut learner = ScriptedLearner::new(vec![0.125, 0.25, 0.5, 0.75, 0.875], 3);

        let out = run(&h, &mut learner, 4);

        assert_eq!(out.stop_reason, StopReason::CeilingReached);
        assert_eq!(out.epochs_trained, 4);
        assert_eq!(out.best_epoch, Some(3));
        assert_eq!(out.test_accuracy, 0.75);
    }

    #[test]
    fn test_test_phase_uses_best_not_last_parameters() {
        let h = harness(CheckpointPolicy::None);
        let mut learner = ScriptedLearner::new(vec![0.25, 0.5, 0.25, 0.25], 3);

        let out = run(&h, &mut learner, 4);

        assert_eq!(out.best_epoch, Some(1));
        assert_eq!(out.test_accuracy, 0.5);

        let mut data = task_data();
        let again    = evaluate_split(&learner, &mut data, Split::Valid, BATCH).unwrap();
        assert_eq!(again, out.best_valid_accuracy);
    }

    #[test]
    fn test_test_lines_use_last_trained_epoch() {
        let h = harness(CheckpointPolicy::None);
        let mut learner = ScriptedLearner::new(vec![0.25, 0.5, 0.25, 0.25], 3);
        run(&h, &mut learner, 4);

        let test = log_lines(&h, "[Test]");
        assert_eq!(test, vec![
            "[Run 0, Task 1, Epoch 3] [Test] Accuracy : 0.5000",
            "[Run 0, Task 1, Epoch 3] [Test] Accuracy : 0.5000",
        ]);
    }

    #[test]
    fn test_zero_epochs_tests_fresh_parameters() {
        let h = harness(CheckpointPolicy::Final);
        let mut learner = ScriptedLearner::new(vec![0.5], 3);

        let out = run(&h, &mut learner, 0);

        assert_eq!(out.stop_reason, StopReason::CeilingReached);
        assert_eq!(out.epochs_trained, 0);
        assert_eq!(out.best_epoch, None);
        assert_eq!(out.test_accuracy, 0.0);
        assert!(log_lines(&h, "[Validate]").is_empty());
        assert_eq!(log_lines(&h, "[Test]").len(), 2);
    }

    #[test]
    fn test_checkpoint_policies() {
        let cases = [
            (CheckpointPolicy::EveryTestBatch, 2),
            (CheckpointPolicy::Final,          1),
            (CheckpointPolicy::None,           0),
        ];
        for (policy, expected) in cases {
            let h = harness(policy);
            let mut learner = ScriptedLearner::new(vec![0.25, 0.5], 3);
            let out = run(&h, &mut learner, 2);

            assert_eq!(out.checkpoints_written, expected, "{policy:?}");
            // both test batches report 0.5, so per-batch names coincide
            assert_eq!(checkpoint_count(&h), expected.min(1), "{policy:?}");
        }
    }

    #[test]
    fn test_final_checkpoint_name() {
        let h = harness(CheckpointPolicy::Final);
        let mut learner = ScriptedLearner::new(vec![0.25, 0.5], 3);
        run(&h, &mut learner, 2);

        let expected = h.checkpoints.dir().join("task1_epoch1_run0_acc0.5000.ckpt");
        assert!(expected.exists(), "missing {}", expected.display());
    }
}
