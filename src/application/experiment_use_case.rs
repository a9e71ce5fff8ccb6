// ============================================================
// Layer 2: ExperimentUseCase
// ============================================================
// Runs the full bAbI experiment:
//
//   Step 1: Save config                   (Layer 6 - infra)
//   Step 2: Load every task's files       (Layer 4 - data)
//   Step 3: Build + save vocabularies     (Layer 6 - infra)
//   Step 4: for run in 0..runs
//             for task in first..=last
//               fresh data / model / Adam
//               train, early-stop, test   (Layer 5 - ml)
//               append results.csv row    (Layer 6 - infra)
//   Step 5: Mean test accuracy per task
//
// All tasks are parsed before the first epoch so a missing or
// malformed file fails the experiment immediately, not hours in.
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use burn::{
    optim::{decay::WeightDecayConfig, AdamConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::{
    dataset::TaskData,
    loader::{BabiLoader, BabiTask},
    vocabulary::Vocabulary,
};
use crate::domain::sample::Split;
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointPolicy},
    metrics::MetricsLogger,
    vocabulary_store::VocabularyStore,
};
use crate::ml::{
    learner::DmnLearner,
    model::{DmnConfig, DmnModel},
    trainer::{run_task, LoopSettings, TaskOutcome},
};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// L2 penalty applied through Adam's weight decay
const WEIGHT_DECAY: f32 = 1e-3;

// ─── Experiment Configuration ────────────────────────────────────────────────
// Serialisable so `evaluate` can rebuild the same architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub runs:              usize,
    pub first_task:        usize,
    pub last_task:         usize,
    pub max_epochs:        usize,
    pub patience:          usize,
    pub batch_size:        usize,
    pub hidden_size:       usize,
    pub num_passes:        usize,
    pub lr:                f64,
    pub dropout:           f64,
    pub valid_fraction:    f64,
    pub data_dir:          String,
    pub model_dir:         String,
    pub log_file:          String,
    pub checkpoint_policy: CheckpointPolicy,
    pub seed:              u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            runs:              10,
            first_task:        1,
            last_task:         20,
            max_epochs:        256,
            patience:          20,
            batch_size:        100,
            hidden_size:       100,
            num_passes:        3,
            lr:                0.001,
            dropout:           0.1,
            valid_fraction:    0.1,
            data_dir:          "data/en-10k".to_string(),
            model_dir:         "models".to_string(),
            log_file:          "log.txt".to_string(),
            checkpoint_policy: CheckpointPolicy::Final,
            seed:              42,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.first_task >= 1, "first_task must be at least 1");
        ensure!(
            self.first_task <= self.last_task,
            "first_task ({}) is after last_task ({})",
            self.first_task,
            self.last_task
        );
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.hidden_size > 0, "hidden_size must be positive");
        ensure!(
            (0.0..1.0).contains(&self.valid_fraction),
            "valid_fraction must be in [0, 1), got {}",
            self.valid_fraction
        );
        ensure!((0.0..1.0).contains(&self.dropout), "dropout must be in [0, 1)");
        Ok(())
    }

    /// Architecture for a task whose vocabulary has `vocab_size` ids.
    pub fn model_config(&self, vocab_size: usize) -> DmnConfig {
        DmnConfig::new(self.hidden_size, vocab_size)
            .with_num_passes(self.num_passes)
            .with_dropout(self.dropout)
    }

    /// Seed for one (run, task) pair.
    pub fn pair_seed(&self, run: usize, task: usize) -> u64 {
        self.seed
            .wrapping_mul(1_000_003)
            .wrapping_add((run * 100 + task) as u64)
    }
}

// ─── ExperimentUseCase ────────────────────────────────────────────────────────
pub struct ExperimentUseCase {
    config: ExperimentConfig,
}

impl ExperimentUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Execute every run over every task on the WGPU backend.
    /// Returns one outcome per pair.
    pub fn execute(&self) -> Result<Vec<TaskOutcome>> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(&device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Vec<TaskOutcome>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Sinks and config ──────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.model_dir, cfg.checkpoint_policy)?;
        checkpoints.save_config(cfg)?;
        tracing::info!(
            "Checkpoints ({:?}) go to '{}'",
            checkpoints.policy(),
            checkpoints.dir().display()
        );
        let logger = MetricsLogger::new(&cfg.log_file)?;

        // ── Step 2 + 3: Tasks and vocabularies ────────────────────────────────
        let loader      = BabiLoader::new(&cfg.data_dir);
        let vocab_store = VocabularyStore::new(&cfg.model_dir);

        let mut tasks: BTreeMap<usize, (BabiTask, Vocabulary)> = BTreeMap::new();
        for task_id in cfg.first_task..=cfg.last_task {
            let task  = loader.load_task(task_id)?;
            let vocab = vocab_store.build_and_save(&task)?;
            tasks.insert(task_id, (task, vocab));
        }

        // ── Step 4: Runs × tasks ──────────────────────────────────────────────
        let settings     = LoopSettings::from(cfg);
        let mut outcomes = Vec::with_capacity(cfg.runs * tasks.len());

        for run in 0..cfg.runs {
            for (&task_id, (task, vocab)) in &tasks {
                let seed = cfg.pair_seed(run, task_id);
                B::seed(seed);

                let mut data = TaskData::from_task(task, vocab, cfg.valid_fraction)?.with_seed(seed);
                tracing::info!(
                    "Run {run} task {task_id}: {} train / {} valid / {} test samples, vocab {}",
                    data.split(Split::Train).sample_count(),
                    data.split(Split::Valid).sample_count(),
                    data.split(Split::Test).sample_count(),
                    data.vocab_size(),
                );

                let model: DmnModel<B> = cfg.model_config(data.vocab_size()).init(device);

                // Adam with L2 via weight decay, fresh per pair
                let optim = AdamConfig::new()
                    .with_epsilon(1e-8)
                    .with_weight_decay(Some(WeightDecayConfig::new(WEIGHT_DECAY)))
                    .init::<B, DmnModel<B>>();

                let mut learner = DmnLearner::new(model, optim, cfg.lr, device);
                let outcome = run_task(&settings, run, &mut learner, &mut data, &logger, &checkpoints)?;

                logger.record_outcome(&outcome)?;
                outcomes.push(outcome);
            }
        }

        // ── Step 5: Summary ───────────────────────────────────────────────────
        for (task_id, mean) in mean_test_accuracy(&outcomes) {
            tracing::info!("Task {task_id}: mean test accuracy {mean:.4} over {} runs", cfg.runs);
        }

        Ok(outcomes)
    }
}

/// Mean test accuracy per task, in task order.
pub fn mean_test_accuracy(outcomes: &[TaskOutcome]) -> Vec<(usize, f64)> {
    let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for o in outcomes {
        let entry = sums.entry(o.task).or_insert((0.0, 0));
        entry.0 += o.test_accuracy;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(task, (sum, n))| (task, sum / n as f64))
        .collect()
}
