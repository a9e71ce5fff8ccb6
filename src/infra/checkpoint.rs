// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Saves and restores DMN weights with Burn's gzipped named
// MessagePack recorder and keeps the experiment configuration next to them.
//
// Directory layout (default `models/`):
//   models/
//     experiment_config.json                    ← hyperparameters used
//     task1_vocab.json                          ← see vocabulary_store.rs
//     task1_epoch17_run0_acc0.9990.mpk.gz       ← weights
//     ...
//
// Checkpoint names carry task, last trained epoch, run and the
// test accuracy at the moment of saving. How many are written
// per (run, task) is a CheckpointPolicy:
//
//   every-test-batch  one file per test batch, running accuracy
//   final             one file after the test pass (default)
//   none              nothing written
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::application::experiment_use_case::ExperimentConfig;
use crate::ml::model::DmnModel;

/// Recorder used for every weight file
type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Extension CheckpointRecorder gives the weight files
pub const CHECKPOINT_EXTENSION: &str = "mpk.gz";

const CONFIG_FILE: &str = "experiment_config.json";

/// How often weights are written during the test phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointPolicy {
    EveryTestBatch,
    #[default]
    Final,
    None,
}

/// Identifies one checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointTag {
    pub task:     usize,
    pub epoch:    usize,
    pub run:      usize,
    pub accuracy: f64,
}

impl CheckpointTag {
    /// File stem, e.g. `task3_epoch41_run0_acc0.9120`
    pub fn stem(&self) -> String {
        format!(
            "task{}_epoch{}_run{}_acc{:.4}",
            self.task, self.epoch, self.run, self.accuracy
        )
    }
}

/// Owns the checkpoint directory and the checkpoint policy.
pub struct CheckpointManager {
    dir:    PathBuf,
    policy: CheckpointPolicy,
}

impl CheckpointManager {
    /// Create the manager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, policy: CheckpointPolicy) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir, policy })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    /// Path of a checkpoint WITHOUT the recorder extension.
    pub fn checkpoint_path(&self, tag: &CheckpointTag) -> PathBuf {
        self.dir.join(tag.stem())
    }

    /// Save the experiment configuration to JSON.
    ///
    /// Written once before training so `evaluate` can rebuild
    /// the exact model architecture later.
    pub fn save_config(&self, cfg: &ExperimentConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved experiment config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<ExperimentConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }
}

/// Burn's file recorders call `set_extension` on the path they are
/// given, which would eat the `.9120` of an accuracy in the stem.
/// A throwaway extension is added first so only it gets replaced:
/// `acc0.9120` → `acc0.9120.mpk` → `acc0.9120.mpk.gz`.
fn recorder_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".mpk");
    PathBuf::from(raw)
}

/// Strip a trailing `.mpk.gz` so users can pass the file they see on disk.
pub fn strip_extension(path: &Path) -> PathBuf {
    let raw    = path.to_string_lossy();
    let suffix = format!(".{CHECKPOINT_EXTENSION}");
    match raw.strip_suffix(&suffix) {
        Some(stem) => PathBuf::from(stem),
        None       => path.to_path_buf(),
    }
}

/// Write model weights to `{path}.mpk.gz`.
pub fn save_model<B: Backend>(model: &DmnModel<B>, path: &Path) -> Result<()> {
    model
        .clone()
        .save_file(recorder_path(path), &CheckpointRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save checkpoint to '{}': {e}", path.display()))?;

    tracing::debug!("Saved checkpoint '{}.{}'", path.display(), CHECKPOINT_EXTENSION);
    Ok(())
}

/// Load weights from `{path}.mpk.gz` into an already-built model
/// of the same architecture.
pub fn load_model<B: Backend>(
    model:  DmnModel<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<DmnModel<B>> {
    let model = model
        .load_file(recorder_path(path), &CheckpointRecorder::new(), device)
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot load checkpoint '{}.{}': {e}",
                path.display(),
                CHECKPOINT_EXTENSION
            )
        })?;

    tracing::info!("Loaded checkpoint '{}.{}'", path.display(), CHECKPOINT_EXTENSION);
    Ok(model)
}
