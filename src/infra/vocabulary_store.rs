// ============================================================
// Layer 6: Vocabulary Store
// ============================================================
// Persists each task's vocabulary as a tokenizer JSON next to
// the checkpoints:
//
//   models/task{N}_vocab.json
//
// `evaluate` needs the exact id layout the model was trained
// with. Loading the saved file is preferred over rebuilding,
// which would only match if the data files are unchanged.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokenizers::Tokenizer;

use crate::data::{loader::BabiTask, vocabulary::Vocabulary};

pub struct VocabularyStore {
    dir: PathBuf,
}

impl VocabularyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, task_id: usize) -> PathBuf {
        self.dir.join(format!("task{task_id}_vocab.json"))
    }

    /// Build the vocabulary for a freshly loaded task and write it to disk.
    pub fn build_and_save(&self, task: &BabiTask) -> Result<Vocabulary> {
        let vocab = Vocabulary::build(task.words())?;
        self.save(task.task_id, &vocab)?;
        tracing::info!("Task {}: vocabulary of {} ids", task.task_id, vocab.len());
        Ok(vocab)
    }

    pub fn save(&self, task_id: usize, vocab: &Vocabulary) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let path = self.path_for(task_id);
        vocab
            .tokenizer()
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot save vocabulary to '{}': {e}", path.display()))?;

        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }

    /// Load a previously saved vocabulary
    pub fn load(&self, task_id: usize) -> Result<Vocabulary> {
        let path = self.path_for(task_id);
        let tokenizer = Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Cannot load vocabulary from '{}': {e}", path.display())
        })?;
        Ok(Vocabulary::from_tokenizer(tokenizer))
    }

    /// Saved vocabulary if present, otherwise rebuild from the task files.
    pub fn load_or_build(&self, task: &BabiTask) -> Result<Vocabulary> {
        if self.path_for(task.task_id).exists() {
            tracing::info!("Loading saved vocabulary for task {}", task.task_id);
            self.load(task.task_id)
        } else {
            tracing::warn!(
                "No saved vocabulary for task {}, rebuilding from data files",
                task.task_id
            );
            self.build_and_save(task)
        }
    }
}
