use anyhow::Result;
use burn::data::{
    dataloader::{DataLoader, DataLoaderBuilder},
    dataset::Dataset,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::sync::Arc;

use crate::data::{
    batcher::SampleBatcher,
    loader::BabiTask,
    splitter::split_train_valid,
    vocabulary::Vocabulary,
};
use crate::domain::sample::{EncodedSample, Split};

/// One split of a task, as a Burn dataset.
#[derive(Debug, Clone, Default)]
pub struct BabiDataset {
    samples: Vec<EncodedSample>,
}

impl BabiDataset {
    pub fn new(samples: Vec<EncodedSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<EncodedSample> for BabiDataset {
    fn get(&self, index: usize) -> Option<EncodedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batches of raw samples; tensors are built by the model's own batcher.
pub type SampleLoader = Arc<dyn DataLoader<Vec<EncodedSample>>>;

/// All three splits of one task plus the active mode.
///
/// Mirrors the "set the mode, then iterate" dataset contract: the
/// experiment loop calls `set_mode` before each phase and `loader`
/// to get a fresh DataLoader over the active split.
pub struct TaskData {
    task_id:    usize,
    vocab_size: usize,
    train:      Arc<BabiDataset>,
    valid:      Arc<BabiDataset>,
    test:       Arc<BabiDataset>,
    mode:       Split,
    rng:        StdRng,
}

impl TaskData {
    pub fn new(
        task_id:    usize,
        vocab_size: usize,
        train:      BabiDataset,
        valid:      BabiDataset,
        test:       BabiDataset,
    ) -> Self {
        Self {
            task_id,
            vocab_size,
            train: Arc::new(train),
            valid: Arc::new(valid),
            test:  Arc::new(test),
            mode:  Split::Train,
            rng:  StdRng::seed_from_u64(0),
        }
    }

    /// Reseed the train-split shuffle. Each train loader draws its own
    /// shuffle seed from this stream, so epochs see different orders.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Encode a loaded task with its vocabulary and carve out validation.
    pub fn from_task(task: &BabiTask, vocab: &Vocabulary, valid_fraction: f64) -> Result<Self> {
        let encode = |examples: &[crate::domain::story::BabiExample]| {
            examples
                .iter()
                .map(|ex| vocab.encode_example(ex))
                .collect::<Result<Vec<_>>>()
        };

        let (train, valid) = split_train_valid(encode(&task.train)?, valid_fraction);
        let test = encode(&task.test)?;

        Ok(Self::new(
            task.task_id,
            vocab.len(),
            BabiDataset::new(train),
            BabiDataset::new(valid),
            BabiDataset::new(test),
        ))
    }

    pub fn task_id(&self) -> usize { self.task_id }

    pub fn vocab_size(&self) -> usize { self.vocab_size }

    pub fn set_mode(&mut self, mode: Split) {
        tracing::debug!("Task {}: dataset mode → {}", self.task_id, mode);
        self.mode = mode;
    }

    pub fn split(&self, split: Split) -> &BabiDataset {
        match split {
            Split::Train => self.train.as_ref(),
            Split::Valid => self.valid.as_ref(),
            Split::Test  => self.test.as_ref(),
        }
    }

    /// Number of samples in the active split
    pub fn len(&self) -> usize {
        self.split(self.mode).len()
    }

    /// DataLoader over the active split. Only the train split is
    /// shuffled; valid and test come back in file order.
    pub fn loader(&mut self, batch_size: usize) -> SampleLoader {
        let dataset = match self.mode {
            Split::Train => self.train.clone(),
            Split::Valid => self.valid.clone(),
            Split::Test  => self.test.clone(),
        };

        let builder = DataLoaderBuilder::new(SampleBatcher).batch_size(batch_size.max(1));
        match self.mode {
            Split::Train => builder.shuffle(self.rng.next_u64()).build(dataset),
            _            => builder.build(dataset),
        }
    }
}
