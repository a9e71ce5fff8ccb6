// ============================================================
// Layer 5: Evaluator
// ============================================================
// Loads a saved DMN checkpoint and scores batches with it.
// Used by the `evaluate` command; the experiment loop itself
// evaluates through DmnLearner.
use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use std::path::Path;

use crate::data::batcher::BabiBatcher;
use crate::domain::{
    sample::EncodedSample,
    traits::{BatchScore, Evaluate},
};
use crate::infra::checkpoint::load_model;
use crate::ml::model::{DmnConfig, DmnModel};

pub struct DmnEvaluator<B: Backend> {
    model:   DmnModel<B>,
    batcher: BabiBatcher<B>,
}

impl<B: Backend> DmnEvaluator<B> {
    pub fn new(model: DmnModel<B>, device: &B::Device) -> Self {
        Self { model, batcher: BabiBatcher::new(device.clone()) }
    }

    /// Build the architecture from `cfg`, then load weights from `path`
    /// (given without the recorder extension).
    pub fn from_checkpoint(cfg: &DmnConfig, path: &Path, device: &B::Device) -> Result<Self> {
        let model = load_model(cfg.init::<B>(device), path, device)?;
        Ok(Self::new(model, device))
    }

    /// Predicted answer id for each sample of the batch.
    pub fn predict(&self, batch: &[EncodedSample]) -> Result<Vec<u32>> {
        let b      = self.batcher.batch(batch.to_vec());
        let logits = self.model.forward(b.context, b.questions);
        let [n, _] = logits.dims();

        let ids = logits
            .argmax(1)
            .reshape([n])
            .into_data()
            .iter::<i64>()
            .map(|id| id as u32)
            .collect();
        Ok(ids)
    }
}

impl<B: Backend> Evaluate for DmnEvaluator<B> {
    fn eval_batch(&self, batch: &[EncodedSample]) -> Result<BatchScore> {
        let b = self.batcher.batch(batch.to_vec());
        let (loss, accuracy) = self.model.loss(b.context, b.questions, b.answers);
        Ok(BatchScore { loss: loss.into_scalar().elem::<f64>(), accuracy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::save_model;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn batch() -> Vec<EncodedSample> {
        vec![
            EncodedSample { context: vec![vec![2, 3]], question: vec![4], answer: 3 },
            EncodedSample { context: vec![vec![5], vec![6, 2]], question: vec![4, 5], answer: 6 },
        ]
    }

    #[test]
    fn test_checkpoint_reload_gives_same_predictions() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = DmnConfig::new(8, 9).with_dropout(0.0);

        let model  = cfg.init::<TestBackend>(&device);
        let path   = dir.path().join("task1_epoch0_run0_acc0.5000");
        save_model(&model, &path).unwrap();

        let original = DmnEvaluator::new(model, &device);
        let reloaded = DmnEvaluator::<TestBackend>::from_checkpoint(&cfg, &path, &device).unwrap();

        assert_eq!(original.predict(&batch()).unwrap(), reloaded.predict(&batch()).unwrap());
        let a = original.eval_batch(&batch()).unwrap();
        let b = reloaded.eval_batch(&batch()).unwrap();
        assert!((a.loss - b.loss).abs() < 1e-5);
        assert_eq!(a.accuracy, b.accuracy);
    }
}
