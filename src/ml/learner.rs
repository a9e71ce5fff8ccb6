// ============================================================
// Layer 5: DMN Learner
// ============================================================
// Binds the DMN model to an optimizer behind the Learner trait
// so the experiment loop stays free of tensors.
//
//   train_batch  Autodiff backend, dropout on, one Adam step
//   eval_batch   model.valid() on the inner backend, dropout off
//   snapshot     a clone of the module (Burn params are cheap
//                ref-counted tensors, so this is the state dict)
//
// Reference: Burn Book §5 (Custom Training Loop)

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::Path;

use crate::data::batcher::BabiBatcher;
use crate::domain::{
    sample::EncodedSample,
    traits::{BatchScore, Evaluate, Learner},
};
use crate::infra::checkpoint::save_model;
use crate::ml::model::DmnModel;

pub struct DmnLearner<B: AutodiffBackend, O> {
    model:         DmnModel<B>,
    optim:         O,
    lr:            f64,
    train_batcher: BabiBatcher<B>,
    eval_batcher:  BabiBatcher<B::InnerBackend>,
}

impl<B, O> DmnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DmnModel<B>, B>,
{
    pub fn new(model: DmnModel<B>, optim: O, lr: f64, device: &B::Device) -> Self {
        Self {
            model,
            optim,
            lr,
            train_batcher: BabiBatcher::new(device.clone()),
            eval_batcher:  BabiBatcher::new(device.clone()),
        }
    }
}

impl<B, O> Evaluate for DmnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DmnModel<B>, B>,
{
    fn eval_batch(&self, batch: &[EncodedSample]) -> Result<BatchScore> {
        let model = self.model.valid();
        let b     = self.eval_batcher.batch(batch.to_vec());

        let (loss, accuracy) = model.loss(b.context, b.questions, b.answers);
        Ok(BatchScore { loss: loss.into_scalar().elem::<f64>(), accuracy })
    }
}

impl<B, O> Learner for DmnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DmnModel<B>, B>,
{
    type Snapshot = DmnModel<B>;

    fn train_batch(&mut self, batch: &[EncodedSample]) -> Result<BatchScore> {
        let b = self.train_batcher.batch(batch.to_vec());
        let (loss, accuracy) = self.model.loss(b.context, b.questions, b.answers);
        let loss_val: f64    = loss.clone().into_scalar().elem::<f64>();

        // Backward pass + optimizer update
        let grads  = loss.backward();
        let grads  = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);

        Ok(BatchScore { loss: loss_val, accuracy })
    }

    fn snapshot(&self) -> DmnModel<B> {
        self.model.clone()
    }

    fn restore(&mut self, snapshot: &DmnModel<B>) {
        self.model = snapshot.clone();
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_model(&self.model, path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::DmnConfig;
    use burn::backend::{ndarray::NdArray, Autodiff};
    use burn::optim::AdamConfig;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn batch() -> Vec<EncodedSample> {
        vec![
            EncodedSample { context: vec![vec![2, 3], vec![4]], question: vec![5, 2], answer: 3 },
            EncodedSample { context: vec![vec![6, 7, 2]],       question: vec![5, 6], answer: 7 },
        ]
    }

    fn learner() -> DmnLearner<TestAutodiffBackend, impl Optimizer<DmnModel<TestAutodiffBackend>, TestAutodiffBackend>> {
        let device = Default::default();
        let model  = DmnConfig::new(8, 10).with_dropout(0.0).init::<TestAutodiffBackend>(&device);
        let optim  = AdamConfig::new().init::<TestAutodiffBackend, DmnModel<TestAutodiffBackend>>();
        DmnLearner::new(model, optim, 0.01, &device)
    }

    #[test]
    fn test_eval_batch_scores_in_range() {
        let score = learner().eval_batch(&batch()).unwrap();
        assert!(score.loss.is_finite());
        assert!((0.0..=1.0).contains(&score.accuracy));
    }

    #[test]
    fn test_train_then_restore_brings_back_scores() {
        let mut l  = learner();
        let before = l.eval_batch(&batch()).unwrap();
        let snap   = l.snapshot();

        for _ in 0..5 {
            l.train_batch(&batch()).unwrap();
        }
        let trained = l.eval_batch(&batch()).unwrap();
        assert!(trained.loss < before.loss, "{} !< {}", trained.loss, before.loss);

        l.restore(&snap);
        let restored = l.eval_batch(&batch()).unwrap();
        assert!((restored.loss - before.loss).abs() < 1e-6);
    }
}
