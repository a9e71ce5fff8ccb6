// ============================================================
// Layer 2: Evaluate Use Case
// ============================================================
// Scores one saved checkpoint on its task's test split:
//   1. Read experiment_config.json for the architecture
//   2. Load the task files and the task's saved vocabulary
//   3. Load weights into a fresh DMN on the inner backend
//   4. Weighted test accuracy, plus a few sample predictions

use anyhow::Result;
use burn::{data::dataset::Dataset, prelude::*};
use std::path::PathBuf;

use crate::data::{dataset::TaskData, loader::BabiLoader};
use crate::domain::sample::Split;
use crate::infra::{
    checkpoint::{strip_extension, CheckpointManager, CheckpointPolicy},
    vocabulary_store::VocabularyStore,
};
use crate::ml::{evaluator::DmnEvaluator, trainer::evaluate_split};

type EvalBackend = burn::backend::Wgpu;

pub struct EvaluateRequest {
    pub task:       usize,
    pub checkpoint: PathBuf,
    pub data_dir:   String,
    pub model_dir:  String,
    /// Falls back to the batch size used in training
    pub batch_size: Option<usize>,
    /// How many test stories to show predictions for
    pub show:       usize,
}

/// One test question with the expected and predicted answer words.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub question:  String,
    pub expected:  String,
    pub predicted: String,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub task:        usize,
    pub samples:     usize,
    pub accuracy:    f64,
    pub predictions: Vec<Prediction>,
}

pub struct EvaluateUseCase {
    request: EvaluateRequest,
}

impl EvaluateUseCase {
    pub fn new(request: EvaluateRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.execute_on::<EvalBackend>(&device)
    }

    /// Same as `execute`, on any backend.
    pub fn execute_on<B: Backend>(&self, device: &B::Device) -> Result<EvaluationReport> {
        let req = &self.request;

        let ckpt = CheckpointManager::new(&req.model_dir, CheckpointPolicy::None)?;
        let cfg  = ckpt.load_config()?;

        let task  = BabiLoader::new(&req.data_dir).load_task(req.task)?;
        let vocab = VocabularyStore::new(&req.model_dir).load_or_build(&task)?;
        let mut data = TaskData::from_task(&task, &vocab, cfg.valid_fraction)?;

        let evaluator = DmnEvaluator::<B>::from_checkpoint(
            &cfg.model_config(vocab.len()),
            &strip_extension(&req.checkpoint),
            device,
        )?;

        let batch_size = req.batch_size.unwrap_or(cfg.batch_size);
        let accuracy   = evaluate_split(&evaluator, &mut data, Split::Test, batch_size)?;

        // ── Sample predictions ────────────────────────────────────────────────
        let test    = data.split(Split::Test);
        let encoded: Vec<_> = (0..req.show).filter_map(|i| test.get(i)).collect();

        let predictions = if encoded.is_empty() {
            Vec::new()
        } else {
            let ids = evaluator.predict(&encoded)?;
            task.test
                .iter()
                .zip(ids)
                .map(|(example, id)| Prediction {
                    question:  example.question.join(" "),
                    expected:  example.answer.clone(),
                    predicted: vocab.word_of(id).unwrap_or_else(|| format!("<id {id}>")),
                })
                .collect()
        };

        tracing::info!("Task {}: test accuracy {accuracy:.4}", req.task);

        Ok(EvaluationReport {
            task: req.task,
            samples: data.len(),
            accuracy,
            predictions,
        })
    }
}
