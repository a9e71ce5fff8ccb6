// ============================================================
// Layer 4: bAbI Batcher ("pad collate")
// ============================================================
// Two Burn batchers:
//
//   SampleBatcher  groups samples for the DataLoader, no tensors,
//                  so the experiment loop stays backend-free
//   BabiBatcher    turns one such group into the integer tensors
//                  the DMN consumes
//
// Unlike fixed-length token sequences, bAbI samples are ragged
// in three directions: number of sentences, words per sentence
// and words per question. Padding is therefore per batch:
//
//   context   [batch, max_sentences, max_sentence_len]
//   questions [batch, max_question_len]
//   answers   [batch]
//
// Every gap is filled with PAD_ID (0). The padded sizes are the
// maxima over THIS batch only, so short stories do not pay for
// the longest story of the task.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::vocabulary::PAD_ID;
use crate::domain::sample::EncodedSample;

// ─── BabiBatch ────────────────────────────────────────────────────────────────
/// A padded batch ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct BabiBatch<B: Backend> {
    /// Story sentences, shape [batch_size, num_sentences, sentence_len]
    pub context: Tensor<B, 3, Int>,

    /// Questions, shape [batch_size, question_len]
    pub questions: Tensor<B, 2, Int>,

    /// Answer word ids, shape [batch_size]
    pub answers: Tensor<B, 1, Int>,
}

// ─── Padding ──────────────────────────────────────────────────────────────────
/// Flat, row-major padded buffers plus their shape.
/// Kept free of Burn types so the padding rules are testable on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBatch {
    pub batch_size:    usize,
    pub num_sentences: usize,
    pub sentence_len:  usize,
    pub question_len:  usize,
    pub context:       Vec<i32>,
    pub questions:     Vec<i32>,
    pub answers:       Vec<i32>,
}

/// Pad a batch of ragged samples to rectangular buffers.
/// Every padded dimension is at least 1 so no tensor is ever empty.
pub fn pad_collate(items: &[EncodedSample]) -> PaddedBatch {
    let batch_size    = items.len();
    let num_sentences = items.iter().map(|s| s.context.len()).max().unwrap_or(0).max(1);
    let sentence_len  = items
        .iter()
        .flat_map(|s| s.context.iter().map(Vec::len))
        .max()
        .unwrap_or(0)
        .max(1);
    let question_len  = items.iter().map(|s| s.question.len()).max().unwrap_or(0).max(1);

    let pad = PAD_ID as i32;
    let mut context   = vec![pad; batch_size * num_sentences * sentence_len];
    let mut questions = vec![pad; batch_size * question_len];

    for (b, sample) in items.iter().enumerate() {
        for (s, sentence) in sample.context.iter().enumerate() {
            let row = (b * num_sentences + s) * sentence_len;
            for (w, &id) in sentence.iter().enumerate() {
                context[row + w] = id as i32;
            }
        }
        let row = b * question_len;
        for (w, &id) in sample.question.iter().enumerate() {
            questions[row + w] = id as i32;
        }
    }

    let answers = items.iter().map(|s| s.answer as i32).collect();

    PaddedBatch {
        batch_size,
        num_sentences,
        sentence_len,
        question_len,
        context,
        questions,
        answers,
    }
}

// ─── BabiBatcher ──────────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct BabiBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> BabiBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<EncodedSample, BabiBatch<B>> for BabiBatcher<B> {
    fn batch(&self, items: Vec<EncodedSample>) -> BabiBatch<B> {
        let p = pad_collate(&items);

        let context = Tensor::<B, 1, Int>::from_ints(p.context.as_slice(), &self.device)
            .reshape([p.batch_size, p.num_sentences, p.sentence_len]);

        let questions = Tensor::<B, 1, Int>::from_ints(p.questions.as_slice(), &self.device)
            .reshape([p.batch_size, p.question_len]);

        let answers = Tensor::<B, 1, Int>::from_ints(p.answers.as_slice(), &self.device);

        BabiBatch { context, questions, answers }
    }
}

// ─── SampleBatcher ────────────────────────────────────────────────────────────
/// Identity batcher: the DataLoader hands out `Vec<EncodedSample>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleBatcher;

impl Batcher<EncodedSample, Vec<EncodedSample>> for SampleBatcher {
    fn batch(&self, items: Vec<EncodedSample>) -> Vec<EncodedSample> {
        items
    }
}
