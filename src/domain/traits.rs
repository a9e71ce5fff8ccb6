// ============================================================
// Layer 3: Core Traits (Abstractions)
// ============================================================
// The experiment loop never touches tensors. It talks to the
// model through two capability traits:
//
//   Evaluate  score a batch without changing any parameter
//             (eval mode: dropout off)
//   Learner   everything Evaluate does, plus one optimisation
//             step per batch, snapshot/restore of the full
//             parameter set, and writing weights to disk
//
// Implementations:
//   - DmnLearner<B, O>  → burn DMN model + optimizer (training)
//   - DmnEvaluator<B>   → burn DMN model loaded from a checkpoint
//   - ScriptedLearner   → deterministic stand-in used by the
//                         loop tests (ml::trainer)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use anyhow::Result;

use crate::domain::sample::EncodedSample;

/// Result of pushing one batch through the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScore {
    /// Mean cross-entropy loss over the batch
    pub loss: f64,

    /// Fraction of answers predicted correctly, in [0, 1]
    pub accuracy: f64,
}

// ─── Evaluate ─────────────────────────────────────────────────────────────────
/// Anything that can score a batch of samples in eval mode.
pub trait Evaluate {
    /// Forward pass with no parameter update.
    fn eval_batch(&self, batch: &[EncodedSample]) -> Result<BatchScore>;
}

// ─── Learner ──────────────────────────────────────────────────────────────────
/// A trainable model bundled with its optimizer.
pub trait Learner: Evaluate {
    /// Copy of the full parameter set (the "state dict").
    type Snapshot;

    /// Forward pass in train mode, back-propagation, optimizer step.
    /// The returned score is measured before the update.
    fn train_batch(&mut self, batch: &[EncodedSample]) -> Result<BatchScore>;

    /// Take a copy of the current parameters.
    fn snapshot(&self) -> Self::Snapshot;

    /// Replace the current parameters with a previous snapshot.
    fn restore(&mut self, snapshot: &Self::Snapshot);

    /// Write the current parameters to `path`.
    /// Implementations may append their own file extension.
    fn save(&self, path: &Path) -> Result<()>;
}
