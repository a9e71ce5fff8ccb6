// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here, behind the Learner / Evaluate
// traits from Layer 3.
//
//   model.rs      DMN+ architecture: input fusion with a
//                 bidirectional GRU, question GRU, episodic
//                 memory with attention-GRU, answer head
//
//   learner.rs    DMN + optimizer as a Learner
//
//   evaluator.rs  DMN loaded from a checkpoint, eval only
//
//   trainer.rs    The per-(run, task) loop: epochs, early
//                 stopping, best snapshot, test, checkpoints
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Xiong et al. (2016) Dynamic Memory Networks for
//            Visual and Textual Question Answering

/// DMN+ architecture
pub mod model;

/// Training-side binding of the model to an optimizer
pub mod learner;

/// Checkpoint loading and scoring
pub mod evaluator;

/// Early-stopping experiment loop
pub mod trainer;
