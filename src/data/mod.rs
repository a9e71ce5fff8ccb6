// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from bAbI text files to padded tensor batches.
//
//   qa{N}_*_{train,test}.txt
//       │
//       ▼
//   BabiLoader        → parses stories into BabiExamples
//       │
//       ▼
//   Vocabulary        → word ids for this task only
//       │
//       ▼
//   TaskData          → train / valid / test splits + mode switch
//       │
//       ▼
//   BabiBatcher       → pads each batch into tensors
//
// Reference: Burn Book §4 (Datasets and Batchers)

/// Parses bAbI task files
pub mod loader;

/// Per-task word-level vocabulary
pub mod vocabulary;

/// Burn Dataset implementation and the per-task split holder
pub mod dataset;

/// Pads ragged samples into tensor batches
pub mod batcher;

/// Holds out the tail of the training file for validation
pub mod splitter;
