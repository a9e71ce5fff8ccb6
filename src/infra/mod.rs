// ============================================================
// Layer 6: Infrastructure
// ============================================================
// Everything that touches the filesystem after data loading:
//
//   checkpoint.rs        model weights + experiment config
//   metrics.rs           log.txt accuracy lines, results.csv
//   vocabulary_store.rs  per-task vocabulary JSON

pub mod checkpoint;
pub mod metrics;
pub mod vocabulary_store;
