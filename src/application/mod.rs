// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal
// (running the experiment or scoring a checkpoint).
//
// Rules for this layer:
//   - No tensor or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Runs × tasks training with early stopping and testing
pub mod experiment_use_case;

// Scores a saved checkpoint on one task
pub mod evaluate_use_case;
