// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// experiment works with: bAbI examples, their encoded form,
// dataset splits and the model capabilities the loop needs.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A bAbI question with its story context, in words
pub mod story;

// Word-id samples and the train/valid/test split selector
pub mod sample;

// Evaluate / Learner capability traits
pub mod traits;
