// ============================================================
// Layer 3: Encoded Samples and Dataset Splits
// ============================================================
// After the vocabulary is built, every BabiExample becomes an
// EncodedSample: the same structure, but with word ids instead
// of strings. Lengths are still ragged here; padding to a
// rectangular batch happens in the batcher (Layer 4).
//
// Split names the three modes the dataset can be switched to.
//
// Reference: Rust Book §6 (Enums)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Word-id form of a BabiExample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSample {
    /// One id list per context sentence (ragged)
    pub context: Vec<Vec<u32>>,

    /// Question word ids (ragged)
    pub question: Vec<u32>,

    /// Id of the answer word
    pub answer: u32,
}

/// Which part of a task's data is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test  => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
