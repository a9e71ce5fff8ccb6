// ============================================================
// Layer 3: bAbI Example Domain Type
// ============================================================
// One question from a bAbI story, still in word form.
//
// A bAbI story is a numbered list of statements with questions
// interleaved. Every question sees all statements of its story
// that came before it:
//
//   1 Mary moved to the bathroom.
//   2 John went to the hallway.
//   3 Where is Mary?        bathroom    1
//
//   → context  = [[mary moved to the bathroom], [john went to the hallway]]
//     question = [where is mary]
//     answer   = bathroom
//
// Reference: Weston et al. (2015) bAbI tasks
//            Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

/// A single question with its story context, tokenised into words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BabiExample {
    /// Story statements preceding the question, one word list per sentence
    pub context: Vec<Vec<String>>,

    /// The question words (without the trailing '?')
    pub question: Vec<String>,

    /// The single answer token, e.g. "bathroom" or "n_e" for paths
    pub answer: String,

    /// 1-based statement ids the answer depends on
    /// (kept for inspection, the model never sees them)
    pub supporting_facts: Vec<usize>,
}

impl BabiExample {
    pub fn new(
        context:          Vec<Vec<String>>,
        question:         Vec<String>,
        answer:           impl Into<String>,
        supporting_facts: Vec<usize>,
    ) -> Self {
        Self {
            context,
            question,
            answer: answer.into(),
            supporting_facts,
        }
    }

    /// Every word this example contributes to the task vocabulary
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.context
            .iter()
            .flatten()
            .chain(self.question.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.answer.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_words_include_answer() {
        let ex = BabiExample::new(
            vec![words("mary moved to the bathroom")],
            words("where is mary"),
            "bathroom",
            vec![1],
        );
        let all: Vec<&str> = ex.words().collect();
        assert_eq!(all.len(), 9);
        assert_eq!(*all.last().unwrap(), "bathroom");
    }
}
