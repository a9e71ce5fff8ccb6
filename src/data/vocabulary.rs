// ============================================================
// Layer 4: Task Vocabulary
// ============================================================
// Maps bAbI words to integer ids for one task.
//
// The vocabulary is a word-level HuggingFace tokenizer built
// directly from JSON (the same trick the tokenizer store uses
// to avoid the trainer API): lower-casing normaliser,
// whitespace pre-tokeniser, WordLevel model.
//
// Id layout:
//   0      <pad>   (batch padding)
//   1      <unk>   (never produced by bAbI, required by WordLevel)
//   2..    every distinct word of the task, sorted
//
// Sorting makes ids a pure function of the task files, so
// rebuilding for evaluation gives the same ids as training.

use anyhow::Result;
use std::collections::BTreeSet;
use std::str::FromStr;
use tokenizers::Tokenizer;

use crate::domain::{sample::EncodedSample, story::BabiExample};

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_ID:    u32  = 0;

pub struct Vocabulary {
    tokenizer: Tokenizer,
}

impl Vocabulary {
    /// Build a vocabulary over `words` (duplicates are fine).
    pub fn build<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let distinct: BTreeSet<&str> = words
            .into_iter()
            .filter(|w| *w != PAD_TOKEN && *w != UNK_TOKEN)
            .collect();

        let mut vocab = serde_json::Map::new();
        vocab.insert(PAD_TOKEN.to_string(), serde_json::json!(PAD_ID));
        vocab.insert(UNK_TOKEN.to_string(), serde_json::json!(1));
        for (offset, word) in distinct.iter().enumerate() {
            vocab.insert(word.to_string(), serde_json::json!(offset + 2));
        }

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tokenizer = Tokenizer::from_str(&tokenizer_json.to_string())
            .map_err(|e| anyhow::anyhow!("Cannot build vocabulary tokenizer: {e}"))?;

        tracing::debug!("Vocabulary built with {} entries", distinct.len() + 2);
        Ok(Self { tokenizer })
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Number of ids, padding and unknown included
    pub fn len(&self) -> usize {
        self.tokenizer.get_vocab_size(false)
    }

    pub fn id_of(&self, word: &str) -> Option<u32> {
        self.tokenizer.token_to_id(word)
    }

    pub fn word_of(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    /// Encode already-normalised words, one id per word.
    pub fn encode_words(&self, words: &[String]) -> Result<Vec<u32>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let enc = self
            .tokenizer
            .encode(words.join(" "), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(enc.get_ids().to_vec())
    }

    pub fn encode_example(&self, example: &BabiExample) -> Result<EncodedSample> {
        let context = example
            .context
            .iter()
            .map(|sentence| self.encode_words(sentence))
            .collect::<Result<Vec<_>>>()?;
        let question = self.encode_words(&example.question)?;
        let answer   = self
            .id_of(&example.answer)
            .ok_or_else(|| anyhow::anyhow!("Answer '{}' is not in the vocabulary", example.answer))?;

        Ok(EncodedSample { context, question, answer })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_ids_are_sorted_after_specials() {
        let vocab = Vocabulary::build(["mary", "bathroom", "mary", "is"]).unwrap();
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.id_of(PAD_TOKEN), Some(0));
        assert_eq!(vocab.id_of(UNK_TOKEN), Some(1));
        assert_eq!(vocab.id_of("bathroom"), Some(2));
        assert_eq!(vocab.id_of("is"), Some(3));
        assert_eq!(vocab.id_of("mary"), Some(4));
        assert_eq!(vocab.word_of(4).as_deref(), Some("mary"));
    }

    #[test]
    fn test_encode_words_one_id_per_word() {
        let vocab = Vocabulary::build(["where", "is", "mary"]).unwrap();
        let ids = vocab.encode_words(&words("where is mary")).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[2], vocab.id_of("mary").unwrap());
    }

    #[test]
    fn test_unknown_word_maps_to_unk() {
        let vocab = Vocabulary::build(["mary"]).unwrap();
        assert_eq!(vocab.encode_words(&words("john")).unwrap(), vec![1]);
    }

    #[test]
    fn test_encode_example() {
        let ex = BabiExample::new(
            vec![words("mary moved to the bathroom")],
            words("where is mary"),
            "bathroom",
            vec![1],
        );
        let vocab   = Vocabulary::build(ex.words()).unwrap();
        let encoded = vocab.encode_example(&ex).unwrap();
        assert_eq!(encoded.context[0].len(), 5);
        assert_eq!(encoded.question.len(), 3);
        assert_eq!(encoded.answer, vocab.id_of("bathroom").unwrap());
    }

    #[test]
    fn test_same_words_same_ids() {
        let a = Vocabulary::build(["b", "a", "c"]).unwrap();
        let b = Vocabulary::build(["c", "b", "a", "a"]).unwrap();
        for w in ["a", "b", "c"] {
            assert_eq!(a.id_of(w), b.id_of(w));
        }
    }
}
