// ============================================================
// Layer 4: bAbI Loader
// ============================================================
// Reads the bAbI text files for one task and turns every
// question line into a BabiExample.
//
// File layout (the standard en-10k release):
//   data/en-10k/
//     qa1_single-supporting-fact_train.txt
//     qa1_single-supporting-fact_test.txt
//     ...
//     qa20_agents-motivations_test.txt
//
// Line format:
//   "<id> <statement>"                          statement
//   "<id> <question>?\t<answer>\t<fact ids>"    question
//
// An id of 1 starts a new story. A question sees every
// statement of its story read so far; earlier questions are
// not part of the context.
//
// Reference: Weston et al. (2015) bAbI tasks
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::story::BabiExample;

/// The raw train and test examples of a single task.
#[derive(Debug, Clone)]
pub struct BabiTask {
    pub task_id: usize,
    pub train:   Vec<BabiExample>,
    pub test:    Vec<BabiExample>,
}

impl BabiTask {
    /// Every word of both files, used to build the vocabulary
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.train.iter().chain(self.test.iter()).flat_map(BabiExample::words)
    }
}

/// Loads bAbI task files from a directory.
pub struct BabiLoader {
    /// Directory holding the qa{N}_*_{train,test}.txt files
    dir: PathBuf,
}

impl BabiLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load and parse both files of `task_id`.
    pub fn load_task(&self, task_id: usize) -> Result<BabiTask> {
        anyhow::ensure!(task_id >= 1, "bAbI task ids start at 1, got {task_id}");

        let train_path = self.find_file(task_id, "train")?;
        let test_path  = self.find_file(task_id, "test")?;

        let train = load_file(&train_path)?;
        let test  = load_file(&test_path)?;

        tracing::info!(
            "Task {}: {} train examples ({}), {} test examples ({})",
            task_id,
            train.len(),
            train_path.display(),
            test.len(),
            test_path.display(),
        );

        Ok(BabiTask { task_id, train, test })
    }

    /// Find `qa{task_id}_*_{split}.txt` inside the data directory.
    fn find_file(&self, task_id: usize, split: &str) -> Result<PathBuf> {
        let prefix = format!("qa{task_id}_");
        let suffix = format!("_{split}.txt");

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read bAbI directory '{}'", self.dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                return Ok(path);
            }
        }

        anyhow::bail!(
            "No {} file for task {} in '{}' (expected {}*{})",
            split,
            task_id,
            self.dir.display(),
            prefix,
            suffix,
        )
    }
}

fn load_file(path: &Path) -> Result<Vec<BabiExample>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    parse_babi(&text, &path.display().to_string())
}

/// Parse the contents of one bAbI file.
/// `source` only appears in error messages.
pub fn parse_babi(text: &str, source: &str) -> Result<Vec<BabiExample>> {
    let mut story: Vec<Vec<String>> = Vec::new();
    let mut examples = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let (id, rest) = line
            .split_once(' ')
            .with_context(|| format!("{source}:{line_no}: missing line id"))?;
        let id: usize = id
            .parse()
            .with_context(|| format!("{source}:{line_no}: bad line id '{id}'"))?;

        if id == 1 {
            story.clear();
        }

        if rest.contains('\t') {
            let mut parts = rest.split('\t');
            let question = parts.next().unwrap_or_default();
            let answer   = parts
                .next()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .with_context(|| format!("{source}:{line_no}: question without answer"))?;
            let supporting_facts = parts
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .map(|f| {
                    f.parse::<usize>()
                        .with_context(|| format!("{source}:{line_no}: bad fact id '{f}'"))
                })
                .collect::<Result<Vec<_>>>()?;

            examples.push(BabiExample::new(
                story.clone(),
                normalise(question),
                normalise_answer(answer),
                supporting_facts,
            ));
        } else {
            story.push(normalise(rest));
        }
    }

    Ok(examples)
}

/// Lower-case and split a sentence into words, dropping punctuation.
pub fn normalise(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Answers are a single token; list answers such as "n,e" become "n_e".
fn normalise_answer(answer: &str) -> String {
    normalise(&answer.replace(',', "_")).join("_")
}
