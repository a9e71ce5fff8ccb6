// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Defines the `train` and `evaluate` subcommands and their flags.
// Defaults here match ExperimentConfig::default(), so
// `babi-dmn train` with no flags is the same as `babi-dmn`.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    evaluate_use_case::EvaluateRequest,
    experiment_use_case::ExperimentConfig,
};
use crate::infra::checkpoint::CheckpointPolicy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train, early-stop and test over runs × tasks
    Train(TrainArgs),

    /// Score a saved checkpoint on one task's test split
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Independent repetitions of every task
    #[arg(long, default_value_t = 10)]
    pub runs: usize,

    /// First bAbI task id (1..=20)
    #[arg(long, default_value_t = 1)]
    pub first_task: usize,

    /// Last bAbI task id, inclusive
    #[arg(long, default_value_t = 20)]
    pub last_task: usize,

    /// Epoch ceiling per (run, task)
    #[arg(long, default_value_t = 256)]
    pub max_epochs: usize,

    /// Non-improving epochs tolerated before stopping
    #[arg(long, default_value_t = 20)]
    pub patience: usize,

    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Width of embeddings, GRUs and memory
    #[arg(long, default_value_t = 100)]
    pub hidden_size: usize,

    /// Episodic memory passes
    #[arg(long, default_value_t = 3)]
    pub num_passes: usize,

    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Share of each training file held out (from the end) for validation
    #[arg(long, default_value_t = 0.1)]
    pub valid_fraction: f64,

    /// Directory holding qa{N}_*_train.txt / qa{N}_*_test.txt
    #[arg(long, default_value = "data/en-10k")]
    pub data_dir: String,

    /// Where checkpoints, vocabularies and the config are written
    #[arg(long, default_value = "models")]
    pub model_dir: String,

    /// Accuracy log; results.csv is written next to it
    #[arg(long, default_value = "log.txt")]
    pub log_file: String,

    #[arg(long, value_enum, default_value_t = CheckpointPolicy::Final)]
    pub checkpoint_policy: CheckpointPolicy,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for ExperimentConfig {
    fn from(a: TrainArgs) -> Self {
        ExperimentConfig {
            runs:              a.runs,
            first_task:        a.first_task,
            last_task:         a.last_task,
            max_epochs:        a.max_epochs,
            patience:          a.patience,
            batch_size:        a.batch_size,
            hidden_size:       a.hidden_size,
            num_passes:        a.num_passes,
            lr:                a.lr,
            dropout:           a.dropout,
            valid_fraction:    a.valid_fraction,
            data_dir:          a.data_dir,
            model_dir:         a.model_dir,
            log_file:          a.log_file,
            checkpoint_policy: a.checkpoint_policy,
            seed:              a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// bAbI task id the checkpoint was trained on
    #[arg(long)]
    pub task: usize,

    /// Checkpoint file, with or without the .mpk.gz extension
    #[arg(long)]
    pub checkpoint: PathBuf,

    #[arg(long, default_value = "data/en-10k")]
    pub data_dir: String,

    /// Directory holding experiment_config.json and task vocabularies
    #[arg(long, default_value = "models")]
    pub model_dir: String,

    /// Defaults to the batch size used in training
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Print predictions for the first N test questions
    #[arg(long, default_value_t = 0)]
    pub show: usize,
}

impl From<EvaluateArgs> for EvaluateRequest {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateRequest {
            task:       a.task,
            checkpoint: a.checkpoint,
            data_dir:   a.data_dir,
            model_dir:  a.model_dir,
            batch_size: a.batch_size,
            show:       a.show,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("babi-dmn").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_subcommand_is_default_experiment() {
        assert!(parse(&[]).command.is_none());
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let Some(Commands::Train(args)) = parse(&["train"]).command else {
            panic!("expected train");
        };
        assert_eq!(ExperimentConfig::from(args), ExperimentConfig::default());
    }

    #[test]
    fn test_train_overrides() {
        let Some(Commands::Train(args)) = parse(&[
            "train", "--runs", "1", "--first-task", "3", "--last-task", "3",
            "--checkpoint-policy", "every-test-batch",
        ])
        .command else {
            panic!("expected train");
        };
        let cfg = ExperimentConfig::from(args);
        assert_eq!((cfg.runs, cfg.first_task, cfg.last_task), (1, 3, 3));
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::EveryTestBatch);
    }

    #[test]
    fn test_evaluate_requires_checkpoint() {
        let argv = ["babi-dmn", "evaluate", "--task", "1"];
        assert!(Cli::try_parse_from(argv).is_err());

        let Some(Commands::Evaluate(args)) =
            parse(&["evaluate", "--task", "2", "--checkpoint", "models/x.mpk.gz"]).command
        else {
            panic!("expected evaluate");
        };
        let req = EvaluateRequest::from(args);
        assert_eq!(req.task, 2);
        assert_eq!(req.batch_size, None);
    }
}
