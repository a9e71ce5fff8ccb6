// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   (no subcommand)  full experiment with the default constants
//   train            experiment with overridable hyperparameters
//   evaluate         score a saved checkpoint on one task
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs};

use crate::application::{
    evaluate_use_case::EvaluateUseCase,
    experiment_use_case::{mean_test_accuracy, ExperimentConfig, ExperimentUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "babi-dmn",
    version = "0.1.0",
    about = "Train and evaluate a Dynamic Memory Network on the bAbI tasks."
)]
pub struct Cli {
    /// Omit to run the full default experiment
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            None                           => run_experiment(ExperimentConfig::default()),
            Some(Commands::Train(args))    => run_experiment(args.into()),
            Some(Commands::Evaluate(args)) => run_evaluate(args),
        }
    }
}

fn run_experiment(cfg: ExperimentConfig) -> Result<()> {
    tracing::info!(
        "Starting experiment: {} runs, tasks {}..={}, data in '{}'",
        cfg.runs,
        cfg.first_task,
        cfg.last_task,
        cfg.data_dir
    );

    let outcomes = ExperimentUseCase::new(cfg).execute()?;

    println!("\nMean test accuracy per task:");
    for (task, mean) in mean_test_accuracy(&outcomes) {
        println!("  Task {task:>2}: {mean:.4}");
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let report = EvaluateUseCase::new(args.into()).execute()?;

    for p in &report.predictions {
        let mark = if p.expected == p.predicted { "ok " } else { "err" };
        println!("[{mark}] {}? expected: {}, predicted: {}", p.question, p.expected, p.predicted);
    }
    println!(
        "\nTask {} test accuracy: {:.4} ({} samples)",
        report.task, report.accuracy, report.samples
    );
    Ok(())
}
