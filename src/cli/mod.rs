// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line and routes to the use cases in
// Layer 2. Final results are printed here; progress goes
// through tracing.
//
//   1. `train` — trains FCN-8s and writes checkpoints to --log-dir
//   2. `valid` — scores the latest checkpoint and writes overlays

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs, ValidArgs};

use crate::application::{
    train_use_case::TrainUseCase,
    valid_use_case::{ValidReport, ValidUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "fcn-segmentation",
    version = "0.1.0",
    about = "Train and validate an FCN-8s semantic segmentation network."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Valid(args) => run_valid(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Training on '{}/{}'", args.data_dir, args.data_name);

    let loss = TrainUseCase::new(args.into()).execute()?;
    println!("Finished training. Final batch loss {loss:.6}");
    Ok(())
}

fn run_valid(args: ValidArgs) -> Result<()> {
    tracing::info!("Validating checkpoint in '{}'", args.log_dir);

    let report = ValidUseCase::new(args.into()).execute()?;
    print_report(&report);
    Ok(())
}

fn fmt_iou(iou: Option<f64>) -> String {
    iou.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn print_report(report: &ValidReport) {
    println!("time elapsed: {:.4}s per image ({} images)", report.time_per_image, report.num_samples);
    println!(
        "IOU for foreground (class {}): {}",
        report.foreground_label,
        fmt_iou(report.foreground_iou)
    );
    for (class, iou) in report.per_class.iter().enumerate() {
        println!("  class {class:>3}: {}", fmt_iou(*iou));
    }
    println!("mean IOU: {}", fmt_iou(report.mean_iou));
}
