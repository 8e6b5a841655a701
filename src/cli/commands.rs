// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two run modes as subcommands, `train` and `valid`,
// with all their configurable flags.
//
// clap rejects an unknown mode or optimizer name with a usage
// message before anything else runs.

use clap::{ArgAction, Args, Subcommand, ValueEnum};

use crate::application::{
    train_use_case::{OptimizerKind, TrainConfig},
    valid_use_case::{ValidConfig, DEFAULT_IOU_LABEL},
};
use crate::infra::checkpoint::DEFAULT_MAX_TO_KEEP;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train FCN-8s on the `train` split
    Train(TrainArgs),

    /// Score the latest checkpoint on the `valid` split
    Valid(ValidArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OptimizerArg {
    Adam,
    Momentum,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(o: OptimizerArg) -> Self {
        match o {
            OptimizerArg::Adam     => OptimizerKind::Adam,
            OptimizerArg::Momentum => OptimizerKind::Momentum,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Number of optimiser steps to run
    #[arg(long, default_value_t = 50_000)]
    pub num_steps: usize,

    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Number of classes, including background
    #[arg(long, default_value_t = 3)]
    pub num_classes: usize,

    #[arg(long, default_value_t = 2e-4)]
    pub learning_rate: f64,

    /// Momentum term, used by `--optimizer momentum`
    #[arg(long, default_value_t = 0.99)]
    pub momentum: f64,

    /// Factor applied to the learning rate every two epochs
    #[arg(long, default_value_t = 0.99)]
    pub lr_decay_rate: f64,

    /// Enable the staircase learning-rate decay
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub lr_decay: bool,

    #[arg(long, value_enum, default_value_t = OptimizerArg::Adam)]
    pub optimizer: OptimizerArg,

    /// L2 penalty on the weights
    #[arg(long, default_value_t = 5e-4)]
    pub weight_decay: f64,

    /// torchvision VGG-16 weights (.pth) used to initialise the backbone
    #[arg(long, default_value = "vgg16.pth")]
    pub ckpt_path: String,

    /// Skip the pretrained backbone and start from random weights
    #[arg(long)]
    pub from_scratch: bool,

    /// Where checkpoints, summaries and info.txt are written
    #[arg(long, default_value = "ckpt")]
    pub log_dir: String,

    #[arg(long, default_value = "data")]
    pub data_dir: String,

    #[arg(long, default_value = "Cityscapes")]
    pub data_name: String,

    /// Training height, must be a multiple of 32
    #[arg(long, default_value_t = 224)]
    pub image_height: usize,

    /// Training width, must be a multiple of 32
    #[arg(long, default_value_t = 224)]
    pub image_width: usize,

    /// Width of the first VGG block (64 for the standard network)
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    /// Channels of fc6 / fc7
    #[arg(long, default_value_t = 4096)]
    pub fc_dim: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Probability of a horizontal flip per training sample
    #[arg(long, default_value_t = 0.5)]
    pub flip_prob: f64,

    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Seconds between summaries
    #[arg(long, default_value_t = 120)]
    pub summary_secs: u64,

    /// Seconds between checkpoints
    #[arg(long, default_value_t = 240)]
    pub save_secs: u64,

    /// Checkpoints kept in --log-dir, older ones are deleted (0 keeps all)
    #[arg(long, default_value_t = DEFAULT_MAX_TO_KEEP)]
    pub max_to_keep: usize,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            num_steps:     a.num_steps,
            batch_size:    a.batch_size,
            num_classes:   a.num_classes,
            learning_rate: a.learning_rate,
            momentum:      a.momentum,
            lr_decay_rate: a.lr_decay_rate,
            lr_decay:      a.lr_decay,
            optimizer:     a.optimizer.into(),
            weight_decay:  a.weight_decay,
            ckpt_path:     a.ckpt_path,
            from_scratch:  a.from_scratch,
            log_dir:       a.log_dir,
            data_dir:      a.data_dir,
            data_name:     a.data_name,
            image_height:  a.image_height,
            image_width:   a.image_width,
            base_channels: a.base_channels,
            fc_dim:        a.fc_dim,
            dropout:       a.dropout,
            flip_prob:     a.flip_prob,
            num_workers:   a.num_workers,
            seed:          a.seed,
            summary_secs:  a.summary_secs,
            save_secs:     a.save_secs,
            max_to_keep:   a.max_to_keep,
        }
    }
}

/// All arguments for the `valid` command.
#[derive(Args, Debug)]
pub struct ValidArgs {
    /// Log directory written by `train`
    #[arg(long, default_value = "ckpt")]
    pub log_dir: String,

    /// Defaults to the data directory used for training
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Defaults to the dataset used for training
    #[arg(long)]
    pub data_name: Option<String>,

    /// Class whose IOU is reported as "foreground"
    #[arg(long, default_value_t = DEFAULT_IOU_LABEL)]
    pub iou_label: u8,
}

impl From<ValidArgs> for ValidConfig {
    fn from(a: ValidArgs) -> Self {
        let mut cfg = ValidConfig::new(a.log_dir);
        cfg.data_dir  = a.data_dir;
        cfg.data_name = a.data_name;
        cfg.iou_label = a.iou_label;
        cfg
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["fcn-segmentation", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        let def = TrainConfig::default();
        assert_eq!(cfg.num_steps, def.num_steps);
        assert_eq!(cfg.learning_rate, def.learning_rate);
        assert_eq!(cfg.optimizer, OptimizerKind::Adam);
        assert!(cfg.lr_decay);
        assert!(!cfg.from_scratch);
        assert_eq!(cfg.max_to_keep, 5);
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "fcn-segmentation", "train",
            "--optimizer", "momentum",
            "--lr-decay", "false",
            "--num-classes", "5",
            "--from-scratch",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.optimizer, OptimizerKind::Momentum);
        assert!(!cfg.lr_decay);
        assert_eq!(cfg.num_classes, 5);
        assert!(cfg.from_scratch);
    }

    #[test]
    fn test_unknown_mode_and_optimizer_are_rejected() {
        assert!(Cli::try_parse_from(["fcn-segmentation", "test"]).is_err());
        assert!(Cli::try_parse_from(["fcn-segmentation", "train", "--optimizer", "rmsprop"]).is_err());
    }

    #[test]
    fn test_valid_args() {
        let cli = Cli::try_parse_from(["fcn-segmentation", "valid", "--log-dir", "runs/a"]).unwrap();
        let Commands::Valid(args) = cli.command else { panic!("expected valid") };
        let cfg: ValidConfig = args.into();
        assert_eq!(cfg.log_dir, "runs/a");
        assert_eq!(cfg.iou_label, 2);
        assert!(cfg.data_dir.is_none());
    }
}
