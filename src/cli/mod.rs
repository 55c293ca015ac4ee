// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap, installs logging (into the
// run's log file where there is one) and hands over to Layer 2.

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PretrainArgs, TrainArgs};

use crate::infra::logging;

#[derive(Parser, Debug)]
#[command(
    name = "fair-graph-rec",
    version = "0.1.0",
    about = "Fairness-constrained LightGCN training with graph augmentation and an HSIC information bottleneck."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Pretrain(args) => run_pretrain(args),
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_pretrain(args: PretrainArgs) -> Result<()> {
    use crate::application::pretrain_use_case::PretrainUseCase;

    let use_case = PretrainUseCase::new(args.into())?;
    logging::init(Some(&use_case.paths().log))?;

    let outcome = use_case.execute()?;
    println!(
        "Pretraining finished after {} epochs. Checkpoint: {}",
        outcome.epochs_run,
        use_case.paths().checkpoint.display()
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let use_case = TrainUseCase::new(args.into())?;
    logging::init(Some(&use_case.paths().log))?;

    let outcome = use_case.execute()?;
    match (&outcome.best_report, outcome.best_epoch) {
        (Some(report), Some(epoch)) => println!("Best epoch {epoch}: {report}"),
        _ => println!("No epoch improved on the initial NDCG@10."),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    logging::init(None)?;
    let report = EvaluateUseCase::new(args.into())?.execute()?;
    println!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::ml::backend::Accelerator;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["fair-graph-rec", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(TrainConfig::from(args), TrainConfig::default());
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "fair-graph-rec", "train",
            "--lareg", "0.2", "--ib-reg", "10", "--device", "wgpu", "--seed", "7",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);
        assert_eq!(cfg.lareg, 0.2);
        assert_eq!(cfg.ib_reg, 10.0);
        assert_eq!(cfg.device, Accelerator::Wgpu);
        assert_eq!(cfg.seed, Some(7));
    }

    #[test]
    fn test_evaluate_cutoffs() {
        let cli = Cli::try_parse_from([
            "fair-graph-rec", "evaluate", "--checkpoint", "param/x", "--cutoffs", "5,50",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.cutoffs, vec![5, 50]);
    }

    #[test]
    fn test_evaluate_requires_checkpoint() {
        assert!(Cli::try_parse_from(["fair-graph-rec", "evaluate"]).is_err());
    }
}
