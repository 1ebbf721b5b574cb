//! Grid search over the focal loss hyperparameters.
//!
//! Every `(alpha, gamma)` pair is trained on every dataset with every seed by
//! an external program. Each run writes its test metrics into the shared save
//! directory, which is read back and aggregated across seeds into one row of
//! the results table.

pub mod report;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info};

use crate::{
    config::{SweepConfig, TrainerConfig},
    metrics::{read_run_metrics, DatasetSummary, SeedMetrics},
    TrainingError,
};

pub use report::{format_row, header, ResultsWriter};

/// One training run of the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSpec {
    pub alpha: f64,
    pub gamma: f64,
    pub dataset: String,
    pub seed: u64,
}

impl TrialSpec {
    /// Per-run flags appended after the configured trainer arguments.
    pub fn trainer_flags(&self, trainer: &TrainerConfig, save_dir: &Path) -> Vec<String> {
        let mut flags = vec![
            "--gpu".to_string(),
            trainer.gpu.to_string(),
            "--dataset".to_string(),
            self.dataset.clone(),
            "--seed".to_string(),
            self.seed.to_string(),
        ];
        if trainer.use_focal {
            flags.push("--use-focal".to_string());
        }
        flags.extend([
            "--focal-alpha".to_string(),
            self.alpha.to_string(),
            "--focal-gamma".to_string(),
            self.gamma.to_string(),
            "--save-dir".to_string(),
            save_dir.display().to_string(),
        ]);
        flags
    }

    /// The full command line, for logs and dry runs.
    pub fn command_line(&self, trainer: &TrainerConfig, save_dir: &Path) -> String {
        std::iter::once(trainer.program.clone())
            .chain(trainer.args.iter().cloned())
            .chain(self.trainer_flags(trainer, save_dir))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Every trial in execution order: alpha, then gamma, then dataset, then seed.
pub fn plan_trials(config: &SweepConfig) -> Vec<TrialSpec> {
    let mut trials = Vec::with_capacity(config.total_runs());
    for &alpha in &config.grid.alphas {
        for &gamma in &config.grid.gammas {
            for dataset in &config.datasets {
                for &seed in &config.grid.seeds {
                    trials.push(TrialSpec {
                        alpha,
                        gamma,
                        dataset: dataset.clone(),
                        seed,
                    });
                }
            }
        }
    }
    trials
}

/// Executes one trial and blocks until it has finished.
pub trait TrialRunner {
    fn run(&mut self, trial: &TrialSpec, save_dir: &Path) -> Result<(), TrainingError>;
}

/// Launches the configured trainer as a child process and waits for it.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    trainer: TrainerConfig,
}

impl ProcessRunner {
    pub fn new(trainer: TrainerConfig) -> Self {
        Self { trainer }
    }
}

impl TrialRunner for ProcessRunner {
    fn run(&mut self, trial: &TrialSpec, save_dir: &Path) -> Result<(), TrainingError> {
        let command_line = trial.command_line(&self.trainer, save_dir);
        let mut command = Command::new(&self.trainer.program);
        command
            .args(&self.trainer.args)
            .args(trial.trainer_flags(&self.trainer, save_dir));
        if let Some(dir) = self.trainer.working_dir.as_ref() {
            command.current_dir(dir);
        }

        debug!(command = %command_line, "launching training run");
        let status = command
            .status()
            .map_err(|err| TrainingError::process(&command_line, format!("failed to spawn: {err}")))?;
        if !status.success() {
            let reason = match status.code() {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            };
            return Err(TrainingError::process(command_line, reason));
        }
        Ok(())
    }
}

/// Aggregated metrics of one `(alpha, gamma)` grid point, one summary per
/// dataset in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub alpha: f64,
    pub gamma: f64,
    pub summaries: Vec<(String, DatasetSummary)>,
}

/// Runs the whole sweep, writing `config.output.results_file` as it goes.
///
/// Any failed run or unreadable result aborts the sweep; rows already
/// written stay on disk.
pub fn run_sweep(
    config: &SweepConfig,
    runner: &mut dyn TrialRunner,
) -> Result<Vec<GridPoint>, TrainingError> {
    let save_dir = prepare_save_dir(&config.output.save_dir)?;
    let run_results = save_dir.join(&config.output.run_results_name);
    let mut writer = ResultsWriter::create(&config.output.results_file, &config.datasets)?;

    info!(
        runs = config.total_runs(),
        save_dir = %save_dir.display(),
        results = %writer.path().display(),
        "starting focal loss sweep"
    );

    let mut points = Vec::new();
    let mut completed = 0usize;
    for &alpha in &config.grid.alphas {
        for &gamma in &config.grid.gammas {
            let mut summaries = Vec::with_capacity(config.datasets.len());
            for dataset in &config.datasets {
                let mut seeds = SeedMetrics::default();
                for &seed in &config.grid.seeds {
                    let trial = TrialSpec {
                        alpha,
                        gamma,
                        dataset: dataset.clone(),
                        seed,
                    };
                    remove_stale(&run_results)?;
                    runner.run(&trial, &save_dir)?;
                    let metrics = read_run_metrics(&run_results)?;
                    completed += 1;
                    info!(
                        alpha,
                        gamma,
                        dataset = dataset.as_str(),
                        seed,
                        slot_f1 = metrics.slot_f1,
                        intent_acc = metrics.intent_acc,
                        "run {}/{} finished",
                        completed,
                        config.total_runs()
                    );
                    seeds.update(metrics);
                }
                let summary = seeds.finalize().ok_or_else(|| {
                    TrainingError::runtime(format!("no runs recorded for dataset {dataset}"))
                })?;
                summaries.push((dataset.clone(), summary));
            }

            let row: Vec<DatasetSummary> = summaries.iter().map(|(_, s)| *s).collect();
            writer.write_row(alpha, gamma, &row)?;
            points.push(GridPoint {
                alpha,
                gamma,
                summaries,
            });
        }
    }

    info!(rows = points.len(), "sweep complete");
    Ok(points)
}

fn prepare_save_dir(dir: &Path) -> Result<PathBuf, TrainingError> {
    fs::create_dir_all(dir).map_err(|err| {
        TrainingError::runtime(format!(
            "failed to create save directory {}: {err}",
            dir.display()
        ))
    })?;
    Ok(fs::canonicalize(dir)?)
}

fn remove_stale(path: &Path) -> Result<(), TrainingError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
