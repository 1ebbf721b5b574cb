pub mod config;
pub mod logging;
pub mod loss;
pub mod metrics;
pub mod sweep;

pub use config::{SweepConfig, TrainingError};
pub use logging::{init_logging, LoggingSettings};
pub use loss::{Loss, SoftmaxCrossEntropyLoss, SoftmaxFocalLoss};
pub use metrics::{read_run_metrics, DatasetSummary, MetricStats, RunMetrics, SeedMetrics};
pub use sweep::{plan_trials, run_sweep, GridPoint, ProcessRunner, TrialRunner, TrialSpec};
