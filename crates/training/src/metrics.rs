use std::fs;
use std::path::Path;

use crate::TrainingError;

/// What one training run reports on the test segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMetrics {
    pub slot_f1: f64,
    pub intent_acc: f64,
}

impl RunMetrics {
    /// Parses `"<slot_f1> <intent_acc>"`; any amount of whitespace separates
    /// the two values and nothing else may follow them.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let mut fields = contents.split_whitespace();
        let slot_f1 = parse_field(fields.next(), "slot F1")?;
        let intent_acc = parse_field(fields.next(), "intent accuracy")?;
        if let Some(extra) = fields.next() {
            return Err(format!("unexpected trailing value '{}'", extra));
        }
        Ok(Self {
            slot_f1,
            intent_acc,
        })
    }
}

fn parse_field(field: Option<&str>, name: &str) -> Result<f64, String> {
    let raw = field.ok_or_else(|| format!("missing {}", name))?;
    let value = raw
        .parse::<f64>()
        .map_err(|err| format!("invalid {} '{}': {}", name, raw, err))?;
    if !value.is_finite() {
        return Err(format!("{} must be finite, got {}", name, raw));
    }
    Ok(value)
}

/// Reads the results file a run leaves in its save directory.
pub fn read_run_metrics(path: &Path) -> Result<RunMetrics, TrainingError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| TrainingError::malformed_results(path, format!("cannot read: {err}")))?;
    RunMetrics::parse(&contents).map_err(|reason| TrainingError::malformed_results(path, reason))
}

/// Mean and population standard deviation of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub mean: f64,
    pub std: f64,
}

impl MetricStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|sample| (sample - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(Self {
            mean,
            std: variance.sqrt(),
        })
    }
}

/// Collects the per-seed metrics of one `(alpha, gamma, dataset)` point.
#[derive(Debug, Default)]
pub struct SeedMetrics {
    slot_f1: Vec<f64>,
    intent_acc: Vec<f64>,
}

impl SeedMetrics {
    pub fn update(&mut self, metrics: RunMetrics) {
        self.slot_f1.push(metrics.slot_f1);
        self.intent_acc.push(metrics.intent_acc);
    }

    pub fn runs(&self) -> usize {
        self.slot_f1.len()
    }

    pub fn finalize(self) -> Option<DatasetSummary> {
        Some(DatasetSummary {
            slot_f1: MetricStats::from_samples(&self.slot_f1)?,
            intent_acc: MetricStats::from_samples(&self.intent_acc)?,
            runs: self.slot_f1.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetSummary {
    pub slot_f1: MetricStats,
    pub intent_acc: MetricStats,
    pub runs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_whitespace_separated_values() {
        let metrics = RunMetrics::parse("0.8732 \t0.9541\n").unwrap();
        assert_eq!(metrics.slot_f1, 0.8732);
        assert_eq!(metrics.intent_acc, 0.9541);
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert!(RunMetrics::parse("").is_err());
        assert!(RunMetrics::parse("0.5").is_err());
        assert!(RunMetrics::parse("0.5 0.6 0.7").is_err());
        assert!(RunMetrics::parse("0.5 nope").is_err());
        assert!(RunMetrics::parse("0.5 NaN").is_err());
    }

    #[test]
    fn population_standard_deviation() {
        let stats = MetricStats::from_samples(&[0.8, 0.9, 1.0]).unwrap();
        assert!((stats.mean - 0.9).abs() < 1e-12);
        assert!((stats.std - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);

        let single = MetricStats::from_samples(&[0.42]).unwrap();
        assert_eq!(single.std, 0.0);
        assert!(MetricStats::from_samples(&[]).is_none());
    }

    #[test]
    fn seed_metrics_finalize() {
        let mut seeds = SeedMetrics::default();
        assert!(SeedMetrics::default().finalize().is_none());
        seeds.update(RunMetrics {
            slot_f1: 0.9,
            intent_acc: 0.5,
        });
        seeds.update(RunMetrics {
            slot_f1: 0.7,
            intent_acc: 0.5,
        });
        assert_eq!(seeds.runs(), 2);
        let summary = seeds.finalize().unwrap();
        assert!((summary.slot_f1.mean - 0.8).abs() < 1e-12);
        assert!((summary.slot_f1.std - 0.1).abs() < 1e-12);
        assert_eq!(summary.intent_acc.std, 0.0);
        assert_eq!(summary.runs, 2);
    }
}
