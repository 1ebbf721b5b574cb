use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    metrics::{DatasetSummary, MetricStats},
    TrainingError,
};

const SEPARATOR: &str = ", ";

/// `alpha, gamma, <ds>-slot-mean, <ds>-slot-std, <ds>-intent-mean, <ds>-intent-std, ...`
pub fn header<S: AsRef<str>>(datasets: &[S]) -> String {
    let mut columns = vec!["alpha".to_string(), "gamma".to_string()];
    for dataset in datasets {
        let dataset = dataset.as_ref();
        for column in ["slot-mean", "slot-std", "intent-mean", "intent-std"] {
            columns.push(format!("{}-{}", dataset, column));
        }
    }
    columns.join(SEPARATOR)
}

/// One grid point; summaries must follow the header's dataset order.
pub fn format_row(alpha: f64, gamma: f64, summaries: &[DatasetSummary]) -> String {
    let mut columns = vec![alpha.to_string(), gamma.to_string()];
    for summary in summaries {
        push_stats(&mut columns, &summary.slot_f1);
        push_stats(&mut columns, &summary.intent_acc);
    }
    columns.join(SEPARATOR)
}

fn push_stats(columns: &mut Vec<String>, stats: &MetricStats) {
    columns.push(percent(stats.mean));
    columns.push(percent(stats.std));
}

fn percent(value: f64) -> String {
    format!("{:.2}", value * 100.0)
}

/// Aggregated sweep table. Every row is flushed as soon as it is written so
/// an interrupted sweep leaves its completed grid points on disk.
pub struct ResultsWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    columns: usize,
}

impl ResultsWriter {
    /// Truncates `path` and writes the header.
    pub fn create<S: AsRef<str>>(path: &Path, datasets: &[S]) -> Result<Self, TrainingError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                TrainingError::runtime(format!(
                    "failed to create results directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let file = File::create(path).map_err(|err| {
            TrainingError::runtime(format!(
                "failed to create results file {}: {err}",
                path.display()
            ))
        })?;

        let mut writer = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            columns: datasets.len(),
        };
        writer.write_line(&header(datasets))?;
        Ok(writer)
    }

    pub fn write_row(
        &mut self,
        alpha: f64,
        gamma: f64,
        summaries: &[DatasetSummary],
    ) -> Result<(), TrainingError> {
        if summaries.len() != self.columns {
            return Err(TrainingError::runtime(format!(
                "row has {} dataset summaries but the header declares {}",
                summaries.len(),
                self.columns
            )));
        }
        self.write_line(&format_row(alpha, gamma, summaries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<(), TrainingError> {
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|err| {
                TrainingError::runtime(format!(
                    "failed to write results file {}: {err}",
                    self.path.display()
                ))
            })
    }
}

impl Drop for ResultsWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary(slot: f64, intent: f64) -> DatasetSummary {
        DatasetSummary {
            slot_f1: MetricStats {
                mean: slot,
                std: 0.0,
            },
            intent_acc: MetricStats {
                mean: intent,
                std: 0.0125,
            },
            runs: 3,
        }
    }

    #[test]
    fn header_lists_every_dataset_in_order() {
        assert_eq!(
            header(&["atis", "snips"]),
            "alpha, gamma, atis-slot-mean, atis-slot-std, atis-intent-mean, atis-intent-std, \
             snips-slot-mean, snips-slot-std, snips-intent-mean, snips-intent-std"
        );
    }

    #[test]
    fn rows_scale_by_one_hundred() {
        let row = format_row(5.0, 1.5, &[summary(0.8732, 0.9541)]);
        assert_eq!(row, "5, 1.5, 87.32, 0.00, 95.41, 1.25");
    }

    #[test]
    fn writer_flushes_each_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.txt");
        let mut writer = ResultsWriter::create(&path, &["atis"]).unwrap();
        writer.write_row(10.0, 2.0, &[summary(0.5, 0.25)]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "10, 2, 50.00, 0.00, 25.00, 1.25");

        assert!(writer.write_row(10.0, 2.0, &[]).is_err());
    }
}
