use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

/// Hyperparameter sweep over the focal loss `alpha`/`gamma` grid.
///
/// `Default` is the published experiment: four alphas, three gammas,
/// three seeds, ATIS and SNIPS, trained by `python3 demo.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default = "default_datasets")]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            datasets: default_datasets(),
            trainer: TrainerConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config: SweepConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(TrainingError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.apply_base_path(base_dir);
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        Self::from_path(path)
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        let mut errors = Vec::new();

        if self.grid.alphas.is_empty() {
            errors.push("grid.alphas must not be empty".to_string());
        }
        if self.grid.alphas.iter().any(|alpha| !alpha.is_finite()) {
            errors.push("grid.alphas must be finite".to_string());
        }

        if self.grid.gammas.is_empty() {
            errors.push("grid.gammas must not be empty".to_string());
        }
        if self
            .grid
            .gammas
            .iter()
            .any(|gamma| !gamma.is_finite() || *gamma < 0.0)
        {
            errors.push("grid.gammas must be finite and >= 0".to_string());
        }

        if self.grid.seeds.is_empty() {
            errors.push("grid.seeds must not be empty".to_string());
        }

        if self.datasets.is_empty() {
            errors.push("datasets must not be empty".to_string());
        }
        for name in &self.datasets {
            if slu_data::registry::lookup(name).is_err() {
                errors.push(format!(
                    "datasets entry '{}' is not one of: {}",
                    name,
                    slu_data::registry::registered_names()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }

        if self.trainer.program.trim().is_empty() {
            errors.push("trainer.program must not be empty".to_string());
        }

        if self.output.save_dir.as_os_str().is_empty() {
            errors.push("output.save_dir must not be empty".to_string());
        }
        if self.output.results_file.as_os_str().is_empty() {
            errors.push("output.results_file must not be empty".to_string());
        }
        if self.output.run_results_name.trim().is_empty() {
            errors.push("output.run_results_name must not be empty".to_string());
        }

        if !errors.is_empty() {
            return Err(TrainingError::validation(errors));
        }

        Ok(())
    }

    /// Number of training runs the sweep will launch.
    pub fn total_runs(&self) -> usize {
        self.grid.alphas.len() * self.grid.gammas.len() * self.datasets.len() * self.grid.seeds.len()
    }

    /// Writes the effective configuration to
    /// [`OutputConfig::resolved_config_path`]. Refuses to overwrite `source`,
    /// the file the configuration was loaded from.
    pub fn save_resolved(&self, source: Option<&Path>) -> Result<PathBuf, TrainingError> {
        let target = self.output.resolved_config_path();
        if let Some(source) = source {
            if same_file(source, &target) {
                return Err(TrainingError::runtime(format!(
                    "resolved config path {} is the input config; rename output.results_file",
                    target.display()
                )));
            }
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|err| TrainingError::runtime(format!("failed to serialize config: {err}")))?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)?;
        Ok(target)
    }

    fn apply_base_path(&mut self, base: &Path) {
        self.trainer.apply_base_path(base);
        self.output.apply_base_path(base);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_alphas")]
    pub alphas: Vec<f64>,
    #[serde(default = "default_gammas")]
    pub gammas: Vec<f64>,
    #[serde(default = "default_seeds")]
    pub seeds: Vec<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            alphas: default_alphas(),
            gammas: default_gammas(),
            seeds: default_seeds(),
        }
    }
}

/// How to launch one external training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the per-run flags, typically the script path.
    #[serde(default = "default_trainer_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub gpu: u32,
    #[serde(default = "default_use_focal")]
    pub use_focal: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_trainer_args(),
            gpu: 0,
            use_focal: default_use_focal(),
            working_dir: None,
        }
    }
}

impl TrainerConfig {
    fn apply_base_path(&mut self, base: &Path) {
        if let Some(dir) = self.working_dir.as_mut() {
            absolutize_in_place(dir, base);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory handed to every run; reused across runs.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Aggregated table, one row per grid point.
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
    /// File each run writes inside `save_dir`.
    #[serde(default = "default_run_results_name")]
    pub run_results_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            results_file: default_results_file(),
            run_results_name: default_run_results_name(),
        }
    }
}

impl OutputConfig {
    fn apply_base_path(&mut self, base: &Path) {
        absolutize_in_place(&mut self.save_dir, base);
        absolutize_in_place(&mut self.results_file, base);
    }

    pub fn run_results_path(&self) -> PathBuf {
        self.save_dir.join(&self.run_results_name)
    }

    /// `<results stem>.resolved.toml`, next to the results table.
    pub fn resolved_config_path(&self) -> PathBuf {
        self.results_file.with_extension("resolved.toml")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_stdout: default_enable_stdout(),
            filter: default_log_filter(),
        }
    }
}

fn absolutize_in_place(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn default_alphas() -> Vec<f64> {
    vec![5.0, 10.0, 20.0, 50.0]
}

fn default_gammas() -> Vec<f64> {
    vec![1.0, 1.5, 2.0]
}

fn default_seeds() -> Vec<u64> {
    vec![123, 231, 321]
}

fn default_datasets() -> Vec<String> {
    vec!["atis".to_string(), "snips".to_string()]
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_trainer_args() -> Vec<String> {
    vec!["demo.py".to_string()]
}

fn default_use_focal() -> bool {
    true
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("tune_exp")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("tune_focal_exp.txt")
}

fn default_run_results_name() -> String {
    "test_error.txt".to_string()
}

fn default_enable_stdout() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug)]
pub enum TrainingError {
    Io(std::io::Error),
    ConfigFormat(String),
    Validation(Vec<String>),
    Initialization(String),
    Runtime(String),
    Process { command: String, reason: String },
    MalformedResults { path: PathBuf, reason: String },
}

impl TrainingError {
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn validation(messages: Vec<String>) -> Self {
        Self::Validation(messages)
    }

    pub fn process(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_results(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedResults {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::Io(err) => write!(f, "io error: {}", err),
            TrainingError::ConfigFormat(err) => write!(f, "failed to parse config: {}", err),
            TrainingError::Validation(messages) => {
                write!(f, "invalid configuration: {}", messages.join("; "))
            }
            TrainingError::Initialization(msg) => write!(f, "initialization failed: {}", msg),
            TrainingError::Runtime(msg) => write!(f, "runtime error: {}", msg),
            TrainingError::Process { command, reason } => {
                write!(f, "training run `{}` failed: {}", command, reason)
            }
            TrainingError::MalformedResults { path, reason } => {
                write!(f, "bad run results at {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(value: std::io::Error) -> Self {
        TrainingError::Io(value)
    }
}

impl From<toml::de::Error> for TrainingError {
    fn from(value: toml::de::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(value: serde_json::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_published_grid() {
        let config = SweepConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grid.alphas, vec![5.0, 10.0, 20.0, 50.0]);
        assert_eq!(config.grid.gammas, vec![1.0, 1.5, 2.0]);
        assert_eq!(config.grid.seeds, vec![123, 231, 321]);
        assert_eq!(config.datasets, vec!["atis", "snips"]);
        assert_eq!(config.total_runs(), 72);
        assert_eq!(
            config.output.run_results_path(),
            PathBuf::from("tune_exp").join("test_error.txt")
        );
    }

    #[test]
    fn toml_file_overrides_and_resolves_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(
            &path,
            r#"
datasets = ["snips"]

[grid]
alphas = [1.0]
gammas = [0.0, 2.0]

[trainer]
program = "python"
args = ["train.py", "--epochs", "3"]
gpu = 1

[output]
save_dir = "runs/focal"
"#,
        )
        .unwrap();

        let config = SweepConfig::load(&path).unwrap();
        assert_eq!(config.grid.seeds, vec![123, 231, 321]);
        assert_eq!(config.trainer.gpu, 1);
        assert_eq!(config.total_runs(), 6);
        assert_eq!(config.output.save_dir, dir.path().join("runs/focal"));
        assert_eq!(
            config.output.results_file,
            dir.path().join("tune_focal_exp.txt")
        );
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = SweepConfig::default();
        config.grid.gammas = vec![-1.0];
        config.grid.seeds.clear();
        config.datasets = vec!["mnist".to_string()];

        match config.validate() {
            Err(TrainingError::Validation(messages)) => {
                assert_eq!(messages.len(), 3, "{messages:?}");
                assert!(messages.iter().any(|m| m.contains("mnist")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn resolved_config_never_replaces_the_input_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tune_focal_exp.toml");
        let original = "# my sweep notes\ndatasets = [\"atis\"]\n\n[trainer]\nprogram = \"true\"\n";
        fs::write(&path, original).unwrap();

        let config = SweepConfig::load(&path).unwrap();
        let saved = config.save_resolved(Some(&path)).unwrap();

        assert_eq!(saved, dir.path().join("tune_focal_exp.resolved.toml"));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        let reloaded = SweepConfig::load(&saved).unwrap();
        assert_eq!(reloaded.datasets, vec!["atis"]);
        assert_eq!(reloaded.trainer.program, "true");
    }

    #[test]
    fn resolved_config_refuses_to_overwrite_its_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.resolved.toml");
        fs::write(&path, "[output]\nresults_file = \"sweep.txt\"\n").unwrap();

        let config = SweepConfig::load(&path).unwrap();
        assert_eq!(config.output.resolved_config_path(), path);
        assert!(config.save_resolved(Some(&path)).is_err());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[output]\nresults_file = \"sweep.txt\"\n"
        );
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.yaml");
        fs::write(&path, "grid: {}").unwrap();
        assert!(matches!(
            SweepConfig::load(&path),
            Err(TrainingError::ConfigFormat(_))
        ));
    }
}
