use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use serde_json::{Number, Value};
use training::{
    init_logging, plan_trials, run_sweep, LoggingSettings, ProcessRunner, SweepConfig,
    TrainingError,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("sweep failed: {}", err);
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Focal loss alpha/gamma sweep over ATIS and SNIPS", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Sweep config file (TOML or JSON); built-in grid when omitted"
    )]
    config: Option<PathBuf>,

    #[arg(
        long = "override",
        value_name = "KEY=VALUE",
        help = "Override configuration value using dot-separated paths"
    )]
    overrides: Vec<OverrideArg>,

    #[arg(long, help = "Print the planned training commands without running them")]
    dry_run: bool,
}

#[derive(Debug, Clone)]
struct OverrideArg {
    path: String,
    value: String,
}

impl FromStr for OverrideArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, value) = s
            .split_once('=')
            .ok_or_else(|| "override must be in the form key=value".to_string())?;
        if path.trim().is_empty() {
            return Err("override key must not be empty".into());
        }
        Ok(Self {
            path: path.trim().to_string(),
            value: value.trim().to_string(),
        })
    }
}

fn run() -> Result<(), TrainingError> {
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => SweepConfig::load(path)?,
        None => SweepConfig::default(),
    };
    if !args.overrides.is_empty() {
        config = apply_overrides(config, &args.overrides)?;
    }
    config.validate()?;

    init_logging(&LoggingSettings::from_config(&config.logging))?;

    if args.dry_run {
        for trial in plan_trials(&config) {
            println!(
                "{}",
                trial.command_line(&config.trainer, &config.output.save_dir)
            );
        }
        println!(
            "{} runs planned; results would be written to {}",
            config.total_runs(),
            config.output.results_file.display()
        );
        return Ok(());
    }

    let config_path = config.save_resolved(args.config.as_deref())?;
    tracing::info!(path = %config_path.display(), "saved sweep config");

    let mut runner = ProcessRunner::new(config.trainer.clone());
    let points = run_sweep(&config, &mut runner)?;
    println!(
        "sweep complete: {} grid points written to {}",
        points.len(),
        config.output.results_file.display()
    );
    Ok(())
}

fn apply_overrides(
    config: SweepConfig,
    overrides: &[OverrideArg],
) -> Result<SweepConfig, TrainingError> {
    let mut value = serde_json::to_value(config).map_err(|err| {
        TrainingError::runtime(format!("failed to serialize config for overrides: {err}"))
    })?;

    for override_arg in overrides {
        let new_value = parse_override_value(&override_arg.value);
        let segments = parse_path(&override_arg.path)?;
        assign_at_path(&mut value, &segments, new_value)?;
    }

    serde_json::from_value(value).map_err(|err| {
        TrainingError::runtime(format!(
            "failed to deserialize config after overrides: {err}"
        ))
    })
}

fn parse_override_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(int_val) = trimmed.parse::<i64>() {
        return Value::Number(Number::from(int_val));
    }
    if let Ok(float_val) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(float_val) {
            return Value::Number(number);
        }
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(json_val) = serde_json::from_str::<Value>(trimmed) {
            return json_val;
        }
    }
    Value::String(trimmed.to_string())
}

#[derive(Debug)]
struct PathSegment {
    key: String,
    index: Option<usize>,
}

fn parse_path(path: &str) -> Result<Vec<PathSegment>, TrainingError> {
    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                return Err(TrainingError::runtime(format!(
                    "empty segment in override path '{}'",
                    path
                )));
            }
            match segment.split_once('[') {
                Some((key, idx_part)) => {
                    let idx_str = idx_part.trim_end_matches(']');
                    let index = idx_str.parse::<usize>().map_err(|err| {
                        TrainingError::runtime(format!(
                            "invalid index in override path '{}': {}",
                            segment, err
                        ))
                    })?;
                    Ok(PathSegment {
                        key: key.to_string(),
                        index: Some(index),
                    })
                }
                None => Ok(PathSegment {
                    key: segment.to_string(),
                    index: None,
                }),
            }
        })
        .collect()
}

fn assign_at_path(
    target: &mut Value,
    segments: &[PathSegment],
    new_value: Value,
) -> Result<(), TrainingError> {
    let Some((segment, rest)) = segments.split_first() else {
        *target = new_value;
        return Ok(());
    };

    if target.is_null() {
        *target = Value::Object(serde_json::Map::new());
    }
    let map = target.as_object_mut().ok_or_else(|| {
        TrainingError::runtime(format!(
            "override path segment '{}' points to non-object value",
            segment.key
        ))
    })?;
    let entry = map.entry(segment.key.clone()).or_insert(Value::Null);

    match segment.index {
        Some(array_index) => {
            if entry.is_null() {
                *entry = Value::Array(Vec::new());
            }
            let array = entry.as_array_mut().ok_or_else(|| {
                TrainingError::runtime(format!(
                    "override path segment '{}' expects array value",
                    segment.key
                ))
            })?;
            if array.len() <= array_index {
                array.resize(array_index + 1, Value::Null);
            }
            assign_at_path(&mut array[array_index], rest, new_value)
        }
        None => assign_at_path(entry, rest, new_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[&str]) -> Vec<OverrideArg> {
        pairs.iter().map(|raw| raw.parse().unwrap()).collect()
    }

    #[test]
    fn overrides_reach_nested_fields() {
        let config = apply_overrides(
            SweepConfig::default(),
            &overrides(&[
                "grid.alphas=[1, 2.5]",
                "grid.seeds[1]=7",
                "trainer.gpu=3",
                "datasets=[\"snips\"]",
                "output.save_dir=runs/focal",
            ]),
        )
        .unwrap();

        assert_eq!(config.grid.alphas, vec![1.0, 2.5]);
        assert_eq!(config.grid.seeds, vec![123, 7, 321]);
        assert_eq!(config.trainer.gpu, 3);
        assert_eq!(config.datasets, vec!["snips"]);
        assert_eq!(config.output.save_dir, PathBuf::from("runs/focal"));
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!("no-equals-sign".parse::<OverrideArg>().is_err());
        assert!("=1".parse::<OverrideArg>().is_err());
        assert!(apply_overrides(SweepConfig::default(), &overrides(&["grid..alphas=1"])).is_err());
        assert!(apply_overrides(SweepConfig::default(), &overrides(&["trainer.gpu=gpu0"])).is_err());
    }
}
