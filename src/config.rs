use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::validate_config;
use crate::error::{Error, Result};
use crate::models::SimConfig;

#[derive(Parser, Debug)]
#[command(
    name = "checkpoint-sim",
    about = "Discrete-event simulation of a five-block venue entrance"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replicate a whole day of three time slots.
    Finite(FiniteArgs),
    /// Batch means on one time slot held fixed.
    Infinite(InfiniteArgs),
    /// Print the effective configuration.
    ShowConfig(ShowConfigArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML or JSON configuration; built-in tables when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
    /// Write the report here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct FiniteArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long)]
    pub repetitions: Option<usize>,
    #[arg(long, help = "Seconds between response-time samples of the first repetition")]
    pub sample_interval: Option<f64>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InfiniteArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Time slot to hold fixed (0-based).
    #[arg(long)]
    pub slot: usize,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub batches: Option<usize>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ShowConfigArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Experiment {
    Finite,
    Infinite { slot: usize },
    ShowConfig,
}

/// A fully resolved command line: validated configuration plus what to do
/// with it and where the report goes.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub config: SimConfig,
    pub experiment: Experiment,
    pub format: FormatArg,
    pub output: Option<PathBuf>,
}

pub fn parse_args() -> Result<Args> {
    Args::try_parse().map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => Error::Cli(e.to_string()),
    })
}

pub fn load_config(path: &Path) -> Result<SimConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(ext.to_string())),
    }
}

fn base_config(args: &ConfigArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(config)
}

/// Loads the configuration, applies command-line overrides and validates
/// the result.
pub fn build_config(args: Args) -> Result<RunPlan> {
    let plan = match args.command {
        Command::Finite(finite) => {
            let mut config = base_config(&finite.config)?;
            if let Some(repetitions) = finite.repetitions {
                config.finite.repetitions = repetitions;
            }
            if let Some(interval) = finite.sample_interval {
                config.finite.sample_interval = Some(interval);
            }
            RunPlan {
                config,
                experiment: Experiment::Finite,
                format: finite.output.format,
                output: finite.output.output,
            }
        }
        Command::Infinite(infinite) => {
            let mut config = base_config(&infinite.config)?;
            if let Some(size) = infinite.batch_size {
                config.batch.size = size;
            }
            if let Some(count) = infinite.batches {
                config.batch.count = count;
            }
            RunPlan {
                config,
                experiment: Experiment::Infinite {
                    slot: infinite.slot,
                },
                format: infinite.output.format,
                output: infinite.output.output,
            }
        }
        Command::ShowConfig(show) => RunPlan {
            config: base_config(&show.config)?,
            experiment: Experiment::ShowConfig,
            format: show.output.format,
            output: show.output.output,
        },
    };
    validate_config(&plan.config)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn finite_overrides_apply_on_top_of_defaults() {
        let plan = build_config(parse(&[
            "checkpoint-sim",
            "finite",
            "--repetitions",
            "3",
            "--seed",
            "9",
            "--format",
            "json",
        ]))
        .unwrap();
        assert_eq!(plan.experiment, Experiment::Finite);
        assert_eq!(plan.config.finite.repetitions, 3);
        assert_eq!(plan.config.seed, 9);
        assert_eq!(plan.format, FormatArg::Json);
        assert!(plan.output.is_none());
    }

    #[test]
    fn infinite_requires_slot() {
        assert!(Args::try_parse_from(["checkpoint-sim", "infinite"]).is_err());
        let plan = build_config(parse(&[
            "checkpoint-sim",
            "infinite",
            "--slot",
            "2",
            "--batch-size",
            "16",
            "--batches",
            "5",
        ]))
        .unwrap();
        assert_eq!(plan.experiment, Experiment::Infinite { slot: 2 });
        assert_eq!(plan.config.batch.size, 16);
        assert_eq!(plan.config.batch.count, 5);
    }

    #[test]
    fn zero_repetitions_are_rejected() {
        let err = build_config(parse(&["checkpoint-sim", "finite", "--repetitions", "0"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "repetitions must be greater than 0");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_config(Path::new("venue.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigIo(_)));

        let path = std::env::temp_dir().join(format!("checkpoint-sim-{}.yaml", std::process::id()));
        fs::write(&path, "seed: 1").unwrap();
        let err = load_config(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert_eq!(err.to_string(), "unsupported config format 'yaml'");
    }

    #[test]
    fn default_config_survives_a_toml_round_trip() {
        let text = toml::to_string(&SimConfig::default()).unwrap();
        let path = std::env::temp_dir().join(format!("checkpoint-sim-{}.toml", std::process::id()));
        fs::write(&path, text).unwrap();
        let loaded = load_config(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded.slots.len(), 3);
        assert_eq!(loaded.slots[1].servers.ticket_purchase, 44);
        assert_eq!(loaded.routing.exit_pct, 5.0);
    }
}
