use std::fs;

use checkpoint_sim::config::{self, Experiment, FormatArg};
use checkpoint_sim::error::{Error, Result};
use checkpoint_sim::output::{CsvFormatter, Formatter, HumanFormatter, JsonFormatter, Report};
use checkpoint_sim::runner;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = config::parse_args()?;
    let plan = config::build_config(args)?;

    let report = match plan.experiment {
        Experiment::Finite => Report::Finite(runner::run_finite(plan.config)?),
        Experiment::Infinite { slot } => Report::Infinite(runner::run_infinite(plan.config, slot)?),
        Experiment::ShowConfig => Report::Config(plan.config),
    };

    let formatter = formatter_for(plan.format);
    let output = formatter.write(&report)?;
    match plan.output {
        Some(path) => fs::write(&path, output).map_err(|err| {
            Error::Output(format!(
                "failed to write report '{}': {}",
                path.display(),
                err
            ))
        })?,
        None => print!("{}", output),
    }

    Ok(())
}

fn formatter_for(format: FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
        FormatArg::Csv => Box::new(CsvFormatter),
    }
}
