use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::models::{BlockKind, PerBlock, SimConfig};
use crate::stats::{Estimate, FiniteReport, InfiniteReport, WindowStats};

/// What a command produced.
pub enum Report {
    Finite(FiniteReport),
    Infinite(InfiniteReport),
    Config(SimConfig),
}

pub trait Formatter {
    fn write(&self, report: &Report) -> Result<String>;
}

pub struct HumanFormatter;
pub struct JsonFormatter;
pub struct CsvFormatter;

impl Formatter for HumanFormatter {
    fn write(&self, report: &Report) -> Result<String> {
        match report {
            Report::Finite(finite) => Ok(human_finite(finite)),
            Report::Infinite(infinite) => Ok(human_infinite(infinite)),
            Report::Config(config) => {
                toml::to_string_pretty(config).map_err(|err| Error::Output(err.to_string()))
            }
        }
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, report: &Report) -> Result<String> {
        let json = match report {
            Report::Finite(finite) => serde_json::to_string_pretty(finite),
            Report::Infinite(infinite) => serde_json::to_string_pretty(infinite),
            Report::Config(config) => serde_json::to_string_pretty(config),
        };
        json.map(|mut text| {
            text.push('\n');
            text
        })
        .map_err(|err| Error::Output(err.to_string()))
    }
}

impl Formatter for CsvFormatter {
    fn write(&self, report: &Report) -> Result<String> {
        let mut out = String::new();
        match report {
            Report::Finite(finite) => {
                out.push_str("repetition,slot,start,end,arrivals,response_time,loss_probability");
                push_block_columns(&mut out);
                for rep in &finite.repetitions {
                    for (slot, window) in rep.slots.iter().enumerate() {
                        let _ = write!(out, "{},{},", rep.index, slot);
                        push_window_row(&mut out, window);
                    }
                }
            }
            Report::Infinite(infinite) => {
                out.push_str("batch,start,end,arrivals,response_time,loss_probability");
                push_block_columns(&mut out);
                for (batch, window) in infinite.batches.iter().enumerate() {
                    let _ = write!(out, "{},", batch);
                    push_window_row(&mut out, window);
                }
            }
            Report::Config(config) => {
                out.push_str("slot,duration,arrival_rate");
                push_block_columns(&mut out);
                for (idx, slot) in config.slots.iter().enumerate() {
                    let _ = write!(out, "{},{},{}", idx, slot.duration, slot.arrival_rate);
                    for (_, servers) in slot.servers.iter() {
                        let _ = write!(out, ",{}", servers);
                    }
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }
}

fn push_block_columns(out: &mut String) {
    for kind in BlockKind::ALL {
        let _ = write!(out, ",{}", kind);
    }
    out.push('\n');
}

fn push_window_row(out: &mut String, window: &WindowStats) {
    let _ = write!(
        out,
        "{:.3},{:.3},{},{:.6},{:.6}",
        window.start, window.end, window.arrivals, window.response_time, window.loss_probability
    );
    for (_, utilization) in window.utilization.iter() {
        let _ = write!(out, ",{:.6}", utilization);
    }
    out.push('\n');
}

fn fmt_estimate(estimate: &Estimate) -> String {
    format!("{:.4} ± {:.4}", estimate.mean, estimate.half_width)
}

fn fmt_utilization(values: &PerBlock<f64>) -> String {
    values
        .iter()
        .map(|(kind, value)| format!("{}={:.4}", kind, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn human_finite(report: &FiniteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Finite horizon:");
    let _ = writeln!(out, "seed: {}", report.seed);
    let _ = writeln!(out, "repetitions: {}", report.repetitions.len());
    let _ = writeln!(out, "mean_cost: {:.2}", report.mean_cost);
    let _ = writeln!(out, "planned_cost: {:.2}", report.planned_cost);
    let _ = writeln!(out, "Slots:");
    for slot in &report.slots {
        let _ = writeln!(
            out,
            "slot {}: response_time {} loss {}",
            slot.slot,
            fmt_estimate(&slot.response_time),
            fmt_estimate(&slot.loss_probability)
        );
        let _ = writeln!(out, "  utilization: {}", fmt_utilization(&slot.utilization));
    }
    if !report.samples.is_empty() {
        let _ = writeln!(out, "Samples:");
        for sample in &report.samples {
            let _ = writeln!(
                out,
                "t={:.0} slot={} response_time={:.4}",
                sample.time, sample.slot, sample.response_time
            );
        }
    }
    out
}

fn human_infinite(report: &InfiniteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Batch means:");
    let _ = writeln!(out, "seed: {}", report.seed);
    let _ = writeln!(out, "slot: {}", report.slot);
    let _ = writeln!(out, "batch_size: {}", report.batch_size);
    let _ = writeln!(out, "batches: {}", report.batches.len());
    let _ = writeln!(out, "planned_cost: {:.2}", report.planned_cost);
    let _ = writeln!(out, "response_time: {}", fmt_estimate(&report.response_time));
    let _ = writeln!(out, "loss_probability: {}", fmt_estimate(&report.loss_probability));
    let _ = writeln!(out, "Utilization:");
    for (kind, estimate) in report.utilization.iter() {
        let _ = writeln!(out, "{}: {}", kind, fmt_estimate(estimate));
    }
    out
}
