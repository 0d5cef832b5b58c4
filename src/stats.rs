//! Estimators built from the time-integrated areas kept on the network.

use serde::Serialize;

use crate::engine::RunCounters;
use crate::models::{BlockKind, PerBlock, SimConfig, SECONDS_PER_MONTH};
use crate::state::NetworkStatus;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

/// Cumulative statistics at one instant. Window estimators are the
/// difference of two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Totals {
    pub time: f64,
    pub node_area: f64,
    pub busy: PerBlock<f64>,
    pub online: PerBlock<f64>,
    pub entry_arrivals: u64,
    pub terminal_arrivals: u64,
    pub terminal_lost: u64,
}

impl Totals {
    pub fn capture(network: &NetworkStatus, now: f64) -> Self {
        let terminal = network.block(BlockKind::CredentialCheck);
        Self {
            time: now,
            node_area: network
                .blocks
                .iter()
                .map(|(_, block)| block.node_area())
                .sum(),
            busy: network.blocks.map(|_, block| block.busy_area()),
            online: network.blocks.map(|_, block| block.online_area()),
            entry_arrivals: network.block(BlockKind::TemperatureControl).arrivals,
            terminal_arrivals: terminal.arrivals,
            terminal_lost: terminal.bypassed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowStats {
    pub start: f64,
    pub end: f64,
    pub arrivals: u64,
    /// Mean time a customer spends in the system (total node area over
    /// entry arrivals).
    pub response_time: f64,
    pub utilization: PerBlock<f64>,
    pub loss_probability: f64,
}

impl WindowStats {
    pub fn between(start: &Totals, end: &Totals) -> Self {
        let arrivals = end.entry_arrivals.saturating_sub(start.entry_arrivals);
        let node_area = end.node_area - start.node_area;
        let utilization = PerBlock::from_fn(|kind| {
            let online = end.online.get(kind) - start.online.get(kind);
            let busy = end.busy.get(kind) - start.busy.get(kind);
            ratio(busy, online)
        });
        let terminal_arrivals = end.terminal_arrivals.saturating_sub(start.terminal_arrivals);
        let terminal_lost = end.terminal_lost.saturating_sub(start.terminal_lost);

        Self {
            start: start.time,
            end: end.time,
            arrivals,
            response_time: ratio(node_area, arrivals as f64),
            utilization,
            loss_probability: ratio(terminal_lost as f64, terminal_arrivals as f64),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Sample mean with standard deviation and 95% confidence half-width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Estimate {
    pub mean: f64,
    pub std_dev: f64,
    pub half_width: f64,
    pub samples: usize,
}

impl Estimate {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }
        // Welford
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (idx, value) in samples.iter().enumerate() {
            let delta = value - mean;
            mean += delta / (idx + 1) as f64;
            m2 += delta * (value - mean);
        }
        let std_dev = if n > 1 {
            (m2 / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Self {
            mean,
            std_dev,
            half_width: Z_95 * std_dev / (n as f64).sqrt(),
            samples: n,
        }
    }
}

/// Cost of the servers' actual online time up to `now`.
pub fn online_cost(network: &NetworkStatus, unit_costs: &PerBlock<f64>, now: f64) -> f64 {
    network
        .blocks
        .iter()
        .map(|(kind, block)| {
            let online: f64 = block
                .servers
                .iter()
                .map(|server| server.online_time_at(now))
                .sum();
            unit_costs.get(kind) / SECONDS_PER_MONTH * online
        })
        .sum()
}

/// Cost of keeping the configured servers online for one slot.
pub fn slot_planned_cost(config: &SimConfig, slot: usize) -> f64 {
    let slot_config = config.slot(slot);
    slot_config
        .servers
        .iter()
        .map(|(kind, servers)| {
            config.unit_costs.get(kind) / SECONDS_PER_MONTH
                * *servers as f64
                * slot_config.duration
        })
        .sum()
}

pub fn planned_cost(config: &SimConfig) -> f64 {
    (0..config.slots.len())
        .map(|slot| slot_planned_cost(config, slot))
        .sum()
}

#[derive(Clone, Debug, Serialize)]
pub struct RepetitionResult {
    pub index: usize,
    pub slots: Vec<WindowStats>,
    pub cost: f64,
    pub counters: RunCounters,
    pub entry_arrivals: u64,
    pub event_misses: u64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ResponseSample {
    pub time: f64,
    pub slot: usize,
    pub response_time: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SlotSummary {
    pub slot: usize,
    pub response_time: Estimate,
    pub utilization: PerBlock<f64>,
    pub loss_probability: Estimate,
}

#[derive(Clone, Debug, Serialize)]
pub struct FiniteReport {
    pub seed: u64,
    pub mean_cost: f64,
    pub planned_cost: f64,
    pub slots: Vec<SlotSummary>,
    pub repetitions: Vec<RepetitionResult>,
    pub samples: Vec<ResponseSample>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InfiniteReport {
    pub seed: u64,
    pub slot: usize,
    pub batch_size: usize,
    pub planned_cost: f64,
    pub response_time: Estimate,
    pub utilization: PerBlock<Estimate>,
    pub loss_probability: Estimate,
    pub batches: Vec<WindowStats>,
}

pub fn summarize_finite(
    config: &SimConfig,
    repetitions: Vec<RepetitionResult>,
    samples: Vec<ResponseSample>,
) -> FiniteReport {
    let slot_count = config.slots.len();
    let slots = (0..slot_count)
        .map(|slot| {
            let windows: Vec<&WindowStats> = repetitions
                .iter()
                .filter_map(|rep| rep.slots.get(slot))
                .collect();
            let response: Vec<f64> = windows.iter().map(|w| w.response_time).collect();
            let loss: Vec<f64> = windows.iter().map(|w| w.loss_probability).collect();
            let utilization = PerBlock::from_fn(|kind| {
                let values: Vec<f64> = windows.iter().map(|w| *w.utilization.get(kind)).collect();
                Estimate::from_samples(&values).mean
            });
            SlotSummary {
                slot,
                response_time: Estimate::from_samples(&response),
                utilization,
                loss_probability: Estimate::from_samples(&loss),
            }
        })
        .collect();
    let costs: Vec<f64> = repetitions.iter().map(|rep| rep.cost).collect();

    FiniteReport {
        seed: config.seed,
        mean_cost: Estimate::from_samples(&costs).mean,
        planned_cost: planned_cost(config),
        slots,
        repetitions,
        samples,
    }
}

pub fn summarize_infinite(config: &SimConfig, slot: usize, batches: Vec<WindowStats>) -> InfiniteReport {
    let response: Vec<f64> = batches.iter().map(|b| b.response_time).collect();
    let loss: Vec<f64> = batches.iter().map(|b| b.loss_probability).collect();
    let utilization = PerBlock::from_fn(|kind| {
        let values: Vec<f64> = batches.iter().map(|b| *b.utilization.get(kind)).collect();
        Estimate::from_samples(&values)
    });

    InfiniteReport {
        seed: config.seed,
        slot,
        batch_size: config.batch.size,
        planned_cost: slot_planned_cost(config, slot),
        response_time: Estimate::from_samples(&response),
        utilization,
        loss_probability: Estimate::from_samples(&loss),
        batches,
    }
}
