//! Drivers for the two experiment kinds: finite-horizon replications of a
//! whole day, and batch means on one slot held fixed.

use tracing::{debug, info};

use crate::engine::SimulationContext;
use crate::error::{Error, Result};
use crate::models::{SimConfig, NUM_SLOTS};
use crate::stats::{
    self, FiniteReport, InfiniteReport, RepetitionResult, ResponseSample, Totals, WindowStats,
};
use crate::variates::StreamRng;

/// The kind of event the loop handles next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Next {
    SlotBoundary,
    Sample,
    Completion,
    Arrival,
}

pub fn run_finite(config: SimConfig) -> Result<FiniteReport> {
    let variates = Box::new(StreamRng::plant_seeds(config.seed));
    let mut ctx = SimulationContext::new(config, variates)?;
    run_finite_with(&mut ctx)
}

/// Replicates the day `finite.repetitions` times. Response-time samples
/// are only collected on the first replication.
pub fn run_finite_with(ctx: &mut SimulationContext) -> Result<FiniteReport> {
    let repetitions = ctx.config.finite.repetitions;
    info!(
        repetitions,
        horizon = ctx.config.horizon(),
        seed = ctx.config.seed,
        "starting finite-horizon simulation"
    );

    let mut results = Vec::with_capacity(repetitions);
    let mut samples = Vec::new();
    for index in 0..repetitions {
        let sink = if index == 0 { Some(&mut samples) } else { None };
        let result = run_repetition(ctx, index, sink)?;
        debug!(
            index,
            cost = result.cost,
            completed = result.counters.completed,
            lost = result.counters.lost,
            "repetition finished"
        );
        results.push(result);
    }

    let report = stats::summarize_finite(&ctx.config, results, samples);
    info!(
        mean_cost = report.mean_cost,
        planned_cost = report.planned_cost,
        "finite-horizon simulation finished"
    );
    Ok(report)
}

/// Servers are billed through the end of the day even when the network
/// empties early.
fn run_repetition(
    ctx: &mut SimulationContext,
    index: usize,
    mut samples: Option<&mut Vec<ResponseSample>>,
) -> Result<RepetitionResult> {
    ctx.reset();
    ctx.set_time_slot(0, false)?;
    ctx.schedule_next_arrival();

    let stop = ctx.config.horizon();
    let slot_count = ctx.config.slots.len();
    let interval = if samples.is_some() {
        ctx.config.finite.sample_interval
    } else {
        None
    };
    let mut next_sample = interval.map_or(f64::INFINITY, |step| step.min(stop));
    let mut slot = 0usize;
    let mut boundary = slot_boundary(&ctx.config, slot);
    let mut window_start = Totals::capture(&ctx.network, 0.0);
    let mut windows = Vec::with_capacity(slot_count);

    loop {
        let arrival = if ctx.clock.arrival <= stop {
            ctx.clock.arrival
        } else {
            f64::INFINITY
        };
        let completion = ctx.events.next_time();
        let (time, next) = [
            (boundary, Next::SlotBoundary),
            (next_sample, Next::Sample),
            (completion, Next::Completion),
            (arrival, Next::Arrival),
        ]
        .into_iter()
        .fold((f64::INFINITY, Next::Arrival), |best, candidate| {
            if candidate.0 < best.0 {
                candidate
            } else {
                best
            }
        });
        if time == f64::INFINITY {
            break;
        }
        ctx.advance(time);

        match next {
            Next::SlotBoundary => {
                let end = Totals::capture(&ctx.network, time);
                windows.push(WindowStats::between(&window_start, &end));
                window_start = end;
                slot += 1;
                ctx.set_time_slot(slot, true)?;
                boundary = slot_boundary(&ctx.config, slot);
                debug!(index, slot, time, "entered time slot");
            }
            Next::Sample => {
                if let Some(sink) = samples.as_deref_mut() {
                    let totals = Totals::capture(&ctx.network, time);
                    let response_time = if totals.entry_arrivals > 0 {
                        totals.node_area / totals.entry_arrivals as f64
                    } else {
                        0.0
                    };
                    sink.push(ResponseSample {
                        time,
                        slot,
                        response_time,
                    });
                }
                next_sample = match interval {
                    Some(step) if time < stop => (time + step).min(stop),
                    _ => f64::INFINITY,
                };
            }
            Next::Completion => {
                if let Some(pending) = ctx.events.peek_min() {
                    ctx.process_completion(pending)?;
                }
            }
            Next::Arrival => ctx.process_arrival()?,
        }
    }

    let end_time = stop.max(ctx.clock.current);
    let end = Totals::capture(&ctx.network, ctx.clock.current);
    windows.push(WindowStats::between(&window_start, &end));
    ctx.network.settle_online(end_time);
    let cost = stats::online_cost(&ctx.network, &ctx.config.unit_costs, end_time);

    Ok(RepetitionResult {
        index,
        slots: windows,
        cost,
        counters: ctx.counters,
        entry_arrivals: end.entry_arrivals,
        event_misses: ctx.events.misses(),
    })
}

/// Start of the slot after `slot`, or infinity when `slot` is the last.
fn slot_boundary(config: &SimConfig, slot: usize) -> f64 {
    if slot + 1 < config.slots.len() {
        config.slot_start(slot + 1)
    } else {
        f64::INFINITY
    }
}

pub fn run_infinite(config: SimConfig, slot: usize) -> Result<InfiniteReport> {
    check_slot(slot)?;
    let variates = Box::new(StreamRng::plant_seeds(config.seed));
    let mut ctx = SimulationContext::new(config, variates)?;
    run_infinite_with(&mut ctx, slot)
}

/// Batch means with `slot` held fixed. One extra batch is run first and
/// thrown away to wash out the empty-system start.
pub fn run_infinite_with(ctx: &mut SimulationContext, slot: usize) -> Result<InfiniteReport> {
    check_slot(slot)?;
    let size = ctx.config.batch.size;
    let count = ctx.config.batch.count;
    info!(slot, batch_size = size, batches = count, "starting batch-means simulation");

    ctx.reset();
    ctx.set_time_slot(slot, false)?;
    ctx.schedule_next_arrival();

    run_batch(ctx, size)?;
    ctx.reset_statistics();
    debug!(time = ctx.clock.current, "discarded transient batch");

    let mut batches = Vec::with_capacity(count);
    for batch in 0..count {
        let start = Totals::capture(&ctx.network, ctx.clock.current);
        run_batch(ctx, size)?;
        let end = Totals::capture(&ctx.network, ctx.clock.current);
        let window = WindowStats::between(&start, &end);
        debug!(
            batch,
            start = window.start,
            end = window.end,
            response_time = window.response_time,
            "batch finished"
        );
        batches.push(window);
        ctx.reset_statistics();
    }

    let report = stats::summarize_infinite(&ctx.config, slot, batches);
    info!(
        response_time = report.response_time.mean,
        half_width = report.response_time.half_width,
        "batch-means simulation finished"
    );
    Ok(report)
}

/// Admits `size` external arrivals and then lets the network drain.
pub fn run_batch(ctx: &mut SimulationContext, size: usize) -> Result<()> {
    // The arrival drawn at the end of the previous batch fell behind the
    // drain.
    if ctx.clock.arrival < ctx.clock.current {
        ctx.schedule_next_arrival();
    }

    let mut admitted = 0usize;
    loop {
        let arrival = if admitted < size {
            ctx.clock.arrival
        } else {
            f64::INFINITY
        };
        let completion = ctx.events.next_time();
        if arrival == f64::INFINITY && completion == f64::INFINITY {
            break;
        }
        if completion <= arrival {
            ctx.advance(completion);
            if let Some(pending) = ctx.events.peek_min() {
                ctx.process_completion(pending)?;
            }
        } else {
            ctx.advance(arrival);
            ctx.process_arrival()?;
            admitted += 1;
        }
    }
    Ok(())
}

fn check_slot(slot: usize) -> Result<()> {
    if slot >= NUM_SLOTS {
        return Err(Error::InvalidSlot {
            got: slot,
            max: NUM_SLOTS - 1,
        });
    }
    Ok(())
}
