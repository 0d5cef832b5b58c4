//! Slot-driven capacity changes: bringing servers online, draining them
//! offline, and spreading queued work onto newly added servers.

use tracing::debug;

use crate::engine::begin_service;
use crate::error::{Error, Result};
use crate::events::{EventList, ServerRef};
use crate::state::Block;
use crate::variates::VariateSource;

/// Grows the online prefix of `block` to `target`.
pub fn activate(block: &mut Block, target: usize, now: f64) {
    let start = block.online.min(target);
    for server in &mut block.servers[start..target] {
        server.go_online(now);
    }
    block.online = target;
}

/// Shrinks the online prefix of `block` to `target`. Busy servers past the
/// new prefix keep working and go offline once their queue drains.
pub fn deactivate(block: &mut Block, target: usize, now: f64) {
    let end = block.online;
    for server in block.servers[target..end].iter_mut().rev() {
        if server.is_busy() {
            server.pending_deactivation = true;
        } else {
            server.go_offline(now);
        }
    }
    block.online = target;
}

/// Moves queued jobs from the first `previous` servers onto the servers
/// activated after them, round robin, until no old server holds more than
/// `job_in_queue / online` waiting jobs. Jobs are taken from the tail of
/// each queue; an idle receiver starts serving immediately.
pub fn load_balance(
    block: &mut Block,
    previous: usize,
    now: f64,
    service_mean: f64,
    events: &mut EventList,
    variates: &mut dyn VariateSource,
) -> Result<()> {
    let online = block.online;
    if online <= previous || block.job_in_queue == 0 {
        return Ok(());
    }

    let added = online - previous;
    let fair_share = block.job_in_queue / online;
    let mut cursor = 0usize;
    let mut moved = 0usize;

    for source_idx in 0..previous {
        while block.servers[source_idx].job_in_queue() > fair_share {
            let dest_idx = previous + cursor % added;
            cursor += 1;

            let source = &mut block.servers[source_idx];
            let job = source.queue.pop_back().ok_or(Error::MissingJob {
                block: block.kind,
                server: source_idx,
            })?;
            source.arrivals = source.arrivals.saturating_sub(1);

            let starts_now = !block.servers[dest_idx].is_busy();
            if starts_now {
                block.job_in_queue -= 1;
            }
            let dest = &mut block.servers[dest_idx];
            dest.arrivals += 1;
            if starts_now {
                dest.delay_sum += now - job.arrival;
                begin_service(
                    dest,
                    ServerRef::new(block.kind, dest_idx),
                    now,
                    service_mean,
                    events,
                    variates,
                );
            } else {
                dest.queue.push_back(job);
            }
            moved += 1;
        }
    }

    debug!(block = %block.kind, previous, online, fair_share, moved, "load balanced queues");
    Ok(())
}
