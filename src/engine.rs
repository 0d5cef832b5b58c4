use serde::Serialize;
use tracing::{debug, trace};

use crate::algorithms::{build_strategy, SelectionContext, SelectionStrategy};
use crate::capacity;
use crate::error::{Error, Result};
use crate::events::{Completion, EventList, ServerRef};
use crate::models::{BlockKind, PerBlock, SimConfig, NUM_SLOTS};
use crate::routing::{self, Destination};
use crate::state::{Clock, Job, NetworkStatus, ServerState, ServerStatus};
use crate::variates::{Stream, VariateSource};

/// Outcome counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    /// Jobs that finished credential check and left.
    pub completed: u64,
    /// Jobs routed to the exit after temperature control.
    pub dropped: u64,
    /// Jobs turned away by the credential-check loss block.
    pub lost: u64,
}

/// Everything one simulation run owns: clock, network, pending events and
/// the random streams.
pub struct SimulationContext {
    pub config: SimConfig,
    pub clock: Clock,
    pub network: NetworkStatus,
    pub events: EventList,
    pub counters: RunCounters,
    variates: Box<dyn VariateSource>,
    strategies: PerBlock<Box<dyn SelectionStrategy>>,
}

impl SimulationContext {
    pub fn new(config: SimConfig, variates: Box<dyn VariateSource>) -> Result<Self> {
        validate_config(&config)?;
        let network = NetworkStatus::new(&config);
        Ok(Self {
            config,
            clock: Clock::default(),
            network,
            events: EventList::new(),
            counters: RunCounters::default(),
            variates,
            strategies: PerBlock::from_fn(build_strategy),
        })
    }

    /// Fresh network and event list at time zero. Random streams keep
    /// going so repetitions draw independent samples.
    pub fn reset(&mut self) {
        self.network = NetworkStatus::new(&self.config);
        self.events.clear();
        self.counters = RunCounters::default();
        self.clock = Clock {
            current: 0.0,
            arrival: f64::INFINITY,
            next: 0.0,
            batch_start: 0.0,
        };
    }

    /// Zeroes areas and windowed counters; online status, queues and the
    /// event list are untouched.
    pub fn reset_statistics(&mut self) {
        self.network.reset_statistics();
        self.clock.batch_start = self.clock.current;
    }

    pub fn arrival_rate(&self) -> f64 {
        self.config.slot(self.network.time_slot).arrival_rate
    }

    pub fn schedule_next_arrival(&mut self) {
        let mean = 1.0 / self.arrival_rate();
        self.variates.select_stream(Stream::Arrival);
        self.clock.arrival = self.clock.current + self.variates.exponential(mean);
    }

    /// Integrates every area over `[current, to]` with the populations
    /// as they stand, then moves the clock.
    pub fn advance(&mut self, to: f64) {
        self.clock.next = to;
        self.network.integrate(to - self.clock.current);
        self.clock.current = to;
    }

    /// Switches to `slot` and moves every block toward that slot's server
    /// count. Queues are rebalanced on growth when `rebalance` is set.
    pub fn set_time_slot(&mut self, slot: usize, rebalance: bool) -> Result<()> {
        if slot >= NUM_SLOTS {
            return Err(Error::InvalidSlot {
                got: slot,
                max: NUM_SLOTS - 1,
            });
        }
        self.network.time_slot = slot;
        let now = self.clock.current;

        for kind in BlockKind::ALL {
            let target = *self.config.slot(slot).servers.get(kind);
            let mean = *self.config.service_means.get(kind);
            let block = self.network.block_mut(kind);
            let previous = block.online;
            if previous > target {
                capacity::deactivate(block, target, now);
            } else if previous < target {
                capacity::activate(block, target, now);
                if rebalance {
                    capacity::load_balance(
                        block,
                        previous,
                        now,
                        mean,
                        &mut self.events,
                        self.variates.as_mut(),
                    )?;
                }
            }
            if previous != target {
                debug!(slot, block = %kind, previous, target, now, "capacity changed");
            }
        }
        Ok(())
    }

    pub fn process_arrival(&mut self) -> Result<()> {
        let arrival = self.clock.arrival;
        trace!(time = arrival, "external arrival");
        self.admit(BlockKind::TemperatureControl, arrival)?;
        self.schedule_next_arrival();
        Ok(())
    }

    pub fn process_completion(&mut self, completion: Completion) -> Result<()> {
        let now = self.clock.current;
        let at = completion.server;
        trace!(time = now, block = %at.block, server = at.index, "completion");

        if let Err(err) = self.events.delete(completion.handle) {
            debug!(%err, "continuing after missed deletion");
        }

        let mean = *self.config.service_means.get(at.block);
        let block = self.network.block_mut(at.block);
        let server = &mut block.servers[at.index];
        if !server.is_busy() {
            return Err(Error::MissingJob {
                block: at.block,
                server: at.index,
            });
        }
        server.completions += 1;
        server.pending = None;

        let next_job = server.queue.pop_front();
        if let Some(job) = next_job {
            server.delay_sum += now - job.arrival;
            begin_service(
                server,
                at,
                now,
                mean,
                &mut self.events,
                self.variates.as_mut(),
            );
        } else {
            server.status = ServerStatus::Idle;
            if server.pending_deactivation {
                server.go_offline(now);
                debug!(block = %at.block, server = at.index, now, "drained server went offline");
            }
        }
        block.completions += 1;
        block.job_in_block -= 1;
        if next_job.is_some() {
            block.job_in_queue -= 1;
        }

        match routing::destination(at.block, &self.config.routing, self.variates.as_mut()) {
            Destination::Exit if at.block == BlockKind::CredentialCheck => {
                self.counters.completed += 1;
            }
            Destination::Exit => {
                self.counters.dropped += 1;
                self.network.block_mut(at.block).bypassed += 1;
            }
            Destination::Block(next) => self.admit(next, now)?,
        }
        Ok(())
    }

    /// Hands a job that arrives at `kind` to one of its servers. Loss
    /// blocks discard the job when no server is idle.
    fn admit(&mut self, kind: BlockKind, arrival: f64) -> Result<()> {
        let now = self.clock.current;
        let mean = *self.config.service_means.get(kind);
        let choice = self.select_server(kind);
        let block = self.network.block_mut(kind);
        block.arrivals += 1;

        let Some(idx) = choice else {
            if kind.is_loss_system() {
                block.bypassed += 1;
                self.counters.lost += 1;
                trace!(time = now, block = %kind, "job lost");
                return Ok(());
            }
            return Err(Error::InvalidCapacity {
                slot: self.network.time_slot,
                block: kind,
            });
        };

        block.job_in_block += 1;
        let server = &mut block.servers[idx];
        server.arrivals += 1;
        if server.is_busy() {
            server.queue.push_back(Job { arrival });
            block.job_in_queue += 1;
        } else {
            begin_service(
                server,
                ServerRef::new(kind, idx),
                now,
                mean,
                &mut self.events,
                self.variates.as_mut(),
            );
        }
        Ok(())
    }

    fn select_server(&mut self, kind: BlockKind) -> Option<usize> {
        let block = self.network.block(kind);
        let mut ctx = SelectionContext {
            servers: &block.servers,
            online: block.online,
            variates: self.variates.as_mut(),
        };
        self.strategies.get_mut(kind).select(&mut ctx)
    }
}

/// Starts serving on an idle server: draws a service time on the server's
/// own stream and schedules the completion.
pub(crate) fn begin_service(
    server: &mut ServerState,
    at: ServerRef,
    now: f64,
    mean: f64,
    events: &mut EventList,
    variates: &mut dyn VariateSource,
) {
    variates.select_stream(Stream::Service(server.stream));
    let service = variates.exponential(mean);
    server.status = ServerStatus::Busy;
    server.served += 1;
    server.service_sum += service;
    server.pending = Some(events.insert(now + service, at));
}

pub fn validate_config(config: &SimConfig) -> Result<()> {
    if config.slots.len() != NUM_SLOTS {
        return Err(Error::InvalidSlotCount {
            expected: NUM_SLOTS,
            got: config.slots.len(),
        });
    }
    for (idx, slot) in config.slots.iter().enumerate() {
        if !(slot.duration > 0.0 && slot.duration.is_finite()) {
            return Err(Error::InvalidSlotDuration(idx));
        }
        if !(slot.arrival_rate > 0.0 && slot.arrival_rate.is_finite()) {
            return Err(Error::InvalidArrivalRate(idx));
        }
        for (kind, servers) in slot.servers.iter() {
            if *servers == 0 && !kind.is_loss_system() {
                return Err(Error::InvalidCapacity { slot: idx, block: kind });
            }
        }
    }
    for (kind, mean) in config.service_means.iter() {
        if !(*mean > 0.0 && mean.is_finite()) {
            return Err(Error::InvalidServiceMean(kind));
        }
    }
    for (kind, cost) in config.unit_costs.iter() {
        if !(*cost >= 0.0 && cost.is_finite()) {
            return Err(Error::InvalidUnitCost(kind));
        }
    }
    config.routing.validate()?;

    if config.finite.repetitions == 0 {
        return Err(Error::RepetitionsZero);
    }
    if let Some(interval) = config.finite.sample_interval {
        if !(interval > 0.0) {
            return Err(Error::InvalidSampleInterval(interval));
        }
    }
    if config.batch.size == 0 {
        return Err(Error::BatchSizeZero);
    }
    if config.batch.count == 0 {
        return Err(Error::BatchCountZero);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::SlotConfig;
    use crate::variates::scripted::ScriptedVariates;

    /// Three identical slots with the given per-block server counts.
    pub(crate) fn uniform_config(servers: PerBlock<usize>, duration: f64) -> SimConfig {
        let slot = SlotConfig {
            duration,
            arrival_rate: 1.0,
            servers,
        };
        SimConfig {
            slots: vec![slot.clone(), slot.clone(), slot],
            finite: crate::models::FiniteConfig {
                repetitions: 2,
                sample_interval: None,
            },
            batch: crate::models::BatchConfig { size: 8, count: 4 },
            ..SimConfig::default()
        }
    }

    pub(crate) fn assert_invariants(ctx: &SimulationContext) {
        assert!(ctx.events.len() <= ctx.network.busy_servers());
        for kind in BlockKind::ALL {
            let block = ctx.network.block(kind);
            let waiting: usize = block.servers.iter().map(|s| s.job_in_queue()).sum();
            assert_eq!(waiting, block.job_in_queue, "queue count of {kind}");
            let total: usize = block.servers.iter().map(|s| s.job_in_total()).sum();
            assert_eq!(total, block.job_in_block, "job count of {kind}");
            for server in &block.servers {
                assert_eq!(
                    server.job_in_total(),
                    server.job_in_queue() + usize::from(server.status == ServerStatus::Busy)
                );
                assert_eq!(server.pending.is_some(), server.is_busy());
                if !server.is_online() {
                    assert_eq!(server.job_in_total(), 0);
                }
            }
        }
    }

    fn step(ctx: &mut SimulationContext) -> bool {
        let completion = ctx.events.peek_min();
        let completion_time = ctx.events.next_time();
        let next = completion_time.min(ctx.clock.arrival);
        if next == f64::INFINITY {
            return false;
        }
        ctx.advance(next);
        match completion {
            Some(completion) if completion_time <= ctx.clock.arrival => {
                ctx.process_completion(completion).unwrap()
            }
            _ => ctx.process_arrival().unwrap(),
        }
        assert_invariants(ctx);
        true
    }

    fn single_server_context(variates: ScriptedVariates) -> SimulationContext {
        let config = uniform_config(PerBlock::splat(1), 100.0);
        let mut ctx = SimulationContext::new(config, Box::new(variates)).unwrap();
        ctx.reset();
        ctx.set_time_slot(0, false).unwrap();
        ctx.schedule_next_arrival();
        ctx
    }

    #[test]
    fn single_job_walks_ticket_chain_without_queueing() {
        let variates = ScriptedVariates::new(2.0, 0.0)
            .with_gaps(&[1.0])
            .with_routes(&[20.0]);
        let mut ctx = single_server_context(variates);
        while step(&mut ctx) {}

        for kind in [
            BlockKind::TemperatureControl,
            BlockKind::TicketPurchase,
            BlockKind::TicketGate,
            BlockKind::CredentialCheck,
        ] {
            let block = ctx.network.block(kind);
            assert_eq!(block.arrivals, 1, "{kind}");
            assert_eq!(block.completions, 1, "{kind}");
            assert_eq!(block.servers[0].delay_sum, 0.0);
            assert_eq!(block.servers[0].area.queue, 0.0);
        }
        assert_eq!(ctx.network.block(BlockKind::SeasonPassGate).arrivals, 0);
        assert_eq!(ctx.counters.completed, 1);
        assert_eq!(ctx.clock.current, 9.0);
    }

    fn walk_single_job(route: f64) -> SimulationContext {
        let variates = ScriptedVariates::new(2.0, 0.0)
            .with_gaps(&[1.0])
            .with_routes(&[route]);
        let mut ctx = single_server_context(variates);
        while step(&mut ctx) {}
        ctx
    }

    #[test]
    fn single_job_walks_season_pass_chain_without_queueing() {
        let ctx = walk_single_job(35.0);
        for kind in [
            BlockKind::TemperatureControl,
            BlockKind::SeasonPassGate,
            BlockKind::CredentialCheck,
        ] {
            let block = ctx.network.block(kind);
            assert_eq!(block.arrivals, 1, "{kind}");
            assert_eq!(block.completions, 1, "{kind}");
            assert_eq!(block.servers[0].delay_sum, 0.0);
        }
        assert_eq!(ctx.network.block(BlockKind::TicketPurchase).arrivals, 0);
        assert_eq!(ctx.network.block(BlockKind::TicketGate).arrivals, 0);
        assert_eq!(ctx.counters.completed, 1);
        assert_eq!(ctx.clock.current, 7.0);
    }

    #[test]
    fn single_job_walks_straight_to_ticket_gate() {
        let ctx = walk_single_job(50.0);
        for kind in [
            BlockKind::TemperatureControl,
            BlockKind::TicketGate,
            BlockKind::CredentialCheck,
        ] {
            let block = ctx.network.block(kind);
            assert_eq!(block.arrivals, 1, "{kind}");
            assert_eq!(block.completions, 1, "{kind}");
            assert_eq!(block.servers[0].delay_sum, 0.0);
        }
        assert_eq!(ctx.network.block(BlockKind::TicketPurchase).arrivals, 0);
        assert_eq!(ctx.network.block(BlockKind::SeasonPassGate).arrivals, 0);
        assert_eq!(ctx.counters.completed, 1);
        assert_eq!(ctx.clock.current, 7.0);
    }

    #[test]
    fn shrunk_server_drains_before_going_offline() {
        let mut config = uniform_config(PerBlock::splat(1), 100.0);
        config.slots[0].servers.temperature_control = 2;
        let mut variates = ScriptedVariates::new(1.0, 1.0)
            .with_gaps(&[1.0, 1.0, 1.0])
            .with_services(&[10.0, 2.0, 2.0]);
        variates.starts.extend([0, 0, 1]);
        let mut ctx = SimulationContext::new(config, Box::new(variates)).unwrap();
        ctx.reset();
        ctx.set_time_slot(0, false).unwrap();
        ctx.schedule_next_arrival();

        for _ in 0..3 {
            assert!(step(&mut ctx));
        }
        let server = &ctx.network.block(BlockKind::TemperatureControl).servers[1];
        assert_eq!(server.job_in_total(), 2);

        ctx.set_time_slot(1, false).unwrap();
        let block = ctx.network.block(BlockKind::TemperatureControl);
        assert_eq!(block.online, 1);
        assert!(block.servers[1].pending_deactivation);
        assert!(block.servers[1].is_busy());
        assert!(block.servers[1].is_online());

        // completion at 4 starts the queued job on the draining server
        assert!(step(&mut ctx));
        assert_eq!(ctx.clock.current, 4.0);
        let server = &ctx.network.block(BlockKind::TemperatureControl).servers[1];
        assert!(server.is_busy());
        assert!(server.is_online());
        assert!(server.pending_deactivation);

        while step(&mut ctx) {}
        assert_eq!(ctx.clock.current, 11.0);
        let block = ctx.network.block(BlockKind::TemperatureControl);
        let server = &block.servers[1];
        assert!(!server.is_online());
        assert!(!server.pending_deactivation);
        assert_eq!(server.time_online, 6.0);
        assert_eq!(server.online_time_at(ctx.clock.current), 6.0);
        assert!(block.servers[0].is_online());
    }

    #[test]
    fn single_job_can_exit_after_temperature_control() {
        let variates = ScriptedVariates::new(2.0, 0.0)
            .with_gaps(&[1.0])
            .with_routes(&[1.0]);
        let mut ctx = single_server_context(variates);
        while step(&mut ctx) {}

        assert_eq!(ctx.counters.dropped, 1);
        assert_eq!(ctx.counters.completed, 0);
        assert_eq!(ctx.network.block(BlockKind::TemperatureControl).bypassed, 1);
        assert_eq!(ctx.network.block(BlockKind::TicketGate).arrivals, 0);
    }

    #[test]
    fn busy_credential_check_loses_the_job() {
        let variates = ScriptedVariates::new(2.0, 99.0)
            .with_gaps(&[1.0, 0.5])
            .with_services(&[1.0, 1.0, 1.0, 1.0, 10.0, 1.0]);
        let mut ctx = single_server_context(variates);
        while step(&mut ctx) {}

        let check = ctx.network.block(BlockKind::CredentialCheck);
        assert_eq!(check.arrivals, 2);
        assert_eq!(check.bypassed, 1);
        assert_eq!(ctx.counters.lost, 1);
        assert_eq!(ctx.counters.completed, 1);
    }

    #[test]
    fn second_arrival_waits_in_queue() {
        let variates = ScriptedVariates::new(4.0, 1.0).with_gaps(&[1.0, 1.0]);
        let mut ctx = single_server_context(variates);

        assert!(step(&mut ctx));
        assert!(step(&mut ctx));
        let server = &ctx.network.block(BlockKind::TemperatureControl).servers[0];
        assert_eq!(server.job_in_queue(), 1);
        assert_eq!(server.job_in_total(), 2);

        while step(&mut ctx) {}
        let server = &ctx.network.block(BlockKind::TemperatureControl).servers[0];
        assert_eq!(server.delay_sum, 3.0);
        assert_eq!(server.area.queue, 3.0);
        assert_eq!(server.area.node, 11.0);
        assert_eq!(ctx.counters.dropped, 2);
    }

    #[test]
    fn equal_completion_times_are_processed_in_schedule_order() {
        let mut servers = PerBlock::splat(1);
        servers.temperature_control = 2;
        let config = uniform_config(servers, 100.0);
        let variates = ScriptedVariates::new(3.0, 1.0).with_gaps(&[1.0, 0.0]);
        let mut ctx = SimulationContext::new(config, Box::new(variates)).unwrap();
        ctx.reset();
        ctx.set_time_slot(0, false).unwrap();
        ctx.schedule_next_arrival();

        assert!(step(&mut ctx));
        assert!(step(&mut ctx));
        assert_eq!(ctx.events.len(), 2);
        let first = ctx.events.peek_min().unwrap();
        assert_eq!(first.server.index, 0);
        assert_eq!(first.time(), 4.0);

        assert!(step(&mut ctx));
        let second = ctx.events.peek_min().unwrap();
        assert_eq!(second.server.index, 1);
        assert_eq!(second.time(), 4.0);
        assert!(step(&mut ctx));
        assert!(ctx.events.is_empty());
        assert_eq!(ctx.events.misses(), 0);
    }

    #[test]
    fn stale_completion_is_reported() {
        let variates = ScriptedVariates::new(2.0, 1.0).with_gaps(&[1.0]);
        let mut ctx = single_server_context(variates);
        assert!(step(&mut ctx));
        let completion = ctx.events.peek_min().unwrap();
        ctx.advance(completion.time());
        ctx.process_completion(completion).unwrap();

        let err = ctx.process_completion(completion).unwrap_err();
        assert!(matches!(err, Error::MissingJob { .. }));
        assert_eq!(ctx.events.misses(), 1);
    }

    #[test]
    fn statistics_reset_keeps_queues_and_availability() {
        let variates = ScriptedVariates::new(10.0, 1.0).with_gaps(&[1.0, 1.0, 1.0]);
        let mut ctx = single_server_context(variates);
        for _ in 0..3 {
            assert!(step(&mut ctx));
        }
        ctx.advance(5.0);

        let before = ctx.network.block(BlockKind::TemperatureControl).clone();
        assert!(before.servers[0].area.node > 0.0);
        ctx.reset_statistics();
        ctx.reset_statistics();

        let after = ctx.network.block(BlockKind::TemperatureControl);
        assert_eq!(after.servers[0].area, crate::state::Areas::default());
        assert_eq!(after.arrivals, 0);
        assert_eq!(after.online, before.online);
        assert_eq!(after.job_in_block, before.job_in_block);
        assert_eq!(after.servers[0].queue, before.servers[0].queue);
        assert_eq!(after.servers[0].status, before.servers[0].status);
        assert!(after.servers[0].is_online());
        assert_eq!(ctx.clock.batch_start, 5.0);
        assert_eq!(ctx.events.len(), 1);
        assert_invariants(&ctx);
    }

    #[test]
    fn validate_rejects_empty_queued_block() {
        let mut servers = PerBlock::splat(1);
        servers.ticket_gate = 0;
        let config = uniform_config(servers, 10.0);
        let err = validate_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "slot 0 needs at least one server in block ticket-gate"
        );
    }

    #[test]
    fn validate_accepts_empty_loss_block() {
        let mut servers = PerBlock::splat(1);
        servers.credential_check = 0;
        assert!(validate_config(&uniform_config(servers, 10.0)).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_slot_count() {
        let mut config = SimConfig::default();
        config.slots.pop();
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "expected 3 time slots, got 2");
    }
}
