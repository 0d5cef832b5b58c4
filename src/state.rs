use std::collections::VecDeque;

use crate::events::{EventHandle, ServerRef};
use crate::models::{BlockKind, PerBlock, SimConfig};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Job {
    /// Time the job entered its current server's queue.
    pub arrival: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerStatus {
    Idle,
    Busy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

/// Time integrals accumulated between two statistics resets.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Areas {
    pub node: f64,
    pub queue: f64,
    pub service: f64,
    pub online: f64,
}

#[derive(Clone, Debug)]
pub struct ServerState {
    pub id: usize,
    pub stream: u32,
    pub status: ServerStatus,
    pub availability: Availability,
    pub used: bool,
    pub pending_deactivation: bool,
    pub queue: VecDeque<Job>,
    pub arrivals: u64,
    pub completions: u64,
    pub served: u64,
    pub service_sum: f64,
    pub delay_sum: f64,
    pub area: Areas,
    pub time_online: f64,
    pub last_online: f64,
    pub pending: Option<EventHandle>,
}

impl ServerState {
    pub fn new(id: usize, stream: u32) -> Self {
        Self {
            id,
            stream,
            status: ServerStatus::Idle,
            availability: Availability::Offline,
            used: false,
            pending_deactivation: false,
            queue: VecDeque::new(),
            arrivals: 0,
            completions: 0,
            served: 0,
            service_sum: 0.0,
            delay_sum: 0.0,
            area: Areas::default(),
            time_online: 0.0,
            last_online: 0.0,
            pending: None,
        }
    }

    pub fn job_in_queue(&self) -> usize {
        self.queue.len()
    }

    pub fn job_in_total(&self) -> usize {
        self.queue.len() + usize::from(self.is_busy())
    }

    pub fn is_busy(&self) -> bool {
        self.status == ServerStatus::Busy
    }

    pub fn is_online(&self) -> bool {
        self.availability == Availability::Online
    }

    pub fn go_online(&mut self, now: f64) {
        if !self.is_online() {
            self.availability = Availability::Online;
            self.last_online = now;
        }
        self.used = true;
        self.pending_deactivation = false;
    }

    pub fn go_offline(&mut self, now: f64) {
        if self.is_online() {
            self.time_online += now - self.last_online;
            self.last_online = now;
        }
        self.availability = Availability::Offline;
        self.pending_deactivation = false;
    }

    /// Online time including the interval still open at `now`.
    pub fn online_time_at(&self, now: f64) -> f64 {
        if self.is_online() {
            self.time_online + (now - self.last_online)
        } else {
            self.time_online
        }
    }

    /// Closes the open online interval without changing availability.
    pub fn settle_online(&mut self, now: f64) {
        if self.is_online() {
            self.time_online += now - self.last_online;
            self.last_online = now;
        }
    }

    pub fn reset_statistics(&mut self) {
        self.arrivals = 0;
        self.completions = 0;
        self.area = Areas::default();
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub kind: BlockKind,
    pub servers: Vec<ServerState>,
    /// Length of the online prefix of `servers`.
    pub online: usize,
    pub job_in_block: usize,
    pub job_in_queue: usize,
    pub arrivals: u64,
    pub completions: u64,
    pub bypassed: u64,
    /// Occupancy integral kept directly on the block (loss blocks only).
    pub direct_area: f64,
}

impl Block {
    pub fn new(kind: BlockKind, servers: Vec<ServerState>) -> Self {
        Self {
            kind,
            servers,
            online: 0,
            job_in_block: 0,
            job_in_queue: 0,
            arrivals: 0,
            completions: 0,
            bypassed: 0,
            direct_area: 0.0,
        }
    }

    pub fn busy_servers(&self) -> usize {
        self.servers.iter().filter(|server| server.is_busy()).count()
    }

    /// Node area: the servers' node integrals plus the direct occupancy
    /// integral.
    pub fn node_area(&self) -> f64 {
        self.servers.iter().map(|server| server.area.node).sum::<f64>() + self.direct_area
    }

    pub fn busy_area(&self) -> f64 {
        self.servers.iter().map(|server| server.area.service).sum()
    }

    pub fn online_area(&self) -> f64 {
        self.servers.iter().map(|server| server.area.online).sum()
    }

    pub fn reset_statistics(&mut self) {
        self.arrivals = 0;
        self.completions = 0;
        self.bypassed = 0;
        self.direct_area = 0.0;
        for server in &mut self.servers {
            server.reset_statistics();
        }
    }

    /// Adds `dt` worth of the current populations to every area.
    pub fn integrate(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let loss = self.kind.is_loss_system();
        if loss {
            self.direct_area += dt * self.job_in_block as f64;
        }
        for server in &mut self.servers {
            if server.is_online() {
                server.area.online += dt;
            }
            if server.job_in_total() == 0 {
                continue;
            }
            if !loss {
                server.area.node += dt * server.job_in_total() as f64;
                server.area.queue += dt * server.job_in_queue() as f64;
            }
            server.area.service += dt;
        }
    }
}

/// Live state of the whole network.
#[derive(Clone, Debug)]
pub struct NetworkStatus {
    pub blocks: PerBlock<Block>,
    pub time_slot: usize,
}

impl NetworkStatus {
    /// Every block gets as many servers as its busiest slot asks for; all
    /// start offline. Streams are numbered across the whole network.
    pub fn new(config: &SimConfig) -> Self {
        let mut next_stream = 0u32;
        let blocks = PerBlock::from_fn(|kind| {
            let servers = (0..config.max_servers(kind))
                .map(|id| {
                    let server = ServerState::new(id, next_stream);
                    next_stream += 1;
                    server
                })
                .collect();
            Block::new(kind, servers)
        });
        Self {
            blocks,
            time_slot: 0,
        }
    }

    pub fn block(&self, kind: BlockKind) -> &Block {
        self.blocks.get(kind)
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> &mut Block {
        self.blocks.get_mut(kind)
    }

    pub fn server(&self, server: ServerRef) -> &ServerState {
        &self.block(server.block).servers[server.index]
    }

    pub fn server_mut(&mut self, server: ServerRef) -> &mut ServerState {
        &mut self.block_mut(server.block).servers[server.index]
    }

    pub fn busy_servers(&self) -> usize {
        self.blocks.iter().map(|(_, block)| block.busy_servers()).sum()
    }

    pub fn jobs_in_system(&self) -> usize {
        self.blocks.iter().map(|(_, block)| block.job_in_block).sum()
    }

    pub fn integrate(&mut self, dt: f64) {
        for kind in BlockKind::ALL {
            self.block_mut(kind).integrate(dt);
        }
    }

    pub fn reset_statistics(&mut self) {
        for kind in BlockKind::ALL {
            self.block_mut(kind).reset_statistics();
        }
    }

    pub fn settle_online(&mut self, now: f64) {
        for kind in BlockKind::ALL {
            for server in &mut self.block_mut(kind).servers {
                server.settle_online(now);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Clock {
    pub current: f64,
    /// Next external arrival.
    pub arrival: f64,
    pub next: f64,
    pub batch_start: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_queue_and_status() {
        let mut server = ServerState::new(0, 0);
        assert_eq!(server.job_in_total(), 0);
        server.status = ServerStatus::Busy;
        server.queue.push_back(Job { arrival: 1.0 });
        server.queue.push_back(Job { arrival: 2.0 });
        assert_eq!(server.job_in_queue(), 2);
        assert_eq!(server.job_in_total(), 3);
    }

    #[test]
    fn online_time_accumulates_across_intervals() {
        let mut server = ServerState::new(0, 0);
        server.go_online(10.0);
        assert_eq!(server.online_time_at(15.0), 5.0);
        server.go_offline(20.0);
        server.go_online(30.0);
        server.settle_online(35.0);
        assert_eq!(server.time_online, 15.0);
        assert!(server.used);
    }

    #[test]
    fn integrate_weights_populations_by_elapsed_time() {
        let mut block = Block::new(BlockKind::TicketGate, vec![ServerState::new(0, 0)]);
        block.online = 1;
        let server = &mut block.servers[0];
        server.go_online(0.0);
        server.status = ServerStatus::Busy;
        server.queue.push_back(Job { arrival: 0.0 });

        block.integrate(2.0);
        let area = block.servers[0].area;
        assert_eq!(area.node, 4.0);
        assert_eq!(area.queue, 2.0);
        assert_eq!(area.service, 2.0);
        assert_eq!(area.online, 2.0);
        assert_eq!(block.node_area(), 4.0);
    }

    #[test]
    fn loss_block_tracks_occupancy_directly() {
        let mut block = Block::new(
            BlockKind::CredentialCheck,
            vec![ServerState::new(0, 0), ServerState::new(1, 1)],
        );
        for server in &mut block.servers {
            server.go_online(0.0);
            server.status = ServerStatus::Busy;
        }
        block.job_in_block = 2;

        block.integrate(3.0);
        assert_eq!(block.direct_area, 6.0);
        assert_eq!(block.node_area(), 6.0);
        assert_eq!(block.busy_area(), 6.0);
    }

    #[test]
    fn network_assigns_distinct_streams() {
        let network = NetworkStatus::new(&SimConfig::default());
        let mut streams: Vec<u32> = BlockKind::ALL
            .iter()
            .flat_map(|kind| network.block(*kind).servers.iter().map(|s| s.stream))
            .collect();
        let total = streams.len();
        streams.dedup();
        assert_eq!(streams.len(), total);
        assert_eq!(network.block(BlockKind::TicketPurchase).servers.len(), 44);
    }
}
