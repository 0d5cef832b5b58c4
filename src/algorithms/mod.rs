mod first_idle;
mod shortest_queue;

use crate::models::BlockKind;
use crate::state::ServerState;
use crate::variates::VariateSource;

pub use first_idle::FirstIdleStrategy;
pub use shortest_queue::ShortestQueueStrategy;

pub trait SelectionStrategy {
    /// Index of the server that should take the next job, or `None` when
    /// the block cannot accept it.
    fn select(&mut self, ctx: &mut SelectionContext) -> Option<usize>;
}

pub struct SelectionContext<'a> {
    pub servers: &'a [ServerState],
    /// Only `servers[..online]` may be chosen.
    pub online: usize,
    pub variates: &'a mut dyn VariateSource,
}

pub fn build_strategy(kind: BlockKind) -> Box<dyn SelectionStrategy> {
    if kind.is_loss_system() {
        Box::new(FirstIdleStrategy)
    } else {
        Box::new(ShortestQueueStrategy)
    }
}

#[cfg(test)]
pub(crate) fn test_servers(totals: &[usize]) -> Vec<ServerState> {
    use crate::state::{Job, ServerStatus};

    totals
        .iter()
        .enumerate()
        .map(|(id, &total)| {
            let mut server = ServerState::new(id, id as u32);
            server.go_online(0.0);
            if total > 0 {
                server.status = ServerStatus::Busy;
                for _ in 1..total {
                    server.queue.push_back(Job { arrival: 0.0 });
                }
            }
            server
        })
        .collect()
}
