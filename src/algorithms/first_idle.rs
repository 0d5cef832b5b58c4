use crate::algorithms::{SelectionContext, SelectionStrategy};

/// Loss-block selection: the first idle online server, if any.
#[derive(Default)]
pub struct FirstIdleStrategy;

impl SelectionStrategy for FirstIdleStrategy {
    fn select(&mut self, ctx: &mut SelectionContext) -> Option<usize> {
        let online = ctx.online.min(ctx.servers.len());
        ctx.servers[..online]
            .iter()
            .position(|server| !server.is_busy() && !server.pending_deactivation)
    }
}
