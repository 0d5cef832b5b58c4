use crate::algorithms::{SelectionContext, SelectionStrategy};
use crate::variates::Stream;

/// Picks the online server with the fewest jobs. The scan starts at a
/// uniformly drawn index so ties do not always favour low indices; a later
/// server only wins with strictly fewer jobs.
#[derive(Default)]
pub struct ShortestQueueStrategy;

impl SelectionStrategy for ShortestQueueStrategy {
    fn select(&mut self, ctx: &mut SelectionContext) -> Option<usize> {
        let online = ctx.online.min(ctx.servers.len());
        if online == 0 {
            return None;
        }

        ctx.variates.select_stream(Stream::Selection);
        let start = ctx.variates.equilikely(0, online - 1);

        let mut best: Option<usize> = None;
        for offset in 0..online {
            let idx = (start + offset) % online;
            let server = &ctx.servers[idx];
            if server.pending_deactivation {
                continue;
            }
            match best {
                Some(current) if server.job_in_total() >= ctx.servers[current].job_in_total() => {}
                _ => best = Some(idx),
            }
        }
        best
    }
}
