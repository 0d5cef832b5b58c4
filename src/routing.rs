use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{BlockKind, RoutingConfig};
use crate::variates::{Stream, VariateSource};

/// Where a job goes after finishing service in a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Destination {
    Block(BlockKind),
    Exit,
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<()> {
        let shares = [
            ("exit_pct", self.exit_pct),
            ("ticket_purchase_pct", self.ticket_purchase_pct),
            ("season_pass_gate_pct", self.season_pass_gate_pct),
        ];
        for (name, value) in shares {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::InvalidRouting(format!(
                    "{} must be within 0..=100 (got {})",
                    name, value
                )));
            }
        }
        let total = self.exit_pct + self.ticket_purchase_pct + self.season_pass_gate_pct;
        if total > 100.0 {
            return Err(Error::InvalidRouting(format!(
                "percentages sum to {} (max 100)",
                total
            )));
        }
        Ok(())
    }

    /// Maps a uniform draw in `[0, 100)` onto the temperature-control
    /// branches using cumulative thresholds.
    pub fn branch(&self, draw: f64) -> Destination {
        let exit = self.exit_pct;
        let purchase = exit + self.ticket_purchase_pct;
        let season = purchase + self.season_pass_gate_pct;
        if draw < exit {
            Destination::Exit
        } else if draw < purchase {
            Destination::Block(BlockKind::TicketPurchase)
        } else if draw < season {
            Destination::Block(BlockKind::SeasonPassGate)
        } else {
            Destination::Block(BlockKind::TicketGate)
        }
    }
}

pub fn destination(
    from: BlockKind,
    routing: &RoutingConfig,
    variates: &mut dyn VariateSource,
) -> Destination {
    match from {
        BlockKind::TemperatureControl => {
            variates.select_stream(Stream::Routing);
            routing.branch(variates.uniform(0.0, 100.0))
        }
        BlockKind::TicketPurchase => Destination::Block(BlockKind::TicketGate),
        BlockKind::SeasonPassGate | BlockKind::TicketGate => {
            Destination::Block(BlockKind::CredentialCheck)
        }
        BlockKind::CredentialCheck => Destination::Exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variates::scripted::ScriptedVariates;
    use crate::variates::StreamRng;

    #[test]
    fn branch_uses_cumulative_thresholds() {
        let routing = RoutingConfig {
            exit_pct: 10.0,
            ticket_purchase_pct: 20.0,
            season_pass_gate_pct: 30.0,
        };
        assert_eq!(routing.branch(0.0), Destination::Exit);
        assert_eq!(routing.branch(9.99), Destination::Exit);
        assert_eq!(
            routing.branch(10.0),
            Destination::Block(BlockKind::TicketPurchase)
        );
        assert_eq!(
            routing.branch(59.9),
            Destination::Block(BlockKind::SeasonPassGate)
        );
        assert_eq!(routing.branch(60.0), Destination::Block(BlockKind::TicketGate));
    }

    #[test]
    fn fixed_routes_do_not_draw() {
        let routing = RoutingConfig::default();
        let mut variates = ScriptedVariates::new(1.0, 0.0).with_routes(&[1.0]);
        assert_eq!(
            destination(BlockKind::TicketPurchase, &routing, &mut variates),
            Destination::Block(BlockKind::TicketGate)
        );
        assert_eq!(
            destination(BlockKind::SeasonPassGate, &routing, &mut variates),
            Destination::Block(BlockKind::CredentialCheck)
        );
        assert_eq!(
            destination(BlockKind::TicketGate, &routing, &mut variates),
            Destination::Block(BlockKind::CredentialCheck)
        );
        assert_eq!(
            destination(BlockKind::CredentialCheck, &routing, &mut variates),
            Destination::Exit
        );
        assert_eq!(variates.routes.len(), 1);
    }

    #[test]
    fn temperature_branches_match_configured_shares() {
        let routing = RoutingConfig::default();
        let mut variates = StreamRng::plant_seeds(3);
        let n = 20_000;
        let exits = (0..n)
            .filter(|_| {
                destination(BlockKind::TemperatureControl, &routing, &mut variates)
                    == Destination::Exit
            })
            .count();
        let share = exits as f64 / n as f64 * 100.0;
        assert!((share - routing.exit_pct).abs() < 1.0, "exit share {share}");
    }

    #[test]
    fn validate_rejects_oversubscribed_shares() {
        let routing = RoutingConfig {
            exit_pct: 50.0,
            ticket_purchase_pct: 40.0,
            season_pass_gate_pct: 20.0,
        };
        let err = routing.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid routing: percentages sum to 110 (max 100)"
        );
    }
}
