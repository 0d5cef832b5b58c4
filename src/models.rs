use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUM_SLOTS: usize = 3;
pub const NUM_BLOCKS: usize = 5;

/// Seconds in one month of 19 working hours per day.
pub const SECONDS_PER_MONTH: f64 = 60.0 * 60.0 * 19.0 * 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    TemperatureControl,
    TicketPurchase,
    SeasonPassGate,
    TicketGate,
    CredentialCheck,
}

impl BlockKind {
    pub const ALL: [BlockKind; NUM_BLOCKS] = [
        BlockKind::TemperatureControl,
        BlockKind::TicketPurchase,
        BlockKind::SeasonPassGate,
        BlockKind::TicketGate,
        BlockKind::CredentialCheck,
    ];

    pub fn index(self) -> usize {
        match self {
            BlockKind::TemperatureControl => 0,
            BlockKind::TicketPurchase => 1,
            BlockKind::SeasonPassGate => 2,
            BlockKind::TicketGate => 3,
            BlockKind::CredentialCheck => 4,
        }
    }

    /// Loss blocks have no waiting room: an arrival finding every server
    /// busy is discarded.
    pub fn is_loss_system(self) -> bool {
        matches!(self, BlockKind::CredentialCheck)
    }

    pub fn label(self) -> &'static str {
        match self {
            BlockKind::TemperatureControl => "temperature-control",
            BlockKind::TicketPurchase => "ticket-purchase",
            BlockKind::SeasonPassGate => "season-pass-gate",
            BlockKind::TicketGate => "ticket-gate",
            BlockKind::CredentialCheck => "credential-check",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per block, addressed by `BlockKind`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PerBlock<T> {
    pub temperature_control: T,
    pub ticket_purchase: T,
    pub season_pass_gate: T,
    pub ticket_gate: T,
    pub credential_check: T,
}

impl<T> PerBlock<T> {
    pub fn from_fn(mut f: impl FnMut(BlockKind) -> T) -> Self {
        Self {
            temperature_control: f(BlockKind::TemperatureControl),
            ticket_purchase: f(BlockKind::TicketPurchase),
            season_pass_gate: f(BlockKind::SeasonPassGate),
            ticket_gate: f(BlockKind::TicketGate),
            credential_check: f(BlockKind::CredentialCheck),
        }
    }

    pub fn get(&self, kind: BlockKind) -> &T {
        match kind {
            BlockKind::TemperatureControl => &self.temperature_control,
            BlockKind::TicketPurchase => &self.ticket_purchase,
            BlockKind::SeasonPassGate => &self.season_pass_gate,
            BlockKind::TicketGate => &self.ticket_gate,
            BlockKind::CredentialCheck => &self.credential_check,
        }
    }

    pub fn get_mut(&mut self, kind: BlockKind) -> &mut T {
        match kind {
            BlockKind::TemperatureControl => &mut self.temperature_control,
            BlockKind::TicketPurchase => &mut self.ticket_purchase,
            BlockKind::SeasonPassGate => &mut self.season_pass_gate,
            BlockKind::TicketGate => &mut self.ticket_gate,
            BlockKind::CredentialCheck => &mut self.credential_check,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockKind, &T)> {
        BlockKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(BlockKind, &T) -> U) -> PerBlock<U> {
        PerBlock::from_fn(|kind| f(kind, self.get(kind)))
    }
}

impl<T: Copy> PerBlock<T> {
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub slots: Vec<SlotConfig>,
    pub service_means: PerBlock<f64>,
    #[serde(default = "default_unit_costs")]
    pub unit_costs: PerBlock<f64>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub finite: FiniteConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// One time-of-day regime: how long it lasts, how fast customers arrive
/// and how many servers each block keeps online.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SlotConfig {
    pub duration: f64,
    pub arrival_rate: f64,
    pub servers: PerBlock<usize>,
}

/// Percentages applied to jobs leaving temperature control. Whatever is
/// left after the three listed shares goes to the ticket gate.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RoutingConfig {
    pub exit_pct: f64,
    pub ticket_purchase_pct: f64,
    pub season_pass_gate_pct: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FiniteConfig {
    pub repetitions: usize,
    #[serde(default)]
    pub sample_interval: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchConfig {
    pub size: usize,
    pub count: usize,
}

impl SimConfig {
    pub fn slot(&self, slot: usize) -> &SlotConfig {
        &self.slots[slot]
    }

    pub fn horizon(&self) -> f64 {
        self.slots.iter().map(|slot| slot.duration).sum()
    }

    /// Start time of `slot` within a finite-horizon day.
    pub fn slot_start(&self, slot: usize) -> f64 {
        self.slots.iter().take(slot).map(|slot| slot.duration).sum()
    }

    /// Largest server count ever requested for `kind`.
    pub fn max_servers(&self, kind: BlockKind) -> usize {
        self.slots
            .iter()
            .map(|slot| *slot.servers.get(kind))
            .max()
            .unwrap_or(0)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            slots: vec![
                SlotConfig {
                    duration: 18_000.0,
                    arrival_rate: 0.7,
                    servers: servers(8, 22, 2, 10, 11),
                },
                SlotConfig {
                    duration: 14_400.0,
                    arrival_rate: 1.2,
                    servers: servers(15, 44, 3, 18, 20),
                },
                SlotConfig {
                    duration: 36_000.0,
                    arrival_rate: 0.6,
                    servers: servers(7, 21, 2, 9, 10),
                },
            ],
            service_means: PerBlock {
                temperature_control: 9.0,
                ticket_purchase: 110.0,
                season_pass_gate: 15.0,
                ticket_gate: 13.0,
                credential_check: 14.0,
            },
            unit_costs: default_unit_costs(),
            routing: RoutingConfig::default(),
            finite: FiniteConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            exit_pct: 5.0,
            ticket_purchase_pct: 25.0,
            season_pass_gate_pct: 10.0,
        }
    }
}

impl Default for FiniteConfig {
    fn default() -> Self {
        Self {
            repetitions: 64,
            sample_interval: Some(300.0),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 256,
            count: 64,
        }
    }
}

fn servers(
    temperature_control: usize,
    ticket_purchase: usize,
    season_pass_gate: usize,
    ticket_gate: usize,
    credential_check: usize,
) -> PerBlock<usize> {
    PerBlock {
        temperature_control,
        ticket_purchase,
        season_pass_gate,
        ticket_gate,
        credential_check,
    }
}

fn default_seed() -> u64 {
    521_312_312
}

fn default_unit_costs() -> PerBlock<f64> {
    PerBlock {
        temperature_control: 1200.0,
        ticket_purchase: 1800.0,
        season_pass_gate: 1000.0,
        ticket_gate: 1000.0,
        credential_check: 1400.0,
    }
}
