use thiserror::Error;

use crate::models::BlockKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("expected {expected} time slots, got {got}")]
    InvalidSlotCount { expected: usize, got: usize },
    #[error("slot {0} duration must be > 0")]
    InvalidSlotDuration(usize),
    #[error("slot {0} arrival rate must be > 0")]
    InvalidArrivalRate(usize),
    #[error("service mean must be > 0 for block {0}")]
    InvalidServiceMean(BlockKind),
    #[error("unit cost must be >= 0 for block {0}")]
    InvalidUnitCost(BlockKind),
    #[error("slot {slot} needs at least one server in block {block}")]
    InvalidCapacity { slot: usize, block: BlockKind },
    #[error("invalid routing: {0}")]
    InvalidRouting(String),
    #[error("repetitions must be greater than 0")]
    RepetitionsZero,
    #[error("batch size must be greater than 0")]
    BatchSizeZero,
    #[error("batch count must be greater than 0")]
    BatchCountZero,
    #[error("sample interval must be > 0 (got {0})")]
    InvalidSampleInterval(f64),
    #[error("slot must be between 0 and {max} (got {got})")]
    InvalidSlot { got: usize, max: usize },
    #[error("no pending completion at time {0}")]
    EventNotFound(f64),
    #[error("server {server} of block {block} has no waiting job to serve")]
    MissingJob { block: BlockKind, server: usize },
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Output(String),
    #[error("{0}")]
    Cli(String),
}

pub type Result<T> = std::result::Result<T, Error>;
