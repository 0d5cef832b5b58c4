pub mod algorithms;
pub mod capacity;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod output;
pub mod routing;
pub mod runner;
pub mod state;
pub mod stats;
pub mod variates;
