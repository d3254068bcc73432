// Fixed-rate polling of trigger sources

pub mod engine;

pub use engine::{PollingScheduler, TriggerFlow};
