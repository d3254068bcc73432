// Event-driven batch launcher: trigger sources, launch gateway and the job/step engine

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod job;
pub mod jobs;
pub mod launch;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;

pub use launch::{CompletionListener, JobExecutionHandle, LaunchGateway, LogCompletionListener};
