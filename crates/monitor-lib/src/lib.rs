//! Idle GPU process monitor library
//!
//! This crate provides the core functionality for:
//! - Querying accelerator, process and container state through narrow source traits
//! - Deciding which GPU compute processes are idle past the threshold
//! - Warning about or terminating those processes
//! - Driving the poll cycle, log sink rotation, health checks and metrics

pub mod engine;
pub mod error;
pub mod executor;
pub mod health;
pub mod logfile;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod sources;

pub use engine::IdleDecisionEngine;
pub use error::{SourceError, SourceResult};
pub use executor::{ActionExecutor, ActionOutcome};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use scheduler::{CycleReport, CycleScheduler, CycleSchedulerBuilder};
