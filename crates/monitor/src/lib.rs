//! GPU idle monitor binary support: configuration, logging setup and the
//! health/metrics HTTP endpoint

pub mod api;
pub mod config;
pub mod logging;
