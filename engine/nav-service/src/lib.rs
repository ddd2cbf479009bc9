//! NAV Engine Service Library
//!
//! Wires the price simulator, valuation store, NAV calculator and update bus
//! into one service with configuration loading, logging, timer tasks and
//! graceful shutdown.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod signals;

pub use config::{LoggingConfig, ScheduleConfig, ServiceConfig, ServiceSettings, StorageKind};
pub use logging::initialize_logging_with_config;
pub use scheduler::SchedulerHandle;
pub use service::{NavService, TickReport};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and `NAV_*` environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
