//! # Valuation Store
//!
//! Durable persistence for the simulated portfolio and the global reference
//! valuation. The store is the single writer of valuation state: simulation
//! ticks hand it a complete next portfolio and it swaps that in atomically.
//!
//! ## Architecture
//!
//! - **StorageBackend**: async key-value trait (get/set/remove by string key)
//! - **LocalStorage**: one JSON file per key under a data directory
//! - **InMemoryStorage**: process-local map, for tests and server-side contexts
//! - **Records**: schema-versioned JSON records with an explicit migration step
//! - **ValuationStore**: validation, self-healing resets and the reference valuation
//!
//! The store can also run without any backend, in which case state lives only
//! in memory for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use valuation_store::{InMemoryStorage, StoreConfig, ValuationStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = ValuationStore::new(StoreConfig::default(), Arc::new(InMemoryStorage::new()));
//!     let positions = store.load().await;
//!     assert!(!positions.is_empty());
//!
//!     let reference = store.adjust_global_reference(2.0).await;
//!     assert!(reference > 0.0);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod defaults;
pub mod error;
pub mod record;
pub mod store;

pub use backend::{InMemoryStorage, LocalStorage, StorageBackend};
pub use config::StoreConfig;
pub use defaults::{default_portfolio, DEFAULT_REFERENCE_SATS};
pub use error::{Result, StoreError};
pub use record::{PortfolioRecord, ReferenceRecord, SCHEMA_VERSION};
pub use store::{PortfolioWrite, ValuationStore};

/// Storage key of the current portfolio record
pub const PORTFOLIO_KEY: &str = "nav-engine/portfolio";

/// Storage key of the global reference valuation record
pub const REFERENCE_KEY: &str = "nav-engine/reference";

/// Key used by unversioned portfolio records; migrated and removed on load
pub const LEGACY_PORTFOLIO_KEY: &str = "portfolio-data-v1";
