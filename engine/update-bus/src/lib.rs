//! # Update Bus
//!
//! Debounced publish/subscribe mechanism that keeps every consumer showing
//! the same NAV, portfolio, token price and currency preference.
//!
//! ## Architecture
//!
//! - **Topic**: the event streams, plus tolerated legacy names
//! - **BusEvent**: typed payload per topic
//! - **Debouncer**: trailing-edge collapse of bursts into the latest value
//! - **UpdateBus**: listener registry with drop-to-unsubscribe handles
//!
//! ## Usage
//!
//! ```rust
//! use price_simulator::DisplayCurrency;
//! use update_bus::{BusConfig, BusEvent, Topic, UpdateBus};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = UpdateBus::new(BusConfig::default());
//!     let subscription = bus.subscribe(Topic::CurrencyChanged, |event| {
//!         println!("currency changed: {:?}", event);
//!     });
//!
//!     bus.publish(BusEvent::CurrencyChanged(DisplayCurrency::Usd));
//!     bus.flush();
//!     subscription.unsubscribe();
//! }
//! ```

pub mod bus;
pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod topic;

pub use bus::{Subscription, UpdateBus};
pub use config::BusConfig;
pub use debounce::Debouncer;
pub use error::{BusError, Result};
pub use event::BusEvent;
pub use topic::Topic;
