//! Fulfillment service facade.
//!
//! Wires the catalog, link bank, ledger, discount registry and session
//! maps behind a single [`Fulfillment`] entry point, publishes outbound
//! notifications through an [`EventSink`], and runs the background
//! session reaper.

pub mod config;
pub mod events;
pub mod fulfillment;
pub mod reaper;

pub use config::FulfillmentConfig;
pub use events::{EventSink, InMemoryEventBus, OutboundEvent, Subscription};
pub use fulfillment::{DiscountApplication, Fulfillment, PaymentInstructions, StockLevel};
pub use reaper::{ReaperHandle, SessionReaper};
