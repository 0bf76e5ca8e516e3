//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and owns the runtime state:
//! - Counter registry (storage of fixed-window counters)
//! - Admission limiter (decision making and garbage collection)
//! - Event aggregator (grouping of notification records)
//! - Periodic housekeeping (`async` feature)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod aggregator;
pub mod error;
#[cfg(feature = "async")]
pub mod housekeeping;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
