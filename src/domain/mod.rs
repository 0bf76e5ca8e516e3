//! Domain layer - pure business logic with no infrastructure dependencies.
//!
//! This layer contains the core concepts and invariants of the system:
//! - Fixed-window arithmetic shared by both components
//! - Named rate limiting policies and per-identity counters
//! - Notification events, group keys and aggregated records
//! - Message templates
//!
//! All types in this layer are pure and easily testable; time is always passed in.

pub mod counter;
pub mod message;
pub mod notification;
pub mod policy;
pub mod window;
