//! State module for tracking check progress
//!
//! # Components
//!
//! - `CheckState`: the per-URL life cycle (created, syntax checked, connected, ...)
//! - `DomainState`: per-host request timing
//! - `HostThrottle`: thread-safe map of `DomainState`s enforcing a minimum delay between requests

mod check_state;
mod domain_state;

// Re-export main types
pub use check_state::CheckState;
pub use domain_state::{DomainState, HostThrottle};
