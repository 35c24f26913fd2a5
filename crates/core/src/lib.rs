//! # flowgate-core
//!
//! Shared types, error kinds, and clock abstraction used by every other
//! `flowgate-*` crate.
//!
//! ## Module Structure
//!
//! - `types`: `Packet`, weight/quantum newtypes, queue index helpers
//! - `clock`: a `Clock` trait so the scheduler core never calls
//!   `Instant::now()` directly and tests can drive time explicitly
//! - `traits`: `Validate` and `Lifecycle`, shared across crate boundaries
//! - `error`: the unified `Error`/`Result` pair

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use error::{Error, Result};
pub use types::{Packet, Quantum, Weight};
