//! Lifecycle and validation contracts shared across `flowgate-*` crates.

use crate::Result;

/// A component with an explicit startup/teardown sequence distinct from
/// construction. `flowgate_scheduler::Port` is the canonical implementor:
/// built once from a `PortSpec`, `initialize`d before it serves traffic,
/// and `shutdown` when the port is torn down.
pub trait Lifecycle {
    /// Run once after construction, before the component takes traffic.
    fn initialize(&mut self) -> Result<()>;

    /// Run once when the component stops accepting new work. Implementors
    /// still holding state (e.g. queued packets) should report it rather
    /// than discard it silently.
    fn shutdown(&mut self) -> Result<()>;

    /// A cheap, side-effect-free check a supervisor can poll on a timer.
    fn health_check(&self) -> Result<()>;
}

/// A component whose fields can each be individually well-formed yet
/// collectively inconsistent — `flowgate_scheduler::PortSpec` is the
/// canonical implementor, checking that its per-queue vectors all agree in
/// length with `queue_count` before a `Port` is built from it.
pub trait Validate {
    /// Check cross-field invariants a type system alone can't express.
    fn validate(&self) -> Result<()>;
}
