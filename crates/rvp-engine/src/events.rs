//! Cost event configuration.
//!
//! Up to `MAX_EVENTS` counters ride along with every PC and call edge. The
//! active prefix and its names are fixed once before the trace begins and
//! are persisted into the output header. The branch-simulation events live
//! at well-known indices so the engine can charge them directly.

use rvp_index::MAX_EVENTS;

/// Instruction count.
pub const EV_IR: usize = 0;
/// Cycle count.
pub const EV_CYCLE: usize = 1;
/// Conditional branches executed.
pub const EV_BC: usize = 2;
/// Conditional branch mispredict estimate.
pub const EV_BCM: usize = 3;
/// Indirect branches executed.
pub const EV_BI: usize = 4;
/// Indirect branch mispredict estimate.
pub const EV_BIM: usize = 5;

/// Ordered set of active event names.
#[derive(Clone, Debug)]
pub struct EventSet {
    names: Vec<String>,
}

impl EventSet {
    /// Build an event set from ordered names, truncated to `MAX_EVENTS`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).take(MAX_EVENTS).collect();
        Self { names }
    }

    /// Number of active events.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if no events are configured.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Active event names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for EventSet {
    /// The fallback prefix used when the host never configures events.
    fn default() -> Self {
        Self::new(["Ir", "Cycle"])
    }
}
