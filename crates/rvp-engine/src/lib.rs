//! Streaming control-flow reconstruction engine.
//!
//! Consumes a per-retired-instruction stream of `(pc, event deltas, dest-reg
//! hint, branch hint)` tuples and rebuilds a call graph with inclusive costs:
//! self costs per PC, call edges, conditional-branch outcomes, and
//! unconditional jump counts. The host never says what kind of branch
//! executed; the transition classifier infers it from the successor PC, the
//! static function map, and the link-register hint, and a shadow call stack
//! turns the classified transitions into inclusive cost windows.

mod classifier;
mod engine;
mod events;
mod ledger;
mod stack;

pub use classifier::{classify_transition, PrevInstr, Transition, SHORT_BRANCH_WINDOW};
pub use engine::{EngineConfig, Profiler};
pub use events::{EventSet, EV_BC, EV_BCM, EV_BI, EV_BIM, EV_CYCLE, EV_IR};
pub use ledger::{BranchSite, CallEdge, CallSite, EdgeLedger, JumpEdge, JumpSite};
pub use stack::{Frame, ShadowStack};

pub use rvp_index::MAX_EVENTS;
