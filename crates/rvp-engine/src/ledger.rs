//! Edge ledger: call edges, conditional-branch sites, and jump edges.
//!
//! Three keyed tables, all keyed by source PC for fast updates on the hot
//! recording path. Only forward edges are kept; the emitter walks PCs in
//! order and reads each site directly.

use rustc_hash::FxHashMap;
use rvp_index::MAX_EVENTS;

/// One outgoing call edge from a call site.
#[derive(Clone, Debug)]
pub struct CallEdge {
    /// Callee entry PC.
    pub to_pc: u64,
    /// Times the edge was traversed.
    pub count: u64,
    /// Inclusive cost accumulated over all closed activations.
    pub inclusive_events: [u64; MAX_EVENTS],
    /// Edge created by cross-function straight-line execution.
    pub is_fall_through: bool,
}

/// All call edges leaving one PC.
#[derive(Clone, Debug, Default)]
pub struct CallSite {
    pub edges: Vec<CallEdge>,
}

impl CallSite {
    fn edge_mut(&mut self, to_pc: u64) -> &mut CallEdge {
        if let Some(idx) = self.edges.iter().position(|e| e.to_pc == to_pc) {
            return &mut self.edges[idx];
        }
        self.edges.push(CallEdge {
            to_pc,
            count: 0,
            inclusive_events: [0; MAX_EVENTS],
            is_fall_through: false,
        });
        self.edges.last_mut().unwrap()
    }

    /// Look up the edge to `to_pc`.
    pub fn edge(&self, to_pc: u64) -> Option<&CallEdge> {
        self.edges.iter().find(|e| e.to_pc == to_pc)
    }
}

/// Outcome statistics for one conditional-branch site.
///
/// All taken outcomes collapse onto a single `taken_target`; a conditional
/// branch with a computed target would lose the distinction. Known
/// limitation of the input stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchSite {
    pub total_executed: u64,
    pub taken_target: u64,
    pub taken_count: u64,
    pub fallthrough_target: u64,
    pub fallthrough_count: u64,
}

impl BranchSite {
    /// Both outcomes observed at least once.
    pub fn both_outcomes_seen(&self) -> bool {
        self.taken_count > 0 && self.fallthrough_count > 0
    }
}

/// One unconditional-jump edge.
#[derive(Clone, Copy, Debug)]
pub struct JumpEdge {
    pub to_pc: u64,
    pub count: u64,
}

/// All jump edges leaving one PC.
#[derive(Clone, Debug, Default)]
pub struct JumpSite {
    pub edges: Vec<JumpEdge>,
}

/// The three forward edge tables.
#[derive(Debug, Default)]
pub struct EdgeLedger {
    calls: FxHashMap<u64, CallSite>,
    branches: FxHashMap<u64, BranchSite>,
    jumps: FxHashMap<u64, JumpSite>,
}

impl EdgeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one traversal of the call edge `from_pc -> to_pc`.
    pub fn record_call(&mut self, from_pc: u64, to_pc: u64, is_fall_through: bool) {
        let edge = self.calls.entry(from_pc).or_default().edge_mut(to_pc);
        edge.count += 1;
        edge.is_fall_through |= is_fall_through;
    }

    /// Add an inclusive-cost delta to the call edge `from_pc -> to_pc`.
    ///
    /// The edge is created if a misclassified return arrives before its
    /// call was ever counted.
    pub fn add_inclusive(&mut self, from_pc: u64, to_pc: u64, delta: &[u64; MAX_EVENTS]) {
        let edge = self.calls.entry(from_pc).or_default().edge_mut(to_pc);
        for (acc, d) in edge.inclusive_events.iter_mut().zip(delta) {
            *acc += d;
        }
    }

    /// Record one execution of the conditional branch at `from_pc`.
    ///
    /// Returns the updated site.
    pub fn record_branch(&mut self, from_pc: u64, to_pc: u64, sequential: bool) -> &BranchSite {
        let site = self.branches.entry(from_pc).or_default();
        site.total_executed += 1;
        if sequential {
            site.fallthrough_target = to_pc;
            site.fallthrough_count += 1;
        } else {
            site.taken_target = to_pc;
            site.taken_count += 1;
        }
        site
    }

    /// Count one traversal of the jump edge `from_pc -> to_pc`.
    ///
    /// Returns the number of distinct targets seen from `from_pc`.
    pub fn record_jump(&mut self, from_pc: u64, to_pc: u64) -> usize {
        let site = self.jumps.entry(from_pc).or_default();
        match site.edges.iter_mut().find(|e| e.to_pc == to_pc) {
            Some(edge) => edge.count += 1,
            None => site.edges.push(JumpEdge { to_pc, count: 1 }),
        }
        site.edges.len()
    }

    /// Call edges leaving `pc`, if it is a call site.
    pub fn call_site(&self, pc: u64) -> Option<&CallSite> {
        self.calls.get(&pc)
    }

    /// The call edge `from_pc -> to_pc`, if recorded.
    pub fn call_edge(&self, from_pc: u64, to_pc: u64) -> Option<&CallEdge> {
        self.calls.get(&from_pc).and_then(|s| s.edge(to_pc))
    }

    /// Branch statistics for `pc`, if it is a conditional-branch site.
    pub fn branch_site(&self, pc: u64) -> Option<&BranchSite> {
        self.branches.get(&pc)
    }

    /// Jump edges leaving `pc`, if any.
    pub fn jump_site(&self, pc: u64) -> Option<&JumpSite> {
        self.jumps.get(&pc)
    }

    /// Number of distinct call sites.
    pub fn call_site_count(&self) -> usize {
        self.calls.len()
    }

    /// Number of distinct conditional-branch sites.
    pub fn branch_site_count(&self) -> usize {
        self.branches.len()
    }
}
