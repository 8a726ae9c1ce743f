//! Streaming driver: self-cost accounting plus transition dispatch.

use rvp_index::{FnId, FunctionKind, PcTable, MAX_EVENTS};

use crate::classifier::{classify_transition, PrevInstr, Transition};
use crate::events::{EventSet, EV_BC, EV_BCM, EV_BI, EV_BIM};
use crate::ledger::EdgeLedger;
use crate::stack::{Frame, ShadowStack};

/// Engine-side recording options.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Charge the `Bc`/`Bcm`/`Bi`/`Bim` events.
    pub branch_sim: bool,
    /// Track unconditional-jump edges and emit `jcnd=`/`jump=` lines.
    pub collect_jumps: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            branch_sim: true,
            collect_jumps: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch_sim(mut self, branch_sim: bool) -> Self {
        self.branch_sim = branch_sim;
        self
    }

    pub fn with_collect_jumps(mut self, collect_jumps: bool) -> Self {
        self.collect_jumps = collect_jumps;
        self
    }
}

/// The profile reconstruction engine.
///
/// Strictly single-threaded and sequential; recording entry points are total
/// functions that survive partial, malformed, or inconsistent traces. The
/// engine is never the source of stream termination.
pub struct Profiler {
    table: PcTable,
    events: EventSet,
    config: EngineConfig,
    ledger: EdgeLedger,
    stack: ShadowStack,
    running_totals: [u64; MAX_EVENTS],

    // Previous-instruction state for the classifier.
    last_pc: u64,
    last_dest_reg: i32,
    last_was_branch: bool,
    last_inst_size: u32,
    last_func: FnId,

    // Pass-through for save-helper trampolines: the logical caller of the
    // call currently routed through a `__riscv_save_*` helper.
    real_caller_pc: u64,
    real_caller_func: FnId,
}

impl Profiler {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let table = PcTable::new();
        let unknown = table.unknown_fn();
        Self {
            table,
            events: EventSet::default(),
            config,
            ledger: EdgeLedger::new(),
            stack: ShadowStack::new(),
            running_totals: [0; MAX_EVENTS],
            last_pc: 0,
            last_dest_reg: -1,
            last_was_branch: false,
            last_inst_size: 4,
            last_func: unknown,
            real_caller_pc: 0,
            real_caller_func: unknown,
        }
    }

    /// Insert or overwrite static metadata for `pc`. Call before the trace.
    pub fn load_pc_info(&mut self, pc: u64, function: &str, assembly: &str, file: &str, line: u32) {
        self.table.load_pc_info(pc, function, assembly, file, line);
    }

    /// Set the active event-name prefix. Call before the trace.
    pub fn configure_events<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = EventSet::new(names);
    }

    /// Record one retired instruction with a single event delta.
    ///
    /// `dest_reg` convention: -1 unknown, 0 the zero register (tail-call
    /// intent), >0 a real link register. Out-of-range event indices are
    /// dropped but the control-flow bookkeeping still runs.
    pub fn record(&mut self, pc: u64, event_idx: u32, count: u64, dest_reg: i32, is_branch: bool) {
        self.table.ensure(pc);
        if (event_idx as usize) < MAX_EVENTS {
            self.credit(pc, event_idx as usize, count);
        }
        self.advance(pc, dest_reg, is_branch);
    }

    /// Record one retired instruction with a delta per event index.
    pub fn record_multi(&mut self, pc: u64, deltas: &[u64], dest_reg: i32, is_branch: bool) {
        self.table.ensure(pc);
        for (idx, &delta) in deltas.iter().take(MAX_EVENTS).enumerate() {
            if delta > 0 {
                self.credit(pc, idx, delta);
            }
        }
        self.advance(pc, dest_reg, is_branch);
    }

    /// Credit `count` of event `idx` to `pc` and the running totals.
    fn credit(&mut self, pc: u64, idx: usize, count: u64) {
        let info = self.table.ensure(pc);
        info.self_events[idx] += count;
        self.running_totals[idx] += count;
    }

    /// Classify the transition from the previous instruction and roll the
    /// previous-instruction state forward.
    ///
    /// Classification also fires on a function-name change with no branch
    /// hint: cross-function fall-throughs happen without one.
    fn advance(&mut self, pc: u64, dest_reg: i32, is_branch: bool) {
        let curr_func = self.func_of(pc);

        if self.last_pc != 0 && (self.last_was_branch || self.last_func != curr_func) {
            let prev = PrevInstr {
                pc: self.last_pc,
                dest_reg: self.last_dest_reg,
                inst_size: self.last_inst_size,
                was_branch: self.last_was_branch,
            };
            let return_func = self.stack.top().map(|f| f.caller_func);
            let kind = classify_transition(&self.table, prev, pc, return_func);
            self.handle_transition(kind, self.last_pc, pc, prev.is_sequential(pc));
        }

        self.last_pc = pc;
        self.last_dest_reg = dest_reg;
        self.last_was_branch = is_branch;
        self.last_inst_size = self.table.instruction_size(pc);
        self.last_func = curr_func;
    }

    /// Apply the ledger and stack effects of one classified transition.
    fn handle_transition(&mut self, kind: Transition, from_pc: u64, to_pc: u64, sequential: bool) {
        match kind {
            Transition::None => {}
            Transition::Call => self.on_call(from_pc, to_pc),
            Transition::TailCall => self.on_tail_call(from_pc, to_pc),
            Transition::FallThrough => self.on_fall_through(from_pc, to_pc),
            Transition::Return => self.on_return(),
            Transition::Branch => self.on_branch(from_pc, to_pc, sequential),
            Transition::DirectJump | Transition::IndirectJump => {
                self.on_jump(kind, from_pc, to_pc)
            }
        }
    }

    fn on_call(&mut self, from_pc: u64, to_pc: u64) {
        let (mut caller_pc, mut caller_func) = (from_pc, self.func_of(from_pc));

        // A call leaving a save helper is the second leg of a trampolined
        // call: attribute it to the stored logical caller so the helper is
        // transparent in the call graph.
        if self.kind_of(from_pc) == FunctionKind::SaveHelper && self.real_caller_pc != 0 {
            caller_pc = self.real_caller_pc;
            caller_func = self.real_caller_func;
        }
        if self.kind_of(to_pc) == FunctionKind::SaveHelper {
            self.real_caller_pc = caller_pc;
            self.real_caller_func = caller_func;
        }

        self.stack.push(Frame {
            caller_pc,
            callee_pc: to_pc,
            caller_func,
            callee_func: self.func_of(to_pc),
            entry_events: self.running_totals,
            is_tail_call: false,
            is_fall_through: false,
        });
        self.ledger.record_call(caller_pc, to_pc, false);
    }

    fn on_tail_call(&mut self, from_pc: u64, to_pc: u64) {
        // Restore helpers end in compiler-generated jumps back into user
        // code; those are covered by the return rule, not new activations.
        if self.kind_of(from_pc) == FunctionKind::RestoreHelper {
            return;
        }

        // The retained outer frame keeps the original caller's inclusive
        // window open; the tail frame inherits its caller function so a
        // return out of the chain still matches.
        let caller_func = self
            .stack
            .top()
            .map(|f| f.caller_func)
            .unwrap_or_else(|| self.func_of(from_pc));

        self.stack.push(Frame {
            caller_pc: from_pc,
            callee_pc: to_pc,
            caller_func,
            callee_func: self.func_of(to_pc),
            entry_events: self.running_totals,
            is_tail_call: true,
            is_fall_through: false,
        });
        self.ledger.record_call(from_pc, to_pc, false);
    }

    fn on_fall_through(&mut self, from_pc: u64, to_pc: u64) {
        self.stack.push(Frame {
            caller_pc: from_pc,
            callee_pc: to_pc,
            caller_func: self.func_of(from_pc),
            callee_func: self.func_of(to_pc),
            entry_events: self.running_totals,
            is_tail_call: false,
            is_fall_through: true,
        });
        self.ledger.record_call(from_pc, to_pc, true);
    }

    fn on_return(&mut self) {
        // A return against an empty stack means the trace started
        // mid-function; drop it.
        let Some(frame) = self.stack.pop() else {
            return;
        };

        let mut delta = [0u64; MAX_EVENTS];
        for (d, (now, entry)) in delta
            .iter_mut()
            .zip(self.running_totals.iter().zip(frame.entry_events.iter()))
        {
            *d = now.saturating_sub(*entry);
        }
        self.ledger
            .add_inclusive(frame.caller_pc, frame.callee_pc, &delta);

        // Closing a tail frame closes the whole chain: the frames beneath it
        // stopped being resumable when the tail call replaced their
        // continuation, and the tail callee's work belongs to each of their
        // inclusive windows.
        let mut was_tail = frame.is_tail_call;
        while was_tail {
            let Some(next) = self.stack.pop() else {
                break;
            };
            self.ledger
                .add_inclusive(next.caller_pc, next.callee_pc, &delta);
            was_tail = next.is_tail_call;
        }
    }

    fn on_branch(&mut self, from_pc: u64, to_pc: u64, sequential: bool) {
        let site = self.ledger.record_branch(from_pc, to_pc, sequential);
        let both_seen = site.both_outcomes_seen();

        if self.config.branch_sim {
            self.credit(from_pc, EV_BC, 1);
            // Minority-path estimator: once both outcomes have been seen,
            // every further execution charges one mispredict.
            if both_seen {
                self.credit(from_pc, EV_BCM, 1);
            }
        }
    }

    fn on_jump(&mut self, kind: Transition, from_pc: u64, to_pc: u64) {
        // Helpers are opaque; their internal jumps are not part of the
        // user-visible graph.
        if self.kind_of(from_pc).is_helper() {
            return;
        }

        let mut targets = 0;
        if self.config.collect_jumps {
            targets = self.ledger.record_jump(from_pc, to_pc);
        }
        if kind == Transition::IndirectJump && self.config.branch_sim {
            self.credit(from_pc, EV_BI, 1);
            if targets > 1 {
                self.credit(from_pc, EV_BIM, 1);
            }
        }
    }

    fn func_of(&self, pc: u64) -> FnId {
        self.table
            .get(pc)
            .map(|i| i.func)
            .unwrap_or_else(|| self.table.unknown_fn())
    }

    fn kind_of(&self, pc: u64) -> FunctionKind {
        self.table
            .get(pc)
            .map(|i| i.kind)
            .unwrap_or(FunctionKind::Normal)
    }

    // ============= Accessors =============

    pub fn table(&self) -> &PcTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut PcTable {
        &mut self.table
    }

    pub fn events(&self) -> &EventSet {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn ledger(&self) -> &EdgeLedger {
        &self.ledger
    }

    /// Running per-event totals over the whole trace.
    pub fn running_totals(&self) -> &[u64; MAX_EVENTS] {
        &self.running_totals
    }

    /// Current shadow-stack depth.
    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}
