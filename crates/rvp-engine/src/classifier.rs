//! Runtime transition classification.
//!
//! The host only reports whether an instruction *can* alter control flow and
//! which destination register it writes. What actually happened between two
//! retired PCs has to be inferred from three signals: sequential vs
//! non-sequential successor, same vs different statically-named function, and
//! the link-register hint. The decision table below trades correctness for
//! completeness; without a decoded opcode it cannot tell an indirect jump
//! from a direct one, so `IndirectJump` is never produced here.

use rvp_index::{FnId, FunctionKind, PcTable};

/// Non-sequential same-function hops at most this many bytes forward are
/// treated as conditional branches rather than jumps.
pub const SHORT_BRANCH_WINDOW: u64 = 32;

/// What the engine decided happened between two retired instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Plain sequential execution.
    None,
    /// Conditional branch site (taken or fallen through).
    Branch,
    /// Unconditional jump within a function.
    DirectJump,
    /// Indirect jump; reserved for a future host-provided hint.
    IndirectJump,
    /// Function call.
    Call,
    /// Call that reuses the caller's return address.
    TailCall,
    /// Function return.
    Return,
    /// Entered the next function by straight-line execution.
    FallThrough,
}

/// Snapshot of the previously retired instruction.
#[derive(Clone, Copy, Debug)]
pub struct PrevInstr {
    pub pc: u64,
    /// Destination register hint: -1 unknown, 0 zero register (tail-call
    /// intent), >0 a real link register.
    pub dest_reg: i32,
    pub inst_size: u32,
    pub was_branch: bool,
}

impl PrevInstr {
    /// Whether `curr_pc` directly follows this instruction.
    pub fn is_sequential(&self, curr_pc: u64) -> bool {
        curr_pc == self.pc.wrapping_add(self.inst_size as u64)
    }
}

/// Classify the transition from `prev` to `curr_pc`.
///
/// `return_func` is the caller function of the shadow-stack top, used to
/// recognize returns: landing in the function that made the innermost open
/// call is read as coming back to it. Rules are evaluated in order; the
/// first match wins.
pub fn classify_transition(
    table: &PcTable,
    prev: PrevInstr,
    curr_pc: u64,
    return_func: Option<FnId>,
) -> Transition {
    let sequential = prev.is_sequential(curr_pc);

    let (Some(from), Some(to)) = (table.get(prev.pc), table.get(curr_pc)) else {
        // Unknown code: assume a not-taken branch when sequential, a plain
        // jump otherwise.
        return if sequential {
            Transition::Branch
        } else {
            Transition::DirectJump
        };
    };

    let same_func = from.func == to.func;

    if !prev.was_branch {
        if same_func {
            return Transition::None;
        }
        if from.kind == FunctionKind::Normal {
            return Transition::FallThrough;
        }
    }

    // Restore helpers hand control back to user code with a plain `ret`;
    // internal sequential flow between them is not an edge.
    if from.kind == FunctionKind::RestoreHelper {
        if to.kind == FunctionKind::Normal && !sequential {
            return Transition::Return;
        }
        if to.kind == FunctionKind::RestoreHelper && sequential {
            return Transition::None;
        }
    }

    if !sequential {
        if to.kind == FunctionKind::SaveHelper {
            return Transition::Call;
        }
        if to.kind == FunctionKind::RestoreHelper {
            return Transition::TailCall;
        }
        if return_func == Some(to.func) {
            return Transition::Return;
        }
        if !same_func {
            return if prev.dest_reg == 0 {
                Transition::TailCall
            } else {
                Transition::Call
            };
        }
    }

    if sequential {
        // Branch instruction whose successor fell through.
        return Transition::Branch;
    }

    // Non-sequential within one function: backward hops are loop branches,
    // short forward hops are heuristically conditional, the rest are jumps.
    if curr_pc < prev.pc {
        return Transition::Branch;
    }
    if curr_pc - prev.pc <= SHORT_BRANCH_WINDOW {
        return Transition::Branch;
    }
    Transition::DirectJump
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PcTable {
        let mut t = PcTable::new();
        t.load_pc_info(0x1000, "main", "addi sp,sp,-16", "main.c", 1);
        t.load_pc_info(0x1004, "main", "jal ra,2000", "main.c", 2);
        t.load_pc_info(0x1008, "main", "mv s0,a0", "main.c", 3);
        t.load_pc_info(0x2000, "f", "addi a0,a0,1", "f.c", 10);
        t.load_pc_info(0x2004, "f", "ret", "f.c", 11);
        t.load_pc_info(0x2010, "f", "xor a0,a0,a1", "f.c", 13);
        t.load_pc_info(0x2040, "f", "sub a0,a0,a1", "f.c", 14);
        t.load_pc_info(0x3000, "g", "nop", "g.c", 20);
        t.load_pc_info(0x7000, "__riscv_save_0", "addi sp,sp,-64", "", 0);
        t.load_pc_info(0x7100, "__riscv_restore_0", "ld s0,0(sp)", "", 0);
        t.load_pc_info(0x7104, "__riscv_restore_1", "ret", "", 0);
        t
    }

    fn prev(pc: u64, dest_reg: i32, was_branch: bool) -> PrevInstr {
        PrevInstr {
            pc,
            dest_reg,
            inst_size: 4,
            was_branch,
        }
    }

    fn fn_id(t: &PcTable, pc: u64) -> FnId {
        t.get(pc).unwrap().func
    }

    #[test]
    fn test_sequential_non_branch_same_function() {
        let t = table();
        let kind = classify_transition(&t, prev(0x1000, -1, false), 0x1004, None);
        assert_eq!(kind, Transition::None);
    }

    #[test]
    fn test_cross_function_fall_through() {
        let mut t = PcTable::new();
        t.load_pc_info(0x6000, "a", "nop", "a.c", 1);
        t.load_pc_info(0x6004, "a", "nop", "a.c", 2);
        t.load_pc_info(0x6008, "b", "nop", "b.c", 5);
        let kind = classify_transition(&t, prev(0x6004, -1, false), 0x6008, None);
        assert_eq!(kind, Transition::FallThrough);
    }

    #[test]
    fn test_restore_helper_hands_back() {
        let t = table();
        let kind = classify_transition(&t, prev(0x7100, -1, true), 0x1008, None);
        assert_eq!(kind, Transition::Return);
    }

    #[test]
    fn test_restore_helper_internal_flow() {
        let t = table();
        let kind = classify_transition(&t, prev(0x7100, -1, true), 0x7104, None);
        assert_eq!(kind, Transition::None);
    }

    #[test]
    fn test_jump_into_save_helper_is_call() {
        let t = table();
        // Even with a zero destination register the save-helper target wins.
        let kind = classify_transition(&t, prev(0x1004, 0, true), 0x7000, None);
        assert_eq!(kind, Transition::Call);
    }

    #[test]
    fn test_jump_into_restore_helper_is_tail_call() {
        let t = table();
        let kind = classify_transition(&t, prev(0x2004, 1, true), 0x7100, None);
        assert_eq!(kind, Transition::TailCall);
    }

    #[test]
    fn test_return_to_stack_caller() {
        let t = table();
        let main = fn_id(&t, 0x1004);
        let kind = classify_transition(&t, prev(0x2004, -1, true), 0x1008, Some(main));
        assert_eq!(kind, Transition::Return);
    }

    #[test]
    fn test_tail_call_on_zero_link_register() {
        let t = table();
        let kind = classify_transition(&t, prev(0x2004, 0, true), 0x3000, None);
        assert_eq!(kind, Transition::TailCall);
    }

    #[test]
    fn test_call_on_cross_function_jump() {
        let t = table();
        let kind = classify_transition(&t, prev(0x1004, 1, true), 0x2000, None);
        assert_eq!(kind, Transition::Call);
        // Unknown link register defaults to a call too.
        let kind = classify_transition(&t, prev(0x1004, -1, true), 0x2000, None);
        assert_eq!(kind, Transition::Call);
    }

    #[test]
    fn test_branch_not_taken() {
        let t = table();
        let kind = classify_transition(&t, prev(0x2000, -1, true), 0x2004, None);
        assert_eq!(kind, Transition::Branch);
    }

    #[test]
    fn test_backward_branch() {
        let t = table();
        let kind = classify_transition(&t, prev(0x2004, -1, true), 0x2000, None);
        assert_eq!(kind, Transition::Branch);
    }

    #[test]
    fn test_short_forward_branch() {
        let t = table();
        // 0x2004 -> 0x2010 is 12 bytes forward, within the window.
        let kind = classify_transition(&t, prev(0x2004, -1, true), 0x2010, None);
        assert_eq!(kind, Transition::Branch);
    }

    #[test]
    fn test_long_forward_jump() {
        let t = table();
        // 0x2004 -> 0x2040 is 60 bytes forward, beyond the window.
        assert!(0x2040 - 0x2004 > SHORT_BRANCH_WINDOW);
        let kind = classify_transition(&t, prev(0x2004, -1, true), 0x2040, None);
        assert_eq!(kind, Transition::DirectJump);
    }

    #[test]
    fn test_unknown_pcs() {
        let t = table();
        let kind = classify_transition(&t, prev(0xdead0000, -1, true), 0xdead0004, None);
        assert_eq!(kind, Transition::Branch);
        let kind = classify_transition(&t, prev(0xdead0000, -1, true), 0xbeef0000, None);
        assert_eq!(kind, Transition::DirectJump);
    }

    #[test]
    fn test_compressed_sequential() {
        let mut t = PcTable::new();
        t.load_pc_info(0x1000, "f", "c.nop", "f.c", 1);
        t.load_pc_info(0x1002, "f", "c.addi a0,1", "f.c", 2);
        let p = PrevInstr {
            pc: 0x1000,
            dest_reg: -1,
            inst_size: 2,
            was_branch: true,
        };
        assert_eq!(classify_transition(&t, p, 0x1002, None), Transition::Branch);
    }
}
