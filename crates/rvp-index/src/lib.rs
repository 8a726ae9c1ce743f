//! Static per-PC metadata index for the rvp profile synthesizer.
//!
//! Holds the table of per-instruction facts harvested from a disassembly
//! listing before the trace stream starts: function, assembly text, source
//! file and line. The trace engine consults it on every retired instruction,
//! so lookups go through an `FxHashMap` and strings are interned once at
//! load time.

mod interner;
mod listing;

use rustc_hash::FxHashMap;

pub use interner::{FileId, FnId, Interner};
pub use listing::{load_listing, parse_listing};

/// Maximum number of cost events tracked per PC.
pub const MAX_EVENTS: usize = 10;

/// Name used for PCs the disassembly never described.
pub const UNKNOWN_NAME: &str = "unknown";

/// Errors from index construction.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no instructions found in listing {0}")]
    EmptyListing(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Function classification derived from the symbol name.
///
/// RISC-V toolchains emit `__riscv_save_*` / `__riscv_restore_*` millicode
/// trampolines that spill and reload callee-saved registers on behalf of the
/// real function; the engine treats them as transparent in the call graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    SaveHelper,
    RestoreHelper,
}

impl FunctionKind {
    /// Classify a function name by prefix.
    pub fn classify(name: &str) -> Self {
        if name.starts_with("__riscv_save") {
            FunctionKind::SaveHelper
        } else if name.starts_with("__riscv_restore") {
            FunctionKind::RestoreHelper
        } else {
            FunctionKind::Normal
        }
    }

    /// True for save and restore trampolines.
    pub fn is_helper(self) -> bool {
        !matches!(self, FunctionKind::Normal)
    }
}

/// Per-PC information.
#[derive(Clone, Debug)]
pub struct PcInfo {
    /// Instruction address.
    pub pc: u64,
    /// Interned function name.
    pub func: FnId,
    /// Function classification.
    pub kind: FunctionKind,
    /// Disassembled instruction text (may be empty for synthesized entries).
    pub assembly: String,
    /// Interned source file name.
    pub file: FileId,
    /// Source line (0 when unknown).
    pub line: u32,
    /// Self cost counters, one per event index.
    pub self_events: [u64; MAX_EVENTS],
}

impl PcInfo {
    /// True if any event counter is non-zero.
    pub fn has_events(&self) -> bool {
        self.self_events.iter().any(|&e| e > 0)
    }
}

/// Immutable-after-load mapping from PC to instruction metadata.
///
/// "Immutable" covers the metadata; the per-PC event counters are updated by
/// the engine throughout the trace. Unknown PCs referenced by the trace get a
/// synthesized entry on first touch so the stream never stalls.
pub struct PcTable {
    info: FxHashMap<u64, PcInfo>,
    functions: Interner,
    files: Interner,
    unknown_fn: FnId,
    unknown_file: FileId,
}

impl PcTable {
    pub fn new() -> Self {
        let mut functions = Interner::new();
        let mut files = Interner::new();
        let unknown_fn = FnId(functions.intern(UNKNOWN_NAME));
        let unknown_file = FileId(files.intern(UNKNOWN_NAME));
        Self {
            info: FxHashMap::default(),
            functions,
            files,
            unknown_fn,
            unknown_file,
        }
    }

    /// Insert or overwrite the entry for `pc`. Last write wins.
    pub fn load_pc_info(&mut self, pc: u64, function: &str, assembly: &str, file: &str, line: u32) {
        let func = FnId(self.functions.intern(function));
        let file = FileId(self.files.intern(file));
        let kind = FunctionKind::classify(function);
        self.info.insert(
            pc,
            PcInfo {
                pc,
                func,
                kind,
                assembly: assembly.to_string(),
                file,
                line,
                self_events: [0; MAX_EVENTS],
            },
        );
    }

    /// Get the entry for `pc`, if the disassembly (or a prior synthesis)
    /// described it.
    pub fn get(&self, pc: u64) -> Option<&PcInfo> {
        self.info.get(&pc)
    }

    /// Get the entry for `pc`, synthesizing an `unknown` one if absent.
    pub fn ensure(&mut self, pc: u64) -> &mut PcInfo {
        let (unknown_fn, unknown_file) = (self.unknown_fn, self.unknown_file);
        self.info.entry(pc).or_insert_with(|| {
            tracing::trace!("synthesizing entry for unlisted pc {pc:#x}");
            PcInfo {
                pc,
                func: unknown_fn,
                kind: FunctionKind::Normal,
                assembly: String::new(),
                file: unknown_file,
                line: 0,
                self_events: [0; MAX_EVENTS],
            }
        })
    }

    /// Instruction size in bytes at `pc`.
    ///
    /// 2 if the stored assembly carries a compressed (`c.`) mnemonic token,
    /// 4 otherwise. Unknown PCs default to 4.
    pub fn instruction_size(&self, pc: u64) -> u32 {
        match self.info.get(&pc) {
            Some(info) if is_compressed(&info.assembly) => 2,
            _ => 4,
        }
    }

    /// Resolve an interned function name.
    pub fn func_name(&self, id: FnId) -> &str {
        self.functions.resolve(id.0)
    }

    /// Resolve an interned file name.
    pub fn file_name(&self, id: FileId) -> &str {
        self.files.resolve(id.0)
    }

    /// Id of the synthesized `unknown` function.
    pub fn unknown_fn(&self) -> FnId {
        self.unknown_fn
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.info.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Number of distinct function names (excluding `unknown`).
    pub fn function_count(&self) -> usize {
        self.functions.len() - 1
    }

    /// Count entries whose function matches `kind`.
    pub fn count_kind(&self, kind: FunctionKind) -> usize {
        self.info.values().filter(|i| i.kind == kind).count()
    }

    /// All PCs in ascending order, for deterministic emission.
    pub fn sorted_pcs(&self) -> Vec<u64> {
        let mut pcs: Vec<u64> = self.info.keys().copied().collect();
        pcs.sort_unstable();
        pcs
    }

    /// Iterate over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &PcInfo> {
        self.info.values()
    }
}

impl Default for PcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether assembly text denotes a 2-byte compressed instruction.
///
/// Token-based so that mnemonics like `sc.w` (which merely contain `c.`)
/// stay 4 bytes.
fn is_compressed(assembly: &str) -> bool {
    assembly
        .split_whitespace()
        .any(|token| token.starts_with("c."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_kind_classify() {
        assert_eq!(FunctionKind::classify("main"), FunctionKind::Normal);
        assert_eq!(
            FunctionKind::classify("__riscv_save_0"),
            FunctionKind::SaveHelper
        );
        assert_eq!(
            FunctionKind::classify("__riscv_restore_12"),
            FunctionKind::RestoreHelper
        );
        assert_eq!(
            FunctionKind::classify("__riscv_saved"),
            FunctionKind::SaveHelper
        );
    }

    #[test]
    fn test_load_and_lookup() {
        let mut table = PcTable::new();
        table.load_pc_info(0x1000, "main", "addi sp,sp,-16", "main.c", 10);
        let info = table.get(0x1000).unwrap();
        assert_eq!(table.func_name(info.func), "main");
        assert_eq!(table.file_name(info.file), "main.c");
        assert_eq!(info.line, 10);
        assert_eq!(info.kind, FunctionKind::Normal);
        assert!(table.get(0x2000).is_none());
    }

    #[test]
    fn test_load_overwrites() {
        let mut table = PcTable::new();
        table.load_pc_info(0x1000, "old", "nop", "a.c", 1);
        table.load_pc_info(0x1000, "new", "ret", "b.c", 2);
        let info = table.get(0x1000).unwrap();
        assert_eq!(table.func_name(info.func), "new");
        assert_eq!(info.line, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ensure_synthesizes_unknown() {
        let mut table = PcTable::new();
        let info = table.ensure(0x9999);
        assert_eq!(info.line, 0);
        let func = info.func;
        assert_eq!(table.func_name(func), UNKNOWN_NAME);
        assert_eq!(table.get(0x9999).unwrap().kind, FunctionKind::Normal);
    }

    #[test]
    fn test_instruction_size() {
        let mut table = PcTable::new();
        table.load_pc_info(0x1000, "f", "c.addi sp,sp,-16", "f.c", 1);
        table.load_pc_info(0x1002, "f", "add a0,a1,a2", "f.c", 2);
        table.load_pc_info(0x1006, "f", "sc.w a0,a1,(a2)", "f.c", 3);
        assert_eq!(table.instruction_size(0x1000), 2);
        assert_eq!(table.instruction_size(0x1002), 4);
        assert_eq!(table.instruction_size(0x1006), 4);
        assert_eq!(table.instruction_size(0xdead), 4);
    }

    #[test]
    fn test_sorted_pcs() {
        let mut table = PcTable::new();
        table.load_pc_info(0x3000, "f", "nop", "f.c", 1);
        table.load_pc_info(0x1000, "f", "nop", "f.c", 2);
        table.load_pc_info(0x2000, "f", "nop", "f.c", 3);
        assert_eq!(table.sorted_pcs(), vec![0x1000, 0x2000, 0x3000]);
    }
}
