//! RVP - RISC-V Profiler
//!
//! Synthesizes KCachegrind-compatible callgrind profiles from a
//! single-threaded instruction-level trace of a core simulator, using a
//! disassembly listing for static per-PC metadata.
//!
//! # Example
//!
//! ```no_run
//! use rvp::Synthesizer;
//!
//! let mut synth = Synthesizer::new();
//! synth.load_listing("program.dis".as_ref())?;
//! synth.configure_events(["Ir", "Cycle"]);
//! synth.record_trace_file("program.trace".as_ref())?;
//! synth.finalize("callgrind.out".as_ref())?;
//! # Ok::<(), rvp::Error>(())
//! ```

pub mod cli;
pub mod commands;
mod trace;

use std::path::Path;

use thiserror::Error;

pub use rvp_emit::{CallgrindWriter, EmitConfig, EmitError};
pub use rvp_engine::{
    BranchSite, CallEdge, EngineConfig, EventSet, Profiler, Transition, MAX_EVENTS,
};
pub use rvp_index::{FunctionKind, IndexError, PcInfo, PcTable};
pub use trace::TraceRecord;

/// Profiler errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The full synthesis pipeline: static index, streaming engine, emitter.
///
/// Wraps the engine with the offline front-ends (listing and trace files)
/// and the output stage. Recording entry points are total; only loading
/// inputs and `finalize` can fail.
pub struct Synthesizer {
    profiler: Profiler,
    emit: EmitConfig,
    finalized: bool,
}

impl Synthesizer {
    pub fn new() -> Self {
        Self::with_configs(EngineConfig::default(), EmitConfig::default())
    }

    pub fn with_configs(engine: EngineConfig, emit: EmitConfig) -> Self {
        Self {
            profiler: Profiler::with_config(engine),
            emit,
            finalized: false,
        }
    }

    /// Insert or overwrite static metadata for one PC.
    pub fn load_pc_info(&mut self, pc: u64, function: &str, assembly: &str, file: &str, line: u32) {
        self.profiler.load_pc_info(pc, function, assembly, file, line);
    }

    /// Load a disassembly listing file. Returns the instruction count.
    pub fn load_listing(&mut self, path: &Path) -> Result<usize> {
        Ok(rvp_index::load_listing(self.profiler.table_mut(), path)?)
    }

    /// Set the active event-name prefix. Call before recording.
    pub fn configure_events<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiler.configure_events(names);
    }

    /// Set all output and bookkeeping options at once.
    pub fn set_options(
        &mut self,
        dump_instr: bool,
        branch_sim: bool,
        collect_jumps: bool,
        compress_strings: bool,
        compress_pos: bool,
    ) {
        self.profiler.config_mut().branch_sim = branch_sim;
        self.profiler.config_mut().collect_jumps = collect_jumps;
        self.emit.dump_instr = dump_instr;
        self.emit.compress_strings = compress_strings;
        self.emit.compress_pos = compress_pos;
    }

    /// Record one retired instruction with a single event delta.
    pub fn record(&mut self, pc: u64, event_idx: u32, count: u64, dest_reg: i32, is_branch: bool) {
        debug_assert!(!self.finalized, "record after finalize");
        if self.finalized {
            return;
        }
        self.profiler.record(pc, event_idx, count, dest_reg, is_branch);
    }

    /// Record one retired instruction with a delta per event index.
    pub fn record_multi(&mut self, pc: u64, deltas: &[u64], dest_reg: i32, is_branch: bool) {
        debug_assert!(!self.finalized, "record after finalize");
        if self.finalized {
            return;
        }
        self.profiler.record_multi(pc, deltas, dest_reg, is_branch);
    }

    /// Stream a trace dump file through the engine.
    ///
    /// Returns the number of records applied; malformed lines are skipped.
    pub fn record_trace_file(&mut self, path: &Path) -> Result<u64> {
        trace::apply_trace_file(self, path)
    }

    /// Write the callgrind profile and close the stream.
    ///
    /// On failure the engine state is left intact so the caller can retry
    /// with another path.
    pub fn finalize(&mut self, output_path: &Path) -> Result<()> {
        CallgrindWriter::new(&self.profiler, &self.emit).write_file(output_path)?;
        self.finalized = true;
        Ok(())
    }

    /// Render the profile without writing a file.
    pub fn render(&self) -> String {
        CallgrindWriter::new(&self.profiler, &self.emit).render()
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn emit_config_mut(&mut self) -> &mut EmitConfig {
        &mut self.emit
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}
