//! Synth command.

use std::path::Path;

use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::Synthesizer;

/// Handle the `synth` command.
#[allow(clippy::too_many_arguments)]
pub fn cmd_synth(
    disasm: &Path,
    trace: &Path,
    output: &Path,
    events: &[String],
    dump_instr: bool,
    branch_sim: bool,
    collect_jumps: bool,
    compress_strings: bool,
    compress_pos: bool,
) -> i32 {
    let mut synth = Synthesizer::new();
    synth.configure_events(events.iter().cloned());
    synth.set_options(
        dump_instr,
        branch_sim,
        collect_jumps,
        compress_strings,
        compress_pos,
    );

    let instructions = match synth.load_listing(disasm) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, path = %disasm.display(), "failed to load disassembly listing");
            return EXIT_FAILURE;
        }
    };
    info!(instructions, path = %disasm.display(), "loaded disassembly listing");

    let records = match synth.record_trace_file(trace) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, path = %trace.display(), "failed to read trace");
            return EXIT_FAILURE;
        }
    };
    info!(records, path = %trace.display(), "trace consumed");

    if let Err(e) = synth.finalize(output) {
        error!(error = %e, path = %output.display(), "failed to write profile");
        return EXIT_FAILURE;
    }

    let profiler = synth.profiler();
    let totals = profiler.running_totals();
    for (name, total) in profiler.events().names().iter().zip(totals.iter()) {
        info!(event = %name, total = *total, "event total");
    }
    info!(output = %output.display(), "profile written");
    EXIT_SUCCESS
}
