//! Command implementations.

mod inspect;
mod synth;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Synth {
            disasm,
            trace,
            output,
            events,
            no_dump_instr,
            no_branch_sim,
            no_collect_jumps,
            compress_strings,
            compress_pos,
        } => synth::cmd_synth(
            disasm,
            trace,
            output,
            events,
            !no_dump_instr,
            !no_branch_sim,
            !no_collect_jumps,
            *compress_strings,
            *compress_pos,
        ),
        Commands::Inspect { disasm } => inspect::cmd_inspect(disasm),
    }
}
