//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "rvp")]
#[command(about = "RISC-V Profiler - synthesizes callgrind profiles from simulator traces")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize a callgrind profile from a disassembly listing and a trace
    Synth {
        /// Disassembly listing (objdump -d -l output)
        #[arg(long, value_name = "LISTING")]
        disasm: PathBuf,

        /// Instruction trace dump from the core simulator
        #[arg(long, value_name = "TRACE")]
        trace: PathBuf,

        /// Output profile path
        #[arg(short, long, default_value = "callgrind.out")]
        output: PathBuf,

        /// Event names, in trace-column order
        #[arg(long, value_delimiter = ',', default_value = "Ir,Cycle")]
        events: Vec<String>,

        /// Omit per-instruction positions and assembly comments
        #[arg(long)]
        no_dump_instr: bool,

        /// Disable branch-simulation event charges (Bc/Bcm/Bi/Bim)
        #[arg(long)]
        no_branch_sim: bool,

        /// Disable jump collection (jcnd=/jump= annotations)
        #[arg(long)]
        no_collect_jumps: bool,

        /// Compress function and file names to (id) references
        #[arg(long)]
        compress_strings: bool,

        /// Compress line numbers to +N/-N deltas
        #[arg(long)]
        compress_pos: bool,
    },
    /// Load a disassembly listing and print summary counts
    Inspect {
        /// Disassembly listing (objdump -d -l output)
        #[arg(value_name = "LISTING")]
        disasm: PathBuf,
    },
}
