//! Inspect command.

use std::path::Path;

use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::{FunctionKind, PcTable};

/// Handle the `inspect` command: load a listing and print summary counts.
pub fn cmd_inspect(disasm: &Path) -> i32 {
    let mut table = PcTable::new();
    let instructions = match rvp_index::load_listing(&mut table, disasm) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, path = %disasm.display(), "failed to load disassembly listing");
            return EXIT_FAILURE;
        }
    };

    println!("Instructions: {}", instructions);
    println!("Functions: {}", table.function_count());
    println!(
        "Save helpers: {} instructions",
        table.count_kind(FunctionKind::SaveHelper)
    );
    println!(
        "Restore helpers: {} instructions",
        table.count_kind(FunctionKind::RestoreHelper)
    );
    EXIT_SUCCESS
}
