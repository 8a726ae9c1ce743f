//! Disassembly listing ingestion.
//!
//! Parses `objdump -d -l` style output and loads one `PcInfo` per listed
//! instruction. Uses pattern matching rather than positional parsing so minor
//! format variations between binutils and llvm-objdump are tolerated;
//! unparseable lines are skipped, never fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::{IndexError, PcTable, Result};

/// Load a disassembly listing file into `table`.
///
/// Returns the number of instructions loaded.
///
/// # Errors
///
/// Returns an error if the file cannot be read or yields no instructions.
pub fn load_listing(table: &mut PcTable, path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut state = ParseState::default();
    let mut count = 0;
    for line in reader.lines() {
        let line = line?;
        if parse_line(table, &mut state, &line) {
            count += 1;
        }
    }

    if count == 0 {
        return Err(IndexError::EmptyListing(path.display().to_string()));
    }
    debug!(count, path = %path.display(), "loaded disassembly listing");
    Ok(count)
}

/// Parse an in-memory listing. Returns the number of instructions loaded.
pub fn parse_listing(table: &mut PcTable, text: &str) -> usize {
    let mut state = ParseState::default();
    let mut count = 0;
    for line in text.lines() {
        if parse_line(table, &mut state, line) {
            count += 1;
        }
    }
    count
}

/// Carried context while walking a listing: the current function and the
/// most recent `file:line` annotation.
#[derive(Default)]
struct ParseState {
    function: String,
    file: String,
    line: u32,
}

/// Parse one listing line, loading an entry on instruction lines.
///
/// Returns true when an instruction was loaded.
fn parse_line(table: &mut PcTable, state: &mut ParseState, line: &str) -> bool {
    // Function header: `0000000080000000 <main>:`
    let func_pattern = FUNC_PATTERN
        .get_or_init(|| Regex::new(r"^([0-9a-fA-F]+)\s+<([^>]+)>:\s*$").unwrap());
    if let Some(caps) = func_pattern.captures(line) {
        state.function = caps[2].to_string();
        return false;
    }

    // Instruction: `    80000000:\t00a00513          \tli\ta0,10`
    // The raw encoding is exactly one 4-digit (compressed) or 8-digit word;
    // anything looser would swallow all-hex mnemonics like `add` or `fadd`.
    let insn_pattern = INSN_PATTERN.get_or_init(|| {
        Regex::new(r"^\s+([0-9a-fA-F]+):\s+([0-9a-fA-F]{8}|[0-9a-fA-F]{4})\s+(\S.*?)\s*$").unwrap()
    });
    if let Some(caps) = insn_pattern.captures(line) {
        let Ok(pc) = u64::from_str_radix(&caps[1], 16) else {
            return false;
        };
        let assembly = normalize_assembly(&caps[3]);
        let function = if state.function.is_empty() {
            crate::UNKNOWN_NAME
        } else {
            &state.function
        };
        let file = if state.file.is_empty() {
            crate::UNKNOWN_NAME
        } else {
            &state.file
        };
        table.load_pc_info(pc, function, &assembly, file, state.line);
        return true;
    }

    // Source annotation: `/path/to/file.c:42` (objdump -l), column 0.
    let loc_pattern =
        LOC_PATTERN.get_or_init(|| Regex::new(r"^(\S+):(\d+)(?:\s.*)?$").unwrap());
    if !line.starts_with(char::is_whitespace) {
        if let Some(caps) = loc_pattern.captures(line) {
            if let Ok(n) = caps[2].parse::<u32>() {
                state.file = caps[1].to_string();
                state.line = n;
            }
        }
    }

    false
}

/// Collapse tabs and runs of spaces in disassembly text to single spaces.
fn normalize_assembly(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

static FUNC_PATTERN: OnceLock<Regex> = OnceLock::new();
static INSN_PATTERN: OnceLock<Regex> = OnceLock::new();
static LOC_PATTERN: OnceLock<Regex> = OnceLock::new();
