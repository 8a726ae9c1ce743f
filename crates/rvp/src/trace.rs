//! Trace dump parsing.
//!
//! One retired instruction per line:
//!
//! ```text
//! 0x<pc> <delta0>[,<delta1>,...] <dest_reg> <is_branch>
//! ```
//!
//! Blank lines and `#` comments are skipped; so are malformed lines, with a
//! debug log. A messy trace must never stop the stream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::{Result, Synthesizer};

/// One parsed trace line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub pc: u64,
    /// Per-event cost deltas, index-aligned with the configured events.
    pub deltas: Vec<u64>,
    /// Destination register hint: -1 unknown, 0 zero register, >0 link
    /// register.
    pub dest_reg: i32,
    /// Whether the instruction can alter control flow.
    pub is_branch: bool,
}

impl TraceRecord {
    /// Parse a trace line. Returns `None` for blanks, comments, and
    /// malformed input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let pattern = LINE_PATTERN.get_or_init(|| {
            Regex::new(r"^0x([0-9a-fA-F]+)\s+(\d+(?:,\d+)*)\s+(-?\d+)\s+([01])$").unwrap()
        });
        let caps = pattern.captures(line)?;

        let pc = u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
        let deltas: Vec<u64> = caps
            .get(2)?
            .as_str()
            .split(',')
            .map(|d| d.parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        let dest_reg = caps.get(3)?.as_str().parse::<i32>().ok()?;
        let is_branch = caps.get(4)?.as_str() == "1";

        Some(TraceRecord {
            pc,
            deltas,
            dest_reg,
            is_branch,
        })
    }
}

/// Stream a trace file into the synthesizer. Returns the record count.
pub fn apply_trace_file(synth: &mut Synthesizer, path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        match TraceRecord::parse(&line) {
            Some(record) => {
                synth.record_multi(record.pc, &record.deltas, record.dest_reg, record.is_branch);
                count += 1;
            }
            None => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    debug!(line = trimmed, "skipping malformed trace line");
                }
            }
        }
    }
    Ok(count)
}

static LINE_PATTERN: OnceLock<Regex> = OnceLock::new();
