//! Callgrind text rendering.
//!
//! Walks PCs in ascending order, emitting minimal `fn=`/`fl=` headers on
//! change, one self-cost line per executed instruction, and the call, branch,
//! and jump annotations attached to each site. Rendering is pure; only the
//! final file write can fail.

use std::fmt::Write as _;
use std::path::Path;

use rustc_hash::FxHashMap;
use rvp_engine::Profiler;
use rvp_index::{FileId, FnId, PcInfo};

use crate::{process_id, EmitConfig, Result};

/// Renders an engine snapshot into callgrind text.
pub struct CallgrindWriter<'a> {
    profiler: &'a Profiler,
    config: &'a EmitConfig,
}

impl<'a> CallgrindWriter<'a> {
    pub fn new(profiler: &'a Profiler, config: &'a EmitConfig) -> Self {
        Self { profiler, config }
    }

    /// Render the whole profile and write it to `path`.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let text = self.render();
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Render the whole profile to a string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut names = NameRefs::new(self.config.compress_strings);

        self.render_header(&mut out);
        self.render_body(&mut out, &mut names);
        self.render_totals(&mut out);
        out
    }

    fn render_header(&self, out: &mut String) {
        let pid = self.config.pid.unwrap_or_else(process_id);
        out.push_str("# callgrind format\n");
        out.push_str("version: 1\n");
        out.push_str("creator: core-simulator\n");
        let _ = writeln!(out, "pid: {pid}");
        out.push_str("cmd: simulated_program\n");
        out.push_str("part: 1\n\n");

        out.push_str("positions:");
        if self.config.dump_instr {
            out.push_str(" instr");
        }
        out.push_str(" line\n");

        out.push_str("events:");
        for name in self.profiler.events().names() {
            let _ = write!(out, " {name}");
        }
        out.push_str("\n\n");
    }

    fn render_body(&self, out: &mut String, names: &mut NameRefs) {
        let table = self.profiler.table();
        let num_events = self.profiler.events().len();
        let collect_jumps = self.profiler.config().collect_jumps;

        let mut current_func: Option<FnId> = None;
        let mut current_file: Option<FileId> = None;
        let mut last_line = 0u32;

        for pc in table.sorted_pcs() {
            let info = match table.get(pc) {
                Some(info) if info.has_events() => info,
                _ => continue,
            };

            if current_func != Some(info.func) {
                current_func = Some(info.func);
                let name = names.fn_ref(info.func, table.func_name(info.func));
                let _ = writeln!(out, "fn={name}");
                last_line = 0;
            }
            if current_file != Some(info.file) {
                current_file = Some(info.file);
                let name = names.file_ref(info.file, table.file_name(info.file));
                let _ = writeln!(out, "fl={name}");
                last_line = 0;
            }

            self.render_self_line(out, info, num_events, last_line);
            last_line = info.line;

            if let Some(site) = self.profiler.ledger().call_site(pc) {
                self.render_call_blocks(out, names, info, site, num_events);
            }
            if collect_jumps {
                if let Some(site) = self.profiler.ledger().branch_site(pc) {
                    self.render_branch_site(out, site);
                }
                if let Some(site) = self.profiler.ledger().jump_site(pc) {
                    self.render_jump_site(out, names, site);
                }
            }
        }
    }

    fn render_self_line(&self, out: &mut String, info: &PcInfo, num_events: usize, last_line: u32) {
        if self.config.dump_instr {
            let _ = write!(out, "0x{:x} ", info.pc);
        }
        if self.config.compress_pos && last_line != 0 {
            let diff = info.line as i64 - last_line as i64;
            if diff >= 0 {
                let _ = write!(out, "+{diff}");
            } else {
                let _ = write!(out, "{diff}");
            }
        } else {
            let _ = write!(out, "{}", info.line);
        }
        for idx in 0..num_events {
            let _ = write!(out, " {}", info.self_events[idx]);
        }
        if self.config.dump_instr && !info.assembly.is_empty() {
            let _ = write!(out, " # {}", info.assembly);
        }
        out.push('\n');
    }

    fn render_call_blocks(
        &self,
        out: &mut String,
        names: &mut NameRefs,
        from: &PcInfo,
        site: &rvp_engine::CallSite,
        num_events: usize,
    ) {
        let table = self.profiler.table();
        let mut edges: Vec<&rvp_engine::CallEdge> = site.edges.iter().collect();
        edges.sort_by_key(|e| e.to_pc);

        for edge in edges {
            let (callee_fn, callee_file, callee_line) = match table.get(edge.to_pc) {
                Some(callee) => (
                    names.fn_ref(callee.func, table.func_name(callee.func)),
                    names.file_ref(callee.file, table.file_name(callee.file)),
                    callee.line,
                ),
                None => (
                    rvp_index::UNKNOWN_NAME.to_string(),
                    rvp_index::UNKNOWN_NAME.to_string(),
                    0,
                ),
            };
            let _ = writeln!(out, "cfn={callee_fn}");
            let _ = writeln!(out, "cfl={callee_file}");

            let _ = write!(out, "calls={} ", edge.count);
            if self.config.dump_instr {
                let _ = write!(out, "0x{:x} ", edge.to_pc);
            }
            let _ = writeln!(out, "{callee_line}");

            if self.config.dump_instr {
                let _ = write!(out, "0x{:x} ", from.pc);
            }
            let _ = write!(out, "{}", from.line);
            for idx in 0..num_events {
                let _ = write!(out, " {}", edge.inclusive_events[idx]);
            }
            out.push('\n');
        }
    }

    fn render_branch_site(&self, out: &mut String, site: &rvp_engine::BranchSite) {
        let table = self.profiler.table();
        for (count, target) in [
            (site.taken_count, site.taken_target),
            (site.fallthrough_count, site.fallthrough_target),
        ] {
            if count == 0 {
                continue;
            }
            let line = table.get(target).map(|i| i.line).unwrap_or(0);
            let _ = write!(out, "jcnd={}/{} ", count, site.total_executed);
            if self.config.dump_instr {
                let _ = write!(out, "0x{target:x} ");
            }
            let _ = writeln!(out, "{line}");
        }
    }

    fn render_jump_site(&self, out: &mut String, names: &mut NameRefs, site: &rvp_engine::JumpSite) {
        let table = self.profiler.table();
        let mut edges: Vec<&rvp_engine::JumpEdge> = site.edges.iter().collect();
        edges.sort_by_key(|e| e.to_pc);

        for edge in edges {
            let target_fn = match table.get(edge.to_pc) {
                Some(info) => names.fn_ref(info.func, table.func_name(info.func)),
                None => rvp_index::UNKNOWN_NAME.to_string(),
            };
            out.push_str("jump=");
            if self.config.dump_instr {
                let _ = write!(out, "0x{:x}", edge.to_pc);
            }
            let _ = writeln!(out, "/{target_fn} {}", edge.count);
        }
    }

    fn render_totals(&self, out: &mut String) {
        let num_events = self.profiler.events().len();
        let mut totals = vec![0u64; num_events];
        for info in self.profiler.table().iter() {
            for (total, ev) in totals.iter_mut().zip(info.self_events.iter()) {
                *total += ev;
            }
        }

        out.push_str("\ntotals:");
        for total in &totals {
            let _ = write!(out, " {total}");
        }
        out.push('\n');
    }
}

/// String-compression bookkeeping: first use of a name defines `(id) name`,
/// later uses reference `(id)`.
struct NameRefs {
    enabled: bool,
    fn_ids: FxHashMap<FnId, u32>,
    file_ids: FxHashMap<FileId, u32>,
}

impl NameRefs {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fn_ids: FxHashMap::default(),
            file_ids: FxHashMap::default(),
        }
    }

    fn fn_ref(&mut self, id: FnId, name: &str) -> String {
        if !self.enabled {
            return name.to_string();
        }
        let next = self.fn_ids.len() as u32 + 1;
        match self.fn_ids.get(&id) {
            Some(n) => format!("({n})"),
            None => {
                self.fn_ids.insert(id, next);
                format!("({next}) {name}")
            }
        }
    }

    fn file_ref(&mut self, id: FileId, name: &str) -> String {
        if !self.enabled {
            return name.to_string();
        }
        let next = self.file_ids.len() as u32 + 1;
        match self.file_ids.get(&id) {
            Some(n) => format!("({n})"),
            None => {
                self.file_ids.insert(id, next);
                format!("({next}) {name}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmitConfig {
        EmitConfig::new().with_pid(1234)
    }

    /// Sum the event columns of all self-cost lines in rendered output.
    ///
    /// Self lines start with `0x` and are not preceded by a `calls=` line
    /// (which marks the inclusive line of a call block).
    fn sum_self_columns(text: &str, num_events: usize) -> Vec<u64> {
        let mut sums = vec![0u64; num_events];
        let mut prev_was_calls = false;
        for line in text.lines() {
            if line.starts_with("0x") && !prev_was_calls {
                let fields: Vec<&str> = line.split('#').next().unwrap().split_whitespace().collect();
                for (i, sum) in sums.iter_mut().enumerate() {
                    *sum += fields[2 + i].parse::<u64>().unwrap();
                }
            }
            prev_was_calls = line.starts_with("calls=");
        }
        sums
    }

    #[test]
    fn test_empty_trace_output() {
        let profiler = Profiler::new();
        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();

        assert!(text.starts_with("# callgrind format\n"));
        assert!(text.contains("version: 1\n"));
        assert!(text.contains("creator: core-simulator\n"));
        assert!(text.contains("pid: 1234\n"));
        assert!(text.contains("positions: instr line\n"));
        assert!(text.contains("events: Ir Cycle\n"));
        assert!(text.ends_with("\ntotals: 0 0\n"));
        assert!(!text.contains("fn="));
    }

    #[test]
    fn test_single_instruction() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1000, "main", "addi sp,sp,-16", "main.c", 7);
        profiler.record(0x1000, 0, 1, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("fn=main\n"));
        assert!(text.contains("fl=main.c\n"));
        assert!(text.contains("0x1000 7 1 0 # addi sp,sp,-16\n"));
        assert!(text.contains("\ntotals: 1 0\n"));
        assert!(!text.contains("calls="));
    }

    #[test]
    fn test_unknown_pc_line() {
        let mut profiler = Profiler::new();
        profiler.record(0x9999, 0, 5, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("fn=unknown\n"));
        assert!(text.contains("fl=unknown\n"));
        assert!(text.contains("0x9999 0 5 0\n"));
        assert!(!text.contains("calls="));
        assert!(!text.contains("jump="));
    }

    #[test]
    fn test_call_block_and_totals_round_trip() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1000, "main", "addi sp,sp,-16", "main.c", 1);
        profiler.load_pc_info(0x1004, "main", "jal ra,2000", "main.c", 2);
        profiler.load_pc_info(0x1008, "main", "mv s0,a0", "main.c", 3);
        profiler.load_pc_info(0x2000, "f", "addi a0,a0,1", "f.c", 10);
        profiler.load_pc_info(0x2004, "f", "ret", "f.c", 11);

        profiler.record(0x1000, 0, 1, -1, false);
        profiler.record(0x1004, 0, 1, 1, true);
        profiler.record(0x2000, 0, 1, -1, false);
        profiler.record(0x2004, 0, 1, -1, true);
        profiler.record(0x1008, 0, 1, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();

        assert!(text.contains("cfn=f\n"));
        assert!(text.contains("cfl=f.c\n"));
        assert!(text.contains("calls=1 0x2000 10\n"));
        // Inclusive line at the call site.
        assert!(text.contains("0x1004 2 2 0\n"));

        // Round trip: the totals line equals the sum of self-cost columns.
        let sums = sum_self_columns(&text, 2);
        assert!(text.contains(&format!("\ntotals: {} {}\n", sums[0], sums[1])));
        assert_eq!(sums[0], 5);
    }

    #[test]
    fn test_branch_and_jump_lines() {
        let mut profiler = Profiler::new();
        for (pc, asm, line) in [
            (0x5000u64, "addi a0,a0,1", 30u32),
            (0x5004, "bne a0,a3,5000", 31),
            (0x5008, "ret", 32),
        ] {
            profiler.load_pc_info(pc, "loop", asm, "loop.c", line);
        }
        profiler.record(0x5000, 0, 1, -1, false);
        profiler.record(0x5004, 0, 1, -1, true);
        profiler.record(0x5000, 0, 1, -1, false);
        profiler.record(0x5004, 0, 1, -1, true);
        profiler.record(0x5008, 0, 1, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("jcnd=1/2 0x5000 30\n"));
        assert!(text.contains("jcnd=1/2 0x5008 32\n"));
    }

    #[test]
    fn test_jump_line() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1000, "f", "j 1100", "f.c", 1);
        profiler.load_pc_info(0x1100, "f", "addi a0,a0,1", "f.c", 9);
        profiler.record(0x1000, 0, 1, -1, true);
        profiler.record(0x1100, 0, 1, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("jump=0x1100/f 1\n"));
    }

    #[test]
    fn test_collect_jumps_off_suppresses_annotations() {
        let mut profiler =
            Profiler::with_config(rvp_engine::EngineConfig::new().with_collect_jumps(false));
        profiler.load_pc_info(0x5000, "f", "addi a0,a0,1", "f.c", 1);
        profiler.load_pc_info(0x5004, "f", "bne a0,a3,5000", "f.c", 2);
        profiler.record(0x5000, 0, 1, -1, false);
        profiler.record(0x5004, 0, 1, -1, true);
        profiler.record(0x5000, 0, 1, -1, false);

        let config = config();
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(!text.contains("jcnd="));
        assert!(!text.contains("jump="));
    }

    #[test]
    fn test_string_compression() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1004, "main", "jal ra,2000", "main.c", 2);
        profiler.load_pc_info(0x2000, "f", "ret", "f.c", 10);
        profiler.record(0x1004, 0, 1, 1, true);
        profiler.record(0x2000, 0, 1, -1, true);

        let config = EmitConfig::new().with_pid(1).with_compress_strings(true);
        let text = CallgrindWriter::new(&profiler, &config).render();

        assert!(text.contains("fn=(1) main\n"));
        // The call block defines f first; f's own section then reuses the id.
        assert!(text.contains("cfn=(2) f\n"));
        assert!(text.contains("fn=(2)\n"));
    }

    #[test]
    fn test_position_compression() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1000, "main", "nop", "main.c", 5);
        profiler.load_pc_info(0x1004, "main", "nop", "main.c", 7);
        profiler.load_pc_info(0x1008, "main", "nop", "main.c", 6);
        profiler.record(0x1000, 0, 1, -1, false);
        profiler.record(0x1004, 0, 1, -1, false);
        profiler.record(0x1008, 0, 1, -1, false);

        let config = EmitConfig::new().with_pid(1).with_compress_pos(true);
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("0x1000 5 1 0"));
        assert!(text.contains("0x1004 +2 1 0"));
        assert!(text.contains("0x1008 -1 1 0"));
    }

    #[test]
    fn test_no_dump_instr() {
        let mut profiler = Profiler::new();
        profiler.load_pc_info(0x1000, "main", "nop", "main.c", 5);
        profiler.record(0x1000, 0, 1, -1, false);

        let config = EmitConfig::new().with_pid(1).with_dump_instr(false);
        let text = CallgrindWriter::new(&profiler, &config).render();
        assert!(text.contains("positions: line\n"));
        assert!(text.contains("\n5 1 0\n"));
        assert!(!text.contains("0x1000"));
        assert!(!text.contains("# nop"));
    }

    #[test]
    fn test_write_file() {
        let mut profiler = Profiler::new();
        profiler.record(0x1000, 0, 1, -1, false);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callgrind.out");
        let config = config();
        CallgrindWriter::new(&profiler, &config)
            .write_file(&path)
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("totals: 1 0"));
    }

    #[test]
    fn test_write_file_bad_path() {
        let profiler = Profiler::new();
        let config = config();
        let err = CallgrindWriter::new(&profiler, &config)
            .write_file(Path::new("/nonexistent-dir/callgrind.out"))
            .unwrap_err();
        assert!(matches!(err, crate::EmitError::OutputWriteFailed(_)));
    }
}
