//! Emitter configuration.

/// Output-side options for the callgrind writer.
#[derive(Clone, Debug)]
pub struct EmitConfig {
    /// Emit per-instruction positions (`0x<pc>`) and assembly comments.
    pub dump_instr: bool,
    /// Compress function and file names to `(id)` references.
    pub compress_strings: bool,
    /// Compress line numbers on self-cost lines to `+N`/`-N` deltas.
    pub compress_pos: bool,
    /// Pid to stamp into the header; the current process when `None`.
    pub pid: Option<u32>,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            dump_instr: true,
            compress_strings: false,
            compress_pos: false,
            pid: None,
        }
    }
}

impl EmitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dump_instr(mut self, dump_instr: bool) -> Self {
        self.dump_instr = dump_instr;
        self
    }

    pub fn with_compress_strings(mut self, compress_strings: bool) -> Self {
        self.compress_strings = compress_strings;
        self
    }

    pub fn with_compress_pos(mut self, compress_pos: bool) -> Self {
        self.compress_pos = compress_pos;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}
