//! Callgrind-format profile emitter.
//!
//! Snapshots the engine's final state (self costs, call edges, branch sites,
//! jump edges) into the line-oriented text format KCachegrind consumes. The
//! emitter is the only fallible stage of the pipeline; everything up to it is
//! total.

mod config;
mod writer;

pub use config::EmitConfig;
pub use writer::CallgrindWriter;

/// Emission errors.
#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    #[error("failed to write profile output: {0}")]
    OutputWriteFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EmitError>;

/// Process id of the running host.
///
/// Kept behind this boundary so the writer itself stays host-independent;
/// tests pin the pid through `EmitConfig` instead.
pub fn process_id() -> u32 {
    std::process::id()
}
