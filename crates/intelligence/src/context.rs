//! Provider traits
//!
//! These traits let hosts plug in process execution and progress reporting
//! without the engine depending on a terminal or on `std::process`.

use crate::error::Result;
use crate::types::{CommandOutput, EntityId, ExecOptions};

/// Provider for external command execution
///
/// Implementations must honour `opts.timeout` (kill, then report a failed
/// output with `timed_out` set) and `opts.reject_on_nonzero`.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion
    fn execute(&self, command: &str, args: &[String], opts: &ExecOptions) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn execute_status(&self, command: &str, args: &[String], opts: &ExecOptions) -> bool {
        self.execute(command, args, opts)
            .map(|output| !output.failed)
            .unwrap_or(false)
    }
}

/// Progress callback for inference and sync passes
///
/// Entity completions of one layer are reported after the layer's parallel
/// batch finishes, from the calling thread.
pub trait ProgressCallback: Send {
    /// Called when a topological layer starts
    fn on_layer_start(&mut self, count: usize);

    /// Called when an entity's outcome is known
    fn on_entity_complete(&mut self, id: &EntityId, outcome: &str);

    /// Called when a layer completes
    fn on_layer_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_layer_start(&mut self, _count: usize) {}
    fn on_entity_complete(&mut self, _id: &EntityId, _outcome: &str) {}
    fn on_layer_complete(&mut self) {}
}
