//! External transcoder processes: invocation, ownership and teardown.

pub mod drain;
pub mod error;
pub mod handle;
pub mod invocation;

pub use drain::{DrainExit, StderrDrain};
pub use error::{SpawnError, TerminateError};
pub use handle::{HandleState, TranscoderHandle};
pub use invocation::{
    FfmpegInvocation, InvocationBuilder, OutputSpec, SegmentedOutput, TranscoderCommand,
    TranscoderCommandBuilder,
};
