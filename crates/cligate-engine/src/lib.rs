//! Subprocess execution and chat orchestration for CLI-driven backends.

pub mod command;
pub mod gate;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod streaming;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandBuilder, OutputFormat};
pub use gate::ConcurrencyGate;
pub use orchestrator::{ChatOrchestrator, ChatOutcome, FrameStream, Health};
pub use process::run_process;
pub use streaming::LineStream;
