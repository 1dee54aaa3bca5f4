pub mod command;
pub mod filesystem;
pub mod output;

pub use command::{CommandExecutor, RealCommandExecutor};
pub use filesystem::{FileSystem, MemoryFileSystem, RealFileSystem};
pub use output::{Output, TerminalOutput, Verbosity};

#[cfg(test)]
pub use command::{MockCommandExecutor, MockCommandResult};
#[cfg(test)]
pub use output::MockOutput;
