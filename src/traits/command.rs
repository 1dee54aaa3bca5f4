use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output};

/// Trait for executing system commands, allowing for mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and return output
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output>;

    /// Execute a shell command (uses cmd on Windows, sh on Unix)
    fn execute_shell(&self, command: &str, working_dir: &Path) -> Result<Output>;
}

/// Put the child in its own process group.
///
/// Ctrl-C reaches the whole foreground group; children outside it keep running
/// and only the cancellation token sees the interrupt.
#[cfg(unix)]
fn detached(mut command: Command) -> Command {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
    command
}

#[cfg(not(unix))]
fn detached(command: Command) -> Command {
    command
}

/// Real command executor using std::process::Command
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output> {
        let output = detached(Command::new(command))
            .args(args)
            .current_dir(working_dir)
            .output()
            .with_context(|| format!("Failed to execute {}", command))?;

        Ok(output)
    }

    fn execute_shell(&self, command: &str, working_dir: &Path) -> Result<Output> {
        #[cfg(target_os = "windows")]
        let output = detached(Command::new("cmd"))
            .args(["/C", command])
            .current_dir(working_dir)
            .output()
            .with_context(|| format!("Failed to execute shell command: {}", command))?;

        #[cfg(not(target_os = "windows"))]
        let output = detached(Command::new("sh"))
            .args(["-c", command])
            .current_dir(working_dir)
            .output()
            .with_context(|| format!("Failed to execute shell command: {}", command))?;

        Ok(output)
    }
}

/// Mock command executor for testing
#[cfg(test)]
pub struct MockCommandExecutor {
    /// Pre-configured outputs, consumed first-match per command
    outputs: std::sync::Mutex<Vec<MockCommandResult>>,
    /// Every invocation as "command arg1 arg2"
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub struct MockCommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
impl MockCommandResult {
    pub fn ok(command: &str, stdout: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(command: &str, exit_code: i32, stderr: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(dead_code)]
impl MockCommandExecutor {
    pub fn new() -> Self {
        Self {
            outputs: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_outputs(outputs: Vec<MockCommandResult>) -> Self {
        Self {
            outputs: std::sync::Mutex::new(outputs),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn add_output(&self, output: MockCommandResult) {
        let mut outputs = self.outputs.lock().unwrap();
        outputs.push(output);
    }

    /// All recorded invocations, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, command: &str, line: String) -> Output {
        self.calls.lock().unwrap().push(line);
        let mut outputs = self.outputs.lock().unwrap();

        if let Some(result) = outputs.iter().position(|r| r.command == command) {
            let mock_result = outputs.remove(result);
            return Output {
                status: create_exit_status(mock_result.exit_code),
                stdout: mock_result.stdout.into_bytes(),
                stderr: mock_result.stderr.into_bytes(),
            };
        }

        // Default: successful empty output
        Output {
            status: create_exit_status(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Default for MockCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], _working_dir: &Path) -> Result<Output> {
        let mut line = command.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        Ok(self.respond(command, line))
    }

    fn execute_shell(&self, command: &str, _working_dir: &Path) -> Result<Output> {
        Ok(self.respond(command, command.to_string()))
    }
}

#[cfg(test)]
fn create_exit_status(code: i32) -> std::process::ExitStatus {
    // ExitStatus can't be constructed directly; build it from a raw wait status
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code as u32)
    }
}
