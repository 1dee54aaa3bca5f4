#[cfg(test)]
use std::sync::Mutex;

/// Output message captured by MockOutput for testing
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Success(String),
    Error(String),
    Warning(String),
    Info(String),
    Debug(String),
    Section(String),
    KeyValue(String, String),
    Dimmed(String),
    Progress(String),
    Blank,
}

/// How chatty the terminal output is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Only warnings, errors and the final summary
    Quiet,
    #[default]
    Normal,
    /// Include debug messages
    Verbose,
}

/// Logging handle passed to every component at construction.
///
/// Implementations must be usable from the importer's worker threads.
pub trait Output: Send + Sync {
    /// Print a success message
    fn success(&self, message: &str);

    /// Print an error message
    fn error(&self, message: &str);

    /// Print a warning message
    fn warning(&self, message: &str);

    /// Print an info message
    fn info(&self, message: &str);

    /// Print a diagnostic message (only shown in verbose mode)
    fn debug(&self, message: &str);

    /// Print a section header
    fn section(&self, title: &str);

    /// Print a key-value pair
    fn key_value(&self, key: &str, value: &str);

    /// Print a dimmed/muted message
    fn dimmed(&self, message: &str);

    /// Report one finished unit of work out of a total
    fn progress(&self, current: usize, total: usize, item: &str, status: &str);

    /// Print a blank line
    fn blank(&self);
}

/// Real terminal output implementation using the output module
pub struct TerminalOutput {
    verbosity: Verbosity,
}

impl TerminalOutput {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    fn chatty(&self) -> bool {
        self.verbosity != Verbosity::Quiet
    }
}

impl Default for TerminalOutput {
    fn default() -> Self {
        Self::new(Verbosity::Normal)
    }
}

impl Output for TerminalOutput {
    fn success(&self, message: &str) {
        if self.chatty() {
            crate::output::success(message);
        }
    }

    fn error(&self, message: &str) {
        crate::output::error(message);
    }

    fn warning(&self, message: &str) {
        crate::output::warning(message);
    }

    fn info(&self, message: &str) {
        if self.chatty() {
            crate::output::info(message);
        }
    }

    fn debug(&self, message: &str) {
        if self.verbosity == Verbosity::Verbose {
            crate::output::debug(message);
        }
    }

    fn section(&self, title: &str) {
        crate::output::section(title);
    }

    fn key_value(&self, key: &str, value: &str) {
        crate::output::key_value(key, value);
    }

    fn dimmed(&self, message: &str) {
        crate::output::dimmed(message);
    }

    fn progress(&self, current: usize, total: usize, item: &str, status: &str) {
        if self.chatty() {
            crate::output::progress(current, total, item, status);
        }
    }

    fn blank(&self) {
        crate::output::blank();
    }
}

/// Mock output implementation for testing (captures output)
#[cfg(test)]
pub struct MockOutput {
    messages: Mutex<Vec<OutputMessage>>,
}

#[cfg(test)]
#[allow(dead_code)]
impl MockOutput {
    /// Create new mock output
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Get all captured messages
    pub fn get_messages(&self) -> Vec<OutputMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Check if any error message was output
    pub fn has_error(&self) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, OutputMessage::Error(_)))
    }

    /// Get all warning messages
    pub fn get_warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| {
                if let OutputMessage::Warning(msg) = m {
                    Some(msg.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Get all messages formatted as text
    pub fn to_text(&self) -> String {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|msg| match msg {
                OutputMessage::Success(s) => format!("✓ {}", s),
                OutputMessage::Error(s) => format!("✗ {}", s),
                OutputMessage::Warning(s) => format!("⚠ {}", s),
                OutputMessage::Info(s) => s.clone(),
                OutputMessage::Debug(s) => format!("· {}", s),
                OutputMessage::Section(s) => format!("\n=== {} ===", s),
                OutputMessage::KeyValue(k, v) => format!("{}: {}", k, v),
                OutputMessage::Dimmed(s) => s.clone(),
                OutputMessage::Progress(s) => s.clone(),
                OutputMessage::Blank => String::new(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&self, message: OutputMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

#[cfg(test)]
impl Default for MockOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Output for MockOutput {
    fn success(&self, message: &str) {
        self.push(OutputMessage::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(OutputMessage::Error(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.push(OutputMessage::Warning(message.to_string()));
    }

    fn info(&self, message: &str) {
        self.push(OutputMessage::Info(message.to_string()));
    }

    fn debug(&self, message: &str) {
        self.push(OutputMessage::Debug(message.to_string()));
    }

    fn section(&self, title: &str) {
        self.push(OutputMessage::Section(title.to_string()));
    }

    fn key_value(&self, key: &str, value: &str) {
        self.push(OutputMessage::KeyValue(key.to_string(), value.to_string()));
    }

    fn dimmed(&self, message: &str) {
        self.push(OutputMessage::Dimmed(message.to_string()));
    }

    fn progress(&self, current: usize, total: usize, item: &str, status: &str) {
        self.push(OutputMessage::Progress(format!(
            "[{}/{}] {} {}",
            current, total, status, item
        )));
    }

    fn blank(&self) {
        self.push(OutputMessage::Blank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output_captures_in_order() {
        let output = MockOutput::new();
        output.section("Listing");
        output.warning("careful");
        output.progress(1, 3, "vm", "imported");

        let messages = output.get_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], OutputMessage::Section("Listing".to_string()));
        assert_eq!(output.get_warnings(), vec!["careful".to_string()]);
        assert!(output.to_text().contains("[1/3] imported vm"));
        assert!(!output.has_error());
    }

    #[test]
    fn test_terminal_output_default_is_normal() {
        let output = TerminalOutput::default();
        assert!(output.chatty());
        assert!(!TerminalOutput::new(Verbosity::Quiet).chatty());
    }
}
