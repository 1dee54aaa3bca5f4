//! Import Hook Chain
//!
//! At most one pre-import and one post-import hook per run. Both run on the
//! worker that owns the item. Errors and panics are caught here and turned into
//! an [`ItemError::Hook`] for that item alone.

use anyhow::Result;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use super::error::{ExportError, ExportResult, ItemError};
use super::item::{ImportItem, SkipReason};
use crate::traits::CommandExecutor;

/// What a pre-import hook wants done with the item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    /// Veto the import; the reason ends up in the skipped report
    Skip(String),
}

/// Result of one import attempt, as seen by the post-import hook
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported { already_imported: bool },
    Failed(ItemError),
    Skipped(SkipReason),
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportOutcome::Imported { .. } => write!(f, "imported"),
            ImportOutcome::Failed(_) => write!(f, "failed"),
            ImportOutcome::Skipped(_) => write!(f, "skipped"),
        }
    }
}

/// Runs before the external import call.
///
/// May rename the item or annotate it, and may veto the import.
pub trait PreImportHook: Send + Sync {
    fn pre_import(&self, item: &mut ImportItem) -> Result<HookDecision>;
}

/// Runs after each item reaches an outcome, including vetoed items
pub trait PostImportHook: Send + Sync {
    fn post_import(&self, item: &ImportItem, outcome: &ImportOutcome) -> Result<()>;
}

impl<F> PreImportHook for F
where
    F: Fn(&mut ImportItem) -> Result<HookDecision> + Send + Sync,
{
    fn pre_import(&self, item: &mut ImportItem) -> Result<HookDecision> {
        self(item)
    }
}

impl<F> PostImportHook for F
where
    F: Fn(&ImportItem, &ImportOutcome) -> Result<()> + Send + Sync,
{
    fn post_import(&self, item: &ImportItem, outcome: &ImportOutcome) -> Result<()> {
        self(item, outcome)
    }
}

/// The registered hooks for a run
#[derive(Clone, Default)]
pub struct HookChain {
    pre: Option<Arc<dyn PreImportHook>>,
    post: Option<Arc<dyn PostImportHook>>,
    sealed: bool,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pre_import(&mut self, hook: Arc<dyn PreImportHook>) -> ExportResult<()> {
        self.check_open("set_pre_import_hook", self.pre.is_some())?;
        self.pre = Some(hook);
        Ok(())
    }

    pub fn set_post_import(&mut self, hook: Arc<dyn PostImportHook>) -> ExportResult<()> {
        self.check_open("set_post_import_hook", self.post.is_some())?;
        self.post = Some(hook);
        Ok(())
    }

    /// Freeze registration; called when the import phase begins
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn check_open(&self, operation: &'static str, already_set: bool) -> ExportResult<()> {
        if self.sealed {
            return Err(ExportError::Usage {
                operation,
                state: "import started".to_string(),
            });
        }
        if already_set {
            return Err(ExportError::Usage {
                operation,
                state: "hook already registered".to_string(),
            });
        }
        Ok(())
    }

    pub fn run_pre(&self, item: &mut ImportItem) -> Result<HookDecision, ItemError> {
        let Some(hook) = &self.pre else {
            return Ok(HookDecision::Continue);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| hook.pre_import(item))) {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(e)) => Err(ItemError::Hook {
                message: format!("pre-import hook failed: {:#}", e),
            }),
            Err(payload) => Err(ItemError::Hook {
                message: format!("pre-import hook panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    pub fn run_post(&self, item: &ImportItem, outcome: &ImportOutcome) -> Result<(), ItemError> {
        let Some(hook) = &self.post else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| hook.post_import(item, outcome))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ItemError::Hook {
                message: format!("post-import hook failed: {:#}", e),
            }),
            Err(payload) => Err(ItemError::Hook {
                message: format!("post-import hook panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Hook backed by a shell command.
///
/// `{id}`, `{address}`, `{type}` and `{outcome}` are replaced with
/// single-quoted values before the command runs.
pub struct ShellHook {
    command: Arc<dyn CommandExecutor>,
    template: String,
    working_dir: PathBuf,
}

impl ShellHook {
    pub fn new(
        command: Arc<dyn CommandExecutor>,
        template: impl Into<String>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            command,
            template: template.into(),
            working_dir,
        }
    }

    fn render(&self, item: &ImportItem, outcome: Option<&ImportOutcome>) -> String {
        let address = item
            .target_address()
            .map(|a| a.to_string())
            .unwrap_or_default();

        self.template
            .replace("{id}", &shell_quote(item.source_id()))
            .replace("{address}", &shell_quote(&address))
            .replace("{type}", &shell_quote(item.target_type().unwrap_or_default()))
            .replace(
                "{outcome}",
                &shell_quote(&outcome.map(|o| o.to_string()).unwrap_or_default()),
            )
    }

    fn run(&self, line: &str) -> Result<std::process::Output> {
        self.command.execute_shell(line, &self.working_dir)
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn failure_text(output: &std::process::Output, hook: &str) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    if !stderr.is_empty() {
        return stderr.to_string();
    }

    match output.status.code() {
        Some(code) => format!("{} hook exited with status {}", hook, code),
        None => format!("{} hook was terminated by a signal", hook),
    }
}

impl PreImportHook for ShellHook {
    fn pre_import(&self, item: &mut ImportItem) -> Result<HookDecision> {
        let output = self.run(&self.render(item, None))?;

        if output.status.success() {
            Ok(HookDecision::Continue)
        } else {
            Ok(HookDecision::Skip(failure_text(&output, "pre-import")))
        }
    }
}

impl PostImportHook for ShellHook {
    fn post_import(&self, item: &ImportItem, outcome: &ImportOutcome) -> Result<()> {
        let output = self.run(&self.render(item, Some(outcome)))?;

        if !output.status.success() {
            anyhow::bail!("{}", failure_text(&output, "post-import"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::item::TargetAddress;
    use crate::traits::{MockCommandExecutor, MockCommandResult};

    fn item() -> ImportItem {
        let mut item = ImportItem::new(
            "/rg/vm's",
            Some("azurerm_linux_virtual_machine".to_string()),
        );
        item.set_address(TargetAddress::new("azurerm_linux_virtual_machine", "vm"));
        item
    }

    #[test]
    fn test_second_registration_is_rejected() {
        let mut chain = HookChain::new();
        chain
            .set_pre_import(Arc::new(|_: &mut ImportItem| -> Result<HookDecision> {
                Ok(HookDecision::Continue)
            }))
            .unwrap();

        let err = chain
            .set_pre_import(Arc::new(|_: &mut ImportItem| -> Result<HookDecision> {
                Ok(HookDecision::Continue)
            }))
            .unwrap_err();
        assert!(matches!(err, ExportError::Usage { .. }));
    }

    #[test]
    fn test_registration_after_seal_is_rejected() {
        let mut chain = HookChain::new();
        chain.seal();

        let err = chain
            .set_post_import(Arc::new(|_: &ImportItem, _: &ImportOutcome| -> Result<()> { Ok(()) }))
            .unwrap_err();
        assert!(err.to_string().contains("import started"));
    }

    #[test]
    fn test_empty_chain_continues() {
        let chain = HookChain::new();
        let mut item = item();
        assert_eq!(chain.run_pre(&mut item).unwrap(), HookDecision::Continue);
        assert!(chain
            .run_post(&item, &ImportOutcome::Imported { already_imported: false })
            .is_ok());
    }

    #[test]
    fn test_panicking_hook_becomes_item_error() {
        let mut chain = HookChain::new();
        chain
            .set_pre_import(Arc::new(|_: &mut ImportItem| -> Result<HookDecision> {
                panic!("hook exploded")
            }))
            .unwrap();

        let mut item = item();
        let err = chain.run_pre(&mut item).unwrap_err();
        assert_eq!(
            err,
            ItemError::Hook {
                message: "pre-import hook panicked: hook exploded".to_string()
            }
        );
    }

    #[test]
    fn test_erroring_post_hook_becomes_item_error() {
        let mut chain = HookChain::new();
        chain
            .set_post_import(Arc::new(|_: &ImportItem, _: &ImportOutcome| -> Result<()> {
                anyhow::bail!("audit log unavailable")
            }))
            .unwrap();

        let err = chain
            .run_post(&item(), &ImportOutcome::Skipped(SkipReason::UnmappedType))
            .unwrap_err();
        assert!(matches!(
            err,
            ItemError::Hook { ref message } if message.contains("audit log unavailable")
        ));
    }

    #[test]
    fn test_shell_hook_quotes_placeholders() {
        let command = Arc::new(MockCommandExecutor::new());
        let hook = ShellHook::new(command.clone(), "check {id} {address}", PathBuf::from("."));

        let decision = hook.pre_import(&mut item()).unwrap();

        assert_eq!(decision, HookDecision::Continue);
        assert_eq!(
            command.calls(),
            vec!["check '/rg/vm'\\''s' 'azurerm_linux_virtual_machine.vm'".to_string()]
        );
    }

    #[test]
    fn test_shell_pre_hook_non_zero_exit_vetoes() {
        let line = "deny {id}";
        let rendered = "deny '/rg/vm'\\''s'";
        let command = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::failed(rendered, 3, "protected resource\n"),
        ]));
        let hook = ShellHook::new(command, line, PathBuf::from("."));

        let decision = hook.pre_import(&mut item()).unwrap();
        assert_eq!(decision, HookDecision::Skip("protected resource".to_string()));
    }

    #[test]
    fn test_shell_post_hook_failure_without_stderr() {
        let command = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::failed("notify 'imported'", 2, ""),
        ]));
        let hook = ShellHook::new(command, "notify {outcome}", PathBuf::from("."));

        let err = hook
            .post_import(&item(), &ImportOutcome::Imported { already_imported: false })
            .unwrap_err();
        assert_eq!(err.to_string(), "post-import hook exited with status 2");
    }
}
