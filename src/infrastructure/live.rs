use super::error::{ExportError, ExportResult};
use super::meta::{Meta, MetaBase, MetaComponents, MetaOptions, MetaState};

/// Orchestrator against the real cloud and the real terraform/tofu binary
pub struct LiveOrchestrator {
    base: MetaBase,
}

impl LiveOrchestrator {
    pub fn new(options: MetaOptions, components: MetaComponents) -> Self {
        Self {
            base: MetaBase::new(options, components),
        }
    }
}

impl Meta for LiveOrchestrator {
    fn base(&self) -> &MetaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetaBase {
        &mut self.base
    }

    fn variant(&self) -> &'static str {
        "live"
    }

    /// Refuse to touch the workspace when the tool is missing
    fn init(&mut self) -> ExportResult<()> {
        self.base.guard("init", &[MetaState::Created])?;

        let executor = self.base.executor().clone();
        match executor.check_installed() {
            Ok(true) => {}
            Ok(false) => {
                return self.base.fail(ExportError::Workspace(format!(
                    "{} is not installed or not on PATH",
                    executor.get_name()
                )));
            }
            Err(e) => {
                return self.base.fail(ExportError::Workspace(format!(
                    "Failed to check for {}: {:#}",
                    executor.get_name(),
                    e
                )));
            }
        }

        self.base.init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CliExecutor, MemoryExecutor};
    use crate::infrastructure::discovery::test_support::{StaticDiscovery, TableMapper};
    use crate::infrastructure::meta::test_support::{options, RG};
    use crate::infrastructure::workspace::WorkspaceMode;
    use crate::traits::{
        FileSystem, MemoryFileSystem, MockCommandExecutor, MockCommandResult, MockOutput,
    };
    use std::path::Path;
    use std::sync::Arc;

    fn components(
        fs: &MemoryFileSystem,
        executor: Arc<dyn crate::executor::Executor>,
    ) -> MetaComponents {
        MetaComponents {
            discovery: Arc::new(StaticDiscovery::new(&[RG])),
            mapper: Arc::new(TableMapper::new(&[(RG, "azurerm_resource_group")])),
            executor,
            fs: Arc::new(fs.clone()),
            output: Arc::new(MockOutput::new()),
        }
    }

    #[test]
    fn test_missing_binary_fails_init() {
        let fs = MemoryFileSystem::new();
        let command = Arc::new(MockCommandExecutor::with_outputs(vec![
            MockCommandResult::failed("terraform", 127, "command not found"),
        ]));
        let executor = Arc::new(CliExecutor::terraform(command, Arc::new(fs.clone())));
        let mut meta =
            LiveOrchestrator::new(options(WorkspaceMode::Fresh), components(&fs, executor));

        let err = meta.init().unwrap_err();

        assert!(err.to_string().contains("terraform is not installed"));
        assert_eq!(meta.state(), MetaState::Failed);
        assert!(!fs.exists(Path::new("/out/.tfexport.lock")));
    }

    #[test]
    fn test_init_with_available_tool() {
        let fs = MemoryFileSystem::new();
        let mut meta = LiveOrchestrator::new(
            options(WorkspaceMode::Fresh),
            components(&fs, Arc::new(MemoryExecutor::new())),
        );

        meta.init().unwrap();

        assert_eq!(meta.state(), MetaState::Initialized);
        assert_eq!(meta.variant(), "live");
        assert!(fs.exists(Path::new("/out/.tfexport.lock")));
    }
}
