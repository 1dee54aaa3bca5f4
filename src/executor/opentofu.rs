use super::executor::Executor;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::infrastructure::error::{ExportError, ExportResult};
use crate::infrastructure::item::TargetAddress;
use crate::infrastructure::state::{parse_show_json, StateSnapshot};
use crate::traits::{CommandExecutor, FileSystem};

/// Temporary configuration file holding the resource block being imported
pub const IMPORT_SKELETON_FILE: &str = "tfexport_import.tf";

/// Executor backed by the `tofu` or `terraform` binary
pub struct CliExecutor {
    name: &'static str,
    binary: &'static str,
    command: Arc<dyn CommandExecutor>,
    fs: Arc<dyn FileSystem>,
}

impl CliExecutor {
    pub fn opentofu(command: Arc<dyn CommandExecutor>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            name: "opentofu",
            binary: "tofu",
            command,
            fs,
        }
    }

    pub fn terraform(command: Arc<dyn CommandExecutor>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            name: "terraform",
            binary: "terraform",
            command,
            fs,
        }
    }

    /// Run a subcommand and fail with its stderr on a non-zero exit
    fn run(&self, working_dir: &Path, args: &[&str]) -> ExportResult<String> {
        let command_line = format!("{} {}", self.binary, args.first().copied().unwrap_or_default());

        let output = self
            .command
            .execute(self.binary, args, working_dir)
            .map_err(|e| ExportError::ExecutorFailed {
                command: command_line.clone(),
                message: format!("{:#}", e),
                exit_code: None,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };

            return Err(ExportError::ExecutorFailed {
                command: command_line,
                message,
                exit_code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Executor for CliExecutor {
    fn check_installed(&self) -> Result<bool> {
        let result = self.command.execute(self.binary, &["version"], Path::new("."));

        match result {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false), // Command not found or failed to execute
        }
    }

    fn init(&self, working_dir: &Path) -> ExportResult<()> {
        self.run(working_dir, &["init", "-input=false", "-no-color"])?;
        Ok(())
    }

    fn import(
        &self,
        working_dir: &Path,
        address: &TargetAddress,
        source_id: &str,
    ) -> ExportResult<()> {
        // import needs a resource block to attach to
        let skeleton_path = working_dir.join(IMPORT_SKELETON_FILE);
        let skeleton = format!(
            "resource \"{}\" \"{}\" {{}}\n",
            address.resource_type, address.name
        );

        self.fs
            .write(&skeleton_path, &skeleton)
            .map_err(|e| ExportError::Workspace(format!("{:#}", e)))?;

        let address_arg = address.to_string();
        let result = self.run(
            working_dir,
            &["import", "-input=false", "-no-color", &address_arg, source_id],
        );

        // Removal failures are ignored so the import outcome is what surfaces
        let _ = self.fs.remove_file(&skeleton_path);

        result.map(|_| ())
    }

    fn show(&self, working_dir: &Path) -> ExportResult<StateSnapshot> {
        let stdout = self.run(working_dir, &["show", "-json", "-no-color"])?;
        parse_show_json(&stdout)
    }

    fn state_rm(&self, working_dir: &Path, address: &TargetAddress) -> ExportResult<()> {
        let address_arg = address.to_string();
        self.run(working_dir, &["state", "rm", &address_arg])?;
        Ok(())
    }

    fn state_push(&self, working_dir: &Path, state_file: &Path) -> ExportResult<()> {
        let state_arg = state_file.to_string_lossy().into_owned();
        self.run(working_dir, &["state", "push", &state_arg])?;
        Ok(())
    }

    fn get_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MemoryFileSystem, MockCommandExecutor, MockCommandResult};
    use std::path::PathBuf;

    fn executor(
        outputs: Vec<MockCommandResult>,
    ) -> (CliExecutor, Arc<MockCommandExecutor>, MemoryFileSystem) {
        let command = Arc::new(MockCommandExecutor::with_outputs(outputs));
        let fs = MemoryFileSystem::new();
        let executor = CliExecutor::terraform(command.clone(), Arc::new(fs.clone()));
        (executor, command, fs)
    }

    #[test]
    fn test_import_writes_and_removes_skeleton() {
        let (executor, command, fs) = executor(vec![]);
        let dir = PathBuf::from("/ws/.tfexport");
        let address = TargetAddress::new("azurerm_resource_group", "rg");

        executor.import(&dir, &address, "/subscriptions/s/resourceGroups/rg").unwrap();

        assert_eq!(
            command.calls(),
            vec![
                "terraform import -input=false -no-color azurerm_resource_group.rg /subscriptions/s/resourceGroups/rg"
                    .to_string()
            ]
        );
        assert!(!fs.has_file(&dir.join(IMPORT_SKELETON_FILE)));
    }

    #[test]
    fn test_import_failure_carries_stderr_and_code() {
        let (executor, _, fs) = executor(vec![MockCommandResult::failed(
            "terraform",
            1,
            "Error: Resource already managed by Terraform",
        )]);
        let dir = PathBuf::from("/ws");

        let err = executor
            .import(&dir, &TargetAddress::new("azurerm_subnet", "s"), "/id")
            .unwrap_err();

        match err {
            ExportError::ExecutorFailed {
                command,
                message,
                exit_code,
            } => {
                assert_eq!(command, "terraform import");
                assert!(crate::executor::is_already_managed(&message));
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!fs.has_file(&dir.join(IMPORT_SKELETON_FILE)));
    }

    #[test]
    fn test_show_parses_state() {
        let (executor, _, _) = executor(vec![MockCommandResult::ok(
            "terraform",
            r#"{"values":{"root_module":{"resources":[{"address":"azurerm_resource_group.rg","mode":"managed","type":"azurerm_resource_group","name":"rg","values":{"location":"westeurope"}}]}}}"#,
        )]);

        let snapshot = executor.show(Path::new("/ws")).unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_opentofu_uses_tofu_binary() {
        let command = Arc::new(MockCommandExecutor::new());
        let executor = CliExecutor::opentofu(command.clone(), Arc::new(MemoryFileSystem::new()));

        executor.init(Path::new("/ws")).unwrap();
        executor
            .state_push(Path::new("/ws"), Path::new("/ws/.tfexport/terraform.tfstate"))
            .unwrap();

        assert_eq!(executor.get_name(), "opentofu");
        assert_eq!(
            command.calls(),
            vec![
                "tofu init -input=false -no-color".to_string(),
                "tofu state push /ws/.tfexport/terraform.tfstate".to_string(),
            ]
        );
    }
}
