use anyhow::Result;
use std::path::Path;

use crate::infrastructure::error::ExportResult;
use crate::infrastructure::item::TargetAddress;
use crate::infrastructure::state::StateSnapshot;

/// Trait for the external configuration tool (OpenTofu, Terraform, ...)
///
/// Every call acts on one working directory. Calls that mutate state are not
/// safe to run concurrently against the same directory; callers serialize
/// them.
pub trait Executor: Send + Sync {
    /// Check if the executor is installed and available
    fn check_installed(&self) -> Result<bool>;

    /// Initialize the working directory (`init`)
    fn init(&self, working_dir: &Path) -> ExportResult<()>;

    /// Bring one existing resource under management at `address`
    fn import(
        &self,
        working_dir: &Path,
        address: &TargetAddress,
        source_id: &str,
    ) -> ExportResult<()>;

    /// Read current state as structured data (`show -json`)
    fn show(&self, working_dir: &Path) -> ExportResult<StateSnapshot>;

    /// Forget one resource without touching the real one (`state rm`)
    fn state_rm(&self, working_dir: &Path, address: &TargetAddress) -> ExportResult<()>;

    /// Replace the directory's state with the given state file (`state push`)
    fn state_push(&self, working_dir: &Path, state_file: &Path) -> ExportResult<()>;

    /// Get the name of this executor (e.g., "opentofu", "terraform")
    fn get_name(&self) -> &str;
}

/// Whether an import failure means the address is already in state
pub fn is_already_managed(message: &str) -> bool {
    message.to_lowercase().contains("already managed")
}
