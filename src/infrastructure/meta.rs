//! Orchestrator
//!
//! `Meta` is the single contract of an export run. It walks a fixed state
//! machine:
//!
//! ```text
//! Created -> Initialized -> Listed -> Imported -> Generated -> CleanedUp -> Deinitialized
//! ```
//!
//! Each state is reachable only from its predecessor. Calling an operation in
//! the wrong state is a usage error and leaves the state untouched. A component
//! error moves the orchestrator to `Failed`, from which only `deinit` is
//! accepted.
//!
//! `MetaBase` carries the shared logic; the live and simulated variants wrap it
//! and override the steps where they differ.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::artifacts::{ArtifactGenerator, ArtifactOptions, GeneratedConfig};
use super::cancel::CancelToken;
use super::discovery::{apply_exclusions, ResourceDiscovery, ResourceLister, Scope, TypeMapper};
use super::error::{ExportError, ExportResult, RunError};
use super::hooks::{HookChain, PostImportHook, PreImportHook};
use super::importer::{ImportSummary, ParallelImporter};
use super::item::{ImportItem, ImportState, TargetAddress};
use super::naming::{NamingOptions, NamingResolver};
use super::workspace::{WorkspaceManager, WorkspaceMode, WorkspaceOptions};
use crate::executor::Executor;
use crate::traits::{FileSystem, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaState {
    Created,
    Initialized,
    Listed,
    Imported,
    Generated,
    CleanedUp,
    Deinitialized,
    Failed,
}

impl fmt::Display for MetaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetaState::Created => "created",
            MetaState::Initialized => "initialized",
            MetaState::Listed => "listed",
            MetaState::Imported => "imported",
            MetaState::Generated => "generated",
            MetaState::CleanedUp => "cleaned_up",
            MetaState::Deinitialized => "deinitialized",
            MetaState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Run parameters
#[derive(Debug, Clone)]
pub struct MetaOptions {
    pub scope: Scope,
    pub parallelism: usize,
    pub naming: NamingOptions,
    pub exclusions: Vec<Regex>,
    pub workspace: WorkspaceOptions,
    pub import_blocks: bool,
}

/// Collaborators a run is built from
pub struct MetaComponents {
    pub discovery: Arc<dyn ResourceDiscovery>,
    pub mapper: Arc<dyn TypeMapper>,
    pub executor: Arc<dyn Executor>,
    pub fs: Arc<dyn FileSystem>,
    pub output: Arc<dyn Output>,
}

pub struct MetaBase {
    state: MetaState,
    scope: Scope,
    parallelism: usize,
    naming: NamingOptions,
    exclusions: Vec<Regex>,
    lister: ResourceLister,
    workspace: WorkspaceManager,
    artifacts: ArtifactGenerator,
    executor: Arc<dyn Executor>,
    fs: Arc<dyn FileSystem>,
    output: Arc<dyn Output>,
    hooks: HookChain,
    items: Vec<ImportItem>,
    summary: Option<ImportSummary>,
    state_pushed: bool,
    state_reconciled: bool,
    mapping_exported: bool,
    skipped_exported: bool,
}

impl MetaBase {
    pub fn new(options: MetaOptions, components: MetaComponents) -> Self {
        let MetaComponents {
            discovery,
            mapper,
            executor,
            fs,
            output,
        } = components;

        let lister = ResourceLister::new(discovery, mapper, output.clone());

        let artifacts = ArtifactGenerator::new(
            ArtifactOptions {
                root: options.workspace.root.clone(),
                state_dir: options.workspace.root.join(super::workspace::STAGING_DIR),
                append: options.workspace.mode == WorkspaceMode::Append,
                import_blocks: options.import_blocks,
            },
            fs.clone(),
            executor.clone(),
            output.clone(),
        );

        let workspace = WorkspaceManager::new(
            options.workspace,
            fs.clone(),
            executor.clone(),
            output.clone(),
        );

        Self {
            state: MetaState::Created,
            scope: options.scope,
            parallelism: options.parallelism,
            naming: options.naming,
            exclusions: options.exclusions,
            lister,
            workspace,
            artifacts,
            executor,
            fs,
            output,
            hooks: HookChain::new(),
            items: Vec::new(),
            summary: None,
            state_pushed: false,
            state_reconciled: false,
            mapping_exported: false,
            skipped_exported: false,
        }
    }

    pub fn state(&self) -> MetaState {
        self.state
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn items(&self) -> &[ImportItem] {
        &self.items
    }

    pub fn summary(&self) -> Option<&ImportSummary> {
        self.summary.as_ref()
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    /// Reject the call unless the orchestrator is in one of `allowed`
    pub(crate) fn guard(
        &self,
        operation: &'static str,
        allowed: &[MetaState],
    ) -> ExportResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ExportError::Usage {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Move to `Failed` and hand the error back
    pub(crate) fn fail<T>(&mut self, err: ExportError) -> ExportResult<T> {
        self.output.debug(&format!("Run failed in state {}", self.state));
        self.state = MetaState::Failed;
        Err(err)
    }

    pub fn set_pre_import_hook(&mut self, hook: Arc<dyn PreImportHook>) -> ExportResult<()> {
        self.guard(
            "set_pre_import_hook",
            &[MetaState::Created, MetaState::Initialized, MetaState::Listed],
        )?;
        self.hooks.set_pre_import(hook)
    }

    pub fn set_post_import_hook(&mut self, hook: Arc<dyn PostImportHook>) -> ExportResult<()> {
        self.guard(
            "set_post_import_hook",
            &[MetaState::Created, MetaState::Initialized, MetaState::Listed],
        )?;
        self.hooks.set_post_import(hook)
    }

    pub fn init(&mut self) -> ExportResult<()> {
        self.guard("init", &[MetaState::Created])?;

        if let Err(e) = self.workspace.init() {
            return self.fail(e);
        }

        self.state = MetaState::Initialized;
        Ok(())
    }

    /// Discover, apply exclusions, then name
    pub fn list_resource(&mut self) -> ExportResult<()> {
        self.guard("list_resource", &[MetaState::Initialized])?;

        let mut items = match self.lister.list(&self.scope) {
            Ok(items) => items,
            Err(e) => return self.fail(e),
        };

        let excluded = match apply_exclusions(&mut items, &self.exclusions) {
            Ok(count) => count,
            Err(e) => return self.fail(e),
        };
        if excluded > 0 {
            self.output
                .info(&format!("Excluded {} resource(s) by filter", excluded));
        }

        let named = match NamingResolver::new(self.naming.clone())
            .and_then(|resolver| resolver.resolve(&mut items))
        {
            Ok(count) => count,
            Err(e) => return self.fail(e),
        };

        let unmapped = items
            .iter()
            .filter(|item| item.state() == ImportState::Skipped)
            .count()
            - excluded;
        if unmapped > 0 {
            self.output.warning(&format!(
                "{} resource(s) have no known type mapping and will be skipped",
                unmapped
            ));
        }
        self.output
            .debug(&format!("{} resource(s) named for import", named));

        self.items = items;
        self.state = MetaState::Listed;
        Ok(())
    }

    /// Run the import phase.
    ///
    /// Cancellation is not a failure: the orchestrator still reaches
    /// `Imported` and the summary is flagged as cancelled.
    pub fn parallel_import(&mut self, cancel: &CancelToken) -> ExportResult<ImportSummary> {
        self.guard("parallel_import", &[MetaState::Listed])?;
        self.hooks.seal();

        let importer = ParallelImporter::new(
            self.executor.clone(),
            self.fs.clone(),
            self.output.clone(),
            self.hooks.clone(),
            self.workspace.staging_dir(),
        );

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => return self.fail(ExportError::Io(e)),
        };

        let result = runtime.block_on(importer.run(&mut self.items, self.parallelism, cancel));

        let summary = match result {
            Ok(summary) => summary,
            Err(RunError::Cancelled { completed, total }) => {
                self.output.warning(&format!(
                    "Import cancelled after {} of {} resources",
                    completed, total
                ));
                ImportSummary::from_items(&self.items, true)
            }
            Err(e) => return self.fail(ExportError::Run(e)),
        };

        self.summary = Some(summary.clone());
        self.state = MetaState::Imported;
        Ok(summary)
    }

    /// Remove one resource from the import workspace state.
    ///
    /// The imported item at `address` becomes `Failed`, so the reports list it
    /// instead of mapping it.
    pub fn clean_tf_state(&mut self, address: &TargetAddress) -> ExportResult<()> {
        self.guard("clean_tf_state", &[MetaState::Imported, MetaState::Generated])?;
        self.workspace.clean_tf_state(address)?;

        let position = self.items.iter().position(|item| {
            item.state() == ImportState::Imported && item.target_address() == Some(address)
        });
        if let Some(index) = position {
            self.items[index].mark_state_lost("removed by clean_tf_state")?;
            self.refresh_summary();
        }
        Ok(())
    }

    /// Fail imported items whose state entry is missing. Runs once, before the
    /// first artifact is produced.
    fn reconcile_state(&mut self) -> ExportResult<()> {
        if self.state_reconciled {
            return Ok(());
        }

        let snapshot = self.executor.show(&self.workspace.staging_dir())?;
        let mut lost = 0;

        for item in self.items.iter_mut() {
            if item.state() != ImportState::Imported {
                continue;
            }
            let Some(address) = item.target_address() else {
                continue;
            };
            if snapshot.find(address).is_some() {
                continue;
            }

            self.output.warning(&format!(
                "{} is not in the workspace state; reporting it as failed",
                address
            ));
            item.mark_state_lost("no state entry after import")?;
            lost += 1;
        }

        if lost > 0 {
            self.refresh_summary();
        }
        self.state_reconciled = true;
        Ok(())
    }

    fn refresh_summary(&mut self) {
        let cancelled = self.summary.as_ref().is_some_and(|s| s.cancelled);
        self.summary = Some(ImportSummary::from_items(&self.items, cancelled));
    }

    pub fn push_state(&mut self) -> ExportResult<()> {
        self.guard("push_state", &[MetaState::Imported])?;
        if self.state_pushed {
            return Err(ExportError::Usage {
                operation: "push_state",
                state: "state already pushed".to_string(),
            });
        }

        let imported = self
            .items
            .iter()
            .filter(|item| item.state() == ImportState::Imported)
            .count();

        if let Err(e) = self.workspace.push_state(imported) {
            return self.fail(e);
        }

        self.state_pushed = true;
        Ok(())
    }

    pub fn generate_cfg(&mut self) -> ExportResult<GeneratedConfig> {
        self.guard("generate_cfg", &[MetaState::Imported])?;

        if let Err(e) = self.reconcile_state() {
            return self.fail(e);
        }

        let declared = self.workspace.managed_before_run();
        match self.artifacts.generate_config(&self.items, declared) {
            Ok(config) => {
                self.state = MetaState::Generated;
                Ok(config)
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn export_resource_mapping(&mut self) -> ExportResult<PathBuf> {
        self.guard(
            "export_resource_mapping",
            &[MetaState::Imported, MetaState::Generated],
        )?;
        if self.mapping_exported {
            return Err(ExportError::Usage {
                operation: "export_resource_mapping",
                state: "mapping already exported".to_string(),
            });
        }

        if let Err(e) = self.reconcile_state() {
            return self.fail(e);
        }

        match self.artifacts.export_resource_mapping(&self.items) {
            Ok(path) => {
                self.mapping_exported = true;
                Ok(path)
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn export_skipped_resources(&mut self) -> ExportResult<PathBuf> {
        self.guard(
            "export_skipped_resources",
            &[MetaState::Imported, MetaState::Generated],
        )?;
        if self.skipped_exported {
            return Err(ExportError::Usage {
                operation: "export_skipped_resources",
                state: "report already exported".to_string(),
            });
        }

        if let Err(e) = self.reconcile_state() {
            return self.fail(e);
        }

        match self.artifacts.export_skipped_resources(&self.items) {
            Ok(path) => {
                self.skipped_exported = true;
                Ok(path)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Remove transient artifacts; failures are logged, never raised
    pub fn clean_up_workspace(&mut self) -> ExportResult<()> {
        self.guard("clean_up_workspace", &[MetaState::Generated])?;

        let result = self.workspace.clean_up();
        if !result.is_complete() {
            self.output
                .warning(&format!("Workspace cleanup incomplete: {}", result));
        }

        self.state = MetaState::CleanedUp;
        Ok(())
    }

    /// Release the workspace. Also accepted from `Failed`, which it keeps.
    pub fn deinit(&mut self) -> ExportResult<()> {
        self.guard("deinit", &[MetaState::CleanedUp, MetaState::Failed])?;

        if let Err(e) = self.workspace.deinit() {
            self.output
                .warning(&format!("Failed to release workspace: {}", e));
        }

        if self.state != MetaState::Failed {
            self.state = MetaState::Deinitialized;
        }
        Ok(())
    }
}

/// The orchestrator contract.
///
/// Implementors expose their `MetaBase`; every step defaults to the shared
/// logic and may be overridden.
pub trait Meta {
    fn base(&self) -> &MetaBase;

    fn base_mut(&mut self) -> &mut MetaBase;

    /// Which variant this is, for the run report
    fn variant(&self) -> &'static str;

    fn state(&self) -> MetaState {
        self.base().state()
    }

    fn scope_name(&self) -> String {
        self.base().scope().name()
    }

    fn workspace(&self) -> &Path {
        self.base().workspace_root()
    }

    fn items(&self) -> &[ImportItem] {
        self.base().items()
    }

    /// Counts as of the latest step; `None` before the import phase
    fn summary(&self) -> Option<&ImportSummary> {
        self.base().summary()
    }

    fn set_pre_import_hook(&mut self, hook: Arc<dyn PreImportHook>) -> ExportResult<()> {
        self.base_mut().set_pre_import_hook(hook)
    }

    fn set_post_import_hook(&mut self, hook: Arc<dyn PostImportHook>) -> ExportResult<()> {
        self.base_mut().set_post_import_hook(hook)
    }

    fn init(&mut self) -> ExportResult<()> {
        self.base_mut().init()
    }

    fn list_resource(&mut self) -> ExportResult<()> {
        self.base_mut().list_resource()
    }

    fn parallel_import(&mut self, cancel: &CancelToken) -> ExportResult<ImportSummary> {
        self.base_mut().parallel_import(cancel)
    }

    fn clean_tf_state(&mut self, address: &TargetAddress) -> ExportResult<()> {
        self.base_mut().clean_tf_state(address)
    }

    fn push_state(&mut self) -> ExportResult<()> {
        self.base_mut().push_state()
    }

    fn generate_cfg(&mut self) -> ExportResult<GeneratedConfig> {
        self.base_mut().generate_cfg()
    }

    fn export_resource_mapping(&mut self) -> ExportResult<PathBuf> {
        self.base_mut().export_resource_mapping()
    }

    fn export_skipped_resources(&mut self) -> ExportResult<PathBuf> {
        self.base_mut().export_skipped_resources()
    }

    fn clean_up_workspace(&mut self) -> ExportResult<()> {
        self.base_mut().clean_up_workspace()
    }

    fn deinit(&mut self) -> ExportResult<()> {
        self.base_mut().deinit()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::executor::MemoryExecutor;
    use crate::infrastructure::discovery::test_support::{StaticDiscovery, TableMapper};
    use crate::infrastructure::resource_mapper::TargetProvider;
    use crate::traits::{MemoryFileSystem, MockOutput};
    use std::collections::BTreeMap;

    pub const VNET: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet";
    pub const RG: &str = "/subscriptions/s/resourceGroups/rg";
    pub const LB: &str = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Foo/bars/lb";

    /// Bare orchestrator over the shared logic
    pub struct TestMeta(pub MetaBase);

    impl Meta for TestMeta {
        fn base(&self) -> &MetaBase {
            &self.0
        }

        fn base_mut(&mut self) -> &mut MetaBase {
            &mut self.0
        }

        fn variant(&self) -> &'static str {
            "test"
        }
    }

    pub fn options(mode: WorkspaceMode) -> MetaOptions {
        MetaOptions {
            scope: Scope::ResourceGroup {
                name: "rg".to_string(),
            },
            parallelism: 4,
            naming: NamingOptions::default(),
            exclusions: Vec::new(),
            workspace: WorkspaceOptions {
                root: PathBuf::from("/out"),
                mode,
                provider: TargetProvider::Azurerm,
                subscription_id: None,
                backend_type: "local".to_string(),
                backend_config: BTreeMap::new(),
            },
            import_blocks: false,
        }
    }

    /// Orchestrator over the three-resource scope: two mapped, one unmapped
    pub fn three_item_meta(
        fs: &MemoryFileSystem,
        executor: Arc<MemoryExecutor>,
        mode: WorkspaceMode,
    ) -> TestMeta {
        TestMeta(MetaBase::new(
            options(mode),
            MetaComponents {
                discovery: Arc::new(StaticDiscovery::new(&[VNET, RG, LB])),
                mapper: Arc::new(TableMapper::new(&[
                    (VNET, "azurerm_virtual_network"),
                    (RG, "azurerm_resource_group"),
                ])),
                executor,
                fs: Arc::new(fs.clone()),
                output: Arc::new(MockOutput::new()),
            },
        ))
    }
}
