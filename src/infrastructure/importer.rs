//! Parallel Importer
//!
//! A pool of `concurrency` workers pulls items from a shared queue. Hooks and
//! classification run in parallel; the external import call itself runs under
//! a single lock because the tool's state storage is not safe for concurrent
//! writers. Item failures are recorded on the item and never stop the run.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::cancel::CancelToken;
use super::error::{ExportError, ItemError, RunError};
use super::hooks::{HookChain, HookDecision, ImportOutcome};
use super::item::{ImportItem, ImportState, SkipReason, TargetAddress};
use super::naming::is_valid_name;
use crate::executor::{is_already_managed, Executor};
use crate::traits::{FileSystem, Output};

/// Counts by final state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub already_imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn from_items(items: &[ImportItem], cancelled: bool) -> Self {
        let mut summary = Self {
            total: items.len(),
            cancelled,
            ..Default::default()
        };

        for item in items {
            match item.state() {
                ImportState::Imported => {
                    summary.imported += 1;
                    if item.already_imported() {
                        summary.already_imported += 1;
                    }
                }
                ImportState::Skipped => summary.skipped += 1,
                ImportState::Failed => summary.failed += 1,
                ImportState::Pending | ImportState::Importing => {}
            }
        }

        summary
    }
}

/// State shared by every worker of one run
struct WorkerShared {
    executor: Arc<dyn Executor>,
    output: Arc<dyn Output>,
    hooks: HookChain,
    working_dir: PathBuf,
    cancel: CancelToken,
    claimed: Mutex<HashSet<TargetAddress>>,
    import_lock: Mutex<()>,
    queue: Mutex<VecDeque<(usize, ImportItem)>>,
    results: Mutex<Vec<(usize, ImportItem)>>,
    completed: AtomicUsize,
    total: usize,
}

pub struct ParallelImporter {
    executor: Arc<dyn Executor>,
    fs: Arc<dyn FileSystem>,
    output: Arc<dyn Output>,
    hooks: HookChain,
    working_dir: PathBuf,
}

impl ParallelImporter {
    pub fn new(
        executor: Arc<dyn Executor>,
        fs: Arc<dyn FileSystem>,
        output: Arc<dyn Output>,
        hooks: HookChain,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            executor,
            fs,
            output,
            hooks,
            working_dir,
        }
    }

    /// Import every pending, addressed item.
    ///
    /// On return no item is `Pending` or `Importing`. Fails only on bad input,
    /// an unusable workspace, or cancellation; in the last case the items keep
    /// the outcomes they reached.
    pub async fn run(
        &self,
        items: &mut [ImportItem],
        concurrency: usize,
        cancel: &CancelToken,
    ) -> Result<ImportSummary, RunError> {
        if concurrency == 0 {
            return Err(RunError::InvalidConcurrency(concurrency));
        }

        if !self.fs.is_dir(&self.working_dir) {
            return Err(RunError::WorkspaceUnusable(format!(
                "{} is not a directory",
                self.working_dir.display()
            )));
        }

        let mut queue = VecDeque::new();
        let mut claimed = HashSet::new();

        for (idx, item) in items.iter_mut().enumerate() {
            if item.state() != ImportState::Pending {
                if let Some(address) = item.target_address() {
                    claimed.insert(address.clone());
                }
                continue;
            }

            match item.target_address() {
                Some(address) => {
                    claimed.insert(address.clone());
                    queue.push_back((idx, item.clone()));
                }
                None => {
                    // Never named, so there is nothing to import it as
                    let _ = item.mark_skipped(SkipReason::UnmappedType);
                }
            }
        }

        let total = queue.len();
        let workers = concurrency.min(total);

        self.output.debug(&format!(
            "Importing {} resource(s) with {} worker(s)",
            total, workers
        ));

        let shared = Arc::new(WorkerShared {
            executor: self.executor.clone(),
            output: self.output.clone(),
            hooks: self.hooks.clone(),
            working_dir: self.working_dir.clone(),
            cancel: cancel.clone(),
            claimed: Mutex::new(claimed),
            import_lock: Mutex::new(()),
            queue: Mutex::new(queue),
            results: Mutex::new(Vec::with_capacity(total)),
            completed: AtomicUsize::new(0),
            total,
        });

        let handles: Vec<_> = (0..workers)
            .map(|_| tokio::spawn(worker_loop(shared.clone())))
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                self.output.error(&format!("Import worker stopped: {}", e));
            }
        }

        let results =
            std::mem::take(&mut *shared.results.lock().unwrap_or_else(|e| e.into_inner()));
        let completed = results.len();
        for (idx, item) in results {
            items[idx] = item;
        }

        // Anything still pending was never picked up
        let mut cut_short = 0;
        for item in items.iter_mut() {
            if item.state() == ImportState::Pending {
                let _ = item.mark_skipped(SkipReason::Cancelled);
                cut_short += 1;
            } else if item.error() == Some(&ItemError::Cancelled) {
                cut_short += 1;
            }
        }

        if cancel.is_cancelled() && cut_short > 0 {
            return Err(RunError::Cancelled { completed, total });
        }

        Ok(ImportSummary::from_items(items, false))
    }
}

async fn worker_loop(shared: Arc<WorkerShared>) {
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        let next = shared
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let Some((idx, item)) = next else {
            break;
        };

        let fallback = item.clone();
        let task_shared = shared.clone();

        // tofu/terraform and hooks block, so keep them off the async workers
        let processed = tokio::task::spawn_blocking(move || task_shared.process(item))
            .await
            .unwrap_or_else(|e| {
                let mut item = fallback;
                let _ = item.begin_import();
                let _ = item.mark_failed(ItemError::Import {
                    message: format!("Task panicked: {}", e),
                    exit_code: None,
                });
                item
            });

        let done = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let label = processed
            .target_address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| processed.source_id().to_string());
        shared
            .output
            .progress(done, shared.total, &label, &processed.state().to_string());

        shared
            .results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((idx, processed));
    }
}

impl WorkerShared {
    /// Pre-hook, import, post-hook for one item. Runs on a blocking thread.
    fn process(&self, mut item: ImportItem) -> ImportItem {
        if let Err(e) = item.begin_import() {
            self.output.warning(&e.to_string());
            return item;
        }

        let original = item.target_address().cloned();

        let outcome = match self.hooks.run_pre(&mut item) {
            Err(err) => ImportOutcome::Failed(err),
            Ok(HookDecision::Skip(reason)) => ImportOutcome::Skipped(SkipReason::Vetoed(reason)),
            Ok(HookDecision::Continue) => {
                match self.claim_rename(original.as_ref(), item.target_address()) {
                    Err(err) => ImportOutcome::Failed(err),
                    Ok(()) => self.import_one(&item),
                }
            }
        };

        // A rename only sticks if the item went through the import call
        if matches!(outcome, ImportOutcome::Failed(_) | ImportOutcome::Skipped(_))
            && let Some(original) = original
            && item.target_address() != Some(&original)
        {
            item.set_address(original);
        }

        let outcome = match self.hooks.run_post(&item, &outcome) {
            Ok(()) => outcome,
            Err(err) => {
                if let ImportOutcome::Imported {
                    already_imported: false,
                } = outcome
                {
                    self.forget(&item);
                }
                ImportOutcome::Failed(err)
            }
        };

        self.output.debug(&format!("{}: {}", item.source_id(), outcome));

        let applied = match outcome {
            ImportOutcome::Imported { already_imported } => item.mark_imported(already_imported),
            ImportOutcome::Failed(err) => item.mark_failed(err),
            ImportOutcome::Skipped(reason) => item.mark_skipped(reason),
        };
        if let Err(e) = applied {
            self.output.warning(&e.to_string());
        }

        item
    }

    /// Validate and claim an address changed by the pre-import hook
    fn claim_rename(
        &self,
        original: Option<&TargetAddress>,
        current: Option<&TargetAddress>,
    ) -> Result<(), ItemError> {
        let (Some(original), Some(current)) = (original, current) else {
            return Ok(());
        };
        if original == current {
            return Ok(());
        }

        if !is_valid_name(&current.name) {
            return Err(ItemError::Hook {
                message: format!("pre-import hook set an invalid name '{}'", current.name),
            });
        }

        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.contains(current) {
            return Err(ItemError::Hook {
                message: format!(
                    "pre-import hook renamed {} to {}, which is already taken",
                    original, current
                ),
            });
        }

        claimed.remove(original);
        claimed.insert(current.clone());
        Ok(())
    }

    fn import_one(&self, item: &ImportItem) -> ImportOutcome {
        let Some(address) = item.target_address() else {
            return ImportOutcome::Skipped(SkipReason::UnmappedType);
        };

        let _guard = self.import_lock.lock().unwrap_or_else(|e| e.into_inner());

        // Waiting for the lock can take a while; do not start new work after a cancel
        if self.cancel.is_cancelled() {
            return ImportOutcome::Failed(ItemError::Cancelled);
        }

        match self
            .executor
            .import(&self.working_dir, address, item.source_id())
        {
            Ok(()) => ImportOutcome::Imported {
                already_imported: false,
            },
            Err(ExportError::ExecutorFailed { message, .. }) if is_already_managed(&message) => {
                ImportOutcome::Imported {
                    already_imported: true,
                }
            }
            Err(ExportError::ExecutorFailed {
                message, exit_code, ..
            }) => ImportOutcome::Failed(ItemError::Import { message, exit_code }),
            Err(other) => ImportOutcome::Failed(ItemError::Import {
                message: other.to_string(),
                exit_code: None,
            }),
        }
    }

    /// Drop a just-imported resource from state after its post-hook failed
    fn forget(&self, item: &ImportItem) {
        let Some(address) = item.target_address() else {
            return;
        };

        let _guard = self.import_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.executor.state_rm(&self.working_dir, address) {
            self.output
                .warning(&format!("Failed to remove {} from state: {}", address, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MemoryExecutor;
    use crate::traits::{MemoryFileSystem, MockOutput};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WORKSPACE: &str = "/ws/.tfexport";

    fn named_items(count: usize) -> Vec<ImportItem> {
        (0..count)
            .map(|i| {
                let mut item = ImportItem::new(
                    format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet{}", i),
                    Some("azurerm_virtual_network".to_string()),
                );
                item.set_address(TargetAddress::new(
                    "azurerm_virtual_network",
                    format!("vnet{}", i),
                ));
                item
            })
            .collect()
    }

    fn importer(executor: Arc<MemoryExecutor>, hooks: HookChain) -> ParallelImporter {
        let fs = MemoryFileSystem::new();
        fs.create_dir_all(Path::new(WORKSPACE)).unwrap();

        ParallelImporter::new(
            executor,
            Arc::new(fs),
            Arc::new(MockOutput::new()),
            hooks,
            PathBuf::from(WORKSPACE),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_imports_every_item() {
        let executor = Arc::new(MemoryExecutor::new());
        let importer = importer(executor.clone(), HookChain::new());
        let mut items = named_items(6);

        let summary = importer
            .run(&mut items, 3, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.imported, 6);
        assert_eq!(summary.total, 6);
        assert!(items.iter().all(|i| i.state() == ImportState::Imported));
        assert_eq!(executor.show(Path::new(WORKSPACE)).unwrap().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_import_in_critical_section() {
        let executor = Arc::new(MemoryExecutor::with_latency(Duration::from_millis(5)));
        let importer = importer(executor.clone(), HookChain::new());
        let mut items = named_items(12);

        importer
            .run(&mut items, 8, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(executor.import_calls(), 12);
        assert_eq!(executor.max_concurrent_imports(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hooks_run_outside_the_import_lock() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let mut hooks = HookChain::new();
        hooks
            .set_pre_import(Arc::new(move |_: &mut ImportItem| -> anyhow::Result<HookDecision> {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(HookDecision::Continue)
            }))
            .unwrap();

        let importer = importer(Arc::new(MemoryExecutor::new()), hooks);
        let mut items = named_items(4);

        importer
            .run(&mut items, 4, &CancelToken::new())
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_veto_skips_without_calling_import() {
        let mut hooks = HookChain::new();
        hooks
            .set_pre_import(Arc::new(|item: &mut ImportItem| -> anyhow::Result<HookDecision> {
                if item.source_id().ends_with("vnet2") {
                    Ok(HookDecision::Skip("kept out by policy".to_string()))
                } else {
                    Ok(HookDecision::Continue)
                }
            }))
            .unwrap();

        let executor = Arc::new(MemoryExecutor::new());
        let importer = importer(executor.clone(), hooks);
        let mut items = named_items(5);

        let summary = importer
            .run(&mut items, 2, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(executor.import_calls(), 4);
        assert_eq!(summary.imported, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(items[2].state(), ImportState::Skipped);
        assert_eq!(items[2].reason().unwrap(), "kept out by policy");
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_run() {
        let executor = Arc::new(MemoryExecutor::new());
        let mut items = named_items(3);
        executor.fail_import(items[1].source_id(), "ResourceNotFound");
        let importer = importer(executor, HookChain::new());

        let summary = importer
            .run(&mut items, 1, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            items[1].error(),
            Some(ItemError::Import { message, exit_code: Some(1) }) if message == "ResourceNotFound"
        ));
    }

    #[tokio::test]
    async fn test_already_managed_counts_as_imported() {
        let executor = Arc::new(MemoryExecutor::new());
        let mut items = named_items(2);
        executor.seed(
            Path::new(WORKSPACE),
            items[0].target_address().unwrap(),
            items[0].source_id(),
        );
        let importer = importer(executor, HookChain::new());

        let summary = importer
            .run(&mut items, 2, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.already_imported, 1);
        assert!(items[0].already_imported());
    }

    #[tokio::test]
    async fn test_panicking_hook_fails_only_that_item() {
        let mut hooks = HookChain::new();
        hooks
            .set_pre_import(Arc::new(|item: &mut ImportItem| -> anyhow::Result<HookDecision> {
                if item.source_id().ends_with("vnet0") {
                    panic!("bad hook");
                }
                Ok(HookDecision::Continue)
            }))
            .unwrap();

        let importer = importer(Arc::new(MemoryExecutor::new()), hooks);
        let mut items = named_items(3);

        let summary = importer
            .run(&mut items, 2, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.imported, 2);
        assert!(matches!(items[0].error(), Some(ItemError::Hook { .. })));
    }

    #[tokio::test]
    async fn test_post_hook_failure_removes_fresh_import_from_state() {
        let mut hooks = HookChain::new();
        hooks
            .set_post_import(Arc::new(
                |item: &ImportItem, _: &ImportOutcome| -> anyhow::Result<()> {
                    if item.source_id().ends_with("vnet1") {
                        anyhow::bail!("audit failed");
                    }
                    Ok(())
                },
            ))
            .unwrap();

        let executor = Arc::new(MemoryExecutor::new());
        let importer = importer(executor.clone(), hooks);
        let mut items = named_items(2);

        importer
            .run(&mut items, 1, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(items[1].state(), ImportState::Failed);
        let snapshot = executor.show(Path::new(WORKSPACE)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.find(items[1].target_address().unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_rename_to_taken_address_fails() {
        let mut hooks = HookChain::new();
        hooks
            .set_pre_import(Arc::new(|item: &mut ImportItem| -> anyhow::Result<HookDecision> {
                if item.source_id().ends_with("vnet1") {
                    item.rename("vnet0");
                } else if item.source_id().ends_with("vnet2") {
                    item.rename("primary");
                }
                Ok(HookDecision::Continue)
            }))
            .unwrap();

        let importer = importer(Arc::new(MemoryExecutor::new()), hooks);
        let mut items = named_items(3);

        importer
            .run(&mut items, 1, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(items[0].state(), ImportState::Imported);
        assert_eq!(items[1].state(), ImportState::Failed);
        assert_eq!(items[2].state(), ImportState::Imported);
        assert_eq!(items[2].target_address().unwrap().name, "primary");
    }

    #[tokio::test]
    async fn test_cancellation_leaves_no_item_pending() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let mut hooks = HookChain::new();
        hooks
            .set_pre_import(Arc::new(move |item: &mut ImportItem| -> anyhow::Result<HookDecision> {
                if item.source_id().ends_with("vnet2") {
                    trigger.cancel();
                }
                Ok(HookDecision::Continue)
            }))
            .unwrap();

        let executor = Arc::new(MemoryExecutor::new());
        let importer = importer(executor.clone(), hooks);
        let mut items = named_items(6);

        let err = importer.run(&mut items, 1, &cancel).await.unwrap_err();

        assert_eq!(err, RunError::Cancelled { completed: 3, total: 6 });
        assert!(items.iter().all(|i| i.state().is_terminal()));
        assert_eq!(items[0].state(), ImportState::Imported);
        assert_eq!(items[1].state(), ImportState::Imported);
        assert_eq!(items[2].error(), Some(&ItemError::Cancelled));
        assert!(items[3..]
            .iter()
            .all(|i| i.skip_reason() == Some(&SkipReason::Cancelled)));
        assert_eq!(executor.import_calls(), 2);
    }

    #[tokio::test]
    async fn test_outcome_sets_cover_every_item() {
        let executor = Arc::new(MemoryExecutor::new());
        let mut items = named_items(4);
        items.push(ImportItem::new("/unmapped", None));
        executor.fail_import(items[3].source_id(), "boom");

        let importer = importer(executor, HookChain::new());
        let summary = importer
            .run(&mut items, 2, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary.imported + summary.skipped + summary.failed,
            items.len()
        );
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let importer = importer(Arc::new(MemoryExecutor::new()), HookChain::new());
        let mut items = named_items(1);

        let err = importer
            .run(&mut items, 0, &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RunError::InvalidConcurrency(0));
        assert_eq!(items[0].state(), ImportState::Pending);
    }

    #[tokio::test]
    async fn test_missing_workspace_is_unusable() {
        let importer = ParallelImporter::new(
            Arc::new(MemoryExecutor::new()),
            Arc::new(MemoryFileSystem::new()),
            Arc::new(MockOutput::new()),
            HookChain::new(),
            PathBuf::from("/missing"),
        );
        let mut items = named_items(1);

        let err = importer
            .run(&mut items, 1, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::WorkspaceUnusable(_)));
    }
}
