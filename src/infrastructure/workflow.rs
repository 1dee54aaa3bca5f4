//! Full export pipeline over an orchestrator

use serde::Serialize;
use std::path::PathBuf;

use super::cancel::CancelToken;
use super::error::ExportResult;
use super::importer::ImportSummary;
use super::item::ImportState;
use super::meta::{Meta, MetaState};
use crate::traits::Output;

/// What a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub variant: &'static str,
    pub scope: String,
    pub workspace: PathBuf,
    pub summary: ImportSummary,
    pub config_path: PathBuf,
    pub resources_in_config: usize,
    pub mapping_path: PathBuf,
    pub skipped_path: PathBuf,
}

impl RunReport {
    /// Whether every discovered resource was handled without failure
    pub fn is_success(&self) -> bool {
        !self.summary.cancelled && self.summary.failed == 0
    }
}

/// Drive `meta` from `Created` to `Deinitialized`.
///
/// On a component error the orchestrator is left `Failed`, the workspace is
/// released best-effort, and the error is returned.
pub fn run_export(
    meta: &mut dyn Meta,
    cancel: &CancelToken,
    output: &dyn Output,
) -> ExportResult<RunReport> {
    match run_steps(meta, cancel, output) {
        Ok(report) => Ok(report),
        Err(e) => {
            if meta.state() == MetaState::Failed
                && let Err(deinit_err) = meta.deinit()
            {
                output.warning(&format!("Failed to release workspace: {}", deinit_err));
            }
            Err(e)
        }
    }
}

fn run_steps(
    meta: &mut dyn Meta,
    cancel: &CancelToken,
    output: &dyn Output,
) -> ExportResult<RunReport> {
    output.section(&format!("Exporting {}", meta.scope_name()));

    meta.init()?;
    output.success(&format!(
        "Workspace initialized at {}",
        meta.workspace().display()
    ));

    meta.list_resource()?;
    output.info(&format!("Listed {} resource(s)", meta.items().len()));

    let summary = meta.parallel_import(cancel)?;
    meta.push_state()?;

    let config = meta.generate_cfg()?;
    output.success(&format!(
        "Generated {} ({} resources)",
        config.path.display(),
        config.resource_count
    ));

    let mapping_path = meta.export_resource_mapping()?;
    let skipped_path = meta.export_skipped_resources()?;

    // Reconciling state before the artifacts can turn imports into failures
    let summary = meta.summary().cloned().unwrap_or(summary);

    meta.clean_up_workspace()?;
    meta.deinit()?;

    let report = RunReport {
        variant: meta.variant(),
        scope: meta.scope_name(),
        workspace: meta.workspace().to_path_buf(),
        summary,
        config_path: config.path,
        resources_in_config: config.resource_count,
        mapping_path,
        skipped_path,
    };

    print_report(meta, &report, output);
    Ok(report)
}

fn print_report(meta: &dyn Meta, report: &RunReport, output: &dyn Output) {
    let summary = &report.summary;

    output.section("Summary");
    output.key_value("Total", &summary.total.to_string());
    output.key_value(
        "Imported",
        &format!(
            "{} ({} already managed)",
            summary.imported, summary.already_imported
        ),
    );
    output.key_value("Skipped", &summary.skipped.to_string());
    output.key_value("Failed", &summary.failed.to_string());
    output.key_value("Mapping", &report.mapping_path.display().to_string());
    output.key_value("Skipped report", &report.skipped_path.display().to_string());

    for item in meta.items() {
        if item.state() == ImportState::Failed {
            output.error(&format!(
                "{}: {}",
                item.source_id(),
                item.reason().unwrap_or_default()
            ));
        }
    }

    output.blank();
    if summary.cancelled {
        output.warning("Run was cancelled; the reports cover the partial result");
    } else if summary.failed > 0 {
        output.warning(&format!(
            "{} resource(s) failed to import; see {}",
            summary.failed,
            report.skipped_path.display()
        ));
    } else {
        output.success("Export completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MemoryExecutor;
    use crate::infrastructure::discovery::test_support::{StaticDiscovery, TableMapper};
    use crate::infrastructure::error::ExportError;
    use crate::infrastructure::meta::test_support::{
        options, three_item_meta, TestMeta, LB, RG, VNET,
    };
    use crate::infrastructure::meta::{MetaBase, MetaComponents};
    use crate::infrastructure::workspace::WorkspaceMode;
    use crate::traits::output::OutputMessage;
    use crate::traits::{FileSystem, MemoryFileSystem, MockOutput};
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn test_run_export_end_to_end() {
        let fs = MemoryFileSystem::new();
        let mut meta = three_item_meta(&fs, Arc::new(MemoryExecutor::new()), WorkspaceMode::Fresh);
        let output = MockOutput::new();

        let report = run_export(&mut meta, &CancelToken::new(), &output).unwrap();

        assert!(report.is_success());
        assert_eq!(report.variant, "test");
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.resources_in_config, 2);
        assert_eq!(meta.state(), MetaState::Deinitialized);
        assert!(fs.has_file(&report.mapping_path));
        assert!(fs.has_file(&report.skipped_path));
        assert!(output
            .get_messages()
            .contains(&OutputMessage::KeyValue("Skipped".to_string(), "1".to_string())));
    }

    #[test]
    fn test_failed_import_is_reported_not_raised() {
        let fs = MemoryFileSystem::new();
        let executor = Arc::new(MemoryExecutor::new());
        executor.fail_import(VNET, "AuthorizationFailed");
        let mut meta = three_item_meta(&fs, executor, WorkspaceMode::Fresh);
        let output = MockOutput::new();

        let report = run_export(&mut meta, &CancelToken::new(), &output).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.resources_in_config, 1);

        let skipped = fs.read_to_string(&report.skipped_path).unwrap();
        assert!(skipped.contains(VNET));
        assert!(skipped.contains(LB));
        assert!(output.has_error());
    }

    #[test]
    fn test_fatal_error_releases_workspace() {
        let fs = MemoryFileSystem::new();
        let mut meta = TestMeta(MetaBase::new(
            options(WorkspaceMode::Fresh),
            MetaComponents {
                discovery: Arc::new(StaticDiscovery::failing("AuthorizationFailed")),
                mapper: Arc::new(TableMapper::new(&[])),
                executor: Arc::new(MemoryExecutor::new()),
                fs: Arc::new(fs.clone()),
                output: Arc::new(MockOutput::new()),
            },
        ));

        let err = run_export(&mut meta, &CancelToken::new(), &MockOutput::new()).unwrap_err();

        assert!(matches!(err, ExportError::Discovery(_)));
        assert_eq!(meta.state(), MetaState::Failed);
        assert!(!fs.exists(Path::new("/out/.tfexport.lock")));
        assert!(!fs.exists(Path::new("/out/main.tf")));
    }

    #[test]
    fn test_cancelled_run_still_writes_reports() {
        let fs = MemoryFileSystem::new();
        let mut meta = three_item_meta(&fs, Arc::new(MemoryExecutor::new()), WorkspaceMode::Fresh);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_export(&mut meta, &cancel, &MockOutput::new()).unwrap();

        assert!(report.summary.cancelled);
        assert!(!report.is_success());
        let skipped = fs.read_to_string(&report.skipped_path).unwrap();
        assert!(skipped.contains(&format!("- {}\n  state: skipped\n  reason: run cancelled", RG)));
    }
}
