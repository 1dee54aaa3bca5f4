//! Artifact Generator
//!
//! Produces the persisted outputs of a run from the final item list:
//! configuration text, the resource-mapping report and the skipped/failed
//! report. The three producers are independent and may run in any order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{ExportError, ExportResult};
use super::hcl::{render_import_block, render_resource};
use super::item::{ImportItem, ImportState, TargetAddress};
use crate::executor::Executor;
use crate::traits::{FileSystem, Output};

pub const CONFIG_FILE: &str = "main.tf";
pub const APPEND_CONFIG_FILE: &str = "main.tfexport.tf";
pub const IMPORT_FILE: &str = "import.tf";
pub const APPEND_IMPORT_FILE: &str = "import.tfexport.tf";
pub const MAPPING_FILE: &str = "tfexportResourceMapping.json";
pub const SKIPPED_FILE: &str = "tfexportSkippedResources.txt";

/// One row of the resource-mapping report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub resource_id: String,
    pub resource_type: String,
    pub resource_name: String,
}

impl MappingEntry {
    pub fn address(&self) -> TargetAddress {
        TargetAddress::new(&self.resource_type, &self.resource_name)
    }
}

/// Configuration written by `generate_config`
#[derive(Debug, Clone)]
pub struct GeneratedConfig {
    pub path: PathBuf,
    pub content: String,
    pub resource_count: usize,
    /// Imported addresses with no entry in the workspace state
    pub missing: Vec<TargetAddress>,
    /// Imported addresses left out because an earlier configuration declares them
    pub already_declared: usize,
}

#[derive(Debug, Clone)]
pub struct ArtifactOptions {
    /// Where the reports and configuration go
    pub root: PathBuf,
    /// Workspace whose state the configuration is read from
    pub state_dir: PathBuf,
    pub append: bool,
    pub import_blocks: bool,
}

pub struct ArtifactGenerator {
    options: ArtifactOptions,
    fs: Arc<dyn FileSystem>,
    executor: Arc<dyn Executor>,
    output: Arc<dyn Output>,
}

impl ArtifactGenerator {
    pub fn new(
        options: ArtifactOptions,
        fs: Arc<dyn FileSystem>,
        executor: Arc<dyn Executor>,
        output: Arc<dyn Output>,
    ) -> Self {
        Self {
            options,
            fs,
            executor,
            output,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        let file = if self.options.append {
            APPEND_CONFIG_FILE
        } else {
            CONFIG_FILE
        };
        self.options.root.join(file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.options.root.join(MAPPING_FILE)
    }

    pub fn skipped_path(&self) -> PathBuf {
        self.options.root.join(SKIPPED_FILE)
    }

    /// Render configuration for every imported item, in discovery order.
    ///
    /// In append mode, addresses in `declared` were managed before the run and
    /// already have a block in the existing configuration, so they are left out.
    pub fn generate_config(
        &self,
        items: &[ImportItem],
        declared: &HashSet<String>,
    ) -> ExportResult<GeneratedConfig> {
        let snapshot = self.executor.show(&self.options.state_dir)?;

        let mut blocks = Vec::new();
        let mut imports = Vec::new();
        let mut missing = Vec::new();
        let mut already_declared = 0;

        for item in imported(items) {
            let Some(address) = item.target_address() else {
                continue;
            };

            if self.options.append && declared.contains(&address.to_string()) {
                already_declared += 1;
                continue;
            }

            match snapshot.find(address) {
                Some(resource) => {
                    blocks.push(render_resource(resource));
                    imports.push(render_import_block(address, item.source_id()));
                }
                None => {
                    self.output.warning(&format!(
                        "No state found for {}; left out of the configuration",
                        address
                    ));
                    missing.push(address.clone());
                }
            }
        }

        let content = blocks.join("\n");
        let path = self.config_path();
        self.write(&path, &content)?;

        if self.options.import_blocks {
            let file = if self.options.append {
                APPEND_IMPORT_FILE
            } else {
                IMPORT_FILE
            };
            self.write(&self.options.root.join(file), &imports.join("\n"))?;
        }

        Ok(GeneratedConfig {
            path,
            content,
            resource_count: blocks.len(),
            missing,
            already_declared,
        })
    }

    /// Write `source id -> address` for every imported item.
    ///
    /// In append mode the entries of an earlier report are kept.
    pub fn export_resource_mapping(&self, items: &[ImportItem]) -> ExportResult<PathBuf> {
        let path = self.mapping_path();

        let mut mapping = if self.options.append && self.fs.exists(&path) {
            load_mapping(self.fs.as_ref(), &path)?
        } else {
            BTreeMap::new()
        };

        for item in imported(items) {
            if let Some(address) = item.target_address() {
                mapping.insert(
                    item.source_id().to_string(),
                    MappingEntry {
                        resource_id: item.source_id().to_string(),
                        resource_type: address.resource_type.clone(),
                        resource_name: address.name.clone(),
                    },
                );
            }
        }

        let content = serde_json::to_string_pretty(&mapping)?;
        self.write(&path, &content)?;
        Ok(path)
    }

    /// Write every skipped and failed item with its reason.
    ///
    /// Always written, so a run where everything succeeded still says so.
    pub fn export_skipped_resources(&self, items: &[ImportItem]) -> ExportResult<PathBuf> {
        let path = self.skipped_path();
        let leftovers: Vec<&ImportItem> = items
            .iter()
            .filter(|item| {
                matches!(item.state(), ImportState::Skipped | ImportState::Failed)
            })
            .collect();

        let mut content = String::new();
        if leftovers.is_empty() {
            content.push_str("Every discovered resource was imported.\n");
        } else {
            content.push_str("The following resources were not imported:\n\n");
            for item in leftovers {
                content.push_str(&format!(
                    "- {}\n  state: {}\n  reason: {}\n",
                    item.source_id(),
                    item.state(),
                    item.reason().unwrap_or_else(|| "unknown".to_string())
                ));
            }
        }

        self.write(&path, &content)?;
        Ok(path)
    }

    fn write(&self, path: &Path, content: &str) -> ExportResult<()> {
        self.fs.write(path, content).map_err(|e| {
            ExportError::Workspace(format!("Failed to write {}: {:#}", path.display(), e))
        })
    }
}

fn imported(items: &[ImportItem]) -> impl Iterator<Item = &ImportItem> {
    items
        .iter()
        .filter(|item| item.state() == ImportState::Imported)
}

/// Read a resource-mapping report
pub fn load_mapping(
    fs: &dyn FileSystem,
    path: &Path,
) -> ExportResult<BTreeMap<String, MappingEntry>> {
    let content = fs
        .read_to_string(path)
        .map_err(|e| ExportError::ConfigParse(format!("{:#}", e)))?;

    serde_json::from_str(&content).map_err(|e| {
        ExportError::ConfigParse(format!("Invalid mapping file {}: {}", path.display(), e))
    })
}

/// Pinned addresses for a re-run from a mapping report
pub fn mapping_presets(
    mapping: &BTreeMap<String, MappingEntry>,
) -> HashMap<String, TargetAddress> {
    mapping
        .values()
        .map(|entry| (entry.resource_id.clone(), entry.address()))
        .collect()
}
