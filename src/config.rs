//! Run configuration
//!
//! Values come from a YAML file (`--config`, or `tfexport/config.yaml` under
//! the user's config directory when present); command-line flags override them.

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::infrastructure::discovery::Scope;
use crate::infrastructure::error::{ExportError, ExportResult};
use crate::infrastructure::item::TargetAddress;
use crate::infrastructure::meta::MetaOptions;
use crate::infrastructure::naming::NamingOptions;
use crate::infrastructure::resource_mapper::TargetProvider;
use crate::infrastructure::workspace::{WorkspaceMode, WorkspaceOptions};
use crate::traits::FileSystem;

pub const CONFIG_DIR: &str = "tfexport";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_PARALLELISM: usize = 10;

/// Shell commands run around each import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookCommands {
    pub pre_import: Option<String>,
    pub post_import: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub subscription_id: Option<String>,
    pub output_dir: PathBuf,
    /// `azurerm` or `azapi`
    pub provider_name: String,
    /// `terraform` or `opentofu`
    pub executor: String,
    pub backend_type: String,
    pub backend_config: BTreeMap<String, String>,
    pub parallelism: usize,
    pub resource_name_pattern: Option<String>,
    pub type_name_patterns: BTreeMap<String, String>,
    /// Regexes over source ids
    pub exclude: Vec<String>,
    pub overwrite: bool,
    pub append: bool,
    pub generate_import_block: bool,
    pub hooks: HookCommands,
    pub simulate: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            output_dir: PathBuf::from("."),
            provider_name: TargetProvider::Azurerm.as_str().to_string(),
            executor: "terraform".to_string(),
            backend_type: "local".to_string(),
            backend_config: BTreeMap::new(),
            parallelism: DEFAULT_PARALLELISM,
            resource_name_pattern: None,
            type_name_patterns: BTreeMap::new(),
            exclude: Vec::new(),
            overwrite: false,
            append: false,
            generate_import_block: false,
            hooks: HookCommands::default(),
            simulate: false,
        }
    }
}

impl ExportConfig {
    /// `<config dir>/tfexport/config.yaml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file just means defaults.
    pub fn load(fs: &dyn FileSystem, path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => {
                if !fs.exists(explicit) {
                    anyhow::bail!("Config file not found: {}", explicit.display());
                }
                explicit.to_path_buf()
            }
            None => match Self::default_path() {
                Some(default) if fs.exists(&default) => default,
                _ => return Ok(Self::default()),
            },
        };

        Self::from_file(fs, &path)
    }

    pub fn from_file(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let content = fs.read_to_string(path)?;
        let config: ExportConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.parallelism == 0 {
            return Err(ExportError::ConfigParse(
                "parallelism must be at least 1".to_string(),
            ));
        }

        if self.overwrite && self.append {
            return Err(ExportError::ConfigParse(
                "overwrite and append cannot be used together".to_string(),
            ));
        }

        self.provider()?;
        self.exclusion_patterns()?;

        if self.backend_type.trim().is_empty() {
            return Err(ExportError::ConfigParse(
                "backend_type must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn provider(&self) -> ExportResult<TargetProvider> {
        TargetProvider::from_name(&self.provider_name).ok_or_else(|| {
            ExportError::ConfigParse(format!(
                "unknown provider '{}' (expected azurerm or azapi)",
                self.provider_name
            ))
        })
    }

    pub fn workspace_mode(&self) -> WorkspaceMode {
        if self.overwrite {
            WorkspaceMode::Overwrite
        } else if self.append {
            WorkspaceMode::Append
        } else {
            WorkspaceMode::Fresh
        }
    }

    pub fn exclusion_patterns(&self) -> ExportResult<Vec<Regex>> {
        self.exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ExportError::ConfigParse(format!(
                        "invalid exclude pattern '{}': {}",
                        pattern, e
                    ))
                })
            })
            .collect()
    }

    /// Everything the orchestrator needs for one run over `scope`
    pub fn meta_options(
        &self,
        scope: Scope,
        presets: HashMap<String, TargetAddress>,
    ) -> ExportResult<MetaOptions> {
        Ok(MetaOptions {
            scope,
            parallelism: self.parallelism,
            naming: NamingOptions {
                pattern: self.resource_name_pattern.clone(),
                type_patterns: self.type_name_patterns.clone(),
                presets,
            },
            exclusions: self.exclusion_patterns()?,
            workspace: WorkspaceOptions {
                root: self.output_dir.clone(),
                mode: self.workspace_mode(),
                provider: self.provider()?,
                subscription_id: self.subscription_id.clone(),
                backend_type: self.backend_type.clone(),
                backend_config: self.backend_config.clone(),
            },
            import_blocks: self.generate_import_block,
        })
    }
}
