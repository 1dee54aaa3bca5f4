//! Workspace Manager
//!
//! Owns the output directory of one run. Layout:
//!
//! ```text
//! <output>/
//!   .tfexport.lock      held from init until deinit
//!   terraform.tf        required providers + backend
//!   provider.tf
//!   .tfexport/          staging workspace the imports run in (transient)
//! ```
//!
//! Imports land in the staging workspace, which always uses a local backend.
//! `push_state` then commits that state into the output directory's backend.

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{ExportError, ExportResult};
use super::hcl::quote;
use super::item::TargetAddress;
use super::resource_mapper::TargetProvider;
use super::transient::{CleanupResult, TransientArtifacts};
use crate::executor::Executor;
use crate::traits::{FileSystem, Output};

pub const STAGING_DIR: &str = ".tfexport";
pub const LOCK_FILE: &str = ".tfexport.lock";
pub const STATE_FILE: &str = "terraform.tfstate";
pub const TERRAFORM_FILE: &str = "terraform.tf";
pub const PROVIDER_FILE: &str = "provider.tf";

const TERRAFORM_TEMPLATE: &str = r#"terraform {
  backend "{{backend_type}}" {
{{#each backend_config}}
    {{@key}} = {{this}}
{{/each}}
  }
  required_providers {
    {{provider_name}} = {
      source  = "{{provider_source}}"
      version = "{{provider_version}}"
    }
  }
}
"#;

const PROVIDER_TEMPLATE: &str = r#"provider "{{provider_name}}" {
{{#if features}}
  features {}
{{/if}}
{{#if subscription_id}}
  subscription_id = {{subscription_id}}
{{/if}}
}
"#;

/// What to do with an output directory that already has content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// Directory must be empty
    #[default]
    Fresh,
    /// Wipe existing content first
    Overwrite,
    /// Keep existing content and state; add to it
    Append,
}

#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    pub root: PathBuf,
    pub mode: WorkspaceMode,
    pub provider: TargetProvider,
    pub subscription_id: Option<String>,
    pub backend_type: String,
    pub backend_config: BTreeMap<String, String>,
}

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceLock {
    pub run_id: String,
    pub user: String,
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

pub struct WorkspaceManager {
    options: WorkspaceOptions,
    fs: Arc<dyn FileSystem>,
    executor: Arc<dyn Executor>,
    output: Arc<dyn Output>,
    transient: TransientArtifacts,
    run_id: String,
    lock_held: bool,
    /// Addresses already in state before this run imported anything
    managed_before_run: HashSet<String>,
}

impl WorkspaceManager {
    pub fn new(
        options: WorkspaceOptions,
        fs: Arc<dyn FileSystem>,
        executor: Arc<dyn Executor>,
        output: Arc<dyn Output>,
    ) -> Self {
        Self {
            options,
            fs,
            executor,
            output,
            transient: TransientArtifacts::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
            lock_held: false,
            managed_before_run: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.options.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.options.root.join(STAGING_DIR)
    }

    pub fn mode(&self) -> WorkspaceMode {
        self.options.mode
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Addresses the staging state held right after `init`; empty unless appending
    pub fn managed_before_run(&self) -> &HashSet<String> {
        &self.managed_before_run
    }

    /// Prepare the output directory and the staging workspace
    pub fn init(&mut self) -> ExportResult<()> {
        let root = self.options.root.clone();

        self.fs
            .create_dir_all(&root)
            .map_err(|e| workspace_error("create output directory", e))?;

        self.check_lock()?;
        self.prepare_root()?;
        self.acquire_lock()?;

        let keep_existing_config = self.options.mode == WorkspaceMode::Append;
        self.write_config(
            &root,
            &self.options.backend_type,
            &self.options.backend_config,
            keep_existing_config,
        )?;
        self.executor.init(&root)?;

        let staging = self.staging_dir();
        if self.fs.exists(&staging) {
            self.fs
                .remove_dir_all(&staging)
                .map_err(|e| workspace_error("remove stale staging directory", e))?;
        }
        self.fs
            .create_dir_all(&staging)
            .map_err(|e| workspace_error("create staging directory", e))?;
        self.transient.track_dir(staging.clone());

        self.write_config(&staging, "local", &BTreeMap::new(), false)?;

        if self.options.mode == WorkspaceMode::Append {
            self.seed_staging_state(&root, &staging)?;
        }

        self.executor.init(&staging)?;

        if self.options.mode == WorkspaceMode::Append {
            self.managed_before_run = self
                .executor
                .show(&staging)?
                .resources
                .into_iter()
                .map(|resource| resource.address)
                .collect();
        }

        self.output.debug(&format!(
            "Workspace ready at {} (run {})",
            root.display(),
            self.run_id
        ));
        Ok(())
    }

    /// Commit the staging state into the output directory.
    ///
    /// A run that imported nothing has nothing to push.
    pub fn push_state(&self, imported: usize) -> ExportResult<()> {
        if imported == 0 {
            self.output.debug("No imported resources; skipping state push");
            return Ok(());
        }

        let state_file = self.staging_dir().join(STATE_FILE);
        self.executor.state_push(&self.options.root, &state_file)
    }

    /// Remove one resource from the staging state
    pub fn clean_tf_state(&self, address: &TargetAddress) -> ExportResult<()> {
        self.executor.state_rm(&self.staging_dir(), address)
    }

    /// Remove transient artifacts. Never touches generated output.
    pub fn clean_up(&mut self) -> CleanupResult {
        let result = self.transient.remove_all(self.fs.as_ref());

        if result.is_complete() {
            self.output.debug(&format!("Cleanup: {}", result));
        } else {
            for path in &result.failed {
                self.output
                    .warning(&format!("Could not remove {}", path.display()));
            }
        }

        result
    }

    /// Release the workspace lock
    pub fn deinit(&mut self) -> ExportResult<()> {
        if !self.lock_held {
            return Ok(());
        }

        let lock_path = self.options.root.join(LOCK_FILE);
        if self.fs.exists(&lock_path) {
            self.fs
                .remove_file(&lock_path)
                .map_err(|e| workspace_error("release lock", e))?;
        }
        self.lock_held = false;
        Ok(())
    }

    fn check_lock(&self) -> ExportResult<()> {
        let lock_path = self.options.root.join(LOCK_FILE);
        if !self.fs.exists(&lock_path) {
            return Ok(());
        }

        let holder = self
            .fs
            .read_to_string(&lock_path)
            .ok()
            .and_then(|content| serde_json::from_str::<WorkspaceLock>(&content).ok())
            .map(|lock| {
                format!(
                    "run {} by {} (pid {}) since {}",
                    lock.run_id,
                    lock.user,
                    lock.pid,
                    lock.created_at.to_rfc3339()
                )
            })
            .unwrap_or_else(|| "an unknown run".to_string());

        Err(ExportError::Workspace(format!(
            "{} is locked by {}; remove {} if that run is gone",
            self.options.root.display(),
            holder,
            LOCK_FILE
        )))
    }

    fn prepare_root(&self) -> ExportResult<()> {
        let root = &self.options.root;
        let entries = self
            .fs
            .read_dir(root)
            .map_err(|e| workspace_error("read output directory", e))?;

        if entries.is_empty() {
            return Ok(());
        }

        match self.options.mode {
            WorkspaceMode::Fresh => Err(ExportError::Workspace(format!(
                "output directory {} is not empty (use --overwrite or --append)",
                root.display()
            ))),
            WorkspaceMode::Overwrite => {
                self.output.warning(&format!(
                    "Removing existing content of {}",
                    root.display()
                ));
                for entry in entries {
                    let removed = if self.fs.is_dir(&entry) {
                        self.fs.remove_dir_all(&entry)
                    } else {
                        self.fs.remove_file(&entry)
                    };
                    removed.map_err(|e| workspace_error("clean output directory", e))?;
                }
                Ok(())
            }
            WorkspaceMode::Append => Ok(()),
        }
    }

    fn acquire_lock(&mut self) -> ExportResult<()> {
        let lock = WorkspaceLock {
            run_id: self.run_id.clone(),
            user: whoami::username(),
            pid: std::process::id(),
            created_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock)?;
        self.fs
            .write(&self.options.root.join(LOCK_FILE), &content)
            .map_err(|e| workspace_error("write lock file", e))?;
        self.lock_held = true;
        Ok(())
    }

    fn write_config(
        &self,
        dir: &Path,
        backend_type: &str,
        backend_config: &BTreeMap<String, String>,
        keep_existing: bool,
    ) -> ExportResult<()> {
        let info = self.options.provider.info();
        let quoted_backend: BTreeMap<&String, String> = backend_config
            .iter()
            .map(|(key, value)| (key, quote(value)))
            .collect();

        let data = json!({
            "backend_type": backend_type,
            "backend_config": quoted_backend,
            "provider_name": info.tf_name,
            "provider_source": info.source,
            "provider_version": info.default_version,
            "features": info.needs_features_block,
            "subscription_id": self.options.subscription_id.as_deref().map(quote),
        });

        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for (file, template) in [
            (TERRAFORM_FILE, TERRAFORM_TEMPLATE),
            (PROVIDER_FILE, PROVIDER_TEMPLATE),
        ] {
            let path = dir.join(file);
            if keep_existing && self.fs.exists(&path) {
                continue;
            }

            let rendered = handlebars
                .render_template(template, &data)
                .map_err(|e| ExportError::Workspace(format!("Failed to render {}: {}", file, e)))?;
            self.fs
                .write(&path, &rendered)
                .map_err(|e| workspace_error("write configuration", e))?;
        }

        Ok(())
    }

    /// Start the staging workspace from the existing local state
    fn seed_staging_state(&self, root: &Path, staging: &Path) -> ExportResult<()> {
        let existing = root.join(STATE_FILE);
        if !self.fs.exists(&existing) {
            return Ok(());
        }

        let content = self
            .fs
            .read_to_string(&existing)
            .map_err(|e| workspace_error("read existing state", e))?;
        self.fs
            .write(&staging.join(STATE_FILE), &content)
            .map_err(|e| workspace_error("copy existing state", e))
    }
}

fn workspace_error(action: &str, err: anyhow::Error) -> ExportError {
    ExportError::Workspace(format!("Failed to {}: {:#}", action, err))
}
