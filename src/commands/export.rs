use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::context::Context;
use crate::executor::{DefaultExecutorRegistry, ExecutorRegistry};
use crate::infrastructure::artifacts::{load_mapping, mapping_presets};
use crate::infrastructure::discovery::TypeMapper;
use crate::infrastructure::hooks::ShellHook;
use crate::infrastructure::item::TargetAddress;
use crate::infrastructure::providers::AzCliDiscovery;
use crate::infrastructure::resource_mapper::AzureTypeMapper;
use crate::infrastructure::simulated::DEFAULT_LATENCY;
use crate::infrastructure::{
    run_export, CancelToken, LiveOrchestrator, Meta, MetaComponents, MetaOptions, RunReport,
    Scope, SimulatedOrchestrator,
};

/// What to export
#[derive(Debug, Subcommand)]
pub enum ScopeCommand {
    /// Export a resource group and everything in it
    ResourceGroup {
        /// Resource group name
        name: String,
    },

    /// Export the resources matched by an Azure Resource Graph where-clause
    Query {
        /// Predicate, e.g. "type =~ 'microsoft.network/virtualnetworks'"
        predicate: String,
    },

    /// Export explicit resource ids
    Resource {
        /// One or more Azure resource ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Resource name in the configuration (single id only)
        #[arg(long)]
        name: Option<String>,
    },

    /// Re-run from a previous resource-mapping report, keeping its addresses
    MappingFile {
        /// Path to a tfexportResourceMapping.json
        path: PathBuf,
    },
}

/// Options shared by every scope. Each overrides the config file.
#[derive(Debug, Default, Args)]
pub struct ExportOptions {
    /// Config file (defaults to tfexport/config.yaml in the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory that receives the configuration and state
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Azure subscription id
    #[arg(short, long, global = true, env = "ARM_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Target provider: azurerm or azapi
    #[arg(long, global = true)]
    pub provider_name: Option<String>,

    /// Tool that performs the imports: terraform or opentofu
    #[arg(long, global = true)]
    pub executor: Option<String>,

    /// Backend of the output directory (default: local)
    #[arg(long, global = true)]
    pub backend_type: Option<String>,

    /// Backend setting as key=value (repeatable)
    #[arg(long, global = true)]
    pub backend_config: Vec<String>,

    /// Number of resources processed at once
    #[arg(short, long, global = true)]
    pub parallelism: Option<usize>,

    /// Resource name pattern with {name} and {type} placeholders
    #[arg(long, global = true)]
    pub name_pattern: Option<String>,

    /// Skip resource ids matching this regex (repeatable)
    #[arg(long, global = true)]
    pub exclude: Vec<String>,

    /// Wipe a non-empty output directory first
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Add to an existing output directory and its state
    #[arg(long, global = true)]
    pub append: bool,

    /// Also write import blocks for the exported resources
    #[arg(long, global = true)]
    pub generate_import_block: bool,

    /// Shell command run before each import; non-zero exit skips the resource
    #[arg(long, global = true)]
    pub pre_import_hook: Option<String>,

    /// Shell command run after each import attempt
    #[arg(long, global = true)]
    pub post_import_hook: Option<String>,

    /// Run against a built-in fixture without touching Azure or the disk
    #[arg(long, global = true)]
    pub simulate: bool,
}

impl ExportOptions {
    /// Layer the flags on top of the file configuration
    pub fn apply_to(self, config: &mut ExportConfig) -> Result<()> {
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(sub) = self.subscription_id {
            config.subscription_id = Some(sub);
        }
        if let Some(provider) = self.provider_name {
            config.provider_name = provider;
        }
        if let Some(executor) = self.executor {
            config.executor = executor;
        }
        if let Some(backend) = self.backend_type {
            config.backend_type = backend;
        }
        for pair in &self.backend_config {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| {
                    format!("Invalid --backend-config '{}', expected key=value", pair)
                })?;
            config
                .backend_config
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(pattern) = self.name_pattern {
            config.resource_name_pattern = Some(pattern);
        }
        config.exclude.extend(self.exclude);
        if let Some(hook) = self.pre_import_hook {
            config.hooks.pre_import = Some(hook);
        }
        if let Some(hook) = self.post_import_hook {
            config.hooks.post_import = Some(hook);
        }

        config.overwrite |= self.overwrite;
        config.append |= self.append;
        config.generate_import_block |= self.generate_import_block;
        config.simulate |= self.simulate;

        Ok(())
    }
}

/// Handles every export scope
pub struct ExportCommand;

impl ExportCommand {
    pub fn execute(
        ctx: &Context,
        options: ExportOptions,
        scope: ScopeCommand,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let mut config = ExportConfig::load(ctx.fs.as_ref(), options.config.as_deref())?;
        options.apply_to(&mut config)?;
        config.validate()?;

        let (scope, presets) = Self::resolve_scope(ctx, &config, scope)?;
        let meta_options = config.meta_options(scope, presets)?;

        let mut meta = Self::build_meta(ctx, &config, meta_options)?;
        Self::register_hooks(ctx, &config, meta.as_mut())?;

        let report = run_export(meta.as_mut(), cancel, ctx.output.as_ref())?;
        Ok(report)
    }

    /// Turn the subcommand into a scope plus any pinned addresses
    fn resolve_scope(
        ctx: &Context,
        config: &ExportConfig,
        scope: ScopeCommand,
    ) -> Result<(Scope, HashMap<String, TargetAddress>)> {
        match scope {
            ScopeCommand::ResourceGroup { name } => {
                Ok((Scope::ResourceGroup { name }, HashMap::new()))
            }
            ScopeCommand::Query { predicate } => Ok((Scope::Query { predicate }, HashMap::new())),
            ScopeCommand::Resource { ids, name } => {
                let mut presets = HashMap::new();

                if let Some(name) = name {
                    let [id] = ids.as_slice() else {
                        anyhow::bail!("--name requires exactly one resource id");
                    };
                    let mapper = AzureTypeMapper::new(config.provider()?);
                    let resource_type = mapper
                        .resolve(id)
                        .with_context(|| format!("No known resource type for {}", id))?;
                    presets.insert(id.clone(), TargetAddress::new(resource_type, name));
                }

                Ok((Scope::ResourceIds { ids }, presets))
            }
            ScopeCommand::MappingFile { path } => {
                let mapping = load_mapping(ctx.fs.as_ref(), &path)?;
                if mapping.is_empty() {
                    anyhow::bail!("Mapping file {} has no resources", path.display());
                }

                let ids = mapping.keys().cloned().collect();
                Ok((Scope::ResourceIds { ids }, mapping_presets(&mapping)))
            }
        }
    }

    /// Pick the orchestrator variant the configuration asks for
    pub fn build_meta(
        ctx: &Context,
        config: &ExportConfig,
        options: MetaOptions,
    ) -> Result<Box<dyn Meta>> {
        if config.simulate {
            return Ok(Box::new(SimulatedOrchestrator::new(
                options,
                ctx.output.clone(),
                config.subscription_id.clone(),
                DEFAULT_LATENCY,
            )));
        }

        let registry = DefaultExecutorRegistry::with_defaults(ctx.command.clone(), ctx.fs.clone());
        let executor = registry.get(&config.executor)?;

        let components = MetaComponents {
            discovery: Arc::new(AzCliDiscovery::new(
                ctx.command.clone(),
                config.subscription_id.clone(),
            )),
            mapper: Arc::new(AzureTypeMapper::new(config.provider()?)),
            executor,
            fs: ctx.fs.clone(),
            output: ctx.output.clone(),
        };

        Ok(Box::new(LiveOrchestrator::new(options, components)))
    }

    fn register_hooks(ctx: &Context, config: &ExportConfig, meta: &mut dyn Meta) -> Result<()> {
        let hooks = &config.hooks;
        if hooks.pre_import.is_none() && hooks.post_import.is_none() {
            return Ok(());
        }

        if config.simulate {
            ctx.output
                .warning("Import hooks are not run in simulated mode");
            return Ok(());
        }

        if let Some(template) = &hooks.pre_import {
            let hook = ShellHook::new(
                ctx.command.clone(),
                template.clone(),
                config.output_dir.clone(),
            );
            meta.set_pre_import_hook(Arc::new(hook))?;
        }
        if let Some(template) = &hooks.post_import {
            let hook = ShellHook::new(
                ctx.command.clone(),
                template.clone(),
                config.output_dir.clone(),
            );
            meta.set_post_import_hook(Arc::new(hook))?;
        }

        Ok(())
    }
}
