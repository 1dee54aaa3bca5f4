use std::sync::Arc;
use std::time::Duration;

use super::artifacts::GeneratedConfig;
use super::error::ExportResult;
use super::meta::{Meta, MetaBase, MetaComponents, MetaOptions};
use super::providers::FixtureDiscovery;
use super::resource_mapper::AzureTypeMapper;
use crate::executor::MemoryExecutor;
use crate::traits::{MemoryFileSystem, Output};

/// Artificial duration of each simulated import
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(300);

/// Orchestrator over a fixed fixture.
///
/// Imports go to an in-memory executor and every file to an in-memory
/// filesystem, so a run touches neither the cloud nor the disk.
pub struct SimulatedOrchestrator {
    base: MetaBase,
}

impl SimulatedOrchestrator {
    pub fn new(
        options: MetaOptions,
        output: Arc<dyn Output>,
        subscription_id: Option<String>,
        latency: Duration,
    ) -> Self {
        let mapper = Arc::new(AzureTypeMapper::new(options.workspace.provider));

        let components = MetaComponents {
            discovery: Arc::new(FixtureDiscovery::new(subscription_id)),
            mapper,
            executor: Arc::new(MemoryExecutor::with_latency(latency)),
            fs: Arc::new(MemoryFileSystem::new()),
            output,
        };

        Self {
            base: MetaBase::new(options, components),
        }
    }
}

impl Meta for SimulatedOrchestrator {
    fn base(&self) -> &MetaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetaBase {
        &mut self.base
    }

    fn variant(&self) -> &'static str {
        "simulated"
    }

    fn init(&mut self) -> ExportResult<()> {
        self.base
            .output()
            .info("Simulated run: resources come from a fixture and nothing is written to disk");
        self.base.init()
    }

    /// Print the configuration, since the file only exists in memory
    fn generate_cfg(&mut self) -> ExportResult<GeneratedConfig> {
        let config = self.base.generate_cfg()?;

        let output = self.base.output().clone();
        output.section(&format!("{} (simulated)", config.path.display()));
        for line in config.content.lines() {
            output.dimmed(line);
        }
        output.blank();

        Ok(config)
    }
}
