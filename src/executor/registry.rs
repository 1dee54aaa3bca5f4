use super::{CliExecutor, Executor};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::{CommandExecutor, FileSystem};

/// Trait for executor registry that manages available executors
pub trait ExecutorRegistry: Send + Sync {
    /// Register an executor with the given name
    fn register(&mut self, name: String, executor: Box<dyn Executor>);

    /// Get an executor by name
    fn get(&self, name: &str) -> Result<Arc<dyn Executor>>;

    /// Check if an executor is registered
    fn has(&self, name: &str) -> bool;

    /// List all registered executor names, sorted
    fn list(&self) -> Vec<String>;
}

/// Default implementation of executor registry using a HashMap
pub struct DefaultExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

impl DefaultExecutorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the CLI-backed executors (terraform, opentofu)
    pub fn with_defaults(command: Arc<dyn CommandExecutor>, fs: Arc<dyn FileSystem>) -> Self {
        let mut registry = Self::new();
        registry.register(
            "terraform".to_string(),
            Box::new(CliExecutor::terraform(command.clone(), fs.clone())),
        );
        registry.register(
            "opentofu".to_string(),
            Box::new(CliExecutor::opentofu(command, fs)),
        );
        registry
    }
}

impl Default for DefaultExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistry for DefaultExecutorRegistry {
    fn register(&mut self, name: String, executor: Box<dyn Executor>) {
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        executors.insert(name, Arc::from(executor));
    }

    fn get(&self, name: &str) -> Result<Arc<dyn Executor>> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.get(name).cloned().with_context(|| {
            let mut known: Vec<&str> = executors.keys().map(String::as_str).collect();
            known.sort_unstable();
            format!("Unknown executor '{}' (available: {})", name, known.join(", "))
        })
    }

    fn has(&self, name: &str) -> bool {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.contains_key(name)
    }

    fn list(&self) -> Vec<String> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = executors.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MemoryExecutor;
    use crate::traits::{MemoryFileSystem, MockCommandExecutor};

    #[test]
    fn test_register_and_get_executor() {
        let mut registry = DefaultExecutorRegistry::new();
        registry.register("memory".to_string(), Box::new(MemoryExecutor::new()));

        let executor = registry.get("memory").unwrap();
        assert_eq!(executor.get_name(), "memory");
    }

    #[test]
    fn test_unknown_executor_names_the_alternatives() {
        let registry = DefaultExecutorRegistry::with_defaults(
            Arc::new(MockCommandExecutor::new()),
            Arc::new(MemoryFileSystem::new()),
        );

        let err = registry.get("pulumi").err().unwrap().to_string();
        assert_eq!(err, "Unknown executor 'pulumi' (available: opentofu, terraform)");
    }

    #[test]
    fn test_with_defaults_includes_cli_executors() {
        let registry = DefaultExecutorRegistry::with_defaults(
            Arc::new(MockCommandExecutor::new()),
            Arc::new(MemoryFileSystem::new()),
        );

        assert_eq!(registry.list(), vec!["opentofu", "terraform"]);
        assert_eq!(registry.get("opentofu").unwrap().get_name(), "opentofu");
        assert!(registry.has("terraform"));
    }
}
