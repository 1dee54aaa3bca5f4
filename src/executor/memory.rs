use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::executor::Executor;
use crate::infrastructure::error::{ExportError, ExportResult};
use crate::infrastructure::item::{id_leaf_name, TargetAddress};
use crate::infrastructure::state::{StateResource, StateSnapshot};

/// Executor that keeps state in memory.
///
/// Drives the simulated orchestrator and the tests. It also records how many
/// imports ran and the highest number that overlapped.
pub struct MemoryExecutor {
    states: Mutex<HashMap<PathBuf, BTreeMap<String, StateResource>>>,
    initialized: Mutex<HashSet<PathBuf>>,
    failures: Mutex<HashMap<String, String>>,
    latency: Duration,
    import_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every import sleeps for `latency` while it is in flight
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            initialized: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            latency,
            import_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make imports of `source_id` fail with `message`
    pub fn fail_import(&self, source_id: &str, message: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source_id.to_string(), message.to_string());
    }

    /// Put a resource into a directory's state as if it had been imported before
    pub fn seed(&self, working_dir: &Path, address: &TargetAddress, source_id: &str) {
        let resource = synthesize(address, source_id);
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(working_dir.to_path_buf())
            .or_default()
            .insert(resource.address.clone(), resource);
    }

    pub fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_imports(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self, working_dir: &Path) -> bool {
        self.initialized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(working_dir)
    }

    fn do_import(
        &self,
        working_dir: &Path,
        address: &TargetAddress,
        source_id: &str,
    ) -> ExportResult<()> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if let Some(message) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
        {
            return Err(ExportError::ExecutorFailed {
                command: "import".to_string(),
                message: message.clone(),
                exit_code: Some(1),
            });
        }

        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(working_dir.to_path_buf()).or_default();
        let key = address.to_string();

        if state.contains_key(&key) {
            return Err(ExportError::ExecutorFailed {
                command: "import".to_string(),
                message: format!("Resource already managed by Terraform: {}", key),
                exit_code: Some(1),
            });
        }

        state.insert(key, synthesize(address, source_id));
        Ok(())
    }
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal attribute set for a resource imported in memory
fn synthesize(address: &TargetAddress, source_id: &str) -> StateResource {
    let mut attributes = Map::new();
    attributes.insert("id".to_string(), Value::String(source_id.to_string()));
    attributes.insert(
        "name".to_string(),
        Value::String(id_leaf_name(source_id).to_string()),
    );
    attributes.insert("location".to_string(), Value::String("westeurope".to_string()));

    StateResource {
        address: address.to_string(),
        resource_type: address.resource_type.clone(),
        name: address.name.clone(),
        attributes,
    }
}

impl Executor for MemoryExecutor {
    fn check_installed(&self) -> Result<bool> {
        Ok(true)
    }

    fn init(&self, working_dir: &Path) -> ExportResult<()> {
        self.initialized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(working_dir.to_path_buf());
        Ok(())
    }

    fn import(
        &self,
        working_dir: &Path,
        address: &TargetAddress,
        source_id: &str,
    ) -> ExportResult<()> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = self.do_import(working_dir, address, source_id);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn show(&self, working_dir: &Path) -> ExportResult<StateSnapshot> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let resources = states
            .get(working_dir)
            .map(|state| state.values().cloned().collect())
            .unwrap_or_default();

        Ok(StateSnapshot { resources })
    }

    fn state_rm(&self, working_dir: &Path, address: &TargetAddress) -> ExportResult<()> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let removed = states
            .get_mut(working_dir)
            .and_then(|state| state.remove(&address.to_string()));

        match removed {
            Some(_) => Ok(()),
            None => Err(ExportError::ExecutorFailed {
                command: "state rm".to_string(),
                message: format!("Invalid target address: {} is not in state", address),
                exit_code: Some(1),
            }),
        }
    }

    fn state_push(&self, working_dir: &Path, state_file: &Path) -> ExportResult<()> {
        // The pushed "file" is the state of the directory that holds it
        let source_dir = state_file.parent().unwrap_or(state_file).to_path_buf();

        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let pushed = states.get(&source_dir).cloned().unwrap_or_default();
        states.insert(working_dir.to_path_buf(), pushed);

        Ok(())
    }

    fn get_name(&self) -> &str {
        "memory"
    }
}
