//! Resource Item
//!
//! One discovered real-world resource and its import outcome. The lifecycle is
//! forward-only: `Pending -> Importing -> {Imported | Failed | Skipped}`, with
//! `Pending -> Skipped` allowed for items that never reach the importer. An
//! `Imported` item whose state entry is later dropped becomes `Failed`; that is
//! the only way out of a terminal state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::{ExportError, ExportResult, ItemError};

/// Import lifecycle of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Pending,
    Importing,
    Imported,
    Skipped,
    Failed,
}

impl ImportState {
    /// Whether the item has reached its final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportState::Imported | ImportState::Skipped | ImportState::Failed
        )
    }

    fn can_move_to(&self, next: ImportState) -> bool {
        matches!(
            (self, next),
            (ImportState::Pending, ImportState::Importing)
                | (ImportState::Pending, ImportState::Skipped)
                | (ImportState::Importing, ImportState::Imported)
                | (ImportState::Importing, ImportState::Failed)
                | (ImportState::Importing, ImportState::Skipped)
        )
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportState::Pending => "pending",
            ImportState::Importing => "importing",
            ImportState::Imported => "imported",
            ImportState::Skipped => "skipped",
            ImportState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Why an item was left out of the import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No configuration resource type is known for the source id
    UnmappedType,
    /// The source id matched an exclusion pattern
    Excluded(String),
    /// A pre-import hook vetoed the item
    Vetoed(String),
    /// The run was cancelled before a worker picked the item up
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnmappedType => write!(f, "unmapped type"),
            SkipReason::Excluded(pattern) => {
                write!(f, "excluded by filter ({})", pattern)
            }
            SkipReason::Vetoed(reason) => write!(f, "{}", reason),
            SkipReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// A configuration resource address: `<type>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetAddress {
    pub resource_type: String,
    pub name: String,
}

impl TargetAddress {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Parse `type.name`
    pub fn parse(address: &str) -> Option<Self> {
        let (resource_type, name) = address.split_once('.')?;
        if resource_type.is_empty() || name.is_empty() || name.contains('.') {
            return None;
        }
        Some(Self::new(resource_type, name))
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// One candidate resource and its import outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportItem {
    source_id: String,
    target_type: Option<String>,
    target_address: Option<TargetAddress>,
    state: ImportState,
    error: Option<ItemError>,
    skip_reason: Option<SkipReason>,
    already_imported: bool,
    annotations: BTreeMap<String, String>,
}

impl ImportItem {
    pub fn new(source_id: impl Into<String>, target_type: Option<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_type: target_type.filter(|t| !t.is_empty()),
            target_address: None,
            state: ImportState::Pending,
            error: None,
            skip_reason: None,
            already_imported: false,
            annotations: BTreeMap::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn target_type(&self) -> Option<&str> {
        self.target_type.as_deref()
    }

    pub fn target_address(&self) -> Option<&TargetAddress> {
        self.target_address.as_ref()
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.error.as_ref()
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        self.skip_reason.as_ref()
    }

    pub fn already_imported(&self) -> bool {
        self.already_imported
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Rename the item within its current resource type.
    ///
    /// Only meaningful for hooks; the importer validates the new address
    /// against every other claimed address before importing.
    pub fn rename(&mut self, name: impl Into<String>) {
        if let Some(address) = self.target_address.as_mut() {
            address.name = name.into();
        }
    }

    /// Attach a free-form note that travels with the item into the reports
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    /// Human-readable outcome for reports
    pub fn reason(&self) -> Option<String> {
        match self.state {
            ImportState::Skipped => self.skip_reason.as_ref().map(|r| r.to_string()),
            ImportState::Failed => self.error.as_ref().map(|e| e.to_string()),
            _ => None,
        }
    }

    pub(crate) fn set_target_type(&mut self, target_type: String) {
        self.target_type = Some(target_type);
    }

    pub(crate) fn set_address(&mut self, address: TargetAddress) {
        self.target_address = Some(address);
    }

    pub(crate) fn begin_import(&mut self) -> ExportResult<()> {
        self.transition(ImportState::Importing)
    }

    pub(crate) fn mark_imported(&mut self, already_imported: bool) -> ExportResult<()> {
        self.transition(ImportState::Imported)?;
        self.already_imported = already_imported;
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, error: ItemError) -> ExportResult<()> {
        self.transition(ImportState::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    pub(crate) fn mark_skipped(&mut self, reason: SkipReason) -> ExportResult<()> {
        self.transition(ImportState::Skipped)?;
        self.skip_reason = Some(reason);
        Ok(())
    }

    /// Record that the item's state entry is gone after a successful import
    pub(crate) fn mark_state_lost(&mut self, reason: impl Into<String>) -> ExportResult<()> {
        if self.state != ImportState::Imported {
            return Err(ExportError::InvalidTransition {
                source_id: self.source_id.clone(),
                from: self.state,
                to: ImportState::Failed,
            });
        }
        self.state = ImportState::Failed;
        self.already_imported = false;
        self.error = Some(ItemError::StateLost {
            reason: reason.into(),
        });
        Ok(())
    }

    fn transition(&mut self, next: ImportState) -> ExportResult<()> {
        if !self.state.can_move_to(next) {
            return Err(ExportError::InvalidTransition {
                source_id: self.source_id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Last path segment of a resource id, used as the default resource name
pub fn id_leaf_name(source_id: &str) -> &str {
    source_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source_id)
}
