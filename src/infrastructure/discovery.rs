use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::error::{ExportError, ExportResult};
use super::item::{ImportItem, ImportState, SkipReason};
use crate::traits::Output;

/// Boundary of discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// Every resource in a resource group, plus the group itself
    ResourceGroup { name: String },
    /// A Resource Graph where-clause
    Query { predicate: String },
    /// An explicit list of resource ids
    ResourceIds { ids: Vec<String> },
}

impl Scope {
    /// Short name of the scope, used in logs and the run report
    pub fn name(&self) -> String {
        match self {
            Scope::ResourceGroup { name } => name.clone(),
            Scope::Query { predicate } => predicate.clone(),
            Scope::ResourceIds { ids } => match ids.as_slice() {
                [single] => single.clone(),
                _ => format!("{} resources", ids.len()),
            },
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::ResourceGroup { name } => write!(f, "resource group '{}'", name),
            Scope::Query { predicate } => write!(f, "query '{}'", predicate),
            Scope::ResourceIds { ids } => write!(f, "{} explicit resource id(s)", ids.len()),
        }
    }
}

/// Discovery capability: returns raw resource ids for a scope
pub trait ResourceDiscovery: Send + Sync {
    fn list(&self, scope: &Scope) -> anyhow::Result<Vec<String>>;
}

/// Type-mapping lookup: source id to configuration resource type
pub trait TypeMapper: Send + Sync {
    fn resolve(&self, source_id: &str) -> Option<String>;
}

/// Wraps a discovery capability into a deduplicated, ordered item list
pub struct ResourceLister {
    discovery: Arc<dyn ResourceDiscovery>,
    mapper: Arc<dyn TypeMapper>,
    output: Arc<dyn Output>,
}

impl ResourceLister {
    pub fn new(
        discovery: Arc<dyn ResourceDiscovery>,
        mapper: Arc<dyn TypeMapper>,
        output: Arc<dyn Output>,
    ) -> Self {
        Self {
            discovery,
            mapper,
            output,
        }
    }

    /// List the scope. Fails without a partial list if discovery fails.
    pub fn list(&self, scope: &Scope) -> ExportResult<Vec<ImportItem>> {
        let ids = self
            .discovery
            .list(scope)
            .map_err(|e| ExportError::Discovery(format!("{:#}", e)))?;

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(ids.len());

        for raw in ids {
            let id = raw.trim();
            if id.is_empty() {
                continue;
            }

            // ARM ids are case-insensitive; the first spelling wins
            if !seen.insert(id.to_lowercase()) {
                self.output
                    .debug(&format!("Dropping duplicate resource id: {}", id));
                continue;
            }

            let target_type = self.mapper.resolve(id);
            if target_type.is_none() {
                self.output
                    .debug(&format!("No type mapping for resource: {}", id));
            }

            items.push(ImportItem::new(id, target_type));
        }

        self.output
            .info(&format!("Discovered {} resource(s) in {}", items.len(), scope));

        Ok(items)
    }
}

/// Mark pending items whose id matches an exclusion pattern as skipped.
///
/// Returns the number of excluded items.
pub fn apply_exclusions(items: &mut [ImportItem], patterns: &[Regex]) -> ExportResult<usize> {
    let mut excluded = 0;

    for item in items.iter_mut() {
        if item.state() != ImportState::Pending {
            continue;
        }

        let matched = patterns
            .iter()
            .find(|pattern| pattern.is_match(item.source_id()))
            .map(|pattern| pattern.as_str().to_string());

        if let Some(pattern) = matched {
            item.mark_skipped(SkipReason::Excluded(pattern))?;
            excluded += 1;
        }
    }

    Ok(excluded)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// Discovery double returning a fixed id list, or an error
    pub struct StaticDiscovery {
        pub ids: Vec<String>,
        pub error: Option<String>,
    }

    impl StaticDiscovery {
        pub fn new(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                error: None,
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                ids: Vec::new(),
                error: Some(message.to_string()),
            }
        }
    }

    impl ResourceDiscovery for StaticDiscovery {
        fn list(&self, _scope: &Scope) -> anyhow::Result<Vec<String>> {
            match &self.error {
                Some(message) => anyhow::bail!("{}", message),
                None => Ok(self.ids.clone()),
            }
        }
    }

    /// Type mapper double backed by an exact-match table
    pub struct TableMapper(pub HashMap<String, String>);

    impl TableMapper {
        pub fn new(entries: &[(&str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(id, ty)| (id.to_string(), ty.to_string()))
                    .collect(),
            )
        }
    }

    impl TypeMapper for TableMapper {
        fn resolve(&self, source_id: &str) -> Option<String> {
            self.0.get(source_id).cloned()
        }
    }
}
