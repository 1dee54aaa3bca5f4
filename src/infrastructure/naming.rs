//! Naming Resolver
//!
//! Assigns every mapped item a configuration address that is a valid
//! identifier and unique across the run. Resolution is deterministic: the same
//! ordered input always yields the same addresses.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::error::{ExportError, ExportResult};
use super::item::{id_leaf_name, ImportItem, ImportState, SkipReason, TargetAddress};

/// Pattern used when nothing else is configured
pub const DEFAULT_NAME_PATTERN: &str = "{name}";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([^{}]*)\}").expect("Invalid placeholder regex");
    static ref RESOURCE_TYPE: Regex =
        Regex::new(r"^[a-z][a-z0-9_]*$").expect("Invalid resource type regex");
    static ref RESOURCE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("Invalid resource name regex");
}

/// Naming configuration for one run
#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    /// Global pattern; `{name}` when unset
    pub pattern: Option<String>,
    /// Per target type patterns, overriding the global one
    pub type_patterns: BTreeMap<String, String>,
    /// Addresses pinned by the caller, keyed by source id
    pub presets: HashMap<String, TargetAddress>,
}

pub struct NamingResolver {
    default_pattern: String,
    type_patterns: BTreeMap<String, String>,
    presets: HashMap<String, TargetAddress>,
}

impl NamingResolver {
    /// Build a resolver, rejecting patterns with unknown placeholders
    pub fn new(options: NamingOptions) -> ExportResult<Self> {
        let default_pattern = options
            .pattern
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAME_PATTERN.to_string());

        validate_pattern(&default_pattern)?;
        for pattern in options.type_patterns.values() {
            validate_pattern(pattern)?;
        }

        let presets = options
            .presets
            .into_iter()
            .map(|(id, address)| (id.to_lowercase(), address))
            .collect();

        Ok(Self {
            default_pattern,
            type_patterns: options.type_patterns,
            presets,
        })
    }

    /// Assign addresses in discovery order.
    ///
    /// Pending items without a type are skipped as "unmapped type". Items
    /// already in a terminal state are left alone. Returns the number of named
    /// items.
    pub fn resolve(&self, items: &mut [ImportItem]) -> ExportResult<usize> {
        let mut claimed: HashSet<TargetAddress> = HashSet::new();
        let mut named = 0;

        // Presets first so generated names never steal a pinned address
        for item in items.iter_mut() {
            if item.state() != ImportState::Pending {
                continue;
            }

            let Some(preset) = self.presets.get(&item.source_id().to_lowercase()) else {
                continue;
            };

            validate_address(preset)?;
            if !claimed.insert(preset.clone()) {
                return Err(ExportError::Naming(format!(
                    "address '{}' is pinned for more than one resource",
                    preset
                )));
            }

            item.set_target_type(preset.resource_type.clone());
            item.set_address(preset.clone());
            named += 1;
        }

        for item in items.iter_mut() {
            if item.state() != ImportState::Pending || item.target_address().is_some() {
                continue;
            }

            let Some(target_type) = item.target_type().map(str::to_string) else {
                item.mark_skipped(SkipReason::UnmappedType)?;
                continue;
            };

            if !RESOURCE_TYPE.is_match(&target_type) {
                return Err(ExportError::Naming(format!(
                    "'{}' is not a valid resource type for {}",
                    target_type,
                    item.source_id()
                )));
            }

            let base = sanitize_name(&self.render(&target_type, item.source_id()));
            let address = next_free(&claimed, &target_type, &base);

            claimed.insert(address.clone());
            item.set_address(address);
            named += 1;
        }

        Ok(named)
    }

    fn render(&self, target_type: &str, source_id: &str) -> String {
        let pattern = self
            .type_patterns
            .get(target_type)
            .unwrap_or(&self.default_pattern);

        let short_type = target_type
            .split_once('_')
            .map(|(_, rest)| rest)
            .unwrap_or(target_type);

        pattern
            .replace("{name}", id_leaf_name(source_id))
            .replace("{type}", short_type)
    }
}

/// First unclaimed address: `base`, then `base-1`, `base-2`, ...
fn next_free(claimed: &HashSet<TargetAddress>, target_type: &str, base: &str) -> TargetAddress {
    let candidate = TargetAddress::new(target_type, base);
    if !claimed.contains(&candidate) {
        return candidate;
    }

    let mut suffix = 1usize;
    loop {
        let candidate = TargetAddress::new(target_type, format!("{}-{}", base, suffix));
        if !claimed.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn validate_pattern(pattern: &str) -> ExportResult<()> {
    for capture in PLACEHOLDER.captures_iter(pattern) {
        let placeholder = &capture[1];
        if placeholder != "name" && placeholder != "type" {
            return Err(ExportError::Naming(format!(
                "unknown placeholder '{{{}}}' in name pattern '{}'",
                placeholder, pattern
            )));
        }
    }
    Ok(())
}

fn validate_address(address: &TargetAddress) -> ExportResult<()> {
    if !RESOURCE_TYPE.is_match(&address.resource_type) || !is_valid_name(&address.name) {
        return Err(ExportError::Naming(format!(
            "'{}' is not a valid resource address",
            address
        )));
    }
    Ok(())
}

/// Whether `name` is usable as a resource name as-is
pub fn is_valid_name(name: &str) -> bool {
    RESOURCE_NAME.is_match(name)
}

/// Turn arbitrary text into a valid resource name
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_matches(|c| c == '_' || c == '-').to_string();

    match sanitized.chars().next() {
        None => "resource".to_string(),
        Some(first) if first.is_ascii_digit() => format!("r_{}", sanitized),
        Some(_) => sanitized,
    }
}
