//! Resource Type Mapper
//!
//! Maps Azure resource ids (ARM format) to Terraform/OpenTofu resource types
//! (format: `provider_resource_type`).

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::discovery::TypeMapper;

/// Target provider the generated configuration is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetProvider {
    #[default]
    Azurerm,
    Azapi,
}

/// Information about a Terraform provider for generating required_providers blocks
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    /// Provider source (e.g., "hashicorp/azurerm")
    pub source: &'static str,
    /// Default version constraint (e.g., "~> 4.0")
    pub default_version: &'static str,
    /// Terraform provider name for the provider block
    pub tf_name: &'static str,
    /// Whether the provider block needs an empty `features {}` block
    pub needs_features_block: bool,
}

impl TargetProvider {
    /// Parse provider from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "azurerm" => Some(TargetProvider::Azurerm),
            "azapi" => Some(TargetProvider::Azapi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetProvider::Azurerm => "azurerm",
            TargetProvider::Azapi => "azapi",
        }
    }

    /// Get provider info for generating required_providers block
    pub fn info(&self) -> ProviderInfo {
        match self {
            TargetProvider::Azurerm => ProviderInfo {
                source: "hashicorp/azurerm",
                default_version: "~> 4.0",
                tf_name: "azurerm",
                needs_features_block: true,
            },
            TargetProvider::Azapi => ProviderInfo {
                source: "azure/azapi",
                default_version: "~> 2.0",
                tf_name: "azapi",
                needs_features_block: false,
            },
        }
    }
}

impl fmt::Display for TargetProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const RESOURCE_GROUP_TYPE: &str = "microsoft.resources/resourcegroups";

lazy_static! {
    static ref RESOURCE_GROUP_ID: Regex =
        Regex::new(r"(?i)^/subscriptions/[^/]+/resourcegroups/[^/]+/?$")
            .expect("Invalid resource group id regex");
    static ref RESOURCE_TYPE_MAP: HashMap<&'static str, &'static str> = build_resource_type_map();
}

/// Derive the lowercase ARM resource type from a resource id.
///
/// `/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/v/subnets/s`
/// yields `microsoft.network/virtualnetworks/subnets`. Nested providers use the
/// last `providers` segment.
pub fn arm_resource_type(resource_id: &str) -> Option<String> {
    if RESOURCE_GROUP_ID.is_match(resource_id) {
        return Some(RESOURCE_GROUP_TYPE.to_string());
    }

    let segments: Vec<&str> = resource_id
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let providers_idx = segments
        .iter()
        .rposition(|s| s.eq_ignore_ascii_case("providers"))?;

    let namespace = segments.get(providers_idx + 1)?;
    let rest = &segments[(providers_idx + 2).min(segments.len())..];

    // Type/name pairs after the namespace
    if rest.is_empty() || rest.len() % 2 != 0 {
        return None;
    }

    let mut arm_type = namespace.to_lowercase();
    for pair in rest.chunks(2) {
        arm_type.push('/');
        arm_type.push_str(&pair[0].to_lowercase());
    }

    Some(arm_type)
}

/// Map a lowercase ARM resource type to an azurerm resource type
pub fn map_resource_type(arm_type: &str) -> Option<&'static str> {
    RESOURCE_TYPE_MAP.get(arm_type.to_lowercase().as_str()).copied()
}

/// Build the resource type mapping
fn build_resource_type_map() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();

    // Resources
    m.insert(RESOURCE_GROUP_TYPE, "azurerm_resource_group");

    // Network
    m.insert("microsoft.network/virtualnetworks", "azurerm_virtual_network");
    m.insert("microsoft.network/virtualnetworks/subnets", "azurerm_subnet");
    m.insert("microsoft.network/networkinterfaces", "azurerm_network_interface");
    m.insert("microsoft.network/networksecuritygroups", "azurerm_network_security_group");
    m.insert("microsoft.network/publicipaddresses", "azurerm_public_ip");
    m.insert("microsoft.network/loadbalancers", "azurerm_lb");
    m.insert("microsoft.network/routetables", "azurerm_route_table");
    m.insert("microsoft.network/dnszones", "azurerm_dns_zone");
    m.insert("microsoft.network/privatednszones", "azurerm_private_dns_zone");
    m.insert("microsoft.network/applicationgateways", "azurerm_application_gateway");

    // Compute
    m.insert("microsoft.compute/virtualmachines", "azurerm_linux_virtual_machine");
    m.insert("microsoft.compute/disks", "azurerm_managed_disk");
    m.insert("microsoft.compute/availabilitysets", "azurerm_availability_set");

    // Storage
    m.insert("microsoft.storage/storageaccounts", "azurerm_storage_account");
    m.insert("microsoft.storage/storageaccounts/fileservices/shares", "azurerm_storage_share");

    // Key Vault
    m.insert("microsoft.keyvault/vaults", "azurerm_key_vault");

    // App Service
    m.insert("microsoft.web/serverfarms", "azurerm_service_plan");
    m.insert("microsoft.web/sites", "azurerm_linux_web_app");
    m.insert("microsoft.web/sites/slots", "azurerm_linux_web_app_slot");
    m.insert("microsoft.signalrservice/signalr", "azurerm_signalr_service");

    // Monitoring
    m.insert("microsoft.insights/components", "azurerm_application_insights");
    m.insert("microsoft.insights/webtests", "azurerm_application_insights_web_test");
    m.insert("microsoft.operationalinsights/workspaces", "azurerm_log_analytics_workspace");

    // Containers
    m.insert("microsoft.containerservice/managedclusters", "azurerm_kubernetes_cluster");
    m.insert("microsoft.containerregistry/registries", "azurerm_container_registry");

    // Databases
    m.insert("microsoft.sql/servers", "azurerm_mssql_server");
    m.insert("microsoft.sql/servers/databases", "azurerm_mssql_database");
    m.insert("microsoft.dbforpostgresql/flexibleservers", "azurerm_postgresql_flexible_server");
    m.insert("microsoft.cache/redis", "azurerm_redis_cache");

    // Identity and messaging
    m.insert("microsoft.managedidentity/userassignedidentities", "azurerm_user_assigned_identity");
    m.insert("microsoft.servicebus/namespaces", "azurerm_servicebus_namespace");
    m.insert("microsoft.eventhub/namespaces", "azurerm_eventhub_namespace");

    m
}

/// Type-mapping lookup for a target provider
pub struct AzureTypeMapper {
    provider: TargetProvider,
}

impl AzureTypeMapper {
    pub fn new(provider: TargetProvider) -> Self {
        Self { provider }
    }
}

impl TypeMapper for AzureTypeMapper {
    fn resolve(&self, source_id: &str) -> Option<String> {
        let arm_type = arm_resource_type(source_id)?;

        match self.provider {
            // azapi addresses every ARM resource through one generic type
            TargetProvider::Azapi => Some("azapi_resource".to_string()),
            TargetProvider::Azurerm => map_resource_type(&arm_type).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RG: &str = "/subscriptions/0000/resourceGroups/example-rg";

    #[test]
    fn test_arm_resource_type() {
        assert_eq!(arm_resource_type(RG).unwrap(), RESOURCE_GROUP_TYPE);
        assert_eq!(
            arm_resource_type(&format!(
                "{}/providers/Microsoft.Network/virtualNetworks/vnet/subnets/internal",
                RG
            ))
            .unwrap(),
            "microsoft.network/virtualnetworks/subnets"
        );
        assert!(arm_resource_type("not-an-id").is_none());
        assert!(arm_resource_type(&format!("{}/providers/Microsoft.Network", RG)).is_none());
    }

    #[test]
    fn test_nested_provider_uses_last_segment() {
        let id = format!(
            "{}/providers/Microsoft.Compute/virtualMachines/vm/providers/Microsoft.Insights/components/ai",
            RG
        );
        assert_eq!(arm_resource_type(&id).unwrap(), "microsoft.insights/components");
    }

    #[test]
    fn test_azurerm_mapping_is_case_insensitive() {
        let mapper = AzureTypeMapper::new(TargetProvider::Azurerm);
        let id = format!("{}/providers/MICROSOFT.COMPUTE/virtualMachines/vm", RG);
        assert_eq!(
            mapper.resolve(&id).as_deref(),
            Some("azurerm_linux_virtual_machine")
        );
        assert_eq!(mapper.resolve(RG).as_deref(), Some("azurerm_resource_group"));
    }

    #[test]
    fn test_unsupported_type() {
        let mapper = AzureTypeMapper::new(TargetProvider::Azurerm);
        let id = format!("{}/providers/Microsoft.Unknown/widgets/w", RG);
        assert!(mapper.resolve(&id).is_none());
    }

    #[test]
    fn test_azapi_maps_everything() {
        let mapper = AzureTypeMapper::new(TargetProvider::Azapi);
        let id = format!("{}/providers/Microsoft.Unknown/widgets/w", RG);
        assert_eq!(mapper.resolve(&id).as_deref(), Some("azapi_resource"));
        assert!(mapper.resolve("garbage").is_none());
    }

    #[test]
    fn test_provider_info() {
        let azurerm = TargetProvider::Azurerm.info();
        assert_eq!(azurerm.source, "hashicorp/azurerm");
        assert!(azurerm.needs_features_block);
        assert_eq!(TargetProvider::from_name("AzAPI"), Some(TargetProvider::Azapi));
        assert!(TargetProvider::from_name("aws").is_none());
    }
}
