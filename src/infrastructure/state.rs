use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ExportError, ExportResult};
use super::item::TargetAddress;

/// One managed resource as recorded in workspace state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResource {
    pub address: String,
    pub resource_type: String,
    pub name: String,
    pub attributes: Map<String, Value>,
}

/// Structured view of the current workspace state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub resources: Vec<StateResource>,
}

impl StateSnapshot {
    pub fn find(&self, address: &TargetAddress) -> Option<&StateResource> {
        let wanted = address.to_string();
        self.resources.iter().find(|r| r.address == wanted)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse the output of `show -json`.
///
/// Only managed resources of the root module are returned. A workspace with
/// no state yet prints a document without `values`, which parses as empty.
pub fn parse_show_json(content: &str) -> ExportResult<StateSnapshot> {
    if content.trim().is_empty() {
        return Ok(StateSnapshot::default());
    }

    let document: Value = serde_json::from_str(content)
        .map_err(|e| ExportError::Serialization(format!("invalid state JSON: {}", e)))?;

    let Some(resources) = document
        .pointer("/values/root_module/resources")
        .and_then(|r| r.as_array())
    else {
        return Ok(StateSnapshot::default());
    };

    let mut snapshot = StateSnapshot::default();

    for resource in resources {
        let mode = resource.get("mode").and_then(|m| m.as_str()).unwrap_or("managed");
        if mode != "managed" {
            continue;
        }

        let resource_type = resource
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let name = resource
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();

        if resource_type.is_empty() || name.is_empty() {
            continue;
        }

        let address = resource
            .get("address")
            .and_then(|a| a.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{}", resource_type, name));

        let attributes = resource
            .get("values")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        snapshot.resources.push(StateResource {
            address,
            resource_type,
            name,
            attributes,
        });
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show_json() {
        let json = r#"{
            "format_version": "1.0",
            "values": {
                "root_module": {
                    "resources": [
                        {
                            "address": "azurerm_resource_group.rg",
                            "mode": "managed",
                            "type": "azurerm_resource_group",
                            "name": "rg",
                            "values": {"id": "/subscriptions/s/resourceGroups/rg", "location": "westeurope"}
                        },
                        {
                            "address": "data.azurerm_client_config.current",
                            "mode": "data",
                            "type": "azurerm_client_config",
                            "name": "current",
                            "values": {}
                        }
                    ]
                }
            }
        }"#;

        let snapshot = parse_show_json(json).unwrap();

        assert_eq!(snapshot.len(), 1);
        let rg = snapshot
            .find(&TargetAddress::new("azurerm_resource_group", "rg"))
            .unwrap();
        assert_eq!(rg.attributes["location"], "westeurope");
    }

    #[test]
    fn test_parse_empty_state() {
        assert!(parse_show_json(r#"{"format_version": "1.0"}"#).unwrap().is_empty());
        assert!(parse_show_json("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_show_json("not json"),
            Err(ExportError::Serialization(_))
        ));
    }
}
