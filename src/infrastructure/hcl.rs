//! Renders state attributes as HCL configuration text.
//!
//! Output is deterministic: attributes are sorted, `null` and empty values are
//! dropped, and lists of objects become repeated nested blocks.

use serde_json::{Map, Value};

use super::item::TargetAddress;
use super::state::StateResource;

/// Computed attributes that must not be written back into configuration
const SKIPPED_TOP_LEVEL: &[&str] = &["id", "timeouts"];

const INDENT: &str = "  ";

/// Render one `resource` block
pub fn render_resource(resource: &StateResource) -> String {
    let mut out = format!(
        "resource \"{}\" \"{}\" {{\n",
        resource.resource_type, resource.name
    );
    write_body(&mut out, &resource.attributes, 1, true);
    out.push_str("}\n");
    out
}

/// Render an `import` block for one resource
pub fn render_import_block(address: &TargetAddress, source_id: &str) -> String {
    format!(
        "import {{\n{indent}id = {}\n{indent}to = {}\n}}\n",
        quote(source_id),
        address,
        indent = INDENT
    )
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn is_block_list(value: &Value) -> bool {
    matches!(value, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object))
}

fn write_body(out: &mut String, attributes: &Map<String, Value>, depth: usize, top_level: bool) {
    let mut keys: Vec<&String> = attributes
        .iter()
        .filter(|(key, value)| {
            !is_empty(value) && !(top_level && SKIPPED_TOP_LEVEL.contains(&key.as_str()))
        })
        .map(|(key, _)| key)
        .collect();
    keys.sort();

    let (blocks, plain): (Vec<&String>, Vec<&String>) =
        keys.into_iter().partition(|key| is_block_list(&attributes[*key]));

    let pad = INDENT.repeat(depth);
    let width = plain.iter().map(|key| key.len()).max().unwrap_or(0);

    for key in plain {
        out.push_str(&format!(
            "{}{:width$} = {}\n",
            pad,
            key,
            render_expr(&attributes[key], depth),
            width = width
        ));
    }

    for key in blocks {
        if let Value::Array(entries) = &attributes[key] {
            for entry in entries {
                if let Value::Object(body) = entry {
                    out.push_str(&format!("{}{} {{\n", pad, key));
                    write_body(out, body, depth + 1, false);
                    out.push_str(&format!("{}}}\n", pad));
                }
            }
        }
    }
}

fn render_expr(value: &Value, depth: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            if items.iter().all(|v| !v.is_object() && !v.is_array()) {
                let rendered: Vec<String> = items.iter().map(|v| render_expr(v, depth)).collect();
                return format!("[{}]", rendered.join(", "));
            }

            let inner = INDENT.repeat(depth + 1);
            let mut out = String::from("[\n");
            for item in items {
                out.push_str(&format!("{}{},\n", inner, render_expr(item, depth + 1)));
            }
            out.push_str(&format!("{}]", INDENT.repeat(depth)));
            out
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let inner = INDENT.repeat(depth + 1);
            let width = keys.iter().map(|k| map_key(k).len()).max().unwrap_or(0);
            let mut out = String::from("{\n");
            for key in keys {
                out.push_str(&format!(
                    "{}{:width$} = {}\n",
                    inner,
                    map_key(key),
                    render_expr(&map[key], depth + 1),
                    width = width
                ));
            }
            out.push_str(&format!("{}}}", INDENT.repeat(depth)));
            out
        }
    }
}

fn map_key(key: &str) -> String {
    let bare = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if bare { key.to_string() } else { quote(key) }
}

/// Quote a string literal, escaping interpolation sequences
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');

    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            other => out.push(other),
        }
    }

    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(values: Value) -> StateResource {
        StateResource {
            address: "azurerm_virtual_network.vnet".to_string(),
            resource_type: "azurerm_virtual_network".to_string(),
            name: "vnet".to_string(),
            attributes: values.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_render_resource_sorts_and_skips() {
        let rendered = render_resource(&resource(json!({
            "name": "vnet",
            "id": "/subscriptions/s/x",
            "address_space": ["10.0.0.0/16"],
            "dns_servers": [],
            "bgp_community": null,
            "location": "westeurope",
            "tags": {"env": "prod", "cost center": "42"},
            "subnet": [{"name": "internal", "address_prefixes": ["10.0.2.0/24"]}]
        })));

        let expected = r#"resource "azurerm_virtual_network" "vnet" {
  address_space = ["10.0.0.0/16"]
  location      = "westeurope"
  name          = "vnet"
  tags          = {
    "cost center" = "42"
    env           = "prod"
  }
  subnet {
    address_prefixes = ["10.0.2.0/24"]
    name             = "internal"
  }
}
"#;
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_nested_id_is_kept() {
        let rendered = render_resource(&resource(json!({
            "ip_configuration": [{"id": "inner", "primary": true}]
        })));
        assert!(rendered.contains("    id      = \"inner\""));
        assert!(rendered.contains("    primary = true"));
    }

    #[test]
    fn test_quote_escapes_interpolation() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("${var.x}"), "\"$${var.x}\"");
        assert_eq!(quote("%{if}"), "\"%%{if}\"");
        assert_eq!(quote("cost: $5"), "\"cost: $5\"");
        assert_eq!(quote("line\nbreak"), "\"line\\nbreak\"");
    }

    #[test]
    fn test_render_import_block() {
        let block = render_import_block(
            &TargetAddress::new("azurerm_resource_group", "rg"),
            "/subscriptions/s/resourceGroups/rg",
        );
        assert_eq!(
            block,
            "import {\n  id = \"/subscriptions/s/resourceGroups/rg\"\n  to = azurerm_resource_group.rg\n}\n"
        );
    }
}
