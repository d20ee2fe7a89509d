//! Tool catalog → provider function-calling schema.
//!
//! The top-level parameters are always an object schema. A tool's raw
//! schema string, when present, replaces the structured one verbatim.
//! Structured property definitions are rebuilt recursively keeping only
//! `type`, `description`, `enum`, `properties`, `required`, `items` and
//! `additionalProperties`.

use ragrelay_core::error::SchemaError;
use ragrelay_core::provider::ToolDefinition;
use ragrelay_core::tool::ToolSpec;
use serde_json::{Map, Value, json};

/// Convert every tool; the first failure aborts the batch.
pub fn to_provider_schema(tools: &[ToolSpec]) -> Result<Vec<ToolDefinition>, SchemaError> {
    tools.iter().map(to_definition).collect()
}

/// Convert one tool.
pub fn to_definition(tool: &ToolSpec) -> Result<ToolDefinition, SchemaError> {
    let parameters = match &tool.raw_schema {
        Some(raw) => {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| SchemaError::MalformedRaw {
                    tool: tool.name.clone(),
                    reason: e.to_string(),
                })?;
            if !value.is_object() {
                return Err(SchemaError::MalformedRaw {
                    tool: tool.name.clone(),
                    reason: "schema must be a JSON object".into(),
                });
            }
            value
        }
        None => {
            let mut properties = Map::new();
            for (name, def) in &tool.input_schema.properties {
                let Some(def) = def.as_object() else {
                    return Err(SchemaError::InvalidProperty {
                        tool: tool.name.clone(),
                        property: name.clone(),
                        reason: "definition must be a JSON object".into(),
                    });
                };
                properties.insert(name.clone(), convert_property(def));
            }
            json!({
                "type": "object",
                "properties": properties,
                "required": tool.input_schema.required,
            })
        }
    };

    Ok(ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    })
}

fn convert_property(def: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), json!("object"));

    for (key, value) in def {
        match key.as_str() {
            "type" => {
                if let Some(t) = value.as_str() {
                    out.insert("type".into(), json!(t));
                }
            }
            "description" => {
                if let Some(d) = value.as_str() {
                    out.insert("description".into(), json!(d));
                }
            }
            "enum" | "required" => {
                let strings = string_list(value);
                if !strings.is_empty() {
                    out.insert(key.clone(), json!(strings));
                }
            }
            "properties" => {
                let nested: Map<String, Value> = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .filter_map(|(k, v)| Some((k.clone(), convert_property(v.as_object()?))))
                            .collect()
                    })
                    .unwrap_or_default();
                out.insert("properties".into(), Value::Object(nested));
            }
            "items" => {
                if let Some(items) = value.as_object() {
                    out.insert("items".into(), convert_property(items));
                }
            }
            "additionalProperties" => {
                out.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }

    Value::Object(out)
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
