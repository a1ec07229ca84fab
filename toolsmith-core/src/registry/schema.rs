//! Conversion between parameter lists and JSON Schema objects

use super::definition::{ParamType, ToolDefinition, ToolParameter};
use serde_json::{Map, Value, json};

/// Build the `{type: object, properties, required}` input schema for a definition
pub fn input_schema(definition: &ToolDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &definition.parameters {
        let mut property = Map::new();
        if param.param_type != ParamType::Any {
            property.insert("type".into(), Value::from(param.param_type.as_str()));
        }
        if !param.description.is_empty() {
            property.insert("description".into(), Value::from(param.description.clone()));
        }
        if let Some(default) = &param.default {
            property.insert("default".into(), default.clone());
        }
        properties.insert(param.name.clone(), Value::Object(property));

        if param.required {
            required.push(Value::from(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Turn an external server's `inputSchema` into a parameter list.
///
/// Properties are sorted by name. A property whose type is absent, a list,
/// or outside the known tags becomes [`ParamType::Any`].
pub fn parameters_from_schema(schema: &Value) -> Vec<ToolParameter> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut names: Vec<&String> = properties.keys().collect();
    names.sort();

    names
        .into_iter()
        .map(|name| {
            let property = &properties[name];
            let param_type = property
                .get("type")
                .and_then(Value::as_str)
                .map(ParamType::from)
                .filter(ParamType::is_known)
                .unwrap_or(ParamType::Any);
            let is_required = required.contains(&name.as_str());

            ToolParameter {
                name: name.clone(),
                param_type,
                description: property
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                required: is_required,
                default: if is_required {
                    None
                } else {
                    property.get("default").cloned()
                },
            }
        })
        .collect()
}
