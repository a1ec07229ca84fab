//! Argument binding against a definition's parameter list

use crate::registry::{ToolDefinition, json_type_name};
use crate::tools::{ToolErrorKind, ValidationError};
use serde_json::{Map, Value};

/// Check `args` against `definition` and fill in defaults.
///
/// Problems are reported together, missing parameters first, then unknown
/// ones, then type mismatches. An explicit `null` for an optional parameter
/// counts as absent.
pub fn bind_arguments(
    definition: &ToolDefinition,
    args: Value,
) -> Result<Map<String, Value>, Vec<ValidationError>> {
    let mut supplied = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(vec![ValidationError::new(
                ToolErrorKind::TypeMismatch,
                "arguments",
                format!("Expected a JSON object, got {}", json_type_name(&other)),
            )]);
        }
    };

    let mut missing = Vec::new();
    let mut mismatched = Vec::new();
    let mut bound = Map::new();

    for param in &definition.parameters {
        let value = match supplied.remove(&param.name) {
            Some(Value::Null) if !param.required => None,
            other => other,
        };

        match value {
            None if param.required => missing.push(ValidationError::new(
                ToolErrorKind::MissingParameter,
                &param.name,
                "Missing required parameter",
            )),
            None => {
                if let Some(default) = &param.default {
                    bound.insert(param.name.clone(), default.clone());
                }
            }
            Some(value) if !param.param_type.matches(&value) => {
                mismatched.push(ValidationError::new(
                    ToolErrorKind::TypeMismatch,
                    &param.name,
                    format!(
                        "Expected {}, got {}",
                        param.param_type,
                        json_type_name(&value)
                    ),
                ))
            }
            Some(value) => {
                bound.insert(param.name.clone(), value);
            }
        }
    }

    let unknown = supplied.keys().map(|name| {
        ValidationError::new(ToolErrorKind::UnknownParameter, name, "Unknown parameter")
    });

    let problems: Vec<ValidationError> = missing
        .into_iter()
        .chain(unknown)
        .chain(mismatched)
        .collect();

    if problems.is_empty() {
        Ok(bound)
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParamType, ToolParameter};
    use serde_json::json;

    fn definition() -> ToolDefinition {
        ToolDefinition::new("demo.search", "Search")
            .with_parameter(ToolParameter::required("query", ParamType::String, "Query"))
            .with_parameter(
                ToolParameter::optional("limit", ParamType::Integer, "Max hits")
                    .with_default(json!(10)),
            )
            .with_parameter(ToolParameter::optional("tags", ParamType::Array, "Filter"))
    }

    #[test]
    fn test_defaults_filled() {
        let bound = bind_arguments(&definition(), json!({"query": "rust"})).unwrap();
        assert_eq!(Value::Object(bound), json!({"query": "rust", "limit": 10}));
    }

    #[test]
    fn test_null_means_empty_arguments() {
        let def = ToolDefinition::new("demo.noop", "Nothing");
        assert!(bind_arguments(&def, Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_null_optional_is_absent() {
        let bound = bind_arguments(&definition(), json!({"query": "q", "limit": null, "tags": null}))
            .unwrap();
        assert_eq!(Value::Object(bound), json!({"query": "q", "limit": 10}));
    }

    #[test]
    fn test_non_object_rejected() {
        let errors = bind_arguments(&definition(), json!(["query"])).unwrap_err();
        assert_eq!(errors[0].kind, ToolErrorKind::TypeMismatch);
        assert_eq!(errors[0].field, "arguments");
    }

    #[test]
    fn test_strict_types_no_coercion() {
        let errors = bind_arguments(&definition(), json!({"query": "q", "limit": "5"})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ToolErrorKind::TypeMismatch);
        assert_eq!(errors[0].message, "Expected integer, got string");
    }

    #[test]
    fn test_all_problems_reported_missing_first() {
        let errors =
            bind_arguments(&definition(), json!({"limit": 1.5, "colour": "red"})).unwrap_err();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ToolErrorKind::MissingParameter,
                ToolErrorKind::UnknownParameter,
                ToolErrorKind::TypeMismatch,
            ]
        );
        assert_eq!(errors[1].field, "colour");
    }
}
