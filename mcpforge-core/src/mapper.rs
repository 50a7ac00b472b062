//! C4 Mapper: converts normalized Operations into MCP Tool descriptors.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};

use crate::model::{HttpBinding, Method, Operation, ParamLocation, Schema, Tool};

pub struct MapOutcome {
    pub tools: Vec<Tool>,
    /// `SCHEMA_FALLBACK` warnings raised while mapping (currently just the
    /// `body`/`body2` name collision rename), carried up into the caller's
    /// diagnostics. Document-level `SCHEMA_FALLBACK` and
    /// `UNSUPPORTED_PARAM_TYPE` checks live in the Validator, which runs
    /// before mapping and is reachable without a full generation job.
    pub warnings: Vec<(&'static str, String)>,
}

pub fn map_operations(
    operations: &[Operation],
    schema_defs: &BTreeMap<String, Schema>,
    base_url: &str,
) -> MapOutcome {
    let mut warnings = Vec::new();
    let mut names_seen: HashMap<String, usize> = HashMap::new();
    let mut tools = Vec::with_capacity(operations.len());

    for op in operations {
        let base_name = tool_name(op);
        let name = dedupe_name(&base_name, &mut names_seen);
        let description = tool_description(op);
        let input_schema = assemble_input_schema(op, schema_defs, &mut warnings);

        tools.push(Tool {
            name,
            description,
            input_schema,
            binding: HttpBinding {
                method: op.method,
                path: op.path.clone(),
                base_url: base_url.to_string(),
            },
        });
    }

    MapOutcome { tools, warnings }
}

fn dedupe_name(base: &str, seen: &mut HashMap<String, usize>) -> String {
    match seen.get_mut(base) {
        None => {
            seen.insert(base.to_string(), 1);
            base.to_string()
        }
        Some(count) => {
            *count += 1;
            format!("{base}_{count}")
        }
    }
}

/// `operationId` verbatim if present, otherwise a synthesized
/// `<method><PathSegment1><PathSegment2>...` camelCase name.
fn tool_name(op: &Operation) -> String {
    if let Some(id) = &op.operation_id {
        if is_valid_tool_name(id) {
            return id.clone();
        }
    }
    synthesize_name(op)
}

fn is_valid_tool_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    let mut chars = name.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn synthesize_name(op: &Operation) -> String {
    let mut name = op.method.as_lower().to_string();
    for segment in op.path.split('/') {
        if segment.is_empty() {
            continue;
        }
        let cleaned: String = segment.chars().filter(|c| *c != '{' && *c != '}').collect();
        if cleaned.is_empty() {
            continue;
        }
        let mut chars = cleaned.chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

fn tool_description(op: &Operation) -> String {
    if let Some(desc) = &op.description {
        if !desc.trim().is_empty() {
            return desc.clone();
        }
    }
    if let Some(summary) = &op.summary {
        if !summary.trim().is_empty() {
            return summary.clone();
        }
    }
    let action = match op.method {
        Method::Get => "Retrieve",
        Method::Post => "Create",
        Method::Put => "Update",
        Method::Patch => "Modify",
        Method::Delete => "Delete",
        _ => "Perform operation on",
    };
    let resource = op
        .path
        .split('/')
        .rev()
        .find(|s| !s.is_empty() && !s.starts_with('{'))
        .unwrap_or("resource");
    format!("{action} {resource}")
}

fn assemble_input_schema(
    op: &Operation,
    schema_defs: &BTreeMap<String, Schema>,
    warnings: &mut Vec<(&'static str, String)>,
) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in &op.parameters {
        let mut prop = param.schema.to_json_schema(schema_defs);
        if let Schema::Unknown { .. } = &param.schema {
            prop = json!({ "type": "string" });
        }
        if let Some(desc) = &param.description {
            if let Some(obj) = prop.as_object_mut() {
                obj.entry("description").or_insert_with(|| json!(desc));
            }
        }
        properties.insert(param.name.clone(), prop);
        if param.required || param.location == ParamLocation::Path {
            required.push(param.name.clone());
        }
    }

    if let Some(body) = &op.request_body {
        let body_key = if properties.contains_key("body") {
            warnings.push((
                "SCHEMA_FALLBACK",
                "a parameter named `body` collides with the request body; the body was mapped to `body2`".to_string(),
            ));
            "body2"
        } else {
            "body"
        };

        let schema = match body.preferred_schema() {
            Some(schema) => schema.to_json_schema(schema_defs),
            None => json!({
                "type": "object",
                "description": format!("original media types: {}", body.media_types().join(", ")),
            }),
        };

        properties.insert(body_key.to_string(), schema);
        if body.required {
            required.push(body_key.to_string());
        }
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamLocation, Parameter, RequestBody};

    fn op(method: Method, path: &str, operation_id: Option<&str>) -> Operation {
        Operation {
            method,
            path: path.to_string(),
            operation_id: operation_id.map(String::from),
            summary: None,
            description: None,
            parameters: Vec::new(),
            request_body: None,
            responses: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn minimal_get_maps_to_ping_tool() {
        let ops = vec![op(Method::Get, "/ping", Some("ping"))];
        let outcome = map_operations(&ops, &BTreeMap::new(), "https://api.example.com");
        assert_eq!(outcome.tools.len(), 1);
        let tool = &outcome.tools[0];
        assert_eq!(tool.name, "ping");
        assert_eq!(tool.description, "Retrieve ping");
        assert_eq!(tool.input_schema["required"], json!([]));
    }

    #[test]
    fn synthesizes_camel_case_name() {
        let mut operation = op(Method::Get, "/users/{id}/profile", None);
        operation.parameters.push(Parameter {
            name: "id".to_string(),
            location: ParamLocation::Path,
            required: true,
            description: None,
            example: None,
            schema: Schema::string(),
        });
        let outcome = map_operations(&[operation], &BTreeMap::new(), "https://api.example.com");
        assert_eq!(outcome.tools[0].name, "getUsersIdProfile");
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let ops = vec![
            op(Method::Get, "/a", Some("dup")),
            op(Method::Get, "/b", Some("dup")),
        ];
        let outcome = map_operations(&ops, &BTreeMap::new(), "https://api.example.com");
        assert_eq!(outcome.tools[0].name, "dup");
        assert_eq!(outcome.tools[1].name, "dup_2");
    }

    #[test]
    fn path_and_body_required_set() {
        let mut operation = op(Method::Post, "/users/{id}", Some("updateUser"));
        operation.parameters.push(Parameter {
            name: "id".to_string(),
            location: ParamLocation::Path,
            required: false,
            description: None,
            example: None,
            schema: Schema::string(),
        });
        operation.parameters.push(Parameter {
            name: "verbose".to_string(),
            location: ParamLocation::Query,
            required: false,
            description: None,
            example: None,
            schema: Schema::Primitive {
                type_: "boolean".to_string(),
                format: None,
                enum_values: None,
            },
        });
        operation.request_body = Some(RequestBody {
            required: true,
            content: vec![(
                "application/json".to_string(),
                Schema::Object {
                    properties: vec![("name".to_string(), Schema::string())],
                    required: vec!["name".to_string()],
                    additional_properties: false,
                },
            )],
            description: None,
        });

        let outcome = map_operations(&[operation], &BTreeMap::new(), "https://api.example.com");
        let tool = &outcome.tools[0];
        let required: Vec<String> = serde_json::from_value(tool.input_schema["required"].clone()).unwrap();
        assert!(required.contains(&"id".to_string()));
        assert!(required.contains(&"body".to_string()));
        assert!(tool.input_schema["properties"]["verbose"].is_object());
    }

    #[test]
    fn body_collision_renames_to_body2() {
        let mut operation = op(Method::Post, "/items", Some("createItem"));
        operation.parameters.push(Parameter {
            name: "body".to_string(),
            location: ParamLocation::Query,
            required: false,
            description: None,
            example: None,
            schema: Schema::string(),
        });
        operation.request_body = Some(RequestBody {
            required: true,
            content: vec![("application/json".to_string(), Schema::empty_object())],
            description: None,
        });

        let outcome = map_operations(&[operation], &BTreeMap::new(), "https://api.example.com");
        let tool = &outcome.tools[0];
        assert!(tool.input_schema["properties"]["body2"].is_object());
        assert!(outcome.warnings.iter().any(|(code, _)| *code == "SCHEMA_FALLBACK"));
    }
}
