//! C2 Operation Normalizer: walks the parsed document and produces a flat,
//! ordered list of Operations with fully resolved parameter and body
//! descriptors.

use std::collections::BTreeMap;

use openapiv3::{OpenAPI, ParameterSchemaOrContent, ReferenceOr};

use crate::error::{Error, Result};
use crate::model::{Method, ParamLocation, Parameter, RequestBody, Response, Schema, Operation};

pub struct NormalizedDocument {
    pub api: OpenAPI,
    pub operations: Vec<Operation>,
    /// component schema name -> resolved Schema, used to fully resolve Refs
    /// at render time and to report `schema_count` in SpecInfo.
    pub schema_defs: BTreeMap<String, Schema>,
}

pub fn normalize(document_value: &serde_json::Value) -> Result<NormalizedDocument> {
    let api: OpenAPI = serde_json::from_value(document_value.clone())
        .map_err(|e| Error::SpecValidationError(e.to_string()))?;

    if !api.openapi.starts_with("3.") {
        return Err(Error::UnsupportedOpenApiVersion(api.openapi.clone()));
    }

    let schema_defs = build_schema_table(&api)?;

    let mut operations = Vec::new();
    for (path, path_item_ref) in api.paths.paths.iter() {
        let path_item = match path_item_ref {
            ReferenceOr::Item(item) => item,
            ReferenceOr::Reference { reference } => {
                return Err(Error::ExternalRefUnsupported(reference.clone()))
            }
        };

        for (method, op) in operations_from_path_item(path_item) {
            let merged_params = merge_parameters(&path_item.parameters, &op.parameters, &schema_defs)?;
            let request_body = op
                .request_body
                .as_ref()
                .map(|rb| resolve_request_body(rb, &schema_defs))
                .transpose()?;
            let responses = op
                .responses
                .responses
                .iter()
                .map(|(status, resp)| Response {
                    status: status_code_to_string(status),
                    description: resp.as_item().map(|r| r.description.clone()),
                })
                .collect();

            operations.push(Operation {
                method,
                path: path.clone(),
                operation_id: op.operation_id.clone(),
                summary: op.summary.clone(),
                description: op.description.clone(),
                parameters: merged_params,
                request_body,
                responses,
                tags: op.tags.clone(),
            });
        }
    }

    Ok(NormalizedDocument {
        api,
        operations,
        schema_defs,
    })
}

fn status_code_to_string(status: &openapiv3::StatusCode) -> String {
    match status {
        openapiv3::StatusCode::Code(code) => code.to_string(),
        openapiv3::StatusCode::Range(range) => format!("{range}XX"),
    }
}

fn operations_from_path_item(
    item: &openapiv3::PathItem,
) -> Vec<(Method, &openapiv3::Operation)> {
    let mut out = Vec::new();
    if let Some(op) = &item.get {
        out.push((Method::Get, op));
    }
    if let Some(op) = &item.post {
        out.push((Method::Post, op));
    }
    if let Some(op) = &item.put {
        out.push((Method::Put, op));
    }
    if let Some(op) = &item.patch {
        out.push((Method::Patch, op));
    }
    if let Some(op) = &item.delete {
        out.push((Method::Delete, op));
    }
    if let Some(op) = &item.head {
        out.push((Method::Head, op));
    }
    if let Some(op) = &item.options {
        out.push((Method::Options, op));
    }
    if let Some(op) = &item.trace {
        out.push((Method::Trace, op));
    }
    out
}

fn merge_parameters(
    path_level: &[ReferenceOr<openapiv3::Parameter>],
    op_level: &[ReferenceOr<openapiv3::Parameter>],
    schema_defs: &BTreeMap<String, Schema>,
) -> Result<Vec<Parameter>> {
    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: BTreeMap<(String, ParamLocation), usize> = BTreeMap::new();

    for param_ref in path_level.iter().chain(op_level.iter()) {
        let param = match param_ref {
            ReferenceOr::Item(p) => p,
            ReferenceOr::Reference { reference } => {
                return Err(Error::ExternalRefUnsupported(reference.clone()))
            }
        };
        let converted = convert_parameter(param, schema_defs)?;
        let key = (converted.name.clone(), converted.location);
        match index.get(&key) {
            Some(&pos) => merged[pos] = converted,
            None => {
                index.insert(key, merged.len());
                merged.push(converted);
            }
        }
    }

    Ok(merged)
}

fn convert_parameter(
    param: &openapiv3::Parameter,
    schema_defs: &BTreeMap<String, Schema>,
) -> Result<Parameter> {
    let (data, location) = match param {
        openapiv3::Parameter::Query { parameter_data, .. } => (parameter_data, ParamLocation::Query),
        openapiv3::Parameter::Header { parameter_data, .. } => (parameter_data, ParamLocation::Header),
        openapiv3::Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path),
        openapiv3::Parameter::Cookie { parameter_data, .. } => (parameter_data, ParamLocation::Cookie),
    };

    let schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => resolve_schema_ref(schema_ref, schema_defs)?,
        ParameterSchemaOrContent::Content(content) => content
            .iter()
            .next()
            .and_then(|(_, media)| media.schema.as_ref())
            .map(|s| resolve_schema_ref(s, schema_defs))
            .transpose()?
            .unwrap_or_else(Schema::string),
    };

    let required = data.required || location == ParamLocation::Path;

    Ok(Parameter {
        name: data.name.clone(),
        location,
        required,
        description: data.description.clone(),
        example: data.example.clone(),
        schema,
    })
}

fn resolve_request_body(
    body_ref: &ReferenceOr<openapiv3::RequestBody>,
    schema_defs: &BTreeMap<String, Schema>,
) -> Result<RequestBody> {
    let body = match body_ref {
        ReferenceOr::Item(b) => b,
        ReferenceOr::Reference { reference } => {
            return Err(Error::ExternalRefUnsupported(reference.clone()))
        }
    };

    let mut content = Vec::new();
    for (media_type, media) in body.content.iter() {
        let schema = media
            .schema
            .as_ref()
            .map(|s| resolve_schema_ref(s, schema_defs))
            .transpose()?
            .unwrap_or_else(Schema::empty_object);
        content.push((media_type.clone(), schema));
    }

    Ok(RequestBody {
        required: body.required,
        content,
        description: body.description.clone(),
    })
}

/// Convert every component schema to our Schema sum type up front, so that
/// `Ref` nodes encountered during operation walking resolve against a
/// complete table regardless of declaration order.
fn build_schema_table(api: &OpenAPI) -> Result<BTreeMap<String, Schema>> {
    let mut table = BTreeMap::new();
    if let Some(components) = &api.components {
        for (name, schema_ref) in components.schemas.iter() {
            let value = match schema_ref {
                ReferenceOr::Item(schema) => serde_json::to_value(schema)
                    .map_err(|e| Error::ParsingError(e.to_string()))?,
                ReferenceOr::Reference { reference } => {
                    serde_json::json!({ "$ref": reference })
                }
            };
            table.insert(name.clone(), json_to_schema(&value));
        }
    }
    Ok(table)
}

fn resolve_schema_ref(
    schema_ref: &ReferenceOr<openapiv3::Schema>,
    schema_defs: &BTreeMap<String, Schema>,
) -> Result<Schema> {
    match schema_ref {
        ReferenceOr::Reference { reference } => {
            let target = reference
                .strip_prefix("#/components/schemas/")
                .ok_or_else(|| Error::ExternalRefUnsupported(reference.clone()))?;
            if !schema_defs.contains_key(target) {
                return Err(Error::EmptySchema(target.to_string()));
            }
            Ok(Schema::Ref {
                target: target.to_string(),
            })
        }
        ReferenceOr::Item(schema) => {
            let value =
                serde_json::to_value(schema).map_err(|e| Error::ParsingError(e.to_string()))?;
            Ok(json_to_schema(&value))
        }
    }
}

/// Walk a JSON-Schema-shaped `serde_json::Value` and build our Schema sum
/// type, using the wire-format keys directly (`type`, `properties`,
/// `required`, `items`, `enum`, `format`) rather than matching against the
/// crate's internal schema-kind enum.
fn json_to_schema(value: &serde_json::Value) -> Schema {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return Schema::Unknown { raw: value.clone() },
    };

    if let Some(combinator) = ["oneOf", "anyOf", "allOf"]
        .iter()
        .find(|k| obj.contains_key(**k))
    {
        return Schema::Unsupported {
            reason: format!("`{combinator}` is not supported; collapsed to a generic object"),
        };
    }

    let type_str = obj.get("type").and_then(|v| v.as_str());

    match type_str {
        Some("array") => {
            let items = obj
                .get("items")
                .map(json_to_schema)
                .unwrap_or_else(Schema::string);
            Schema::Array {
                items: Box::new(items),
            }
        }
        Some("object") | None if obj.contains_key("properties") => {
            let properties = obj
                .get("properties")
                .and_then(|v| v.as_object())
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| (k.clone(), json_to_schema(v)))
                        .collect()
                })
                .unwrap_or_default();
            let required = obj
                .get("required")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let additional_properties = obj
                .get("additionalProperties")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Schema::Object {
                properties,
                required,
                additional_properties,
            }
        }
        Some("object") => Schema::Object {
            properties: Vec::new(),
            required: Vec::new(),
            additional_properties: obj
                .get("additionalProperties")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        },
        Some(primitive) => Schema::Primitive {
            type_: primitive.to_string(),
            format: obj.get("format").and_then(|v| v.as_str()).map(String::from),
            enum_values: obj.get("enum").and_then(|v| v.as_array()).cloned(),
        },
        None => {
            if obj.is_empty() {
                Schema::Unknown { raw: value.clone() }
            } else {
                Schema::Unknown { raw: value.clone() }
            }
        }
    }
}
