//! C3 Validator: structural and semantic checks over the normalized
//! document, producing a pure ValidationReport.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use chrono::Utc;

use crate::model::{
    Complexity, DiagnosticKind, Operation, Schema, SecuritySchemeInfo, SpecInfo,
    ValidationDiagnostic, ValidationReport,
};
use crate::normalizer::NormalizedDocument;

const SUPPORTED_PARAM_TYPES: &[&str] = &["string", "number", "integer", "boolean"];

pub fn validate(doc: &NormalizedDocument) -> ValidationReport {
    let started = Instant::now();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    check_duplicate_operation_ids(&doc.operations, &mut errors);
    check_missing_required_properties(doc, &mut errors);
    check_empty_security_schemes(doc, &mut errors);
    check_no_paths(&doc.operations, &mut warnings);
    check_missing_descriptions(&doc.operations, &mut warnings);
    check_no_schemas(doc, &mut warnings);
    check_no_success_response(&doc.operations, &mut warnings);
    check_empty_server_urls(doc, &mut warnings);
    check_unsupported_param_types(&doc.operations, &mut warnings);
    check_schema_fallbacks(doc, &mut warnings);

    if warnings
        .iter()
        .any(|w: &ValidationDiagnostic| w.code == "UNSUPPORTED_OPENAPI_VERSION")
    {
        suggestions.push("Convert the document to OpenAPI 3.0 or later.".to_string());
    }

    let spec_info = build_spec_info(doc);
    let valid = errors.is_empty();

    ValidationReport {
        valid,
        errors,
        warnings,
        suggestions,
        spec_info,
        validation_time_ms: started.elapsed().as_millis() as u64,
        validated_at: Utc::now(),
    }
}

fn check_duplicate_operation_ids(operations: &[Operation], errors: &mut Vec<ValidationDiagnostic>) {
    let mut seen: HashMap<&str, &Operation> = HashMap::new();
    for op in operations {
        let Some(id) = op.operation_id.as_deref() else {
            continue;
        };
        if seen.contains_key(id) {
            errors.push(ValidationDiagnostic::error(
                "DUPLICATE_OPERATION_ID",
                format!("operationId `{id}` is used by more than one operation"),
                format!("#/paths/{}/{}", op.path.replace('/', "~1"), op.method.as_lower()),
            ));
        } else {
            seen.insert(id, op);
        }
    }
}

fn check_missing_required_properties(
    doc: &NormalizedDocument,
    errors: &mut Vec<ValidationDiagnostic>,
) {
    for (name, schema) in doc.schema_defs.iter() {
        if let crate::model::Schema::Object {
            properties,
            required,
            ..
        } = schema
        {
            let prop_names: BTreeSet<&str> = properties.iter().map(|(n, _)| n.as_str()).collect();
            for req in required {
                if !prop_names.contains(req.as_str()) {
                    errors.push(ValidationDiagnostic::error(
                        "MISSING_REQUIRED_PROPERTY",
                        format!("required property `{req}` is not defined in schema `{name}`"),
                        format!("#/components/schemas/{name}/required"),
                    ));
                }
            }
        }
        if let crate::model::Schema::Unknown { raw } = schema {
            if raw.as_object().map(|o| o.is_empty()).unwrap_or(false) {
                errors.push(ValidationDiagnostic::error(
                    "EMPTY_SCHEMA",
                    format!("schema `{name}` has no definition"),
                    format!("#/components/schemas/{name}"),
                ));
            }
        }
    }
}

fn check_empty_security_schemes(doc: &NormalizedDocument, errors: &mut Vec<ValidationDiagnostic>) {
    let Some(components) = &doc.api.components else {
        return;
    };
    for (name, scheme_ref) in components.security_schemes.iter() {
        if matches!(scheme_ref, openapiv3::ReferenceOr::Reference { .. }) {
            errors.push(ValidationDiagnostic::error(
                "EMPTY_SECURITY_SCHEME",
                format!("security scheme `{name}` has no local definition"),
                format!("#/components/securitySchemes/{name}"),
            ));
        }
    }
}

fn check_unsupported_param_types(operations: &[Operation], warnings: &mut Vec<ValidationDiagnostic>) {
    for op in operations {
        for param in &op.parameters {
            if let Schema::Primitive { type_, .. } = &param.schema {
                if !SUPPORTED_PARAM_TYPES.contains(&type_.as_str()) {
                    warnings.push(ValidationDiagnostic::warning(
                        "UNSUPPORTED_PARAM_TYPE",
                        format!("parameter `{}` on {} {} has unsupported type `{type_}`", param.name, op.method, op.path),
                        format!("#/paths/{}/{}/parameters/{}", op.path.replace('/', "~1"), op.method.as_lower(), param.name),
                    ));
                }
            }
        }
    }
}

/// Flags `oneOf`/`anyOf`/`allOf` collapses and cyclic `$ref` graphs anywhere
/// reachable from a component schema, a parameter, or a request body, and
/// request bodies with no resolvable media-type schema at all.
fn check_schema_fallbacks(doc: &NormalizedDocument, warnings: &mut Vec<ValidationDiagnostic>) {
    for (name, schema) in doc.schema_defs.iter() {
        walk_schema_for_fallbacks(
            schema,
            &doc.schema_defs,
            &mut Vec::new(),
            &format!("#/components/schemas/{name}"),
            warnings,
        );
    }

    for op in &doc.operations {
        let op_pointer = format!("#/paths/{}/{}", op.path.replace('/', "~1"), op.method.as_lower());
        for param in &op.parameters {
            walk_schema_for_fallbacks(
                &param.schema,
                &doc.schema_defs,
                &mut Vec::new(),
                &format!("{op_pointer}/parameters/{}", param.name),
                warnings,
            );
        }
        if let Some(body) = &op.request_body {
            if body.preferred_schema().is_none() {
                warnings.push(ValidationDiagnostic::warning(
                    "SCHEMA_FALLBACK",
                    format!("{} {} has a request body with no resolvable schema", op.method, op.path),
                    format!("{op_pointer}/requestBody"),
                ));
            }
            for (media, schema) in &body.content {
                walk_schema_for_fallbacks(
                    schema,
                    &doc.schema_defs,
                    &mut Vec::new(),
                    &format!("{op_pointer}/requestBody/{media}"),
                    warnings,
                );
            }
        }
    }
}

fn walk_schema_for_fallbacks(
    schema: &Schema,
    defs: &BTreeMap<String, Schema>,
    visiting: &mut Vec<String>,
    pointer: &str,
    warnings: &mut Vec<ValidationDiagnostic>,
) {
    match schema {
        Schema::Unsupported { reason } => {
            warnings.push(ValidationDiagnostic::warning("SCHEMA_FALLBACK", reason.clone(), pointer.to_string()));
        }
        Schema::Array { items } => {
            walk_schema_for_fallbacks(items, defs, visiting, pointer, warnings);
        }
        Schema::Object { properties, .. } => {
            for (name, prop) in properties {
                walk_schema_for_fallbacks(prop, defs, visiting, &format!("{pointer}/properties/{name}"), warnings);
            }
        }
        Schema::Ref { target } => {
            if visiting.contains(target) {
                warnings.push(ValidationDiagnostic::warning(
                    "SCHEMA_FALLBACK",
                    format!("schema `{target}` is referenced cyclically; rendered as a generic object"),
                    pointer.to_string(),
                ));
                return;
            }
            if let Some(resolved) = defs.get(target) {
                visiting.push(target.clone());
                walk_schema_for_fallbacks(resolved, defs, visiting, pointer, warnings);
                visiting.pop();
            }
        }
        Schema::Primitive { .. } | Schema::Unknown { .. } => {}
    }
}

fn check_no_paths(operations: &[Operation], warnings: &mut Vec<ValidationDiagnostic>) {
    if operations.is_empty() {
        warnings.push(ValidationDiagnostic::warning(
            "NO_PATHS",
            "the document defines zero operations",
            "#/paths",
        ));
    }
}

fn check_missing_descriptions(operations: &[Operation], warnings: &mut Vec<ValidationDiagnostic>) {
    for op in operations {
        if op.summary.is_none() && op.description.is_none() {
            warnings.push(ValidationDiagnostic::warning(
                "MISSING_DESCRIPTION",
                format!("{} {} has neither a summary nor a description", op.method, op.path),
                format!("#/paths/{}/{}", op.path.replace('/', "~1"), op.method.as_lower()),
            ));
        }
    }
}

fn check_no_schemas(doc: &NormalizedDocument, warnings: &mut Vec<ValidationDiagnostic>) {
    if doc.schema_defs.is_empty() {
        warnings.push(ValidationDiagnostic::warning(
            "NO_SCHEMAS",
            "the document defines no component schemas",
            "#/components/schemas",
        ));
    }
}

fn check_no_success_response(operations: &[Operation], warnings: &mut Vec<ValidationDiagnostic>) {
    for op in operations {
        if !op.has_success_response() {
            warnings.push(ValidationDiagnostic::warning(
                "NO_SUCCESS_RESPONSE",
                format!("{} {} has no response with a 2xx status", op.method, op.path),
                format!("#/paths/{}/{}/responses", op.path.replace('/', "~1"), op.method.as_lower()),
            ));
        }
    }
}

fn check_empty_server_urls(doc: &NormalizedDocument, warnings: &mut Vec<ValidationDiagnostic>) {
    for (i, server) in doc.api.servers.iter().enumerate() {
        if server.url.trim().is_empty() {
            warnings.push(ValidationDiagnostic::warning(
                "EMPTY_SERVER_URL",
                "a server entry has a blank URL",
                format!("#/servers/{i}/url"),
            ));
        }
    }
}

fn build_spec_info(doc: &NormalizedDocument) -> SpecInfo {
    let operation_count = doc.operations.len();
    let schema_count = doc.schema_defs.len();

    let servers: Vec<String> = doc.api.servers.iter().map(|s| s.url.clone()).collect();

    let mut tags: BTreeSet<String> = BTreeSet::new();
    for op in &doc.operations {
        tags.extend(op.tags.iter().cloned());
    }

    let security_schemes = doc
        .api
        .components
        .as_ref()
        .map(|c| {
            c.security_schemes
                .iter()
                .map(|(name, scheme)| SecuritySchemeInfo {
                    name: name.clone(),
                    scheme_type: security_scheme_type(scheme),
                })
                .collect()
        })
        .unwrap_or_default();

    let total = operation_count + schema_count;
    let complexity = if total <= 20 {
        Complexity::Low
    } else if total <= 100 {
        Complexity::Medium
    } else {
        Complexity::High
    };

    SpecInfo {
        title: doc.api.info.title.clone(),
        version: doc.api.info.version.clone(),
        operation_count,
        schema_count,
        servers,
        tags: tags.into_iter().collect(),
        security_schemes,
        complexity,
    }
}

fn security_scheme_type(
    scheme: &openapiv3::ReferenceOr<openapiv3::SecurityScheme>,
) -> String {
    match scheme {
        openapiv3::ReferenceOr::Reference { .. } => "reference".to_string(),
        openapiv3::ReferenceOr::Item(item) => match item {
            openapiv3::SecurityScheme::APIKey { .. } => "apiKey".to_string(),
            openapiv3::SecurityScheme::HTTP { .. } => "http".to_string(),
            openapiv3::SecurityScheme::OAuth2 { .. } => "oauth2".to_string(),
            openapiv3::SecurityScheme::OpenIDConnect { .. } => "openIdConnect".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    fn doc_with_duplicates() -> serde_json::Value {
        serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}},
                "/b": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}}
            }
        })
    }

    #[test]
    fn flags_duplicate_operation_ids() {
        let doc = normalize(&doc_with_duplicates()).unwrap();
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.code == "DUPLICATE_OPERATION_ID"));
    }

    #[test]
    fn warns_on_missing_description() {
        let value = serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"get": {"operationId": "a", "responses": {"200": {"description": "ok"}}}}
            }
        });
        let doc = normalize(&value).unwrap();
        let report = validate(&doc);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.code == "MISSING_DESCRIPTION"));
    }

    #[test]
    fn complexity_scales_with_size() {
        let value = serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {}
        });
        let doc = normalize(&value).unwrap();
        let report = validate(&doc);
        assert_eq!(report.spec_info.complexity, Complexity::Low);
    }

    #[test]
    fn flags_unsupported_param_type() {
        use crate::model::{Method, ParamLocation, Parameter};

        let operation = Operation {
            method: Method::Get,
            path: "/upload".to_string(),
            operation_id: Some("upload".to_string()),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "attachment".to_string(),
                location: ParamLocation::Query,
                required: false,
                description: None,
                example: None,
                schema: Schema::Primitive {
                    type_: "file".to_string(),
                    format: None,
                    enum_values: None,
                },
            }],
            request_body: None,
            responses: Vec::new(),
            tags: Vec::new(),
        };

        let mut warnings = Vec::new();
        check_unsupported_param_types(&[operation], &mut warnings);
        assert!(warnings.iter().any(|w| w.code == "UNSUPPORTED_PARAM_TYPE"));
    }

    #[test]
    fn flags_empty_security_scheme() {
        let value = serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "securitySchemes": {
                    "extAuth": {"$ref": "#/components/securitySchemes/other"}
                }
            }
        });
        let doc = normalize(&value).unwrap();
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.code == "EMPTY_SECURITY_SCHEME"));
    }

    #[test]
    fn flags_one_of_collapse_as_schema_fallback() {
        let value = serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {},
            "components": {
                "schemas": {
                    "Shape": {
                        "oneOf": [{"type": "string"}, {"type": "integer"}]
                    }
                }
            }
        });
        let doc = normalize(&value).unwrap();
        let report = validate(&doc);
        assert!(report.warnings.iter().any(|w| w.code == "SCHEMA_FALLBACK"));
    }
}
