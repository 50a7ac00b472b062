//! Core data model shared by every pipeline stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl Method {
    pub fn as_lower(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
            Method::Trace => "trace",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_lower().to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// A JSON-Schema-shaped value, reduced to the sum type the rest of the
/// pipeline reasons about. Built by walking a `serde_json::Value` document
/// tree rather than pattern-matching a typed OpenAPI schema enum directly,
/// so the walk tolerates whatever shape a third-party document actually
/// contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Schema {
    Primitive {
        #[serde(rename = "type")]
        type_: String,
        format: Option<String>,
        #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
        enum_values: Option<Vec<serde_json::Value>>,
    },
    Array {
        items: Box<Schema>,
    },
    Object {
        properties: Vec<(String, Schema)>,
        required: Vec<String>,
        additional_properties: bool,
    },
    Ref {
        target: String,
    },
    Unknown {
        raw: serde_json::Value,
    },
    /// A `oneOf`/`anyOf`/`allOf` combinator, collapsed to a generic object
    /// because the pipeline does not model union/intersection schemas.
    Unsupported {
        reason: String,
    },
}

impl Schema {
    pub fn string() -> Self {
        Schema::Primitive {
            type_: "string".to_string(),
            format: None,
            enum_values: None,
        }
    }

    pub fn empty_object() -> Self {
        Schema::Object {
            properties: Vec::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }

    /// Render this Schema as a plain JSON-Schema value, resolving `Ref`
    /// nodes against `defs` with a visited-id guard so cyclic graphs
    /// terminate instead of recursing forever.
    pub fn to_json_schema(&self, defs: &BTreeMap<String, Schema>) -> serde_json::Value {
        self.to_json_schema_inner(defs, &mut Vec::new())
    }

    fn to_json_schema_inner(
        &self,
        defs: &BTreeMap<String, Schema>,
        visiting: &mut Vec<String>,
    ) -> serde_json::Value {
        use serde_json::{json, Map, Value};
        match self {
            Schema::Primitive {
                type_,
                format,
                enum_values,
            } => {
                let mut m = Map::new();
                m.insert("type".to_string(), Value::String(type_.clone()));
                if let Some(f) = format {
                    m.insert("format".to_string(), Value::String(f.clone()));
                }
                if let Some(e) = enum_values {
                    m.insert("enum".to_string(), Value::Array(e.clone()));
                }
                Value::Object(m)
            }
            Schema::Array { items } => json!({
                "type": "array",
                "items": items.to_json_schema_inner(defs, visiting),
            }),
            Schema::Object {
                properties,
                required,
                additional_properties,
            } => {
                let mut props = Map::new();
                for (name, schema) in properties {
                    props.insert(name.clone(), schema.to_json_schema_inner(defs, visiting));
                }
                json!({
                    "type": "object",
                    "properties": Value::Object(props),
                    "required": required,
                    "additionalProperties": additional_properties,
                })
            }
            Schema::Ref { target } => {
                if visiting.contains(target) {
                    return json!({ "type": "object", "description": format!("cyclic ref to {target}") });
                }
                match defs.get(target) {
                    Some(resolved) => {
                        visiting.push(target.clone());
                        let rendered = resolved.to_json_schema_inner(defs, visiting);
                        visiting.pop();
                        rendered
                    }
                    None => json!({ "type": "object", "description": format!("unresolved ref {target}") }),
                }
            }
            Schema::Unknown { raw } => raw.clone(),
            Schema::Unsupported { reason } => json!({ "type": "object", "description": reason }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    pub example: Option<serde_json::Value>,
    pub schema: Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    /// media-type string -> schema, insertion order preserved
    pub content: Vec<(String, Schema)>,
    pub description: Option<String>,
}

impl RequestBody {
    /// The schema for `application/json` if present, otherwise the first
    /// declared media type.
    pub fn preferred_schema(&self) -> Option<&Schema> {
        self.content
            .iter()
            .find(|(media, _)| media == "application/json")
            .or_else(|| self.content.first())
            .map(|(_, schema)| schema)
    }

    pub fn media_types(&self) -> Vec<&str> {
        self.content.iter().map(|(m, _)| m.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub method: Method,
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: Vec<Response>,
    pub tags: Vec<String>,
}

impl Operation {
    pub fn has_success_response(&self) -> bool {
        self.responses
            .iter()
            .any(|r| r.status.starts_with('2'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBinding {
    pub method: Method,
    pub path: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub binding: HttpBinding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySchemeInfo {
    pub name: String,
    pub scheme_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecInfo {
    pub title: String,
    pub version: String,
    pub operation_count: usize,
    pub schema_count: usize,
    pub servers: Vec<String>,
    pub tags: Vec<String>,
    pub security_schemes: Vec<SecuritySchemeInfo>,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDiagnostic {
    pub kind: DiagnosticKind,
    pub code: String,
    pub message: String,
    pub pointer: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub suggestion: Option<String>,
}

impl ValidationDiagnostic {
    pub fn error(code: &str, message: impl Into<String>, pointer: impl Into<String>) -> Self {
        ValidationDiagnostic {
            kind: DiagnosticKind::Error,
            code: code.to_string(),
            message: message.into(),
            pointer: pointer.into(),
            line: None,
            column: None,
            suggestion: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, pointer: impl Into<String>) -> Self {
        ValidationDiagnostic {
            kind: DiagnosticKind::Warning,
            code: code.to_string(),
            message: message.into(),
            pointer: pointer.into(),
            line: None,
            column: None,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationDiagnostic>,
    pub warnings: Vec<ValidationDiagnostic>,
    pub suggestions: Vec<String>,
    pub spec_info: SpecInfo,
    pub validation_time_ms: u64,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    pub package_name: String,
    pub spec_title: String,
    pub base_url: String,
    pub tools: Vec<Tool>,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub target_dir: String,
    pub files: Vec<String>,
    pub byte_sizes: Vec<u64>,
    pub sha256: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: String,
    pub project_id: String,
    pub state: JobState,
    pub progress: f32,
    pub current_step: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<crate::error::ErrorDiagnostic>,
    pub output: Option<OutputDescriptor>,
}

impl GenerationJob {
    pub fn new(id: String, project_id: String) -> Self {
        GenerationJob {
            id,
            project_id,
            state: JobState::Queued,
            progress: 0.0,
            current_step: "queued".to_string(),
            started_at: None,
            ended_at: None,
            error: None,
            output: None,
        }
    }
}

/// One generated file. The set for a job is immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub relative_path: String,
    pub content: Vec<u8>,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub project_id: String,
    pub source: String,
    pub output_dir: String,
    pub package_name: String,
    pub base_url: Option<String>,
    pub overwrite: bool,
    pub template_set_id: Option<String>,
}
