//! Generation pipeline that turns an OpenAPI 3.x document into a standalone
//! Model Context Protocol server: Spec Loader, Operation Normalizer,
//! Validator, Mapper, Template Engine, Generation Orchestrator, Output
//! Writer, and Job Registry.

pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod mapper;
pub mod model;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
pub mod template;
pub mod validator;
pub mod writer;

use tokio_util::sync::CancellationToken;

use config::ForgeConfig;
use error::Result;
use model::{Tool, ValidationReport};

/// An opaque reference to a loaded and normalized spec, returned by
/// `load_spec` and consumed by `map_operations`.
pub struct SpecHandle {
    normalized: normalizer::NormalizedDocument,
    source_bytes: Vec<u8>,
    default_base_url: Option<String>,
}

impl SpecHandle {
    pub fn source_hash(&self) -> String {
        writer::hash_bytes(&self.source_bytes)
    }
}

/// `LoadSpec(source) -> (SpecHandle, ValidationReport)`: loads, normalizes,
/// and validates in one call.
pub async fn load_spec(source: &str, config: &ForgeConfig) -> Result<(SpecHandle, ValidationReport)> {
    let cancel = CancellationToken::new();
    let loaded = loader::load(source, config, &cancel).await?;
    let normalized = normalizer::normalize(&loaded.value)?;
    let report = validator::validate(&normalized);
    let default_base_url = report.spec_info.servers.first().cloned();
    let handle = SpecHandle {
        normalized,
        source_bytes: loaded.source_bytes,
        default_base_url,
    };
    Ok((handle, report))
}

/// `ValidateSpec(source) -> ValidationReport`: validation only.
pub async fn validate_spec(source: &str, config: &ForgeConfig) -> Result<ValidationReport> {
    let (_, report) = load_spec(source, config).await?;
    Ok(report)
}

/// `MapOperations(SpecHandle, baseURL) -> [Tool]`.
pub fn map_operations(handle: &SpecHandle, base_url: Option<&str>) -> Vec<Tool> {
    let resolved = base_url
        .map(String::from)
        .or_else(|| handle.default_base_url.clone())
        .unwrap_or_default();
    mapper::map_operations(
        &handle.normalized.operations,
        &handle.normalized.schema_defs,
        &resolved,
    )
    .tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_spec_reports_duplicate_operation_ids() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("spec.json");
        tokio::fs::write(
            &spec_path,
            r#"{
                "openapi": "3.0.0",
                "info": {"title": "Dup", "version": "1"},
                "paths": {
                    "/a": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}},
                    "/b": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}}
                }
            }"#,
        )
        .await
        .unwrap();

        let config = ForgeConfig::default();
        let (_, report) = load_spec(&format!("file:{}", spec_path.to_str().unwrap()), &config)
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.code == "DUPLICATE_OPERATION_ID"));
    }

    #[tokio::test]
    async fn map_operations_synthesizes_tool_names() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("spec.json");
        tokio::fs::write(
            &spec_path,
            r#"{
                "openapi": "3.0.0",
                "info": {"title": "Users", "version": "1"},
                "paths": {
                    "/users/{id}/profile": {
                        "get": {
                            "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
                            "responses": {"200": {"description": "ok"}}
                        }
                    }
                }
            }"#,
        )
        .await
        .unwrap();

        let config = ForgeConfig::default();
        let (handle, report) = load_spec(&format!("file:{}", spec_path.to_str().unwrap()), &config)
            .await
            .unwrap();
        assert!(report.valid);
        let tools = map_operations(&handle, Some("https://api.example.com"));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "getUsersIdProfile");
    }
}
