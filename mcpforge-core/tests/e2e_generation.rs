//! End-to-end scenarios exercising a full load -> validate -> map -> render
//! -> write cycle against a temp directory.

use mcpforge_core::config::ForgeConfig;
use mcpforge_core::events::GenerationEvent;
use mcpforge_core::model::{GenerationRequest, JobState};
use mcpforge_core::orchestrator;

async fn write_spec(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, contents).await.unwrap();
    path
}

#[tokio::test]
async fn minimal_get_generates_a_single_ping_tool() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "ping.json",
        r#"{
            "openapi": "3.0.0",
            "info": {"title": "Ping", "version": "1.0"},
            "paths": {
                "/ping": {
                    "get": {
                        "operationId": "ping",
                        "responses": {"200": {"description": "pong"}}
                    }
                }
            }
        }"#,
    )
    .await;

    let config = ForgeConfig::default();
    let (handle, report) = mcpforge_core::load_spec(&format!("file:{}", spec.to_str().unwrap()), &config)
        .await
        .unwrap();
    assert!(report.valid);

    let tools = mcpforge_core::map_operations(&handle, Some("https://api.example.com"));
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "ping");
    assert_eq!(tools[0].description, "Retrieve ping");
    assert_eq!(tools[0].input_schema["properties"], serde_json::json!({}));
    assert_eq!(tools[0].input_schema["required"], serde_json::json!([]));
}

#[tokio::test]
async fn path_query_and_body_are_all_mapped() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "users.json",
        r#"{
            "openapi": "3.0.0",
            "info": {"title": "Users", "version": "1.0"},
            "paths": {
                "/users/{id}": {
                    "post": {
                        "operationId": "updateUser",
                        "parameters": [
                            {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "verbose", "in": "query", "required": false, "schema": {"type": "boolean"}}
                        ],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {"name": {"type": "string"}},
                                        "required": ["name"]
                                    }
                                }
                            }
                        },
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            }
        }"#,
    )
    .await;

    let config = ForgeConfig::default();
    let (handle, report) = mcpforge_core::load_spec(&format!("file:{}", spec.to_str().unwrap()), &config)
        .await
        .unwrap();
    assert!(report.valid);

    let tools = mcpforge_core::map_operations(&handle, None);
    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    let required: Vec<String> = serde_json::from_value(tool.input_schema["required"].clone()).unwrap();
    assert!(required.contains(&"id".to_string()));
    assert!(required.contains(&"body".to_string()));
    assert!(tool.input_schema["properties"]["id"].is_object());
    assert!(tool.input_schema["properties"]["verbose"].is_object());
    assert!(tool.input_schema["properties"]["body"].is_object());
}

#[tokio::test]
async fn duplicate_operation_ids_produce_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "dup.json",
        r#"{
            "openapi": "3.0.0",
            "info": {"title": "Dup", "version": "1.0"},
            "paths": {
                "/a": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}},
                "/b": {"get": {"operationId": "get", "responses": {"200": {"description": "ok"}}}}
            }
        }"#,
    )
    .await;

    let output_dir = dir.path().join("out");
    let request = GenerationRequest {
        project_id: format!("proj-{}", uuid::Uuid::new_v4()),
        source: format!("file:{}", spec.to_str().unwrap()),
        output_dir: output_dir.to_str().unwrap().to_string(),
        package_name: "dup-server".to_string(),
        base_url: Some("https://api.example.com".to_string()),
        overwrite: false,
        template_set_id: None,
    };

    let (job_id, mut events) = orchestrator::start_generation(request, ForgeConfig::default()).unwrap();

    let mut failed_code = None;
    while let Ok(event) = events.recv().await {
        if let GenerationEvent::Failed { error, .. } = event {
            failed_code = Some(error.code);
            break;
        }
    }

    assert_eq!(failed_code.as_deref(), Some("SPEC_VALIDATION_ERROR"));
    assert!(!output_dir.exists());
    let job = orchestrator::get_job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Failed);
}

#[tokio::test]
async fn synthesized_name_for_missing_operation_id() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "profile.json",
        r#"{
            "openapi": "3.0.0",
            "info": {"title": "Profiles", "version": "1.0"},
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
    .await;

    let config = ForgeConfig::default();
    let (handle, report) = mcpforge_core::load_spec(&format!("file:{}", spec.to_str().unwrap()), &config)
        .await
        .unwrap();
    assert!(report.valid);
    let tools = mcpforge_core::map_operations(&handle, None);
    assert_eq!(tools[0].name, "getUsersIdProfile");
}

#[tokio::test]
async fn cancellation_mid_render_leaves_no_output_directory() {
    let dir = tempfile::tempdir().unwrap();

    let mut paths = serde_json::Map::new();
    for i in 0..200 {
        paths.insert(
            format!("/items/{i}"),
            serde_json::json!({
                "get": {
                    "operationId": format!("getItem{i}"),
                    "responses": {"200": {"description": "ok"}}
                }
            }),
        );
    }
    let spec_value = serde_json::json!({
        "openapi": "3.0.0",
        "info": {"title": "Bulk", "version": "1.0"},
        "paths": paths,
    });
    let spec = write_spec(dir.path(), "bulk.json", &spec_value.to_string()).await;

    let output_dir = dir.path().join("out");
    let request = GenerationRequest {
        project_id: format!("proj-{}", uuid::Uuid::new_v4()),
        source: format!("file:{}", spec.to_str().unwrap()),
        output_dir: output_dir.to_str().unwrap().to_string(),
        package_name: "bulk-server".to_string(),
        base_url: Some("https://api.example.com".to_string()),
        overwrite: false,
        template_set_id: None,
    };

    let (job_id, mut events) = orchestrator::start_generation(request, ForgeConfig::default()).unwrap();

    // Cancel right after the first progress event, per the scenario.
    let mut cancelled = false;
    loop {
        match events.recv().await {
            Ok(GenerationEvent::Progress { .. }) => {
                orchestrator::cancel_generation(&job_id).unwrap();
            }
            Ok(GenerationEvent::Cancelled { .. }) => {
                cancelled = true;
                break;
            }
            Ok(GenerationEvent::Completed { .. }) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    assert!(cancelled, "expected the job to observe cancellation before completing");
    assert!(!output_dir.exists());
}
