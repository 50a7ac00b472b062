//! C6 Generation Orchestrator: drives one job end-to-end (Loader ->
//! Normalizer -> Validator -> Mapper -> Template Engine -> Writer), emits
//! progress events, and enforces cancellation and per-stage timeouts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ForgeConfig;
use crate::error::{Error, ErrorDiagnostic, Result, Stage};
use crate::events::{channel, GenerationEvent};
use crate::model::{GenerationContext, GenerationJob, GenerationRequest, JobState};
use crate::{loader, mapper, normalizer, registry, template, validator, writer};

static CANCEL_TOKENS: Lazy<Arc<Mutex<HashMap<String, CancellationToken>>>> =
    Lazy::new(|| Arc::new(Mutex::new(HashMap::new())));

const STAGES: [Stage; 6] = [
    Stage::Load,
    Stage::Normalize,
    Stage::Validate,
    Stage::Map,
    Stage::Render,
    Stage::Write,
];

/// `StartGeneration`: validates the per-project single-active-job rule,
/// registers the job, and spawns its worker task. Returns immediately with
/// the job id and an event receiver.
pub fn start_generation(
    request: GenerationRequest,
    config: ForgeConfig,
) -> Result<(String, tokio::sync::broadcast::Receiver<GenerationEvent>)> {
    registry::set_history_cap(config.job_history_size);

    let job_id = uuid::Uuid::new_v4().to_string();
    let job = GenerationJob::new(job_id.clone(), request.project_id.clone());
    registry::submit(job)?;

    let (tx, rx) = channel(64);
    let cancel = CancellationToken::new();
    CANCEL_TOKENS
        .lock()
        .expect("cancel token map poisoned")
        .insert(job_id.clone(), cancel.clone());

    let job_id_for_task = job_id.clone();
    tokio::spawn(async move {
        run_job(job_id_for_task, request, config, tx, cancel).await;
    });

    Ok((job_id, rx))
}

/// `CancelGeneration`: signals the job's cancellation token. The worker
/// observes it at the next stage boundary or inside the loader/writer's
/// cooperative checks.
pub fn cancel_generation(job_id: &str) -> Result<()> {
    let tokens = CANCEL_TOKENS.lock().expect("cancel token map poisoned");
    match tokens.get(job_id) {
        Some(token) => {
            token.cancel();
            Ok(())
        }
        None => Err(Error::SpecValidationError(format!("unknown job {job_id}"))),
    }
}

pub fn get_job(job_id: &str) -> Result<GenerationJob> {
    registry::get(job_id).ok_or_else(|| Error::SpecValidationError(format!("unknown job {job_id}")))
}

async fn run_job(
    job_id: String,
    request: GenerationRequest,
    config: ForgeConfig,
    tx: tokio::sync::broadcast::Sender<GenerationEvent>,
    cancel: CancellationToken,
) {
    if let Err(e) = registry::transition_running(&job_id) {
        let diag = e.to_diagnostic(Stage::Load);
        let _ = tx.send(GenerationEvent::Failed {
            job_id: job_id.clone(),
            error: diag,
        });
        return;
    }

    registry::update(&job_id, |job| {
        job.state = JobState::Running;
        job.current_step = Stage::Load.label().to_string();
    });
    info!(job_id = %job_id, "generation:started");
    let _ = tx.send(GenerationEvent::Started {
        job_id: job_id.clone(),
    });

    match run_pipeline(&job_id, &request, &config, &tx, &cancel).await {
        Ok(output) => {
            info!(job_id = %job_id, "generation:completed");
            registry::update(&job_id, |job| {
                job.state = JobState::Succeeded;
                job.progress = 1.0;
                job.ended_at = Some(chrono::Utc::now());
                job.output = Some(output.clone());
            });
            if let Some(job) = registry::get(&job_id) {
                registry::finish(&job_id, JobState::Succeeded, job);
            }
            let _ = tx.send(GenerationEvent::Completed {
                job_id: job_id.clone(),
                output,
            });
        }
        Err(Error::Cancelled) => {
            warn!(job_id = %job_id, "generation:cancelled");
            registry::update(&job_id, |job| {
                job.state = JobState::Cancelled;
                job.ended_at = Some(chrono::Utc::now());
            });
            if let Some(job) = registry::get(&job_id) {
                registry::finish(&job_id, JobState::Cancelled, job);
            }
            let _ = tx.send(GenerationEvent::Cancelled {
                job_id: job_id.clone(),
            });
        }
        Err(e) => {
            let stage = current_stage(&job_id);
            let diag: ErrorDiagnostic = e.to_diagnostic(stage);
            error!(job_id = %job_id, code = %diag.code, "generation:failed");
            registry::update(&job_id, |job| {
                job.state = JobState::Failed;
                job.ended_at = Some(chrono::Utc::now());
                job.error = Some(diag.clone());
            });
            if let Some(job) = registry::get(&job_id) {
                registry::finish(&job_id, JobState::Failed, job);
            }
            let _ = tx.send(GenerationEvent::Failed {
                job_id: job_id.clone(),
                error: diag,
            });
        }
    }

    CANCEL_TOKENS
        .lock()
        .expect("cancel token map poisoned")
        .remove(&job_id);
}

fn current_stage(job_id: &str) -> Stage {
    registry::get(job_id)
        .and_then(|j| {
            STAGES
                .iter()
                .find(|s| s.label() == j.current_step)
                .copied()
        })
        .unwrap_or(Stage::Load)
}

async fn run_pipeline(
    job_id: &str,
    request: &GenerationRequest,
    config: &ForgeConfig,
    tx: &tokio::sync::broadcast::Sender<GenerationEvent>,
    cancel: &CancellationToken,
) -> Result<crate::model::OutputDescriptor> {
    let total = STAGES.len() as f32;

    emit_progress(job_id, tx, Stage::Load, 0, total);
    check_cancelled(cancel).await?;
    let loaded = with_timeout(config, Stage::Load, cancel, loader::load(&request.source, config, cancel)).await?;

    emit_progress(job_id, tx, Stage::Normalize, 1, total);
    check_cancelled(cancel).await?;
    let normalized = with_timeout(config, Stage::Normalize, cancel, async {
        normalizer::normalize(&loaded.value)
    })
    .await?;

    emit_progress(job_id, tx, Stage::Validate, 2, total);
    check_cancelled(cancel).await?;
    let report = with_timeout(config, Stage::Validate, cancel, async {
        Ok(validator::validate(&normalized))
    })
    .await?;

    for diagnostic in &report.warnings {
        warn!(job_id = %job_id, code = %diagnostic.code, "{}", diagnostic.message);
    }

    if !report.valid {
        return Err(Error::SpecValidationError(
            report
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "validation failed".to_string()),
        ));
    }

    emit_progress(job_id, tx, Stage::Map, 3, total);
    check_cancelled(cancel).await?;
    let base_url = request
        .base_url
        .clone()
        .or_else(|| report.spec_info.servers.first().cloned())
        .unwrap_or_default();
    let map_outcome = with_timeout(config, Stage::Map, cancel, async {
        Ok(mapper::map_operations(
            &normalized.operations,
            &normalized.schema_defs,
            &base_url,
        ))
    })
    .await?;

    for (code, message) in &map_outcome.warnings {
        warn!(job_id = %job_id, code = %code, "{}", message);
    }

    emit_progress(job_id, tx, Stage::Render, 4, total);
    check_cancelled(cancel).await?;
    let context = GenerationContext {
        package_name: request.package_name.clone(),
        spec_title: report.spec_info.title.clone(),
        base_url: base_url.clone(),
        tools: map_outcome.tools,
        generated_at: chrono::Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let source_hash = writer::hash_bytes(&loaded.source_bytes);
    let artifacts = with_timeout(config, Stage::Render, cancel, async {
        render_artifacts(&context, &source_hash)
    })
    .await?;

    emit_progress(job_id, tx, Stage::Write, 5, total);
    check_cancelled(cancel).await?;
    let descriptor = with_timeout(
        config,
        Stage::Write,
        cancel,
        writer::write_all(&request.output_dir, &artifacts, request.overwrite, cancel),
    )
    .await?;

    Ok(descriptor)
}

fn render_artifacts(
    context: &GenerationContext,
    source_hash: &str,
) -> Result<Vec<crate::model::Artifact>> {
    let template_ctx = template::build_context(context, source_hash);

    let server_source = template::render("server_source", template::server_source(), &template_ctx)?;
    let server_tests = template::render("server_tests", template::server_tests(), &template_ctx)?;
    let readme = template::render("readme", template::readme(), &template_ctx)?;
    let manifest = template::render("manifest", template::manifest(), &template_ctx)?;
    let cargo_manifest = template::render("cargo_manifest", template::cargo_manifest(), &template_ctx)?;

    Ok(vec![
        writer::make_artifact("src/main.rs", server_source.into_bytes()),
        writer::make_artifact("tests/generated_tools.rs", server_tests.into_bytes()),
        writer::make_artifact("README.md", readme.into_bytes()),
        writer::make_artifact("manifest.json", manifest.into_bytes()),
        writer::make_artifact("Cargo.toml", cargo_manifest.into_bytes()),
    ])
}

fn emit_progress(
    job_id: &str,
    tx: &tokio::sync::broadcast::Sender<GenerationEvent>,
    stage: Stage,
    index: usize,
    total: f32,
) {
    let fraction = index as f32 / total;
    registry::update(job_id, |job| {
        job.current_step = stage.label().to_string();
        job.progress = fraction;
    });
    let _ = tx.send(GenerationEvent::Progress {
        job_id: job_id.to_string(),
        step: stage.label().to_string(),
        fraction,
    });
}

async fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    // Yield once so a concurrently issued cancellation (or a scheduler
    // running other tasks) gets a chance to land before the next stage's
    // CPU-bound work starts.
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

async fn with_timeout<F, T>(
    config: &ForgeConfig,
    stage: Stage,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(config.stage_timeout(stage), fut) => {
            match result {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout {
                    stage,
                    elapsed: config.stage_timeout(stage),
                }),
            }
        }
    }
}
