//! C8 Job Registry: tracks in-flight and recent generation jobs and
//! enforces the per-project single-active-job rule. Process-wide, mutex
//! protected, exactly the shape of the teacher's global handler registry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::model::{GenerationJob, JobState};

struct RegistryState {
    /// projectId -> jobId of the currently running job for that project.
    running_by_project: HashMap<String, String>,
    jobs: HashMap<String, GenerationJob>,
    /// terminal job ids in completion order, bounded to config's history size.
    history: VecDeque<String>,
    history_cap: usize,
}

impl RegistryState {
    fn new() -> Self {
        RegistryState {
            running_by_project: HashMap::new(),
            jobs: HashMap::new(),
            history: VecDeque::new(),
            history_cap: 100,
        }
    }
}

static REGISTRY: Lazy<Arc<Mutex<RegistryState>>> =
    Lazy::new(|| Arc::new(Mutex::new(RegistryState::new())));

/// Registers a new job in `queued` state. Rejects with
/// `GENERATION_IN_PROGRESS` if the project already has a running job (I4).
pub fn submit(job: GenerationJob) -> Result<()> {
    let mut state = REGISTRY.lock().expect("job registry mutex poisoned");
    if state.running_by_project.contains_key(&job.project_id) {
        return Err(Error::GenerationInProgress(job.project_id.clone()));
    }
    state.jobs.insert(job.id.clone(), job);
    Ok(())
}

pub fn transition_running(job_id: &str) -> Result<()> {
    let mut state = REGISTRY.lock().expect("job registry mutex poisoned");
    let project_id = {
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| Error::SpecValidationError(format!("unknown job {job_id}")))?;
        job.project_id.clone()
    };
    if state.running_by_project.contains_key(&project_id) {
        return Err(Error::GenerationInProgress(project_id));
    }
    state.running_by_project.insert(project_id, job_id.to_string());
    if let Some(job) = state.jobs.get_mut(job_id) {
        job.state = JobState::Running;
        job.started_at = Some(chrono::Utc::now());
    }
    Ok(())
}

pub fn finish(job_id: &str, state_after: JobState, job: GenerationJob) {
    let mut state = REGISTRY.lock().expect("job registry mutex poisoned");
    state.running_by_project.remove(&job.project_id);
    state.jobs.insert(job_id.to_string(), job);
    state.history.push_back(job_id.to_string());
    while state.history.len() > state.history_cap {
        if let Some(old) = state.history.pop_front() {
            state.jobs.remove(&old);
        }
    }
    debug_assert!(matches!(
        state_after,
        JobState::Succeeded | JobState::Failed | JobState::Cancelled
    ));
}

pub fn get(job_id: &str) -> Option<GenerationJob> {
    let state = REGISTRY.lock().expect("job registry mutex poisoned");
    state.jobs.get(job_id).cloned()
}

pub fn update(job_id: &str, mutate: impl FnOnce(&mut GenerationJob)) {
    let mut state = REGISTRY.lock().expect("job registry mutex poisoned");
    if let Some(job) = state.jobs.get_mut(job_id) {
        mutate(job);
    }
}

pub fn set_history_cap(cap: usize) {
    let mut state = REGISTRY.lock().expect("job registry mutex poisoned");
    state.history_cap = cap;
}
