//! Generation pipeline: resolve, build, dispatch, extract, persist.
//!
//! A [`GenerationPipeline`] is cheap to clone and every task runs on its own
//! thread. Completions are posted over a channel in whatever order they finish.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use banana_contracts::events::{EventPayload, EventWriter};
use banana_contracts::{ConnectionProfile, GenerationRequest, ProviderRegistry};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use uuid::Uuid;

use crate::debug::{mask_api_key, redacted, write_debug_payload};
use crate::error::GenerationError;
use crate::http::{create_client, DOWNLOAD_TIMEOUT, DOWNLOAD_USER_AGENT, GENERATION_TIMEOUT};
use crate::request::{build_request, WireRequest};
use crate::response::{extract_image, output_file_name, ExtractedImage};

/// Standard alphabet; padding optional since some providers strip it.
const INLINE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub generation_timeout: Duration,
    pub download_timeout: Duration,
    /// Appended to every prompt when set.
    pub system_instruction: Option<String>,
    /// JSONL ledger of generation events.
    pub events_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            generation_timeout: GENERATION_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
            system_instruction: None,
            events_path: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }
}

/// Name-to-profile lookup consumed by the pipeline.
pub trait ProfileSource: Send + Sync {
    fn profile(&self, name: &str) -> Option<ConnectionProfile>;
}

impl ProfileSource for ProviderRegistry {
    fn profile(&self, name: &str) -> Option<ConnectionProfile> {
        self.resolve(name).cloned()
    }
}

impl ProfileSource for Vec<ConnectionProfile> {
    fn profile(&self, name: &str) -> Option<ConnectionProfile> {
        self.iter().find(|profile| profile.name == name).cloned()
    }
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success(PathBuf),
    Failure(String),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success(path) => Some(path),
            Self::Failure(_) => None,
        }
    }
}

impl From<Result<PathBuf, GenerationError>> for GenerationOutcome {
    fn from(result: Result<PathBuf, GenerationError>) -> Self {
        match result {
            Ok(path) => Self::Success(path),
            Err(err) => Self::Failure(err.to_string()),
        }
    }
}

/// `prompt` followed by the system instruction block, or `prompt` alone.
pub fn compose_prompt(prompt: &str, system_instruction: Option<&str>) -> String {
    match system_instruction.map(str::trim).filter(|text| !text.is_empty()) {
        Some(instruction) => {
            format!("**USER INSTRUCTION:** {prompt}\n\n**SYSTEM INSTRUCTION:** \n{instruction}")
        }
        None => prompt.to_string(),
    }
}

#[derive(Clone)]
pub struct GenerationPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: PipelineConfig,
    profiles: Box<dyn ProfileSource>,
    client: Client,
    events: Option<EventWriter>,
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl GenerationPipeline {
    pub fn new(config: PipelineConfig, profiles: impl ProfileSource + 'static) -> anyhow::Result<Self> {
        let client = create_client()?;
        let events = config.events_path.clone().map(EventWriter::new);
        Ok(Self {
            inner: Arc::new(PipelineInner {
                config,
                profiles: Box::new(profiles),
                client,
                events,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        self.run_task(Uuid::new_v4(), request)
    }

    /// Runs `request` on a named thread and posts the outcome to `sender`.
    pub fn spawn(
        &self,
        task_id: Uuid,
        request: GenerationRequest,
        sender: mpsc::Sender<TaskCompletion>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        let pipeline = self.clone();
        thread::Builder::new()
            .name(format!("banana-generate-{}", task_id.simple()))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    pipeline.run_task(task_id, &request)
                }))
                .unwrap_or_else(|_| {
                    GenerationOutcome::Failure("Generation task panicked.".to_string())
                });
                // The receiver may already be gone; nothing is waiting then.
                let _ = sender.send(TaskCompletion { task_id, outcome });
            })
    }

    fn run_task(&self, task_id: Uuid, request: &GenerationRequest) -> GenerationOutcome {
        let task = task_id.to_string();
        let mut started = EventPayload::new();
        started.insert("provider".to_string(), Value::from(request.provider_name.clone()));
        started.insert("resolution".to_string(), Value::from(request.resolution.as_str()));
        started.insert("search_web".to_string(), Value::Bool(request.search_web));
        self.emit("generation_started", &task, started);

        let result = self.try_generate(request);
        let mut payload = EventPayload::new();
        payload.insert("provider".to_string(), Value::from(request.provider_name.clone()));
        match &result {
            Ok(path) => {
                tracing::info!(task_id = %task, path = %path.display(), "generation succeeded");
                payload.insert("path".to_string(), Value::from(path.display().to_string()));
                self.emit("generation_succeeded", &task, payload);
            }
            Err(err) => {
                tracing::warn!(task_id = %task, kind = err.kind(), error = %err, "generation failed");
                payload.insert("error_kind".to_string(), Value::from(err.kind()));
                payload.insert("error".to_string(), Value::from(err.to_string()));
                self.emit("generation_failed", &task, payload);
            }
        }
        GenerationOutcome::from(result)
    }

    /// One attempt end to end. Nothing is retried.
    pub fn try_generate(&self, request: &GenerationRequest) -> Result<PathBuf, GenerationError> {
        let profile = self
            .inner
            .profiles
            .profile(&request.provider_name)
            .ok_or_else(|| GenerationError::ProviderNotFound {
                name: request.provider_name.clone(),
            })?;
        if !profile.has_credentials() {
            return Err(GenerationError::Configuration);
        }

        let mut composed = request.clone();
        composed.prompt = compose_prompt(
            &request.prompt,
            self.inner.config.system_instruction.as_deref(),
        );
        let wire = build_request(&composed, &profile)?;
        tracing::info!(
            provider = %profile.name,
            dialect = %wire.dialect,
            url = %mask_api_key(&wire.url),
            "sending generation request"
        );
        if request.debug_mode {
            self.capture_debug_request(&wire);
        }

        let response = self.send(&wire)?;
        if request.debug_mode {
            tracing::info!(response = %pretty(&redacted(&response)), "provider response");
        }

        let image = extract_image(&response, wire.dialect)?;
        self.persist(&image)
    }

    fn capture_debug_request(&self, wire: &WireRequest) {
        tracing::info!(
            url = %mask_api_key(&wire.url),
            body = %pretty(&redacted(&wire.body)),
            "debug request payload"
        );
        match write_debug_payload(&self.inner.config.output_dir, &wire.body) {
            Ok(path) => tracing::info!(path = %path.display(), "debug payload saved"),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to save debug payload"),
        }
    }

    fn send(&self, wire: &WireRequest) -> Result<Value, GenerationError> {
        let mut builder = self
            .inner
            .client
            .post(&wire.url)
            .timeout(self.inner.config.generation_timeout);
        for (name, value) in &wire.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .json(&wire.body)
            .send()
            .map_err(GenerationError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        let text = response.text().map_err(GenerationError::Network)?;
        serde_json::from_str(&text).map_err(GenerationError::InvalidResponse)
    }

    fn persist(&self, image: &ExtractedImage) -> Result<PathBuf, GenerationError> {
        let output_dir = &self.inner.config.output_dir;
        fs::create_dir_all(output_dir)
            .map_err(|source| GenerationError::file_system(output_dir, source))?;

        let bytes = match image {
            ExtractedImage::Inline(data) => {
                let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                INLINE_BASE64
                    .decode(compact)
                    .map_err(GenerationError::InvalidImageData)?
            }
            ExtractedImage::Remote(url) => self.download(url)?,
        };
        if bytes.is_empty() {
            return Err(GenerationError::EmptyImage);
        }

        let stamp = chrono::Local::now().format("%Y%m%d%H%M").to_string();
        let path = output_dir.join(output_file_name(image, &stamp));
        // Staged then renamed so same-minute tasks never interleave bytes.
        let mut staged = tempfile::NamedTempFile::new_in(output_dir)
            .map_err(|source| GenerationError::file_system(output_dir, source))?;
        staged
            .write_all(&bytes)
            .map_err(|source| GenerationError::file_system(staged.path(), source))?;
        staged
            .persist(&path)
            .map_err(|err| GenerationError::file_system(&path, err.error))?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "image written");
        Ok(path)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        tracing::info!(url, "downloading generated image");
        let response = self
            .inner
            .client
            .get(url)
            .header(USER_AGENT, DOWNLOAD_USER_AGENT)
            .timeout(self.inner.config.download_timeout)
            .send()
            .map_err(|err| GenerationError::download(url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::download(url, format!("HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .map_err(|err| GenerationError::download(url, err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn emit(&self, event_type: &str, task_id: &str, payload: EventPayload) {
        let Some(events) = &self.inner.events else {
            return;
        };
        if let Err(err) = events.emit(event_type, task_id, payload) {
            tracing::warn!(event_type, error = %format!("{err:#}"), "failed to record generation event");
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task_id: Uuid,
    pub outcome: GenerationOutcome,
}

/// In-flight generation tasks keyed by id.
///
/// Completions are handed out in arrival order, which need not match the
/// order of submission. Dropping the set detaches any running threads.
#[derive(Debug)]
pub struct TaskSet {
    sender: mpsc::Sender<TaskCompletion>,
    receiver: mpsc::Receiver<TaskCompletion>,
    in_flight: HashMap<Uuid, thread::JoinHandle<()>>,
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSet {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            in_flight: HashMap::new(),
        }
    }

    pub fn submit(
        &mut self,
        pipeline: &GenerationPipeline,
        request: GenerationRequest,
    ) -> anyhow::Result<Uuid> {
        let task_id = Uuid::new_v4();
        let handle = pipeline
            .spawn(task_id, request, self.sender.clone())
            .map_err(|err| anyhow::anyhow!("generation thread spawn failed: {err}"))?;
        self.in_flight.insert(task_id, handle);
        Ok(task_id)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn contains(&self, task_id: &Uuid) -> bool {
        self.in_flight.contains_key(task_id)
    }

    /// Non-blocking poll.
    pub fn try_next(&mut self) -> Option<TaskCompletion> {
        let completion = self.receiver.try_recv().ok()?;
        Some(self.reap(completion))
    }

    /// Blocks until some task finishes. `None` once nothing is in flight.
    pub fn next_completion(&mut self) -> Option<TaskCompletion> {
        if self.in_flight.is_empty() {
            return None;
        }
        let completion = self.receiver.recv().ok()?;
        Some(self.reap(completion))
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<TaskCompletion> {
        if self.in_flight.is_empty() {
            return None;
        }
        let completion = self.receiver.recv_timeout(timeout).ok()?;
        Some(self.reap(completion))
    }

    fn reap(&mut self, completion: TaskCompletion) -> TaskCompletion {
        if let Some(handle) = self.in_flight.remove(&completion.task_id) {
            // The worker sends as its last action, so this join is immediate.
            let _ = handle.join();
        }
        completion
    }
}
