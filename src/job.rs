//! Job records, the status state machine, and the shared in-memory store.
//!
//! A job is born at upload, is driven by exactly one background task at a
//! time, and is observed by the browser through one-second status polling.
//! The store is therefore written from three places — HTTP handlers, the
//! async runner, and the blocking render thread — which is why updates go
//! through a closure under a plain `std::sync::RwLock` rather than an async
//! lock: no update ever holds the lock across an await point.
//!
//! ## State machine
//!
//! ```text
//! pending ──▶ processing ──▶ analyzing ──▶ json_ready ──▶ generating ──▶ completed
//!     │            │             │              │              │
//!     └────────────┴─────────────┴──────────────┴──────────────┴──▶ error
//! ```
//!
//! JSON-mode jobs skip `analyzing`/`json_ready`: the artifact arrives with
//! the upload, so `processing` moves straight to `generating`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Progress anchors for the linear progress bar, in percent.
///
/// The frontend renders progress as a single 0–100 bar; each phase owns a
/// fixed slice so the bar never moves backwards when a phase hands over.
pub mod progress {
    /// Set when processing starts.
    pub const START: u8 = 5;
    /// End of the rasterisation phase.
    pub const RENDER_END: u8 = 20;
    /// End of the analysis phase; the value a job parks at in `json_ready`.
    pub const ANALYZE_END: u8 = 60;
    /// Ceiling for the generation ticker; 100 is reserved for `completed`.
    pub const GENERATE_CAP: u8 = 98;
    /// A finished job.
    pub const DONE: u8 = 100;
}

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Upload accepted, processing not yet requested.
    Pending,
    /// Background task started; PDF is being rasterised.
    Processing,
    /// Page images are being analysed by the AI API.
    Analyzing,
    /// Analysis artifact written; waiting for the user to download it and
    /// request continuation.
    JsonReady,
    /// The converter subprocess is producing the PPTX.
    Generating,
    /// PPTX available for download.
    Completed,
    /// The job failed; `message` carries the reason.
    Error,
}

impl JobStatus {
    /// Whether the job can never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// `Error` is reachable from any non-terminal state; `Processing` may
    /// jump straight to `Generating` (JSON-mode jobs have no analysis phase).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Error) => true,
            (Pending, Processing) => true,
            (Processing, Analyzing) => true,
            (Processing, Generating) => true,
            (Analyzing, JsonReady) => true,
            (JsonReady, Generating) => true,
            (Generating, Completed) => true,
            _ => false,
        }
    }

    /// The snake_case wire name, as seen by the polling frontend.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Analyzing => "analyzing",
            JobStatus::JsonReady => "json_ready",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

/// Which analysis path the job takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Rasterise and analyse the PDF via the AI API.
    #[default]
    Normal,
    /// Re-use an uploaded analysis artifact; no API calls.
    Json,
}

impl AnalysisMode {
    /// Parse the wire value from the upload form. Unknown values fall back
    /// to `Normal`, matching the form's default.
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => AnalysisMode::Json,
            _ => AnalysisMode::Normal,
        }
    }
}

/// Which converter command produces the PPTX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterMode {
    /// Layout-faithful converter (the default).
    #[default]
    Precision,
    /// Conservative converter that trades fidelity for robustness on
    /// malformed input.
    Safeguard,
}

impl ConverterMode {
    /// Parse the wire value from the upload form; unknown values fall back
    /// to `Precision`.
    pub fn parse(s: &str) -> Self {
        match s {
            "safeguard" => ConverterMode::Safeguard,
            _ => ConverterMode::Precision,
        }
    }
}

/// One conversion job.
///
/// Filesystem paths are bookkeeping for the background tasks and are not
/// serialized — the polling API exposes state, progress, and filenames only.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Linear progress, 0–100. See [`progress`] for the phase anchors.
    pub progress: u8,
    /// Human-readable status line shown by the frontend.
    pub message: String,
    pub mode: AnalysisMode,
    pub converter_mode: ConverterMode,
    /// Filename of the uploaded PDF, as sent by the browser.
    pub original_filename: String,
    pub total_pages: usize,
    pub current_page: usize,
    /// First-page dimensions in PDF points, captured during rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_height: Option<f32>,
    /// Download filename of the finished PPTX (`<stem>.pptx`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    pub created_at: DateTime<Utc>,

    // Bookkeeping, not exposed over the API.
    #[serde(skip)]
    pub job_dir: PathBuf,
    #[serde(skip)]
    pub pdf_path: PathBuf,
    #[serde(skip)]
    pub json_path: Option<PathBuf>,
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
}

impl Job {
    /// Create a freshly-uploaded job in `Pending`.
    pub fn new(
        id: Uuid,
        mode: AnalysisMode,
        converter_mode: ConverterMode,
        original_filename: String,
        job_dir: PathBuf,
        pdf_path: PathBuf,
        json_path: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            message: "Files uploaded successfully".into(),
            mode,
            converter_mode,
            original_filename,
            total_pages: 0,
            current_page: 0,
            page_width: None,
            page_height: None,
            output_filename: None,
            created_at: Utc::now(),
            job_dir,
            pdf_path,
            json_path,
            output_path: None,
        }
    }

    /// The stem of the uploaded filename, used to derive download names.
    pub fn filename_stem(&self) -> &str {
        let name = &self.original_filename;
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Mark the job failed. Progress resets to zero so the frontend's bar
    /// visibly distinguishes an error from a stall.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.message = message.into();
        self.progress = 0;
    }
}

/// Shared map of live jobs, keyed by id.
///
/// Cheaply cloneable; every clone observes the same jobs.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job.
    pub fn insert(&self, job: Job) {
        self.jobs.write().unwrap().insert(job.id, job);
    }

    /// A point-in-time copy of the job, or `None` if unknown.
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().unwrap().get(&id).cloned()
    }

    /// Apply `f` to the job under the write lock.
    ///
    /// Returns `false` if the job is unknown (e.g. deleted mid-run); the
    /// runner treats that as a cancel signal.
    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Transition the job's status, enforcing the state machine.
    ///
    /// Returns the previous status on success, `None` if the job is unknown
    /// or the transition is illegal.
    pub fn transition(&self, id: Uuid, next: JobStatus) -> Option<JobStatus> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id)?;
        if !job.status.can_transition_to(next) {
            return None;
        }
        let prev = job.status;
        job.status = next;
        Some(prev)
    }

    /// Remove the job record. Returns the removed job, if any.
    pub fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().unwrap().remove(&id)
    }

    /// Number of live jobs (for the health endpoint).
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
