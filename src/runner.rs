//! Background task bodies: one task drives one job.
//!
//! HTTP handlers spawn these via `tokio::spawn` and return immediately; the
//! browser observes progress through the polling endpoint. Each task is a
//! thin orchestrator over the pipeline stages, translating stage progress
//! into job-record updates.
//!
//! Failure handling mirrors the service's contract: any fatal error marks
//! the job `error` with the message and resets progress; the record itself
//! is never removed here (the user reads the error from the status poll and
//! deletes the job explicitly). A job deleted mid-run simply stops receiving
//! updates — `JobStore::update` returning `false` is the cancel signal.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::gemini::GeminiClient;
use crate::job::{progress, JobStatus, JobStore};
use crate::pipeline::{analyze, generate, render};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Artifact filename inside the job directory.
pub const ARTIFACT_FILENAME: &str = "image_analysis.json";
/// Converter log filename inside the job directory.
pub const CONVERTER_LOG_FILENAME: &str = "conversion_log.txt";

/// Drive a normal-mode job from `processing` to `json_ready`.
///
/// Renders the PDF, analyses every page, writes the artifact, then parks the
/// job for the user to download the JSON and request continuation.
pub async fn run_analysis(store: JobStore, config: Arc<ServiceConfig>, job_id: Uuid) {
    if let Err(e) = try_run_analysis(&store, &config, job_id).await {
        error!(%job_id, error = %e, "Analysis task failed");
        store.update(job_id, |job| job.fail(e.to_string()));
    }
}

async fn try_run_analysis(
    store: &JobStore,
    config: &ServiceConfig,
    job_id: Uuid,
) -> Result<(), ConvertError> {
    let job = store.get(job_id).ok_or(ConvertError::JobNotFound(job_id))?;
    let client = GeminiClient::from_config(config)?;

    // ── Step 1: Rasterise pages ──────────────────────────────────────────
    store.update(job_id, |job| {
        job.message = "Converting PDF to images...".into();
    });

    let pages_dir = job.job_dir.join("pages");
    let progress_store = store.clone();
    let rendered = render::render_pdf_pages(
        &job.pdf_path,
        &pages_dir,
        config.render_scale,
        config.max_rendered_pixels,
        move |page, total| {
            progress_store.update(job_id, |job| {
                job.total_pages = total;
                job.current_page = page;
                job.progress = render_progress(page, total);
            });
        },
    )
    .await?;

    info!(%job_id, pages = rendered.total_pages, "Rendered PDF");
    let alive = store.update(job_id, |job| {
        job.total_pages = rendered.total_pages;
        job.page_width = Some(rendered.page_width);
        job.page_height = Some(rendered.page_height);
    });
    if !alive {
        info!(%job_id, "Job deleted during rendering; stopping");
        return Ok(());
    }

    // ── Step 2: Analyse pages with the AI API ────────────────────────────
    if store.transition(job_id, JobStatus::Analyzing).is_none() {
        return Ok(());
    }
    store.update(job_id, |job| {
        job.message = "Analyzing page content with AI...".into();
    });

    let progress_store = store.clone();
    let doc = analyze::analyze_pages(
        &client,
        &pages_dir,
        rendered.total_pages,
        config,
        move |page, total| {
            progress_store.update(job_id, |job| {
                job.current_page = page;
                job.progress = analyze_progress(page, total);
                job.message = format!("Analyzing page {page}/{total}...");
            });
        },
    )
    .await?;

    // ── Step 3: Write the artifact and park at json_ready ────────────────
    let json_path = job.job_dir.join(ARTIFACT_FILENAME);
    let bytes = serde_json::to_vec_pretty(&doc)
        .map_err(|e| ConvertError::Internal(format!("Artifact serialisation: {e}")))?;
    tokio::fs::write(&json_path, bytes)
        .await
        .map_err(|e| ConvertError::io(&json_path, e))?;

    if store.transition(job_id, JobStatus::JsonReady).is_none() {
        return Ok(());
    }
    store.update(job_id, |job| {
        job.json_path = Some(json_path);
        job.progress = progress::ANALYZE_END;
        job.message = "JSON analysis complete. Please download the JSON file and click 'Continue' to generate PPTX.".into();
    });

    info!(%job_id, "Analysis complete; waiting for continuation");
    Ok(())
}

/// Drive a job through PPTX generation to `completed`.
///
/// Used both for JSON-mode jobs (straight after upload) and for normal-mode
/// jobs continuing from `json_ready`.
pub async fn run_generation(store: JobStore, config: Arc<ServiceConfig>, job_id: Uuid) {
    if let Err(e) = try_run_generation(&store, &config, job_id).await {
        error!(%job_id, error = %e, "Generation task failed");
        store.update(job_id, |job| job.fail(e.to_string()));
    }
}

async fn try_run_generation(
    store: &JobStore,
    config: &ServiceConfig,
    job_id: Uuid,
) -> Result<(), ConvertError> {
    let job = store.get(job_id).ok_or(ConvertError::JobNotFound(job_id))?;
    let artifact = job
        .json_path
        .clone()
        .ok_or_else(|| ConvertError::Internal("No analysis artifact for generation".into()))?;

    // JSON-mode jobs arrive here in `processing`; continued jobs are already
    // `generating` (set by the continue endpoint).
    if job.status == JobStatus::Processing && store.transition(job_id, JobStatus::Generating).is_none() {
        return Ok(());
    }

    let output_filename = format!("{}.pptx", job.filename_stem());
    let output_path = config
        .output_dir
        .join(format!("{}_{}", job_id, output_filename));
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| ConvertError::io(&config.output_dir, e))?;

    store.update(job_id, |job| {
        job.message = "Generating PowerPoint...".into();
        job.progress = job.progress.max(progress::ANALYZE_END);
    });

    let command = match job.converter_mode {
        crate::job::ConverterMode::Precision => &config.converter_precision,
        crate::job::ConverterMode::Safeguard => &config.converter_safeguard,
    };
    let log_path = job.job_dir.join(CONVERTER_LOG_FILENAME);

    let tick_store = store.clone();
    generate::run_converter(
        command,
        &job.pdf_path,
        &artifact,
        &output_path,
        &log_path,
        move || {
            tick_store.update(job_id, |job| {
                job.progress = (job.progress + 1).min(progress::GENERATE_CAP);
            });
        },
    )
    .await?;

    if store.transition(job_id, JobStatus::Completed).is_none() {
        return Ok(());
    }
    store.update(job_id, |job| {
        job.progress = progress::DONE;
        job.message = "Conversion completed!".into();
        job.output_path = Some(output_path.clone());
        job.output_filename = Some(output_filename.clone());
    });

    info!(%job_id, "Generation complete");
    Ok(())
}

/// Progress within the rendering slice (5→20).
fn render_progress(page: usize, total: usize) -> u8 {
    let span = (progress::RENDER_END - progress::START) as usize;
    progress::START + (page * span / total.max(1)) as u8
}

/// Progress within the analysis slice (20→60).
fn analyze_progress(page: usize, total: usize) -> u8 {
    let span = (progress::ANALYZE_END - progress::RENDER_END) as usize;
    progress::RENDER_END + (page * span / total.max(1)) as u8
}
