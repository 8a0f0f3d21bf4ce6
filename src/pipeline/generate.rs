//! Slide-deck generation: run the external converter and watch it finish.
//!
//! PPTX authoring lives in a separate converter executable, not in this
//! crate. The converter receives the stored PDF, the analysis artifact, an
//! output path, and a log path, and owns everything document-related from
//! there (including any OCR it needs). This stage only launches it, keeps
//! the job's progress bar moving while it runs, and turns a non-zero exit
//! into a job error carrying the head of stderr.

use crate::error::ConvertError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Seconds between progress ticks while the converter runs.
///
/// The converter gives us no progress signal, so the bar advances on a
/// timer; the cap lives with the caller (see [`crate::job::progress`]).
pub const TICK_SECS: u64 = 2;

/// How much converter stderr to keep in the job's error message.
const STDERR_HEAD: usize = 500;

/// Run `command --pdf <pdf> --output <output> --json <artifact> --log <log>`.
///
/// `on_tick` fires every [`TICK_SECS`] while the child is still running.
pub async fn run_converter(
    command: &str,
    pdf: &Path,
    artifact: &Path,
    output: &Path,
    log: &Path,
    mut on_tick: impl FnMut(),
) -> Result<(), ConvertError> {
    info!(command, output = %output.display(), "Launching converter");

    let mut child = Command::new(command)
        .arg("--pdf")
        .arg(pdf)
        .arg("--output")
        .arg(output)
        .arg("--json")
        .arg(artifact)
        .arg("--log")
        .arg(log)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConvertError::ConverterSpawn {
            command: command.to_string(),
            source: e,
        })?;

    // Drain stderr concurrently; a chatty converter would otherwise fill the
    // pipe and deadlock against our wait loop.
    let mut stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(ref mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                on_tick();
                sleep(Duration::from_secs(TICK_SECS)).await;
            }
            Err(e) => {
                return Err(ConvertError::Internal(format!("Converter wait failed: {e}")));
            }
        }
    };

    let stderr_bytes = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let stderr_text = String::from_utf8_lossy(&stderr_bytes);
        let head: String = stderr_text.chars().take(STDERR_HEAD).collect();
        warn!(code = status.code(), "Converter failed");
        return Err(ConvertError::ConverterFailed {
            code: status.code().unwrap_or(-1),
            stderr: head,
        });
    }

    info!(output = %output.display(), "Converter finished");
    Ok(())
}
