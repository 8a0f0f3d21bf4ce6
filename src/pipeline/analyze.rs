//! AI page analysis: drive the Gemini call per page and assemble the
//! analysis artifact.
//!
//! This stage is intentionally forgiving. A transient API error or an
//! unparseable reply for one page must not lose a 60-page document, so every
//! per-page failure is absorbed into a visible placeholder block (see
//! [`PageAnalysis::placeholder`]) and the loop continues. Only the artifact
//! write itself can fail the job.
//!
//! Pages are analysed sequentially with a fixed delay between calls: the
//! free Gemini tier rate-limits per minute, and a deck's pages arrive at the
//! API far faster than the quota refills.

use crate::analysis::{DocumentAnalysis, PageAnalysis};
use crate::config::ServiceConfig;
use crate::error::{ConvertError, PageFailure};
use crate::gemini::GeminiClient;
use crate::pipeline::encode;
use crate::prompts::PAGE_ANALYSIS_PROMPT;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Analyse every rendered page and return the assembled artifact.
///
/// `on_page(page_num, total)` fires after each page completes (success or
/// placeholder).
pub async fn analyze_pages(
    client: &GeminiClient,
    pages_dir: &Path,
    total_pages: usize,
    config: &ServiceConfig,
    mut on_page: impl FnMut(usize, usize),
) -> Result<DocumentAnalysis, ConvertError> {
    let mut doc = DocumentAnalysis::new();

    for page in 1..=total_pages {
        let analysis = match analyze_one_page(client, pages_dir, page, config).await {
            Ok(analysis) => analysis,
            Err(failure) => {
                warn!(page, error = %failure, "Page analysis failed; substituting placeholder");
                PageAnalysis::placeholder(page, &failure)
            }
        };
        doc.insert_page(page, analysis);
        on_page(page, total_pages);

        if page < total_pages && config.page_delay_ms > 0 {
            sleep(Duration::from_millis(config.page_delay_ms)).await;
        }
    }

    Ok(doc)
}

/// Analyse a single page. Every failure is page-local.
async fn analyze_one_page(
    client: &GeminiClient,
    pages_dir: &Path,
    page: usize,
    config: &ServiceConfig,
) -> Result<PageAnalysis, PageFailure> {
    let png_path = pages_dir.join(format!("page_{page}.png"));

    let png_base64 = encode::encode_page_base64(&png_path)
        .await
        .map_err(|e| PageFailure::ApiFailed {
            page,
            retries: 0,
            detail: e.to_string(),
        })?;

    let reply = client
        .generate_from_image(PAGE_ANALYSIS_PROMPT, &png_base64)
        .await
        .map_err(|e| PageFailure::ApiFailed {
            page,
            retries: config.max_retries,
            detail: e.to_string(),
        })?;

    parse_page_reply(page, &reply)
}

/// Parse a model reply into a [`PageAnalysis`].
///
/// Logs the head of the reply on failure so a misbehaving prompt/model pair
/// can be diagnosed from the service log alone.
pub fn parse_page_reply(page: usize, reply: &str) -> Result<PageAnalysis, PageFailure> {
    let payload = extract_json_payload(reply);
    match serde_json::from_str::<PageAnalysis>(payload) {
        Ok(analysis) => {
            debug!(page, blocks = analysis.blocks.len(), "Page analysed");
            Ok(analysis)
        }
        Err(e) => {
            warn!(
                page,
                error = %e,
                head = reply_head(reply, 500),
                "Unparseable model reply"
            );
            Err(PageFailure::BadReply {
                page,
                detail: e.to_string(),
            })
        }
    }
}

/// First `max` characters of a reply, respecting char boundaries.
fn reply_head(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// Models occasionally wrap the reply in ```json fences despite the prompt
// forbidding commentary; accept fenced and bare replies alike.
static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n?```").unwrap());

/// Strip surrounding code fences from a model reply, if present.
pub fn extract_json_payload(reply: &str) -> &str {
    match RE_JSON_FENCE.captures(reply) {
        Some(caps) => caps.get(1).map(|m| m.as_str().trim()).unwrap_or(""),
        None => reply.trim(),
    }
}
