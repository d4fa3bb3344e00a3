use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::AppError;

/// Extracted page text is cut to this many characters before prompting.
pub const MAX_EXTRACTED_CHARS: usize = 40_000;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid regex"));
static NOSCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript\b[^>]*>.*?</noscript\s*>").expect("valid regex"));
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static SPACE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(?:nbsp|#160|ensp|emsp|thinsp);").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Reduce an HTML document to its visible text on a single line.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for block in [&*SCRIPT, &*STYLE, &*NOSCRIPT, &*COMMENT] {
        text = block.replace_all(&text, " ").into_owned();
    }
    text = TAG.replace_all(&text, " ").into_owned();
    text = SPACE_ENTITY.replace_all(&text, " ").into_owned();
    // `&amp;` last so `&amp;lt;` stays literal.
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let collapsed = WHITESPACE.replace_all(&text, " ");
    truncate_chars(collapsed.trim(), MAX_EXTRACTED_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// GET the source page and return its raw body.
pub async fn fetch_page(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, AppError> {
    let resp = http
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            warn!(url, error = %e, "source fetch failed");
            AppError::SourceFetch(e.to_string())
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::SourceFetch(format!("upstream returned {status}")));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| AppError::SourceFetch(format!("failed to read body: {e}")))?;
    debug!(url, bytes = body.len(), "fetched source page");
    Ok(body)
}
