use std::time::Duration;

use tracing::{debug, info, warn};

use crate::completion::{Completer, DraftPayload, MustInclude};
use crate::compliance;
use crate::error::AppError;
use crate::extract::{fetch_page, html_to_text};
use crate::length::{char_count, enforce_length, hard_cap, LengthJob};
use crate::model::{CopyOptions, CopyResponse, GenerateJob, ReviewJob, ReviseJob, ReviseResponse};
use crate::prompts;
use crate::style::style_guide;

/// Where the first draft comes from.
enum Source {
    /// Fetch the page and ask the model for a draft.
    Page {
        name: String,
        url: String,
        must_words: Vec<String>,
    },
    /// The caller already has a draft.
    Text(String),
}

/// The copy pipeline shared by every endpoint.
#[derive(Clone)]
pub struct CopyPipeline {
    completer: Completer,
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl CopyPipeline {
    pub fn new(completer: Completer, http: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            completer,
            http,
            fetch_timeout,
        }
    }

    pub async fn generate(&self, job: GenerateJob) -> Result<CopyResponse, AppError> {
        let source = Source::Page {
            name: job.name,
            url: job.url,
            must_words: job.must_words,
        };
        self.run(source, &job.options).await
    }

    pub async fn review(&self, job: ReviewJob) -> Result<CopyResponse, AppError> {
        self.run(Source::Text(job.text), &job.options).await
    }

    /// Apply revision notes to finished copy without the drafting stages.
    pub async fn revise(&self, job: ReviseJob) -> Result<ReviseResponse, AppError> {
        let style = style_guide(job.tone);
        let mut text = compliance::enforce(&job.text);
        if !job.revision_notes.is_empty() {
            let revised = self
                .completer
                .apply_revisions(&text, &job.revision_notes, job.tone, style)
                .await?;
            text = compliance::enforce(&revised);
        }
        Ok(ReviseResponse {
            text: cap_if_over(text, job.range.max),
        })
    }

    async fn run(&self, source: Source, options: &CopyOptions) -> Result<CopyResponse, AppError> {
        let tone = options.tone;
        let range = options.range;
        let style = style_guide(tone);
        let references = &options.reference_examples;

        // Page text for a fetched source; the draft itself otherwise.
        let context = match &source {
            Source::Page { url, .. } => {
                let html = fetch_page(&self.http, url, self.fetch_timeout).await?;
                let text = html_to_text(&html);
                if text.is_empty() {
                    warn!(url = %url, "source page has no visible text");
                }
                text
            }
            Source::Text(text) => text.clone(),
        };

        let anchors = if references.is_empty() {
            String::new()
        } else {
            self.completer.style_anchors(references).await?
        };

        let draft = match source {
            Source::Page {
                name,
                url,
                must_words,
            } => {
                let payload = DraftPayload {
                    name: &name,
                    url: &url,
                    tone: tone.label(),
                    extracted_text: &context,
                    must_words: &must_words,
                    char_range: range,
                    must_include: MustInclude::default(),
                    do_not_include: prompts::DO_NOT_INCLUDE.to_vec(),
                };
                let system = prompts::draft_system(tone, style, &anchors, range);
                self.completer.draft(system, &payload).await?
            }
            Source::Text(text) => text,
        };
        debug!(chars = char_count(&draft), "draft ready");

        let styled = prompts::style_block(style, &anchors);

        let filtered = compliance::enforce(&draft);
        let sized = enforce_length(
            &self.completer,
            LengthJob {
                text: filtered,
                context: &context,
                tone,
                style: &styled,
                range,
            },
        )
        .await?;
        debug!(rewrites = sized.rewrites, status = ?sized.status, "length enforced");
        let checked = sized.text;

        let polished = self.completer.polish(&checked, tone, &styled).await?;
        let mut text = compliance::enforce(&polished);

        if options.beautify {
            let beautified = self.completer.beautify(&text, tone).await?;
            text = compliance::enforce(&beautified);
        }

        if !references.is_empty() {
            if let Some(rewrite) = self
                .completer
                .conformance(&text, references, tone, style, &anchors, range)
                .await?
            {
                info!("copy rewritten to match reference examples");
                text = compliance::enforce(&rewrite);
            }
        }

        if !options.revision_notes.is_empty() {
            let revised = self
                .completer
                .apply_revisions(&text, &options.revision_notes, tone, &styled)
                .await?;
            text = compliance::enforce(&revised);
        }

        let text = cap_if_over(text, range.max);
        info!(chars = char_count(&text), "copy finished");
        Ok(CopyResponse {
            text: text.clone(),
            draft,
            checked,
            final_text: text,
        })
    }
}

fn cap_if_over(text: String, max: usize) -> String {
    if char_count(&text) > max {
        hard_cap(&text, max)
    } else {
        text
    }
}
