//! One authenticated page driven like a user would
//!
//! Submits a question through the chat UI, waits for the streamed answer
//! to settle, and extracts its text plus any cited papers.

use crate::browser::completion::{self, Baseline, CompletionOutcome};
use crate::browser::{ElementHandle, ElementRole, Locator, PageDriver, PageError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;

/// Default assistant entry point.
pub const DEFAULT_ENTRY_URL: &str = "https://www.alphaxiv.org/assistant";

/// Text of an extraction that found neither containers nor a main region.
pub const NO_RESPONSE: &str = "[No response found]";

/// Errors from driving the conversation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(
        "could not find chat input on {url}; run `rv login` to authenticate or check {}",
        .snapshot.display()
    )]
    ChatInterfaceNotFound { url: String, snapshot: PathBuf },

    #[error("could not find input box; run `rv login` first")]
    InputNotFound,

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// A cited paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperReference {
    pub title: String,
    pub url: String,
    /// Normalized external identifier, e.g. `2401.01234`
    pub arxiv_id: String,
}

impl PaperReference {
    /// Build a reference from a link, or `None` when the URL carries no
    /// recognizable identifier.
    pub fn from_link(href: &str, text: &str) -> Option<Self> {
        let arxiv_id = paper_identifier(href)?;
        let title = match text.trim() {
            "" => format!("Paper {}", arxiv_id),
            t => t.to_string(),
        };
        Some(Self {
            title,
            url: href.to_string(),
            arxiv_id,
        })
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:arxiv|alphaxiv)\.org/abs/(\d+\.\d+)").expect("identifier pattern is valid")
    })
}

/// Extract the paper identifier from a link URL.
pub fn paper_identifier(href: &str) -> Option<String> {
    identifier_pattern()
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Keep the first reference for each identifier, preserving order.
pub fn dedup_references(references: impl IntoIterator<Item = PaperReference>) -> Vec<PaperReference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|r| seen.insert(r.arxiv_id.clone()))
        .collect()
}

/// One extracted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub text: String,
    #[serde(rename = "papers")]
    pub references: Vec<PaperReference>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_markup: Option<String>,
    /// Set when the question failed and `text` describes the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerRecord {
    pub fn new(text: impl Into<String>, references: Vec<PaperReference>) -> Self {
        Self {
            text: text.into(),
            references,
            timestamp: Utc::now(),
            raw_markup: None,
            error: None,
        }
    }

    /// The record kept for a question that failed.
    pub fn failed(error: &dyn std::fmt::Display) -> Self {
        let message = error.to_string();
        Self {
            error: Some(message.clone()),
            ..Self::new(format!("[Error: {}]", message), Vec::new())
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Timing and location settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub entry_url: String,
    /// Where diagnostic screenshots are written
    pub diagnostics_dir: PathBuf,
    /// Input lookup budget on a fresh page load
    pub startup_timeout: Duration,
    /// Input lookup budget before each submission
    pub input_timeout: Duration,
    /// Completion budget when the caller doesn't give one
    pub response_timeout: Duration,
    /// Pause after navigation before looking for the input
    pub load_settle: Duration,
}

impl SessionConfig {
    pub fn new(diagnostics_dir: impl Into<PathBuf>) -> Self {
        Self {
            entry_url: DEFAULT_ENTRY_URL.to_string(),
            diagnostics_dir: diagnostics_dir.into(),
            startup_timeout: Duration::from_secs(30),
            input_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(120),
            load_settle: Duration::from_secs(2),
        }
    }

    pub fn with_entry_url(mut self, url: impl Into<String>) -> Self {
        self.entry_url = url.into();
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Host part of the entry URL, used to tell whether the page wandered off.
    fn host(&self) -> &str {
        let rest = self
            .entry_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.entry_url);
        rest.split('/').next().unwrap_or(rest)
    }
}

/// Owns one page session for its whole life. Close it with `close()`.
pub struct ConversationSession<D: PageDriver> {
    page: D,
    config: SessionConfig,
    locator: Locator,
}

impl<D: PageDriver> ConversationSession<D> {
    pub fn new(page: D, config: SessionConfig) -> Self {
        Self {
            page,
            config,
            locator: Locator::new(),
        }
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    pub fn page(&self) -> &D {
        &self.page
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the assistant on a fresh conversation.
    ///
    /// Fails with `ChatInterfaceNotFound` (after saving a screenshot) when
    /// no input box shows up, which usually means the login expired.
    pub async fn start_conversation(&self) -> SessionResult<()> {
        self.page.navigate(&self.config.entry_url).await?;
        sleep(self.config.load_settle).await;

        let input = self
            .locator
            .resolve(&self.page, ElementRole::InputBox, self.config.startup_timeout)
            .await?;
        if input.is_none() {
            let snapshot = self.config.diagnostics_dir.join("debug_screenshot.png");
            if let Err(e) = self.page.screenshot(&snapshot).await {
                tracing::warn!(error = %e, "could not save diagnostic screenshot");
            }
            tracing::warn!(path = %snapshot.display(), "chat input not found");
            return Err(SessionError::ChatInterfaceNotFound {
                url: self.config.entry_url.clone(),
                snapshot,
            });
        }

        sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    /// Whether the input box can currently be found.
    pub async fn input_available(&self, timeout: Duration) -> SessionResult<bool> {
        Ok(self
            .locator
            .resolve(&self.page, ElementRole::InputBox, timeout)
            .await?
            .is_some())
    }

    /// Ask `question` and return the answer, waiting up to the default budget.
    pub async fn submit(&self, question: &str) -> SessionResult<AnswerRecord> {
        self.submit_with_timeout(question, self.config.response_timeout).await
    }

    /// Ask `question`; `timeout` bounds the wait for the answer to settle.
    ///
    /// A timeout is not an error: whatever has rendered is extracted.
    pub async fn submit_with_timeout(&self, question: &str, timeout: Duration) -> SessionResult<AnswerRecord> {
        let url = self.page.current_url().await?;
        if !url.contains(self.config.host()) {
            self.start_conversation().await?;
        }

        let input = self
            .locator
            .resolve(&self.page, ElementRole::InputBox, self.config.input_timeout)
            .await?
            .ok_or(SessionError::InputNotFound)?;

        let baseline: Baseline = completion::measure(&self.page).await?.into();
        tracing::debug!(
            chars = baseline.text_len,
            messages = baseline.message_count,
            "baseline before submit"
        );

        self.type_question(&input, question).await?;
        self.page.press_key(&input, "Enter").await?;
        tracing::info!(timeout_secs = timeout.as_secs(), "waiting for response");

        let outcome: CompletionOutcome = completion::wait_for_completion(&self.page, baseline, timeout).await;
        if !outcome.completed() {
            tracing::warn!(ticks = outcome.ticks, "response did not settle, extracting what rendered");
        }

        self.extract_answer().await
    }

    async fn type_question(&self, input: &ElementHandle, question: &str) -> SessionResult<()> {
        self.page.click(input).await?;
        sleep(Duration::from_millis(100)).await;
        self.page.clear(input).await?;
        sleep(Duration::from_millis(100)).await;
        self.page.type_text(input, question).await?;
        sleep(Duration::from_millis(200)).await;
        tracing::debug!(chars = question.chars().count(), "typed question");
        Ok(())
    }

    /// Extract the most recent answer and every cited paper on the page.
    pub async fn extract_answer(&self) -> SessionResult<AnswerRecord> {
        let containers = self
            .locator
            .resolve_all(&self.page, ElementRole::MessageContainer)
            .await?;

        let Some(last) = containers.last() else {
            tracing::warn!("no message containers found, falling back to main content");
            let text = completion::main_region_text(&self.page)
                .await?
                .unwrap_or_else(|| NO_RESPONSE.to_string());
            return Ok(AnswerRecord::new(text, Vec::new()));
        };

        let text = self.page.inner_text(last).await?;
        tracing::debug!(chars = text.chars().count(), container = %last, "extracted answer");

        let references = self.scan_references().await?;
        tracing::debug!(count = references.len(), "paper links found");

        let raw_markup = match self.page.inner_html(last).await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::debug!(error = %e, "raw markup unavailable");
                None
            }
        };

        Ok(AnswerRecord {
            raw_markup,
            ..AnswerRecord::new(text, references)
        })
    }

    /// Citation links anywhere on the page, deduplicated by identifier.
    async fn scan_references(&self) -> SessionResult<Vec<PaperReference>> {
        let mut found = Vec::new();
        for selector in ElementRole::PaperLink.chain() {
            for link in self.page.links(selector).await? {
                let Some(href) = link.href.as_deref() else { continue };
                match PaperReference::from_link(href, &link.text) {
                    Some(reference) => found.push(reference),
                    None => tracing::debug!(href, "link without a paper identifier, skipped"),
                }
            }
        }
        Ok(dedup_references(found))
    }

    /// Send a context recap framed as a request the assistant can answer.
    pub async fn send_context_recap(&self, recap: &str) -> SessionResult<AnswerRecord> {
        let prompt = format!(
            "I'm researching the following topic. Please help me find relevant papers and summarize \
             the current state of research.\n\n{}\n\nBased on this context, what are the most relevant \
             recent papers (from the last 2 years) that I should review? Please provide specific paper \
             recommendations with brief explanations of their relevance.",
            recap
        );
        self.submit(&prompt).await
    }

    /// Open the assistant for a manual sign-in, wait for `signed_in`
    /// (typically the user pressing Enter), then report whether the chat
    /// input is reachable. The browser profile keeps the login.
    pub async fn login_interactive<F>(&self, signed_in: F) -> SessionResult<bool>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        self.page.navigate(&self.config.entry_url).await?;
        sleep(self.config.load_settle).await;
        tracing::info!(url = %self.config.entry_url, "waiting for manual login");

        signed_in.await;

        let ready = self.input_available(self.config.input_timeout).await?;
        if ready {
            tracing::info!("chat input found, login looks good");
        } else {
            tracing::warn!("chat input not found after login");
        }
        Ok(ready)
    }

    /// Release the page session.
    pub async fn close(&self) -> SessionResult<()> {
        self.page.close().await?;
        Ok(())
    }
}
