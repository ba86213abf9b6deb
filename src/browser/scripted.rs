//! In-memory chat page with queued answers, for tests and dry runs
//!
//! Pressing Enter in the input submits the typed question and starts the
//! next queued answer. An answer appears after a delay and then streams in
//! over a configurable duration, measured on the tokio clock, so tests on a
//! paused runtime see deterministic tick counts.

use super::{ElementHandle, ElementRole, LinkInfo, PageDriver, PageError, PageResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// One queued reply.
#[derive(Debug, Clone)]
pub struct ScriptedAnswer {
    pub text: String,
    pub links: Vec<LinkInfo>,
    /// Delay between Enter and the first rendered character
    pub appear_after: Duration,
    /// Time taken to stream the full text once it appears
    pub stream_for: Duration,
    /// Fail the submission keystroke with this transport message instead
    pub fault: Option<String>,
}

impl ScriptedAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
            appear_after: Duration::from_secs(2),
            stream_for: Duration::from_secs(3),
            fault: None,
        }
    }

    /// A submission that fails at the transport level.
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            fault: Some(message.into()),
            ..Self::new("")
        }
    }

    pub fn with_link(mut self, href: impl Into<String>, text: impl Into<String>) -> Self {
        self.links.push(LinkInfo {
            href: Some(href.into()),
            text: text.into(),
        });
        self
    }

    pub fn with_timing(mut self, appear_after: Duration, stream_for: Duration) -> Self {
        self.appear_after = appear_after;
        self.stream_for = stream_for;
        self
    }
}

#[derive(Debug)]
struct Pending {
    answer: ScriptedAnswer,
    submitted_at: Instant,
}

#[derive(Debug)]
struct State {
    url: String,
    closed: bool,
    input_selector: Option<String>,
    message_selector: String,
    visible: HashSet<String>,
    elements: HashMap<String, Vec<String>>,
    messages: Vec<String>,
    links: Vec<LinkInfo>,
    input: String,
    queue: VecDeque<ScriptedAnswer>,
    fallback: Option<ScriptedAnswer>,
    pending: Option<Pending>,
    submitted: Vec<String>,
    probes: Vec<String>,
    screenshots: Vec<PathBuf>,
    chrome: String,
    main_region: bool,
}

impl State {
    /// Settle any answer that has finished streaming.
    fn advance(&mut self) {
        let finished = match &self.pending {
            Some(p) => p.submitted_at.elapsed() >= p.answer.appear_after + p.answer.stream_for,
            None => false,
        };
        if finished {
            if let Some(p) = self.pending.take() {
                self.messages.push(p.answer.text);
                self.links.extend(p.answer.links);
            }
        }
    }

    /// Messages as currently rendered, including a partially streamed one.
    fn rendered_messages(&self) -> Vec<String> {
        let mut out = self.messages.clone();
        if let Some(p) = &self.pending {
            let elapsed = p.submitted_at.elapsed();
            if elapsed >= p.answer.appear_after {
                let streamed = elapsed - p.answer.appear_after;
                let total = p.answer.text.chars().count();
                let shown = if p.answer.stream_for.is_zero() {
                    total
                } else {
                    let fraction = streamed.as_secs_f64() / p.answer.stream_for.as_secs_f64();
                    ((total as f64) * fraction.min(1.0)) as usize
                };
                out.push(p.answer.text.chars().take(shown.max(1)).collect());
            }
        }
        out
    }

    fn main_text(&self) -> String {
        let mut text = self.chrome.clone();
        for message in self.rendered_messages() {
            text.push('\n');
            text.push_str(&message);
        }
        text
    }

    fn is_input(&self, element: &ElementHandle) -> bool {
        self.input_selector.as_deref() == Some(element.selector.as_str())
    }
}

/// In-memory `PageDriver` with a scripted assistant behind it.
#[derive(Debug)]
pub struct ScriptedPage {
    state: Mutex<State>,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPage {
    /// A page with the most specific input matcher visible and no answers queued.
    pub fn new() -> Self {
        let input = ElementRole::InputBox.primary().to_string();
        let mut visible = HashSet::new();
        visible.insert(input.clone());
        Self {
            state: Mutex::new(State {
                url: "about:blank".to_string(),
                closed: false,
                input_selector: Some(input),
                message_selector: ElementRole::MessageContainer.primary().to_string(),
                visible,
                elements: HashMap::new(),
                messages: Vec::new(),
                links: Vec::new(),
                input: String::new(),
                queue: VecDeque::new(),
                fallback: None,
                pending: None,
                submitted: Vec::new(),
                probes: Vec::new(),
                screenshots: Vec::new(),
                chrome: "Assistant\nAsk anything about research papers".to_string(),
                main_region: true,
            }),
        }
    }

    /// A page where no matcher finds an input (e.g. a login wall).
    pub fn without_input(self) -> Self {
        {
            let mut state = self.lock();
            if let Some(input) = state.input_selector.take() {
                state.visible.remove(&input);
            }
        }
        self
    }

    /// Use `selector` for the input box instead of the most specific matcher.
    pub fn with_input_selector(self, selector: &str) -> Self {
        {
            let mut state = self.lock();
            if let Some(old) = state.input_selector.take() {
                state.visible.remove(&old);
            }
            state.visible.insert(selector.to_string());
            state.input_selector = Some(selector.to_string());
        }
        self
    }

    /// A page with no `main` landmark; only `body` is left to read.
    pub fn without_main_region(self) -> Self {
        self.lock().main_region = false;
        self
    }

    /// Render answers under `selector` instead of the primary container matcher.
    pub fn with_message_selector(self, selector: &str) -> Self {
        self.lock().message_selector = selector.to_string();
        self
    }

    /// Mark `selector` as having a visible match.
    pub fn with_visible(self, selector: &str) -> Self {
        self.lock().visible.insert(selector.to_string());
        self
    }

    /// Static elements with the given texts under `selector`.
    pub fn with_elements(self, selector: &str, texts: &[&str]) -> Self {
        self.lock()
            .elements
            .insert(selector.to_string(), texts.iter().map(|t| t.to_string()).collect());
        self
    }

    /// A link already present on the page.
    pub fn with_link(self, href: &str, text: &str) -> Self {
        self.lock().links.push(LinkInfo {
            href: Some(href.to_string()),
            text: text.to_string(),
        });
        self
    }

    /// Queue the reply to the next submission.
    pub fn with_answer(self, answer: ScriptedAnswer) -> Self {
        self.lock().queue.push_back(answer);
        self
    }

    /// Reply used whenever the queue is empty.
    pub fn with_default_answer(self, answer: ScriptedAnswer) -> Self {
        self.lock().fallback = Some(answer);
        self
    }

    /// Render a complete answer immediately, without a submission.
    pub fn post_answer_now(&self, text: &str) {
        self.lock().messages.push(text.to_string());
    }

    /// Questions submitted so far, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Selectors probed for visibility, in order.
    pub fn probed_selectors(&self) -> Vec<String> {
        self.lock().probes.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self) -> PageResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PageError::Transport("page session closed".to_string()));
        }
        state.advance();
        Ok(state)
    }
}

/// Extract `X` from a selector of the form `a[href*='X']`.
fn href_fragment(selector: &str) -> Option<&str> {
    let start = selector.find("href*=")? + "href*=".len();
    let rest = &selector[start..];
    let quote = rest.chars().next()?;
    let rest = &rest[quote.len_utf8()..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn navigate(&self, url: &str) -> PageResult<()> {
        let mut state = self.open()?;
        state.url = url.to_string();
        state.messages.clear();
        state.pending = None;
        state.input.clear();
        Ok(())
    }

    async fn current_url(&self) -> PageResult<String> {
        Ok(self.open()?.url.clone())
    }

    async fn first_visible(&self, selector: &str) -> PageResult<Option<usize>> {
        let mut state = self.open()?;
        state.probes.push(selector.to_string());
        Ok(state.visible.contains(selector).then_some(0))
    }

    async fn count(&self, selector: &str) -> PageResult<usize> {
        let state = self.open()?;
        let count = match selector {
            "main" => usize::from(state.main_region),
            "body" => 1,
            s if s == state.message_selector => state.rendered_messages().len(),
            s => match state.elements.get(s) {
                Some(texts) => texts.len(),
                None => usize::from(state.visible.contains(s)),
            },
        };
        Ok(count)
    }

    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
        let state = self.open()?;
        let text = match element.selector.as_str() {
            "main" if !state.main_region => None,
            "main" | "body" => Some(state.main_text()),
            s if s == state.message_selector => state.rendered_messages().get(element.index).cloned(),
            s => state.elements.get(s).and_then(|texts| texts.get(element.index).cloned()),
        };
        text.ok_or_else(|| PageError::Detached(element.clone()))
    }

    async fn inner_html(&self, element: &ElementHandle) -> PageResult<String> {
        let text = self.inner_text(element).await?;
        Ok(format!("<div class=\"prose\"><p>{}</p></div>", text))
    }

    async fn links(&self, selector: &str) -> PageResult<Vec<LinkInfo>> {
        let state = self.open()?;
        let fragment = href_fragment(selector);
        Ok(state
            .links
            .iter()
            .filter(|link| match (fragment, link.href.as_deref()) {
                (Some(f), Some(href)) => href.contains(f),
                (None, _) => true,
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> PageResult<()> {
        let state = self.open()?;
        if state.is_input(element) || state.visible.contains(&element.selector) {
            Ok(())
        } else {
            Err(PageError::Detached(element.clone()))
        }
    }

    async fn clear(&self, element: &ElementHandle) -> PageResult<()> {
        let mut state = self.open()?;
        if !state.is_input(element) {
            return Err(PageError::Detached(element.clone()));
        }
        state.input.clear();
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> PageResult<()> {
        let mut state = self.open()?;
        if !state.is_input(element) {
            return Err(PageError::Detached(element.clone()));
        }
        state.input.push_str(text);
        Ok(())
    }

    async fn press_key(&self, element: &ElementHandle, key: &str) -> PageResult<()> {
        let mut state = self.open()?;
        if !state.is_input(element) {
            return Err(PageError::Detached(element.clone()));
        }
        if key != "Enter" || state.input.is_empty() {
            return Ok(());
        }
        let question = std::mem::take(&mut state.input);
        state.submitted.push(question);
        let next = state.queue.pop_front().or_else(|| state.fallback.clone());
        match next {
            Some(ScriptedAnswer { fault: Some(message), .. }) => Err(PageError::Transport(message)),
            Some(answer) => {
                state.pending = Some(Pending {
                    answer,
                    submitted_at: Instant::now(),
                });
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn screenshot(&self, path: &Path) -> PageResult<()> {
        let main_text = self.open()?.main_text();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, main_text)?;
        self.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> PageResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ElementHandle {
        ElementHandle::new(ElementRole::InputBox.primary(), 0)
    }

    #[test]
    fn href_fragment_reads_quoted_value() {
        assert_eq!(href_fragment("a[href*='arxiv.org']"), Some("arxiv.org"));
        assert_eq!(href_fragment(r#"a[href*="alphaxiv.org/abs"]"#), Some("alphaxiv.org/abs"));
        assert_eq!(href_fragment("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_streams_in_after_submission() {
        let page = ScriptedPage::new().with_answer(
            ScriptedAnswer::new("0123456789").with_timing(Duration::from_secs(1), Duration::from_secs(2)),
        );
        page.type_text(&input(), "hello?").await.unwrap();
        page.press_key(&input(), "Enter").await.unwrap();
        let messages = ElementRole::MessageContainer.primary();

        assert_eq!(page.count(messages).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let partial = page.inner_text(&ElementHandle::new(messages, 0)).await.unwrap();
        assert_eq!(partial, "01234");
        tokio::time::sleep(Duration::from_secs(1)).await;
        let full = page.inner_text(&ElementHandle::new(messages, 0)).await.unwrap();
        assert_eq!(full, "0123456789");
        assert_eq!(page.submitted(), vec!["hello?".to_string()]);
    }

    #[tokio::test]
    async fn faulty_answer_fails_the_keystroke() {
        let page = ScriptedPage::new().with_answer(ScriptedAnswer::fault("socket closed"));
        page.type_text(&input(), "q").await.unwrap();
        let err = page.press_key(&input(), "Enter").await.unwrap_err();
        assert!(matches!(err, PageError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn default_answer_serves_every_unqueued_submission() {
        let page = ScriptedPage::new()
            .with_answer(ScriptedAnswer::new("first"))
            .with_default_answer(ScriptedAnswer::new("again"));
        let messages = ElementRole::MessageContainer.primary();

        for question in ["a", "b", "c"] {
            page.type_text(&input(), question).await.unwrap();
            page.press_key(&input(), "Enter").await.unwrap();
            tokio::time::sleep(Duration::from_secs(6)).await;
        }

        assert_eq!(page.count(messages).await.unwrap(), 3);
        let last = page.inner_text(&ElementHandle::new(messages, 2)).await.unwrap();
        assert_eq!(last, "again");
    }

    #[tokio::test]
    async fn closed_page_rejects_calls() {
        let page = ScriptedPage::new();
        page.close().await.unwrap();
        assert!(page.is_closed());
        assert!(page.current_url().await.is_err());
    }
}
