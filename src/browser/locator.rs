//! Locator resolution with ordered fallback chains
//!
//! Each logical role maps to a list of CSS matchers, most specific first.
//! The assistant's markup drifts (renamed classes, restructured forms), so
//! a role is resolved by trying the whole chain rather than one selector.

use super::{ElementHandle, PageDriver, PageResult};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Logical UI roles the session needs to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRole {
    InputBox,
    SendControl,
    MessageContainer,
    CompletionMarker,
    PaperLink,
}

const INPUT_BOX: &[&str] = &[
    r#"textarea[placeholder*="Ask"]"#,
    r#"textarea[placeholder*="ask"]"#,
    r#"textarea[placeholder*="research"]"#,
    r#"textarea[placeholder*="question"]"#,
    r#"textarea[placeholder*="Search"]"#,
    "textarea",
    r#"input[type="text"][placeholder*="Ask"]"#,
    r#"input[type="text"][placeholder*="Search"]"#,
    r#"[contenteditable="true"]"#,
];

const SEND_CONTROL: &[&str] = &[
    r#"button[type="submit"]:not([disabled])"#,
    "button:has(svg):not([disabled])",
    r#"button[aria-label*="send" i]:not([disabled])"#,
    r#"button[aria-label*="submit" i]:not([disabled])"#,
    "form button:not([disabled])",
];

const MESSAGE_CONTAINER: &[&str] = &[
    "div[class*='prose']",
    "div[class*='assistant']",
    "div[class*='message']",
    "div[class*='response']",
    "div[class*='markdown']",
    "div[class*='chat'] > div",
    "article",
    "[class*='content'] p",
];

const COMPLETION_MARKER: &[&str] = &[
    "button[aria-label*='Copy']",
    "[aria-label*='Copy']",
    "[class*='feedback']",
    "[class*='actions']",
];

const PAPER_LINK: &[&str] = &["a[href*='arxiv.org']", "a[href*='alphaxiv.org/abs']"];

impl ElementRole {
    pub const ALL: [ElementRole; 5] = [
        ElementRole::InputBox,
        ElementRole::SendControl,
        ElementRole::MessageContainer,
        ElementRole::CompletionMarker,
        ElementRole::PaperLink,
    ];

    /// The fallback chain for this role. Never empty; generic catch-alls last.
    pub fn chain(&self) -> &'static [&'static str] {
        match self {
            ElementRole::InputBox => INPUT_BOX,
            ElementRole::SendControl => SEND_CONTROL,
            ElementRole::MessageContainer => MESSAGE_CONTAINER,
            ElementRole::CompletionMarker => COMPLETION_MARKER,
            ElementRole::PaperLink => PAPER_LINK,
        }
    }

    /// The most specific matcher, used where a single stable selector is
    /// needed (e.g. counting messages across polls).
    pub fn primary(&self) -> &'static str {
        self.chain()[0]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementRole::InputBox => "input box",
            ElementRole::SendControl => "send control",
            ElementRole::MessageContainer => "message container",
            ElementRole::CompletionMarker => "completion marker",
            ElementRole::PaperLink => "paper link",
        }
    }
}

impl std::fmt::Display for ElementRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves roles against a live page.
#[derive(Debug, Clone)]
pub struct Locator {
    /// Upper bound on how long a single matcher is waited for
    per_matcher_cap: Duration,
    /// Delay between visibility probes of the same matcher
    poll_interval: Duration,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator {
    pub fn new() -> Self {
        Self {
            per_matcher_cap: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_per_matcher_cap(mut self, cap: Duration) -> Self {
        self.per_matcher_cap = cap;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Find the first visible element for `role`.
    ///
    /// Each matcher is waited for up to `min(timeout, cap)`; the first hit
    /// returns immediately and later matchers are never evaluated.
    /// `Ok(None)` means the whole chain came up empty. Only transport
    /// faults are returned as errors.
    pub async fn resolve<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        role: ElementRole,
        timeout: Duration,
    ) -> PageResult<Option<ElementHandle>> {
        let window = timeout.min(self.per_matcher_cap);

        for selector in role.chain() {
            if let Some(index) = self.wait_visible(page, selector, window).await? {
                tracing::debug!(%role, selector, index, "resolved");
                return Ok(Some(ElementHandle::new(*selector, index)));
            }
        }

        tracing::debug!(%role, "no matcher in the fallback chain matched");
        Ok(None)
    }

    /// All elements of the first matcher that currently matches anything.
    ///
    /// No waiting and no visibility requirement: used after an answer has
    /// rendered, to pick the most recent container.
    pub async fn resolve_all<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        role: ElementRole,
    ) -> PageResult<Vec<ElementHandle>> {
        for selector in role.chain() {
            let count = page.count(selector).await?;
            if count > 0 {
                tracing::debug!(%role, selector, count, "matched containers");
                return Ok((0..count).map(|i| ElementHandle::new(*selector, i)).collect());
            }
        }
        Ok(Vec::new())
    }

    async fn wait_visible<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        selector: &str,
        window: Duration,
    ) -> PageResult<Option<usize>> {
        let deadline = Instant::now() + window;
        loop {
            if let Some(index) = page.first_visible(selector).await? {
                return Ok(Some(index));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
