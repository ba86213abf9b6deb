//! Browser layer: the page-driver contract and its implementations
//!
//! Everything above this module talks to the assistant page through
//! `PageDriver`. Two implementations:
//! - `ChromiumPage`: drives a real Chromium over CDP (production)
//! - `ScriptedPage`: an in-memory chat page with scripted answers (testing)

mod chromium;
pub mod completion;
pub mod locator;
mod scripted;

pub use chromium::{ChromiumConfig, ChromiumPage};
pub use completion::{Baseline, CompletionDetector, CompletionOutcome, DetectorState, Measurement};
pub use locator::{ElementRole, Locator};
pub use scripted::{ScriptedAnswer, ScriptedPage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised by the underlying page session.
///
/// A selector that matches nothing is never an error; these are
/// transport-level faults only.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("page transport error: {0}")]
    Transport(String),
    #[error("element no longer present: {0}")]
    Detached(ElementHandle),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for page operations
pub type PageResult<T> = Result<T, PageError>;

/// Address of an element on the live page: the n-th match of a selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

/// An anchor found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub href: Option<String>,
    pub text: String,
}

/// The contract a page session implements.
///
/// Abstracts over how the page is reached (CDP, scripted) so the
/// conversation session doesn't depend on a concrete browser.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to `url` and wait for the load to settle.
    async fn navigate(&self, url: &str) -> PageResult<()>;

    /// The URL the page currently shows.
    async fn current_url(&self) -> PageResult<String>;

    /// Index of the first visible element matching `selector`, if any.
    async fn first_visible(&self, selector: &str) -> PageResult<Option<usize>>;

    /// Number of elements matching `selector` (visible or not).
    async fn count(&self, selector: &str) -> PageResult<usize>;

    /// Rendered text of an element.
    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String>;

    /// Markup inside an element.
    async fn inner_html(&self, element: &ElementHandle) -> PageResult<String>;

    /// Every anchor matching `selector`, in document order.
    async fn links(&self, selector: &str) -> PageResult<Vec<LinkInfo>>;

    async fn click(&self, element: &ElementHandle) -> PageResult<()>;

    /// Select the element's current content and delete it.
    async fn clear(&self, element: &ElementHandle) -> PageResult<()>;

    /// Type `text` into the focused element one keystroke at a time.
    async fn type_text(&self, element: &ElementHandle, text: &str) -> PageResult<()>;

    /// Press a named key (e.g. `Enter`) on the element.
    async fn press_key(&self, element: &ElementHandle, key: &str) -> PageResult<()>;

    /// Save a full-page screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> PageResult<()>;

    /// Release the page session. Further calls fail with `Transport`.
    async fn close(&self) -> PageResult<()>;
}

#[async_trait]
impl<T: PageDriver + ?Sized> PageDriver for std::sync::Arc<T> {
    async fn navigate(&self, url: &str) -> PageResult<()> {
        (**self).navigate(url).await
    }

    async fn current_url(&self) -> PageResult<String> {
        (**self).current_url().await
    }

    async fn first_visible(&self, selector: &str) -> PageResult<Option<usize>> {
        (**self).first_visible(selector).await
    }

    async fn count(&self, selector: &str) -> PageResult<usize> {
        (**self).count(selector).await
    }

    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
        (**self).inner_text(element).await
    }

    async fn inner_html(&self, element: &ElementHandle) -> PageResult<String> {
        (**self).inner_html(element).await
    }

    async fn links(&self, selector: &str) -> PageResult<Vec<LinkInfo>> {
        (**self).links(selector).await
    }

    async fn click(&self, element: &ElementHandle) -> PageResult<()> {
        (**self).click(element).await
    }

    async fn clear(&self, element: &ElementHandle) -> PageResult<()> {
        (**self).clear(element).await
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> PageResult<()> {
        (**self).type_text(element, text).await
    }

    async fn press_key(&self, element: &ElementHandle, key: &str) -> PageResult<()> {
        (**self).press_key(element, key).await
    }

    async fn screenshot(&self, path: &Path) -> PageResult<()> {
        (**self).screenshot(path).await
    }

    async fn close(&self) -> PageResult<()> {
        (**self).close().await
    }
}
