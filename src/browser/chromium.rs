//! Chromium page driver over the DevTools protocol.
//!
//! Launches Chromium with a persistent profile so the assistant login
//! survives between runs. Queries that need visibility or text are
//! evaluated in the page; input goes through real CDP key events.

use super::{ElementHandle, LinkInfo, PageDriver, PageError, PageResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Launch settings for the Chromium session.
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Persistent user-data directory (holds the login session)
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub window: (u32, u32),
}

impl ChromiumConfig {
    pub fn new(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            headless: false,
            window: (1280, 900),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

fn transport(e: impl std::fmt::Display) -> PageError {
    PageError::Transport(e.to_string())
}

/// JS string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// A live Chromium page. Owns the browser process and its event loop.
pub struct ChromiumPage {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    page: Page,
}

impl ChromiumPage {
    /// Start Chromium and open a blank page.
    pub async fn launch(config: &ChromiumConfig) -> PageResult<Self> {
        std::fs::create_dir_all(&config.profile_dir)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&config.profile_dir)
            .window_size(config.window.0, config.window.1)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(PageError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PageError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(transport)?;
        tracing::debug!(profile = %config.profile_dir.display(), "browser launched");

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handle)),
            page,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> PageResult<T> {
        let result = self.page.evaluate(script).await.map_err(transport)?;
        result
            .into_value::<T>()
            .map_err(|e| PageError::Script(e.to_string()))
    }

    async fn element(&self, handle: &ElementHandle) -> PageResult<Element> {
        let mut elements = self
            .page
            .find_elements(handle.selector.as_str())
            .await
            .map_err(transport)?;
        if handle.index < elements.len() {
            Ok(elements.swap_remove(handle.index))
        } else {
            Err(PageError::Detached(handle.clone()))
        }
    }
}

/// Run the browser shutdown, then stop the CDP handler task whatever the
/// shutdown returned.
async fn shut_down(
    close: impl std::future::Future<Output = PageResult<()>>,
    handler: Option<JoinHandle<()>>,
) -> PageResult<()> {
    let closed = close.await;
    if let Err(e) = &closed {
        tracing::warn!(error = %e, "browser close command failed");
    }
    if let Some(handle) = handler {
        handle.abort();
        let _ = handle.await;
    }
    closed
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> PageResult<()> {
        self.page.goto(url).await.map_err(transport)?;
        self.page.wait_for_navigation().await.map_err(transport)?;
        Ok(())
    }

    async fn current_url(&self) -> PageResult<String> {
        Ok(self.page.url().await.map_err(transport)?.unwrap_or_default())
    }

    async fn first_visible(&self, selector: &str) -> PageResult<Option<usize>> {
        let script = format!(
            r#"(() => {{
                let els;
                try {{ els = document.querySelectorAll({sel}); }} catch (e) {{ return -1; }}
                for (let i = 0; i < els.length; i++) {{
                    const r = els[i].getBoundingClientRect();
                    const s = window.getComputedStyle(els[i]);
                    if (r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none') return i;
                }}
                return -1;
            }})()"#,
            sel = js_str(selector)
        );
        let index: i64 = self.eval(script).await?;
        Ok(usize::try_from(index).ok())
    }

    async fn count(&self, selector: &str) -> PageResult<usize> {
        let script = format!(
            r#"(() => {{
                try {{ return document.querySelectorAll({sel}).length; }} catch (e) {{ return 0; }}
            }})()"#,
            sel = js_str(selector)
        );
        self.eval(script).await
    }

    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{idx}];
                return el ? el.innerText : null;
            }})()"#,
            sel = js_str(&element.selector),
            idx = element.index
        );
        let text: Option<String> = self.eval(script).await?;
        text.ok_or_else(|| PageError::Detached(element.clone()))
    }

    async fn inner_html(&self, element: &ElementHandle) -> PageResult<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{idx}];
                return el ? el.innerHTML : null;
            }})()"#,
            sel = js_str(&element.selector),
            idx = element.index
        );
        let html: Option<String> = self.eval(script).await?;
        html.ok_or_else(|| PageError::Detached(element.clone()))
    }

    async fn links(&self, selector: &str) -> PageResult<Vec<LinkInfo>> {
        let script = format!(
            r#"(() => {{
                let els;
                try {{ els = document.querySelectorAll({sel}); }} catch (e) {{ return []; }}
                return Array.from(els).map(a => ({{ href: a.getAttribute('href'), text: a.innerText || '' }}));
            }})()"#,
            sel = js_str(selector)
        );
        self.eval(script).await
    }

    async fn click(&self, element: &ElementHandle) -> PageResult<()> {
        self.element(element).await?.click().await.map_err(transport)?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> PageResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{idx}];
                if (!el) return false;
                el.focus();
                if (typeof el.select === 'function') {{ el.select(); }}
                else {{ document.execCommand('selectAll', false, null); }}
                return true;
            }})()"#,
            sel = js_str(&element.selector),
            idx = element.index
        );
        let selected: bool = self.eval(script).await?;
        if !selected {
            return Err(PageError::Detached(element.clone()));
        }
        self.element(element)
            .await?
            .press_key("Backspace")
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> PageResult<()> {
        self.element(element)
            .await?
            .type_str(text)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn press_key(&self, element: &ElementHandle, key: &str) -> PageResult<()> {
        self.element(element)
            .await?
            .press_key(key)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> PageResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn close(&self) -> PageResult<()> {
        let browser = self.browser.lock().await.take();
        let handler = self.handler.lock().await.take();
        shut_down(
            async move {
                let Some(mut browser) = browser else {
                    return Ok(());
                };
                let closed = browser.close().await.map(|_| ()).map_err(transport);
                if let Err(e) = browser.wait().await {
                    tracing::debug!(error = %e, "browser process did not exit cleanly");
                }
                closed
            },
            handler,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_handler() -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn failed_close_still_stops_the_handler() {
        let handler = idle_handler();
        let abort = handler.abort_handle();

        let err = shut_down(async { Err(PageError::Transport("connection reset".into())) }, Some(handler))
            .await
            .unwrap_err();

        assert!(matches!(err, PageError::Transport(_)));
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn clean_close_stops_the_handler() {
        let handler = idle_handler();
        let abort = handler.abort_handle();

        shut_down(async { Ok(()) }, Some(handler)).await.unwrap();

        assert!(abort.is_finished());
    }

    #[test]
    fn js_strings_are_escaped() {
        assert_eq!(js_str("a'b\"c"), r#""a'b\"c""#);
    }
}
