//! Completion detection for streamed answers
//!
//! The assistant gives no completion signal, so "done" is inferred by
//! polling the page once per second: first wait for a new answer to show
//! up, then wait until its text stops growing.
//!
//! The state machine (`CompletionDetector`) is pure and consumes one
//! measurement per tick; `wait_for_completion` drives it against a page.

use super::{ElementHandle, ElementRole, PageDriver, PageResult};
use std::time::Duration;

/// Cadence of measurement ticks.
pub const TICK: Duration = Duration::from_secs(1);

/// Growth in total text length that counts as a new answer when no new
/// container appeared.
pub const GROWTH_SLACK: usize = 200;

/// Consecutive unchanged ticks before an answer is considered rendered.
pub const STABILITY_WINDOW: u32 = 3;

/// Regions whose text stands for "the page", tried in order before `body`.
const MAIN_REGIONS: &[&str] = &["main", "[role='main']", "#__next", ".container"];

/// One observation of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Characters of visible text in the main region
    pub text_len: usize,
    /// Elements matching the primary message-container matcher
    pub message_count: usize,
}

/// Page state captured immediately before a question is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub text_len: usize,
    pub message_count: usize,
}

impl From<Measurement> for Baseline {
    fn from(m: Measurement) -> Self {
        Self {
            text_len: m.text_len,
            message_count: m.message_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    AwaitingNewMessage,
    Stabilizing { stable_ticks: u32 },
    Done,
    TimedOut,
}

impl DetectorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DetectorState::Done | DetectorState::TimedOut)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// `Done` or `TimedOut`
    pub state: DetectorState,
    /// Ticks consumed
    pub ticks: u32,
    /// Whether a new answer was ever detected
    pub saw_new_message: bool,
}

impl CompletionOutcome {
    pub fn completed(&self) -> bool {
        self.state == DetectorState::Done
    }
}

/// Two-phase polling state machine.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    baseline: Baseline,
    budget: u32,
    state: DetectorState,
    last_len: usize,
    ticks: u32,
    saw_new_message: bool,
}

impl CompletionDetector {
    /// A detector allowed `budget` ticks. A zero budget is already timed out.
    pub fn new(baseline: Baseline, budget: u32) -> Self {
        let state = if budget == 0 {
            DetectorState::TimedOut
        } else {
            DetectorState::AwaitingNewMessage
        };
        Self {
            baseline,
            budget,
            state,
            last_len: baseline.text_len,
            ticks: 0,
            saw_new_message: false,
        }
    }

    /// A detector whose budget is `timeout` in whole seconds.
    pub fn with_timeout(baseline: Baseline, timeout: Duration) -> Self {
        let budget = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
        Self::new(baseline, budget)
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Feed the measurement taken on one tick.
    ///
    /// `None` is a failed measurement: the tick is spent but nothing else
    /// changes.
    pub fn tick(&mut self, measurement: Option<Measurement>) -> DetectorState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.ticks += 1;

        if let Some(m) = measurement {
            self.state = match self.state {
                DetectorState::AwaitingNewMessage => self.await_new_message(m),
                DetectorState::Stabilizing { stable_ticks } => self.stabilize(m, stable_ticks),
                terminal => terminal,
            };
        }

        if !self.state.is_terminal() && self.ticks >= self.budget {
            self.state = DetectorState::TimedOut;
        }
        self.state
    }

    pub fn outcome(&self) -> CompletionOutcome {
        CompletionOutcome {
            state: self.state,
            ticks: self.ticks,
            saw_new_message: self.saw_new_message,
        }
    }

    fn await_new_message(&mut self, m: Measurement) -> DetectorState {
        let new_container = m.message_count > self.baseline.message_count;
        let grew = m.text_len > self.baseline.text_len + GROWTH_SLACK;
        if !(new_container || grew) {
            return DetectorState::AwaitingNewMessage;
        }
        if new_container {
            tracing::debug!(
                from = self.baseline.message_count,
                to = m.message_count,
                "new message appeared"
            );
        } else {
            tracing::debug!(from = self.baseline.text_len, to = m.text_len, "content growth detected");
        }
        self.saw_new_message = true;
        self.last_len = m.text_len;
        DetectorState::Stabilizing { stable_ticks: 0 }
    }

    fn stabilize(&mut self, m: Measurement, stable_ticks: u32) -> DetectorState {
        let stable_ticks = if m.text_len == self.last_len {
            stable_ticks + 1
        } else {
            tracing::debug!(from = self.last_len, to = m.text_len, "still growing");
            0
        };
        self.last_len = m.text_len;
        if stable_ticks >= STABILITY_WINDOW {
            tracing::debug!(chars = m.text_len, "response complete");
            DetectorState::Done
        } else {
            DetectorState::Stabilizing { stable_ticks }
        }
    }
}

/// Text of the page's main content region, or of `body` if none exists.
pub async fn page_text<D: PageDriver + ?Sized>(page: &D) -> PageResult<String> {
    for selector in MAIN_REGIONS {
        if page.count(selector).await? > 0 {
            return page.inner_text(&ElementHandle::new(*selector, 0)).await;
        }
    }
    page.inner_text(&ElementHandle::new("body", 0)).await
}

/// Text of the first main content region, without the `body` fallback.
pub async fn main_region_text<D: PageDriver + ?Sized>(page: &D) -> PageResult<Option<String>> {
    for selector in &MAIN_REGIONS[..3] {
        if page.count(selector).await? > 0 {
            return page.inner_text(&ElementHandle::new(*selector, 0)).await.map(Some);
        }
    }
    Ok(None)
}

/// Measure text length and message count.
pub async fn measure<D: PageDriver + ?Sized>(page: &D) -> PageResult<Measurement> {
    let text_len = page_text(page).await?.chars().count();
    let message_count = page.count(ElementRole::MessageContainer.primary()).await?;
    Ok(Measurement {
        text_len,
        message_count,
    })
}

/// Poll `page` once per tick until the answer settles or the budget runs out.
///
/// Timing out is not an error: the caller extracts whatever has rendered.
/// Failed measurements are logged and skipped.
pub async fn wait_for_completion<D: PageDriver + ?Sized>(
    page: &D,
    baseline: Baseline,
    timeout: Duration,
) -> CompletionOutcome {
    let mut detector = CompletionDetector::with_timeout(baseline, timeout);

    while !detector.state().is_terminal() {
        tokio::time::sleep(TICK).await;
        let measurement = match measure(page).await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!(error = %e, "measurement failed, skipping tick");
                None
            }
        };
        detector.tick(measurement);
        if detector.ticks() % 10 == 0 {
            tracing::debug!(ticks = detector.ticks(), state = ?detector.state(), "waiting");
        }
    }

    let outcome = detector.outcome();
    if !outcome.completed() {
        if outcome.saw_new_message {
            tracing::debug!(ticks = outcome.ticks, "timeout reached, proceeding with extraction");
        } else {
            tracing::debug!(ticks = outcome.ticks, "timeout: no new message detected, submission may have failed");
        }
    }
    outcome
}
