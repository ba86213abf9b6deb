//! Research Verifier: automated research verification loops against a
//! web-hosted research assistant
//!
//! A research project lives on disk (concept, hypothesis versions, gaps,
//! papers, per-cycle artifacts). The verifier drives a logged-in browser
//! page the way a person would: it types questions, waits for the streamed
//! answer to settle, extracts the answer and its cited papers, and folds
//! the results back into the project.
//!
//! # Layers
//!
//! - **browser**: the `PageDriver` contract, locator fallback chains and the
//!   completion detector
//! - **session**: one conversation on the assistant page
//! - **orchestrator**: multi-cycle runs with phase rotation and resume
//! - **project**: the durable project store
//!
//! # Example
//!
//! ```
//! use research_verifier::{ElementRole, Phase};
//!
//! assert_eq!(Phase::for_index(4), Phase::Integrative);
//! assert!(!ElementRole::InputBox.chain().is_empty());
//! ```

pub mod browser;
pub mod orchestrator;
pub mod project;
pub mod session;

pub use browser::{
    ChromiumConfig, ChromiumPage, CompletionOutcome, ElementHandle, ElementRole, Locator, PageDriver,
    PageError, PageResult, ScriptedAnswer, ScriptedPage,
};
pub use orchestrator::{
    CycleOrchestrator, CycleRecord, DefaultQuestionStrategy, OrchestratorError, OrchestratorResult,
    Phase, QuestionContext, QuestionStrategy, ResumeOutcome, RunReport,
};
pub use project::{Gap, GapPriority, Project, ProjectState, RunSettings, StoreError, StoreResult};
pub use session::{
    AnswerRecord, ConversationSession, PaperReference, SessionConfig, SessionError, SessionResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
