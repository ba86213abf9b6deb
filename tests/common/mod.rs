//! Common test utilities for cycle and resume scenarios
//!
//! Builds throwaway projects and scripted assistant pages so the real
//! session and orchestrator code run end to end without a browser.

#![allow(dead_code)]

use chrono::Utc;
use research_verifier::project::Checkpoint;
use research_verifier::{
    ConversationSession, CycleOrchestrator, Phase, Project, RunSettings, ScriptedAnswer, ScriptedPage,
    SessionConfig,
};
use std::sync::Arc;
use std::time::Duration;

pub const CONCEPT: &str = "# Concept\n\n## Core Theory\n\n\
    Sparse attention lets transformers generalize across long contexts\n";

/// A project under a fresh temp dir, with a concept worth extracting.
pub fn project() -> (tempfile::TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::create(dir.path(), "sparse-attention").unwrap();
    std::fs::write(project.root().join("concept/README.md"), CONCEPT).unwrap();
    (dir, project)
}

/// Short waits so long runs stay cheap on the paused clock.
pub fn fast_settings() -> RunSettings {
    RunSettings {
        resume_ceiling: 20,
        response_timeout_secs: 20,
        inter_question_delay_secs: 1,
        default_cycles: 2,
    }
}

/// An answer citing the given arXiv ids, streaming quickly.
pub fn answer(text: &str, ids: &[&str]) -> ScriptedAnswer {
    ids.iter().fold(
        ScriptedAnswer::new(text).with_timing(Duration::from_secs(1), Duration::from_secs(1)),
        |a, id| a.with_link(format!("https://arxiv.org/abs/{}", id), format!("Paper on {}", id)),
    )
}

/// A page that answers every question with the same short reply.
pub fn steady_page() -> ScriptedPage {
    ScriptedPage::new().with_default_answer(answer("Several recent papers study this.", &["2401.00001"]))
}

pub fn orchestrator(
    project: Project,
    page: ScriptedPage,
) -> (Arc<ScriptedPage>, CycleOrchestrator<Arc<ScriptedPage>>) {
    let page = Arc::new(page);
    let config = SessionConfig::new(project.root());
    let session = ConversationSession::new(Arc::clone(&page), config);
    let orchestrator = CycleOrchestrator::new(project, session).with_settings(fast_settings());
    (page, orchestrator)
}

pub fn checkpoint(cycle_num: u32) -> Checkpoint {
    Checkpoint {
        cycle_num,
        phase: Phase::for_index(cycle_num as usize - 1),
        timestamp: Utc::now(),
        papers_found: 0,
        new_gaps: 0,
    }
}

/// Mark `completed` cycles as done and checkpointed.
pub fn with_history(project: &mut Project, completed: u32) {
    for n in 1..=completed {
        project.save_checkpoint(&checkpoint(n)).unwrap();
    }
    project
        .update_state(|s| {
            s.total_cycles_completed = completed;
            s.current_cycle = completed;
        })
        .unwrap();
}
