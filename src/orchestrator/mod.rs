//! Cycle orchestrator: runs research cycles against the assistant
//!
//! A cycle picks a phase, generates questions, asks them one at a time,
//! synthesizes the answers, records gaps and papers, checkpoints, and
//! advances the project state. One failed question never aborts a cycle.
//!
//! The orchestrator owns the conversation session for its whole life and
//! consumes itself on every entry point, closing the session on the way out
//! whether the run succeeded or not.

mod phase;
pub mod questions;
pub mod synthesis;

pub use phase::Phase;
pub use questions::{DefaultQuestionStrategy, QuestionContext, QuestionStrategy, FALLBACK_TOPIC};

use crate::browser::PageDriver;
use crate::project::{Checkpoint, Gap, Project, RunSettings, StoreError};
use crate::session::{dedup_references, AnswerRecord, ConversationSession, PaperReference, SessionError};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Errors that end a run. Per-question session faults are recorded, not raised.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// What one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub cycle_num: u32,
    pub phase: Phase,
    pub questions: Vec<String>,
    pub answers: Vec<AnswerRecord>,
    /// Distinct papers cited across the cycle's answers
    pub papers: Vec<PaperReference>,
    pub new_gaps: Vec<Gap>,
    pub synthesis: String,
    pub duration: Duration,
}

impl CycleRecord {
    pub fn failed_questions(&self) -> usize {
        self.answers.iter().filter(|a| a.is_error()).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub cycles: Vec<CycleRecord>,
    /// Findings were substantial enough to cut a new hypothesis version
    pub versioning_suggested: bool,
}

impl RunReport {
    /// Papers found across the run, summed per cycle. A paper cited in two
    /// cycles counts twice.
    pub fn papers_found(&self) -> usize {
        self.cycles.iter().map(|c| c.papers.len()).sum()
    }

    pub fn new_gaps(&self) -> usize {
        self.cycles.iter().map(|c| c.new_gaps.len()).sum()
    }
}

/// How a resume went.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    /// No checkpoint existed; ran the default number of cycles
    Fresh(RunReport),
    /// Continued after the cycle `from`
    Continued { from: u32, report: RunReport },
    /// The last checkpoint is already at or past the ceiling
    AlreadyComplete { last: u32 },
}

pub struct CycleOrchestrator<D: PageDriver> {
    project: Project,
    session: ConversationSession<D>,
    strategy: Box<dyn QuestionStrategy>,
    settings: RunSettings,
}

impl<D: PageDriver> CycleOrchestrator<D> {
    pub fn new(project: Project, session: ConversationSession<D>) -> Self {
        let settings = project.settings().clone();
        Self {
            project,
            session,
            strategy: Box::new(DefaultQuestionStrategy),
            settings,
        }
    }

    pub fn with_strategy(mut self, strategy: impl QuestionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Run `count` cycles. Phases rotate by position in this run unless
    /// `phase_override` pins one.
    pub async fn run_cycles(mut self, count: u32, phase_override: Option<Phase>) -> OrchestratorResult<RunReport> {
        let result = self.run_inner(count, phase_override).await;
        self.shutdown().await;
        result
    }

    /// Continue from the latest checkpoint up to the resume ceiling.
    pub async fn resume(self) -> OrchestratorResult<ResumeOutcome> {
        let latest = match self.project.latest_checkpoint() {
            Ok(latest) => latest,
            Err(e) => {
                self.shutdown().await;
                return Err(e.into());
            }
        };

        match latest {
            None => {
                tracing::info!("no checkpoints found, starting fresh");
                let count = self.settings.default_cycles;
                self.run_cycles(count, None).await.map(ResumeOutcome::Fresh)
            }
            Some(checkpoint) => {
                let last = checkpoint.cycle_num;
                let remaining = self.settings.resume_ceiling.saturating_sub(last);
                if remaining == 0 {
                    tracing::info!(last, ceiling = self.settings.resume_ceiling, "all cycles completed");
                    self.shutdown().await;
                    return Ok(ResumeOutcome::AlreadyComplete { last });
                }
                tracing::info!(from = last, remaining, "resuming");
                let report = self.run_cycles(remaining, None).await?;
                Ok(ResumeOutcome::Continued { from: last, report })
            }
        }
    }

    /// Ask one hand-picked question as its own cycle.
    ///
    /// The cycle number defaults to the next one; the answer is saved and
    /// its papers registered, but no synthesis or checkpoint is written.
    pub async fn run_manual_cycle(
        mut self,
        question: &str,
        phase: Phase,
        cycle_num: Option<u32>,
    ) -> OrchestratorResult<(u32, AnswerRecord)> {
        let result = self.manual_cycle(question, phase, cycle_num).await;
        self.shutdown().await;
        result
    }

    async fn manual_cycle(
        &mut self,
        question: &str,
        phase: Phase,
        cycle_num: Option<u32>,
    ) -> OrchestratorResult<(u32, AnswerRecord)> {
        let cycle_num = cycle_num.unwrap_or(self.project.state().total_cycles_completed + 1);
        self.session.start_conversation().await?;
        tracing::info!(cycle = cycle_num, %phase, "manual cycle");

        let answer = self.session.submit_with_timeout(question, self.response_timeout()).await?;

        self.project.save_cycle_questions(cycle_num, &[question.to_string()])?;
        self.project.save_cycle_response(cycle_num, 1, question, &answer)?;
        self.project.update_state(|s| {
            s.current_cycle = cycle_num;
            s.current_phase = phase;
            s.total_cycles_completed = cycle_num;
        })?;
        if !answer.references.is_empty() {
            self.project.register_papers(&answer.references)?;
        }
        Ok((cycle_num, answer))
    }

    async fn shutdown(&self) {
        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "closing the page session failed");
        }
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.response_timeout_secs)
    }

    async fn run_inner(&mut self, count: u32, phase_override: Option<Phase>) -> OrchestratorResult<RunReport> {
        self.session.start_conversation().await?;

        if self.project.state().total_cycles_completed > 0 {
            let recap = self.project.context_recap()?;
            tracing::info!("sending context recap");
            if let Err(e) = self.session.send_context_recap(&recap).await {
                tracing::warn!(error = %e, "context recap failed, continuing without it");
            }
        } else {
            tracing::info!("starting fresh research session");
        }

        let mut report = RunReport::default();
        for index in 0..count {
            let cycle_num = self.project.state().total_cycles_completed + 1;
            let phase = phase_override.unwrap_or_else(|| Phase::for_index(index as usize));
            tracing::info!(cycle = cycle_num, %phase, "cycle started");

            let record = self.run_cycle(cycle_num, phase).await?;

            self.project.save_checkpoint(&Checkpoint {
                cycle_num,
                phase,
                timestamp: Utc::now(),
                papers_found: record.papers.len(),
                new_gaps: record.new_gaps.len(),
            })?;
            self.project.update_state(|s| {
                s.current_cycle = cycle_num;
                s.current_phase = phase;
                s.total_cycles_completed = cycle_num;
            })?;
            tracing::info!(
                cycle = cycle_num,
                papers = record.papers.len(),
                gaps = record.new_gaps.len(),
                failed = record.failed_questions(),
                elapsed_secs = record.duration.as_secs(),
                "cycle completed"
            );
            report.cycles.push(record);

            if !report.versioning_suggested
                && synthesis::should_version_hypothesis(report.papers_found(), report.new_gaps())
            {
                tracing::info!("significant findings detected, consider versioning the hypothesis");
                report.versioning_suggested = true;
            }
        }
        Ok(report)
    }

    async fn run_cycle(&mut self, cycle_num: u32, phase: Phase) -> OrchestratorResult<CycleRecord> {
        let started = Instant::now();

        let concept = self.project.concept()?;
        let hypothesis = self.project.current_hypothesis()?;
        let gaps = self.project.active_gaps()?;
        let mut questions = self.strategy.generate(&QuestionContext {
            concept: &concept,
            hypothesis: &hypothesis,
            gaps: &gaps,
            phase,
            cycle_num,
        });
        if questions.is_empty() {
            tracing::warn!(cycle = cycle_num, "strategy produced no questions, using the default topic question");
            questions.push(format!(
                "What are the most important recent developments in {}?",
                FALLBACK_TOPIC
            ));
        }
        self.project.save_cycle_questions(cycle_num, &questions)?;

        let timeout = self.response_timeout();
        let delay = Duration::from_secs(self.settings.inter_question_delay_secs);
        let mut answers = Vec::with_capacity(questions.len());
        for (i, question) in questions.iter().enumerate() {
            tracing::info!(question = i + 1, of = questions.len(), "asking");
            let answer = match self.session.submit_with_timeout(question, timeout).await {
                Ok(answer) => {
                    tracing::info!(papers = answer.references.len(), "response received");
                    answer
                }
                Err(e) => {
                    tracing::warn!(error = %e, question = i + 1, "question failed");
                    AnswerRecord::failed(&e)
                }
            };
            self.project.save_cycle_response(cycle_num, i + 1, question, &answer)?;
            answers.push(answer);

            if i + 1 < questions.len() {
                sleep(delay).await;
            }
        }

        let papers = dedup_references(answers.iter().flat_map(|a| a.references.iter().cloned()));
        let synthesis = synthesis::build_synthesis(phase, &answers, &papers);
        let gap = synthesis::detect_gap(&synthesis::combined_text(&answers));
        let new_gaps = self
            .project
            .save_cycle_synthesis(cycle_num, &synthesis, gap.into_iter().collect(), &papers)?;

        Ok(CycleRecord {
            cycle_num,
            phase,
            questions,
            answers,
            papers,
            new_gaps,
            synthesis,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ScriptedAnswer, ScriptedPage};
    use crate::session::SessionConfig;
    use std::sync::Arc;

    struct FixedQuestions(Vec<&'static str>);

    impl QuestionStrategy for FixedQuestions {
        fn generate(&self, _context: &QuestionContext<'_>) -> Vec<String> {
            self.0.iter().map(|q| q.to_string()).collect()
        }
    }

    fn settings() -> RunSettings {
        RunSettings {
            resume_ceiling: 20,
            response_timeout_secs: 30,
            inter_question_delay_secs: 1,
            default_cycles: 2,
        }
    }

    fn orchestrator(
        page: ScriptedPage,
    ) -> (tempfile::TempDir, Arc<ScriptedPage>, CycleOrchestrator<Arc<ScriptedPage>>) {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path(), "demo").unwrap();
        let page = Arc::new(page);
        let session = ConversationSession::new(Arc::clone(&page), SessionConfig::new(dir.path()));
        let orchestrator = CycleOrchestrator::new(project, session).with_settings(settings());
        (dir, page, orchestrator)
    }

    #[tokio::test(start_paused = true)]
    async fn failed_question_is_recorded_and_cycle_continues() {
        let page = ScriptedPage::new()
            .with_answer(ScriptedAnswer::fault("socket closed"))
            .with_answer(
                ScriptedAnswer::new("Scaling remains unclear.").with_link("https://arxiv.org/abs/2401.00001", "S"),
            );
        let (dir, page, orchestrator) = orchestrator(page);
        let orchestrator = orchestrator.with_strategy(FixedQuestions(vec!["first?", "second?"]));

        let report = orchestrator.run_cycles(1, Some(Phase::Synthesis)).await.unwrap();

        let cycle = &report.cycles[0];
        assert_eq!(cycle.failed_questions(), 1);
        assert!(cycle.answers[0].text.starts_with("[Error:"));
        assert_eq!(cycle.papers.len(), 1);
        assert_eq!(cycle.new_gaps.len(), 1);
        assert!(page.is_closed());

        let responses = dir.path().join("demo/research/cycle-001/responses");
        assert!(responses.join("q01-response.json").is_file());
        assert!(responses.join("q02-response.md").is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_closed_when_start_fails() {
        let (_dir, page, orchestrator) = orchestrator(ScriptedPage::new().without_input());

        let err = orchestrator.run_cycles(1, None).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Session(SessionError::ChatInterfaceNotFound { .. })
        ));
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_cycle_saves_answer_and_advances_state() {
        let page = ScriptedPage::new()
            .with_answer(ScriptedAnswer::new("See these.").with_link("https://arxiv.org/abs/2402.00003", "T"));
        let (dir, page, orchestrator) = orchestrator(page);

        let (cycle_num, answer) = orchestrator
            .run_manual_cycle("what is new?", Phase::Integrative, None)
            .await
            .unwrap();

        assert_eq!(cycle_num, 1);
        assert_eq!(answer.text, "See these.");
        assert!(page.is_closed());
        let project = Project::open(dir.path().join("demo")).unwrap();
        assert_eq!(project.state().total_cycles_completed, 1);
        assert_eq!(project.state().current_phase, Phase::Integrative);
        assert_eq!(project.state().papers_collected, 1);
        assert!(project.latest_checkpoint().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn already_complete_resume_runs_nothing() {
        let (_dir, page, orchestrator) = orchestrator(ScriptedPage::new());
        orchestrator
            .project()
            .save_checkpoint(&Checkpoint {
                cycle_num: 20,
                phase: Phase::Integrative,
                timestamp: Utc::now(),
                papers_found: 0,
                new_gaps: 0,
            })
            .unwrap();

        let outcome = orchestrator.resume().await.unwrap();

        assert!(matches!(outcome, ResumeOutcome::AlreadyComplete { last: 20 }));
        assert!(page.submitted().is_empty());
        assert!(page.is_closed());
    }
}
