//! Persisted document schemas

use crate::orchestrator::Phase;
use crate::session::{AnswerRecord, PaperReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached aggregate counters for a project (`.research-state.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_name: String,
    #[serde(default = "first_version")]
    pub current_hypothesis_version: u32,
    #[serde(default)]
    pub current_cycle: u32,
    #[serde(default)]
    pub current_phase: Phase,
    #[serde(default)]
    pub total_cycles_completed: u32,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gaps_count: usize,
    #[serde(default)]
    pub papers_collected: usize,
}

fn first_version() -> u32 {
    1
}

impl ProjectState {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            current_hypothesis_version: 1,
            current_cycle: 0,
            current_phase: Phase::Expansive,
            total_cycles_completed: 0,
            last_updated: Some(Utc::now()),
            gaps_count: 0,
            papers_collected: 0,
        }
    }
}

/// Project configuration (`config.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub settings: RunSettings,
}

/// Tunables for cycle runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Total cycles a resumed project runs up to
    pub resume_ceiling: u32,
    /// Completion budget per question
    pub response_timeout_secs: u64,
    /// Pause between questions in a cycle
    pub inter_question_delay_secs: u64,
    /// Cycles per `run` when not given, and for a fresh resume
    pub default_cycles: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            resume_ceiling: 20,
            response_timeout_secs: 120,
            inter_question_delay_secs: 2,
            default_cycles: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GapPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl GapPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapPriority::High => "high",
            GapPriority::Medium => "medium",
            GapPriority::Low => "low",
        }
    }
}

impl std::fmt::Display for GapPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gap before it has been registered (no id yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGap {
    pub description: String,
    pub priority: GapPriority,
    pub related_components: Vec<String>,
}

impl NewGap {
    pub fn new(description: impl Into<String>, priority: GapPriority) -> Self {
        Self {
            description: description.into(),
            priority,
            related_components: Vec::new(),
        }
    }
}

/// A tracked open question. Active until resolved; resolution is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: GapPriority,
    #[serde(default)]
    pub related_components: Vec<String>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Gap {
    pub fn register(id: u32, gap: NewGap) -> Self {
        Self {
            id,
            description: gap.description,
            priority: gap.priority,
            related_components: gap.related_components,
            created: Utc::now(),
            resolved: None,
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Close the gap with `reason`.
    pub fn resolve(self, reason: impl Into<String>) -> Self {
        Self {
            resolved: Some(Utc::now()),
            resolution: Some(reason.into()),
            ..self
        }
    }
}

/// `gaps/active.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveGaps {
    #[serde(default)]
    pub gaps: Vec<Gap>,
}

/// `gaps/resolved.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGaps {
    #[serde(default)]
    pub resolved: Vec<Gap>,
}

/// A registered paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub arxiv_id: Option<String>,
    pub added: DateTime<Utc>,
}

/// `resources/papers.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRegistry {
    #[serde(default)]
    pub papers: Vec<PaperEntry>,
}

/// Marker of a completed cycle, used to position a resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub cycle_num: u32,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    pub papers_found: usize,
    pub new_gaps: usize,
}

/// Per-cycle `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleMetadata {
    pub cycle_num: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub papers_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_gaps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesized: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_gaps_added: Option<usize>,
}

/// Machine-readable half of a response document pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    pub question: String,
    pub text: String,
    pub papers: Vec<PaperReference>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseDocument {
    pub fn new(question: &str, answer: &AnswerRecord) -> Self {
        Self {
            question: question.to_string(),
            text: answer.text.clone(),
            papers: answer.references.clone(),
            timestamp: answer.timestamp,
            error: answer.error.clone(),
        }
    }
}

/// One hypothesis version as stored under `hypotheses/vN/`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub version: u32,
    pub statement: String,
    /// `components.yaml`, carried as-is
    pub components: serde_yaml::Value,
    /// `status.yaml`, carried as-is
    pub status: serde_yaml::Value,
}

/// `status.yaml` written when a new hypothesis version is cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionStatus {
    pub overall: String,
    pub components_validated: usize,
    pub components_total: usize,
    pub last_updated: DateTime<Utc>,
    pub version_reason: String,
    pub previous_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_reads_with_missing_counters() {
        let state: ProjectState = serde_yaml::from_str("project_name: demo\n").unwrap();
        assert_eq!(state.current_hypothesis_version, 1);
        assert_eq!(state.total_cycles_completed, 0);
        assert_eq!(state.current_phase, Phase::Expansive);
    }

    #[test]
    fn settings_fill_defaults() {
        let settings: RunSettings = serde_yaml::from_str("resume_ceiling: 30\n").unwrap();
        assert_eq!(settings.resume_ceiling, 30);
        assert_eq!(settings.response_timeout_secs, 120);
        assert_eq!(settings.inter_question_delay_secs, 2);
    }

    #[test]
    fn resolving_a_gap_records_reason_and_time() {
        let gap = Gap::register(4, NewGap::new("missing baseline", GapPriority::High));
        assert!(!gap.is_resolved());

        let resolved = gap.resolve("found in 2401.00001");

        assert!(resolved.is_resolved());
        assert_eq!(resolved.id, 4);
        assert_eq!(resolved.resolution.as_deref(), Some("found in 2401.00001"));
    }

    #[test]
    fn active_gap_omits_resolution_fields() {
        let gap = Gap::register(1, NewGap::new("g", GapPriority::Medium));
        let yaml = serde_yaml::to_string(&gap).unwrap();
        assert!(!yaml.contains("resolved"));
        assert!(yaml.contains("priority: medium"));
    }
}
