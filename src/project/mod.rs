//! Research project on disk: state, gaps, papers, hypotheses, cycle artifacts
//!
//! Every record is a whole-file document read and rewritten through the
//! `DocumentStore`. The cached `ProjectState` is flushed on each update;
//! the files are the source of truth.

mod artifacts;
mod scaffold;
mod store;
mod types;

pub use artifacts::cycle_dir_name;
pub use store::{DocumentStore, DocumentStoreExt, StoreError, StoreResult, YamlStore};
pub use types::{
    ActiveGaps, Checkpoint, CycleMetadata, Gap, GapPriority, Hypothesis, NewGap, PaperEntry,
    PaperRegistry, ProjectConfig, ProjectState, ResolvedGaps, ResponseDocument, RunSettings,
    VersionStatus,
};

use crate::session::PaperReference;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = ".research-state.yaml";
pub const CONFIG_FILE: &str = "config.yaml";
const ACTIVE_GAPS: &str = "gaps/active.yaml";
const RESOLVED_GAPS: &str = "gaps/resolved.yaml";
const PAPERS: &str = "resources/papers.yaml";
const CONCEPT: &str = "concept/README.md";

/// Handle on one research project directory.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    store: YamlStore,
    state: ProjectState,
    config: ProjectConfig,
}

impl Project {
    /// Whether `path` holds a research project.
    pub fn is_project_dir(path: &Path) -> bool {
        path.join(STATE_FILE).is_file()
    }

    /// Create `parent/name` with the starter layout, state and config.
    pub fn create(parent: &Path, name: &str) -> StoreResult<Self> {
        let root = parent.join(name);
        if root.exists() {
            return Err(StoreError::AlreadyExists(root));
        }
        scaffold::create_layout(&root)?;

        let store = YamlStore::new(&root);
        let state = ProjectState::new(name);
        let config = ProjectConfig {
            project_name: name.to_string(),
            created: Utc::now(),
            settings: RunSettings::default(),
        };
        store.write_doc(STATE_FILE, &state)?;
        store.write_doc(CONFIG_FILE, &config)?;
        tracing::debug!(root = %root.display(), "project created");

        Ok(Self {
            root,
            store,
            state,
            config,
        })
    }

    /// Open an existing project rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !Self::is_project_dir(&root) {
            return Err(StoreError::NotAProject(root));
        }
        let store = YamlStore::new(&root);
        let state: ProjectState = store.read_doc(STATE_FILE)?;
        let config = match store.read_document(CONFIG_FILE)? {
            serde_yaml::Value::Null => ProjectConfig {
                project_name: state.project_name.clone(),
                created: Utc::now(),
                settings: RunSettings::default(),
            },
            _ => store.read_doc(CONFIG_FILE)?,
        };
        Ok(Self {
            root,
            store,
            state,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn settings(&self) -> &RunSettings {
        &self.config.settings
    }

    /// Apply `update` to the state and flush it.
    pub fn update_state(&mut self, update: impl FnOnce(&mut ProjectState)) -> StoreResult<()> {
        update(&mut self.state);
        self.state.last_updated = Some(Utc::now());
        self.store.write_doc(STATE_FILE, &self.state)
    }

    pub fn concept(&self) -> StoreResult<String> {
        Ok(std::fs::read_to_string(self.root.join(CONCEPT))?)
    }

    fn hypothesis_dir(&self, version: u32) -> PathBuf {
        self.root.join("hypotheses").join(format!("v{}", version))
    }

    pub fn current_hypothesis(&self) -> StoreResult<Hypothesis> {
        let version = self.state.current_hypothesis_version;
        let base = format!("hypotheses/v{}", version);
        Ok(Hypothesis {
            version,
            statement: std::fs::read_to_string(self.hypothesis_dir(version).join("hypothesis.md"))?,
            components: self.store.read_document(&format!("{}/components.yaml", base))?,
            status: self.store.read_document(&format!("{}/status.yaml", base))?,
        })
    }

    /// Cut a new hypothesis version from the current one.
    ///
    /// Components carry over; validation status resets.
    pub fn create_hypothesis_version(&mut self, statement: &str, reason: &str) -> StoreResult<u32> {
        let current = self.state.current_hypothesis_version;
        let next = current + 1;
        let components = self
            .store
            .read_document(&format!("hypotheses/v{}/components.yaml", current))?;

        let dir = self.hypothesis_dir(next);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("hypothesis.md"), statement)?;
        self.store
            .write_document(&format!("hypotheses/v{}/components.yaml", next), &components)?;

        let components_total = components
            .get("components")
            .and_then(|c| c.as_sequence())
            .map_or(0, |c| c.len());
        let status = VersionStatus {
            overall: "untested".to_string(),
            components_validated: 0,
            components_total,
            last_updated: Utc::now(),
            version_reason: reason.to_string(),
            previous_version: current,
        };
        self.store
            .write_doc(&format!("hypotheses/v{}/status.yaml", next), &status)?;

        self.update_state(|s| s.current_hypothesis_version = next)?;
        Ok(next)
    }

    pub fn active_gaps(&self) -> StoreResult<Vec<Gap>> {
        Ok(self.store.read_doc_or_default::<ActiveGaps>(ACTIVE_GAPS)?.gaps)
    }

    pub fn resolved_gaps(&self) -> StoreResult<Vec<Gap>> {
        Ok(self.store.read_doc_or_default::<ResolvedGaps>(RESOLVED_GAPS)?.resolved)
    }

    /// Register new gaps with monotonic ids. Returns them as stored.
    pub fn record_gaps(&mut self, new_gaps: Vec<NewGap>) -> StoreResult<Vec<Gap>> {
        let mut active: ActiveGaps = self.store.read_doc_or_default(ACTIVE_GAPS)?;
        let resolved = self.resolved_gaps()?;
        let mut next_id = active
            .gaps
            .iter()
            .chain(resolved.iter())
            .map(|g| g.id)
            .max()
            .unwrap_or(0);

        let mut recorded = Vec::with_capacity(new_gaps.len());
        for gap in new_gaps {
            next_id += 1;
            let gap = Gap::register(next_id, gap);
            active.gaps.push(gap.clone());
            recorded.push(gap);
        }

        self.store.write_doc(ACTIVE_GAPS, &active)?;
        let count = active.gaps.len();
        self.update_state(|s| s.gaps_count = count)?;
        Ok(recorded)
    }

    /// Add a single gap; returns its id.
    pub fn add_gap(&mut self, description: &str, priority: GapPriority) -> StoreResult<u32> {
        let recorded = self.record_gaps(vec![NewGap::new(description, priority)])?;
        Ok(recorded.first().map_or(0, |g| g.id))
    }

    /// Move gap `id` from active to resolved.
    pub fn resolve_gap(&mut self, id: u32, reason: &str) -> StoreResult<Gap> {
        let mut active: ActiveGaps = self.store.read_doc_or_default(ACTIVE_GAPS)?;
        let position = active
            .gaps
            .iter()
            .position(|g| g.id == id)
            .ok_or(StoreError::GapNotFound(id))?;
        let resolved_gap = active.gaps.remove(position).resolve(reason);

        self.store.write_doc(ACTIVE_GAPS, &active)?;

        let mut resolved: ResolvedGaps = self.store.read_doc_or_default(RESOLVED_GAPS)?;
        resolved.resolved.push(resolved_gap.clone());
        self.store.write_doc(RESOLVED_GAPS, &resolved)?;

        let count = active.gaps.len();
        self.update_state(|s| s.gaps_count = count)?;
        Ok(resolved_gap)
    }

    pub fn papers(&self) -> StoreResult<Vec<PaperEntry>> {
        Ok(self.store.read_doc_or_default::<PaperRegistry>(PAPERS)?.papers)
    }

    /// Add papers not yet registered (by URL). Returns how many were new.
    pub fn register_papers(&mut self, references: &[PaperReference]) -> StoreResult<usize> {
        let mut registry: PaperRegistry = self.store.read_doc_or_default(PAPERS)?;
        let mut known: HashSet<String> = registry.papers.iter().map(|p| p.url.clone()).collect();

        let before = registry.papers.len();
        for reference in references {
            if known.insert(reference.url.clone()) {
                registry.papers.push(PaperEntry {
                    title: reference.title.clone(),
                    url: reference.url.clone(),
                    arxiv_id: Some(reference.arxiv_id.clone()),
                    added: Utc::now(),
                });
            }
        }
        let added = registry.papers.len() - before;

        self.store.write_doc(PAPERS, &registry)?;
        let total = registry.papers.len();
        self.update_state(|s| s.papers_collected = total)?;
        Ok(added)
    }

    /// Summary that re-establishes context in a fresh conversation.
    pub fn context_recap(&self) -> StoreResult<String> {
        let hypothesis = self.current_hypothesis()?;
        let gaps = self.active_gaps()?;
        let statement: String = hypothesis.statement.chars().take(500).collect();

        let mut recap = format!(
            "Research Project: {}\nHypothesis Version: v{}\nCycles Completed: {}\n\n\
             Current Hypothesis:\n{}...\n\nKey Active Gaps ({} total):\n",
            self.state.project_name,
            self.state.current_hypothesis_version,
            self.state.total_cycles_completed,
            statement,
            gaps.len()
        );
        for gap in gaps.iter().take(5) {
            let description = if gap.description.is_empty() {
                "No description"
            } else {
                gap.description.as_str()
            };
            recap.push_str(&format!("- {}\n", description));
        }
        Ok(recap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path(), "demo").unwrap();
        (dir, project)
    }

    fn reference(id: &str, url: &str) -> PaperReference {
        PaperReference {
            title: format!("Paper {}", id),
            url: url.to_string(),
            arxiv_id: id.to_string(),
        }
    }

    #[test]
    fn create_then_open_round_trips_state() {
        let (dir, project) = new_project();
        assert!(Project::is_project_dir(project.root()));

        let reopened = Project::open(dir.path().join("demo")).unwrap();
        assert_eq!(reopened.state().project_name, "demo");
        assert_eq!(reopened.settings().resume_ceiling, 20);
    }

    #[test]
    fn create_refuses_existing_directory() {
        let (dir, _project) = new_project();
        let err = Project::create(dir.path(), "demo").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::NotAProject(_)));
    }

    #[test]
    fn gap_ids_are_monotonic_and_resolution_moves_gap() {
        let (_dir, mut project) = new_project();
        let first = project.add_gap("no baseline for sparse attention", GapPriority::High).unwrap();
        let second = project.add_gap("unclear scaling law", GapPriority::Low).unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(project.state().gaps_count, 2);

        let resolved = project.resolve_gap(1, "covered by 2401.00001").unwrap();

        assert!(resolved.is_resolved());
        assert_eq!(project.active_gaps().unwrap().len(), 1);
        assert_eq!(project.resolved_gaps().unwrap()[0].id, 1);
        assert_eq!(project.state().gaps_count, 1);
        assert_eq!(project.add_gap("third", GapPriority::Medium).unwrap(), 3);
    }

    #[test]
    fn resolving_the_newest_gap_does_not_free_its_id() {
        let (_dir, mut project) = new_project();
        project.add_gap("first", GapPriority::Medium).unwrap();
        let second = project.add_gap("second", GapPriority::Medium).unwrap();
        project.resolve_gap(second, "answered").unwrap();

        let third = project.add_gap("third", GapPriority::Medium).unwrap();

        assert_eq!(third, 3);
        let active: Vec<u32> = project.active_gaps().unwrap().iter().map(|g| g.id).collect();
        assert_eq!(active, vec![1, 3]);
        assert_eq!(project.resolved_gaps().unwrap()[0].id, 2);
    }

    #[test]
    fn resolving_unknown_gap_fails() {
        let (_dir, mut project) = new_project();
        let err = project.resolve_gap(9, "n/a").unwrap_err();
        assert!(matches!(err, StoreError::GapNotFound(9)));
    }

    #[test]
    fn papers_are_deduplicated_by_url() {
        let (_dir, mut project) = new_project();
        let a = reference("2401.00001", "https://arxiv.org/abs/2401.00001");
        let b = reference("2401.00002", "https://arxiv.org/abs/2401.00002");

        assert_eq!(project.register_papers(&[a.clone(), b]).unwrap(), 2);
        assert_eq!(project.register_papers(&[a]).unwrap(), 0);
        assert_eq!(project.state().papers_collected, 2);
        assert_eq!(project.papers().unwrap().len(), 2);
    }

    #[test]
    fn hypothesis_versioning_carries_components() {
        let (_dir, mut project) = new_project();

        let version = project
            .create_hypothesis_version("# Hypothesis v2\n\nSharper claim.", "new evidence")
            .unwrap();

        assert_eq!(version, 2);
        let hypothesis = project.current_hypothesis().unwrap();
        assert_eq!(hypothesis.version, 2);
        assert!(hypothesis.statement.contains("Sharper claim"));
        assert_eq!(
            hypothesis.status.get("components_total").and_then(|v| v.as_u64()),
            Some(1)
        );
        assert_eq!(
            hypothesis.status.get("previous_version").and_then(|v| v.as_u64()),
            Some(1)
        );
    }

    #[test]
    fn recap_lists_first_five_gaps() {
        let (_dir, mut project) = new_project();
        for i in 0..7 {
            project.add_gap(&format!("gap number {}", i), GapPriority::Medium).unwrap();
        }

        let recap = project.context_recap().unwrap();

        assert!(recap.contains("Research Project: demo"));
        assert!(recap.contains("Key Active Gaps (7 total)"));
        assert!(recap.contains("- gap number 4"));
        assert!(!recap.contains("- gap number 5"));
    }
}
