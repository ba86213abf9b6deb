//! Per-cycle artifacts under `research/cycle-NNN/`

use super::store::{StoreError, StoreResult};
use super::types::{Checkpoint, CycleMetadata, Gap, NewGap, ResponseDocument};
use super::Project;
use crate::session::{AnswerRecord, PaperReference};
use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const RESEARCH_DIR: &str = "research";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const METADATA_FILE: &str = "metadata.json";

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| StoreError::Invalid {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// `cycle-007` for cycle 7.
pub fn cycle_dir_name(cycle_num: u32) -> String {
    format!("cycle-{:03}", cycle_num)
}

impl Project {
    /// Directory for cycle `cycle_num`, created with its `responses/` subdirectory.
    pub fn cycle_dir(&self, cycle_num: u32) -> StoreResult<PathBuf> {
        let dir = self.root.join(RESEARCH_DIR).join(cycle_dir_name(cycle_num));
        std::fs::create_dir_all(dir.join("responses"))?;
        Ok(dir)
    }

    pub fn save_cycle_questions(&self, cycle_num: u32, questions: &[String]) -> StoreResult<()> {
        let mut content = format!("# Questions for Cycle {}\n\n", cycle_num);
        for (i, question) in questions.iter().enumerate() {
            let _ = write!(content, "## Q{}\n\n{}\n\n", i + 1, question);
        }
        std::fs::write(self.cycle_dir(cycle_num)?.join("questions.md"), content)?;
        Ok(())
    }

    /// Write `qNN-response.md` and `qNN-response.json` for one answer.
    pub fn save_cycle_response(
        &self,
        cycle_num: u32,
        question_num: usize,
        question: &str,
        answer: &AnswerRecord,
    ) -> StoreResult<()> {
        let responses = self.cycle_dir(cycle_num)?.join("responses");
        let stem = format!("q{:02}-response", question_num);

        let mut content = format!(
            "# Response to Q{}\n\n## Question\n\n{}\n\n## Response\n\n{}\n\n## Papers Found\n\n",
            question_num, question, answer.text
        );
        for paper in &answer.references {
            let _ = writeln!(content, "- [{}]({})", paper.title, paper.url);
        }
        let _ = write!(content, "\n## Metadata\n\nTimestamp: {}\n", answer.timestamp.to_rfc3339());
        if let Some(error) = &answer.error {
            let _ = writeln!(content, "Error: {}", error);
        }

        std::fs::write(responses.join(format!("{}.md", stem)), content)?;
        write_json(
            &responses.join(format!("{}.json", stem)),
            &ResponseDocument::new(question, answer),
        )
    }

    /// Write the synthesis, fold papers and gaps into the registries and
    /// record the cycle metadata. Returns the gaps as registered.
    pub fn save_cycle_synthesis(
        &mut self,
        cycle_num: u32,
        synthesis: &str,
        new_gaps: Vec<NewGap>,
        papers: &[PaperReference],
    ) -> StoreResult<Vec<Gap>> {
        let dir = self.cycle_dir(cycle_num)?;
        std::fs::write(dir.join("synthesis.md"), synthesis)?;

        self.register_papers(papers)?;
        let recorded = self.record_gaps(new_gaps)?;

        let questions_count = std::fs::read_dir(dir.join("responses"))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
            .count();
        let metadata = CycleMetadata {
            cycle_num,
            completed: Some(Utc::now()),
            questions_count: Some(questions_count),
            papers_found: Some(papers.len()),
            new_gaps: Some(recorded.len()),
            ..CycleMetadata::default()
        };
        write_json(&dir.join(METADATA_FILE), &metadata)?;
        Ok(recorded)
    }

    /// Save a hand-written synthesis and its gaps, merging into existing metadata.
    pub fn save_manual_synthesis(
        &mut self,
        cycle_num: u32,
        synthesis: &str,
        gap_descriptions: &[String],
    ) -> StoreResult<Vec<Gap>> {
        let dir = self.cycle_dir(cycle_num)?;
        std::fs::write(dir.join("synthesis.md"), synthesis)?;

        let recorded = self.record_gaps(
            gap_descriptions
                .iter()
                .map(|d| NewGap::new(d.as_str(), Default::default()))
                .collect(),
        )?;

        let path = dir.join(METADATA_FILE);
        let mut metadata: CycleMetadata = if path.is_file() {
            read_json(&path)?
        } else {
            CycleMetadata::default()
        };
        metadata.cycle_num = cycle_num;
        metadata.synthesized = Some(Utc::now());
        metadata.new_gaps_added = Some(recorded.len());
        write_json(&path, &metadata)?;
        Ok(recorded)
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let dir = self.cycle_dir(checkpoint.cycle_num)?;
        write_json(&dir.join(CHECKPOINT_FILE), checkpoint)
    }

    pub fn cycle_metadata(&self, cycle_num: u32) -> StoreResult<Option<CycleMetadata>> {
        let path = self
            .root
            .join(RESEARCH_DIR)
            .join(cycle_dir_name(cycle_num))
            .join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Names of the cycle directories, in order.
    fn cycle_dirs(&self) -> StoreResult<Vec<PathBuf>> {
        let research = self.root.join(RESEARCH_DIR);
        if !research.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&research)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("cycle-"))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Every checkpoint on disk, ordered by cycle number.
    pub fn checkpoints(&self) -> StoreResult<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        for dir in self.cycle_dirs()? {
            let path = dir.join(CHECKPOINT_FILE);
            if path.is_file() {
                checkpoints.push(read_json::<Checkpoint>(&path)?);
            }
        }
        checkpoints.sort_by_key(|c| c.cycle_num);
        Ok(checkpoints)
    }

    pub fn latest_checkpoint(&self) -> StoreResult<Option<Checkpoint>> {
        Ok(self.checkpoints()?.pop())
    }

    /// Directory names of the last `n` cycles.
    pub fn recent_cycles(&self, n: usize) -> StoreResult<Vec<String>> {
        let names: Vec<String> = self
            .cycle_dirs()?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        let skip = names.len().saturating_sub(n);
        Ok(names.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Phase;
    use crate::project::GapPriority;

    fn new_project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path(), "demo").unwrap();
        (dir, project)
    }

    fn checkpoint(cycle_num: u32) -> Checkpoint {
        Checkpoint {
            cycle_num,
            phase: Phase::Integrative,
            timestamp: Utc::now(),
            papers_found: 3,
            new_gaps: 1,
        }
    }

    #[test]
    fn questions_and_responses_land_in_cycle_dir() {
        let (_dir, project) = new_project();
        project
            .save_cycle_questions(4, &["What is new?".to_string(), "Why?".to_string()])
            .unwrap();
        let answer = AnswerRecord::new(
            "Plenty.",
            vec![PaperReference::from_link("https://arxiv.org/abs/2401.00001", "Sparse").unwrap()],
        );
        project.save_cycle_response(4, 1, "What is new?", &answer).unwrap();

        let dir = project.root().join("research/cycle-004");
        let questions = std::fs::read_to_string(dir.join("questions.md")).unwrap();
        assert!(questions.starts_with("# Questions for Cycle 4"));
        assert!(questions.contains("## Q2\n\nWhy?"));

        let md = std::fs::read_to_string(dir.join("responses/q01-response.md")).unwrap();
        assert!(md.contains("- [Sparse](https://arxiv.org/abs/2401.00001)"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("responses/q01-response.json")).unwrap())
                .unwrap();
        assert_eq!(json["papers"][0]["arxiv_id"], "2401.00001");
    }

    #[test]
    fn synthesis_updates_registries_and_metadata() {
        let (_dir, mut project) = new_project();
        let answer = AnswerRecord::new("text", Vec::new());
        project.save_cycle_response(1, 1, "q", &answer).unwrap();
        let papers = vec![PaperReference::from_link("https://arxiv.org/abs/2401.00002", "").unwrap()];

        let gaps = project
            .save_cycle_synthesis(1, "# Synthesis", vec![NewGap::new("gap", GapPriority::Medium)], &papers)
            .unwrap();

        assert_eq!(gaps[0].id, 1);
        assert_eq!(project.state().papers_collected, 1);
        let metadata = project.cycle_metadata(1).unwrap().unwrap();
        assert_eq!(metadata.questions_count, Some(1));
        assert_eq!(metadata.papers_found, Some(1));
        assert_eq!(metadata.new_gaps, Some(1));
    }

    #[test]
    fn manual_synthesis_merges_metadata() {
        let (_dir, mut project) = new_project();
        project.save_cycle_synthesis(2, "auto", Vec::new(), &[]).unwrap();

        project
            .save_manual_synthesis(2, "# Written by hand", &["a".to_string(), "b".to_string()])
            .unwrap();

        let metadata = project.cycle_metadata(2).unwrap().unwrap();
        assert!(metadata.completed.is_some());
        assert!(metadata.synthesized.is_some());
        assert_eq!(metadata.new_gaps_added, Some(2));
        assert_eq!(project.active_gaps().unwrap().len(), 2);
    }

    #[test]
    fn latest_checkpoint_is_highest_cycle() {
        let (_dir, project) = new_project();
        assert!(project.latest_checkpoint().unwrap().is_none());

        for n in [2, 10, 7] {
            project.save_checkpoint(&checkpoint(n)).unwrap();
        }
        project.cycle_dir(11).unwrap();

        assert_eq!(project.latest_checkpoint().unwrap().unwrap().cycle_num, 10);
        assert_eq!(project.checkpoints().unwrap().len(), 3);
        assert_eq!(
            project.recent_cycles(2).unwrap(),
            vec!["cycle-010".to_string(), "cycle-011".to_string()]
        );
    }
}
