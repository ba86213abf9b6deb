//! Cycle synthesis: the summary document, gap detection, versioning trigger

use super::Phase;
use crate::project::{GapPriority, NewGap};
use crate::session::{AnswerRecord, PaperReference};
use std::fmt::Write as _;

/// Phrases that suggest an answer is pointing at an open gap.
pub const GAP_MARKERS: [&str; 5] = [
    "open question",
    "remains unclear",
    "future work",
    "not yet understood",
    "gap in",
];

const FINDINGS_LIMIT: usize = 2000;
const LISTED_PAPERS: usize = 10;
const VERSIONING_PAPER_THRESHOLD: usize = 10;

/// Join answer texts the way they appear in the synthesis.
pub fn combined_text(answers: &[AnswerRecord]) -> String {
    answers
        .iter()
        .map(|a| a.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// At most one gap per cycle: the first marker found, case-insensitive.
pub fn detect_gap(text: &str) -> Option<NewGap> {
    let lowered = text.to_lowercase();
    GAP_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
        .map(|marker| {
            NewGap::new(
                format!("Gap identified via indicator: '{}'", marker),
                GapPriority::Medium,
            )
        })
}

/// Markdown synthesis for a cycle. Placeholder sections are left for a
/// human (or a later pass) to fill in.
pub fn build_synthesis(phase: Phase, answers: &[AnswerRecord], papers: &[PaperReference]) -> String {
    let findings: String = combined_text(answers).chars().take(FINDINGS_LIMIT).collect();

    let mut doc = format!(
        "# Cycle Synthesis - {} Phase\n\n*Focus: {}*\n\n## Summary\n\n\
         [Synthesize the key findings from this cycle]\n\n## Key Findings\n\n{}...\n\n\
         ## Papers Collected ({})\n\n",
        phase.title(),
        phase.prompt_suffix(),
        findings,
        papers.len()
    );
    for paper in papers.iter().take(LISTED_PAPERS) {
        let _ = writeln!(doc, "- [{}]({})", paper.title, paper.url);
    }
    doc.push_str(
        "\n## Patterns Identified\n\n[Identify patterns, convergences, contradictions]\n\n\
         ## Implications for Hypothesis\n\n[How do these findings affect the hypothesis?]\n\n\
         ## Next Steps\n\n[What should be investigated next?]\n",
    );
    doc
}

/// Many papers found plus at least one new gap suggests the hypothesis
/// is due for a new version.
pub fn should_version_hypothesis(papers_found: usize, new_gaps: usize) -> bool {
    papers_found > VERSIONING_PAPER_THRESHOLD && new_gaps > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(n: u32) -> PaperReference {
        PaperReference::from_link(&format!("https://arxiv.org/abs/2401.{:05}", n), "").unwrap()
    }

    #[test]
    fn one_gap_even_with_repeated_markers() {
        let gap = detect_gap("It Remains Unclear whether... it remains unclear. Future work: open question.")
            .unwrap();
        assert_eq!(gap.description, "Gap identified via indicator: 'open question'");
        assert_eq!(gap.priority, GapPriority::Medium);
    }

    #[test]
    fn repeated_single_marker_is_one_gap() {
        let text = "Whether this transfers remains unclear. Scaling also remains unclear.";
        let gaps: Vec<NewGap> = detect_gap(text).into_iter().collect();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].related_components.is_empty());
    }

    #[test]
    fn marker_order_decides_which_gap() {
        let gap = detect_gap("this remains unclear").unwrap();
        assert_eq!(gap.description, "Gap identified via indicator: 'remains unclear'");
        assert!(detect_gap("everything is settled").is_none());
    }

    #[test]
    fn synthesis_lists_at_most_ten_papers() {
        let papers: Vec<_> = (1..=12).map(paper).collect();
        let answers = vec![AnswerRecord::new("alpha", Vec::new()), AnswerRecord::new("beta", Vec::new())];

        let doc = build_synthesis(Phase::Integrative, &answers, &papers);

        assert!(doc.starts_with("# Cycle Synthesis - Integrative Phase"));
        assert!(doc.contains("alpha\n\n---\n\nbeta..."));
        assert!(doc.contains("## Papers Collected (12)"));
        assert_eq!(doc.matches("](https://arxiv.org/abs/").count(), 10);
        assert!(doc.contains("## Next Steps"));
    }

    #[test]
    fn findings_are_clipped() {
        let answers = vec![AnswerRecord::new("y".repeat(5000), Vec::new())];
        let doc = build_synthesis(Phase::Expansive, &answers, &[]);
        assert!(doc.contains(&format!("{}...", "y".repeat(2000))));
        assert!(!doc.contains(&"y".repeat(2001)));
    }

    #[test]
    fn versioning_needs_papers_and_gaps() {
        assert!(should_version_hypothesis(11, 1));
        assert!(!should_version_hypothesis(10, 3));
        assert!(!should_version_hypothesis(40, 0));
    }
}
