//! Question generation per phase

use super::Phase;
use crate::project::{Gap, Hypothesis};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// Topic used when the concept has nothing substantive yet.
pub const FALLBACK_TOPIC: &str = "machine learning research";

const GENERIC_HEADERS: &[&str] = &[
    "concept",
    "core theory",
    "key definitions",
    "scope",
    "overview",
    "introduction",
    "background",
    "abstract",
    "summary",
];

const TOPIC_LIMIT: usize = 100;

/// Everything a strategy may draw on for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct QuestionContext<'a> {
    pub concept: &'a str,
    pub hypothesis: &'a Hypothesis,
    pub gaps: &'a [Gap],
    pub phase: Phase,
    pub cycle_num: u32,
}

/// Produces the questions asked in a cycle.
pub trait QuestionStrategy: Send + Sync {
    /// Questions for the cycle, in asking order. Must not be empty.
    fn generate(&self, context: &QuestionContext<'_>) -> Vec<String>;
}

/// Templates keyed on phase, the concept's topic and the active gaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQuestionStrategy;

impl QuestionStrategy for DefaultQuestionStrategy {
    fn generate(&self, context: &QuestionContext<'_>) -> Vec<String> {
        let topic = extract_topic(context.concept);
        tracing::debug!(topic = %topic, phase = %context.phase, "generating questions");

        let described = |limit: usize| -> Vec<&str> {
            context
                .gaps
                .iter()
                .take(limit)
                .map(|g| g.description.as_str())
                .filter(|d| !d.is_empty())
                .collect()
        };

        let mut questions = Vec::new();
        match context.phase {
            Phase::Expansive => {
                questions.push(format!(
                    "What are the most significant recent papers (last 2 years) related to {}? \
                     Include work from adjacent fields that might offer relevant insights.",
                    topic
                ));
                for gap in described(2) {
                    questions.push(format!(
                        "What existing research addresses this gap: {}? \
                         Include both theoretical and empirical work.",
                        gap
                    ));
                }
            }
            Phase::Integrative => {
                questions.push(format!(
                    "How do recent findings in {} connect to or contradict each other? \
                     What patterns emerge?",
                    topic
                ));
                let gaps = described(3);
                if !gaps.is_empty() {
                    questions.push(format!(
                        "Is there research that bridges these related gaps: {}?",
                        gaps.join("; ")
                    ));
                }
            }
            Phase::Synthesis => {
                questions.push(format!(
                    "What is the current consensus on {}? What remains contested or unresolved?",
                    topic
                ));
                questions.push(
                    "Based on the literature, what are the most critical open problems \
                     and most promising research directions?"
                        .to_string(),
                );
            }
        }

        if questions.is_empty() {
            questions.push(format!(
                "What are the most important recent developments in {}?",
                topic
            ));
        }
        questions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Heading,
    Body,
}

fn flush(kind: Option<Block>, buffer: &mut String, out: &mut Vec<(Block, String)>) {
    let text = buffer.trim().to_string();
    buffer.clear();
    if let (Some(kind), false) = (kind, text.is_empty()) {
        out.push((kind, text));
    }
}

/// Text blocks of a markdown document, in order.
fn blocks(markdown: &str) -> Vec<(Block, String)> {
    let mut out = Vec::new();
    let mut current: Option<Block> = None;
    let mut buffer = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                flush(current, &mut buffer, &mut out);
                current = Some(Block::Heading);
            }
            Event::Start(Tag::Paragraph) | Event::Start(Tag::Item) | Event::Start(Tag::List(_)) => {
                flush(current, &mut buffer, &mut out);
                current = Some(Block::Body);
            }
            Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => {
                flush(current, &mut buffer, &mut out);
            }
            Event::Text(text) | Event::Code(text) => buffer.push_str(&text),
            Event::SoftBreak | Event::HardBreak => buffer.push(' '),
            _ => {}
        }
    }
    flush(current, &mut buffer, &mut out);
    out
}

/// The concept's main topic: the first substantive body text or specific
/// heading that is not a generic section name.
pub fn extract_topic(concept: &str) -> String {
    for (kind, text) in blocks(concept) {
        if GENERIC_HEADERS.contains(&text.to_lowercase().as_str()) {
            continue;
        }
        let len = text.chars().count();
        let substantive = match kind {
            Block::Body => len > 20,
            Block::Heading => len > 10,
        };
        if substantive {
            return text.chars().take(TOPIC_LIMIT).collect();
        }
    }
    FALLBACK_TOPIC.to_string()
}
