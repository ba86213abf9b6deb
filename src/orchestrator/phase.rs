//! Research phases and their rotation

use serde::{Deserialize, Serialize};

/// Research intent governing how a cycle frames its questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Divergent exploration
    #[default]
    Expansive,
    /// Convergent synthesis
    Integrative,
    /// Reflective assessment
    Synthesis,
}

impl Phase {
    /// Rotation order.
    pub const ROTATION: [Phase; 3] = [Phase::Expansive, Phase::Integrative, Phase::Synthesis];

    /// Phase for the `index`-th cycle of a run.
    pub fn for_index(index: usize) -> Phase {
        Self::ROTATION[index % Self::ROTATION.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Expansive => "expansive",
            Phase::Integrative => "integrative",
            Phase::Synthesis => "synthesis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::Expansive => "Divergent exploration - what else could be relevant?",
            Phase::Integrative => "Convergent synthesis - how does this fit together?",
            Phase::Synthesis => "Reflective assessment - where do we stand now?",
        }
    }

    pub fn prompt_suffix(&self) -> &'static str {
        match self {
            Phase::Expansive => {
                "Focus on breadth. What related work exists? What adjacent fields might inform this? What are we missing?"
            }
            Phase::Integrative => {
                "Focus on depth. How do these findings connect? What patterns emerge? What contradictions exist?"
            }
            Phase::Synthesis => {
                "Focus on clarity. What do we now know vs. not know? What's validated? What gaps remain?"
            }
        }
    }

    /// Name with a leading capital, for document headings.
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Expansive => "Expansive",
            Phase::Integrative => "Integrative",
            Phase::Synthesis => "Synthesis",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_cycles_through_all_three() {
        let phases: Vec<Phase> = (0..6).map(Phase::for_index).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Expansive,
                Phase::Integrative,
                Phase::Synthesis,
                Phase::Expansive,
                Phase::Integrative,
                Phase::Synthesis
            ]
        );
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_yaml::to_string(&Phase::Integrative).unwrap().trim(), "integrative");
        let back: Phase = serde_yaml::from_str("synthesis").unwrap();
        assert_eq!(back, Phase::Synthesis);
    }
}
