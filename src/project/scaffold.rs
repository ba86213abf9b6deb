//! Directory layout and starter files for a new project

use super::store::StoreResult;
use std::path::Path;

/// A node of the starter layout.
enum Entry {
    Dir(&'static str, &'static [Entry]),
    File(&'static str, &'static str),
}

use Entry::{Dir, File};

const CONCEPT_README: &str =
    "# Concept\n\n## Core Theory\n\n[Describe your theory here]\n\n## Key Definitions\n\n## Scope\n";

const HYPOTHESIS_V1: &str =
    "# Hypothesis v1\n\n## Statement\n\n[Your falsifiable hypothesis]\n\n## Components\n\n1. \n2. \n3. \n\n## Predictions\n\n";

const COMPONENTS: &str = "# Decomposed verifiable claims\ncomponents:\n  - id: 1\n    claim: \"\"\n    status: untested\n    evidence: []\n";

const STATUS: &str =
    "# Validation status\noverall: untested\ncomponents_validated: 0\ncomponents_total: 0\nlast_updated: \"\"\n";

const LAYOUT: &[Entry] = &[
    Dir("concept", &[File("README.md", CONCEPT_README)]),
    Dir(
        "hypotheses",
        &[Dir(
            "v1",
            &[
                File("hypothesis.md", HYPOTHESIS_V1),
                File("components.yaml", COMPONENTS),
                File("status.yaml", STATUS),
            ],
        )],
    ),
    Dir("research", &[]),
    Dir(
        "gaps",
        &[
            File("active.yaml", "# Active gaps requiring investigation\ngaps: []\n"),
            File("resolved.yaml", "# Resolved gaps\nresolved: []\n"),
        ],
    ),
    Dir(
        "resources",
        &[
            File("papers.yaml", "# Collected papers\npapers: []\n"),
            File("code.yaml", "# Code repositories\nrepos: []\n"),
            Dir("downloads", &[]),
        ],
    ),
    Dir(
        "tests",
        &[File("registry.yaml", "# Test registry\ntests: []\n"), Dir("protocols", &[])],
    ),
    Dir("results", &[]),
];

/// Create the starter layout under `root`.
pub(crate) fn create_layout(root: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(root)?;
    write_entries(root, LAYOUT)
}

fn write_entries(base: &Path, entries: &[Entry]) -> StoreResult<()> {
    for entry in entries {
        match entry {
            Dir(name, children) => {
                let dir = base.join(name);
                std::fs::create_dir_all(&dir)?;
                write_entries(&dir, children)?;
            }
            File(name, content) => std::fs::write(base.join(name), content)?,
        }
    }
    Ok(())
}
