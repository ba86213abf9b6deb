//! End-to-end cycle runs against a scripted assistant page
//!
//! Run with: `cargo test --test cycle_run`

mod common;

use common::{answer, orchestrator, project, steady_page, with_history};
use research_verifier::{Phase, Project, ScriptedPage};

#[tokio::test(start_paused = true)]
async fn three_cycles_rotate_phases_and_checkpoint_each() {
    let (dir, project) = project();
    let (page, orchestrator) = orchestrator(project, steady_page());

    let report = orchestrator.run_cycles(3, None).await.unwrap();

    let phases: Vec<Phase> = report.cycles.iter().map(|c| c.phase).collect();
    assert_eq!(phases, vec![Phase::Expansive, Phase::Integrative, Phase::Synthesis]);
    let numbers: Vec<u32> = report.cycles.iter().map(|c| c.cycle_num).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let project = Project::open(dir.path().join("sparse-attention")).unwrap();
    let checkpoints: Vec<u32> = project.checkpoints().unwrap().iter().map(|c| c.cycle_num).collect();
    assert_eq!(checkpoints, vec![1, 2, 3]);
    assert_eq!(project.state().total_cycles_completed, 3);
    assert_eq!(project.state().current_phase, Phase::Synthesis);
    assert_eq!(project.state().papers_collected, 1);

    // expansive and integrative ask one question each without gaps, synthesis asks two
    assert_eq!(page.submitted().len(), 4);
    assert!(page.submitted()[0].contains("Sparse attention lets transformers generalize"));
    assert!(page.is_closed());
}

#[tokio::test(start_paused = true)]
async fn cycle_artifacts_are_written() {
    let (dir, project) = project();
    let (_page, orchestrator) = orchestrator(project, steady_page());

    orchestrator.run_cycles(1, Some(Phase::Synthesis)).await.unwrap();

    let cycle = dir.path().join("sparse-attention/research/cycle-001");
    for file in [
        "questions.md",
        "synthesis.md",
        "metadata.json",
        "checkpoint.json",
        "responses/q01-response.md",
        "responses/q01-response.json",
        "responses/q02-response.md",
    ] {
        assert!(cycle.join(file).is_file(), "missing {file}");
    }
    let synthesis = std::fs::read_to_string(cycle.join("synthesis.md")).unwrap();
    assert!(synthesis.starts_with("# Cycle Synthesis - Synthesis Phase"));
    assert!(synthesis.contains("## Papers Collected (1)"));
}

#[tokio::test(start_paused = true)]
async fn phase_override_pins_every_cycle() {
    let (_dir, project) = project();
    let (_page, orchestrator) = orchestrator(project, steady_page());

    let report = orchestrator.run_cycles(2, Some(Phase::Integrative)).await.unwrap();

    assert!(report.cycles.iter().all(|c| c.phase == Phase::Integrative));
}

#[tokio::test(start_paused = true)]
async fn recap_opens_a_run_with_prior_cycles() {
    let (_dir, mut project) = project();
    with_history(&mut project, 2);
    let (page, orchestrator) = orchestrator(project, steady_page());

    let report = orchestrator.run_cycles(1, None).await.unwrap();

    assert_eq!(report.cycles[0].cycle_num, 3);
    assert_eq!(report.cycles[0].phase, Phase::Expansive);
    let submitted = page.submitted();
    assert!(submitted[0].starts_with("I'm researching the following topic"));
    assert!(submitted[0].contains("Cycles Completed: 2"));
    assert_eq!(submitted.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn fresh_project_skips_recap() {
    let (_dir, project) = project();
    let (page, orchestrator) = orchestrator(project, steady_page());

    orchestrator.run_cycles(1, None).await.unwrap();

    assert!(!page.submitted()[0].starts_with("I'm researching"));
}

#[tokio::test(start_paused = true)]
async fn detected_gap_feeds_the_next_cycle() {
    let (dir, project) = project();
    let page = ScriptedPage::new()
        .with_default_answer(answer("How this scales remains an open question.", &["2401.00009"]));
    let (page, orchestrator) = orchestrator(project, page);

    let report = orchestrator.run_cycles(2, None).await.unwrap();

    assert_eq!(report.cycles[0].new_gaps.len(), 1);
    assert_eq!(report.cycles[0].new_gaps[0].id, 1);
    let bridge = &page.submitted()[2];
    assert!(bridge.contains("bridges these related gaps: Gap identified via indicator: 'open question'"));

    let project = Project::open(dir.path().join("sparse-attention")).unwrap();
    assert_eq!(project.active_gaps().unwrap().len(), 2);
    assert_eq!(project.state().gaps_count, 2);
}

#[tokio::test(start_paused = true)]
async fn many_papers_and_a_gap_suggest_versioning() {
    let (_dir, project) = project();
    let ids: Vec<String> = (1..=11).map(|n| format!("2401.{:05}", n)).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let page = ScriptedPage::new().with_default_answer(answer("Future work should test this.", &ids));
    let (_page, orchestrator) = orchestrator(project, page);

    let report = orchestrator.run_cycles(1, None).await.unwrap();

    assert_eq!(report.papers_found(), 11);
    assert!(report.versioning_suggested);
}

#[tokio::test(start_paused = true)]
async fn papers_repeated_across_cycles_count_toward_versioning() {
    let (_dir, project) = project();
    let ids = ["2401.00001", "2401.00002", "2401.00003", "2401.00004", "2401.00005", "2401.00006"];
    let page = ScriptedPage::new().with_default_answer(answer("Future work should test this.", &ids));
    let (_page, orchestrator) = orchestrator(project, page);

    let report = orchestrator.run_cycles(2, None).await.unwrap();

    assert_eq!(report.cycles[0].papers.len(), 6);
    assert_eq!(report.cycles[1].papers.len(), 6);
    assert_eq!(report.papers_found(), 12);
    assert!(report.versioning_suggested);
}

#[tokio::test(start_paused = true)]
async fn steady_answers_do_not_suggest_versioning() {
    let (_dir, project) = project();
    let (_page, orchestrator) = orchestrator(project, steady_page());

    let report = orchestrator.run_cycles(2, None).await.unwrap();

    assert!(!report.versioning_suggested);
}
