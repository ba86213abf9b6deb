//! Resume from checkpoints up to the configured ceiling
//!
//! Run with: `cargo test --test resume`

mod common;

use common::{orchestrator, project, steady_page, with_history};
use research_verifier::{Project, ResumeOutcome};

#[tokio::test(start_paused = true)]
async fn resume_continues_to_the_ceiling() {
    let (dir, mut project) = project();
    with_history(&mut project, 7);
    let (page, orchestrator) = orchestrator(project, steady_page());

    let outcome = orchestrator.resume().await.unwrap();

    let ResumeOutcome::Continued { from, report } = outcome else {
        panic!("expected a continued run");
    };
    assert_eq!(from, 7);
    assert_eq!(report.cycles.len(), 13);
    assert_eq!(report.cycles.first().unwrap().cycle_num, 8);
    assert_eq!(report.cycles.last().unwrap().cycle_num, 20);

    let project = Project::open(dir.path().join("sparse-attention")).unwrap();
    assert_eq!(project.latest_checkpoint().unwrap().unwrap().cycle_num, 20);
    assert_eq!(project.state().total_cycles_completed, 20);
    assert!(page.is_closed());
}

#[tokio::test(start_paused = true)]
async fn resume_at_ceiling_does_nothing() {
    let (_dir, mut project) = project();
    with_history(&mut project, 20);
    let (page, orchestrator) = orchestrator(project, steady_page());

    let outcome = orchestrator.resume().await.unwrap();

    assert!(matches!(outcome, ResumeOutcome::AlreadyComplete { last: 20 }));
    assert!(page.submitted().is_empty());
    assert!(page.is_closed());
}

#[tokio::test(start_paused = true)]
async fn resume_without_checkpoints_starts_fresh() {
    let (_dir, project) = project();
    let (page, orchestrator) = orchestrator(project, steady_page());

    let outcome = orchestrator.resume().await.unwrap();

    let ResumeOutcome::Fresh(report) = outcome else {
        panic!("expected a fresh run");
    };
    assert_eq!(report.cycles.len(), 2);
    assert_eq!(report.cycles[0].cycle_num, 1);
    assert!(!page.submitted()[0].starts_with("I'm researching"));
}
