//! Research Verifier CLI: research projects and verification cycles.
//!
//! Usage:
//!   rv new <name> [--path dir]
//!   rv login
//!   rv ask <question...>
//!   rv run [--cycles N] [--phase P]
//!   rv cycle <question...> [--phase P] [--cycle-num N]
//!   rv synthesize <N> --synthesis S [--gaps G...]
//!   rv status | rv resume
//!   rv gaps [list|add|resolve]

use clap::{Parser, Subcommand};
use research_verifier::{
    ChromiumConfig, ChromiumPage, ConversationSession, CycleOrchestrator, GapPriority, Phase, Project,
    ResumeOutcome, RunReport, SessionConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rv",
    version,
    about = "Automate research verification loops against a paper assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose logging
    #[arg(long, short, global = true)]
    debug: bool,
    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,
    /// Browser profile directory (keeps the assistant login)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new research project
    New {
        /// Project name
        name: String,
        /// Parent directory
        #[arg(long, short, default_value = ".")]
        path: PathBuf,
    },
    /// Open the browser to sign in to the assistant
    Login,
    /// Send one question and print the answer
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Run verification cycles
    Run {
        /// Number of cycles (defaults to the project's setting)
        #[arg(long, short)]
        cycles: Option<u32>,
        /// Force a phase for every cycle
        #[arg(long, short, value_enum)]
        phase: Option<Phase>,
    },
    /// Run a single cycle with a specific question
    Cycle {
        #[arg(required = true)]
        question: Vec<String>,
        #[arg(long, short, value_enum, default_value = "expansive")]
        phase: Phase,
        /// Override the cycle number
        #[arg(long, short = 'n')]
        cycle_num: Option<u32>,
    },
    /// Save a synthesis for a cycle
    Synthesize {
        cycle_num: u32,
        /// Synthesis markdown
        #[arg(long, short)]
        synthesis: String,
        /// New gaps identified
        #[arg(long, short, num_args = 0..)]
        gaps: Vec<String>,
    },
    /// Show project status
    Status,
    /// Resume from the last checkpoint
    Resume,
    /// Manage research gaps
    Gaps {
        #[command(subcommand)]
        action: Option<GapAction>,
    },
}

#[derive(Subcommand)]
enum GapAction {
    /// List active gaps
    List,
    /// Add a gap
    Add {
        #[arg(required = true)]
        description: Vec<String>,
        #[arg(long, value_enum, default_value = "medium")]
        priority: GapPriority,
    },
    /// Mark a gap as resolved
    Resolve {
        id: u32,
        /// How it was resolved
        #[arg(long, short)]
        reason: String,
    },
}

/// Default browser profile (~/.research-verifier/browser-profile)
fn default_profile_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".research-verifier")
        .join("browser-profile")
}

fn init_logging(debug: bool) {
    let default = if debug { "research_verifier=debug,rv=debug" } else { "research_verifier=info,rv=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct BrowserOptions {
    profile: PathBuf,
    headless: bool,
}

async fn open_session(
    options: &BrowserOptions,
    diagnostics: &Path,
    response_timeout: Duration,
) -> Result<ConversationSession<ChromiumPage>, String> {
    let config = ChromiumConfig::new(&options.profile).headless(options.headless);
    let page = ChromiumPage::launch(&config)
        .await
        .map_err(|e| format!("Failed to launch browser: {}", e))?;
    let session_config = SessionConfig::new(diagnostics).with_response_timeout(response_timeout);
    Ok(ConversationSession::new(page, session_config))
}

fn open_project() -> Result<Project, String> {
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    if !Project::is_project_dir(&cwd) {
        return Err("not in a research project directory; run 'rv new <name>' first".to_string());
    }
    Project::open(cwd).map_err(|e| e.to_string())
}

fn preview(text: &str, limit: usize) -> String {
    let clipped: String = text.chars().take(limit).collect();
    if clipped.len() < text.len() {
        format!("{}...", clipped)
    } else {
        clipped
    }
}

fn cmd_new(name: &str, parent: &Path) -> i32 {
    match Project::create(parent, name) {
        Ok(project) => {
            println!("Created research project: {}", project.root().display());
            println!("\nNext steps:");
            println!("  1. cd {}", project.root().display());
            println!("  2. Edit concept/README.md with your theory");
            println!("  3. Run: rv run --cycles 2");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_login(options: &BrowserOptions) -> i32 {
    let diagnostics = std::env::current_dir().unwrap_or_default();
    let session = match open_session(options, &diagnostics, Duration::from_secs(120)).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Sign in to the assistant in the browser window, then press Enter here.");
    let wait_for_enter = async {
        let mut line = String::new();
        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = stdin.read_line(&mut line).await {
            tracing::warn!(error = %e, "could not read from stdin");
        }
    };
    let result = session.login_interactive(wait_for_enter).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing the browser failed");
    }

    match result {
        Ok(true) => {
            println!("Browser session saved. You can now run automated queries.");
            0
        }
        Ok(false) => {
            eprintln!("Error: chat input not found; the login may not have completed");
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_ask(options: &BrowserOptions, question: &str) -> i32 {
    let diagnostics = std::env::current_dir().unwrap_or_default();
    let session = match open_session(options, &diagnostics, Duration::from_secs(120)).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Sending: {}", preview(question, 80));
    let result = session.submit(question).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing the browser failed");
    }

    match result {
        Ok(answer) => {
            println!("\n{}", answer.text);
            if !answer.references.is_empty() {
                println!("\nPapers found: {}", answer.references.len());
                for paper in answer.references.iter().take(5) {
                    println!("  - {}: {}", paper.title, paper.url);
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn orchestrator(
    options: &BrowserOptions,
) -> Result<CycleOrchestrator<ChromiumPage>, String> {
    let project = open_project()?;
    let timeout = Duration::from_secs(project.settings().response_timeout_secs);
    let session = open_session(options, project.root(), timeout).await?;
    Ok(CycleOrchestrator::new(project, session))
}

fn print_report(report: &RunReport) {
    println!();
    for cycle in &report.cycles {
        println!(
            "Cycle {:>3} | {:<11} | {} questions ({} failed) | {} papers | {} new gaps",
            cycle.cycle_num,
            cycle.phase,
            cycle.questions.len(),
            cycle.failed_questions(),
            cycle.papers.len(),
            cycle.new_gaps.len()
        );
    }
    if report.versioning_suggested {
        println!("\nSignificant findings detected - consider versioning the hypothesis");
    }
}

async fn cmd_run(options: &BrowserOptions, cycles: Option<u32>, phase: Option<Phase>) -> i32 {
    let orchestrator = match orchestrator(options).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let count = cycles.unwrap_or(orchestrator.project().settings().default_cycles);
    match orchestrator.run_cycles(count, phase).await {
        Ok(report) => {
            print_report(&report);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_cycle(options: &BrowserOptions, question: &str, phase: Phase, cycle_num: Option<u32>) -> i32 {
    let orchestrator = match orchestrator(options).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("Question: {}", preview(question, 100));

    match orchestrator.run_manual_cycle(question, phase, cycle_num).await {
        Ok((cycle_num, answer)) => {
            println!("\nPapers found: {}", answer.references.len());
            println!("Response saved to: research/cycle-{:03}/", cycle_num);
            if !answer.references.is_empty() {
                println!("\n## Papers:");
                for paper in answer.references.iter().take(10) {
                    println!("  - [{}] {}", paper.arxiv_id, paper.title);
                }
            }
            println!("\n## Response:\n");
            println!("{}", answer.text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_synthesize(cycle_num: u32, text: &str, gaps: &[String]) -> i32 {
    let mut project = match open_project() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match project.save_manual_synthesis(cycle_num, text, gaps) {
        Ok(recorded) => {
            println!("Synthesis saved for cycle {}", cycle_num);
            if !recorded.is_empty() {
                println!("Added {} new gaps", recorded.len());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_status() -> i32 {
    let project = match open_project() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let state = project.state();
    println!("\nResearch Project: {}", state.project_name);
    println!("{}", "=".repeat(50));
    println!("  Hypothesis version: v{}", state.current_hypothesis_version);
    println!("  Current cycle: {}", state.current_cycle);
    println!("  Current phase: {}", state.current_phase);
    println!("  Total cycles completed: {}", state.total_cycles_completed);
    println!("  Papers collected: {}", state.papers_collected);
    println!("  Active gaps: {}", state.gaps_count);
    match state.last_updated {
        Some(t) => println!("  Last updated: {}", t.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last updated: never"),
    }

    match project.recent_cycles(3) {
        Ok(cycles) if !cycles.is_empty() => {
            println!("\nRecent cycles:");
            for cycle in cycles {
                println!("    {}/", cycle);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not list cycles"),
    }
    println!();
    0
}

async fn cmd_resume(options: &BrowserOptions) -> i32 {
    let orchestrator = match orchestrator(options).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match orchestrator.resume().await {
        Ok(ResumeOutcome::Fresh(report)) => {
            println!("No checkpoints found; started fresh.");
            print_report(&report);
            0
        }
        Ok(ResumeOutcome::Continued { from, report }) => {
            println!("Resumed after cycle {}.", from);
            print_report(&report);
            0
        }
        Ok(ResumeOutcome::AlreadyComplete { last }) => {
            println!("All cycles completed (last: {}).", last);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn priority_icon(priority: GapPriority) -> &'static str {
    match priority {
        GapPriority::High => "[!!]",
        GapPriority::Medium => "[! ]",
        GapPriority::Low => "[  ]",
    }
}

fn cmd_gaps(action: Option<GapAction>) -> i32 {
    let mut project = match open_project() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match action.unwrap_or(GapAction::List) {
        GapAction::List => match project.active_gaps() {
            Ok(gaps) if gaps.is_empty() => {
                println!("No active gaps.");
                0
            }
            Ok(gaps) => {
                println!("\nActive Gaps ({}):\n", gaps.len());
                for gap in gaps {
                    let description = if gap.description.is_empty() {
                        "No description"
                    } else {
                        gap.description.as_str()
                    };
                    println!("  [{}] {} {}", gap.id, priority_icon(gap.priority), description);
                    if !gap.related_components.is_empty() {
                        println!("      components: {}", gap.related_components.join(", "));
                    }
                }
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        GapAction::Add { description, priority } => {
            let description = description.join(" ");
            match project.add_gap(&description, priority) {
                Ok(id) => {
                    println!("Added gap #{}: {}", id, description);
                    0
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        GapAction::Resolve { id, reason } => match project.resolve_gap(id, &reason) {
            Ok(_) => {
                println!("Resolved gap #{}", id);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let options = BrowserOptions {
        profile: cli.profile.unwrap_or_else(default_profile_dir),
        headless: cli.headless,
    };
    let code = match cli.command {
        Commands::New { name, path } => cmd_new(&name, &path),
        Commands::Login => cmd_login(&options).await,
        Commands::Ask { question } => cmd_ask(&options, &question.join(" ")).await,
        Commands::Run { cycles, phase } => cmd_run(&options, cycles, phase).await,
        Commands::Cycle {
            question,
            phase,
            cycle_num,
        } => cmd_cycle(&options, &question.join(" "), phase, cycle_num).await,
        Commands::Synthesize {
            cycle_num,
            synthesis,
            gaps,
        } => cmd_synthesize(cycle_num, &synthesis, &gaps),
        Commands::Status => cmd_status(),
        Commands::Resume => cmd_resume(&options).await,
        Commands::Gaps { action } => cmd_gaps(action),
    };
    std::process::exit(code);
}
