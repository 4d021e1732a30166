use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use parley_core::{
    Advance, ConversationSession, Engine, ProgressionController, Quest, QuestSummary, Rejection,
    SessionEvent, SubmitOutcome, TurnReport,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::config::ConfigLoader;

#[derive(Args)]
pub struct PlayArgs {
    /// Quest file (TOML with a title and [[chapters]])
    pub quest: PathBuf,

    /// Play against canned local responses
    #[arg(long)]
    pub offline: bool,
}

type Input = Lines<BufReader<Stdin>>;

/// What the learner asked for at the prompt
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    Restart,
    Quit,
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "/quit" | "/exit" => Command::Quit,
        "/restart" => Command::Restart,
        other => Command::Say(other.to_string()),
    }
}

/// How a chapter's practice ended
enum ChapterEnd {
    Settled,
    Restart,
    Quit,
}

pub fn load_quest(path: &Path) -> Result<Quest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read quest file {}", path.display()))?;
    let quest: Quest = toml::from_str(&contents)
        .with_context(|| format!("Invalid quest file {}", path.display()))?;
    Ok(quest)
}

pub async fn run(args: PlayArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let quest = load_quest(&args.quest)?;

    let generator = super::generator(&config.provider, args.offline);
    let reveal = config.engine.reveal.enabled;
    let engine = Engine::new(generator, config.engine);
    let mut controller = ProgressionController::new(engine, quest)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Quest: {}", controller.quest().title);
    println!("Type your replies. /restart retries the chapter, /quit leaves.\n");

    loop {
        let chapter = controller.current_chapter();
        let seed = controller.current_seed().clone();
        println!("== Chapter {}: {} ==", chapter + 1, seed.title);
        if !seed.summary.is_empty() {
            println!("{}\n", seed.summary);
        }

        let (session, scenario) = controller.start_practice().await?;
        println!("Scenario: {}", scenario.description);
        println!("Goal: {}\n", scenario.goal);
        if let Some(greeting) = session.messages().last() {
            println!("Character: {}\n", greeting.text);
        }

        match practice(&session, &mut input, reveal).await? {
            ChapterEnd::Quit => {
                session.abort();
                println!("Bye!");
                return Ok(());
            }
            ChapterEnd::Restart => {
                controller.restart_chapter(chapter)?;
                println!("Restarting chapter {}.\n", chapter + 1);
                continue;
            }
            ChapterEnd::Settled => {}
        }

        let outcome = controller.complete_from_session(&session)?;
        println!(
            "Chapter {} settled: {} ({})\n",
            chapter + 1,
            outcome.final_score,
            verdict(outcome.passed)
        );

        match controller.advance()? {
            Advance::NextChapter(next) => debug!(next, "Advancing to next chapter"),
            Advance::Settled(summary) => {
                print_summary(&summary);
                return Ok(());
            }
        }
    }
}

async fn practice(
    session: &ConversationSession,
    input: &mut Input,
    reveal: bool,
) -> Result<ChapterEnd> {
    let mut events = session.subscribe();

    loop {
        print!("[turn {}] > ", session.state().turn + 1);
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            return Ok(ChapterEnd::Quit);
        };

        let text = match parse_command(&line) {
            Command::Quit => return Ok(ChapterEnd::Quit),
            Command::Restart => return Ok(ChapterEnd::Restart),
            Command::Say(text) => text,
        };

        match session.submit_turn(&text).await {
            Ok(SubmitOutcome::Accepted(report)) => {
                print_report(&report);
                if let Some(reply) = session.messages().last() {
                    if reveal {
                        show_reply(&mut events, reply.id, &reply.text).await?;
                    } else {
                        println!("Character: {}\n", reply.text);
                    }
                }
                if report.completed_session() {
                    return Ok(ChapterEnd::Settled);
                }
            }
            Ok(SubmitOutcome::Rejected(Rejection::EmptyInput)) => {}
            Ok(SubmitOutcome::Rejected(rejection)) => {
                println!("(not accepted: {:?})", rejection);
            }
            Err(e) if e.is_retryable() => {
                eprintln!("Evaluation failed: {}. Your turn was not counted, try again.", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn print_report(report: &TurnReport) {
    let penalty = if report.score.penalized {
        " (language penalty)"
    } else {
        ""
    };
    println!(
        "  score {:.1}{}  total {} ({:+})",
        report.score.final_score, penalty, report.running_total, report.score_delta
    );
    if !report.evaluation.feedback.is_empty() {
        println!("  feedback: {}", report.evaluation.feedback);
    }
}

/// Print the reply as its reveal frames arrive.
async fn show_reply(
    events: &mut broadcast::Receiver<SessionEvent>,
    message_id: Uuid,
    text: &str,
) -> Result<()> {
    print!("Character: ");
    let mut printed = 0;

    loop {
        match events.recv().await {
            Ok(SessionEvent::RevealProgress {
                message_id: id,
                visible,
                done,
            }) if id == message_id => {
                print!("{}", visible.get(printed..).unwrap_or_default());
                std::io::stdout().flush()?;
                printed = visible.len();
                if done {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {
                print!("{}", text.get(printed..).unwrap_or_default());
                break;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    println!("\n");
    Ok(())
}

fn verdict(passed: bool) -> &'static str {
    if passed { "passed" } else { "not passed" }
}

fn print_summary(summary: &QuestSummary) {
    println!("== {} complete ==", summary.title);
    for outcome in &summary.outcomes {
        println!(
            "  Chapter {}: {} ({})",
            outcome.chapter + 1,
            outcome.final_score,
            verdict(outcome.passed)
        );
    }
    println!(
        "Total {}  average {:.2}  {}",
        summary.aggregate_total,
        summary.aggregate_average,
        verdict(summary.passed).to_uppercase()
    );
}
