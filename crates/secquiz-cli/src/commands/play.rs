//! The `secquiz play` command.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio::sync::mpsc;

use secquiz_core::app::QuizApp;
use secquiz_core::bank::{default_bank, parse_bank, validate_bank};
use secquiz_core::dispatch::spawn_dispatcher;
use secquiz_core::driver::{drive_session, DriveOutcome, PlayerInput, SessionObserver};
use secquiz_core::model::{AnswerEvent, AttemptRecord, OutcomeKind, QuestionRecord};
use secquiz_core::scoring::{category_breakdown, percentage};
use secquiz_core::session::SessionView;
use secquiz_recorder::{create_recorder, load_config_from};

pub async fn execute(
    user: String,
    bank_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    count: Option<usize>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(n) = count {
        config.quiz.question_count = n;
        config.quiz.validate().context("invalid --count")?;
    }

    let bank = match bank_path.or(config.bank.clone()) {
        Some(path) => parse_bank(&path)?,
        None => default_bank()?,
    };
    for w in validate_bank(&bank, &config.quiz) {
        tracing::warn!(question = ?w.question_id, "{}", w.message);
    }

    let recorder = create_recorder(&config.recorder, config.quiz.pass_threshold)?;
    let (handle, worker) = spawn_dispatcher(recorder, config.quiz.recorder_queue_capacity);

    let bank = Arc::new(bank);
    let mut app = match seed {
        Some(seed) => QuizApp::with_seed(bank, config.quiz.clone(), handle, seed),
        None => QuizApp::new(bank, config.quiz.clone(), handle),
    };
    app.start(&user)?;

    println!(
        "{} questions, {} seconds each. Answer with the option number, 's' to skip, 'q' to quit.",
        config.quiz.question_count, config.quiz.time_limit_secs
    );

    let (input_tx, mut input_rx) = mpsc::channel(8);
    let prompt = SharedPrompt::default();
    let reader_prompt = prompt.clone();
    // Detached: a pending stdin read must not keep the process alive.
    std::thread::spawn(move || read_input(reader_prompt, input_tx));

    let observer = TerminalObserver { prompt };
    let session = app
        .session_mut()
        .context("quiz session was not started")?;
    let outcome = drive_session(session, &mut input_rx, &observer).await?;
    drop(observer);

    match &outcome {
        DriveOutcome::Completed(record) => {
            print_summary(record, config.quiz.pass_threshold);
        }
        DriveOutcome::Abandoned { answered, .. } => {
            println!("\nQuiz abandoned after {answered} answer(s). Nothing was scored.");
        }
    }

    drop(app);
    let stats = worker.finish().await;
    if stats.failed > 0 || stats.dropped > 0 || stats.skipped > 0 {
        tracing::warn!(
            failed = stats.failed,
            dropped = stats.dropped,
            skipped = stats.skipped,
            "some results were not recorded"
        );
    }

    Ok(())
}

/// A line typed by the player.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Option(usize),
    Skip,
    Quit,
}

fn parse_command(line: &str, option_count: usize) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "s" | "skip" => Some(Command::Skip),
        "q" | "quit" => Some(Command::Quit),
        other => other
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=option_count).contains(n))
            .map(|n| Command::Option(n - 1)),
    }
}

/// The question on screen, as the stdin reader sees it.
#[derive(Debug, Default)]
struct Prompt {
    options: Vec<String>,
    /// False before the first question and while an answer is shown.
    accepting: bool,
}

#[derive(Debug, Clone, Default)]
struct SharedPrompt(Arc<Mutex<Prompt>>);

impl SharedPrompt {
    fn lock(&self) -> MutexGuard<'_, Prompt> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Turn a typed line into input for the question on screen.
///
/// `None` means the line is dropped: it was not understood, or it arrived
/// while no question was waiting for an answer. Quitting always goes through.
fn interpret(line: &str, prompt: &Prompt) -> Option<PlayerInput> {
    let command = parse_command(line, prompt.options.len());
    if command == Some(Command::Quit) {
        return Some(PlayerInput::Abandon);
    }
    if !prompt.accepting {
        tracing::debug!("ignored input while the answer is shown");
        return None;
    }
    match command {
        Some(Command::Option(i)) => Some(PlayerInput::Choose(prompt.options[i].clone())),
        Some(Command::Skip) => Some(PlayerInput::Skip),
        Some(Command::Quit) => Some(PlayerInput::Abandon),
        None => {
            println!("Enter 1-{}, 's' or 'q'.", prompt.options.len());
            None
        }
    }
}

/// Forward every stdin line as soon as it is read.
fn read_input(prompt: SharedPrompt, tx: mpsc::Sender<PlayerInput>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            return;
        };
        let Some(input) = interpret(&line, &prompt.lock()) else {
            continue;
        };
        let quit = input == PlayerInput::Abandon;
        if tx.blocking_send(input).is_err() || quit {
            return;
        }
    }
}

struct TerminalObserver {
    prompt: SharedPrompt,
}

impl SessionObserver for TerminalObserver {
    fn on_question(&self, view: &SessionView) {
        let q = &view.current_question;
        {
            let mut prompt = self.prompt.lock();
            prompt.options = q.options.clone();
            prompt.accepting = true;
        }
        println!(
            "\nQuestion {}/{}  (score {})",
            view.question_index + 1,
            view.total,
            view.running_score
        );
        println!("{}", q.prompt);
        for (i, option) in q.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
        print!("> ");
        let _ = std::io::stdout().flush();
    }

    fn on_tick(&self, remaining: u32) {
        if remaining == 10 || remaining <= 5 {
            eprint!("[{remaining}s] ");
        }
    }

    fn on_answer(&self, event: &AnswerEvent, question: &QuestionRecord) {
        self.prompt.lock().accepting = false;
        println!();
        match (event.outcome, event.is_correct) {
            (_, true) => println!("Correct!"),
            (OutcomeKind::TimedOut, _) => {
                println!("Time's up! The answer was: {}", event.correct_option)
            }
            (OutcomeKind::Skipped, _) => {
                println!("Skipped. The answer was: {}", event.correct_option)
            }
            (OutcomeKind::Answered, false) => {
                println!("Incorrect. The answer was: {}", event.correct_option)
            }
        }
        if let Some(explanation) = &question.explanation {
            println!("{explanation}");
        }
    }

    fn on_complete(&self, _: &AttemptRecord) {}
}

fn print_summary(record: &AttemptRecord, threshold: u32) {
    let score = record.score.unwrap_or(0);
    let total = record.total_questions() as u32;
    let seconds = record.total_time_seconds.unwrap_or(0);

    println!("\n=== Results ===");
    println!("Score: {score}/{total} ({}%)", percentage(score, total));
    if record.passed == Some(true) {
        println!("PASSED");
    } else {
        println!("FAILED ({threshold} correct needed to pass)");
    }
    println!("Time: {}m {:02}s", seconds / 60, seconds % 60);

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Your answer", "Correct answer", "Result"]);
    for answer in &record.answers {
        let prompt = record
            .question_set
            .get(answer.question_index)
            .map(|q| q.prompt.as_str())
            .unwrap_or("");
        let result = match (answer.is_correct, answer.outcome) {
            (true, _) => "correct".to_string(),
            (false, OutcomeKind::Answered) => "wrong".to_string(),
            (false, outcome) => outcome.to_string(),
        };
        table.add_row(vec![
            Cell::new(answer.question_index + 1),
            Cell::new(prompt),
            Cell::new(answer.submitted_option.as_deref().unwrap_or("-")),
            Cell::new(&answer.correct_option),
            Cell::new(result),
        ]);
    }
    println!("{table}");

    let categories = category_breakdown(record);
    if categories.iter().any(|c| c.category.is_some()) {
        println!("\nBy category:");
        for c in categories {
            let name = c
                .category
                .map(|c| c.to_string())
                .unwrap_or_else(|| "other".into());
            println!("  {name:<10} {}/{}", c.correct, c.total);
        }
    }
}
