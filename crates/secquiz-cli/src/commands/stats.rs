//! The `secquiz stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use secquiz_core::report::AdminReport;
use secquiz_core::scoring::percentage;
use secquiz_recorder::{create_recorder, load_config_from, RecorderConfig};

pub async fn execute(
    user: Option<String>,
    config_path: Option<PathBuf>,
    format: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    if config.recorder == RecorderConfig::Memory {
        tracing::warn!("memory recorder keeps no attempts between runs");
    }
    let recorder = create_recorder(&config.recorder, config.quiz.pass_threshold)?;

    let attempts = recorder.list_attempts(user.as_deref()).await?;
    let report = AdminReport::new(user, attempts)?;

    if let Some(path) = &output {
        report.save_json(path)?;
        eprintln!("Report saved to {}", path.display());
    }

    match format.as_str() {
        "markdown" | "md" => print!("{}", report.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    Ok(())
}

fn print_text(report: &AdminReport) {
    let Some(stats) = &report.statistics else {
        println!("No completed attempts yet.");
        return;
    };

    println!("Completed attempts: {}", stats.total_attempts);
    println!("Passed:             {}", stats.passed_attempts);
    println!("Failed:             {}", stats.failed_attempts);
    println!("Average score:      {:.2}", stats.average_score);
    println!("Pass rate:          {:.2}%", stats.pass_rate);

    let mut table = Table::new();
    table.set_header(vec!["Started", "User", "Score", "Result", "Time"]);
    for a in report.completed_attempts() {
        table.add_row(vec![
            Cell::new(a.started_at.format("%Y-%m-%d %H:%M")),
            Cell::new(&a.user_id),
            Cell::new(format!(
                "{}/{} ({}%)",
                a.score,
                a.total_questions,
                percentage(a.score, a.total_questions)
            )),
            Cell::new(if a.passed { "PASS" } else { "FAIL" }),
            Cell::new(
                a.total_time_seconds
                    .map(|s| format!("{}m {:02}s", s / 60, s % 60))
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    println!("\n{table}");
}
