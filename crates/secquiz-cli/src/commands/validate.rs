//! The `secquiz validate` command.

use std::path::PathBuf;

use anyhow::Result;

use secquiz_core::bank::{category_counts, load_bank_directory, parse_bank, validate_bank};
use secquiz_core::session::QuizConfig;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        load_bank_directory(&bank_path)?
    } else {
        vec![parse_bank(&bank_path)?]
    };

    if banks.is_empty() {
        anyhow::bail!("no question banks found in {}", bank_path.display());
    }

    let config = QuizConfig::default();
    let mut total_warnings = 0;

    for bank in &banks {
        println!("Bank: {} ({} questions)", bank.name, bank.len());

        let counts = category_counts(bank);
        if !counts.is_empty() {
            let line: Vec<String> = counts.iter().map(|(c, n)| format!("{c} {n}")).collect();
            println!("  Categories: {}", line.join(", "));
        }

        let warnings = validate_bank(bank, &config);
        for w in &warnings {
            let prefix = w
                .question_id
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
