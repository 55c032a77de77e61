//! The `secquiz init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("secquiz.toml").exists() {
        println!("secquiz.toml already exists, skipping.");
    } else {
        std::fs::write("secquiz.toml", SAMPLE_CONFIG)?;
        println!("Created secquiz.toml");
    }

    std::fs::create_dir_all("banks")?;
    let example_path = Path::new("banks/example.toml");
    if example_path.exists() {
        println!("banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit secquiz.toml (switch the recorder to Supabase to keep results)");
    println!("  2. Run: secquiz validate --bank banks/example.toml");
    println!("  3. Run: secquiz play --user you@example.com --bank banks/example.toml --count 3");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# secquiz configuration

# Question bank to play; the built-in 50-question bank when unset.
# bank = "banks/example.toml"

[quiz]
question_count = 15
time_limit_secs = 30
reveal_delay_ms = 2000
pass_threshold = 14

# In-memory recorder: results are lost when the program exits.
[recorder]
type = "memory"

# Supabase recorder:
# [recorder]
# type = "supabase"
# url = "${SECQUIZ_SUPABASE_URL}"
# api_key = "${SECQUIZ_SUPABASE_KEY}"
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Bank"
description = "A small bank to get started"

[[questions]]
id = 1
prompt = "You receive an email from your bank asking you to verify your account by clicking a link. What should you do?"
options = [
    "Click the link and verify immediately",
    "Forward it to colleagues",
    "Contact your bank directly through official channels",
    "Reply with your account details",
]
correct = "Contact your bank directly through official channels"
category = "phishing"

[[questions]]
id = 2
prompt = "What makes a password strong?"
options = [
    "Your name and birth year",
    "At least 12 characters mixing letters, numbers and symbols",
    "The same password everywhere",
]
correct = "At least 12 characters mixing letters, numbers and symbols"
category = "password"

[[questions]]
id = 3
prompt = "Someone without a badge asks you to hold the secure door open. You:"
options = [
    "Hold the door, they look busy",
    "Politely ask them to badge in or contact security",
    "Ignore them",
]
correct = "Politely ask them to badge in or contact security"
category = "physical"
"#;
