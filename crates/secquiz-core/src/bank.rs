//! TOML question bank parser.
//!
//! Loads question banks from TOML files and directories, enforces the
//! record invariants, and reports softer issues as warnings.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::QuizError;
use crate::model::{Category, QuestionRecord};
use crate::session::QuizConfig;

/// The 50-question assessment bank shipped with secquiz.
const DEFAULT_BANK_TOML: &str = include_str!("../../../banks/security-awareness.toml");

/// Options longer than this are flagged; they wrap badly in a terminal.
const LONG_OPTION_CHARS: usize = 200;

/// A validated, immutable catalog of questions.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    pub description: String,
    questions: Vec<Arc<QuestionRecord>>,
}

impl QuestionBank {
    /// Build a bank, rejecting any record that breaks an invariant.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        questions: Vec<QuestionRecord>,
    ) -> Result<Self, QuizError> {
        let mut seen = HashSet::new();
        for q in &questions {
            check_record(q)?;
            if !seen.insert(q.id) {
                return Err(QuizError::DuplicateQuestion(q.id));
            }
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            questions: questions.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[Arc<QuestionRecord>] {
        &self.questions
    }

    pub fn get(&self, id: u32) -> Option<&Arc<QuestionRecord>> {
        self.questions.iter().find(|q| q.id == id)
    }
}

fn check_record(q: &QuestionRecord) -> Result<(), QuizError> {
    let invalid = |reason: &str| QuizError::InvalidQuestion {
        id: q.id,
        reason: reason.to_string(),
    };

    if q.id == 0 {
        return Err(invalid("id must be positive"));
    }
    if q.prompt.trim().is_empty() {
        return Err(invalid("prompt is empty"));
    }
    if q.options.len() < 2 {
        return Err(invalid("needs at least two options"));
    }
    let distinct: HashSet<&str> = q.options.iter().map(String::as_str).collect();
    if distinct.len() != q.options.len() {
        return Err(invalid("options are not distinct"));
    }
    if q.correct_option.is_empty() || !distinct.contains(q.correct_option.as_str()) {
        return Err(invalid("correct option is not one of the options"));
    }
    Ok(())
}

/// Intermediate TOML structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: u32,
    prompt: String,
    options: Vec<String>,
    correct: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank` (useful for testing).
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let category = q
                .category
                .map(|c| {
                    c.parse()
                        .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))
                })
                .transpose()?;

            Ok(QuestionRecord {
                id: q.id,
                prompt: q.prompt.trim().to_string(),
                options: q.options,
                correct_option: q.correct,
                category,
                explanation: q.explanation,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let bank = QuestionBank::new(parsed.bank.id, parsed.bank.name, questions)
        .with_context(|| format!("invalid question bank: {}", source_path.display()))?;

    Ok(bank.with_description(parsed.bank.description))
}

/// The bank compiled into the binary.
pub fn default_bank() -> Result<QuestionBank> {
    parse_bank_str(DEFAULT_BANK_TOML, Path::new("banks/security-awareness.toml"))
}

/// Recursively load all `.toml` banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    banks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(banks)
}

/// A soft issue found while validating a bank.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<u32>,
    /// Warning message.
    pub message: String,
}

/// Check a bank against the session configuration it will be used with.
pub fn validate_bank(bank: &QuestionBank, config: &QuizConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.len() < config.question_count {
        warnings.push(ValidationWarning {
            question_id: None,
            message: format!(
                "bank has {} questions but sessions draw {}",
                bank.len(),
                config.question_count
            ),
        });
    }

    // Missing categories or explanations only matter when the bank uses them elsewhere.
    let uses_categories = bank.questions().iter().any(|q| q.category.is_some());
    let uses_explanations = bank.questions().iter().any(|q| has_explanation(q));

    for q in bank.questions() {
        if uses_categories && q.category.is_none() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: "no category".into(),
            });
        }
        if uses_explanations && !has_explanation(q) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: "no explanation to show after answering".into(),
            });
        }
        if q.options.iter().any(|o| o.chars().count() > LONG_OPTION_CHARS) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: format!("option longer than {LONG_OPTION_CHARS} characters"),
            });
        }
    }

    warnings
}

fn has_explanation(q: &QuestionRecord) -> bool {
    q.explanation
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty())
}

/// Count questions per category; uncategorized questions are skipped.
pub fn category_counts(bank: &QuestionBank) -> Vec<(Category, usize)> {
    let mut counts: Vec<(Category, usize)> = Vec::new();
    for category in bank.questions().iter().filter_map(|q| q.category) {
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }
    counts.sort();
    counts
}
