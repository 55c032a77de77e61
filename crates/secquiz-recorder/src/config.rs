//! Configuration loading and recorder factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use secquiz_core::session::QuizConfig;
use secquiz_core::traits::AttemptRecorder;

use crate::memory::InMemoryRecorder;
use crate::supabase::SupabaseRecorder;

/// Where attempts are recorded.
///
/// Note: Custom Debug impl masks keys to prevent accidental exposure in logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecorderConfig {
    /// Process memory; attempts are gone when the program exits.
    #[default]
    Memory,
    Supabase {
        url: String,
        api_key: String,
        /// A signed-in user's JWT; the anon key is used when absent.
        #[serde(default)]
        access_token: Option<String>,
    },
}

impl std::fmt::Debug for RecorderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderConfig::Memory => f.write_str("Memory"),
            RecorderConfig::Supabase {
                url,
                api_key: _,
                access_token,
            } => f
                .debug_struct("Supabase")
                .field("url", url)
                .field("api_key", &"***")
                .field("access_token", &access_token.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

/// Top-level secquiz configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecquizConfig {
    #[serde(default)]
    pub quiz: QuizConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    /// Question bank to play; the built-in bank when unset.
    #[serde(default)]
    pub bank: Option<PathBuf>,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_recorder_config(config: &RecorderConfig) -> RecorderConfig {
    match config {
        RecorderConfig::Memory => RecorderConfig::Memory,
        RecorderConfig::Supabase {
            url,
            api_key,
            access_token,
        } => RecorderConfig::Supabase {
            url: resolve_env_vars(url),
            api_key: resolve_env_vars(api_key),
            access_token: access_token.as_deref().map(resolve_env_vars),
        },
    }
}

/// Apply `SECQUIZ_SUPABASE_URL` / `SECQUIZ_SUPABASE_KEY` style overrides.
fn apply_overrides(recorder: &mut RecorderConfig, url: Option<String>, key: Option<String>) {
    if let Some(new_url) = url {
        match recorder {
            RecorderConfig::Supabase { url, .. } => *url = new_url,
            RecorderConfig::Memory => {
                *recorder = RecorderConfig::Supabase {
                    url: new_url,
                    api_key: String::new(),
                    access_token: None,
                }
            }
        }
    }
    if let Some(new_key) = key {
        match recorder {
            RecorderConfig::Supabase { api_key, .. } => *api_key = new_key,
            RecorderConfig::Memory => {
                tracing::warn!("SECQUIZ_SUPABASE_KEY set without a Supabase URL, ignoring");
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `secquiz.toml` in the current directory
/// 2. `~/.config/secquiz/config.toml`
///
/// Environment variable overrides: `SECQUIZ_SUPABASE_URL`, `SECQUIZ_SUPABASE_KEY`.
pub fn load_config() -> Result<SecquizConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SecquizConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("secquiz.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config_file(path)?,
        None => SecquizConfig::default(),
    };

    apply_overrides(
        &mut config.recorder,
        std::env::var("SECQUIZ_SUPABASE_URL").ok(),
        std::env::var("SECQUIZ_SUPABASE_KEY").ok(),
    );
    config.recorder = resolve_recorder_config(&config.recorder);

    if let (Some(bank), Some(path)) = (&config.bank, &config_path) {
        // Relative bank paths are relative to the config file.
        if bank.is_relative() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                config.bank = Some(dir.join(bank));
            }
        }
    }

    config
        .quiz
        .validate()
        .context("invalid [quiz] configuration")?;
    tracing::debug!(recorder = ?config.recorder, "configuration loaded");
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<SecquizConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<SecquizConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("secquiz"))
}

/// Create a recorder instance from its configuration.
pub fn create_recorder(
    config: &RecorderConfig,
    pass_threshold: u32,
) -> Result<Arc<dyn AttemptRecorder>> {
    match config {
        RecorderConfig::Memory => Ok(Arc::new(InMemoryRecorder::new(pass_threshold))),
        RecorderConfig::Supabase {
            url,
            api_key,
            access_token,
        } => {
            anyhow::ensure!(!url.is_empty(), "Supabase recorder needs a url");
            anyhow::ensure!(!api_key.is_empty(), "Supabase recorder needs an api_key");
            Ok(Arc::new(SupabaseRecorder::new(
                url,
                api_key,
                access_token.clone(),
                pass_threshold,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_SECQUIZ_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_SECQUIZ_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_SECQUIZ_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("no vars"), "no vars");
        std::env::remove_var("_SECQUIZ_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = SecquizConfig::default();
        assert_eq!(config.recorder, RecorderConfig::Memory);
        assert_eq!(config.quiz.question_count, 15);
        assert_eq!(config.quiz.pass_threshold, 14);
        assert!(config.bank.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
bank = "banks/security-basics.toml"

[quiz]
question_count = 10
pass_threshold = 9
reveal_delay_ms = 500

[recorder]
type = "supabase"
url = "https://example.supabase.co"
api_key = "anon"
"#;
        let config: SecquizConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.quiz.question_count, 10);
        assert_eq!(config.quiz.time_limit_secs, 30);
        assert!(matches!(
            config.recorder,
            RecorderConfig::Supabase { access_token: None, .. }
        ));
    }

    #[test]
    fn debug_masks_keys() {
        let config = RecorderConfig::Supabase {
            url: "https://example.supabase.co".into(),
            api_key: "super-secret".into(),
            access_token: Some("jwt-secret".into()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("jwt-secret"));
        assert!(debug.contains("example.supabase.co"));
    }

    #[test]
    fn url_override_switches_to_supabase() {
        let mut recorder = RecorderConfig::Memory;
        apply_overrides(
            &mut recorder,
            Some("https://x.supabase.co".into()),
            Some("key".into()),
        );
        assert_eq!(
            recorder,
            RecorderConfig::Supabase {
                url: "https://x.supabase.co".into(),
                api_key: "key".into(),
                access_token: None,
            }
        );
    }

    #[test]
    fn key_override_alone_keeps_memory() {
        let mut recorder = RecorderConfig::Memory;
        apply_overrides(&mut recorder, None, Some("key".into()));
        assert_eq!(recorder, RecorderConfig::Memory);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/secquiz.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn explicit_path_resolves_bank_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secquiz.toml");
        std::fs::write(
            &path,
            "bank = \"banks/team.toml\"\n[quiz]\nquestion_count = 5\npass_threshold = 4\n",
        )
        .unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.bank, Some(dir.path().join("banks/team.toml")));

        std::fs::write(&path, "[quiz]\nquestion_count = 5\n").unwrap();
        let err = load_config_from(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("unreachable"));
    }

    #[test]
    fn factory_builds_recorders() {
        let memory = create_recorder(&RecorderConfig::Memory, 14).unwrap();
        assert_eq!(memory.name(), "memory");

        let supabase = create_recorder(
            &RecorderConfig::Supabase {
                url: "https://x.supabase.co".into(),
                api_key: "k".into(),
                access_token: None,
            },
            14,
        )
        .unwrap();
        assert_eq!(supabase.name(), "supabase");

        let missing = RecorderConfig::Supabase {
            url: String::new(),
            api_key: "k".into(),
            access_token: None,
        };
        assert!(create_recorder(&missing, 14).is_err());
    }
}
