//! secquiz-recorder — Attempt recorder backends.
//!
//! Implements the `AttemptRecorder` trait for an in-process store and for
//! Supabase, and loads the configuration that picks between them.

pub mod config;
pub mod memory;
pub mod supabase;

pub use config::{create_recorder, load_config, load_config_from, RecorderConfig, SecquizConfig};
pub use memory::InMemoryRecorder;
pub use secquiz_core::error::RecorderError;
pub use supabase::SupabaseRecorder;
