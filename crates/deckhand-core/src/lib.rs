//! # deckhand-core
//!
//! Core library for Deckhand module lifecycle management providing:
//! - Module manifest parsing and validation
//! - Version selection and release channel types
//! - Module store catalog cache types
//! - Hierarchical configuration loading (embedded defaults, file, env)

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::ModulesConfigLoader;
pub use error::{Error, Result};
pub use utils::{get_home_dir, now_millis};
