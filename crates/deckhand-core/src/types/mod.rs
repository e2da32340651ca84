//! Type definitions shared across Deckhand crates

mod config_types;
mod module_types;
mod store_types;

pub use config_types::*;
pub use module_types::*;
pub use store_types::*;
