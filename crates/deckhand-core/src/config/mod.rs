//! Configuration loading

mod loader;

pub use loader::ModulesConfigLoader;
