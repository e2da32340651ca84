//! Common test utilities for deckhand-modules
//!
//! - Constants shared by the integration suites
//! - Builders for module archives and module directories
//! - Mock store API, usage controller and cache
//! - A temporary environment wiring a full `ModuleSystem`

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod constants;
pub mod fixtures;
pub mod mocks;

pub use builders::*;
pub use constants::*;
pub use fixtures::*;
pub use mocks::*;
