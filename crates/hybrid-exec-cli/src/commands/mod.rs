//! CLI command implementations.

pub mod cancel;
pub mod common;
pub mod config;
pub mod render;
pub mod run;
