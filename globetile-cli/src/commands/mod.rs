//! Subcommand implementations.

pub mod common;
pub mod config;
pub mod index;
pub mod simulate;
