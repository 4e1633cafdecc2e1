//! Subcommand implementations

pub mod demo;
pub mod did;
pub mod template;
