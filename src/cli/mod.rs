//! CLI module for replyr - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
