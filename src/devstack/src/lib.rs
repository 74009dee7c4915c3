//! devstack command-line interface.
//!
//! Argument parsing, terminal progress rendering, and the glue that wires
//! the engine in the `container` crate to a Docker runtime.

pub mod cli;
pub mod commands;
pub mod reporter;

pub use cli::{Cli, Command};
