//! # deskpilot-agent
//!
//! The `deskpilot` binary: wires the core perception-action loop to a
//! chat-completions model and the Windows desktop.
//!
//! ## Modes
//!
//! - **Autonomous** (default): iterate until the model calls `done`.
//! - **Step** (`--step`): wait for Enter before each iteration.
//!
//! Screenshots shown to the model are archived under
//! `dump/run_YYYYMMDD_HHMMSS/` unless `--no-dump` is given.

pub mod archive;
pub mod cli;
pub mod config;
pub mod decision;
pub mod session;
