//! CLI module for sysdiagnose triage
//!
//! Each command lives in its own module and returns `anyhow::Result`;
//! user-facing failures are wrapped in [`error::HelpfulError`].

pub mod error;
pub mod output;
pub mod yarascan;
