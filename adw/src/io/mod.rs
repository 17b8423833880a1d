//! Side-effecting adapters: processes, agents, filesystem, git, issue tracker.

pub mod checks;
pub mod config;
pub mod git;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod run_state;
pub mod tracker;
