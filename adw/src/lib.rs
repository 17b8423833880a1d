//! Issue-to-pull-request workflow driver for code-generation agent CLIs.
//!
//! An issue flows through Plan, Build, Test, Review and Publish. Each phase
//! is an independent command that reloads the run state persisted by Plan, so
//! a run can be resumed or driven one phase at a time. The crate keeps a
//! strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, branch naming,
//!   spec extraction, phase gating). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (subprocesses, agent providers,
//!   git, issue tracker, run state on disk). Each sits behind a trait so
//!   phases can be tested with scripted collaborators.
//!
//! [`phases`] coordinates the two to implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod phases;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
