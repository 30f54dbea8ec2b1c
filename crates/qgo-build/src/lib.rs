//! qgo build orchestration
//!
//! Turns a resolved manifest plus CLI overrides into toolchain invocations
//! and runs them:
//! - [`FlagSet`] accumulates de-duplicated tool flag tokens
//! - [`BuildContext`] holds the per-invocation build settings
//! - The synthesizer ([`BuildContext::build_command`], [`BuildContext::run_command`])
//!   produces a staged [`Command`]
//! - [`staleness`] decides whether the existing artifact is still current
//! - [`ProcessRunner`] executes the stages with injected commands and
//!   concurrent output streaming
//! - [`TestReport`] folds `go test -json` events into TAP test points

pub mod command;
pub mod context;
pub mod error;
pub mod flags;
pub mod paths;
pub mod report;
pub mod runner;
pub mod staleness;
pub mod synth;

pub use command::{Command, Injection, STAGE_SEPARATOR};
pub use context::{host_os, normalize_binary_name, BuildContext};
pub use error::{BuildError, BuildResult, StageFailure};
pub use flags::FlagSet;
pub use report::{Outcome, TestCase, TestEvent, TestFormat, TestReport};
pub use runner::{ConsoleSink, FailurePolicy, OutputSink, ProcessRunner};
pub use staleness::{Freshness, StaleReason};
pub use synth::{filter_passthrough_args, script_command};
