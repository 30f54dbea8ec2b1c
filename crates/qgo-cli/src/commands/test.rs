//! Test command - run `go test` and report the results
//!
//! The toolchain is asked for JSON events unless the plain `go` format is
//! selected; events are folded into test cases and rendered as a grouped
//! listing (spec) or a TAP stream.

use super::{BuildFlags, Session};
use crate::config::Settings;
use anyhow::{Context, Result};
use colored::Colorize;
use qgo_build::{FailurePolicy, OutputSink, Outcome, TestCase, TestEvent, TestFormat, TestReport};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Run the test command
pub fn run(format: TestFormat, flags: &BuildFlags, settings: &Settings) -> Result<()> {
    let session = Session::load(flags, settings)?;
    let command = session.ctx.test_command(format);

    let machine_readable = matches!(format, TestFormat::Tap(_) | TestFormat::Json);
    if flags.dry_run || (!session.hide && !machine_readable) {
        println!("{}", command.display(flags.tips).bold());
    }
    if flags.dry_run {
        return Ok(());
    }

    let sink = Arc::new(ReportSink::new(format));
    if let TestFormat::Tap(version) = format {
        println!("TAP version {}", version);
    }

    let result = session
        .runner()
        .with_policy(FailurePolicy::ExitCode)
        .with_sink(sink.clone())
        .run(&command, Some(&session.ctx.invocation_dir));

    sink.finish();
    result.context("Tests failed")
}

#[derive(Default)]
struct SinkState {
    report: TestReport,
    package: Option<String>,
}

/// Renders toolchain output in the selected format as it arrives
struct ReportSink {
    format: TestFormat,
    state: Mutex<SinkState>,
}

impl ReportSink {
    fn new(format: TestFormat) -> Self {
        Self {
            format,
            state: Mutex::new(SinkState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn print_case(&self, state: &mut SinkState, case: &TestCase) {
        match self.format {
            TestFormat::Tap(_) => println!("{}", case.to_tap()),
            _ => {
                if state.package.as_deref() != Some(case.package.as_str()) {
                    println!("\n{}", case.package.bold());
                    state.package = Some(case.package.clone());
                }
                let mark = match case.outcome {
                    Outcome::Passed => "✓".green(),
                    Outcome::Failed => "✗".red(),
                    Outcome::Skipped => "-".yellow(),
                };
                println!("  {} {}", mark, case.name);
                if case.outcome == Outcome::Failed {
                    for line in &case.diagnostics {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }
    }

    /// Print the TAP plan or the summary line
    fn finish(&self) {
        let state = self.state();
        match self.format {
            TestFormat::Tap(_) => println!("{}", state.report.plan()),
            TestFormat::Spec => {
                let failed = state.report.count(Outcome::Failed);
                let failed = if failed > 0 {
                    format!("{} failed", failed).red()
                } else {
                    "0 failed".normal()
                };
                println!(
                    "\n{} passed, {}, {} skipped",
                    state.report.count(Outcome::Passed).to_string().green(),
                    failed,
                    state.report.count(Outcome::Skipped)
                );
            }
            TestFormat::Json | TestFormat::Go => {}
        }
    }
}

impl OutputSink for ReportSink {
    fn stdout_line(&self, line: &str) {
        if matches!(self.format, TestFormat::Json | TestFormat::Go) {
            println!("{}", line);
            return;
        }

        let Some(event) = TestEvent::parse(line) else {
            match self.format {
                TestFormat::Tap(_) => println!("# {}", line),
                _ => println!("{}", line),
            }
            return;
        };

        let mut state = self.state();
        if let Some(case) = state.report.record(&event) {
            self.print_case(&mut state, &case);
        }
    }

    fn stderr_line(&self, line: &str) {
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sink_records_json_events() {
        let sink = ReportSink::new(TestFormat::Tap(14));
        sink.stdout_line(r#"{"Action":"run","Package":"app","Test":"TestA"}"#);
        sink.stdout_line("# app [build output]");
        sink.stdout_line(r#"{"Action":"fail","Package":"app","Test":"TestA"}"#);

        let state = sink.state();
        assert_eq!(state.report.count(Outcome::Failed), 1);
        assert_eq!(state.report.plan(), "1..1");
    }

    #[test]
    fn test_raw_formats_skip_the_report() {
        let sink = ReportSink::new(TestFormat::Json);
        sink.stdout_line(r#"{"Action":"pass","Package":"app","Test":"TestA"}"#);

        assert!(sink.state().report.cases().is_empty());
    }
}
