//! `go test -json` event parsing and TAP rendering

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How `qgo test` presents results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestFormat {
    /// Grouped pass/fail listing with a summary
    #[default]
    Spec,
    /// TAP stream with the given version header (13 or 14)
    Tap(u8),
    /// Raw `go test -json` events
    Json,
    /// Plain `go test` output
    Go,
}

impl TestFormat {
    /// Whether the toolchain must be asked for JSON events
    pub fn wants_json(&self) -> bool {
        !matches!(self, Self::Go)
    }
}

impl FromStr for TestFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "spec" => Ok(Self::Spec),
            "tap" | "tap14" => Ok(Self::Tap(14)),
            "tap13" => Ok(Self::Tap(13)),
            "json" => Ok(Self::Json),
            "go" => Ok(Self::Go),
            other => Err(format!(
                "unknown test format '{}' (expected spec, tap, tap13, tap14, json or go)",
                other
            )),
        }
    }
}

impl fmt::Display for TestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec => f.write_str("spec"),
            Self::Tap(version) => write!(f, "tap{}", version),
            Self::Json => f.write_str("json"),
            Self::Go => f.write_str("go"),
        }
    }
}

/// One line of `go test -json` output
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    pub action: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl TestEvent {
    /// Parse a JSON event line; `None` for anything else (build output)
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// A finished test, numbered in completion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub number: usize,
    pub package: String,
    pub name: String,
    pub outcome: Outcome,
    /// Output lines, without the toolchain's own `===`/`---`/`FAIL` framing
    pub diagnostics: Vec<String>,
}

impl TestCase {
    /// TAP test point with a package comment and a YAML diagnostic block
    pub fn to_tap(&self) -> String {
        let status = match self.outcome {
            Outcome::Failed => "not ok",
            Outcome::Passed | Outcome::Skipped => "ok",
        };

        let mut text = format!("# {}\n{} {} - {}", self.package, status, self.number, self.name);
        if self.outcome == Outcome::Skipped {
            text.push_str(" # SKIP");
        }
        if !self.diagnostics.is_empty() {
            let message = self.diagnostics.join("\n  ").replace('"', "'");
            text.push_str(&format!("\n  ---\n  message: \"{}\"\n  ...", message));
        }
        text
    }
}

/// Folds `go test -json` events into finished test cases.
///
/// Tests are tracked by package and name, so interleaved output from
/// parallel tests stays with the right case.
#[derive(Debug, Default)]
pub struct TestReport {
    running: HashMap<(String, String), Vec<String>>,
    finished: Vec<TestCase>,
}

impl TestReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; returns the case it completed, if any
    pub fn record(&mut self, event: &TestEvent) -> Option<TestCase> {
        let name = event.test.as_ref()?;
        let key = (event.package.clone(), name.clone());

        let outcome = match event.action.as_str() {
            "run" => {
                self.running.insert(key, Vec::new());
                return None;
            }
            "output" => {
                if let Some(output) = &event.output {
                    let line = output.trim();
                    let framing = ["===", "---", "FAIL"].iter().any(|p| line.starts_with(p));
                    if !framing && !line.is_empty() {
                        self.running.entry(key).or_default().push(line.to_string());
                    }
                }
                return None;
            }
            "pass" => Outcome::Passed,
            "fail" => Outcome::Failed,
            "skip" => Outcome::Skipped,
            _ => return None,
        };

        let diagnostics = self.running.remove(&key).unwrap_or_default();
        let case = TestCase {
            number: self.finished.len() + 1,
            package: event.package.clone(),
            name: name.clone(),
            outcome,
            diagnostics,
        };
        self.finished.push(case.clone());
        Some(case)
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.finished
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.finished.iter().filter(|c| c.outcome == outcome).count()
    }

    /// TAP plan line
    pub fn plan(&self) -> String {
        format!("1..{}", self.finished.len())
    }
}
