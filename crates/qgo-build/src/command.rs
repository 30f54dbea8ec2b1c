//! Staged toolchain commands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token separating pipeline stages inside a [`Command`]
pub const STAGE_SEPARATOR: &str = "&&";

/// Platform shell invocation that runs one command line
pub(crate) fn shell_prefix() -> [&'static str; 2] {
    if cfg!(windows) {
        ["cmd", "/C"]
    } else {
        ["sh", "-c"]
    }
}

/// Auxiliary shell command run at a stage boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Injection {
    /// Stage index the command is attached to
    pub stage: usize,
    /// Shell command text
    pub command: String,
    /// Run before the stage (otherwise after)
    #[serde(default)]
    pub before: bool,
    /// Log failures of this command instead of aborting the run
    #[serde(default, rename = "noerror", alias = "no_error")]
    pub no_error: bool,
}

impl Injection {
    /// Command run before stage `stage`
    pub fn before(stage: usize, command: impl Into<String>) -> Self {
        Self {
            stage,
            command: command.into(),
            before: true,
            no_error: false,
        }
    }

    /// Command run after stage `stage`
    pub fn after(stage: usize, command: impl Into<String>) -> Self {
        Self {
            stage,
            command: command.into(),
            before: false,
            no_error: false,
        }
    }

    /// Keep running the pipeline if this command fails
    pub fn ignore_errors(mut self) -> Self {
        self.no_error = true;
        self
    }
}

/// Ordered argument tokens for one or more pipeline stages.
///
/// The token list is fixed once the synthesizer returns it; only the
/// injection table can still be extended. Literal arguments belong to the
/// last stage and are never split on [`STAGE_SEPARATOR`] or unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
    literal: Vec<String>,
    injections: Vec<Injection>,
}

impl Command {
    /// Empty command (nothing to run)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command from explicit stages
    pub fn from_stages<I, S, T>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut command = Self::new();
        for stage in stages {
            if !command.tokens.is_empty() {
                command.push(STAGE_SEPARATOR);
            }
            command.extend(stage);
        }
        command
    }

    /// Single stage running `line` through the platform shell.
    ///
    /// The line is passed as a literal argument, so the shell alone
    /// interprets it.
    pub fn shell(line: impl Into<String>) -> Self {
        let mut command = Self::new();
        command.extend(shell_prefix());
        command.append_literal([line.into()]);
        command
    }

    pub(crate) fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    pub(crate) fn extend<I, T>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
    }

    /// Append arguments handed verbatim to the last stage's program
    pub fn append_literal<I, T>(&mut self, args: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.literal.extend(args.into_iter().map(Into::into));
    }

    /// Arguments passed unchanged to the last stage
    pub fn literal_args(&self) -> &[String] {
        &self.literal
    }

    /// Attach an injected command
    pub fn inject(&mut self, injection: Injection) {
        self.injections.push(injection);
    }

    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    /// Injected commands for `stage` on one side of it, in registration order
    pub fn injections_for(&self, stage: usize, before: bool) -> impl Iterator<Item = &Injection> {
        self.injections
            .iter()
            .filter(move |i| i.stage == stage && i.before == before)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.literal.is_empty()
    }

    /// Split into stages on [`STAGE_SEPARATOR`], skipping empty stages
    pub fn stages(&self) -> Vec<&[String]> {
        self.tokens
            .split(|token| token == STAGE_SEPARATOR)
            .filter(|stage| !stage.is_empty())
            .collect()
    }

    /// Render the command, optionally annotating known flags
    pub fn display(&self, show_tips: bool) -> String {
        if !show_tips {
            return self.to_string();
        }

        self.tokens
            .iter()
            .map(|token| match tip_for(token) {
                Some(tip) => format!("{} ({})", token, tip),
                None => token.clone(),
            })
            .chain(self.literal.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<&str> = self
            .tokens
            .iter()
            .chain(&self.literal)
            .map(String::as_str)
            .collect();
        f.write_str(&shown.join(" "))
    }
}

fn tip_for(token: &str) -> Option<&'static str> {
    let flag = token.split('=').next().unwrap_or(token);
    let tip = match flag {
        "-C" => "change to directory before building",
        "-a" => "force rebuild of packages that are already up to date",
        "-n" => "print the commands but do not run them",
        "-x" => "print the commands",
        "-v" => "print package names as they are compiled",
        "-i" => "install dependencies",
        "-race" => "enable data race detection",
        "-trimpath" => "remove file system paths from the binary",
        "-ldflags" => "arguments passed to the linker",
        "-gcflags" => "arguments passed to the gc compiler",
        "-asmflags" => "arguments passed to the assembler",
        "-gccgoflags" => "arguments passed to gccgo",
        "-tags" => "additional build tags",
        "-o" => "output file",
        "-target" => "tinygo target",
        STAGE_SEPARATOR => "then",
        _ => return None,
    };
    Some(tip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_noop() {
        let cmd = Command::new();
        assert!(cmd.is_empty());
        assert!(cmd.stages().is_empty());
        assert_eq!(cmd.display(true), "");
        assert_eq!(cmd.to_string(), "");
    }

    #[test]
    fn test_from_stages_inserts_separator() {
        let cmd = Command::from_stages([vec!["go", "build"], vec!["./bin/app"]]);
        assert_eq!(cmd.to_string(), "go build && ./bin/app");
        assert_eq!(cmd.stages().len(), 2);
        assert_eq!(cmd.stages()[1], &["./bin/app".to_string()]);
    }

    #[test]
    fn test_stages_skip_empty_segments() {
        let mut cmd = Command::new();
        cmd.extend(["&&", "a", "&&", "&&", "b"]);
        let stages = cmd.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0], &["a".to_string()]);
    }

    #[test]
    fn test_literal_args_stay_out_of_stages() {
        let mut cmd = Command::from_stages([vec!["go", "build"], vec!["./bin/app"]]);
        cmd.append_literal(["&&", "rm", "\"quoted\""]);

        assert_eq!(cmd.stages().len(), 2);
        assert_eq!(cmd.stages()[1], &["./bin/app".to_string()]);
        assert_eq!(cmd.literal_args(), &["&&", "rm", "\"quoted\""]);
        assert_eq!(cmd.to_string(), "go build && ./bin/app && rm \"quoted\"");
        assert!(!cmd.display(true).contains("&& (then) rm"));
    }

    #[test]
    fn test_shell_command_is_one_stage() {
        let cmd = Command::shell("echo a && echo b");
        assert_eq!(cmd.stages().len(), 1);
        assert_eq!(cmd.literal_args(), &["echo a && echo b".to_string()]);
    }

    #[test]
    fn test_injections_filtered_by_side() {
        let mut cmd = Command::from_stages([vec!["a"], vec!["b"]]);
        cmd.inject(Injection::before(1, "echo before"));
        cmd.inject(Injection::after(1, "echo after").ignore_errors());
        cmd.inject(Injection::before(0, "echo first"));

        let before: Vec<_> = cmd.injections_for(1, true).map(|i| i.command.as_str()).collect();
        assert_eq!(before, vec!["echo before"]);
        let after: Vec<_> = cmd.injections_for(1, false).collect();
        assert_eq!(after.len(), 1);
        assert!(after[0].no_error);
    }

    #[test]
    fn test_display_with_tips() {
        let cmd = Command::from_stages([vec!["go", "build", "-v", "-o", "./bin/app", "main.go"]]);
        let shown = cmd.display(true);
        assert!(shown.contains("-v (print package names as they are compiled)"));
        assert!(shown.contains("-o (output file)"));
        assert!(shown.ends_with("main.go"));
    }

    #[test]
    fn test_injection_deserializes_noerror() {
        let json = r#"{ "stage": 0, "command": "echo hi", "before": true, "noerror": true }"#;
        let injection = parse_injection(json);
        assert_eq!(injection, Injection::before(0, "echo hi").ignore_errors());
    }

    fn parse_injection(json: &str) -> Injection {
        let config = qgo_config::Config::from_json_str(&format!(r#"{{ "x": {} }}"#, json)).unwrap();
        config.deserialize("x").unwrap().unwrap()
    }
}
