//! Command synthesis
//!
//! Maps a [`BuildContext`] onto the `go build` (or `tinygo build`) argument
//! sequence. Linker arguments are emitted in a fixed order: build timestamp,
//! `-s`, `-w`, library paths, `-shared`, external linker settings, temp dir.

use crate::command::{Command, Injection, STAGE_SEPARATOR};
use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::report::TestFormat;
use crate::paths::{escape_spaces, relative_display, strip_quotes};
use crate::staleness::{self, Freshness};
use chrono::SecondsFormat;
use qgo_config::{Config, ConfigError, LookupError};
use std::path::PathBuf;
use tracing::{debug, info};

/// `qgo` flags that only affect the build and never reach the built binary
const BUILD_ONLY_FLAGS: [&str; 14] = [
    "bundle", "os", "wasm", "output", "tips", "minify", "shrink", "dry-run", "nowork", "no-work",
    "update", "port", "no-cache", "profile",
];

/// Build-only flags that consume the following argument
const VALUE_FLAGS: [&str; 5] = ["bundle", "os", "output", "port", "profile"];

impl BuildContext {
    /// Synthesize the build command.
    ///
    /// Returns an empty [`Command`] and marks the context cached when the
    /// existing artifact is newer than every tracked source (unless
    /// `ignore_cache` is set).
    pub fn build_command(&mut self) -> BuildResult<Command> {
        if self.cached {
            return Ok(Command::new());
        }

        let output = self.output();
        if !self.ignore_cache {
            let extra: Vec<PathBuf> = self.manifest_file.iter().cloned().collect();
            match staleness::check(&output, &self.cwd, &self.output_path, &extra) {
                Freshness::Fresh => {
                    self.cached = true;
                    info!(output = %output.display(), "using cached build");
                    return Ok(Command::new());
                }
                Freshness::Stale(reason) => debug!(?reason, "rebuilding"),
            }
        }

        let input = self.input_file()?;
        let mut cmd = Command::new();

        cmd.push(if self.tiny { "tinygo" } else { "go" });
        cmd.push("build");

        if self.cwd != self.invocation_dir {
            cmd.push("-C");
            cmd.push(escape_spaces(&relative_display(
                &self.cwd,
                &self.invocation_dir,
                false,
            )));
        }

        let linker = self.linker_flags();

        if self.install_dependencies {
            cmd.push("-i");
        }
        if self.verbose {
            cmd.push("-v");
        }
        cmd.extend(self.build_flags.iter().cloned());

        if !linker.is_empty() {
            cmd.push("-ldflags");
            cmd.push(format!("\"{}\"", linker.join(" ")));
        }

        if !self.tags.is_empty() {
            cmd.push(format!("-tags=\"{}\"", self.tags.join(",")));
        }

        for set in [&self.asm_flags, &self.gccgo_flags, &self.gc_flags] {
            if !set.is_empty() {
                cmd.push(set.render());
            }
        }

        cmd.push("-o");
        cmd.push(escape_spaces(&relative_display(&output, &self.cwd, true)));

        if self.tiny && self.wasm {
            cmd.push("-target=wasm");
        }

        cmd.push(escape_spaces(&relative_display(&input, &self.cwd, false)));

        if self.tidy {
            let tidy = if self.cwd != self.invocation_dir {
                format!(
                    "cd {} && go mod tidy",
                    escape_spaces(&relative_display(&self.cwd, &self.invocation_dir, false))
                )
            } else {
                "go mod tidy".to_string()
            };
            cmd.inject(Injection::before(0, tidy));
        }

        if self.compress {
            let target = relative_display(&output, &self.invocation_dir, true);
            cmd.inject(Injection::after(0, format!("upx -9 {}", escape_spaces(&target))).ignore_errors());
        }

        for injection in &self.injections {
            cmd.inject(injection.clone());
        }

        Ok(cmd)
    }

    /// Synthesize the build command followed (for native targets) by a stage
    /// that runs the built binary with `passthrough` arguments.
    pub fn run_command(&mut self, passthrough: &[String]) -> BuildResult<Command> {
        let mut cmd = self.build_command()?;

        if !self.wasm {
            if !cmd.is_empty() {
                cmd.push(STAGE_SEPARATOR);
            }
            let binary = relative_display(&self.output(), &self.invocation_dir, true);
            cmd.push(escape_spaces(&binary));
            cmd.append_literal(filter_passthrough_args(passthrough));
        }

        Ok(cmd)
    }

    /// `go test` over every package below the working directory
    pub fn test_command(&self, format: TestFormat) -> Command {
        let mut cmd = Command::new();
        cmd.push("go");
        cmd.push("test");

        if self.cwd != self.invocation_dir {
            cmd.push("-C");
            cmd.push(escape_spaces(&relative_display(
                &self.cwd,
                &self.invocation_dir,
                false,
            )));
        }
        if self.verbose {
            cmd.push("-v");
        }
        if !self.tags.is_empty() {
            cmd.push("-tags");
            cmd.push(self.tags.join(","));
        }
        if format.wants_json() {
            cmd.push("-json");
        }
        cmd.push("./...");
        cmd
    }

    /// Contents of the `-ldflags` bundle: manifest flags, then linked
    /// variables, then the generated flags in their fixed order
    fn linker_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self
            .ldflags
            .iter()
            .map(|flag| strip_quotes(flag).to_string())
            .collect();
        flags.extend(self.linked_variables.iter().cloned());

        let timestamp = self.build_time.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut generated = vec![format!("-X 'main.buildTime={}'", timestamp)];

        if self.strip_symbols {
            generated.push("-s".to_string());
        }
        if self.strip_debugging {
            generated.push("-w".to_string());
        }
        for lib in &self.lib_paths {
            generated.push(format!("-L {}", lib));
        }
        if self.shared {
            generated.push("-shared".to_string());
        }
        if let Some(extld) = &self.ext_ld {
            generated.push(format!("-extld {}", extld));
        }
        if !self.ext_ld_flags.is_empty() {
            generated.push(format!("-extldflags '{}'", self.ext_ld_flags.join(" ")));
        }
        if let Some(dir) = &self.tmp_dir {
            generated.push(format!("-tmpdir {}", dir));
        }

        for flag in generated {
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
        flags
    }
}

/// Shell command for the manifest script `name`, with `args` appended to
/// the script line as-is.
pub fn script_command(manifest: &Config, name: &str, args: &[String]) -> BuildResult<Command> {
    let scripts = manifest
        .opt_object("scripts")
        .map_err(ConfigError::from)?
        .filter(|scripts| !scripts.is_empty())
        .ok_or(BuildError::NoScripts)?;

    let script = scripts.get(name).ok_or_else(|| BuildError::UnknownScript {
        name: name.to_string(),
    })?;
    let line = script.as_str().ok_or_else(|| {
        ConfigError::from(LookupError::WrongType {
            key: format!("scripts.{}", name),
            expected: "a string",
            found: script.type_name(),
        })
    })?;

    let mut parts = vec![line.to_string()];
    parts.extend(args.iter().cloned());
    debug!(script = name, "running manifest script");
    Ok(Command::shell(parts.join(" ")))
}

/// Arguments forwarded to the built binary.
///
/// Everything after a `--` separator is kept; without one, a leading `.go`
/// source argument is dropped. Build-only `qgo` flags are removed in both
/// cases, together with their value when they take one.
pub fn filter_passthrough_args(args: &[String]) -> Vec<String> {
    let rest = match args.iter().position(|arg| arg == "--") {
        Some(index) => &args[index + 1..],
        None => match args.first() {
            Some(first) if first.ends_with(".go") => &args[1..],
            _ => args,
        },
    };

    let mut kept = Vec::with_capacity(rest.len());
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        let Some(name) = arg.strip_prefix("--") else {
            kept.push(arg.clone());
            continue;
        };

        let (flag, inline_value) = match name.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (name, false),
        };
        if !BUILD_ONLY_FLAGS.contains(&flag) {
            kept.push(arg.clone());
            continue;
        }
        if !inline_value && VALUE_FLAGS.contains(&flag) {
            iter.next();
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_passthrough_after_separator() {
        assert_eq!(
            filter_passthrough_args(&args(&["main.go", "--", "serve", "--verbose"])),
            args(&["serve", "--verbose"])
        );
    }

    #[test]
    fn test_passthrough_drops_leading_source() {
        assert_eq!(
            filter_passthrough_args(&args(&["main.go", "serve"])),
            args(&["serve"])
        );
    }

    #[test]
    fn test_passthrough_removes_build_only_flags() {
        assert_eq!(
            filter_passthrough_args(&args(&[
                "--no-cache",
                "--port",
                "9000",
                "--os=linux",
                "--debug",
                "x"
            ])),
            args(&["--debug", "x"])
        );
    }

    #[test]
    fn test_passthrough_empty() {
        assert!(filter_passthrough_args(&[]).is_empty());
    }
}
