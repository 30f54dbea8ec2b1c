pub mod build;
pub mod exec;
pub mod run;
pub mod test;

use crate::config::Settings;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use qgo_build::{BuildContext, Command, FailurePolicy, ProcessRunner};
use qgo_config::Config;
use std::fs;
use std::path::PathBuf;

/// Build options shared by `build` and `run`
#[derive(Args, Clone, Debug, Default)]
pub struct BuildFlags {
    /// Entry-point source file (default: first file declaring func main)
    pub source: Option<PathBuf>,
    /// Target operating systems, comma separated
    #[arg(long, value_delimiter = ',')]
    pub os: Vec<String>,
    /// Build for WebAssembly (GOOS=js GOARCH=wasm)
    #[arg(long)]
    pub wasm: bool,
    /// Output file name
    #[arg(long, short = 'o')]
    pub output: Option<String>,
    /// Annotate the printed command with explanations
    #[arg(long, short = 't')]
    pub tips: bool,
    /// Strip symbol and debug tables (-s -w)
    #[arg(long, short = 'm')]
    pub minify: bool,
    /// Pass -s -w to gccgo
    #[arg(long, short = 's')]
    pub shrink: bool,
    /// Build with tinygo
    #[arg(long)]
    pub tiny: bool,
    /// Compress the binary with upx
    #[arg(long, short = 'c')]
    pub compress: bool,
    /// Print the command without running it
    #[arg(long, short = 'd')]
    pub dry_run: bool,
    /// Disable Go workspace mode
    #[arg(long, visible_alias = "nowork")]
    pub no_work: bool,
    /// Run `go mod tidy` before building
    #[arg(long, short = 'u')]
    pub update: bool,
    /// Rebuild even when the binary is up to date
    #[arg(long)]
    pub no_cache: bool,
    /// Verbose toolchain and diagnostic output
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl BuildFlags {
    /// Layer command-line overrides on top of the manifest settings
    fn apply(&self, ctx: &mut BuildContext) {
        if let Some(source) = &self.source {
            ctx.input_file = Some(source.clone());
        }
        if !self.os.is_empty() {
            ctx.target_os = self.os.clone();
        }
        if let Some(output) = &self.output {
            ctx.output_file_name = Some(output.clone());
        }
        if self.minify {
            ctx.strip_symbols = true;
            ctx.strip_debugging = true;
        }
        if self.shrink {
            ctx.shrink();
        }
        ctx.wasm |= self.wasm;
        ctx.tiny |= self.tiny;
        ctx.compress |= self.compress;
        ctx.no_work |= self.no_work;
        ctx.tidy |= self.update;
        ctx.ignore_cache |= self.no_cache;
        ctx.verbose |= self.verbose;
    }
}

/// Arguments of `qgo run`
#[derive(Clone, Debug, Default)]
pub struct RunArgs {
    pub flags: BuildFlags,
    pub port: Option<u16>,
    pub no_watch: bool,
    pub no_browser: bool,
    pub args: Vec<String>,
}

/// One build/run cycle: the manifest and the context resolved from it
pub struct Session {
    pub ctx: BuildContext,
    pub manifest: Config,
    policy: FailurePolicy,
    hide: bool,
}

impl Session {
    /// Resolve the manifest for the working directory and apply `flags`
    pub fn load(flags: &BuildFlags, settings: &Settings) -> Result<Self> {
        let mut ctx = BuildContext::new();
        let path = settings.manifest_path(&ctx.invocation_dir);
        let manifest = Config::load(&path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?;

        ctx.configure(&manifest).context("Invalid manifest")?;
        flags.apply(&mut ctx);

        let fail_on_stderr = match settings.fail_on_stderr {
            Some(value) => value,
            None => manifest.opt_bool("fail_on_stderr")?.unwrap_or(true),
        };
        let hide = manifest.opt_bool("hide")?.unwrap_or(false);

        Ok(Self {
            ctx,
            manifest,
            policy: FailurePolicy::from_fail_on_stderr(fail_on_stderr),
            hide,
        })
    }

    /// Runner carrying the stage environment and failure policy
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new()
            .with_env(self.ctx.stage_env())
            .with_policy(self.policy)
    }

    /// Print notices and the command, then create the output directory
    pub fn announce(&self, command: &Command, flags: &BuildFlags) -> Result<()> {
        if !flags.dry_run && !self.ctx.env.is_empty() {
            println!("{}", "# autoapplying the following environment variables".dimmed());
            for (key, value) in &self.ctx.env {
                println!("  {}={}", key.cyan(), value);
            }
        }

        if self.ctx.cached() {
            println!(
                "{}",
                "# using cached build (qgo build --no-cache to force rebuild)".dimmed()
            );
        }

        if !command.is_empty() && !self.hide {
            println!("{}", command.display(flags.tips).bold());
        }

        if !flags.dry_run {
            fs::create_dir_all(&self.ctx.output_path).with_context(|| {
                format!(
                    "Failed to create output directory {}",
                    self.ctx.output_path.display()
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_override_context() {
        let mut ctx = BuildContext::in_dir("/work");
        let flags = BuildFlags {
            source: Some(PathBuf::from("cmd/app.go")),
            os: vec!["linux".to_string(), "windows".to_string()],
            output: Some("tool".to_string()),
            minify: true,
            update: true,
            no_cache: true,
            ..Default::default()
        };

        flags.apply(&mut ctx);

        assert_eq!(ctx.input_file, Some(PathBuf::from("cmd/app.go")));
        assert_eq!(ctx.target_os, vec!["linux", "windows"]);
        assert_eq!(ctx.output_file_name.as_deref(), Some("tool"));
        assert!(ctx.strip_symbols && ctx.strip_debugging);
        assert!(ctx.tidy);
        assert!(ctx.ignore_cache);
        assert!(!ctx.wasm);
    }

    #[test]
    fn test_unset_flags_keep_manifest_values() {
        let mut ctx = BuildContext::in_dir("/work");
        ctx.compress = true;
        ctx.target_os = vec!["darwin".to_string()];

        BuildFlags::default().apply(&mut ctx);

        assert!(ctx.compress);
        assert_eq!(ctx.target_os, vec!["darwin"]);
    }
}
