//! Exec command - run a script from the manifest `scripts` table

use super::{BuildFlags, Session};
use crate::config::Settings;
use anyhow::{Context, Result};
use colored::Colorize;
use qgo_build::{script_command, FailurePolicy};

/// Run the exec command
pub fn run(script: &str, args: &[String], settings: &Settings) -> Result<()> {
    let session = Session::load(&BuildFlags::default(), settings)?;
    let command = script_command(&session.manifest, script, args)?;

    if !session.hide {
        println!("{}", command.literal_args().join(" ").bold());
    }

    session
        .runner()
        .with_policy(FailurePolicy::ExitCode)
        .run(&command, Some(&session.ctx.invocation_dir))
        .with_context(|| format!("Script '{}' failed", script))
}
