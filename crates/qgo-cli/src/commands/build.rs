//! Build command - synthesize and run the toolchain invocation

use super::{BuildFlags, Session};
use crate::config::Settings;
use anyhow::{Context, Result};

/// Run the build command
pub fn run(flags: &BuildFlags, settings: &Settings) -> Result<()> {
    let mut session = Session::load(flags, settings)?;
    let command = session.ctx.build_command().context("Failed to prepare build")?;

    session.announce(&command, flags)?;

    if flags.dry_run || command.is_empty() {
        return Ok(());
    }

    session
        .runner()
        .run(&command, Some(&session.ctx.invocation_dir))
        .context("Build failed")
}
