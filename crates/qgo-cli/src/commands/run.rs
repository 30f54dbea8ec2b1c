//! Run command - build, run and restart on changes
//!
//! Native targets run as a restart loop: each cycle builds, starts the
//! program and watches the sources; a change stops the watchers, kills the
//! running pipeline and starts the next cycle. WASM targets are served by
//! the dev server and rebuilt in place, with connected browsers told to
//! reload.

use super::{RunArgs, Session};
use crate::config::Settings;
use crate::watch::{self, is_rebuild_trigger, is_write, RebuildGate, WatchSet};
use anyhow::{Context, Result};
use colored::Colorize;
use notify::Event;
use qgo_build::{BuildError, BuildResult, ProcessRunner};
use qgo_serve::{bind, open_browser, DevServer, PortChoice, ReloadHub};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Interval between kill attempts while a pipeline winds down
const KILL_RETRY: Duration = Duration::from_millis(100);

enum LoopEvent {
    Changed(PathBuf),
    Finished(BuildResult<()>),
}

/// Run the run command
pub fn run(args: &RunArgs, settings: &Settings) -> Result<()> {
    let session = load(args, settings)?;

    if session.ctx.wasm {
        run_wasm(session, args, settings)
    } else {
        run_native(session, args, settings)
    }
}

fn load(args: &RunArgs, settings: &Settings) -> Result<Session> {
    let mut session = Session::load(&args.flags, settings)?;
    if args.port.is_some() {
        session.ctx.port = args.port;
    }
    Ok(session)
}

fn run_native(first: Session, args: &RunArgs, settings: &Settings) -> Result<()> {
    let mut next = Some(first);

    loop {
        let mut session = match next.take() {
            Some(session) => session,
            None => load(args, settings)?,
        };

        let command = session
            .ctx
            .run_command(&args.args)
            .context("Failed to prepare run")?;
        session.announce(&command, &args.flags)?;

        if args.flags.dry_run {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();

        let watchers = if args.no_watch {
            None
        } else {
            let changes = tx.clone();
            let patterns = watch::patterns(&session.manifest)?;
            let set = WatchSet::start(&patterns, move |event: notify::Result<Event>| match event {
                Ok(event) if is_rebuild_trigger(&event.kind) => {
                    if let Some(path) = event.paths.into_iter().next() {
                        let _ = changes.send(LoopEvent::Changed(path));
                    }
                }
                Ok(_) => {}
                Err(e) => eprintln!("{} {}", "[watch]".yellow(), e),
            });
            if set.is_empty() {
                eprintln!("{} no files matched {:?}", "[watch]".yellow(), patterns);
            }
            Some(set)
        };

        let runner = session.runner();
        let pipeline = {
            let runner = runner.clone();
            let cwd = session.ctx.invocation_dir.clone();
            thread::spawn(move || {
                let result = runner.run(&command, Some(&cwd));
                let _ = tx.send(LoopEvent::Finished(result));
            })
        };

        match rx.recv() {
            Ok(LoopEvent::Changed(path)) => {
                drop(watchers);
                println!(
                    "{} {} changed, rebuilding {}",
                    "[watch]".cyan(),
                    path.display(),
                    session.ctx.output_file_name()
                );
                stop(&runner, &rx);
                let _ = pipeline.join();
            }
            Ok(LoopEvent::Finished(result)) => {
                drop(watchers);
                let _ = pipeline.join();
                return result.context("Run failed");
            }
            Err(_) => {
                let _ = pipeline.join();
                return Ok(());
            }
        }
    }
}

/// Kill the running stage until the pipeline reports completion.
///
/// Between stages there is no process to kill, so the next stage is
/// caught on a later attempt.
fn stop(runner: &ProcessRunner, events: &Receiver<LoopEvent>) {
    loop {
        match runner.kill() {
            Ok(()) | Err(BuildError::NoProcess) => {}
            Err(e) => tracing::warn!(error = %e, "failed to stop the running program"),
        }

        match events.recv_timeout(KILL_RETRY) {
            Ok(LoopEvent::Finished(_)) | Err(RecvTimeoutError::Disconnected) => return,
            Ok(LoopEvent::Changed(_)) | Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn run_wasm(mut session: Session, args: &RunArgs, settings: &Settings) -> Result<()> {
    let command = session
        .ctx
        .build_command()
        .context("Failed to prepare build")?;
    session.announce(&command, &args.flags)?;

    if args.flags.dry_run {
        return Ok(());
    }

    if !command.is_empty() {
        session
            .runner()
            .run(&command, Some(&session.ctx.invocation_dir))
            .context("Build failed")?;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let listener = runtime.block_on(bind(PortChoice::from_option(session.ctx.port)))?;
    let url = format!("http://localhost:{}", listener.local_addr()?.port());
    println!("{} {}", "server available at".green(), url.bold());

    let hub = ReloadHub::new();
    let server = runtime.spawn(DevServer::new(&session.ctx.output_path, hub.clone()).serve(listener));

    if !args.no_browser && session.manifest.opt_bool("autobrowse")?.unwrap_or(true) {
        if let Err(e) = open_browser(&url) {
            eprintln!("{} {}", "warning:".yellow(), e);
        }
    }

    let _watchers = if args.no_watch {
        None
    } else {
        let flags = args.clone();
        let settings = settings.clone();
        let gate = RebuildGate::new(hub, move || rebuild_wasm(&flags, &settings));
        let patterns = watch::patterns(&session.manifest)?;
        Some(WatchSet::start(&patterns, move |event: notify::Result<Event>| match event {
            Ok(event) if is_write(&event.kind) => {
                gate.on_write();
            }
            Ok(_) => {}
            Err(e) => eprintln!("{} {}", "[watch]".yellow(), e),
        }))
    };

    runtime.block_on(server).context("Dev server task failed")??;
    Ok(())
}

/// Forced rebuild triggered by a source write
fn rebuild_wasm(args: &RunArgs, settings: &Settings) -> Result<()> {
    let mut session = load(args, settings)?;
    session.ctx.ignore_cache = true;

    let command = session
        .ctx
        .build_command()
        .context("Failed to prepare build")?;
    session.announce(&command, &args.flags)?;

    session
        .runner()
        .run(&command, Some(&session.ctx.invocation_dir))
        .context("Build failed")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use qgo_build::Command;
    use std::time::Instant;

    #[test]
    fn test_stop_kills_running_program() {
        let runner = ProcessRunner::new();
        let (tx, rx) = mpsc::channel();

        let background = runner.clone();
        let pipeline = thread::spawn(move || {
            let result = background.run(&Command::from_stages([vec!["sleep", "30"]]), None);
            let _ = tx.send(LoopEvent::Finished(result));
        });

        let started = Instant::now();
        while runner.pid().is_none() {
            assert!(started.elapsed() < Duration::from_secs(5), "program never started");
            thread::sleep(Duration::from_millis(10));
        }

        stop(&runner, &rx);
        pipeline.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_stop_returns_when_pipeline_is_gone() {
        let runner = ProcessRunner::new();
        let (tx, rx) = mpsc::channel::<LoopEvent>();
        tx.send(LoopEvent::Changed(PathBuf::from("main.go"))).unwrap();
        drop(tx);

        stop(&runner, &rx);
    }
}
