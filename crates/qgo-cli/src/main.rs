use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;
mod watch;

use commands::{BuildFlags, RunArgs};
use qgo_build::TestFormat;

/// Manifest-driven front end for the Go toolchain.
///
/// Reads `manifest.json` from the current directory, synthesizes the
/// matching `go build` invocation and runs it. `qgo run` also runs the
/// built program and restarts it when sources change; WASM builds are
/// served with live reload. `qgo exec` runs manifest scripts and `qgo test`
/// reports `go test` results.
///
/// EXAMPLES:
///     qgo build                  Build the project
///     qgo build --dry-run --tips Show the annotated command only
///     qgo run -- --listen :80    Build, run and pass arguments
///     qgo run --wasm             Build to WASM and serve with live reload
///     qgo exec lint              Run a manifest script
///     qgo test -f tap            Run the tests and report in TAP
///
/// ENVIRONMENT VARIABLES:
///     QGO_MANIFEST        Manifest path (default: manifest.json)
///     QGO_LOG             Diagnostic log filter (default: warn)
///     QGO_FAIL_ON_STDERR  Set to '0' to judge stages by exit code only
///     NO_COLOR            Set to disable colored output
#[derive(Parser)]
#[command(name = "qgo")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    ///
    /// Skips the build when the existing binary is newer than every Go
    /// source, go.mod and go.sum (use --no-cache to force).
    ///
    /// EXAMPLES:
    ///     qgo build                  Build with manifest settings
    ///     qgo build --os linux       Cross-compile
    ///     qgo build -m -c            Strip symbols and compress with upx
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        flags: BuildFlags,
    },

    /// Build and run the project, restarting on source changes
    ///
    /// In WASM mode the output directory is served over HTTP and connected
    /// browsers reload after each rebuild.
    ///
    /// EXAMPLES:
    ///     qgo run                    Build, run and watch
    ///     qgo run --no-watch         Build and run once
    ///     qgo run --wasm -p 9000     Serve a WASM build on port 9000
    #[command(visible_alias = "r")]
    Run {
        #[command(flatten)]
        flags: BuildFlags,
        /// Dev server port (WASM only; default: first free port from 8000)
        #[arg(long, short = 'p')]
        port: Option<u16>,
        /// Run once without watching for changes
        #[arg(long)]
        no_watch: bool,
        /// Do not open a browser for WASM builds
        #[arg(long)]
        no_browser: bool,
        /// Arguments passed to the built program
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Run a script from the manifest `scripts` table
    ///
    /// Extra arguments are appended to the script line, which runs through
    /// the platform shell with the manifest environment applied.
    ///
    /// EXAMPLES:
    ///     qgo exec lint              Run scripts.lint
    ///     qgo exec migrate up 3      Run scripts.migrate with arguments
    #[command(visible_alias = "x")]
    Exec {
        /// Script name
        script: String,
        /// Arguments appended to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the project's tests
    ///
    /// EXAMPLES:
    ///     qgo test                   Grouped pass/fail listing
    ///     qgo test -f tap            TAP 14 stream
    ///     qgo test -f go             Plain go test output
    #[command(visible_alias = "t")]
    Test {
        /// Output format: spec, tap, tap13, tap14, json or go
        #[arg(long, short = 'f', default_value = "spec")]
        format: TestFormat,
        /// Print the command without running it
        #[arg(long, short = 'd')]
        dry_run: bool,
        /// Verbose toolchain output
        #[arg(long, short = 'v')]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Settings::from_env();

    if settings.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Build { flags } => {
            logging::init(flags.verbose, settings.log.as_deref());
            commands::build::run(&flags, &settings)?;
        }
        Commands::Run {
            flags,
            port,
            no_watch,
            no_browser,
            args,
        } => {
            logging::init(flags.verbose, settings.log.as_deref());
            let args = RunArgs {
                flags,
                port,
                no_watch,
                no_browser,
                args,
            };
            commands::run::run(&args, &settings)?;
        }
        Commands::Exec { script, args } => {
            logging::init(false, settings.log.as_deref());
            commands::exec::run(&script, &args, &settings)?;
        }
        Commands::Test {
            format,
            dry_run,
            verbose,
        } => {
            logging::init(verbose, settings.log.as_deref());
            let flags = BuildFlags {
                dry_run,
                verbose,
                ..Default::default()
            };
            commands::test::run(format, &flags, &settings)?;
        }
    }

    Ok(())
}
