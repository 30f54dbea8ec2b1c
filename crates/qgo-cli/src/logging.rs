use tracing_subscriber::EnvFilter;

/// Install the diagnostic subscriber on stderr.
///
/// `--verbose` forces `debug`; otherwise `QGO_LOG` is used, falling back to
/// `warn` when unset or unparsable.
pub fn init(verbose: bool, directive: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        directive
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"))
    };

    // A subscriber may already be installed (tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
