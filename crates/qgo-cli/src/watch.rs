//! File watching and live-reload coordination for `qgo run`

use anyhow::Result;
use colored::Colorize;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use qgo_config::Config;
use qgo_serve::{ReloadHub, RELOAD_TOKEN};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Patterns watched when the manifest has no `livereload` entry
pub const DEFAULT_PATTERNS: [&str; 2] = ["**/*.go", "*.go"];

/// Delay between a finished rebuild and the reload broadcast
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Time after a broadcast during which further writes are ignored
const COOLDOWN: Duration = Duration::from_secs(3);

/// Watch patterns from the manifest `livereload` array
pub fn patterns(manifest: &Config) -> Result<Vec<String>> {
    Ok(manifest
        .opt_strings("livereload")?
        .unwrap_or_else(|| DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()))
}

/// Expand glob patterns into a sorted, de-duplicated path list.
///
/// A bad pattern or unreadable entry is reported and skipped.
pub fn expand(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(path) => {
                            paths.insert(path);
                        }
                        Err(e) => eprintln!("{} {}", "[watch]".yellow(), e),
                    }
                }
            }
            Err(e) => eprintln!("{} invalid pattern '{}': {}", "[watch]".yellow(), pattern, e),
        }
    }
    paths.into_iter().collect()
}

/// Active watchers; dropping the set stops watching
pub struct WatchSet {
    watchers: Vec<RecommendedWatcher>,
}

impl WatchSet {
    /// Watch every path matched by `patterns`, delivering events to `handler`
    pub fn start<F>(patterns: &[String], handler: F) -> Self
    where
        F: Fn(notify::Result<Event>) + Clone + Send + 'static,
    {
        let mut watchers = Vec::new();

        for path in expand(patterns) {
            let watcher = notify::recommended_watcher(handler.clone()).and_then(|mut watcher| {
                watcher.watch(&path, RecursiveMode::NonRecursive)?;
                Ok(watcher)
            });

            match watcher {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => eprintln!(
                    "{} cannot watch {}: {}",
                    "[watch]".yellow(),
                    path.display(),
                    e
                ),
            }
        }

        tracing::debug!(count = watchers.len(), "watching");
        Self { watchers }
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

/// Events that restart a native run
pub fn is_rebuild_trigger(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    )
}

/// Content writes, the only events that trigger a WASM rebuild
pub fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
    )
}

type Rebuild = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Coalesces writes into at most one rebuild in flight.
///
/// Writes arriving while a rebuild, its settle delay or its cooldown is in
/// progress are dropped.
#[derive(Clone)]
pub struct RebuildGate {
    in_flight: Arc<AtomicBool>,
    settle: Duration,
    cooldown: Duration,
    rebuild: Rebuild,
    hub: ReloadHub,
}

impl RebuildGate {
    pub fn new(hub: ReloadHub, rebuild: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            settle: SETTLE_DELAY,
            cooldown: COOLDOWN,
            rebuild: Arc::new(rebuild),
            hub,
        }
    }

    pub fn with_delays(mut self, settle: Duration, cooldown: Duration) -> Self {
        self.settle = settle;
        self.cooldown = cooldown;
        self
    }

    /// Start a rebuild unless one is already in flight
    pub fn on_write(&self) -> Option<JoinHandle<()>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("rebuild in flight, change dropped");
            return None;
        }

        let gate = self.clone();
        Some(thread::spawn(move || {
            match (gate.rebuild)() {
                Ok(()) => {
                    thread::sleep(gate.settle);
                    let reached = gate.hub.broadcast(RELOAD_TOKEN);
                    println!("{} reloaded {} client(s)", "[livereload]".green(), reached);
                }
                Err(e) => eprintln!("{} {:#}", "[livereload] rebuild failed:".red(), e),
            }
            thread::sleep(gate.cooldown);
            gate.in_flight.store(false, Ordering::SeqCst);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    // ============================================================================
    // Event filters
    // ============================================================================

    #[test]
    fn test_rebuild_triggers() {
        assert!(is_rebuild_trigger(&EventKind::Create(CreateKind::File)));
        assert!(is_rebuild_trigger(&EventKind::Remove(RemoveKind::File)));
        assert!(is_rebuild_trigger(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_rebuild_trigger(&EventKind::Modify(ModifyKind::Name(
            RenameMode::Both
        ))));
        assert!(!is_rebuild_trigger(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!is_rebuild_trigger(&EventKind::Access(
            notify::event::AccessKind::Any
        )));
    }

    #[test]
    fn test_only_content_writes_count() {
        assert!(is_write(&EventKind::Modify(ModifyKind::Data(DataChange::Any))));
        assert!(is_write(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_write(&EventKind::Create(CreateKind::File)));
        assert!(!is_write(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
    }

    // ============================================================================
    // Patterns
    // ============================================================================

    #[test]
    fn test_default_patterns() {
        let manifest = Config::empty();
        assert_eq!(patterns(&manifest).unwrap(), vec!["**/*.go", "*.go"]);
    }

    #[test]
    fn test_manifest_patterns() {
        let manifest = Config::from_json_str(r#"{ "livereload": ["web/*.html"] }"#).unwrap();
        assert_eq!(patterns(&manifest).unwrap(), vec!["web/*.html"]);

        let bad = Config::from_json_str(r#"{ "livereload": "web" }"#).unwrap();
        assert!(patterns(&bad).is_err());
    }

    #[test]
    fn test_expand_dedups_overlapping_patterns() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let root = dir.path().display().to_string();
        let patterns = vec![format!("{}/**/*.go", root), format!("{}/*.go", root)];

        assert_eq!(expand(&patterns), vec![dir.path().join("main.go")]);
        assert!(expand(&["[".to_string()]).is_empty());
    }

    // ============================================================================
    // Rebuild gate
    // ============================================================================

    #[test]
    fn test_gate_coalesces_writes() {
        let hub = ReloadHub::new();
        let mut subscription = hub.subscribe();
        let builds = Arc::new(AtomicUsize::new(0));

        let counter = builds.clone();
        let gate = RebuildGate::new(hub, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .with_delays(Duration::from_millis(10), Duration::from_millis(200));

        let first = gate.on_write().expect("first write starts a rebuild");
        thread::sleep(Duration::from_millis(50));
        assert!(gate.on_write().is_none());

        first.join().unwrap();
        assert!(!gate.in_flight.load(Ordering::SeqCst));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.try_recv().as_deref(), Some(RELOAD_TOKEN));
        assert_eq!(subscription.try_recv(), None);
    }

    #[test]
    fn test_failed_rebuild_does_not_broadcast() {
        let hub = ReloadHub::new();
        let mut subscription = hub.subscribe();
        let gate = RebuildGate::new(hub, || Err(anyhow::anyhow!("compile error")))
            .with_delays(Duration::ZERO, Duration::ZERO);

        gate.on_write().unwrap().join().unwrap();

        assert_eq!(subscription.try_recv(), None);
        assert!(gate.on_write().is_some());
    }
}
