//! One indexing session per workspace root
//!
//! A `Session` bundles the registry, the findings cache and the open-buffer
//! overlay for a single root. There is no global instance; the server keeps
//! one handle per workspace folder and drops it with the folder.
//!
//! The registry and the findings cache sit behind one lock. A flush holds the
//! write side from the first re-parse until diagnostics are recomputed, so a
//! reader sees either the state before the flush or the state after it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::time::Instant;

use crate::diagnostics::{DiagnosticsEngine, DiagnosticsUpdate};
use crate::paths;
use crate::registry::{Enqueued, FlushReport, Registry};
use crate::source::{self, OpenBuffers};

#[derive(Debug)]
pub struct SessionState {
    pub registry: Registry,
    pub diagnostics: DiagnosticsEngine,
}

/// Result of a flush: what changed in the registry and what to publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub report: FlushReport,
    pub update: DiagnosticsUpdate,
}

#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    state: RwLock<SessionState>,
    buffers: OpenBuffers,
}

impl Session {
    pub fn new(root: impl AsRef<Path>, quiet_period: Duration) -> Self {
        let root = paths::normalize(root);
        Session {
            state: RwLock::new(SessionState {
                registry: Registry::new(&root, quiet_period),
                diagnostics: DiagnosticsEngine::new(),
            }),
            buffers: OpenBuffers::new(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` is a script file under this session's root
    pub fn owns(&self, path: &Path) -> bool {
        paths::is_within(path, &self.root) && paths::is_script(path)
    }

    /// Queue every script in the workspace. Returns the flush deadline if this
    /// armed the timer.
    pub fn start(&self) -> Option<Instant> {
        let scripts = source::discover_scripts(&self.root);
        tracing::debug!(root = %self.root.display(), scripts = scripts.len(), "session started");
        let mut deadline = None;
        for path in scripts {
            if let Enqueued::Armed(at) = self.enqueue(path) {
                deadline = Some(at);
            }
        }
        deadline
    }

    pub fn enqueue(&self, path: impl AsRef<Path>) -> Enqueued {
        self.state.write().registry.enqueue(path, Instant::now())
    }

    /// Record the editor's text for `path` and queue it
    pub fn update_buffer(&self, path: impl AsRef<Path>, text: String) -> Enqueued {
        let path = paths::normalize(path);
        self.buffers.set(path.clone(), text);
        self.enqueue(path)
    }

    /// The editor closed `path`; the file on disk is authoritative again
    pub fn close_buffer(&self, path: impl AsRef<Path>) -> Enqueued {
        let path = paths::normalize(path);
        self.buffers.remove(&path);
        self.enqueue(path)
    }

    /// Current text of one line, preferring the open buffer
    pub fn line_text(&self, path: &Path, line: usize) -> Option<String> {
        self.buffers.line(&paths::normalize(path), line)
    }

    /// The file was deleted: drop it now and recompute diagnostics
    pub fn remove_path(&self, path: impl AsRef<Path>) -> DiagnosticsUpdate {
        let path = paths::normalize(path);
        self.buffers.remove(&path);
        let mut state = self.state.write();
        let SessionState {
            registry,
            diagnostics,
        } = &mut *state;
        if registry.remove_path(&path).is_some() {
            tracing::debug!(path = %path.display(), "script removed");
        }
        diagnostics.refresh(registry)
    }

    /// Flush if the debounce deadline has passed
    pub fn flush_if_due(&self, now: Instant) -> Option<FlushOutcome> {
        let mut state = self.state.write();
        let SessionState {
            registry,
            diagnostics,
        } = &mut *state;
        let report = registry.flush_if_due(now, &self.buffers)?;
        let update = diagnostics.refresh(registry);
        Some(FlushOutcome { report, update })
    }

    /// Flush whatever is queued, ignoring the timer
    pub fn flush_now(&self) -> FlushOutcome {
        let mut state = self.state.write();
        let SessionState {
            registry,
            diagnostics,
        } = &mut *state;
        let report = registry.flush(&self.buffers);
        let update = diagnostics.refresh(registry);
        FlushOutcome { report, update }
    }

    /// Sleep until `deadline`, then flush. This is the body of the one timer
    /// task spawned per burst of changes.
    pub async fn flush_at(&self, deadline: Instant) -> Option<FlushOutcome> {
        tokio::time::sleep_until(deadline).await;
        self.flush_if_due(Instant::now())
    }

    pub fn set_quiet_period(&self, quiet_period: Duration) {
        self.state.write().registry.set_quiet_period(quiet_period);
    }

    /// Read access for lookups. Do not hold across an `.await`.
    pub fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read()
    }

    /// Drop all cached findings (session teardown or diagnostics disabled)
    pub fn clear_diagnostics(&self) -> Vec<PathBuf> {
        self.state.write().diagnostics.clear_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::DEFAULT_QUIET_PERIOD;
    use std::fs;
    use std::sync::Arc;

    fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        dir
    }

    type Timer = tokio::task::JoinHandle<Option<FlushOutcome>>;

    fn spawn_timer(session: &Arc<Session>, enqueued: Enqueued) -> Option<Timer> {
        match enqueued {
            Enqueued::Armed(deadline) => {
                let session = Arc::clone(session);
                Some(tokio::spawn(async move { session.flush_at(deadline).await }))
            }
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_changes_is_flushed_once() {
        let dir = workspace(&[
            ("a.sk", "function a():"),
            ("b.sk", "function b():\n\ta()"),
            ("c.sk", "\tmissing()"),
        ]);
        let session = Arc::new(Session::new(dir.path(), DEFAULT_QUIET_PERIOD));

        let mut timers = Vec::new();
        for name in ["a.sk", "b.sk", "a.sk", "c.sk", "b.sk"] {
            if let Some(timer) = spawn_timer(&session, session.enqueue(dir.path().join(name))) {
                timers.push(timer);
            }
            tokio::time::advance(Duration::from_millis(60)).await;
        }
        assert_eq!(timers.len(), 1);
        assert_eq!(session.read().registry.pending().len(), 3);
        assert!(session.read().registry.is_empty());

        let outcome = timers.pop().unwrap().await.unwrap().unwrap();
        assert_eq!(outcome.report.parsed.len(), 3);
        assert_eq!(outcome.update.publish.len(), 3);

        let state = session.read();
        assert_eq!(state.registry.len(), 3);
        assert!(!state.registry.is_flush_scheduled());
        let c = paths::normalize(dir.path().join("c.sk"));
        assert_eq!(state.diagnostics.findings(&c).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_stale_timer_does_not_flush_early() {
        let dir = workspace(&[("a.sk", "function a():")]);
        let session = Session::new(dir.path(), DEFAULT_QUIET_PERIOD);
        let Enqueued::Armed(deadline) = session.enqueue(dir.path().join("a.sk")) else {
            panic!("first enqueue should arm the timer");
        };
        assert!(session.flush_if_due(deadline - Duration::from_millis(1)).is_none());
        assert!(session.flush_if_due(deadline).is_some());
        // nothing armed any more
        assert!(session.flush_if_due(deadline + Duration::from_secs(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_indexes_the_whole_workspace() {
        let dir = workspace(&[
            ("main.sk", "on load:\n\tgreet()"),
            ("lib/greet.sk", "# Says hi\nfunction greet():"),
            ("-disabled.sk", "function greet():"),
        ]);
        let session = Session::new(dir.path(), DEFAULT_QUIET_PERIOD);
        let deadline = session.start().unwrap();
        let outcome = session.flush_at(deadline).await.unwrap();
        assert_eq!(outcome.report.parsed.len(), 2);

        let state = session.read();
        let greet = state.registry.get_function("greet").unwrap();
        assert_eq!(greet.doc_lines, vec!["Says hi"]);
        assert_eq!(state.diagnostics.total(), 0);
    }

    #[test]
    fn unsaved_buffer_text_is_indexed() {
        let dir = workspace(&[("a.sk", "function old():")]);
        let session = Session::new(dir.path(), DEFAULT_QUIET_PERIOD);
        let path = dir.path().join("a.sk");
        session.update_buffer(&path, "function fresh():".to_string());
        session.flush_now();
        assert!(session.read().registry.get_function("fresh").is_some());
        assert!(session.read().registry.get_function("old").is_none());

        session.close_buffer(&path);
        session.flush_now();
        assert!(session.read().registry.get_function("old").is_some());
    }

    #[test]
    fn deleting_a_file_clears_its_script_and_findings() {
        let dir = workspace(&[("a.sk", "function f():\n\tnope()"), ("b.sk", "function f():")]);
        let session = Session::new(dir.path(), DEFAULT_QUIET_PERIOD);
        session.enqueue(dir.path().join("a.sk"));
        session.enqueue(dir.path().join("b.sk"));
        session.flush_now();
        let a = paths::normalize(dir.path().join("a.sk"));
        assert_eq!(session.read().diagnostics.findings(&a).len(), 2);

        fs::remove_file(dir.path().join("a.sk")).unwrap();
        let update = session.remove_path(dir.path().join("a.sk"));
        assert_eq!(update.clear, vec![a.clone()]);
        let state = session.read();
        assert!(state.registry.get_script(&a).is_none());
        assert!(state.diagnostics.findings(&a).is_empty());
        // b no longer has a duplicate
        assert_eq!(state.diagnostics.total(), 0);
    }

    #[test]
    fn ownership_requires_root_and_extension() {
        let session = Session::new("/ws", DEFAULT_QUIET_PERIOD);
        assert!(session.owns(Path::new("/ws/sub/a.sk")));
        assert!(!session.owns(Path::new("/other/a.sk")));
        assert!(!session.owns(Path::new("/ws/a.txt")));
    }
}
