//! Symbol registry: one parsed [`Script`] per path, plus the update queue
//!
//! Changes are not parsed when they arrive. [`Registry::enqueue`] records the
//! path and arms the debounce timer; when the timer is due, [`Registry::flush`]
//! re-reads and re-parses every queued path in one pass. Scripts are never
//! edited in place, a flush swaps in a freshly parsed `Script`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::debounce::Debouncer;
use crate::parser::{self, FunctionDeclaration, Script, ScriptIdentity, SourceDigest};
use crate::paths;
use crate::source::SourceProvider;

/// Outcome of [`Registry::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// First change of a burst; a flush is due at this instant
    Armed(Instant),
    /// Added to the burst already waiting on the timer
    Merged,
    /// Disabled or not a script file
    Skipped,
}

/// What a flush did, per path
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub parsed: Vec<PathBuf>,
    /// Text unchanged since the last parse; existing script kept
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Entries dropped because another path differs from them only by case
    pub collapsed: Vec<PathBuf>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
            && self.unchanged.is_empty()
            && self.removed.is_empty()
            && self.collapsed.is_empty()
    }
}

/// Pending paths in arrival order, deduplicated, plus the flush timer
#[derive(Debug, Default)]
struct UpdateQueue {
    pending: Vec<PathBuf>,
    members: HashSet<PathBuf>,
    timer: Debouncer,
}

impl UpdateQueue {
    fn insert(&mut self, path: PathBuf) {
        if self.members.insert(path.clone()) {
            self.pending.push(path);
        }
    }

    fn remove(&mut self, path: &Path) {
        if self.members.remove(path) {
            self.pending.retain(|p| p != path);
        }
    }

    fn drain(&mut self) -> Vec<PathBuf> {
        self.members.clear();
        std::mem::take(&mut self.pending)
    }
}

#[derive(Debug)]
struct Entry {
    script: Arc<Script>,
    /// Insertion counter, bumped on every install
    stamp: u64,
}

#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    entries: HashMap<PathBuf, Entry>,
    /// Population order; a replaced script keeps its slot
    order: Vec<PathBuf>,
    queue: UpdateQueue,
    next_stamp: u64,
}

impl Registry {
    pub fn new(root: impl AsRef<Path>, quiet_period: Duration) -> Self {
        Registry {
            root: paths::normalize(root),
            entries: HashMap::new(),
            order: Vec::new(),
            queue: UpdateQueue {
                timer: Debouncer::new(quiet_period),
                ..Default::default()
            },
            next_stamp: 0,
        }
    }

    pub fn set_quiet_period(&mut self, quiet_period: Duration) {
        self.queue.timer.set_quiet_period(quiet_period);
    }

    // ------------------------------------------------------------------
    // Update queue
    // ------------------------------------------------------------------

    /// Queue `path` for the next flush and arm the timer if idle
    pub fn enqueue(&mut self, path: impl AsRef<Path>, now: Instant) -> Enqueued {
        let path = paths::normalize(path);
        if !paths::is_script(&path) || paths::is_disabled(&path) {
            return Enqueued::Skipped;
        }
        self.queue.insert(path);
        match self.queue.timer.arm(now) {
            Some(deadline) => Enqueued::Armed(deadline),
            None => Enqueued::Merged,
        }
    }

    pub fn pending(&self) -> &[PathBuf] {
        &self.queue.pending
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.queue.timer.is_armed()
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.queue.timer.deadline()
    }

    /// Flush if the timer has expired, otherwise do nothing
    pub fn flush_if_due(
        &mut self,
        now: Instant,
        source: &dyn SourceProvider,
    ) -> Option<FlushReport> {
        if !self.queue.timer.is_due(now) {
            return None;
        }
        Some(self.flush(source))
    }

    /// Re-parse every queued path and clear the queue
    ///
    /// A path whose text cannot be read is dropped from the registry; that never
    /// stops the other paths from being processed.
    pub fn flush(&mut self, source: &dyn SourceProvider) -> FlushReport {
        self.queue.timer.disarm();
        let mut report = FlushReport::default();

        for path in self.queue.drain() {
            match source.read_source(&path) {
                Ok(text) => {
                    let digest = SourceDigest::of(&text);
                    if self
                        .entries
                        .get(&path)
                        .is_some_and(|entry| entry.script.digest == digest)
                    {
                        report.unchanged.push(path);
                        continue;
                    }
                    let script = parser::parse(ScriptIdentity::new(&path, &self.root), &text);
                    self.install(path.clone(), Arc::new(script));
                    report.parsed.push(path);
                }
                Err(err) => {
                    tracing::warn!("dropping script from index: {err}");
                    if self.remove_entry(&path).is_some() {
                        report.removed.push(path);
                    }
                }
            }
        }

        report.collapsed = self.collapse_case_duplicates();
        tracing::debug!(
            parsed = report.parsed.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            collapsed = report.collapsed.len(),
            scripts = self.order.len(),
            "registry flushed"
        );
        report
    }

    /// Forget a path right away (file deleted). Also drops it from the queue.
    pub fn remove_path(&mut self, path: impl AsRef<Path>) -> Option<Arc<Script>> {
        let path = paths::normalize(path);
        self.queue.remove(&path);
        self.remove_entry(&path)
    }

    fn install(&mut self, path: PathBuf, script: Arc<Script>) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        if self.entries.insert(path.clone(), Entry { script, stamp }).is_none() {
            self.order.push(path);
        }
    }

    fn remove_entry(&mut self, path: &Path) -> Option<Arc<Script>> {
        let entry = self.entries.remove(path)?;
        self.order.retain(|p| p != path);
        Some(entry.script)
    }

    /// Keep only the most recently installed entry among paths that are equal
    /// ignoring case
    fn collapse_case_duplicates(&mut self) -> Vec<PathBuf> {
        let mut newest: HashMap<String, (u64, &Path)> = HashMap::new();
        for path in &self.order {
            let stamp = self.entries[path].stamp;
            let slot = newest
                .entry(paths::case_fold_key(path))
                .or_insert((stamp, path.as_path()));
            if stamp > slot.0 {
                *slot = (stamp, path.as_path());
            }
        }
        let stale: Vec<PathBuf> = self
            .order
            .iter()
            .filter(|path| newest[&paths::case_fold_key(path)].1 != path.as_path())
            .cloned()
            .collect();
        for path in &stale {
            self.remove_entry(path);
        }
        stale
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// First declaration named `name`, in population order then source order
    pub fn get_function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.scripts()
            .flat_map(|script| script.declarations.iter())
            .find(|decl| decl.name == name)
    }

    pub fn get_script(&self, path: impl AsRef<Path>) -> Option<&Arc<Script>> {
        self.entries
            .get(&paths::normalize(path))
            .map(|entry| &entry.script)
    }

    /// All scripts in population order
    pub fn scripts(&self) -> impl Iterator<Item = &Arc<Script>> + '_ {
        self.order.iter().map(move |path| &self.entries[path].script)
    }

    /// Declarations callable from the script at `from`: every public function,
    /// plus private ones declared in `from` itself
    pub fn visible_functions<'a>(
        &'a self,
        from: &'a Path,
    ) -> impl Iterator<Item = (&'a Arc<Script>, &'a FunctionDeclaration)> + 'a {
        self.scripts().flat_map(move |script| {
            script
                .declarations
                .iter()
                .filter(move |decl| !decl.is_private || decl.script == from)
                .map(move |decl| (script, decl))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(&paths::normalize(path))
    }
}
