//! Workspace-wide diagnostics
//!
//! Two checks, both run over the whole registry after every flush:
//! - a function name declared more than once anywhere in the workspace
//! - a call to a name that is neither declared nor a runtime builtin
//!
//! [`DiagnosticsEngine`] remembers what was last reported per path so that a
//! refresh can tell the host which paths to republish and which to clear.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::DiagnosticSeverity;

use crate::builtins;
use crate::parser::FunctionDeclaration;
use crate::registry::Registry;
use crate::types::Range;

pub const ALSO_DEFINED_HERE: &str = "Also defined here";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedLocation {
    pub path: PathBuf,
    pub range: Range,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub range: Range,
    pub related: Vec<RelatedLocation>,
}

/// Findings for every script in the registry, in population order. Scripts
/// without problems get an empty list.
pub fn compute_diagnostics(registry: &Registry) -> Vec<(PathBuf, Vec<Finding>)> {
    let mut per_path: HashMap<&Path, Vec<Finding>> = registry
        .scripts()
        .map(|script| (script.path.as_path(), Vec::new()))
        .collect();

    check_duplicate_declarations(registry, &mut per_path);
    check_unresolved_calls(registry, &mut per_path);

    registry
        .scripts()
        .map(|script| {
            let mut findings = per_path.remove(script.path.as_path()).unwrap_or_default();
            findings.sort_by_key(|finding| finding.range.start());
            (script.path.clone(), findings)
        })
        .collect()
}

fn check_duplicate_declarations<'a>(
    registry: &'a Registry,
    per_path: &mut HashMap<&'a Path, Vec<Finding>>,
) {
    let mut groups: Vec<Vec<&FunctionDeclaration>> = Vec::new();
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for decl in registry.scripts().flat_map(|s| s.declarations.iter()) {
        let slot = *by_name.entry(decl.name.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(decl);
    }

    for group in groups.iter().filter(|group| group.len() > 1) {
        for (index, decl) in group.iter().enumerate() {
            let related = group
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(_, other)| RelatedLocation {
                    path: other.script.clone(),
                    range: other.range,
                    message: ALSO_DEFINED_HERE.to_string(),
                })
                .collect();
            if let Some(findings) = per_path.get_mut(decl.script.as_path()) {
                findings.push(Finding {
                    severity: DiagnosticSeverity::ERROR,
                    message: format!("Function '{}' is already defined", decl.name),
                    range: decl.range,
                    related,
                });
            }
        }
    }
}

fn check_unresolved_calls<'a>(
    registry: &'a Registry,
    per_path: &mut HashMap<&'a Path, Vec<Finding>>,
) {
    for script in registry.scripts() {
        let Some(findings) = per_path.get_mut(script.path.as_path()) else {
            continue;
        };
        for call in &script.call_sites {
            if builtins::is_builtin(&call.callee) || registry.get_function(&call.callee).is_some() {
                continue;
            }
            findings.push(Finding {
                severity: DiagnosticSeverity::ERROR,
                message: format!("Function '{}' does not exist", call.callee),
                range: call.range,
                related: Vec::new(),
            });
        }
    }
}

/// What the host should publish after a refresh
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiagnosticsUpdate {
    /// Replacement finding lists, one per registered script
    pub publish: Vec<(PathBuf, Vec<Finding>)>,
    /// Paths that left the registry; their findings must be cleared
    pub clear: Vec<PathBuf>,
}

/// Per-file findings cache
#[derive(Debug, Default)]
pub struct DiagnosticsEngine {
    findings: HashMap<PathBuf, Vec<Finding>>,
}

impl DiagnosticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute findings for the whole registry, replacing the previous set
    pub fn refresh(&mut self, registry: &Registry) -> DiagnosticsUpdate {
        let publish = compute_diagnostics(registry);

        let mut clear: Vec<PathBuf> = self
            .findings
            .keys()
            .filter(|path| !registry.contains(path))
            .cloned()
            .collect();
        clear.sort();

        self.findings = publish.iter().cloned().collect();
        DiagnosticsUpdate { publish, clear }
    }

    pub fn findings(&self, path: &Path) -> &[Finding] {
        self.findings.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    /// Forget everything, returning the paths that had been reported
    pub fn clear_all(&mut self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.findings.drain().map(|(path, _)| path).collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::DEFAULT_QUIET_PERIOD;
    use crate::source::MemorySource;
    use tokio::time::Instant;

    fn flush(registry: &mut Registry, source: &MemorySource, paths: &[&str]) {
        for path in paths {
            registry.enqueue(path, Instant::now());
        }
        registry.flush(source);
    }

    fn messages(engine: &DiagnosticsEngine, path: &str) -> Vec<String> {
        engine
            .findings(Path::new(path))
            .iter()
            .map(|f| f.message.clone())
            .collect()
    }

    #[test]
    fn duplicates_are_reported_in_every_declaring_script() {
        let mut source = MemorySource::default()
            .with("/ws/a.sk", "function f():\n\tstop")
            .with("/ws/b.sk", "\n\nfunction f():");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/a.sk", "/ws/b.sk"]);
        let update = engine.refresh(&registry);
        assert_eq!(update.publish.len(), 2);
        assert!(update.clear.is_empty());

        let a = engine.findings(Path::new("/ws/a.sk"));
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].message, "Function 'f' is already defined");
        assert_eq!(a[0].severity, DiagnosticSeverity::ERROR);
        assert_eq!(a[0].range, Range::on_line(0, 0, 13));
        assert_eq!(
            a[0].related,
            vec![RelatedLocation {
                path: PathBuf::from("/ws/b.sk"),
                range: Range::on_line(2, 0, 13),
                message: ALSO_DEFINED_HERE.to_string(),
            }]
        );

        let b = engine.findings(Path::new("/ws/b.sk"));
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].related[0].path, PathBuf::from("/ws/a.sk"));

        // deleting b clears the finding in a as well as b's own findings
        source.delete("/ws/b.sk");
        flush(&mut registry, &source, &["/ws/b.sk"]);
        let update = engine.refresh(&registry);
        assert_eq!(update.clear, vec![PathBuf::from("/ws/b.sk")]);
        assert!(engine.findings(Path::new("/ws/a.sk")).is_empty());
        assert!(engine.findings(Path::new("/ws/b.sk")).is_empty());
    }

    #[test]
    fn three_way_duplicate_links_to_both_others() {
        let source = MemorySource::default()
            .with("/ws/a.sk", "function f():\nfunction f():")
            .with("/ws/b.sk", "function f():");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        flush(&mut registry, &source, &["/ws/a.sk", "/ws/b.sk"]);
        let findings = compute_diagnostics(&registry);

        let (path, a) = &findings[0];
        assert_eq!(path, &PathBuf::from("/ws/a.sk"));
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].related.len(), 2);
        assert_eq!(a[0].related[0].range.start().line(), 1);
        assert_eq!(a[0].related[1].path, PathBuf::from("/ws/b.sk"));
        assert_eq!(findings[1].1.len(), 1);
    }

    #[test]
    fn unresolved_call_until_declared() {
        let mut source = MemorySource::default().with("/ws/main.sk", "on load:\n\tbar(1,2)");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/main.sk"]);
        engine.refresh(&registry);

        let main = engine.findings(Path::new("/ws/main.sk"));
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].message, "Function 'bar' does not exist");
        assert_eq!(main[0].range, Range::on_line(1, 1, 9));
        assert!(main[0].related.is_empty());

        source.set("/ws/lib.sk", "function bar(x: number):");
        flush(&mut registry, &source, &["/ws/lib.sk"]);
        engine.refresh(&registry);
        assert!(engine.findings(Path::new("/ws/main.sk")).is_empty());
        assert_eq!(engine.total(), 0);
    }

    #[test]
    fn undeclared_nested_callee_is_reported() {
        let source = MemorySource::default()
            .with("/ws/a.sk", "function outer(x: number):\non load:\n\touter(inner(1))");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/a.sk"]);
        engine.refresh(&registry);
        assert_eq!(messages(&engine, "/ws/a.sk"), vec!["Function 'inner' does not exist"]);
    }

    #[test]
    fn builtins_and_private_functions_resolve() {
        let source = MemorySource::default()
            .with("/ws/a.sk", "on load:\n\tset {_x} to sqrt(4) + max(1, 2)\n\thelper()")
            .with("/ws/b.sk", "# @private\nfunction helper():");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/a.sk", "/ws/b.sk"]);
        engine.refresh(&registry);
        assert_eq!(engine.total(), 0);
    }

    #[test]
    fn findings_are_ordered_by_position() {
        let source = MemorySource::default()
            .with("/ws/a.sk", "on load:\n\tnope()\nfunction f():\n\tmissing()")
            .with("/ws/b.sk", "function f():");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/a.sk", "/ws/b.sk"]);
        engine.refresh(&registry);
        assert_eq!(
            messages(&engine, "/ws/a.sk"),
            vec![
                "Function 'nope' does not exist",
                "Function 'f' is already defined",
                "Function 'missing' does not exist",
            ]
        );
    }

    #[test]
    fn refresh_replaces_rather_than_appends() {
        let source = MemorySource::default().with("/ws/a.sk", "\tnope()");
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        let mut engine = DiagnosticsEngine::new();
        flush(&mut registry, &source, &["/ws/a.sk"]);
        engine.refresh(&registry);
        engine.refresh(&registry);
        assert_eq!(engine.findings(Path::new("/ws/a.sk")).len(), 1);
        assert_eq!(engine.clear_all(), vec![PathBuf::from("/ws/a.sk")]);
        assert_eq!(engine.total(), 0);
    }
}
