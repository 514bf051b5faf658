//! Publishing findings to the client
//!
//! The index computes [`Finding`]s per path; this module turns them into
//! `textDocument/publishDiagnostics` notifications.

use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location,
};

use sklsp::diagnostics::{DiagnosticsUpdate, Finding};
use sklsp::paths;

use crate::Backend;

/// `source` field of every published diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "sklsp";

pub fn to_diagnostic(finding: &Finding) -> Diagnostic {
    let related: Vec<DiagnosticRelatedInformation> = finding
        .related
        .iter()
        .filter_map(|related| {
            Some(DiagnosticRelatedInformation {
                location: Location::new(paths::path_to_url(&related.path)?, related.range.into()),
                message: related.message.clone(),
            })
        })
        .collect();

    Diagnostic {
        range: finding.range.into(),
        severity: Some(finding.severity),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: finding.message.clone(),
        related_information: (!related.is_empty()).then_some(related),
        ..Default::default()
    }
}

/// One line of `--diagnose` output
pub fn format_finding(finding: &Finding) -> String {
    let severity = match finding.severity {
        DiagnosticSeverity::ERROR => "ERROR",
        DiagnosticSeverity::WARNING => "WARN",
        DiagnosticSeverity::INFORMATION => "INFO",
        DiagnosticSeverity::HINT => "HINT",
        _ => "UNKNOWN",
    };
    let start = finding.range.start();
    format!(
        "{}:{}:{} - {}",
        severity,
        start.line(),
        start.character(),
        finding.message
    )
}

async fn publish(backend: &Backend, path: &Path, diagnostics: Vec<Diagnostic>) {
    let Some(url) = paths::path_to_url(path) else {
        tracing::debug!(path = %path.display(), "cannot publish diagnostics for non-file path");
        return;
    };
    backend
        .client
        .publish_diagnostics(url, diagnostics, None)
        .await;
}

/// Send the result of a refresh, unless publishing is switched off
pub async fn publish_update(backend: &Backend, update: DiagnosticsUpdate) {
    if !backend.config.read().await.diagnostics_enabled {
        return;
    }
    let _timer =
        crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.diagnostics.publish");
    for (path, findings) in &update.publish {
        publish(backend, path, findings.iter().map(to_diagnostic).collect()).await;
    }
    for path in &update.clear {
        publish(backend, path, Vec::new()).await;
    }
}

/// Publish the cached findings of every session
pub async fn republish_all(backend: &Backend) {
    for session in backend.sessions() {
        // the read guard must not live across the publishes below
        let batch: Vec<(PathBuf, Vec<Diagnostic>)> = {
            let state = session.read();
            state
                .registry
                .scripts()
                .map(|script| {
                    let findings = state.diagnostics.findings(&script.path);
                    (script.path.clone(), findings.iter().map(to_diagnostic).collect())
                })
                .collect()
        };
        for (path, diagnostics) in batch {
            publish(backend, &path, diagnostics).await;
        }
    }
}

/// Publish empty lists for the given paths
pub async fn clear(backend: &Backend, cleared: &[PathBuf]) {
    for path in cleared {
        publish(backend, path, Vec::new()).await;
    }
}

/// Clear every published diagnostic, e.g. when publishing is disabled
pub async fn clear_all(backend: &Backend) {
    for session in backend.sessions() {
        let cleared = session.read().registry.scripts().map(|s| s.path.clone()).collect::<Vec<_>>();
        clear(backend, &cleared).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sklsp::diagnostics::{RelatedLocation, ALSO_DEFINED_HERE};
    use sklsp::types::Range;

    fn duplicate() -> Finding {
        Finding {
            severity: DiagnosticSeverity::ERROR,
            message: "Function 'f' is already defined".to_string(),
            range: Range::on_line(3, 0, 14),
            related: vec![RelatedLocation {
                path: PathBuf::from("/ws/other.sk"),
                range: Range::on_line(0, 0, 14),
                message: ALSO_DEFINED_HERE.to_string(),
            }],
        }
    }

    #[test]
    fn converts_related_locations_to_urls() {
        let diagnostic = to_diagnostic(&duplicate());
        assert_eq!(diagnostic.source.as_deref(), Some(DIAGNOSTIC_SOURCE));
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostic.range.start.line, 3);

        let related = diagnostic.related_information.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].message, ALSO_DEFINED_HERE);
        assert_eq!(related[0].location.uri.path(), "/ws/other.sk");
    }

    #[test]
    fn findings_without_related_omit_the_field() {
        let mut finding = duplicate();
        finding.related.clear();
        assert!(to_diagnostic(&finding).related_information.is_none());
    }

    #[test]
    fn cli_line_format() {
        assert_eq!(
            format_finding(&duplicate()),
            "ERROR:3:0 - Function 'f' is already defined"
        );
    }
}
