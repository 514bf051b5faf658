//! # Completion Handler Module
//!
//! Offers every function callable from the current script. Private functions
//! only show up inside the script that declares them. Nothing is offered
//! inside a string literal or right after the `function` keyword, where the
//! user is naming a new function.

use std::path::Path;

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use sklsp::parser::{self, FunctionDeclaration, Script};
use sklsp::registry::Registry;
use sklsp::types::byte_offset;

use crate::lsp_hover::function_markdown;
use crate::performance;

pub async fn handle_completion(
    backend: &crate::Backend,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>> {
    let _timer = performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.completion");

    let uri = &params.text_document_position.text_document.uri;
    let position = params.text_document_position.position;
    let Some((session, path)) = backend.locate(uri) else {
        return Ok(None);
    };
    let Some(line) = session.line_text(&path, position.line as usize) else {
        return Ok(None);
    };

    let items = function_completions(&session.read().registry, &path, &line, position.character);
    backend
        .perf_tracker
        .increment("lsp.server.completion.items", items.len() as u64);
    Ok(Some(CompletionResponse::Array(items)))
}

/// Completion items for the cursor at UTF-16 `column` of `line` in `from`
pub fn function_completions(
    registry: &Registry,
    from: &Path,
    line: &str,
    column: u32,
) -> Vec<CompletionItem> {
    let offset = byte_offset(line, column);
    if parser::is_in_string(line, offset) {
        return Vec::new();
    }
    let typed_start = parser::word_at(line, offset)
        .map(|(_, span)| span.start)
        .unwrap_or(offset);
    if parser::follows_function_keyword(&line[..typed_start]) {
        return Vec::new();
    }

    registry
        .visible_functions(from)
        .map(|(script, decl)| completion_item(script, decl))
        .collect()
}

fn completion_item(script: &Script, decl: &FunctionDeclaration) -> CompletionItem {
    CompletionItem {
        label: format!("{}()", decl.name),
        kind: Some(CompletionItemKind::FUNCTION),
        detail: Some(format!("in {}", script_display(script))),
        documentation: Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: function_markdown(decl),
        })),
        ..Default::default()
    }
}

/// `util.sk`, or `util.sk (lib/util.sk)` when the script is not at the root
fn script_display(script: &Script) -> String {
    let file_name = format!("{}.{}", script.name, sklsp::paths::SCRIPT_EXTENSION);
    if file_name == script.relative_path {
        file_name
    } else {
        format!("{} ({})", file_name, script.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sklsp::debounce::DEFAULT_QUIET_PERIOD;
    use sklsp::parser::ScriptIdentity;
    use sklsp::source::{SourceError, SourceProvider};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tokio::time::Instant;

    struct Files(HashMap<PathBuf, &'static str>);

    impl SourceProvider for Files {
        fn read_source(&self, path: &Path) -> std::result::Result<String, SourceError> {
            self.0
                .get(path)
                .map(|text| text.to_string())
                .ok_or_else(|| SourceError::Decode {
                    path: path.to_path_buf(),
                })
        }
    }

    fn registry(files: &[(&str, &'static str)]) -> Registry {
        let mut registry = Registry::new("/ws", DEFAULT_QUIET_PERIOD);
        for (path, _) in files {
            registry.enqueue(path, Instant::now());
        }
        let source = Files(files.iter().map(|(p, t)| (PathBuf::from(p), *t)).collect());
        registry.flush(&source);
        registry
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    #[test]
    fn offers_public_functions_and_own_private_ones() {
        let reg = registry(&[
            ("/ws/main.sk", "# @private\nfunction local():\non load:\n\tgr"),
            (
                "/ws/lib/greet.sk",
                "# Says hi\nfunction greet(who: player):\n# @private\nfunction hidden():",
            ),
        ]);
        let items = function_completions(&reg, Path::new("/ws/main.sk"), "\tgr", 3);
        assert_eq!(labels(&items), vec!["local()", "greet()"]);

        let greet = &items[1];
        assert_eq!(greet.detail.as_deref(), Some("in greet.sk (lib/greet.sk)"));
        let Some(Documentation::MarkupContent(doc)) = &greet.documentation else {
            panic!("expected markdown documentation");
        };
        assert!(doc.value.contains("function greet(who: player):"));
        assert!(doc.value.ends_with("Says hi"));

        assert_eq!(items[0].detail.as_deref(), Some("in main.sk"));
    }

    #[test]
    fn nothing_after_the_function_keyword() {
        let reg = registry(&[("/ws/a.sk", "function a():")]);
        let from = Path::new("/ws/a.sk");
        assert!(function_completions(&reg, from, "function ", 9).is_empty());
        assert!(function_completions(&reg, from, "function gre", 12).is_empty());
        assert_eq!(function_completions(&reg, from, "\tfunctional", 11).len(), 1);
    }

    #[test]
    fn nothing_inside_strings() {
        let reg = registry(&[("/ws/a.sk", "function a():")]);
        let from = Path::new("/ws/a.sk");
        assert!(function_completions(&reg, from, "\tsend \"hel", 10).is_empty());
        assert_eq!(function_completions(&reg, from, "\tsend \"x\" to ", 13).len(), 1);
    }

    #[test]
    fn script_display_at_root() {
        let script = parser::parse(
            ScriptIdentity::new(Path::new("/ws/util.sk"), Path::new("/ws")),
            "",
        );
        assert_eq!(script_display(&script), "util.sk");
    }
}
