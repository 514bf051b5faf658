//! LSP Hover and Inlay Hints Module
//!
//! - Hover: the declaration line and doc comment of the function under the cursor
//! - Inlay hints: parameter names in front of each argument of a resolved call

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    Hover, HoverContents, HoverParams, InlayHint, InlayHintKind, InlayHintLabel, InlayHintParams,
    MarkupContent, MarkupKind,
};

use sklsp::parser::{self, FunctionDeclaration, Script};
use sklsp::registry::Registry;
use sklsp::types::{byte_offset, utf16_column, Position, Range};

use crate::Backend;

/// Declaration line as a skript code block, then the doc comment
pub fn function_markdown(decl: &FunctionDeclaration) -> String {
    let mut markdown = format!("```skript\n{}\n```", decl.line_text.trim_end());
    if !decl.doc_lines.is_empty() {
        markdown.push('\n');
        markdown.push_str(&decl.doc_lines.join("\n"));
    }
    markdown
}

pub async fn handle_hover(backend: &Backend, params: HoverParams) -> Result<Option<Hover>> {
    let _timer = crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.hover");

    let uri = &params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;
    let Some((session, path)) = backend.locate(uri) else {
        return Ok(None);
    };
    let Some(line) = session.line_text(&path, position.line as usize) else {
        return Ok(None);
    };
    let Some((word, span)) = parser::word_at(&line, byte_offset(&line, position.character)) else {
        return Ok(None);
    };

    let state = session.read();
    let Some(decl) = state.registry.get_function(word) else {
        return Ok(None);
    };
    Ok(Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: function_markdown(decl),
        }),
        range: Some(
            Range::on_line(
                position.line,
                utf16_column(&line, span.start),
                utf16_column(&line, span.end),
            )
            .into(),
        ),
    }))
}

pub async fn handle_inlay_hint(
    backend: &Backend,
    params: InlayHintParams,
) -> Result<Option<Vec<InlayHint>>> {
    if !backend.config.read().await.inlay_hints {
        return Ok(None);
    }
    let _timer =
        crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.inlay_hint");

    let Some((session, path)) = backend.locate(&params.text_document.uri) else {
        return Ok(None);
    };
    let state = session.read();
    let Some(script) = state.registry.get_script(&path) else {
        return Ok(None);
    };
    Ok(Some(parameter_hints(&state.registry, script, params.range.into())))
}

/// `name: ` hints for every call inside `range` whose callee is declared
///
/// Empty arguments get no hint and do not use up a parameter.
pub fn parameter_hints(registry: &Registry, script: &Script, range: Range) -> Vec<InlayHint> {
    let mut hints = Vec::new();
    for call in &script.call_sites {
        if !range.encloses(&call.range) {
            continue;
        }
        let Some(decl) = registry.get_function(&call.callee) else {
            continue;
        };

        let line = call.range.start().line();
        let base = call.arguments_column();
        let mut parameters = decl.parameters.iter();
        let mut offset = 0;
        for argument in call.arguments.split(',') {
            let start = offset + (argument.len() - argument.trim_start().len());
            offset += argument.len() + 1;
            if argument.trim().is_empty() {
                continue;
            }
            let Some(parameter) = parameters.next() else {
                break;
            };
            hints.push(InlayHint {
                position: Position::new(line, base + utf16_column(&call.arguments, start)).into(),
                label: InlayHintLabel::String(format!("{}: ", parameter.name)),
                kind: Some(InlayHintKind::PARAMETER),
                text_edits: None,
                tooltip: None,
                padding_left: None,
                padding_right: None,
                data: None,
            });
        }
    }
    hints
}
