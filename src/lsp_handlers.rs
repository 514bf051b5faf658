//! LSP handlers for go-to-definition, signature help and the registry dump

use serde_json::{json, Value};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use sklsp::parser::{self, Script};
use sklsp::paths;
use sklsp::registry::Registry;
use sklsp::types::{byte_offset, Position as IndexPosition, Range as IndexRange};

use crate::Backend;

/// Jump to the declaration of the function under the cursor
pub async fn handle_goto_definition(
    backend: &Backend,
    params: GotoDefinitionParams,
) -> Result<Option<GotoDefinitionResponse>> {
    let uri = &params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;
    let Some((session, path)) = backend.locate(uri) else {
        return Ok(None);
    };
    let Some(line) = session.line_text(&path, position.line as usize) else {
        return Ok(None);
    };
    let Some((word, _)) = parser::word_at(&line, byte_offset(&line, position.character)) else {
        return Ok(None);
    };

    let state = session.read();
    let Some(decl) = state.registry.get_function(word) else {
        return Ok(None);
    };
    let Some(target) = paths::path_to_url(&decl.script) else {
        return Ok(None);
    };
    Ok(Some(GotoDefinitionResponse::Scalar(Location::new(
        target,
        decl.range.into(),
    ))))
}

/// Show the parameter the cursor is on inside a call's parentheses
pub async fn handle_signature_help(
    backend: &Backend,
    params: SignatureHelpParams,
) -> Result<Option<SignatureHelp>> {
    let _timer =
        crate::performance::TimingGuard::new(&backend.perf_tracker, "lsp.server.signature_help");

    let uri = &params.text_document_position_params.text_document.uri;
    let Some((session, path)) = backend.locate(uri) else {
        return Ok(None);
    };
    let state = session.read();
    let Some(script) = state.registry.get_script(&path) else {
        return Ok(None);
    };
    Ok(signature_at(
        &state.registry,
        script,
        params.text_document_position_params.position.into(),
    ))
}

pub fn signature_at(
    registry: &Registry,
    script: &Script,
    position: IndexPosition,
) -> Option<SignatureHelp> {
    let call = script
        .call_sites
        .iter()
        .find(|call| call.range.strictly_contains(position))?;
    let decl = registry.get_function(&call.callee)?;

    let into_arguments = position.character().checked_sub(call.arguments_column())?;
    let typed = &call.arguments[..byte_offset(&call.arguments, into_arguments)];
    let index = typed.matches(',').count();
    let parameter = decl.parameters.get(index)?;

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label: parameter.to_string(),
            documentation: None,
            parameters: None,
            active_parameter: None,
        }],
        active_signature: Some(0),
        active_parameter: Some(0),
    })
}

/// Every script of a registry as JSON, without back-references from
/// functions to their script
pub fn dump_registry(registry: &Registry) -> Vec<Value> {
    registry.scripts().map(|script| dump_script(script)).collect()
}

fn dump_script(script: &Script) -> Value {
    let functions: Vec<Value> = script
        .declarations
        .iter()
        .map(|decl| {
            json!({
                "name": decl.name,
                "params": decl.parameters.iter().map(|p| json!({
                    "name": p.name,
                    "type": p.declared_type,
                })).collect::<Vec<_>>(),
                "documentation": decl.doc_lines,
                "isPrivate": decl.is_private,
                "declarationRange": range_json(decl.range),
                "declarationLineText": decl.line_text,
            })
        })
        .collect();
    let uses: Vec<Value> = script
        .call_sites
        .iter()
        .map(|call| {
            json!({
                "name": call.callee,
                "params": call.arguments,
                "range": range_json(call.range),
            })
        })
        .collect();

    json!({
        "name": script.name,
        "path": script.path.to_string_lossy(),
        "relativePath": script.relative_path,
        "digest": format!("{:?}", script.digest),
        "meta": {
            "functions": functions,
            "functionUses": uses,
        },
    })
}

fn range_json(range: IndexRange) -> Value {
    json!({
        "start": { "line": range.start().line(), "character": range.start().character() },
        "end": { "line": range.end().line(), "character": range.end().character() },
    })
}
