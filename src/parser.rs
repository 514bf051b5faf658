//! Declaration and call-site scanner
//!
//! This is not a grammar. Each line is matched against two patterns: a
//! `function name(param: type, ...)` header and a `name(args)` call shape.
//! That is enough to resolve function names across files. The scanner never
//! fails: lines that don't fit degrade to "no declaration" or "no parameters".

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::paths;
use crate::types::{utf16_column, Range};

/// Literal doc marker that restricts a function to its own script
pub const PRIVATE_MARKER: &str = "@private";

fn declaration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*function\s+(\w+)\s*(?:\(([^)]*)\))?").expect("declaration pattern")
    })
}

fn call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\w+)\(([^)]*)\)").expect("call pattern"))
}

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\w+)\s*:\s*(\w[\w ]*?)\s*$").expect("parameter pattern")
    })
}

/// Who a script is, independent of its contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptIdentity {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: String,
}

impl ScriptIdentity {
    pub fn new(path: &Path, root: &Path) -> Self {
        let path = paths::normalize(path);
        ScriptIdentity {
            name: paths::script_name(&path),
            relative_path: paths::relative_path(&path, root),
            path,
        }
    }
}

/// SHA-256 of the text a script was parsed from
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceDigest([u8; 32]);

impl SourceDigest {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        SourceDigest(hasher.finalize().into())
    }
}

impl fmt::Debug for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub declared_type: String,
}

impl fmt::Display for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.declared_type)
    }
}

/// A `function` header and the doc comment directly above it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub parameters: Vec<ParameterSpec>,
    pub doc_lines: Vec<String>,
    pub is_private: bool,
    /// Whole header line
    pub range: Range,
    pub line_text: String,
    /// Registry key of the owning script. Not a handle: re-fetch after a flush.
    pub script: PathBuf,
}

/// One `name(args)` occurrence outside comments and strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub callee: String,
    pub arguments: String,
    /// From the first character of the name through the closing parenthesis
    pub range: Range,
}

impl CallSite {
    /// UTF-16 column of the first argument character
    pub fn arguments_column(&self) -> u32 {
        self.range.start().character() + self.callee.encode_utf16().count() as u32 + 1
    }
}

/// Parsed representation of one source file
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: String,
    pub declarations: Vec<FunctionDeclaration>,
    pub call_sites: Vec<CallSite>,
    pub digest: SourceDigest,
}

/// Parse a script. Never fails; unrecognized lines are simply skipped.
pub fn parse(identity: ScriptIdentity, source: &str) -> Script {
    let lines = split_lines(source);
    let declarations = parse_declarations(&identity.path, &lines);
    let call_sites = parse_call_sites(&lines);
    Script {
        name: identity.name,
        path: identity.path,
        relative_path: identity.relative_path,
        declarations,
        call_sites,
        digest: SourceDigest::of(source),
    }
}

fn split_lines(source: &str) -> Vec<&str> {
    source
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

fn parse_declarations(script: &Path, lines: &[&str]) -> Vec<FunctionDeclaration> {
    let mut declarations = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        let Some(caps) = declaration_pattern().captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let parameters = caps
            .get(2)
            .map(|group| parse_parameters(group.as_str()))
            .unwrap_or_default();
        let doc_lines = doc_comment_above(lines, index);
        let is_private = doc_lines.iter().any(|line| line.trim() == PRIVATE_MARKER);

        declarations.push(FunctionDeclaration {
            name,
            parameters,
            is_private,
            doc_lines,
            range: Range::on_line(index as u32, 0, utf16_column(line, line.len())),
            line_text: line.to_string(),
            script: script.to_path_buf(),
        });
    }
    declarations
}

/// `a: number, b: text` -> two parameters. Any malformed entry empties the list.
fn parse_parameters(group: &str) -> Vec<ParameterSpec> {
    if group.trim().is_empty() {
        return Vec::new();
    }
    let mut parameters = Vec::new();
    for entry in group.split(',') {
        let Some(caps) = parameter_pattern().captures(entry) else {
            return Vec::new();
        };
        parameters.push(ParameterSpec {
            name: caps[1].to_string(),
            declared_type: caps[2].to_string(),
        });
    }
    parameters
}

/// Comment lines directly above `line_index`, top to bottom
///
/// Blank lines between the header and the comment block are skipped; once a
/// comment has been collected, a blank line ends the block. A bare `#` is
/// neither collected nor a terminator.
fn doc_comment_above(lines: &[&str], line_index: usize) -> Vec<String> {
    let mut collected = Vec::new();
    for line in lines[..line_index].iter().rev() {
        let trimmed = line.trim();
        if let Some(text) = trimmed.strip_prefix('#') {
            let text = text.trim();
            if !text.is_empty() {
                collected.push(text.to_string());
            }
        } else if trimmed.is_empty() && collected.is_empty() {
            continue;
        } else {
            break;
        }
    }
    collected.reverse();
    collected
}

fn parse_call_sites(lines: &[&str]) -> Vec<CallSite> {
    let mut calls = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if is_comment_line(line) {
            continue;
        }
        // Each match restarts the search right after the callee name, so a
        // rejected match or an outer call never hides the calls inside it.
        let mut from = 0;
        while let Some(caps) = call_pattern().captures_at(line, from) {
            let (Some(name), Some(args), Some(whole)) = (caps.get(1), caps.get(2), caps.get(0))
            else {
                break;
            };
            from = name.end();
            if follows_function_keyword(&line[..name.start()]) {
                continue;
            }
            if is_in_string(line, name.start()) {
                continue;
            }
            calls.push(CallSite {
                callee: name.as_str().to_string(),
                arguments: args.as_str().to_string(),
                range: Range::on_line(
                    index as u32,
                    utf16_column(line, name.start()),
                    utf16_column(line, whole.end()),
                ),
            });
        }
    }
    calls
}

pub fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `prefix` ends with the `function` keyword followed by whitespace
pub fn follows_function_keyword(prefix: &str) -> bool {
    let trimmed = prefix.trim_end();
    if trimmed.len() == prefix.len() {
        return false;
    }
    match trimmed.strip_suffix("function") {
        Some(before) => !before.chars().next_back().is_some_and(is_word_char),
        None => false,
    }
}

/// Whether byte offset `offset` of `line` falls inside a double-quoted string
///
/// A backslash escapes the next character only, so `\\"` closes a string and
/// `\"` does not.
pub fn is_in_string(line: &str, offset: usize) -> bool {
    let mut inside = false;
    let mut escaped = false;
    for &byte in &line.as_bytes()[..offset.min(line.len())] {
        if byte == b'"' && !escaped {
            inside = !inside;
        }
        escaped = byte == b'\\' && !escaped;
    }
    inside
}

/// Identifier touching byte offset `offset`, with its byte span
pub fn word_at(line: &str, offset: usize) -> Option<(&str, std::ops::Range<usize>)> {
    let offset = offset.min(line.len());
    if !line.is_char_boundary(offset) {
        return None;
    }
    let start = line[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);
    let end = line[offset..]
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map(|(i, _)| offset + i)
        .unwrap_or(line.len());
    (start < end).then(|| (&line[start..end], start..end))
}
