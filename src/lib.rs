//! # Skript Symbol Index
//!
//! Core of the `sklsp` language server: a live index of function declarations
//! and call sites across every `.sk` file of a workspace.
//!
//! ## Modules
//! - `parser` - line scanner producing declarations and call sites per file
//! - `registry` - path -> script map with a debounced update queue
//! - `diagnostics` - duplicate declaration and unresolved call checks
//! - `session` - one registry per workspace root, safe to share across tasks
//! - `source` - reading files, open-buffer overlay, workspace discovery
//! - `paths` - path key normalization
//! - `builtins` - functions provided by the runtime
//! - `debounce` - fixed-deadline timer
//! - `types` - LSP position and range wrappers

pub mod builtins;
pub mod debounce;
pub mod diagnostics;
pub mod parser;
pub mod paths;
pub mod registry;
pub mod session;
pub mod source;
pub mod types;
