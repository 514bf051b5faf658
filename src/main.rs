//! # Skript Language Server (sklsp)
//!
//! Language Server Protocol front end for the `sklsp` symbol index. Every
//! workspace folder gets its own indexing session; edits, saves and file
//! watcher events are queued and re-indexed in debounced batches.
//!
//! ## Features
//! - Duplicate-function and unknown-function diagnostics across the workspace
//! - Completion of functions declared anywhere in the workspace (`@private` aware)
//! - Hover documentation taken from the comment block above a declaration
//! - Go-to-definition, signature help and parameter-name inlay hints

use std::borrow::Cow;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
};
use tower_lsp::{async_trait, jsonrpc::Result, lsp_types::*, Client};
use tower_lsp::{LanguageServer, LspService, Server};
use tracing_subscriber::EnvFilter;

use sklsp::paths;
use sklsp::registry::Enqueued;
use sklsp::session::{FlushOutcome, Session};

/// Command-line interface handling
mod cli;

/// Server settings
mod document;

/// Performance benchmarking and tracking
mod performance;

/// LSP completion handler
mod lsp_completion;

/// Finding conversion and publishing
mod lsp_diagnostics;

/// LSP hover and inlay hints handler
mod lsp_hover;

/// LSP handlers for goto definition, signature help and the registry dump
mod lsp_handlers;

use document::Configuration;

/// Environment variable holding the log filter
const LOG_ENV: &str = "SKLSP_LOG";

/// Glob registered with the client's file watcher
const SCRIPT_GLOB: &str = "**/*.sk";

const DEFAULT_PORT: u16 = 9257;

const CMD_SET_DIAGNOSTICS: &str = "sklsp.setDiagnostics";
const CMD_DUMP_REGISTRY: &str = "sklsp.dumpRegistry";
const CMD_ENABLE_BENCHMARKING: &str = "sklsp.server.enableBenchmarking";
const CMD_BENCHMARK_REPORT: &str = "sklsp.server.getBenchmarkReport";

#[derive(Clone)]
struct Backend {
    client: Client,
    /// Workspace root -> session
    sessions: Arc<DashMap<PathBuf, Arc<Session>>>,
    config: Arc<RwLock<Configuration>>,
    perf_tracker: Arc<performance::PerformanceTracker>,
}

#[async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(options) = params.initialization_options.as_ref() {
            self.config.write().await.apply(options);
        }

        let mut roots: Vec<PathBuf> = params
            .workspace_folders
            .iter()
            .flatten()
            .filter_map(|folder| paths::url_to_path(&folder.uri))
            .collect();
        if roots.is_empty() {
            #[allow(deprecated)]
            let root_uri = params.root_uri.as_ref();
            roots.extend(root_uri.and_then(paths::url_to_path));
        }
        for root in roots {
            self.add_session(root).await;
        }

        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "sklsp {} initialized with {} workspace folder(s)",
                    env!("CARGO_PKG_VERSION"),
                    self.sessions.len()
                ),
            )
            .await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        CMD_SET_DIAGNOSTICS.to_string(),
                        CMD_DUMP_REGISTRY.to_string(),
                        CMD_ENABLE_BENCHMARKING.to_string(),
                        CMD_BENCHMARK_REPORT.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                inlay_hint_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string()]),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "sklsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let registration = Registration {
            id: "sklsp-script-watcher".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: Some(serde_json::json!({
                "watchers": [{ "globPattern": SCRIPT_GLOB }]
            })),
        };
        if let Err(err) = self.client.register_capability(vec![registration]).await {
            self.client
                .log_message(
                    MessageType::WARNING,
                    format!("Failed to register file watcher: {err}"),
                )
                .await;
        }

        for session in self.sessions() {
            self.start_session(session);
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        match params.command.as_str() {
            CMD_SET_DIAGNOSTICS => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.config.write().await.diagnostics_enabled = enabled;
                    if enabled {
                        lsp_diagnostics::republish_all(self).await;
                    } else {
                        lsp_diagnostics::clear_all(self).await;
                    }
                }
            }
            CMD_DUMP_REGISTRY => {
                let scripts: Vec<Value> = self
                    .sessions()
                    .iter()
                    .flat_map(|session| lsp_handlers::dump_registry(&session.read().registry))
                    .collect();
                return Ok(Some(Value::Array(scripts)));
            }
            CMD_ENABLE_BENCHMARKING => {
                let enabled = params
                    .arguments
                    .first()
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                self.perf_tracker.set_enabled(enabled);
                self.client
                    .log_message(
                        MessageType::INFO,
                        format!("Benchmarking {}", if enabled { "enabled" } else { "disabled" }),
                    )
                    .await;
            }
            CMD_BENCHMARK_REPORT => {
                return Ok(Some(Value::String(self.perf_tracker.generate_report())));
            }
            other => {
                tracing::warn!(command = other, "unknown command");
            }
        }
        Ok(None)
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.buffer_changed(&document.uri, document.text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.buffer_changed(&params.text_document.uri, change.text)
                .await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        if let Some((session, path)) = self.locate(&params.text_document.uri) {
            let enqueued = session.enqueue(&path);
            self.schedule(session, enqueued);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Some((session, path)) = self.locate(&params.text_document.uri) {
            let enqueued = session.close_buffer(&path);
            self.schedule(session, enqueued);
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in params.changes {
            let Some((session, path)) = self.locate(&change.uri) else {
                continue;
            };
            if change.typ == FileChangeType::DELETED {
                let update = session.remove_path(&path);
                lsp_diagnostics::publish_update(self, update).await;
            } else {
                let enqueued = session.enqueue(&path);
                self.schedule(session, enqueued);
            }
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        for folder in params.event.removed {
            if let Some(root) = paths::url_to_path(&folder.uri) {
                self.remove_session(&root).await;
            }
        }
        for folder in params.event.added {
            if let Some(root) = paths::url_to_path(&folder.uri) {
                let session = self.add_session(root).await;
                self.start_session(session);
            }
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let (before, after) = {
            let mut config = self.config.write().await;
            let before = config.clone();
            config.apply(&params.settings);
            (before, config.clone())
        };
        if before == after {
            return;
        }
        self.client
            .log_message(MessageType::INFO, format!("Configuration changed: {after:?}"))
            .await;

        if before.update_delay != after.update_delay {
            for session in self.sessions() {
                session.set_quiet_period(after.update_delay);
            }
        }
        if before.diagnostics_enabled != after.diagnostics_enabled {
            if after.diagnostics_enabled {
                lsp_diagnostics::republish_all(self).await;
            } else {
                lsp_diagnostics::clear_all(self).await;
            }
        }
        if before.inlay_hints != after.inlay_hints {
            self.refresh_inlay_hints().await;
        }
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        lsp_hover::handle_inlay_hint(self, params).await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        lsp_completion::handle_completion(self, params).await
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        lsp_handlers::handle_signature_help(self, params).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        lsp_handlers::handle_goto_definition(self, params).await
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        lsp_hover::handle_hover(self, params).await
    }
}

impl Backend {
    fn new(client: Client) -> Self {
        Backend {
            client,
            sessions: Arc::new(DashMap::new()),
            config: Arc::new(RwLock::new(Configuration::default())),
            perf_tracker: Arc::new(performance::PerformanceTracker::new()),
        }
    }

    fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// The session with the deepest root containing `path`
    fn session_for(&self, path: &Path) -> Option<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().owns(path))
            .max_by_key(|entry| entry.key().components().count())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Session and normalized path for a document URI
    fn locate(&self, uri: &Url) -> Option<(Arc<Session>, PathBuf)> {
        let path = paths::url_to_path(uri)?;
        let session = self.session_for(&path)?;
        Some((session, path))
    }

    async fn add_session(&self, root: PathBuf) -> Arc<Session> {
        let root = paths::normalize(root);
        if let Some(existing) = self.sessions.get(&root) {
            return Arc::clone(existing.value());
        }
        let quiet_period = self.config.read().await.update_delay;
        let session = Arc::new(Session::new(&root, quiet_period));
        self.sessions.insert(root.clone(), Arc::clone(&session));
        tracing::info!(root = %root.display(), "workspace folder added");
        session
    }

    async fn remove_session(&self, root: &Path) {
        let Some((_, session)) = self.sessions.remove(&paths::normalize(root)) else {
            return;
        };
        let cleared = session.clear_diagnostics();
        lsp_diagnostics::clear(self, &cleared).await;
        tracing::info!(root = %root.display(), "workspace folder removed");
    }

    /// Queue every script under the session's root
    fn start_session(&self, session: Arc<Session>) {
        if let Some(deadline) = session.start() {
            self.schedule(session, Enqueued::Armed(deadline));
        }
    }

    async fn buffer_changed(&self, uri: &Url, text: String) {
        if let Some((session, path)) = self.locate(uri) {
            let enqueued = session.update_buffer(&path, text);
            self.schedule(session, enqueued);
        }
    }

    /// Spawn the flush timer when `enqueued` armed it. Merged changes ride on
    /// the timer that is already running.
    fn schedule(&self, session: Arc<Session>, enqueued: Enqueued) {
        let Enqueued::Armed(deadline) = enqueued else {
            return;
        };
        let backend = self.clone();
        tokio::spawn(async move {
            let Some(outcome) = session.flush_at(deadline).await else {
                return;
            };
            // the folder may have been closed while the timer slept
            if backend.sessions.contains_key(session.root()) {
                backend.flushed(outcome).await;
            }
        });
    }

    async fn flushed(&self, outcome: FlushOutcome) {
        let FlushOutcome { report, update } = outcome;
        self.perf_tracker.increment("index.flush", 1);
        self.perf_tracker
            .increment("index.parsed", report.parsed.len() as u64);
        self.perf_tracker
            .increment("index.unchanged", report.unchanged.len() as u64);
        let reparsed = !report.parsed.is_empty() || !report.removed.is_empty();

        lsp_diagnostics::publish_update(self, update).await;
        if reparsed && self.config.read().await.inlay_hints {
            self.refresh_inlay_hints().await;
        }
    }

    async fn refresh_inlay_hints(&self) {
        if let Err(err) = self
            .client
            .send_request::<request::InlayHintRefreshRequest>(())
            .await
        {
            tracing::debug!("inlay hint refresh rejected: {err}");
        }
    }
}

/// Index each directory once and print its findings
fn run_diagnose(roots: &[PathBuf]) {
    for root in roots {
        if !root.is_dir() {
            eprintln!("{} is not a directory", root.display());
            continue;
        }
        let session = Session::new(root, Duration::ZERO);
        session.start();
        let outcome = session.flush_now();

        println!(
            "Diagnostics for {} ({} scripts):",
            root.display(),
            outcome.report.parsed.len()
        );
        let state = session.read();
        let mut any = false;
        for script in state.registry.scripts() {
            let findings = state.diagnostics.findings(&script.path);
            if findings.is_empty() {
                continue;
            }
            any = true;
            println!("  {}", script.relative_path);
            for finding in findings {
                println!("    {}", lsp_diagnostics::format_finding(finding));
            }
        }
        if !any {
            println!("  (no diagnostics)");
        }
        println!();
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() {
    use clap::Parser as _;
    let cli = cli::Cli::parse();
    init_logging();

    if !cli.diagnose.is_empty() {
        run_diagnose(&cli.diagnose);
        return;
    }

    let (service, socket) = LspService::new(Backend::new);

    if !cli.listen && cli.host.is_none() {
        // stdin/stdout
        Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
            .serve(service)
            .await;
    } else if cli.listen {
        let host = cli
            .host
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed("127.0.0.1"))
            .parse::<Ipv4Addr>()
            .expect("Could not parse IP address");
        let port = cli.port.unwrap_or(DEFAULT_PORT);

        let stream = {
            let listener = TcpListener::bind((host, port))
                .await
                .expect("Could not bind TCP listener");
            let (stream, _) = listener.accept().await.expect("Could not accept client");
            stream
        };

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    } else {
        let host = cli.host.expect("No host given");
        let port = cli.port.expect("No port given");

        let stream = TcpStream::connect((host, port))
            .await
            .expect("Could not open TCP stream");

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    }
}
