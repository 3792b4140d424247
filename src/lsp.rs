//! LSP transport: the `tower-lsp-server` `Backend` that exposes the
//! analysis core over stdio.
//!
//! The analysis core is `Rc`-based end to end and so cannot live inside
//! `tokio`'s worker pool. It instead runs on one dedicated OS thread — an
//! actor with a mailbox — reached from the async `LanguageServer` methods
//! below via an `mpsc` channel carrying only `Send` payloads (plain
//! `String`s, `u32` positions, and the DTOs in this module). Every reply
//! crossing back out is built from owned data inside the worker, so no
//! `Rc` ever touches a channel.
//!
//! Diagnostics use a debounce-then-version-guard shape: the worker
//! thread's single-threaded, FIFO message processing already gives a
//! newer edit priority over a stale one, so there's no need to separately
//! snapshot content and version after the sleep — the worker re-reads its
//! own overlay when the debounced request arrives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::*;
use tower_lsp_server::{Client, LanguageServer, LspService, Server};

use crate::ast;
use crate::diagnostic::Severity;
use crate::discover::{self, Config};
use crate::linter;
use crate::overlay::{DeltaEdit, DocUri, EditSpan, Overlay};
use crate::resolver::{ImportResolver, Resolver, SymbolKind};
use crate::session::Session;

/// The position encoding negotiated with the client during `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Utf16,
}

fn char_to_byte(line: &str, character: u32, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Utf8 => (character as usize).min(line.len()),
        Encoding::Utf16 => {
            let mut units = 0u32;
            for (byte_idx, ch) in line.char_indices() {
                if units >= character {
                    return byte_idx;
                }
                units += ch.len_utf16() as u32;
            }
            line.len()
        }
    }
}

fn byte_to_char(line: &str, byte_col: usize, encoding: Encoding) -> u32 {
    let safe = byte_col.min(line.len());
    match encoding {
        Encoding::Utf8 => safe as u32,
        Encoding::Utf16 => line[..safe].encode_utf16().count() as u32,
    }
}

fn lsp_pos_to_ast(text: &str, line: u32, character: u32, encoding: Encoding) -> ast::Pos {
    let line_str = text.lines().nth(line as usize).unwrap_or("");
    let byte_col = char_to_byte(line_str, character, encoding);
    ast::Pos::new(line + 1, byte_col as u32 + 1)
}

fn ast_pos_to_lsp(text: &str, pos: ast::Pos, encoding: Encoding) -> (u32, u32) {
    let line_idx = pos.line.saturating_sub(1);
    let line_str = text.lines().nth(line_idx as usize).unwrap_or("");
    let byte_col = (pos.col.saturating_sub(1)) as usize;
    (line_idx, byte_to_char(line_str, byte_col, encoding))
}

fn ast_range_to_wire(text: &str, range: &ast::Range, encoding: Encoding) -> WireRange {
    let (start_line, start_char) = ast_pos_to_lsp(text, range.begin, encoding);
    let (end_line, end_char) = ast_pos_to_lsp(text, range.end, encoding);
    WireRange {
        start_line,
        start_char,
        end_line,
        end_char,
    }
}

fn uri_to_filename(uri: &Uri) -> Option<String> {
    uri.to_file_path().map(|p| p.into_owned().to_string_lossy().into_owned())
}

fn filename_to_uri(filename: &str) -> Option<Uri> {
    format!("file://{filename}").parse().ok()
}

// --- Wire DTOs: Send, Rc-free, crossing the worker/async boundary ---

#[derive(Debug, Clone, Copy)]
struct WireRange {
    start_line: u32,
    start_char: u32,
    end_line: u32,
    end_char: u32,
}

struct DiagDto {
    code: String,
    severity: Severity,
    message: String,
    range: WireRange,
}

struct CompletionDto {
    label: String,
    detail: Option<String>,
    insert_text: String,
    is_snippet: bool,
}

struct HoverDto {
    markdown: String,
    range: Option<WireRange>,
}

struct SignatureDto {
    label: String,
    params: Vec<String>,
    active_param: Option<u32>,
}

struct LocationDto {
    uri: String,
    range: WireRange,
}

struct SymbolDto {
    name: String,
    kind: SymbolKind,
    range: WireRange,
    children: Vec<SymbolDto>,
}

struct WireEdit {
    start_line: u32,
    start_char: u32,
    end_line: u32,
    end_char: u32,
    text: String,
}

enum Msg {
    Replace { uri: String, version: i32, text: String },
    Update { uri: String, version: i32, edits: Vec<WireEdit>, encoding: Encoding },
    Close { uri: String },
    ConfigChanged,
    Diagnostics { uri: String, version: i32, encoding: Encoding, reply: oneshot::Sender<Option<Vec<DiagDto>>> },
    Completion {
        uri: String,
        line: u32,
        character: u32,
        encoding: Encoding,
        preceding_char: Option<char>,
        reply: oneshot::Sender<Vec<CompletionDto>>,
    },
    Hover {
        uri: String,
        line: u32,
        character: u32,
        encoding: Encoding,
        reply: oneshot::Sender<Option<HoverDto>>,
    },
    SignatureHelp {
        uri: String,
        line: u32,
        character: u32,
        encoding: Encoding,
        reply: oneshot::Sender<Option<SignatureDto>>,
    },
    Definition {
        uri: String,
        line: u32,
        character: u32,
        encoding: Encoding,
        reply: oneshot::Sender<Vec<LocationDto>>,
    },
    DocumentSymbol {
        uri: String,
        encoding: Encoding,
        reply: oneshot::Sender<Vec<SymbolDto>>,
    },
}

/// One active session plus the import search paths it was built with
/// (discovered from `jsonnet-ls.json`), cached per open document.
struct SessionEntry {
    session: Rc<Session>,
    search_paths: Vec<PathBuf>,
}

fn get_or_create_session<'a>(
    uri: &str,
    sessions: &'a mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> &'a SessionEntry {
    if !sessions.contains_key(uri) {
        let path = Path::new(uri);
        let config_path = discover::find_config_file(path);
        let (config, project_root) = match &config_path {
            Some(cp) => {
                let cfg = configs
                    .entry(cp.clone())
                    .or_insert_with(|| Rc::new(Config::load(cp).unwrap_or_else(|_| Config::default_config())))
                    .clone();
                (cfg, cp.parent().unwrap_or_else(|| Path::new(".")).to_path_buf())
            }
            None => (
                Rc::new(Config::default_config()),
                path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
            ),
        };
        let search_paths = config.resolved_search_paths(&project_root);
        let session = Rc::new(Session::with_filesystem_defaults(search_paths.clone()));
        session.set_active_uri(uri);
        sessions.insert(uri.to_string(), SessionEntry { session, search_paths });
    }
    sessions.get(uri).expect("just inserted")
}

fn resolver_for(
    uri: &str,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Option<(crate::overlay::ParsedEntry, Resolver, Vec<PathBuf>)> {
    let parsed = overlay.read_parsed(&DocUri::new(uri))?;
    let entry = get_or_create_session(uri, sessions, configs);
    entry.session.set_active_uri(uri);
    let resolver = Resolver::new(
        parsed.ast.clone(),
        Rc::from(uri),
        parsed.comments.clone(),
        entry.session.clone() as Rc<dyn ImportResolver>,
    );
    let search_paths = entry.search_paths.clone();
    Some((parsed, resolver, search_paths))
}

fn compute_diagnostics(
    uri: &str,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
    encoding: Encoding,
) -> Vec<DiagDto> {
    let Some(entry) = overlay.read_entry(&DocUri::new(uri)) else {
        return Vec::new();
    };
    let text = entry.current.text.clone();
    let mut diags = Vec::new();

    if let Some(parse_error) = &entry.last_error {
        diags.push(DiagDto {
            code: "ParseError".to_string(),
            severity: Severity::Error,
            message: parse_error.message.clone(),
            range: ast_range_to_wire(&text, &parse_error.range, encoding),
        });
    }

    if let Some(parsed) = &entry.parsed {
        let session_entry = get_or_create_session(uri, sessions, configs);
        session_entry.session.set_active_uri(uri);
        let resolver = Resolver::new(
            parsed.ast.clone(),
            Rc::from(uri),
            parsed.comments.clone(),
            session_entry.session.clone() as Rc<dyn ImportResolver>,
        );
        let mut lint_diags = linter::lint(&parsed.ast, &resolver);
        lint_diags.extend(session_entry.session.evaluate(uri, &text));
        crate::diagnostic::sort_diagnostics(&mut lint_diags);
        for d in lint_diags {
            diags.push(DiagDto {
                code: d.code.as_str().to_string(),
                severity: d.severity,
                message: d.message,
                range: ast_range_to_wire(&text, &d.range, encoding),
            });
        }
    }

    diags
}

fn handle_completion(
    uri: &str,
    line: u32,
    character: u32,
    encoding: Encoding,
    preceding_char: Option<char>,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Vec<CompletionDto> {
    let Some((parsed, resolver, search_paths)) = resolver_for(uri, overlay, sessions, configs) else {
        return Vec::new();
    };
    let pos = lsp_pos_to_ast(&parsed.text, line, character, encoding);
    resolver
        .completion(pos, preceding_char, &search_paths)
        .into_iter()
        .map(|i| CompletionDto {
            label: i.label,
            detail: i.detail,
            insert_text: i.insert_text,
            is_snippet: i.is_snippet,
        })
        .collect()
}

fn handle_hover(
    uri: &str,
    line: u32,
    character: u32,
    encoding: Encoding,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Option<HoverDto> {
    let (parsed, resolver, _) = resolver_for(uri, overlay, sessions, configs)?;
    let pos = lsp_pos_to_ast(&parsed.text, line, character, encoding);
    let hover = resolver.hover(pos)?;
    Some(HoverDto {
        markdown: hover.markdown,
        range: hover.range.map(|r| ast_range_to_wire(&parsed.text, &r, encoding)),
    })
}

fn handle_signature_help(
    uri: &str,
    line: u32,
    character: u32,
    encoding: Encoding,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Option<SignatureDto> {
    let (parsed, resolver, _) = resolver_for(uri, overlay, sessions, configs)?;
    let pos = lsp_pos_to_ast(&parsed.text, line, character, encoding);
    let help = resolver.signature_help(pos, None)?;
    Some(SignatureDto {
        label: help.label,
        params: help.params.into_iter().map(|p| p.label).collect(),
        active_param: help.active_param.map(|i| i as u32),
    })
}

fn handle_definition(
    uri: &str,
    line: u32,
    character: u32,
    encoding: Encoding,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Vec<LocationDto> {
    let Some((parsed, resolver, _)) = resolver_for(uri, overlay, sessions, configs) else {
        return Vec::new();
    };
    let pos = lsp_pos_to_ast(&parsed.text, line, character, encoding);
    resolver
        .definition(pos)
        .into_iter()
        .map(|loc| {
            let filename = loc.filename.to_string();
            let text: Rc<str> = if filename == uri {
                parsed.text.clone()
            } else {
                overlay
                    .read_current(&DocUri::new(&filename))
                    .map(|v| v.text)
                    .unwrap_or_else(|| Rc::from(std::fs::read_to_string(&filename).unwrap_or_default()))
            };
            LocationDto {
                uri: filename,
                range: ast_range_to_wire(&text, &loc.range, encoding),
            }
        })
        .collect()
}

fn convert_symbol(sym: crate::resolver::DocumentSymbol, text: &str, encoding: Encoding) -> SymbolDto {
    SymbolDto {
        name: sym.name,
        kind: sym.kind,
        range: ast_range_to_wire(text, &sym.range, encoding),
        children: sym.children.into_iter().map(|c| convert_symbol(c, text, encoding)).collect(),
    }
}

fn handle_document_symbol(
    uri: &str,
    encoding: Encoding,
    overlay: &Overlay,
    sessions: &mut HashMap<String, SessionEntry>,
    configs: &mut HashMap<PathBuf, Rc<Config>>,
) -> Vec<SymbolDto> {
    let Some((parsed, resolver, _)) = resolver_for(uri, overlay, sessions, configs) else {
        return Vec::new();
    };
    resolver
        .document_symbols()
        .into_iter()
        .map(|s| convert_symbol(s, &parsed.text, encoding))
        .collect()
}

/// Spawn the analysis worker thread and return its mailbox.
fn spawn_worker() -> mpsc::UnboundedSender<Msg> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
    std::thread::Builder::new()
        .name("jsonnet-analysis".to_string())
        .spawn(move || {
            let overlay = Overlay::new();
            let mut sessions: HashMap<String, SessionEntry> = HashMap::new();
            let mut configs: HashMap<PathBuf, Rc<Config>> = HashMap::new();

            while let Some(msg) = rx.blocking_recv() {
                match msg {
                    Msg::Replace { uri, version, text } => {
                        overlay.replace(&DocUri::new(&uri), version, text, |_| {});
                    }
                    Msg::Update { uri, version, edits, encoding } => {
                        let doc_uri = DocUri::new(&uri);
                        let Some(current) = overlay.read_current(&doc_uri) else {
                            continue;
                        };
                        // All edits in one batch are resolved against the
                        // pre-batch snapshot rather than threaded through
                        // one another; this matches the common one-edit-
                        // per-keystroke case exactly and is a minor
                        // approximation for editors that batch several.
                        let delta_edits: Vec<DeltaEdit> = edits
                            .iter()
                            .map(|e| DeltaEdit {
                                span: EditSpan {
                                    start: lsp_pos_to_ast(&current.text, e.start_line, e.start_char, encoding),
                                    end: lsp_pos_to_ast(&current.text, e.end_line, e.end_char, encoding),
                                },
                                new_text: e.text.clone(),
                            })
                            .collect();
                        overlay.update(&doc_uri, version, delta_edits, |_| {});
                    }
                    Msg::Close { uri } => {
                        overlay.close(&DocUri::new(&uri), |_| {});
                        sessions.remove(&uri);
                    }
                    Msg::ConfigChanged => {
                        configs.clear();
                        sessions.clear();
                    }
                    Msg::Diagnostics { uri, version, encoding, reply } => {
                        let current = overlay.read_current(&DocUri::new(&uri));
                        let is_current = current.map(|c| c.version == version).unwrap_or(false);
                        let result = is_current
                            .then(|| compute_diagnostics(&uri, &overlay, &mut sessions, &mut configs, encoding));
                        let _ = reply.send(result);
                    }
                    Msg::Completion { uri, line, character, encoding, preceding_char, reply } => {
                        let items = handle_completion(
                            &uri, line, character, encoding, preceding_char, &overlay, &mut sessions, &mut configs,
                        );
                        let _ = reply.send(items);
                    }
                    Msg::Hover { uri, line, character, encoding, reply } => {
                        let hover = handle_hover(&uri, line, character, encoding, &overlay, &mut sessions, &mut configs);
                        let _ = reply.send(hover);
                    }
                    Msg::SignatureHelp { uri, line, character, encoding, reply } => {
                        let help =
                            handle_signature_help(&uri, line, character, encoding, &overlay, &mut sessions, &mut configs);
                        let _ = reply.send(help);
                    }
                    Msg::Definition { uri, line, character, encoding, reply } => {
                        let locations =
                            handle_definition(&uri, line, character, encoding, &overlay, &mut sessions, &mut configs);
                        let _ = reply.send(locations);
                    }
                    Msg::DocumentSymbol { uri, encoding, reply } => {
                        let symbols = handle_document_symbol(&uri, encoding, &overlay, &mut sessions, &mut configs);
                        let _ = reply.send(symbols);
                    }
                }
            }
        })
        .expect("failed to spawn analysis worker thread");
    tx
}

fn severity_to_lsp(s: Severity) -> DiagnosticSeverity {
    match s {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

fn wire_range_to_lsp(r: WireRange) -> Range {
    Range::new(
        Position::new(r.start_line, r.start_char),
        Position::new(r.end_line, r.end_char),
    )
}

/// LSP server backend. Thin async plumbing: every real query is handed off
/// to the analysis worker thread over `tx` and awaited through a oneshot.
pub struct Backend {
    client: Client,
    tx: mpsc::UnboundedSender<Msg>,
    open_docs: Arc<Mutex<HashMap<String, i32>>>,
    encoding: Arc<Mutex<Encoding>>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish()
    }
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            tx: spawn_worker(),
            open_docs: Arc::new(Mutex::new(HashMap::new())),
            encoding: Arc::new(Mutex::new(Encoding::Utf16)),
        }
    }

    fn encoding(&self) -> Encoding {
        *self.encoding.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Debounce 200ms, then ask the worker for current diagnostics; the
    /// worker replies `None` if `version` is no longer the overlay's
    /// current version (a newer edit arrived), so a stale request never
    /// needs a second post-validation check.
    fn schedule_diagnostics(&self, uri: String, version: i32) {
        let tx = self.tx.clone();
        let client = self.client.clone();
        let encoding = self.encoding();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx
                .send(Msg::Diagnostics { uri: uri.clone(), version, encoding, reply: reply_tx })
                .is_err()
            {
                return;
            }
            let Ok(Some(diags)) = reply_rx.await else {
                return;
            };
            let Some(lsp_uri) = filename_to_uri(&uri) else {
                return;
            };
            let lsp_diags: Vec<Diagnostic> = diags
                .into_iter()
                .map(|d| Diagnostic {
                    range: wire_range_to_lsp(d.range),
                    severity: Some(severity_to_lsp(d.severity)),
                    code: Some(NumberOrString::String(d.code)),
                    source: Some("jsonnet-ls".to_string()),
                    message: d.message,
                    ..Default::default()
                })
                .collect();
            client.publish_diagnostics(lsp_uri, lsp_diags, None).await;
        });
    }
}

impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let enc = params
            .capabilities
            .general
            .as_ref()
            .and_then(|g| g.position_encodings.as_ref())
            .and_then(|encs| encs.iter().find(|e| e.as_str() == PositionEncodingKind::UTF8.as_str()))
            .map(|_| Encoding::Utf8)
            .unwrap_or(Encoding::Utf16);

        *self.encoding.lock().unwrap_or_else(|e| e.into_inner()) = enc;

        let position_encoding = match enc {
            Encoding::Utf8 => PositionEncodingKind::UTF8,
            Encoding::Utf16 => PositionEncodingKind::UTF16,
        };

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "jsonnet-ls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                position_encoding: Some(position_encoding),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), "/".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: Default::default(),
                }),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let registration = Registration {
            id: "jsonnet-ls-config-watch".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: Some(
                serde_json::to_value(DidChangeWatchedFilesRegistrationOptions {
                    watchers: vec![FileSystemWatcher {
                        glob_pattern: GlobPattern::String("**/jsonnet-ls.json".to_string()),
                        kind: Some(WatchKind::Create | WatchKind::Change | WatchKind::Delete),
                    }],
                })
                .unwrap(),
            ),
        };

        if let Err(e) = self.client.register_capability(vec![registration]).await {
            self.client
                .log_message(
                    MessageType::WARNING,
                    format!("jsonnet-ls: failed to register file watcher ({e}); config changes won't trigger re-lint"),
                )
                .await;
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(filename) = uri_to_filename(&params.text_document.uri) else {
            return;
        };
        let version = params.text_document.version;
        self.open_docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(filename.clone(), version);
        let _ = self.tx.send(Msg::Replace {
            uri: filename.clone(),
            version,
            text: params.text_document.text,
        });
        self.schedule_diagnostics(filename, version);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(filename) = uri_to_filename(&params.text_document.uri) else {
            return;
        };
        let version = params.text_document.version;
        let encoding = self.encoding();

        let mut edits = Vec::new();
        let mut full_text = None;
        for change in params.content_changes {
            match change.range {
                Some(range) => edits.push(WireEdit {
                    start_line: range.start.line,
                    start_char: range.start.character,
                    end_line: range.end.line,
                    end_char: range.end.character,
                    text: change.text,
                }),
                None => full_text = Some(change.text),
            }
        }

        self.open_docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(filename.clone(), version);

        if let Some(text) = full_text {
            let _ = self.tx.send(Msg::Replace { uri: filename.clone(), version, text });
        } else if !edits.is_empty() {
            let _ = self.tx.send(Msg::Update { uri: filename.clone(), version, edits, encoding });
        } else {
            return;
        }

        self.schedule_diagnostics(filename, version);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(filename) = uri_to_filename(&uri) {
            self.open_docs.lock().unwrap_or_else(|e| e.into_inner()).remove(&filename);
            let _ = self.tx.send(Msg::Close { uri: filename });
        }
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let config_changed = params.changes.iter().any(|c| {
            uri_to_filename(&c.uri)
                .map(|p| p.ends_with("jsonnet-ls.json"))
                .unwrap_or(false)
        });
        if !config_changed {
            return;
        }

        let _ = self.tx.send(Msg::ConfigChanged);

        let open: Vec<(String, i32)> = self
            .open_docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (filename, version) in open {
            self.schedule_diagnostics(filename, version);
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let pos = params.text_document_position.position;
        let Some(filename) = uri_to_filename(&params.text_document_position.text_document.uri) else {
            return Ok(None);
        };
        let preceding_char = params
            .context
            .as_ref()
            .and_then(|c| c.trigger_character.as_ref())
            .and_then(|s| s.chars().next());

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send(Msg::Completion {
            uri: filename,
            line: pos.line,
            character: pos.character,
            encoding: self.encoding(),
            preceding_char,
            reply: reply_tx,
        });
        if sent.is_err() {
            return Ok(None);
        }
        let Ok(items) = reply_rx.await else { return Ok(None) };

        let completions: Vec<CompletionItem> = items
            .into_iter()
            .map(|i| CompletionItem {
                label: i.label,
                detail: i.detail,
                insert_text: Some(i.insert_text),
                insert_text_format: Some(if i.is_snippet {
                    InsertTextFormat::SNIPPET
                } else {
                    InsertTextFormat::PLAIN_TEXT
                }),
                ..Default::default()
            })
            .collect();
        Ok(Some(CompletionResponse::Array(completions)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let pos = params.text_document_position_params.position;
        let Some(filename) = uri_to_filename(&params.text_document_position_params.text_document.uri) else {
            return Ok(None);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send(Msg::Hover {
            uri: filename,
            line: pos.line,
            character: pos.character,
            encoding: self.encoding(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return Ok(None);
        }
        let Ok(Some(hover)) = reply_rx.await else { return Ok(None) };

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: hover.markdown,
            }),
            range: hover.range.map(wire_range_to_lsp),
        }))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let pos = params.text_document_position_params.position;
        let Some(filename) = uri_to_filename(&params.text_document_position_params.text_document.uri) else {
            return Ok(None);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send(Msg::SignatureHelp {
            uri: filename,
            line: pos.line,
            character: pos.character,
            encoding: self.encoding(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return Ok(None);
        }
        let Ok(Some(help)) = reply_rx.await else { return Ok(None) };

        Ok(Some(SignatureHelp {
            signatures: vec![SignatureInformation {
                label: help.label,
                documentation: None,
                parameters: Some(
                    help.params
                        .into_iter()
                        .map(|p| ParameterInformation {
                            label: ParameterLabel::Simple(p),
                            documentation: None,
                        })
                        .collect(),
                ),
                active_parameter: help.active_param,
            }],
            active_signature: Some(0),
            active_parameter: help.active_param,
        }))
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> Result<Option<GotoDefinitionResponse>> {
        let pos = params.text_document_position_params.position;
        let Some(filename) = uri_to_filename(&params.text_document_position_params.text_document.uri) else {
            return Ok(None);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send(Msg::Definition {
            uri: filename,
            line: pos.line,
            character: pos.character,
            encoding: self.encoding(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return Ok(None);
        }
        let Ok(locations) = reply_rx.await else { return Ok(None) };
        if locations.is_empty() {
            return Ok(None);
        }

        let lsp_locations: Vec<Location> = locations
            .into_iter()
            .filter_map(|l| filename_to_uri(&l.uri).map(|uri| Location::new(uri, wire_range_to_lsp(l.range))))
            .collect();
        Ok(Some(GotoDefinitionResponse::Array(lsp_locations)))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> Result<Option<DocumentSymbolResponse>> {
        let Some(filename) = uri_to_filename(&params.text_document.uri) else {
            return Ok(None);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send(Msg::DocumentSymbol {
            uri: filename,
            encoding: self.encoding(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return Ok(None);
        }
        let Ok(symbols) = reply_rx.await else { return Ok(None) };

        #[allow(deprecated)]
        fn convert(s: SymbolDto) -> DocumentSymbol {
            let kind = match s.kind {
                SymbolKind::Object => lsp_types_symbol_kind_object(),
                SymbolKind::Field => lsp_types_symbol_kind_field(),
                SymbolKind::Function => lsp_types_symbol_kind_function(),
                SymbolKind::Variable => lsp_types_symbol_kind_variable(),
            };
            DocumentSymbol {
                name: s.name,
                detail: None,
                kind,
                tags: None,
                deprecated: None,
                range: wire_range_to_lsp(s.range),
                selection_range: wire_range_to_lsp(s.range),
                children: Some(s.children.into_iter().map(convert).collect()),
            }
        }

        fn lsp_types_symbol_kind_object() -> tower_lsp_server::ls_types::SymbolKind {
            tower_lsp_server::ls_types::SymbolKind::OBJECT
        }
        fn lsp_types_symbol_kind_field() -> tower_lsp_server::ls_types::SymbolKind {
            tower_lsp_server::ls_types::SymbolKind::FIELD
        }
        fn lsp_types_symbol_kind_function() -> tower_lsp_server::ls_types::SymbolKind {
            tower_lsp_server::ls_types::SymbolKind::FUNCTION
        }
        fn lsp_types_symbol_kind_variable() -> tower_lsp_server::ls_types::SymbolKind {
            tower_lsp_server::ls_types::SymbolKind::VARIABLE
        }

        Ok(Some(DocumentSymbolResponse::Nested(
            symbols.into_iter().map(convert).collect(),
        )))
    }
}

/// Start the LSP server over stdio.
pub fn run_server() {
    let rt = tokio::runtime::Runtime::new().expect("failed to build tokio runtime");
    rt.block_on(async {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let (service, socket) = LspService::new(Backend::new);
        Server::new(stdin, stdout, socket).serve(service).await;
    });
}
