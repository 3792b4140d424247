//! Query surface: the `Resolver` abstraction all the
//! consumer operations (completion, hover, signature help, definition,
//! document symbols) build on, plus a per-node stack cache so repeated
//! queries over the same document are O(1) after the first touch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::ast::{self, Expr, ExprNode, IndexKind, Pos};
use crate::stdlib;
use crate::value::{self, TypeInfo, Value, ValueResolver};
use crate::walker::{self, Variable};

/// Resolves an `import`/`importstr` path relative to the importing file.
/// Implemented by [`crate::session::Session`]; kept as a narrow trait here
/// so the query surface doesn't need to know about evaluator/importer
/// plumbing.
pub trait ImportResolver {
    fn resolve_import(&self, from_filename: &str, path: &str) -> Option<ExprNode>;
    fn comments_for(&self, filename: &str) -> Option<Rc<Vec<ast::Comment>>>;
}

/// The query surface for one parsed file.
pub struct Resolver {
    root: ExprNode,
    filename: Rc<str>,
    comments: Rc<Vec<ast::Comment>>,
    importer: Rc<dyn ImportResolver>,
    stack_cache: RefCell<HashMap<usize, Rc<Vec<ExprNode>>>>,
}

impl Resolver {
    pub fn new(
        root: ExprNode,
        filename: Rc<str>,
        comments: Rc<Vec<ast::Comment>>,
        importer: Rc<dyn ImportResolver>,
    ) -> Self {
        Self {
            root,
            filename,
            comments,
            importer,
            stack_cache: RefCell::new(HashMap::new()),
        }
    }

    fn cache_key(node: &ExprNode) -> usize {
        Rc::as_ptr(node) as usize
    }

    fn owned_stack(&self, borrowed: &walker::Stack<'_>) -> Rc<Vec<ExprNode>> {
        Rc::new(borrowed.iter().map(|n| (*n).clone()).collect())
    }

    /// `node_at(loc) -> (node?, stack)`.
    pub fn node_at(&self, loc: Pos) -> (Option<ExprNode>, Rc<Vec<ExprNode>>) {
        let borrowed = walker::stack_at_location(&self.root, loc);
        let Some(innermost) = borrowed.last().copied() else {
            return (None, Rc::new(Vec::new()));
        };
        let key = Self::cache_key(innermost);
        if let Some(cached) = self.stack_cache.borrow().get(&key) {
            return (Some(innermost.clone()), cached.clone());
        }
        let owned = self.owned_stack(&borrowed);
        self.stack_cache.borrow_mut().insert(key, owned.clone());
        (Some(innermost.clone()), owned)
    }

    /// `vars(from_node) -> VarMap`, using the cached stack for `from_node`
    /// when available (O(1)), else computing and caching it.
    pub fn vars(&self, from_node: &ExprNode) -> Vec<Variable> {
        let key = Self::cache_key(from_node);
        if let Some(cached) = self.stack_cache.borrow().get(&key) {
            let borrowed: walker::Stack<'_> = cached.iter().collect();
            return walker::stack_vars(&borrowed);
        }
        let borrowed = walker::stack_at_node(&self.root, from_node);
        let owned = self.owned_stack(&borrowed);
        let vars = walker::stack_vars(&borrowed);
        self.stack_cache.borrow_mut().insert(key, owned);
        vars
    }

    /// `import(from_filename, path) -> node?`.
    pub fn import(&self, from_filename: &str, path: &str) -> Option<ExprNode> {
        self.importer.resolve_import(from_filename, path)
    }

    fn annotation_at(&self, filename: &str, byte_offset: usize) -> Option<TypeInfo> {
        let comments = if filename == self.filename.as_ref() {
            self.comments.clone()
        } else {
            self.importer.comments_for(filename)?
        };
        let comment = ast::annotation_at(&comments, byte_offset)?;
        let body = comment.annotation_body()?;
        Some(value::parse_type_hint(body))
    }

    pub fn root(&self) -> &ExprNode {
        &self.root
    }

    pub fn deduce(&self, node: &ExprNode) -> Value {
        value::node_to_value(node, self)
    }
}

impl ValueResolver for Resolver {
    fn vars_at(&self, node: &ExprNode) -> Vec<Variable> {
        self.vars(node)
    }
    fn import(&self, from_filename: &str, path: &str) -> Option<ExprNode> {
        Resolver::import(self, from_filename, path)
    }
    fn annotation_at(&self, filename: &str, byte_offset: usize) -> Option<TypeInfo> {
        Resolver::annotation_at(self, filename, byte_offset)
    }
}

/// One completion candidate.
#[derive(Debug, Clone)]
pub struct CompletionItem {
    pub label: String,
    pub detail: Option<String>,
    pub insert_text: String,
    pub is_snippet: bool,
}

/// `hover(range?, markdown/plaintext)`.
#[derive(Debug, Clone)]
pub struct HoverInfo {
    pub markdown: String,
    pub range: Option<ast::Range>,
}

#[derive(Debug, Clone)]
pub struct SignatureParam {
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct SignatureHelp {
    pub label: String,
    pub params: Vec<SignatureParam>,
    pub active_param: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Location {
    pub filename: Rc<str>,
    pub range: ast::Range,
}

#[derive(Debug, Clone)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub range: ast::Range,
    pub children: Vec<DocumentSymbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Object,
    Field,
    Function,
    Variable,
}

impl Resolver {
    /// Completion at `loc`. `preceding_char`/`text` give the query surface
    /// the raw-text context the AST alone can't: whether the cursor
    /// follows a `/` inside an import literal, or a `.` after some
    /// expression.
    pub fn completion(
        &self,
        loc: Pos,
        preceding_char: Option<char>,
        search_paths: &[PathBuf],
    ) -> Vec<CompletionItem> {
        let (node, stack) = self.node_at(loc);

        if let Some(node) = &node
            && let Expr::Import { path } | Expr::ImportStr { path } = &node.node
            && preceding_char == Some('/')
        {
            return self.import_path_completions(path, search_paths);
        }

        if preceding_char == Some('.')
            && let Some(node) = &node
        {
            let value = self.deduce(node);
            if stdlib::is_std(&value.type_) {
                return stdlib::entry_names()
                    .map(|name| CompletionItem {
                        label: name.to_string(),
                        detail: None,
                        insert_text: name.to_string(),
                        is_snippet: false,
                    })
                    .collect();
            }
            if let TypeInfo::Object { fields: Some(fields), .. } = &value.type_ {
                return fields
                    .iter()
                    .map(|f| CompletionItem {
                        label: f.name.to_string(),
                        detail: Some(f.type_.kind_name().to_string()),
                        insert_text: quote_if_needed(&f.name),
                        is_snippet: false,
                    })
                    .collect();
            }
            return Vec::new();
        }

        if let Some(template) = self.template_completion_context(&stack) {
            return template;
        }

        let stack_ref: walker::Stack<'_> = stack.iter().collect();
        let mut vars = walker::stack_vars(&stack_ref);
        vars.sort_by(|a, b| a.stack_position.cmp(&b.stack_position).then(a.name.cmp(&b.name)));
        vars.into_iter()
            .map(|v| CompletionItem {
                label: v.name.to_string(),
                detail: None,
                insert_text: v.name.to_string(),
                is_snippet: false,
            })
            .collect()
    }

    fn import_path_completions(&self, path: &str, search_paths: &[PathBuf]) -> Vec<CompletionItem> {
        let dir_from_literal = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        let from_dir = Path::new(self.filename.as_ref())
            .parent()
            .unwrap_or_else(|| Path::new(""));

        let mut candidates: Vec<PathBuf> = vec![from_dir.join(dir_from_literal)];
        candidates.extend(search_paths.iter().map(|p| p.join(dir_from_literal)));

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for dir in candidates {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') || !seen.insert(name.clone()) {
                    continue;
                }
                out.push(CompletionItem {
                    label: name.clone(),
                    detail: None,
                    insert_text: name,
                    is_snippet: false,
                });
            }
        }
        out
    }

    /// If the cursor is inside an object literal that is the right operand
    /// of binary `+` over a known object template, return that template's
    /// unassigned, non-hidden fields as `name: $1,$0` snippets.
    fn template_completion_context(&self, stack: &[ExprNode]) -> Option<Vec<CompletionItem>> {
        for window in stack.windows(2).rev() {
            let [parent, child] = window else { continue };
            let Expr::Binary {
                op: crate::ast::BinaryOp::Add,
                lhs,
                rhs,
            } = &parent.node
            else {
                continue;
            };
            if !Rc::ptr_eq(rhs, child) {
                continue;
            }
            let Expr::Object(obj) = &child.node else { continue };
            let lhs_val = self.deduce(lhs);
            let TypeInfo::Object { fields: Some(template_fields), .. } = &lhs_val.type_ else {
                continue;
            };
            let assigned: std::collections::HashSet<&str> =
                obj.fields.iter().map(|f| f.name.as_ref()).collect();
            return Some(
                template_fields
                    .iter()
                    .filter(|f| !f.hidden && !assigned.contains(f.name.as_ref()))
                    .map(|f| CompletionItem {
                        label: f.name.to_string(),
                        detail: Some(f.type_.kind_name().to_string()),
                        insert_text: format!("{}: $1,$0", quote_if_needed(&f.name)),
                        is_snippet: true,
                    })
                    .collect(),
            );
        }
        None
    }

    /// Markdown summary of the deduced type plus any doc comments
    /// attached to the node.
    pub fn hover(&self, loc: Pos) -> Option<HoverInfo> {
        let (node, _stack) = self.node_at(loc);
        let node = node?;
        let value = self.deduce(&node);
        let mut markdown = format!("```\n{}\n```", describe_type(&value.type_));
        if !value.comment.is_empty() {
            markdown.push_str("\n\n");
            markdown.push_str(&value.comment.join("\n"));
        }
        Some(HoverInfo {
            markdown,
            range: node.range.clone(),
        })
    }

    /// The declared parameters of the function being applied at `loc`,
    /// with the active parameter index if determinable from `arg_index`.
    pub fn signature_help(&self, loc: Pos, arg_index: Option<usize>) -> Option<SignatureHelp> {
        let (_node, stack) = self.node_at(loc);
        let apply = stack.iter().rev().find(|n| matches!(n.node, Expr::Apply { .. }))?;
        let Expr::Apply { target, .. } = &apply.node else {
            return None;
        };
        let target_val = self.deduce(target);
        let TypeInfo::Function { params, .. } = &target_val.type_ else {
            return None;
        };
        let param_labels: Vec<SignatureParam> = params
            .iter()
            .map(|p| SignatureParam {
                label: p.name.to_string(),
            })
            .collect();
        let label = format!(
            "function({})",
            param_labels.iter().map(|p| p.label.as_str()).collect::<Vec<_>>().join(", ")
        );
        Some(SignatureHelp {
            label,
            params: param_labels,
            active_param: arg_index,
        })
    }

    /// The AST node a variable reference, field index, or import
    /// resolves to, as a source location.
    pub fn definition(&self, loc: Pos) -> Vec<Location> {
        let (node, stack) = self.node_at(loc);
        let Some(node) = node else { return Vec::new() };

        match &node.node {
            Expr::Var(name) => {
                let stack_ref: walker::Stack<'_> = stack.iter().collect();
                let vars = walker::stack_vars(&stack_ref);
                vars.iter()
                    .rev()
                    .find(|v| v.name.as_ref() == name.as_ref())
                    .and_then(|v| v.node.as_ref())
                    .and_then(|n| n.range.clone())
                    .map(|range| vec![Location {
                        filename: self.filename.clone(),
                        range,
                    }])
                    .unwrap_or_default()
            }
            Expr::Import { path } | Expr::ImportStr { path } => self
                .import(&self.filename, path)
                .and_then(|n| n.range.clone())
                .map(|range| vec![Location {
                    filename: range.filename.clone(),
                    range,
                }])
                .unwrap_or_default(),
            Expr::Index { target, index } => {
                let field_name: Option<Rc<str>> = match index {
                    IndexKind::Field(n) => Some(n.clone()),
                    IndexKind::Expr(e) => match &e.node {
                        Expr::Str(s) => Some(s.clone()),
                        _ => None,
                    },
                };
                let Some(field_name) = field_name else {
                    return Vec::new();
                };
                let target_val = self.deduce(target);
                target_val
                    .type_
                    .lookup_field(&field_name)
                    .and_then(|f| f.range)
                    .map(|range| vec![Location {
                        filename: self.filename.clone(),
                        range,
                    }])
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    /// A tree of named bindings and object fields in `root`.
    pub fn document_symbols(&self) -> Vec<DocumentSymbol> {
        symbols_of(&self.root)
    }
}

fn symbols_of(node: &ExprNode) -> Vec<DocumentSymbol> {
    match &node.node {
        Expr::Local { binds, body } => {
            let mut out: Vec<DocumentSymbol> = binds
                .iter()
                .filter_map(|b| {
                    let range = b.range.clone()?;
                    Some(DocumentSymbol {
                        name: b.name.to_string(),
                        kind: if b.params.is_some() {
                            SymbolKind::Function
                        } else {
                            SymbolKind::Variable
                        },
                        range,
                        children: symbols_of(&b.value),
                    })
                })
                .collect();
            out.extend(symbols_of(body));
            out
        }
        Expr::Object(obj) => obj
            .fields
            .iter()
            .filter_map(|f| {
                let range = f.name_range.clone()?;
                Some(DocumentSymbol {
                    name: f.name.to_string(),
                    kind: if matches!(f.value.node, Expr::Function { .. }) {
                        SymbolKind::Function
                    } else if matches!(f.value.node, Expr::Object(_)) {
                        SymbolKind::Object
                    } else {
                        SymbolKind::Field
                    },
                    range,
                    children: symbols_of(&f.value),
                })
            })
            .collect(),
        Expr::Parens(inner) => symbols_of(inner),
        _ => Vec::new(),
    }
}

fn describe_type(t: &TypeInfo) -> String {
    match t {
        TypeInfo::Function { params, return_hint } => {
            let params_s = params
                .iter()
                .map(|p| p.name.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let ret = return_hint
                .as_ref()
                .map(|h| describe_type(h))
                .unwrap_or_else(|| "any".to_string());
            format!("function({params_s}) -> {ret}")
        }
        TypeInfo::Array(Some(e)) => format!("array[{}]", describe_type(e)),
        TypeInfo::Array(None) => "array".to_string(),
        TypeInfo::Object { .. } => "object".to_string(),
        TypeInfo::Union(members) => members.iter().map(describe_type).collect::<Vec<_>>().join(" | "),
        other => other.kind_name().to_string(),
    }
}

fn quote_if_needed(name: &str) -> String {
    let safe = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if safe {
        name.to_string()
    } else {
        format!("\"{name}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jparser;

    struct NoImports;
    impl ImportResolver for NoImports {
        fn resolve_import(&self, _from: &str, _path: &str) -> Option<ExprNode> {
            None
        }
        fn comments_for(&self, _filename: &str) -> Option<Rc<Vec<ast::Comment>>> {
            None
        }
    }

    fn resolver(src: &str) -> Resolver {
        let outcome = jparser::parse("t.jsonnet", src);
        Resolver::new(
            outcome.ast.expect("parse ok"),
            Rc::from("t.jsonnet"),
            Rc::new(outcome.comments),
            Rc::new(NoImports),
        )
    }

    #[test]
    fn completion_offers_visible_locals() {
        let r = resolver("local x = 1; local y = 2; x");
        let end = Pos::new(1, "local x = 1; local y = 2; x".len() as u32 + 1);
        let items = r.completion(end, None, &[]);
        assert!(items.iter().any(|i| i.label == "x"));
        assert!(items.iter().any(|i| i.label == "y"));
        assert!(items.iter().any(|i| i.label == "std"));
    }

    #[test]
    fn hover_reports_function_type() {
        let r = resolver("local f(a, b) = a + b; f");
        let end = Pos::new(1, "local f(a, b) = a + b; f".len() as u32 + 1);
        let hover = r.hover(end).expect("hover");
        assert!(hover.markdown.contains("function"));
    }

    #[test]
    fn document_symbols_lists_object_fields() {
        let r = resolver("{a: 1, b: {c: 2}}");
        let symbols = r.document_symbols();
        assert!(symbols.iter().any(|s| s.name == "a"));
        let b = symbols.iter().find(|s| s.name == "b").expect("field b");
        assert!(b.children.iter().any(|s| s.name == "c"));
    }
}
