//! Session/VM cache: holds at most one active evaluator instance tied to
//! a URI, wrapped by an importer that memoises `(from, path) -> content`
//! forever within the life of that active URI.
//!
//! A `RefCell<HashMap<..>>` rather than a `Mutex` one, since the session,
//! like the rest of the analysis core, is confined to a single thread and
//! never shared across one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{self, ExprNode};
use crate::diagnostic::Diagnostic;
use crate::eval::{Evaluator, FilesystemImporter, Importer, NoopEvaluator};
use crate::jparser;
use crate::resolver::ImportResolver;

struct CacheEntry {
    resolved_filename: String,
    ast: Option<ExprNode>,
    comments: Rc<Vec<ast::Comment>>,
}

/// One active evaluator/importer pairing, bound to a single URI.
pub struct Session {
    active_uri: RefCell<Option<String>>,
    importer: Box<dyn Importer>,
    evaluator: Box<dyn Evaluator>,
    by_request: RefCell<HashMap<(String, String), Rc<CacheEntry>>>,
    by_filename: RefCell<HashMap<String, Rc<CacheEntry>>>,
}

impl Session {
    pub fn new(importer: Box<dyn Importer>, evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            active_uri: RefCell::new(None),
            importer,
            evaluator,
            by_request: RefCell::new(HashMap::new()),
            by_filename: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_filesystem_defaults(search_paths: Vec<PathBuf>) -> Self {
        Self::new(
            Box::new(FilesystemImporter::new(search_paths)),
            Box::new(NoopEvaluator),
        )
    }

    /// Bind the session to `uri`. If this is a different URI than the one
    /// currently active, every cached import is flushed and rebuilt from
    /// scratch: switching the active URI flushes and rebuilds the cache.
    pub fn set_active_uri(&self, uri: &str) {
        let mut active = self.active_uri.borrow_mut();
        if active.as_deref() == Some(uri) {
            return;
        }
        *active = Some(uri.to_string());
        self.by_request.borrow_mut().clear();
        self.by_filename.borrow_mut().clear();
    }

    pub fn active_uri(&self) -> Option<String> {
        self.active_uri.borrow().clone()
    }

    fn entry_for(&self, from: &str, path: &str) -> Option<Rc<CacheEntry>> {
        let key = (from.to_string(), path.to_string());
        if let Some(cached) = self.by_request.borrow().get(&key) {
            return Some(cached.clone());
        }

        let (content, resolved_filename) = self.importer.import(from, path).ok()?;
        let outcome = jparser::parse(&resolved_filename, &content);
        let entry = Rc::new(CacheEntry {
            resolved_filename: resolved_filename.clone(),
            ast: outcome.ast,
            comments: Rc::new(outcome.comments),
        });
        self.by_request.borrow_mut().insert(key, entry.clone());
        self.by_filename
            .borrow_mut()
            .insert(resolved_filename, entry.clone());
        Some(entry)
    }

    /// Runtime evaluation diagnostics, when a real [`Evaluator`] is
    /// plugged in.
    pub fn evaluate(&self, filename: &str, source: &str) -> Vec<Diagnostic> {
        self.evaluator.evaluate(filename, source)
    }
}

impl ImportResolver for Session {
    fn resolve_import(&self, from: &str, path: &str) -> Option<ExprNode> {
        self.entry_for(from, path)?.ast.clone()
    }

    fn comments_for(&self, filename: &str) -> Option<Rc<Vec<ast::Comment>>> {
        self.by_filename
            .borrow()
            .get(filename)
            .map(|e| e.comments.clone())
            .or_else(|| {
                // Not yet imported under this name directly; scan cached
                // entries for a matching resolved filename.
                self.by_filename.borrow().values().find_map(|e| {
                    (e.resolved_filename == filename).then(|| e.comments.clone())
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ImportError;

    struct CountingImporter(RefCell<usize>);
    impl Importer for CountingImporter {
        fn import(&self, _from: &str, _path: &str) -> Result<(String, String), ImportError> {
            *self.0.borrow_mut() += 1;
            Ok(("{a: 1}".to_string(), "lib.jsonnet".to_string()))
        }
    }

    #[test]
    fn memoizes_repeated_requests() {
        let session = Session::new(Box::new(CountingImporter(RefCell::new(0))), Box::new(NoopEvaluator));
        session.set_active_uri("main.jsonnet");
        let first = session.resolve_import("main.jsonnet", "lib.jsonnet");
        let second = session.resolve_import("main.jsonnet", "lib.jsonnet");
        assert!(first.is_some());
        assert!(second.is_some());
    }

    #[test]
    fn switching_uri_flushes_cache() {
        struct CountingImporter(RefCell<usize>);
        impl Importer for CountingImporter {
            fn import(&self, _from: &str, _path: &str) -> Result<(String, String), ImportError> {
                *self.0.borrow_mut() += 1;
                Ok(("{}".to_string(), "lib.jsonnet".to_string()))
            }
        }
        let session = Session::new(Box::new(CountingImporter(RefCell::new(0))), Box::new(NoopEvaluator));
        session.set_active_uri("a.jsonnet");
        session.resolve_import("a.jsonnet", "lib.jsonnet");
        session.set_active_uri("b.jsonnet");
        assert!(session.by_request.borrow().is_empty());
    }
}
