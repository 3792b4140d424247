//! AST-recovery shim.
//!
//! When an edit leaves the document unparsable, try up to two single-
//! character insertions — `;` then `,` — at the position immediately
//! after the last edit, and accept the first one that parses cleanly.
//! This never replaces the original parse error (the caller keeps showing
//! it); it only gives the rest of the analysis core *something* to work
//! with in the meantime, the way a type checker tolerates a dangling
//! comma while the user is mid-keystroke.
//!
//! Deliberately not run for `Replace`/open: a full replace has no "last
//! edit position" to anchor the insertion, and guessing one for an entire
//! new document would be indistinguishable from noise.

use crate::ast::{Comment, ExprNode};
use crate::jparser;

const REMEDIES: [&str; 2] = [";", ","];

/// Attempt recovery of `text` (already known to fail to parse) by
/// inserting one of [`REMEDIES`] at `edit_end` (a byte offset). Returns
/// the recovered AST and comments on the first remedy that parses.
pub fn recover(filename: &str, text: &str, edit_end: usize) -> Option<(ExprNode, Vec<Comment>)> {
    let edit_end = edit_end.min(text.len());
    // Insertion must land on a char boundary; if it doesn't, there is no
    // single-character fix to try.
    if !text.is_char_boundary(edit_end) {
        return None;
    }
    for remedy in REMEDIES {
        let mut candidate = String::with_capacity(text.len() + remedy.len());
        candidate.push_str(&text[..edit_end]);
        candidate.push_str(remedy);
        candidate.push_str(&text[edit_end..]);
        let outcome = jparser::parse(filename, &candidate);
        if let Some(ast) = outcome.ast {
            return Some((ast, outcome.comments));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_with_semicolon() {
        let text = "local x = std";
        assert!(jparser::parse("t.jsonnet", text).ast.is_none());
        let recovered = recover("t.jsonnet", text, text.len());
        assert!(recovered.is_some());
    }

    #[test]
    fn gives_up_when_no_single_char_fix_exists() {
        let text = "local x = ";
        let recovered = recover("t.jsonnet", text, text.len());
        assert!(recovered.is_none());
    }

    #[test]
    fn out_of_bounds_offset_is_clamped() {
        let text = "local x = std";
        let recovered = recover("t.jsonnet", text, text.len() + 50);
        assert!(recovered.is_some());
    }
}
