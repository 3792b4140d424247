//! AST walker & scope model.
//!
//! Depth-first traversal over [`crate::ast`] nodes threading a parent
//! stack, plus the scope-extraction logic (`stack_vars`) that both the
//! deducer ([`crate::value`]) and the query surface ([`crate::resolver`])
//! build on.

use std::rc::Rc;

use crate::ast::{Bind, Expr, ExprNode, ForSpec, IndexKind, ObjectNode, Pos};

/// A borrowed parent stack: outermost node first, innermost (current) node
/// last. Never owns the tree — a `Value` (and by extension a stack) never
/// outlives the parse it came from.
pub type Stack<'a> = Vec<&'a ExprNode>;

/// Visit every node in `root` exactly once, depth-first, pre-order.
/// `visitor` receives the node and the stack of ancestors (not including
/// the node itself). Returning `false` skips that node's children.
pub fn walk<'a>(root: &'a ExprNode, visitor: &mut impl FnMut(&'a ExprNode, &Stack<'a>) -> bool) {
    let mut stack = Vec::new();
    walk_inner(root, &mut stack, visitor);
}

fn walk_inner<'a>(
    node: &'a ExprNode,
    stack: &mut Stack<'a>,
    visitor: &mut impl FnMut(&'a ExprNode, &Stack<'a>) -> bool,
) {
    if !visitor(node, stack) {
        return;
    }
    stack.push(node);
    for child in children(node) {
        walk_inner(child, stack, visitor);
    }
    stack.pop();
}

/// Direct AST children of `node`, in source order.
pub fn children(node: &ExprNode) -> Vec<&ExprNode> {
    match &node.node {
        Expr::Null
        | Expr::True
        | Expr::False
        | Expr::SelfExpr
        | Expr::Dollar
        | Expr::Number(_)
        | Expr::Str(_)
        | Expr::Var(_)
        | Expr::Import { .. }
        | Expr::ImportStr { .. }
        | Expr::Error_ => Vec::new(),
        Expr::Array(items) => items.iter().collect(),
        Expr::ArrayComp {
            expr,
            forspec,
            ifspecs,
        } => {
            let mut out = vec![expr, &forspec.expr];
            out.extend(ifspecs.iter());
            out
        }
        Expr::Object(obj) => object_children(obj),
        Expr::ObjectComp {
            key,
            value,
            forspec,
            ifspecs,
        } => {
            let mut out = vec![key, value, &forspec.expr];
            out.extend(ifspecs.iter());
            out
        }
        Expr::Local { binds, body } => {
            let mut out: Vec<&ExprNode> = binds
                .iter()
                .flat_map(|b| bind_children(b))
                .collect();
            out.push(body);
            out
        }
        Expr::If {
            cond,
            then,
            or_else,
        } => {
            let mut out = vec![cond, then];
            if let Some(e) = or_else {
                out.push(e);
            }
            out
        }
        Expr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
        Expr::Unary { expr, .. } => vec![expr],
        Expr::Apply {
            target,
            positional,
            named,
        } => {
            let mut out = vec![target];
            out.extend(positional.iter());
            out.extend(named.iter().map(|(_, v)| v));
            out
        }
        Expr::Function { params, body, .. } => {
            let mut out: Vec<&ExprNode> = params.iter().filter_map(|p| p.default.as_ref()).collect();
            out.push(body);
            out
        }
        Expr::Index { target, index } => {
            let mut out = vec![target];
            if let IndexKind::Expr(e) = index {
                out.push(e);
            }
            out
        }
        Expr::Error(e) => vec![e],
        Expr::Assert { cond, msg, then } => {
            let mut out = vec![cond];
            if let Some(m) = msg {
                out.push(m);
            }
            out.push(then);
            out
        }
        Expr::InSuper { index } => vec![index],
        Expr::Parens(e) => vec![e],
    }
}

fn object_children(obj: &ObjectNode) -> Vec<&ExprNode> {
    let mut out: Vec<&ExprNode> = obj.locals.iter().flat_map(|b| bind_children(b)).collect();
    out.extend(obj.fields.iter().map(|f| &f.value));
    out
}

fn bind_children(b: &Bind) -> Vec<&ExprNode> {
    // `b.value` is already `Expr::Function { params, .. }` when `b.params`
    // is `Some` (see `parse_bind`), so its own `children()` yields the
    // parameter defaults; listing them here too would visit them twice.
    vec![&b.value]
}

/// A binding visible in some scope.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Rc<str>,
    pub origin: VariableOrigin,
    /// Index into the stack at which this binding was introduced; used to
    /// rank completions innermost-scope-first.
    pub stack_position: usize,
    pub node: Option<ExprNode>,
}

#[derive(Debug, Clone)]
pub enum VariableOrigin {
    Local,
    ObjectLocal,
    Param { function: ExprNode, index: usize },
    Std,
    SelfObject,
    DollarObject,
}

/// Returns the deepest stack whose innermost node contains `loc` under the
/// completion containment rule: inclusive at `begin`, exclusive at `end`,
/// except a position exactly at `end` on the same line still counts as
/// inside. Ties are broken by maximal depth.
pub fn stack_at_location<'a>(root: &'a ExprNode, loc: Pos) -> Stack<'a> {
    let mut best: Stack<'a> = Vec::new();
    walk(root, &mut |node, stack| {
        let contains = match &node.range {
            Some(r) => r.contains_for_completion(loc),
            None => false,
        };
        if contains {
            let mut candidate = stack.clone();
            candidate.push(node);
            if candidate.len() > best.len() {
                best = candidate;
            }
            true
        } else {
            false
        }
    });
    best
}

/// Returns the stack ending at `target`, matched by pointer identity.
pub fn stack_at_node<'a>(root: &'a ExprNode, target: &ExprNode) -> Stack<'a> {
    let mut found: Stack<'a> = Vec::new();
    walk(root, &mut |node, stack| {
        if Rc::ptr_eq(node, target) {
            let mut candidate = stack.clone();
            candidate.push(node);
            found = candidate;
            return false;
        }
        true
    });
    found
}

/// Repeatedly descend through `local` wrappers and error-asserting
/// conditionals (`assert cond else error msg; then` desugars to an `If`
/// whose false branch is `Expr::Error`), returning the trailing expression
/// and the accumulated binds encountered along the way.
pub fn unwind_locals(root: &ExprNode) -> (ExprNode, Vec<Bind>) {
    let mut binds = Vec::new();
    let mut cur = root.clone();
    loop {
        match &cur.node {
            Expr::Local { binds: b, body } => {
                binds.extend(b.iter().cloned());
                let next = body.clone();
                cur = next;
            }
            Expr::Assert { then, .. } => {
                let next = then.clone();
                cur = next;
            }
            Expr::If {
                cond: _,
                then,
                or_else: Some(or_else),
            } if matches!(or_else.node, Expr::Error(_)) => {
                let next = then.clone();
                cur = next;
            }
            Expr::Parens(inner) => {
                let next = inner.clone();
                cur = next;
            }
            _ => break,
        }
    }
    (cur, binds)
}

/// Extract every binding visible at `stack`, outside-in: a binding per
/// local bind, per desugared-object local, per function parameter, plus
/// the always-present `std`, the innermost `self`, and the outermost `$`.
pub fn stack_vars(stack: &Stack<'_>) -> Vec<Variable> {
    let mut vars = Vec::new();
    vars.push(Variable {
        name: Rc::from("std"),
        origin: VariableOrigin::Std,
        stack_position: 0,
        node: None,
    });

    let mut self_object: Option<ExprNode> = None;
    let mut dollar_object: Option<ExprNode> = None;

    for (pos, node) in stack.iter().enumerate() {
        match &node.node {
            Expr::Local { binds, .. } => {
                for b in binds {
                    vars.push(Variable {
                        name: b.name.clone(),
                        origin: VariableOrigin::Local,
                        stack_position: pos,
                        node: Some(b.value.clone()),
                    });
                }
            }
            Expr::Object(obj) => {
                for b in &obj.locals {
                    vars.push(Variable {
                        name: b.name.clone(),
                        origin: VariableOrigin::ObjectLocal,
                        stack_position: pos,
                        node: Some(b.value.clone()),
                    });
                }
                if self_object.is_none() {
                    self_object = Some((*node).clone());
                }
                dollar_object = Some((*node).clone());
            }
            Expr::Function { params, .. } => {
                for (idx, p) in params.iter().enumerate() {
                    vars.push(Variable {
                        name: p.name.clone(),
                        origin: VariableOrigin::Param {
                            function: (*node).clone(),
                            index: idx,
                        },
                        stack_position: pos,
                        node: p.default.clone(),
                    });
                }
            }
            Expr::ArrayComp { forspec, .. } | Expr::ObjectComp { forspec, .. } => {
                push_forspec_var(&mut vars, forspec, pos);
            }
            _ => {}
        }
    }

    if let Some(obj) = self_object {
        vars.push(Variable {
            name: Rc::from("self"),
            origin: VariableOrigin::SelfObject,
            stack_position: stack.len(),
            node: Some(obj),
        });
    }
    if let Some(obj) = dollar_object {
        vars.push(Variable {
            name: Rc::from("$"),
            origin: VariableOrigin::DollarObject,
            stack_position: 0,
            node: Some(obj),
        });
    }

    vars
}

fn push_forspec_var(vars: &mut Vec<Variable>, forspec: &ForSpec, pos: usize) {
    vars.push(Variable {
        name: forspec.var.clone(),
        origin: VariableOrigin::Local,
        stack_position: pos,
        node: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jparser;

    fn parse(src: &str) -> ExprNode {
        jparser::parse("test.jsonnet", src).ast.expect("parse ok")
    }

    #[test]
    fn walk_visits_every_node() {
        let ast = parse("{a: 1, b: [1, 2, local x = 3; x]}");
        let mut count = 0;
        walk(&ast, &mut |_, _| {
            count += 1;
            true
        });
        assert!(count > 4);
    }

    #[test]
    fn stack_vars_includes_locals_and_std() {
        let ast = parse("local x = 1; local y = 2; x");
        let (_, _binds) = unwind_locals(&ast);
        let stack = stack_at_location(&ast, Pos::new(1, 1));
        let vars = stack_vars(&stack);
        assert!(vars.iter().any(|v| v.name.as_ref() == "std"));
    }

    #[test]
    fn stack_at_node_ends_at_target() {
        let ast = parse("local x = 1; x");
        let mut target = None;
        walk(&ast, &mut |node, _| {
            if matches!(node.node, Expr::Var(_)) {
                target = Some((*node).clone());
            }
            true
        });
        let target = target.unwrap();
        let stack = stack_at_node(&ast, &target);
        assert!(Rc::ptr_eq(stack.last().unwrap(), &target));
    }
}
