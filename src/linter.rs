//! Linter: a single-pass, O(n) walk that turns deduced types and usage
//! counts into the fixed diagnostic table.
//!
//! One function per diagnostic *shape*, assembled into a flat
//! `Vec<Diagnostic>` and handed to [`crate::diagnostic::sort_diagnostics`].

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprNode, IndexKind, UnaryOp};
use crate::diagnostic::{Diagnostic, DiagnosticCode, Severity};
use crate::value::{self, TypeInfo, ValueResolver};
use crate::walker::{self, VariableOrigin};

/// Lint `root`, returning diagnostics in walk order. Callers sort them via
/// [`crate::diagnostic::sort_diagnostics`] when a deterministic order
/// matters, since this function doesn't assume one.
pub fn lint(root: &ExprNode, resolver: &dyn ValueResolver) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let mut usage: HashMap<usize, usize> = HashMap::new();
    let mut bindings: Vec<(usize, Rc<str>, crate::ast::Range)> = Vec::new();

    walker::walk(root, &mut |node, stack| {
        match &node.node {
            Expr::Local { binds, .. } => {
                for b in binds {
                    if let Some(range) = &b.range {
                        let key = Rc::as_ptr(&b.value) as usize;
                        bindings.push((key, b.name.clone(), range.clone()));
                        usage.entry(key).or_insert(0);
                    }
                }
            }
            Expr::Object(obj) => {
                for b in &obj.locals {
                    if let Some(range) = &b.range {
                        let key = Rc::as_ptr(&b.value) as usize;
                        bindings.push((key, b.name.clone(), range.clone()));
                        usage.entry(key).or_insert(0);
                    }
                }
            }
            Expr::Var(name) => {
                let mut full_stack = stack.clone();
                full_stack.push(node);
                let vars = walker::stack_vars(&full_stack);
                if let Some(var) = vars.iter().rev().find(|v| v.name.as_ref() == name.as_ref())
                    && matches!(var.origin, VariableOrigin::Local | VariableOrigin::ObjectLocal)
                    && let Some(origin_node) = &var.node
                {
                    let key = Rc::as_ptr(origin_node) as usize;
                    usage.entry(key).and_modify(|c| *c += 1);
                }
            }
            Expr::Apply {
                target,
                positional,
                named,
            } => lint_apply(node, target, positional, named, resolver, &mut diags),
            Expr::Binary { op, lhs, rhs } => lint_binary(node, *op, lhs, rhs, resolver, &mut diags),
            Expr::Unary { op, expr } => lint_unary(node, *op, expr, resolver, &mut diags),
            Expr::Index { target, index } => lint_index(node, target, index, resolver, &mut diags),
            Expr::Import { path } => lint_import(node, path, resolver, &mut diags),
            _ => {}
        }
        true
    });

    for (key, name, range) in bindings {
        if usage.get(&key).copied().unwrap_or(0) == 0
            && !name.starts_with('$')
            && name.as_ref() != "self"
        {
            diags.push(Diagnostic::new(
                DiagnosticCode::UnusedVar,
                Severity::Warning,
                format!("unused variable '{name}'"),
                range,
            ));
        }
    }

    diags
}

fn lint_apply(
    node: &ExprNode,
    target: &ExprNode,
    positional: &[ExprNode],
    named: &[(Rc<str>, ExprNode)],
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    let Some(range) = node.range.clone() else {
        return;
    };
    let target_val = value::node_to_value(target, resolver);
    let TypeInfo::Function { params, .. } = &target_val.type_ else {
        if !matches!(target_val.type_, TypeInfo::Any) {
            diags.push(Diagnostic::new(
                DiagnosticCode::TypeMismatch,
                Severity::Error,
                format!("calling non-function '{}'", target_val.type_.kind_name()),
                range,
            ));
        }
        return;
    };

    let mut seen_named: HashMap<&str, usize> = HashMap::new();
    for (name, _) in named {
        let count = seen_named.entry(name.as_ref()).or_insert(0);
        *count += 1;
        if *count > 1 {
            diags.push(Diagnostic::new(
                DiagnosticCode::ArgumentCardinality,
                Severity::Warning,
                format!("duplicate named '{name}'"),
                range.clone(),
            ));
        }
    }
    for (name, _) in named {
        if !params.iter().any(|p| p.name.as_ref() == name.as_ref()) {
            diags.push(Diagnostic::new(
                DiagnosticCode::UnknownArgument,
                Severity::Error,
                format!("unknown argument '{name}'"),
                range.clone(),
            ));
        }
    }

    let arity = params.len();
    let required = params.iter().filter(|p| !p.has_default).count();
    let provided = positional.len() + named.len();
    if provided < required {
        diags.push(Diagnostic::new(
            DiagnosticCode::ArgumentCardinality,
            Severity::Error,
            format!("too few ({provided} for {arity})"),
            range.clone(),
        ));
    } else if provided > arity {
        diags.push(Diagnostic::new(
            DiagnosticCode::ArgumentCardinality,
            Severity::Error,
            format!("too many ({provided} for {arity})"),
            range.clone(),
        ));
    }

    for (i, arg) in positional.iter().enumerate() {
        let Some(param) = params.get(i) else { continue };
        check_arg_type(param, arg, resolver, diags);
    }
    for (name, arg) in named {
        let Some(param) = params.iter().find(|p| p.name.as_ref() == name.as_ref()) else {
            continue;
        };
        check_arg_type(param, arg, resolver, diags);
    }
}

fn check_arg_type(
    param: &value::ParamInfo,
    arg: &ExprNode,
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    let Some(hint) = &param.type_hint else { return };
    let declared = value::annotation_to_type_info(hint);
    if matches!(declared, TypeInfo::Any) {
        return;
    }
    let actual = value::node_to_value(arg, resolver).type_;
    if matches!(actual, TypeInfo::Any) {
        return;
    }
    // An explicit `null` passed for an optional parameter is always allowed,
    // regardless of its declared type.
    if param.has_default && matches!(actual, TypeInfo::Null) {
        return;
    }
    if !value::type_accepts(&declared, &actual) {
        let Some(range) = arg.range.clone() else { return };
        diags.push(Diagnostic::new(
            DiagnosticCode::TypeMismatch,
            Severity::Warning,
            format!(
                "'{}' expected {} got {}",
                param.name,
                declared.kind_name(),
                actual.kind_name()
            ),
            range,
        ));
    }
}

fn lint_binary(
    node: &ExprNode,
    op: BinaryOp,
    lhs: &ExprNode,
    rhs: &ExprNode,
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    let Some(range) = node.range.clone() else {
        return;
    };
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let lt = value::node_to_value(lhs, resolver).type_;
            let rt = value::node_to_value(rhs, resolver).type_;
            if !matches!(lt, TypeInfo::Any)
                && !matches!(rt, TypeInfo::Any)
                && lt.kind_name() != rt.kind_name()
            {
                diags.push(Diagnostic::new(
                    DiagnosticCode::TypeMismatch,
                    Severity::Warning,
                    format!(
                        "equality between '{}' and '{}'",
                        lt.kind_name(),
                        rt.kind_name()
                    ),
                    range,
                ));
            }
        }
        BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => {
            for (side, t) in [
                ("left", value::node_to_value(lhs, resolver).type_),
                ("right", value::node_to_value(rhs, resolver).type_),
            ] {
                if !matches!(t, TypeInfo::Any) && t.kind_name() != "number" {
                    diags.push(Diagnostic::new(
                        DiagnosticCode::TypeMismatch,
                        Severity::Warning,
                        format!("{side} operand of '{op}' expected number got {}", t.kind_name()),
                        range.clone(),
                    ));
                }
            }
        }
        BinaryOp::Add => {
            let lt = value::node_to_value(lhs, resolver).type_;
            let rt = value::node_to_value(rhs, resolver).type_;
            if matches!(lt, TypeInfo::Any) || matches!(rt, TypeInfo::Any) {
                return;
            }
            let compatible = matches!(
                (&lt, &rt),
                (TypeInfo::String, TypeInfo::String)
                    | (TypeInfo::Number, TypeInfo::Number)
                    | (TypeInfo::Object { .. }, TypeInfo::Object { .. })
                    | (TypeInfo::Array(_), TypeInfo::Array(_))
            );
            if !compatible {
                diags.push(Diagnostic::new(
                    DiagnosticCode::TypeMismatch,
                    Severity::Warning,
                    format!("'+' operands '{}' and '{}' do not match", lt.kind_name(), rt.kind_name()),
                    range,
                ));
            }
        }
        _ => {}
    }
}

fn lint_unary(
    node: &ExprNode,
    op: UnaryOp,
    expr: &ExprNode,
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    if !matches!(op, UnaryOp::Neg | UnaryOp::Pos | UnaryOp::BitNot) {
        return;
    }
    let Some(range) = node.range.clone() else {
        return;
    };
    let t = value::node_to_value(expr, resolver).type_;
    if !matches!(t, TypeInfo::Any) && t.kind_name() != "number" {
        diags.push(Diagnostic::new(
            DiagnosticCode::TypeMismatch,
            Severity::Warning,
            format!("operand of unary expected number got {}", t.kind_name()),
            range,
        ));
    }
}

fn lint_index(
    node: &ExprNode,
    target: &ExprNode,
    index: &IndexKind,
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    let Some(range) = node.range.clone() else {
        return;
    };
    let target_val = value::node_to_value(target, resolver);
    match (&target_val.type_, index) {
        (TypeInfo::Array(_), IndexKind::Expr(e)) => {
            let it = value::node_to_value(e, resolver).type_;
            if !matches!(it, TypeInfo::Any) && it.kind_name() != "number" {
                diags.push(Diagnostic::new(
                    DiagnosticCode::TypeMismatch,
                    Severity::Warning,
                    format!("array index expected number got {}", it.kind_name()),
                    range,
                ));
            }
        }
        (TypeInfo::Object { all_fields_known, .. }, IndexKind::Expr(e)) => {
            let it = value::node_to_value(e, resolver).type_;
            if !matches!(it, TypeInfo::Any) && it.kind_name() != "string" {
                diags.push(Diagnostic::new(
                    DiagnosticCode::TypeMismatch,
                    Severity::Warning,
                    format!("object index expected string got {}", it.kind_name()),
                    range,
                ));
            } else if let Expr::Str(name) = &e.node
                && *all_fields_known
                && target_val.type_.lookup_field(name).is_none()
            {
                diags.push(Diagnostic::new(
                    DiagnosticCode::UnknownField,
                    Severity::Warning,
                    format!("unknown field '{name}'"),
                    range,
                ));
            }
        }
        (TypeInfo::Object { all_fields_known, .. }, IndexKind::Field(name)) => {
            if *all_fields_known && target_val.type_.lookup_field(name).is_none() {
                diags.push(Diagnostic::new(
                    DiagnosticCode::UnknownField,
                    Severity::Warning,
                    format!("unknown field '{name}'"),
                    range,
                ));
            }
        }
        _ => {}
    }
}

fn lint_import(
    node: &ExprNode,
    path: &str,
    resolver: &dyn ValueResolver,
    diags: &mut Vec<Diagnostic>,
) {
    let Some(range) = node.range.clone() else {
        return;
    };
    let v = value::node_to_value(node, resolver);
    if matches!(v.type_, TypeInfo::Any) && v.node.is_none() {
        diags.push(Diagnostic::new(
            DiagnosticCode::ImportNotFound,
            Severity::Warning,
            format!("cannot resolve import '{path}'"),
            range,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jparser;
    use std::cell::RefCell;

    struct TestResolver {
        root: RefCell<Option<ExprNode>>,
    }

    impl ValueResolver for TestResolver {
        fn vars_at(&self, node: &ExprNode) -> Vec<walker::Variable> {
            let root = self.root.borrow();
            let Some(root) = root.as_ref() else {
                return Vec::new();
            };
            let stack = walker::stack_at_node(root, node);
            walker::stack_vars(&stack)
        }
        fn import(&self, _from: &str, _path: &str) -> Option<ExprNode> {
            None
        }
        fn annotation_at(&self, _filename: &str, _byte_offset: usize) -> Option<TypeInfo> {
            None
        }
    }

    fn lint_src(src: &str) -> Vec<Diagnostic> {
        let ast = jparser::parse("t.jsonnet", src).ast.expect("parse ok");
        let resolver = TestResolver {
            root: RefCell::new(Some(ast.clone())),
        };
        let mut diags = lint(&ast, &resolver);
        crate::diagnostic::sort_diagnostics(&mut diags);
        diags
    }

    #[test]
    fn unused_local_is_flagged() {
        let diags = lint_src("local x = 1; 42");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::UnusedVar));
    }

    #[test]
    fn used_local_is_not_flagged() {
        let diags = lint_src("local x = 1; x");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::UnusedVar));
    }

    #[test]
    fn stdlib_arity_and_type_mismatches() {
        let diags = lint_src(
            r#"
            local tooFew = std.endsWith('');
            local tooMany = std.endsWith('', '', '');
            local wrong = std.all(5);
            local notFn = "asdf";
            local callNF = notFn(2);
            {used:[tooFew,tooMany,wrong,callNF]}
            "#,
        );
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::ArgumentCardinality
            && d.message.contains("too few")));
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::ArgumentCardinality
            && d.message.contains("too many")));
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::TypeMismatch
            && d.message.contains("'arr'")));
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::TypeMismatch
            && d.message.contains("calling non-function")));
    }

    #[test]
    fn duplicate_named_argument() {
        let diags = lint_src("local fn(a=null,b=null) = null; fn(a=2, a=3)");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::ArgumentCardinality
            && d.message.contains("duplicate named")));
    }

    #[test]
    fn annotated_argument_type_mismatch() {
        let diags = lint_src(
            "local typed(a/*:string*/, b/*:number*/, c=null) = null; typed(2, false)",
        );
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::TypeMismatch
            && d.message.contains("'a'") && d.message.contains("string")));
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::TypeMismatch
            && d.message.contains("'b'") && d.message.contains("number")));
    }

    #[test]
    fn determinism_across_runs() {
        let src = "local x = 1; local y = std.endsWith(''); 42";
        let a = lint_src(src);
        let b = lint_src(src);
        let a_msgs: Vec<_> = a.iter().map(|d| (d.code, d.message.clone())).collect();
        let b_msgs: Vec<_> = b.iter().map(|d| (d.code, d.message.clone())).collect();
        assert_eq!(a_msgs, b_msgs);
    }
}
