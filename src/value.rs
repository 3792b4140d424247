//! Value/type deducer and generic inference, the latter as a private
//! `unify` submodule.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::annotation::{self, AnnotationType};
use crate::ast::{self, BinaryOp, Expr, ExprNode, IndexKind, UnaryOp};
use crate::stdlib;
use crate::walker::{self, VariableOrigin};

/// Maximum recursion depth for [`node_to_value`]; guarantees termination
/// on pathological inputs.
const MAX_DEPTH: usize = 300;

#[derive(Debug, Clone)]
pub struct Value {
    pub range: Option<ast::Range>,
    pub comment: Vec<String>,
    pub node: Option<ExprNode>,
    pub type_: TypeInfo,
    pub type_hint: Option<AnnotationType>,
}

impl Value {
    fn any() -> Self {
        Value {
            range: None,
            comment: Vec::new(),
            node: None,
            type_: TypeInfo::Any,
            type_hint: None,
        }
    }

    fn with_node(mut self, node: &ExprNode) -> Self {
        self.range = node.range.clone();
        self.node = Some(node.clone());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: Rc<str>,
    pub range: Option<ast::Range>,
    pub comment: Vec<String>,
    pub hidden: bool,
    pub type_: TypeInfo,
    pub type_hint: Option<AnnotationType>,
    pub origin_node: Option<ExprNode>,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: Rc<str>,
    pub type_hint: Option<AnnotationType>,
    pub has_default: bool,
}

/// Tagged variant for an inferred type.
#[derive(Debug, Clone)]
pub enum TypeInfo {
    Any,
    Null,
    Boolean,
    Number,
    String,
    Array(Option<Box<TypeInfo>>),
    Object {
        fields: Option<Rc<Vec<FieldInfo>>>,
        all_fields_known: bool,
        /// Left-hand operands of `+`, most recently appended last; looked
        /// up in reverse on a field-lookup miss.
        supers: Vec<Rc<Value>>,
    },
    Function {
        params: Vec<ParamInfo>,
        return_hint: Option<Box<TypeInfo>>,
    },
    Union(Vec<TypeInfo>),
    TypeParameter(char),
    HintError(String),
}

impl TypeInfo {
    pub fn object(fields: Vec<FieldInfo>, all_fields_known: bool) -> Self {
        TypeInfo::Object {
            fields: Some(Rc::new(fields)),
            all_fields_known,
            supers: Vec::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeInfo::Any => "any",
            TypeInfo::Null => "null",
            TypeInfo::Boolean => "boolean",
            TypeInfo::Number => "number",
            TypeInfo::String => "string",
            TypeInfo::Array(_) => "array",
            TypeInfo::Object { .. } => "object",
            TypeInfo::Function { .. } => "function",
            TypeInfo::Union(_) => "union",
            TypeInfo::TypeParameter(_) => "type_parameter",
            TypeInfo::HintError(_) => "hint_error",
        }
    }

    /// Look up a field by name, consulting `supers` in reverse on a miss,
    /// per the non-cyclic `+`-template rule.
    pub fn lookup_field(&self, name: &str) -> Option<FieldInfo> {
        match self {
            TypeInfo::Object {
                fields, supers, ..
            } => {
                if let Some(fields) = fields
                    && let Some(f) = fields.iter().find(|f| f.name.as_ref() == name)
                {
                    return Some(f.clone());
                }
                for sup in supers.iter().rev() {
                    if let Some(f) = sup.type_.lookup_field(name) {
                        return Some(f);
                    }
                }
                None
            }
            _ => None,
        }
    }
}

/// The external collaborator the deducer queries for variable scope and
/// import resolution ([`crate::resolver::Resolver`], used narrowly here).
pub trait ValueResolver {
    fn vars_at(&self, node: &ExprNode) -> Vec<walker::Variable>;
    fn import(&self, from_filename: &str, path: &str) -> Option<ExprNode>;
    /// Look up the type-annotation comment (if any) anchored at
    /// `byte_offset` within `filename`, parsed into a [`TypeInfo`].
    fn annotation_at(&self, filename: &str, byte_offset: usize) -> Option<TypeInfo>;
}

struct Ctx<'a> {
    resolver: &'a dyn ValueResolver,
    depth: RefCell<usize>,
}

/// Map an AST node to its deduced [`Value`]. Total and non-panicking:
/// recursion beyond [`MAX_DEPTH`] returns a well-formed `any`.
pub fn node_to_value(node: &ExprNode, resolver: &dyn ValueResolver) -> Value {
    let ctx = Ctx {
        resolver,
        depth: RefCell::new(0),
    };
    deduce(node, &ctx)
}

fn deduce(node: &ExprNode, ctx: &Ctx<'_>) -> Value {
    {
        let mut d = ctx.depth.borrow_mut();
        *d += 1;
        if *d > MAX_DEPTH {
            *d -= 1;
            return Value::any();
        }
    }
    let result = deduce_inner(node, ctx);
    *ctx.depth.borrow_mut() -= 1;
    result
}

fn deduce_inner(node: &ExprNode, ctx: &Ctx<'_>) -> Value {
    match &node.node {
        Expr::Null => leaf(node, TypeInfo::Null),
        Expr::True | Expr::False => leaf(node, TypeInfo::Boolean),
        Expr::Number(_) => leaf(node, TypeInfo::Number),
        Expr::Str(_) => leaf(node, TypeInfo::String),
        Expr::SelfExpr => resolve_named(node, ctx, "self"),
        Expr::Dollar => resolve_named(node, ctx, "$"),
        Expr::Var(name) => deduce_var(node, ctx, name),
        Expr::Array(items) => {
            let elem = infer_array_elem(items, ctx);
            leaf(node, TypeInfo::Array(elem.map(Box::new)))
        }
        Expr::ArrayComp { expr, .. } => {
            let elem = deduce(expr, ctx).type_;
            leaf(node, TypeInfo::Array(Some(Box::new(elem))))
        }
        Expr::Object(obj) => deduce_object(node, obj, ctx),
        Expr::ObjectComp { .. } => leaf(
            node,
            TypeInfo::Object {
                fields: None,
                all_fields_known: false,
                supers: Vec::new(),
            },
        ),
        Expr::Local { body, .. } => deduce(body, ctx).with_node(node),
        Expr::If { cond: _, then, or_else } => {
            let then_val = deduce(then, ctx);
            match or_else {
                Some(e) => {
                    let else_val = deduce(e, ctx);
                    if same_shape(&then_val.type_, &else_val.type_) {
                        then_val.with_node(node)
                    } else {
                        leaf(node, TypeInfo::Any)
                    }
                }
                None => then_val.with_node(node),
            }
        }
        Expr::Binary { op, lhs, rhs } => deduce_binary(node, *op, lhs, rhs, ctx),
        Expr::Unary { op, expr } => deduce_unary(node, *op, expr, ctx),
        Expr::Apply {
            target,
            positional,
            named,
        } => deduce_apply(node, target, positional, named, ctx),
        Expr::Function { params, body, .. } => deduce_function(node, params, body, ctx),
        Expr::Index { target, index } => deduce_index(node, target, index, ctx),
        Expr::Import { path } => deduce_import(node, ctx, path),
        Expr::ImportStr { .. } => leaf(node, TypeInfo::String),
        Expr::Error(_) => leaf(node, TypeInfo::Any),
        Expr::Assert { then, .. } => deduce(then, ctx).with_node(node),
        Expr::InSuper { .. } => leaf(node, TypeInfo::Any),
        Expr::Parens(inner) => deduce(inner, ctx).with_node(node),
        Expr::Error_ => Value::any(),
    }
}

fn leaf(node: &ExprNode, type_: TypeInfo) -> Value {
    Value {
        range: node.range.clone(),
        comment: Vec::new(),
        node: Some(node.clone()),
        type_,
        type_hint: None,
    }
}

fn same_shape(a: &TypeInfo, b: &TypeInfo) -> bool {
    a.kind_name() == b.kind_name()
}

fn resolve_named(node: &ExprNode, ctx: &Ctx<'_>, name: &str) -> Value {
    let vars = ctx.resolver.vars_at(node);
    if let Some(v) = vars.iter().find(|v| v.name.as_ref() == name) {
        if let Some(origin_node) = &v.node {
            return deduce(origin_node, ctx).with_node(node);
        }
    }
    leaf(node, TypeInfo::Any)
}

fn deduce_var(node: &ExprNode, ctx: &Ctx<'_>, name: &str) -> Value {
    if name == "std" {
        return stdlib::std_value().with_node(node);
    }
    let vars = ctx.resolver.vars_at(node);
    let Some(var) = vars.iter().find(|v| v.name.as_ref() == name) else {
        // `$std` is the only name with a built-in fallback when unbound;
        // everything else is an unresolved reference, typed `any`.
        return leaf(node, TypeInfo::Any);
    };
    match &var.origin {
        VariableOrigin::Param { function, index } => {
            if let Some(default) = &var.node {
                return deduce(default, ctx).with_node(node);
            }
            let hint = param_type_hint(function, *index, ctx);
            match hint {
                Some(hint_type) => {
                    let mut v = leaf(node, hint_type.clone());
                    v.type_hint = type_info_to_annotation(hint_type);
                    v
                }
                None => leaf(node, TypeInfo::Any),
            }
        }
        VariableOrigin::Std => stdlib::std_value().with_node(node),
        VariableOrigin::SelfObject | VariableOrigin::DollarObject => {
            match &var.node {
                Some(origin_node) => deduce(origin_node, ctx).with_node(node),
                None => leaf(node, TypeInfo::Any),
            }
        }
        VariableOrigin::Local | VariableOrigin::ObjectLocal => match &var.node {
            Some(origin_node) => deduce(origin_node, ctx).with_node(node),
            None => leaf(node, TypeInfo::Any),
        },
    }
}

/// Look up the `/*:T*/` annotation for parameter `index` of `function`
/// (an `Expr::Function` node), parsed into a [`TypeInfo`], for propagation
/// to unqualified references to a defaulted-less parameter.
fn param_type_hint(function: &ExprNode, index: usize, ctx: &Ctx<'_>) -> Option<TypeInfo> {
    let Expr::Function { params, .. } = &function.node else {
        return None;
    };
    let param = params.get(index)?;
    let offset = param.type_hint_offset?;
    let filename = function.range.as_ref().map(|r| r.filename.to_string())?;
    ctx.resolver.annotation_at(&filename, offset)
}

fn infer_array_elem(items: &[ExprNode], ctx: &Ctx<'_>) -> Option<TypeInfo> {
    if items.is_empty() {
        return None;
    }
    let first = deduce(&items[0], ctx).type_;
    let all_same = items
        .iter()
        .all(|i| same_shape(&deduce(i, ctx).type_, &first));
    if all_same { Some(first) } else { None }
}

fn deduce_object(node: &ExprNode, obj: &ast::ObjectNode, ctx: &Ctx<'_>) -> Value {
    let fields: Vec<FieldInfo> = obj
        .fields
        .iter()
        .map(|f| {
            let v = deduce(&f.value, ctx);
            FieldInfo {
                name: f.name.clone(),
                range: f.name_range.clone(),
                comment: v.comment.clone(),
                hidden: matches!(f.visibility, ast::Visibility::Hidden),
                type_: v.type_,
                type_hint: v.type_hint,
                origin_node: Some(f.value.clone()),
            }
        })
        .collect();
    leaf(
        node,
        TypeInfo::object(fields, obj.all_fields_known),
    )
}

fn deduce_binary(node: &ExprNode, op: BinaryOp, lhs: &ExprNode, rhs: &ExprNode, ctx: &Ctx<'_>) -> Value {
    match op {
        BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::And
        | BinaryOp::Or
        | BinaryOp::In => leaf(node, TypeInfo::Boolean),
        BinaryOp::Mod => {
            let l = deduce(lhs, ctx);
            if matches!(l.type_, TypeInfo::String) {
                leaf(node, TypeInfo::String)
            } else {
                leaf(node, TypeInfo::Number)
            }
        }
        BinaryOp::Add => {
            let l = deduce(lhs, ctx);
            let r = deduce(rhs, ctx);
            match (&l.type_, &r.type_) {
                (
                    TypeInfo::Object { .. },
                    TypeInfo::Object {
                        fields,
                        all_fields_known,
                        supers,
                    },
                ) => {
                    let mut new_supers = supers.clone();
                    new_supers.push(Rc::new(l.clone()));
                    leaf(
                        node,
                        TypeInfo::Object {
                            fields: fields.clone(),
                            all_fields_known: *all_fields_known,
                            supers: new_supers,
                        },
                    )
                }
                (TypeInfo::String, TypeInfo::String) => leaf(node, TypeInfo::String),
                (TypeInfo::Number, TypeInfo::Number) => leaf(node, TypeInfo::Number),
                (TypeInfo::Array(a), TypeInfo::Array(b)) if same_shape_opt(a, b) => {
                    leaf(node, TypeInfo::Array(a.clone().or_else(|| b.clone())))
                }
                _ => leaf(node, TypeInfo::Any),
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => leaf(node, TypeInfo::Number),
        BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::Shl
        | BinaryOp::Shr => leaf(node, TypeInfo::Number),
    }
}

fn same_shape_opt(a: &Option<Box<TypeInfo>>, b: &Option<Box<TypeInfo>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_shape(a, b),
        _ => true,
    }
}

fn deduce_unary(node: &ExprNode, op: UnaryOp, expr: &ExprNode, ctx: &Ctx<'_>) -> Value {
    match op {
        UnaryOp::Not => leaf(node, TypeInfo::Boolean),
        UnaryOp::Neg | UnaryOp::Pos | UnaryOp::BitNot => {
            let _ = deduce(expr, ctx);
            leaf(node, TypeInfo::Number)
        }
    }
}

fn deduce_function(node: &ExprNode, params: &[ast::Param], body: &ExprNode, ctx: &Ctx<'_>) -> Value {
    let filename = node
        .range
        .as_ref()
        .map(|r| r.filename.to_string())
        .unwrap_or_default();
    let param_infos: Vec<ParamInfo> = params
        .iter()
        .map(|p| {
            let type_hint = p
                .type_hint_offset
                .and_then(|off| ctx.resolver.annotation_at(&filename, off))
                .and_then(type_info_to_annotation);
            ParamInfo {
                name: p.name.clone(),
                type_hint,
                has_default: p.default.is_some(),
            }
        })
        .collect();

    let return_hint_annotated = match &node.node {
        Expr::Function {
            return_hint_offset: Some(off),
            ..
        } => ctx.resolver.annotation_at(&filename, *off),
        _ => None,
    };
    let return_hint = Some(Box::new(
        return_hint_annotated.unwrap_or_else(|| deduce(body, ctx).type_),
    ));
    leaf(
        node,
        TypeInfo::Function {
            params: param_infos,
            return_hint,
        },
    )
}

/// Best-effort reverse mapping from a resolved `TypeInfo` back to the
/// `AnnotationType` surface stored on `ParamInfo`, used when a resolver
/// hands back an already-parsed hint. Structural types round-trip losslessly
/// for every shape the annotation grammar can produce.
fn type_info_to_annotation(t: TypeInfo) -> Option<AnnotationType> {
    Some(match t {
        TypeInfo::String => AnnotationType::String,
        TypeInfo::Number => AnnotationType::Number,
        TypeInfo::Boolean => AnnotationType::Boolean,
        TypeInfo::Null => AnnotationType::Null,
        TypeInfo::TypeParameter(c) => AnnotationType::TypeParam(c),
        TypeInfo::Array(e) => {
            AnnotationType::Array(e.and_then(|e| type_info_to_annotation(*e)).map(Box::new))
        }
        TypeInfo::Object { .. } => AnnotationType::Object(None),
        TypeInfo::Function {
            params,
            return_hint,
        } => AnnotationType::Function {
            params: params
                .into_iter()
                .map(|p| crate::annotation::FParam {
                    name: p.name,
                    type_: p.type_hint,
                })
                .collect(),
            return_type: return_hint.and_then(|h| type_info_to_annotation(*h)).map(Box::new),
        },
        TypeInfo::HintError(_) => return None,
        TypeInfo::Union(members) => {
            AnnotationType::Union(members.into_iter().filter_map(type_info_to_annotation).collect())
        }
        TypeInfo::Any => return None,
    })
}

fn deduce_apply(
    node: &ExprNode,
    target: &ExprNode,
    positional: &[ExprNode],
    named: &[(Rc<str>, ExprNode)],
    ctx: &Ctx<'_>,
) -> Value {
    let target_val = deduce(target, ctx);
    let TypeInfo::Function { params, return_hint } = &target_val.type_ else {
        return leaf(node, TypeInfo::Any);
    };

    let has_type_param = return_hint
        .as_ref()
        .is_some_and(|h| contains_type_param(h));
    if !has_type_param {
        let hint = return_hint.as_ref().map(|h| (**h).clone()).unwrap_or(TypeInfo::Any);
        return leaf(node, hint);
    }

    // Generic inference: unify declared parameter types with argument
    // types, then substitute into the return hint.
    let mut subst: HashMap<char, TypeInfo> = HashMap::new();
    let mut conflict = false;
    for (i, arg) in positional.iter().enumerate() {
        if let Some(decl) = params.get(i) {
            let declared = decl
                .type_hint
                .as_ref()
                .map(annotation_to_type_info)
                .unwrap_or(TypeInfo::Any);
            let arg_type = deduce(arg, ctx).type_;
            unify::unify_into(&declared, &arg_type, &mut subst, &mut conflict);
        }
    }
    for (name, arg) in named {
        if let Some(decl) = params.iter().find(|p| &p.name == name) {
            let declared = decl
                .type_hint
                .as_ref()
                .map(annotation_to_type_info)
                .unwrap_or(TypeInfo::Any);
            let arg_type = deduce(arg, ctx).type_;
            unify::unify_into(&declared, &arg_type, &mut subst, &mut conflict);
        }
    }

    if conflict {
        return leaf(node, TypeInfo::HintError("conflicting-inferences".into()));
    }
    let substituted = return_hint
        .as_ref()
        .map(|h| unify::substitute(h, &subst))
        .unwrap_or(TypeInfo::Any);
    let mut value = leaf(node, substituted);
    value.type_hint = type_info_to_annotation(value.type_.clone());
    value
}

fn contains_type_param(t: &TypeInfo) -> bool {
    match t {
        TypeInfo::TypeParameter(_) => true,
        TypeInfo::Array(Some(e)) => contains_type_param(e),
        TypeInfo::Function { params: _, return_hint } => {
            return_hint.as_ref().is_some_and(|h| contains_type_param(h))
        }
        TypeInfo::Union(members) => members.iter().any(contains_type_param),
        _ => false,
    }
}

fn deduce_index(node: &ExprNode, target: &ExprNode, index: &IndexKind, ctx: &Ctx<'_>) -> Value {
    let target_val = deduce(target, ctx);
    match (&target_val.type_, index) {
        (TypeInfo::Array(elem), IndexKind::Expr(idx_expr)) => {
            if let Expr::Number(_) = idx_expr.node {
                leaf(node, elem.as_ref().map(|e| (**e).clone()).unwrap_or(TypeInfo::Any))
            } else {
                leaf(node, TypeInfo::Any)
            }
        }
        (TypeInfo::Object { .. }, IndexKind::Field(name)) => {
            match target_val.type_.lookup_field(name) {
                Some(f) => Value {
                    range: f.range,
                    comment: f.comment,
                    node: f.origin_node,
                    type_: f.type_,
                    type_hint: f.type_hint,
                },
                None => leaf(node, TypeInfo::Any),
            }
        }
        (TypeInfo::Object { .. }, IndexKind::Expr(idx_expr)) => {
            if let Expr::Str(name) = &idx_expr.node {
                match target_val.type_.lookup_field(name) {
                    Some(f) => Value {
                        range: f.range,
                        comment: f.comment,
                        node: f.origin_node,
                        type_: f.type_,
                        type_hint: f.type_hint,
                    },
                    None => leaf(node, TypeInfo::Any),
                }
            } else {
                leaf(node, TypeInfo::Any)
            }
        }
        _ => leaf(node, TypeInfo::Any),
    }
}

fn deduce_import(node: &ExprNode, ctx: &Ctx<'_>, path: &str) -> Value {
    let filename = node
        .range
        .as_ref()
        .map(|r| r.filename.to_string())
        .unwrap_or_default();
    match ctx.resolver.import(&filename, path) {
        Some(imported_root) => {
            let (trailing, _binds) = walker::unwind_locals(&imported_root);
            deduce(&trailing, ctx).with_node(node)
        }
        None => leaf(node, TypeInfo::Any),
    }
}

/// Parse a parameter's `/*:T*/` annotation comment, if present, into a
/// [`TypeInfo`] via [`annotation::parse`]. Failures become `HintError`.
pub fn parse_type_hint(body: &str) -> TypeInfo {
    match annotation::parse(body) {
        Ok(ty) => annotation_to_type_info(&ty),
        Err(e) => TypeInfo::HintError(e.message),
    }
}

pub(crate) fn annotation_to_type_info(ty: &AnnotationType) -> TypeInfo {
    match ty {
        AnnotationType::String => TypeInfo::String,
        AnnotationType::Number => TypeInfo::Number,
        AnnotationType::Boolean => TypeInfo::Boolean,
        AnnotationType::Null => TypeInfo::Null,
        AnnotationType::TypeParam(c) => TypeInfo::TypeParameter(*c),
        AnnotationType::Named(_) => TypeInfo::Any,
        AnnotationType::Array(e) => {
            TypeInfo::Array(e.as_ref().map(|e| Box::new(annotation_to_type_info(e))))
        }
        AnnotationType::Object(_) => TypeInfo::Object {
            fields: None,
            all_fields_known: false,
            supers: Vec::new(),
        },
        AnnotationType::Function {
            params,
            return_type,
        } => TypeInfo::Function {
            params: params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    type_hint: p.type_.clone(),
                    has_default: false,
                })
                .collect(),
            return_hint: return_type
                .as_ref()
                .map(|t| Box::new(annotation_to_type_info(t))),
        },
        AnnotationType::ObjectLiteral(params) => TypeInfo::object(
            params
                .iter()
                .map(|p| FieldInfo {
                    name: p.name.clone(),
                    range: None,
                    comment: Vec::new(),
                    hidden: false,
                    type_: annotation_to_type_info(&p.type_),
                    type_hint: Some(p.type_.clone()),
                    origin_node: None,
                })
                .collect(),
            true,
        ),
        AnnotationType::Union(members) => {
            TypeInfo::Union(members.iter().map(annotation_to_type_info).collect())
        }
    }
}

/// Generic unification over `TypeInfo`. Kept private to this module since
/// calling code never needs substitution internals.
mod unify {
    use super::TypeInfo;
    use std::collections::HashMap;

    pub fn unify_into(
        declared: &TypeInfo,
        actual: &TypeInfo,
        subst: &mut HashMap<char, TypeInfo>,
        conflict: &mut bool,
    ) {
        match declared {
            TypeInfo::TypeParameter(c) => {
                if let Some(existing) = subst.get(c) {
                    if !type_text_eq(existing, actual) {
                        *conflict = true;
                    }
                } else {
                    subst.insert(*c, actual.clone());
                }
            }
            TypeInfo::Array(Some(d_elem)) => {
                if let TypeInfo::Array(Some(a_elem)) = actual {
                    unify_into(d_elem, a_elem, subst, conflict);
                }
            }
            TypeInfo::Function {
                params: d_params,
                return_hint: d_ret,
            } => {
                if let TypeInfo::Function {
                    params: a_params,
                    return_hint: a_ret,
                } = actual
                {
                    for (dp, ap) in d_params.iter().zip(a_params.iter()) {
                        if let (Some(dh), _) = (&dp.type_hint, &ap.type_hint) {
                            let dh_info = super::annotation_to_type_info(dh);
                            unify_into(&dh_info, &a_params_hint(ap), subst, conflict);
                        }
                    }
                    if let (Some(d), Some(a)) = (d_ret, a_ret) {
                        unify_into(d, a, subst, conflict);
                    }
                }
            }
            _ => {}
        }
    }

    fn a_params_hint(p: &super::ParamInfo) -> TypeInfo {
        p.type_hint
            .as_ref()
            .map(super::annotation_to_type_info)
            .unwrap_or(TypeInfo::Any)
    }

    fn type_text_eq(a: &TypeInfo, b: &TypeInfo) -> bool {
        a.kind_name() == b.kind_name()
    }

    /// Substitute solved type parameters into `t`; unresolved parameters
    /// become `HintError("unresolved")`.
    pub fn substitute(t: &TypeInfo, subst: &HashMap<char, TypeInfo>) -> TypeInfo {
        match t {
            TypeInfo::TypeParameter(c) => subst
                .get(c)
                .cloned()
                .unwrap_or_else(|| TypeInfo::HintError("unresolved".into())),
            TypeInfo::Array(Some(e)) => TypeInfo::Array(Some(Box::new(substitute(e, subst)))),
            TypeInfo::Function {
                params,
                return_hint,
            } => TypeInfo::Function {
                params: params.clone(),
                return_hint: return_hint
                    .as_ref()
                    .map(|h| Box::new(substitute(h, subst))),
            },
            TypeInfo::Union(members) => {
                TypeInfo::Union(members.iter().map(|m| substitute(m, subst)).collect())
            }
            other => other.clone(),
        }
    }
}

/// Structural sub-typing check used by the linter: `expected.accepts(&actual)`.
pub fn type_accepts(expected: &TypeInfo, actual: &TypeInfo) -> bool {
    match (expected, actual) {
        (TypeInfo::Any, _) | (_, TypeInfo::Any) => true,
        (TypeInfo::Union(members), _) => members.iter().any(|m| type_accepts(m, actual)),
        (_, TypeInfo::Union(members)) => members.iter().all(|m| type_accepts(expected, m)),
        (TypeInfo::Array(e1), TypeInfo::Array(e2)) => match (e1, e2) {
            (Some(e1), Some(e2)) => type_accepts(e1, e2),
            _ => true,
        },
        (TypeInfo::Object { .. }, TypeInfo::Object { .. }) => true,
        (
            TypeInfo::Function {
                params: p1,
                return_hint: r1,
            },
            TypeInfo::Function {
                params: p2,
                return_hint: r2,
            },
        ) => {
            p1.len() == p2.len()
                && match (r1, r2) {
                    (Some(a), Some(b)) => type_accepts(a, b),
                    _ => true,
                }
        }
        (a, b) => a.kind_name() == b.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jparser;
    use std::cell::RefCell as StdRefCell;

    struct NullResolver {
        root: StdRefCell<Option<ExprNode>>,
    }

    impl ValueResolver for NullResolver {
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

    fn eval(src: &str) -> (ExprNode, Value) {
        let ast = jparser::parse("t.jsonnet", src).ast.unwrap();
        let resolver = NullResolver {
            root: StdRefCell::new(Some(ast.clone())),
        };
        let mut target = ast.clone();
        // default: deduce whole root
        let v = node_to_value(&ast, &resolver);
        target = ast;
        (target, v)
    }

    #[test]
    fn literal_types() {
        let (_, v) = eval("1");
        assert!(matches!(v.type_, TypeInfo::Number));
        let (_, v) = eval("\"x\"");
        assert!(matches!(v.type_, TypeInfo::String));
        let (_, v) = eval("null");
        assert!(matches!(v.type_, TypeInfo::Null));
    }

    #[test]
    fn object_plus_tracks_supers() {
        let (_, v) = eval("{a: 1} + {b: 2}");
        match v.type_ {
            TypeInfo::Object { supers, .. } => assert_eq!(supers.len(), 1),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn array_literal_elem_type() {
        let (_, v) = eval("[1, 2, 3]");
        match v.type_ {
            TypeInfo::Array(Some(elem)) => assert!(matches!(*elem, TypeInfo::Number)),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
