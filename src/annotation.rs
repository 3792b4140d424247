//! Type-annotation comment lexer/parser.
//!
//! Parses the body of a `/*: ... */` comment into an [`AnnotationType`].
//! Grounded in the same hand-rolled-recursive-descent style as
//! [`crate::jparser`] — this is a much smaller grammar, so lexer and
//! parser share one pass instead of living in separate modules.

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationType {
    String,
    Number,
    Boolean,
    Null,
    /// A single uppercase-letter type parameter, e.g. `T`.
    TypeParam(char),
    /// A dotted variable reference, e.g. `foo.bar`. Resolved against scope
    /// by the deducer; must name an object or it surfaces as a `HintError`.
    Named(Vec<Rc<str>>),
    Array(Option<Box<AnnotationType>>),
    Object(Option<Box<AnnotationType>>),
    Function {
        params: Vec<FParam>,
        return_type: Option<Box<AnnotationType>>,
    },
    /// `{ name: type, ... }` object-shape literal.
    ObjectLiteral(Vec<OParam>),
    /// Flat n-ary union; members are never themselves unions or type
    /// parameters (enforced at parse time).
    Union(Vec<AnnotationType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FParam {
    pub name: Rc<str>,
    pub type_: Option<AnnotationType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OParam {
    pub name: Rc<str>,
    pub type_: AnnotationType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationError {
    pub message: String,
}

impl AnnotationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse an annotation body (the trimmed text between `/*:` and `*/`).
///
/// Takes a fast path for the handful of literal annotations that dominate
/// real Jsonnet code, falling back to the full recursive-descent parser
/// otherwise.
pub fn parse(body: &str) -> Result<AnnotationType, AnnotationError> {
    if let Some(t) = fast_path(body) {
        return Ok(t);
    }
    let tokens = lex(body)?;
    let mut p = Parser { tokens, pos: 0 };
    let ty = p.parse_type()?;
    p.expect_eof()?;
    Ok(ty)
}

fn fast_path(body: &str) -> Option<AnnotationType> {
    match body {
        "string" => return Some(AnnotationType::String),
        "number" => return Some(AnnotationType::Number),
        "boolean" => return Some(AnnotationType::Boolean),
        "null" => return Some(AnnotationType::Null),
        "array" => return Some(AnnotationType::Array(None)),
        "object" => return Some(AnnotationType::Object(None)),
        "function" => {
            return Some(AnnotationType::Function {
                params: Vec::new(),
                return_type: None,
            });
        }
        _ => {}
    }
    if let Some(inner) = body.strip_prefix("array[").and_then(|s| s.strip_suffix(']')) {
        let inner = inner.trim();
        let elem = match inner {
            "string" => AnnotationType::String,
            "number" => AnnotationType::Number,
            "boolean" => AnnotationType::Boolean,
            "null" => AnnotationType::Null,
            _ => {
                let mut chars = inner.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_uppercase() => AnnotationType::TypeParam(c),
                    _ => return None,
                }
            }
        };
        return Some(AnnotationType::Array(Some(Box::new(elem))));
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(Rc<str>),
    Dot,
    Comma,
    Colon,
    Union,
    Arrow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

fn lex(body: &str) -> Result<Vec<Tok>, AnnotationError> {
    let bytes = body.as_bytes();
    let mut i = 0;
    let mut out = Vec::new();
    while i < bytes.len() {
        let c = bytes[i];
        if c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' {
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            out.push(Tok::Ident(Rc::from(&body[start..i])));
            continue;
        }
        match c {
            b'.' => {
                out.push(Tok::Dot);
                i += 1;
            }
            b',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            b':' => {
                out.push(Tok::Colon);
                i += 1;
            }
            b'|' => {
                out.push(Tok::Union);
                i += 1;
            }
            b'(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            b')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            b'[' => {
                out.push(Tok::LBracket);
                i += 1;
            }
            b']' => {
                out.push(Tok::RBracket);
                i += 1;
            }
            b'{' => {
                out.push(Tok::LBrace);
                i += 1;
            }
            b'}' => {
                out.push(Tok::RBrace);
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'>') => {
                out.push(Tok::Arrow);
                i += 2;
            }
            other => {
                return Err(AnnotationError::new(format!(
                    "unexpected character '{}' in type annotation",
                    other as char
                )));
            }
        }
    }
    out.push(Tok::Eof);
    Ok(out)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

type AResult<T> = Result<T, AnnotationError>;

impl Parser {
    fn cur(&self) -> &Tok {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Tok {
        let t = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> AResult<()> {
        if self.cur() == tok {
            self.bump();
            Ok(())
        } else {
            Err(AnnotationError::new(format!(
                "expected {:?}, found {:?}",
                tok,
                self.cur()
            )))
        }
    }

    fn expect_eof(&mut self) -> AResult<()> {
        if matches!(self.cur(), Tok::Eof) {
            Ok(())
        } else {
            Err(AnnotationError::new(format!(
                "unexpected trailing token {:?}",
                self.cur()
            )))
        }
    }

    fn ident(&mut self) -> AResult<Rc<str>> {
        match self.cur().clone() {
            Tok::Ident(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(AnnotationError::new(format!(
                "expected identifier, found {other:?}"
            ))),
        }
    }

    /// `type := hintNoUnion ( '|' hintNoUnion )*`
    fn parse_type(&mut self) -> AResult<AnnotationType> {
        let first = self.parse_hint_no_union()?;
        if !matches!(self.cur(), Tok::Union) {
            return Ok(first);
        }
        let mut members = vec![first];
        while matches!(self.cur(), Tok::Union) {
            self.bump();
            let member = self.parse_hint_no_union()?;
            if matches!(member, AnnotationType::TypeParam(_)) {
                return Err(AnnotationError::new(
                    "type parameters are not allowed inside a union",
                ));
            }
            members.push(member);
        }
        Ok(AnnotationType::Union(members))
    }

    fn parse_hint_no_union(&mut self) -> AResult<AnnotationType> {
        match self.cur().clone() {
            Tok::Ident(name) => {
                match name.as_ref() {
                    "string" => {
                        self.bump();
                        return Ok(AnnotationType::String);
                    }
                    "number" => {
                        self.bump();
                        return Ok(AnnotationType::Number);
                    }
                    "boolean" => {
                        self.bump();
                        return Ok(AnnotationType::Boolean);
                    }
                    "null" => {
                        self.bump();
                        return Ok(AnnotationType::Null);
                    }
                    "array" => {
                        self.bump();
                        return self.parse_bracketed_elem(AnnotationType::Array as fn(_) -> _);
                    }
                    "object" => {
                        self.bump();
                        return self.parse_bracketed_elem(AnnotationType::Object as fn(_) -> _);
                    }
                    "function" => {
                        self.bump();
                        return self.parse_function_type();
                    }
                    _ => {}
                }
                let mut chars = name.chars();
                if let (Some(c), None) = (chars.next(), chars.next())
                    && c.is_ascii_uppercase()
                {
                    self.bump();
                    return Ok(AnnotationType::TypeParam(c));
                }
                // Dotted identifier.
                self.bump();
                let mut parts = vec![name];
                while matches!(self.cur(), Tok::Dot) {
                    self.bump();
                    parts.push(self.ident()?);
                }
                Ok(AnnotationType::Named(parts))
            }
            Tok::LBrace => {
                self.bump();
                let mut params = Vec::new();
                if !matches!(self.cur(), Tok::RBrace) {
                    loop {
                        let name = self.ident()?;
                        self.expect(&Tok::Colon)?;
                        let type_ = self.parse_type()?;
                        params.push(OParam { name, type_ });
                        if matches!(self.cur(), Tok::Comma) {
                            self.bump();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(&Tok::RBrace)?;
                Ok(AnnotationType::ObjectLiteral(params))
            }
            other => Err(AnnotationError::new(format!(
                "unexpected token {other:?} in type annotation"
            ))),
        }
    }

    fn parse_bracketed_elem(
        &mut self,
        ctor: fn(Option<Box<AnnotationType>>) -> AnnotationType,
    ) -> AResult<AnnotationType> {
        if matches!(self.cur(), Tok::LBracket) {
            self.bump();
            let elem = self.parse_type()?;
            self.expect(&Tok::RBracket)?;
            Ok(ctor(Some(Box::new(elem))))
        } else {
            Ok(ctor(None))
        }
    }

    fn parse_function_type(&mut self) -> AResult<AnnotationType> {
        let mut params = Vec::new();
        if matches!(self.cur(), Tok::LParen) {
            self.bump();
            if !matches!(self.cur(), Tok::RParen) {
                loop {
                    let name = self.ident()?;
                    let type_ = if matches!(self.cur(), Tok::Colon) {
                        self.bump();
                        Some(self.parse_type()?)
                    } else {
                        None
                    };
                    params.push(FParam { name, type_ });
                    if matches!(self.cur(), Tok::Comma) {
                        self.bump();
                        continue;
                    }
                    break;
                }
            }
            self.expect(&Tok::RParen)?;
        }
        let return_type = if matches!(self.cur(), Tok::Arrow) {
            self.bump();
            Some(Box::new(self.parse_type()?))
        } else {
            None
        };
        Ok(AnnotationType::Function {
            params,
            return_type,
        })
    }
}

/// Pretty-print an annotation AST back to source form. Parsing the output
/// of this function must reproduce a structurally equal AST.
pub fn print(ty: &AnnotationType) -> String {
    match ty {
        AnnotationType::String => "string".to_string(),
        AnnotationType::Number => "number".to_string(),
        AnnotationType::Boolean => "boolean".to_string(),
        AnnotationType::Null => "null".to_string(),
        AnnotationType::TypeParam(c) => c.to_string(),
        AnnotationType::Named(parts) => parts.join("."),
        AnnotationType::Array(None) => "array".to_string(),
        AnnotationType::Array(Some(elem)) => format!("array[{}]", print(elem)),
        AnnotationType::Object(None) => "object".to_string(),
        AnnotationType::Object(Some(elem)) => format!("object[{}]", print(elem)),
        AnnotationType::Function {
            params,
            return_type,
        } => {
            let mut s = "function".to_string();
            if !params.is_empty() {
                let ps: Vec<String> = params
                    .iter()
                    .map(|p| match &p.type_ {
                        Some(t) => format!("{}: {}", p.name, print(t)),
                        None => p.name.to_string(),
                    })
                    .collect();
                s.push('(');
                s.push_str(&ps.join(", "));
                s.push(')');
            } else if return_type.is_some() {
                s.push_str("()");
            }
            if let Some(ret) = return_type {
                s.push_str(" -> ");
                s.push_str(&print(ret));
            }
            s
        }
        AnnotationType::ObjectLiteral(params) => {
            let ps: Vec<String> = params
                .iter()
                .map(|p| format!("{}: {}", p.name, print(&p.type_)))
                .collect();
            format!("{{{}}}", ps.join(", "))
        }
        AnnotationType::Union(members) => {
            members.iter().map(print).collect::<Vec<_>>().join(" | ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_literals() {
        assert_eq!(parse("string").unwrap(), AnnotationType::String);
        assert_eq!(parse("array").unwrap(), AnnotationType::Array(None));
        assert_eq!(
            parse("array[number]").unwrap(),
            AnnotationType::Array(Some(Box::new(AnnotationType::Number)))
        );
    }

    #[test]
    fn union_round_trip() {
        let ty = parse("number").unwrap();
        assert_eq!(print(&ty), "number");
        let ty = parse("string | null").unwrap();
        assert_eq!(
            ty,
            AnnotationType::Union(vec![AnnotationType::String, AnnotationType::Null])
        );
        assert_eq!(print(&ty), "string | null");
    }

    #[test]
    fn nested_array_union_round_trip() {
        let src = "array[object[number | string | null]]";
        let ty = parse(src).unwrap();
        let printed = print(&ty);
        let reparsed = parse(&printed).unwrap();
        assert_eq!(ty, reparsed);
    }

    #[test]
    fn generic_function_round_trip() {
        let src = "function(fn: function(elem: A) -> B, arr: array[A]) -> array[B]";
        let ty = parse(src).unwrap();
        let printed = print(&ty);
        let reparsed = parse(&printed).unwrap();
        assert_eq!(ty, reparsed);
    }

    #[test]
    fn type_param_forbidden_in_union() {
        assert!(parse("T | string").is_err());
    }

    #[test]
    fn dotted_name() {
        assert_eq!(
            parse("foo.bar").unwrap(),
            AnnotationType::Named(vec![Rc::from("foo"), Rc::from("bar")])
        );
    }
}
