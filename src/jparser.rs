//! Recursive-descent parser for Jsonnet: turns a [`crate::lexer`] token
//! stream into the [`crate::ast`] tree.
//!
//! A first-party, hand-rolled parser rather than a dependency, preferring
//! small explicit parsers over combinator crates (the same posture
//! [`crate::discover`] takes for glob matching). It is deliberately a
//! faithful but non-exhaustive subset of Jsonnet — precisely what the
//! scope walker, type deducer, recovery shim, and linter need.

use std::rc::Rc;

use crate::ast::{
    BinaryOp, Bind, Comment, Expr, ExprNode, ForSpec, IndexKind, ObjectField, ObjectNode, Param,
    Range, Spanned, UnaryOp, Visibility,
};
use crate::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub range: Range,
}

pub struct ParseOutcome {
    pub ast: Option<ExprNode>,
    pub error: Option<ParseError>,
    pub comments: Vec<Comment>,
}

/// Parse `source`. Never panics: a syntax error is reported through
/// `ParseOutcome::error` and `ast` is `None`.
pub fn parse(filename: &str, source: &str) -> ParseOutcome {
    let lexed = match lexer::lex(filename, source) {
        Ok(l) => l,
        Err(e) => {
            return ParseOutcome {
                ast: None,
                error: Some(ParseError {
                    message: e.message,
                    range: e.range,
                }),
                comments: Vec::new(),
            };
        }
    };
    let mut p = Parser {
        tokens: lexed.tokens,
        pos: 0,
    };
    match p.parse_program() {
        Ok(ast) => ParseOutcome {
            ast: Some(ast),
            error: None,
            comments: lexed.comments,
        },
        Err(e) => ParseOutcome {
            ast: None,
            error: Some(e),
            comments: lexed.comments,
        },
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_byte(&self) -> usize {
        self.cur().byte_start
    }

    fn bump(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            range: self.cur().range.clone(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind) {
            Ok(self.bump())
        } else {
            Err(self.err(format!(
                "expected {:?}, found {:?}",
                kind,
                self.cur().kind
            )))
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident_text(&self) -> Option<Rc<str>> {
        match &self.cur().kind {
            TokenKind::Ident(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn spanned(&self, begin_tok: &Token, node: Expr) -> ExprNode {
        let range = Some(Range {
            filename: begin_tok.range.filename.clone(),
            begin: begin_tok.range.begin,
            end: self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
                .range
                .end,
        });
        Rc::new(Spanned::new(range, node))
    }

    fn parse_program(&mut self) -> PResult<ExprNode> {
        let expr = self.parse_expr()?;
        if !matches!(self.cur().kind, TokenKind::Eof) {
            return Err(self.err(format!("unexpected trailing token {:?}", self.cur().kind)));
        }
        Ok(expr)
    }

    // Precedence, low to high:
    // 1: ||
    // 2: &&
    // 3: |
    // 4: ^
    // 5: &
    // 6: == !=
    // 7: in
    // 8: < <= > >=
    // 9: << >>
    // 10: + -
    // 11: * / %
    // unary, then postfix application/indexing, then primary.

    fn parse_expr(&mut self) -> PResult<ExprNode> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_and()?;
        while self.at(&TokenKind::OrOr) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::Or,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_bitor()?;
        while self.at(&TokenKind::AndAnd) {
            self.bump();
            let rhs = self.parse_bitor()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::And,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_bitxor()?;
        while self.at(&TokenKind::Pipe) {
            self.bump();
            let rhs = self.parse_bitxor()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::BitOr,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_bitand()?;
        while self.at(&TokenKind::Caret) {
            self.bump();
            let rhs = self.parse_bitand()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::BitXor,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_eq()?;
        while self.at(&TokenKind::Amp) {
            self.bump();
            let rhs = self.parse_eq()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::BitAnd,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_in()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_in()?;
            lhs = self.spanned(&begin, Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_in(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_cmp()?;
        while self.at(&TokenKind::KwIn) {
            self.bump();
            let rhs = self.parse_cmp()?;
            lhs = self.spanned(
                &begin,
                Expr::Binary {
                    op: BinaryOp::In,
                    lhs,
                    rhs,
                },
            );
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_shift()?;
            lhs = self.spanned(&begin, Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_add()?;
            lhs = self.spanned(&begin, Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_mul()?;
            lhs = self.spanned(&begin, Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = self.spanned(&begin, Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let op = match self.cur().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let expr = self.parse_unary()?;
            return Ok(self.spanned(&begin, Expr::Unary { op, expr }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        let mut expr = self.parse_primary()?;
        loop {
            match self.cur().kind {
                TokenKind::Dot => {
                    self.bump();
                    let name = self
                        .ident_text()
                        .ok_or_else(|| self.err("expected field name after '.'"))?;
                    self.bump();
                    expr = self.spanned(
                        &begin,
                        Expr::Index {
                            target: expr,
                            index: IndexKind::Field(name),
                        },
                    );
                }
                TokenKind::LBracket => {
                    self.bump();
                    // Slices are not part of this subset; a single index
                    // expression is required.
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = self.spanned(
                        &begin,
                        Expr::Index {
                            target: expr,
                            index: IndexKind::Expr(index),
                        },
                    );
                }
                TokenKind::LParen => {
                    let (positional, named) = self.parse_args()?;
                    expr = self.spanned(
                        &begin,
                        Expr::Apply {
                            target: expr,
                            positional,
                            named,
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> PResult<(Vec<ExprNode>, Vec<(Rc<str>, ExprNode)>)> {
        self.expect(&TokenKind::LParen)?;
        let mut positional = Vec::new();
        let mut named = Vec::new();
        while !self.at(&TokenKind::RParen) {
            // `name=expr` named argument: lookahead for IDENT '='.
            if let TokenKind::Ident(name) = self.cur().kind.clone() {
                let save = self.pos;
                self.bump();
                if self.eat(&TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    named.push((name, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
                self.pos = save;
            }
            let value = self.parse_expr()?;
            positional.push(value);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.eat(&TokenKind::KwTailstrict);
        self.expect(&TokenKind::RParen)?;
        Ok((positional, named))
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let name_tok = self.cur().clone();
            let name = self
                .ident_text()
                .ok_or_else(|| self.err("expected parameter name"))?;
            self.bump();
            let type_hint_offset = Some(self.cur_byte());
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param {
                name,
                range: Some(name_tok.range.clone()),
                default,
                type_hint_offset,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_bind(&mut self) -> PResult<Bind> {
        let name_tok = self.cur().clone();
        let name = self
            .ident_text()
            .ok_or_else(|| self.err("expected binding name"))?;
        self.bump();
        let params = if self.at(&TokenKind::LParen) {
            Some(self.parse_params()?)
        } else {
            None
        };
        self.expect(&TokenKind::Assign)?;
        let value_expr = self.parse_expr()?;
        let value = if let Some(params) = params.clone() {
            let range = value_expr.range.clone();
            Rc::new(Spanned::new(
                range,
                Expr::Function {
                    params,
                    body: value_expr,
                    return_hint_offset: None,
                },
            ))
        } else {
            value_expr
        };
        Ok(Bind {
            name,
            range: Some(name_tok.range),
            params,
            value,
        })
    }

    fn parse_forspec(&mut self) -> PResult<ForSpec> {
        self.expect(&TokenKind::KwFor)?;
        let var = self
            .ident_text()
            .ok_or_else(|| self.err("expected loop variable name"))?;
        self.bump();
        self.expect(&TokenKind::KwIn)?;
        let expr = self.parse_expr()?;
        Ok(ForSpec { var, expr })
    }

    fn parse_ifspecs(&mut self) -> PResult<Vec<ExprNode>> {
        let mut out = Vec::new();
        while self.at(&TokenKind::KwIf) {
            self.bump();
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    fn parse_primary(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        match self.cur().kind.clone() {
            TokenKind::KwNull => {
                self.bump();
                Ok(self.spanned(&begin, Expr::Null))
            }
            TokenKind::KwTrue => {
                self.bump();
                Ok(self.spanned(&begin, Expr::True))
            }
            TokenKind::KwFalse => {
                self.bump();
                Ok(self.spanned(&begin, Expr::False))
            }
            TokenKind::KwSelf => {
                self.bump();
                Ok(self.spanned(&begin, Expr::SelfExpr))
            }
            TokenKind::Dollar => {
                self.bump();
                Ok(self.spanned(&begin, Expr::Dollar))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(self.spanned(&begin, Expr::Number(n)))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(self.spanned(&begin, Expr::Str(s)))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(self.spanned(&begin, Expr::Var(name)))
            }
            TokenKind::KwSuper => {
                self.bump();
                if self.eat(&TokenKind::Dot) {
                    let name = self
                        .ident_text()
                        .ok_or_else(|| self.err("expected field name after 'super.'"))?;
                    let name_tok = self.cur().clone();
                    self.bump();
                    let key = self.spanned(&name_tok, Expr::Str(name));
                    Ok(self.spanned(&begin, Expr::InSuper { index: key }))
                } else if self.eat(&TokenKind::LBracket) {
                    let idx = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    Ok(self.spanned(&begin, Expr::InSuper { index: idx }))
                } else {
                    Err(self.err("expected '.' or '[' after 'super'"))
                }
            }
            TokenKind::KwImport => {
                self.bump();
                let path = self.parse_string_literal("import")?;
                Ok(self.spanned(&begin, Expr::Import { path }))
            }
            TokenKind::KwImportstr => {
                self.bump();
                let path = self.parse_string_literal("importstr")?;
                Ok(self.spanned(&begin, Expr::ImportStr { path }))
            }
            TokenKind::KwError => {
                self.bump();
                let expr = self.parse_expr()?;
                Ok(self.spanned(&begin, Expr::Error(expr)))
            }
            TokenKind::KwAssert => {
                self.bump();
                let cond = self.parse_expr()?;
                let msg = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Semicolon)?;
                let then = self.parse_expr()?;
                Ok(self.spanned(&begin, Expr::Assert { cond, msg, then }))
            }
            TokenKind::KwIf => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::KwThen)?;
                let then = self.parse_expr()?;
                let or_else = if self.eat(&TokenKind::KwElse) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(self.spanned(&begin, Expr::If { cond, then, or_else }))
            }
            TokenKind::KwLocal => {
                self.bump();
                let mut binds = vec![self.parse_bind()?];
                while self.eat(&TokenKind::Comma) {
                    binds.push(self.parse_bind()?);
                }
                self.expect(&TokenKind::Semicolon)?;
                let body = self.parse_expr()?;
                Ok(self.spanned(&begin, Expr::Local { binds, body }))
            }
            TokenKind::KwFunction => {
                self.bump();
                let params = self.parse_params()?;
                let return_hint_offset = Some(self.cur_byte());
                let body = self.parse_expr()?;
                Ok(self.spanned(
                    &begin,
                    Expr::Function {
                        params,
                        body,
                        return_hint_offset,
                    },
                ))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(self.spanned(&begin, Expr::Parens(inner)))
            }
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LBrace => self.parse_object(),
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_string_literal(&mut self, context: &str) -> PResult<Rc<str>> {
        match self.cur().kind.clone() {
            TokenKind::Str(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(self.err(format!("expected string literal after '{context}'"))),
        }
    }

    fn parse_array(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        self.expect(&TokenKind::LBracket)?;
        if self.eat(&TokenKind::RBracket) {
            return Ok(self.spanned(&begin, Expr::Array(Vec::new())));
        }
        let first = self.parse_expr()?;
        if self.at(&TokenKind::KwFor) {
            let forspec = self.parse_forspec()?;
            let ifspecs = self.parse_ifspecs()?;
            self.expect(&TokenKind::RBracket)?;
            return Ok(self.spanned(
                &begin,
                Expr::ArrayComp {
                    expr: first,
                    forspec,
                    ifspecs,
                },
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(self.spanned(&begin, Expr::Array(items)))
    }

    fn parse_object(&mut self) -> PResult<ExprNode> {
        let begin = self.cur().clone();
        self.expect(&TokenKind::LBrace)?;

        // Object comprehension: `{ [k]: v for x in e ... }` or with locals
        // preceding. We detect it by scanning: if the first field-like item
        // is `[expr]: expr` immediately followed (after any locals) by
        // `for`, it's a comprehension.
        let mut locals = Vec::new();
        while self.at(&TokenKind::KwLocal) {
            self.bump();
            locals.push(self.parse_bind()?);
            self.eat(&TokenKind::Comma);
        }

        if self.at(&TokenKind::RBrace) {
            self.bump();
            return Ok(self.spanned(
                &begin,
                Expr::Object(ObjectNode {
                    locals,
                    fields: Vec::new(),
                    all_fields_known: true,
                }),
            ));
        }

        // Comprehension form starts with `[`.
        if self.at(&TokenKind::LBracket) {
            let save = self.pos;
            self.bump();
            let key = self.parse_expr();
            if let Ok(key) = key
                && self.eat(&TokenKind::RBracket)
                && self.eat(&TokenKind::Colon)
            {
                let value = self.parse_expr()?;
                self.eat(&TokenKind::Comma);
                if self.at(&TokenKind::KwFor) {
                    let forspec = self.parse_forspec()?;
                    let ifspecs = self.parse_ifspecs()?;
                    self.expect(&TokenKind::RBrace)?;
                    return Ok(self.spanned(
                        &begin,
                        Expr::ObjectComp {
                            key,
                            value,
                            forspec,
                            ifspecs,
                        },
                    ));
                }
            }
            self.pos = save;
        }

        let mut fields = Vec::new();
        loop {
            if self.at(&TokenKind::RBrace) {
                break;
            }
            if self.at(&TokenKind::KwLocal) {
                self.bump();
                locals.push(self.parse_bind()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }
            fields.push(self.parse_object_field()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(self.spanned(
            &begin,
            Expr::Object(ObjectNode {
                locals,
                fields,
                all_fields_known: true,
            }),
        ))
    }

    fn parse_object_field(&mut self) -> PResult<ObjectField> {
        let name_tok = self.cur().clone();
        let name = match self.cur().kind.clone() {
            TokenKind::Ident(s) => {
                self.bump();
                s
            }
            TokenKind::Str(s) => {
                self.bump();
                s
            }
            other => return Err(self.err(format!("expected field name, found {other:?}"))),
        };

        // Method-sugar field: `name(params): value`.
        let params = if self.at(&TokenKind::LParen) {
            Some(self.parse_params()?)
        } else {
            None
        };

        let visibility = if self.eat(&TokenKind::ColonColonColon) {
            Visibility::ForceVisible
        } else if self.eat(&TokenKind::ColonColon) {
            Visibility::Hidden
        } else {
            self.expect(&TokenKind::Colon)?;
            Visibility::Visible
        };

        let doc_offset = Some(self.cur_byte());
        let value_expr = self.parse_expr()?;
        let value = if let Some(params) = params {
            let range = value_expr.range.clone();
            Rc::new(Spanned::new(
                range,
                Expr::Function {
                    params,
                    body: value_expr,
                    return_hint_offset: None,
                },
            ))
        } else {
            value_expr
        };

        Ok(ObjectField {
            name,
            name_range: Some(name_tok.range),
            visibility,
            value,
            doc_offset,
        })
    }
}
