//! Recursive-descent parser with precedence climbing.
//!
//! Statement and expression grammar follow the language reference: statements
//! are separated by newlines or `;`, `func name(...)` is sugar for binding a
//! closure, and `{` in expression position is disambiguated into an object
//! literal (`{ ident: ... }`), a parameter lambda (an `->` at the top brace
//! level), or a zero-argument lambda body. In statement position `{` always
//! opens a block.
//!
//! The parser reports running out of tokens as [`CompileErrorKind::UnexpectedEof`]
//! so the REPL can distinguish "keep typing" from a hard syntax error.

use crate::{
    ast::{
        AccessStep, ActionKind, AssignTarget, BinOp, Expr, FuncLit, Ident, Literal, Module,
        Pattern, Stmt, UnOp,
    },
    errors::{CompileError, CompileErrorKind, CompileResult},
    lexer::{Token, TokenKind, tokenize},
};

/// Parses source text into a [`Module`].
pub fn parse(src: &str) -> CompileResult<Module> {
    let tokens = tokenize(src)?;
    Parser::new(tokens).parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // tokenize always appends Eof, so indexing is clamped to it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: Option<&str>) -> CompileError {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Eof) {
            CompileError::new(CompileErrorKind::UnexpectedEof, token.pos)
        } else {
            CompileError::new(
                CompileErrorKind::UnexpectedToken {
                    expected: expected.map(str::to_owned),
                    got: token.kind.to_string(),
                },
                token.pos,
            )
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> CompileResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(Some(what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> CompileResult<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let pos = self.advance().pos;
                Ok(Ident::new(name, pos))
            }
            _ => Err(self.unexpected(Some(what))),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::NewLine) {
            self.advance();
        }
    }

    // ---------------------------------------------------------------------
    // statements

    fn parse_module(mut self) -> CompileResult<Module> {
        let stmts = self.parse_stmt_list(&TokenKind::Eof)?;
        Ok(Module::new(stmts))
    }

    /// Parses newline-separated statements until `terminator` (not consumed).
    fn parse_stmt_list(&mut self, terminator: &TokenKind) -> CompileResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(terminator) {
                break;
            }
            stmts.push(self.parse_stmt()?);
            // Each statement must be followed by a separator or the end of
            // the enclosing construct.
            if self.check(&TokenKind::NewLine) {
                self.skip_newlines();
            } else if !self.check(terminator) {
                return Err(self.unexpected(Some("end of statement")));
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        let pos = self.peek().pos;
        match self.peek_kind() {
            TokenKind::Say => self.parse_action(ActionKind::Say),
            TokenKind::Nudge => self.parse_action(ActionKind::Nudge),
            TokenKind::PicSave => self.parse_action(ActionKind::PicSave),
            TokenKind::PicSend => self.parse_action(ActionKind::PicSend),
            TokenKind::If => self.parse_if(),
            TokenKind::Init => {
                self.advance();
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Init { body, pos })
            }
            TokenKind::LBrace => {
                self.advance();
                let stmts = self.parse_stmt_list(&TokenKind::RBrace)?;
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(Stmt::Block { stmts, pos })
            }
            TokenKind::Func => self.parse_func_decl(),
            TokenKind::Return => {
                self.advance();
                let value = if self.stmt_boundary() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(Stmt::Return { value, pos })
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, pos })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue { pos })
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break { pos })
            }
            _ => self.parse_expr_or_assign(),
        }
    }

    /// Whether the current token ends a statement (no expression follows).
    fn stmt_boundary(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::NewLine | TokenKind::RBrace | TokenKind::Eof
        )
    }

    fn parse_action(&mut self, kind: ActionKind) -> CompileResult<Stmt> {
        let pos = self.advance().pos;
        let value = self.parse_expr()?;
        Ok(Stmt::Action { kind, value, pos })
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let pos = self.advance().pos;
        let cond = self.parse_expr()?;
        let then = Box::new(self.parse_stmt()?);
        // `else` may sit on the same line or after newlines; only commit to
        // skipping separators when an `else` actually follows.
        let saved = self.pos;
        self.skip_newlines();
        let otherwise = if self.eat(&TokenKind::Else) {
            self.skip_newlines();
            Some(Box::new(self.parse_stmt()?))
        } else {
            self.pos = saved;
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
            pos,
        })
    }

    fn parse_func_decl(&mut self) -> CompileResult<Stmt> {
        let pos = self.advance().pos;
        let name = self.expect_ident("function name")?;
        let func = self.parse_func_tail(pos)?;
        Ok(Stmt::FuncDecl { name, func, pos })
    }

    /// Parses `(params) STMT` after `func [name]`.
    fn parse_func_tail(&mut self, pos: usize) -> CompileResult<FuncLit> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                self.skip_newlines();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(FuncLit {
            params,
            body,
            pos,
            layout: None,
        })
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let pos = self.advance().pos;
        let pattern = self.parse_pattern()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iterable = self.parse_expr()?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            pattern,
            iterable,
            body,
            pos,
        })
    }

    fn parse_pattern(&mut self) -> CompileResult<Pattern> {
        let pos = self.peek().pos;
        if self.eat(&TokenKind::LBracket) {
            let mut patterns = Vec::new();
            self.skip_newlines();
            if !self.check(&TokenKind::RBracket) {
                loop {
                    patterns.push(self.parse_pattern()?);
                    self.skip_newlines();
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
            }
            self.expect(&TokenKind::RBracket, "']'")?;
            Ok(Pattern::List { patterns, pos })
        } else {
            Ok(Pattern::Ident(self.expect_ident("loop variable")?))
        }
    }

    fn parse_expr_or_assign(&mut self) -> CompileResult<Stmt> {
        let pos = self.peek().pos;
        let expr = self.parse_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Rem),
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.advance();
        let target = expr_to_target(expr)?;
        self.skip_newlines();
        let value = self.parse_expr()?;
        Ok(Stmt::Assign {
            target,
            op,
            value,
            pos,
        })
    }

    // ---------------------------------------------------------------------
    // expressions, lowest precedence first

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_in()
    }

    fn parse_in(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_or()?;
        while self.check(&TokenKind::In) {
            let pos = self.advance().pos;
            let rhs = self.parse_or()?;
            lhs = Expr::Binary {
                op: BinOp::In,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let pos = self.advance().pos;
            let rhs = self.parse_and()?;
            lhs = Expr::Or {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check(&TokenKind::And) {
            let pos = self.advance().pos;
            let rhs = self.parse_equality()?;
            lhs = Expr::And {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Not => UnOp::Not,
            TokenKind::Minus => UnOp::Neg,
            _ => return self.parse_postfix(),
        };
        let pos = self.advance().pos;
        let expr = Box::new(self.parse_unary()?);
        Ok(Expr::Unary { op, expr, pos })
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    let pos = self.advance().pos;
                    let name = self.expect_ident("attribute name")?;
                    expr = Expr::Access {
                        base: Box::new(expr),
                        step: Box::new(AccessStep::Attr {
                            name: name.name,
                            pos: name.pos,
                        }),
                        pos,
                    };
                }
                TokenKind::LBracket => {
                    let pos = self.advance().pos;
                    let step = self.parse_subscript()?;
                    expr = Expr::Access {
                        base: Box::new(expr),
                        step: Box::new(step),
                        pos,
                    };
                }
                TokenKind::LParen => {
                    let pos = self.advance().pos;
                    let mut args = Vec::new();
                    self.skip_newlines();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            self.skip_newlines();
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                            self.skip_newlines();
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses the inside of `[...]`: an index or a `begin:end` slice.
    fn parse_subscript(&mut self) -> CompileResult<AccessStep> {
        self.skip_newlines();
        let begin = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let step = if self.eat(&TokenKind::Colon) {
            self.skip_newlines();
            let end = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            AccessStep::Slice { begin, end }
        } else {
            let Some(index) = begin else {
                return Err(self.unexpected(Some("index expression")));
            };
            AccessStep::Index(index)
        };
        self.skip_newlines();
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(step)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let pos = self.peek().pos;
        match self.peek_kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Int(v),
                    pos,
                })
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Float(v),
                    pos,
                })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Str(s),
                    pos,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Bool(true),
                    pos,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Bool(false),
                    pos,
                })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Null,
                    pos,
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(Ident::new(name, pos)))
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let expr = self.parse_expr()?;
                self.skip_newlines();
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                self.skip_newlines();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        self.skip_newlines();
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Expr::ListLit { items, pos })
            }
            TokenKind::LBrace => self.parse_brace_expr(),
            TokenKind::Func => {
                self.advance();
                let func = self.parse_func_tail(pos)?;
                Ok(Expr::Lambda(func))
            }
            _ => Err(self.unexpected(Some("expression"))),
        }
    }

    /// Disambiguates `{` in expression position.
    ///
    /// `{ ident: ...` is an object literal; a `->` at the top brace level
    /// makes it a parameter lambda; anything else is a zero-argument lambda
    /// body. `{}` is the empty object.
    fn parse_brace_expr(&mut self) -> CompileResult<Expr> {
        let pos = self.advance().pos;
        if self.looks_like_object_literal() {
            return self.parse_object_literal(pos);
        }
        if self.brace_contains_arrow() {
            // parameter lambda: `{ a, b -> stmts }`
            let mut params = Vec::new();
            self.skip_newlines();
            if !self.check(&TokenKind::Arrow) {
                loop {
                    params.push(self.expect_ident("parameter name")?);
                    self.skip_newlines();
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
            }
            self.expect(&TokenKind::Arrow, "'->'")?;
            let body_pos = self.peek().pos;
            let stmts = self.parse_stmt_list(&TokenKind::RBrace)?;
            self.expect(&TokenKind::RBrace, "'}'")?;
            return Ok(Expr::Lambda(FuncLit {
                params,
                body: Box::new(Stmt::Block {
                    stmts,
                    pos: body_pos,
                }),
                pos,
                layout: None,
            }));
        }
        // zero-argument lambda body
        let body_pos = self.peek().pos;
        let stmts = self.parse_stmt_list(&TokenKind::RBrace)?;
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Lambda(FuncLit {
            params: Vec::new(),
            body: Box::new(Stmt::Block {
                stmts,
                pos: body_pos,
            }),
            pos,
            layout: None,
        }))
    }

    /// Lookahead: `IDENT :` (past newlines) right after the brace, or `}`.
    fn looks_like_object_literal(&self) -> bool {
        let mut i = self.pos;
        while matches!(self.tokens[i].kind, TokenKind::NewLine) {
            i += 1;
        }
        match &self.tokens[i].kind {
            TokenKind::RBrace => true,
            TokenKind::Ident(_) => matches!(self.tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::Colon)),
            _ => false,
        }
    }

    /// Lookahead: whether an `->` occurs at depth 1 of the brace just opened.
    fn brace_contains_arrow(&self) -> bool {
        let mut depth = 1usize;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => depth += 1,
                TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return false;
                    }
                }
                TokenKind::Arrow if depth == 1 => return true,
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_object_literal(&mut self, pos: usize) -> CompileResult<Expr> {
        let mut entries = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.expect_ident("object key")?;
                self.expect(&TokenKind::Colon, "':'")?;
                self.skip_newlines();
                let value = self.parse_expr()?;
                entries.push((key.name, value));
                self.skip_newlines();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::ObjectLit { entries, pos })
    }
}

/// Reinterprets a parsed expression as an assignment target.
fn expr_to_target(expr: Expr) -> CompileResult<AssignTarget> {
    match expr {
        Expr::Ident(ident) => Ok(AssignTarget::Ident(ident)),
        Expr::Access { pos, .. } => {
            // unwind the nested access chain into base + steps
            let mut steps = Vec::new();
            let mut cursor = expr;
            while let Expr::Access { base, step, .. } = cursor {
                steps.push(*step);
                cursor = *base;
            }
            steps.reverse();
            Ok(AssignTarget::Access {
                base: Box::new(cursor),
                steps,
                pos,
            })
        }
        Expr::ListLit { items, pos } => {
            let targets = items
                .into_iter()
                .map(expr_to_target)
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(AssignTarget::List { targets, pos })
        }
        other => Err(CompileError::new(
            CompileErrorKind::IllegalAssignmentTarget,
            other.pos(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Module {
        parse(src).unwrap()
    }

    #[test]
    fn statements_and_separators() {
        let module = parse_ok("a = 1; b = 2\nsay a + b");
        assert_eq!(module.stmts.len(), 3);
        assert!(matches!(module.stmts[2], Stmt::Action { kind: ActionKind::Say, .. }));
    }

    #[test]
    fn precedence_in_is_lowest() {
        let module = parse_ok("say 1 + 2 in list");
        let Stmt::Action { value, .. } = &module.stmts[0] else {
            panic!("expected action");
        };
        assert!(matches!(value, Expr::Binary { op: BinOp::In, .. }));
    }

    #[test]
    fn brace_forms() {
        // object literal
        let module = parse_ok("x = { content: 1, show: func() say this.content }");
        let Stmt::Assign { value, .. } = &module.stmts[0] else {
            panic!("expected assignment");
        };
        let Expr::ObjectLit { entries, .. } = value else {
            panic!("expected object literal, got {value:?}");
        };
        assert_eq!(entries[0].0, "content");
        assert!(matches!(entries[1].1, Expr::Lambda(_)));

        // parameter lambda
        let module = parse_ok("f = { a, b -> a + b }");
        let Stmt::Assign { value: Expr::Lambda(func), .. } = &module.stmts[0] else {
            panic!("expected lambda");
        };
        assert_eq!(func.params.len(), 2);

        // zero-argument lambda
        let module = parse_ok("f = { $0 % 2 == 0 }");
        let Stmt::Assign { value: Expr::Lambda(func), .. } = &module.stmts[0] else {
            panic!("expected lambda");
        };
        assert!(func.params.is_empty());

        // block in statement position
        let module = parse_ok("{ a = 1\n b = 2 }");
        assert!(matches!(module.stmts[0], Stmt::Block { .. }));
    }

    #[test]
    fn access_chain_target() {
        let module = parse_ok("a[1][1:3] = [5, 6]");
        let Stmt::Assign { target: AssignTarget::Access { steps, .. }, .. } = &module.stmts[0] else {
            panic!("expected access target");
        };
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[1], AccessStep::Slice { .. }));
    }

    #[test]
    fn destructuring_target() {
        let module = parse_ok("[a, b] = [[1, 2], [3]]");
        let Stmt::Assign { target: AssignTarget::List { targets, .. }, .. } = &module.stmts[0] else {
            panic!("expected list target");
        };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn if_else_and_loops() {
        let module = parse_ok(
            "for i in range(20) { j = i; while j < 20 { j += 1; if i*j == 221 { say i; break } } }",
        );
        assert_eq!(module.stmts.len(), 1);
        let Stmt::For { body, .. } = &module.stmts[0] else {
            panic!("expected for");
        };
        assert!(matches!(**body, Stmt::Block { .. }));

        let module = parse_ok("if a { say 1 } else if b { say 2 } else { say 3 }");
        let Stmt::If { otherwise: Some(otherwise), .. } = &module.stmts[0] else {
            panic!("expected if/else");
        };
        assert!(matches!(**otherwise, Stmt::If { .. }));
    }

    #[test]
    fn else_after_newline() {
        let module = parse_ok("if a { say 1 }\nelse { say 2 }");
        let Stmt::If { otherwise, .. } = &module.stmts[0] else {
            panic!("expected if");
        };
        assert!(otherwise.is_some());
    }

    #[test]
    fn func_decl_sugar() {
        let module = parse_ok("func fact(n) { if n <= 1 return 1\nreturn n * fact(n - 1) }");
        let Stmt::FuncDecl { name, func, .. } = &module.stmts[0] else {
            panic!("expected func decl");
        };
        assert_eq!(name.name, "fact");
        assert_eq!(func.params.len(), 1);
    }

    #[test]
    fn illegal_target_rejected() {
        let err = parse("1 + 2 = 3").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::IllegalAssignmentTarget);
    }

    #[test]
    fn unexpected_eof_is_distinct() {
        assert!(parse("if a {").unwrap_err().is_unexpected_eof());
        assert!(parse("x = [1, 2").unwrap_err().is_unexpected_eof());
        assert!(!parse("x = )").unwrap_err().is_unexpected_eof());
    }

    #[test]
    fn for_destructuring_pattern() {
        let module = parse_ok("for [k, v] in obj { say k }");
        let Stmt::For { pattern: Pattern::List { patterns, .. }, .. } = &module.stmts[0] else {
            panic!("expected list pattern");
        };
        assert_eq!(patterns.len(), 2);
    }
}
