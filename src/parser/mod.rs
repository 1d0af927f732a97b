use crate::ast::*;
use crate::lexer::{self, Token};

/// Recursive-descent parser over the token stream produced by [`lexer::lex`].
///
/// Newlines separate statements. Inside `(`, `[` and `{` of an expression
/// they are insignificant, so long argument lists may wrap.
pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    nesting: usize,
    depth: usize,
}

/// Deepest expression or block nesting accepted before parsing fails with
/// P015 instead of exhausting the stack.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse a single expression from source text.
pub fn expression(source: &str) -> std::result::Result<Expr, crate::Error> {
    let mut parser = Parser::from_source(source)?;
    Ok(parser.parse_expression_only()?)
}

/// Parse a statement list from source text.
pub fn statements(source: &str) -> std::result::Result<Vec<Stmt>, crate::Error> {
    let mut parser = Parser::from_source(source)?;
    Ok(parser.parse_program()?)
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0, nesting: 0, depth: 0 }
    }

    pub fn from_source(source: &str) -> std::result::Result<Self, lexer::LexError> {
        let tokens = lexer::lex(source)?
            .into_iter()
            .map(|(t, r)| (t, Span::from(r)))
            .collect();
        Ok(Parser::new(tokens))
    }

    // ---- Token cursor ----

    /// Index of the next significant token.
    fn cursor(&self) -> usize {
        let mut i = self.pos;
        if self.nesting > 0 {
            while matches!(self.tokens.get(i), Some((Token::Newline, _))) {
                i += 1;
            }
        }
        i
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor()).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor() + offset).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.cursor()) {
            Some((_, s)) => *s,
            None => self.tokens.last().map(|(_, s)| Span { start: s.end, end: s.end }).unwrap_or_default(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let i = self.cursor();
        let tok = self.tokens.get(i).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos = i + 1;
        }
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("P001", format!("expected {:?}, got {:?}", expected, tok))),
            None => Err(self.error("P002", format!("expected {:?}, got end of input", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error("P003", format!("expected identifier, got {:?}", tok))),
            None => Err(self.error("P004", "expected identifier, got end of input".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.cursor(),
            span: self.peek_span(),
            message,
        }
    }

    fn at_end(&self) -> bool {
        self.cursor() >= self.tokens.len()
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Semi | Token::Newline)) {
            self.advance();
        }
    }

    fn with_nesting<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn descend<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("P015", format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ---- Statements ----

    /// Parse the whole input as a statement list.
    pub fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let stmts = self.parse_statements()?;
        if !self.at_end() {
            return Err(self.error("P005", format!("unexpected {:?} after statements", self.peek())));
        }
        Ok(stmts)
    }

    fn parse_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.at_end() && !self.check(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
            match self.peek() {
                None | Some(Token::RBrace) => break,
                Some(Token::Semi | Token::Newline) => self.skip_separators(),
                Some(tok) => {
                    return Err(self.error("P006", format!("expected ';' or newline between statements, got {:?}", tok)));
                }
            }
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        // Statement braces keep newlines significant.
        let saved = std::mem::replace(&mut self.nesting, 0);
        let result = self.descend(|p| p.parse_braced_statements());
        self.nesting = saved;
        result
    }

    fn parse_braced_statements(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&Token::LBrace)?;
        let body = self.parse_statements()?;
        self.expect(&Token::RBrace)?;
        Ok(body)
    }

    fn parse_paren_condition(&mut self) -> Result<Expr> {
        self.expect(&Token::LParen)?;
        let cond = self.with_nesting(|p| p.parse_expr())?;
        self.expect(&Token::RParen)?;
        Ok(cond)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.peek().cloned() {
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let condition = self.parse_paren_condition()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { condition, body })
            }
            Some(Token::For) => {
                self.advance();
                self.expect(&Token::LParen)?;
                let item = self.expect_ident()?;
                self.expect(&Token::In)?;
                let iterable = self.with_nesting(|p| p.parse_expr())?;
                self.expect(&Token::RParen)?;
                let body = self.parse_block()?;
                Ok(Stmt::ForEach { item, iterable, body })
            }
            Some(Token::Return) => {
                self.advance();
                let value = match self.peek() {
                    None | Some(Token::Semi | Token::Newline | Token::RBrace) => None,
                    Some(_) => Some(self.parse_expr()?),
                };
                Ok(Stmt::Return { value })
            }
            Some(Token::Break) => {
                self.advance();
                Ok(Stmt::Break)
            }
            Some(Token::Continue) => {
                self.advance();
                Ok(Stmt::Continue)
            }
            Some(Token::Delete) => {
                self.advance();
                let target = self.parse_expr()?;
                Ok(Stmt::Delete { target })
            }
            Some(Token::Ident(_)) => self.parse_assign_or_call(),
            Some(tok) => Err(self.error("P007", format!("expected statement, got {:?}", tok))),
            None => Err(self.error("P008", "expected statement, got end of input".into())),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect(&Token::If)?;
        let condition = self.parse_paren_condition()?;
        let then = self.parse_block()?;
        let otherwise = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If { condition, then, otherwise })
    }

    fn assign_op(tok: Option<&Token>) -> Option<Option<AssignOp>> {
        match tok {
            Some(Token::Assign) => Some(None),
            Some(Token::PlusAssign) => Some(Some(AssignOp::Add)),
            Some(Token::MinusAssign) => Some(Some(AssignOp::Sub)),
            Some(Token::StarAssign) => Some(Some(AssignOp::Mul)),
            Some(Token::SlashAssign) => Some(Some(AssignOp::Div)),
            _ => None,
        }
    }

    fn parse_assign_or_call(&mut self) -> Result<Stmt> {
        let scoped = matches!(self.peek_at(1), Some(Token::ColonColon));
        let op_offset = if scoped { 3 } else { 1 };
        if let Some(op) = Self::assign_op(self.peek_at(op_offset)) {
            let first = self.expect_ident()?;
            let (scope, target) = if scoped {
                self.advance();
                (Some(first), self.expect_ident()?)
            } else {
                (None, first)
            };
            self.advance();
            let value = self.parse_expr()?;
            return Ok(match op {
                None => Stmt::Assign { target, scope, value },
                Some(operator) => Stmt::CompoundAssign { target, scope, operator, value },
            });
        }

        let span = self.peek_span();
        match self.parse_expr()? {
            Expr::Call { function, args } => Ok(Stmt::Call { function, args }),
            other => Err(ParseError {
                code: "P009",
                position: self.cursor(),
                span,
                message: format!("expression of kind '{}' is not a statement", other.kind_name()),
            }),
        }
    }

    // ---- Expressions ----

    /// Parse the whole input as one expression.
    pub fn parse_expression_only(&mut self) -> Result<Expr> {
        self.skip_separators();
        let expr = self.parse_expr()?;
        self.skip_separators();
        if !self.at_end() {
            return Err(self.error("P010", format!("unexpected {:?} after expression", self.peek())));
        }
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        self.descend(|p| p.parse_conditional())
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let condition = self.parse_binary(2)?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.with_nesting(|p| {
            let then = p.parse_ternary()?;
            p.expect(&Token::Colon)?;
            Ok(then)
        })?;
        let otherwise = self.parse_ternary()?;
        Ok(Expr::ternary(condition, then, otherwise))
    }

    fn binary_op(tok: Option<&Token>) -> Option<BinOp> {
        Some(match tok? {
            Token::OrOr => BinOp::Or,
            Token::AndAnd => BinOp::And,
            Token::EqEq => BinOp::Eq,
            Token::NotEq => BinOp::Neq,
            Token::Less => BinOp::Lt,
            Token::LessEq => BinOp::Lte,
            Token::Greater => BinOp::Gt,
            Token::GreaterEq => BinOp::Gte,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::PlusPlus => BinOp::Concat,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Mod,
            _ => return None,
        })
    }

    /// Precedence climbing over the left-associative binary operators.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = Self::binary_op(self.peek()) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Bang) => {
                self.advance();
                Ok(Expr::unary(UnaryOp::Not, self.descend(|p| p.parse_unary())?))
            }
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::unary(UnaryOp::Neg, self.descend(|p| p.parse_unary())?))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.check(&Token::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr::method_call(expr, name, args);
                    } else {
                        expr = Expr::member(expr, name);
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let key = self.with_nesting(|p| {
                        let key = p.parse_expr()?;
                        p.expect(&Token::RBracket)?;
                        Ok(key)
                    })?;
                    expr = Expr::computed(expr, key);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        self.with_nesting(|p| {
            let mut args = Vec::new();
            while !p.check(&Token::RParen) {
                args.push(p.parse_expr()?);
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            p.expect(&Token::RParen)?;
            Ok(args)
        })
    }

    /// `(` starts an arrow when a parameter list is followed by `=>`.
    fn is_arrow_start(&self) -> bool {
        let mut i = 1;
        if matches!(self.peek_at(i), Some(Token::RParen)) {
            return matches!(self.peek_at(i + 1), Some(Token::FatArrow));
        }
        loop {
            if !matches!(self.peek_at(i), Some(Token::Ident(_))) {
                return false;
            }
            match self.peek_at(i + 1) {
                Some(Token::Comma) => i += 2,
                Some(Token::RParen) => return matches!(self.peek_at(i + 2), Some(Token::FatArrow)),
                _ => return false,
            }
        }
    }

    fn parse_arrow_body(&mut self, params: Vec<String>) -> Result<Expr> {
        self.expect(&Token::FatArrow)?;
        if self.check(&Token::LBrace) {
            return Err(self.error("P011", "arrow bodies must be expressions".into()));
        }
        let body = self.parse_ternary()?;
        Ok(Expr::arrow(params, body, true))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = match self.peek().cloned() {
            Some(tok) => tok,
            None => return Err(self.error("P012", "expected expression, got end of input".into())),
        };
        match tok {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::int(n))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::float(f))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::string(s))
            }
            Token::True => {
                self.advance();
                Ok(Expr::bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::null())
            }
            Token::Ident(name) => {
                self.advance();
                match self.peek() {
                    Some(Token::LParen) => {
                        let args = self.parse_args()?;
                        Ok(Expr::call(name, args))
                    }
                    Some(Token::ColonColon) => {
                        self.advance();
                        let var = self.expect_ident()?;
                        Ok(Expr::scoped_var(name, var))
                    }
                    Some(Token::FatArrow) => self.parse_arrow_body(vec![name]),
                    _ => Ok(Expr::Var { name, scope: None }),
                }
            }
            Token::LParen if self.is_arrow_start() => {
                self.advance();
                let mut params = Vec::new();
                while !self.check(&Token::RParen) {
                    params.push(self.expect_ident()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
                self.parse_arrow_body(params)
            }
            Token::LParen => {
                self.advance();
                let inner = self.with_nesting(|p| {
                    let inner = p.parse_expr()?;
                    p.expect(&Token::RParen)?;
                    Ok(inner)
                })?;
                Ok(Expr::group(inner))
            }
            Token::LBracket => {
                self.advance();
                self.with_nesting(|p| {
                    let mut elements = Vec::new();
                    while !p.check(&Token::RBracket) {
                        elements.push(p.parse_expr()?);
                        if !p.eat(&Token::Comma) {
                            break;
                        }
                    }
                    p.expect(&Token::RBracket)?;
                    Ok(Expr::array(elements))
                })
            }
            Token::LBrace => {
                self.advance();
                self.with_nesting(|p| {
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    while !p.check(&Token::RBrace) {
                        let key = match p.advance() {
                            Some(Token::Ident(k) | Token::Str(k)) => k,
                            other => {
                                return Err(p.error("P013", format!("expected object key, got {:?}", other)));
                            }
                        };
                        p.expect(&Token::Colon)?;
                        keys.push(key);
                        values.push(p.parse_expr()?);
                        if !p.eat(&Token::Comma) {
                            break;
                        }
                    }
                    p.expect(&Token::RBrace)?;
                    Ok(Expr::Object { keys, values })
                })
            }
            other => Err(self.error("P014", format!("expected expression, got {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(src: &str) -> Expr {
        expression(src).unwrap()
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(
            expr("(price * qty) >= 100"),
            Expr::binary(
                BinOp::Gte,
                Expr::group(Expr::binary(BinOp::Mul, Expr::var("price"), Expr::var("qty"))),
                Expr::int(100),
            )
        );
        assert_eq!(
            expr("a || b && c"),
            Expr::binary(BinOp::Or, Expr::var("a"), Expr::binary(BinOp::And, Expr::var("b"), Expr::var("c")))
        );
        assert_eq!(
            expr("a - b - c"),
            Expr::binary(BinOp::Sub, Expr::binary(BinOp::Sub, Expr::var("a"), Expr::var("b")), Expr::var("c"))
        );
    }

    #[test]
    fn ternary_is_right_associative() {
        assert_eq!(
            expr("a ? 1 : b ? 2 : 3"),
            Expr::ternary(Expr::var("a"), Expr::int(1), Expr::ternary(Expr::var("b"), Expr::int(2), Expr::int(3)))
        );
    }

    #[test]
    fn postfix_chain() {
        assert_eq!(
            expr("user.tags[0].toUpperCase()"),
            Expr::method_call(
                Expr::computed(Expr::member(Expr::var("user"), "tags"), Expr::int(0)),
                "toUpperCase",
                vec![],
            )
        );
    }

    #[test]
    fn calls_scopes_and_literals() {
        assert_eq!(
            expr("math_max(Counter::value, -1, 2.5)"),
            Expr::call(
                "math_max",
                vec![Expr::scoped_var("Counter", "value"), Expr::unary(UnaryOp::Neg, Expr::int(1)), Expr::float(2.5)],
            )
        );
        assert_eq!(
            expr("{ a: 1, \"b c\": [true, null] }"),
            Expr::object(vec![
                ("a".into(), Expr::int(1)),
                ("b c".into(), Expr::array(vec![Expr::bool(true), Expr::null()])),
            ])
        );
    }

    #[test]
    fn arrows() {
        assert_eq!(
            expr("(x, y) => x + y"),
            Expr::arrow(vec!["x".into(), "y".into()], Expr::binary(BinOp::Add, Expr::var("x"), Expr::var("y")), true)
        );
        assert_eq!(expr("x => x"), Expr::arrow(vec!["x".into()], Expr::var("x"), true));
        assert_eq!(expr("(x)"), Expr::group(Expr::var("x")));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        assert_eq!(expr("f(\n  1,\n  2\n)"), Expr::call("f", vec![Expr::int(1), Expr::int(2)]));
    }

    #[test]
    fn statement_list() {
        let stmts = statements("total = 0\nfor (x in xs) { total += x; if (total > 10) { break } }\nreturn total").unwrap();
        assert_eq!(
            stmts,
            vec![
                Stmt::assign("total", Expr::int(0)),
                Stmt::for_each(
                    "x",
                    Expr::var("xs"),
                    vec![
                        Stmt::compound_assign("total", AssignOp::Add, Expr::var("x")),
                        Stmt::if_else(
                            Expr::binary(BinOp::Gt, Expr::var("total"), Expr::int(10)),
                            vec![Stmt::Break],
                            vec![],
                        ),
                    ],
                ),
                Stmt::ret(Some(Expr::var("total"))),
            ]
        );
    }

    #[test]
    fn else_if_chains() {
        let stmts = statements("if (a) { x = 1 } else if (b) { x = 2 } else { x = 3 }").unwrap();
        let Stmt::If { otherwise, .. } = &stmts[0] else { panic!("expected if") };
        assert!(matches!(otherwise.as_slice(), [Stmt::If { .. }]));
    }

    #[test]
    fn scoped_assignment_and_call_statement() {
        let stmts = statements("Counter::value = 1; notify(\"done\")").unwrap();
        assert_eq!(stmts[0], Stmt::assign("Counter:value", Expr::int(1)));
        assert_eq!(stmts[1], Stmt::call("notify", vec![Expr::string("done")]));
    }

    #[test]
    fn bare_expression_is_not_a_statement() {
        let err = statements("a + 1").unwrap_err();
        assert!(err.to_string().contains("not a statement"), "{}", err);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(expression("a b").is_err());
        assert!(expression("(a").is_err());
    }

    #[test]
    fn printer_output_reparses() {
        for src in ["(a + b) * c", "!x && y.z[1] != null", "f(1, [2, 3], { k: \"v\" })", "a ? b : c ? d : e"] {
            let e = expr(src);
            assert_eq!(expr(&e.to_string()), e, "source: {}", src);
        }
    }

    fn nesting_code(result: std::result::Result<impl std::fmt::Debug, crate::Error>) -> &'static str {
        match result {
            Err(crate::Error::Parse(e)) => e.code,
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(nesting_code(expression(&parens)), "P015");
        assert_eq!(nesting_code(expression(&"(".repeat(100_000))), "P015");
        assert_eq!(nesting_code(expression(&format!("{}x", "!".repeat(100_000)))), "P015");
        assert_eq!(nesting_code(expression(&"a ? b : ".repeat(100_000))), "P015");
        let blocks = format!("{}x = 1{}", "if (x) { ".repeat(10_000), " }".repeat(10_000));
        assert_eq!(nesting_code(statements(&blocks)), "P015");
    }

    #[test]
    fn nesting_below_the_limit_parses() {
        let depth = MAX_DEPTH / 2 - 1;
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(expression(&src).is_ok());
        assert!(expression(&format!("{}x", "-".repeat(MAX_DEPTH - 2))).is_ok());
    }
}
