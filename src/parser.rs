use crate::{
    ast::{BinaryOp, Expr, ExprKind, Literal, Program, QuoteStyle, Stmt, StmtKind, UnaryOp},
    diagnostics::{Diagnostic, Position},
    lexer::{tokenize, Keyword, Token, TokenKind},
};

const COMPARISON_OPS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::EqualEqual, BinaryOp::Equal),
    (TokenKind::BangEqual, BinaryOp::NotEqual),
    (TokenKind::Less, BinaryOp::Less),
    (TokenKind::Greater, BinaryOp::Greater),
    (TokenKind::LessEqual, BinaryOp::LessEqual),
    (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
    (TokenKind::DoubleAmpersand, BinaryOp::And),
    (TokenKind::DoublePipe, BinaryOp::Or),
];

const ADDITIVE_OPS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Plus, BinaryOp::Add),
    (TokenKind::Minus, BinaryOp::Sub),
];

/// Deepest allowed nesting of brackets, unary operators and blocks.
pub const MAX_NESTING: usize = 64;

/// Most binary or pipe operators allowed along one chain of nested operands.
pub const MAX_CHAIN: usize = 256;

const MULTIPLICATIVE_OPS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Star, BinaryOp::Mul),
    (TokenKind::Slash, BinaryOp::Div),
    (TokenKind::Percent, BinaryOp::Mod),
];

pub fn parse_source(source: &str) -> Result<Program, Diagnostic> {
    parse(tokenize(source))
}

/// Parses a token stream into a program, stopping at the first error.
pub fn parse(tokens: Vec<Token>) -> Result<Program, Diagnostic> {
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
    chain: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|tok| tok.kind) != Some(TokenKind::Eof) {
            let position = tokens.last().map(|tok| tok.position).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                position,
            });
        }
        Self {
            tokens,
            current: 0,
            depth: 0,
            chain: 0,
        }
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            self.expect_separator()?;
            self.skip_newlines();
        }
        Ok(Program { statements })
    }

    /// Statements up to (not including) one of `terminators`.
    fn parse_block(&mut self, terminators: &[Keyword]) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Eof)
            && !terminators
                .iter()
                .any(|kw| self.check(TokenKind::Keyword(*kw)))
        {
            items.push(self.parse_statement()?);
            self.expect_separator()?;
            self.skip_newlines();
        }
        Ok(items)
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let kind = self.peek().kind;
        match kind {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Let) => self.parse_let(),
            TokenKind::Identifier
                if self.peek_at(1).kind == TokenKind::Assign
                    && self.peek_at(2).kind != TokenKind::Assign =>
            {
                let name = self.advance();
                self.advance();
                let value = self.parse_pipe()?;
                Ok(Stmt {
                    position: name.position,
                    kind: StmtKind::Assignment {
                        name: name.lexeme,
                        value,
                        declared: false,
                    },
                })
            }
            _ => {
                let expr = self.parse_pipe()?;
                Ok(Stmt {
                    position: expr.position,
                    kind: StmtKind::Expr(expr),
                })
            }
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, Diagnostic> {
        let let_token = self.consume(TokenKind::Keyword(Keyword::Let), "expected `let`")?;
        let name = self.consume(TokenKind::Identifier, "expected variable name after `let`")?;
        self.consume(TokenKind::Assign, "expected `=` after variable name")?;
        let value = self.parse_pipe()?;
        Ok(Stmt {
            position: let_token.position,
            kind: StmtKind::Assignment {
                name: name.lexeme,
                value,
                declared: true,
            },
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let if_token = self.consume(TokenKind::Keyword(Keyword::If), "expected `if`")?;
        let condition = self.parse_pipe()?;
        self.consume(TokenKind::Newline, "expected newline after `if` condition")?;
        let then_branch = self.nested(|p| p.parse_block(&[Keyword::Else, Keyword::End]))?;
        let else_branch = if self.matches(TokenKind::Keyword(Keyword::Else)) {
            self.consume(TokenKind::Newline, "expected newline after `else`")?;
            Some(self.nested(|p| p.parse_block(&[Keyword::End]))?)
        } else {
            None
        };
        self.consume_block_end("if", if_token.position)?;
        Ok(Stmt {
            position: if_token.position,
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let for_token = self.consume(TokenKind::Keyword(Keyword::For), "expected `for`")?;
        let binding = self.consume(TokenKind::Identifier, "expected loop variable after `for`")?;
        self.consume(
            TokenKind::Keyword(Keyword::In),
            "expected `in` after loop variable",
        )?;
        let iterable = self.parse_pipe()?;
        self.consume(TokenKind::Newline, "expected newline after `for` header")?;
        let body = self.nested(|p| p.parse_block(&[Keyword::End]))?;
        self.consume_block_end("for", for_token.position)?;
        Ok(Stmt {
            position: for_token.position,
            kind: StmtKind::For {
                binding: binding.lexeme,
                iterable,
                body,
            },
        })
    }

    fn consume_block_end(&mut self, opener: &str, opened_at: Position) -> Result<Token, Diagnostic> {
        if self.check(TokenKind::Keyword(Keyword::End)) {
            return Ok(self.advance());
        }
        Err(self
            .error_here(&format!("expected `end` to close `{opener}`"))
            .with_note(format!("`{opener}` opened on line {}", opened_at.line)))
    }

    fn parse_pipe(&mut self) -> Result<Expr, Diagnostic> {
        self.nested(Self::parse_pipe_chain)
    }

    fn parse_pipe_chain(&mut self) -> Result<Expr, Diagnostic> {
        let outer = self.chain;
        let mut expr = self.parse_comparison()?;
        while self.matches(TokenKind::Pipe) {
            self.extend_chain()?;
            self.skip_newlines();
            let right = self.parse_comparison()?;
            if !matches!(right.kind, ExprKind::Call { .. } | ExprKind::Display(_)) {
                return Err(Diagnostic::parser(
                    "Pipe target must be a function call",
                    right.position,
                ));
            }
            expr = Expr {
                position: expr.position,
                kind: ExprKind::Pipe {
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        self.chain = outer;
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(COMPARISON_OPS, Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(ADDITIVE_OPS, Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(MULTIPLICATIVE_OPS, Self::parse_unary)
    }

    /// One left-associative precedence level: `operand (op operand)*`.
    fn parse_binary_level(
        &mut self,
        table: &[(TokenKind, BinaryOp)],
        operand: fn(&mut Self) -> Result<Expr, Diagnostic>,
    ) -> Result<Expr, Diagnostic> {
        let outer = self.chain;
        let mut expr = operand(self)?;
        while let Some(op) = self.match_operator(table) {
            self.extend_chain()?;
            let right = operand(self)?;
            expr = Expr {
                position: expr.position,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        self.chain = outer;
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        if self.check(TokenKind::Bang) {
            let bang = self.advance();
            let expr = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                position: bang.position,
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        let literal = |value| Expr {
            position: token.position,
            kind: ExprKind::Literal(value),
        };
        match token.kind {
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let expr = self.parse_pipe()?;
                self.skip_newlines();
                self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_list(TokenKind::RBracket, "expected `]` after array items")?;
                Ok(Expr {
                    position: token.position,
                    kind: ExprKind::ArrayLiteral(items),
                })
            }
            TokenKind::LBrace => self.parse_object(),
            TokenKind::Number => {
                self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    Diagnostic::parser(
                        format!("invalid number literal `{}`", token.lexeme),
                        token.position,
                    )
                })?;
                Ok(literal(Literal::Number(value)))
            }
            TokenKind::String | TokenKind::Backtick => {
                self.advance();
                let quote = if token.kind == TokenKind::Backtick {
                    QuoteStyle::Backtick
                } else {
                    QuoteStyle::Quoted
                };
                Ok(literal(Literal::String {
                    value: token.lexeme.clone(),
                    quote,
                }))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(Literal::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(Literal::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(Literal::Null))
            }
            TokenKind::Minus => {
                self.advance();
                let expr = self.nested(Self::parse_primary)?;
                Ok(Expr {
                    position: token.position,
                    kind: ExprKind::Unary {
                        op: UnaryOp::Negate,
                        expr: Box::new(expr),
                    },
                })
            }
            TokenKind::Identifier => self.parse_identifier(),
            _ => Err(self.error_here("unexpected token in expression")),
        }
    }

    fn parse_identifier(&mut self) -> Result<Expr, Diagnostic> {
        let ident = self.advance();
        let position = ident.position;
        let name = ident.lexeme;

        if (name == "display" || name == "print") && self.matches(TokenKind::LParen) {
            let args = self.parse_list(TokenKind::RParen, "expected `)` after arguments")?;
            return Ok(Expr {
                position,
                kind: ExprKind::Display(args),
            });
        }

        let namespaced = name.starts_with(|ch: char| ch.is_ascii_uppercase());
        if namespaced && self.matches(TokenKind::Dot) {
            let function = self.consume(
                TokenKind::Identifier,
                &format!("expected function name after `{name}.`"),
            )?;
            self.consume(
                TokenKind::LParen,
                &format!("expected `(` after `{name}.{}`", function.lexeme),
            )?;
            let args = self.parse_list(TokenKind::RParen, "expected `)` after arguments")?;
            return Ok(Expr {
                position,
                kind: ExprKind::Call {
                    namespace: Some(name),
                    function: function.lexeme,
                    args,
                },
            });
        }

        if self.matches(TokenKind::LParen) {
            let args = self.parse_list(TokenKind::RParen, "expected `)` after arguments")?;
            return Ok(Expr {
                position,
                kind: ExprKind::Call {
                    namespace: None,
                    function: name,
                    args,
                },
            });
        }

        Ok(Expr {
            position,
            kind: ExprKind::Variable(name),
        })
    }

    fn parse_object(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let key_kind = self.peek().kind;
            let key = match key_kind {
                TokenKind::Identifier | TokenKind::String | TokenKind::Backtick => {
                    self.advance().lexeme
                }
                _ => return Err(self.error_here("expected object key")),
            };
            self.consume(TokenKind::Colon, "expected `:` after object key")?;
            self.skip_newlines();
            let value = self.parse_pipe()?;
            entries.push((key, value));
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.consume(TokenKind::RBrace, "expected `}` after object entries")?;
        Ok(Expr {
            position: lbrace.position,
            kind: ExprKind::ObjectLiteral(entries),
        })
    }

    /// Comma-separated expressions after an opening delimiter, through `closing`.
    /// Newlines inside the delimiters are insignificant and a trailing comma is allowed.
    fn parse_list(&mut self, closing: TokenKind, message: &str) -> Result<Vec<Expr>, Diagnostic> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(closing) && !self.check(TokenKind::Eof) {
            items.push(self.parse_pipe()?);
            self.skip_newlines();
            if !self.matches(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.consume(closing, message)?;
        Ok(items)
    }

    /// Runs `parse` one nesting level deeper, failing once [`MAX_NESTING`] is reached.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::parser(
                format!("expression nested more than {MAX_NESTING} levels deep"),
                self.peek().position,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn extend_chain(&mut self) -> Result<(), Diagnostic> {
        self.chain += 1;
        if self.chain > MAX_CHAIN {
            return Err(Diagnostic::parser(
                format!("expression chains more than {MAX_CHAIN} operators"),
                self.peek().position,
            ));
        }
        Ok(())
    }

    fn expect_separator(&self) -> Result<(), Diagnostic> {
        match self.peek().kind {
            TokenKind::Newline
            | TokenKind::Eof
            | TokenKind::Keyword(Keyword::End)
            | TokenKind::Keyword(Keyword::Else) => Ok(()),
            _ => Err(self.error_here("expected newline after statement")),
        }
    }

    fn match_operator(&mut self, table: &[(TokenKind, BinaryOp)]) -> Option<BinaryOp> {
        let kind = self.peek().kind;
        let op = table
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, op)| *op)?;
        self.advance();
        Some(op)
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Never reads past the trailing EOF token.
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + offset).min(last)]
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn error_here(&self, message: &str) -> Diagnostic {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Identifier | TokenKind::Number => {
                format!("{} `{}`", token.kind.describe(), token.lexeme)
            }
            other => other.describe().to_string(),
        };
        Diagnostic::parser(format!("{message}, found {found}"), token.position)
    }
}
