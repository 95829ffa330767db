use std::str::Chars;

use tracing::trace;

use crate::diagnostics::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    If,
    Else,
    End,
    For,
    In,
    True,
    False,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Backtick,
    Identifier,
    Keyword(Keyword),
    Assign,
    Pipe,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    EqualEqual,
    BangEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Newline,
    Eof,
}

impl TokenKind {
    /// Tokens after which a `-` directly followed by a digit starts a negative literal.
    fn admits_negative_literal(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Assign
                | Pipe
                | Comma
                | Colon
                | LParen
                | LBracket
                | LBrace
                | EqualEqual
                | BangEqual
                | Less
                | Greater
                | LessEqual
                | GreaterEqual
                | DoubleAmpersand
                | DoublePipe
                | Bang
                | Plus
                | Minus
                | Star
                | Slash
                | Percent
                | Newline
        )
    }

    pub fn describe(self) -> &'static str {
        use self::Keyword as Kw;
        match self {
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Backtick => "backtick string",
            TokenKind::Identifier => "identifier",
            TokenKind::Keyword(Kw::Let) => "`let`",
            TokenKind::Keyword(Kw::If) => "`if`",
            TokenKind::Keyword(Kw::Else) => "`else`",
            TokenKind::Keyword(Kw::End) => "`end`",
            TokenKind::Keyword(Kw::For) => "`for`",
            TokenKind::Keyword(Kw::In) => "`in`",
            TokenKind::Keyword(Kw::True) => "`true`",
            TokenKind::Keyword(Kw::False) => "`false`",
            TokenKind::Keyword(Kw::Null) => "`null`",
            TokenKind::Assign => "`=`",
            TokenKind::Pipe => "`|>`",
            TokenKind::Dot => "`.`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::EqualEqual => "`==`",
            TokenKind::BangEqual => "`!=`",
            TokenKind::Less => "`<`",
            TokenKind::Greater => "`>`",
            TokenKind::LessEqual => "`<=`",
            TokenKind::GreaterEqual => "`>=`",
            TokenKind::DoubleAmpersand => "`&&`",
            TokenKind::DoublePipe => "`||`",
            TokenKind::Bang => "`!`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Newline => "newline",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A lexed token. For string kinds `lexeme` holds the unescaped contents;
/// for numbers it holds the literal text including any leading `-`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

/// Converts cell source into tokens. Never fails: unknown characters are skipped
/// and an unterminated string runs to the end of input.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    chars: Chars<'a>,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars(),
            line: 1,
            col: 1,
            tokens: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn collect_while<F>(&mut self, buffer: &mut String, mut predicate: F)
    where
        F: FnMut(char) -> bool,
    {
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buffer.push(ch);
            self.bump();
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, position: Position) {
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.into(),
            position,
        });
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn starts_negative_literal(&self) -> bool {
        let digit_follows = self.peek().is_some_and(|ch| ch.is_ascii_digit());
        let operand_expected = self
            .tokens
            .last()
            .map_or(true, |token| token.kind.admits_negative_literal());
        digit_follows && operand_expected
    }

    fn number_literal(&mut self, start: Position, first: char) {
        let mut text = String::from(first);
        self.collect_while(&mut text, |ch| ch.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_second().is_some_and(|ch| ch.is_ascii_digit()) {
            self.bump();
            text.push('.');
            self.collect_while(&mut text, |ch| ch.is_ascii_digit());
        }
        self.push(TokenKind::Number, text, start);
    }

    fn string_literal(&mut self, start: Position, quote: char, kind: TokenKind) {
        let mut value = String::new();
        while let Some(ch) = self.bump() {
            match ch {
                c if c == quote => break,
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => break,
                },
                other => value.push(other),
            }
        }
        self.push(kind, value, start);
    }

    fn identifier_or_keyword(&mut self, start: Position, first: char) {
        let mut ident = String::from(first);
        self.collect_while(&mut ident, |ch| ch.is_ascii_alphanumeric() || ch == '_');
        let kind = keyword_for(&ident).unwrap_or(TokenKind::Identifier);
        self.push(kind, ident, start);
    }

    fn operator(&mut self, start: Position, kind: TokenKind, lexeme: &str) {
        self.push(kind, lexeme, start);
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        loop {
            let start = Position::new(self.line, self.col);
            let Some(ch) = self.bump() else {
                self.push(TokenKind::Eof, "", start);
                break;
            };

            match ch {
                ' ' | '\t' | '\r' => {}
                '\n' => self.push(TokenKind::Newline, "\n", start),
                '#' => self.skip_comment(),
                '/' if self.peek() == Some('/') => self.skip_comment(),
                '`' => self.string_literal(start, '`', TokenKind::Backtick),
                '"' | '\'' => self.string_literal(start, ch, TokenKind::String),
                '0'..='9' => self.number_literal(start, ch),
                '-' if self.starts_negative_literal() => self.number_literal(start, ch),
                '|' => {
                    if self.match_next('>') {
                        self.operator(start, TokenKind::Pipe, "|>");
                    } else if self.match_next('|') {
                        self.operator(start, TokenKind::DoublePipe, "||");
                    } else {
                        trace!(line = start.line, col = start.col, "skipping lone `|`");
                    }
                }
                '&' => {
                    if self.match_next('&') {
                        self.operator(start, TokenKind::DoubleAmpersand, "&&");
                    } else {
                        trace!(line = start.line, col = start.col, "skipping lone `&`");
                    }
                }
                '=' => {
                    if self.match_next('=') {
                        self.operator(start, TokenKind::EqualEqual, "==");
                    } else {
                        self.operator(start, TokenKind::Assign, "=");
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.operator(start, TokenKind::BangEqual, "!=");
                    } else {
                        self.operator(start, TokenKind::Bang, "!");
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.operator(start, TokenKind::LessEqual, "<=");
                    } else {
                        self.operator(start, TokenKind::Less, "<");
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.operator(start, TokenKind::GreaterEqual, ">=");
                    } else {
                        self.operator(start, TokenKind::Greater, ">");
                    }
                }
                '.' => self.operator(start, TokenKind::Dot, "."),
                ',' => self.operator(start, TokenKind::Comma, ","),
                ':' => self.operator(start, TokenKind::Colon, ":"),
                '(' => self.operator(start, TokenKind::LParen, "("),
                ')' => self.operator(start, TokenKind::RParen, ")"),
                '[' => self.operator(start, TokenKind::LBracket, "["),
                ']' => self.operator(start, TokenKind::RBracket, "]"),
                '{' => self.operator(start, TokenKind::LBrace, "{"),
                '}' => self.operator(start, TokenKind::RBrace, "}"),
                '+' => self.operator(start, TokenKind::Plus, "+"),
                '-' => self.operator(start, TokenKind::Minus, "-"),
                '*' => self.operator(start, TokenKind::Star, "*"),
                '/' => self.operator(start, TokenKind::Slash, "/"),
                '%' => self.operator(start, TokenKind::Percent, "%"),
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start, ch),
                other => {
                    trace!(line = start.line, col = start.col, ?other, "skipping unknown character");
                }
            }
        }
        self.tokens
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "let" => Kw::Let,
        "if" => Kw::If,
        "else" => Kw::Else,
        "end" => Kw::End,
        "for" => Kw::For,
        "in" => Kw::In,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}
