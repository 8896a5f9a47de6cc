use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, multispace1},
    combinator::{map, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair},
    IResult,
};

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

enum Lexeme<'a> {
    Number(&'a str),
    Word(&'a str),
    Str(&'a str),
    Symbol(TokenKind),
}

struct Lexer<'a> {
    src: &'a str,
    rest: &'a str,
    line: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            rest: src,
            line: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        loop {
            if let Ok((rest, skipped)) = trivia(self.rest) {
                self.consume(skipped, rest);
            }
            if self.rest.is_empty() {
                break;
            }

            let start = self.offset();
            let line = self.line;
            match lexeme(self.rest) {
                Ok((rest, lexeme)) => {
                    let text = &self.rest[..self.rest.len() - rest.len()];
                    self.consume(text, rest);
                    let span = Span::new(start, self.offset(), line);
                    match self.classify(lexeme) {
                        Ok(kind) => self.tokens.push(Token { kind, span }),
                        Err(message) => self.errors.push(LexError { message, span }),
                    }
                }
                Err(_) => self.recover(start, line),
            }
        }

        let end = self.offset();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end, self.line),
        });

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn offset(&self) -> usize {
        self.src.len() - self.rest.len()
    }

    fn consume(&mut self, text: &str, rest: &'a str) {
        self.line += text.matches('\n').count();
        self.rest = rest;
    }

    fn classify(&self, lexeme: Lexeme<'_>) -> Result<TokenKind, String> {
        match lexeme {
            Lexeme::Number(text) if text.contains('.') => text
                .parse::<f64>()
                .map(TokenKind::Double)
                .map_err(|_| format!("Invalid double literal `{text}`")),
            Lexeme::Number(text) => text
                .parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| format!("Integer literal `{text}` does not fit in 64 bits")),
            Lexeme::Word(word) => Ok(TokenKind::keyword(word)
                .unwrap_or_else(|| TokenKind::Identifier(word.to_string()))),
            Lexeme::Str(text) => Ok(TokenKind::String(text.to_string())),
            Lexeme::Symbol(kind) => Ok(kind),
        }
    }

    fn recover(&mut self, start: usize, line: usize) {
        let rest = self.rest;
        if rest.starts_with('"') {
            self.consume(rest, "");
            self.errors.push(LexError {
                message: "Unterminated string literal".into(),
                span: Span::new(start, self.offset(), line),
            });
            return;
        }
        let mut chars = rest.chars();
        let unexpected = chars.next().unwrap_or_default();
        let remaining = chars.as_str();
        self.consume(&rest[..rest.len() - remaining.len()], remaining);
        self.errors.push(LexError {
            message: format!("Unexpected character '{unexpected}'"),
            span: Span::new(start, self.offset(), line),
        });
    }
}

fn trivia(input: &str) -> IResult<&str, &str> {
    recognize(many0_count(alt((multispace1, comment))))(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('#'), take_till(|c| c == '\n')))(input)
}

fn lexeme(input: &str) -> IResult<&str, Lexeme<'_>> {
    alt((
        map(number, Lexeme::Number),
        map(word, Lexeme::Word),
        map(string_literal, Lexeme::Str),
        map(symbol, Lexeme::Symbol),
    ))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(input)
}

fn symbol(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::BangEq, tag("!=")),
        value(TokenKind::EqEq, tag("==")),
        value(TokenKind::GtEq, tag(">=")),
        value(TokenKind::LtEq, tag("<=")),
        value(TokenKind::PlusPlus, tag("++")),
        value(TokenKind::SlashSlash, tag("//")),
        value(TokenKind::Bang, char('!')),
        value(TokenKind::Comma, char(',')),
        value(TokenKind::Eq, char('=')),
        value(TokenKind::Gt, char('>')),
        value(TokenKind::Lt, char('<')),
        value(TokenKind::Minus, char('-')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Percent, char('%')),
        value(TokenKind::Plus, char('+')),
        value(TokenKind::Semi, char(';')),
        value(TokenKind::Slash, char('/')),
        value(TokenKind::Star, char('*')),
    ))(input)
}
