use crate::language::span::Span;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    Double(f64),
    String(String),

    And,
    Break,
    Do,
    Else,
    End,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    True,
    Var,
    While,

    Bang,
    BangEq,
    Comma,
    Eq,
    EqEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Minus,
    LParen,
    RParen,
    Percent,
    Plus,
    PlusPlus,
    Semi,
    Slash,
    SlashSlash,
    Star,

    Eof,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "do" => TokenKind::Do,
            "else" => TokenKind::Else,
            "end" => TokenKind::End,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "fun" => TokenKind::Fun,
            "if" => TokenKind::If,
            "nil" => TokenKind::Nil,
            "or" => TokenKind::Or,
            "print" => TokenKind::Print,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }

    /// Tokens that can start a statement; used to resynchronize after a syntax error.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Var
                | TokenKind::Fun
                | TokenKind::Do
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Return
                | TokenKind::Print
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier(name) => return write!(f, "identifier `{name}`"),
            TokenKind::Integer(value) => return write!(f, "integer `{value}`"),
            TokenKind::Double(value) => return write!(f, "double `{value}`"),
            TokenKind::String(value) => return write!(f, "string \"{value}\""),
            TokenKind::And => "`and`",
            TokenKind::Break => "`break`",
            TokenKind::Do => "`do`",
            TokenKind::Else => "`else`",
            TokenKind::End => "`end`",
            TokenKind::False => "`false`",
            TokenKind::For => "`for`",
            TokenKind::Fun => "`fun`",
            TokenKind::If => "`if`",
            TokenKind::Nil => "`nil`",
            TokenKind::Or => "`or`",
            TokenKind::Print => "`print`",
            TokenKind::Return => "`return`",
            TokenKind::True => "`true`",
            TokenKind::Var => "`var`",
            TokenKind::While => "`while`",
            TokenKind::Bang => "`!`",
            TokenKind::BangEq => "`!=`",
            TokenKind::Comma => "`,`",
            TokenKind::Eq => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Minus => "`-`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Percent => "`%`",
            TokenKind::Plus => "`+`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::Semi => "`;`",
            TokenKind::Slash => "`/`",
            TokenKind::SlashSlash => "`//`",
            TokenKind::Star => "`*`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}
