use rust_decimal::Decimal;

use crate::lexer::Position;

/// A lexical token together with the source text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text exactly as written, quotes included
    pub lexeme: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Exact decimal number
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 1.1
    /// ```
    Number(Decimal),

    /// Single-quoted string literal, escapes resolved
    ///
    /// # Examples
    /// ```text
    /// 'approved'
    /// 'O''Brien'
    /// ```
    String(String),

    /// Double-quoted identifier: a form id, field id, table or alias name
    ///
    /// Never interchangeable with [`TokenKind::String`].
    ///
    /// # Examples
    /// ```text
    /// "form-uuid"
    /// "3f6c..."
    /// ```
    QuotedIdent(String),

    /// Bare word that is not a keyword: function names, system columns,
    /// internal table and column names, aliases
    ///
    /// # Examples
    /// ```text
    /// submission_id
    /// user_profiles
    /// ROUND
    /// ```
    Identifier(String),

    // Statement keywords
    Select,
    From,
    Where,
    Update,
    Form,
    Set,
    Distinct,
    Group,
    By,
    Having,
    Order,
    Limit,
    Asc,
    Desc,
    As,
    /// `FIELD`, always followed by `("id")`
    Field,

    // Expression keywords
    And,
    Or,
    Not,
    In,
    Between,
    Like,
    Is,
    Null,
    True,
    False,
    Case,
    When,
    Then,
    Else,
    End,

    // Comparison
    /// `=`
    Eq,
    /// `!=` or `<>`
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // Arithmetic
    Plus,
    Minus,
    /// `*`: multiplication, `SELECT *` or `COUNT(*)`
    Star,
    Slash,
    Percent,

    // Punctuation
    Comma,
    LParen,
    RParen,
    Semicolon,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Looks up a keyword, case-insensitively.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "SELECT" => TokenKind::Select,
            "FROM" => TokenKind::From,
            "WHERE" => TokenKind::Where,
            "UPDATE" => TokenKind::Update,
            "FORM" => TokenKind::Form,
            "SET" => TokenKind::Set,
            "DISTINCT" => TokenKind::Distinct,
            "GROUP" => TokenKind::Group,
            "BY" => TokenKind::By,
            "HAVING" => TokenKind::Having,
            "ORDER" => TokenKind::Order,
            "LIMIT" => TokenKind::Limit,
            "ASC" => TokenKind::Asc,
            "DESC" => TokenKind::Desc,
            "AS" => TokenKind::As,
            "FIELD" => TokenKind::Field,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "IN" => TokenKind::In,
            "BETWEEN" => TokenKind::Between,
            "LIKE" => TokenKind::Like,
            "IS" => TokenKind::Is,
            "NULL" => TokenKind::Null,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            "CASE" => TokenKind::Case,
            "WHEN" => TokenKind::When,
            "THEN" => TokenKind::Then,
            "ELSE" => TokenKind::Else,
            "END" => TokenKind::End,
            _ => return None,
        };
        Some(kind)
    }
}
