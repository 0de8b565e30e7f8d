// tests/lexer_tests.rs

use formql::ast::TokenKind;
use formql::lexer::{Lexer, tokenize};
use rust_decimal::Decimal;
use std::str::FromStr;

fn kinds(text: &str) -> Vec<TokenKind> {
    tokenize(text)
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

// ============================================================================
// Operators and punctuation
// ============================================================================

#[test]
fn test_single_char_tokens() {
    let test_cases = vec![
        (",", TokenKind::Comma),
        ("(", TokenKind::LParen),
        (")", TokenKind::RParen),
        (";", TokenKind::Semicolon),
        ("+", TokenKind::Plus),
        ("-", TokenKind::Minus),
        ("*", TokenKind::Star),
        ("/", TokenKind::Slash),
        ("%", TokenKind::Percent),
        ("=", TokenKind::Eq),
        ("<", TokenKind::Lt),
        (">", TokenKind::Gt),
    ];

    for (input, expected) in test_cases {
        let mut lexer = Lexer::new(input);
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, expected, "Failed for input: {}", input);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }
}

#[test]
fn test_two_char_tokens() {
    let test_cases = vec![
        ("!=", TokenKind::NotEq),
        ("<>", TokenKind::NotEq),
        ("<=", TokenKind::LtEq),
        (">=", TokenKind::GtEq),
    ];

    for (input, expected) in test_cases {
        assert_eq!(kinds(input), vec![expected, TokenKind::Eof], "Failed for input: {}", input);
    }
}

#[test]
fn test_lone_bang_is_rejected() {
    let err = tokenize("a ! b").unwrap_err();
    assert!(err.message.contains("!="));
    assert_eq!(err.position.column, 3);
}

// ============================================================================
// Keywords and identifiers
// ============================================================================

#[test]
fn test_keywords() {
    assert_eq!(
        kinds("SELECT DISTINCT FROM WHERE GROUP BY HAVING ORDER LIMIT"),
        vec![
            TokenKind::Select,
            TokenKind::Distinct,
            TokenKind::From,
            TokenKind::Where,
            TokenKind::Group,
            TokenKind::By,
            TokenKind::Having,
            TokenKind::Order,
            TokenKind::Limit,
            TokenKind::Eof,
        ]
    );
    assert_eq!(
        kinds("update form set field"),
        vec![
            TokenKind::Update,
            TokenKind::Form,
            TokenKind::Set,
            TokenKind::Field,
            TokenKind::Eof,
        ]
    );
    assert_eq!(
        kinds("Case When Then Else End Is Null Not"),
        vec![
            TokenKind::Case,
            TokenKind::When,
            TokenKind::Then,
            TokenKind::Else,
            TokenKind::End,
            TokenKind::Is,
            TokenKind::Null,
            TokenKind::Not,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_function_names_are_identifiers() {
    assert_eq!(
        kinds("count(submission_id)"),
        vec![
            TokenKind::Identifier("count".to_string()),
            TokenKind::LParen,
            TokenKind::Identifier("submission_id".to_string()),
            TokenKind::RParen,
            TokenKind::Eof,
        ]
    );
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_numbers_are_exact() {
    assert_eq!(
        kinds("42 3.14 0.1"),
        vec![
            TokenKind::Number(Decimal::from(42)),
            TokenKind::Number(Decimal::from_str("3.14").unwrap()),
            TokenKind::Number(Decimal::from_str("0.1").unwrap()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_number_errors() {
    assert!(tokenize("12abc").unwrap_err().message.contains("Malformed number"));
    assert!(
        tokenize("9999999999999999999999999999999999999999")
            .unwrap_err()
            .message
            .contains("out of range")
    );
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        kinds(r"'it''s' 'a\nb' 'say \'hi\''"),
        vec![
            TokenKind::String("it's".to_string()),
            TokenKind::String("a\nb".to_string()),
            TokenKind::String("say 'hi'".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_invalid_escape() {
    let err = tokenize(r"'bad \q'").unwrap_err();
    assert!(err.message.contains("Invalid escape"));
}

#[test]
fn test_quoted_identifiers() {
    assert_eq!(
        kinds(r#""form-uuid" "say ""hi""" "c:\path""#),
        vec![
            TokenKind::QuotedIdent("form-uuid".to_string()),
            TokenKind::QuotedIdent("say \"hi\"".to_string()),
            TokenKind::QuotedIdent("c:\\path".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_empty_quoted_identifier() {
    let err = tokenize(r#"SELECT FIELD("") FROM "f""#).unwrap_err();
    assert!(err.message.contains("Empty quoted identifier"));
}

#[test]
fn test_unterminated_literals() {
    let err = tokenize("SELECT 'open").unwrap_err();
    assert!(err.message.contains("Unterminated string"));
    assert_eq!(err.position.column, 8);

    let err = tokenize(r#"SELECT FIELD("open"#).unwrap_err();
    assert!(err.message.contains("Unterminated quoted identifier"));
}

#[test]
fn test_illegal_character() {
    let err = tokenize("SELECT $ FROM x").unwrap_err();
    assert_eq!(err.message, "Unexpected character '$'");
    assert_eq!(err.position.offset, 7);
}

// ============================================================================
// Comments and positions
// ============================================================================

#[test]
fn test_line_comments_are_skipped() {
    assert_eq!(
        kinds("SELECT -- everything\n*"),
        vec![TokenKind::Select, TokenKind::Star, TokenKind::Eof]
    );
}

#[test]
fn test_minus_is_not_a_comment() {
    assert_eq!(
        kinds("1 - 2"),
        vec![
            TokenKind::Number(Decimal::from(1)),
            TokenKind::Minus,
            TokenKind::Number(Decimal::from(2)),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_lexemes_keep_source_text() {
    let tokens = tokenize(r#"select "x""#).unwrap();
    assert_eq!(tokens[0].lexeme, "select");
    assert_eq!(tokens[1].lexeme, r#""x""#);
}

#[test]
fn test_multiline_positions() {
    let tokens = tokenize("SELECT *\nFROM\n  \"f\"").unwrap();
    let from = &tokens[2];
    assert_eq!(from.kind, TokenKind::From);
    assert_eq!((from.position.line, from.position.column), (2, 1));
    let source = &tokens[3];
    assert_eq!((source.position.line, source.position.column), (3, 3));
}
