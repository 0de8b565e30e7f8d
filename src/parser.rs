use std::mem;

use rust_decimal::prelude::ToPrimitive;

use crate::{
    ast::{
        Assignment, BinOp, Expr, OrderItem, SelectItem, SelectStatement, Source, Statement, Token,
        TokenKind, UnaryOp, UpdateStatement,
    },
    error::ParseError,
    lexer::{Position, tokenize},
};

/// Deepest expression nesting accepted unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Words that start statements this language deliberately has no grammar for.
const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "DELETE", "DROP", "INSERT", "CREATE", "ALTER", "TRUNCATE", "MERGE", "REPLACE", "GRANT",
    "REVOKE", "WITH", "UPSERT",
];

/// Parses a token stream into a single statement.
pub fn parse(tokens: Vec<Token>) -> Result<Statement, ParseError> {
    Parser::new(tokens).parse()
}

/// Tokenizes and parses query text.
///
/// # Examples
///
/// ```
/// use formql::parser::parse_query;
/// use formql::ast::Statement;
///
/// let statement = parse_query(r#"SELECT FIELD("a") FROM "form-1" LIMIT 10"#).unwrap();
/// assert!(matches!(statement, Statement::Select(_)));
///
/// // Only SELECT and UPDATE FORM exist
/// assert!(parse_query(r#"DELETE FROM "form-1""#).is_err());
/// ```
pub fn parse_query(text: &str) -> Result<Statement, ParseError> {
    parse(tokenize(text)?)
}

/// Recursive-descent parser. Stops at the first syntax error.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let position = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                position,
            });
        }
        Parser {
            tokens,
            position: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn current_token(&self) -> &Token {
        // `new` guarantees a trailing Eof, and `advance` never moves past it
        &self.tokens[self.position]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let index = (self.position + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.current_token().kind) == mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current_token();
        ParseError::syntax(
            format!("Expected {}, found {}", expected, describe(token)),
            token.position,
        )
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(message, self.current_token().position)
    }

    /// Runs `f` one nesting level deeper, failing once the limit is reached.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.error_here(format!(
                "Expression is nested too deeply (limit {})",
                self.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ========================================
    // Statements
    // ========================================

    /// Parses exactly one statement, optionally followed by `;`.
    pub fn parse(mut self) -> Result<Statement, ParseError> {
        let statement = if self.check(&TokenKind::Select) {
            Statement::Select(self.parse_select()?)
        } else if self.check(&TokenKind::Update) {
            Statement::Update(self.parse_update()?)
        } else {
            return Err(self.unsupported_statement());
        };
        self.finish()?;
        Ok(statement)
    }

    fn unsupported_statement(&self) -> ParseError {
        match &self.current_token().kind {
            TokenKind::Identifier(word)
                if UNSUPPORTED_STATEMENTS.contains(&word.to_ascii_uppercase().as_str()) =>
            {
                self.error_here(format!(
                    "{} statements are not supported; only SELECT and UPDATE FORM are allowed",
                    word.to_ascii_uppercase()
                ))
            }
            _ => self.unexpected("SELECT or UPDATE FORM"),
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        let had_semicolon = self.eat(&TokenKind::Semicolon);
        if self.check(&TokenKind::Eof) {
            return Ok(());
        }

        let token = self.current_token();
        let message = if had_semicolon {
            "Only one statement is allowed".to_string()
        } else if is_clause_keyword(&token.kind) {
            format!(
                "Unexpected {}: clauses must appear in the order WHERE, GROUP BY, HAVING, ORDER BY, LIMIT",
                token.lexeme.to_ascii_uppercase()
            )
        } else {
            format!("Unexpected {} after end of statement", describe(token))
        };
        Err(ParseError::syntax(message, token.position))
    }

    fn parse_select(&mut self) -> Result<SelectStatement, ParseError> {
        self.expect(TokenKind::Select, "SELECT")?;
        let distinct = self.eat(&TokenKind::Distinct);

        let mut projections = vec![self.parse_select_item()?];
        while self.eat(&TokenKind::Comma) {
            projections.push(self.parse_select_item()?);
        }

        self.expect(TokenKind::From, "FROM")?;
        let source = self.parse_source()?;

        let filter = if self.eat(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let group_by = if self.eat(&TokenKind::Group) {
            self.expect(TokenKind::By, "BY after GROUP")?;
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        let having = if self.eat(&TokenKind::Having) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat(&TokenKind::Order) {
            self.expect(TokenKind::By, "BY after ORDER")?;
            loop {
                let expr = self.parse_expression()?;
                let descending = if self.eat(&TokenKind::Desc) {
                    true
                } else {
                    self.eat(&TokenKind::Asc);
                    false
                };
                order_by.push(OrderItem { expr, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat(&TokenKind::Limit) {
            Some(self.parse_limit()?)
        } else {
            None
        };

        Ok(SelectStatement {
            distinct,
            projections,
            source,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.eat(&TokenKind::Star) {
            return Ok(SelectItem::Wildcard);
        }

        let expr = self.parse_expression()?;
        let alias = if self.eat(&TokenKind::As) {
            match &self.current_token().kind {
                TokenKind::Identifier(name) | TokenKind::QuotedIdent(name) => {
                    let name = name.clone();
                    self.advance();
                    Some(name)
                }
                _ => return Err(self.unexpected("an alias after AS")),
            }
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_source(&mut self) -> Result<Source, ParseError> {
        let token = self.current_token().clone();
        let source = match token.kind {
            TokenKind::QuotedIdent(name) => Source::Quoted {
                name,
                position: token.position,
            },
            TokenKind::Identifier(name) => Source::Bare {
                name,
                position: token.position,
            },
            TokenKind::String(name) => {
                return Err(self.error_here(format!(
                    "Form ids must be double-quoted: FROM \"{}\" ('...' is a string literal)",
                    name
                )));
            }
            _ => return Err(self.unexpected("a form id or table name after FROM")),
        };
        self.advance();
        Ok(source)
    }

    fn parse_limit(&mut self) -> Result<u64, ParseError> {
        let limit = match &self.current_token().kind {
            TokenKind::Number(n) if n.fract().is_zero() => n.to_u64(),
            _ => None,
        };
        match limit {
            Some(n) => {
                self.advance();
                Ok(n)
            }
            None => Err(self.unexpected("a non-negative integer after LIMIT")),
        }
    }

    fn parse_update(&mut self) -> Result<UpdateStatement, ParseError> {
        self.expect(TokenKind::Update, "UPDATE")?;
        if !self.check(&TokenKind::Form) {
            return Err(self.error_here(format!(
                "Expected FORM after UPDATE, found {}; only UPDATE FORM \"form-id\" is supported",
                describe(self.current_token())
            )));
        }
        self.advance();

        let token = self.current_token().clone();
        let form_id = match token.kind {
            TokenKind::QuotedIdent(id) => id,
            _ => return Err(self.unexpected("a double-quoted form id after UPDATE FORM")),
        };
        self.advance();

        self.expect(TokenKind::Set, "SET")?;

        let mut assignments: Vec<Assignment> = Vec::new();
        loop {
            let assignment = self.parse_assignment()?;
            if assignments.iter().any(|a| a.field_id == assignment.field_id) {
                return Err(ParseError::syntax(
                    format!("Field \"{}\" is assigned more than once", assignment.field_id),
                    assignment.position,
                ));
            }
            assignments.push(assignment);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let filter = if self.eat(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(UpdateStatement {
            form_id,
            form_position: token.position,
            assignments,
            filter,
        })
    }

    fn parse_assignment(&mut self) -> Result<Assignment, ParseError> {
        let position = self.current_token().position;
        self.expect(TokenKind::Field, "FIELD(\"id\") on the left of an assignment")?;
        let field_id = self.parse_field_id()?;
        self.expect(TokenKind::Eq, "'='")?;
        let value = self.parse_expression()?;
        Ok(Assignment {
            field_id,
            position,
            value,
        })
    }

    /// The `("id")` following FIELD.
    fn parse_field_id(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::LParen, "'(' after FIELD")?;
        let id = match &self.current_token().kind {
            TokenKind::QuotedIdent(id) => id.clone(),
            TokenKind::String(id) => {
                return Err(self.error_here(format!(
                    "FIELD expects a double-quoted field id: FIELD(\"{}\")",
                    id
                )));
            }
            _ => return Err(self.unexpected("a double-quoted field id")),
        };
        self.advance();
        self.expect(TokenKind::RParen, "')'")?;
        Ok(id)
    }

    // ========================================
    // Expressions, lowest precedence first
    // ========================================

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_or)
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = vec![self.parse_expression()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_expression()?);
        }
        Ok(items)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_and, |kind| match kind {
            TokenKind::Or => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_not, |kind| match kind {
            TokenKind::And => Some(BinOp::And),
            _ => None,
        })
    }

    /// Left-associative run of one precedence level, `a op b op c ...`.
    ///
    /// Each operator adds a level to the tree, so the run counts against the
    /// nesting limit like parentheses do.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        operator: fn(&TokenKind) -> Option<BinOp>,
    ) -> Result<Expr, ParseError> {
        let mut left = operand(self)?;
        let mut height = left.height();

        while let Some(op) = operator(&self.current_token().kind) {
            let position = self.current_token().position;
            self.advance();
            let right = operand(self)?;
            height = height.max(right.height()) + 1;
            if self.depth + height > self.max_depth {
                return Err(ParseError::syntax(
                    format!("Expression is nested too deeply (limit {})", self.max_depth),
                    position,
                ));
            }
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match &self.current_token().kind {
            TokenKind::Eq => Some(BinOp::Equal),
            TokenKind::NotEq => Some(BinOp::NotEqual),
            TokenKind::Lt => Some(BinOp::LessThan),
            TokenKind::Gt => Some(BinOp::GreaterThan),
            TokenKind::LtEq => Some(BinOp::LessEqual),
            TokenKind::GtEq => Some(BinOp::GreaterEqual),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::binary(op, left, right));
        }

        if self.eat(&TokenKind::Is) {
            let negated = self.eat(&TokenKind::Not);
            self.expect(TokenKind::Null, "NULL after IS")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = self.check(&TokenKind::Not)
            && matches!(
                self.peek_kind(1),
                TokenKind::In | TokenKind::Between | TokenKind::Like
            );
        if negated {
            self.advance();
        }

        if self.eat(&TokenKind::In) {
            self.expect(TokenKind::LParen, "'(' after IN")?;
            let list = self.parse_expression_list()?;
            self.expect(TokenKind::RParen, "')' to close the IN list")?;
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }

        if self.eat(&TokenKind::Between) {
            let low = self.parse_additive()?;
            self.expect(TokenKind::And, "AND in BETWEEN")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        if self.eat(&TokenKind::Like) {
            let pattern = self.parse_additive()?;
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            });
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_unary, |kind| match kind {
            TokenKind::Star => Some(BinOp::Multiply),
            TokenKind::Slash => Some(BinOp::Divide),
            TokenKind::Percent => Some(BinOp::Modulo),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            // Fold the sign into numeric literals
            return Ok(match operand {
                Expr::Number(n) => Expr::Number(-n),
                operand => Expr::UnaryOp {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                },
            });
        }
        if self.eat(&TokenKind::Plus) {
            return self.nested(Self::parse_unary);
        }
        self.parse_primary()
    }

    /// Atoms: literals, `FIELD("id")`, identifiers, calls, `( expr )`, CASE.
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current_token().clone();
        let position = token.position;

        match token.kind {
            // Literals
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }

            // References
            TokenKind::QuotedIdent(value) => {
                self.advance();
                Ok(Expr::QuotedIdent { value, position })
            }
            TokenKind::Field => {
                self.advance();
                let id = self.parse_field_id()?;
                Ok(Expr::Field { id, position })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.parse_call(name, position)
                } else {
                    Ok(Expr::Column { name, position })
                }
            }

            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }

            TokenKind::Case => self.parse_case(),

            TokenKind::Star => {
                Err(self.error_here("'*' is only allowed as a projection or as COUNT(*)"))
            }

            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call(&mut self, name: String, position: Position) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;

        let args = if self.eat(&TokenKind::RParen) {
            Vec::new()
        } else if self.check(&TokenKind::Star) && matches!(self.peek_kind(1), TokenKind::RParen) {
            self.advance();
            self.advance();
            vec![Expr::Star]
        } else {
            let args = self.parse_expression_list()?;
            self.expect(TokenKind::RParen, "')' to close the argument list")?;
            args
        };

        Ok(Expr::Call {
            name: name.to_ascii_uppercase(),
            args,
            position,
        })
    }

    /// Searched and simple CASE; the simple form becomes equality tests.
    fn parse_case(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::Case, "CASE")?;

        let operand = if self.check(&TokenKind::When) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        if !self.check(&TokenKind::When) {
            return Err(self.unexpected("WHEN"));
        }

        let mut branches = Vec::new();
        while self.eat(&TokenKind::When) {
            let condition = self.parse_expression()?;
            self.expect(TokenKind::Then, "THEN")?;
            let result = self.parse_expression()?;
            let condition = match &operand {
                Some(operand) => Expr::binary(BinOp::Equal, operand.clone(), condition),
                None => condition,
            };
            branches.push((condition, result));
        }

        let else_expr = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect(TokenKind::End, "END to close CASE")?;

        Ok(Expr::Case {
            branches,
            else_expr,
        })
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        _ => format!("'{}'", token.lexeme),
    }
}

fn is_clause_keyword(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Where
            | TokenKind::Group
            | TokenKind::Having
            | TokenKind::Order
            | TokenKind::Limit
            | TokenKind::From
            | TokenKind::Set
    )
}
