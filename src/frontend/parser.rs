use thiserror::Error;

use super::{
    SourceFile,
    intern::InternedSymbol,
    lexer::{Keyword, Lexer, Span, Token, TokenKind},
};
use crate::middle::ir::{BinaryOperatorKind, Expr, Stmt};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character `{character}`")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("expected {expected} but found `{found}`")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("expected {expected} but reached end of file")]
    UnexpectedEof { expected: String, span: Span },
    #[error("integer literal `{literal}` does not fit in 64 bits")]
    IntegerOutOfRange { literal: String, span: Span },
    #[error("only buffer elements can be stored to, not `{found}`")]
    InvalidStoreTarget { found: String, span: Span },
}

impl ParseError {
    /// Where in the source the error was found
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedCharacter { span, .. }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::IntegerOutOfRange { span, .. }
            | ParseError::InvalidStoreTarget { span, .. } => *span,
        }
    }
}

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    /// Parses a whole file. The top level is a list of statements just like
    /// the inside of a block.
    pub fn parse_program(source_file: &'source SourceFile) -> Result<Stmt, ParseError> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
        };

        parser.parse_statements(None)
    }

    fn source(&self) -> &'source SourceFile {
        self.lexer.source()
    }

    fn unexpected(&self, token: Token, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_owned(),
            found: self.source().value_of_span(token.span).to_owned(),
            span: token.span,
        }
    }

    fn eof(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedEof {
            expected: expected.to_owned(),
            span: self.lexer.eof_span(),
        }
    }

    fn expect_peek(&mut self, expecting: &str) -> Result<Token, ParseError> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => Err(self.eof(expecting)),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> Result<Token, ParseError> {
        match self.lexer.next()? {
            Some(token) => Ok(token),
            None => Err(self.eof(expecting)),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> Result<Token, ParseError> {
        let token = self.expect_next(expecting)?;

        if token.kind != kind {
            return Err(self.unexpected(token, expecting));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        self.expect_next_to_be(TokenKind::Keyword(keyword), &format!("`{keyword}`"))
    }

    /// Consumes the next token if it is of the given kind
    fn eat(&mut self, kind: TokenKind) -> Result<bool, ParseError> {
        if self.lexer.peek()?.is_some_and(|t| t.kind == kind) {
            self.lexer.next()?;
            return Ok(true);
        }

        Ok(false)
    }

    // a
    fn parse_identifier(&mut self) -> Result<InternedSymbol, ParseError> {
        let token = self.expect_next_to_be(TokenKind::Identifier, "identifier")?;

        Ok(InternedSymbol::new(self.source().value_of_span(token.span)))
    }

    /// Statements up to (not including) `closing`, or up to the end of the
    /// file when there is none. A `let` statement takes every statement after
    /// it as its body.
    fn parse_statements(&mut self, closing: Option<TokenKind>) -> Result<Stmt, ParseError> {
        let mut statements = Vec::new();

        loop {
            let Some(peeked) = self.lexer.peek()? else {
                if closing.is_some() {
                    return Err(self.eof("statement or `}`"));
                }
                break;
            };

            if Some(peeked.kind) == closing {
                break;
            }

            if peeked.kind == TokenKind::Keyword(Keyword::Let) {
                self.expect_keyword(Keyword::Let)?;
                let name = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::Equals, "`=`")?;
                let value = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                let body = self.parse_statements(closing)?;
                statements.push(Stmt::let_stmt(name, value, body));
                break;
            }

            statements.push(self.parse_statement()?);
        }

        Ok(Stmt::block(statements))
    }

    // { a[0] = 1; free b; }
    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        self.expect_next_to_be(TokenKind::OpenBrace, "`{`")?;
        let body = self.parse_statements(Some(TokenKind::CloseBrace))?;
        self.expect_next_to_be(TokenKind::CloseBrace, "`}`")?;

        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Pipeline) => self.parse_pipeline(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Free) => {
                self.expect_keyword(Keyword::Free)?;
                let buffer = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                Ok(Stmt::free(buffer))
            }
            TokenKind::OpenBrace => self.parse_block(),
            _ => self.parse_store_or_evaluate(peeked),
        }
    }

    /// buf[idx] = value;  or  value;
    fn parse_store_or_evaluate(&mut self, first: Token) -> Result<Stmt, ParseError> {
        let expression = self.parse_expression()?;

        let peeked = self.expect_peek("`=` or `;`")?;

        if peeked.kind != TokenKind::Equals {
            self.expect_next_to_be(TokenKind::Semicolon, "`=` or `;`")?;
            return Ok(Stmt::evaluate(expression));
        }

        let Some(destination) = expression.as_load().cloned() else {
            let span = Span::new(first.span.start, peeked.span.start);

            return Err(ParseError::InvalidStoreTarget {
                found: self.source().value_of_span(span).trim().to_owned(),
                span,
            });
        };

        self.expect_next_to_be(TokenKind::Equals, "`=`")?;
        let value = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

        Ok(Stmt::store(destination, value))
    }

    /// pipeline name { produce { } update { } consume { } }
    fn parse_pipeline(&mut self) -> Result<Stmt, ParseError> {
        self.expect_keyword(Keyword::Pipeline)?;
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::OpenBrace, "`{`")?;

        self.expect_keyword(Keyword::Produce)?;
        let produce = self.parse_block()?;

        let update = if self.eat(TokenKind::Keyword(Keyword::Update))? {
            Some(self.parse_block()?)
        } else {
            None
        };

        self.expect_keyword(Keyword::Consume)?;
        let consume = self.parse_block()?;

        self.expect_next_to_be(TokenKind::CloseBrace, "`}`")?;

        Ok(Stmt::pipeline(name, produce, update, consume))
    }

    /// for x in min..extent { }
    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect_keyword(Keyword::For)?;
        let variable = self.parse_identifier()?;
        self.expect_keyword(Keyword::In)?;

        let min = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::DotDot, "`..`")?;
        let extent = self.parse_expression()?;

        let body = self.parse_block()?;

        Ok(Stmt::for_loop(variable, min, extent, body))
    }

    /// if condition { } else if condition { } else { }
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect_keyword(Keyword::If)?;
        let condition = self.parse_expression()?;
        let then_case = self.parse_block()?;

        if !self.eat(TokenKind::Keyword(Keyword::Else))? {
            return Ok(Stmt::if_then_else(condition, then_case, None));
        }

        let else_case = if self.expect_peek("`if` or `{`")?.kind == TokenKind::Keyword(Keyword::If) {
            self.parse_if()?
        } else {
            self.parse_block()?
        };

        Ok(Stmt::if_then_else(condition, then_case, Some(else_case)))
    }

    /// expression     -> "let" IDENTIFIER "=" expression "in" expression
    ///                   | logical_or
    /// logical_or     -> logical_and ( "||" logical_and )*
    /// logical_and    -> comparison ( "&&" comparison )*
    /// comparison     -> term ( ( "!=" | "==" | "<" | "<=" | ">" | ">=" ) term )*
    /// term           -> factor ( ( "-" | "+" ) factor )*
    /// factor         -> unary ( ( "/" | "*" | "%" ) unary )*
    /// unary          -> "-" unary | atom
    /// atom           -> NUMBER
    ///                   | IDENTIFIER ( "[" expression "]" | "(" arguments ")" )?
    ///                   | "(" expression ")"
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        if !self.eat(TokenKind::Keyword(Keyword::Let))? {
            return self.parse_logical_or_expression();
        }

        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Equals, "`=`")?;
        let value = self.parse_expression()?;
        self.expect_keyword(Keyword::In)?;
        let body = self.parse_expression()?;

        Ok(Expr::let_in(name, value, body))
    }

    fn parse_binary_level(
        &mut self,
        is_operator: fn(&TokenKind) -> bool,
        parse_operand: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut expression = parse_operand(self)?;

        while let Some(token) = self.lexer.peek()? {
            if !is_operator(&token.kind) {
                break;
            }

            self.lexer.next()?;

            let Some(operator) = binary_operator_kind(token.kind) else {
                return Err(self.unexpected(token, "binary operator"));
            };

            let rhs = parse_operand(self)?;
            expression = Expr::binary(operator, expression, rhs);
        }

        Ok(expression)
    }

    fn parse_logical_or_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |kind| *kind == TokenKind::LogicalOr,
            Self::parse_logical_and_expression,
        )
    }

    fn parse_logical_and_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |kind| *kind == TokenKind::LogicalAnd,
            Self::parse_comparison_expression,
        )
    }

    fn parse_comparison_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(TokenKind::is_comparison_operator, Self::parse_term_expression)
    }

    fn parse_term_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(TokenKind::is_term_operator, Self::parse_factor_expression)
    }

    fn parse_factor_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(TokenKind::is_factor_operator, Self::parse_unary_expression)
    }

    fn parse_unary_expression(&mut self) -> Result<Expr, ParseError> {
        if !self.eat(TokenKind::Minus)? {
            return self.parse_atom();
        }

        let operand = self.parse_unary_expression()?;

        // There is no negation node, so literals are negated in place and
        // anything else becomes a subtraction from zero
        match operand.as_int().and_then(i64::checked_neg) {
            Some(negated) => Ok(Expr::int(negated)),
            None => Ok(Expr::binary(BinaryOperatorKind::Subtract, Expr::int(0), operand)),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.expect_next("expression")?;

        match token.kind {
            TokenKind::IntegerLiteral => {
                let literal = self.source().value_of_span(token.span);

                literal
                    .parse()
                    .map(Expr::int)
                    .map_err(|_| ParseError::IntegerOutOfRange {
                        literal: literal.to_owned(),
                        span: token.span,
                    })
            }
            TokenKind::Identifier => {
                let name = InternedSymbol::new(self.source().value_of_span(token.span));

                if self.eat(TokenKind::OpenBracket)? {
                    let index = self.parse_expression()?;
                    self.expect_next_to_be(TokenKind::CloseBracket, "`]`")?;

                    return Ok(Expr::load(name, index));
                }

                if self.eat(TokenKind::OpenParen)? {
                    let arguments = self.parse_call_arguments()?;

                    return Ok(Expr::call(name, arguments));
                }

                Ok(Expr::var(name))
            }
            TokenKind::OpenParen => {
                let expression = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;

                Ok(expression)
            }
            _ => Err(self.unexpected(token, "expression")),
        }
    }

    // (a, b[0] + 1)  with the opening paren already consumed
    fn parse_call_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut arguments = Vec::new();

        if self.eat(TokenKind::CloseParen)? {
            return Ok(arguments);
        }

        loop {
            arguments.push(self.parse_expression()?);

            if self.eat(TokenKind::CloseParen)? {
                return Ok(arguments);
            }

            self.expect_next_to_be(TokenKind::Comma, "`,` or `)`")?;
        }
    }
}

fn binary_operator_kind(kind: TokenKind) -> Option<BinaryOperatorKind> {
    let operator = match kind {
        TokenKind::Plus => BinaryOperatorKind::Add,
        TokenKind::Minus => BinaryOperatorKind::Subtract,
        TokenKind::Asterisk => BinaryOperatorKind::Multiply,
        TokenKind::Divide => BinaryOperatorKind::Divide,
        TokenKind::Modulus => BinaryOperatorKind::Modulus,
        TokenKind::LessThan => BinaryOperatorKind::LessThan,
        TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
        TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
        TokenKind::GreaterThanOrEqualTo => BinaryOperatorKind::GreaterThanOrEqualTo,
        TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
        TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
        TokenKind::LogicalAnd => BinaryOperatorKind::LogicalAnd,
        TokenKind::LogicalOr => BinaryOperatorKind::LogicalOr,
        _ => return None,
    };

    Some(operator)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::SourceFileOrigin,
        middle::ir::{BinaryOperatorKind::*, MemoryRef},
    };

    fn parse(contents: &str) -> Result<Stmt, ParseError> {
        Parser::parse_program(&SourceFile::new(contents, SourceFileOrigin::Memory))
    }

    fn load(buffer: &str, index: i64) -> Expr {
        Expr::load(buffer, Expr::int(index))
    }

    fn store(buffer: &str, index: i64, value: Expr) -> Stmt {
        Stmt::store(MemoryRef::new(buffer, Expr::int(index)), value)
    }

    #[test]
    fn parses_a_pipeline() {
        let program = parse(indoc! {"
            pipeline f {
                produce {
                    a[0] = b[0];
                    free a;
                }
                update { for x in 0..4 { c[x] = c[x] * 2; } }
                consume { }
            }
        "})
        .unwrap();

        let expected = Stmt::pipeline(
            "f",
            Stmt::sequence(store("a", 0, load("b", 0)), Stmt::free("a")),
            Some(Stmt::for_loop(
                "x",
                Expr::int(0),
                Expr::int(4),
                Stmt::store(
                    MemoryRef::new("c", Expr::var("x")),
                    Expr::binary(Multiply, Expr::load("c", Expr::var("x")), Expr::int(2)),
                ),
            )),
            Stmt::no_op(),
        );

        assert_eq!(program, expected);
    }

    #[test]
    fn lets_scope_over_the_rest_of_the_block() {
        let program = parse("{ let t = a[0]; b[0] = t; c[0] = t; } d[0] = 1;").unwrap();

        let expected = Stmt::sequence(
            Stmt::let_stmt(
                "t",
                load("a", 0),
                Stmt::sequence(store("b", 0, Expr::var("t")), store("c", 0, Expr::var("t"))),
            ),
            store("d", 0, Expr::int(1)),
        );

        assert_eq!(program, expected);
    }

    #[test]
    fn respects_precedence_and_associativity() {
        let program = parse("a[0] = 1 - 2 - 3 * -x < f(y, (let z = 2 in z)) && p;").unwrap();

        let lhs = Expr::binary(
            Subtract,
            Expr::binary(Subtract, Expr::int(1), Expr::int(2)),
            Expr::binary(
                Multiply,
                Expr::int(3),
                Expr::binary(Subtract, Expr::int(0), Expr::var("x")),
            ),
        );
        let call = Expr::call(
            "f",
            vec![Expr::var("y"), Expr::let_in("z", Expr::int(2), Expr::var("z"))],
        );
        let value = Expr::binary(
            LogicalAnd,
            Expr::binary(LessThan, lhs, call),
            Expr::var("p"),
        );

        assert_eq!(program, store("a", 0, value));
    }

    #[test]
    fn negative_literals_are_folded() {
        assert_eq!(parse("a[-1] = -5;").unwrap(), store("a", -1, Expr::int(-5)));
    }

    #[test]
    fn else_if_chains() {
        let program = parse("if p { a[0] = 1; } else if q { a[0] = 2; } else { }").unwrap();

        let expected = Stmt::if_then_else(
            Expr::var("p"),
            store("a", 0, Expr::int(1)),
            Some(Stmt::if_then_else(
                Expr::var("q"),
                store("a", 0, Expr::int(2)),
                Some(Stmt::no_op()),
            )),
        );

        assert_eq!(program, expected);
    }

    #[test]
    fn printed_programs_parse_back() {
        let source = indoc! {"
            pipeline f {
                produce {
                    let t = a[0] + 1;
                    if t > 2 {
                        b[t] = (t - 1) * 2;
                    } else {
                        b[0] = g(t);
                    }
                }
                consume {
                    out[0] = b[0] - (b[1] - b[2]);
                }
            }
        "};

        let program = parse(source).unwrap();
        let printed = strip_ansi_escapes::strip_str(program.to_string());

        assert_eq!(parse(&printed).unwrap(), program);
    }

    #[test]
    fn reports_errors_with_spans() {
        let source = "a[0] = 1;\nb = 2;";
        let err = parse(source).unwrap_err();

        assert_eq!(
            err,
            ParseError::InvalidStoreTarget {
                found: "b".to_owned(),
                span: Span::new(10, 12)
            }
        );
        assert_eq!(err.to_string(), "only buffer elements can be stored to, not `b`");

        let err = parse("pipeline f { produce { } consume { ").unwrap_err();
        assert_eq!(err.to_string(), "expected statement or `}` but reached end of file");

        let err = parse("a[0] = 1 2;").unwrap_err();
        assert_eq!(err.to_string(), "expected `;` but found `2`");

        let err = parse("a[0] = 99999999999999999999;").unwrap_err();
        assert!(matches!(err, ParseError::IntegerOutOfRange { .. }));
    }
}
